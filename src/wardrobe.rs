//! Wardrobe catalogue kept in the local store
//!
//! Items are never edited in place. Adding and deleting rewrite the whole
//! `clothingItems` document.

use crate::models::{ClothingItem, NewClothingItem};
use crate::store::ProfileStore;
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

/// Category filter value that matches every item
pub const ALL_CATEGORIES: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WardrobeSummary {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_color: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct Wardrobe {
    store: ProfileStore,
}

impl Wardrobe {
    pub fn new(store: ProfileStore) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<ClothingItem>, String> {
        self.store.load_clothing_items()
    }

    /// Validates and appends a new item. Image, name, category and color are required.
    pub fn add_item(&self, new_item: NewClothingItem) -> Result<ClothingItem, String> {
        let name = new_item.name.trim();
        let category = new_item.category.trim();
        let color = new_item.color.trim();
        let image_uri = new_item.image_uri.trim();

        if name.is_empty() || category.is_empty() || color.is_empty() || image_uri.is_empty() {
            warn!("[add_item] Rejected item with missing required fields");
            return Err("Image, name, category and color are required".to_string());
        }

        let item = ClothingItem {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            category: category.to_string(),
            color: color.to_string(),
            brand: new_item
                .brand
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty()),
            image_uri: image_uri.to_string(),
            season: clean_list(new_item.season),
            tags: clean_list(new_item.tags),
            created_at: Utc::now(),
        };

        let mut items = self.list()?;
        items.push(item.clone());
        self.store.save_clothing_items(&items)?;

        info!("[add_item] Added '{}' ({} items total)", item.name, items.len());
        Ok(item)
    }

    /// Removes the item with `id`. Returns `false` when no such item exists.
    pub fn delete_item(&self, id: &str) -> Result<bool, String> {
        let items = self.list()?;
        let before = items.len();
        let remaining: Vec<ClothingItem> = items.into_iter().filter(|i| i.id != id).collect();

        if remaining.len() == before {
            return Ok(false);
        }

        self.store.save_clothing_items(&remaining)?;
        info!("[delete_item] Removed item {}", id);
        Ok(true)
    }

    /// Items matching `category` (or any, for `None`/`"all"`) whose name, brand
    /// or tags contain `query`, ignoring case.
    pub fn filter(&self, category: Option<&str>, query: &str) -> Result<Vec<ClothingItem>, String> {
        let query = query.trim().to_lowercase();
        let items = self.list()?;

        Ok(items
            .into_iter()
            .filter(|item| match category {
                None | Some(ALL_CATEGORIES) => true,
                Some(c) => item.category == c,
            })
            .filter(|item| query.is_empty() || matches_query(item, &query))
            .collect())
    }

    pub fn by_season(&self, season: &str) -> Result<Vec<ClothingItem>, String> {
        let items = self.list()?;
        Ok(items
            .into_iter()
            .filter(|item| item.season.iter().any(|s| s.eq_ignore_ascii_case(season)))
            .collect())
    }

    pub fn summary(&self) -> Result<WardrobeSummary, String> {
        let items = self.list()?;
        let mut summary = WardrobeSummary {
            total: items.len(),
            ..Default::default()
        };
        for item in &items {
            *summary.by_category.entry(item.category.clone()).or_insert(0) += 1;
            *summary.by_color.entry(item.color.clone()).or_insert(0) += 1;
        }
        Ok(summary)
    }
}

fn matches_query(item: &ClothingItem, query: &str) -> bool {
    item.name.to_lowercase().contains(query)
        || item
            .brand
            .as_deref()
            .is_some_and(|b| b.to_lowercase().contains(query))
        || item.tags.iter().any(|t| t.to_lowercase().contains(query))
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_wardrobe() -> (tempfile::TempDir, Wardrobe) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::open(dir.path().join("wardrobe.db")).unwrap();
        (dir, Wardrobe::new(store))
    }

    fn item(name: &str, category: &str, color: &str) -> NewClothingItem {
        NewClothingItem {
            name: name.to_string(),
            category: category.to_string(),
            color: color.to_string(),
            image_uri: format!("/photos/{}.jpg", name),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_requires_fields() {
        let (_dir, wardrobe) = temp_wardrobe();
        let mut missing_color = item("Gomlek", "tops", "");
        assert!(wardrobe.add_item(missing_color.clone()).is_err());

        missing_color.color = "white".to_string();
        missing_color.image_uri = "   ".to_string();
        assert!(wardrobe.add_item(missing_color).is_err());
        assert!(wardrobe.list().unwrap().is_empty());
    }

    #[test]
    fn test_add_trims_and_persists() {
        let (_dir, wardrobe) = temp_wardrobe();
        let mut new_item = item("  Keten Gomlek ", "tops", "white");
        new_item.brand = Some("  ".to_string());
        new_item.tags = vec!["summer ".to_string(), "".to_string()];

        let added = wardrobe.add_item(new_item).unwrap();
        assert_eq!(added.name, "Keten Gomlek");
        assert_eq!(added.brand, None);
        assert_eq!(added.tags, vec!["summer".to_string()]);
        assert_eq!(wardrobe.list().unwrap(), vec![added]);
    }

    #[test]
    fn test_delete_item() {
        let (_dir, wardrobe) = temp_wardrobe();
        let a = wardrobe.add_item(item("a", "tops", "red")).unwrap();
        let b = wardrobe.add_item(item("b", "bottoms", "blue")).unwrap();

        assert!(wardrobe.delete_item(&a.id).unwrap());
        assert!(!wardrobe.delete_item(&a.id).unwrap());
        assert_eq!(wardrobe.list().unwrap(), vec![b]);
    }

    #[test]
    fn test_filter_by_category_and_query() {
        let (_dir, wardrobe) = temp_wardrobe();
        let mut jeans = item("Slim Jeans", "bottoms", "blue");
        jeans.brand = Some("Levi's".to_string());
        let mut shirt = item("Oxford", "tops", "white");
        shirt.tags = vec!["Office".to_string()];
        wardrobe.add_item(jeans).unwrap();
        wardrobe.add_item(shirt).unwrap();

        assert_eq!(wardrobe.filter(None, "").unwrap().len(), 2);
        assert_eq!(wardrobe.filter(Some("all"), "").unwrap().len(), 2);
        assert_eq!(wardrobe.filter(Some("tops"), "").unwrap()[0].name, "Oxford");
        assert_eq!(wardrobe.filter(None, "levi").unwrap()[0].name, "Slim Jeans");
        assert_eq!(wardrobe.filter(None, "office").unwrap()[0].name, "Oxford");
        assert!(wardrobe.filter(Some("tops"), "levi").unwrap().is_empty());
    }

    #[test]
    fn test_season_and_summary() {
        let (_dir, wardrobe) = temp_wardrobe();
        let mut coat = item("Coat", "outerwear", "black");
        coat.season = vec!["Winter".to_string()];
        wardrobe.add_item(coat).unwrap();
        wardrobe.add_item(item("Tee", "tops", "black")).unwrap();
        wardrobe.add_item(item("Polo", "tops", "green")).unwrap();

        assert_eq!(wardrobe.by_season("winter").unwrap().len(), 1);

        let summary = wardrobe.summary().unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_category["tops"], 2);
        assert_eq!(summary.by_color["black"], 2);
    }
}
