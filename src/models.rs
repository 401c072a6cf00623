//! Data models and structures used throughout the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

// ============ Profile ============

/// User profile captured during onboarding and edited from the profile screen
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default)]
    pub weight: Option<f32>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub favorite_colors: BTreeSet<String>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default, rename = "photoURL")]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default)]
    pub dark_theme: bool,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "tr".to_string()
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            notifications: true,
            dark_theme: false,
            language: default_language(),
        }
    }
}

// ============ Chat ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

/// A single chat message, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }
}

// ============ Wardrobe ============

/// A clothing item in the user's wardrobe. Never edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClothingItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub color: String,
    #[serde(default)]
    pub brand: Option<String>,
    pub image_uri: String,
    #[serde(default)]
    pub season: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the add-item flow
#[derive(Debug, Clone, Default)]
pub struct NewClothingItem {
    pub name: String,
    pub category: String,
    pub color: String,
    pub brand: Option<String>,
    pub image_uri: String,
    pub season: Vec<String>,
    pub tags: Vec<String>,
}

// ============ Try-On ============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GarmentCategory {
    #[default]
    UpperBody,
    LowerBody,
    Dresses,
    FullBody,
}

impl GarmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            GarmentCategory::UpperBody => "upper_body",
            GarmentCategory::LowerBody => "lower_body",
            GarmentCategory::Dresses => "dresses",
            GarmentCategory::FullBody => "full_body",
        }
    }

    /// Body region phrase used to bias analysis prompts
    pub fn region_hint(&self) -> &'static str {
        match self {
            GarmentCategory::UpperBody => "the upper body (tops, shirts, jackets)",
            GarmentCategory::LowerBody => "the lower body (trousers, skirts, shorts)",
            GarmentCategory::Dresses => "a dress covering torso and legs",
            GarmentCategory::FullBody => "a full-body outfit",
        }
    }
}

impl std::str::FromStr for GarmentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upper_body" => Ok(GarmentCategory::UpperBody),
            "lower_body" => Ok(GarmentCategory::LowerBody),
            "dresses" => Ok(GarmentCategory::Dresses),
            "full_body" => Ok(GarmentCategory::FullBody),
            other => Err(format!("Unknown garment category: {}", other)),
        }
    }
}

/// Input of one try-on pipeline run. Handles are local image file paths.
#[derive(Debug, Clone, Default)]
pub struct TryOnRequest {
    pub person_image: Option<PathBuf>,
    pub garment_image: Option<PathBuf>,
    pub category: GarmentCategory,
}

impl TryOnRequest {
    pub fn new(
        person_image: impl Into<PathBuf>,
        garment_image: impl Into<PathBuf>,
        category: GarmentCategory,
    ) -> Self {
        Self {
            person_image: Some(person_image.into()),
            garment_image: Some(garment_image.into()),
            category,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TryOnFailure {
    MissingInput,
}

impl std::fmt::Display for TryOnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryOnFailure::MissingInput => {
                write!(f, "Person image and garment image are required")
            }
        }
    }
}

/// Where a successful result image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    Remote,
    LocalFallback,
}

/// Terminal value of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct TryOnResult {
    pub success: bool,
    pub result_image: Option<PathBuf>,
    pub error: Option<TryOnFailure>,
    pub processing_time: Duration,
    pub source: Option<ResultSource>,
    pub analysis: Option<String>,
}

impl TryOnResult {
    pub fn failed(error: TryOnFailure, processing_time: Duration) -> Self {
        Self {
            success: false,
            result_image: None,
            error: Some(error),
            processing_time,
            source: None,
            analysis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_ai_sender_is_read_as_assistant() {
        let json = r#"{"id":"1","text":"Merhaba","sender":"ai","timestamp":"2024-01-01T00:00:00Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender, Sender::Assistant);
    }

    #[test]
    fn test_profile_defaults_fill_missing_fields() {
        let profile: UserProfile = serde_json::from_str(r#"{"name":"Ayse"}"#).unwrap();
        assert_eq!(profile.name, "Ayse");
        assert!(profile.preferences.notifications);
        assert_eq!(profile.preferences.language, "tr");
        assert!(profile.favorite_colors.is_empty());
    }

    #[test]
    fn test_garment_category_parse() {
        assert_eq!("dresses".parse::<GarmentCategory>(), Ok(GarmentCategory::Dresses));
        assert!("hats".parse::<GarmentCategory>().is_err());
        assert_eq!(GarmentCategory::default().as_str(), "upper_body");
    }
}
