//! Aikadin fashion assistant core
//!
//! AI chat with profile-aware prompts, a virtual try-on pipeline with local
//! fallback, and on-device storage for profile, chat history and wardrobe.

pub mod config;
pub mod gallery;
pub mod gateway;
pub mod imaging;
pub mod logger;
pub mod models;
pub mod paths;
pub mod prompts;
pub mod session;
pub mod store;
pub mod tryon;
pub mod wardrobe;
