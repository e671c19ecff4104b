//! LessonForge Common Library
//!
//! Shared code for the LessonForge services including:
//! - Database models and the content store
//! - Language model client abstraction
//! - Content generation core (synthesis, streaming sessions, quality, persistence)
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{ContentStore, MemoryStore, Repository};
pub use errors::{AppError, Result};
pub use llm::LanguageModel;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
