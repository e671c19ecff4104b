//! API handlers module

pub mod content;
pub mod health;
pub mod projects;
pub mod prompts;
pub mod stream;
