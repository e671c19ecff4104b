//! Content generation core
//!
//! Provides:
//! - Prompt synthesis and style enrichment
//! - Streaming generation sessions with background quality checks
//! - Quality assessment of generated text
//! - Persistence of content and validations
//! - Offline generate / validate and stage advancement

pub mod events;
#[cfg(test)]
mod fixtures;
pub mod pipeline;
pub mod quality;
pub mod session;
pub mod sink;
pub mod synthesizer;

pub use events::{ClientMessage, GenerateRequest, ServerEvent};
pub use pipeline::{GenerateOptions, Pipeline};
pub use quality::{extract_quality_json, QualityAssessor, QualityIndicators, ReadingLevel};
pub use session::{SessionController, SessionState};
pub use sink::{ApprovalPolicy, PersistenceSink, ValidationScores};
pub use synthesizer::{enrich, GenerationParams, GenerationStyle, SynthesizedPrompt, Synthesizer};
