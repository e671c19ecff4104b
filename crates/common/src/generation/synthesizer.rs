//! Prompt Synthesizer - builds generation instructions from project data
//!
//! Provides:
//! - Section prompt briefs from educational DNA, outline and sections
//! - Deterministic generation parameters (model, token budget, temperature)
//! - Style directives and the educational context block used at generation time

use crate::config::{GenerationConfig, LlmConfig};
use crate::db::models::{LearningObjective, OutlineStructure, ProjectConfig, Section};
use crate::db::GenerationContext;
use crate::llm::CompletionRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Substituted for every absent or empty field
pub const PLACEHOLDER: &str = "Not specified";

/// Bloom's taxonomy levels that count as higher-order thinking
const HIGHER_ORDER_LEVELS: &[&str] = &["analyze", "evaluate", "create", "synthesize", "design", "critique"];

const HIGHER_ORDER_BOOST: f32 = 0.1;
const MAX_TEMPERATURE: f32 = 1.0;

/// Writing style requested for a generation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStyle {
    Creative,
    #[default]
    Balanced,
    Conservative,
}

impl GenerationStyle {
    pub fn temperature(&self) -> f32 {
        match self {
            GenerationStyle::Creative => 0.9,
            GenerationStyle::Balanced => 0.7,
            GenerationStyle::Conservative => 0.3,
        }
    }

    /// Sentence placed at the top of the enriched instruction
    pub fn directive(&self) -> &'static str {
        match self {
            GenerationStyle::Creative => {
                "Write in an engaging, imaginative voice that uses vivid examples and storytelling to spark curiosity."
            }
            GenerationStyle::Balanced => {
                "Write in a clear, well-structured voice that balances student engagement with accuracy."
            }
            GenerationStyle::Conservative => {
                "Write in a precise, formal voice that stays close to established curriculum content and avoids speculation."
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStyle::Creative => "creative",
            GenerationStyle::Balanced => "balanced",
            GenerationStyle::Conservative => "conservative",
        }
    }
}

impl fmt::Display for GenerationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "creative" => Ok(GenerationStyle::Creative),
            "balanced" => Ok(GenerationStyle::Balanced),
            "conservative" => Ok(GenerationStyle::Conservative),
            other => Err(format!("unknown generation style: {}", other)),
        }
    }
}

/// Parameters stored on a prompt and used for generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Output of [`Synthesizer::synthesize`]
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedPrompt {
    pub text: String,
    pub params: GenerationParams,
}

/// Builds prompt briefs and generation requests
#[derive(Debug, Clone)]
pub struct Synthesizer {
    model: String,
    base_max_tokens: u32,
    extended_max_tokens: u32,
    long_description_chars: usize,
}

impl Synthesizer {
    pub fn new(llm: &LlmConfig, generation: &GenerationConfig) -> Self {
        Self {
            model: llm.model.clone(),
            base_max_tokens: generation.base_max_tokens,
            extended_max_tokens: generation.extended_max_tokens,
            long_description_chars: generation.long_description_chars,
        }
    }

    /// Compose the prompt brief for a project
    ///
    /// Pure: identical inputs give byte-identical output.
    pub fn synthesize(
        &self,
        title: &str,
        config: &ProjectConfig,
        outline: &OutlineStructure,
        sections: &[Section],
    ) -> SynthesizedPrompt {
        SynthesizedPrompt {
            text: self.build_text(title, config, outline, sections),
            params: self.parameters(config, sections),
        }
    }

    /// Derive model, token budget and temperature
    pub fn parameters(&self, config: &ProjectConfig, sections: &[Section]) -> GenerationParams {
        let mut temperature = base_temperature(config.project_type.as_deref());
        if is_higher_order_majority(&config.learning_objectives) {
            temperature = boosted(temperature);
        }

        let has_long_description = sections.iter().any(|section| {
            section
                .description
                .as_deref()
                .is_some_and(|d| d.chars().count() > self.long_description_chars)
        });

        GenerationParams {
            model: self.model.clone(),
            max_tokens: if has_long_description {
                self.extended_max_tokens
            } else {
                self.base_max_tokens
            },
            temperature,
        }
    }

    /// Completion request for a stored prompt, enriched with the given style
    ///
    /// The model comes from the override, then the prompt's parameters,
    /// then the configured default. Temperature follows the style.
    pub fn generation_request(
        &self,
        context: &GenerationContext,
        style: GenerationStyle,
        model_override: Option<&str>,
    ) -> CompletionRequest {
        let stored: Option<GenerationParams> = serde_json::from_value(context.prompt.parameters.clone()).ok();

        let model = model_override
            .filter(|m| !m.trim().is_empty())
            .map(str::to_string)
            .or_else(|| stored.as_ref().map(|p| p.model.clone()))
            .unwrap_or_else(|| self.model.clone());
        let max_tokens = stored.map(|p| p.max_tokens).unwrap_or(self.base_max_tokens);

        let config = context.project.educational_dna();
        CompletionRequest::new(model, enrich(style, &config, &context.prompt.content))
            .with_max_tokens(max_tokens)
            .with_temperature(style.temperature())
    }

    fn build_text(
        &self,
        title: &str,
        config: &ProjectConfig,
        outline: &OutlineStructure,
        sections: &[Section],
    ) -> String {
        let mut text = String::new();

        text.push_str("# Educational Content Brief\n\n");

        text.push_str("## Context\n");
        text.push_str(&format!("Project: {}\n", or_placeholder(Some(title))));
        text.push_str(&format!("Project Type: {}\n", or_placeholder(config.project_type.as_deref())));
        text.push_str(&format!("Grade Levels: {}\n", join_or_placeholder(&config.grade_levels)));
        text.push_str(&format!("Subject Areas: {}\n", join_or_placeholder(&config.subject_areas)));
        text.push_str(&format!("Audience: {}\n", or_placeholder(outline.audience.as_deref())));
        text.push_str(&format!("Summary: {}\n\n", or_placeholder(outline.summary.as_deref())));

        text.push_str("## Standards\n");
        text.push_str(&bullet_list(&config.standards));

        text.push_str("\n## Learning Objectives\n");
        let objectives: Vec<String> = config.learning_objectives.iter().map(describe_objective).collect();
        text.push_str(&bullet_list(&objectives));

        text.push_str("\n## Learning Goals\n");
        text.push_str(&bullet_list(&outline.learning_goals));

        text.push_str("\n## Key Topics\n");
        text.push_str(&bullet_list(&outline.key_topics));

        text.push_str("\n## Pedagogical Approach\n");
        text.push_str(&format!("{}\n", or_placeholder(config.pedagogical_approach.as_deref())));

        text.push_str("\n## Accessibility Considerations\n");
        text.push_str(&bullet_list(&config.accessibility_needs));

        text.push_str("\n## Sections\n");
        if sections.is_empty() {
            text.push_str(PLACEHOLDER);
            text.push('\n');
        }

        let mut ordered: Vec<&Section> = sections.iter().collect();
        ordered.sort_by_key(|s| (s.sequence, s.id));
        for (position, section) in ordered.iter().enumerate() {
            let details = section.section_config();
            text.push_str(&format!("\n### Section {}: {}\n", position + 1, or_placeholder(Some(section.title.as_str()))));
            text.push_str(&format!("Description: {}\n", or_placeholder(section.description.as_deref())));
            text.push_str(&format!("Objectives: {}\n", join_or_placeholder(&details.objectives)));
            text.push_str(&format!("Activity Types: {}\n", join_or_placeholder(&details.activity_types)));
            text.push_str(&format!("Resources: {}\n", join_or_placeholder(&details.resources)));
            text.push_str(&format!("Notes: {}\n", or_placeholder(details.notes.as_deref())));
        }

        text.push_str("\n## Output Format\n");
        text.push_str("- Organize the content under clear headings that follow the section order above.\n");
        text.push_str("- Address every learning objective explicitly.\n");
        text.push_str("- Pitch vocabulary and examples at the stated grade levels.\n");
        text.push_str("- Apply the accessibility considerations throughout.\n");
        text.push_str("- End with a short formative assessment.\n");

        text
    }
}

/// Prefix stored prompt text with a style directive and the educational context
pub fn enrich(style: GenerationStyle, config: &ProjectConfig, prompt_text: &str) -> String {
    format!("{}\n\n{}\n\n{}", style.directive(), context_block(config), prompt_text)
}

fn context_block(config: &ProjectConfig) -> String {
    format!(
        "Educational Context:\n\
         - Grade Levels: {}\n\
         - Subject Areas: {}\n\
         - Standards: {}\n\
         - Pedagogical Approach: {}\n\
         - Accessibility Needs: {}",
        join_or_placeholder(&config.grade_levels),
        join_or_placeholder(&config.subject_areas),
        join_or_placeholder(&config.standards),
        or_placeholder(config.pedagogical_approach.as_deref()),
        join_or_placeholder(&config.accessibility_needs),
    )
}

/// Base sampling temperature for a project type
pub fn base_temperature(project_type: Option<&str>) -> f32 {
    match project_type.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
        Some("assessment") => 0.3,
        Some("activity") => 0.8,
        Some("lesson") => 0.7,
        Some("module") => 0.6,
        _ => 0.7,
    }
}

/// Raise a temperature for higher-order objectives, never past the maximum
fn boosted(temperature: f32) -> f32 {
    round2((temperature + HIGHER_ORDER_BOOST).min(MAX_TEMPERATURE))
}

/// Strictly more than half of the objectives carry a higher-order tag
fn is_higher_order_majority(objectives: &[LearningObjective]) -> bool {
    let higher = objectives
        .iter()
        .filter(|o| {
            o.bloom_level.as_deref().is_some_and(|level| {
                let level = level.trim().to_ascii_lowercase();
                HIGHER_ORDER_LEVELS.contains(&level.as_str())
            })
        })
        .count();

    higher * 2 > objectives.len()
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

fn describe_objective(objective: &LearningObjective) -> String {
    match objective.bloom_level.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(level) => format!("{} (Bloom: {})", objective.description.trim(), level),
        None => objective.description.trim().to_string(),
    }
}

fn or_placeholder(value: Option<&str>) -> &str {
    value.map(str::trim).filter(|v| !v.is_empty()).unwrap_or(PLACEHOLDER)
}

fn non_empty(values: &[String]) -> Vec<&str> {
    values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect()
}

fn join_or_placeholder(values: &[String]) -> String {
    let values = non_empty(values);
    if values.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        values.join(", ")
    }
}

fn bullet_list(values: &[String]) -> String {
    let values = non_empty(values);
    if values.is_empty() {
        return format!("- {}\n", PLACEHOLDER);
    }
    values.iter().map(|v| format!("- {}\n", v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn synthesizer() -> Synthesizer {
        Synthesizer::new(&LlmConfig::default(), &GenerationConfig::default())
    }

    fn section(sequence: i32, title: &str, description: Option<&str>, config: serde_json::Value) -> Section {
        let now = chrono::Utc::now().into();
        Section {
            id: Uuid::new_v4(),
            outline_id: Uuid::nil(),
            title: title.to_string(),
            description: description.map(str::to_string),
            sequence,
            config,
            created_at: now,
            updated_at: now,
        }
    }

    fn full_config() -> ProjectConfig {
        ProjectConfig {
            project_type: Some("lesson".into()),
            grade_levels: vec!["Grade 7".into()],
            subject_areas: vec!["Life Science".into()],
            standards: vec!["NGSS MS-LS1-6".into()],
            learning_objectives: vec![
                LearningObjective::new("Describe how plants capture light", Some("understand")),
                LearningObjective::new("Design an experiment on leaf color", Some("create")),
            ],
            pedagogical_approach: Some("Inquiry-based".into()),
            accessibility_needs: vec!["Screen-reader friendly".into()],
            content_sections: vec![],
        }
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let config = full_config();
        let outline = OutlineStructure {
            summary: Some("How plants make food".into()),
            ..Default::default()
        };
        let sections = vec![section(1, "Light", Some("Light energy"), json!({}))];

        let first = synthesizer().synthesize("Photosynthesis", &config, &outline, &sections);
        let second = synthesizer().synthesize("Photosynthesis", &config, &outline, &sections);
        assert_eq!(first, second);
    }

    #[test]
    fn test_supplied_fields_appear_verbatim() {
        let sections = vec![section(
            1,
            "Chlorophyll",
            Some("Why leaves are green"),
            json!({ "activity_types": ["Lab"], "resources": ["Leaf kit"] }),
        )];
        let text = synthesizer()
            .synthesize("Photosynthesis", &full_config(), &OutlineStructure::default(), &sections)
            .text;

        for expected in [
            "Photosynthesis",
            "Grade 7",
            "Life Science",
            "NGSS MS-LS1-6",
            "Design an experiment on leaf color",
            "Inquiry-based",
            "Screen-reader friendly",
            "Chlorophyll",
            "Why leaves are green",
            "Lab",
            "Leaf kit",
        ] {
            assert!(text.contains(expected), "missing {expected:?}");
        }
    }

    #[test]
    fn test_empty_config_uses_placeholders() {
        let text = synthesizer()
            .synthesize("", &ProjectConfig::default(), &OutlineStructure::default(), &[])
            .text;

        for slot in [
            "Project: Not specified",
            "Project Type: Not specified",
            "Grade Levels: Not specified",
            "Subject Areas: Not specified",
            "Audience: Not specified",
            "Summary: Not specified",
            "## Standards\n- Not specified",
            "## Learning Objectives\n- Not specified",
            "## Pedagogical Approach\nNot specified",
            "## Accessibility Considerations\n- Not specified",
            "## Sections\nNot specified",
        ] {
            assert!(text.contains(slot), "missing {slot:?}");
        }
        for artifact in ["null", "None", "undefined"] {
            assert!(!text.contains(artifact), "found {artifact:?}");
        }
    }

    #[test]
    fn test_sections_follow_sequence() {
        let sections = vec![
            section(2, "Second", None, json!({})),
            section(1, "First", None, json!({})),
        ];
        let text = synthesizer()
            .synthesize("T", &ProjectConfig::default(), &OutlineStructure::default(), &sections)
            .text;

        let first = text.find("Section 1: First").unwrap();
        let second = text.find("Section 2: Second").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_temperature_by_project_type() {
        assert_eq!(base_temperature(Some("assessment")), 0.3);
        assert_eq!(base_temperature(Some("Activity")), 0.8);
        assert_eq!(base_temperature(Some("module")), 0.6);
        assert_eq!(base_temperature(Some("workshop")), 0.7);
        assert_eq!(base_temperature(None), 0.7);
    }

    #[test]
    fn test_higher_order_majority_raises_temperature() {
        let mut config = ProjectConfig {
            project_type: Some("assessment".into()),
            learning_objectives: vec![
                LearningObjective::new("a", Some("Analyze")),
                LearningObjective::new("b", Some("evaluate")),
                LearningObjective::new("c", Some("remember")),
            ],
            ..Default::default()
        };
        assert_eq!(synthesizer().parameters(&config, &[]).temperature, 0.4);

        // Exactly half is not a majority
        config.learning_objectives.pop();
        config.learning_objectives.push(LearningObjective::new("d", None));
        config.learning_objectives.push(LearningObjective::new("e", Some("recall")));
        assert_eq!(synthesizer().parameters(&config, &[]).temperature, 0.3);
    }

    #[test]
    fn test_higher_order_boost_is_capped() {
        let config = ProjectConfig {
            project_type: Some("activity".into()),
            learning_objectives: vec![LearningObjective::new("a", Some("create"))],
            ..Default::default()
        };
        assert_eq!(synthesizer().parameters(&config, &[]).temperature, 0.9);

        assert_eq!(boosted(0.95), MAX_TEMPERATURE);
        assert_eq!(boosted(MAX_TEMPERATURE), MAX_TEMPERATURE);
    }

    #[test]
    fn test_long_description_extends_token_budget() {
        let short = vec![section(1, "s", Some("brief"), json!({}))];
        let long_text = "x".repeat(501);
        let long = vec![section(1, "s", Some(&long_text), json!({}))];

        assert_eq!(synthesizer().parameters(&ProjectConfig::default(), &short).max_tokens, 2048);
        assert_eq!(synthesizer().parameters(&ProjectConfig::default(), &long).max_tokens, 4096);
    }

    #[test]
    fn test_conservative_enrichment() {
        let config = full_config();
        let enriched = enrich(GenerationStyle::Conservative, &config, "Explain photosynthesis");

        assert!(enriched.starts_with(GenerationStyle::Conservative.directive()));
        let context_at = enriched.find("Educational Context:").unwrap();
        assert_eq!(context_at, GenerationStyle::Conservative.directive().len() + 2);
        assert!(enriched.ends_with("\n\nExplain photosynthesis"));
        assert!(enriched.contains("- Pedagogical Approach: Inquiry-based"));
    }

    #[test]
    fn test_style_parsing() {
        assert_eq!("Creative".parse::<GenerationStyle>(), Ok(GenerationStyle::Creative));
        assert!("wild".parse::<GenerationStyle>().is_err());
        assert_eq!(GenerationStyle::default(), GenerationStyle::Balanced);
        assert_eq!(GenerationStyle::Conservative.temperature(), 0.3);
    }
}
