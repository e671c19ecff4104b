//! Shared seeding for integration tests

use lessonforge_common::db::models::{Outline, PipelineStage, Project, Prompt, Section};
use lessonforge_common::MemoryStore;
use std::sync::Arc;
use uuid::Uuid;

pub struct Seeded {
    pub store: Arc<MemoryStore>,
    pub user_id: Uuid,
    pub project_id: Uuid,
    pub section_ids: Vec<Uuid>,
}

/// A configured project with an outline and `sections` sections, no prompts yet
pub async fn seed_project(stage: PipelineStage, sections: usize) -> Seeded {
    let store = Arc::new(MemoryStore::new());
    let now = chrono::Utc::now().into();
    let user_id = Uuid::new_v4();

    let project = Project {
        id: Uuid::new_v4(),
        user_id,
        title: "Water Cycle Week".to_string(),
        description: Some("Five days on evaporation and rain".to_string()),
        current_stage: stage.as_str().to_string(),
        completion_percentage: stage.completion_percentage(),
        config: serde_json::json!({
            "project_type": "module",
            "grade_levels": ["3"],
            "subject_areas": ["Science"],
            "standards": ["NGSS 3-ESS2-1"],
            "learning_objectives": [
                { "description": "Describe evaporation", "bloom_level": "understand" },
                { "description": "Design a rain gauge", "bloom_level": "create" }
            ],
            "accessibility_needs": ["Large print handouts"]
        }),
        created_at: now,
        updated_at: now,
    };
    let outline = Outline {
        id: Uuid::new_v4(),
        project_id: project.id,
        structure: serde_json::json!({ "summary": "From puddles to clouds", "key_topics": ["evaporation"] }),
        created_at: now,
        updated_at: now,
    };

    let mut section_ids = Vec::with_capacity(sections);
    let project_id = project.id;
    let outline_id = outline.id;
    store.insert_project(project).await;
    store.insert_outline(outline).await;

    for sequence in 0..sections {
        let section = Section {
            id: Uuid::new_v4(),
            outline_id,
            title: format!("Day {}", sequence + 1),
            description: None,
            sequence: sequence as i32,
            config: serde_json::json!({ "activity_types": ["experiment"] }),
            created_at: now,
            updated_at: now,
        };
        section_ids.push(section.id);
        store.insert_section(section).await;
    }

    Seeded {
        store,
        user_id,
        project_id,
        section_ids,
    }
}

/// Add a stored prompt to a section
#[allow(dead_code)]
pub async fn add_prompt(seeded: &Seeded, section_id: Uuid, content: &str) -> Uuid {
    let now = chrono::Utc::now().into();
    let prompt = Prompt {
        id: Uuid::new_v4(),
        section_id,
        content: content.to_string(),
        parameters: serde_json::json!({}),
        is_generated: false,
        is_approved: true,
        created_at: now,
        updated_at: now,
    };
    let id = prompt.id;
    seeded.store.insert_prompt(prompt).await;
    id
}
