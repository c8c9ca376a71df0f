use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::competency::ResolvedCompetency;

/// What the caller asks for: the assignment every essay in a batch answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayRequest {
    pub topic: String,
    pub grade_level: String,
    pub subject: String,
    pub assignment_type: String,
    pub prompt_template: String,
    /// Extra labeled prompt sections, appended in this order.
    #[serde(default)]
    pub sections: Vec<(String, String)>,
}

impl EssayRequest {
    pub fn new(
        topic: impl Into<String>,
        grade_level: impl Into<String>,
        subject: impl Into<String>,
        assignment_type: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            grade_level: grade_level.into(),
            subject: subject.into(),
            assignment_type: assignment_type.into(),
            prompt_template: prompt_template.into(),
            sections: Vec::new(),
        }
    }

    pub fn with_section(mut self, label: impl Into<String>, content: impl Into<String>) -> Self {
        self.sections.push((label.into(), content.into()));
        self
    }
}

/// Lowercased topic with spaces replaced by underscores, used in file
/// and variable names ("Civil War" -> "civil_war").
pub fn topic_slug(topic: &str) -> String {
    topic.trim().to_lowercase().replace(' ', "_")
}

/// Whether the text-generation call for a unit produced anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EssayStatus {
    Generated,
    Failed { reason: String },
}

/// The output of one generation cycle. Written once to a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EssayRecord {
    pub id: Uuid,
    pub topic: String,
    pub subject: String,
    pub grade: String,
    pub assignment_type: String,
    pub prompt: String,
    pub competency: ResolvedCompetency,
    /// Empty when `status` is `Failed`.
    pub essay_text: String,
    pub status: EssayStatus,
    pub model: String,
    pub created_ts: String,
}

impl EssayRecord {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, EssayStatus::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_slug_lowercases_and_joins() {
        assert_eq!(topic_slug("The Great Gatsby"), "the_great_gatsby");
        assert_eq!(topic_slug("  Civil War "), "civil_war");
    }

    #[test]
    fn request_sections_keep_order() {
        let req = EssayRequest::new("Civil War", "8th grade", "History", "essay", "Write.")
            .with_section("Rubric", "Five paragraphs")
            .with_section("Sources", "Textbook chapter 4");
        assert_eq!(req.sections[0].0, "Rubric");
        assert_eq!(req.sections[1].0, "Sources");
    }
}
