/// Descriptor catalog — natural-language text for each competency level.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::schema::competency::{
    CompetencyTriplet, Dimension, Level, ResolvedCompetency, UnknownDimension, MAX_LEVEL,
    MIN_LEVEL,
};

const LEVELS: usize = (MAX_LEVEL - MIN_LEVEL + 1) as usize;

const KNOWLEDGE: [&str; LEVELS] = [
    "no knowledge",
    "superficial knowledge",
    "medium knowledge",
    "deep knowledge",
    "deep knowledge with high ability for analysis",
];

const GRAMMAR: [&str; LEVELS] = [
    "terrible grammar and spelling mistakes",
    "bad grammar",
    "decent grammar but very basic structure",
    "good grammar and structure",
    "great form, grammar and a broad vocabulary",
];

const FLOW: [&str; LEVELS] = [
    "poor flow and organization. There is no thesis",
    "weak flow with some organization issues, the thesis is unclear",
    "adequate flow and organization, the thesis is in the first paragraph and the conclusion is in the last",
    "good flow and well-organized. The thesis is clear and the conclusion summarizes the main points. \
     The ideas flow logically from paragraph to paragraph",
    "excellent flow and highly organized. The thesis is compelling and well-placed, and the conclusion \
     effectively reinforces the main arguments. Transitions between paragraphs are smooth and enhance readability",
];

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid {dimension} level: {level} (expected 1..=5)")]
    InvalidLevel { dimension: String, level: i64 },
    #[error(transparent)]
    UnknownDimension(#[from] UnknownDimension),
    #[error("{dimension} table has {found} entries, expected 5")]
    IncompleteTable { dimension: Dimension, found: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// On-disk shape of a catalog override.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    knowledge: Vec<String>,
    grammar: Vec<String>,
    flow: Vec<String>,
}

/// Maps each (dimension, level) pair to descriptor text.
///
/// Tables are fixed once the catalog is built. Level 1 is the weakest
/// student, level 5 the strongest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorCatalog {
    knowledge: [String; LEVELS],
    grammar: [String; LEVELS],
    flow: [String; LEVELS],
}

impl Default for DescriptorCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl DescriptorCatalog {
    /// The built-in descriptor tables.
    pub fn standard() -> Self {
        Self {
            knowledge: KNOWLEDGE.map(str::to_string),
            grammar: GRAMMAR.map(str::to_string),
            flow: FLOW.map(str::to_string),
        }
    }

    /// Parse a catalog from a RON string with `knowledge`, `grammar` and
    /// `flow` lists of exactly five entries each.
    pub fn parse_ron(input: &str) -> Result<Self, DescriptorError> {
        let file: CatalogFile = ron::from_str(input)?;
        Ok(Self {
            knowledge: to_table(Dimension::Knowledge, file.knowledge)?,
            grammar: to_table(Dimension::Grammar, file.grammar)?,
            flow: to_table(Dimension::Flow, file.flow)?,
        })
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, DescriptorError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    fn table(&self, dimension: Dimension) -> &[String; LEVELS] {
        match dimension {
            Dimension::Knowledge => &self.knowledge,
            Dimension::Grammar => &self.grammar,
            Dimension::Flow => &self.flow,
        }
    }

    /// Descriptor for an already-validated level. Total.
    pub fn text(&self, dimension: Dimension, level: Level) -> &str {
        &self.table(dimension)[level.index()]
    }

    /// Descriptor lookup from raw input, failing on an unknown dimension
    /// name or a level outside the scale.
    pub fn describe(&self, dimension: &str, level: i64) -> Result<&str, DescriptorError> {
        let dimension: Dimension = dimension.parse()?;
        let checked = u8::try_from(level)
            .ok()
            .and_then(Level::new)
            .ok_or_else(|| DescriptorError::InvalidLevel {
                dimension: dimension.name().to_string(),
                level,
            })?;
        Ok(self.text(dimension, checked))
    }

    /// Attach descriptor text to every level of a triplet.
    pub fn resolve(&self, levels: CompetencyTriplet) -> ResolvedCompetency {
        let text = |dimension: Dimension| self.text(dimension, levels.level(dimension)).to_string();
        ResolvedCompetency {
            levels,
            knowledge_desc: text(Dimension::Knowledge),
            grammar_desc: text(Dimension::Grammar),
            flow_desc: text(Dimension::Flow),
        }
    }
}

fn to_table(dimension: Dimension, entries: Vec<String>) -> Result<[String; LEVELS], DescriptorError> {
    let found = entries.len();
    entries
        .try_into()
        .map_err(|_| DescriptorError::IncompleteTable { dimension, found })
}
