use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest competency level a student can be assigned.
pub const MIN_LEVEL: u8 = 1;
/// Highest competency level a student can be assigned.
pub const MAX_LEVEL: u8 = 5;

/// One of the three skill axes a simulated student is described along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Knowledge,
    Grammar,
    Flow,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Self::Knowledge, Self::Grammar, Self::Flow];

    /// Lowercase name: "knowledge", "grammar", "flow".
    pub fn name(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Grammar => "grammar",
            Self::Flow => "flow",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a dimension name is not one of the three known axes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown competency dimension: {0}")]
pub struct UnknownDimension(pub String);

impl FromStr for Dimension {
    type Err = UnknownDimension;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "knowledge" => Ok(Self::Knowledge),
            "grammar" => Ok(Self::Grammar),
            "flow" => Ok(Self::Flow),
            _ => Err(UnknownDimension(s.to_string())),
        }
    }
}

/// A competency level in `MIN_LEVEL..=MAX_LEVEL`.
///
/// The only ways to build one are `Level::new`, which rejects out-of-range
/// values, and `Level::clamped`, which saturates into range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub fn new(value: u8) -> Option<Self> {
        (MIN_LEVEL..=MAX_LEVEL).contains(&value).then_some(Self(value))
    }

    /// Saturate any integer into the valid range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(MIN_LEVEL as i64, MAX_LEVEL as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Move by `delta` steps, saturating at both ends of the scale.
    pub fn offset(self, delta: i8) -> Self {
        Self::clamped(self.0 as i64 + delta as i64)
    }

    /// Zero-based position, for indexing five-entry tables.
    pub(crate) fn index(self) -> usize {
        (self.0 - MIN_LEVEL) as usize
    }
}

impl TryFrom<u8> for Level {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Level::new(value)
            .ok_or_else(|| format!("level {value} outside {MIN_LEVEL}..={MAX_LEVEL}"))
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.0
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The (knowledge, grammar, flow) levels governing one generated essay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompetencyTriplet {
    pub knowledge: Level,
    pub grammar: Level,
    pub flow: Level,
}

impl CompetencyTriplet {
    pub fn level(&self, dimension: Dimension) -> Level {
        match dimension {
            Dimension::Knowledge => self.knowledge,
            Dimension::Grammar => self.grammar,
            Dimension::Flow => self.flow,
        }
    }
}

/// A triplet together with the descriptor text each level resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCompetency {
    pub levels: CompetencyTriplet,
    pub knowledge_desc: String,
    pub grammar_desc: String,
    pub flow_desc: String,
}
