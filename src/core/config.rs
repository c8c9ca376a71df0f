/// Run configuration and credentials, constructed once and passed down.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::sampler::SamplerParams;

/// Environment variable holding the text-generation API key.
pub const API_KEY_VAR: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("env file error: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

/// Where the record store finds its schema and data definition files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub schema_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Table essays are written to by the store sink.
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "samples".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            schema_dir: PathBuf::from("schema"),
            data_dir: PathBuf::from("data"),
            table: default_table(),
        }
    }
}

/// Settings for an essay generation run. Every field has a default, so a
/// config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EssayConfig {
    pub model: String,
    pub temperature: f32,
    pub api_base: String,
    pub request_timeout_secs: u64,
    pub knowledge_mean: f64,
    pub knowledge_std_dev: f64,
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
    pub persona_note: Option<String>,
    /// Optional RON descriptor catalog replacing the built-in tables.
    pub descriptors: Option<PathBuf>,
    pub store: Option<StoreConfig>,
}

impl Default for EssayConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 1.0,
            api_base: "https://api.openai.com/v1".to_string(),
            request_timeout_secs: 120,
            knowledge_mean: 3.5,
            knowledge_std_dev: 1.0,
            seed: None,
            output_dir: PathBuf::from("."),
            persona_note: None,
            descriptors: None,
            store: None,
        }
    }
}

impl EssayConfig {
    pub fn parse_ron(input: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn sampler_params(&self) -> SamplerParams {
        SamplerParams {
            mean: self.knowledge_mean,
            std_dev: self.knowledge_std_dev,
        }
    }
}

/// API credential, read from the environment or a `.env` file at startup.
///
/// A missing key is not an error here; the completion client reports it
/// on its first request.
#[derive(Clone, Default)]
pub struct Credentials {
    api_key: Option<String>,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
        }
    }

    /// Read the key from the process environment. Callers that want a
    /// `.env` file honoured load it first (`dotenvy::dotenv()`).
    pub fn from_env() -> Self {
        let api_key = std::env::var(API_KEY_VAR).ok();
        Self::checked(api_key)
    }

    /// Read the key from a `.env`-style file only, leaving the process
    /// environment untouched.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let mut api_key = None;
        for entry in dotenvy::from_path_iter(path)? {
            let (name, value) = entry?;
            if name == API_KEY_VAR {
                api_key = Some(value);
            }
        }
        Ok(Self::checked(api_key))
    }

    fn checked(api_key: Option<String>) -> Self {
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_some() {
            tracing::info!("{API_KEY_VAR} loaded");
        } else {
            tracing::warn!("{API_KEY_VAR} not set; generation requests will fail");
        }
        Self { api_key }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = EssayConfig::parse_ron("()").unwrap();
        assert_eq!(cfg, EssayConfig::default());
        assert_eq!(cfg.model, "gpt-4o-mini");
        assert_eq!(cfg.sampler_params(), SamplerParams::default());
    }

    #[test]
    fn partial_config_overrides() {
        let cfg = EssayConfig::parse_ron(
            r#"(
                knowledge_mean: 2.5,
                seed: Some(9),
                store: Some((schema_dir: "db/schema", data_dir: "db/data")),
            )"#,
        )
        .unwrap();
        assert_eq!(cfg.knowledge_mean, 2.5);
        assert_eq!(cfg.seed, Some(9));
        let store = cfg.store.unwrap();
        assert_eq!(store.table, "samples");
        assert_eq!(store.data_dir, PathBuf::from("db/data"));
    }

    #[test]
    fn credentials_debug_redacts_key() {
        let creds = Credentials::new("sk-secret");
        let shown = format!("{creds:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("redacted"));
        assert_eq!(creds.api_key(), Some("sk-secret"));
    }

    #[test]
    fn load_fixture_config() {
        let cfg = EssayConfig::load_from_ron(Path::new("tests/fixtures/essay_config.ron")).unwrap();
        assert_eq!(cfg.temperature, 0.8);
        assert!(cfg.persona_note.is_some());
    }

    #[test]
    fn env_file_supplies_the_key() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "# local secrets\nOTHER=1\nOPENAI_API_KEY=\"sk-from-file\"\n",
        )
        .unwrap();

        let creds = Credentials::from_env_file(&path).unwrap();
        assert_eq!(creds.api_key(), Some("sk-from-file"));
        assert!(!format!("{creds:?}").contains("sk-from-file"));
    }

    #[test]
    fn env_file_without_the_key_or_blank_key_yields_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "OPENAI_API_KEY=\nOTHER=x\n").unwrap();
        assert_eq!(Credentials::from_env_file(&path).unwrap().api_key(), None);

        let missing = dir.path().join("absent.env");
        assert!(matches!(
            Credentials::from_env_file(&missing),
            Err(ConfigError::Dotenv(_))
        ));
    }
}
