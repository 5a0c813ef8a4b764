//! Configuration for the registry.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ledger::JsonRpcLedgerConfig;
use crate::store::PinningGatewayConfig;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for a registry deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Current-snapshot pointer
    pub pointer: PointerConfig,
    /// Collaborator timeouts
    pub timeouts: TimeoutConfig,
    /// Content store backend
    pub store: StoreConfig,
    /// Ledger backend
    pub ledger: LedgerConfig,
    /// Narrative generation
    pub narrative: NarrativeConfig,
    /// Model artifacts
    pub model: ModelConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl RegistryConfig {
    /// Parse config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pointer.max_commit_attempts == 0 {
            return Err(ConfigError::Invalid(
                "pointer.max_commit_attempts must be at least 1".to_string(),
            ));
        }
        let t = &self.timeouts;
        for (name, ms) in [
            ("classifier_ms", t.classifier_ms),
            ("attribution_ms", t.attribution_ms),
            ("narrative_ms", t.narrative_ms),
            ("store_fetch_ms", t.store_fetch_ms),
            ("store_publish_ms", t.store_publish_ms),
            ("ledger_ms", t.ledger_ms),
        ] {
            if ms == 0 {
                return Err(ConfigError::Invalid(format!("timeouts.{} must be positive", name)));
            }
        }
        if !(0.0..=2.0).contains(&self.narrative.temperature) {
            return Err(ConfigError::Invalid(
                "narrative.temperature must be within 0.0 - 2.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pointer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    /// Snapshot to start from; a fresh empty snapshot is published when unset
    pub genesis_cid: Option<String>,
    /// File the pointer is journaled to
    pub journal_path: Option<PathBuf>,
    /// Fetch-append-publish-commit attempts before giving up
    pub max_commit_attempts: u32,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            genesis_cid: None,
            journal_path: None,
            max_commit_attempts: 8,
        }
    }
}

/// Timeouts for every collaborator call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub classifier_ms: u64,
    pub attribution_ms: u64,
    pub narrative_ms: u64,
    pub store_fetch_ms: u64,
    pub store_publish_ms: u64,
    /// Covers submission and confirmation
    pub ledger_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            classifier_ms: 2_000,
            attribution_ms: 5_000,
            narrative_ms: 15_000,
            store_fetch_ms: 10_000,
            store_publish_ms: 30_000,
            ledger_ms: 60_000,
        }
    }
}

impl TimeoutConfig {
    pub fn classifier(&self) -> Duration {
        Duration::from_millis(self.classifier_ms)
    }

    pub fn attribution(&self) -> Duration {
        Duration::from_millis(self.attribution_ms)
    }

    pub fn narrative(&self) -> Duration {
        Duration::from_millis(self.narrative_ms)
    }

    pub fn store_fetch(&self) -> Duration {
        Duration::from_millis(self.store_fetch_ms)
    }

    pub fn store_publish(&self) -> Duration {
        Duration::from_millis(self.store_publish_ms)
    }

    pub fn ledger(&self) -> Duration {
        Duration::from_millis(self.ledger_ms)
    }
}

/// Content store backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    #[default]
    Memory,
    Local {
        root: PathBuf,
    },
    Pinning(PinningGatewayConfig),
}

/// Ledger backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerConfig {
    #[default]
    Memory,
    JsonRpc(JsonRpcLedgerConfig),
}

/// Narrative configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    pub backend: NarrativeBackendConfig,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Scheme named in prompts
    pub scheme: String,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            backend: NarrativeBackendConfig::Disabled,
            max_tokens: 256,
            temperature: 0.3,
            scheme: narrator::prompt::DEFAULT_SCHEME.to_string(),
        }
    }
}

/// Narrative backend.
///
/// API keys fall back to `OPENAI_API_KEY` / `GEMINI_API_KEY` when unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NarrativeBackendConfig {
    /// Always use the fallback sentence
    #[default]
    Disabled,
    /// Canned response
    Mock { response: String },
    /// OpenAI-compatible chat endpoint
    #[serde(rename = "openai")]
    OpenAi {
        base_url: String,
        model: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    /// Google Gemini
    Gemini {
        #[serde(default = "default_gemini_url")]
        base_url: String,
        model: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

fn default_gemini_url() -> String {
    narrator::GeminiBackend::DEFAULT_BASE_URL.to_string()
}

/// Model artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Exported tree-ensemble classifier
    pub forest_path: Option<PathBuf>,
    /// Category mapping JSON; the built-in mapping is used when unset
    pub mapping_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
