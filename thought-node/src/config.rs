//! Node configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::Backoff;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory holding the local mirror database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Thought-log contract access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Address of the thought-log contract
    #[serde(default = "default_zero_address")]
    pub contract_address: String,

    /// Node-managed account that signs submissions and bonds
    #[serde(default = "default_zero_address")]
    pub account: String,

    /// Interval between receipt polls
    #[serde(default = "default_receipt_poll")]
    pub receipt_poll_ms: u64,

    /// Give up waiting for a receipt after this long
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

/// Generation engine (llama.cpp server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f32>,

    /// Pause before the next cycle after an engine failure
    #[serde(default = "default_engine_retry")]
    pub retry_delay_ms: u64,
}

/// Persona and window shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Inline system preamble
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// JSON persona file with a `system` field; overrides `system_prompt`
    #[serde(default)]
    pub persona_file: Option<PathBuf>,

    /// Number of most recent entries shown to the engine
    #[serde(default = "default_window_size")]
    pub window_size: u64,

    /// Added to the cursor to derive the generation seed
    #[serde(default = "default_seed_offset")]
    pub seed_offset: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Delay between polls once the tip is reached
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// "fixed" or "exponential"
    #[serde(default)]
    pub backoff: BackoffKind,

    /// Cap for exponential backoff
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Deserialize)]
struct PersonaFile {
    system: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parsing {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Parsing persona {path}: {source}")]
    Persona {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("window_size must be at least 1")]
    EmptyWindow,
}

impl Config {
    /// Load from a TOML file, or defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        Ok(())
    }
}

impl AgentConfig {
    /// Resolve the system preamble, reading the persona file if set.
    pub fn resolve_system_prompt(&self) -> Result<String, ConfigError> {
        let Some(path) = &self.persona_file else {
            return Ok(self.system_prompt.clone());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let persona: PersonaFile =
            serde_json::from_str(&content).map_err(|source| ConfigError::Persona {
                path: path.clone(),
                source,
            })?;
        Ok(persona.system)
    }
}

impl SyncConfig {
    pub fn backoff(&self) -> Backoff {
        let base = Duration::from_millis(self.poll_interval_ms);
        match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(base),
            BackoffKind::Exponential => Backoff::Exponential {
                initial: base,
                max: Duration::from_millis(self.max_backoff_ms.max(self.poll_interval_ms)),
            },
        }
    }
}

// Defaults
fn default_data_dir() -> PathBuf { PathBuf::from("./data") }
fn default_rpc_url() -> String { "http://localhost:8545".to_string() }
fn default_zero_address() -> String { "0x0000000000000000000000000000000000000000".to_string() }
fn default_receipt_poll() -> u64 { 1000 }
fn default_receipt_timeout() -> u64 { 120 }
fn default_engine_url() -> String { "http://localhost:8080".to_string() }
fn default_model() -> String { "phi-4".to_string() }
fn default_max_tokens() -> u32 { 512 }
fn default_engine_retry() -> u64 { 5000 }
fn default_system_prompt() -> String {
    "You are a character keeping an inner monologue. Each reply is the next entry.".to_string()
}
fn default_window_size() -> u64 { 6 }
fn default_seed_offset() -> u64 { 41 }
fn default_poll_interval() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30_000 }

impl Default for NodeConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: default_zero_address(),
            account: default_zero_address(),
            receipt_poll_ms: default_receipt_poll(),
            receipt_timeout_secs: default_receipt_timeout(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_engine_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            retry_delay_ms: default_engine_retry(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            persona_file: None,
            window_size: default_window_size(),
            seed_offset: default_seed_offset(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            backoff: BackoffKind::default(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.agent.window_size, 6);
        assert_eq!(config.agent.seed_offset, 41);
        assert_eq!(config.sync.backoff(), Backoff::Fixed(Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_window_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("thoughtchain.toml");
        std::fs::write(&path, "[agent]\nwindow_size = 0\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::EmptyWindow)));
    }

    #[test]
    fn test_persona_file_overrides_prompt() {
        let dir = TempDir::new().unwrap();
        let persona = dir.path().join("agent.json");
        std::fs::write(&persona, r#"{"system": "You are Ada.", "name": "ada"}"#).unwrap();

        let agent = AgentConfig {
            persona_file: Some(persona),
            ..AgentConfig::default()
        };
        assert_eq!(agent.resolve_system_prompt().unwrap(), "You are Ada.");
    }

    #[test]
    fn test_exponential_backoff_from_config() {
        let sync = SyncConfig {
            poll_interval_ms: 500,
            backoff: BackoffKind::Exponential,
            max_backoff_ms: 4000,
        };
        assert_eq!(
            sync.backoff(),
            Backoff::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_millis(4000),
            }
        );
    }
}
