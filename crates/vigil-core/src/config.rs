use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Misfire grace window in seconds. A fire that is this late still executes
/// once with its original scheduled-for; beyond it the occurrence is dropped.
pub const DEFAULT_MISFIRE_GRACE_SECS: u64 = 300;

/// Top-level config (vigil.toml + VIGIL_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

impl Default for VigilConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum lateness, in seconds, after which a misfired occurrence is
    /// dropped instead of executed. Override: VIGIL_SCHEDULER__MISFIRE_GRACE_SECS
    #[serde(default = "default_misfire_grace")]
    pub misfire_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            misfire_grace_secs: DEFAULT_MISFIRE_GRACE_SECS,
        }
    }
}

/// Which speech backend the delivery worker owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechBackend {
    /// Spawn an external synthesis program per delivery (espeak-ng, say, …).
    Command,
    /// Log the text instead of speaking, for machines without a synthesizer.
    Null,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_backend")]
    pub backend: SpeechBackend,
    /// Synthesis program for the `command` backend. The delivery text is
    /// appended as the final argument.
    #[serde(default = "default_speech_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: default_speech_backend(),
            program: default_speech_program(),
            args: Vec::new(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_misfire_grace() -> u64 {
    DEFAULT_MISFIRE_GRACE_SECS
}
fn default_speech_backend() -> SpeechBackend {
    SpeechBackend::Null
}
fn default_speech_program() -> String {
    "espeak-ng".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vigil/vigil.db", home)
}

impl VigilConfig {
    /// Load config from a TOML file with VIGIL_* env var overrides. `__`
    /// separates the section from the field, so field names may themselves
    /// contain underscores (VIGIL_SCHEDULER__MISFIRE_GRACE_SECS).
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.vigil/vigil.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: VigilConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .map_err(|e| crate::error::VigilError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.vigil/vigil.toml", home)
}
