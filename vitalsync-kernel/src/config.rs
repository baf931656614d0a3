use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::sync::{DEFAULT_BUFFER, DEFAULT_CHANNEL_NAME};

pub const CONFIG_ENV: &str = "VITALSYNC_CONFIG";
pub const MODE_ENV: &str = "VITALSYNC_MODE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown surface mode '{0}' (expected wearable or companion)")]
    InvalidMode(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceMode {
    Wearable,
    Companion,
}

impl FromStr for SurfaceMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wearable" => Ok(SurfaceMode::Wearable),
            "companion" => Ok(SurfaceMode::Companion),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for SurfaceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceMode::Wearable => write!(f, "wearable"),
            SurfaceMode::Companion => write!(f, "companion"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub mode: SurfaceMode,
    pub channel: String,
    pub tick_interval_ms: u64,
    pub history_capacity: usize,
    pub bus_buffer: usize,
    /// graine du simulateur pour des démos reproductibles
    pub simulator_seed: Option<u64>,
    pub http: HttpConf,
    pub analysis: AnalysisConf,
    pub mqtt: Option<MqttConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String, // ex: "0.0.0.0:8080"
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConf {
    pub endpoint: String,
    pub model: String,
    pub window: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mode: SurfaceMode::Companion,
            channel: DEFAULT_CHANNEL_NAME.into(),
            tick_interval_ms: 2_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            bus_buffer: DEFAULT_BUFFER,
            simulator_seed: None,
            http: HttpConf::default(),
            analysis: AnalysisConf::default(),
            mqtt: None,
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into() }
    }
}

impl Default for AnalysisConf {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com".into(),
            model: "gemini-2.5-flash".into(),
            window: 20,
        }
    }
}

pub fn parse_config(txt: &str) -> Result<KernelConfig, ConfigError> {
    if txt.trim().is_empty() {
        return Ok(KernelConfig::default());
    }
    Ok(serde_yaml::from_str(txt)?)
}

/// VITALSYNC_MODE l'emporte sur le fichier
pub fn apply_env_overrides(cfg: &mut KernelConfig, mode: Option<&str>) {
    if let Some(raw) = mode {
        match raw.parse::<SurfaceMode>() {
            Ok(mode) => cfg.mode = mode,
            Err(e) => tracing::warn!("[config] {e}, keeping {}", cfg.mode),
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "vitalsync.yaml".into());
    let mut cfg = load_config_file(Path::new(&path)).await;
    apply_env_overrides(&mut cfg, std::env::var(MODE_ENV).ok().as_deref());
    cfg
}

/// Fichier absent, illisible ou invalide : config par défaut, jamais d'erreur
pub async fn load_config_file(path: &Path) -> KernelConfig {
    if !path.exists() {
        tracing::info!("[config] pas de {}, usage config par défaut", path.display());
        return KernelConfig::default();
    }

    let txt = match fs::read_to_string(path).await {
        Ok(txt) => txt,
        Err(e) => {
            tracing::error!("[config] lecture impossible ({}): {e}", path.display());
            return KernelConfig::default();
        }
    };
    parse_config(&txt).unwrap_or_else(|e| {
        tracing::error!("[config] config invalide ({}): {e}", path.display());
        KernelConfig::default()
    })
}
