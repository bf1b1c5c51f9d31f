use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Listen address for the HTTP surface.
    pub bind_addr: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the descriptor sealing key (generated on first run).
    pub seal_key_path: PathBuf,
    /// Optional TOML file overriding the threshold policy.
    pub thresholds_path: Option<PathBuf>,
    /// Timeout in seconds for one extraction or store operation.
    pub op_timeout_secs: u64,
    /// Dimension cap applied to incoming images.
    pub max_image_width: u32,
    pub max_image_height: u32,
    /// JPEG quality for re-encoded captures.
    pub jpeg_quality: u8,
    /// Default result-count limit for search calls.
    pub search_limit: usize,
}

impl Config {
    /// Load configuration from `LINEUP_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("lineup");

        let model_dir = std::env::var("LINEUP_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        let db_path = std::env::var("LINEUP_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("descriptors.db"));

        let seal_key_path = std::env::var("LINEUP_SEAL_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("seal.key"));

        Self {
            bind_addr: std::env::var("LINEUP_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8187".to_string()),
            model_dir,
            db_path,
            seal_key_path,
            thresholds_path: std::env::var("LINEUP_THRESHOLDS_PATH").ok().map(PathBuf::from),
            op_timeout_secs: env_u64("LINEUP_OP_TIMEOUT_SECS", 10),
            max_image_width: env_u32("LINEUP_MAX_IMAGE_WIDTH", 800),
            max_image_height: env_u32("LINEUP_MAX_IMAGE_HEIGHT", 600),
            jpeg_quality: env_u32("LINEUP_JPEG_QUALITY", 80) as u8,
            search_limit: env_usize("LINEUP_SEARCH_LIMIT", 5),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("scrfd_2.5g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the 128-dim embedding model.
    pub fn embedder_model_path(&self) -> String {
        self.model_dir
            .join("mobilefacenet.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

/// Per-flow similarity thresholds.
///
/// Different call sites carry different risk: sign-in verification,
/// watchlist identification and the enrollment duplicate guard each get
/// their own value, and requests may override per call. There is
/// deliberately no single global threshold.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ThresholdPolicy {
    pub login: f32,
    pub watchlist: f32,
    pub duplicate: f32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            login: 0.6,
            watchlist: 0.7,
            duplicate: 0.9,
        }
    }
}

impl ThresholdPolicy {
    /// Load the policy from a TOML file. A missing path or an unreadable
    /// file falls back to the defaults with a warning.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(text) => match toml::from_str(&text) {
                Ok(policy) => policy,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "bad threshold policy file; using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "threshold policy file unreadable; using defaults");
                Self::default()
            }
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
