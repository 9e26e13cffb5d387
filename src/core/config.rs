//! Engine configuration loaded from `reelscore.toml`.
//!
//! Every field has a default; a missing file means defaults. The file is
//! looked up in the working directory unless an explicit path is given.

use crate::core::error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "reelscore.toml";

fn default_data_dir() -> PathBuf {
    PathBuf::from(".reelscore")
}

fn default_viewer_review_xp() -> i64 {
    5
}

fn default_critic_review_xp() -> i64 {
    15
}

fn default_drain_batch() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Store root directory holding catalog.db and the audit log.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Flat XP granted per viewer review.
    #[serde(default = "default_viewer_review_xp")]
    pub viewer_review_xp: i64,
    /// Flat XP granted per critic review. Larger than the viewer amount.
    #[serde(default = "default_critic_review_xp")]
    pub critic_review_xp: i64,
    /// Maximum outbox events delivered per drain pass.
    #[serde(default = "default_drain_batch")]
    pub drain_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            viewer_review_xp: default_viewer_review_xp(),
            critic_review_xp: default_critic_review_xp(),
            drain_batch: default_drain_batch(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, error::EngineError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(error::EngineError::IoError)?;
        toml::from_str(&content).map_err(|e| error::EngineError::ValidationError(e.to_string()))
    }
}
