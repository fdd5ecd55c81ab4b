use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Unified config (figment-deserialized from defaults / tidepool.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   tidepool.toml:   [chat]
//                    max_message_bytes = 8000
//
//   env var:         TIDEPOOL_CHAT__MAX_MESSAGE_BYTES=8000
//                    (double underscore = section nesting)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub database: DatabaseFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Database tunables (lives under `[database]` in tidepool.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseFileConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseFileConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Conversation tunables (lives under `[chat]` in tidepool.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    /// Upper bound on a message body, matching the storage column bound.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// How many trailing transcript turns are handed to the AI responder.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
            history_window: default_history_window(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tidepool.db")
}
fn default_max_connections() -> u32 {
    5
}
fn default_max_message_bytes() -> usize {
    8_000
}
fn default_history_window() -> usize {
    5
}

/// Build a figment that layers: struct defaults → tidepool.toml → TIDEPOOL_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `TIDEPOOL_DATABASE__PATH=/var/lib/tidepool.db`  →  `database.path`
///   `TIDEPOOL_CHAT__HISTORY_WINDOW=10`              →  `chat.history_window`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("tidepool.toml")))
        .merge(Env::prefixed("TIDEPOOL_").split("__"))
}

/// Resolved runtime configuration consumed by [`crate::db::Database`] and
/// [`crate::service::ChatService`].
#[derive(Clone, Debug)]
pub struct TidepoolConfig {
    pub db_path: PathBuf,
    pub db_max_connections: u32,
    pub max_message_bytes: usize,
    pub history_window: usize,
}

impl TidepoolConfig {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let file: FileConfig = load_config(data_dir)
            .extract()
            .context("Failed to load tidepool configuration")?;
        Ok(Self::from_file(&file))
    }

    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            db_path: fc.database.path.clone(),
            db_max_connections: fc.database.max_connections,
            max_message_bytes: fc.chat.max_message_bytes,
            history_window: fc.chat.history_window,
        }
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }
}

impl Default for TidepoolConfig {
    fn default() -> Self {
        Self::from_file(&FileConfig::default())
    }
}
