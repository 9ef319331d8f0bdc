//! # Configuration
//!
//! Archive tunables are managed by [`confique`], layered the usual way:
//!
//! 1. **Environment variables**: `ITEMARCHIVE_SEARCH_CHUNK_SIZE`, etc.
//! 2. **Config file**: `itemarchive.toml`, by default in the OS config directory
//!    (resolved with the `directories` crate).
//! 3. **Compiled defaults**: `#[config(default = ...)]`.
//!
//! ## Available Settings
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `search_chunk_size` | `4096` | Ids fetched per search round during export |
//! | `folder_batch_size` | `500` | Items per folder before entry names get a `!N` batch suffix |
//! | `max_name_length` | `120` | Longest entry leaf name before truncation |
//! | `keep_alive_interval_ms` | `45000` | Minimum time between keep-alive signals |
//! | `export_max_days` | `0` | Longest export time range; `0` disables the check |
//! | `charset` | `UTF-8` | Charset used for entry names |

use confique::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const CONFIG_FILE_NAME: &str = "itemarchive.toml";

#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Number of item ids requested from the store per search round.
    #[config(default = 4096, env = "ITEMARCHIVE_SEARCH_CHUNK_SIZE")]
    pub search_chunk_size: usize,

    /// Items written under one folder before a batch suffix is appended.
    #[config(default = 500, env = "ITEMARCHIVE_FOLDER_BATCH_SIZE")]
    pub folder_batch_size: usize,

    #[config(default = 120, env = "ITEMARCHIVE_MAX_NAME_LENGTH")]
    pub max_name_length: usize,

    #[config(default = 45000, env = "ITEMARCHIVE_KEEP_ALIVE_INTERVAL_MS")]
    pub keep_alive_interval_ms: u64,

    /// Longest allowed export time range in days. Zero means unlimited.
    #[config(default = 0, env = "ITEMARCHIVE_EXPORT_MAX_DAYS")]
    pub export_max_days: u32,

    #[config(default = "UTF-8", env = "ITEMARCHIVE_CHARSET")]
    pub charset: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            search_chunk_size: 4096,
            folder_batch_size: 500,
            max_name_length: 120,
            keep_alive_interval_ms: 45000,
            export_max_days: 0,
            charset: "UTF-8".to_string(),
        }
    }
}

impl ArchiveConfig {
    /// Loads configuration from the environment and an optional file.
    ///
    /// A missing file is not an error; its layer is simply skipped.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ArchiveConfig::builder().env();
        if let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    /// `<config dir>/itemarchive/itemarchive.toml`, when the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "itemarchive")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }
}
