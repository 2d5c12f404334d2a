//! Runtime configuration shared by every component.
//!
//! A `DictConfig` is built once at startup and handed to the components by
//! `Arc`. Nothing in the crate reads configuration from global state.

use crate::error::{DictError, Result};
use directories_next::ProjectDirs;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Subdirectory name within user's data directory
pub const WORDBOOK_SUBDIR: &str = "wordbook-rs";
/// Lifetime of an aggregated word list in the fast cache.
pub const XXL_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// URL prefix under which the audio tree is served.
pub const DEFAULT_AUDIO_URL_PREFIX: &str = "/dict/wyaudio";
pub const DEFAULT_MEMO_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct DictConfig {
    /// SQLite file holding the word collection.
    pub db_path: PathBuf,
    /// SQLite file backing the fast key-value cache.
    pub cache_db_path: PathBuf,
    /// Root of the on-disk dictionary cache (`dict/`, `wyaudio/`).
    pub file_cache_root: PathBuf,
    pub app_key: String,
    pub app_secret: String,
    pub audio_url_prefix: String,
    /// Maximum number of resolved entries kept in memory. Zero disables eviction.
    pub memo_capacity: usize,
    pub cache_ttl: Duration,
}

impl Default for DictConfig {
    fn default() -> Self {
        DictConfig {
            db_path: PathBuf::from("wordbook.db"),
            cache_db_path: PathBuf::from("wordbook-cache.db"),
            file_cache_root: PathBuf::from("dict"),
            app_key: String::new(),
            app_secret: String::new(),
            audio_url_prefix: DEFAULT_AUDIO_URL_PREFIX.to_string(),
            memo_capacity: DEFAULT_MEMO_CAPACITY,
            cache_ttl: XXL_TTL,
        }
    }
}

impl DictConfig {
    /// Configuration rooted in the platform data directory.
    /// Creates the directory if it doesn't exist.
    pub fn with_defaults() -> Result<Self> {
        let data_dir = get_data_dir()?;
        Ok(DictConfig {
            db_path: data_dir.join("wordbook.db"),
            cache_db_path: data_dir.join("wordbook-cache.db"),
            file_cache_root: data_dir.join("dict"),
            ..Default::default()
        })
    }

    pub fn with_credentials(mut self, app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        self.app_key = app_key.into();
        self.app_secret = app_secret.into();
        self
    }

    pub fn with_file_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.file_cache_root = root.into();
        self
    }
}

/// Gets the project's data directory path.
/// Creates the directory if it doesn't exist.
pub fn get_data_dir() -> Result<PathBuf> {
    let proj_dirs =
        ProjectDirs::from("org", "WordbookRs", WORDBOOK_SUBDIR).ok_or(DictError::DataDirNotFound)?;
    let data_dir = proj_dirs.data_dir().to_path_buf();
    fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}
