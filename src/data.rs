//! On-disk dictionary cache.
//!
//! Layout under the file-cache root:
//!
//! ```text
//! dict/<key>.json            trimmed translation payloads
//! wyaudio/youdao/<key>.mp3   synthesized speech
//! wyaudio/{p,jh,sh}/<w>.mp3  curated recordings, probed in that order
//! ```
//!
//! `<key>` is the word with `/`, `\` and `%` replaced by `,`.

use crate::config::DictConfig;
use crate::error::{DictError, Result};
use crate::hooks::{WriteFailureHook, log_write_failure};
use crate::models::TranslationPayload;
use crate::youdao::{TranslateRequest, TtsRequest, YoudaoTransport, current_salt};
use log::{debug, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;

const DICT_SUBDIR: &str = "dict";
const AUDIO_SUBDIR: &str = "wyaudio";
const TTS_AUDIO_SUBDIR: &str = "youdao";
/// Curated recording sources, highest priority first.
pub const CURATED_AUDIO_DIRS: [&str; 3] = ["p", "jh", "sh"];

/// Makes a word safe to use as a file name.
pub fn sanitize_key(word: &str) -> String {
    word.chars()
        .map(|c| match c {
            '/' | '\\' | '%' => ',',
            other => other,
        })
        .collect()
}

/// Writes `bytes` to `path`, creating intermediate directories.
async fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

/// Translation and speech fetchers backed by the file cache.
#[derive(Clone)]
pub struct FileCache {
    config: Arc<DictConfig>,
    transport: Arc<dyn YoudaoTransport>,
    on_write_failure: WriteFailureHook,
    /// Background saves not yet awaited by `flush`.
    pending_saves: Arc<Mutex<JoinSet<()>>>,
}

impl FileCache {
    pub fn new(config: Arc<DictConfig>, transport: Arc<dyn YoudaoTransport>) -> Self {
        FileCache {
            config,
            transport,
            on_write_failure: log_write_failure(),
            pending_saves: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Replaces the default (logging) write-failure hook.
    pub fn with_write_failure_hook(mut self, hook: WriteFailureHook) -> Self {
        self.on_write_failure = hook;
        self
    }

    pub fn root(&self) -> &Path {
        &self.config.file_cache_root
    }

    pub fn translation_path(&self, key: &str) -> PathBuf {
        self.root().join(DICT_SUBDIR).join(format!("{}.json", key))
    }

    pub fn speech_path(&self, key: &str) -> PathBuf {
        self.root()
            .join(AUDIO_SUBDIR)
            .join(TTS_AUDIO_SUBDIR)
            .join(format!("{}.mp3", key))
    }

    /// Returns the translation payload for `word`, or `None` when the
    /// upstream has nothing usable.
    ///
    /// A saved payload is preferred. Otherwise the API is called and a
    /// successful, trimmed response is saved before it is returned.
    pub async fn fetch_translation(&self, word: &str) -> Result<Option<TranslationPayload>> {
        let key = sanitize_key(word);
        let path = self.translation_path(&key);

        match tokio::fs::read_to_string(&path).await {
            Ok(data) => {
                debug!("Translation for '{}' served from {:?}", key, path);
                let value: serde_json::Value = serde_json::from_str(&data)?;
                return Ok(TranslationPayload::from_value(value));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not read {:?}, asking upstream: {}", path, e),
        }

        let request = TranslateRequest::signed(
            &self.config.app_key,
            &self.config.app_secret,
            &key,
            current_salt(),
        );
        let value = match self.transport.translate(&request).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Translation request for '{}' failed: {}", key, e);
                return Ok(None);
            }
        };

        let mut payload = match TranslationPayload::from_value(value) {
            Some(payload) if payload.is_success() => payload,
            Some(payload) => {
                debug!(
                    "Translation for '{}' rejected with errorCode {:?}",
                    key,
                    payload.error_code()
                );
                return Ok(None);
            }
            None => {
                warn!("Translation response for '{}' is not a JSON object", key);
                return Ok(None);
            }
        };
        payload.trim();

        let body = serde_json::to_vec(&payload)?;
        match write_file(&path, &body).await {
            Ok(()) => info!("Saved translation for '{}' to {:?}", key, path),
            Err(e) => (self.on_write_failure)(&path, &e),
        }
        Ok(Some(payload))
    }

    /// Returns pronunciation audio for `word`.
    ///
    /// Saved audio is tried with the key as given, then lowercased. On a miss
    /// the TTS API is called and the bytes are saved in the background.
    pub async fn fetch_speech(&self, word: &str) -> Result<Vec<u8>> {
        let key = sanitize_key(word);
        let exact = self.speech_path(&key);
        let lower = self.speech_path(&key.to_lowercase());

        for candidate in [&exact, &lower] {
            if tokio::fs::try_exists(candidate).await.unwrap_or(false) {
                debug!("Speech for '{}' served from {:?}", key, candidate);
                return Ok(tokio::fs::read(candidate).await?);
            }
        }

        let request = TtsRequest::signed(
            &self.config.app_key,
            &self.config.app_secret,
            &key,
            current_salt(),
        );
        let audio = self
            .transport
            .synthesize(&request)
            .await
            .map_err(|e| DictError::TtsUnavailable(e.to_string()))?;

        let bytes = audio.clone();
        let hook = self.on_write_failure.clone();
        match self.pending_saves.lock() {
            Ok(mut saves) => {
                // Drop the results of saves that already finished
                while saves.try_join_next().is_some() {}
                saves.spawn(async move {
                    match write_file(&exact, &bytes).await {
                        Ok(()) => debug!("Saved speech to {:?}", exact),
                        Err(e) => hook(&exact, &e),
                    }
                });
            }
            Err(_) => warn!("Save queue poisoned, not saving speech for '{}'", key),
        }

        Ok(audio)
    }

    /// Waits for every background save started so far.
    ///
    /// Call before the runtime shuts down or the last clone of the cache is
    /// dropped; saves still running at that point are lost.
    pub async fn flush(&self) -> Result<usize> {
        let mut saves = {
            let mut pending = self
                .pending_saves
                .lock()
                .map_err(|_| DictError::Internal("Mutex poisoned".to_string()))?;
            std::mem::take(&mut *pending)
        };
        let mut completed = 0;
        while let Some(result) = saves.join_next().await {
            match result {
                Ok(()) => completed += 1,
                Err(e) => warn!("Background save task failed: {}", e),
            }
        }
        debug!("Flushed {} background saves.", completed);
        Ok(completed)
    }

    /// Looks for a curated recording of `word` (then `src_word`) and returns
    /// its path relative to the audio tree, e.g. `/jh/a.mp3`.
    pub async fn find_curated_audio(&self, word: &str, src_word: &str) -> Option<String> {
        let audio_root = self.root().join(AUDIO_SUBDIR);
        for dir in CURATED_AUDIO_DIRS {
            for name in [word, src_word] {
                let file_name = format!("{}.mp3", name);
                let candidate = audio_root.join(dir).join(&file_name);
                if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                    return Some(format!("/{}/{}", dir, file_name));
                }
            }
        }
        None
    }
}
