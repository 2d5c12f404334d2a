// Declare modules
pub mod config;
pub mod data;
pub mod db;
pub mod error;
pub mod hooks;
pub mod mock;
pub mod models;
pub mod parse;
pub mod progress;
pub mod resolve;
pub mod youdao;

// Re-export key types for easier use
pub use config::DictConfig;
pub use data::{FileCache, sanitize_key};
pub use db::{KvCache, SqliteKvCache, SqliteWordStore, WordStore};
pub use error::{DictError, Result};
pub use models::{ResolvedEntry, TranslationPayload, WordFilter, WordRecord};
pub use youdao::{HttpTransport, YoudaoTransport};

use hooks::WriteFailureHook;
use log::{debug, info};
use resolve::{ResolvedMemo, select_fields};
use std::sync::{Arc, Mutex};

/// Prefix of aggregated word lists in the fast cache.
pub const FAST_CACHE_PREFIX: &str = "mongoWords:";

/// Fast-cache key for `word`, case preserved.
pub fn fast_cache_key(word: &str) -> String {
    format!("{}{}", FAST_CACHE_PREFIX, word)
}

/// The main dictionary interface.
#[derive(Clone)] // Clone is cheap, everything sits behind an Arc
pub struct Dictionary {
    config: Arc<DictConfig>,
    store: Arc<dyn WordStore>,
    cache: Arc<dyn KvCache>,
    files: FileCache,
    memo: Arc<Mutex<ResolvedMemo>>,
}

impl Dictionary {
    /// Assembles a dictionary from explicit collaborators.
    pub fn new(
        config: Arc<DictConfig>,
        store: Arc<dyn WordStore>,
        cache: Arc<dyn KvCache>,
        transport: Arc<dyn YoudaoTransport>,
    ) -> Self {
        let files = FileCache::new(config.clone(), transport);
        let memo = Arc::new(Mutex::new(ResolvedMemo::new(config.memo_capacity)));
        Dictionary {
            config,
            store,
            cache,
            files,
            memo,
        }
    }

    /// Opens the SQLite datastore and cache named in `config` and talks to
    /// the live Youdao endpoints.
    pub fn open(config: DictConfig) -> Result<Self> {
        info!("Word database: {:?}", config.db_path);
        info!("Cache database: {:?}", config.cache_db_path);
        info!("File cache root: {:?}", config.file_cache_root);
        let store = SqliteWordStore::open(&config.db_path)?;
        let cache = SqliteKvCache::open(&config.cache_db_path)?;
        let transport = HttpTransport::new()?;
        Ok(Self::new(
            Arc::new(config),
            Arc::new(store),
            Arc::new(cache),
            Arc::new(transport),
        ))
    }

    /// Routes file-cache write failures to `hook`.
    pub fn with_write_failure_hook(mut self, hook: WriteFailureHook) -> Self {
        self.files = self.files.with_write_failure_hook(hook);
        self
    }

    // --- Query Methods ---

    /// All records tagged with a course or chapter code.
    pub async fn list_by_code(&self, code: i64) -> Result<Vec<WordRecord>> {
        debug!("list_by_code: code={}", code);
        self.store.read(&WordFilter::Code(code))
    }

    /// Every record for `word`: datastore records, plus one record
    /// synthesized from the translation payload when there is one.
    ///
    /// The merged list is cached; a cached list is returned as-is.
    pub async fn resolve_word(&self, word: &str) -> Result<Vec<WordRecord>> {
        let key = fast_cache_key(word);
        if let Some(cached) = self.cache.get(&key)? {
            debug!("resolve_word: fast cache hit for '{}'", word);
            return Ok(serde_json::from_str(&cached)?);
        }

        let mut records = self.store.read(&WordFilter::Word(word.to_string()))?;
        let payload = self.files.fetch_translation(word).await?;
        if let Some(record) = payload
            .as_ref()
            .and_then(|p| WordRecord::synthesized(word, p))
        {
            debug!("resolve_word: appending translation record for '{}'", word);
            records.push(record);
        }

        self.cache
            .set(&key, &serde_json::to_string(&records)?, self.config.cache_ttl)?;
        Ok(records)
    }

    /// Translation payload for `word`; see [`FileCache::fetch_translation`].
    pub async fn fetch_translation(&self, word: &str) -> Result<Option<TranslationPayload>> {
        self.files.fetch_translation(word).await
    }

    /// Pronunciation audio for `word`; see [`FileCache::fetch_speech`].
    pub async fn fetch_speech(&self, word: &str) -> Result<Vec<u8>> {
        self.files.fetch_speech(word).await
    }

    /// Waits for background file-cache saves; see [`FileCache::flush`].
    pub async fn flush(&self) -> Result<usize> {
        self.files.flush().await
    }

    /// Best phonetic, part of speech, gloss and audio URL for `word`.
    ///
    /// The word is lowercased unless `preserve_case` is set. Results are
    /// memoized per lookup key.
    pub async fn resolve_best_fields(&self, word: &str, preserve_case: bool) -> Result<ResolvedEntry> {
        let key = if preserve_case {
            word.to_string()
        } else {
            word.to_lowercase()
        };

        if let Some(entry) = self.memo_get(&key)? {
            debug!("resolve_best_fields: memo hit for '{}'", key);
            return Ok(entry);
        }

        let records = self.resolve_word(&key).await?;
        let selection = select_fields(&records);
        let curated_audio = if selection.audio_path.is_none() {
            self.files.find_curated_audio(&key, word).await
        } else {
            None
        };
        let entry = selection.into_entry(curated_audio, &self.config.audio_url_prefix);

        self.memo
            .lock()
            .map_err(|_| DictError::Internal("Mutex poisoned".to_string()))?
            .insert(key, entry.clone());
        Ok(entry)
    }

    fn memo_get(&self, key: &str) -> Result<Option<ResolvedEntry>> {
        let mut memo = self
            .memo
            .lock()
            .map_err(|_| DictError::Internal("Mutex poisoned".to_string()))?;
        Ok(memo.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    struct CountingStore {
        inner: SqliteWordStore,
        reads: AtomicUsize,
    }

    impl WordStore for CountingStore {
        fn read(&self, filter: &WordFilter) -> Result<Vec<WordRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(filter)
        }
    }

    struct CountingCache {
        inner: SqliteKvCache,
        gets: AtomicUsize,
    }

    impl KvCache for CountingCache {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
            self.inner.set(key, value, ttl)
        }
    }

    struct Fixture {
        dict: Dictionary,
        store: Arc<CountingStore>,
        cache: Arc<CountingCache>,
        mock: Arc<MockTransport>,
        temp_dir: TempDir,
    }

    fn fixture(records: &[WordRecord], mock: MockTransport) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let inner = SqliteWordStore::open_in_memory().unwrap();
        inner.import_records(records, None).unwrap();
        let store = Arc::new(CountingStore {
            inner,
            reads: AtomicUsize::new(0),
        });
        let cache = Arc::new(CountingCache {
            inner: SqliteKvCache::open_in_memory().unwrap(),
            gets: AtomicUsize::new(0),
        });
        let mock = Arc::new(mock);
        let config = DictConfig::default()
            .with_credentials("key", "secret")
            .with_file_cache_root(temp_dir.path());
        let dict = Dictionary::new(Arc::new(config), store.clone(), cache.clone(), mock.clone());
        Fixture {
            dict,
            store,
            cache,
            mock,
            temp_dir,
        }
    }

    fn record(word: &str, codes: &[i64], yb: Option<&str>, cx: Option<&str>, sy: Option<&str>) -> WordRecord {
        WordRecord {
            codes: codes.to_vec(),
            word: word.to_string(),
            phonetic: yb.map(str::to_string),
            part_of_speech: cx.map(str::to_string),
            gloss: sy.map(str::to_string),
            ..Default::default()
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[tokio::test]
    async fn test_list_by_code_passes_through() {
        let fx = fixture(
            &[
                record("a", &[4649, 4726], Some("[ə]"), None, None),
                record("an", &[4726], None, None, None),
                record("the", &[4649], None, None, None),
            ],
            MockTransport::new(),
        );
        let words: Vec<_> = fx
            .dict
            .list_by_code(4726)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.word)
            .collect();
        assert_eq!(words, vec!["a", "an"]);
        assert_eq!(fx.mock.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_word_caches_empty_result() {
        let fx = fixture(&[], MockTransport::new());
        let records = fx.dict.resolve_word("qwzx").await.unwrap();
        assert!(records.is_empty());
        assert_eq!(
            fx.cache.inner.get("mongoWords:qwzx").unwrap().as_deref(),
            Some("[]")
        );

        // Second lookup is served from the fast cache
        assert!(fx.dict.resolve_word("qwzx").await.unwrap().is_empty());
        assert_eq!(fx.store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(fx.mock.translate_calls(), 1);
    }

    #[tokio::test]
    async fn test_resolve_word_appends_translation_record() {
        let mock = MockTransport::new().with_translation(
            "cat",
            json!({
                "errorCode": "0",
                "translation": ["猫"],
                "basic": {"uk-phonetic": "kæt", "us-phonetic": "kæt", "explains": ["n. 猫", "n. 猫科动物"]}
            }),
        );
        let fx = fixture(&[record("cat", &[4649], Some("[kæt]"), Some("n."), Some("猫"))], mock);

        let records = fx.dict.resolve_word("cat").await.unwrap();
        assert_eq!(records.len(), 2);
        let synth = &records[1];
        assert_eq!(synth.codes, vec![models::SYNTHESIZED_CODE]);
        assert_eq!(synth.uk_phonetic.as_deref(), Some("[kæt]"));
        assert_eq!(synth.gloss.as_deref(), Some("n. 猫\nn. 猫科动物"));

        let cached: Vec<WordRecord> =
            serde_json::from_str(&fx.cache.inner.get("mongoWords:cat").unwrap().unwrap()).unwrap();
        assert_eq!(cached, records);
    }

    #[tokio::test]
    async fn test_resolve_word_trusts_cache_verbatim() {
        let fx = fixture(&[record("zebra", &[2], Some("[ˈziːbrə]"), None, None)], MockTransport::new());
        fx.cache
            .inner
            .set(
                "mongoWords:zebra",
                r#"[{"c":[9],"w":"zebra","yb":"[ˈzebrə]"}]"#,
                Duration::from_secs(60),
            )
            .unwrap();
        let records = fx.dict.resolve_word("zebra").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phonetic.as_deref(), Some("[ˈzebrə]"));
        assert_eq!(fx.store.reads.load(Ordering::SeqCst), 0);
        assert_eq!(fx.mock.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_word_malformed_cache_is_an_error() {
        let fx = fixture(&[], MockTransport::new());
        fx.cache
            .inner
            .set("mongoWords:bad", "not json", Duration::from_secs(60))
            .unwrap();
        let result = fx.dict.resolve_word("bad").await;
        assert!(matches!(result, Err(DictError::Json(_))));
    }

    #[tokio::test]
    async fn test_resolve_word_keeps_case_in_cache_key() {
        let fx = fixture(&[], MockTransport::new());
        fx.dict.resolve_word("Apple").await.unwrap();
        assert!(fx.cache.inner.get("mongoWords:Apple").unwrap().is_some());
        assert!(fx.cache.inner.get("mongoWords:apple").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_best_fields_authoritative_record() {
        let mut textbook = record("a", &[1], Some("[eɪ]"), Some("art."), Some("一（个）"));
        textbook.audio_path = Some("/p/a.mp3".to_string());
        let fx = fixture(
            &[
                record("a", &[2], Some("[ə]"), Some("n."), Some("字母A")),
                record("a", &[3], Some("[ə]"), Some("n."), Some("字母A")),
                textbook,
            ],
            MockTransport::new(),
        );
        let entry = fx.dict.resolve_best_fields("a", false).await.unwrap();
        assert_eq!(
            entry.as_array(),
            ["[eɪ]", "art.", "一（个）", "/dict/wyaudio/p/a.mp3"]
        );
    }

    #[tokio::test]
    async fn test_best_fields_majority_scenario() {
        let fx = fixture(
            &[
                record("a", &[2], Some("[ɑ]"), Some("art."), None),
                record("a", &[3], Some("[ɑ]"), Some("conj."), None),
            ],
            MockTransport::new(),
        );
        let entry = fx.dict.resolve_best_fields("a", false).await.unwrap();
        assert_eq!(entry.phonetic, "[ɑ]");
        assert_eq!(entry.part_of_speech, "art.");
        assert_eq!(entry.gloss, "");
        assert_eq!(entry.audio_url, "");
    }

    #[tokio::test]
    async fn test_best_fields_memoized_per_lowercase_key() {
        let fx = fixture(&[record("apple", &[2], Some("[ˈæpl]"), Some("n."), Some("苹果"))], MockTransport::new());

        let first = fx.dict.resolve_best_fields("Apple", false).await.unwrap();
        let second = fx.dict.resolve_best_fields("Apple", false).await.unwrap();
        let third = fx.dict.resolve_best_fields("APPLE", false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(first.gloss, "苹果");
        assert_eq!(fx.cache.gets.load(Ordering::SeqCst), 1);
        assert_eq!(fx.store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(fx.mock.queries(), vec!["apple"]);
    }

    #[tokio::test]
    async fn test_best_fields_preserve_case() {
        let fx = fixture(
            &[
                record("apple", &[2], Some("[ˈæpl]"), None, None),
                record("Apple", &[3], Some("[ˈæpəl]"), Some("n."), Some("苹果公司")),
            ],
            MockTransport::new(),
        );
        let entry = fx.dict.resolve_best_fields("Apple", true).await.unwrap();
        assert_eq!(entry.gloss, "苹果公司");
        assert!(fx.cache.inner.get("mongoWords:Apple").unwrap().is_some());
        assert!(fx.cache.inner.get("mongoWords:apple").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_best_fields_probes_curated_audio() {
        let fx = fixture(&[record("monday", &[2], None, Some("n."), Some("星期一"))], MockTransport::new());
        touch(&fx.temp_dir.path().join("wyaudio").join("sh").join("monday.mp3"));
        touch(&fx.temp_dir.path().join("wyaudio").join("jh").join("Monday.mp3"));

        let entry = fx.dict.resolve_best_fields("Monday", false).await.unwrap();
        assert_eq!(entry.audio_url, "/dict/wyaudio/jh/Monday.mp3");
    }

    #[tokio::test]
    async fn test_best_fields_from_translation_only() {
        let mock = MockTransport::new().with_translation(
            "cat",
            json!({"errorCode": "0", "basic": {"uk-phonetic": "kæt", "explains": ["n. 猫"]}}),
        );
        let fx = fixture(&[], mock);
        let entry = fx.dict.resolve_best_fields("cat", false).await.unwrap();
        assert_eq!(entry.phonetic, "[kæt]");
        assert_eq!(entry.part_of_speech, "");
        assert_eq!(entry.gloss, "n. 猫");
        assert!(fx.temp_dir.path().join("dict").join("cat.json").exists());
    }

    #[tokio::test]
    async fn test_fetch_speech_through_dictionary() {
        let fx = fixture(&[], MockTransport::new().with_audio("cat", b"ID3".to_vec()));
        assert_eq!(fx.dict.fetch_speech("cat").await.unwrap(), b"ID3".to_vec());
        assert_eq!(fx.mock.tts_calls(), 1);
        assert_eq!(fx.dict.flush().await.unwrap(), 1);
        let saved = fx.temp_dir.path().join("wyaudio").join("youdao").join("cat.mp3");
        assert_eq!(fs::read(saved).unwrap(), b"ID3".to_vec());
    }
}
