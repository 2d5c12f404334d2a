//! Offline transport for tests and demos.
//!
//! Replies come from canned maps keyed by the request's `q` field; every
//! call is counted so callers can assert when the network was (not) used.
//!
//! # Example
//!
//! ```ignore
//! use wordbook_rs::mock::MockTransport;
//! use serde_json::json;
//!
//! let mock = MockTransport::new()
//!     .with_translation("cat", json!({"errorCode": "0", "translation": ["猫"]}))
//!     .with_audio("cat", b"ID3".to_vec());
//! ```

use crate::error::{DictError, Result};
use crate::youdao::{TranslateRequest, TtsRequest, YoudaoTransport};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Error code the API returns for queries it cannot translate.
const UNKNOWN_QUERY_CODE: &str = "302";

#[derive(Debug, Default)]
pub struct MockTransport {
    translations: HashMap<String, Value>,
    audio: HashMap<String, Vec<u8>>,
    /// When set, every call fails with this message.
    failure: Option<String>,
    translate_calls: AtomicUsize,
    tts_calls: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_translation(mut self, query: &str, response: Value) -> Self {
        self.translations.insert(query.to_string(), response);
        self
    }

    pub fn with_audio(mut self, query: &str, bytes: Vec<u8>) -> Self {
        self.audio.insert(query.to_string(), bytes);
        self
    }

    /// Simulates an unreachable upstream.
    pub fn failing(message: &str) -> Self {
        MockTransport {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn tts_calls(&self) -> usize {
        self.tts_calls.load(Ordering::SeqCst)
    }

    /// Every `q` seen so far, in call order.
    pub fn queries(&self) -> Vec<String> {
        self.queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    fn record(&self, query: &str) {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
    }
}

#[async_trait]
impl YoudaoTransport for MockTransport {
    async fn translate(&self, request: &TranslateRequest) -> Result<Value> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        self.record(&request.q);
        if let Some(message) = &self.failure {
            return Err(DictError::Upstream(message.clone()));
        }
        Ok(self
            .translations
            .get(&request.q)
            .cloned()
            .unwrap_or_else(|| json!({ "errorCode": UNKNOWN_QUERY_CODE })))
    }

    async fn synthesize(&self, request: &TtsRequest) -> Result<Vec<u8>> {
        self.tts_calls.fetch_add(1, Ordering::SeqCst);
        self.record(&request.q);
        if let Some(message) = &self.failure {
            return Err(DictError::Upstream(message.clone()));
        }
        self.audio
            .get(&request.q)
            .cloned()
            .ok_or_else(|| DictError::Upstream(format!("no audio for '{}'", request.q)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youdao::current_salt;

    #[tokio::test]
    async fn test_canned_and_unknown_replies() {
        let mock = MockTransport::new()
            .with_translation("cat", json!({"errorCode": "0"}))
            .with_audio("cat", vec![1, 2, 3]);

        let hit = mock
            .translate(&TranslateRequest::signed("k", "s", "cat", current_salt()))
            .await
            .unwrap();
        assert_eq!(hit["errorCode"], "0");

        let miss = mock
            .translate(&TranslateRequest::signed("k", "s", "dog", current_salt()))
            .await
            .unwrap();
        assert_eq!(miss["errorCode"], UNKNOWN_QUERY_CODE);

        let audio = mock
            .synthesize(&TtsRequest::signed("k", "s", "cat", current_salt()))
            .await
            .unwrap();
        assert_eq!(audio, vec![1, 2, 3]);

        assert_eq!(mock.translate_calls(), 2);
        assert_eq!(mock.tts_calls(), 1);
        assert_eq!(mock.queries(), vec!["cat", "dog", "cat"]);
    }

    #[tokio::test]
    async fn test_failing_transport() {
        let mock = MockTransport::failing("connection reset");
        let err = mock
            .synthesize(&TtsRequest::signed("k", "s", "cat", current_salt()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
    }
}
