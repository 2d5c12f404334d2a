//! Youdao open-API transport.
//!
//! Both endpoints take a form-encoded POST signed with
//! `md5(appKey + query + salt + appSecret)`, where `salt` is the current
//! Unix time in milliseconds.
//!
//! # API Reference
//! - Translation: https://openapi.youdao.com/api
//! - Text to speech: https://openapi.youdao.com/ttsapi

use crate::error::{DictError, Result};
use async_trait::async_trait;
use log::debug;
use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const TRANSLATE_URL: &str = "https://openapi.youdao.com/api";
pub const TTS_URL: &str = "https://openapi.youdao.com/ttsapi";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Computes the request signature.
pub fn sign(app_key: &str, query: &str, salt: &str, app_secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(app_key.as_bytes());
    hasher.update(query.as_bytes());
    hasher.update(salt.as_bytes());
    hasher.update(app_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Current Unix epoch milliseconds as a string.
pub fn current_salt() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
        .to_string()
}

/// Form fields of a translation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslateRequest {
    pub q: String,
    pub from: String,
    pub to: String,
    pub sign: String,
    pub salt: String,
    #[serde(rename = "appKey")]
    pub app_key: String,
}

impl TranslateRequest {
    /// English to simplified Chinese, signed with the given credentials.
    pub fn signed(app_key: &str, app_secret: &str, query: &str, salt: String) -> Self {
        TranslateRequest {
            q: query.to_string(),
            from: "EN".to_string(),
            to: "zh-CHS".to_string(),
            sign: sign(app_key, query, &salt, app_secret),
            salt,
            app_key: app_key.to_string(),
        }
    }
}

/// Form fields of a text-to-speech request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TtsRequest {
    pub q: String,
    #[serde(rename = "langType")]
    pub lang_type: String,
    #[serde(rename = "appKey")]
    pub app_key: String,
    pub salt: String,
    pub sign: String,
    pub voice: String,
}

impl TtsRequest {
    pub fn signed(app_key: &str, app_secret: &str, query: &str, salt: String) -> Self {
        TtsRequest {
            q: query.to_string(),
            lang_type: "en".to_string(),
            app_key: app_key.to_string(),
            sign: sign(app_key, query, &salt, app_secret),
            salt,
            voice: "5".to_string(),
        }
    }
}

/// Outbound calls to the translation and speech endpoints.
#[async_trait]
pub trait YoudaoTransport: Send + Sync {
    /// Posts a translation request and returns the decoded JSON body.
    async fn translate(&self, request: &TranslateRequest) -> Result<Value>;

    /// Posts a speech request and returns the audio bytes.
    async fn synthesize(&self, request: &TtsRequest) -> Result<Vec<u8>>;
}

/// `reqwest`-based transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    translate_url: String,
    tts_url: String,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_urls(TRANSLATE_URL, TTS_URL)
    }

    /// Transport pointed at alternative endpoints (e.g. a local stub server).
    pub fn with_urls(translate_url: &str, tts_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(HttpTransport {
            client,
            translate_url: translate_url.to_string(),
            tts_url: tts_url.to_string(),
        })
    }
}

#[async_trait]
impl YoudaoTransport for HttpTransport {
    async fn translate(&self, request: &TranslateRequest) -> Result<Value> {
        debug!("POST {} q='{}'", self.translate_url, request.q);
        let response = self
            .client
            .post(&self.translate_url)
            .form(request)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    async fn synthesize(&self, request: &TtsRequest) -> Result<Vec<u8>> {
        debug!("POST {} q='{}'", self.tts_url, request.q);
        let response = self
            .client
            .post(&self.tts_url)
            .form(request)
            .send()
            .await?
            .error_for_status()?;

        // Failures come back as a JSON body with a 200 status
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("json"));
        if is_json {
            let body = response.text().await?;
            return Err(DictError::Upstream(format!("TTS error response: {}", body)));
        }

        Ok(response.bytes().await?.to_vec())
    }
}
