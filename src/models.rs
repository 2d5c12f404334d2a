use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

// --- Course Codes ---

/// First course code of a curator-verified (textbook) entry.
pub const AUTHORITATIVE_CODE: i64 = 1;
/// Course code carried by records built from a translation payload.
pub const SYNTHESIZED_CODE: i64 = 1_000_001;

// --- Word Record ---

/// One entry of the word collection.
///
/// Field names on the wire follow the collection's storage format
/// (`c`, `w`, `yb`, `cx`, `sy`, ...). The same shape is kept in the fast
/// cache and accepted by the importer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRecord {
    #[serde(
        rename = "_id",
        default,
        deserialize_with = "deserialize_record_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Course/chapter codes, in stored order.
    #[serde(rename = "c", default)]
    pub codes: Vec<i64>,
    #[serde(rename = "w")]
    pub word: String,
    #[serde(rename = "yb", default, skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
    #[serde(rename = "cx", default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    #[serde(rename = "sy", default, skip_serializing_if = "Option::is_none")]
    pub gloss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    /// Path relative to the audio tree, e.g. `/jh/a.mp3`.
    #[serde(rename = "audio", default, skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(rename = "uk", default, skip_serializing_if = "Option::is_none")]
    pub uk_phonetic: Option<String>,
    #[serde(rename = "us", default, skip_serializing_if = "Option::is_none")]
    pub us_phonetic: Option<String>,
}

/// Accepts both a plain string id and the `{"$oid": "..."}` form found in
/// document-store exports.
fn deserialize_record_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Object(obj)) => obj
            .get("$oid")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

impl WordRecord {
    pub fn first_code(&self) -> Option<i64> {
        self.codes.first().copied()
    }

    /// True when the first course code marks a curator-verified entry.
    pub fn is_authoritative(&self) -> bool {
        self.first_code() == Some(AUTHORITATIVE_CODE)
    }

    pub fn phonetic(&self) -> Option<&str> {
        non_empty(&self.phonetic)
    }

    pub fn part_of_speech(&self) -> Option<&str> {
        non_empty(&self.part_of_speech)
    }

    pub fn gloss(&self) -> Option<&str> {
        non_empty(&self.gloss)
    }

    pub fn audio_path(&self) -> Option<&str> {
        non_empty(&self.audio_path)
    }

    pub fn uk_phonetic(&self) -> Option<&str> {
        non_empty(&self.uk_phonetic)
    }

    /// Builds the extra record contributed by a translation payload.
    ///
    /// Returns `None` when the payload has neither a `basic` section nor a
    /// `translation` field.
    pub fn synthesized(word: &str, payload: &TranslationPayload) -> Option<WordRecord> {
        if !payload.has_basic() && !payload.has_translation() {
            return None;
        }
        let bracket = |p: Option<&str>| p.map(|p| format!("[{}]", p)).unwrap_or_default();
        let gloss = match payload.explains() {
            Some(explains) => explains.join("\n"),
            None => payload.translation_text().unwrap_or_default(),
        };
        Some(WordRecord {
            codes: vec![SYNTHESIZED_CODE],
            word: word.to_string(),
            uk_phonetic: Some(bracket(payload.uk_phonetic())),
            us_phonetic: Some(bracket(payload.us_phonetic())),
            gloss: Some(gloss),
            ..Default::default()
        })
    }
}

// --- Datastore Filter ---

/// Exact-match filters understood by the datastore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WordFilter {
    /// Records whose course codes contain this code.
    Code(i64),
    /// Records for this exact word.
    Word(String),
}

// --- Translation Payload ---

/// Response document from the translation API (or its file-cache form).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TranslationPayload(Map<String, Value>);

/// Top-level fields removed before a payload is persisted.
const TRIMMED_FIELDS: [&str; 6] = ["tSpeakUrl", "errorCode", "dict", "webdict", "l", "speakUrl"];
/// Fields removed from the `basic` section before a payload is persisted.
const TRIMMED_BASIC_FIELDS: [&str; 2] = ["uk-speech", "us-speech"];

impl TranslationPayload {
    /// Wraps a JSON value; anything other than an object yields `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(TranslationPayload(map)),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        self.0.get("errorCode").and_then(Value::as_str)
    }

    /// The API signals success with the literal string `"0"`.
    pub fn is_success(&self) -> bool {
        self.error_code() == Some("0")
    }

    fn basic(&self) -> Option<&Map<String, Value>> {
        self.0.get("basic").and_then(Value::as_object)
    }

    pub fn has_basic(&self) -> bool {
        self.basic().is_some()
    }

    pub fn has_translation(&self) -> bool {
        match self.0.get("translation") {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }

    pub fn uk_phonetic(&self) -> Option<&str> {
        self.basic_str("uk-phonetic")
    }

    pub fn us_phonetic(&self) -> Option<&str> {
        self.basic_str("us-phonetic")
    }

    fn basic_str(&self, key: &str) -> Option<&str> {
        self.basic()
            .and_then(|b| b.get(key))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Gloss lines from `basic.explains`.
    pub fn explains(&self) -> Option<Vec<&str>> {
        self.basic()
            .and_then(|b| b.get("explains"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
    }

    /// The `translation` field flattened to text; list items are joined with `,`.
    pub fn translation_text(&self) -> Option<String> {
        match self.0.get("translation")? {
            Value::String(s) => Some(s.clone()),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            _ => None,
        }
    }

    /// Drops playback URLs, the error code, and raw dictionary sections.
    pub fn trim(&mut self) {
        for field in TRIMMED_FIELDS {
            self.0.remove(field);
        }
        if let Some(Value::Object(basic)) = self.0.get_mut("basic") {
            for field in TRIMMED_BASIC_FIELDS {
                basic.remove(field);
            }
        }
    }
}

// --- Resolved Entry ---

/// Best-guess display tuple for a word.
///
/// Serializes as `[phonetic, partOfSpeech, gloss, audioUrl]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub phonetic: String,
    pub part_of_speech: String,
    pub gloss: String,
    pub audio_url: String,
}

impl ResolvedEntry {
    pub fn as_array(&self) -> [&str; 4] {
        [
            &self.phonetic,
            &self.part_of_speech,
            &self.gloss,
            &self.audio_url,
        ]
    }
}

impl Serialize for ResolvedEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_array().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_uses_storage_field_names() {
        let raw = json!({
            "_id": {"$oid": "5c94d832d51b8aef0483be6e"},
            "c": [4649, 4726],
            "w": "a",
            "yb": "[ə]",
            "cx": "art.",
            "sy": "一（个）",
            "audio": "/jh/a.mp3"
        });
        let record: WordRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.id.as_deref(), Some("5c94d832d51b8aef0483be6e"));
        assert_eq!(record.codes, vec![4649, 4726]);
        assert_eq!(record.phonetic(), Some("[ə]"));
        assert_eq!(record.audio_path(), Some("/jh/a.mp3"));
        assert!(!record.is_authoritative());

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["_id"], "5c94d832d51b8aef0483be6e");
        assert_eq!(back["cx"], "art.");
        assert!(back.get("uk").is_none());
    }

    #[test]
    fn test_empty_fields_count_as_absent() {
        let record = WordRecord {
            word: "a".to_string(),
            uk_phonetic: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(record.uk_phonetic(), None);
        assert_eq!(record.first_code(), None);
    }

    #[test]
    fn test_synthesized_from_basic() {
        let payload = TranslationPayload::from_value(json!({
            "basic": {
                "uk-phonetic": "kæt",
                "explains": ["n. 猫", "v. 起锚"]
            },
            "translation": ["猫"]
        }))
        .unwrap();
        let record = WordRecord::synthesized("cat", &payload).unwrap();
        assert_eq!(record.codes, vec![SYNTHESIZED_CODE]);
        assert_eq!(record.uk_phonetic.as_deref(), Some("[kæt]"));
        assert_eq!(record.us_phonetic.as_deref(), Some(""));
        assert_eq!(record.gloss.as_deref(), Some("n. 猫\nv. 起锚"));
    }

    #[test]
    fn test_synthesized_falls_back_to_translation() {
        let payload =
            TranslationPayload::from_value(json!({"translation": ["你好", "喂"]})).unwrap();
        let record = WordRecord::synthesized("hello there", &payload).unwrap();
        assert_eq!(record.gloss.as_deref(), Some("你好,喂"));
        assert_eq!(record.uk_phonetic.as_deref(), Some(""));
    }

    #[test]
    fn test_no_synthesis_without_basic_or_translation() {
        let payload = TranslationPayload::from_value(json!({"query": "zzz"})).unwrap();
        assert!(WordRecord::synthesized("zzz", &payload).is_none());
    }

    #[test]
    fn test_trim_tolerates_missing_speech_fields() {
        let mut payload = TranslationPayload::from_value(json!({
            "errorCode": "0",
            "tSpeakUrl": "http://x",
            "speakUrl": "http://y",
            "dict": {"url": "z"},
            "webdict": {"url": "w"},
            "l": "en2zh-CHS",
            "translation": ["猫"],
            "basic": {"us-speech": "http://u", "explains": ["n. 猫"]}
        }))
        .unwrap();
        payload.trim();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            json!({"translation": ["猫"], "basic": {"explains": ["n. 猫"]}})
        );

        let mut bare = TranslationPayload::from_value(json!({"errorCode": "0"})).unwrap();
        bare.trim();
        assert_eq!(serde_json::to_value(&bare).unwrap(), json!({}));
    }

    #[test]
    fn test_resolved_entry_serializes_as_tuple() {
        let entry = ResolvedEntry {
            phonetic: "[ə]".to_string(),
            part_of_speech: "art.".to_string(),
            gloss: "一（个）".to_string(),
            audio_url: "/dict/wyaudio/jh/a.mp3".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!(["[ə]", "art.", "一（个）", "/dict/wyaudio/jh/a.mp3"])
        );
    }
}
