use crate::error::{DictError, Result};
use crate::models::WordRecord;
use log::debug;
use tokio::task;

/// Parses a word-collection export into records using spawn_blocking.
///
/// Accepts either a JSON array of records or one record per line
/// (the default document-store export format).
pub async fn parse_word_export(content: String) -> Result<Vec<WordRecord>> {
    debug!("Starting word export parsing (using spawn_blocking)...");
    let records = task::spawn_blocking(move || -> Result<Vec<WordRecord>> {
        let trimmed = content.trim_start();
        if trimmed.starts_with('[') {
            return serde_json::from_str(trimmed).map_err(DictError::from);
        }
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| serde_json::from_str::<WordRecord>(line).map_err(DictError::from))
            .collect()
    })
    .await
    .map_err(|e| DictError::Internal(format!("Parser task failed: {}", e)))??;
    debug!("Parsed {} word records.", records.len());
    Ok(records)
}
