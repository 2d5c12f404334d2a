//! Progress reporting for long-running imports.

/// A snapshot of import progress.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// A description of the current stage (e.g., "Importing words").
    pub stage_description: String,
    /// Number of items processed in the current stage.
    pub current_item: u64,
    /// Total number of items expected in the current stage (if known).
    pub total_items: Option<u64>,
    /// The item just processed, if any.
    pub message: Option<String>,
}

/// Progress callback. Returning `false` is a request to stop; the importer
/// currently runs to completion regardless.
pub type ProgressCallback = Box<dyn FnMut(ProgressUpdate) -> bool + Send + Sync>;

impl ProgressUpdate {
    /// Creates a new progress update for the start of a stage.
    pub fn new_stage(description: String, total_items: Option<u64>) -> Self {
        ProgressUpdate {
            stage_description: description,
            current_item: 0,
            total_items,
            message: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.total_items, Some(total) if self.current_item >= total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_start_and_completion() {
        let start = ProgressUpdate::new_stage("Importing words".to_string(), Some(2));
        assert_eq!(start.current_item, 0);
        assert!(!start.is_complete());

        let done = ProgressUpdate {
            current_item: 2,
            ..start.clone()
        };
        assert!(done.is_complete());

        let unbounded = ProgressUpdate::new_stage("Importing words".to_string(), None);
        assert!(!unbounded.is_complete());
    }
}
