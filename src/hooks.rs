//! Observability hook for best-effort disk writes.
//!
//! Writes to the file cache never fail the caller's lookup. Failures are
//! handed to a `WriteFailureHook` instead; the default one logs a warning.

use log::warn;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// Called with the target path and the error when a cache write fails.
pub type WriteFailureHook = Arc<dyn Fn(&Path, &io::Error) + Send + Sync>;

/// Hook that logs the failure at `warn` level.
pub fn log_write_failure() -> WriteFailureHook {
    Arc::new(|path: &Path, err: &io::Error| {
        warn!("Failed to write cache file {:?}: {}", path, err);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hook_does_not_panic() {
        let _ = env_logger::builder().is_test(true).try_init();
        let hook = log_write_failure();
        hook(
            Path::new("/nonexistent/a.mp3"),
            &io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
    }
}
