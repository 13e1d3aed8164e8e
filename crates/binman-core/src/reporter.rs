//! Reporter trait for dependency injection
//!
//! This trait allows the pipeline to report progress and status without
//! being coupled to a specific console implementation.

use std::path::Path;

/// Progress and outcome sink for pipeline runs.
pub trait Reporter: Send + Sync {
    /// Indicates a new section or phase has started (e.g. "Downloading").
    fn section(&self, title: &str);

    /// The download URL of an entry has been resolved.
    fn resolved(&self, name: &str, version: &str, url: &str);

    /// Updates the progress of a download.
    fn downloading(&self, name: &str, version: &str, current: u64, total: Option<u64>);

    /// An archive is being unpacked.
    fn extracting(&self, name: &str, version: &str, format: &str);

    /// The payload is being moved into place.
    fn installing(&self, name: &str, version: &str, dest: &Path);

    /// Marks an entry as successfully completed.
    fn done(&self, name: &str, version: &str, detail: &str);

    /// Marks an entry as failed with a specific reason.
    fn failed(&self, name: &str, version: &str, reason: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a success message.
    fn success(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Display a final summary of a batch.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn resolved(&self, name: &str, version: &str, url: &str) {
        (**self).resolved(name, version, url);
    }
    fn downloading(&self, name: &str, version: &str, current: u64, total: Option<u64>) {
        (**self).downloading(name, version, current, total);
    }
    fn extracting(&self, name: &str, version: &str, format: &str) {
        (**self).extracting(name, version, format);
    }
    fn installing(&self, name: &str, version: &str, dest: &Path) {
        (**self).installing(name, version, dest);
    }
    fn done(&self, name: &str, version: &str, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn failed(&self, name: &str, version: &str, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn success(&self, msg: &str) {
        (**self).success(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g. testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn resolved(&self, _: &str, _: &str, _: &str) {}
    fn downloading(&self, _: &str, _: &str, _: u64, _: Option<u64>) {}
    fn extracting(&self, _: &str, _: &str, _: &str) {}
    fn installing(&self, _: &str, _: &str, _: &Path) {}
    fn done(&self, _: &str, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
