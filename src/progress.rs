//! Progress-callback trait for per-stage conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to be told
//! when each pipeline stage starts, finishes or fails. The CLI uses it to
//! drive a spinner; the HTTP server runs without one.
//!
//! All methods default to no-ops so implementors only override what they
//! need. Implementations must be `Send + Sync`: one pipeline serves many
//! concurrent requests, and their events interleave.
//!
//! ```rust
//! use edgequake_pdf2xlsx::{ConversionProgressCallback, Stage};
//!
//! struct Printer;
//!
//! impl ConversionProgressCallback for Printer {
//!     fn on_stage_complete(&self, stage: Stage, detail: &str) {
//!         eprintln!("{} done: {}", stage, detail);
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

/// One step of the conversion pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Validate the upload, stage it to a scratch file, read every page.
    Extract,
    /// Render the extraction instruction.
    Prompt,
    /// Call the generative model.
    Model,
    /// Recover and validate the JSON record list.
    Parse,
    /// Build the table and write the workbook.
    Tabulate,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Prompt => "prompt",
            Stage::Model => "model",
            Stage::Parse => "parse",
            Stage::Tabulate => "tabulate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called by the pipeline as each stage runs.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called just before `stage` begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called when `stage` succeeds.
    ///
    /// `detail` is a short human-readable summary, e.g. `"3 pages, 4812 chars"`.
    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        let _ = (stage, detail);
    }

    /// Called when `stage` fails. No further stage runs afterwards.
    fn on_stage_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_stage_start(&self, stage: Stage) {
            self.events.lock().push(format!("start:{stage}"));
        }

        fn on_stage_complete(&self, stage: Stage, _detail: &str) {
            self.events.lock().push(format!("done:{stage}"));
        }

        fn on_stage_error(&self, stage: Stage, _error: &str) {
            self.events.lock().push(format!("error:{stage}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_stage_start(Stage::Extract);
        cb.on_stage_complete(Stage::Extract, "1 page");
        cb.on_stage_error(Stage::Model, "timeout");
    }

    #[test]
    fn recorder_sees_events_in_order() {
        let rec = Recorder::default();
        rec.on_stage_start(Stage::Model);
        rec.on_stage_error(Stage::Model, "boom");
        assert_eq!(*rec.events.lock(), vec!["start:model", "error:model"]);
    }

    #[test]
    fn stage_names_are_stable() {
        let names: Vec<&str> = [
            Stage::Extract,
            Stage::Prompt,
            Stage::Model,
            Stage::Parse,
            Stage::Tabulate,
        ]
        .iter()
        .map(Stage::as_str)
        .collect();
        assert_eq!(names, ["extract", "prompt", "model", "parse", "tabulate"]);
    }
}
