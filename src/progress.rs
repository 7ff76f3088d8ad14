//! Progress-callback trait for per-stage analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as the pipeline moves through its stages. The CLI uses this to drive
//! its spinner; a web front-end could forward the same events to a socket.
//!
//! # Example
//!
//! ```rust
//! use nutrilens::{AnalysisConfig, AnalysisProgressCallback, Stage};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct StageCounter {
//!     done: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for StageCounter {
//!     fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{} took {elapsed_ms}ms", stage.label());
//!     }
//! }
//!
//! let config = AnalysisConfig::builder()
//!     .progress_callback(Arc::new(StageCounter { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Writing both uploads to scratch storage.
    StageImages,
    /// Layout analysis of the ingredients photo.
    AnalyzeIngredients,
    /// Layout analysis of the nutrition-table photo.
    AnalyzeNutrition,
    /// Building the combined ingredients + tables text.
    FormatContent,
    /// Chat completion producing the summary.
    GenerateSummary,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::StageImages,
        Stage::AnalyzeIngredients,
        Stage::AnalyzeNutrition,
        Stage::FormatContent,
        Stage::GenerateSummary,
    ];

    /// Short human-readable description.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::StageImages => "Staging images",
            Stage::AnalyzeIngredients => "Reading ingredients",
            Stage::AnalyzeNutrition => "Reading nutrition table",
            Stage::FormatContent => "Formatting content",
            Stage::GenerateSummary => "Writing summary",
        }
    }
}

/// Called by the pipeline as it runs.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: the web
/// front-end shares one config across concurrent requests.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once before any stage runs.
    fn on_analysis_start(&self) {}

    /// Called when a stage begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called each time an analysis poll comes back still pending.
    ///
    /// # Arguments
    /// * `stage`   — [`Stage::AnalyzeIngredients`] or [`Stage::AnalyzeNutrition`]
    /// * `attempt` — 1-based poll count
    fn on_poll_pending(&self, stage: Stage, attempt: u32) {
        let _ = (stage, attempt);
    }

    /// Called when a stage finishes successfully.
    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        let _ = (stage, elapsed_ms);
    }

    /// Called once after the summary has been generated.
    ///
    /// # Arguments
    /// * `summary_len` — byte length of the generated text
    fn on_analysis_complete(&self, summary_len: usize) {
        let _ = summary_len;
    }

    /// Called once if any stage fails; no further events follow.
    fn on_analysis_error(&self, stage: Stage, error: &str) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
