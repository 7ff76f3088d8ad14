//! Result types returned by the analysis entry points.

use serde::{Deserialize, Serialize};

/// Title shown above every rendered report.
pub const REPORT_TITLE: &str = "Nutrition Label Analysis";

/// Heading placed above the generated text.
pub const SUMMARY_HEADING: &str = "Generated Summary:";

/// The outcome of one label analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelReport {
    /// The generated nutrition summary, verbatim from the model.
    pub summary: String,
    /// The ingredients + tables text the summary was generated from.
    pub combined_content: String,
    /// Names of the two inputs as supplied by the user.
    pub ingredients_file: String,
    pub nutrition_file: String,
    pub stats: AnalysisStats,
}

/// Timing and token usage for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Text lines recognised on the ingredients photo.
    pub ingredient_lines: usize,
    /// Tables recognised on the nutrition photo.
    pub nutrition_tables: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    /// Wall-clock time spent in layout analysis (both images).
    pub analysis_duration_ms: u64,
    /// Wall-clock time spent waiting for the chat model.
    pub generation_duration_ms: u64,
    pub total_duration_ms: u64,
}
