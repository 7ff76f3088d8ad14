//! # nutrilens
//!
//! Summarise a food label from two photos: one of the ingredients list, one of
//! the nutrition-facts table.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ingredients.jpg   nutrition.png
//!        │                │
//!        ├─ 1. Input    validate JPEG/PNG (path, URL or upload)
//!        ├─ 2. Scratch  stage both images in a request-local temp dir
//!        ├─ 3. Layout   Azure Document Intelligence `prebuilt-layout`
//!        │              (submit, then poll until succeeded/failed)
//!        ├─ 4. Format   ingredient lines + tab-separated nutrition tables
//!        ├─ 5. Chat     nutritionist persona → Azure OpenAI (or any
//!        │              edgequake-llm provider)
//!        └─ 6. Output   summary text + stats
//! ```
//!
//! OCR and text generation are remote. The crate owns input validation, the
//! scratch lifecycle, both wire protocols, and the formatting in between.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nutrilens::{AnalysisConfig, AnalysisService, ChatService, LabelAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analyzer = LabelAnalyzer::azure(
//!         AnalysisService::new(std::env::var("AZURE_FORM_RECOGNIZER_ENDPOINT")?,
//!                              std::env::var("AZURE_FORM_RECOGNIZER_KEY")?)?,
//!         ChatService::new(std::env::var("AZURE_OAI_ENDPOINT")?,
//!                          std::env::var("AZURE_OAI_KEY")?,
//!                          std::env::var("AZURE_OAI_DEPLOYMENT")?)?,
//!         AnalysisConfig::default(),
//!     )?;
//!     let report = analyzer.analyze_inputs("ingredients.jpg", "nutrition.png").await?;
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `nutrilens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `web`   | on      | Enables [`web`], the HTML upload page behind `nutrilens serve` |
//!
//! Disable both when using only the library:
//! ```toml
//! nutrilens = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
#[cfg(feature = "web")]
pub mod web;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{ExtractedContent, LabelAnalyzer};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, AnalysisService, ChatService};
pub use document::{Page, RecognizedDocument, Table, TableCell};
pub use error::{NutriError, Service};
pub use output::{AnalysisStats, LabelReport};
pub use pipeline::input::{ImageKind, UploadedImage};
pub use pipeline::layout::{AnalysisPoller, AzureLayoutClient, DocumentAnalyzer, PollState};
pub use pipeline::llm::{
    AzureChatClient, ChatCompletion, ChatExchange, ChatReply, ChatRole, ChatTurn, ProviderChat,
    SamplingOptions,
};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
