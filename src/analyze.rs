//! Label analysis entry points.
//!
//! [`LabelAnalyzer`] owns the two remote clients and the configuration and
//! runs the pipeline end to end:
//!
//! ```text
//! stage images ─▶ analyze ingredients ─▶ analyze nutrition ─▶ format ─▶ summary
//!  (scratch)        (layout, lines)        (layout, tables)     (pure)    (chat)
//! ```
//!
//! Stages run strictly one after another. Any failure aborts the run with no
//! partial output, and the scratch directory is released on every path.

use crate::config::{AnalysisConfig, AnalysisService, ChatService};
use crate::document::RecognizedDocument;
use crate::error::NutriError;
use crate::output::{AnalysisStats, LabelReport};
use crate::pipeline::input::{self, UploadedImage};
use crate::pipeline::layout::{self, AzureLayoutClient, DocumentAnalyzer};
use crate::pipeline::llm::{self, AzureChatClient, ChatCompletion};
use crate::pipeline::scratch::{ScratchSpace, StagedImage};
use crate::pipeline::format;
use crate::progress::Stage;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Runs label analyses against injected backends.
///
/// # Example
/// ```rust,no_run
/// use nutrilens::{AnalysisConfig, AnalysisService, ChatService, LabelAnalyzer};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let analyzer = LabelAnalyzer::azure(
///     AnalysisService::new("https://my-di.cognitiveservices.azure.com", "di-key")?,
///     ChatService::new("https://my-oai.openai.azure.com", "oai-key", "gpt-4o-mini")?,
///     AnalysisConfig::default(),
/// )?;
/// let report = analyzer.analyze_inputs("ingredients.jpg", "nutrition.png").await?;
/// println!("{}", report.summary);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LabelAnalyzer {
    analyzer: Arc<dyn DocumentAnalyzer>,
    chat: Arc<dyn ChatCompletion>,
    config: AnalysisConfig,
}

impl std::fmt::Debug for LabelAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelAnalyzer")
            .field("analyzer", &"<dyn DocumentAnalyzer>")
            .field("chat", &"<dyn ChatCompletion>")
            .field("config", &self.config)
            .finish()
    }
}

/// The recognised text of both photos, before any generation.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub ingredients: RecognizedDocument,
    pub nutrition: RecognizedDocument,
    pub combined: String,
    pub analysis_duration_ms: u64,
}

impl LabelAnalyzer {
    /// Assemble an analyzer from explicit backends.
    pub fn new(
        analyzer: Arc<dyn DocumentAnalyzer>,
        chat: Arc<dyn ChatCompletion>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            analyzer,
            chat,
            config,
        }
    }

    /// Azure Document Intelligence + Azure OpenAI.
    pub fn azure(
        analysis: AnalysisService,
        chat: ChatService,
        config: AnalysisConfig,
    ) -> Result<Self, NutriError> {
        let analyzer = AzureLayoutClient::new(analysis, &config)?;
        let chat = AzureChatClient::new(chat, &config)?;
        Ok(Self::new(Arc::new(analyzer), Arc::new(chat), config))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Resolve two paths or URLs, then analyse them.
    pub async fn analyze_inputs(
        &self,
        ingredients: &str,
        nutrition: &str,
    ) -> Result<LabelReport, NutriError> {
        let timeout = self.config.download_timeout_secs;
        let ingredients = input::resolve_image(ingredients, timeout).await?;
        let nutrition = input::resolve_image(nutrition, timeout).await?;
        self.analyze(&ingredients, &nutrition).await
    }

    /// Run the full pipeline on two uploaded images.
    pub async fn analyze(
        &self,
        ingredients: &UploadedImage,
        nutrition: &UploadedImage,
    ) -> Result<LabelReport, NutriError> {
        let total_start = Instant::now();
        info!(
            "Starting label analysis: {} + {}",
            ingredients.filename(),
            nutrition.filename()
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_analysis_start();
        }

        let mut current = Stage::StageImages;
        let result = self.run(ingredients, nutrition, &mut current).await;

        if let Some(ref cb) = self.config.progress_callback {
            match &result {
                Ok(report) => cb.on_analysis_complete(report.summary.len()),
                Err(e) => cb.on_analysis_error(current, &e.to_string()),
            }
        }

        result.map(|mut report| {
            report.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
            info!(
                "Label analysis complete: {} chars in {}ms",
                report.summary.len(),
                report.stats.total_duration_ms
            );
            report
        })
    }

    /// Stages 1–4 only: recognise both photos and build the combined content
    /// without calling the chat model.
    ///
    /// Fires `on_analysis_start` and, on failure, `on_analysis_error`. There is
    /// no summary, so `on_analysis_complete` is not called.
    pub async fn extract(
        &self,
        ingredients: &UploadedImage,
        nutrition: &UploadedImage,
    ) -> Result<ExtractedContent, NutriError> {
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_analysis_start();
        }

        let mut current = Stage::StageImages;
        let result = self
            .extract_tracked(ingredients, nutrition, &mut current)
            .await;

        if let (Some(cb), Err(e)) = (&self.config.progress_callback, &result) {
            cb.on_analysis_error(current, &e.to_string());
        }
        result
    }

    /// Analyse and write the summary to `output_path`.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files.
    pub async fn analyze_to_file(
        &self,
        ingredients: &str,
        nutrition: &str,
        output_path: impl AsRef<Path>,
    ) -> Result<LabelReport, NutriError> {
        let report = self.analyze_inputs(ingredients, nutrition).await?;
        write_atomic(output_path.as_ref(), &report.summary).await?;
        Ok(report)
    }

    /// Synchronous wrapper around [`LabelAnalyzer::analyze_inputs`].
    ///
    /// Creates a temporary tokio runtime internally.
    pub fn analyze_sync(&self, ingredients: &str, nutrition: &str) -> Result<LabelReport, NutriError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| NutriError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.analyze_inputs(ingredients, nutrition))
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    async fn run(
        &self,
        ingredients: &UploadedImage,
        nutrition: &UploadedImage,
        current: &mut Stage,
    ) -> Result<LabelReport, NutriError> {
        let extracted = self.extract_tracked(ingredients, nutrition, current).await?;

        *current = Stage::GenerateSummary;
        let started = self.stage_started(Stage::GenerateSummary);
        let reply = llm::generate_summary(self.chat.as_ref(), &extracted.combined, &self.config).await?;
        let generation_duration_ms = self.stage_finished(Stage::GenerateSummary, started);

        Ok(LabelReport {
            summary: reply.content,
            combined_content: extracted.combined,
            ingredients_file: ingredients.filename().to_string(),
            nutrition_file: nutrition.filename().to_string(),
            stats: AnalysisStats {
                ingredient_lines: extracted.ingredients.line_count(),
                nutrition_tables: extracted.nutrition.tables.len(),
                prompt_tokens: reply.prompt_tokens,
                completion_tokens: reply.completion_tokens,
                analysis_duration_ms: extracted.analysis_duration_ms,
                generation_duration_ms,
                total_duration_ms: 0,
            },
        })
    }

    async fn extract_tracked(
        &self,
        ingredients: &UploadedImage,
        nutrition: &UploadedImage,
        current: &mut Stage,
    ) -> Result<ExtractedContent, NutriError> {
        // ── Step 1: Stage both uploads ───────────────────────────────────
        *current = Stage::StageImages;
        let started = self.stage_started(Stage::StageImages);
        let scratch = ScratchSpace::new(self.config.scratch_dir.as_deref())?;
        let staged_ingredients = scratch.stage("ingredients", ingredients).await?;
        let staged_nutrition = scratch.stage("nutrition", nutrition).await?;
        self.stage_finished(Stage::StageImages, started);

        // ── Step 2: Ingredients photo → text lines ───────────────────────
        *current = Stage::AnalyzeIngredients;
        let started = self.stage_started(Stage::AnalyzeIngredients);
        let ingredients_doc = self
            .recognize(&staged_ingredients, Stage::AnalyzeIngredients)
            .await?;
        let mut analysis_duration_ms = self.stage_finished(Stage::AnalyzeIngredients, started);

        // ── Step 3: Nutrition photo → tables ─────────────────────────────
        *current = Stage::AnalyzeNutrition;
        let started = self.stage_started(Stage::AnalyzeNutrition);
        let nutrition_doc = self
            .recognize(&staged_nutrition, Stage::AnalyzeNutrition)
            .await?;
        analysis_duration_ms += self.stage_finished(Stage::AnalyzeNutrition, started);

        // The images are no longer needed once both analyses are back.
        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory: {}", e);
        }

        // ── Step 4: Format ───────────────────────────────────────────────
        *current = Stage::FormatContent;
        let started = self.stage_started(Stage::FormatContent);
        let combined = format::combined_content(&ingredients_doc, &nutrition_doc)?;
        self.stage_finished(Stage::FormatContent, started);
        debug!("Combined content: {} bytes", combined.len());

        Ok(ExtractedContent {
            ingredients: ingredients_doc,
            nutrition: nutrition_doc,
            combined,
            analysis_duration_ms,
        })
    }

    /// Submit a staged image and poll until the layout result is ready.
    async fn recognize(
        &self,
        staged: &StagedImage,
        stage: Stage,
    ) -> Result<RecognizedDocument, NutriError> {
        let bytes = staged.read().await?;
        let mut poller = self.analyzer.begin_analysis(&bytes, staged.kind()).await?;

        let callback = self.config.progress_callback.clone();
        layout::wait_for_result(
            poller.as_mut(),
            Duration::from_millis(self.config.poll_interval_ms),
            Duration::from_secs(self.config.poll_timeout_secs),
            move |attempt| {
                if let Some(ref cb) = callback {
                    cb.on_poll_pending(stage, attempt);
                }
            },
        )
        .await
    }

    fn stage_started(&self, stage: Stage) -> Instant {
        debug!("{}…", stage.label());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_start(stage);
        }
        Instant::now()
    }

    fn stage_finished(&self, stage: Stage, started: Instant) -> u64 {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!("{} done in {}ms", stage.label(), elapsed_ms);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage_complete(stage, elapsed_ms);
        }
        elapsed_ms
    }
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), NutriError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| NutriError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            })?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| NutriError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            warn!("Could not remove {}: {}", tmp_path.display(), cleanup);
        }
        return Err(NutriError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}
