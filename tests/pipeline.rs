//! Pipeline integration tests against in-process fake backends.
//!
//! No network: the layout service and the chat model are replaced by
//! scripted implementations of `DocumentAnalyzer` and `ChatCompletion`.

use async_trait::async_trait;
use nutrilens::prompts::DEFAULT_SYSTEM_PROMPT;
use nutrilens::{
    AnalysisConfig, AnalysisPoller, AnalysisProgressCallback, ChatCompletion, ChatExchange,
    ChatReply, ChatRole, DocumentAnalyzer, ImageKind, LabelAnalyzer, NutriError, Page,
    PollState, RecognizedDocument, SamplingOptions, Stage, Table, UploadedImage,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
const JPEG_MAGIC: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

fn ingredients_image() -> UploadedImage {
    UploadedImage::from_bytes("back of pack.jpg", JPEG_MAGIC.to_vec()).unwrap()
}

fn nutrition_image() -> UploadedImage {
    UploadedImage::from_bytes("table.png", PNG_MAGIC.to_vec()).unwrap()
}

fn ingredients_doc() -> RecognizedDocument {
    RecognizedDocument {
        pages: vec![Page {
            lines: vec!["Potatoes, sunflower oil,".into(), "salt (1.4%)".into()],
        }],
        tables: vec![],
    }
}

fn nutrition_doc() -> RecognizedDocument {
    RecognizedDocument {
        pages: vec![Page {
            lines: vec!["ignored on this photo".into()],
        }],
        tables: vec![Table::new(2, 2)
            .with_cell(0, 0, "Energy")
            .with_cell(0, 1, "532 kcal")
            .with_cell(1, 0, "Fat")
            .with_cell(1, 1, "31.5g")],
    }
}

const EXPECTED_COMBINED: &str = "Ingredients:\n\
Potatoes, sunflower oil,\n\
salt (1.4%)\n\
\n\
Nutrition Table:\n\
\n\
Table #1:\n\
Energy\t532 kcal\n\
Fat\t31.5g\n";

/// Poller that reports pending `pending` times, then yields `outcome`.
struct ScriptedPoller {
    pending: u32,
    outcome: Option<PollState>,
}

#[async_trait]
impl AnalysisPoller for ScriptedPoller {
    async fn poll(&mut self) -> Result<PollState, NutriError> {
        if self.pending > 0 {
            self.pending -= 1;
            return Ok(PollState::Pending);
        }
        Ok(self.outcome.take().unwrap_or(PollState::Pending))
    }
}

/// Analyzer that answers each submission with the next scripted outcome.
struct FakeAnalyzer {
    outcomes: Mutex<VecDeque<PollState>>,
    pending_polls: u32,
    submitted: Mutex<Vec<(usize, ImageKind)>>,
}

impl FakeAnalyzer {
    fn new(outcomes: Vec<PollState>) -> Arc<Self> {
        Self::with_pending(outcomes, 0)
    }

    fn with_pending(outcomes: Vec<PollState>, pending_polls: u32) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            pending_polls,
            submitted: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl DocumentAnalyzer for FakeAnalyzer {
    async fn begin_analysis(
        &self,
        image: &[u8],
        kind: ImageKind,
    ) -> Result<Box<dyn AnalysisPoller>, NutriError> {
        self.submitted.lock().unwrap().push((image.len(), kind));
        let outcome = self.outcomes.lock().unwrap().pop_front();
        Ok(Box::new(ScriptedPoller {
            pending: self.pending_polls,
            outcome,
        }))
    }
}

/// Chat model that records every exchange and answers with `reply`.
struct FakeChat {
    reply: String,
    seen: Mutex<Vec<(ChatExchange, SamplingOptions)>>,
}

impl FakeChat {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatCompletion for FakeChat {
    async fn complete(
        &self,
        exchange: &ChatExchange,
        options: &SamplingOptions,
    ) -> Result<ChatReply, NutriError> {
        self.seen
            .lock()
            .unwrap()
            .push((exchange.clone(), *options));
        Ok(ChatReply {
            content: self.reply.clone(),
            prompt_tokens: 321,
            completion_tokens: 45,
        })
    }
}

/// Records every progress event as a string.
#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    fn push(&self, s: String) {
        self.events.lock().unwrap().push(s);
    }

    fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl AnalysisProgressCallback for EventLog {
    fn on_analysis_start(&self) {
        self.push("start".into());
    }
    fn on_stage_start(&self, stage: Stage) {
        self.push(format!("begin {stage:?}"));
    }
    fn on_poll_pending(&self, stage: Stage, attempt: u32) {
        self.push(format!("pending {stage:?} #{attempt}"));
    }
    fn on_stage_complete(&self, stage: Stage, _elapsed_ms: u64) {
        self.push(format!("end {stage:?}"));
    }
    fn on_analysis_complete(&self, summary_len: usize) {
        self.push(format!("complete {summary_len}"));
    }
    fn on_analysis_error(&self, stage: Stage, _error: &str) {
        self.push(format!("error {stage:?}"));
    }
}

fn fast_config(scratch_parent: &Path) -> AnalysisConfig {
    AnalysisConfig::builder()
        .poll_interval_ms(1)
        .scratch_dir(scratch_parent)
        .build()
        .unwrap()
}

fn is_empty_dir(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn summary_is_generated_from_combined_content() {
    let scratch = tempfile::tempdir().unwrap();
    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(ingredients_doc()),
        PollState::Complete(nutrition_doc()),
    ]);
    let chat = FakeChat::new("Summary: salty crisps.\nHealth Score: 4/10");
    let labels = LabelAnalyzer::new(analyzer.clone(), chat.clone(), fast_config(scratch.path()));

    let report = labels
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap();

    assert_eq!(report.summary, "Summary: salty crisps.\nHealth Score: 4/10");
    assert_eq!(report.combined_content, EXPECTED_COMBINED);
    assert_eq!(report.ingredients_file, "back of pack.jpg");
    assert_eq!(report.nutrition_file, "table.png");
    assert_eq!(report.stats.ingredient_lines, 2);
    assert_eq!(report.stats.nutrition_tables, 1);
    assert_eq!(report.stats.prompt_tokens, 321);
    assert_eq!(report.stats.completion_tokens, 45);

    // Ingredients first, then nutrition, each with its own MIME.
    let submitted = analyzer.submitted.lock().unwrap().clone();
    assert_eq!(
        submitted,
        vec![
            (JPEG_MAGIC.len(), ImageKind::Jpeg),
            (PNG_MAGIC.len(), ImageKind::Png)
        ]
    );

    let seen = chat.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (exchange, options) = &seen[0];
    assert_eq!(exchange.messages.len(), 2);
    assert_eq!(exchange.messages[0].role, ChatRole::System);
    assert_eq!(exchange.messages[0].content, DEFAULT_SYSTEM_PROMPT);
    assert_eq!(exchange.messages[1].role, ChatRole::User);
    assert_eq!(
        exchange.messages[1].content,
        format!("Please analyze the following nutrition label content:\n{EXPECTED_COMBINED}")
    );
    assert!((options.temperature - 0.6).abs() < f32::EPSILON);
    assert_eq!(options.max_tokens, 1200);
}

#[tokio::test]
async fn identical_documents_give_identical_content() {
    let scratch = tempfile::tempdir().unwrap();
    let mut combined = Vec::new();
    for _ in 0..2 {
        let analyzer = FakeAnalyzer::new(vec![
            PollState::Complete(ingredients_doc()),
            PollState::Complete(nutrition_doc()),
        ]);
        let labels = LabelAnalyzer::new(analyzer, FakeChat::new("ok"), fast_config(scratch.path()));
        let extracted = labels
            .extract(&ingredients_image(), &nutrition_image())
            .await
            .unwrap();
        combined.push(extracted.combined);
    }
    assert_eq!(combined[0], combined[1]);
}

#[tokio::test]
async fn custom_system_prompt_replaces_persona() {
    let scratch = tempfile::tempdir().unwrap();
    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(ingredients_doc()),
        PollState::Complete(nutrition_doc()),
    ]);
    let chat = FakeChat::new("ok");
    let config = AnalysisConfig::builder()
        .poll_interval_ms(1)
        .scratch_dir(scratch.path())
        .system_prompt("Be brief.")
        .temperature(0.2)
        .max_tokens(300)
        .build()
        .unwrap();
    LabelAnalyzer::new(analyzer, chat.clone(), config)
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap();

    let seen = chat.seen.lock().unwrap();
    let (exchange, options) = &seen[0];
    assert_eq!(exchange.messages[0].content, "Be brief.");
    assert_eq!(options.max_tokens, 300);
    assert!((options.temperature - 0.2).abs() < f32::EPSILON);
}

#[tokio::test]
async fn empty_documents_still_reach_the_model() {
    let scratch = tempfile::tempdir().unwrap();
    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(RecognizedDocument::default()),
        PollState::Complete(RecognizedDocument::default()),
    ]);
    let chat = FakeChat::new("Nothing legible.");
    let report = LabelAnalyzer::new(analyzer, chat.clone(), fast_config(scratch.path()))
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap();

    assert_eq!(report.combined_content, "Ingredients:\n\nNutrition Table:\n");
    assert_eq!(chat.calls(), 1);
}

// ── Polling ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn pending_polls_are_reported_per_stage() {
    let scratch = tempfile::tempdir().unwrap();
    let log = Arc::new(EventLog::default());
    let analyzer = FakeAnalyzer::with_pending(
        vec![
            PollState::Complete(ingredients_doc()),
            PollState::Complete(nutrition_doc()),
        ],
        2,
    );
    let config = AnalysisConfig::builder()
        .poll_interval_ms(1)
        .scratch_dir(scratch.path())
        .progress_callback(log.clone())
        .build()
        .unwrap();
    LabelAnalyzer::new(analyzer, FakeChat::new("done"), config)
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap();

    assert_eq!(
        log.snapshot(),
        vec![
            "start",
            "begin StageImages",
            "end StageImages",
            "begin AnalyzeIngredients",
            "pending AnalyzeIngredients #1",
            "pending AnalyzeIngredients #2",
            "end AnalyzeIngredients",
            "begin AnalyzeNutrition",
            "pending AnalyzeNutrition #1",
            "pending AnalyzeNutrition #2",
            "end AnalyzeNutrition",
            "begin FormatContent",
            "end FormatContent",
            "begin GenerateSummary",
            "end GenerateSummary",
            "complete 4",
        ]
    );
}

#[tokio::test]
async fn never_finishing_analysis_times_out() {
    let scratch = tempfile::tempdir().unwrap();
    let analyzer = FakeAnalyzer::with_pending(vec![], u32::MAX);
    let chat = FakeChat::new("unused");
    let config = AnalysisConfig::builder()
        .poll_interval_ms(400)
        .poll_timeout_secs(1)
        .scratch_dir(scratch.path())
        .build()
        .unwrap();

    let err = LabelAnalyzer::new(analyzer, chat.clone(), config)
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap_err();

    assert!(matches!(err, NutriError::AnalysisTimeout { secs: 1 }), "got {err:?}");
    assert_eq!(chat.calls(), 0);
    assert!(is_empty_dir(scratch.path()));
}

// ── Failures abort the run ───────────────────────────────────────────────────

#[tokio::test]
async fn failed_nutrition_analysis_skips_chat_and_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let log = Arc::new(EventLog::default());
    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(ingredients_doc()),
        PollState::Failed(NutriError::AnalysisFailed {
            code: "InvalidContent".into(),
            message: "The file is corrupted or format is unsupported.".into(),
        }),
    ]);
    let chat = FakeChat::new("unused");
    let config = AnalysisConfig::builder()
        .poll_interval_ms(1)
        .scratch_dir(scratch.path())
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let err = LabelAnalyzer::new(analyzer, chat.clone(), config)
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap_err();

    assert!(matches!(err, NutriError::AnalysisFailed { ref code, .. } if code == "InvalidContent"));
    assert_eq!(chat.calls(), 0);
    assert_eq!(log.snapshot().last().unwrap(), "error AnalyzeNutrition");
    assert!(is_empty_dir(scratch.path()), "scratch directory left behind");
}

#[tokio::test]
async fn failed_extract_reports_start_and_error() {
    let scratch = tempfile::tempdir().unwrap();
    let log = Arc::new(EventLog::default());
    let analyzer = FakeAnalyzer::new(vec![PollState::Failed(NutriError::AnalysisFailed {
        code: "InvalidImage".into(),
        message: "The image is too small.".into(),
    })]);
    let config = AnalysisConfig::builder()
        .poll_interval_ms(1)
        .scratch_dir(scratch.path())
        .progress_callback(log.clone())
        .build()
        .unwrap();

    let err = LabelAnalyzer::new(analyzer, FakeChat::new("unused"), config)
        .extract(&ingredients_image(), &nutrition_image())
        .await
        .unwrap_err();

    assert!(matches!(err, NutriError::AnalysisFailed { .. }), "got {err:?}");
    assert_eq!(
        log.snapshot(),
        vec![
            "start",
            "begin StageImages",
            "end StageImages",
            "begin AnalyzeIngredients",
            "error AnalyzeIngredients",
        ]
    );
    assert!(is_empty_dir(scratch.path()));
}

#[tokio::test]
async fn out_of_range_cell_aborts_before_generation() {
    let scratch = tempfile::tempdir().unwrap();
    let broken = RecognizedDocument {
        pages: vec![],
        tables: vec![Table::new(1, 1).with_cell(0, 3, "Salt")],
    };
    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(ingredients_doc()),
        PollState::Complete(broken),
    ]);
    let chat = FakeChat::new("unused");

    let err = LabelAnalyzer::new(analyzer, chat.clone(), fast_config(scratch.path()))
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            NutriError::MalformedTable {
                table: 1,
                row: 0,
                column: 3,
                rows: 1,
                columns: 1
            }
        ),
        "got {err:?}"
    );
    assert_eq!(chat.calls(), 0);
}

#[tokio::test]
async fn blank_completion_is_an_error() {
    let scratch = tempfile::tempdir().unwrap();
    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(ingredients_doc()),
        PollState::Complete(nutrition_doc()),
    ]);
    let err = LabelAnalyzer::new(analyzer, FakeChat::new("  \n"), fast_config(scratch.path()))
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap_err();
    assert!(matches!(err, NutriError::EmptyCompletion));
}

// ── Scratch lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn scratch_directory_is_removed_after_success() {
    let scratch = tempfile::tempdir().unwrap();
    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(ingredients_doc()),
        PollState::Complete(nutrition_doc()),
    ]);
    LabelAnalyzer::new(analyzer, FakeChat::new("ok"), fast_config(scratch.path()))
        .analyze(&ingredients_image(), &nutrition_image())
        .await
        .unwrap();
    assert!(is_empty_dir(scratch.path()));
}

#[tokio::test]
async fn concurrent_analyses_do_not_share_scratch() {
    let scratch = tempfile::tempdir().unwrap();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let analyzer = FakeAnalyzer::with_pending(
            vec![
                PollState::Complete(ingredients_doc()),
                PollState::Complete(nutrition_doc()),
            ],
            3,
        );
        let labels = LabelAnalyzer::new(analyzer, FakeChat::new("ok"), fast_config(scratch.path()));
        handles.push(tokio::spawn(async move {
            labels.analyze(&ingredients_image(), &nutrition_image()).await
        }));
    }
    for handle in handles {
        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.combined_content, EXPECTED_COMBINED);
    }
    assert!(is_empty_dir(scratch.path()));
}

// ── File output ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn analyze_to_file_writes_summary() {
    let dir = tempfile::tempdir().unwrap();
    let ingredients = dir.path().join("ingredients.jpg");
    let nutrition = dir.path().join("nutrition.PNG");
    std::fs::write(&ingredients, JPEG_MAGIC).unwrap();
    std::fs::write(&nutrition, PNG_MAGIC).unwrap();
    let out = dir.path().join("out/summary.txt");

    let analyzer = FakeAnalyzer::new(vec![
        PollState::Complete(ingredients_doc()),
        PollState::Complete(nutrition_doc()),
    ]);
    let labels = LabelAnalyzer::new(analyzer, FakeChat::new("Summary: fine."), fast_config(dir.path()));
    let report = labels
        .analyze_to_file(
            ingredients.to_str().unwrap(),
            nutrition.to_str().unwrap(),
            &out,
        )
        .await
        .unwrap();

    assert_eq!(report.ingredients_file, "ingredients.jpg");
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "Summary: fine.");
}

#[tokio::test]
async fn unsupported_input_never_reaches_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let gif = dir.path().join("label.gif");
    std::fs::write(&gif, b"GIF89a").unwrap();
    let png = dir.path().join("table.png");
    std::fs::write(&png, PNG_MAGIC).unwrap();

    let analyzer = FakeAnalyzer::new(vec![]);
    let labels = LabelAnalyzer::new(analyzer.clone(), FakeChat::new("ok"), fast_config(dir.path()));
    let err = labels
        .analyze_inputs(gif.to_str().unwrap(), png.to_str().unwrap())
        .await
        .unwrap_err();

    assert!(err.is_input_error(), "got {err:?}");
    assert!(analyzer.submitted.lock().unwrap().is_empty());
}
