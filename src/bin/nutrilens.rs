//! CLI binary for nutrilens.
//!
//! A thin shim over the library crate that maps CLI flags and the Azure
//! environment variables to a `LabelAnalyzer`, then prints the summary or
//! serves the upload page.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use nutrilens::output::{REPORT_TITLE, SUMMARY_HEADING};
use nutrilens::pipeline::input::resolve_image;
use nutrilens::{
    AnalysisConfig, AnalysisProgressCallback, AnalysisService, AzureChatClient, AzureLayoutClient,
    ChatCompletion, ChatExchange, ChatReply, ChatService, LabelAnalyzer, NutriError,
    ProgressCallback, ProviderChat, SamplingOptions, Stage,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal spinner: one line that follows the current stage, plus a log
/// line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Analyzing images…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(stage.label());
    }

    fn on_poll_pending(&self, stage: Stage, attempt: u32) {
        self.bar
            .set_message(format!("{}  {}", stage.label(), dim(&format!("poll #{attempt}"))));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<24} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_analysis_complete(&self, _summary_len: usize) {
        self.finish();
    }

    fn on_analysis_error(&self, stage: Stage, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<24} {}", red("✗"), stage.label(), red(&msg)));
        self.finish();
    }
}

/// Chat backend used with `--content-only`, where no summary is generated.
struct UnconfiguredChat;

#[async_trait]
impl ChatCompletion for UnconfiguredChat {
    async fn complete(&self, _: &ChatExchange, _: &SamplingOptions) -> Result<ChatReply, NutriError> {
        Err(NutriError::ProviderNotConfigured {
            provider: "azure".into(),
            hint: "set AZURE_OAI_ENDPOINT, AZURE_OAI_KEY and AZURE_OAI_DEPLOYMENT".into(),
        })
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise a label (stdout)
  nutrilens analyze ingredients.jpg nutrition.png

  # Save the summary to a file
  nutrilens analyze ingredients.jpg nutrition.png -o summary.txt

  # Images from URLs
  nutrilens analyze https://example.com/back.jpg https://example.com/table.png

  # Only run OCR and print what would be sent to the model
  nutrilens analyze --content-only ingredients.jpg nutrition.png

  # JSON report with the recognised content and timings
  nutrilens analyze --json ingredients.jpg nutrition.png > report.json

  # Write the summary with another provider instead of Azure OpenAI
  nutrilens analyze --provider openai --model gpt-4.1-mini ingredients.jpg nutrition.png

  # Browser upload page
  nutrilens serve --bind 127.0.0.1:8080

ENVIRONMENT VARIABLES:
  AZURE_FORM_RECOGNIZER_ENDPOINT  Document Intelligence endpoint (required)
  AZURE_FORM_RECOGNIZER_KEY       Document Intelligence key (required)
  AZURE_OAI_ENDPOINT              Azure OpenAI endpoint
  AZURE_OAI_KEY                   Azure OpenAI key
  AZURE_OAI_DEPLOYMENT            Azure OpenAI chat deployment name
  NUTRILENS_PROVIDER              edgequake-llm provider replacing Azure OpenAI
  NUTRILENS_MODEL                 Model for NUTRILENS_PROVIDER
  RUST_LOG                        Log filter (overrides -v / -q)

  Variables are also read from a `.env` file in the working directory.
"#;

/// Summarise food labels from an ingredients photo and a nutrition-table photo.
#[derive(Parser, Debug)]
#[command(
    name = "nutrilens",
    version,
    about = "Summarise food labels from an ingredients photo and a nutrition-table photo",
    long_about = "Reads an ingredients photo and a nutrition-facts photo with Azure AI Document \
Intelligence (prebuilt-layout), then asks a chat model acting as a nutritionist for a short \
summary of the product.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "NUTRILENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "NUTRILENS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyse one pair of label images.
    Analyze(AnalyzeArgs),
    /// Serve the HTML upload page.
    #[cfg(feature = "web")]
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Ingredients image: local .jpg/.jpeg/.png path or HTTP/HTTPS URL.
    ingredients: String,

    /// Nutrition-table image: local .jpg/.jpeg/.png path or HTTP/HTTPS URL.
    nutrition: String,

    /// Write the summary to this file instead of stdout.
    #[arg(short, long, env = "NUTRILENS_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the full report (summary, content, stats) as JSON.
    #[arg(long, env = "NUTRILENS_JSON")]
    json: bool,

    /// Also print the recognised content sent to the model.
    #[arg(long)]
    show_content: bool,

    /// Stop after OCR and print the recognised content; no summary.
    #[arg(long, conflicts_with = "show_content")]
    content_only: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "NUTRILENS_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    backend: BackendArgs,
}

#[cfg(feature = "web")]
#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "NUTRILENS_BIND", default_value = "127.0.0.1:8080")]
    bind: std::net::SocketAddr,

    #[command(flatten)]
    backend: BackendArgs,
}

/// Service credentials and tuning shared by both subcommands.
#[derive(Args, Debug)]
struct BackendArgs {
    /// Document Intelligence endpoint.
    #[arg(long, env = "AZURE_FORM_RECOGNIZER_ENDPOINT", hide_env_values = true)]
    analysis_endpoint: Option<String>,

    /// Document Intelligence key.
    #[arg(long, env = "AZURE_FORM_RECOGNIZER_KEY", hide_env_values = true)]
    analysis_key: Option<String>,

    /// Azure OpenAI endpoint.
    #[arg(long, env = "AZURE_OAI_ENDPOINT", hide_env_values = true)]
    chat_endpoint: Option<String>,

    /// Azure OpenAI key.
    #[arg(long, env = "AZURE_OAI_KEY", hide_env_values = true)]
    chat_key: Option<String>,

    /// Azure OpenAI chat deployment name.
    #[arg(long, env = "AZURE_OAI_DEPLOYMENT")]
    deployment: Option<String>,

    /// Use an edgequake-llm provider (openai, anthropic, gemini, ollama, …)
    /// for the summary instead of Azure OpenAI.
    #[arg(long, env = "NUTRILENS_PROVIDER", requires = "model")]
    provider: Option<String>,

    /// Model ID for --provider.
    #[arg(long, env = "NUTRILENS_MODEL")]
    model: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "NUTRILENS_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "NUTRILENS_TEMPERATURE", default_value_t = 0.6)]
    temperature: f32,

    /// Max tokens in the generated summary.
    #[arg(long, env = "NUTRILENS_MAX_TOKENS", default_value_t = 1200)]
    max_tokens: usize,

    /// Delay between analysis status polls, in milliseconds.
    #[arg(long, env = "NUTRILENS_POLL_INTERVAL_MS", default_value_t = 1000)]
    poll_interval: u64,

    /// Give up waiting for one image's analysis after this many seconds.
    #[arg(long, env = "NUTRILENS_POLL_TIMEOUT", default_value_t = 120)]
    poll_timeout: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "NUTRILENS_REQUEST_TIMEOUT", default_value_t = 60)]
    request_timeout: u64,

    /// Image download timeout in seconds (URL inputs).
    #[arg(long, env = "NUTRILENS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Parent directory for per-request scratch folders.
    #[arg(long, env = "NUTRILENS_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters during `analyze`, so
    // library INFO logs are hidden while it is shown.
    let spinner = match &cli.command {
        Command::Analyze(args) => !cli.quiet && !args.no_progress && !args.json,
        #[cfg(feature = "web")]
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Analyze(args) => run_analyze(args, cli.quiet, spinner).await,
        #[cfg(feature = "web")]
        Command::Serve(args) => {
            let config = build_config(&args.backend, None).await?;
            let analyzer = build_analyzer(&args.backend, config, false)?;
            if !cli.quiet {
                eprintln!(
                    "{} {}  http://{}",
                    cyan("◆"),
                    bold(REPORT_TITLE),
                    args.bind
                );
            }
            nutrilens::web::serve(args.bind, analyzer)
                .await
                .context("Upload server failed")
        }
    }
}

async fn run_analyze(args: AnalyzeArgs, quiet: bool, spinner: bool) -> Result<()> {
    let progress = spinner.then(CliProgressCallback::new);
    let callback = progress.clone().map(|cb| cb as ProgressCallback);

    let config = build_config(&args.backend, callback).await?;
    let analyzer = build_analyzer(&args.backend, config, args.content_only)?;

    if !quiet && !args.json {
        eprintln!("{} {}", cyan("◆"), bold(REPORT_TITLE));
    }

    // ── Content-only mode ────────────────────────────────────────────────
    if args.content_only {
        let timeout = analyzer.config().download_timeout_secs;
        let extracted = async {
            let ingredients = resolve_image(&args.ingredients, timeout).await?;
            let nutrition = resolve_image(&args.nutrition, timeout).await?;
            analyzer.extract(&ingredients, &nutrition).await
        }
        .await;
        if let Some(ref p) = progress {
            p.finish();
        }
        let extracted = extracted.context("Content extraction failed")?;

        if args.json {
            let json = serde_json::json!({
                "combined_content": extracted.combined,
                "ingredients": extracted.ingredients,
                "nutrition": extracted.nutrition,
                "analysis_duration_ms": extracted.analysis_duration_ms,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to serialise content")?
            );
        } else {
            write_stdout(&extracted.combined)?;
        }
        return Ok(());
    }

    // ── Full analysis ────────────────────────────────────────────────────
    let result = match args.output {
        Some(ref path) => {
            analyzer
                .analyze_to_file(&args.ingredients, &args.nutrition, path)
                .await
        }
        None => {
            analyzer
                .analyze_inputs(&args.ingredients, &args.nutrition)
                .await
        }
    };
    // Input resolution can fail before the pipeline reports anything.
    if let Some(ref p) = progress {
        p.finish();
    }
    let report = result.context("Analysis failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }

    if args.show_content {
        eprintln!("{}", bold("Recognised content:"));
        eprintln!("{}", dim(&report.combined_content));
    }

    match args.output {
        Some(ref path) => {
            if !quiet {
                eprintln!(
                    "{}  summary  →  {}",
                    green("✔"),
                    bold(&path.display().to_string())
                );
            }
        }
        None => {
            if !quiet {
                eprintln!("{}", bold(SUMMARY_HEADING));
            }
            write_stdout(&report.summary)?;
        }
    }

    if !quiet {
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  {}ms total",
            dim(&report.stats.prompt_tokens.to_string()),
            dim(&report.stats.completion_tokens.to_string()),
            report.stats.total_duration_ms,
        );
    }
    Ok(())
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    // Ensure a trailing newline on stdout.
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(
    args: &BackendArgs,
    progress: Option<ProgressCallback>,
) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .poll_interval_ms(args.poll_interval)
        .poll_timeout_secs(args.poll_timeout)
        .request_timeout_secs(args.request_timeout)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref dir) = args.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Wire up the layout client and whichever chat backend is configured.
fn build_analyzer(
    args: &BackendArgs,
    config: AnalysisConfig,
    content_only: bool,
) -> Result<LabelAnalyzer> {
    let (Some(endpoint), Some(key)) = (&args.analysis_endpoint, &args.analysis_key) else {
        bail!("AZURE_FORM_RECOGNIZER_ENDPOINT and AZURE_FORM_RECOGNIZER_KEY must be set");
    };
    let layout = AzureLayoutClient::new(AnalysisService::new(endpoint, key.clone())?, &config)?;

    let chat: Arc<dyn ChatCompletion> = match (&args.provider, &args.model) {
        (Some(provider), Some(model)) => Arc::new(ProviderChat::from_name(provider, model)?),
        _ => match (&args.chat_endpoint, &args.chat_key, &args.deployment) {
            (Some(endpoint), Some(key), Some(deployment)) => Arc::new(AzureChatClient::new(
                ChatService::new(endpoint, key.clone(), deployment.clone())?,
                &config,
            )?),
            _ if content_only => Arc::new(UnconfiguredChat),
            _ => bail!(
                "AZURE_OAI_ENDPOINT, AZURE_OAI_KEY and AZURE_OAI_DEPLOYMENT must be set \
                 (or pass --provider and --model)"
            ),
        },
    };

    Ok(LabelAnalyzer::new(Arc::new(layout), chat, config))
}
