//! CLI binary for pageocr.
//!
//! A thin shim over the library crate: maps flags to `OcrConfig`, runs one
//! task per input and prints the outcomes.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use pageocr::{
    OcrConfig, PromptTemplate, TaskOutcome, TaskProgressCallback, TaskRunner, TaskState,
    TaskStateStore, Workspace,
};
use std::io;
use std::path::PathBuf;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Per-task progress bar ────────────────────────────────────────────────────

/// One bar per task inside a shared [`MultiProgress`]. Starts as a spinner
/// while the input is rendered, becomes a page counter once the page count
/// is known.
struct CliTaskProgress {
    bar: ProgressBar,
}

impl CliTaskProgress {
    fn new(multi: &MultiProgress, label: &str) -> Self {
        let bar = multi.add(ProgressBar::new(0));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix(label.to_string());
        bar.set_message("rendering…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn finish(&self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Finished { files, .. } => self
                .bar
                .finish_with_message(green(&format!("✔ {} files", files.len()))),
            TaskOutcome::Error { message, .. } => {
                self.bar.abandon_with_message(red(&format!("✘ {}", truncate(message, 80))))
            }
        }
    }
}

impl TaskProgressCallback for CliTaskProgress {
    fn on_task_start(&self, _task_id: &str, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:32.green/238}] {pos:>3}/{len} pages  {msg}  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, _total_pages: usize, progress: u8) {
        self.bar.set_position(page_num as u64);
        self.bar.set_message(format!("{progress:>3}%"));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # OCR a scanned PDF into ./workspace/results/ocr_task_<uuid>/
  pageocr run scan.pdf

  # Pick the task id yourself, then poll it from another shell
  pageocr run --task-id invoice-42 invoice.pdf
  pageocr status invoice-42

  # Several inputs, three at a time, JSON outcomes on stdout
  pageocr run --concurrency 3 --json a.png b.jpg c.pdf

  # Markdown-oriented prompt preset
  pageocr run --template doc-markdown paper.pdf

  # Go through an edgequake-llm provider instead of the raw endpoint
  pageocr run --provider openai --model gpt-4.1-mini page.png

ENVIRONMENT VARIABLES (also read from ./.env):
  DEEPSEEK_API_KEY     Bearer token for the chat-completions endpoint
  DEEPSEEK_BASE_URL    OpenAI-compatible base URL (default: SiliconFlow)
  DEEPSEEK_MODEL_ID    Model identifier (default: deepseek-ai/DeepSeek-OCR)
  MAX_CONCURRENCY      Tasks run at once by `pageocr run`
  PAGEOCR_WORKSPACE    Workspace root (default: ./workspace)
  PDFIUM_LIB_PATH      Directory containing libpdfium
  RUST_LOG             Overrides the log filter

RESULT LAYOUT:
  <workspace>/results/ocr_task_<id>/pages/page_<n>.md
  <workspace>/results/ocr_task_<id>/result.md
  <workspace>/results/ocr_task_<id>/metadata.json
  <workspace>/logs/task_<id>.json
"#;

/// OCR images and PDFs page by page with a remote vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pageocr",
    version,
    about = "OCR images and PDFs page by page with a remote vision model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Workspace root holding uploads/, results/ and logs/.
    #[arg(long, global = true, env = "PAGEOCR_WORKSPACE", default_value = "workspace")]
    workspace: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGEOCR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAGEOCR_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one OCR task per input file.
    Run(RunArgs),
    /// Print the persisted state of a task.
    Status {
        /// Task id given to (or printed by) `pageocr run`.
        task_id: String,
    },
    /// List the prompt presets.
    Templates,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Image or PDF files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Task id (single input only). Default: a random UUID per input.
    #[arg(long)]
    task_id: Option<String>,

    /// API key for the chat-completions endpoint.
    #[arg(long, env = "DEEPSEEK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL; `/chat/completions` is appended.
    #[arg(long, env = "DEEPSEEK_BASE_URL")]
    base_url: Option<String>,

    /// Model identifier.
    #[arg(long, env = "DEEPSEEK_MODEL_ID")]
    model: Option<String>,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama, …).
    #[arg(long, env = "PAGEOCR_PROVIDER")]
    provider: Option<String>,

    /// Number of tasks run at once.
    #[arg(short, long, env = "MAX_CONCURRENCY", default_value_t = 5)]
    concurrency: usize,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, env = "PAGEOCR_DPI", default_value_t = 144,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PAGEOCR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Prompt sent with every page. Overrides --template.
    #[arg(long, conflicts_with = "template")]
    prompt: Option<String>,

    /// Prompt preset (see `pageocr templates`).
    #[arg(long, short = 't')]
    template: Option<PromptTemplate>,

    /// Text to look for with `--template text-locate`.
    #[arg(long, requires = "template")]
    locate: Option<String>,

    /// Per-page API timeout in seconds.
    #[arg(long, env = "PAGEOCR_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Max completion tokens per page.
    #[arg(long, env = "PAGEOCR_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PAGEOCR_TEMPERATURE")]
    temperature: Option<f32>,

    /// Print outcomes as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bars.
    #[arg(long, env = "PAGEOCR_NO_PROGRESS")]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would tear the progress bars apart; keep them quiet
    // while bars are drawn.
    let show_progress = match &cli.command {
        Command::Run(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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
        Command::Run(ref args) => run_tasks(&cli, args, show_progress).await,
        Command::Status { ref task_id } => print_status(&cli.workspace, task_id).await,
        Command::Templates => {
            for t in PromptTemplate::ALL {
                println!("{:<12}  {}", bold(t.key()), t.prompt().replace('\n', "\\n"));
            }
            Ok(())
        }
    }
}

async fn run_tasks(cli: &Cli, args: &RunArgs, show_progress: bool) -> Result<()> {
    if args.task_id.is_some() && args.inputs.len() > 1 {
        bail!("--task-id can only be used with a single input");
    }

    let config = build_config(cli, args)?;
    let concurrency = config.max_concurrency;
    Workspace::new(&config.workspace_dir)
        .ensure()
        .context("Failed to create workspace")?;
    let runner = TaskRunner::new(config).context("Failed to set up recognizer")?;

    let prompt = match (&args.prompt, args.template) {
        (Some(p), _) => Some(p.clone()),
        (None, Some(PromptTemplate::TextLocate)) => match &args.locate {
            Some(target) => Some(PromptTemplate::text_locate(target)),
            None => bail!("--template text-locate needs --locate <TEXT>"),
        },
        (None, Some(t)) => Some(t.prompt().to_string()),
        (None, None) => None,
    };

    let jobs: Vec<(PathBuf, String)> = args
        .inputs
        .iter()
        .map(|input| {
            let id = args
                .task_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            (input.clone(), id)
        })
        .collect();

    let multi = MultiProgress::new();
    let outcomes: Vec<TaskOutcome> = stream::iter(jobs)
        .map(|(input, task_id)| {
            let runner = &runner;
            let multi = &multi;
            let prompt = prompt.as_deref();
            async move {
                let label = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| task_id.clone());
                let progress = show_progress.then(|| CliTaskProgress::new(multi, &label));
                let cb = progress.as_ref().map(|p| p as &dyn TaskProgressCallback);

                let outcome = runner.run(&input, &task_id, cb, prompt).await;
                if let Some(p) = &progress {
                    p.finish(&outcome);
                }
                outcome
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    if args.json {
        let json = serde_json::to_string_pretty(&outcomes).context("Failed to serialise outcomes")?;
        println!("{json}");
    } else if !cli.quiet {
        for outcome in &outcomes {
            match outcome {
                TaskOutcome::Finished {
                    task_id,
                    result_dir,
                    files,
                } => eprintln!(
                    "{} {}  {}  {}",
                    green("✔"),
                    bold(task_id),
                    result_dir.display(),
                    dim(&format!("{} files", files.len())),
                ),
                TaskOutcome::Error { task_id, message } => {
                    eprintln!("{} {}  {}", red("✘"), bold(task_id), red(message))
                }
            }
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_finished()).count();
    if failed > 0 {
        bail!("{failed} of {} task(s) failed", outcomes.len());
    }
    Ok(())
}

async fn print_status(workspace: &std::path::Path, task_id: &str) -> Result<()> {
    let store: TaskStateStore = Workspace::new(workspace).state_store();
    match store.read(task_id).await {
        Some(state) => {
            let json = serde_json::to_string_pretty(&state).context("Failed to serialise state")?;
            println!("{json}");
            if let TaskState::Error { .. } = state {
                std::process::exit(1);
            }
            Ok(())
        }
        None => {
            println!("absent");
            std::process::exit(2);
        }
    }
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, args: &RunArgs) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .workspace_dir(&cli.workspace)
        .max_concurrency(args.concurrency)
        .dpi(args.dpi)
        .api_timeout_secs(args.api_timeout);

    if let Some(ref key) = args.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = args.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref dir) = args.pdfium_lib {
        builder = builder.pdfium_library_path(dir);
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd);
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(t) = args.temperature {
        builder = builder.temperature(t);
    }

    builder.build().context("Invalid configuration")
}
