//! CLI binary for notebooklm-gen.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `JobConfig`, renders progress and prints the run report.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use notebooklm_gen::report::{EXIT_FATAL, EXIT_OK, SUMMARY_LOG_TARGET};
use notebooklm_gen::{
    journal, run_job, JobConfig, OrchestrationProgressCallback, ProgressCallback,
    ProgressSnapshot, RunReport, SplitStrategy, WorkUnit,
};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Filter for the `--log-file` layer: everything from this crate, `info`
/// from dependencies.
const FILE_LOG_FILTER: &str = "info,notebooklm_gen=debug,nlmgen=debug";

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

/// Terminal progress callback: one bar for the whole plan plus a log line per
/// finished unit. Units finish out of order when concurrency > 1.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start per unit id.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Starts as a spinner; `on_plan_built` turns it into a bar.
    fn new() -> Arc<Self> {
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_prefix("nlmgen");
        bar.set_message("loading document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} units  {msg}  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, id: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&id))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl OrchestrationProgressCallback for CliProgressCallback {
    fn on_plan_built(&self, total: usize, skipped: usize) {
        self.activate_bar(total);
        self.bar.inc(skipped as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Generating {} units ({} skipped)…",
                total - skipped,
                skipped
            ))
        ));
    }

    fn on_unit_start(&self, unit: &WorkUnit) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(unit.id, Instant::now());
        }
        self.bar.set_message(unit.label());
    }

    fn on_unit_complete(&self, unit: &WorkUnit, artifact: &Path) {
        let secs = self.elapsed_secs(unit.id);
        self.bar.println(format!(
            "  {} {:<28}  {}  {}",
            green("✓"),
            unit.label(),
            dim(&artifact.display().to_string()),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_unit_error(&self, unit: &WorkUnit, error: &str) {
        let secs = self.elapsed_secs(unit.id);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        let marker = if unit.required { red("✗") } else { cyan("✗") };
        self.bar.println(format!(
            "  {} {:<28}  {}  {}",
            marker,
            unit.label(),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_snapshot(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_message(format!(
            "{} running, {} failed",
            snapshot.counts.running, snapshot.counts.failed
        ));
    }

    fn on_run_complete(&self, report: &RunReport) {
        self.bar.finish_and_clear();
        let c = &report.counts;
        let produced = c.total() - c.skipped;
        if self.errors.load(Ordering::SeqCst) == 0 {
            eprintln!(
                "{} {} units generated successfully",
                green("✔"),
                bold(&c.succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} units generated  ({} failed)",
                if c.succeeded == 0 { red("✘") } else { cyan("⚠") },
                bold(&c.succeeded.to_string()),
                produced,
                red(&c.failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every material kind for a PDF (written to lecture_materials/)
  nlmgen lecture.pdf

  # Only a few kinds, into a chosen directory
  nlmgen notes.md --only handout,flashcards,quiz -o study/

  # Include NotebookLM video overviews (needs chromedriver)
  chromedriver --port=9515 &
  nlmgen lecture.pdf --email me@gmail.com --password '...'

  # Bounded run: 10 minutes for the whole job, 2 minutes per unit
  nlmgen lecture.pdf --job-timeout 600 --unit-timeout 120

  # Rebuild the report of an earlier run without re-running it
  nlmgen --replay lecture_materials/nlmgen-journal.jsonl

  # Machine-readable report
  nlmgen lecture.pdf --json > report.json

  # Keep a debug log next to the materials
  nlmgen lecture.pdf --log-file lecture_materials/nlmgen.log

MATERIAL KINDS:
  handout  cheatsheet  mindmap  audiobook  story
  strategy  flashcards  quiz  discussion  video

  video needs a NotebookLM session; every other kind needs a Gemini API key.
  Kinds whose capability is missing are reported as skipped.

EXIT CODES:
  0  every required unit succeeded (optional failures and skips allowed)
  1  at least one required unit failed
  2  fatal error: bad input, bad config, login failure

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key
  GOOGLE_EMAIL            Google account for NotebookLM
  GOOGLE_PASSWORD         Password for GOOGLE_EMAIL
  NLMGEN_MODEL            Override the Gemini model ID
  NLMGEN_WEBDRIVER_URL    WebDriver endpoint (default http://localhost:9515)
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  RUST_LOG                Log filter, overrides -v/-q
"#;

/// Generate study materials from a document with Gemini and NotebookLM.
#[derive(Parser, Debug)]
#[command(
    name = "nlmgen",
    version,
    about = "Generate study materials from a document with Gemini and NotebookLM",
    long_about = "Split a PDF, Markdown, text file or web page into topics and generate \
handouts, cheatsheets, mindmaps, audiobook scripts, stories, learning strategies, \
flashcards, quizzes, panel discussions and NotebookLM video overviews for each topic.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "replay")]
    input: Option<String>,

    /// Output directory. Default: `<input>_materials/` next to the input, `./output` for URLs.
    #[arg(short, long, env = "NLMGEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Google account email for NotebookLM.
    #[arg(long, env = "GOOGLE_EMAIL")]
    email: Option<String>,

    /// Google account password for NotebookLM.
    #[arg(long, env = "GOOGLE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini model ID.
    #[arg(long, env = "NLMGEN_MODEL", default_value = notebooklm_gen::config::DEFAULT_MODEL)]
    model: String,

    /// Run the browser without a window.
    #[arg(long)]
    headless: bool,

    /// Open a NotebookLM session even without credentials (reuses saved cookies).
    #[arg(long)]
    notebook: bool,

    /// WebDriver endpoint for the browser session.
    #[arg(
        long,
        env = "NLMGEN_WEBDRIVER_URL",
        default_value = notebooklm_gen::config::DEFAULT_WEBDRIVER_URL
    )]
    webdriver_url: String,

    /// Cookie file for the NotebookLM session.
    #[arg(long)]
    cookies: Option<PathBuf>,

    /// Only these kinds (comma-separated).
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,

    /// Kinds whose failure does not fail the run (comma-separated). Default: video.
    #[arg(long, value_delimiter = ',')]
    optional: Vec<String>,

    /// Target number of topics.
    #[arg(long, default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..=50))]
    topics: u64,

    /// Split strategy: headings, balanced or single.
    #[arg(long, default_value = "headings", value_parser = parse_split)]
    split: SplitStrategy,

    /// Skip LLM topic titles and keywords.
    #[arg(long)]
    no_annotate: bool,

    /// Units generated at the same time.
    #[arg(short, long, env = "NLMGEN_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per unit after a transient failure.
    #[arg(long, default_value_t = 2)]
    max_retries: u32,

    /// Base retry backoff in milliseconds (doubled per retry).
    #[arg(long, default_value_t = 1000)]
    retry_backoff: u64,

    /// Seconds per unit attempt; 0 disables.
    #[arg(long, default_value_t = 900)]
    unit_timeout: u64,

    /// Seconds for the whole run.
    #[arg(long)]
    job_timeout: Option<u64>,

    /// Seconds between progress snapshots.
    #[arg(long, default_value_t = 15)]
    progress_interval: u64,

    /// Sampling temperature override (0.0–2.0).
    #[arg(long)]
    temperature: Option<f32>,

    /// Seconds allowed for downloading a URL input.
    #[arg(long, default_value_t = 60)]
    download_timeout: u64,

    /// Do not write the transition journal.
    #[arg(long)]
    no_journal: bool,

    /// Rebuild and print the report from a journal file, then exit.
    #[arg(long, value_name = "JOURNAL", conflicts_with = "input")]
    replay: Option<PathBuf>,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Also write a debug-level log to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_split(s: &str) -> Result<SplitStrategy, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.replay.is_none();
    let log_file = match cli.log_file.as_deref().map(open_log_file).transpose() {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{} cannot open log file: {}", red("error:"), e);
            return ExitCode::from(EXIT_FATAL as u8);
        }
    };

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_filter(&cli, show_progress))),
    );
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(EnvFilter::new(FILE_LOG_FILTER))
    });
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    let code = match run(&cli, show_progress).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            EXIT_FATAL
        }
    };
    ExitCode::from(code as u8)
}

/// Stderr log filter. The end-of-run summary passes at every verbosity.
fn log_filter(cli: &Cli, show_progress: bool) -> String {
    let base = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    format!("{base},{SUMMARY_LOG_TARGET}=info")
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    File::create(path)
}

async fn run(cli: &Cli, show_progress: bool) -> Result<i32> {
    // ── Replay mode ──────────────────────────────────────────────────────
    if let Some(ref path) = cli.replay {
        let units = journal::replay(path)
            .await
            .with_context(|| format!("Failed to replay {}", path.display()))?;
        let report = RunReport::from_units(units);
        print_report(cli, &report)?;
        return Ok(report.exit_code());
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn OrchestrationProgressCallback>)
    } else {
        None
    };

    let config = build_config(cli, progress)?;
    let output_dir = config.resolved_output_dir();

    // ── Run ──────────────────────────────────────────────────────────────
    let report = run_job(config).await.context("Generation failed")?;

    print_report(cli, &report)?;
    if !cli.quiet && !cli.json {
        eprintln!(
            "{}  {}/{} units  →  {}",
            if report.exit_code() == EXIT_OK {
                green("✔")
            } else {
                red("✘")
            },
            report.counts.succeeded,
            report.counts.total(),
            bold(&output_dir.display().to_string()),
        );
    }
    Ok(report.exit_code())
}

fn print_report(cli: &Cli, report: &RunReport) -> Result<()> {
    if cli.json {
        let json = serde_json::to_string_pretty(report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print!("{report}");
    }
    Ok(())
}

/// Map CLI args to `JobConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<JobConfig> {
    let Some(ref input) = cli.input else {
        bail!("an input file or URL is required");
    };

    let mut builder = JobConfig::builder(input.clone())
        .model(cli.model.clone())
        .headless(cli.headless)
        .use_notebook(cli.notebook)
        .webdriver_url(cli.webdriver_url.clone())
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff)
        .unit_timeout_secs((cli.unit_timeout > 0).then_some(cli.unit_timeout))
        .job_timeout_secs(cli.job_timeout)
        .progress_interval_secs(cli.progress_interval)
        .target_topics(cli.topics as usize)
        .split_strategy(cli.split)
        .annotate_topics(!cli.no_annotate)
        .download_timeout_secs(cli.download_timeout)
        .journal(!cli.no_journal);

    if let Some(ref dir) = cli.output {
        builder = builder.output_dir(dir.clone());
    }
    match (&cli.email, &cli.password) {
        (Some(email), Some(password)) => {
            builder = builder.credentials(email.clone(), password.clone());
        }
        (None, None) => {}
        _ => bail!("--email and --password must be given together"),
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref path) = cli.cookies {
        builder = builder.cookies_path(path.clone());
    }
    if !cli.only.is_empty() {
        builder = builder.only(cli.only.iter().cloned());
    }
    if !cli.optional.is_empty() {
        builder = builder.optional(cli.optional.iter().cloned());
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
