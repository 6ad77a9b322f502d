//! Configuration for one study-material generation job.
//!
//! Every knob lives in [`JobConfig`], built via [`JobConfigBuilder`]. The
//! config is immutable once the job starts and is shared between concurrent
//! work units as an `Arc<JobConfig>`.
//!
//! Generator names in [`JobConfig::enabled_kinds`] and
//! [`JobConfig::optional_kinds`] are kept as the raw strings the user typed.
//! They are resolved when the orchestrator builds its plan so that a typo
//! surfaces as [`StudyGenError::UnknownGenerator`] instead of being silently
//! dropped.

use crate::error::StudyGenError;
use crate::llm::LlmProvider;
use crate::progress::ProgressCallback;
use crate::topics::SplitStrategy;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default Gemini model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default WebDriver endpoint (a locally running `chromedriver`).
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Name of the transition journal written into the output directory.
pub const JOURNAL_FILE_NAME: &str = "nlmgen-journal.jsonl";

/// Configuration for a single job.
///
/// # Example
/// ```rust
/// use notebooklm_gen::JobConfig;
///
/// let config = JobConfig::builder("lecture.pdf")
///     .api_key("AIza...")
///     .concurrency(6)
///     .only(["handout", "flashcards", "quiz"])
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 6);
/// ```
#[derive(Clone)]
pub struct JobConfig {
    /// Local file path or http(s) URL of the source document.
    pub input: String,

    /// Root directory for generated materials. When `None`, see
    /// [`JobConfig::resolved_output_dir`].
    pub output_dir: Option<PathBuf>,

    /// Google account used to sign in to NotebookLM.
    pub email: Option<String>,
    pub password: Option<String>,

    /// Gemini API key. Without it every LLM-backed generator is skipped.
    pub api_key: Option<String>,

    /// Gemini model identifier. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Pre-constructed LLM provider. Takes precedence over `api_key`.
    pub provider: Option<Arc<dyn LlmProvider>>,

    /// Run the browser without a visible window. Default: false.
    pub headless: bool,

    /// Open a NotebookLM browser session even without credentials
    /// (relies on restored cookies). Default: false.
    pub use_notebook: bool,

    /// WebDriver endpoint used for the NotebookLM session.
    pub webdriver_url: String,

    /// Where browser cookies are saved between runs. `None` uses
    /// `~/.notebooklm-gen/cookies.json`.
    pub cookies_path: Option<PathBuf>,

    /// Maximum number of work units running at once. Default: 4.
    ///
    /// Units are network-bound; the bound exists to stay under API rate
    /// limits, not to save CPU.
    pub concurrency: usize,

    /// Retries per unit on a transient failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 1000.
    pub retry_backoff_ms: u64,

    /// Bound on a single unit including its retries. Default: 900 s.
    ///
    /// NotebookLM audio and video generation routinely takes several minutes.
    pub unit_timeout_secs: Option<u64>,

    /// Bound on the whole execution phase. Default: none.
    pub job_timeout_secs: Option<u64>,

    /// Seconds between progress snapshots. Default: 15.
    pub progress_interval_secs: u64,

    /// Desired number of topics for the balanced split. Default: 5.
    pub target_topics: usize,

    /// Minimum normalised input length in characters. Default: 200.
    pub min_chars: usize,

    /// How the document is cut into topics. Default: [`SplitStrategy::Headings`].
    pub split_strategy: SplitStrategy,

    /// Ask the LLM for topic titles, summaries and keywords. Default: true.
    pub annotate_topics: bool,

    /// Generator names to run. `None` runs every registered kind.
    pub enabled_kinds: Option<Vec<String>>,

    /// Generator names whose failure does not fail the job.
    /// `None` means `["video"]`.
    pub optional_kinds: Option<Vec<String>>,

    /// Sampling temperature override. `None` uses each generator's own default.
    pub temperature: Option<f32>,

    /// Maximum output tokens per LLM call. Default: 4096.
    pub max_tokens: usize,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Write the transition journal. Default: true.
    pub journal: bool,

    /// Per-unit progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            output_dir: None,
            email: None,
            password: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            headless: false,
            use_notebook: false,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            cookies_path: None,
            concurrency: 4,
            max_retries: 2,
            retry_backoff_ms: 1000,
            unit_timeout_secs: Some(900),
            job_timeout_secs: None,
            progress_interval_secs: 15,
            target_topics: 5,
            min_chars: 200,
            split_strategy: SplitStrategy::default(),
            annotate_topics: true,
            enabled_kinds: None,
            optional_kinds: None,
            temperature: None,
            max_tokens: 4096,
            download_timeout_secs: 60,
            journal: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("JobConfig")
            .field("input", &self.input)
            .field("output_dir", &self.output_dir)
            .field("email", &self.email)
            .field("password", &redacted(&self.password))
            .field("api_key", &redacted(&self.api_key))
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LlmProvider>"))
            .field("headless", &self.headless)
            .field("use_notebook", &self.use_notebook)
            .field("webdriver_url", &self.webdriver_url)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("unit_timeout_secs", &self.unit_timeout_secs)
            .field("job_timeout_secs", &self.job_timeout_secs)
            .field("progress_interval_secs", &self.progress_interval_secs)
            .field("target_topics", &self.target_topics)
            .field("split_strategy", &self.split_strategy)
            .field("enabled_kinds", &self.enabled_kinds)
            .field("optional_kinds", &self.optional_kinds)
            .finish()
    }
}

impl JobConfig {
    /// Create a new builder for the given input reference.
    pub fn builder(input: impl Into<String>) -> JobConfigBuilder {
        JobConfigBuilder {
            config: Self {
                input: input.into(),
                ..Self::default()
            },
        }
    }

    /// Whether NotebookLM credentials were supplied.
    pub fn has_credentials(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// The directory generated materials are written to.
    ///
    /// An explicit `output_dir` wins. Otherwise a local input `notes/ch1.pdf`
    /// writes to `notes/ch1_materials/`, and a URL input writes to
    /// `./output/`.
    pub fn resolved_output_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.output_dir {
            return dir.clone();
        }
        if crate::content::is_url(&self.input) {
            return PathBuf::from("output");
        }
        let path = Path::new(&self.input);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        path.parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{stem}_materials"))
    }

    /// Path of the transition journal for this job.
    pub fn journal_path(&self) -> PathBuf {
        self.resolved_output_dir().join(JOURNAL_FILE_NAME)
    }
}

/// Builder for [`JobConfig`].
pub struct JobConfigBuilder {
    config: JobConfig,
}

impl fmt::Debug for JobConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JobConfigBuilder").field(&self.config).finish()
    }
}

impl JobConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.email = Some(email.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn headless(mut self, v: bool) -> Self {
        self.config.headless = v;
        self
    }

    pub fn use_notebook(mut self, v: bool) -> Self {
        self.config.use_notebook = v;
        self
    }

    pub fn webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    pub fn cookies_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cookies_path = Some(path.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn unit_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.unit_timeout_secs = secs;
        self
    }

    pub fn job_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.job_timeout_secs = secs;
        self
    }

    pub fn progress_interval_secs(mut self, secs: u64) -> Self {
        self.config.progress_interval_secs = secs.max(1);
        self
    }

    pub fn target_topics(mut self, n: usize) -> Self {
        self.config.target_topics = n.max(1);
        self
    }

    pub fn min_chars(mut self, n: usize) -> Self {
        self.config.min_chars = n;
        self
    }

    pub fn split_strategy(mut self, strategy: SplitStrategy) -> Self {
        self.config.split_strategy = strategy;
        self
    }

    pub fn annotate_topics(mut self, v: bool) -> Self {
        self.config.annotate_topics = v;
        self
    }

    /// Restrict the job to the named generators.
    pub fn only<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.enabled_kinds = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    /// Mark the named generators as best-effort.
    pub fn optional<I, S>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.optional_kinds = Some(kinds.into_iter().map(Into::into).collect());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn journal(mut self, v: bool) -> Self {
        self.config.journal = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<JobConfig, StudyGenError> {
        let c = &self.config;
        if c.input.trim().is_empty() {
            return Err(StudyGenError::InvalidConfig("input must not be empty".into()));
        }
        if c.concurrency == 0 {
            return Err(StudyGenError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.max_tokens == 0 {
            return Err(StudyGenError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if matches!(c.unit_timeout_secs, Some(0)) || matches!(c.job_timeout_secs, Some(0)) {
            return Err(StudyGenError::InvalidConfig(
                "timeouts must be ≥ 1 second when set".into(),
            ));
        }
        if c.email.is_some() != c.password.is_some() {
            return Err(StudyGenError::InvalidConfig(
                "email and password must be given together".into(),
            ));
        }
        Ok(self.config)
    }
}
