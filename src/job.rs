//! Top-level job entry point.
//!
//! ```text
//! normalize ─▶ split ─▶ acquire_session ─▶ annotate ─▶ Orchestrator::run ─▶ close
//! ```
//!
//! Everything before `Orchestrator::run` is fatal on error. The browser
//! session, if any, is closed whatever the outcome of the run.

use crate::auth::{acquire_session, SessionHandle};
use crate::config::JobConfig;
use crate::content::{normalize, FetchSettings, NormalizedContent};
use crate::error::StudyGenError;
use crate::generators::GeneratorRegistry;
use crate::journal::Journal;
use crate::orchestrator::Orchestrator;
use crate::output::{DirectorySink, OutputSink};
use crate::report::RunReport;
use crate::topics::{Topic, TopicAnnotator, TopicSplitter};
use std::sync::Arc;
use tracing::info;

/// One invocation: a config plus the collaborators it runs with.
///
/// The defaults are the standard generator registry, a [`DirectorySink`]
/// rooted at [`JobConfig::resolved_output_dir`] and a session from
/// [`acquire_session`]. Each can be replaced, which is how tests run a job
/// without network access.
pub struct Job {
    config: Arc<JobConfig>,
    registry: GeneratorRegistry,
    sink: Option<Arc<dyn OutputSink>>,
    session: Option<SessionHandle>,
}

impl Job {
    pub fn new(config: JobConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: GeneratorRegistry::standard(),
            sink: None,
            session: None,
        }
    }

    pub fn with_registry(mut self, registry: GeneratorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Use `session` instead of acquiring one from the config.
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Normalise the input and split it into topics.
    pub async fn load_topics(&self) -> Result<(NormalizedContent, Vec<Topic>), StudyGenError> {
        let settings = FetchSettings {
            timeout_secs: self.config.download_timeout_secs,
        };
        let content = normalize(&self.config.input, &settings).await?;
        info!(
            "Loaded \"{}\" ({:?}, {} words)",
            content.title, content.source_kind, content.word_count
        );

        let splitter = TopicSplitter::new(
            self.config.split_strategy,
            self.config.target_topics,
            self.config.min_chars,
        );
        let topics = splitter.split(&content.text, &content.title)?;
        info!("Split into {} topic(s)", topics.len());
        Ok((content, topics))
    }

    pub async fn run(self) -> Result<RunReport, StudyGenError> {
        let (content, mut topics) = self.load_topics().await?;

        let session = match self.session {
            Some(ref s) => s.clone(),
            None => acquire_session(&self.config).await?,
        };
        let result = self.run_with_session(&content, &mut topics, &session).await;
        session.close().await;
        result
    }

    async fn run_with_session(
        &self,
        content: &NormalizedContent,
        topics: &mut [Topic],
        session: &SessionHandle,
    ) -> Result<RunReport, StudyGenError> {
        if self.config.annotate_topics {
            if let Some(llm) = session.llm() {
                let n = TopicAnnotator::new(Arc::clone(llm), self.config.concurrency)
                    .annotate(topics)
                    .await;
                info!("Annotated {}/{} topic(s)", n, topics.len());
            }
        }

        let output_dir = self.config.resolved_output_dir();
        info!("Output directory: {}", output_dir.display());
        let sink = self
            .sink
            .clone()
            .unwrap_or_else(|| Arc::new(DirectorySink::new(&output_dir)));

        let mut orchestrator = Orchestrator::new(
            Arc::clone(&self.config),
            Arc::new(self.registry.clone()),
            sink,
        )
        .with_document_title(content.title.clone());

        if self.config.journal {
            let path = self.config.journal_path();
            let journal = Journal::create(&path).await?;
            info!("Journal: {}", journal.path().display());
            orchestrator = orchestrator.with_journal(Arc::new(journal));
        }

        orchestrator.run(topics, session).await
    }
}

/// Run a complete job with the default collaborators.
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), notebooklm_gen::StudyGenError> {
/// use notebooklm_gen::{run_job, JobConfig};
///
/// let config = JobConfig::builder("lecture.pdf").api_key("AIza...").build()?;
/// let report = run_job(config).await?;
/// std::process::exit(report.exit_code());
/// # }
/// ```
pub async fn run_job(config: JobConfig) -> Result<RunReport, StudyGenError> {
    Job::new(config).run().await
}
