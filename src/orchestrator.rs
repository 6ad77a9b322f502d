//! The orchestrator: builds the (topic × generator) plan and runs it.
//!
//! ## Execution model
//!
//! Every runnable unit becomes one task in a [`JoinSet`]. Before doing any
//! work a task takes, in order:
//!
//! 1. the locks of the exclusive [`Resource`]s its generator declares
//!    (always in sorted order, so two tasks can never deadlock);
//! 2. a permit from the job-wide [`Semaphore`] (`concurrency`, default 4).
//!
//! Only then does the unit move to `Running`. A unit queued behind the
//! browser therefore never holds a permit, and LLM-only units keep all the
//! concurrency for themselves while browser units run one at a time.
//!
//! Inside a unit, attempts are strictly sequential: up to `1 + max_retries`
//! of them, only for transient errors, with exponential backoff
//! (`retry_backoff_ms * 2^(retry - 1)`). The optional unit timeout bounds the
//! attempts and the write together. A panic inside a generator is caught and
//! fails that unit only.
//!
//! When the job timeout fires, outstanding tasks are aborted and every
//! non-terminal unit is failed with [`UnitError::Timeout`].

use crate::auth::SessionHandle;
use crate::board::{WorkBoard, WorkUnit};
use crate::config::JobConfig;
use crate::error::{StudyGenError, UnitError};
use crate::generators::{GenerationContext, Generator, GeneratorKind, GeneratorRegistry, Resource};
use crate::journal::Journal;
use crate::output::OutputSink;
use crate::progress::{NoopProgressCallback, ProgressCallback, ProgressReporter};
use crate::report::{RunReport, SUMMARY_LOG_TARGET};
use crate::topics::Topic;
use futures::FutureExt;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// The fixed set of units for one run.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Every unit, in `Pending`, ids equal to positions.
    pub units: Vec<WorkUnit>,
    /// Units to skip up front, with the reason.
    pub skips: BTreeMap<usize, String>,
    pub kinds: Vec<GeneratorKind>,
    pub topic_count: usize,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units that will actually run.
    pub fn runnable(&self) -> impl Iterator<Item = &WorkUnit> {
        self.units.iter().filter(|u| !self.skips.contains_key(&u.id))
    }
}

/// Runs a plan against a registry, a session and an output sink.
pub struct Orchestrator {
    config: Arc<JobConfig>,
    registry: Arc<GeneratorRegistry>,
    sink: Arc<dyn OutputSink>,
    callback: ProgressCallback,
    journal: Option<Arc<Journal>>,
    document_title: String,
}

impl Orchestrator {
    pub fn new(
        config: Arc<JobConfig>,
        registry: Arc<GeneratorRegistry>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let callback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            config,
            registry,
            sink,
            callback,
            journal: None,
            document_title: String::new(),
        }
    }

    /// Record every transition in `journal`.
    pub fn with_journal(mut self, journal: Arc<Journal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_document_title(mut self, title: impl Into<String>) -> Self {
        self.document_title = title.into();
        self
    }

    /// Kinds to run: the configured filter (deduplicated, catalog order) or
    /// every registered kind.
    pub fn enabled_kinds(&self) -> Result<Vec<GeneratorKind>, StudyGenError> {
        let Some(ref names) = self.config.enabled_kinds else {
            return Ok(self.registry.kinds());
        };
        let mut kinds = BTreeSet::new();
        for name in names {
            let kind: GeneratorKind = name.parse()?;
            self.registry.get(kind)?;
            kinds.insert(kind);
        }
        Ok(kinds.into_iter().collect())
    }

    /// Kinds whose failure does not fail the job.
    pub fn optional_kinds(&self) -> Result<BTreeSet<GeneratorKind>, StudyGenError> {
        match self.config.optional_kinds {
            None => Ok(BTreeSet::from([GeneratorKind::Video])),
            Some(ref names) => names.iter().map(|n| n.parse()).collect(),
        }
    }

    /// Topic-major cartesian product of `topics` and the enabled kinds.
    ///
    /// Units whose generator needs a capability `session` lacks are listed
    /// in [`Plan::skips`].
    pub fn build_plan(
        &self,
        topics: &[Topic],
        session: &SessionHandle,
    ) -> Result<Plan, StudyGenError> {
        let kinds = self.enabled_kinds()?;
        let optional = self.optional_kinds()?;

        let mut generators = Vec::with_capacity(kinds.len());
        for &kind in &kinds {
            generators.push(self.registry.get(kind)?);
        }

        let mut units = Vec::with_capacity(topics.len() * kinds.len());
        let mut skips = BTreeMap::new();
        for topic in topics {
            for generator in &generators {
                let kind = generator.kind();
                let id = units.len();
                units.push(WorkUnit::new(
                    id,
                    topic.id.clone(),
                    topic.ordinal,
                    topic.title.clone(),
                    kind,
                    !optional.contains(&kind),
                ));
                let missing = generator
                    .requirements()
                    .iter()
                    .find(|c| !session.has(**c));
                if let Some(cap) = missing {
                    skips.insert(id, cap.missing_reason().to_string());
                }
            }
        }

        Ok(Plan {
            units,
            skips,
            kinds,
            topic_count: topics.len(),
        })
    }

    /// Execute the whole plan and return the final report.
    ///
    /// Only plan-time problems are errors; unit failures end up in the
    /// report.
    pub async fn run(
        &self,
        topics: &[Topic],
        session: &SessionHandle,
    ) -> Result<RunReport, StudyGenError> {
        let started = Instant::now();
        let plan = self.build_plan(topics, session)?;
        let board = Arc::new(WorkBoard::new(self.journal.clone()));
        board.add_units(plan.units.clone()).await;
        for (&id, reason) in &plan.skips {
            board.skip(id, reason.clone()).await;
        }
        info!(
            "Plan: {} unit(s) = {} topic(s) × {} kind(s), {} skipped",
            plan.len(),
            plan.topic_count,
            plan.kinds.len(),
            plan.skips.len()
        );
        if !plan.skips.is_empty() {
            let reasons: BTreeSet<&str> = plan.skips.values().map(String::as_str).collect();
            info!("Skipping units: {}", reasons.into_iter().collect::<Vec<_>>().join("; "));
        }
        self.callback.on_plan_built(plan.len(), plan.skips.len());

        let topics_by_id: HashMap<&str, Arc<Topic>> = topics
            .iter()
            .map(|t| (t.id.as_str(), Arc::new(t.clone())))
            .collect();
        let mut resource_locks: BTreeMap<Resource, Arc<Mutex<()>>> = BTreeMap::new();
        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            backoff_ms: self.config.retry_backoff_ms,
            unit_timeout: self.config.unit_timeout_secs.map(Duration::from_secs),
        };

        let mut prepared = Vec::new();
        for unit in plan.runnable() {
            let generator = self.registry.get(unit.kind)?;
            let Some(topic) = topics_by_id.get(unit.topic_id.as_str()) else {
                return Err(StudyGenError::Internal(format!(
                    "unit #{} refers to unknown topic {}",
                    unit.id, unit.topic_id
                )));
            };

            let mut resources = generator.resources(session);
            resources.sort();
            resources.dedup();
            let locks: Vec<Arc<Mutex<()>>> = resources
                .iter()
                .map(|r| Arc::clone(resource_locks.entry(*r).or_default()))
                .collect();

            let mut ctx = GenerationContext::new(session.clone(), self.document_title.clone());
            ctx.temperature = self.config.temperature;
            ctx.max_tokens = self.config.max_tokens;

            let task = UnitTask {
                id: unit.id,
                label: unit.label(),
                topic: Arc::clone(topic),
                generator,
                ctx,
                board: Arc::clone(&board),
                sink: Arc::clone(&self.sink),
                callback: Arc::clone(&self.callback),
                policy: policy.clone(),
                attempts_made: AtomicU32::new(0),
            };
            prepared.push((task, locks));
        }

        // The fields are public, so a hand-built config may bypass the builder's clamps.
        let reporter = ProgressReporter::spawn(
            Arc::clone(&board),
            Duration::from_secs(self.config.progress_interval_secs.max(1)),
            Arc::clone(&self.callback),
        );
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (task, locks) in prepared {
            let permits = Arc::clone(&permits);
            tasks.spawn(async move { task.run(locks, permits).await });
        }
        debug!("Spawned {} unit task(s)", tasks.len());

        match self.config.job_timeout_secs {
            Some(secs) => {
                let finished =
                    tokio::time::timeout(Duration::from_secs(secs), join_all(&mut tasks)).await;
                if finished.is_err() {
                    warn!("Job timeout of {}s reached; aborting {} task(s)", secs, tasks.len());
                    tasks.abort_all();
                    join_all(&mut tasks).await;
                    self.fail_outstanding(&board, secs).await;
                }
            }
            None => join_all(&mut tasks).await,
        }

        reporter.stop().await;
        let report = RunReport::from_units(board.snapshot().await);
        info!(
            target: SUMMARY_LOG_TARGET,
            "Run finished in {:.1}s: {}",
            started.elapsed().as_secs_f64(),
            report.summary_json()
        );
        self.callback.on_run_complete(&report);
        Ok(report)
    }

    async fn fail_outstanding(&self, board: &WorkBoard, secs: u64) {
        let outstanding: Vec<usize> = board
            .snapshot()
            .await
            .into_iter()
            .filter(|u| !u.status.is_terminal())
            .map(|u| u.id)
            .collect();
        let failed = board.fail_outstanding(secs).await;
        warn!("{} unit(s) failed by the job timeout", failed);
        for id in outstanding {
            if let Some(unit) = board.get(id).await {
                if let Some(ref err) = unit.error {
                    self.callback.on_unit_error(&unit, &err.to_string());
                }
            }
        }
    }
}

async fn join_all(tasks: &mut JoinSet<()>) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                warn!("Unit task panicked outside its generator: {}", e);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct RetryPolicy {
    max_retries: u32,
    backoff_ms: u64,
    unit_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry.saturating_sub(1));
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}

/// One unit's worth of work, owned by its task.
struct UnitTask {
    id: usize,
    label: String,
    topic: Arc<Topic>,
    generator: Arc<dyn Generator>,
    ctx: GenerationContext,
    board: Arc<WorkBoard>,
    sink: Arc<dyn OutputSink>,
    callback: ProgressCallback,
    policy: RetryPolicy,
    attempts_made: AtomicU32,
}

impl UnitTask {
    async fn run(self, locks: Vec<Arc<Mutex<()>>>, permits: Arc<Semaphore>) {
        let mut _held = Vec::with_capacity(locks.len());
        for lock in locks {
            _held.push(lock.lock_owned().await);
        }
        let Ok(_permit) = permits.acquire_owned().await else {
            warn!("{}: worker pool closed before the unit could start", self.label);
            return;
        };
        if !self.board.start(self.id).await {
            return;
        }
        if let Some(unit) = self.board.get(self.id).await {
            self.callback.on_unit_start(&unit);
        }
        debug!("{}: started", self.label);

        let outcome = match self.policy.unit_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.attempt_all()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(UnitError::Timeout {
                    secs: limit.as_secs(),
                    started: true,
                }),
            },
            None => self.attempt_all().await,
        };
        let attempts = self.attempts_made.load(Ordering::SeqCst);

        match outcome {
            Ok(path) => {
                info!("{}: done after {} attempt(s) → {}", self.label, attempts, path.display());
                self.board.succeed(self.id, attempts, path.clone()).await;
                if let Some(unit) = self.board.get(self.id).await {
                    self.callback.on_unit_complete(&unit, &path);
                }
            }
            Err(err) => {
                warn!("{}: failed: {}", self.label, err);
                let message = err.to_string();
                self.board.fail(self.id, attempts, err).await;
                if let Some(unit) = self.board.get(self.id).await {
                    self.callback.on_unit_error(&unit, &message);
                }
            }
        }
    }

    /// Generate with retries, then persist.
    async fn attempt_all(&self) -> Result<PathBuf, UnitError> {
        let mut retry = 0;
        loop {
            let attempt = retry + 1;
            self.attempts_made.store(attempt, Ordering::SeqCst);
            let mut ctx = self.ctx.clone();
            ctx.attempt = attempt;

            let generated = AssertUnwindSafe(self.generator.generate(&self.topic, &ctx))
                .catch_unwind()
                .await;
            let result = match generated {
                Ok(result) => result,
                Err(payload) => {
                    return Err(UnitError::Panicked {
                        detail: panic_message(payload.as_ref()),
                    })
                }
            };

            match result {
                Ok(artifact) => {
                    let category = self.generator.kind().category_dir();
                    return self
                        .sink
                        .persist(category, &artifact)
                        .await
                        .map_err(|e| UnitError::Write {
                            path: e.path.clone(),
                            detail: e.source.to_string(),
                        });
                }
                Err(e) if e.is_transient() && retry < self.policy.max_retries => {
                    retry += 1;
                    let delay = self.policy.backoff(retry);
                    warn!(
                        "{}: attempt {} failed ({}); retry {}/{} in {}ms",
                        self.label,
                        attempt,
                        e,
                        retry,
                        self.policy.max_retries,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(UnitError::Generation {
                        attempts: attempt,
                        detail: e.to_string(),
                    })
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
