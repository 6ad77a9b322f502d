//! Integration tests for the orchestrator and the job entry point.
//!
//! Every generator here is scripted, and the LLM is an in-memory fake, so
//! these tests need no network access, no API key and no browser.
//!
//! Run with:
//!   cargo test --test orchestrator -- --nocapture

use async_trait::async_trait;
use notebooklm_gen::error::{GenerationError, LlmError, UnitError};
use notebooklm_gen::llm::{ChatMessage, CompletionOptions, LlmResponse};
use notebooklm_gen::report::{EXIT_OK, EXIT_UNIT_FAILURES, SUMMARY_LOG_TARGET};
use notebooklm_gen::{
    journal, Artifact, ArtifactPart, Capability, DirectorySink, GenerationContext, Generator,
    GeneratorKind, GeneratorRegistry, Job, JobConfig, LlmProvider, OrchestrationProgressCallback,
    Orchestrator, Resource, RunReport, SessionHandle, SplitStrategy, Topic, UnitStatus, WorkUnit,
};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Behavior {
    Succeed,
    /// Fail with a rate limit this many times, then succeed.
    FlakyTimes(u32),
    /// Fail with a non-retryable auth error.
    Reject,
    Sleep(Duration),
    Panic,
}

struct ScriptedGenerator {
    kind: GeneratorKind,
    needs: &'static [Capability],
    resources: Vec<Resource>,
    behavior: Behavior,
    calls: AtomicU32,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(kind: GeneratorKind, behavior: Behavior) -> Arc<Self> {
        Self::build(kind, behavior, &[], vec![])
    }

    fn build(
        kind: GeneratorKind,
        behavior: Behavior,
        needs: &'static [Capability],
        resources: Vec<Resource>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            needs,
            resources,
            behavior,
            calls: AtomicU32::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn kind(&self) -> GeneratorKind {
        self.kind
    }

    fn requirements(&self) -> &[Capability] {
        self.needs
    }

    fn resources(&self, _session: &SessionHandle) -> Vec<Resource> {
        self.resources.clone()
    }

    async fn generate(
        &self,
        topic: &Topic,
        _ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let result: Result<(), GenerationError> = match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::FlakyTimes(n) if call <= n => Err(LlmError::RateLimited.into()),
            Behavior::FlakyTimes(_) => Ok(()),
            Behavior::Reject => Err(LlmError::Auth("API key not valid".into()).into()),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
            Behavior::Panic => panic!("scripted generator exploded"),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result.map(|()| {
            Artifact::new(self.kind, topic).with_part(ArtifactPart::text(
                "md",
                format!("# {} for {}\n", self.kind, topic.title),
            ))
        })
    }
}

/// Answers every chat request with the same text.
struct CannedLlm {
    answer: String,
    calls: AtomicUsize,
}

impl CannedLlm {
    fn new(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl LlmProvider for CannedLlm {
    fn name(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        "canned-1"
    }

    async fn chat(
        &self,
        _messages: &[ChatMessage],
        _options: Option<&CompletionOptions>,
    ) -> Result<LlmResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse {
            content: self.answer.clone(),
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct RecordingCallback {
    planned: Mutex<Option<(usize, usize)>>,
    started: AtomicUsize,
    completed: AtomicUsize,
    errored: AtomicUsize,
    finished: AtomicUsize,
}

impl OrchestrationProgressCallback for RecordingCallback {
    fn on_plan_built(&self, total: usize, skipped: usize) {
        *self.planned.lock().unwrap() = Some((total, skipped));
    }

    fn on_unit_start(&self, _unit: &WorkUnit) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unit_complete(&self, _unit: &WorkUnit, artifact: &Path) {
        assert!(artifact.exists(), "{} missing", artifact.display());
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unit_error(&self, _unit: &WorkUnit, _error: &str) {
        self.errored.fetch_add(1, Ordering::SeqCst);
    }

    fn on_run_complete(&self, _report: &RunReport) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

fn topics(n: usize) -> Vec<Topic> {
    (1..=n)
        .map(|i| Topic {
            id: format!("topic-{i:02}"),
            ordinal: i,
            title: format!("Chapter {i}"),
            body: format!("Body of chapter {i}. Cells divide by mitosis."),
            summary: String::new(),
            keywords: vec!["mitosis".into()],
        })
        .collect()
}

fn llm_session() -> SessionHandle {
    SessionHandle::default().with_llm(CannedLlm::new("# Notes\n\nSome notes.\n"))
}

fn registry(generators: &[Arc<ScriptedGenerator>]) -> GeneratorRegistry {
    generators
        .iter()
        .fold(GeneratorRegistry::empty(), |r, g| r.with(g.clone()))
}

fn orchestrator(
    config: JobConfig,
    generators: &[Arc<ScriptedGenerator>],
    dir: &TempDir,
) -> Orchestrator {
    Orchestrator::new(
        Arc::new(config),
        Arc::new(registry(generators)),
        Arc::new(DirectorySink::new(dir.path())),
    )
}

fn config() -> notebooklm_gen::JobConfigBuilder {
    JobConfig::builder("notes.md")
        .retry_backoff_ms(1)
        .progress_interval_secs(1)
        .journal(false)
}

fn statuses(report: &RunReport, kind: GeneratorKind) -> Vec<UnitStatus> {
    report
        .units
        .iter()
        .filter(|u| u.kind == kind)
        .map(|u| u.status)
        .collect()
}

// ── Plan and happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_every_unit_reaches_a_terminal_state() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Flashcards, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Quiz, Behavior::Succeed),
    ];
    let orch = orchestrator(config().build().unwrap(), &gens, &dir);

    let report = assert_ok!(orch.run(&topics(3), &llm_session()).await);

    assert_eq!(report.units.len(), 9);
    assert!(report.units.iter().all(|u| u.status.is_terminal()));
    assert_eq!(report.counts.succeeded, 9);
    assert_eq!(report.exit_code(), EXIT_OK);
    for unit in &report.units {
        let path = unit.artifact.as_ref().expect("artifact path");
        assert!(path.starts_with(dir.path()));
        assert!(path.exists(), "{} missing", path.display());
        assert_eq!(unit.attempts, 1);
    }
    for g in &gens {
        assert_eq!(g.calls(), 3);
    }
}

#[tokio::test]
async fn test_plan_is_topic_major() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Quiz, Behavior::Succeed),
    ];
    let orch = orchestrator(config().build().unwrap(), &gens, &dir);

    let plan = assert_ok!(orch.build_plan(&topics(2), &llm_session()));
    let order: Vec<(usize, GeneratorKind)> =
        plan.units.iter().map(|u| (u.topic_ordinal, u.kind)).collect();
    assert_eq!(
        order,
        vec![
            (1, GeneratorKind::Handout),
            (1, GeneratorKind::Quiz),
            (2, GeneratorKind::Handout),
            (2, GeneratorKind::Quiz),
        ]
    );
    assert!(plan.skips.is_empty());
}

#[tokio::test]
async fn test_only_filter_rejects_unregistered_kind() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed)];
    let orch = orchestrator(config().only(["quiz"]).build().unwrap(), &gens, &dir);

    assert_err!(orch.run(&topics(1), &llm_session()).await);
}

// ── Fault isolation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failing_kind_does_not_affect_others() {
    let dir = tempfile::tempdir().unwrap();
    let quiz = ScriptedGenerator::new(GeneratorKind::Quiz, Behavior::Reject);
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        quiz.clone(),
    ];
    let orch = orchestrator(config().build().unwrap(), &gens, &dir);

    let report = assert_ok!(orch.run(&topics(2), &llm_session()).await);

    assert_eq!(statuses(&report, GeneratorKind::Handout), vec![UnitStatus::Succeeded; 2]);
    assert_eq!(statuses(&report, GeneratorKind::Quiz), vec![UnitStatus::Failed; 2]);
    // Auth errors are not retried.
    assert_eq!(quiz.calls(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| f.attempts == 1 && f.message.contains("API key not valid")));
    assert_eq!(report.exit_code(), EXIT_UNIT_FAILURES);
}

#[tokio::test]
async fn test_optional_kind_failure_keeps_exit_code_zero() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Story, Behavior::Reject),
    ];
    let orch = orchestrator(config().optional(["story"]).build().unwrap(), &gens, &dir);

    let report = assert_ok!(orch.run(&topics(1), &llm_session()).await);

    assert_eq!(report.counts.failed, 1);
    assert_eq!(report.required_failures(), 0);
    assert_eq!(report.exit_code(), EXIT_OK);
}

#[tokio::test]
async fn test_panicking_generator_fails_only_its_units() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Mindmap, Behavior::Panic),
    ];
    let orch = orchestrator(config().build().unwrap(), &gens, &dir);

    let report = assert_ok!(orch.run(&topics(2), &llm_session()).await);

    assert_eq!(statuses(&report, GeneratorKind::Handout), vec![UnitStatus::Succeeded; 2]);
    for unit in report.units.iter().filter(|u| u.kind == GeneratorKind::Mindmap) {
        assert_eq!(unit.status, UnitStatus::Failed);
        assert_eq!(
            unit.error,
            Some(UnitError::Panicked {
                detail: "scripted generator exploded".into()
            })
        );
    }
}

// ── Retries ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let dir = tempfile::tempdir().unwrap();
    let flaky = ScriptedGenerator::new(GeneratorKind::Cheatsheet, Behavior::FlakyTimes(2));
    let orch = orchestrator(
        config().max_retries(2).build().unwrap(),
        &[flaky.clone()],
        &dir,
    );

    let report = assert_ok!(orch.run(&topics(1), &llm_session()).await);

    assert_eq!(report.counts.succeeded, 1);
    assert_eq!(report.units[0].attempts, 3);
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let flaky = ScriptedGenerator::new(GeneratorKind::Cheatsheet, Behavior::FlakyTimes(10));
    let orch = orchestrator(
        config().max_retries(1).build().unwrap(),
        &[flaky.clone()],
        &dir,
    );

    let report = assert_ok!(orch.run(&topics(1), &llm_session()).await);

    assert_eq!(flaky.calls(), 2);
    assert_eq!(
        report.units[0].error,
        Some(UnitError::Generation {
            attempts: 2,
            detail: "LLM call failed: rate limit exceeded".into()
        })
    );
}

// ── Timeouts ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unit_timeout_fails_the_slow_unit() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Strategy, Behavior::Sleep(Duration::from_secs(30))),
    ];
    let orch = orchestrator(
        config().unit_timeout_secs(Some(1)).build().unwrap(),
        &gens,
        &dir,
    );

    let report = assert_ok!(orch.run(&topics(1), &llm_session()).await);

    let slow = report
        .units
        .iter()
        .find(|u| u.kind == GeneratorKind::Strategy)
        .unwrap();
    assert_eq!(slow.status, UnitStatus::Failed);
    assert_eq!(
        slow.error,
        Some(UnitError::Timeout {
            secs: 1,
            started: true
        })
    );
    assert_eq!(slow.attempts, 1);
    assert_eq!(statuses(&report, GeneratorKind::Handout), vec![UnitStatus::Succeeded]);
}

#[tokio::test]
async fn test_job_timeout_fails_running_and_pending_units() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [ScriptedGenerator::new(
        GeneratorKind::Discussion,
        Behavior::Sleep(Duration::from_secs(30)),
    )];
    let orch = orchestrator(
        config()
            .concurrency(1)
            .job_timeout_secs(Some(1))
            .build()
            .unwrap(),
        &gens,
        &dir,
    );

    let started = std::time::Instant::now();
    let report = assert_ok!(orch.run(&topics(3), &llm_session()).await);
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_eq!(report.counts.failed, 3);
    let mut started_flags: Vec<bool> = report
        .units
        .iter()
        .map(|u| match u.error {
            Some(UnitError::Timeout { secs: 1, started }) => started,
            ref other => panic!("unexpected error {other:?}"),
        })
        .collect();
    started_flags.sort();
    assert_eq!(started_flags, vec![false, false, true]);
    assert_eq!(report.exit_code(), EXIT_UNIT_FAILURES);
}

#[tokio::test]
async fn test_job_timeout_keeps_finished_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Quiz, Behavior::Reject),
        ScriptedGenerator::new(
            GeneratorKind::Discussion,
            Behavior::Sleep(Duration::from_secs(30)),
        ),
    ];
    let orch = orchestrator(
        config()
            .concurrency(4)
            .job_timeout_secs(Some(1))
            .build()
            .unwrap(),
        &gens,
        &dir,
    );

    let report = assert_ok!(orch.run(&topics(2), &llm_session()).await);

    for unit in &report.units {
        match unit.kind {
            GeneratorKind::Handout => {
                assert_eq!(unit.status, UnitStatus::Succeeded);
                assert!(unit.error.is_none());
                assert!(unit.artifact.as_ref().is_some_and(|p| p.exists()));
            }
            GeneratorKind::Quiz => {
                assert_eq!(unit.status, UnitStatus::Failed);
                assert!(
                    matches!(unit.error, Some(UnitError::Generation { attempts: 1, .. })),
                    "{:?}",
                    unit.error
                );
            }
            GeneratorKind::Discussion => {
                assert_eq!(unit.status, UnitStatus::Failed);
                assert!(
                    matches!(unit.error, Some(UnitError::Timeout { secs: 1, .. })),
                    "{:?}",
                    unit.error
                );
            }
            other => panic!("unexpected kind {other}"),
        }
    }
    assert_eq!(report.counts.succeeded, 2);
    assert_eq!(report.counts.failed, 4);
}

#[tokio::test]
async fn test_hand_built_config_with_zero_limits_still_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config().build().unwrap();
    cfg.concurrency = 0;
    cfg.progress_interval_secs = 0;
    let gens = [ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed)];
    let orch = orchestrator(cfg, &gens, &dir);

    let finished =
        tokio::time::timeout(Duration::from_secs(5), orch.run(&topics(2), &llm_session())).await;

    let report = assert_ok!(assert_ok!(finished));
    assert_eq!(report.counts.succeeded, 2);
}

// ── Capabilities and resources ───────────────────────────────────────────────

#[tokio::test]
async fn test_missing_capabilities_skip_units() {
    let dir = tempfile::tempdir().unwrap();
    let handout = ScriptedGenerator::build(
        GeneratorKind::Handout,
        Behavior::Succeed,
        &[Capability::Llm],
        vec![],
    );
    let video = ScriptedGenerator::build(
        GeneratorKind::Video,
        Behavior::Succeed,
        &[Capability::Notebook],
        vec![Resource::Browser],
    );
    let orch = orchestrator(config().build().unwrap(), &[handout.clone(), video.clone()], &dir);

    let report = assert_ok!(orch.run(&topics(2), &SessionHandle::default()).await);

    assert_eq!(report.counts.skipped, 4);
    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(handout.calls() + video.calls(), 0);
    let reasons: Vec<&str> = report
        .units
        .iter()
        .filter_map(|u| u.skip_reason.as_deref())
        .collect();
    assert_eq!(
        reasons,
        vec![
            "no Gemini API key",
            "no NotebookLM session",
            "no Gemini API key",
            "no NotebookLM session",
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_browser_units_run_one_at_a_time() {
    let dir = tempfile::tempdir().unwrap();
    let pause = Behavior::Sleep(Duration::from_millis(60));
    let browser =
        ScriptedGenerator::build(GeneratorKind::Video, pause, &[], vec![Resource::Browser]);
    let api = ScriptedGenerator::new(GeneratorKind::Handout, pause);
    let orch = orchestrator(
        config().concurrency(4).build().unwrap(),
        &[browser.clone(), api.clone()],
        &dir,
    );

    let report = assert_ok!(orch.run(&topics(4), &llm_session()).await);

    assert_eq!(report.counts.succeeded, 8);
    assert_eq!(browser.max_active(), 1);
    assert!(api.max_active() >= 2, "api units never overlapped");
}

#[tokio::test]
async fn test_concurrency_limit_is_respected() {
    let dir = tempfile::tempdir().unwrap();
    let gen = ScriptedGenerator::new(
        GeneratorKind::Flashcards,
        Behavior::Sleep(Duration::from_millis(40)),
    );
    let orch = orchestrator(config().concurrency(2).build().unwrap(), &[gen.clone()], &dir);

    let report = assert_ok!(orch.run(&topics(6), &llm_session()).await);

    assert_eq!(report.counts.succeeded, 6);
    assert!(gen.max_active() <= 2);
}

// ── Progress and journal ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_progress_callback_sees_every_event() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingCallback::default());
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Quiz, Behavior::Reject),
        ScriptedGenerator::build(
            GeneratorKind::Video,
            Behavior::Succeed,
            &[Capability::Notebook],
            vec![],
        ),
    ];
    let orch = orchestrator(
        config().progress_callback(recorder.clone()).build().unwrap(),
        &gens,
        &dir,
    );

    assert_ok!(orch.run(&topics(2), &llm_session()).await);

    assert_eq!(*recorder.planned.lock().unwrap(), Some((6, 2)));
    assert_eq!(recorder.started.load(Ordering::SeqCst), 4);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.errored.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_journal_replay_matches_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nlmgen-journal.jsonl");
    let journal = Arc::new(notebooklm_gen::journal::Journal::create(&path).await.unwrap());
    let gens = [
        ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed),
        ScriptedGenerator::new(GeneratorKind::Quiz, Behavior::Reject),
        ScriptedGenerator::build(
            GeneratorKind::Video,
            Behavior::Succeed,
            &[Capability::Notebook],
            vec![],
        ),
    ];
    let orch = orchestrator(config().build().unwrap(), &gens, &dir).with_journal(journal);

    let report = assert_ok!(orch.run(&topics(2), &llm_session()).await);
    let replayed = RunReport::from_units(assert_ok!(journal::replay(&path).await));

    assert_eq!(replayed.units, report.units);
    assert_eq!(replayed.summary_json(), report.summary_json());
    assert_eq!(replayed.to_string(), report.to_string());
}

/// In-memory log sink for a `tracing_subscriber::fmt` writer.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_run_summary_passes_an_errors_only_filter() {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("error,{SUMMARY_LOG_TARGET}=info")))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let dir = tempfile::tempdir().unwrap();
    let gens = [ScriptedGenerator::new(GeneratorKind::Handout, Behavior::Succeed)];
    let orch = orchestrator(config().build().unwrap(), &gens, &dir);
    assert_ok!(orch.run(&topics(1), &llm_session()).await);

    let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains(SUMMARY_LOG_TARGET), "{text}");
    assert!(text.contains("\"succeeded\":1"), "{text}");
    assert!(text.contains("\"exit_code\":0"), "{text}");
    assert!(!text.contains("Plan:"), "other info lines stay filtered: {text}");
}

// ── Job end to end ───────────────────────────────────────────────────────────

const NOTES: &str = "# Cell Biology\n\n\
## Cell Structure\n\n\
Cells are the basic unit of life. The membrane separates the interior from \
the environment and controls what enters and leaves.\n\n\
## Cell Respiration\n\n\
Mitochondria convert glucose into ATP through glycolysis, the Krebs cycle \
and oxidative phosphorylation.\n";

#[tokio::test]
async fn test_job_with_standard_generators_and_no_notebook() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.md");
    std::fs::write(&input, NOTES).unwrap();
    let out = dir.path().join("materials");

    let llm = CannedLlm::new("# Study Notes\n\nCells respire.\n");
    let config = JobConfig::builder(input.to_string_lossy())
        .output_dir(&out)
        .only(["handout", "cheatsheet", "video"])
        .split_strategy(SplitStrategy::Single)
        .min_chars(10)
        .annotate_topics(false)
        .build()
        .unwrap();
    let job = Job::new(config).with_session(SessionHandle::default().with_llm(llm.clone()));

    let report = assert_ok!(job.run().await);

    assert_eq!(report.units.len(), 3);
    assert_eq!(report.counts.succeeded, 2);
    assert_eq!(report.counts.skipped, 1);
    assert_eq!(report.exit_code(), EXIT_OK);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 2);

    assert!(out.join("nlmgen-journal.jsonl").exists());
    for unit in report.units.iter().filter(|u| u.status == UnitStatus::Succeeded) {
        let path = unit.artifact.as_ref().unwrap();
        assert!(path.starts_with(&out));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("Cells respire."));
    }
}

#[tokio::test]
async fn test_job_with_missing_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = JobConfig::builder(dir.path().join("nope.md").to_string_lossy())
        .output_dir(dir.path())
        .build()
        .unwrap();

    let err = assert_err!(Job::new(config).with_session(llm_session()).run().await);
    assert!(matches!(err, notebooklm_gen::StudyGenError::Fetch { .. }));
}
