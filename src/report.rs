//! The final report of a run.
//!
//! Built purely from the terminal [`WorkUnit`]s, so the same report comes out
//! of a live run and of [`crate::journal::replay`].

use crate::board::{StatusCounts, UnitStatus, WorkUnit};
use crate::generators::GeneratorKind;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Exit code when no required unit failed.
pub const EXIT_OK: i32 = 0;
/// Exit code when at least one required unit failed.
pub const EXIT_UNIT_FAILURES: i32 = 1;
/// Exit code for a fatal error before or around the run.
pub const EXIT_FATAL: i32 = 2;

/// `tracing` target of the end-of-run summary line. Log filters should keep
/// it at `info` so every run leaves a machine-readable summary.
pub const SUMMARY_LOG_TARGET: &str = "nlmgen::summary";

/// Counts for one topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSummary {
    pub topic_id: String,
    pub title: String,
    pub counts: StatusCounts,
}

/// One failed unit, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureSummary {
    pub unit_id: usize,
    pub kind: GeneratorKind,
    pub topic_id: String,
    pub topic_title: String,
    pub required: bool,
    pub attempts: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub counts: StatusCounts,
    pub by_kind: BTreeMap<GeneratorKind, StatusCounts>,
    /// Keyed by topic ordinal.
    pub by_topic: BTreeMap<usize, TopicSummary>,
    pub failures: Vec<FailureSummary>,
    pub units: Vec<WorkUnit>,
}

impl RunReport {
    pub fn from_units(mut units: Vec<WorkUnit>) -> Self {
        units.sort_by_key(|u| u.id);
        let counts = StatusCounts::from_units(&units);

        let mut by_kind: BTreeMap<GeneratorKind, Vec<&WorkUnit>> = BTreeMap::new();
        let mut by_topic: BTreeMap<usize, Vec<&WorkUnit>> = BTreeMap::new();
        for u in &units {
            by_kind.entry(u.kind).or_default().push(u);
            by_topic.entry(u.topic_ordinal).or_default().push(u);
        }
        let by_kind = by_kind
            .into_iter()
            .map(|(k, us)| (k, StatusCounts::from_units(us)))
            .collect();
        let by_topic = by_topic
            .into_iter()
            .map(|(ordinal, us)| {
                let first = us[0];
                let summary = TopicSummary {
                    topic_id: first.topic_id.clone(),
                    title: first.topic_title.clone(),
                    counts: StatusCounts::from_units(us),
                };
                (ordinal, summary)
            })
            .collect();

        let failures = units
            .iter()
            .filter(|u| u.status == UnitStatus::Failed)
            .map(|u| FailureSummary {
                unit_id: u.id,
                kind: u.kind,
                topic_id: u.topic_id.clone(),
                topic_title: u.topic_title.clone(),
                required: u.required,
                attempts: u.attempts,
                message: u
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string()),
            })
            .collect();

        Self {
            counts,
            by_kind,
            by_topic,
            failures,
            units,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn required_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.required).count()
    }

    /// Units that never reached a terminal status. Non-zero only for a
    /// journal cut short by a crash.
    pub fn unfinished(&self) -> usize {
        self.counts.pending + self.counts.running
    }

    /// [`EXIT_OK`] unless a required unit failed.
    pub fn exit_code(&self) -> i32 {
        if self.required_failures() == 0 {
            EXIT_OK
        } else {
            EXIT_UNIT_FAILURES
        }
    }

    /// Machine-readable totals, logged at the end of every run.
    pub fn summary_json(&self) -> Value {
        json!({
            "total": self.counts.total(),
            "succeeded": self.counts.succeeded,
            "failed": self.counts.failed,
            "skipped": self.counts.skipped,
            "unfinished": self.unfinished(),
            "required_failed": self.required_failures(),
            "exit_code": self.exit_code(),
            "by_kind": self.by_kind.iter().map(|(k, c)| {
                (k.name().to_string(), json!({
                    "succeeded": c.succeeded,
                    "failed": c.failed,
                    "skipped": c.skipped,
                }))
            }).collect::<serde_json::Map<String, Value>>(),
        })
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        writeln!(
            f,
            "{}/{} units succeeded, {} failed ({} required), {} skipped",
            c.succeeded,
            c.total(),
            c.failed,
            self.required_failures(),
            c.skipped
        )?;
        if self.is_empty() {
            return Ok(());
        }

        writeln!(f)?;
        writeln!(f, "{:<12} {:>4} {:>7} {:>8}", "kind", "ok", "failed", "skipped")?;
        for (kind, k) in &self.by_kind {
            writeln!(f, "{:<12} {:>4} {:>7} {:>8}", kind.name(), k.succeeded, k.failed, k.skipped)?;
        }

        writeln!(f)?;
        for (ordinal, t) in &self.by_topic {
            writeln!(
                f,
                "{:>2}. {} ({}/{} ok)",
                ordinal,
                t.title,
                t.counts.succeeded,
                t.counts.total()
            )?;
        }

        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for fail in &self.failures {
                writeln!(
                    f,
                    "  - {}/{} \"{}\"{}: {}",
                    fail.kind,
                    fail.topic_id,
                    fail.topic_title,
                    if fail.required { "" } else { " (optional)" },
                    fail.message
                )?;
            }
        }

        let skipped: Vec<&WorkUnit> = self
            .units
            .iter()
            .filter(|u| u.status == UnitStatus::Skipped)
            .collect();
        if !skipped.is_empty() {
            writeln!(f, "\nSkipped:")?;
            for u in skipped {
                writeln!(
                    f,
                    "  - {}: {}",
                    u.label(),
                    u.skip_reason.as_deref().unwrap_or("skipped")
                )?;
            }
        }
        if self.unfinished() > 0 {
            writeln!(f, "\n{} unit(s) never finished", self.unfinished())?;
        }
        Ok(())
    }
}
