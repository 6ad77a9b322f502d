//! The work board: the single source of truth for unit state.
//!
//! Workers publish transitions here under the write lock; the progress
//! reporter reads under the read lock, so no half-applied transition is ever
//! observable. The board enforces the unit state machine:
//!
//! ```text
//! Pending ──▶ Running ──▶ Succeeded
//!    │           └──────▶ Failed
//!    ├──▶ Skipped              (plan time, missing capability)
//!    └──▶ Failed               (job timeout before the unit started)
//! ```
//!
//! Anything else is rejected, logged at `warn`, and leaves the unit unchanged.
//! When a [`Journal`] is attached every accepted transition is appended to it
//! while the write lock is held, so journal order equals transition order.

use crate::error::UnitError;
use crate::generators::GeneratorKind;
use crate::journal::{Journal, JournalRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Lifecycle state of a [`WorkUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl UnitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UnitStatus::Succeeded | UnitStatus::Failed | UnitStatus::Skipped
        )
    }

    pub fn can_transition_to(self, next: UnitStatus) -> bool {
        use UnitStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Running => "running",
            UnitStatus::Succeeded => "succeeded",
            UnitStatus::Failed => "failed",
            UnitStatus::Skipped => "skipped",
        }
    }
}

/// One (topic, generator) pair of the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Index in the plan; stable for the whole job.
    pub id: usize,
    pub topic_id: String,
    pub topic_ordinal: usize,
    pub topic_title: String,
    pub kind: GeneratorKind,
    /// A failed required unit fails the job.
    pub required: bool,
    pub status: UnitStatus,
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<UnitError>,
    pub artifact: Option<PathBuf>,
    pub skip_reason: Option<String>,
}

impl WorkUnit {
    pub fn new(
        id: usize,
        topic_id: impl Into<String>,
        topic_ordinal: usize,
        topic_title: impl Into<String>,
        kind: GeneratorKind,
        required: bool,
    ) -> Self {
        Self {
            id,
            topic_id: topic_id.into(),
            topic_ordinal,
            topic_title: topic_title.into(),
            kind,
            required,
            status: UnitStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            error: None,
            artifact: None,
            skip_reason: None,
        }
    }

    /// `handout/topic-02`, used in log lines.
    pub fn label(&self) -> String {
        format!("{}/{}", self.kind, self.topic_id)
    }
}

/// Number of units in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn from_units<'a>(units: impl IntoIterator<Item = &'a WorkUnit>) -> Self {
        let mut c = Self::default();
        for u in units {
            match u.status {
                UnitStatus::Pending => c.pending += 1,
                UnitStatus::Running => c.running += 1,
                UnitStatus::Succeeded => c.succeeded += 1,
                UnitStatus::Failed => c.failed += 1,
                UnitStatus::Skipped => c.skipped += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.succeeded + self.failed + self.skipped
    }

    pub fn terminal(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Synchronised store of every [`WorkUnit`] in the plan.
pub struct WorkBoard {
    units: RwLock<Vec<WorkUnit>>,
    journal: Option<Arc<Journal>>,
}

impl WorkBoard {
    pub fn new(journal: Option<Arc<Journal>>) -> Self {
        Self {
            units: RwLock::new(Vec::new()),
            journal,
        }
    }

    /// Register the plan. Units must arrive in `Pending` with ids matching
    /// their position.
    pub async fn add_units(&self, planned: Vec<WorkUnit>) {
        let mut units = self.units.write().await;
        for unit in planned {
            debug_assert_eq!(unit.id, units.len());
            debug_assert_eq!(unit.status, UnitStatus::Pending);
            self.record(&unit, None).await;
            units.push(unit);
        }
    }

    pub async fn len(&self) -> usize {
        self.units.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.units.read().await.is_empty()
    }

    pub async fn get(&self, id: usize) -> Option<WorkUnit> {
        self.units.read().await.get(id).cloned()
    }

    /// Copy of every unit, taken under one read lock.
    pub async fn snapshot(&self) -> Vec<WorkUnit> {
        self.units.read().await.clone()
    }

    pub async fn counts(&self) -> StatusCounts {
        StatusCounts::from_units(self.units.read().await.iter())
    }

    /// Pending → Skipped.
    pub async fn skip(&self, id: usize, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        self.apply(id, UnitStatus::Skipped, |u| {
            u.skip_reason = Some(reason);
            u.finished_at = Some(Utc::now());
        })
        .await
    }

    /// Pending → Running.
    pub async fn start(&self, id: usize) -> bool {
        self.apply(id, UnitStatus::Running, |u| {
            u.started_at = Some(Utc::now());
        })
        .await
    }

    /// Running → Succeeded.
    pub async fn succeed(&self, id: usize, attempts: u32, artifact: PathBuf) -> bool {
        self.apply(id, UnitStatus::Succeeded, |u| {
            u.attempts = attempts;
            u.artifact = Some(artifact);
            u.finished_at = Some(Utc::now());
        })
        .await
    }

    /// Running → Failed, or Pending → Failed.
    pub async fn fail(&self, id: usize, attempts: u32, error: UnitError) -> bool {
        self.apply(id, UnitStatus::Failed, |u| {
            u.attempts = attempts;
            u.error = Some(error);
            u.finished_at = Some(Utc::now());
        })
        .await
    }

    /// Fail every non-terminal unit after the job timeout. Returns how many
    /// units were failed.
    pub async fn fail_outstanding(&self, secs: u64) -> usize {
        let mut units = self.units.write().await;
        let mut failed = 0;
        for unit in units.iter_mut() {
            let started = match unit.status {
                UnitStatus::Running => true,
                UnitStatus::Pending => false,
                _ => continue,
            };
            let from = unit.status;
            unit.status = UnitStatus::Failed;
            unit.error = Some(UnitError::Timeout { secs, started });
            unit.finished_at = Some(Utc::now());
            self.record(unit, Some(from)).await;
            failed += 1;
        }
        failed
    }

    async fn apply(&self, id: usize, to: UnitStatus, update: impl FnOnce(&mut WorkUnit)) -> bool {
        let mut units = self.units.write().await;
        let Some(unit) = units.get_mut(id) else {
            warn!("Transition to {:?} for unknown unit #{}", to, id);
            return false;
        };
        let from = unit.status;
        if !from.can_transition_to(to) {
            warn!(
                "Rejected transition {:?} → {:?} for {} (#{})",
                from,
                to,
                unit.label(),
                id
            );
            return false;
        }
        unit.status = to;
        update(unit);
        debug!("{} (#{}): {:?} → {:?}", unit.label(), id, from, to);
        self.record(unit, Some(from)).await;
        true
    }

    async fn record(&self, unit: &WorkUnit, from: Option<UnitStatus>) {
        if let Some(ref journal) = self.journal {
            journal.append(&JournalRecord::from_unit(unit, from)).await;
        }
    }
}
