//! Append-only JSON-lines journal of unit transitions.
//!
//! One record per accepted [`WorkBoard`](crate::board::WorkBoard) transition,
//! including the initial `Pending` entry of every planned unit. Replaying the
//! file rebuilds the final units exactly, which is how `nlmgen --replay`
//! reprints a report without re-running anything.

use crate::board::{UnitStatus, WorkUnit};
use crate::error::{StudyGenError, UnitError};
use crate::generators::GeneratorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// One line of the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// RFC 3339 timestamp of the transition.
    pub ts: DateTime<Utc>,
    pub unit_id: usize,
    pub topic_id: String,
    pub topic_ordinal: usize,
    pub topic_title: String,
    pub kind: GeneratorKind,
    pub required: bool,
    /// `None` for the plan entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<UnitStatus>,
    pub to: UnitStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

impl JournalRecord {
    /// Record for `unit` having just entered its current status.
    pub fn from_unit(unit: &WorkUnit, from: Option<UnitStatus>) -> Self {
        let ts = match unit.status {
            UnitStatus::Running => unit.started_at,
            s if s.is_terminal() => unit.finished_at,
            _ => None,
        }
        .unwrap_or_else(Utc::now);
        Self {
            ts,
            unit_id: unit.id,
            topic_id: unit.topic_id.clone(),
            topic_ordinal: unit.topic_ordinal,
            topic_title: unit.topic_title.clone(),
            kind: unit.kind,
            required: unit.required,
            from,
            to: unit.status,
            attempts: unit.attempts,
            error: unit.error.clone(),
            artifact: unit.artifact.clone(),
            skip_reason: unit.skip_reason.clone(),
        }
    }
}

/// Open journal file. Write failures after creation are logged, not fatal.
pub struct Journal {
    path: PathBuf,
    file: Mutex<tokio::fs::File>,
}

impl Journal {
    /// Create (or truncate) the journal at `path`.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, StudyGenError> {
        let path = path.into();
        let err = |e: std::io::Error| StudyGenError::Journal {
            path: path.clone(),
            detail: e.to_string(),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(err)?;
        }
        let file = tokio::fs::File::create(&path).await.map_err(err)?;
        debug!("Journal: {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &JournalRecord) {
        let mut line = match serde_json::to_string(record) {
            Ok(l) => l,
            Err(e) => {
                warn!("Journal: could not serialise record for unit #{}: {}", record.unit_id, e);
                return;
            }
        };
        line.push('\n');
        let mut file = self.file.lock().await;
        let result = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!("Journal: write to {} failed: {}", self.path.display(), e);
        }
    }
}

/// Rebuild the final state of every unit from a journal file.
///
/// A malformed final line (an interrupted write) is ignored with a warning;
/// a malformed line anywhere else is an error.
pub async fn replay(path: impl AsRef<Path>) -> Result<Vec<WorkUnit>, StudyGenError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StudyGenError::Journal {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;

    let lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();
    let last = lines.len().saturating_sub(1);

    let mut units: BTreeMap<usize, WorkUnit> = BTreeMap::new();
    for (pos, (line_no, line)) in lines.into_iter().enumerate() {
        let record: JournalRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) if pos == last => {
                warn!("Journal: ignoring truncated last line {}: {}", line_no + 1, e);
                break;
            }
            Err(e) => {
                return Err(StudyGenError::Journal {
                    path: path.to_path_buf(),
                    detail: format!("line {}: {}", line_no + 1, e),
                })
            }
        };
        apply_record(&mut units, record);
    }
    Ok(units.into_values().collect())
}

fn apply_record(units: &mut BTreeMap<usize, WorkUnit>, r: JournalRecord) {
    let unit = units.entry(r.unit_id).or_insert_with(|| {
        WorkUnit::new(
            r.unit_id,
            r.topic_id.clone(),
            r.topic_ordinal,
            r.topic_title.clone(),
            r.kind,
            r.required,
        )
    });
    unit.status = r.to;
    unit.attempts = r.attempts;
    unit.error = r.error;
    unit.artifact = r.artifact;
    unit.skip_reason = r.skip_reason;
    if r.to == UnitStatus::Running {
        unit.started_at = Some(r.ts);
    }
    if r.to.is_terminal() {
        unit.finished_at = Some(r.ts);
    }
}
