//! Generated artifacts and where they are written.
//!
//! A generator returns an [`Artifact`]: one or more [`ArtifactPart`]s for a
//! single (topic, kind) pair. An [`OutputSink`] persists it. The default
//! [`DirectorySink`] writes into one directory per category:
//!
//! ```text
//! {root}/handouts/handout_01_cell_structure.md
//! {root}/flashcards/flashcards_01_cell_structure.md
//! {root}/flashcards/flashcards_01_cell_structure_anki.tsv
//! {root}/stories/story_01_cell_structure_fantasy.md
//! ```
//!
//! Re-running a job overwrites files deterministically: each part is written
//! to a temporary sibling and renamed over the target, so a crash mid-write
//! never leaves a truncated file behind.

use crate::error::WriteError;
use crate::generators::GeneratorKind;
use crate::topics::Topic;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One file of an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPart {
    /// Suffix distinguishing secondary files (`anki`, `fantasy`). `None` for
    /// the primary file.
    pub label: Option<String>,
    pub extension: String,
    pub content: Vec<u8>,
}

impl ArtifactPart {
    pub fn text(extension: &str, content: impl Into<String>) -> Self {
        Self {
            label: None,
            extension: extension.to_string(),
            content: content.into().into_bytes(),
        }
    }

    pub fn bytes(extension: &str, content: Vec<u8>) -> Self {
        Self {
            label: None,
            extension: extension.to_string(),
            content,
        }
    }

    pub fn labeled(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }
}

/// Everything one work unit produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: GeneratorKind,
    pub topic_ordinal: usize,
    pub slug: String,
    /// The first part is the primary file.
    pub parts: Vec<ArtifactPart>,
}

impl Artifact {
    pub fn new(kind: GeneratorKind, topic: &Topic) -> Self {
        Self {
            kind,
            topic_ordinal: topic.ordinal,
            slug: slugify(&topic.title),
            parts: Vec::new(),
        }
    }

    pub fn with_part(mut self, part: ArtifactPart) -> Self {
        self.parts.push(part);
        self
    }

    /// `{kind}_{ordinal:02}_{slug}[_{label}].{ext}`
    pub fn file_name(&self, part: &ArtifactPart) -> String {
        let mut name = format!("{}_{:02}", self.kind.name(), self.topic_ordinal);
        if !self.slug.is_empty() {
            name.push('_');
            name.push_str(&self.slug);
        }
        if let Some(ref label) = part.label {
            name.push('_');
            name.push_str(label);
        }
        format!("{}.{}", name, part.extension)
    }

    pub fn total_bytes(&self) -> usize {
        self.parts.iter().map(|p| p.content.len()).sum()
    }
}

static RE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static RE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

/// File-name-safe form of a title: lowercase, punctuation removed, spaces
/// and dashes to `_`, at most 50 characters.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let cleaned = RE_NON_WORD.replace_all(&lower, "");
    let joined = RE_SEPARATORS.replace_all(cleaned.trim(), "_");
    joined
        .trim_matches('_')
        .chars()
        .take(50)
        .collect::<String>()
        .trim_end_matches('_')
        .to_string()
}

/// Destination for finished artifacts.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Persist every part of `artifact` under `category` and return the
    /// path of the primary part.
    async fn persist(&self, category: &str, artifact: &Artifact) -> Result<PathBuf, WriteError>;
}

/// Writes artifacts below a root directory, one sub-directory per category.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Write `bytes` to `path` through a temporary sibling and an atomic rename.
///
/// The write and the rename run together on the blocking pool, so they
/// finish even when the calling future is dropped (a unit timeout): the
/// temporary sibling is either renamed or removed, never left behind.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    let target = path.clone();
    let outcome =
        tokio::task::spawn_blocking(move || write_then_rename(&target, &bytes)).await;
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(WriteError { path, source }),
        Err(e) => Err(WriteError {
            path,
            source: std::io::Error::other(format!("write task failed: {e}")),
        }),
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}

fn write_then_rename(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp_path = tmp_sibling(path);
    let written = std::fs::write(&tmp_path, bytes)
        .and_then(|()| std::fs::rename(&tmp_path, path));
    if written.is_err() {
        let _ = std::fs::remove_file(&tmp_path);
    }
    written
}

#[async_trait]
impl OutputSink for DirectorySink {
    async fn persist(&self, category: &str, artifact: &Artifact) -> Result<PathBuf, WriteError> {
        let dir = self.root.join(category);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| WriteError {
                path: dir.clone(),
                source,
            })?;

        let mut primary: Option<PathBuf> = None;
        for part in &artifact.parts {
            let path = dir.join(artifact.file_name(part));
            write_atomic(&path, &part.content).await?;
            debug!("Wrote {} ({} bytes)", path.display(), part.content.len());
            primary.get_or_insert(path);
        }
        primary.ok_or_else(|| WriteError {
            path: dir,
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "artifact has no parts"),
        })
    }
}
