//! Error types for the notebooklm-gen library.
//!
//! Two distinct error families reflect two distinct failure modes:
//!
//! * [`StudyGenError`]: **fatal**: the job cannot proceed at all (input not
//!   found, text too short to split, login failed, unknown generator name in
//!   the configuration). Returned as `Err(StudyGenError)` from
//!   [`crate::job::run_job`] before any work unit has started.
//!
//! * [`UnitError`]: **non-fatal**: a single (topic, generator) unit failed
//!   after its retries, timed out, or could not be written. Stored inside
//!   [`crate::board::WorkUnit`] so the other units carry on and the final
//!   report can list every failure.
//!
//! The narrower error types ([`GenerationError`], [`SplitError`],
//! [`WriteError`], [`LlmError`], [`WebDriverError`]) are what the individual
//! collaborators return; the orchestrator folds them into one of the two
//! families above.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the notebooklm-gen library.
#[derive(Debug, Error)]
pub enum StudyGenError {
    // ── Content acquisition ───────────────────────────────────────────────
    /// Local file or remote URL could not be read.
    #[error("Failed to fetch '{input}': {reason}")]
    Fetch { input: String, reason: String },

    /// The input exists but its type is not one we can normalise.
    #[error("Unsupported input '{input}': {detail}\nSupported: .pdf, .txt, .md, .text, .markdown or an http(s) URL")]
    UnsupportedInput { input: String, detail: String },

    // ── Topic decomposition ───────────────────────────────────────────────
    #[error(transparent)]
    Split(#[from] SplitError),

    // ── Session ───────────────────────────────────────────────────────────
    /// Credentials were rejected or the browser session could not be created.
    #[error("Authentication failed ({service}): {detail}")]
    Auth { service: String, detail: String },

    // ── Configuration ─────────────────────────────────────────────────────
    /// A generator name in the configuration does not match any known kind.
    #[error("Unknown generator '{name}'\nKnown generators: handout, cheatsheet, mindmap, audiobook, story, strategy, flashcards, quiz, discussion, video")]
    UnknownGenerator { name: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Persisted state ───────────────────────────────────────────────────
    /// The transition journal could not be created, written or replayed.
    #[error("Journal error at '{path}': {detail}")]
    Journal { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Input text could not be partitioned into topics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("Input text is empty; nothing to split into topics")]
    Empty,

    #[error("Input text is too short to split ({chars} chars, minimum {min})")]
    TooShort { chars: usize, min: usize },
}

/// A non-fatal error for a single work unit.
///
/// Stored alongside [`crate::board::WorkUnit`] and written to the journal,
/// hence the serde derives.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitError {
    /// The generator's external call failed after all attempts.
    #[error("generation failed after {attempts} attempt(s): {detail}")]
    Generation { attempts: u32, detail: String },

    /// The unit exceeded its own bound or the global job timeout.
    ///
    /// `started` is false when the job timed out before the unit ever ran.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64, started: bool },

    /// The artifact was produced but could not be persisted.
    #[error("failed to write '{}': {detail}", .path.display())]
    Write { path: PathBuf, detail: String },

    /// The generator panicked; the panic was contained to this unit.
    #[error("generator panicked: {detail}")]
    Panicked { detail: String },
}

/// Error returned by a [`crate::generators::Generator`].
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The session lacks something the generator needs. Normally caught at
    /// plan time and turned into a skip; seeing it at run time is a bug.
    #[error("missing capability: {0}")]
    MissingCapability(&'static str),

    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("NotebookLM automation failed: {0}")]
    Notebook(#[from] WebDriverError),

    /// The model answered but the answer could not be used.
    #[error("unusable model response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GenerationError::Llm(e) => e.is_transient(),
            GenerationError::Notebook(e) => e.is_transient(),
            GenerationError::InvalidResponse(_) => true,
            GenerationError::MissingCapability(_) => false,
        }
    }
}

/// Failure to persist an artifact through an [`crate::output::OutputSink`].
#[derive(Debug, Error)]
#[error("failed to write '{}': {source}", .path.display())]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors from the generative text API.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Transport-level failure (DNS, TLS, connection reset, client timeout).
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// HTTP 429.
    #[error("rate limit exceeded")]
    RateLimited,

    /// HTTP 401/403; retrying will not help.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Any other non-success status.
    #[error("API returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    /// The response carried no candidate text (blocked, filtered, empty).
    #[error("response contained no text")]
    EmptyResponse,

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl LlmError {
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::RateLimited | LlmError::EmptyResponse => true,
            LlmError::Status { code, .. } => *code >= 500,
            LlmError::Auth(_) | LlmError::Decode(_) => false,
        }
    }
}

/// Errors from the WebDriver wire protocol client.
#[derive(Debug, Clone, Error)]
pub enum WebDriverError {
    #[error("WebDriver request failed: {0}")]
    Http(String),

    /// The driver answered with a W3C error object.
    #[error("WebDriver error '{error}': {message}")]
    Command { error: String, message: String },

    #[error("element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("timed out after {secs}s waiting for {what}")]
    Wait { what: String, secs: u64 },
}

impl WebDriverError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WebDriverError::Http(_)
                | WebDriverError::Wait { .. }
                | WebDriverError::ElementNotFound { .. }
        )
    }
}
