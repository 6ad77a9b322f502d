//! # notebooklm-gen
//!
//! Generate a full set of study materials from one document: handouts,
//! cheatsheets, mindmaps, audiobook scripts, stories, learning strategies,
//! flashcards, quizzes, panel discussions and NotebookLM video overviews.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / text / Markdown / URL
//!  │
//!  ├─ 1. Content    normalise to plain text (pdfium, html2md)
//!  ├─ 2. Topics     split into ordered topics, optionally annotated by the LLM
//!  ├─ 3. Session    Gemini API key and/or a NotebookLM browser session
//!  ├─ 4. Plan       topics × enabled generators, units without a capability skipped
//!  ├─ 5. Execute    bounded concurrent units, retries, timeouts, browser serialised
//!  ├─ 6. Output     one directory per material kind, atomic overwrite
//!  └─ 7. Report     counts per kind and topic, failures, exit code
//! ```
//!
//! Every unit transition is appended to `nlmgen-journal.jsonl` in the output
//! directory; [`journal::replay`] rebuilds the report from it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notebooklm_gen::{run_job, JobConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = JobConfig::builder("lecture.pdf")
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .only(["handout", "flashcards", "quiz"])
//!         .build()?;
//!     let report = run_job(config).await?;
//!     println!("{report}");
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `nlmgen` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! notebooklm-gen = { version = "0.3", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! | Input / kind | Needs |
//! |--------------|-------|
//! | PDF input    | a pdfium shared library (`PDFIUM_LIB_PATH` or system path) |
//! | every kind but `video` | a Gemini API key |
//! | `video`, audio overviews | a running `chromedriver` and a Google account |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod auth;
pub mod board;
pub mod config;
pub mod content;
pub mod error;
pub mod generators;
pub mod job;
pub mod journal;
pub mod llm;
pub mod notebook;
pub mod orchestrator;
pub mod output;
pub mod postprocess;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod topics;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use auth::{acquire_session, SessionHandle};
pub use board::{StatusCounts, UnitStatus, WorkBoard, WorkUnit};
pub use config::{JobConfig, JobConfigBuilder};
pub use content::{normalize, NormalizedContent, SourceKind};
pub use error::{GenerationError, StudyGenError, UnitError};
pub use generators::{
    Capability, GenerationContext, Generator, GeneratorKind, GeneratorRegistry, Resource,
};
pub use job::{run_job, Job};
pub use llm::{GeminiProvider, LlmProvider};
pub use orchestrator::{Orchestrator, Plan};
pub use output::{Artifact, ArtifactPart, DirectorySink, OutputSink};
pub use progress::{
    NoopProgressCallback, OrchestrationProgressCallback, ProgressCallback, ProgressReporter,
    ProgressSnapshot,
};
pub use report::RunReport;
pub use topics::{SplitStrategy, Topic, TopicSplitter};
