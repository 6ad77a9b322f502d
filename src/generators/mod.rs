//! The generator catalog.
//!
//! [`GeneratorKind`] is the closed set of material kinds. Each kind has one
//! [`Generator`] implementation that turns a [`Topic`] into an [`Artifact`].
//! Generators are stateless; everything they need arrives through the
//! [`GenerationContext`], including the shared [`SessionHandle`].
//!
//! ```text
//! kind         needs      resources          output
//! ──────────── ────────── ────────────────── ─────────────────────────────
//! handout      Llm        -                  .md
//! cheatsheet   Llm        -                  .md
//! mindmap      Llm        -                  .md + .mmd
//! audiobook    Llm        Browser (if any)   .md script [+ audio overview]
//! story        Llm        -                  _fantasy.md + _scifi.md
//! strategy     Llm        -                  .md
//! flashcards   Llm        -                  .md + _anki.tsv
//! quiz         Llm        -                  .md
//! discussion   Llm        -                  .md
//! video        Notebook   Browser            video overview
//! ```

mod audiobook;
mod flashcards;
mod mindmap;
mod quiz;
mod story;
mod text;
mod video;

pub use audiobook::AudiobookGenerator;
pub use flashcards::{parse_flashcards, Flashcard, FlashcardsGenerator};
pub use mindmap::MindmapGenerator;
pub use quiz::{parse_quiz, QuizGenerator, QuizQuestion};
pub use story::StoryGenerator;
pub use text::MarkdownGenerator;
pub use video::VideoGenerator;

use crate::auth::SessionHandle;
use crate::error::{GenerationError, StudyGenError};
use crate::llm::{ChatMessage, CompletionOptions, LlmProvider};
use crate::notebook::NotebookSession;
use crate::output::Artifact;
use crate::topics::Topic;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A kind of study material.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    Handout,
    Cheatsheet,
    Mindmap,
    Audiobook,
    Story,
    Strategy,
    Flashcards,
    Quiz,
    Discussion,
    Video,
}

impl GeneratorKind {
    /// Catalog order. Plans and reports follow it.
    pub const ALL: [GeneratorKind; 10] = [
        GeneratorKind::Handout,
        GeneratorKind::Cheatsheet,
        GeneratorKind::Mindmap,
        GeneratorKind::Audiobook,
        GeneratorKind::Story,
        GeneratorKind::Strategy,
        GeneratorKind::Flashcards,
        GeneratorKind::Quiz,
        GeneratorKind::Discussion,
        GeneratorKind::Video,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GeneratorKind::Handout => "handout",
            GeneratorKind::Cheatsheet => "cheatsheet",
            GeneratorKind::Mindmap => "mindmap",
            GeneratorKind::Audiobook => "audiobook",
            GeneratorKind::Story => "story",
            GeneratorKind::Strategy => "strategy",
            GeneratorKind::Flashcards => "flashcards",
            GeneratorKind::Quiz => "quiz",
            GeneratorKind::Discussion => "discussion",
            GeneratorKind::Video => "video",
        }
    }

    /// Output sub-directory for this kind.
    pub fn category_dir(self) -> &'static str {
        match self {
            GeneratorKind::Handout => "handouts",
            GeneratorKind::Cheatsheet => "cheatsheets",
            GeneratorKind::Mindmap => "mindmaps",
            GeneratorKind::Audiobook => "audiobooks",
            GeneratorKind::Story => "stories",
            GeneratorKind::Strategy => "strategies",
            GeneratorKind::Flashcards => "flashcards",
            GeneratorKind::Quiz => "quizzes",
            GeneratorKind::Discussion => "discussions",
            GeneratorKind::Video => "videos",
        }
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for GeneratorKind {
    type Err = StudyGenError;

    /// Accepts the singular name, the directory name and a few spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised = s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "");
        let kind = match normalised.as_str() {
            "handout" | "handouts" => GeneratorKind::Handout,
            "cheatsheet" | "cheatsheets" => GeneratorKind::Cheatsheet,
            "mindmap" | "mindmaps" => GeneratorKind::Mindmap,
            "audiobook" | "audiobooks" => GeneratorKind::Audiobook,
            "story" | "stories" => GeneratorKind::Story,
            "strategy" | "strategies" => GeneratorKind::Strategy,
            "flashcard" | "flashcards" => GeneratorKind::Flashcards,
            "quiz" | "quizzes" => GeneratorKind::Quiz,
            "discussion" | "discussions" => GeneratorKind::Discussion,
            "video" | "videos" => GeneratorKind::Video,
            _ => {
                return Err(StudyGenError::UnknownGenerator {
                    name: s.trim().to_string(),
                })
            }
        };
        Ok(kind)
    }
}

/// An external service a generator depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Generative text API.
    Llm,
    /// Logged-in NotebookLM browser session.
    Notebook,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Llm => "llm",
            Capability::Notebook => "notebook",
        }
    }

    /// Why a unit needing this capability was skipped.
    pub fn missing_reason(self) -> &'static str {
        match self {
            Capability::Llm => "no Gemini API key",
            Capability::Notebook => "no NotebookLM session",
        }
    }
}

/// An exclusive resource held for the whole duration of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    /// The single NotebookLM browser window.
    Browser,
}

/// Everything a generator may use for one attempt.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub session: SessionHandle,
    pub document_title: String,
    /// Overrides each kind's own temperature when set.
    pub temperature: Option<f32>,
    /// Floor for the completion budget.
    pub max_tokens: usize,
    /// 1-based attempt number within the unit.
    pub attempt: u32,
}

impl GenerationContext {
    pub fn new(session: SessionHandle, document_title: impl Into<String>) -> Self {
        Self {
            session,
            document_title: document_title.into(),
            temperature: None,
            max_tokens: 4096,
            attempt: 1,
        }
    }

    pub fn llm(&self) -> Result<&Arc<dyn LlmProvider>, GenerationError> {
        self.session
            .llm()
            .ok_or(GenerationError::MissingCapability(Capability::Llm.as_str()))
    }

    pub fn notebook(&self) -> Result<&Arc<dyn NotebookSession>, GenerationError> {
        self.session
            .notebook()
            .ok_or(GenerationError::MissingCapability(Capability::Notebook.as_str()))
    }

    /// Completion options for a kind with its own sampling defaults.
    pub fn options(
        &self,
        temperature: f32,
        max_tokens: Option<usize>,
        json_mode: bool,
    ) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature.unwrap_or(temperature)),
            max_tokens: Some(max_tokens.map_or(self.max_tokens, |n| n.max(self.max_tokens))),
            json_mode,
        }
    }

    /// Send one system + user exchange and return the raw answer.
    pub(crate) async fn ask(
        &self,
        system: &str,
        prompt: String,
        options: &CompletionOptions,
    ) -> Result<String, GenerationError> {
        let provider = self.llm()?;
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let start = Instant::now();
        let response = provider.chat(&messages, Some(options)).await?;
        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            provider.model(),
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );
        if response.content.trim().is_empty() {
            return Err(GenerationError::InvalidResponse("empty answer".into()));
        }
        Ok(response.content)
    }
}

/// Produces one kind of material for one topic.
#[async_trait]
pub trait Generator: Send + Sync {
    fn kind(&self) -> GeneratorKind;

    /// Capabilities that must be present for the unit to run at all.
    fn requirements(&self) -> &[Capability];

    /// Exclusive resources held while running with `session`.
    fn resources(&self, _session: &SessionHandle) -> Vec<Resource> {
        Vec::new()
    }

    async fn generate(
        &self,
        topic: &Topic,
        ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError>;
}

pub(crate) const NEEDS_LLM: &[Capability] = &[Capability::Llm];
pub(crate) const NEEDS_NOTEBOOK: &[Capability] = &[Capability::Notebook];

/// Immutable map from kind to generator.
#[derive(Clone)]
pub struct GeneratorRegistry {
    generators: BTreeMap<GeneratorKind, Arc<dyn Generator>>,
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.generators.keys()).finish()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl GeneratorRegistry {
    /// Registry with no generators.
    pub fn empty() -> Self {
        Self {
            generators: BTreeMap::new(),
        }
    }

    /// All ten built-in generators.
    pub fn standard() -> Self {
        Self::empty()
            .with(Arc::new(MarkdownGenerator::handout()))
            .with(Arc::new(MarkdownGenerator::cheatsheet()))
            .with(Arc::new(MindmapGenerator))
            .with(Arc::new(AudiobookGenerator))
            .with(Arc::new(StoryGenerator))
            .with(Arc::new(MarkdownGenerator::strategy()))
            .with(Arc::new(FlashcardsGenerator))
            .with(Arc::new(QuizGenerator))
            .with(Arc::new(MarkdownGenerator::discussion()))
            .with(Arc::new(VideoGenerator))
    }

    /// Add `generator`, replacing any registered for the same kind.
    pub fn with(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generators.insert(generator.kind(), generator);
        self
    }

    pub fn get(&self, kind: GeneratorKind) -> Result<Arc<dyn Generator>, StudyGenError> {
        self.generators
            .get(&kind)
            .cloned()
            .ok_or_else(|| StudyGenError::UnknownGenerator {
                name: kind.name().to_string(),
            })
    }

    /// Registered kinds in catalog order.
    pub fn kinds(&self) -> Vec<GeneratorKind> {
        self.generators.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeLlm;
    use super::*;

    #[test]
    fn kind_names_and_plurals_parse() {
        for kind in GeneratorKind::ALL {
            assert_eq!(kind.name().parse::<GeneratorKind>().unwrap(), kind);
            assert_eq!(kind.category_dir().parse::<GeneratorKind>().unwrap(), kind);
        }
        assert_eq!("Cheat-Sheet".parse::<GeneratorKind>().unwrap(), GeneratorKind::Cheatsheet);
        assert_eq!("mind_map".parse::<GeneratorKind>().unwrap(), GeneratorKind::Mindmap);
        match "podcast".parse::<GeneratorKind>() {
            Err(StudyGenError::UnknownGenerator { name }) => assert_eq!(name, "podcast"),
            other => panic!("expected UnknownGenerator, got {other:?}"),
        }
    }

    #[test]
    fn kind_serialises_lowercase() {
        let json = serde_json::to_string(&GeneratorKind::Flashcards).unwrap();
        assert_eq!(json, "\"flashcards\"");
    }

    #[test]
    fn standard_registry_covers_catalog_in_order() {
        let registry = GeneratorRegistry::standard();
        assert_eq!(registry.kinds(), GeneratorKind::ALL.to_vec());
        for kind in GeneratorKind::ALL {
            let g = registry.get(kind).unwrap();
            assert_eq!(g.kind(), kind);
            let expected = if kind == GeneratorKind::Video {
                Capability::Notebook
            } else {
                Capability::Llm
            };
            assert_eq!(g.requirements(), &[expected]);
        }
    }

    #[test]
    fn empty_registry_reports_unknown() {
        let err = GeneratorRegistry::empty().get(GeneratorKind::Quiz).err().unwrap();
        assert!(matches!(err, StudyGenError::UnknownGenerator { ref name } if name == "quiz"));
    }

    #[test]
    fn options_apply_override_and_token_floor() {
        let mut ctx = GenerationContext::new(SessionHandle::default(), "Doc");
        let o = ctx.options(0.5, None, false);
        assert_eq!((o.temperature, o.max_tokens), (Some(0.5), Some(4096)));
        let o = ctx.options(0.5, Some(6000), true);
        assert_eq!(o.max_tokens, Some(6000));
        assert!(o.json_mode);

        ctx.temperature = Some(0.1);
        ctx.max_tokens = 8192;
        let o = ctx.options(0.5, Some(6000), false);
        assert_eq!((o.temperature, o.max_tokens), (Some(0.1), Some(8192)));
    }

    #[tokio::test]
    async fn ask_without_llm_is_missing_capability() {
        let ctx = GenerationContext::new(SessionHandle::default(), "Doc");
        let err = ctx
            .ask("sys", "hi".into(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::MissingCapability("llm")));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn blank_answer_is_invalid_response() {
        let session = SessionHandle::default().with_llm(Arc::new(FakeLlm::answering("  \n")));
        let ctx = GenerationContext::new(session, "Doc");
        let err = ctx
            .ask("sys", "hi".into(), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }
}
