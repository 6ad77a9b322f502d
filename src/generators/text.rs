//! Prose generators: one prompt in, one cleaned Markdown file out.

use super::{Capability, GenerationContext, Generator, GeneratorKind, NEEDS_LLM};
use crate::error::GenerationError;
use crate::output::{Artifact, ArtifactPart};
use crate::postprocess::clean_markdown;
use crate::prompts;
use crate::topics::Topic;
use async_trait::async_trait;

/// Handout, cheatsheet, strategy and discussion share this shape and differ
/// only in prompt, sampling and decoration.
pub struct MarkdownGenerator {
    kind: GeneratorKind,
    prompt: fn(&Topic) -> String,
    temperature: f32,
    max_tokens: Option<usize>,
    /// Heading added when the answer does not open with one.
    heading: fn(&Topic) -> String,
    keyword_footer: bool,
}

impl MarkdownGenerator {
    pub fn handout() -> Self {
        Self {
            kind: GeneratorKind::Handout,
            prompt: prompts::handout,
            temperature: 0.5,
            max_tokens: None,
            heading: |t| format!("# {}", t.title),
            keyword_footer: true,
        }
    }

    pub fn cheatsheet() -> Self {
        Self {
            kind: GeneratorKind::Cheatsheet,
            prompt: prompts::cheatsheet,
            temperature: 0.3,
            max_tokens: None,
            heading: |t| format!("# {}: Cheatsheet", t.title),
            keyword_footer: false,
        }
    }

    pub fn strategy() -> Self {
        Self {
            kind: GeneratorKind::Strategy,
            prompt: prompts::strategy,
            temperature: 0.5,
            max_tokens: Some(6000),
            heading: |t| format!("# Learning Strategy: {}", t.title),
            keyword_footer: false,
        }
    }

    pub fn discussion() -> Self {
        Self {
            kind: GeneratorKind::Discussion,
            prompt: prompts::discussion,
            temperature: 0.7,
            max_tokens: Some(5000),
            heading: |t| format!("# Panel Discussion: {}", t.title),
            keyword_footer: false,
        }
    }

    fn render(&self, topic: &Topic, answer: &str) -> String {
        let mut doc = clean_markdown(answer);
        if !doc.starts_with('#') {
            doc = format!("{}\n\n{}", (self.heading)(topic), doc);
        }
        if self.keyword_footer && !topic.keywords.is_empty() {
            doc.push_str(&format!("\n---\n\n*Keywords: {}*\n", topic.keywords.join(", ")));
        }
        doc
    }
}

#[async_trait]
impl Generator for MarkdownGenerator {
    fn kind(&self) -> GeneratorKind {
        self.kind
    }

    fn requirements(&self) -> &[Capability] {
        NEEDS_LLM
    }

    async fn generate(
        &self,
        topic: &Topic,
        ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError> {
        let options = ctx.options(self.temperature, self.max_tokens, false);
        let answer = ctx
            .ask(prompts::MARKDOWN_SYSTEM, (self.prompt)(topic), &options)
            .await?;
        let page = self.render(topic, &answer);
        Ok(Artifact::new(self.kind, topic).with_part(ArtifactPart::text("md", page)))
    }
}
