use super::{Capability, GenerationContext, Generator, GeneratorKind, NEEDS_LLM};
use crate::error::GenerationError;
use crate::output::{Artifact, ArtifactPart};
use crate::postprocess::clean_markdown;
use crate::prompts::{self, StoryGenre};
use crate::topics::Topic;
use async_trait::async_trait;

/// One story per genre, each in its own labelled file. Both genres must
/// succeed for the unit to succeed.
pub struct StoryGenerator;

#[async_trait]
impl Generator for StoryGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Story
    }

    fn requirements(&self) -> &[Capability] {
        NEEDS_LLM
    }

    async fn generate(
        &self,
        topic: &Topic,
        ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError> {
        let options = ctx.options(0.8, None, false);
        let mut artifact = Artifact::new(GeneratorKind::Story, topic);
        for genre in StoryGenre::ALL {
            let answer = ctx
                .ask(prompts::MARKDOWN_SYSTEM, prompts::story(topic, genre), &options)
                .await?;
            let mut doc = clean_markdown(&answer);
            if !doc.starts_with('#') {
                doc = format!("# {} ({})\n\n{}", topic.title, genre.label(), doc);
            }
            artifact = artifact.with_part(ArtifactPart::text("md", doc).labeled(genre.label()));
        }
        Ok(artifact)
    }
}
