use super::{Capability, GenerationContext, Generator, GeneratorKind, Resource, NEEDS_LLM};
use crate::auth::SessionHandle;
use crate::error::GenerationError;
use crate::notebook::{OverviewKind, OverviewMedia};
use crate::output::{Artifact, ArtifactPart};
use crate::postprocess::clean_markdown;
use crate::prompts;
use crate::topics::Topic;
use async_trait::async_trait;
use tracing::warn;

/// Narration script from the LLM, plus a NotebookLM audio overview when a
/// browser session is available. A failed overview only loses the extra
/// part; the script alone is a valid audiobook.
pub struct AudiobookGenerator;

/// The downloaded media, or a link file when only the URL is known.
pub(crate) fn media_part(media: OverviewMedia, label: &str) -> ArtifactPart {
    match media.content {
        Some(bytes) => ArtifactPart::bytes(media.extension, bytes).labeled(label),
        None => ArtifactPart::text("url", format!("{}\n", media.source_url)).labeled(label),
    }
}

#[async_trait]
impl Generator for AudiobookGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Audiobook
    }

    fn requirements(&self) -> &[Capability] {
        NEEDS_LLM
    }

    fn resources(&self, session: &SessionHandle) -> Vec<Resource> {
        if session.has(Capability::Notebook) {
            vec![Resource::Browser]
        } else {
            Vec::new()
        }
    }

    async fn generate(
        &self,
        topic: &Topic,
        ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError> {
        let options = ctx.options(0.6, None, false);
        let answer = ctx
            .ask(prompts::MARKDOWN_SYSTEM, prompts::audiobook(topic), &options)
            .await?;
        let mut script = clean_markdown(&answer);
        if !script.starts_with('#') {
            script = format!("# {}: Audiobook Script\n\n{}", topic.title, script);
        }
        let mut artifact = Artifact::new(GeneratorKind::Audiobook, topic)
            .with_part(ArtifactPart::text("md", script));

        if let Some(notebook) = ctx.session.notebook() {
            match notebook.create_overview(topic, OverviewKind::Audio).await {
                Ok(media) => artifact = artifact.with_part(media_part(media, "overview")),
                Err(e) => warn!("{}: audio overview failed, keeping script only: {}", topic.id, e),
            }
        }
        Ok(artifact)
    }
}
