use super::audiobook::media_part;
use super::{Capability, GenerationContext, Generator, GeneratorKind, Resource, NEEDS_NOTEBOOK};
use crate::auth::SessionHandle;
use crate::error::GenerationError;
use crate::notebook::OverviewKind;
use crate::output::Artifact;
use crate::topics::Topic;
use async_trait::async_trait;

/// NotebookLM video overview. Runs only with a browser session and holds the
/// browser for its whole duration.
pub struct VideoGenerator;

#[async_trait]
impl Generator for VideoGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Video
    }

    fn requirements(&self) -> &[Capability] {
        NEEDS_NOTEBOOK
    }

    fn resources(&self, _session: &SessionHandle) -> Vec<Resource> {
        vec![Resource::Browser]
    }

    async fn generate(
        &self,
        topic: &Topic,
        ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError> {
        let media = ctx
            .notebook()?
            .create_overview(topic, OverviewKind::Video)
            .await?;
        let part = media_part(media, "overview");
        Ok(Artifact::new(GeneratorKind::Video, topic).with_part(part))
    }
}
