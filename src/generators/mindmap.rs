use super::{Capability, GenerationContext, Generator, GeneratorKind, NEEDS_LLM};
use crate::error::GenerationError;
use crate::output::{Artifact, ArtifactPart};
use crate::postprocess::extract_mermaid;
use crate::prompts;
use crate::topics::Topic;
use async_trait::async_trait;

/// Mermaid mindmap: a Markdown page embedding the diagram plus the raw
/// `.mmd` source for renderers.
pub struct MindmapGenerator;

#[async_trait]
impl Generator for MindmapGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Mindmap
    }

    fn requirements(&self) -> &[Capability] {
        NEEDS_LLM
    }

    async fn generate(
        &self,
        topic: &Topic,
        ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError> {
        let options = ctx.options(0.4, None, false);
        let answer = ctx
            .ask(prompts::MARKDOWN_SYSTEM, prompts::mindmap(topic), &options)
            .await?;
        let diagram = extract_mermaid(&answer).ok_or_else(|| {
            GenerationError::InvalidResponse("no Mermaid diagram in answer".into())
        })?;

        let page = format!(
            "# Mindmap: {}\n\n```mermaid\n{}\n```\n",
            topic.title, diagram
        );
        Ok(Artifact::new(GeneratorKind::Mindmap, topic)
            .with_part(ArtifactPart::text("md", page))
            .with_part(ArtifactPart::text("mmd", format!("{diagram}\n"))))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{topic, FakeLlm};
    use super::*;
    use crate::auth::SessionHandle;
    use std::sync::Arc;

    #[tokio::test]
    async fn fenced_diagram_is_embedded_and_exported() {
        let llm = Arc::new(FakeLlm::answering(
            "Here you go:\n```mermaid\nmindmap\n  root((Cell Respiration))\n    Glycolysis\n```\nEnjoy!",
        ));
        let ctx = GenerationContext::new(SessionHandle::default().with_llm(llm), "Bio");
        let artifact = MindmapGenerator.generate(&topic(), &ctx).await.unwrap();

        assert_eq!(artifact.parts.len(), 2);
        let page = String::from_utf8(artifact.parts[0].content.clone()).unwrap();
        assert!(page.starts_with("# Mindmap: Cell Respiration\n\n```mermaid\nmindmap\n"));
        assert_eq!(artifact.parts[1].extension, "mmd");
        assert_eq!(
            artifact.file_name(&artifact.parts[1]),
            "mindmap_02_cell_respiration.mmd"
        );
    }

    #[tokio::test]
    async fn answer_without_diagram_is_retryable_error() {
        let llm = Arc::new(FakeLlm::answering("I cannot draw diagrams."));
        let ctx = GenerationContext::new(SessionHandle::default().with_llm(llm), "Bio");
        let err = MindmapGenerator.generate(&topic(), &ctx).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
        assert!(err.is_transient());
    }
}
