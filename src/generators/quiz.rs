use super::{Capability, GenerationContext, Generator, GeneratorKind, NEEDS_LLM};
use crate::error::GenerationError;
use crate::llm::strip_code_fence;
use crate::output::{Artifact, ArtifactPart};
use crate::prompts;
use crate::topics::Topic;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One quiz question as returned by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    #[serde(default, rename = "type")]
    pub question_type: String,
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "answer_as_string")]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub difficulty: String,
}

/// Models return `true` and `"True"` alike for true/false questions.
fn answer_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QuizEnvelope {
    Wrapped { questions: Vec<QuizQuestion> },
    Bare(Vec<QuizQuestion>),
}

/// Parse `{"questions": [...]}` or a bare array. Questions without text are
/// dropped.
pub fn parse_quiz(answer: &str) -> Result<Vec<QuizQuestion>, GenerationError> {
    let envelope: QuizEnvelope = serde_json::from_str(strip_code_fence(answer))
        .map_err(|e| GenerationError::InvalidResponse(format!("quiz is not valid JSON: {e}")))?;
    let questions = match envelope {
        QuizEnvelope::Wrapped { questions } | QuizEnvelope::Bare(questions) => questions,
    };
    let questions: Vec<_> = questions
        .into_iter()
        .filter(|q| !q.question.trim().is_empty())
        .collect();
    if questions.is_empty() {
        return Err(GenerationError::InvalidResponse("quiz has no questions".into()));
    }
    Ok(questions)
}

fn to_markdown(topic: &Topic, questions: &[QuizQuestion]) -> String {
    let mut md = format!("# Quiz: {}\n\n", topic.title);
    for (i, q) in questions.iter().enumerate() {
        md.push_str(&format!("## Question {}\n\n{}\n\n", i + 1, q.question.trim()));
        if q.options.is_empty() && q.question_type == "true_false" {
            md.push_str("- True\n- False\n\n");
        }
        for option in &q.options {
            md.push_str(&format!("- {}\n", option.trim()));
        }
        if !q.options.is_empty() {
            md.push('\n');
        }
    }

    md.push_str("---\n\n## Answer Key\n\n");
    for (i, q) in questions.iter().enumerate() {
        md.push_str(&format!("{}. **{}**", i + 1, q.correct_answer.trim()));
        if !q.explanation.trim().is_empty() {
            md.push_str(&format!(": {}", q.explanation.trim()));
        }
        if !q.difficulty.is_empty() {
            md.push_str(&format!(" _({})_", q.difficulty));
        }
        md.push('\n');
    }
    md
}

/// Mixed-format quiz with an answer key at the end.
pub struct QuizGenerator;

#[async_trait]
impl Generator for QuizGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Quiz
    }

    fn requirements(&self) -> &[Capability] {
        NEEDS_LLM
    }

    async fn generate(
        &self,
        topic: &Topic,
        ctx: &GenerationContext,
    ) -> Result<Artifact, GenerationError> {
        let options = ctx.options(0.4, None, true);
        let answer = ctx
            .ask(prompts::JSON_SYSTEM, prompts::quiz(topic), &options)
            .await?;
        let questions = parse_quiz(&answer)?;
        Ok(Artifact::new(GeneratorKind::Quiz, topic)
            .with_part(ArtifactPart::text("md", to_markdown(topic, &questions))))
    }
}
