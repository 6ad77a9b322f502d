use super::{Capability, GenerationContext, Generator, GeneratorKind, NEEDS_LLM};
use crate::error::GenerationError;
use crate::llm::strip_code_fence;
use crate::output::{Artifact, ArtifactPart};
use crate::prompts;
use crate::topics::Topic;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One question/answer card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_difficulty() -> String {
    "medium".to_string()
}

static RE_QA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^\s*(?:\*\*)?Q(?:uestion)?\s*\d*(?:\*\*)?\s*[:.]\s*(.+?)\s*\n\s*(?:\*\*)?A(?:nswer)?\s*\d*(?:\*\*)?\s*[:.]\s*(.+?)\s*$").unwrap()
});

/// Parse the model's cards: a JSON array, else `Q:`/`A:` line pairs.
/// Cards with an empty side are dropped.
pub fn parse_flashcards(answer: &str) -> Vec<Flashcard> {
    let body = strip_code_fence(answer);
    let cards = match serde_json::from_str::<Vec<Flashcard>>(body) {
        Ok(cards) => cards,
        Err(e) => {
            debug!("Flashcards were not a JSON array ({}); trying Q/A lines", e);
            RE_QA
                .captures_iter(body)
                .map(|c| Flashcard {
                    front: c[1].to_string(),
                    back: c[2].to_string(),
                    difficulty: default_difficulty(),
                })
                .collect()
        }
    };
    cards
        .into_iter()
        .map(|c| Flashcard {
            front: c.front.trim().to_string(),
            back: c.back.trim().to_string(),
            difficulty: c.difficulty.trim().to_lowercase(),
        })
        .filter(|c| !c.front.is_empty() && !c.back.is_empty())
        .collect()
}

fn anki_field(s: &str) -> String {
    s.replace('\t', " ").replace("\r\n", "<br>").replace('\n', "<br>")
}

/// Tab-separated `front<TAB>back` lines, importable by Anki as "Basic".
fn to_anki_tsv(cards: &[Flashcard]) -> String {
    cards
        .iter()
        .map(|c| format!("{}\t{}\n", anki_field(&c.front), anki_field(&c.back)))
        .collect()
}

fn to_markdown(topic: &Topic, cards: &[Flashcard]) -> String {
    let mut md = format!("# Flashcards: {}\n\n", topic.title);
    for (i, card) in cards.iter().enumerate() {
        md.push_str(&format!(
            "## Card {} ({})\n\n**Q:** {}\n\n**A:** {}\n\n",
            i + 1,
            card.difficulty,
            card.front,
            card.back
        ));
    }
    md.truncate(md.trim_end().len());
    md.push('\n');
    md
}

/// Flashcards as a readable Markdown deck plus an Anki import file.
pub struct FlashcardsGenerator;

#[async_trait]
impl Generator for FlashcardsGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Flashcards
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
            .ask(prompts::JSON_SYSTEM, prompts::flashcards(topic), &options)
            .await?;
        let cards = parse_flashcards(&answer);
        if cards.is_empty() {
            return Err(GenerationError::InvalidResponse("no flashcards in answer".into()));
        }
        debug!("{}: {} flashcards", topic.id, cards.len());

        Ok(Artifact::new(GeneratorKind::Flashcards, topic)
            .with_part(ArtifactPart::text("md", to_markdown(topic, &cards)))
            .with_part(ArtifactPart::text("tsv", to_anki_tsv(&cards)).labeled("anki")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{topic, FakeLlm};
    use super::*;
    use crate::auth::SessionHandle;
    use std::sync::Arc;

    #[test]
    fn parses_fenced_json() {
        let answer = "```json\n[{\"front\": \"What is ATP?\", \"back\": \"Energy currency\", \"difficulty\": \"Easy\"},\
                      {\"front\": \" \", \"back\": \"dropped\"}]\n```";
        let cards = parse_flashcards(answer);
        assert_eq!(
            cards,
            vec![Flashcard {
                front: "What is ATP?".into(),
                back: "Energy currency".into(),
                difficulty: "easy".into(),
            }]
        );
    }

    #[test]
    fn falls_back_to_question_answer_lines() {
        let answer = "Q: Where does glycolysis happen?\nA: In the cytoplasm.\n\nQ2: What gas is released?\nA2: Carbon dioxide.";
        let cards = parse_flashcards(answer);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[1].front, "What gas is released?");
        assert_eq!(cards[1].back, "Carbon dioxide.");
        assert_eq!(cards[1].difficulty, "medium");
    }

    #[test]
    fn anki_fields_have_no_tabs_or_newlines() {
        let cards = vec![Flashcard {
            front: "a\tb".into(),
            back: "line1\nline2".into(),
            difficulty: "hard".into(),
        }];
        assert_eq!(to_anki_tsv(&cards), "a b\tline1<br>line2\n");
    }

    #[tokio::test]
    async fn generates_deck_and_anki_file_in_json_mode() {
        let llm = Arc::new(FakeLlm::answering(
            r#"[{"front": "Krebs cycle location?", "back": "Mitochondrial matrix", "difficulty": "medium"}]"#,
        ));
        let ctx = GenerationContext::new(SessionHandle::default().with_llm(llm.clone()), "Bio");
        let artifact = FlashcardsGenerator.generate(&topic(), &ctx).await.unwrap();

        assert!(llm.last_options().json_mode);
        assert_eq!(artifact.parts.len(), 2);
        let md = String::from_utf8(artifact.parts[0].content.clone()).unwrap();
        assert!(md.contains("**Q:** Krebs cycle location?"));
        assert_eq!(
            artifact.file_name(&artifact.parts[1]),
            "flashcards_02_cell_respiration_anki.tsv"
        );
    }

    #[tokio::test]
    async fn unparseable_answer_is_invalid() {
        let llm = Arc::new(FakeLlm::answering("no cards today"));
        let ctx = GenerationContext::new(SessionHandle::default().with_llm(llm), "Bio");
        let err = FlashcardsGenerator.generate(&topic(), &ctx).await.unwrap_err();
        assert!(matches!(err, GenerationError::InvalidResponse(_)));
    }
}
