//! Prompt templates for every LLM-backed generator and the topic annotator.
//!
//! All wording lives here so a prompt can be tuned without touching retry,
//! parsing or file-writing code. Each generator sends one system message
//! (the `*_SYSTEM` constant) and one user message built by the matching
//! function from the [`Topic`].

use crate::topics::Topic;

/// Shared system preamble: Markdown only, no chatter.
pub const MARKDOWN_SYSTEM: &str = "You are an experienced teacher who writes clear, accurate study \
material for university students. Answer in Markdown only. Do not wrap the answer in code fences \
and do not add remarks before or after the material.";

pub const JSON_SYSTEM: &str = "You are an experienced teacher who writes study material. Answer \
with a single valid JSON value and nothing else.";

/// Cut `body` to at most `max_chars` characters on a paragraph or word boundary.
pub fn excerpt(body: &str, max_chars: usize) -> &str {
    if body.chars().count() <= max_chars {
        return body;
    }
    let cut = body
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(body.len());
    let head = &body[..cut];
    head.rfind("\n\n")
        .filter(|&i| i > cut / 2)
        .or_else(|| head.rfind(char::is_whitespace))
        .map(|i| &head[..i])
        .unwrap_or(head)
}

fn keywords(topic: &Topic) -> String {
    if topic.keywords.is_empty() {
        "(none)".to_string()
    } else {
        topic.keywords.join(", ")
    }
}

pub fn handout(topic: &Topic) -> String {
    format!(
        "Write a study handout for the topic \"{title}\".\n\n\
         Summary: {summary}\n\n\
         Source material:\n{body}\n\n\
         Structure the handout with these sections: Overview, Key Concepts (each with a short \
         explanation), Definitions, Worked Examples, Key Takeaways as bullet points, and five \
         Self-Check Questions. Start with a level-1 heading containing the topic title.",
        title = topic.title,
        summary = topic.summary,
        body = excerpt(&topic.body, 12_000),
    )
}

pub fn cheatsheet(topic: &Topic) -> String {
    format!(
        "Condense the topic \"{title}\" into a one-page quick-reference cheatsheet.\n\n\
         Source material:\n{body}\n\n\
         Use bullet points and tables instead of prose. Include every formula, the key terms \
         with one-line definitions, common pitfalls, and a mnemonic where one helps. Be terse.",
        title = topic.title,
        body = excerpt(&topic.body, 3_000),
    )
}

pub fn mindmap(topic: &Topic) -> String {
    format!(
        "Draw a mindmap of the topic \"{title}\" in Mermaid `mindmap` syntax.\n\n\
         Summary: {summary}\n\
         Keywords: {keywords}\n\n\
         Source excerpt:\n{body}\n\n\
         Put the topic in the root node and use four to six main branches with two to four \
         children each. Return only a ```mermaid code block.",
        title = topic.title,
        summary = topic.summary,
        keywords = keywords(topic),
        body = excerpt(&topic.body, 2_000),
    )
}

pub fn audiobook(topic: &Topic) -> String {
    format!(
        "Write an audiobook chapter script on \"{title}\" meant to be read aloud.\n\n\
         Summary: {summary}\n\n\
         Source material:\n{body}\n\n\
         Open with a hook, keep a warm conversational tone, explain hard ideas with analogies, \
         mark natural pauses with \"...\", avoid anything that needs to be seen, and close with a \
         recap. Aim for about ten minutes of narration (roughly 1500 words).",
        title = topic.title,
        summary = topic.summary,
        body = excerpt(&topic.body, 12_000),
    )
}

/// Story genres rendered for each topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryGenre {
    Fantasy,
    SciFi,
}

impl StoryGenre {
    pub const ALL: [StoryGenre; 2] = [StoryGenre::Fantasy, StoryGenre::SciFi];

    pub fn label(self) -> &'static str {
        match self {
            StoryGenre::Fantasy => "fantasy",
            StoryGenre::SciFi => "scifi",
        }
    }

    fn setting(self) -> &'static str {
        match self {
            StoryGenre::Fantasy => {
                "a magical realm where the concepts appear as spells, creatures and ancient lore"
            }
            StoryGenre::SciFi => {
                "a future starship or colony where the concepts drive technology and discovery"
            }
        }
    }
}

pub fn story(topic: &Topic, genre: StoryGenre) -> String {
    format!(
        "Write a {genre} story that teaches the topic \"{title}\".\n\n\
         Key concepts: {keywords}\n\n\
         Material to teach:\n{body}\n\n\
         Setting: {setting}. Let memorable characters discover the concepts through the plot and \
         explain them in dialogue. Give the story a clear setup, conflict and resolution, end \
         with the lesson learned, and keep it around 2000 words. Start with a level-1 heading \
         holding the story title.",
        genre = genre.label(),
        title = topic.title,
        keywords = keywords(topic),
        body = excerpt(&topic.body, 4_000),
        setting = genre.setting(),
    )
}

pub fn strategy(topic: &Topic) -> String {
    format!(
        "Write a learning strategy for mastering the topic \"{title}\" before an exam.\n\n\
         Summary: {summary}\n\
         Keywords: {keywords}\n\n\
         Source material:\n{body}\n\n\
         Cover: priority concepts, a study schedule with review sessions (spaced repetition), \
         recommended techniques (active recall, practice problems, teaching others), memory \
         aids for the key terms, common mistakes, and a final self-assessment checklist.",
        title = topic.title,
        summary = topic.summary,
        keywords = keywords(topic),
        body = excerpt(&topic.body, 6_000),
    )
}

/// Number of flashcards requested per topic.
pub const FLASHCARD_COUNT: usize = 20;

pub fn flashcards(topic: &Topic) -> String {
    format!(
        "Create {count} flashcards for the topic \"{title}\".\n\n\
         Source material:\n{body}\n\n\
         Return a JSON array of objects with the fields \"front\" (a question or term), \
         \"back\" (a concise, self-contained answer) and \"difficulty\" (\"easy\", \"medium\" or \
         \"hard\"). Mix definitions, concepts and applications.",
        count = FLASHCARD_COUNT,
        title = topic.title,
        body = excerpt(&topic.body, 4_000),
    )
}

/// Number of quiz questions requested per topic.
pub const QUIZ_QUESTION_COUNT: usize = 10;

pub fn quiz(topic: &Topic) -> String {
    format!(
        "Create a quiz of {count} questions on the topic \"{title}\".\n\n\
         Source material:\n{body}\n\n\
         Return a JSON object {{\"questions\": [...]}}. Every question has \"id\" (number), \
         \"type\" (\"multiple_choice\", \"true_false\" or \"short_answer\"), \"question\", \
         \"options\" (four strings prefixed \"A)\" to \"D)\" for multiple choice, otherwise \
         omitted), \"correct_answer\", \"explanation\" and \"difficulty\". Mix the types and \
         difficulty levels.",
        count = QUIZ_QUESTION_COUNT,
        title = topic.title,
        body = excerpt(&topic.body, 4_000),
    )
}

/// Panel members of the discussion script, as (name, perspective).
pub const PANELISTS: [(&str, &str); 3] = [
    ("Dr. Expert", "a researcher who explains the theory and its history"),
    ("Prof. Practical", "a practitioner who focuses on real-world applications"),
    ("Alex Student", "a curious student who asks what learners usually get wrong"),
];

pub fn discussion(topic: &Topic) -> String {
    let panel: String = PANELISTS
        .iter()
        .map(|(name, role)| format!("- {name}: {role}\n"))
        .collect();
    let format_lines: String = PANELISTS
        .iter()
        .map(|(name, _)| format!("{}: ...\n", name.to_uppercase()))
        .collect();
    format!(
        "Write a panel discussion script about \"{title}\".\n\n\
         Summary: {summary}\n\
         Concepts to cover: {keywords}\n\n\
         Material:\n{body}\n\n\
         Panel:\n{panel}\
         A MODERATOR opens, introduces the panel, steers the conversation and closes. Include \
         an opening round, a lively exchange with some disagreement, three audience questions \
         and closing remarks. Aim for 2000 to 2500 words. Write every line as:\n\
         MODERATOR: ...\n{format_lines}AUDIENCE MEMBER: ...",
        title = topic.title,
        summary = topic.summary,
        keywords = keywords(topic),
        body = excerpt(&topic.body, 5_000),
    )
}

/// Prompt for the optional topic annotation pass.
pub fn annotate(topic: &Topic) -> String {
    format!(
        "Read this section of a study document and describe it.\n\n\
         Current title: {title}\n\n\
         Text:\n{body}\n\n\
         Return a JSON object with \"title\" (at most 8 words), \"summary\" (two sentences) and \
         \"keywords\" (up to 8 key terms).",
        title = topic.title,
        body = excerpt(&topic.body, 6_000),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> Topic {
        Topic {
            id: "topic-01".into(),
            ordinal: 1,
            title: "Photosynthesis".into(),
            body: "Plants convert light into chemical energy.".into(),
            summary: "How plants make sugar.".into(),
            keywords: vec!["chlorophyll".into(), "glucose".into()],
        }
    }

    #[test]
    fn excerpt_keeps_short_text() {
        assert_eq!(excerpt("short text", 100), "short text");
    }

    #[test]
    fn excerpt_cuts_on_whitespace() {
        let out = excerpt("alpha beta gamma delta", 13);
        assert_eq!(out, "alpha beta");
    }

    #[test]
    fn prompts_embed_topic_fields() {
        let t = topic();
        assert!(handout(&t).contains("Photosynthesis"));
        assert!(mindmap(&t).contains("chlorophyll, glucose"));
        assert!(flashcards(&t).contains("\"front\""));
        assert!(quiz(&t).contains("{\"questions\": [...]}"));
        assert!(story(&t, StoryGenre::SciFi).contains("scifi story"));
    }

    #[test]
    fn discussion_lists_every_panelist() {
        let p = discussion(&topic());
        for (name, _) in PANELISTS {
            assert!(p.contains(name));
            assert!(p.contains(&format!("{}:", name.to_uppercase())));
        }
        assert!(p.contains("MODERATOR"));
    }
}
