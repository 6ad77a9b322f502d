//! Topic decomposition: cut normalised text into ordered, self-contained topics.
//!
//! [`TopicSplitter`] is pure and deterministic. [`TopicAnnotator`] is an
//! optional second pass that asks the LLM for better titles, summaries and
//! keywords; any failure there keeps the heuristic values.

use crate::error::SplitError;
use crate::llm::{strip_code_fence, ChatMessage, CompletionOptions, LlmProvider};
use crate::prompts;
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Roughly the smallest topic worth generating a full set of materials for.
const MIN_WORDS_PER_TOPIC: usize = 150;

/// Sections shorter than this are folded into a neighbour.
const MIN_SECTION_WORDS: usize = 30;

const MAX_KEYWORDS: usize = 8;

/// One slice of the source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    /// Stable identifier, `topic-NN`.
    pub id: String,
    /// 1-based position in the document.
    pub ordinal: usize,
    pub title: String,
    pub body: String,
    pub summary: String,
    pub keywords: Vec<String>,
}

/// How the document is partitioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    /// Markdown headings, else PDF page markers, else [`SplitStrategy::Balanced`].
    #[default]
    Headings,
    /// Paragraph-preserving chunks of similar word count.
    Balanced,
    /// The whole document as one topic.
    Single,
}

impl FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headings" | "heading" => Ok(Self::Headings),
            "balanced" | "size" => Ok(Self::Balanced),
            "single" | "none" => Ok(Self::Single),
            other => Err(format!(
                "unknown split strategy '{other}' (expected headings, balanced or single)"
            )),
        }
    }
}

/// Partitions text into [`Topic`]s.
#[derive(Debug, Clone)]
pub struct TopicSplitter {
    pub strategy: SplitStrategy,
    pub target_topics: usize,
    pub min_chars: usize,
}

impl Default for TopicSplitter {
    fn default() -> Self {
        Self {
            strategy: SplitStrategy::default(),
            target_topics: 5,
            min_chars: 200,
        }
    }
}

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());
static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--- Page \d+ ---$").unwrap());
static RE_PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());
static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z'-]*").unwrap());

/// A run of text with an optional heading, before it becomes a [`Topic`].
#[derive(Debug, Default)]
struct Section {
    heading: Option<String>,
    lines: Vec<String>,
}

impl Section {
    fn words(&self) -> usize {
        self.lines.iter().map(|l| l.split_whitespace().count()).sum()
    }
}

fn heading_of(line: &str) -> Option<(usize, String)> {
    RE_HEADING
        .captures(line.trim())
        .map(|c| (c[1].len(), c[2].to_string()))
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Each line paired with its heading, if any. Lines inside fenced code
/// blocks are never headings.
fn lines_with_headings(text: &str) -> Vec<(&str, Option<(usize, String)>)> {
    let mut in_fence = false;
    text.lines()
        .map(|line| {
            if is_fence(line) {
                in_fence = !in_fence;
                return (line, None);
            }
            let heading = if in_fence { None } else { heading_of(line) };
            (line, heading)
        })
        .collect()
}

fn is_page_marker(line: &str) -> bool {
    RE_PAGE_MARKER.is_match(line.trim())
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

impl TopicSplitter {
    pub fn new(strategy: SplitStrategy, target_topics: usize, min_chars: usize) -> Self {
        Self {
            strategy,
            target_topics: target_topics.max(1),
            min_chars,
        }
    }

    /// Split `text` into ordered topics.
    ///
    /// Every non-blank paragraph of the input ends up in exactly one topic
    /// body, in input order. Page marker lines are structural and dropped.
    pub fn split(&self, text: &str, document_title: &str) -> Result<Vec<Topic>, SplitError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SplitError::Empty);
        }
        let chars = text.chars().count();
        if chars < self.min_chars {
            return Err(SplitError::TooShort {
                chars,
                min: self.min_chars,
            });
        }

        let sections = match self.strategy {
            SplitStrategy::Single => vec![Section {
                heading: Some(document_title.to_string()),
                lines: text.lines().map(str::to_string).collect(),
            }],
            SplitStrategy::Balanced => self.balanced_sections(text),
            SplitStrategy::Headings => match heading_sections(text) {
                Some(s) => s,
                None => match self.page_sections(text) {
                    Some(s) => s,
                    None => {
                        debug!("No usable headings or page markers; splitting by size");
                        self.balanced_sections(text)
                    }
                },
            },
        };

        let topics: Vec<Topic> = sections
            .into_iter()
            .filter_map(|s| {
                let body = render_body(&s.lines);
                (!body.is_empty()).then_some((s.heading, body))
            })
            .enumerate()
            .map(|(i, (heading, body))| build_topic(i + 1, heading, body, document_title))
            .collect();

        info!(
            "Split '{}' into {} topic(s) ({:?})",
            document_title,
            topics.len(),
            self.strategy
        );
        Ok(topics)
    }

    fn topic_count_for(&self, words: usize) -> usize {
        (words / MIN_WORDS_PER_TOPIC).max(1).min(self.target_topics.max(1))
    }

    fn balanced_sections(&self, text: &str) -> Vec<Section> {
        let paragraphs: Vec<String> = RE_PARAGRAPH_BREAK
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let total: usize = paragraphs.iter().map(|p| word_count(p)).sum();
        let k = self.topic_count_for(total);

        group_balanced(paragraphs, k, |p| word_count(p))
            .into_iter()
            .map(|group| Section {
                heading: None,
                lines: group
                    .join("\n\n")
                    .lines()
                    .map(str::to_string)
                    .collect(),
            })
            .collect()
    }

    /// Group PDF pages into roughly equal topics. `None` without ≥ 2 pages.
    fn page_sections(&self, text: &str) -> Option<Vec<Section>> {
        let mut pages: Vec<Vec<String>> = Vec::new();
        let mut preamble: Vec<String> = Vec::new();
        for line in text.lines() {
            if is_page_marker(line) {
                pages.push(Vec::new());
            } else if let Some(page) = pages.last_mut() {
                page.push(line.to_string());
            } else {
                preamble.push(line.to_string());
            }
        }
        pages.retain(|p| p.iter().any(|l| !l.trim().is_empty()));
        if pages.len() < 2 {
            return None;
        }
        if let Some(first) = pages.first_mut() {
            preamble.append(first);
            *first = preamble;
        }

        let total: usize = pages.iter().flatten().map(|l| word_count(l)).sum();
        let k = self.topic_count_for(total);
        let groups = group_balanced(pages, k, |p| p.iter().map(|l| word_count(l)).sum());
        Some(
            groups
                .into_iter()
                .map(|group| {
                    let mut lines = Vec::new();
                    for page in group {
                        if !lines.is_empty() {
                            lines.push(String::new());
                        }
                        lines.extend(page);
                    }
                    Section {
                        heading: None,
                        lines,
                    }
                })
                .collect(),
        )
    }
}

/// Sections at the shallowest heading level (1 or 2) that occurs at least
/// twice. Preamble joins the first section; tiny sections are merged.
fn heading_sections(text: &str) -> Option<Vec<Section>> {
    let lines = lines_with_headings(text);
    let mut counts = [0usize; 3];
    for (_, heading) in &lines {
        if let Some((level, _)) = heading {
            if *level <= 2 {
                counts[*level] += 1;
            }
        }
    }
    let split_level = if counts[1] >= 2 {
        1
    } else if counts[2] >= 2 {
        2
    } else {
        return None;
    };

    let mut sections: Vec<Section> = Vec::new();
    let mut preamble: Vec<String> = Vec::new();
    for (line, heading) in lines {
        match heading {
            Some((level, title)) if level == split_level => sections.push(Section {
                heading: Some(title),
                lines: vec![line.to_string()],
            }),
            _ => match sections.last_mut() {
                Some(section) => section.lines.push(line.to_string()),
                None => preamble.push(line.to_string()),
            },
        }
    }
    if let Some(first) = sections.first_mut() {
        preamble.append(&mut first.lines);
        first.lines = preamble;
    }

    Some(merge_small_sections(sections))
}

/// Fold sections below [`MIN_SECTION_WORDS`] into the next one (the last
/// one into its predecessor). The surviving heading is the first non-empty one.
fn merge_small_sections(sections: Vec<Section>) -> Vec<Section> {
    let mut out: Vec<Section> = Vec::with_capacity(sections.len());
    let mut carry: Option<Section> = None;
    for mut section in sections {
        if let Some(mut prev) = carry.take() {
            prev.lines.push(String::new());
            prev.lines.append(&mut section.lines);
            section.lines = prev.lines;
            section.heading = prev.heading.or(section.heading);
        }
        if section.words() < MIN_SECTION_WORDS {
            carry = Some(section);
        } else {
            out.push(section);
        }
    }
    if let Some(mut rest) = carry {
        match out.last_mut() {
            Some(last) => {
                last.lines.push(String::new());
                last.lines.append(&mut rest.lines);
            }
            None => out.push(rest),
        }
    }
    out
}

/// Split `units` into at most `k` consecutive groups of similar weight.
fn group_balanced<T>(units: Vec<T>, k: usize, weight: impl Fn(&T) -> usize) -> Vec<Vec<T>> {
    let n = units.len();
    let k = k.clamp(1, n.max(1));
    let total: usize = units.iter().map(&weight).sum();

    let mut groups: Vec<Vec<T>> = Vec::with_capacity(k);
    let mut current: Vec<T> = Vec::new();
    let mut acc = 0usize;
    for (i, unit) in units.into_iter().enumerate() {
        acc += weight(&unit);
        current.push(unit);
        let remaining_units = n - i - 1;
        let remaining_groups = k - groups.len() - 1;
        let boundary = total * (groups.len() + 1) / k;
        if remaining_groups > 0 && (acc >= boundary || remaining_units == remaining_groups) {
            groups.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn render_body(lines: &[String]) -> String {
    let kept: Vec<&str> = lines
        .iter()
        .map(String::as_str)
        .filter(|l| !is_page_marker(l))
        .collect();
    RE_PARAGRAPH_BREAK
        .split(&kept.join("\n"))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_topic(
    ordinal: usize,
    heading: Option<String>,
    body: String,
    document_title: &str,
) -> Topic {
    let title = heading
        .filter(|h| !h.trim().is_empty())
        .or_else(|| title_from_first_line(&body))
        .unwrap_or_else(|| format!("{document_title}, part {ordinal}"));
    Topic {
        id: format!("topic-{ordinal:02}"),
        ordinal,
        summary: summarize(&body),
        keywords: extract_keywords(&body),
        title,
        body,
    }
}

fn title_from_first_line(body: &str) -> Option<String> {
    let first = body.lines().next()?.trim();
    let first = first.trim_start_matches('#').trim();
    (!first.is_empty() && first.chars().count() <= 80 && !first.ends_with('.'))
        .then(|| first.to_string())
}

/// The first two sentences of the prose, capped at 300 characters.
pub fn summarize(body: &str) -> String {
    let prose = body
        .lines()
        .filter(|l| heading_of(l).is_none())
        .collect::<Vec<_>>()
        .join(" ");
    let prose = prose.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut end = prose.len();
    let mut sentences = 0;
    let mut chars = prose.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') && chars.peek().is_none_or(|(_, n)| n.is_whitespace()) {
            sentences += 1;
            if sentences == 2 {
                end = i + c.len_utf8();
                break;
            }
        }
    }
    let summary = &prose[..end];
    match summary.char_indices().nth(300) {
        Some((cut, _)) => format!("{}…", summary[..cut].trim_end()),
        None => summary.to_string(),
    }
}

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "along", "although", "among", "another",
    "around", "because", "before", "being", "below", "between", "cannot", "could", "doing",
    "during", "either", "every", "example", "first", "further", "having", "however", "itself",
    "might", "never", "often", "other", "others", "ought", "page", "people", "rather", "second",
    "should", "since", "still", "their", "theirs", "there", "therefore", "these", "thing",
    "things", "think", "third", "those", "three", "through", "under", "until", "using", "usually",
    "various", "where", "whether", "which", "while", "whose", "within", "without", "would",
    "yours", "yourself",
];

/// The most frequent non-stopword terms of at least five letters.
pub fn extract_keywords(body: &str) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, m) in RE_WORD.find_iter(body).enumerate() {
        let word = m.as_str().trim_matches(|c| c == '\'' || c == '-').to_lowercase();
        if word.chars().count() < 5 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        counts.entry(word).or_insert((0, pos)).0 += 1;
    }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(w, _)| w)
        .collect()
}

// ── LLM annotation ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Annotation {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
}

/// Optional LLM pass refining topic titles, summaries and keywords.
pub struct TopicAnnotator {
    provider: Arc<dyn LlmProvider>,
    concurrency: usize,
}

impl TopicAnnotator {
    pub fn new(provider: Arc<dyn LlmProvider>, concurrency: usize) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
        }
    }

    /// Annotate every topic in place. Returns how many were updated.
    pub async fn annotate(&self, topics: &mut [Topic]) -> usize {
        let options = CompletionOptions {
            temperature: Some(0.2),
            max_tokens: Some(1024),
            json_mode: true,
        };
        let results: Vec<(usize, Option<Annotation>)> = stream::iter(topics.iter().enumerate())
            .map(|(idx, topic)| {
                let messages = vec![
                    ChatMessage::system(prompts::JSON_SYSTEM),
                    ChatMessage::user(prompts::annotate(topic)),
                ];
                let provider = Arc::clone(&self.provider);
                let options = options.clone();
                let topic_id = topic.id.clone();
                async move {
                    let parsed = match provider.chat(&messages, Some(&options)).await {
                        Ok(resp) => {
                            let body = strip_code_fence(&resp.content);
                            match serde_json::from_str::<Annotation>(body) {
                                Ok(a) => Some(a),
                                Err(e) => {
                                    warn!(
                                        "{}: annotation was not valid JSON ({}); keeping heuristics",
                                        topic_id, e
                                    );
                                    None
                                }
                            }
                        }
                        Err(e) => {
                            warn!(
                                "{}: annotation request failed ({}); keeping heuristics",
                                topic_id, e
                            );
                            None
                        }
                    };
                    (idx, parsed)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut updated = 0;
        for (idx, annotation) in results {
            let Some(a) = annotation else { continue };
            let topic = &mut topics[idx];
            if let Some(t) = a.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
                topic.title = t;
            }
            if let Some(s) = a.summary.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
                topic.summary = s;
            }
            if let Some(k) = a.keywords.filter(|k| !k.is_empty()) {
                topic.keywords = k.into_iter().take(MAX_KEYWORDS).collect();
            }
            updated += 1;
        }
        debug!("Annotated {}/{} topics", updated, topics.len());
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;

    fn words(n: usize, word: &str) -> String {
        vec![word; n].join(" ")
    }

    fn splitter(strategy: SplitStrategy) -> TopicSplitter {
        TopicSplitter::new(strategy, 5, 50)
    }

    fn paragraphs(text: &str) -> Vec<String> {
        RE_PARAGRAPH_BREAK
            .split(text)
            .map(str::trim)
            .filter(|p| !p.is_empty() && !is_page_marker(p))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn empty_and_short_inputs_fail() {
        let s = splitter(SplitStrategy::Headings);
        assert_eq!(s.split("  \n ", "Doc"), Err(SplitError::Empty));
        assert_eq!(
            s.split("tiny", "Doc"),
            Err(SplitError::TooShort { chars: 4, min: 50 })
        );
    }

    #[test]
    fn headings_become_topics_with_preamble_in_first() {
        let text = format!(
            "Intro line before headings.\n\n## Cells\n\n{}\n\n## Tissues\n\n{}",
            words(40, "membrane"),
            words(40, "epithelium")
        );
        let topics = splitter(SplitStrategy::Headings).split(&text, "Biology").unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].title, "Cells");
        assert_eq!(topics[0].id, "topic-01");
        assert!(topics[0].body.starts_with("Intro line"));
        assert_eq!(topics[1].title, "Tissues");
        assert_eq!(topics[1].ordinal, 2);
        assert_eq!(topics[1].keywords, vec!["epithelium".to_string(), "tissues".to_string()]);
    }

    #[test]
    fn comments_in_code_fences_are_not_headings() {
        let text = format!(
            "## Intro\n\n{}\n\n```bash\n# install deps\ncargo fetch\n# run tests\ncargo test\n```\n\n## Usage\n\n{}\n\n~~~\n# not a heading\n~~~\n",
            words(200, "setup"),
            words(200, "usage")
        );
        let topics = splitter(SplitStrategy::Headings).split(&text, "Guide").unwrap();
        let titles: Vec<&str> = topics.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["Intro", "Usage"]);
        assert!(topics[0].body.contains("# install deps"));
        assert!(topics[1].body.contains("# not a heading"));
    }

    #[test]
    fn tiny_heading_sections_are_merged() {
        let text = format!(
            "# A\n\nshort\n\n# B\n\n{}\n\n# C\n\n{}",
            words(40, "alpha"),
            words(40, "gamma")
        );
        let topics = splitter(SplitStrategy::Headings).split(&text, "Doc").unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].title, "A");
        assert!(topics[0].body.contains("alpha"));
    }

    #[test]
    fn headings_fall_back_to_balanced() {
        let text = (0..10)
            .map(|i| format!("Paragraph {i}. {}", words(60, "lorem")))
            .collect::<Vec<_>>()
            .join("\n\n");
        let topics = splitter(SplitStrategy::Headings).split(&text, "Notes").unwrap();
        assert_eq!(topics.len(), 4, "620 words / 150 per topic");
        assert_eq!(topics[0].title, "Notes, part 1");
    }

    #[test]
    fn page_markers_group_pages() {
        let text = (1..=6)
            .map(|i| format!("--- Page {i} ---\n{}", words(100, "page")))
            .collect::<Vec<_>>()
            .join("\n\n");
        let topics = splitter(SplitStrategy::Headings).split(&text, "Slides").unwrap();
        assert_eq!(topics.len(), 4);
        assert!(topics.iter().all(|t| !t.body.contains("--- Page")));
    }

    #[test]
    fn balanced_split_covers_every_paragraph_in_order() {
        let text = (0..17)
            .map(|i| format!("Para{i} {}", words(20 + i * 7, "content")))
            .collect::<Vec<_>>()
            .join("\n\n");
        let topics = splitter(SplitStrategy::Balanced).split(&text, "Doc").unwrap();
        assert!(topics.len() > 1 && topics.len() <= 5);
        let rejoined: Vec<String> = topics.iter().flat_map(|t| paragraphs(&t.body)).collect();
        assert_eq!(rejoined, paragraphs(&text));
    }

    #[test]
    fn single_strategy_uses_document_title() {
        let text = words(300, "entropy");
        let topics = splitter(SplitStrategy::Single).split(&text, "Thermo").unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].title, "Thermo");
    }

    #[test]
    fn group_balanced_never_exceeds_k_or_leaves_empty_groups() {
        let groups = group_balanced(vec![100, 1, 1, 1, 1], 3, |w| *w);
        assert_eq!(groups.len(), 3);
        assert!(groups.iter().all(|g| !g.is_empty()));
        assert_eq!(groups.concat(), vec![100, 1, 1, 1, 1]);
    }

    #[test]
    fn summary_takes_two_sentences() {
        let s = summarize("## Heading\nFirst one. Second one! Third one.");
        assert_eq!(s, "First one. Second one!");
        assert_eq!(summarize("No terminator here"), "No terminator here");
    }

    #[test]
    fn keywords_skip_stopwords_and_short_words() {
        let k = extract_keywords(
            "The enzyme binds. Enzyme kinetics and the substrate, which enzyme changes.",
        );
        assert_eq!(k[0], "enzyme");
        assert!(!k.contains(&"which".to_string()));
        assert!(k.contains(&"kinetics".to_string()));
    }

    #[test]
    fn split_strategy_from_str() {
        assert_eq!("Balanced".parse::<SplitStrategy>(), Ok(SplitStrategy::Balanced));
        assert!("chapters".parse::<SplitStrategy>().is_err());
    }

    struct ScriptedProvider {
        reply: Result<String, LlmError>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted"
        }
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> Result<LlmResponse, LlmError> {
            self.reply.clone().map(|content| LlmResponse {
                content,
                ..Default::default()
            })
        }
    }

    fn sample_topics() -> Vec<Topic> {
        vec![build_topic(1, None, words(200, "osmosis"), "Doc")]
    }

    #[tokio::test]
    async fn annotator_applies_json_answer() {
        let provider = Arc::new(ScriptedProvider {
            reply: Ok("```json\n{\"title\": \"Osmosis\", \"summary\": \"Water moves.\", \"keywords\": [\"water\"]}\n```".into()),
        });
        let mut topics = sample_topics();
        let n = TopicAnnotator::new(provider, 2).annotate(&mut topics).await;
        assert_eq!(n, 1);
        assert_eq!(topics[0].title, "Osmosis");
        assert_eq!(topics[0].summary, "Water moves.");
        assert_eq!(topics[0].keywords, vec!["water".to_string()]);
    }

    #[tokio::test]
    async fn annotator_keeps_heuristics_on_failure() {
        let mut topics = sample_topics();
        let before = topics.clone();

        let bad_json = Arc::new(ScriptedProvider {
            reply: Ok("not json".into()),
        });
        assert_eq!(TopicAnnotator::new(bad_json, 1).annotate(&mut topics).await, 0);

        let failing = Arc::new(ScriptedProvider {
            reply: Err(LlmError::RateLimited),
        });
        assert_eq!(TopicAnnotator::new(failing, 1).annotate(&mut topics).await, 0);
        assert_eq!(topics, before);
    }
}
