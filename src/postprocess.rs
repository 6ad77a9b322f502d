//! Post-processing: deterministic cleanup of model-generated Markdown.
//!
//! Models that were told "output only Markdown" still wrap answers in
//! ` ```markdown ` fences, open with "Sure! Here is your handout:", use `•`
//! bullets, or forget the separator row of a table. Each rule below fixes one
//! such quirk without touching content and is tested on its own.
//!
//! Rule order matters: fences are stripped before chatter detection so the
//! first line inspected is real content, and line endings are normalised
//! before any line-based rule runs.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all Markdown cleanup rules to a raw model answer.
///
/// 1. Strip an outer ` ```markdown ` fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Drop a conversational preamble line ("Sure, here is ...")
/// 4. Trim trailing whitespace per line
/// 5. Normalise `•`/`*` bullets to `-`
/// 6. Ensure a blank line before headings
/// 7. Insert a missing GFM table separator row
/// 8. Strip invisible Unicode
/// 9. Collapse runs of blank lines
/// 10. End with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fence(input);
    let s = normalise_line_endings(&s);
    let s = drop_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = normalise_bullets(&s);
    let s = normalise_heading_spacing(&s);
    let s = fix_broken_tables(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

/// Extract the Mermaid source from a model answer.
///
/// Accepts a fenced ` ```mermaid ` block anywhere in the text, or bare
/// Mermaid starting with `mindmap`/`graph`/`flowchart`. Returns `None` when
/// neither is present.
pub fn extract_mermaid(input: &str) -> Option<String> {
    let text = normalise_line_endings(input);
    if let Some(caps) = RE_MERMAID_FENCE.captures(&text) {
        let body = caps[1].trim();
        return (!body.is_empty()).then(|| body.to_string());
    }
    let trimmed = strip_outer_fence(&text);
    let first = trimmed.trim_start().lines().next().unwrap_or("").trim();
    if ["mindmap", "graph", "flowchart"]
        .iter()
        .any(|kw| first.starts_with(kw))
    {
        return Some(trimmed.trim().to_string());
    }
    None
}

static RE_MERMAID_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```mermaid[ \t]*\n(.*?)```").unwrap());

// ── Rule 1: Strip outer fence ────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*)\n```\s*$").unwrap());

fn strip_outer_fence(input: &str) -> String {
    match RE_OUTER_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Line endings ─────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Conversational preamble ──────────────────────────────────────────

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(sure|certainly|of course|okay|ok|absolutely|here is|here's|here are)\b.*:\s*$")
        .unwrap()
});

fn drop_preamble(input: &str) -> String {
    let mut lines = input.trim_start().lines();
    match lines.next() {
        Some(first) if RE_PREAMBLE.is_match(first.trim()) => {
            lines.collect::<Vec<_>>().join("\n")
        }
        _ => input.to_string(),
    }
}

// ── Rule 4: Trailing whitespace ──────────────────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Bullets ──────────────────────────────────────────────────────────

static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(\s*)[•●▪◦]\s+").unwrap());

fn normalise_bullets(input: &str) -> String {
    RE_BULLET.replace_all(input, "${1}- ").to_string()
}

// ── Rule 6: Heading spacing ──────────────────────────────────────────────────

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn normalise_heading_spacing(input: &str) -> String {
    let mut result = String::with_capacity(input.len() + 64);
    let mut in_code = false;
    for (i, line) in input.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            in_code = !in_code;
        }
        if !in_code && is_heading(line) && i > 0 {
            let trimmed = result.trim_end_matches('\n').len();
            result.truncate(trimmed);
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rule 7: Missing table separator ──────────────────────────────────────────

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.contains('-') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// Insert `| --- |` after a table header that is directly followed by a body row.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut prev_is_row = false;

    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        let row = is_table_row(line);
        let starts_table = row && !prev_is_row && !is_separator_row(line);
        if starts_table {
            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_table_row(next) && !is_separator_row(next) {
                let cols = line.trim().matches('|').count().saturating_sub(1).max(1);
                out.push(format!("|{}", " --- |".repeat(cols)));
            }
        }
        prev_is_row = row;
    }
    out.join("\n")
}

// ── Rule 8: Invisible characters ─────────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}'], "")
}

// ── Rule 9: Blank lines ──────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 10: Final newline ───────────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{trimmed}\n")
    }
}
