//! Content acquisition: turn a file path or URL into clean plain text.
//!
//! Supported inputs are local `.pdf`, `.txt`, `.text`, `.md` and `.markdown`
//! files and `http(s)://` URLs. A URL answering with a PDF is downloaded to a
//! `TempDir` (pdfium needs a file-system path) that lives until extraction
//! finishes; HTML pages go through a readability-like extractor and
//! `html2md`.
//!
//! PDF pages are joined with `--- Page N ---` marker lines, which the topic
//! splitter understands as section boundaries.

use crate::error::StudyGenError;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};

/// Where the normalised text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Pdf,
    Text,
    Markdown,
    Web,
}

/// Text ready for topic splitting.
#[derive(Debug, Clone)]
pub struct NormalizedContent {
    /// The original input reference.
    pub source: String,
    pub source_kind: SourceKind,
    pub title: String,
    pub text: String,
    pub word_count: usize,
}

/// Knobs for remote inputs.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

const TEXT_EXTENSIONS: [&str; 4] = ["txt", "text", "md", "markdown"];

/// Elements dropped from web pages before conversion.
const BOILERPLATE_TAGS: [&str; 7] = [
    "script", "style", "nav", "footer", "header", "noscript", "aside",
];

const VOID_TAGS: [&str; 8] = ["br", "img", "hr", "input", "meta", "link", "source", "wbr"];

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read `input` and return its normalised text and a suggested title.
pub async fn normalize(
    input: &str,
    settings: &FetchSettings,
) -> Result<NormalizedContent, StudyGenError> {
    let content = if is_url(input) {
        normalize_url(input, settings).await?
    } else {
        normalize_local(input).await?
    };
    info!(
        "Loaded '{}' ({:?}, {} words)",
        content.title, content.source_kind, content.word_count
    );
    Ok(content)
}

async fn normalize_local(input: &str) -> Result<NormalizedContent, StudyGenError> {
    let path = PathBuf::from(input);
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if ext != "pdf" && !TEXT_EXTENSIONS.contains(&ext.as_str()) {
        return Err(StudyGenError::UnsupportedInput {
            input: input.to_string(),
            detail: if ext.is_empty() {
                "file has no extension".to_string()
            } else {
                format!("'.{ext}' files are not supported")
            },
        });
    }

    if !path.is_file() {
        return Err(StudyGenError::Fetch {
            input: input.to_string(),
            reason: "file not found".to_string(),
        });
    }

    if ext == "pdf" {
        let (raw, meta_title) = extract_pdf(&path).await?;
        let title = meta_title.unwrap_or_else(|| file_stem(&path));
        return Ok(build(input, SourceKind::Pdf, title, &raw));
    }

    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| StudyGenError::Fetch {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    let kind = if ext == "md" || ext == "markdown" {
        SourceKind::Markdown
    } else {
        SourceKind::Text
    };
    let title = title_from_text(&raw).unwrap_or_else(|| file_stem(&path));
    Ok(build(input, kind, title, &raw))
}

async fn normalize_url(
    url: &str,
    settings: &FetchSettings,
) -> Result<NormalizedContent, StudyGenError> {
    info!("Fetching {}", url);
    let fetch_err = |reason: String| StudyGenError::Fetch {
        input: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .user_agent(concat!("notebooklm-gen/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| fetch_err(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            fetch_err(format!("timed out after {}s", settings.timeout_secs))
        } else {
            fetch_err(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(fetch_err(format!("HTTP {}", response.status())));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| fetch_err(e.to_string()))?;
    debug!("{}: {} bytes, content-type '{}'", url, bytes.len(), content_type);

    if content_type.contains("application/pdf") || bytes.starts_with(b"%PDF") {
        let temp_dir = TempDir::new().map_err(|e| StudyGenError::Internal(e.to_string()))?;
        let file_path = temp_dir.path().join("downloaded.pdf");
        tokio::fs::write(&file_path, &bytes)
            .await
            .map_err(|e| StudyGenError::Internal(format!("Failed to write temp file: {e}")))?;
        let (raw, meta_title) = extract_pdf(&file_path).await?;
        drop(temp_dir);
        return Ok(build(url, SourceKind::Pdf, meta_title.unwrap_or(host), &raw));
    }

    let body = String::from_utf8_lossy(&bytes);
    if content_type.starts_with("text/plain") || content_type.starts_with("text/markdown") {
        let title = title_from_text(&body).unwrap_or(host);
        return Ok(build(url, SourceKind::Text, title, &body));
    }

    let page = extract_html(&body);
    let title = page.title.unwrap_or(host);
    Ok(build(url, SourceKind::Web, title, &page.markdown))
}

fn build(source: &str, kind: SourceKind, title: String, raw: &str) -> NormalizedContent {
    let text = clean_text(raw);
    NormalizedContent {
        source: source.to_string(),
        source_kind: kind,
        title: title.trim().to_string(),
        word_count: text.split_whitespace().count(),
        text,
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".to_string())
}

// ── Text cleaning ────────────────────────────────────────────────────────────

static RE_MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static RE_MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Normalise whitespace: collapse 3+ newlines to a blank line, collapse
/// runs of spaces, trim every line, trim the whole text.
pub fn clean_text(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = RE_MULTI_SPACE.replace_all(&text, " ");
    let text = text.lines().map(str::trim).collect::<Vec<_>>().join("\n");
    let text = RE_MULTI_NEWLINE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Title from the first line of a text document: a `#` heading, or a short
/// line that does not end like a sentence.
pub fn title_from_text(raw: &str) -> Option<String> {
    let first = raw.trim().lines().next()?.trim();
    if first.starts_with('#') {
        let t = first.trim_start_matches('#').trim();
        return (!t.is_empty()).then(|| t.to_string());
    }
    if !first.is_empty() && first.chars().count() < 100 && !first.ends_with('.') {
        return Some(first.to_string());
    }
    None
}

// ── PDF ──────────────────────────────────────────────────────────────────────

/// Marker line inserted between PDF pages.
pub fn page_marker(page_num: usize) -> String {
    format!("--- Page {page_num} ---")
}

fn bind_pdfium() -> Result<Pdfium, PdfiumError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)),
        Err(_) => Pdfium::bind_to_system_library(),
    }?;
    Ok(Pdfium::new(bindings))
}

/// Extract page text and the metadata title. Runs on a blocking thread.
async fn extract_pdf(path: &Path) -> Result<(String, Option<String>), StudyGenError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_pdf_blocking(&owned))
        .await
        .map_err(|e| StudyGenError::Internal(format!("PDF extraction task panicked: {e}")))?
}

fn extract_pdf_blocking(path: &Path) -> Result<(String, Option<String>), StudyGenError> {
    let fail = |detail: String| StudyGenError::Fetch {
        input: path.display().to_string(),
        reason: detail,
    };

    let pdfium = bind_pdfium().map_err(|e| {
        fail(format!(
            "pdfium library not available ({e:?}); install libpdfium or set PDFIUM_LIB_PATH"
        ))
    })?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| fail(format!("could not open PDF: {e:?}")))?;

    let title = document
        .metadata()
        .get(PdfDocumentMetadataTagType::Title)
        .map(|t| t.value().trim().to_string())
        .filter(|t| !t.is_empty());

    let mut out = String::new();
    for (index, page) in document.pages().iter().enumerate() {
        let text = page
            .text()
            .map_err(|e| fail(format!("page {}: {e:?}", index + 1)))?
            .all();
        if text.trim().is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        let _ = write!(out, "{}\n{}", page_marker(index + 1), text);
    }
    debug!("Extracted {} chars from {}", out.len(), path.display());
    Ok((out, title))
}

// ── HTML ─────────────────────────────────────────────────────────────────────

/// Main content of a web page converted to Markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub markdown: String,
}

/// Pull the title and main content out of an HTML document.
///
/// Title: `<title>`, else the first `<h1>`. Content: `<article>` if present,
/// else `<body>`, with navigation, scripts and other boilerplate removed.
pub fn extract_html(html: &str) -> ExtractedPage {
    let doc = Html::parse_document(html);
    let first_text = |css: &str| {
        Selector::parse(css)
            .ok()
            .and_then(|sel| doc.select(&sel).next().map(|n| n.text().collect::<String>()))
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
    };
    let title = first_text("title").or_else(|| first_text("h1"));

    let main = ["article", "main", "body"].iter().find_map(|css| {
        Selector::parse(css)
            .ok()
            .and_then(|sel| doc.select(&sel).next())
    });

    let mut cleaned = String::new();
    match main {
        Some(node) => strip_boilerplate(node, &mut cleaned),
        None => strip_boilerplate(doc.root_element(), &mut cleaned),
    }

    ExtractedPage {
        title,
        markdown: html2md::parse_html(&cleaned),
    }
}

/// Re-serialise `el`'s children, skipping boilerplate elements.
fn strip_boilerplate(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_html(text)),
            Node::Element(e) => {
                let name = e.name();
                if BOILERPLATE_TAGS.contains(&name) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                out.push('<');
                out.push_str(name);
                for (key, value) in e.attrs() {
                    let _ = write!(out, " {}=\"{}\"", key, value.replace('"', "&quot;"));
                }
                out.push('>');
                if VOID_TAGS.contains(&name) {
                    continue;
                }
                strip_boilerplate(child_el, out);
                let _ = write!(out, "</{name}>");
            }
            _ => {}
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
