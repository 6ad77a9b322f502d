//! NotebookLM automation over the W3C WebDriver wire protocol.
//!
//! [`WebDriverClient`] is a thin JSON-over-HTTP client for a running driver
//! (`chromedriver --port=9515`). [`WebDriverNotebook`] uses it to drive the
//! NotebookLM web UI: paste a topic as a text source, request an audio or
//! video overview, wait for the media element, and download it with the
//! browser's cookies.
//!
//! The CSS selectors live in [`NotebookSelectors`]; the web UI changes often
//! and they are expected to be overridden.

use crate::error::WebDriverError;
use crate::prompts::excerpt;
use crate::topics::Topic;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

pub const NOTEBOOKLM_URL: &str = "https://notebooklm.google.com/";

/// W3C key for an element reference in a command response.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// W3C code point for the Enter key.
pub const KEY_ENTER: &str = "\u{E007}";

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Minimal WebDriver session client.
#[derive(Debug, Clone)]
pub struct WebDriverClient {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl WebDriverClient {
    /// Start a Chrome session on the driver at `base_url`.
    pub async fn new_session(base_url: &str, headless: bool) -> Result<Self, WebDriverError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| WebDriverError::Http(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut args = vec![
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-blink-features=AutomationControlled",
            "--window-size=1920,1080",
        ];
        if headless {
            args.push("--headless=new");
        }
        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": {
                        "args": args,
                        "excludeSwitches": ["enable-automation"],
                    }
                }
            }
        });

        let url = format!("{base_url}/session");
        let value = send(&http, reqwest::Method::POST, &url, Some(body)).await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Command {
                error: "invalid session response".into(),
                message: value.to_string(),
            })?
            .to_string();
        info!("WebDriver session {} started (headless: {})", session_id, headless);

        Ok(Self {
            http,
            base_url,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn command(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = format!("{}/session/{}{}", self.base_url, self.session_id, path);
        send(&self.http, method, &url, body).await
    }

    pub async fn navigate(&self, url: &str) -> Result<(), WebDriverError> {
        debug!("navigate {}", url);
        self.command(reqwest::Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(drop)
    }

    pub async fn current_url(&self) -> Result<String, WebDriverError> {
        let v = self.command(reqwest::Method::GET, "/url", None).await?;
        Ok(v.as_str().unwrap_or_default().to_string())
    }

    /// Find the first element matching a CSS selector.
    pub async fn find_element(&self, css: &str) -> Result<String, WebDriverError> {
        let body = json!({ "using": "css selector", "value": css });
        match self.command(reqwest::Method::POST, "/element", Some(body)).await {
            Ok(v) => element_id(&v).ok_or_else(|| WebDriverError::ElementNotFound {
                selector: css.to_string(),
            }),
            Err(WebDriverError::Command { ref error, .. }) if error == "no such element" => {
                Err(WebDriverError::ElementNotFound {
                    selector: css.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Poll for an element until it appears or `timeout` elapses.
    pub async fn wait_for(&self, css: &str, timeout: Duration) -> Result<String, WebDriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find_element(css).await {
                Ok(id) => return Ok(id),
                Err(WebDriverError::ElementNotFound { .. }) if Instant::now() < deadline => {
                    sleep(POLL_INTERVAL).await;
                }
                Err(WebDriverError::ElementNotFound { .. }) => {
                    return Err(WebDriverError::Wait {
                        what: css.to_string(),
                        secs: timeout.as_secs(),
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Poll the current URL until `pred` holds or `timeout` elapses.
    pub async fn wait_for_url(
        &self,
        what: &str,
        timeout: Duration,
        pred: impl Fn(&str) -> bool,
    ) -> Result<String, WebDriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let url = self.current_url().await?;
            if pred(&url) {
                return Ok(url);
            }
            if Instant::now() >= deadline {
                return Err(WebDriverError::Wait {
                    what: what.to_string(),
                    secs: timeout.as_secs(),
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn click(&self, element: &str) -> Result<(), WebDriverError> {
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element}/click"),
            Some(json!({})),
        )
        .await
        .map(drop)
    }

    pub async fn send_keys(&self, element: &str, text: &str) -> Result<(), WebDriverError> {
        self.command(
            reqwest::Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(drop)
    }

    pub async fn attribute(
        &self,
        element: &str,
        name: &str,
    ) -> Result<Option<String>, WebDriverError> {
        let v = self
            .command(
                reqwest::Method::GET,
                &format!("/element/{element}/attribute/{name}"),
                None,
            )
            .await?;
        Ok(v.as_str().map(str::to_string))
    }

    pub async fn cookies(&self) -> Result<Vec<Value>, WebDriverError> {
        let v = self.command(reqwest::Method::GET, "/cookie", None).await?;
        Ok(v.as_array().cloned().unwrap_or_default())
    }

    pub async fn add_cookie(&self, cookie: Value) -> Result<(), WebDriverError> {
        self.command(
            reqwest::Method::POST,
            "/cookie",
            Some(json!({ "cookie": cookie })),
        )
        .await
        .map(drop)
    }

    /// End the browser session.
    pub async fn delete_session(&self) -> Result<(), WebDriverError> {
        let url = format!("{}/session/{}", self.base_url, self.session_id);
        send(&self.http, reqwest::Method::DELETE, &url, None)
            .await
            .map(drop)
    }
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY).and_then(Value::as_str).map(str::to_string)
}

/// Send one command and unwrap the W3C `{"value": ...}` envelope.
async fn send(
    http: &reqwest::Client,
    method: reqwest::Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, WebDriverError> {
    let mut req = http.request(method, url);
    if let Some(b) = body {
        req = req.json(&b);
    }
    let resp = req
        .send()
        .await
        .map_err(|e| WebDriverError::Http(e.to_string()))?;
    let status = resp.status();
    let mut payload: Value = resp
        .json()
        .await
        .map_err(|e| WebDriverError::Http(format!("HTTP {status}: {e}")))?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(WebDriverError::Command {
            error: error.to_string(),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    if !status.is_success() {
        return Err(WebDriverError::Http(format!("HTTP {status}")));
    }
    Ok(value)
}

// ── NotebookLM session ───────────────────────────────────────────────────────

/// What NotebookLM should render from the sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverviewKind {
    Audio,
    Video,
}

/// A finished NotebookLM overview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverviewMedia {
    pub source_url: String,
    /// Downloaded bytes, when the media URL was fetchable outside the browser.
    pub content: Option<Vec<u8>>,
    pub extension: &'static str,
}

/// A logged-in NotebookLM browser session.
#[async_trait]
pub trait NotebookSession: Send + Sync {
    /// Create a notebook from `topic` and render an overview of it.
    async fn create_overview(
        &self,
        topic: &Topic,
        kind: OverviewKind,
    ) -> Result<OverviewMedia, WebDriverError>;

    /// End the browser session.
    async fn close(&self);
}

/// CSS selectors for the NotebookLM web UI.
#[derive(Debug, Clone)]
pub struct NotebookSelectors {
    pub new_notebook: String,
    pub paste_text_source: String,
    pub source_textarea: String,
    pub insert_source: String,
    pub audio_overview: String,
    pub video_overview: String,
    pub audio_element: String,
    pub video_element: String,
}

impl Default for NotebookSelectors {
    fn default() -> Self {
        Self {
            new_notebook: "button[aria-label='Create new notebook']".into(),
            paste_text_source: "[aria-label='Copied text']".into(),
            source_textarea: "textarea".into(),
            insert_source: "button[type='submit']".into(),
            audio_overview: "[aria-label='Audio Overview']".into(),
            video_overview: "[aria-label='Video Overview']".into(),
            audio_element: "audio[src]".into(),
            video_element: "video[src]".into(),
        }
    }
}

/// [`NotebookSession`] backed by a WebDriver browser.
pub struct WebDriverNotebook {
    client: Mutex<WebDriverClient>,
    selectors: NotebookSelectors,
    ui_timeout: Duration,
    render_timeout: Duration,
    http: reqwest::Client,
}

impl WebDriverNotebook {
    pub fn new(client: WebDriverClient, selectors: NotebookSelectors) -> Self {
        Self {
            client: Mutex::new(client),
            selectors,
            ui_timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(600),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    async fn download(&self, client: &WebDriverClient, src: &str) -> Option<Vec<u8>> {
        if !src.starts_with("http") {
            return None;
        }
        let cookie_header = client
            .cookies()
            .await
            .ok()?
            .iter()
            .filter_map(|c| {
                let name = c.get("name")?.as_str()?;
                let value = c.get("value")?.as_str()?;
                Some(format!("{name}={value}"))
            })
            .collect::<Vec<_>>()
            .join("; ");
        let resp = self
            .http
            .get(src)
            .header(reqwest::header::COOKIE, cookie_header)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            warn!("Overview download returned HTTP {}", resp.status());
            return None;
        }
        resp.bytes().await.ok().map(|b| b.to_vec())
    }
}

#[async_trait]
impl NotebookSession for WebDriverNotebook {
    async fn create_overview(
        &self,
        topic: &Topic,
        kind: OverviewKind,
    ) -> Result<OverviewMedia, WebDriverError> {
        let client = self.client.lock().await;
        let s = &self.selectors;

        client.navigate(NOTEBOOKLM_URL).await?;
        let new_nb = client.wait_for(&s.new_notebook, self.ui_timeout).await?;
        client.click(&new_nb).await?;

        let paste = client.wait_for(&s.paste_text_source, self.ui_timeout).await?;
        client.click(&paste).await?;
        let textarea = client.wait_for(&s.source_textarea, self.ui_timeout).await?;
        let source = format!("{}\n\n{}", topic.title, excerpt(&topic.body, 100_000));
        client.send_keys(&textarea, &source).await?;
        let insert = client.find_element(&s.insert_source).await?;
        client.click(&insert).await?;

        let (button, media, extension) = match kind {
            OverviewKind::Audio => (&s.audio_overview, &s.audio_element, "mp3"),
            OverviewKind::Video => (&s.video_overview, &s.video_element, "mp4"),
        };
        let trigger = client.wait_for(button, self.ui_timeout).await?;
        client.click(&trigger).await?;
        info!("{}: waiting for {:?} overview", topic.id, kind);

        let element = client.wait_for(media, self.render_timeout).await?;
        let src = client
            .attribute(&element, "src")
            .await?
            .ok_or_else(|| WebDriverError::ElementNotFound {
                selector: format!("{media} (src attribute)"),
            })?;
        let content = self.download(&client, &src).await;
        Ok(OverviewMedia {
            source_url: src,
            content,
            extension,
        })
    }

    async fn close(&self) {
        let client = self.client.lock().await;
        if let Err(e) = client.delete_session().await {
            warn!("Failed to close WebDriver session: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn session(server: &MockServer) -> WebDriverClient {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "abc123", "capabilities": {} }
            })))
            .mount(server)
            .await;
        WebDriverClient::new_session(&server.uri(), true).await.unwrap()
    }

    #[tokio::test]
    async fn new_session_requests_headless_chrome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .and(body_partial_json(json!({
                "capabilities": { "alwaysMatch": { "browserName": "chrome" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { "sessionId": "s-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = WebDriverClient::new_session(&server.uri(), true).await.unwrap();
        assert_eq!(client.session_id(), "s-1");
    }

    #[tokio::test]
    async fn find_element_returns_reference() {
        let server = MockServer::start().await;
        let client = session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/abc123/element"))
            .and(body_partial_json(json!({ "using": "css selector", "value": "textarea" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": { ELEMENT_KEY: "el-7" }
            })))
            .mount(&server)
            .await;
        assert_eq!(client.find_element("textarea").await.unwrap(), "el-7");
    }

    #[tokio::test]
    async fn no_such_element_maps_to_not_found() {
        let server = MockServer::start().await;
        let client = session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/abc123/element"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "value": { "error": "no such element", "message": "Unable to locate", "stacktrace": "" }
            })))
            .mount(&server)
            .await;
        let err = client.find_element("#missing").await.unwrap_err();
        assert!(matches!(
            err,
            WebDriverError::ElementNotFound { ref selector } if selector == "#missing"
        ));

        let err = client
            .wait_for("#missing", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, WebDriverError::Wait { .. }));
    }

    #[tokio::test]
    async fn command_errors_surface_driver_message() {
        let server = MockServer::start().await;
        let client = session(&server).await;
        Mock::given(method("POST"))
            .and(path("/session/abc123/url"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "value": { "error": "unknown error", "message": "net::ERR_NAME_NOT_RESOLVED" }
            })))
            .mount(&server)
            .await;
        let err = client.navigate("https://nowhere.invalid").await.unwrap_err();
        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn current_url_and_cookies() {
        let server = MockServer::start().await;
        let client = session(&server).await;
        Mock::given(method("GET"))
            .and(path("/session/abc123/url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": "https://notebooklm.google.com/"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/session/abc123/cookie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "name": "SID", "value": "x", "domain": ".google.com" }]
            })))
            .mount(&server)
            .await;
        let url = client
            .wait_for_url("notebooklm", Duration::from_secs(1), |u| u.contains("notebooklm"))
            .await
            .unwrap();
        assert_eq!(url, NOTEBOOKLM_URL);
        assert_eq!(client.cookies().await.unwrap().len(), 1);
    }
}
