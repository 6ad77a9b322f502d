//! Session acquisition: the external capabilities a job can use.
//!
//! A [`SessionHandle`] bundles an optional LLM provider (from an API key or a
//! pre-built provider) and an optional logged-in NotebookLM browser session.
//! It is cheap to clone and passed explicitly to every generator call. A
//! missing capability is not an error here; the orchestrator skips the
//! generators that need it.

use crate::config::JobConfig;
use crate::error::{StudyGenError, WebDriverError};
use crate::generators::Capability;
use crate::llm::{GeminiProvider, LlmProvider};
use crate::notebook::{
    NotebookSelectors, NotebookSession, WebDriverClient, WebDriverNotebook, KEY_ENTER,
    NOTEBOOKLM_URL,
};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SIGN_IN_URL: &str = "https://accounts.google.com/ServiceLogin?continue=https://notebooklm.google.com/";
const ACCOUNTS_URL: &str = "https://accounts.google.com/";

/// Shared, read-only handle to whatever external services are available.
#[derive(Clone, Default)]
pub struct SessionHandle {
    llm: Option<Arc<dyn LlmProvider>>,
    notebook: Option<Arc<dyn NotebookSession>>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("llm", &self.llm.as_ref().map(|p| format!("{}:{}", p.name(), p.model())))
            .field("notebook", &self.notebook.is_some())
            .finish()
    }
}

impl SessionHandle {
    pub fn new(
        llm: Option<Arc<dyn LlmProvider>>,
        notebook: Option<Arc<dyn NotebookSession>>,
    ) -> Self {
        Self { llm, notebook }
    }

    pub fn with_llm(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(provider);
        self
    }

    pub fn with_notebook(mut self, session: Arc<dyn NotebookSession>) -> Self {
        self.notebook = Some(session);
        self
    }

    pub fn llm(&self) -> Option<&Arc<dyn LlmProvider>> {
        self.llm.as_ref()
    }

    pub fn notebook(&self) -> Option<&Arc<dyn NotebookSession>> {
        self.notebook.as_ref()
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Llm => self.llm.is_some(),
            Capability::Notebook => self.notebook.is_some(),
        }
    }

    /// End the browser session, if any. Safe to call more than once.
    pub async fn close(&self) {
        if let Some(ref nb) = self.notebook {
            nb.close().await;
        }
    }
}

/// Build the session for `config`.
///
/// The LLM capability comes from `config.provider`, else from a non-empty
/// `config.api_key`. The NotebookLM capability is acquired when credentials
/// are set or `use_notebook` is on; failing to log in is fatal.
pub async fn acquire_session(config: &JobConfig) -> Result<SessionHandle, StudyGenError> {
    let llm: Option<Arc<dyn LlmProvider>> = match (&config.provider, config.api_key.as_deref()) {
        (Some(p), _) => Some(Arc::clone(p)),
        (None, Some(key)) if !key.trim().is_empty() => {
            let provider = GeminiProvider::new(key.trim(), &config.model).map_err(|e| {
                StudyGenError::Auth {
                    service: "gemini".into(),
                    detail: e.to_string(),
                }
            })?;
            Some(Arc::new(provider))
        }
        _ => None,
    };
    match llm {
        Some(ref p) => info!("LLM provider: {} ({})", p.name(), p.model()),
        None => info!("No Gemini API key; LLM-backed generators will be skipped"),
    }

    let wants_notebook = config.has_credentials() || config.use_notebook;
    let notebook: Option<Arc<dyn NotebookSession>> = if wants_notebook {
        let client = login_notebook(config).await?;
        Some(Arc::new(WebDriverNotebook::new(client, NotebookSelectors::default())))
    } else {
        debug!("No NotebookLM credentials; browser-backed generators will be skipped");
        None
    };

    Ok(SessionHandle { llm, notebook })
}

/// Default cookie store: `~/.notebooklm-gen/cookies.json`.
pub fn default_cookies_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".notebooklm-gen").join("cookies.json")
}

fn is_notebooklm(url: &str) -> bool {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h == "notebooklm.google.com"))
        .unwrap_or(false)
}

async fn login_notebook(config: &JobConfig) -> Result<WebDriverClient, StudyGenError> {
    let auth_err = |detail: String| StudyGenError::Auth {
        service: "notebooklm".into(),
        detail,
    };
    let client = WebDriverClient::new_session(&config.webdriver_url, config.headless)
        .await
        .map_err(|e| {
            auth_err(format!(
                "could not start browser via {}: {e}",
                config.webdriver_url
            ))
        })?;

    let cookies_path = config
        .cookies_path
        .clone()
        .unwrap_or_else(default_cookies_path);

    match sign_in(&client, config, &cookies_path).await {
        Ok(()) => {
            save_cookies(&client, &cookies_path).await;
            info!("Signed in to NotebookLM");
            Ok(client)
        }
        Err(detail) => {
            let _ = client.delete_session().await;
            Err(auth_err(detail))
        }
    }
}

async fn sign_in(
    client: &WebDriverClient,
    config: &JobConfig,
    cookies_path: &Path,
) -> Result<(), String> {
    let wd = |e: WebDriverError| e.to_string();

    if restore_cookies(client, cookies_path).await {
        client.navigate(NOTEBOOKLM_URL).await.map_err(wd)?;
        if is_notebooklm(&client.current_url().await.map_err(wd)?) {
            info!("Reused saved browser session");
            return Ok(());
        }
        debug!("Saved cookies did not yield a session");
    }

    let (Some(email), Some(password)) = (config.email.as_deref(), config.password.as_deref()) else {
        return Err("not signed in and no email/password configured".into());
    };

    info!("Signing in to Google as {}", email);
    client.navigate(SIGN_IN_URL).await.map_err(wd)?;
    let ui = Duration::from_secs(20);
    let email_input = client.wait_for("input[type='email']", ui).await.map_err(wd)?;
    client
        .send_keys(&email_input, &format!("{email}{KEY_ENTER}"))
        .await
        .map_err(wd)?;
    let password_input = client
        .wait_for("input[type='password']", ui)
        .await
        .map_err(wd)?;
    client
        .send_keys(&password_input, &format!("{password}{KEY_ENTER}"))
        .await
        .map_err(wd)?;

    // Two-step verification is confirmed on another device; give it time.
    client
        .wait_for_url("NotebookLM after sign-in", Duration::from_secs(120), is_notebooklm)
        .await
        .map(drop)
        .map_err(|e| format!("sign-in did not complete: {e}"))
}

async fn restore_cookies(client: &WebDriverClient, path: &Path) -> bool {
    let Ok(text) = tokio::fs::read_to_string(path).await else {
        return false;
    };
    let cookies: Vec<Value> = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            warn!("Ignoring unreadable cookie file {}: {}", path.display(), e);
            return false;
        }
    };
    if client.navigate(ACCOUNTS_URL).await.is_err() {
        return false;
    }
    let mut restored = 0;
    for cookie in cookies {
        // Cookies for other domains are rejected by the driver.
        if client.add_cookie(cookie).await.is_ok() {
            restored += 1;
        }
    }
    debug!("Restored {} cookie(s) from {}", restored, path.display());
    restored > 0
}

async fn save_cookies(client: &WebDriverClient, path: &Path) {
    let cookies = match client.cookies().await {
        Ok(c) => c,
        Err(e) => {
            warn!("Could not read browser cookies: {}", e);
            return;
        }
    };
    let result = async {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(&cookies)?;
        tokio::fs::write(path, json).await?;
        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
    }
    .await;
    match result {
        Ok(()) => debug!("Saved {} cookie(s) to {}", cookies.len(), path.display()),
        Err(e) => warn!("Could not save cookies to {}: {}", path.display(), e),
    }
}
