// Rendered pages through a W3C WebDriver endpoint (chromedriver, geckodriver, selenium).
//
// One browser session is opened on first use and kept for the life of the process.
// All commands go through a mutex, so the session is never driven concurrently.
// A failed command discards the session; the next fetch opens a fresh one.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::collectors::PageSource;
use crate::collectors::http::random_headers;
use crate::error::CollectError;

#[derive(Debug, Deserialize)]
struct Reply<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct NewSession {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct WebDriverFailure {
    error: String,
    #[serde(default)]
    message: String,
}

pub struct BrowserSession {
    client: reqwest::Client,
    endpoint: String,
    page_load_timeout: Duration,
    render_wait: Duration,
    user_agent: &'static str,
    session: Mutex<Option<String>>,
}

impl BrowserSession {
    pub fn new(
        endpoint: &str,
        page_load_timeout: Duration,
        render_wait: Duration,
    ) -> Result<Self, CollectError> {
        // Commands may block for a full page load plus the settle delay.
        let client = reqwest::Client::builder()
            .timeout(page_load_timeout + render_wait + Duration::from_secs(30))
            .build()?;
        let (user_agent, _) = random_headers();
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            page_load_timeout,
            render_wait,
            user_agent,
            session: Mutex::new(None),
        })
    }

    fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "pageLoadStrategy": "normal",
                    "timeouts": { "pageLoad": self.page_load_timeout.as_millis() as u64 },
                    "goog:chromeOptions": {
                        "args": [
                            "--headless=new",
                            "--disable-gpu",
                            "--no-sandbox",
                            "--window-size=1920,1080",
                            format!("--user-agent={}", self.user_agent),
                        ]
                    }
                }
            }
        })
    }

    async fn command<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, CollectError> {
        let url = format!("{}{path}", self.endpoint);
        let mut req = self.client.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let raw: Value = resp.json().await?;

        if !status.is_success() {
            return Err(CollectError::Browser(describe_failure(status, raw)));
        }
        serde_json::from_value::<Reply<T>>(raw)
            .map(|reply| reply.value)
            .map_err(|e| CollectError::Browser(format!("unexpected WebDriver reply: {e}")))
    }

    async fn open(&self) -> Result<String, CollectError> {
        let created: NewSession = self
            .command(reqwest::Method::POST, "/session", Some(self.capabilities()))
            .await?;
        tracing::info!(session = %created.session_id, endpoint = %self.endpoint, "Browser session opened");
        Ok(created.session_id)
    }

    async fn discard(&self, id: &str) {
        let path = format!("/session/{id}");
        match self.command::<Value>(reqwest::Method::DELETE, &path, None).await {
            Ok(_) => tracing::info!(session = %id, "Browser session closed"),
            Err(e) => tracing::debug!(session = %id, error = %e, "Browser session close failed"),
        }
    }

    async fn render(&self, id: &str, url: &str) -> Result<String, CollectError> {
        let _: Value = self
            .command(
                reqwest::Method::POST,
                &format!("/session/{id}/url"),
                Some(json!({ "url": url })),
            )
            .await?;
        if !self.render_wait.is_zero() {
            tokio::time::sleep(self.render_wait).await;
        }
        self.command(reqwest::Method::GET, &format!("/session/{id}/source"), None)
            .await
    }
}

fn describe_failure(status: reqwest::StatusCode, raw: Value) -> String {
    match serde_json::from_value::<Reply<WebDriverFailure>>(raw) {
        Ok(Reply { value }) => format!("{status}: {} ({})", value.error, value.message),
        Err(_) => format!("WebDriver returned {status}"),
    }
}

#[async_trait]
impl PageSource for BrowserSession {
    async fn fetch(&self, url: &str) -> Result<String, CollectError> {
        let mut session = self.session.lock().await;
        let id = match session.as_ref() {
            Some(id) => id.clone(),
            None => {
                let id = self.open().await?;
                *session = Some(id.clone());
                id
            }
        };

        match self.render(&id, url).await {
            Ok(html) => {
                tracing::info!(url, bytes = html.len(), "Rendered page");
                Ok(html)
            }
            Err(e) => {
                tracing::warn!(url, session = %id, error = %e, "Render failed, dropping browser session");
                self.discard(&id).await;
                *session = None;
                Err(e)
            }
        }
    }

    async fn close(&self) {
        if let Some(id) = self.session.lock().await.take() {
            self.discard(&id).await;
        }
    }
}
