use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, UPGRADE_INSECURE_REQUESTS};

use crate::collectors::PageSource;
use crate::error::CollectError;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:132.0) Gecko/20100101 Firefox/132.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.6; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7",
    "ru,en;q=0.9",
    "ru-RU,ru;q=0.8,en;q=0.5",
    "en-US,en;q=0.9,ru;q=0.8",
];

/// Browser-like headers picked once per process start.
pub fn random_headers() -> (&'static str, HeaderMap) {
    let mut rng = rand::rng();
    let user_agent = USER_AGENTS.choose(&mut rng).copied().unwrap_or(USER_AGENTS[0]);
    let language = ACCEPT_LANGUAGES
        .choose(&mut rng)
        .copied()
        .unwrap_or(ACCEPT_LANGUAGES[0]);

    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(language));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    (user_agent, headers)
}

/// Static markup fetched with a plain HTTP GET.
pub struct StaticPages {
    client: reqwest::Client,
}

impl StaticPages {
    pub fn new(timeout: Duration) -> Result<Self, CollectError> {
        let (user_agent, headers) = random_headers();
        tracing::debug!(user_agent, "Static page client configured");
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for StaticPages {
    async fn fetch(&self, url: &str) -> Result<String, CollectError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        tracing::info!(url, status = status.as_u16(), "Fetched page");

        if !status.is_success() {
            return Err(CollectError::Transport(format!("{url} returned {status}")));
        }
        Ok(resp.text().await?)
    }
}
