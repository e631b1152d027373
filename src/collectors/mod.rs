// Source adapters for the supported job boards and the collector that drives them.

pub mod browser;
pub mod extract;
pub mod headhunter;
pub mod http;
pub mod runner;
pub mod superjob;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::Config;
use crate::error::CollectError;
use crate::models::listing::{Detail, SearchQuery};

/// How an adapter turns a URL into markup: a plain HTTP GET or a rendered browser page.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, CollectError>;

    /// Release any long-lived resource. Called once at process shutdown.
    async fn close(&self) {}
}

/// Per-site contract every job board implements.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source name; also names the state file.
    fn name(&self) -> &str;

    /// Index of the first result page (sites differ on 0 vs 1).
    fn first_page(&self) -> u32;

    /// Build the results URL for `page`. Fails with `UnknownLocation` without touching the network.
    fn build_search_url(&self, query: &SearchQuery, page: u32) -> Result<String, CollectError>;

    /// Identifiers (canonical detail links) on a results page, in page order.
    async fn list_page(&self, url: &str) -> Result<Vec<String>, CollectError>;

    /// Fetch and parse one listing, applying the query's keyword filter.
    async fn fetch_detail(&self, link: &str, query: &SearchQuery) -> Result<Detail, CollectError>;

    /// Normalize an identifier so equivalent links dedup to the same key.
    fn canonical_link(&self, link: &str) -> String {
        canonicalize(link)
    }

    async fn shutdown(&self) {}
}

/// Drop the query string and fragment. Non-URL identifiers are only trimmed.
pub fn canonicalize(link: &str) -> String {
    match Url::parse(link.trim()) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => link.trim().to_string(),
    }
}

/// Look up a location in a site's code table, ignoring case.
pub fn location_code(
    site: &str,
    table: &[(&str, u32)],
    city: &str,
) -> Result<u32, CollectError> {
    let wanted = city.trim().to_lowercase();
    table
        .iter()
        .find(|(name, _)| name.to_lowercase() == wanted)
        .map(|(_, code)| *code)
        .ok_or_else(|| CollectError::UnknownLocation {
            site: site.to_string(),
            city: city.to_string(),
        })
}

/// Instantiate the adapter for a source name, or `None` if the name is unknown.
pub fn get_adapter(name: &str, config: &Config) -> anyhow::Result<Option<Arc<dyn SourceAdapter>>> {
    let adapter: Arc<dyn SourceAdapter> = match name {
        headhunter::NAME => {
            let pages = http::StaticPages::new(config.fetch_timeout())?;
            Arc::new(headhunter::HeadHunter::new(Arc::new(pages)))
        }
        superjob::NAME => {
            let session = browser::BrowserSession::new(
                &config.webdriver_url,
                config.fetch_timeout(),
                config.render_wait(),
            )?;
            Arc::new(superjob::SuperJob::new(Arc::new(session)))
        }
        _ => return Ok(None),
    };
    Ok(Some(adapter))
}
