use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use crate::collectors::extract::{self, DetailSelectors};
use crate::collectors::{PageSource, SourceAdapter, location_code};
use crate::error::CollectError;
use crate::models::listing::{Detail, SearchQuery};

pub const NAME: &str = "superjob";

const BASE_URL: &str = "https://www.superjob.ru";
const SEARCH_URL: &str = "https://www.superjob.ru/vacancy/search/";

/// superjob.ru town ids.
const TOWNS: &[(&str, u32)] = &[("Москва", 4), ("Санкт-Петербург", 14)];

const RESULT_LINKS: &str = r#".f-test-search-result-item a[href*="/vakansii/"]"#;

const DETAIL: DetailSelectors = DetailSelectors {
    description: ".f-test-vacancy-description, .vacancy-description",
    position: "h1",
    salary: ".f-test-text-company-item-salary, .f-test-vacancy-salary",
    company: ".f-test-text-vacancy-item-company-name, a[href*=\"/clients/\"]",
    address: ".f-test-address",
    location: ".f-test-text-vacancy-item-location",
};

/// superjob.ru; result pages are assembled client-side, so they are rendered in a browser.
pub struct SuperJob {
    pages: Arc<dyn PageSource>,
}

impl SuperJob {
    pub fn new(pages: Arc<dyn PageSource>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl SourceAdapter for SuperJob {
    fn name(&self) -> &str {
        NAME
    }

    fn first_page(&self) -> u32 {
        1
    }

    fn build_search_url(&self, query: &SearchQuery, page: u32) -> Result<String, CollectError> {
        let towns = query
            .cities
            .iter()
            .map(|city| location_code(NAME, TOWNS, city))
            .collect::<Result<Vec<_>, _>>()?;

        let mut url = Url::parse(SEARCH_URL)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("keywords", &query.main_tag.to_lowercase());
            for (i, town) in towns.iter().enumerate() {
                pairs.append_pair(&format!("geo[t][{i}]"), &town.to_string());
            }
            pairs.append_pair("page", &page.to_string());
        }

        tracing::info!(page, url = %url, "Search URL built");
        Ok(url.into())
    }

    async fn list_page(&self, url: &str) -> Result<Vec<String>, CollectError> {
        let html = self.pages.fetch(url).await?;
        let base = Url::parse(BASE_URL)?;
        let document = Html::parse_document(&html);
        extract::links(&document, RESULT_LINKS, &base, |link| self.canonical_link(link))
    }

    async fn fetch_detail(&self, link: &str, query: &SearchQuery) -> Result<Detail, CollectError> {
        tracing::info!(link, "Parsing listing");
        let html = self.pages.fetch(link).await?;
        extract::parse_detail(&html, link, &query.extra_tags, &DETAIL, ' ')
    }

    async fn shutdown(&self) {
        self.pages.close().await;
    }
}
