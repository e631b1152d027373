use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use crate::collectors::extract::{self, DetailSelectors};
use crate::collectors::{PageSource, SourceAdapter, canonicalize, location_code};
use crate::error::CollectError;
use crate::models::listing::{Detail, SearchQuery};

pub const NAME: &str = "headhunter";

const BASE_URL: &str = "https://hh.ru";
const SEARCH_URL: &str = "https://hh.ru/search/vacancy";

/// hh.ru `area` codes.
const AREAS: &[(&str, u32)] = &[
    ("Москва", 1),
    ("Санкт-Петербург", 2),
    ("Екатеринбург", 3),
    ("Новосибирск", 4),
    ("Нижний Новгород", 66),
    ("Казань", 88),
];

const RESULT_LINKS: &str = r#"h2[data-qa="bloko-header-2"] a[href], a[data-qa="serp-item__title"][href]"#;

const DETAIL: DetailSelectors = DetailSelectors {
    description: r#"div[data-qa="vacancy-description"]"#,
    position: r#"h1[data-qa="vacancy-title"]"#,
    salary: r#"div[data-qa="vacancy-salary"]"#,
    company: r#"span[data-qa="bloko-header-2"].bloko-header-section-2_lite, a[data-qa="vacancy-company-name"]"#,
    address: r#"span[data-qa="vacancy-view-raw-address"]"#,
    location: r#"p[data-qa="vacancy-view-location"]"#,
};

/// hh.ru, served as static markup.
pub struct HeadHunter {
    pages: Arc<dyn PageSource>,
}

impl HeadHunter {
    pub fn new(pages: Arc<dyn PageSource>) -> Self {
        Self { pages }
    }
}

#[async_trait]
impl SourceAdapter for HeadHunter {
    fn name(&self) -> &str {
        NAME
    }

    fn first_page(&self) -> u32 {
        0
    }

    fn build_search_url(&self, query: &SearchQuery, page: u32) -> Result<String, CollectError> {
        let areas = query
            .cities
            .iter()
            .map(|city| location_code(NAME, AREAS, city))
            .collect::<Result<Vec<_>, _>>()?;

        let mut url = Url::parse(SEARCH_URL)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("order_by", "publication_time")
                .append_pair("text", &query.main_tag.to_lowercase());
            for area in areas {
                pairs.append_pair("area", &area.to_string());
            }
            pairs.append_pair("page", &page.to_string());
        }

        tracing::info!(page = page.saturating_add(1), url = %url, "Search URL built");
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
        extract::parse_detail(&html, link, &query.extra_tags, &DETAIL, '.')
    }

    /// Regional mirrors (spb.hh.ru, ekaterinburg.hh.ru, ...) serve the same vacancy ids.
    fn canonical_link(&self, link: &str) -> String {
        let canonical = canonicalize(link);
        match Url::parse(&canonical) {
            Ok(mut url) if url.host_str().is_some_and(|h| h.ends_with(".hh.ru")) => {
                if url.set_host(Some("hh.ru")).is_ok() {
                    url.into()
                } else {
                    canonical
                }
            }
            _ => canonical,
        }
    }

    async fn shutdown(&self) {
        self.pages.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::testing::CannedPages;
    use crate::models::listing::NOT_SPECIFIED;

    const RESULTS: &str = r#"
        <div class="serp">
          <h2 data-qa="bloko-header-2" class="bloko-header-section-2">
            <a href="https://spb.hh.ru/vacancy/101?query=python&amp;hhtmFrom=vacancy_search_list">Python developer</a>
          </h2>
          <h2 data-qa="bloko-header-2" class="bloko-header-section-2">
            <a href="/vacancy/102">Backend engineer</a>
          </h2>
          <h2 data-qa="bloko-header-2" class="bloko-header-section-2">
            <a href="https://hh.ru/vacancy/101">Python developer (again)</a>
          </h2>
        </div>"#;

    const DETAIL_PAGE: &str = r#"
        <h1 data-qa="vacancy-title" class="bloko-header-section-1">Python&nbsp;developer</h1>
        <div data-qa="vacancy-salary">от 200&nbsp;000 ₽ на руки</div>
        <span data-qa="bloko-header-2" class="bloko-header-section-2 bloko-header-section-2_lite">ООО&nbsp;Ромашка</span>
        <p data-qa="vacancy-view-location">Москва</p>
        <div data-qa="vacancy-description">Стек: Python, Django, PostgreSQL.</div>"#;

    fn query(cities: &[&str], tags: &[&str]) -> SearchQuery {
        SearchQuery {
            main_tag: "Python".to_string(),
            cities: cities.iter().map(|c| c.to_string()).collect(),
            extra_tags: tags.iter().map(|t| t.to_string()).collect(),
            page_count: 1,
        }
    }

    #[test]
    fn search_url_is_zero_based_with_areas() {
        let hh = HeadHunter::new(Arc::new(CannedPages::default()));
        let url = hh
            .build_search_url(&query(&["Москва", "санкт-петербург"], &[]), 0)
            .unwrap();
        assert_eq!(
            url,
            "https://hh.ru/search/vacancy?order_by=publication_time&text=python&area=1&area=2&page=0"
        );
        assert_eq!(hh.first_page(), 0);
    }

    #[test]
    fn last_page_index_does_not_overflow() {
        let hh = HeadHunter::new(Arc::new(CannedPages::default()));
        let url = hh.build_search_url(&query(&[], &[]), u32::MAX).unwrap();
        assert!(url.ends_with(&format!("page={}", u32::MAX)));
    }

    #[test]
    fn unknown_city_fails_without_fetching() {
        let pages = Arc::new(CannedPages::default());
        let hh = HeadHunter::new(pages.clone());
        let err = hh.build_search_url(&query(&["Атлантида"], &[]), 0).unwrap_err();
        assert!(matches!(err, CollectError::UnknownLocation { .. }));
        assert_eq!(pages.request_count(), 0);
    }

    #[tokio::test]
    async fn list_page_returns_canonical_links_in_order() {
        let url = "https://hh.ru/search/vacancy?page=0";
        let hh = HeadHunter::new(Arc::new(CannedPages::default().with(url, RESULTS)));
        let links = hh.list_page(url).await.unwrap();
        assert_eq!(links, ["https://hh.ru/vacancy/101", "https://hh.ru/vacancy/102"]);
    }

    #[tokio::test]
    async fn empty_results_page_is_not_an_error() {
        let url = "https://hh.ru/search/vacancy?page=9";
        let hh = HeadHunter::new(Arc::new(CannedPages::default().with(url, "<p>Ничего не найдено</p>")));
        assert!(hh.list_page(url).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn detail_uses_location_and_salary_separator() {
        let link = "https://hh.ru/vacancy/101";
        let hh = HeadHunter::new(Arc::new(CannedPages::default().with(link, DETAIL_PAGE)));
        let Detail::Found(record) = hh.fetch_detail(link, &query(&[], &["django"])).await.unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(record.link, link);
        assert_eq!(record.position, "Python developer");
        assert_eq!(record.salary, "от 200.000 ₽ на руки");
        assert_eq!(record.company, "ООО Ромашка");
        assert_eq!(record.address, "Москва");
    }

    #[tokio::test]
    async fn detail_without_salary_uses_sentinel() {
        let link = "https://hh.ru/vacancy/103";
        let html = DETAIL_PAGE.replace("vacancy-salary", "something-else");
        let hh = HeadHunter::new(Arc::new(CannedPages::default().with(link, &html)));
        let Detail::Found(record) = hh.fetch_detail(link, &query(&[], &[])).await.unwrap() else {
            panic!("expected a record");
        };
        assert_eq!(record.salary, NOT_SPECIFIED);
    }

    #[tokio::test]
    async fn detail_failing_keywords_is_skipped() {
        let link = "https://hh.ru/vacancy/101";
        let hh = HeadHunter::new(Arc::new(CannedPages::default().with(link, DETAIL_PAGE)));
        let detail = hh.fetch_detail(link, &query(&[], &["django", "kafka"])).await.unwrap();
        assert_eq!(detail, Detail::Skipped);
    }
}
