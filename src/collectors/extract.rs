use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::CollectError;
use crate::filter;
use crate::models::listing::{Detail, ListingRecord, NOT_SPECIFIED};

/// CSS selectors for the fields of a detail page.
pub struct DetailSelectors {
    pub description: &'static str,
    pub position: &'static str,
    pub salary: &'static str,
    pub company: &'static str,
    pub address: &'static str,
    /// Coarser location label used when `address` is absent.
    pub location: &'static str,
}

pub fn selector(css: &str) -> Result<Selector, CollectError> {
    Selector::parse(css).map_err(|_| CollectError::Selector(css.to_string()))
}

/// Text content of an element with non-breaking spaces replaced and whitespace collapsed.
pub fn element_text(element: ElementRef<'_>, nbsp: char) -> String {
    let raw: String = element.text().collect();
    let replaced = raw.replace('\u{a0}', &nbsp.to_string());
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First non-empty match of `css`, if any.
pub fn first_text(document: &Html, css: &str, nbsp: char) -> Result<Option<String>, CollectError> {
    let sel = selector(css)?;
    Ok(document
        .select(&sel)
        .map(|el| element_text(el, nbsp))
        .find(|text| !text.is_empty()))
}

/// `href` of every match of `css`, resolved against `base`, canonicalized by `canonical`,
/// in document order with repeats removed.
pub fn links(
    document: &Html,
    css: &str,
    base: &Url,
    canonical: impl Fn(&str) -> String,
) -> Result<Vec<String>, CollectError> {
    let sel = selector(css)?;
    let mut out: Vec<String> = Vec::new();
    for href in document.select(&sel).filter_map(|el| el.value().attr("href")) {
        let Ok(absolute) = base.join(href.trim()) else {
            tracing::debug!(href, "Skipping unparseable link");
            continue;
        };
        let link = canonical(absolute.as_str());
        if !out.contains(&link) {
            out.push(link);
        }
    }
    Ok(out)
}

/// Parse a detail page into a record. Salary and address fall back to defaults;
/// a missing position or company is `ExtractionMissing`.
pub fn parse_detail(
    html: &str,
    link: &str,
    extra_tags: &[String],
    fields: &DetailSelectors,
    salary_nbsp: char,
) -> Result<Detail, CollectError> {
    let document = Html::parse_document(html);

    if !extra_tags.is_empty() {
        let description = first_text(&document, fields.description, ' ')?.unwrap_or_default();
        let matched = filter::matches(&description, extra_tags);
        tracing::info!(link, tags = ?extra_tags, matched, "Keyword check");
        if !matched {
            return Ok(Detail::Skipped);
        }
    }

    let position = first_text(&document, fields.position, ' ')?
        .ok_or(CollectError::ExtractionMissing("position"))?;
    let company = first_text(&document, fields.company, ' ')?
        .ok_or(CollectError::ExtractionMissing("company"))?;

    let salary = match first_text(&document, fields.salary, salary_nbsp)? {
        Some(salary) => salary,
        None => {
            tracing::warn!(link, "Salary not specified");
            NOT_SPECIFIED.to_string()
        }
    };

    let address = match first_text(&document, fields.address, ' ')? {
        Some(address) => address,
        None => {
            tracing::warn!(link, "Company address not specified, using location");
            first_text(&document, fields.location, ' ')?.unwrap_or_else(|| {
                tracing::warn!(link, "Location not specified either");
                NOT_SPECIFIED.to_string()
            })
        }
    };

    Ok(Detail::Found(ListingRecord {
        link: link.to_string(),
        position,
        salary,
        company,
        address,
    }))
}
