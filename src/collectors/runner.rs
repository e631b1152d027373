use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;
use uuid::Uuid;

use crate::collectors::SourceAdapter;
use crate::error::CollectError;
use crate::models::listing::{Detail, ListingRecord, SearchQuery};
use crate::models::state::StateStore;
use crate::scheduler::Task;

/// Counters for one collection run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub pages_scanned: u32,
    pub pages_failed: u32,
    pub listings_seen: usize,
    pub already_known: usize,
    pub skipped: usize,
    pub failed: usize,
    pub new: usize,
}

/// One full pass over `query.page_count` result pages of `adapter`.
///
/// Listings already present in the stored state are never fetched again. Page and
/// listing failures are logged and do not stop the run; an unknown location or a
/// corrupt state file aborts it before anything is fetched.
pub async fn run(
    adapter: &dyn SourceAdapter,
    query: &SearchQuery,
    store: &StateStore,
) -> Result<RunSummary, CollectError> {
    let source = adapter.name();
    let known = store.load(source).await?;
    let mut seen: HashSet<String> = known
        .links
        .iter()
        .map(|link| adapter.canonical_link(link))
        .collect();

    let first = adapter.first_page();
    let urls = (first..first.saturating_add(query.page_count))
        .map(|page| adapter.build_search_url(query, page).map(|url| (page, url)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut summary = RunSummary::default();
    let mut found: Vec<ListingRecord> = Vec::new();

    for (page, url) in urls {
        let links = match adapter.list_page(&url).await {
            Ok(links) => links,
            Err(e) => {
                tracing::warn!(page, url = %url, error = %e, "Results page failed, treating as empty");
                summary.pages_failed += 1;
                continue;
            }
        };
        summary.pages_scanned += 1;
        summary.listings_seen += links.len();
        tracing::info!(
            page,
            listings = links.len(),
            query = %query.main_tag,
            cities = ?query.cities,
            "Results page listed"
        );

        let before = found.len();
        for link in links {
            if seen.contains(&link) {
                summary.already_known += 1;
                continue;
            }
            match adapter.fetch_detail(&link, query).await {
                Ok(Detail::Found(record)) => {
                    seen.insert(link);
                    found.push(record);
                }
                Ok(Detail::Skipped) => summary.skipped += 1,
                Err(e) => {
                    tracing::warn!(link = %link, error = %e, "Listing skipped");
                    summary.failed += 1;
                }
            }
        }

        let new_on_page = found.len() - before;
        if new_on_page == 0 {
            tracing::info!(page, tags = ?query.extra_tags, "No new listings on page");
        } else {
            tracing::info!(page, new = new_on_page, "New listings on page");
        }
    }

    summary.new = found.len();
    if found.is_empty() {
        tracing::info!(cities = ?query.cities, tags = ?query.extra_tags, "No new listings this run");
    }
    store.save(source, found, known.records).await?;
    Ok(summary)
}

/// Scheduler entry that runs one source's collection.
pub struct ScheduledCollection {
    pub adapter: Arc<dyn SourceAdapter>,
    pub query: Arc<SearchQuery>,
    pub store: StateStore,
}

impl ScheduledCollection {
    /// Run once inside a span tagged with the source and a fresh run id.
    pub async fn run_once(&self) -> Result<RunSummary, CollectError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("collect", source = self.adapter.name(), %run_id);
        run(&*self.adapter, &self.query, &self.store)
            .instrument(span)
            .await
    }
}

#[async_trait]
impl Task for ScheduledCollection {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    async fn fire(&self) {
        match self.run_once().await {
            Ok(summary) => tracing::info!(
                source = self.adapter.name(),
                pages = summary.pages_scanned,
                pages_failed = summary.pages_failed,
                seen = summary.listings_seen,
                known = summary.already_known,
                skipped = summary.skipped,
                failed = summary.failed,
                new = summary.new,
                "Collection run completed"
            ),
            Err(e) => tracing::error!(source = self.adapter.name(), error = %e, "Collection run failed"),
        }
    }
}
