mod collectors;
mod config;
mod error;
mod filter;
mod models;
mod scheduler;

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::collectors::SourceAdapter;
use crate::collectors::runner::ScheduledCollection;
use crate::config::{Command, Config};
use crate::models::listing::SearchQuery;
use crate::models::state::StateStore;
use crate::scheduler::{Scheduler, SystemClock};

fn init_tracing(log_file: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobscout=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match (log_file, json) {
        (Some(path), true) => builder
            .json()
            .with_writer(Mutex::new(File::create(path)?))
            .init(),
        (Some(path), false) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(File::create(path)?))
            .init(),
        (None, true) => builder.json().init(),
        (None, false) => builder.init(),
    }
    Ok(())
}

fn build_adapter(name: &str, config: &Config) -> anyhow::Result<Arc<dyn SourceAdapter>> {
    collectors::get_adapter(name.trim(), config)?
        .ok_or_else(|| anyhow::anyhow!("Unknown source: {name}"))
}

async fn collect_once(
    source: &str,
    config: &Config,
    query: Arc<SearchQuery>,
    store: StateStore,
) -> anyhow::Result<()> {
    let job = ScheduledCollection {
        adapter: build_adapter(source, config)?,
        query,
        store,
    };
    let outcome = job.run_once().await;
    job.adapter.shutdown().await;

    let summary = outcome?;
    tracing::info!(
        source,
        new = summary.new,
        known = summary.already_known,
        skipped = summary.skipped,
        "Collection finished"
    );
    Ok(())
}

async fn schedule(config: &Config, query: Arc<SearchQuery>, store: StateStore) -> anyhow::Result<()> {
    let mut adapters = Vec::new();
    for name in &config.sources {
        adapters.push(build_adapter(name, config)?);
    }

    let mut scheduler = Scheduler::new(SystemClock);
    for adapter in &adapters {
        scheduler.every_day_at(
            config.fire_time(adapter.name()),
            Arc::new(ScheduledCollection {
                adapter: adapter.clone(),
                query: query.clone(),
                store: store.clone(),
            }),
        );
    }
    scheduler.run(config.tick()).await;

    for adapter in &adapters {
        adapter.shutdown().await;
    }
    Ok(())
}

// Collections run one at a time on a single thread.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_file.as_deref(), config.log_json)?;

    let query = Arc::new(config.search_query());
    let store = StateStore::new(&config.state_dir);
    tracing::info!(
        query = %query.main_tag,
        cities = ?query.cities,
        tags = ?query.extra_tags,
        pages = query.page_count,
        state_dir = %config.state_dir.display(),
        "Starting"
    );

    match config.resolved_command() {
        Command::Collect { source } => collect_once(&source, &config, query, store).await,
        Command::Schedule => schedule(&config, query, store).await,
    }
}
