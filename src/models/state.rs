use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;

use crate::error::CollectError;
use crate::models::listing::ListingRecord;

/// Persisted per-source history: listings found by the last run and everything before it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionState {
    pub new: Vec<ListingRecord>,
    pub old: Vec<ListingRecord>,
}

/// Everything a run needs to know about earlier runs.
#[derive(Debug, Default)]
pub struct KnownListings {
    pub links: HashSet<String>,
    /// Previous `new` followed by previous `old`, without repeated links.
    pub records: Vec<ListingRecord>,
}

impl CollectionState {
    /// Flatten both partitions, keeping the first occurrence of each link.
    pub fn into_known(self) -> KnownListings {
        let mut known = KnownListings::default();
        for record in self.new.into_iter().chain(self.old) {
            if known.links.insert(record.link.clone()) {
                known.records.push(record);
            }
        }
        known
    }
}

/// One JSON file per source under a state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source: &str) -> PathBuf {
        self.dir.join(format!("{source}_vacancies.json"))
    }

    /// Read the last persisted state. A missing or unreadable file counts as a first run;
    /// a file that exists but does not parse is `StateCorrupt`.
    pub async fn load(&self, source: &str) -> Result<KnownListings, CollectError> {
        let path = self.path_for(source);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No previous state, starting fresh");
                return Ok(KnownListings::default());
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "State file unreadable, starting fresh");
                return Ok(KnownListings::default());
            }
        };

        // Bytes are decoded by serde_json so invalid UTF-8 is reported as corruption.
        let state: CollectionState = serde_json::from_slice(&raw)
            .map_err(|error| CollectError::StateCorrupt { path: path.clone(), error })?;
        let known = state.into_known();
        tracing::info!(
            path = %path.display(),
            known = known.records.len(),
            "Loaded previous state"
        );
        Ok(known)
    }

    /// Replace the state for `source` with `{new: newly_found, old: previously_known}`.
    /// The file is written next to the target and renamed over it.
    pub async fn save(
        &self,
        source: &str,
        newly_found: Vec<ListingRecord>,
        previously_known: Vec<ListingRecord>,
    ) -> Result<PathBuf, CollectError> {
        let state = CollectionState {
            new: newly_found,
            old: previously_known,
        };
        let body = encode(&state)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(source);
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::info!(
            path = %path.display(),
            new = state.new.len(),
            old = state.old.len(),
            "State saved"
        );
        Ok(path)
    }
}

fn encode(state: &CollectionState) -> Result<Vec<u8>, CollectError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    state.serialize(&mut ser)?;
    Ok(buf)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
