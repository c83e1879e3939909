//! Match persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::write_atomic;
use crate::error::ScraperError;
use crate::traits::{MatchStore, SaveOutcome};
use crate::types::{MatchRecord, PlayerStatTable};

/// One stored match: the record plus its player tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMatch {
    pub record: MatchRecord,
    pub tables: Vec<PlayerStatTable>,
}

impl StoredMatch {
    fn new(record: &MatchRecord, tables: &[PlayerStatTable]) -> Self {
        Self {
            record: record.clone(),
            tables: tables.to_vec(),
        }
    }
}

fn upsert(
    matches: &mut BTreeMap<String, StoredMatch>,
    record: &MatchRecord,
    tables: &[PlayerStatTable],
) -> SaveOutcome {
    let incoming = StoredMatch::new(record, tables);
    if matches.get(&record.url) == Some(&incoming) {
        return SaveOutcome::DuplicateIgnored;
    }
    matches.insert(record.url.clone(), incoming);
    SaveOutcome::Saved
}

/// All matches in a single JSON document keyed by URL, rewritten atomically on
/// every change.
pub struct JsonFileStore {
    path: PathBuf,
    matches: Mutex<BTreeMap<String, StoredMatch>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading any existing file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ScraperError> {
        let path = path.into();
        let matches = Self::load(&path)?;
        info!("Opened match store {} ({} matches)", path.display(), matches.len());
        Ok(Self {
            path,
            matches: Mutex::new(matches),
        })
    }

    /// Read a store file; a missing file is an empty store.
    pub fn load(path: &Path) -> Result<BTreeMap<String, StoredMatch>, ScraperError> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, url: &str) -> Option<StoredMatch> {
        self.matches.lock().await.get(url).cloned()
    }

    pub async fn len(&self) -> usize {
        self.matches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn persist(&self, matches: &BTreeMap<String, StoredMatch>) -> Result<(), ScraperError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(matches)?;
        write_atomic(&self.path, json.as_bytes())
    }
}

#[async_trait]
impl MatchStore for JsonFileStore {
    async fn save(
        &self,
        record: &MatchRecord,
        tables: &[PlayerStatTable],
    ) -> Result<SaveOutcome, ScraperError> {
        let mut matches = self.matches.lock().await;
        let previous = matches.get(&record.url).cloned();

        let outcome = upsert(&mut matches, record, tables);
        if outcome == SaveOutcome::Saved {
            if let Err(e) = self.persist(&matches) {
                // Keep memory in step with the file.
                match previous {
                    Some(previous) => matches.insert(record.url.clone(), previous),
                    None => matches.remove(&record.url),
                };
                return Err(e);
            }
            debug!("Stored {}", record.url);
        }
        Ok(outcome)
    }

    async fn contains(&self, url: &str) -> bool {
        self.matches.lock().await.contains_key(url)
    }
}

/// In-process store for tests and manual parsing.
#[derive(Default)]
pub struct MemoryStore {
    matches: Mutex<BTreeMap<String, StoredMatch>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, url: &str) -> Option<StoredMatch> {
        self.matches.lock().await.get(url).cloned()
    }

    pub async fn len(&self) -> usize {
        self.matches.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn save(
        &self,
        record: &MatchRecord,
        tables: &[PlayerStatTable],
    ) -> Result<SaveOutcome, ScraperError> {
        Ok(upsert(&mut *self.matches.lock().await, record, tables))
    }

    async fn contains(&self, url: &str) -> bool {
        self.matches.lock().await.contains_key(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::unique_temp_dir;
    use crate::types::{Side, TableKind};

    fn record(url: &str, home_goals: u32) -> MatchRecord {
        let mut record = MatchRecord::new(url);
        record.home.team = Some("Arsenal".into());
        record.home.goals = Some(home_goals);
        record
    }

    #[tokio::test]
    async fn test_memory_store_duplicate_and_overwrite() {
        let store = MemoryStore::new();
        let tables = vec![PlayerStatTable::empty(Side::Home, TableKind::Summary)];

        assert_eq!(store.save(&record("u1", 1), &tables).await.unwrap(), SaveOutcome::Saved);
        assert_eq!(
            store.save(&record("u1", 1), &tables).await.unwrap(),
            SaveOutcome::DuplicateIgnored
        );
        assert_eq!(store.save(&record("u1", 2), &tables).await.unwrap(), SaveOutcome::Saved);

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("u1").await.unwrap().record.home.goals, Some(2));
        assert!(store.contains("u1").await);
        assert!(!store.contains("u2").await);
    }

    #[tokio::test]
    async fn test_json_store_persists_across_reopen() {
        let dir = unique_temp_dir("store");
        let path = dir.join("matches.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.is_empty().await);
        store.save(&record("u1", 3), &[]).await.unwrap();
        store.save(&record("u2", 0), &[]).await.unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.len().await, 2);
        assert_eq!(reopened.get("u1").await.unwrap().record.home.goals, Some(3));
        assert_eq!(
            reopened.save(&record("u2", 0), &[]).await.unwrap(),
            SaveOutcome::DuplicateIgnored
        );

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let path = unique_temp_dir("store-missing").join("matches.json");
        assert!(JsonFileStore::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_serialization_error() {
        let dir = unique_temp_dir("store-corrupt");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("matches.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            JsonFileStore::load(&path),
            Err(ScraperError::Serialization(_))
        ));
        let _ = fs::remove_dir_all(&dir);
    }
}
