//! On-disk page cache keyed by source URL.
//!
//! Layout: `<dir>/<key>.html` holds the raw markup and `<dir>/<key>.json`
//! its metadata (including the source URL), where `key` is the URL-safe
//! base64 of the URL's SHA-256. Entries are never evicted; resuming a run
//! depends on that.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::ScraperError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    fetched_at: DateTime<Utc>,
    len: usize,
}

/// A cached page.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub url: String,
    pub markup: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stable, filesystem-safe key for a URL; 43 characters whatever the URL length.
    pub fn key(url: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(url.as_bytes()))
    }

    fn read_meta(path: &Path) -> Option<EntryMeta> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn markup_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.html", Self::key(url)))
    }

    fn meta_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::key(url)))
    }

    pub fn has(&self, url: &str) -> bool {
        self.markup_path(url).is_file()
    }

    pub fn get(&self, url: &str) -> Result<String, ScraperError> {
        let path = self.markup_path(url);
        match fs::read_to_string(&path) {
            Ok(markup) => Ok(markup),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ScraperError::NotFound(format!("cache entry for {}", url)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_entry(&self, url: &str) -> Result<CacheEntry, ScraperError> {
        let markup = self.get(url)?;
        let fetched_at = Self::read_meta(&self.meta_path(url))
            .map(|m| m.fetched_at)
            .or_else(|| {
                fs::metadata(self.markup_path(url))
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            })
            .unwrap_or_else(Utc::now);

        Ok(CacheEntry {
            url: url.to_string(),
            markup,
            fetched_at,
        })
    }

    /// Durably store `markup` for `url`. Overwriting is safe.
    pub fn put(&self, url: &str, markup: &str) -> Result<(), ScraperError> {
        fs::create_dir_all(&self.dir)?;

        let meta = EntryMeta {
            url: url.to_string(),
            fetched_at: Utc::now(),
            len: markup.len(),
        };
        write_atomic(&self.meta_path(url), serde_json::to_string_pretty(&meta)?.as_bytes())?;
        // Markup last: `has` only reports entries whose markup landed.
        write_atomic(&self.markup_path(url), markup.as_bytes())?;

        debug!("Cached {} ({} bytes)", url, markup.len());
        Ok(())
    }

    /// Every cached URL, sorted, as recorded in the metadata sidecars.
    pub fn urls(&self) -> Result<Vec<String>, ScraperError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut urls = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map(|ext| ext != "json").unwrap_or(true) {
                continue;
            }
            match Self::read_meta(&path) {
                Some(meta) if self.has(&meta.url) => urls.push(meta.url),
                Some(_) => {}
                None => warn!("Unreadable cache metadata {}", path.display()),
            }
        }
        urls.sort();
        urls.dedup();
        Ok(urls)
    }
}

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write to a sibling temp file, fsync, then rename over `path`.
///
/// Each call gets its own temp name, so concurrent writers of one path
/// never share a half-written file; the last rename wins.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScraperError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(
        ".{}.{}.tmp",
        std::process::id(),
        TEMP_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = PathBuf::from(tmp);

    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn unique_temp_dir(prefix: &str) -> PathBuf {
    let unique_id = format!(
        "{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );
    std::env::temp_dir().join(format!("{}-{}", prefix, unique_id))
}
