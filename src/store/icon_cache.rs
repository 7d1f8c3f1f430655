use crate::error::Result;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CACHE_SUFFIX: &str = ".cache";

#[derive(Debug, Serialize, Deserialize)]
struct IconCacheEntry {
    url: String,
    #[serde(rename = "cachedAt")]
    cached_at: DateTime<Utc>,
}

/// Disk-backed marker cache for feed icons. An entry records when an
/// icon URL was last fetched so repeat aggregations skip the download;
/// entries age out after `max_age_days`. Purely advisory.
#[derive(Debug, Clone)]
pub struct IconCache {
    dir: PathBuf,
    max_age_days: i64,
}

impl IconCache {
    pub fn new(dir: impl Into<PathBuf>, max_age_days: i64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, max_age_days })
    }

    /// True when no fresh cache entry exists for the URL.
    pub fn should_fetch(&self, url: &str) -> bool {
        let path = self.entry_path(url);
        match read_entry(&path) {
            Some(entry) => {
                let expired = entry.cached_at < Utc::now() - Duration::days(self.max_age_days);
                if expired {
                    debug!(url, "icon cache entry expired");
                }
                expired
            }
            None => true,
        }
    }

    /// Record a successful fetch. Written atomically: temp file, then
    /// rename.
    pub fn mark_fetched(&self, url: &str) -> Result<()> {
        let entry = IconCacheEntry { url: url.to_string(), cached_at: Utc::now() };
        let path = self.entry_path(url);
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(&entry)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Drop entries older than the configured age. Returns how many were
    /// removed.
    pub fn sweep(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(self.max_age_days);
        let mut removed = 0;

        for dir_entry in std::fs::read_dir(&self.dir)? {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "unreadable icon cache entry during sweep");
                    continue;
                }
            };
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("cache") {
                continue;
            }
            let stale = match read_entry(&path) {
                Some(entry) => entry.cached_at < cutoff,
                // Unparsable entries are garbage either way.
                None => true,
            };
            if stale {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to remove stale icon cache entry");
                } else {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!(removed, "icon cache sweep");
        }
        Ok(removed)
    }

    /// File name: base64 of the URL with the path-hostile characters
    /// `/ + =` rewritten to `_`.
    fn entry_path(&self, url: &str) -> PathBuf {
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(url.as_bytes())
            .replace(['/', '+', '='], "_");
        self.dir.join(format!("{encoded}{CACHE_SUFFIX}"))
    }
}

fn read_entry(path: &Path) -> Option<IconCacheEntry> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}
