//! # Cache Module
//!
//! Content-addressed response cache. Each entry is one JSON file named after
//! the SHA-256 of the model id plus the normalized request text, so the same
//! issue asked of the same model within the TTL never costs twice.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default cache TTL in hours (one week, matching the budget period)
pub const CACHE_TTL_HOURS: i64 = 168;

/// Token usage reported for the cached response
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedUsage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub search_queries: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub response: String,
    #[serde(default)]
    pub usage: CachedUsage,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
    pub bytes: u64,
}

/// Lowercase, collapse whitespace runs, trim
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of `model` and the normalized text
pub fn make_cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_text(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, ttl_hours: i64) -> Self {
        ResponseCache {
            dir: dir.into(),
            ttl: Duration::try_hours(ttl_hours.max(0)).unwrap_or(Duration::MAX),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Cached response if present and not expired. Expired or unreadable
    /// entries are removed and reported as a miss.
    pub fn get(&self, model: &str, text: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let key = make_cache_key(model, text);
        let path = self.entry_path(&key);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.expires_at > now => {
                tracing::debug!(key = %key, "cache hit");
                Some(entry)
            }
            Ok(_) => {
                tracing::debug!(key = %key, "cache entry expired");
                let _ = fs::remove_file(&path);
                None
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "dropping unreadable cache entry");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    pub fn put(
        &self,
        model: &str,
        text: &str,
        response: &str,
        usage: CachedUsage,
        now: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create cache dir {}", self.dir.display()))?;
        let key = make_cache_key(model, text);
        let expires_at = now
            .checked_add_signed(self.ttl)
            .with_context(|| format!("cache ttl of {}h overflows the expiry time", self.ttl.num_hours()))?;
        let entry = CacheEntry {
            key: key.clone(),
            model: model.to_string(),
            created_at: now,
            expires_at,
            response: response.to_string(),
            usage,
        };
        let path = self.entry_path(&key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&entry)?)
            .with_context(|| format!("write cache entry {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("replace cache entry {}", path.display()))?;
        Ok(entry)
    }

    fn entry_files(&self) -> impl Iterator<Item = PathBuf> {
        WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
    }

    fn is_expired(path: &Path, now: DateTime<Utc>) -> bool {
        fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
            .is_none_or(|entry| entry.expires_at <= now)
    }

    /// Remove expired (and unreadable) entries; returns how many were removed
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for path in self.entry_files() {
            if Self::is_expired(&path, now) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        tracing::info!(removed, "purged expired cache entries");
        removed
    }

    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.entry_files() {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    pub fn stats(&self, now: DateTime<Utc>) -> CacheStats {
        let mut stats = CacheStats::default();
        for path in self.entry_files() {
            stats.total += 1;
            stats.bytes += fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if Self::is_expired(&path, now) {
                stats.expired += 1;
            } else {
                stats.valid += 1;
            }
        }
        stats
    }
}
