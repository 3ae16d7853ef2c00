//! Disk-backed cache sets.
//!
//! A set is a directory of JSON entry files under the cache root. The
//! entry file name is the SHA-256 of the request key, so keys are
//! unique within a set and an arbitrary URL never escapes into a file
//! path. Writes go to a sibling temp file and then rename into place,
//! which gives entry-level atomicity: a concurrent reader sees either
//! the old snapshot or the new one, never a torn write.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A stored copy of an outbound request, replayable as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<String>,
}

impl RequestSnapshot {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn key(&self) -> String {
        request_key(&self.method, &self.url)
    }
}

/// A stored copy of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Vec<u8>,
}

impl ResponseSnapshot {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One cache entry: the request, the response if one was observed, and
/// when it was stored. An entry without a response is a pending
/// mutation awaiting replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub request: RequestSnapshot,
    pub response: Option<ResponseSnapshot>,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn response(request: RequestSnapshot, response: ResponseSnapshot) -> Self {
        Self {
            key: request.key(),
            request,
            response: Some(response),
            stored_at: Utc::now(),
        }
    }

    pub fn pending(request: RequestSnapshot) -> Self {
        Self {
            key: request.key(),
            request,
            response: None,
            stored_at: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }
}

/// Normalized request key: `METHOD url`, with the URL canonicalized so
/// equivalent spellings map to the same entry.
pub fn request_key(method: &str, url: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), normalize_url(url))
}

/// Canonicalize a URL for keying: lowercase scheme and host, drop the
/// fragment and any default port, trim a trailing slash off non-root
/// paths. Unparseable input is keyed verbatim.
pub fn normalize_url(url: &str) -> String {
    let parsed = match reqwest::Url::parse(url.trim()) {
        Ok(parsed) => parsed,
        Err(_) => return url.trim().to_string(),
    };

    // The url crate already lowercases scheme/host and elides default ports.
    let mut out = format!("{}://", parsed.scheme());
    if let Some(host) = parsed.host_str() {
        out.push_str(host);
    }
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{}", port));
    }

    let path = parsed.path();
    if path.len() > 1 && path.ends_with('/') {
        out.push_str(&path[..path.len() - 1]);
    } else {
        out.push_str(path);
    }

    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }

    out
}

pub struct CacheStore {
    root: PathBuf,
}

impl CacheStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create cache root at {}", root.display()))?;
        Ok(Self { root })
    }

    fn set_dir(&self, set: &str) -> PathBuf {
        self.root.join(set)
    }

    fn entry_path(&self, set: &str, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let name = digest
            .iter()
            .fold(String::with_capacity(64), |mut s, b| {
                s.push_str(&format!("{:02x}", b));
                s
            });
        self.set_dir(set).join(format!("{}.json", name))
    }

    pub fn create_set(&self, set: &str) -> Result<()> {
        std::fs::create_dir_all(self.set_dir(set))
            .with_context(|| format!("Failed to create cache set {}", set))
    }

    pub fn has_set(&self, set: &str) -> bool {
        self.set_dir(set).is_dir()
    }

    pub fn delete_set(&self, set: &str) -> Result<()> {
        let dir = self.set_dir(set);
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to delete cache set {}", set))?;
        }
        Ok(())
    }

    /// Names of all sets currently on disk.
    pub fn list_sets(&self) -> Result<Vec<String>> {
        let mut sets = Vec::new();
        for dir_entry in std::fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if dir_entry.file_type()?.is_dir() {
                sets.push(dir_entry.file_name().to_string_lossy().into_owned());
            }
        }
        sets.sort();
        Ok(sets)
    }

    /// Store an entry, replacing any existing entry for the same key.
    pub fn put(&self, set: &str, entry: &CacheEntry) -> Result<()> {
        self.create_set(set)?;
        let path = self.entry_path(set, &entry.key);
        let tmp = path.with_extension("json.tmp");

        let contents = serde_json::to_string(entry)?;
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache entry for {}", entry.key))?;
        // Rename within the same directory is atomic on POSIX.
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to commit cache entry for {}", entry.key))?;
        Ok(())
    }

    pub fn get(&self, set: &str, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(set, key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache entry for {}", key))?;
        let entry = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache entry for {}", key))?;
        Ok(Some(entry))
    }

    /// Remove an entry. Returns whether one existed.
    pub fn delete(&self, set: &str, key: &str) -> Result<bool> {
        let path = self.entry_path(set, key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete cache entry for {}", key))?;
            return Ok(true);
        }
        Ok(false)
    }

    /// All entries in a set. Unparseable files and in-flight temp files
    /// are skipped rather than failing the enumeration.
    pub fn entries(&self, set: &str) -> Result<Vec<CacheEntry>> {
        let dir = self.set_dir(set);
        let mut entries = Vec::new();
        if !dir.is_dir() {
            return Ok(entries);
        }
        for dir_entry in std::fs::read_dir(&dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(anyhow::Error::from)
                .and_then(|s| serde_json::from_str::<CacheEntry>(&s).map_err(Into::into))
            {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }
        Ok(entries)
    }

    pub fn keys(&self, set: &str) -> Result<Vec<String>> {
        Ok(self.entries(set)?.into_iter().map(|e| e.key).collect())
    }
}
