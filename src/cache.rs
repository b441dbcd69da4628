use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::utils::{lock::FileLockGuard, restrict_permissions, write_atomic};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheEntry {
    pub login_url: String,
    pub assertion: String,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Raw SAML assertions on disk, one file per login URL.
#[derive(Debug, Clone)]
pub struct AssertionStore {
    cache_dir: PathBuf,
}

impl AssertionStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_path(&self, login_url: &str) -> PathBuf {
        let digest = hex::encode(Sha1::digest(login_url.as_bytes()));
        self.cache_dir.join(format!("saml_cache_{digest}.json"))
    }

    /// Entry for `login_url` when one exists and `now` is still before its expiry.
    pub fn resolve_cache_hit(&self, login_url: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let path = self.cache_path(login_url);
        let content = fs::read_to_string(&path).ok()?;
        let entry = match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable SAML cache");
                return None;
            }
        };
        if entry.login_url != login_url || now >= entry.expires_at {
            debug!(path = %path.display(), expires_at = %entry.expires_at, "SAML cache miss");
            return None;
        }
        debug!(path = %path.display(), expires_at = %entry.expires_at, "SAML cache hit");
        Some(entry)
    }

    pub fn cache_assertion(
        &self,
        login_url: &str,
        assertion: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let path = self.cache_path(login_url);
        let entry = CacheEntry {
            login_url: login_url.to_string(),
            assertion: assertion.to_string(),
            stored_at: Utc::now(),
            expires_at,
        };
        let contents = serde_json::to_vec_pretty(&entry)
            .map_err(|err| Error::persistence(&path, io::Error::other(err)))?;

        fs::create_dir_all(&self.cache_dir)
            .map_err(|err| Error::persistence(&self.cache_dir, err))?;
        let _lock = FileLockGuard::acquire(&path).map_err(|err| Error::persistence(&path, err))?;
        write_atomic(&path, &contents)?;
        restrict_permissions(&path)
    }

    pub fn evict(&self, login_url: &str) -> Result<()> {
        let path = self.cache_path(login_url);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "evicted SAML cache");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Error::persistence(path, err)),
        }
    }
}
