use crate::errors::*;
use crate::http;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub fn is_stale(modified: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    now.signed_duration_since(modified) > max_age
}

pub fn url_or_path(client: &http::Client, path: &str) -> Result<Vec<u8>> {
    let bytes = if path.starts_with("https://") || path.starts_with("http://") {
        info!("Downloading {:?}...", path);
        client
            .get(path)
            .send()?
            .error_for_status()?
            .bytes()?
            .to_vec()
    } else {
        info!("Reading {:?}...", path);
        fs::read(path)?
    };

    Ok(bytes)
}

/// Local copy of the excuse report
pub struct CacheManager {
    path: PathBuf,
    url: String,
    max_age: Duration,
}

impl CacheManager {
    pub fn new<P: Into<PathBuf>>(path: P, url: &str, max_age_secs: u64) -> CacheManager {
        CacheManager {
            path: path.into(),
            url: url.to_string(),
            max_age: i64::try_from(max_age_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn modified(&self) -> Result<Option<DateTime<Utc>>> {
        match fs::metadata(&self.path) {
            Ok(md) => Ok(Some(md.modified()?.into())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn needs_refresh(&self, now: DateTime<Utc>, force: bool) -> Result<bool> {
        if force {
            debug!("Refresh of {:?} was requested", self.path);
            return Ok(true);
        }
        match self.modified()? {
            Some(modified) => Ok(is_stale(modified, now, self.max_age)),
            None => Ok(true),
        }
    }

    fn store(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| anyhow!("Failed to create cache directory {:?}", parent))?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes).with_context(|| anyhow!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| anyhow!("Failed to move {:?} into place", tmp))?;
        Ok(())
    }

    pub fn load(&self, client: &http::Client, force: bool) -> Result<Vec<u8>> {
        if !self.needs_refresh(Utc::now(), force)? {
            debug!("Using cached excuses from {:?}", self.path);
            return fs::read(&self.path)
                .with_context(|| anyhow!("Failed to read cached excuses {:?}", self.path));
        }

        match url_or_path(client, &self.url) {
            Ok(bytes) => {
                self.store(&bytes)?;
                Ok(bytes)
            }
            Err(err) if self.path.exists() => {
                warn!("Failed to refresh excuses, using stale copy: {:#}", err);
                fs::read(&self.path)
                    .with_context(|| anyhow!("Failed to read cached excuses {:?}", self.path))
            }
            Err(err) => Err(err.context("Failed to fetch excuses")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_fresh() {
        let max_age = Duration::hours(4);
        assert!(!is_stale(ts("2024-03-01T08:00:00Z"), ts("2024-03-01T11:59:59Z"), max_age));
        assert!(!is_stale(ts("2024-03-01T08:00:00Z"), ts("2024-03-01T12:00:00Z"), max_age));
    }

    #[test]
    fn test_stale() {
        let max_age = Duration::hours(4);
        assert!(is_stale(ts("2024-03-01T08:00:00Z"), ts("2024-03-01T12:00:01Z"), max_age));
    }

    #[test]
    fn test_modified_in_future() {
        let max_age = Duration::hours(4);
        assert!(!is_stale(ts("2024-03-02T08:00:00Z"), ts("2024-03-01T12:00:00Z"), max_age));
    }

    #[test]
    fn test_missing_cache_needs_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(dir.path().join("excuses.yaml.xz"), "http://127.0.0.1:1", 3600);
        assert!(cache.needs_refresh(Utc::now(), false).unwrap());
    }

    #[test]
    fn test_fresh_cache_and_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("excuses.yaml");
        fs::write(&path, "sources: []\n").unwrap();
        let cache = CacheManager::new(&path, "http://127.0.0.1:1", 3600);
        assert!(!cache.needs_refresh(Utc::now(), false).unwrap());
        assert!(cache.needs_refresh(Utc::now(), true).unwrap());
        assert!(cache
            .needs_refresh(Utc::now() + Duration::hours(2), false)
            .unwrap());
    }

    #[test]
    fn test_huge_max_age_never_expires() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("excuses.yaml");
        fs::write(&path, "sources: []\n").unwrap();
        let cache = CacheManager::new(&path, "http://127.0.0.1:1", u64::MAX);
        assert!(!cache.needs_refresh(Utc::now(), false).unwrap());
        assert!(!cache
            .needs_refresh(Utc::now() + Duration::days(365 * 100), false)
            .unwrap());
    }

    #[test]
    fn test_load_from_local_source() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("upstream.yaml");
        fs::write(&src, "sources: []\n").unwrap();
        let cache_path = dir.path().join("cache").join("excuses.yaml");
        let cache = CacheManager::new(&cache_path, src.to_str().unwrap(), 3600);

        let client = http::client().unwrap();
        let bytes = cache.load(&client, false).unwrap();
        assert_eq!(bytes, b"sources: []\n");
        assert_eq!(fs::read(&cache_path).unwrap(), b"sources: []\n");
    }

    #[test]
    fn test_load_falls_back_to_stale_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cache_path = dir.path().join("excuses.yaml");
        fs::write(&cache_path, "sources: []\n").unwrap();
        let missing = dir.path().join("missing.yaml");
        let cache = CacheManager::new(&cache_path, missing.to_str().unwrap(), 3600);

        let client = http::client().unwrap();
        let bytes = cache.load(&client, true).unwrap();
        assert_eq!(bytes, b"sources: []\n");
    }
}
