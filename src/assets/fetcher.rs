// Asset fetcher - makes sure every requested map package is present in the target directory

use crate::assets::source::{AssetSource, FetchError};
use futures_util::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Concurrent downloads per batch.
pub const FETCH_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MapName(String);

impl MapName {
    /// Accepts `radar` or `radar.pk3`; rejects anything that could escape the
    /// target directory.
    pub fn new(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name.strip_suffix(".pk3").unwrap_or(name);
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return None;
        }
        Some(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.pk3", self.0)
    }
}

impl fmt::Display for MapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a colon separated map list such as `radar:supply:adlernest`.
pub fn parse_map_list(list: &str) -> Vec<MapName> {
    list.split(|c: char| c == ':' || c.is_whitespace())
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| {
            let name = MapName::new(s);
            if name.is_none() {
                tracing::warn!("Ignoring invalid map name: {}", s);
            }
            name
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchReport {
    pub skipped: Vec<MapName>,
    pub copied: Vec<MapName>,
    pub downloaded: Vec<MapName>,
    pub failed: Vec<MapName>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            "Maps: {} present, {} copied from cache, {} downloaded, {} failed",
            self.skipped.len(),
            self.copied.len(),
            self.downloaded.len(),
            self.failed.len()
        );
        if !self.failed.is_empty() {
            let names: Vec<&str> = self.failed.iter().map(|m| m.as_str()).collect();
            tracing::warn!(
                "Could not fetch {} map(s): {}. This is usually a transient network issue, retry later.",
                names.len(),
                names.join(", ")
            );
        }
    }
}

pub struct AssetFetcher {
    target: PathBuf,
    cache: Option<PathBuf>,
    source: Option<Arc<dyn AssetSource>>,
    workers: usize,
}

impl AssetFetcher {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            cache: None,
            source: None,
            workers: FETCH_WORKERS,
        }
    }

    pub fn with_cache(mut self, cache: impl Into<PathBuf>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    pub fn with_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Resolve every name: already present, else copied from the cache, else
    /// downloaded. Per-item failures are collected, never returned as `Err`;
    /// only an unusable target directory is fatal.
    pub async fn fetch_all(&self, names: &[MapName]) -> Result<FetchReport, FetchError> {
        tokio::fs::create_dir_all(&self.target).await?;

        let mut seen = HashSet::new();
        let unique: Vec<MapName> = names
            .iter()
            .filter(|n| seen.insert((*n).clone()))
            .cloned()
            .collect();

        let mut report = FetchReport::default();
        let mut pending = Vec::new();

        for name in &unique {
            let dest = self.target.join(name.file_name());
            if dest.exists() {
                tracing::debug!("Map already present: {}", name);
                report.skipped.push(name.clone());
                continue;
            }

            if let Some(cached) = self.cached_path(name) {
                match tokio::fs::copy(&cached, &dest).await {
                    Ok(_) => {
                        tracing::debug!("Copied {} from cache", name);
                        report.copied.push(name.clone());
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to copy {} from cache: {}", name, e);
                        tokio::fs::remove_file(&dest).await.ok();
                    }
                }
            }

            pending.push(name.clone());
        }

        let (downloaded, failed) = self.download_all(pending).await;

        let order: HashMap<&MapName, usize> =
            unique.iter().enumerate().map(|(i, n)| (n, i)).collect();
        let mut downloaded = downloaded;
        let mut failed = failed;
        downloaded.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
        failed.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
        report.downloaded = downloaded;
        report.failed = failed;

        report.log_summary();
        Ok(report)
    }

    fn cached_path(&self, name: &MapName) -> Option<PathBuf> {
        let cache = self.cache.as_ref()?;
        let path = cache.join(name.file_name());
        path.is_file().then_some(path)
    }

    async fn download_all(&self, pending: Vec<MapName>) -> (Vec<MapName>, Vec<MapName>) {
        if pending.is_empty() {
            return (Vec::new(), Vec::new());
        }

        let Some(source) = self.source.clone() else {
            for name in &pending {
                tracing::debug!("No remote source configured for {}", name);
            }
            return (Vec::new(), pending);
        };

        let failures: Arc<Mutex<Vec<MapName>>> = Arc::new(Mutex::new(Vec::new()));

        let downloaded: Vec<MapName> = stream::iter(pending)
            .map(|name| {
                let source = source.clone();
                let failures = failures.clone();
                let target = self.target.clone();
                async move {
                    match download_one(source.as_ref(), &target, &name).await {
                        Ok(bytes) => {
                            tracing::info!("Downloaded {} ({} bytes)", name, bytes);
                            Some(name)
                        }
                        Err(e) => {
                            tracing::debug!("Download of {} failed: {}", name, e);
                            failures.lock().await.push(name);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.workers)
            .filter_map(|r| async move { r })
            .collect()
            .await;

        let failed = std::mem::take(&mut *failures.lock().await);
        (downloaded, failed)
    }
}

/// Download into a unique partial file and move it into place; the partial
/// file never survives a failure.
async fn download_one(source: &dyn AssetSource, target: &Path, name: &MapName) -> Result<u64, FetchError> {
    let file_name = name.file_name();
    let dest = target.join(&file_name);
    let part = target.join(format!(".{}.{}.part", file_name, Uuid::new_v4().simple()));

    tracing::debug!("Fetching {}", source.describe(&file_name));
    let result = match source.fetch(&file_name, &part).await {
        Ok(bytes) => tokio::fs::rename(&part, &dest)
            .await
            .map(|_| bytes)
            .map_err(FetchError::from),
        Err(e) => Err(e),
    };

    if result.is_err() {
        tokio::fs::remove_file(&part).await.ok();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves every file except the ones listed in `broken`, which fail after
    /// writing a partial file.
    struct FakeSource {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        broken: Vec<String>,
    }

    impl FakeSource {
        fn new(broken: &[&str]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                broken: broken.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl AssetSource for FakeSource {
        async fn fetch(&self, file_name: &str, dest: &Path) -> Result<u64, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::fs::write(dest, b"partial").await?;
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.broken.iter().any(|b| b == file_name) {
                return Err(FetchError::Status {
                    url: file_name.to_string(),
                    status: 404,
                });
            }
            tokio::fs::write(dest, file_name.as_bytes()).await?;
            Ok(file_name.len() as u64)
        }

        fn describe(&self, file_name: &str) -> String {
            format!("fake://{}", file_name)
        }
    }

    fn maps(names: &[&str]) -> Vec<MapName> {
        names.iter().filter_map(|n| MapName::new(n)).collect()
    }

    #[test]
    fn test_map_name_validation() {
        assert_eq!(MapName::new("radar.pk3").unwrap().file_name(), "radar.pk3");
        assert_eq!(MapName::new(" supply ").unwrap().as_str(), "supply");
        assert!(MapName::new("").is_none());
        assert!(MapName::new("../etc/passwd").is_none());
        assert!(MapName::new("a/b").is_none());
    }

    #[test]
    fn test_parse_map_list() {
        let list = parse_map_list("radar:supply::adlernest\n../bad");
        let names: Vec<&str> = list.iter().map(|m| m.as_str()).collect();
        assert_eq!(names, vec!["radar", "supply", "adlernest"]);
    }

    #[tokio::test]
    async fn test_present_assets_do_no_io() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("etmain");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("radar.pk3"), b"x").unwrap();

        let source = Arc::new(FakeSource::new(&[]));
        let fetcher = AssetFetcher::new(&target)
            .with_cache(dir.path().join("does-not-exist"))
            .with_source(source.clone());

        let report = fetcher.fetch_all(&maps(&["radar"])).await.unwrap();
        assert_eq!(report.skipped, maps(&["radar"]));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cache_before_remote() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("etmain");
        let cache = dir.path().join("cache");
        std::fs::create_dir_all(&cache).unwrap();
        std::fs::write(cache.join("supply.pk3"), b"cached").unwrap();

        let source = Arc::new(FakeSource::new(&[]));
        let fetcher = AssetFetcher::new(&target)
            .with_cache(&cache)
            .with_source(source.clone());

        let report = fetcher.fetch_all(&maps(&["supply", "radar"])).await.unwrap();
        assert_eq!(report.copied, maps(&["supply"]));
        assert_eq!(report.downloaded, maps(&["radar"]));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(target.join("supply.pk3")).unwrap(), b"cached");
        assert_eq!(std::fs::read(target.join("radar.pk3")).unwrap(), b"radar.pk3");
    }

    #[tokio::test]
    async fn test_duplicates_resolved_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(&[]));
        let fetcher = AssetFetcher::new(dir.path()).with_source(source.clone());

        let report = fetcher
            .fetch_all(&maps(&["radar", "radar.pk3", "radar"]))
            .await
            .unwrap();
        assert_eq!(report.downloaded, maps(&["radar"]));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_collected_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(&["bad1.pk3", "bad2.pk3"]));
        let fetcher = AssetFetcher::new(dir.path()).with_source(source.clone());

        let report = fetcher
            .fetch_all(&maps(&["bad1", "good", "bad2"]))
            .await
            .unwrap();
        assert_eq!(report.failed, maps(&["bad1", "bad2"]));
        assert_eq!(report.downloaded, maps(&["good"]));
        assert!(!report.is_complete());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["good.pk3".to_string()]);
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new(&[]));
        let fetcher = AssetFetcher::new(dir.path())
            .with_source(source.clone())
            .with_workers(2);

        let names: Vec<String> = (0..8).map(|i| format!("map{}", i)).collect();
        let names: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let report = fetcher.fetch_all(&maps(&names)).await.unwrap();

        assert_eq!(report.downloaded.len(), 8);
        assert!(source.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_without_source_missing_maps_fail() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = AssetFetcher::new(dir.path());
        let report = fetcher.fetch_all(&maps(&["radar"])).await.unwrap();
        assert_eq!(report.failed, maps(&["radar"]));
    }
}
