// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Offline asset cache
//!
//! The engine must keep working with zero network access, so a fixed
//! manifest of core assets is downloaded into a versioned cache
//! directory up front; optional assets are cached best-effort. Fetches
//! serve the cached copy first and revalidate in the background
//! (stale-while-revalidate), and activation removes cache directories
//! left behind by older versions.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

/// Outcome of a precache pass
#[derive(Debug, Clone)]
pub struct PrecacheReport {
    /// Core assets cached (must equal the manifest length)
    pub core_cached: usize,
    /// Optional assets cached
    pub optional_cached: usize,
    /// Optional assets that failed (degraded gracefully)
    pub optional_failed: usize,
}

/// Versioned offline asset cache
pub struct AssetCache {
    config: CacheConfig,
    http: reqwest::Client,
    dir: PathBuf,
}

impl AssetCache {
    /// Create a cache rooted at `cache_dir/<version>`
    pub fn new(config: CacheConfig) -> Self {
        let dir = config.cache_dir.join(&config.version);
        Self {
            config,
            http: reqwest::Client::new(),
            dir,
        }
    }

    /// Download the core manifest (all-or-error) and the optional
    /// manifest (best-effort)
    pub async fn precache(&self) -> Result<PrecacheReport> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("creating cache dir {:?}", self.dir))?;

        info!("Caching {} core assets...", self.config.core_assets.len());
        let mut core_cached = 0;
        for path in &self.config.core_assets {
            self.download(path)
                .await
                .with_context(|| format!("core asset {} failed to cache", path))?;
            core_cached += 1;
        }

        let mut optional_cached = 0;
        let mut optional_failed = 0;
        for path in &self.config.optional_assets {
            match self.download(path).await {
                Ok(_) => optional_cached += 1,
                Err(e) => {
                    warn!("Optional asset {} not cached: {}", path, e);
                    optional_failed += 1;
                }
            }
        }

        info!(
            "Precache complete: {} core, {} optional ({} skipped)",
            core_cached, optional_cached, optional_failed
        );
        Ok(PrecacheReport {
            core_cached,
            optional_cached,
            optional_failed,
        })
    }

    /// Serve an asset cache-first. A cache hit returns immediately and
    /// revalidates in the background; a miss goes to the network and
    /// caches the response.
    pub async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.cache_path(path);

        if let Ok(bytes) = tokio::fs::read(&file).await {
            debug!("Serving from cache: {}", path);

            let http = self.http.clone();
            let url = self.url_for(path);
            let stale_path = path.to_string();
            task::spawn(async move {
                match http.get(&url).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        if let Ok(fresh) = resp.bytes().await {
                            if let Err(e) = tokio::fs::write(&file, &fresh).await {
                                warn!("Revalidate write failed for {}: {}", stale_path, e);
                            }
                        }
                    }
                    Ok(resp) => debug!("Revalidate {} returned {}", stale_path, resp.status()),
                    Err(e) => debug!("Revalidate {} failed: {}", stale_path, e),
                }
            });

            return Ok(bytes);
        }

        debug!("Cache miss, fetching: {}", path);
        self.download(path).await
    }

    /// Remove cache directories from other versions
    pub fn activate(&self) -> Result<usize> {
        let mut removed = 0;
        let entries = match std::fs::read_dir(&self.config.cache_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(0),
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy() != self.config.version {
                info!("Deleting old cache: {:?}", name);
                if std::fs::remove_dir_all(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(anyhow!("{} returned {}", url, resp.status()));
        }
        let bytes = resp.bytes().await?.to_vec();

        let file = self.cache_path(path);
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, &bytes).await?;

        Ok(bytes)
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn cache_path(&self, path: &str) -> PathBuf {
        let mut file = self.dir.clone();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != "..") {
            file.push(part);
        }
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> CacheConfig {
        CacheConfig {
            cache_dir: dir.to_path_buf(),
            version: "v-test".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            core_assets: vec![],
            optional_assets: vec![],
        }
    }

    #[test]
    fn test_cache_path_rejects_traversal() {
        let cache = AssetCache::new(config(std::path::Path::new("/tmp/raksha-cache")));
        let path = cache.cache_path("/../../etc/passwd");
        assert!(path.starts_with("/tmp/raksha-cache/v-test"));
        assert!(!path.to_string_lossy().contains(".."));
    }

    #[test]
    fn test_url_join() {
        let cache = AssetCache::new(config(std::path::Path::new("/tmp/raksha-cache")));
        assert_eq!(cache.url_for("/index.html"), "http://127.0.0.1:1/index.html");
        assert_eq!(cache.url_for("index.html"), "http://127.0.0.1:1/index.html");
    }

    #[tokio::test]
    async fn test_fetch_serves_cached_copy_without_network() {
        let dir = std::env::temp_dir().join(format!("raksha-cache-{}", std::process::id()));
        let cache = AssetCache::new(config(&dir));

        let file = cache.cache_path("/app.js");
        tokio::fs::create_dir_all(file.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&file, b"cached body").await.unwrap();

        // base_url points at a closed port, so this only passes if the
        // cached copy is served.
        let body = cache.fetch("/app.js").await.unwrap();
        assert_eq!(body, b"cached body");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_activate_removes_old_versions() {
        let dir = std::env::temp_dir().join(format!("raksha-activate-{}", std::process::id()));
        std::fs::create_dir_all(dir.join("v-old")).unwrap();
        std::fs::create_dir_all(dir.join("v-test")).unwrap();

        let cache = AssetCache::new(config(&dir));
        let removed = cache.activate().unwrap();

        assert_eq!(removed, 1);
        assert!(!dir.join("v-old").exists());
        assert!(dir.join("v-test").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
