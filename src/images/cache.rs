use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Client;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use super::fetch::fetch_bytes;
use super::normalize::{normalize_to_file, write_placeholder, ImageSpec};
use crate::catalog::data::normalize_image_url;
use crate::catalog::settings::{CatalogSettings, FetchSettings};
use crate::color::Swatch;
use crate::error::{CatalogResult, FetchError};
use crate::progress::{band_percent, Coordinator, BUILD_START, FETCH_START};

const PLACEHOLDER_FILE: &str = "placeholder.jpg";

/// Per-run mapping from image URL to a normalized JPEG on disk
///
/// Lives in the run's scratch directory and goes away with it.
#[derive(Debug)]
pub struct ImageCache {
    dir: PathBuf,
    spec: ImageSpec,
    placeholder_color: Swatch,
    placeholder_quality: u8,
    entries: HashMap<String, PathBuf>,
    placeholder: Option<PathBuf>,
    failures: usize,
    issued: usize,
}

/// Outcome of one pooled fetch
type FetchOutcome = (String, Result<PathBuf, FetchError>);

impl ImageCache {
    pub fn new(dir: &Path, settings: &CatalogSettings) -> Self {
        Self {
            dir: dir.to_path_buf(),
            spec: ImageSpec::from_settings(&settings.layout, &settings.fetch),
            placeholder_color: Swatch::from_hex(&settings.fetch.placeholder_color)
                .unwrap_or(Swatch::rgb(0xF0, 0xF0, 0xF0)),
            placeholder_quality: settings.fetch.placeholder_quality,
            entries: HashMap::new(),
            placeholder: None,
            failures: 0,
            issued: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of URLs with a cached image
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of URLs that fell back to the placeholder
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn get(&self, url: &str) -> Option<&Path> {
        self.entries.get(url).map(PathBuf::as_path)
    }

    /// The placeholder image, written on first use
    pub fn placeholder(&mut self) -> CatalogResult<PathBuf> {
        if let Some(path) = &self.placeholder {
            return Ok(path.clone());
        }
        let path = self.dir.join(PLACEHOLDER_FILE);
        let spec = ImageSpec {
            quality: self.placeholder_quality,
            ..self.spec
        };
        write_placeholder(spec, self.placeholder_color, &path)?;
        tracing::debug!(path = %path.display(), "created placeholder image");
        self.placeholder = Some(path.clone());
        Ok(path)
    }

    /// Image file for a raw image cell: the cached copy, else the placeholder
    pub fn resolve(&mut self, image_cell: &str) -> CatalogResult<PathBuf> {
        let cached = normalize_image_url(image_cell)
            .and_then(|url| self.entries.get(&url).cloned())
            .filter(|path| path.exists());
        match cached {
            Some(path) => Ok(path),
            None => self.placeholder(),
        }
    }

    /// Fetch every URL not cached yet with a bounded worker pool
    ///
    /// Individual failures are logged and leave the URL uncached. The cancel
    /// probe is polled after every completion; once it fires no further
    /// request or retry is issued. Requests already sent finish or time out,
    /// and the pool is joined before returning.
    pub async fn fetch_all(
        &mut self,
        client: &Client,
        urls: &[String],
        settings: &FetchSettings,
        coordinator: &Coordinator,
    ) -> CatalogResult<()> {
        let mut pending: Vec<&String> = urls
            .iter()
            .filter(|url| !self.entries.contains_key(url.as_str()))
            .collect();
        pending.sort();
        pending.dedup();
        let total = pending.len();
        if total == 0 {
            return Ok(());
        }

        let permits = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut workers: JoinSet<FetchOutcome> = JoinSet::new();
        for url in pending {
            let url = url.clone();
            let client = client.clone();
            let settings = settings.clone();
            let permits = permits.clone();
            let mut stop = stop_rx.clone();
            let path = self.dir.join(format!("img_{:05}.jpg", self.issued));
            self.issued += 1;
            let spec = self.spec;
            workers.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => {
                        fetch_to_file(&client, &url, &settings, &mut stop, spec, path).await
                    }
                    Err(_) => Err(FetchError::Stopped),
                };
                (url, result)
            });
        }
        tokio::task::yield_now().await;

        let mut done = 0;
        while let Some(joined) = workers.join_next().await {
            tokio::task::yield_now().await;
            if let Err(err) = coordinator.checkpoint() {
                // Queued workers see a closed pool; in-flight ones see the stop flag
                permits.close();
                stop_tx.send_replace(true);
                while workers.join_next().await.is_some() {}
                return Err(err);
            }
            done += 1;
            match joined {
                Ok((url, Ok(path))) => {
                    self.entries.insert(url, path);
                }
                Ok((url, Err(err))) => {
                    self.failures += 1;
                    tracing::warn!(url = %truncate_url(&url), error = %err, "image fetch failed, using placeholder");
                }
                Err(err) => {
                    self.failures += 1;
                    tracing::warn!(error = %err, "image worker died, using placeholder");
                }
            }
            if done % settings.report_every.max(1) == 0 || done == total {
                coordinator.report(
                    band_percent(FETCH_START, BUILD_START, done, total),
                    format!("Fetched {}/{} images", done, total),
                );
            }
        }

        tracing::info!(
            cached = self.entries.len(),
            failed = self.failures,
            "image fetch finished"
        );
        Ok(())
    }
}

async fn fetch_to_file(
    client: &Client,
    url: &str,
    settings: &FetchSettings,
    stop: &mut watch::Receiver<bool>,
    spec: ImageSpec,
    path: PathBuf,
) -> Result<PathBuf, FetchError> {
    let bytes = fetch_bytes(client, url, settings, stop).await?;
    // Decoding and resizing is CPU-bound
    tokio::task::spawn_blocking(move || {
        normalize_to_file(&bytes, spec, &path)?;
        Ok::<_, FetchError>(path)
    })
    .await?
}

fn truncate_url(url: &str) -> String {
    url.chars().take(50).collect()
}
