//! The top-level generation run.
//!
//! A run validates the request, groups the records, fetches every image
//! into a private scratch directory, lays out the pages and serializes the
//! document. The scratch directory is owned by the run and removed on every
//! exit path; the terminal progress state is set exactly once, by [`CatalogEngine::run`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use reqwest::Client;
use serde::Serialize;
use tempfile::TempDir;

use crate::catalog::data::{records_from_table, CatalogMode};
use crate::catalog::library::group_records;
use crate::catalog::settings::CatalogSettings;
use crate::error::{CatalogError, CatalogResult};
use crate::images::cache::ImageCache;
use crate::images::fetch::build_client;
use crate::progress::{Coordinator, Phase, BUILD_START, FETCH_START, FINALIZE_START};
use crate::render::layout::build_blocks;
use crate::render::pdf::render_document;

/// Percent reported once the run has been accepted
const STARTED: u8 = 5;
const SCRATCH_PREFIX: &str = "pdf_gen_";

/// What to generate
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CatalogRequest {
    pub mode: CatalogMode,
    /// Category paths or author names, depending on the mode
    pub selection: Option<Vec<String>>,
}

impl CatalogRequest {
    pub fn new(mode: CatalogMode) -> Self {
        Self {
            mode,
            selection: None,
        }
    }

    pub fn with_selection<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(items.into_iter().map(Into::into).collect());
        self
    }

    /// Filtered modes need at least one non-blank selected item
    pub fn validate(&self) -> CatalogResult<()> {
        if !self.mode.requires_selection() {
            return Ok(());
        }
        match &self.selection {
            Some(items) if items.iter().any(|item| !item.trim().is_empty()) => Ok(()),
            _ => Err(CatalogError::NoSelection(self.mode.selection_noun())),
        }
    }

    fn selection(&self) -> Option<&[String]> {
        match self.mode {
            CatalogMode::Full => None,
            CatalogMode::Category | CatalogMode::Author => self.selection.as_deref(),
        }
    }

    /// `catalog_{categories|authors|full}_{YYYYmmdd_HHMMSS}.pdf`
    pub fn default_file_name<Tz>(&self, at: &DateTime<Tz>) -> String
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "catalog_{}_{}.pdf",
            self.mode.file_stem(),
            at.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Summary of a finished run
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub output: PathBuf,
    pub groups: usize,
    /// Cells placed; a record in two groups counts twice
    pub placements: usize,
    /// Images fetched and cached
    pub images: usize,
    /// Images replaced by the placeholder after a failed fetch
    pub failures: usize,
    pub pages: usize,
}

/// Runs catalog generations with one shared HTTP client
#[derive(Debug, Clone)]
pub struct CatalogEngine {
    client: Client,
    settings: CatalogSettings,
}

impl CatalogEngine {
    pub fn new(settings: CatalogSettings) -> CatalogResult<Self> {
        settings.validate()?;
        let client = build_client(&settings.fetch)?;
        Ok(Self { client, settings })
    }

    /// Share an existing connection pool
    pub fn with_client(client: Client, settings: CatalogSettings) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &CatalogSettings {
        &self.settings
    }

    /// Generate one catalog into `output` and record the terminal state.
    ///
    /// `Complete` carries the output path; failures and cancellation keep
    /// the last percent and carry the error message.
    pub async fn run(
        &self,
        table: &[Vec<String>],
        request: &CatalogRequest,
        output: &Path,
        coordinator: &Coordinator,
    ) -> CatalogResult<RunReport> {
        match self.generate(table, request, output, coordinator).await {
            Ok(report) => {
                tracing::info!(
                    path = %report.output.display(),
                    groups = report.groups,
                    pages = report.pages,
                    failures = report.failures,
                    "catalog ready"
                );
                coordinator.complete(report.output.clone(), "Catalog Ready!");
                Ok(report)
            }
            Err(err) => {
                if err.is_cancellation() {
                    tracing::info!("catalog generation cancelled");
                } else {
                    tracing::error!(error = %err, "catalog generation failed");
                }
                coordinator.finish_with(&err);
                Err(err)
            }
        }
    }

    async fn generate(
        &self,
        table: &[Vec<String>],
        request: &CatalogRequest,
        output: &Path,
        coordinator: &Coordinator,
    ) -> CatalogResult<RunReport> {
        let settings = &self.settings;
        coordinator.enter(Phase::Starting, STARTED, "Initializing...");
        request.validate()?;

        let records = records_from_table(table);
        let grouped = group_records(&records, request.mode, request.selection(), &settings.labels)?;
        tracing::info!(
            mode = ?request.mode,
            records = records.len(),
            groups = grouped.groups.len(),
            "records grouped"
        );
        coordinator.checkpoint()?;

        // Dropped on every exit path below, taking cached images with it
        let scratch = self.scratch_dir()?;
        let mut cache = ImageCache::new(scratch.path(), settings);

        let urls = grouped.image_sources();
        coordinator.enter(
            Phase::Fetching,
            FETCH_START,
            format!("Fetching {} images in parallel...", urls.len()),
        );
        cache
            .fetch_all(&self.client, &urls, &settings.fetch, coordinator)
            .await?;

        coordinator.enter(Phase::Building, BUILD_START, "Building catalog pages...");
        let blocks = build_blocks(&grouped, &mut cache, settings, coordinator).await?;
        coordinator.checkpoint()?;

        coordinator.enter(Phase::Finalizing, FINALIZE_START, "Finalizing PDF...");
        let title = settings.labels.title.clone();
        let layout = settings.layout.clone();
        let path = output.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || {
            render_document(&title, &blocks, &layout, &path)
        })
        .await??;

        Ok(RunReport {
            output: output.to_path_buf(),
            groups: grouped.groups.len(),
            placements: grouped.placements(),
            images: cache.len(),
            failures: cache.failures(),
            pages,
        })
    }

    fn scratch_dir(&self) -> CatalogResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.settings.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(CatalogError::TempStorage)?;
        tracing::debug!(path = %dir.path().display(), "created scratch directory");
        Ok(dir)
    }
}
