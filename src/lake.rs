//! Lake controller
//!
//! Ties the snapshot store, downloader, converter and query engine together
//! behind one owned handle. Stages are ordered by the caller:
//!
//! ```text
//! download(range) -> to_parquet(range) -> extract_all(domains, years)
//! ```
//!
//! Every stage skips work that is already on disk, so repeating or
//! reordering calls is safe.

use crate::config::{Config, ConfigError};
use crate::convert::{ConvertSummary, Converter};
use crate::ingest::{
    CiscoUmbrellaLocator, DownloadSummary, Downloader, FetchError, HttpFetcher, ResourceLocator,
    SnapshotFetcher,
};
use crate::query::{ExtractSummary, QueryEngine, QueryError};
use crate::store::{DateRange, SnapshotStore, StoreError};
use duckdb::arrow::record_batch::RecordBatch;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the controller
#[derive(Error, Debug)]
pub enum LakeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for controller operations
pub type LakeResult<T> = Result<T, LakeError>;

/// Owned handle over one lake root and its output directory
pub struct LakeController {
    store: SnapshotStore,
    downloader: Downloader,
    converter: Converter,
    engine: QueryEngine,
}

impl LakeController {
    /// Open a lake fetching from the configured HTTP source
    pub fn create(
        root: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        config: &Config,
    ) -> LakeResult<Self> {
        let fetcher = HttpFetcher::new(&config.download.http())?;
        let locator = CiscoUmbrellaLocator::with_template(config.download.url_template.clone());
        let store = SnapshotStore::open(root, output_dir)?;

        Ok(Self::with_source(
            store,
            Arc::new(fetcher),
            Arc::new(locator),
            config,
        ))
    }

    /// Open a lake over an explicit fetcher and locator
    pub fn with_source(
        store: SnapshotStore,
        fetcher: Arc<dyn SnapshotFetcher>,
        locator: Arc<dyn ResourceLocator>,
        config: &Config,
    ) -> Self {
        tracing::info!(
            root = ?store.root(),
            output = ?store.output_dir(),
            source = locator.name(),
            "Opening lake"
        );

        let downloader = Downloader::new(store.clone(), fetcher, locator)
            .with_max_in_flight(config.download.max_in_flight);
        let converter = Converter::new(store.clone());
        let engine = QueryEngine::with_settings(store.clone(), config.query.engine_settings());

        Self {
            store,
            downloader,
            converter,
            engine,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Fetch every missing snapshot in the range
    pub async fn download(&self, range: DateRange) -> DownloadSummary {
        self.downloader.download_range(range).await
    }

    /// Convert every raw snapshot in the range to columnar form
    pub fn to_parquet(&self, range: DateRange) -> ConvertSummary {
        self.converter.convert_range(range)
    }

    /// Run a read query against the `raw` view
    pub fn query(&mut self, sql: &str) -> LakeResult<Vec<RecordBatch>> {
        Ok(self.engine.query(sql)?)
    }

    /// Drop the engine connection; the next query rebuilds the view
    pub fn reset_connection(&mut self) {
        self.engine.reset();
    }

    /// True if the `(domain, year)` shard already exists
    pub fn contains(&self, domain: &str, year: i32) -> LakeResult<bool> {
        Ok(self.engine.contains(domain, year)?)
    }

    /// Materialise missing shards for one domain
    pub fn extract(&mut self, domain: &str, years: RangeInclusive<i32>) -> LakeResult<ExtractSummary> {
        Ok(self.engine.extract_years(domain, years)?)
    }

    /// Materialise missing shards for each domain, resetting the engine
    /// connection after every domain
    pub fn extract_all<S: AsRef<str>>(
        &mut self,
        domains: &[S],
        years: RangeInclusive<i32>,
    ) -> LakeResult<ExtractSummary> {
        let mut total = ExtractSummary::default();

        for domain in domains {
            let summary = self.extract(domain.as_ref(), years.clone())?;
            total.merge(summary);
            self.engine.reset();
        }

        tracing::info!(
            domains = domains.len(),
            written = total.written,
            skipped = total.skipped,
            "extract_all done"
        );
        Ok(total)
    }

    /// Close the engine connection, surfacing any error
    pub fn close(mut self) -> LakeResult<()> {
        Ok(self.engine.close()?)
    }
}
