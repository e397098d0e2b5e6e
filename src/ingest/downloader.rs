//! Download Orchestrator
//!
//! Ensures every date of a range has a raw or columnar snapshot locally.
//! Missing dates are fetched concurrently, never more than `max_in_flight`
//! at a time. Each payload is a single-entry zip; the first entry is written
//! as the raw snapshot.
//!
//! Nothing is persisted unless the whole body was fetched and the archive
//! extracted, so an interrupted or failed run leaves nothing to clean up.

use crate::ingest::fetcher::{FetchError, SnapshotFetcher};
use crate::ingest::ResourceLocator;
use crate::store::{DateRange, SnapshotDate, SnapshotStore, StoreError};
use serde::Serialize;
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default cap on simultaneous remote fetches
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

/// Upper bound on the buffer preallocated from an archive's declared entry size
const MAX_PREALLOC_BYTES: u64 = 64 * 1024 * 1024;

/// Result of ensuring one date is present locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Raw snapshot fetched and written
    Downloaded { bytes: u64 },
    /// Raw or columnar snapshot already present
    Skipped,
    /// Remote archive has no snapshot for this date
    RemoteGap { status: u16 },
    /// Network-level failure; retry on a future run
    TransportFailure,
    /// Payload was not a readable archive, or the local write failed
    Failed,
}

/// Tally of a download pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub downloaded: usize,
    pub skipped: usize,
    pub gaps: usize,
    pub transport_failures: usize,
    pub failed: usize,
}

impl DownloadSummary {
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded { .. } => self.downloaded += 1,
            DownloadOutcome::Skipped => self.skipped += 1,
            DownloadOutcome::RemoteGap { .. } => self.gaps += 1,
            DownloadOutcome::TransportFailure => self.transport_failures += 1,
            DownloadOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.gaps + self.transport_failures + self.failed
    }
}

impl std::fmt::Display for DownloadSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} downloaded, {} already present, {} gaps, {} transport failures, {} failed",
            self.downloaded, self.skipped, self.gaps, self.transport_failures, self.failed
        )
    }
}

#[derive(Error, Debug)]
enum PersistError {
    #[error("invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive has no entries")]
    EmptyArchive,

    #[error("failed to read archive entry: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to write snapshot: {0}")]
    Store(#[from] StoreError),
}

/// Bounded-concurrency downloader for raw snapshots
pub struct Downloader {
    store: SnapshotStore,
    fetcher: Arc<dyn SnapshotFetcher>,
    locator: Arc<dyn ResourceLocator>,
    max_in_flight: usize,
    slots: Arc<Semaphore>,
}

impl Downloader {
    pub fn new(
        store: SnapshotStore,
        fetcher: Arc<dyn SnapshotFetcher>,
        locator: Arc<dyn ResourceLocator>,
    ) -> Self {
        Self {
            store,
            fetcher,
            locator,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            slots: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
        }
    }

    /// Set the cap on simultaneous remote fetches (minimum 1)
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self.slots = Arc::new(Semaphore::new(self.max_in_flight));
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Ensure every date in the inclusive range is present locally.
    ///
    /// Per-date failures are soft: they are logged and counted, never returned.
    /// The in-flight cap is shared with every other call on this downloader.
    pub async fn download_range(&self, range: DateRange) -> DownloadSummary {
        let mut tasks = JoinSet::new();

        tracing::info!(
            source = self.locator.name(),
            days = range.len(),
            max_in_flight = self.max_in_flight,
            "Starting download pass {} .. {}",
            range.start,
            range.end
        );

        for date in range {
            let store = self.store.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let locator = Arc::clone(&self.locator);
            let semaphore = Arc::clone(&self.slots);

            tasks.spawn(async move {
                download_date(&store, fetcher.as_ref(), locator.as_ref(), &semaphore, date).await
            });
        }

        let mut summary = DownloadSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    tracing::error!("Download task aborted: {}", e);
                    summary.record(&DownloadOutcome::Failed);
                }
            }
        }

        tracing::info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            gaps = summary.gaps,
            transport_failures = summary.transport_failures,
            failed = summary.failed,
            "download done: {}",
            summary
        );

        summary
    }

    /// Ensure a single date is present locally
    pub async fn download_one(&self, date: SnapshotDate) -> DownloadOutcome {
        download_date(
            &self.store,
            self.fetcher.as_ref(),
            self.locator.as_ref(),
            &self.slots,
            date,
        )
        .await
    }
}

async fn download_date(
    store: &SnapshotStore,
    fetcher: &dyn SnapshotFetcher,
    locator: &dyn ResourceLocator,
    semaphore: &Semaphore,
    date: SnapshotDate,
) -> DownloadOutcome {
    let label = date.label();

    if store.has_snapshot(date) {
        tracing::debug!("{} already exists, skipping", label);
        return DownloadOutcome::Skipped;
    }

    let _permit = match semaphore.acquire().await {
        Ok(permit) => permit,
        Err(e) => {
            tracing::error!("{}: download slot unavailable: {}", label, e);
            return DownloadOutcome::Failed;
        }
    };

    let url = locator.locate(date);
    let body = match fetcher.fetch(&url).await {
        Ok(body) => body,
        Err(FetchError::RemoteGap { status }) => {
            tracing::warn!("{}: HTTP {}, likely gap in data", label, status);
            return DownloadOutcome::RemoteGap { status };
        }
        Err(FetchError::Transport(e)) => {
            tracing::error!("{}: request failed: {}", label, e);
            return DownloadOutcome::TransportFailure;
        }
    };

    let store = store.clone();
    let persisted = tokio::task::spawn_blocking(move || persist_snapshot(&store, date, &body)).await;

    match persisted {
        Ok(Ok(bytes)) => {
            tracing::info!("{}: downloaded ({} bytes)", label, bytes);
            DownloadOutcome::Downloaded { bytes }
        }
        Ok(Err(e)) => {
            tracing::error!("{}: {}", label, e);
            DownloadOutcome::Failed
        }
        Err(e) => {
            tracing::error!("{}: extraction task aborted: {}", label, e);
            DownloadOutcome::Failed
        }
    }
}

fn persist_snapshot(store: &SnapshotStore, date: SnapshotDate, body: &[u8]) -> Result<u64, PersistError> {
    let contents = extract_first_entry(body)?;
    Ok(store.write_raw(date, &contents)?)
}

/// Bytes of the first entry of a zip archive
fn extract_first_entry(body: &[u8]) -> Result<Vec<u8>, PersistError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(body))?;
    if archive.len() == 0 {
        return Err(PersistError::EmptyArchive);
    }

    let mut entry = archive.by_index(0)?;
    let mut contents = Vec::with_capacity(prealloc_hint(entry.size()));
    entry.read_to_end(&mut contents)?;
    Ok(contents)
}

/// The declared size comes from the archive header and is not trusted
fn prealloc_hint(declared: u64) -> usize {
    declared.min(MAX_PREALLOC_BYTES) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::CiscoUmbrellaLocator;
    use crate::store::temp_path;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    enum MockReply {
        Status(u16),
        Transport,
        Body(Vec<u8>),
    }

    /// Fetcher that records how many fetches are in flight at once
    #[derive(Default)]
    struct MockFetcher {
        replies: HashMap<String, MockReply>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl MockFetcher {
        fn reply(mut self, date: &str, reply: MockReply) -> Self {
            self.replies.insert(date.to_string(), reply);
            self
        }
    }

    #[async_trait]
    impl SnapshotFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(10)).await;

            let date = url.trim_start_matches("mock://");
            let result = match self.replies.get(date) {
                Some(MockReply::Status(status)) => Err(FetchError::RemoteGap { status: *status }),
                Some(MockReply::Transport) => Err(FetchError::Transport("timeout".to_string())),
                Some(MockReply::Body(body)) => Ok(body.clone()),
                None => Ok(zip_payload(&format!("1,{}.example.com\n", date))),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn zip_payload(csv: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("top-1m.csv", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(csv.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    fn empty_zip() -> Vec<u8> {
        zip::ZipWriter::new(Cursor::new(Vec::new()))
            .finish()
            .unwrap()
            .into_inner()
    }

    fn date(s: &str) -> SnapshotDate {
        s.parse().unwrap()
    }

    fn create_test_downloader(
        fetcher: Arc<MockFetcher>,
    ) -> (Downloader, SnapshotStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("lake"), dir.path().join("out")).unwrap();
        let locator = Arc::new(CiscoUmbrellaLocator::with_template("mock://{date}"));
        let downloader = Downloader::new(store.clone(), fetcher, locator);
        (downloader, store, dir)
    }

    #[tokio::test]
    async fn test_in_flight_fetches_never_exceed_cap() {
        let fetcher = Arc::new(MockFetcher::default());
        let (downloader, store, _dir) = create_test_downloader(Arc::clone(&fetcher));
        let downloader = downloader.with_max_in_flight(4);

        let range = DateRange::new(date("2024-01-01"), date("2024-01-20"));
        let summary = downloader.download_range(range).await;

        assert_eq!(summary.downloaded, 20);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 20);
        let max = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 4, "observed {} concurrent fetches", max);
        assert!(max > 1, "fetches were not concurrent");

        let contents = std::fs::read_to_string(store.raw_path(date("2024-01-07"))).unwrap();
        assert_eq!(contents, "1,2024-01-07.example.com\n");
    }

    #[tokio::test]
    async fn test_second_pass_is_a_no_op() {
        let fetcher = Arc::new(MockFetcher::default());
        let (downloader, store, _dir) = create_test_downloader(Arc::clone(&fetcher));
        let range = DateRange::new(date("2024-03-01"), date("2024-03-05"));

        let first = downloader.download_range(range).await;
        let before = std::fs::read(store.raw_path(date("2024-03-03"))).unwrap();

        let second = downloader.download_range(range).await;
        let after = std::fs::read(store.raw_path(date("2024-03-03"))).unwrap();

        assert_eq!(first.downloaded, 5);
        assert_eq!(second.skipped, 5);
        assert_eq!(second.downloaded, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_remote_failures_are_soft_and_leave_no_file() {
        let fetcher = Arc::new(
            MockFetcher::default()
                .reply("2024-05-02", MockReply::Status(404))
                .reply("2024-05-03", MockReply::Transport)
                .reply("2024-05-04", MockReply::Body(b"not a zip".to_vec()))
                .reply("2024-05-05", MockReply::Body(empty_zip())),
        );
        let (downloader, store, _dir) = create_test_downloader(Arc::clone(&fetcher));

        let range = DateRange::new(date("2024-05-01"), date("2024-05-05"));
        let summary = downloader.download_range(range).await;

        assert_eq!(
            summary,
            DownloadSummary {
                downloaded: 1,
                skipped: 0,
                gaps: 1,
                transport_failures: 1,
                failed: 2,
            }
        );
        assert_eq!(summary.total(), 5);

        for d in ["2024-05-02", "2024-05-03", "2024-05-04", "2024-05-05"] {
            let path = store.raw_path(date(d));
            assert!(!path.exists(), "{} should not exist", d);
            assert!(!temp_path(&path).exists());
        }
        assert!(store.has_raw(date("2024-05-01")));
    }

    #[tokio::test]
    async fn test_existing_columnar_snapshot_is_not_refetched() {
        let fetcher = Arc::new(MockFetcher::default());
        let (downloader, store, _dir) = create_test_downloader(Arc::clone(&fetcher));
        let d = date("2023-12-31");

        crate::store::write_atomic(&store.columnar_path(d), b"PAR1").unwrap();

        assert_eq!(downloader.download_one(d).await, DownloadOutcome::Skipped);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(!store.has_raw(d));
    }

    #[tokio::test]
    async fn test_single_date_calls_share_the_cap() {
        let fetcher = Arc::new(MockFetcher::default());
        let (downloader, _store, _dir) = create_test_downloader(Arc::clone(&fetcher));
        let downloader = downloader.with_max_in_flight(2);

        let outcomes = tokio::join!(
            downloader.download_one(date("2024-07-01")),
            downloader.download_one(date("2024-07-02")),
            downloader.download_one(date("2024-07-03")),
            downloader.download_one(date("2024-07-04")),
            downloader.download_one(date("2024-07-05")),
            downloader.download_one(date("2024-07-06")),
        );

        assert!(matches!(outcomes.0, DownloadOutcome::Downloaded { .. }));
        assert!(matches!(outcomes.5, DownloadOutcome::Downloaded { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 6);
        let max = fetcher.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 2, "observed {} concurrent fetches", max);
    }

    #[test]
    fn test_declared_entry_size_is_capped() {
        assert_eq!(prealloc_hint(8), 8);
        assert_eq!(prealloc_hint(u32::MAX as u64), MAX_PREALLOC_BYTES as usize);
        assert_eq!(prealloc_hint(u64::MAX), MAX_PREALLOC_BYTES as usize);
    }

    #[test]
    fn test_extract_takes_first_entry() {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("first.csv", options).unwrap();
        writer.write_all(b"1,a.com\n").unwrap();
        writer.start_file("second.csv", options).unwrap();
        writer.write_all(b"1,b.com\n").unwrap();
        let body = writer.finish().unwrap().into_inner();

        assert_eq!(extract_first_entry(&body).unwrap(), b"1,a.com\n");
    }
}
