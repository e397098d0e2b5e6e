//! Snapshot Ingest
//!
//! Populates the lake with raw daily snapshots from a remote archive:
//! - `ResourceLocator`: maps a date to the remote URL of its snapshot
//! - `SnapshotFetcher`: retrieves the bytes behind a URL (HTTP in production)
//! - `Downloader`: bounded-concurrency download pass over a date range

mod downloader;
mod fetcher;

pub use downloader::{DownloadOutcome, DownloadSummary, Downloader};
pub use fetcher::{FetchError, HttpFetcher, HttpFetcherConfig, SnapshotFetcher};

use crate::store::SnapshotDate;

/// Default location of the Cisco Umbrella top-1m daily archive
pub const CISCO_UMBRELLA_TEMPLATE: &str =
    "http://s3-us-west-1.amazonaws.com/umbrella-static/top-1m-{date}.csv.zip";

/// Given a date, produce the remote locator of its snapshot
pub trait ResourceLocator: Send + Sync {
    /// Short name used in log lines
    fn name(&self) -> &str;

    /// URL of the snapshot for `date`
    fn locate(&self, date: SnapshotDate) -> String;
}

/// Cisco Umbrella daily top-1m lists, one zip per day.
///
/// The template's `{date}` placeholder is replaced by `YYYY-MM-DD`.
#[derive(Debug, Clone)]
pub struct CiscoUmbrellaLocator {
    template: String,
}

impl Default for CiscoUmbrellaLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl CiscoUmbrellaLocator {
    pub fn new() -> Self {
        Self::with_template(CISCO_UMBRELLA_TEMPLATE)
    }

    /// Use a mirror or alternative bucket
    pub fn with_template(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl ResourceLocator for CiscoUmbrellaLocator {
    fn name(&self) -> &str {
        "cisco-umbrella"
    }

    fn locate(&self, date: SnapshotDate) -> String {
        self.template.replace("{date}", &date.iso())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cisco_umbrella_url() {
        let locator = CiscoUmbrellaLocator::new();
        let date = SnapshotDate::from_ymd(2025, 2, 1).unwrap();

        assert_eq!(
            locator.locate(date),
            "http://s3-us-west-1.amazonaws.com/umbrella-static/top-1m-2025-02-01.csv.zip"
        );
    }

    #[test]
    fn test_custom_template() {
        let locator = CiscoUmbrellaLocator::with_template("http://mirror.local/{date}.zip");
        let date = SnapshotDate::from_ymd(2019, 12, 31).unwrap();

        assert_eq!(locator.locate(date), "http://mirror.local/2019-12-31.zip");
    }
}
