//! # Ranklake
//!
//! Domain Ranking Lake - maintains a local, append-only archive of daily
//! "top sites" ranking snapshots and answers per-domain questions over it.
//!
//! ## Features
//!
//! - **Bounded downloads**: concurrent fetches capped at a fixed number in flight
//! - **Columnar storage**: raw CSV snapshots converted once to ZSTD Parquet
//! - **One logical table**: every snapshot queryable as `raw(rank, domain, date)`
//! - **Immutable outputs**: per-domain yearly aggregates written once, never rewritten
//!
//! ## Modules
//!
//! - [`store`]: On-disk layout, dates and atomic writes
//! - [`ingest`]: Remote locators, fetchers and the bounded downloader
//! - [`convert`]: Raw to columnar conversion
//! - [`query`]: Embedded engine and domain/year extraction
//! - [`lake`]: Controller tying the stages together
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ranklake::config::Config;
//! use ranklake::lake::LakeController;
//! use ranklake::store::{DateRange, SnapshotDate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let mut lake = LakeController::create("/mnt/lake", "/mnt/lake-output", &config)?;
//!
//!     let range = DateRange::new("2024-01-01".parse()?, "2024-12-31".parse::<SnapshotDate>()?);
//!     println!("download: {}", lake.download(range).await);
//!     println!("convert: {}", lake.to_parquet(range));
//!
//!     let summary = lake.extract_all(&["example.com", "example.org"], 2024..=2024)?;
//!     println!("extract: {}", summary);
//!
//!     lake.close()?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod ingest;
pub mod lake;
pub mod query;
pub mod store;

pub use config::Config;
pub use lake::{LakeController, LakeError, LakeResult};
