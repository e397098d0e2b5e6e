//! Aggregation Query Engine
//!
//! Treats every columnar snapshot in the lake as one logical relation and
//! materialises per-domain yearly aggregates from it.
//!
//! - **engine**: `QueryEngine`, the owned DuckDB connection and `raw` view
//! - **extract**: `(domain, year)` aggregate shards
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use ranklake::query::QueryEngine;
//! use ranklake::store::SnapshotStore;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SnapshotStore::open("/mnt/lake", "/mnt/lake-output")?;
//!     let mut engine = QueryEngine::new(store);
//!
//!     let batches = engine.query("SELECT date, count(*) FROM raw GROUP BY date ORDER BY date")?;
//!     println!("{} batches", batches.len());
//!
//!     engine.extract_years("example.com", 2019..=2025)?;
//!     engine.reset();
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod extract;

pub use engine::{EngineSettings, QueryEngine};
pub use error::{QueryError, QueryResult};
pub use extract::{domain_year_sql, ExtractOutcome, ExtractSummary};
