//! Snapshot Store
//!
//! Date keys and the on-disk layout of the lake:
//!
//! - **types**: `SnapshotDate`, `DateRange`
//! - **layout**: `SnapshotStore` path layout, existence checks, atomic commits
//! - **error**: Error types
//!
//! # Lifecycle of a snapshot
//!
//! ```text
//!   (absent) → download → DD.csv → convert → DD.parquet
//! ```
//!
//! Once `DD.parquet` exists the raw file is gone and the snapshot is never
//! touched again.

pub mod error;
pub mod layout;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use layout::{
    temp_path, write_atomic, SnapshotState, SnapshotStore, COLUMNAR_EXT, RAW_EXT,
};
pub use types::{DateRange, DateRangeIter, SnapshotDate};
