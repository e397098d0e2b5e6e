//! Raw-to-Columnar Converter
//!
//! Turns raw `DD.csv` snapshots into ZSTD-compressed `DD.parquet` files.
//!
//! ```text
//!   DD.csv → parse (rank: i32, domain: utf8) → DD.parquet.tmp → rename → delete DD.csv
//! ```
//!
//! The raw file is only deleted after the columnar file has been committed,
//! and a failed conversion leaves the raw file untouched with no partial
//! columnar output. Re-running over an already converted range does no work.

mod error;

pub use error::{ConvertError, ConvertResult};

use crate::store::{temp_path, DateRange, SnapshotDate, SnapshotStore};
use arrow::array::{ArrayRef, Int32Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

/// Rows buffered per Arrow record batch
pub const DEFAULT_BATCH_ROWS: usize = 64 * 1024;

/// Schema shared by raw and columnar snapshots
pub fn snapshot_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("rank", DataType::Int32, false),
        Field::new("domain", DataType::Utf8, false),
    ]))
}

/// Result of converting a single date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertOutcome {
    /// Columnar file written and raw source removed
    Converted { rows: usize },
    /// Columnar file already present
    Skipped,
    /// Neither representation exists (expected gap)
    Missing,
    /// Raw file present but could not be converted; left in place
    Failed,
}

/// Tally of a conversion pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConvertSummary {
    pub converted: usize,
    pub skipped: usize,
    pub missing: usize,
    pub failed: usize,
}

impl ConvertSummary {
    pub fn record(&mut self, outcome: ConvertOutcome) {
        match outcome {
            ConvertOutcome::Converted { .. } => self.converted += 1,
            ConvertOutcome::Skipped => self.skipped += 1,
            ConvertOutcome::Missing => self.missing += 1,
            ConvertOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.converted + self.skipped + self.missing + self.failed
    }
}

impl std::fmt::Display for ConvertSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} converted, {} already parquet, {} missing, {} failed",
            self.converted, self.skipped, self.missing, self.failed
        )
    }
}

/// Converts raw snapshots in a store to columnar form
#[derive(Debug, Clone)]
pub struct Converter {
    store: SnapshotStore,
    batch_rows: usize,
}

impl Converter {
    pub fn new(store: SnapshotStore) -> Self {
        Self {
            store,
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    /// Set the number of rows per record batch (minimum 1)
    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    /// Convert every date in the inclusive range, one at a time
    pub fn convert_range(&self, range: DateRange) -> ConvertSummary {
        let mut summary = ConvertSummary::default();

        for date in range {
            summary.record(self.convert_one(date));
        }

        tracing::info!(
            converted = summary.converted,
            skipped = summary.skipped,
            missing = summary.missing,
            failed = summary.failed,
            "to_parquet done: {}",
            summary
        );

        summary
    }

    /// Convert a single date
    pub fn convert_one(&self, date: SnapshotDate) -> ConvertOutcome {
        let label = date.label();
        let raw_path = self.store.raw_path(date);
        let columnar_path = self.store.columnar_path(date);

        if columnar_path.is_file() {
            tracing::debug!("{}.parquet already exists", label);
            // A raw file next to a committed columnar file is a leftover from
            // an interrupted delete.
            if raw_path.is_file() {
                if let Err(e) = self.store.remove_raw(date) {
                    tracing::error!("{}: failed to remove leftover csv: {}", label, e);
                }
            }
            return ConvertOutcome::Skipped;
        }

        if !raw_path.is_file() {
            tracing::warn!("{}.csv does not exist", label);
            return ConvertOutcome::Missing;
        }

        let tmp_path = temp_path(&columnar_path);
        let committed = write_columnar(&raw_path, &tmp_path, self.batch_rows).and_then(|rows| {
            fs::rename(&tmp_path, &columnar_path)?;
            Ok(rows)
        });

        let rows = match committed {
            Ok(rows) => rows,
            Err(e) => {
                let _ = fs::remove_file(&tmp_path);
                tracing::error!("{}: failed to convert: {}", label, e);
                return ConvertOutcome::Failed;
            }
        };

        if let Err(e) = self.store.remove_raw(date) {
            tracing::error!("{}: converted but failed to remove csv: {}", label, e);
        }

        tracing::debug!("{}: converted to parquet ({} rows)", label, rows);
        ConvertOutcome::Converted { rows }
    }
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

/// Parse `src` under the snapshot schema and write it to `dest` as Parquet.
/// Returns the number of rows written.
fn write_columnar(src: &Path, dest: &Path, batch_rows: usize) -> ConvertResult<usize> {
    let schema = snapshot_schema();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(src)?;

    let file = File::create(dest)?;
    let mut writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(writer_properties()))?;
    let mut ranks = Int32Builder::with_capacity(batch_rows);
    let mut domains = StringBuilder::new();
    let mut buffered = 0;
    let mut rows = 0;

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 1;
        let record = record.map_err(|e| ConvertError::SchemaViolation {
            line,
            reason: e.to_string(),
        })?;
        let (rank, domain) =
            parse_record(&record).map_err(|reason| ConvertError::SchemaViolation { line, reason })?;

        ranks.append_value(rank);
        domains.append_value(domain);
        buffered += 1;
        rows += 1;

        if buffered >= batch_rows {
            flush_batch(&mut writer, &schema, &mut ranks, &mut domains)?;
            buffered = 0;
        }
    }

    if buffered > 0 {
        flush_batch(&mut writer, &schema, &mut ranks, &mut domains)?;
    }

    writer.close()?;
    Ok(rows)
}

fn parse_record(record: &csv::StringRecord) -> Result<(i32, &str), String> {
    if record.len() != 2 {
        return Err(format!("expected 2 fields (rank, domain), found {}", record.len()));
    }

    let rank = record[0]
        .parse::<i32>()
        .map_err(|e| format!("rank {:?} is not a 32-bit integer: {}", &record[0], e))?;

    Ok((rank, &record[1]))
}

fn flush_batch(
    writer: &mut ArrowWriter<File>,
    schema: &Arc<Schema>,
    ranks: &mut Int32Builder,
    domains: &mut StringBuilder,
) -> ConvertResult<()> {
    let columns: Vec<ArrayRef> = vec![Arc::new(ranks.finish()), Arc::new(domains.finish())];
    let batch = RecordBatch::try_new(Arc::clone(schema), columns)?;
    writer.write(&batch)?;
    Ok(())
}
