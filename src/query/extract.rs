//! Domain/year extraction
//!
//! For a target domain and a span of years, materialise one shard per year:
//!
//! ```text
//! {output}/{domain}/{year}.parquet
//!   date DATE, best_rank INTEGER, num_subdomains BIGINT
//! ```
//!
//! A row is counted for `example.com` when its domain equals `example.com`
//! or matches `LIKE '%.example.com'`. Existing shards are authoritative and
//! never rewritten; they are checked before the engine is touched.

use crate::query::engine::{sql_literal, QueryEngine};
use crate::query::error::{QueryError, QueryResult};
use crate::store::{temp_path, DateRange};
use serde::Serialize;
use std::fs;
use std::ops::RangeInclusive;

/// Result of extracting one `(domain, year)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Shard written
    Written,
    /// Shard already present; engine not queried
    Skipped,
}

/// Tally of an extraction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExtractSummary {
    pub written: usize,
    pub skipped: usize,
}

impl ExtractSummary {
    pub fn record(&mut self, outcome: ExtractOutcome) {
        match outcome {
            ExtractOutcome::Written => self.written += 1,
            ExtractOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: ExtractSummary) {
        self.written += other.written;
        self.skipped += other.skipped;
    }
}

impl std::fmt::Display for ExtractSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} written, {} already present", self.written, self.skipped)
    }
}

/// Aggregate query for one `(domain, year)`: best rank and row count per day
pub fn domain_year_sql(domain: &str, days: DateRange) -> String {
    format!(
        "SELECT date, min(rank) AS best_rank, count(*) AS num_subdomains
         FROM raw
         WHERE date BETWEEN DATE {start} AND DATE {end}
           AND (domain = {exact} OR domain LIKE {suffix})
         GROUP BY date
         ORDER BY date",
        start = sql_literal(&days.start.iso()),
        end = sql_literal(&days.end.iso()),
        exact = sql_literal(domain),
        suffix = sql_literal(&format!("%.{}", domain)),
    )
}

impl QueryEngine {
    /// True if the shard for `(domain, year)` is already materialised
    pub fn contains(&self, domain: &str, year: i32) -> QueryResult<bool> {
        Ok(self.store().has_shard(domain, year)?)
    }

    /// Materialise the shard for a single `(domain, year)` unless present
    pub fn extract_year(&mut self, domain: &str, year: i32) -> QueryResult<ExtractOutcome> {
        let shard = self.store().shard_path(domain, year)?;

        if shard.is_file() {
            tracing::debug!("{}/{} already extracted", domain, year);
            return Ok(ExtractOutcome::Skipped);
        }

        let days = DateRange::year(year).ok_or(QueryError::InvalidYearRange {
            start: year,
            end: year,
        })?;

        if let Some(parent) = shard.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(&shard);
        let copy = format!(
            "COPY ({}) TO {} (FORMAT PARQUET, COMPRESSION ZSTD)",
            domain_year_sql(domain, days),
            sql_literal(&tmp.to_string_lossy())
        );

        let committed = self
            .execute(&copy)
            .and_then(|_| fs::rename(&tmp, &shard).map_err(QueryError::from));

        if let Err(e) = committed {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        tracing::info!("{}/{}: extracted", domain, year);
        Ok(ExtractOutcome::Written)
    }

    /// Materialise every missing shard for `domain` over an inclusive span of years
    pub fn extract_years(
        &mut self,
        domain: &str,
        years: RangeInclusive<i32>,
    ) -> QueryResult<ExtractSummary> {
        if years.is_empty() {
            return Err(QueryError::InvalidYearRange {
                start: *years.start(),
                end: *years.end(),
            });
        }

        let mut summary = ExtractSummary::default();
        for year in years {
            summary.record(self.extract_year(domain, year)?);
        }

        tracing::info!(
            domain,
            written = summary.written,
            skipped = summary.skipped,
            "extraction done: {}",
            summary
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Converter;
    use crate::store::{write_atomic, SnapshotDate, SnapshotStore};
    use std::path::Path;
    use tempfile::tempdir;

    fn date(s: &str) -> SnapshotDate {
        s.parse().unwrap()
    }

    fn create_test_engine(days: &[(&str, &str)]) -> (QueryEngine, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("lake"), dir.path().join("out")).unwrap();
        let converter = Converter::new(store.clone());
        for (day, csv) in days {
            store.write_raw(date(day), csv.as_bytes()).unwrap();
            converter.convert_one(date(day));
        }
        (QueryEngine::new(store), dir)
    }

    fn sample_days() -> Vec<(&'static str, &'static str)> {
        vec![
            ("2023-12-31", "1,example.com\n"),
            (
                "2024-01-01",
                "5,a.b.example.com\n9,example.com\n1,notexample.com\n2,example.com.evil.org\n",
            ),
            ("2024-01-02", "3,example.com\n4,other.org\n"),
            ("2024-06-15", "7,other.org\n"),
        ]
    }

    fn read_shard(engine: &mut QueryEngine, path: &Path) -> Vec<(String, i32, i64)> {
        let sql = format!(
            "SELECT CAST(date AS VARCHAR), best_rank, num_subdomains
             FROM read_parquet({}) ORDER BY date",
            sql_literal(&path.to_string_lossy())
        );
        engine
            .with_connection(|conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
                rows.collect()
            })
            .unwrap()
    }

    #[test]
    fn test_yearly_aggregate_for_domain_and_subdomains() {
        let (mut engine, _dir) = create_test_engine(&sample_days());

        let outcome = engine.extract_year("example.com", 2024).unwrap();
        assert_eq!(outcome, ExtractOutcome::Written);

        let shard = engine.store().shard_path("example.com", 2024).unwrap();
        assert!(!temp_path(&shard).exists());
        assert_eq!(
            read_shard(&mut engine, &shard),
            vec![
                ("2024-01-01".to_string(), 5, 2),
                ("2024-01-02".to_string(), 3, 1),
            ]
        );
    }

    #[test]
    fn test_existing_shard_is_not_requeried_or_modified() {
        let (mut engine, _dir) = create_test_engine(&sample_days());
        let shard = engine.store().shard_path("example.com", 2024).unwrap();
        write_atomic(&shard, b"sentinel").unwrap();

        let summary = engine.extract_years("example.com", 2024..=2024).unwrap();

        assert_eq!(summary, ExtractSummary { written: 0, skipped: 1 });
        assert_eq!(fs::read(&shard).unwrap(), b"sentinel");
        assert_eq!(engine.queries_run(), 0);
        assert!(!engine.is_open());
        assert!(engine.contains("example.com", 2024).unwrap());
    }

    #[test]
    fn test_year_span_writes_each_missing_year() {
        let (mut engine, _dir) = create_test_engine(&sample_days());

        let first = engine.extract_years("example.com", 2023..=2025).unwrap();
        let second = engine.extract_years("example.com", 2023..=2025).unwrap();

        assert_eq!(first, ExtractSummary { written: 3, skipped: 0 });
        assert_eq!(second, ExtractSummary { written: 0, skipped: 3 });
        assert_eq!(engine.queries_run(), 3);

        let shard_2023 = engine.store().shard_path("example.com", 2023).unwrap();
        assert_eq!(
            read_shard(&mut engine, &shard_2023),
            vec![("2023-12-31".to_string(), 1, 1)]
        );

        // No data in 2025: the shard exists and is empty
        let shard_2025 = engine.store().shard_path("example.com", 2025).unwrap();
        assert!(read_shard(&mut engine, &shard_2025).is_empty());
    }

    #[test]
    fn test_extraction_order_does_not_change_results() {
        let (mut forward, _dir_a) = create_test_engine(&sample_days());
        let (mut backward, _dir_b) = create_test_engine(&sample_days());

        forward.extract_year("example.com", 2024).unwrap();
        forward.extract_year("other.org", 2024).unwrap();
        backward.extract_year("other.org", 2024).unwrap();
        backward.reset();
        backward.extract_year("example.com", 2024).unwrap();

        for domain in ["example.com", "other.org"] {
            let a = forward.store().shard_path(domain, 2024).unwrap();
            let b = backward.store().shard_path(domain, 2024).unwrap();
            assert_eq!(read_shard(&mut forward, &a), read_shard(&mut backward, &b));
        }
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let (mut engine, _dir) = create_test_engine(&[]);

        assert!(matches!(
            engine.extract_years("example.com", 2025..=2024),
            Err(QueryError::InvalidYearRange { .. })
        ));
        assert!(matches!(
            engine.extract_year("../etc", 2024),
            Err(QueryError::Store(_))
        ));
    }

    #[test]
    fn test_quotes_in_domain_are_escaped() {
        let sql = domain_year_sql("o'brien.com", DateRange::year(2024).unwrap());
        assert!(sql.contains("domain = 'o''brien.com'"));
        assert!(sql.contains("LIKE '%.o''brien.com'"));
        assert!(sql.contains("BETWEEN DATE '2024-01-01' AND DATE '2024-12-31'"));
    }
}
