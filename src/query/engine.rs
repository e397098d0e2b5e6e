//! Query Engine
//!
//! Owns the embedded DuckDB connection and the `raw` logical table:
//!
//! ```text
//! raw(rank INTEGER, domain VARCHAR, date DATE)
//!   = read_parquet([every {raw_dir}/YYYY/MM/DD.parquet])
//!     JOIN snapshot_files(filename, date)   -- date parsed from the path
//! ```
//!
//! The connection has an explicit lifecycle: `open` builds the view from the
//! columnar files present at that moment, `reset`/`close` drop it. Queries
//! open it on demand. Resetting between large batches of queries bounds the
//! engine's memory.
//!
//! Not safe for concurrent use; callers serialize access through `&mut self`.

use crate::query::error::QueryResult;
use crate::store::{SnapshotDate, SnapshotStore};
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::{params, Connection};
use std::path::PathBuf;

/// Engine tuning applied to every new connection
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    /// DuckDB `memory_limit`, e.g. "8GB"
    pub memory_limit: Option<String>,
    /// DuckDB worker threads
    pub threads: Option<usize>,
}

/// Explicitly owned connection to the embedded analytical engine
pub struct QueryEngine {
    store: SnapshotStore,
    settings: EngineSettings,
    conn: Option<Connection>,
    snapshot_count: usize,
    queries_run: u64,
}

impl QueryEngine {
    pub fn new(store: SnapshotStore) -> Self {
        Self::with_settings(store, EngineSettings::default())
    }

    pub fn with_settings(store: SnapshotStore, settings: EngineSettings) -> Self {
        Self {
            store,
            settings,
            conn: None,
            snapshot_count: 0,
            queries_run: 0,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Columnar snapshots registered in the current `raw` view
    pub fn snapshot_count(&self) -> usize {
        self.snapshot_count
    }

    /// Statements executed over the lifetime of this engine
    pub fn queries_run(&self) -> u64 {
        self.queries_run
    }

    /// Open the connection and define `raw`. No-op if already open.
    ///
    /// Fails with a structural violation if any columnar file does not sit
    /// at a `YYYY/MM/DD.parquet` path.
    pub fn open(&mut self) -> QueryResult<&Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        let conn: &Connection = self.conn.insert(conn);
        Ok(conn)
    }

    /// Close the connection; the next query reopens it. Safe when not open.
    pub fn reset(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!("Failed to close query connection cleanly: {}", e);
            }
            tracing::debug!("Query connection reset");
        }
        self.snapshot_count = 0;
    }

    /// Close the connection, surfacing any error
    pub fn close(&mut self) -> QueryResult<()> {
        self.snapshot_count = 0;
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| e.into()),
            None => Ok(()),
        }
    }

    /// Run an arbitrary read query against the lake.
    ///
    /// Use the `raw` view; each row carries a `date` (DATE) derived from the
    /// file path, e.g. `WHERE date BETWEEN '2025-01-01' AND '2025-01-31'`.
    pub fn query(&mut self, sql: &str) -> QueryResult<Vec<RecordBatch>> {
        let batches = {
            let conn = self.open()?;
            let mut stmt = conn.prepare(sql)?;
            let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
            batches
        };
        self.queries_run += 1;
        Ok(batches)
    }

    /// Execute statements that produce no result set
    pub fn execute(&mut self, sql: &str) -> QueryResult<()> {
        self.open()?.execute_batch(sql)?;
        self.queries_run += 1;
        Ok(())
    }

    /// Run a closure against the open connection
    pub fn with_connection<T, F>(&mut self, f: F) -> QueryResult<T>
    where
        F: FnOnce(&Connection) -> duckdb::Result<T>,
    {
        let value = f(self.open()?)?;
        self.queries_run += 1;
        Ok(value)
    }

    fn connect(&mut self) -> QueryResult<Connection> {
        let files = self.store.columnar_files()?;
        let mut conn = Connection::open_in_memory()?;

        if let Some(limit) = &self.settings.memory_limit {
            conn.execute_batch(&format!("SET memory_limit = {}", sql_literal(limit)))?;
        }
        if let Some(threads) = self.settings.threads {
            conn.execute_batch(&format!("SET threads = {}", threads.max(1)))?;
        }

        define_raw_view(&mut conn, &files)?;
        self.snapshot_count = files.len();

        tracing::debug!(
            snapshots = files.len(),
            "Opened query connection over {:?}",
            self.store.raw_dir()
        );
        Ok(conn)
    }
}

fn define_raw_view(conn: &mut Connection, files: &[(PathBuf, SnapshotDate)]) -> QueryResult<()> {
    conn.execute_batch(
        "CREATE TABLE snapshot_files (filename VARCHAR NOT NULL, date DATE NOT NULL)",
    )?;

    if files.is_empty() {
        conn.execute_batch(
            "CREATE VIEW raw AS
             SELECT CAST(NULL AS INTEGER) AS rank,
                    CAST(NULL AS VARCHAR) AS domain,
                    CAST(NULL AS DATE) AS date
             WHERE false",
        )?;
        return Ok(());
    }

    let tx = conn.transaction()?;
    {
        let mut insert =
            tx.prepare("INSERT INTO snapshot_files VALUES (?, make_date(?, ?, ?))")?;
        for (path, date) in files {
            insert.execute(params![
                path.to_string_lossy().into_owned(),
                date.year(),
                date.month() as i32,
                date.day() as i32
            ])?;
        }
    }
    tx.commit()?;

    let file_list = files
        .iter()
        .map(|(path, _)| sql_literal(&path.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(", ");

    conn.execute_batch(&format!(
        "CREATE VIEW raw AS
         SELECT s.rank, s.domain, f.date
         FROM read_parquet([{}], filename = true) AS s
         JOIN snapshot_files AS f ON s.filename = f.filename",
        file_list
    ))?;

    Ok(())
}

/// Quote a string as a SQL literal
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::Converter;
    use crate::query::QueryError;
    use crate::store::{write_atomic, DateRange};
    use duckdb::arrow::array::{Array, Int64Array};
    use tempfile::tempdir;

    fn date(s: &str) -> SnapshotDate {
        s.parse().unwrap()
    }

    /// Store with columnar snapshots built through the converter
    fn create_test_store(days: &[(&str, &str)]) -> (SnapshotStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("lake"), dir.path().join("out")).unwrap();
        for (day, csv) in days {
            store.write_raw(date(day), csv.as_bytes()).unwrap();
        }
        let converter = Converter::new(store.clone());
        for (day, _) in days {
            converter.convert_one(date(day));
        }
        (store, dir)
    }

    fn count(batches: &[RecordBatch]) -> i64 {
        let column = batches[0].column(0);
        column.as_any().downcast_ref::<Int64Array>().unwrap().value(0)
    }

    #[test]
    fn test_raw_view_derives_date_from_path() {
        let (store, _dir) = create_test_store(&[
            ("2024-01-01", "1,a.com\n2,b.com\n"),
            ("2024-01-02", "1,a.com\n"),
        ]);
        let mut engine = QueryEngine::new(store);

        let dates: Vec<String> = engine
            .with_connection(|conn| {
                let mut stmt =
                    conn.prepare("SELECT DISTINCT CAST(date AS VARCHAR) FROM raw ORDER BY 1")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect()
            })
            .unwrap();

        assert_eq!(dates, vec!["2024-01-01", "2024-01-02"]);
        assert_eq!(engine.snapshot_count(), 2);

        let batches = engine.query("SELECT count(*) FROM raw WHERE rank = 1").unwrap();
        assert_eq!(count(&batches), 2);
    }

    #[test]
    fn test_empty_lake_has_empty_raw_view() {
        let (store, _dir) = create_test_store(&[]);
        let mut engine = QueryEngine::new(store);

        let batches = engine.query("SELECT count(*) FROM raw").unwrap();
        assert_eq!(count(&batches), 0);
        assert_eq!(batches[0].num_columns(), 1);
    }

    #[test]
    fn test_malformed_path_fails_fast() {
        let (store, _dir) = create_test_store(&[("2024-01-01", "1,a.com\n")]);
        write_atomic(&store.raw_dir().join("2024/01/backup.parquet"), b"PAR1").unwrap();
        let mut engine = QueryEngine::new(store);

        let err = engine.query("SELECT 1").unwrap_err();
        assert!(err.is_structural(), "unexpected error: {}", err);
        assert!(matches!(err, QueryError::Store(_)));
        assert!(!engine.is_open());
        assert!(err.to_string().contains("backup.parquet"));
    }

    #[test]
    fn test_reset_is_safe_and_picks_up_new_snapshots() {
        let (store, _dir) = create_test_store(&[("2024-01-01", "1,a.com\n")]);
        let mut engine = QueryEngine::new(store.clone());

        engine.reset();
        assert!(!engine.is_open());

        assert_eq!(count(&engine.query("SELECT count(*) FROM raw").unwrap()), 1);

        store.write_raw(date("2024-01-02"), b"1,a.com\n2,b.com\n").unwrap();
        Converter::new(store.clone()).convert_range(DateRange::day(date("2024-01-02")));

        // The view is fixed for the lifetime of a connection
        assert_eq!(count(&engine.query("SELECT count(*) FROM raw").unwrap()), 1);

        engine.reset();
        assert!(!engine.is_open());
        assert_eq!(count(&engine.query("SELECT count(*) FROM raw").unwrap()), 3);
        assert_eq!(engine.queries_run(), 3);

        engine.close().unwrap();
        engine.close().unwrap();
    }

    #[test]
    fn test_engine_settings_are_applied() {
        let (store, _dir) = create_test_store(&[]);
        let settings = EngineSettings {
            memory_limit: Some("512MB".to_string()),
            threads: Some(2),
        };
        let mut engine = QueryEngine::with_settings(store, settings);

        let threads: String = engine
            .with_connection(|conn| {
                conn.query_row(
                    "SELECT CAST(current_setting('threads') AS VARCHAR)",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(threads, "2");
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("it's"), "'it''s'");
    }
}
