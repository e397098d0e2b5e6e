//! Snapshot Store
//!
//! Filesystem layout for the lake:
//!
//! ```text
//! {root}/raw/{YYYY}/{MM}/{DD}.csv        raw snapshot (pre-conversion)
//! {root}/raw/{YYYY}/{MM}/{DD}.parquet    columnar snapshot (post-conversion)
//! {output}/{domain}/{year}.parquet       per-domain yearly aggregate shard
//! ```
//!
//! Every file is committed by writing to a `.tmp` sibling and renaming it into
//! place, so readers never observe a half-written snapshot or shard.

use crate::store::error::{StoreError, StoreResult};
use crate::store::types::SnapshotDate;
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Extension of raw (delimited text) snapshots
pub const RAW_EXT: &str = "csv";
/// Extension of columnar snapshots and output shards
pub const COLUMNAR_EXT: &str = "parquet";

const RAW_DIR: &str = "raw";
const TMP_EXT: &str = "tmp";

/// Which representations of a snapshot are currently on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotState {
    Absent,
    Raw,
    Columnar,
    /// Transient: only observable between a columnar commit and the raw delete
    Both,
}

/// Filesystem layout manager for raw, columnar and output files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    raw_dir: PathBuf,
    output_dir: PathBuf,
}

impl SnapshotStore {
    /// Open a store, creating the raw directory if needed
    pub fn open(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let raw_dir = root.join(RAW_DIR);
        fs::create_dir_all(&raw_dir)?;

        Ok(Self {
            root,
            raw_dir,
            output_dir: output_dir.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn day_path(&self, date: SnapshotDate, ext: &str) -> PathBuf {
        let (year, month, day) = date.segments();
        self.raw_dir
            .join(year)
            .join(month)
            .join(format!("{}.{}", day, ext))
    }

    pub fn raw_path(&self, date: SnapshotDate) -> PathBuf {
        self.day_path(date, RAW_EXT)
    }

    pub fn columnar_path(&self, date: SnapshotDate) -> PathBuf {
        self.day_path(date, COLUMNAR_EXT)
    }

    pub fn has_raw(&self, date: SnapshotDate) -> bool {
        self.raw_path(date).is_file()
    }

    pub fn has_columnar(&self, date: SnapshotDate) -> bool {
        self.columnar_path(date).is_file()
    }

    /// True if either representation of the snapshot exists
    pub fn has_snapshot(&self, date: SnapshotDate) -> bool {
        self.has_columnar(date) || self.has_raw(date)
    }

    pub fn state(&self, date: SnapshotDate) -> SnapshotState {
        match (self.has_raw(date), self.has_columnar(date)) {
            (false, false) => SnapshotState::Absent,
            (true, false) => SnapshotState::Raw,
            (false, true) => SnapshotState::Columnar,
            (true, true) => SnapshotState::Both,
        }
    }

    /// Atomically persist a raw snapshot. Returns the number of bytes written.
    pub fn write_raw(&self, date: SnapshotDate, bytes: &[u8]) -> StoreResult<u64> {
        let dest = self.raw_path(date);
        write_atomic(&dest, bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Remove the raw snapshot; a missing file is not an error
    pub fn remove_raw(&self, date: SnapshotDate) -> StoreResult<()> {
        match fs::remove_file(self.raw_path(date)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the output shard for `(domain, year)`
    pub fn shard_path(&self, domain: &str, year: i32) -> StoreResult<PathBuf> {
        validate_domain(domain)?;
        Ok(self
            .output_dir
            .join(domain)
            .join(format!("{:04}.{}", year, COLUMNAR_EXT)))
    }

    pub fn has_shard(&self, domain: &str, year: i32) -> StoreResult<bool> {
        Ok(self.shard_path(domain, year)?.is_file())
    }

    /// Recover the snapshot date encoded in a columnar file's path.
    ///
    /// The path must be `{raw_dir}/YYYY/MM/DD.parquet` with a valid calendar
    /// date; anything else is a structural violation.
    pub fn parse_columnar_path(&self, path: &Path) -> StoreResult<SnapshotDate> {
        let violation = |reason: &str| StoreError::StructuralPath {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let relative = path
            .strip_prefix(&self.raw_dir)
            .map_err(|_| violation("not under the raw root"))?;

        let segments: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str().ok_or_else(|| violation("non UTF-8 segment")),
                _ => Err(violation("unexpected path component")),
            })
            .collect::<StoreResult<_>>()?;

        let [year, month, file] = segments.as_slice() else {
            return Err(violation("expected YYYY/MM/DD.parquet"));
        };

        let day = file
            .strip_suffix(COLUMNAR_EXT)
            .and_then(|s| s.strip_suffix('.'))
            .ok_or_else(|| violation("not a columnar file"))?;

        let year = parse_digits(year, 4).ok_or_else(|| violation("year is not 4 digits"))?;
        let month = parse_digits(month, 2).ok_or_else(|| violation("month is not 2 digits"))?;
        let day = parse_digits(day, 2).ok_or_else(|| violation("day is not 2 digits"))?;

        SnapshotDate::from_ymd(year as i32, month, day)
            .ok_or_else(|| violation("invalid calendar date"))
    }

    /// All columnar files under the raw root with their dates, sorted by date.
    ///
    /// Fails on the first `.parquet` file whose path does not encode a date.
    pub fn columnar_files(&self) -> StoreResult<Vec<(PathBuf, SnapshotDate)>> {
        let mut paths = Vec::new();
        collect_with_ext(&self.raw_dir, COLUMNAR_EXT, &mut paths)?;

        let mut files = paths
            .into_iter()
            .map(|p| {
                let date = self.parse_columnar_path(&p)?;
                Ok((p, date))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }
}

/// `{path}.tmp` sibling used for all-or-nothing commits
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(TMP_EXT);
    PathBuf::from(name)
}

/// Write bytes to `dest` through a temp file and rename
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(dest);
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, dest)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn validate_domain(domain: &str) -> StoreResult<()> {
    let invalid = domain.is_empty()
        || domain == "."
        || domain == ".."
        || domain.contains(['/', '\\', '\0']);

    if invalid {
        Err(StoreError::InvalidDomain(domain.to_string()))
    } else {
        Ok(())
    }
}

fn parse_digits(s: &str, width: usize) -> Option<u32> {
    if s.len() == width && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

fn collect_with_ext(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_with_ext(&path, ext, out)?;
        } else if path.extension().is_some_and(|e| e == ext) {
            out.push(path);
        }
    }
    Ok(())
}
