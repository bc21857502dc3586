//! SQLite-backed adapter shared by every process that opens the same file.
//!
//! [`Sqlite`] persists metric state in three tables:
//!
//! | Table | Primary key | Contents |
//! |-------|-------------|----------|
//! | `metric_families` | name, kind, label names | help text, bucket boundaries |
//! | `metric_samples` | name, kind, label names, label values | counter/gauge value |
//! | `histogram_buckets` | name, label names, label values, bucket | non-cumulative delta or `sum` |
//!
//! Label lists are stored as JSON arrays. Every merge is one
//! `INSERT ... ON CONFLICT DO UPDATE` statement, so SQLite's own locking makes
//! "insert if absent, else merge" atomic across threads and processes. Family
//! rows use `INSERT OR IGNORE` and are therefore written once.
//!
//! The connection is opened lazily on first use. File databases switch to the
//! configured [`JournalMode`] (WAL by default) and wait up to the busy timeout
//! for locks held by other processes.
//!
//! # Examples
//!
//! ```rust
//! use registro::storage::{Adapter, Sqlite, ScalarUpdate, Update};
//!
//! let adapter = Sqlite::in_memory();
//! adapter
//!     .update_gauge(&ScalarUpdate {
//!         name: "queue_depth",
//!         help: "Items waiting",
//!         label_names: &[],
//!         label_values: &[],
//!         update: Update::Set(12.0),
//!     })
//!     .unwrap();
//!
//! assert_eq!(adapter.collect().unwrap()[0].samples[0].value, 12.0);
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{debug, info, trace, warn};

use super::{
    decode, encode, Adapter, BucketRow, FamilyMeta, Observation, Rows, ScalarRow, ScalarUpdate,
    Update,
};
use crate::buckets::{self, BucketLabel};
use crate::error::{Error, Result};
use crate::metric::MetricKind;
use crate::snapshot::MetricFamily;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metric_families (
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    label_names TEXT NOT NULL,
    help        TEXT NOT NULL,
    buckets     TEXT,
    PRIMARY KEY (name, kind, label_names)
);
CREATE TABLE IF NOT EXISTS metric_samples (
    name         TEXT NOT NULL,
    kind         TEXT NOT NULL,
    label_names  TEXT NOT NULL,
    label_values TEXT NOT NULL,
    value        REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (name, kind, label_names, label_values)
);
CREATE TABLE IF NOT EXISTS histogram_buckets (
    name         TEXT NOT NULL,
    label_names  TEXT NOT NULL,
    label_values TEXT NOT NULL,
    bucket       TEXT NOT NULL,
    value        REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (name, label_names, label_values, bucket)
);
";

const INSERT_FAMILY: &str = "INSERT OR IGNORE INTO metric_families \
    (name, kind, label_names, help, buckets) VALUES (?1, ?2, ?3, ?4, ?5)";

const ADD_SAMPLE: &str = "INSERT INTO metric_samples \
    (name, kind, label_names, label_values, value) VALUES (?1, ?2, ?3, ?4, ?5) \
    ON CONFLICT (name, kind, label_names, label_values) \
    DO UPDATE SET value = value + excluded.value";

const SET_SAMPLE: &str = "INSERT INTO metric_samples \
    (name, kind, label_names, label_values, value) VALUES (?1, ?2, ?3, ?4, ?5) \
    ON CONFLICT (name, kind, label_names, label_values) \
    DO UPDATE SET value = excluded.value";

const ADD_BUCKET: &str = "INSERT INTO histogram_buckets \
    (name, label_names, label_values, bucket, value) VALUES (?1, ?2, ?3, ?4, ?5) \
    ON CONFLICT (name, label_names, label_values, bucket) \
    DO UPDATE SET value = value + excluded.value";

/// Journal mode applied to file databases when the connection is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JournalMode {
    /// Write-ahead log: readers never block the writer.
    #[default]
    Wal,
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Rollback journal kept in memory.
    Memory,
}

impl JournalMode {
    /// Returns the `PRAGMA journal_mode` argument.
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

/// Storage adapter persisting metrics in a SQLite database.
///
/// Several `Sqlite` values (in one process or many) may point at the same
/// file; all of them observe the same state.
#[derive(Debug)]
pub struct Sqlite {
    path: PathBuf,
    busy_timeout: Duration,
    journal_mode: JournalMode,
    conn: Mutex<Option<Connection>>,
}

impl Sqlite {
    /// Path sentinel selecting a private, in-memory database.
    pub const MEMORY: &'static str = ":memory:";

    /// Default time to wait for a lock held by another connection.
    pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

    /// Creates an adapter for the database at `path`.
    ///
    /// Nothing is opened until the first update or collection.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Self::DEFAULT_BUSY_TIMEOUT,
            journal_mode: JournalMode::default(),
            conn: Mutex::new(None),
        }
    }

    /// Creates an adapter on a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(Self::MEMORY)
    }

    /// Sets how long to wait for locks held by other connections.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets the journal mode used for file databases.
    pub fn with_journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }

    /// Returns the database path (or [`Sqlite::MEMORY`]).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` for the in-memory sentinel.
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == Self::MEMORY
    }

    fn open(&self) -> Result<Connection> {
        let unavailable = |e: rusqlite::Error| match Error::from(e) {
            Error::Backend { message, source } | Error::BackendUnavailable { message, source } => {
                Error::BackendUnavailable {
                    message: format!("{}: {message}", self.path.display()),
                    source,
                }
            }
            other => other,
        };

        let conn = if self.is_in_memory() {
            Connection::open_in_memory().map_err(unavailable)?
        } else {
            let conn = Connection::open(&self.path).map_err(unavailable)?;
            conn.busy_timeout(self.busy_timeout).map_err(unavailable)?;
            let mode: String = conn
                .query_row(
                    &format!("PRAGMA journal_mode={}", self.journal_mode.as_str()),
                    [],
                    |row| row.get(0),
                )
                .map_err(unavailable)?;
            debug!(path = %self.path.display(), journal_mode = %mode, "opened sqlite metric storage");
            conn
        };

        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        debug!(path = %self.path.display(), "sqlite metric schema ready");
        Ok(conn)
    }

    /// Runs `f` on the connection, opening it first if needed.
    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        match guard.as_mut() {
            Some(conn) => f(conn),
            None => Err(Error::unavailable(format!(
                "{}: connection not available",
                self.path.display()
            ))),
        }
    }

    fn update_scalar(&self, kind: MetricKind, update: &ScalarUpdate<'_>) -> Result<()> {
        let label_names = encode(update.label_names)?;
        let label_values = encode(update.label_values)?;
        let (sql, value) = match update.update {
            Update::Add(delta) => (ADD_SAMPLE, delta),
            Update::Set(value) => (SET_SAMPLE, value),
        };
        trace!(name = update.name, %kind, update = ?update.update, "merging sample");

        self.with_connection(|conn| {
            conn.prepare_cached(INSERT_FAMILY)?.execute(params![
                update.name,
                kind.as_str(),
                label_names,
                update.help,
                Option::<String>::None,
            ])?;
            conn.prepare_cached(sql)?.execute(params![
                update.name,
                kind.as_str(),
                label_names,
                label_values,
                value,
            ])?;
            Ok(())
        })
    }

    fn remove_files(&self) -> Result<()> {
        let mut sidecars = Vec::with_capacity(3);
        sidecars.push(self.path.clone());
        for suffix in ["-wal", "-shm"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            sidecars.push(PathBuf::from(name));
        }

        for path in sidecars {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => {
                    warn!(path = %path.display(), error = %source, "metric storage file left behind");
                    return Err(Error::WipeFailed { path, source });
                }
            }
        }
        Ok(())
    }
}

impl Adapter for Sqlite {
    fn update_counter(&self, update: &ScalarUpdate<'_>) -> Result<()> {
        self.update_scalar(MetricKind::Counter, update)
    }

    fn update_gauge(&self, update: &ScalarUpdate<'_>) -> Result<()> {
        self.update_scalar(MetricKind::Gauge, update)
    }

    fn update_histogram(&self, observation: &Observation<'_>) -> Result<()> {
        let label_names = encode(observation.label_names)?;
        let label_values = encode(observation.label_values)?;
        let boundaries = encode(observation.buckets)?;
        let matching = buckets::assign(observation.buckets, observation.value);
        trace!(
            name = observation.name,
            value = observation.value,
            bucket = ?matching,
            "merging observation"
        );

        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.prepare_cached(INSERT_FAMILY)?.execute(params![
                observation.name,
                MetricKind::Histogram.as_str(),
                label_names,
                observation.help,
                boundaries,
            ])?;
            {
                let mut add = tx.prepare_cached(ADD_BUCKET)?;
                add.execute(params![
                    observation.name,
                    label_names,
                    label_values,
                    BucketLabel::Sum.key(),
                    observation.value,
                ])?;
                add.execute(params![
                    observation.name,
                    label_names,
                    label_values,
                    matching.key(),
                    1.0_f64,
                ])?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn collect(&self) -> Result<Vec<MetricFamily>> {
        type RawFamily = (String, String, String, String, Option<String>);
        type RawSample = (String, String, String, String, f64);
        type RawBucket = (String, String, String, String, f64);

        let (raw_families, raw_samples, raw_buckets) = self.with_connection(|conn| {
            let tx = conn.transaction()?;
            let families = tx
                .prepare("SELECT name, kind, label_names, help, buckets FROM metric_families")?
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
                .collect::<rusqlite::Result<Vec<RawFamily>>>()?;
            let samples = tx
                .prepare("SELECT name, kind, label_names, label_values, value FROM metric_samples")?
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
                .collect::<rusqlite::Result<Vec<RawSample>>>()?;
            let buckets = tx
                .prepare(
                    "SELECT name, label_names, label_values, bucket, value FROM histogram_buckets",
                )?
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))?
                .collect::<rusqlite::Result<Vec<RawBucket>>>()?;
            tx.commit()?;
            Ok((families, samples, buckets))
        })?;

        let mut rows = Rows::default();
        for (name, kind, label_names, help, boundaries) in raw_families {
            rows.families.push(FamilyMeta {
                name,
                kind: kind.parse()?,
                help,
                label_names: decode(&label_names)?,
                buckets: boundaries.as_deref().map(decode::<Vec<f64>>).transpose()?,
            });
        }
        for (name, kind, label_names, label_values, value) in raw_samples {
            rows.scalars.push(ScalarRow {
                name,
                kind: kind.parse()?,
                label_names: decode(&label_names)?,
                label_values: decode(&label_values)?,
                value,
            });
        }
        for (name, label_names, label_values, bucket, value) in raw_buckets {
            rows.buckets.push(BucketRow {
                name,
                label_names: decode(&label_names)?,
                label_values: decode(&label_values)?,
                bucket,
                value,
            });
        }
        Ok(rows.into_families())
    }

    fn wipe_storage(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        drop(guard.take());
        if !self.is_in_memory() {
            self.remove_files()?;
        }
        info!(path = %self.path.display(), "sqlite metric storage wiped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::conformance;

    fn counter(adapter: &Sqlite, value: f64) {
        adapter
            .update_counter(&ScalarUpdate {
                name: "test_counter",
                help: "this is for testing",
                label_names: &[],
                label_values: &[],
                update: Update::Add(value),
            })
            .unwrap();
    }

    #[test]
    fn conformance_suite_in_memory() {
        conformance::run_all(Sqlite::in_memory);
    }

    #[test]
    fn conformance_suite_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.sqlite");
        conformance::run_all(|| {
            let adapter = Sqlite::new(&path);
            adapter.wipe_storage().unwrap();
            adapter
        });
    }

    #[test]
    fn test_lazy_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.sqlite");
        let adapter = Sqlite::new(&path);
        assert!(!path.exists());
        counter(&adapter, 1.0);
        assert!(path.exists());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.sqlite");
        counter(&Sqlite::new(&path), 2.0);
        let reopened = Sqlite::new(&path).with_journal_mode(JournalMode::Delete);
        counter(&reopened, 3.0);
        assert_eq!(reopened.collect().unwrap()[0].samples[0].value, 5.0);
    }

    #[test]
    fn test_wipe_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wipe.sqlite");
        let adapter = Sqlite::new(&path);
        counter(&adapter, 1.0);
        adapter.wipe_storage().unwrap();
        assert!(!path.exists());
        assert!(!dir.path().join("wipe.sqlite-wal").exists());
        assert!(adapter.collect().unwrap().is_empty());
    }

    #[test]
    fn test_wipe_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Sqlite::new(dir.path().join("never-created.sqlite"));
        adapter.wipe_storage().unwrap();
        adapter.wipe_storage().unwrap();
    }

    #[test]
    fn test_wipe_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the data file should be cannot be removed as a file
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        let err = Sqlite::new(&path).wipe_storage().unwrap_err();
        assert!(matches!(err, Error::WipeFailed { .. }), "{err}");
    }

    #[test]
    fn test_unopenable_path() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Sqlite::new(dir.path().join("missing").join("metrics.sqlite"));
        let err = adapter.collect().unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }), "{err}");
    }

    #[test]
    fn test_locked_file_is_retryable() {
        use std::error::Error as _;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.sqlite");
        counter(&Sqlite::new(&path), 1.0);

        let locker = Connection::open(&path).unwrap();
        locker.execute_batch("BEGIN EXCLUSIVE").unwrap();

        let adapter = Sqlite::new(&path).with_busy_timeout(Duration::ZERO);
        let err = adapter
            .update_counter(&ScalarUpdate {
                name: "test_counter",
                help: "this is for testing",
                label_names: &[],
                label_values: &[],
                update: Update::Add(1.0),
            })
            .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }), "{err}");
        assert!(err.is_retryable());

        let code = err
            .source()
            .and_then(|s| s.downcast_ref::<rusqlite::Error>())
            .and_then(|e| e.sqlite_error_code());
        assert!(
            matches!(
                code,
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            "{code:?}"
        );

        // once the lock is released the same adapter succeeds
        locker.execute_batch("ROLLBACK").unwrap();
        counter(&adapter, 1.0);
        assert_eq!(adapter.collect().unwrap()[0].samples[0].value, 2.0);
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let adapter = Sqlite::in_memory();
        counter(&adapter, 1.0);
        adapter
            .with_connection(|conn| {
                conn.execute("UPDATE metric_samples SET label_values = 'not json'", [])?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(adapter.collect(), Err(Error::Backend { source: Some(_), .. })));
    }

    #[test]
    fn test_builder() {
        let adapter = Sqlite::new("/tmp/x.sqlite")
            .with_busy_timeout(Duration::from_millis(250))
            .with_journal_mode(JournalMode::Memory);
        assert_eq!(adapter.busy_timeout, Duration::from_millis(250));
        assert_eq!(adapter.journal_mode.as_str(), "MEMORY");
        assert_eq!(adapter.path(), Path::new("/tmp/x.sqlite"));
        assert!(!adapter.is_in_memory());
        assert!(Sqlite::in_memory().is_in_memory());
    }
}
