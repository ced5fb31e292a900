//! Append-only audit log of observation events.
//!
//! The log is a CSV file with a fixed header, written once when the file is
//! first created. Both the fusion loop and the keyboard consumer append to it;
//! a mutex serializes writers so rows land in arrival order.
//!
//! Each row is encoded in memory and written whole. If the write fails the
//! file is cut back to its previous length, so a failed append never leaves a
//! torn row behind.

use crate::core::event::{parse_timestamp, Event, EventRow, LOG_COLUMNS};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{error, warn};

/// Errors raised while writing the audit log.
#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("event log CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Byte destination behind the log.
pub(crate) trait LogSink: Write + Send {
    /// Current size in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Cut the destination back to `size` bytes.
    fn truncate(&mut self, size: u64) -> io::Result<()>;

    fn sync(&mut self) -> io::Result<()>;
}

impl LogSink for File {
    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.set_len(size)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

struct LogWriter {
    sink: Box<dyn LogSink>,
    last_timestamp: Option<DateTime<Utc>>,
    appended: u64,
}

impl LogWriter {
    /// Write one encoded row, rolling the sink back if any byte fails.
    fn write_row(&mut self, bytes: &[u8]) -> io::Result<()> {
        let size = self.sink.size()?;
        let written = self
            .sink
            .write_all(bytes)
            .and_then(|()| self.sink.flush());
        if let Err(e) = written {
            if let Err(rollback) = self.sink.truncate(size) {
                error!(size, "could not remove partial log row: {rollback}");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Encode one CSV record without a header.
fn encode<T: Serialize>(record: T) -> Result<Vec<u8>, EventLogError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.serialize(record)?;
    writer
        .into_inner()
        .map_err(|e| EventLogError::Io(e.into_error()))
}

/// Timestamp of the last readable row of an existing log.
fn last_logged_timestamp(path: &Path) -> Option<DateTime<Utc>> {
    let mut reader = match csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
    {
        Ok(reader) => reader,
        Err(e) => {
            warn!(path = %path.display(), "could not read existing log: {e}");
            return None;
        }
    };

    reader
        .records()
        .filter_map(Result::ok)
        .filter_map(|record| record.get(0).and_then(parse_timestamp))
        .last()
}

/// The audit log handle.
pub struct EventLog {
    path: PathBuf,
    inner: Mutex<LogWriter>,
}

impl EventLog {
    /// Open the log at `path` for appending, creating it with the header row
    /// if it does not exist yet (or is empty).
    ///
    /// When the file already holds rows, new rows are never stamped earlier
    /// than its last one.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, EventLogError> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let last_timestamp = if file.metadata()?.len() > 0 {
            last_logged_timestamp(&path)
        } else {
            None
        };
        Self::with_sink(path, Box::new(file), last_timestamp)
    }

    pub(crate) fn with_sink(
        path: PathBuf,
        sink: Box<dyn LogSink>,
        last_timestamp: Option<DateTime<Utc>>,
    ) -> Result<Self, EventLogError> {
        let mut writer = LogWriter {
            sink,
            last_timestamp,
            appended: 0,
        };
        if writer.sink.size()? == 0 {
            writer.write_row(&encode(LOG_COLUMNS)?)?;
        }

        Ok(Self {
            path,
            inner: Mutex::new(writer),
        })
    }

    /// Append one event and flush it to the file.
    ///
    /// Timestamps never go backwards in the file: an event stamped before the
    /// previous row is written with the previous row's timestamp. Returns the
    /// event as written.
    pub fn append(&self, event: Event) -> Result<Event, EventLogError> {
        let mut inner = self.lock();

        let event = match inner.last_timestamp {
            Some(last) if event.timestamp < last => event.at(last),
            _ => event,
        };

        inner.write_row(&encode(event.to_row())?)?;

        inner.last_timestamp = Some(event.timestamp);
        inner.appended += 1;
        Ok(event)
    }

    /// Number of events appended through this handle.
    pub fn appended(&self) -> u64 {
        self.lock().appended
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and sync the file to disk.
    pub fn sync(&self) -> Result<(), EventLogError> {
        let mut inner = self.lock();
        inner.sink.flush()?;
        inner.sink.sync()?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, LogWriter> {
        // Rows are written whole or rolled back; a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("path", &self.path).finish()
    }
}

/// Thread-safe shared event log.
pub type SharedEventLog = Arc<EventLog>;

/// Open a shared event log.
pub fn open_shared_log(path: impl Into<PathBuf>) -> Result<SharedEventLog, EventLogError> {
    Ok(Arc::new(EventLog::open(path)?))
}

/// Read every row of a log file (header excluded).
pub fn read_rows(path: &Path) -> Result<Vec<EventRow>, EventLogError> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}
