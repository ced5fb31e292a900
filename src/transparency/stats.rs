//! Session statistics for a monitoring run.
//!
//! Counters are atomics so the fusion loop and the keyboard listener can
//! update them without sharing any other state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Statistics for the current session.
#[derive(Debug)]
pub struct MonitorStats {
    session_id: Uuid,
    host: String,
    session_start: DateTime<Utc>,
    frames_processed: AtomicU64,
    frames_sampled: AtomicU64,
    detections: AtomicU64,
    alerts: AtomicU64,
    events_logged: AtomicU64,
    event_log_failures: AtomicU64,
    frames_recorded: AtomicU64,
    detector_failures: AtomicU64,
    /// Totals from earlier sessions
    previous: CumulativeStats,
    persist_path: Option<PathBuf>,
}

impl MonitorStats {
    pub fn new() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            session_id: Uuid::new_v4(),
            host,
            session_start: Utc::now(),
            frames_processed: AtomicU64::new(0),
            frames_sampled: AtomicU64::new(0),
            detections: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
            events_logged: AtomicU64::new(0),
            event_log_failures: AtomicU64::new(0),
            frames_recorded: AtomicU64::new(0),
            detector_failures: AtomicU64::new(0),
            previous: CumulativeStats::default(),
            persist_path: None,
        }
    }

    /// Create stats that add themselves to the totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        match CumulativeStats::load(&path) {
            Ok(Some(previous)) => stats.previous = previous,
            Ok(None) => {}
            Err(e) => debug!("could not load previous session stats: {e}"),
        }
        stats.persist_path = Some(path);
        stats
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn record_frame(&self) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sampled_frame(&self) {
        self.frames_sampled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detections(&self, count: u64) {
        self.detections.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_logged(&self) {
        self.events_logged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_log_failure(&self) {
        self.event_log_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_recorded(&self) {
        self.frames_recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detector_failure(&self) {
        self.detector_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id,
            host: self.host.clone(),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_sampled: self.frames_sampled.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            events_logged: self.events_logged.load(Ordering::Relaxed),
            event_log_failures: self.event_log_failures.load(Ordering::Relaxed),
            frames_recorded: self.frames_recorded.load(Ordering::Relaxed),
            detector_failures: self.detector_failures.load(Ordering::Relaxed),
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        let mut text = format!(
            "Session Statistics ({}):\n\
             - Host: {}\n\
             - Frames processed: {}\n\
             - Frames sampled for objects: {}\n\
             - Detections: {}\n\
             - Alerts raised: {}\n\
             - Events logged: {}\n\
             - Frames recorded: {}\n\
             - Detector failures: {}\n\
             - Session duration: {} seconds",
            stats.session_id,
            stats.host,
            stats.frames_processed,
            stats.frames_sampled,
            stats.detections,
            stats.alerts,
            stats.events_logged,
            stats.frames_recorded,
            stats.detector_failures,
            stats.session_duration_secs
        );
        if stats.event_log_failures > 0 {
            text.push_str(&format!(
                "\n\nWARNING: {} event(s) could not be written to the audit log",
                stats.event_log_failures
            ));
        }
        text
    }

    /// Add this session to the persisted totals.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(ref path) = self.persist_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let current = self.stats();
        let totals = CumulativeStats {
            sessions: self.previous.sessions + 1,
            frames_processed: self.previous.frames_processed + current.frames_processed,
            events_logged: self.previous.events_logged + current.events_logged,
            event_log_failures: self.previous.event_log_failures + current.event_log_failures,
            frames_recorded: self.previous.frames_recorded + current.frames_recorded,
            detector_failures: self.previous.detector_failures + current.detector_failures,
            last_session_id: Some(current.session_id),
            last_updated: Some(Utc::now()),
        };

        let json = serde_json::to_string_pretty(&totals).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

impl Default for MonitorStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: Uuid,
    pub host: String,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
    pub frames_processed: u64,
    pub frames_sampled: u64,
    pub detections: u64,
    pub alerts: u64,
    pub events_logged: u64,
    pub event_log_failures: u64,
    pub frames_recorded: u64,
    pub detector_failures: u64,
}

/// Totals across sessions, as persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeStats {
    pub sessions: u64,
    pub frames_processed: u64,
    pub events_logged: u64,
    pub event_log_failures: u64,
    pub frames_recorded: u64,
    pub detector_failures: u64,
    pub last_session_id: Option<Uuid>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CumulativeStats {
    /// Load totals from `path`, `None` if nothing was saved yet.
    pub fn load(path: &Path) -> Result<Option<Self>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(std::io::Error::other)
    }
}

/// Thread-safe shared statistics.
pub type SharedMonitorStats = Arc<MonitorStats>;

pub fn create_shared_stats() -> SharedMonitorStats {
    Arc::new(MonitorStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedMonitorStats {
    Arc::new(MonitorStats::with_persistence(path))
}
