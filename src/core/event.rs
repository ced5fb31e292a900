//! Observation events and their persisted row form.
//!
//! An event records exactly one kind of observation. The audit log keeps the
//! historical wide layout (one column per kind) so the row type fills every
//! other column with [`PLACEHOLDER`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cell value for columns that do not apply to a row.
pub const PLACEHOLDER: &str = "N/A";

/// Synthetic label logged when more than one person is in view.
pub const MULTIPLE_PERSONS: &str = "Multiple Persons Detected";

/// Column headers of the persisted log, in order.
pub const LOG_COLUMNS: [&str; 7] = [
    "Timestamp",
    "Prohibited Object",
    "Eye Movement Detected",
    "Key Pressed",
    "Tab Change",
    "Window Focus Changed",
    "Suspicious Expression",
];

/// Timestamp format used in the log. Times are UTC, marked with `Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3fZ";

/// Rows written before the zone marker was added.
const UNMARKED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Parse a log timestamp cell. Unmarked cells are read as UTC.
pub fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(cell, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(cell, UNMARKED_TIMESTAMP_FORMAT))
        .ok()
        .map(|naive| naive.and_utc())
}

/// The observation an event carries.
///
/// `EyeMovement`, `TabChange` and `SuspiciousExpression` are reserved columns;
/// nothing in the monitor produces them yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    ProhibitedObject(String),
    EyeMovement(String),
    KeyPressed(String),
    TabChange(String),
    WindowFocusChange(String),
    SuspiciousExpression(String),
}

impl EventKind {
    /// Short name of the category, used in summaries.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ProhibitedObject(_) => "prohibited_object",
            EventKind::EyeMovement(_) => "eye_movement",
            EventKind::KeyPressed(_) => "key_pressed",
            EventKind::TabChange(_) => "tab_change",
            EventKind::WindowFocusChange(_) => "window_focus_change",
            EventKind::SuspiciousExpression(_) => "suspicious_expression",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            EventKind::ProhibitedObject(v)
            | EventKind::EyeMovement(v)
            | EventKind::KeyPressed(v)
            | EventKind::TabChange(v)
            | EventKind::WindowFocusChange(v)
            | EventKind::SuspiciousExpression(v) => v,
        }
    }
}

/// A timestamped observation, appended once to the event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn prohibited_object(label: impl Into<String>) -> Self {
        Self::new(EventKind::ProhibitedObject(label.into()))
    }

    pub fn multiple_persons() -> Self {
        Self::prohibited_object(MULTIPLE_PERSONS)
    }

    pub fn key_pressed(key: impl Into<String>) -> Self {
        Self::new(EventKind::KeyPressed(key.into()))
    }

    pub fn window_focus_change(title: &str) -> Self {
        Self::new(EventKind::WindowFocusChange(format!("Changed to: {title}")))
    }

    /// Copy of this event carrying a different timestamp.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn to_row(&self) -> EventRow {
        let mut row = EventRow {
            timestamp: self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            prohibited_object: PLACEHOLDER.to_string(),
            eye_movement: PLACEHOLDER.to_string(),
            key_pressed: PLACEHOLDER.to_string(),
            tab_change: PLACEHOLDER.to_string(),
            window_focus_change: PLACEHOLDER.to_string(),
            suspicious_expression: PLACEHOLDER.to_string(),
        };

        let slot = match &self.kind {
            EventKind::ProhibitedObject(_) => &mut row.prohibited_object,
            EventKind::EyeMovement(_) => &mut row.eye_movement,
            EventKind::KeyPressed(_) => &mut row.key_pressed,
            EventKind::TabChange(_) => &mut row.tab_change,
            EventKind::WindowFocusChange(_) => &mut row.window_focus_change,
            EventKind::SuspiciousExpression(_) => &mut row.suspicious_expression,
        };
        *slot = self.kind.value().to_string();

        row
    }
}

/// One persisted log row, every cell either a value or [`PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Prohibited Object")]
    pub prohibited_object: String,
    #[serde(rename = "Eye Movement Detected")]
    pub eye_movement: String,
    #[serde(rename = "Key Pressed")]
    pub key_pressed: String,
    #[serde(rename = "Tab Change")]
    pub tab_change: String,
    #[serde(rename = "Window Focus Changed")]
    pub window_focus_change: String,
    #[serde(rename = "Suspicious Expression")]
    pub suspicious_expression: String,
}

impl EventRow {
    fn cells(&self) -> [(&'static str, &str); 6] {
        [
            ("prohibited_object", &self.prohibited_object),
            ("eye_movement", &self.eye_movement),
            ("key_pressed", &self.key_pressed),
            ("tab_change", &self.tab_change),
            ("window_focus_change", &self.window_focus_change),
            ("suspicious_expression", &self.suspicious_expression),
        ]
    }

    /// Number of observation cells holding a value.
    pub fn populated_count(&self) -> usize {
        self.cells()
            .iter()
            .filter(|(_, v)| !v.is_empty() && *v != PLACEHOLDER)
            .count()
    }

    /// Category name and value of the first populated observation cell.
    pub fn observation(&self) -> Option<(&'static str, &str)> {
        self.cells()
            .into_iter()
            .find(|(_, v)| !v.is_empty() && *v != PLACEHOLDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_has_single_observation() {
        let events = [
            Event::prohibited_object("cell phone"),
            Event::multiple_persons(),
            Event::key_pressed("Tab"),
            Event::window_focus_change("Browser"),
            Event::new(EventKind::EyeMovement("left".into())),
        ];

        for event in &events {
            let row = event.to_row();
            assert_eq!(row.populated_count(), 1, "{row:?}");
            assert_eq!(row.observation().unwrap().0, event.kind.name());
        }
    }

    #[test]
    fn test_focus_change_wording() {
        let row = Event::window_focus_change("Exam").to_row();
        assert_eq!(row.window_focus_change, "Changed to: Exam");
        assert_eq!(row.prohibited_object, PLACEHOLDER);
        assert_eq!(row.key_pressed, PLACEHOLDER);
    }

    #[test]
    fn test_timestamp_carries_utc_marker() {
        let at = NaiveDateTime::parse_from_str("2026-10-19 08:30:05.250", "%Y-%m-%d %H:%M:%S%.3f")
            .unwrap()
            .and_utc();
        let row = Event::key_pressed("q").at(at).to_row();
        assert_eq!(row.timestamp, "2026-10-19 08:30:05.250Z");
        assert_eq!(parse_timestamp(&row.timestamp), Some(at));
        assert_eq!(parse_timestamp("2026-10-19 08:30:05.250"), Some(at));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_multiple_persons_uses_object_column() {
        let row = Event::multiple_persons().to_row();
        assert_eq!(row.prohibited_object, MULTIPLE_PERSONS);
    }
}
