//! GradeGuard - real-time exam proctoring monitor.
//!
//! This library fuses camera detections, keyboard input and window focus into
//! a single append-only audit log, and starts an incident recording the first
//! time a prohibited object is seen.
//!
//! # Audit Guarantees
//!
//! - **Append-only**: the event log is never rewritten, only appended to
//! - **One observation per row**: every log row carries exactly one signal
//! - **Latched recording**: once an incident recording starts, it runs until
//!   the session ends
//! - **Transparency**: session statistics are kept and can be reviewed
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        GradeGuard Monitor                      │
//! ├───────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐          │
//! │  │   Frames    │──▶│   Fusion    │──▶│  Incident   │          │
//! │  │ + Detectors │   │    Loop     │   │  Recorder   │          │
//! │  └─────────────┘   └─────────────┘   └─────────────┘          │
//! │                      │        ▲                                │
//! │                      ▼        │ focus polls                    │
//! │  ┌─────────────┐   ┌─────────────┐                             │
//! │  │  Keyboard   │──▶│  Event Log  │   (CSV, mutex-serialized)   │
//! │  │  Listener   │   │             │                             │
//! │  └─────────────┘   └─────────────┘                             │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use gradeguard::replay::ReplayScript;
//!
//! let script = ReplayScript::load("session.json".as_ref()).expect("bad script");
//! let parts = script.into_parts(None, None).expect("bad frames");
//! // Hand `parts` to a `FusionLoop` together with a recorder and event log.
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod recording;
pub mod replay;
pub mod transparency;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorConfig, CollectorError, KeyEvent, KeySymbol};
pub use config::{Config, ConfigError};
pub use core::{
    Event, EventKind, EventLog, FusionLoop, FusionSettings, IncidentRecorder, KeyboardConsumer,
    MonitorSession, RecorderState,
};
pub use transparency::{MonitorStats, SessionStats, SharedMonitorStats};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice shown to candidates before monitoring starts.
pub const MONITORING_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              GRADEGUARD - EXAM MONITORING NOTICE                 ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  This session is monitored for academic integrity.               ║
║                                                                  ║
║  ✓ WHAT IS OBSERVED:                                             ║
║    • Camera frames, checked for phones, laptops and extra people ║
║    • The title of the window that has focus                      ║
║    • The quit and tab keys                                       ║
║                                                                  ║
║  ✓ WHAT IS RECORDED:                                             ║
║    • A timestamped audit log of every flagged observation        ║
║    • A video clip, starting at the first prohibited object       ║
║                                                                  ║
║  ✗ WHAT IS NEVER RECORDED:                                       ║
║    • Any other key you press                                     ║
║    • Camera footage before an incident                           ║
║                                                                  ║
║  Press the quit key (default: q) to end the session.             ║
║                                                                  ║
║  You can review what was logged anytime with:                    ║
║    gradeguard events                                             ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
