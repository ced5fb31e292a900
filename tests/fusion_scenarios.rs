//! End-to-end monitoring scenarios driven by scripted collaborators.

use crossbeam_channel::{unbounded, Sender};
use gradeguard::collector::{FocusSource, KeyEvent, KeySymbol};
use gradeguard::config::KeyConfig;
use gradeguard::core::alert::{AlertDispatcher, OverlayAlert, SilentBeeper};
use gradeguard::core::event::MULTIPLE_PERSONS;
use gradeguard::core::event_log::{open_shared_log, read_rows, SharedEventLog};
use gradeguard::core::frame::{BoundingBox, Detection, Frame, Resolution};
use gradeguard::core::fusion::{Collaborators, FusionLoop, FusionSettings, TerminationReason};
use gradeguard::core::keyboard::KeyboardConsumer;
use gradeguard::core::recorder::{IncidentRecorder, RecorderState, RecordingSettings};
use gradeguard::core::session::MonitorSession;
use gradeguard::core::sources::{FrameSource, NullDisplay};
use gradeguard::recording::image_sequence::MANIFEST_FILE;
use gradeguard::recording::{ImageSequenceBackend, MemoryBackend, RecordingBackend};
use gradeguard::replay::{
    ReplayScript, ScriptedFocusSource, ScriptedFrameSource, ScriptedHeadDetector,
    ScriptedObjectDetector,
};
use gradeguard::transparency::create_shared_stats;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn test_dir(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("gradeguard-it")
        .join(format!("{name}_{}", uuid::Uuid::new_v4()))
}

fn settings(sample_interval: u64, prohibited: &[&str]) -> FusionSettings {
    FusionSettings {
        sample_interval,
        prohibited_labels: prohibited.iter().map(|s| s.to_string()).collect(),
        ..FusionSettings::default()
    }
}

fn recorder(dir: &PathBuf, backend: Box<dyn RecordingBackend>) -> IncidentRecorder {
    IncidentRecorder::new(
        RecordingSettings {
            output_dir: dir.join("clips"),
            resolution: Resolution::new(64, 48),
            frame_rate: 20.0,
        },
        backend,
    )
}

struct Run {
    fusion: FusionLoop,
    log: SharedEventLog,
    log_path: PathBuf,
    running: Arc<AtomicBool>,
}

fn build(
    settings: FusionSettings,
    frames: Box<dyn FrameSource>,
    detections: Vec<Vec<Detection>>,
    focus: Box<dyn FocusSource>,
    recorder: IncidentRecorder,
    dir: &PathBuf,
) -> Run {
    build_with_alerts(
        settings,
        frames,
        detections,
        focus,
        recorder,
        Box::new(OverlayAlert::new(SilentBeeper)),
        dir,
    )
}

fn build_with_alerts(
    settings: FusionSettings,
    frames: Box<dyn FrameSource>,
    detections: Vec<Vec<Detection>>,
    focus: Box<dyn FocusSource>,
    recorder: IncidentRecorder,
    alerts: Box<dyn AlertDispatcher>,
    dir: &PathBuf,
) -> Run {
    let log_path = dir.join("log.csv");
    let log = open_shared_log(&log_path).unwrap();
    let running = Arc::new(AtomicBool::new(true));

    let io = Collaborators {
        frames,
        objects: Box::new(ScriptedObjectDetector::new(detections)),
        heads: Box::new(ScriptedHeadDetector::default()),
        focus,
        alerts,
        display: Box::new(NullDisplay),
    };

    let fusion = FusionLoop::new(
        settings,
        io,
        recorder,
        log.clone(),
        create_shared_stats(),
        running.clone(),
    );

    Run {
        fusion,
        log,
        log_path,
        running,
    }
}

/// Alert dispatcher that notes the newest logged object at each alert.
struct LogReadingAlert {
    log_path: PathBuf,
    seen: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl AlertDispatcher for LogReadingAlert {
    fn alert(&mut self, _frame: &mut Frame, detection: &Detection) {
        let newest = read_rows(&self.log_path)
            .ok()
            .and_then(|rows| rows.last().map(|row| row.prohibited_object.clone()));
        self.seen
            .lock()
            .unwrap()
            .push((detection.label.clone(), newest));
    }
}

/// Focus source that hands a key to the keyboard listener on each poll and
/// waits until the listener has logged it before reporting the next title.
struct KeyThenFocus {
    polls: VecDeque<(Option<KeySymbol>, &'static str)>,
    keys: Sender<KeyEvent>,
    log: SharedEventLog,
}

impl FocusSource for KeyThenFocus {
    fn active_window_title(&mut self) -> Option<String> {
        let (key, title) = self.polls.pop_front()?;
        if let Some(key) = key {
            let before = self.log.appended();
            self.keys.send(KeyEvent::new(key)).unwrap();
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.log.appended() == before {
                assert!(Instant::now() < deadline, "key {key} never reached the log");
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        Some(title.to_string())
    }
}

fn phone() -> Detection {
    Detection::new("cell phone", BoundingBox::new(5, 5, 10, 20))
}

fn person(x: i32) -> Detection {
    Detection::new("person", BoundingBox::new(x, 0, 20, 40))
}

#[test]
fn phone_on_third_frame_starts_recording() {
    let dir = test_dir("phone");
    let backend = MemoryBackend::new();
    let detections = vec![vec![], vec![], vec![phone()], vec![], vec![]];

    let mut run = build(
        settings(1, &["cell phone", "person", "laptop"]),
        Box::new(ScriptedFrameSource::blank(5, Resolution::new(64, 48))),
        detections,
        Box::new(ScriptedFocusSource::default()),
        recorder(&dir, Box::new(backend.clone())),
        &dir,
    );

    for _ in 0..2 {
        run.fusion.step();
        assert_eq!(run.fusion.recorder_state(), RecorderState::Idle);
    }
    run.fusion.step();
    assert_eq!(run.fusion.recorder_state(), RecorderState::Recording);

    assert_eq!(run.fusion.run(), TerminationReason::EndOfStream);
    run.fusion.shutdown();

    let rows = read_rows(&run.log_path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].prohibited_object, "cell phone");

    let clips = backend.clips();
    assert_eq!(clips.len(), 1);
    assert_eq!(clips[0].frames, vec![3, 4, 5]);
    assert!(clips[0].closed);
}

#[test]
fn recorder_latches_on_first_trigger_only() {
    let dir = test_dir("latch");
    let backend = MemoryBackend::new();
    let laptop = Detection::new("laptop", BoundingBox::new(0, 0, 30, 20));
    let detections = vec![
        vec![],
        vec![phone()],
        vec![phone()],
        vec![laptop],
        vec![],
        vec![phone()],
    ];

    let mut run = build(
        settings(1, &["cell phone", "laptop"]),
        Box::new(ScriptedFrameSource::blank(6, Resolution::new(64, 48))),
        detections,
        Box::new(ScriptedFocusSource::default()),
        recorder(&dir, Box::new(backend.clone())),
        &dir,
    );
    run.fusion.run();

    assert_eq!(run.fusion.recorder().trigger_label(), Some("cell phone"));
    let clips = backend.clips();
    assert_eq!(clips.len(), 1);
    // Every frame after the trigger is kept, with or without detections.
    assert_eq!(clips[0].frames, vec![2, 3, 4, 5, 6]);
    assert_eq!(read_rows(&run.log_path).unwrap().len(), 4);
}

#[test]
fn focus_changes_are_logged_once_each() {
    let dir = test_dir("focus");
    let mut run = build(
        FusionSettings::default(),
        Box::new(ScriptedFrameSource::blank(3, Resolution::new(16, 16))),
        Vec::new(),
        Box::new(ScriptedFocusSource::from_titles([
            "Exam", "Exam", "Browser", "Exam",
        ])),
        recorder(&dir, Box::new(MemoryBackend::new())),
        &dir,
    );
    run.fusion.run();

    let changes: Vec<_> = read_rows(&run.log_path)
        .unwrap()
        .into_iter()
        .map(|row| row.window_focus_change)
        .collect();
    assert_eq!(changes, vec!["Changed to: Browser", "Changed to: Exam"]);
}

#[test]
fn prohibited_object_logged_before_multiple_persons() {
    let dir = test_dir("persons");
    let detections = vec![vec![person(0), phone(), person(30)]];

    let mut run = build(
        settings(1, &["cell phone", "laptop"]),
        Box::new(ScriptedFrameSource::blank(1, Resolution::new(64, 48))),
        detections,
        Box::new(ScriptedFocusSource::default()),
        recorder(&dir, Box::new(MemoryBackend::new())),
        &dir,
    );
    run.fusion.run();
    assert_eq!(run.fusion.person_count(), 2);

    let logged: Vec<_> = read_rows(&run.log_path)
        .unwrap()
        .into_iter()
        .map(|row| row.prohibited_object)
        .collect();
    assert_eq!(logged, vec!["cell phone", MULTIPLE_PERSONS]);
}

#[test]
fn person_in_prohibited_set_is_logged_per_detection() {
    let dir = test_dir("persons_default");
    let detections = vec![vec![person(0), phone(), person(30)]];

    let mut run = build(
        FusionSettings {
            sample_interval: 1,
            ..FusionSettings::default()
        },
        Box::new(ScriptedFrameSource::blank(1, Resolution::new(64, 48))),
        detections,
        Box::new(ScriptedFocusSource::default()),
        recorder(&dir, Box::new(MemoryBackend::new())),
        &dir,
    );
    run.fusion.run();

    let logged: Vec<_> = read_rows(&run.log_path)
        .unwrap()
        .into_iter()
        .map(|row| row.prohibited_object)
        .collect();
    assert_eq!(
        logged,
        vec!["person", "cell phone", "person", MULTIPLE_PERSONS]
    );
    assert_eq!(run.fusion.recorder().trigger_label(), Some("person"));
}

#[test]
fn quit_key_ends_session() {
    let dir = test_dir("quit");
    let (tx, rx) = unbounded();
    let frames = ScriptedFrameSource::blank(10_000, Resolution::new(8, 8))
        .with_keys(
            vec![vec![KeySymbol::Char('a'), KeySymbol::Char('q')]],
            tx,
        )
        .with_pace(Duration::from_millis(1));

    let run = build(
        FusionSettings::default(),
        Box::new(frames),
        Vec::new(),
        Box::new(ScriptedFocusSource::default()),
        recorder(&dir, Box::new(MemoryBackend::new())),
        &dir,
    );
    let keyboard = KeyboardConsumer::spawn(
        rx,
        KeyConfig::default(),
        run.log.clone(),
        run.running.clone(),
        create_shared_stats(),
    )
    .unwrap();

    let report = MonitorSession::new(run.fusion, keyboard).run();

    assert_eq!(report.termination, TerminationReason::QuitRequested);
    assert!(report.frames < 10_000);
    assert!(!run.running.load(Ordering::SeqCst));

    let keyboard = report.keyboard.unwrap();
    assert_eq!(keyboard.keys_seen, 2);
    assert!(keyboard.quit_requested);

    let rows = read_rows(&run.log_path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].key_pressed, "q");
}

#[test]
fn every_row_holds_one_observation_in_time_order() {
    let dir = test_dir("mixed");
    let script = ReplayScript::from_json(
        r#"{
            "resolution": [32, 24],
            "initial_focus": "Exam",
            "frames": [
                { "keys": ["Tab"] },
                { "detections": [
                    { "label": "person", "bbox": [0, 0, 10, 20] },
                    { "label": "person", "bbox": [12, 0, 10, 20] }
                ] },
                { "focus": "Browser", "keys": ["x", "Tab"] },
                { "detections": [{ "label": "laptop", "bbox": [2, 2, 8, 6] }] },
                { "focus": "Exam" },
                { "detector_error": true }
            ]
        }"#,
    )
    .unwrap();

    let (tx, rx) = unbounded();
    let parts = script.into_parts(None, Some(tx)).unwrap();
    let log_path = dir.join("log.csv");
    let log = open_shared_log(&log_path).unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let backend = MemoryBackend::new();

    let io = Collaborators {
        frames: Box::new(parts.frames),
        objects: Box::new(parts.objects),
        heads: Box::new(parts.heads),
        focus: Box::new(parts.focus),
        alerts: Box::new(OverlayAlert::new(SilentBeeper)),
        display: Box::new(NullDisplay),
    };
    let fusion = FusionLoop::new(
        settings(1, &["cell phone", "laptop"]),
        io,
        recorder(&dir, Box::new(backend.clone())),
        log.clone(),
        create_shared_stats(),
        running.clone(),
    );
    let keyboard = KeyboardConsumer::spawn(
        rx,
        KeyConfig::default(),
        log,
        running,
        create_shared_stats(),
    )
    .unwrap();

    let report = MonitorSession::new(fusion, keyboard).run();
    assert_eq!(report.termination, TerminationReason::EndOfStream);
    assert_eq!(report.frames, 6);
    assert_eq!(backend.clips()[0].frames, vec![4, 5, 6]);

    let rows = read_rows(&log_path).unwrap();
    // Two tabs, multiple persons, two focus changes, one laptop.
    assert_eq!(rows.len(), 6);
    for row in &rows {
        assert_eq!(row.populated_count(), 1, "{row:?}");
    }
    for pair in rows.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn prohibited_object_is_logged_before_its_alert() {
    let dir = test_dir("alert_order");
    let laptop = Detection::new("laptop", BoundingBox::new(0, 0, 30, 20));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let alerts = LogReadingAlert {
        log_path: dir.join("log.csv"),
        seen: seen.clone(),
    };

    let mut run = build_with_alerts(
        settings(1, &["cell phone", "laptop"]),
        Box::new(ScriptedFrameSource::blank(3, Resolution::new(64, 48))),
        vec![vec![phone(), laptop.clone()], vec![], vec![laptop]],
        Box::new(ScriptedFocusSource::default()),
        recorder(&dir, Box::new(MemoryBackend::new())),
        Box::new(alerts),
        &dir,
    );
    run.fusion.run();

    let seen = seen.lock().unwrap().clone();
    let expected: Vec<(String, Option<String>)> = ["cell phone", "laptop", "laptop"]
        .iter()
        .map(|label| (label.to_string(), Some(label.to_string())))
        .collect();
    assert_eq!(seen, expected);
    assert_eq!(read_rows(&run.log_path).unwrap().len(), 3);
}

#[test]
fn rows_follow_arrival_order_across_loop_and_listener() {
    let dir = test_dir("arrival");
    let log_path = dir.join("log.csv");
    let log = open_shared_log(&log_path).unwrap();
    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = unbounded();
    let laptop = Detection::new("laptop", BoundingBox::new(0, 0, 30, 20));

    // First poll seeds the focus state at construction.
    let focus = KeyThenFocus {
        polls: VecDeque::from([
            (None, "Exam"),
            (Some(KeySymbol::TAB), "Browser"),
            (Some(KeySymbol::TAB), "Exam"),
            (Some(KeySymbol::TAB), "Exam"),
        ]),
        keys: tx,
        log: log.clone(),
    };

    let io = Collaborators {
        frames: Box::new(ScriptedFrameSource::blank(3, Resolution::new(32, 24))),
        objects: Box::new(ScriptedObjectDetector::new(vec![
            vec![phone()],
            vec![],
            vec![laptop],
        ])),
        heads: Box::new(ScriptedHeadDetector::default()),
        focus: Box::new(focus),
        alerts: Box::new(OverlayAlert::new(SilentBeeper)),
        display: Box::new(NullDisplay),
    };
    let fusion = FusionLoop::new(
        settings(1, &["cell phone", "laptop"]),
        io,
        recorder(&dir, Box::new(MemoryBackend::new())),
        log.clone(),
        create_shared_stats(),
        running.clone(),
    );
    let keyboard = KeyboardConsumer::spawn(
        rx,
        KeyConfig::default(),
        log,
        running,
        create_shared_stats(),
    )
    .unwrap();

    let report = MonitorSession::new(fusion, keyboard).run();
    assert_eq!(report.termination, TerminationReason::EndOfStream);
    assert_eq!(report.keyboard.unwrap().events_logged, 3);

    let observed: Vec<(String, String)> = read_rows(&log_path)
        .unwrap()
        .iter()
        .map(|row| {
            let (kind, value) = row.observation().unwrap();
            (kind.to_string(), value.to_string())
        })
        .collect();
    let expected: Vec<(String, String)> = [
        ("prohibited_object", "cell phone"),
        ("key_pressed", "Tab"),
        ("window_focus_change", "Changed to: Browser"),
        ("key_pressed", "Tab"),
        ("window_focus_change", "Changed to: Exam"),
        ("prohibited_object", "laptop"),
        ("key_pressed", "Tab"),
    ]
    .iter()
    .map(|(kind, value)| (kind.to_string(), value.to_string()))
    .collect();
    assert_eq!(observed, expected);
}

#[test]
fn replayed_incident_written_as_image_sequence() {
    let dir = test_dir("sequence");
    let script = ReplayScript::from_json(
        r#"{
            "resolution": [48, 32],
            "frames": [
                {},
                { "detections": [{ "label": "cell phone", "bbox": [4, 4, 12, 12] }] },
                {}
            ]
        }"#,
    )
    .unwrap();
    let parts = script.into_parts(None, None).unwrap();

    let mut run = build(
        settings(1, &["cell phone"]),
        Box::new(parts.frames),
        vec![vec![], vec![phone()], vec![]],
        Box::new(parts.focus),
        recorder(&dir, Box::new(ImageSequenceBackend::new())),
        &dir,
    );
    run.fusion.run();
    let teardown = run.fusion.shutdown();
    assert!(teardown.recorder.is_none());

    let clip = run.fusion.recorder().clip_location().unwrap().to_path_buf();
    assert!(clip.starts_with(dir.join("clips")));
    assert!(clip.join(MANIFEST_FILE).exists());

    let mut pngs: Vec<_> = std::fs::read_dir(&clip)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".png"))
        .collect();
    pngs.sort();
    assert_eq!(pngs.len(), 2);

    let first = image::open(clip.join(&pngs[0])).unwrap();
    assert_eq!((first.width(), first.height()), (64, 48));
}
