//! One monitoring session: the fusion loop on the calling thread and the
//! keyboard listener beside it.

use crate::core::fusion::{FusionLoop, TeardownReport, TerminationReason};
use crate::core::keyboard::{KeyboardConsumer, KeyboardReport};
use crate::core::recorder::RecorderState;
use std::path::PathBuf;
use tracing::{info, warn};

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    pub termination: TerminationReason,
    pub frames: u64,
    /// `None` if the listener had already been stopped or panicked
    pub keyboard: Option<KeyboardReport>,
    pub teardown: TeardownReport,
    /// Where the incident clip went, if recording was triggered
    pub clip: Option<PathBuf>,
    pub clip_frames: u64,
}

impl SessionReport {
    pub fn incident_recorded(&self) -> bool {
        self.clip.is_some()
    }
}

pub struct MonitorSession {
    fusion: FusionLoop,
    keyboard: KeyboardConsumer,
}

impl MonitorSession {
    pub fn new(fusion: FusionLoop, keyboard: KeyboardConsumer) -> Self {
        Self { fusion, keyboard }
    }

    pub fn fusion(&self) -> &FusionLoop {
        &self.fusion
    }

    /// Run to completion, then tear down: frame source, recording, keyboard
    /// listener. Each step runs even if an earlier one failed.
    pub fn run(mut self) -> SessionReport {
        let termination = self.fusion.run();
        info!(?termination, frames = self.fusion.frame_count(), "session ended");

        let teardown = self.fusion.shutdown();
        let keyboard = self.keyboard.stop();
        if keyboard.is_none() {
            warn!("keyboard listener did not report");
        }

        let recorder = self.fusion.recorder();
        let clip = match recorder.state() {
            RecorderState::Recording => recorder.clip_location().map(|p| p.to_path_buf()),
            RecorderState::Idle => None,
        };

        SessionReport {
            termination,
            frames: self.fusion.frame_count(),
            keyboard,
            teardown,
            clip,
            clip_frames: recorder.frames_written(),
        }
    }
}
