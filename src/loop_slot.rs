//! The per-slot loop state container and its state machine (spec.md §3, §4.2).

use std::time::Instant;

use crate::message::MidiMessage;

/// Number of loop slots the engine manages. Slot 0 is the master; slots
/// 1..N_LOOPS are slaves.
pub const N_LOOPS: usize = 4;

/// One loop slot: clean, recording, or playing back, with the sync metadata
/// needed to phase-lock slaves to the master.
#[derive(Debug)]
pub struct LoopSlot {
    pub is_recording: bool,
    pub is_playback: bool,
    pub waiting_for_sync: bool,
    pub messages: Vec<MidiMessage>,
    pub start_recording_time: Option<Instant>,
    pub duration: Option<f64>,
    pub sync_delay: Option<f64>,
}

impl Default for LoopSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopSlot {
    pub fn new() -> Self {
        Self {
            is_recording: false,
            is_playback: false,
            waiting_for_sync: false,
            messages: Vec::new(),
            start_recording_time: None,
            duration: None,
            sync_delay: None,
        }
    }

    /// Reset this slot to empty, keeping it in the table (spec.md §3
    /// "Lifecycles").
    pub fn clean(&mut self) {
        self.is_recording = false;
        self.is_playback = false;
        self.waiting_for_sync = false;
        self.messages.clear();
        self.start_recording_time = None;
        self.duration = None;
        self.sync_delay = None;
    }

    /// A clean loop is not recording, not playing, and has no duration.
    pub fn is_clean(&self) -> bool {
        self.duration.is_none()
    }

    /// A loop needs at least two messages to have a meaningful duration
    /// (anchor + at least one more event).
    pub fn is_playable(&self) -> bool {
        self.messages.len() >= 2
    }

    /// Begin recording: clears the body, leaves `start_recording_time` unset
    /// until the first qualifying NoteOn arrives.
    pub fn start_recording(&mut self) {
        self.is_playback = false;
        self.is_recording = true;
        self.start_recording_time = None;
        self.messages.clear();
        self.duration = None;
        self.sync_delay = None;
    }

    /// Stop recording and fix the loop's duration from its start timestamp,
    /// if one was ever set (a loop that captured no NoteOn has no duration
    /// and remains clean).
    pub fn stop_recording(&mut self, now: Instant) {
        if !self.is_recording {
            return;
        }
        self.is_recording = false;
        self.duration = self
            .start_recording_time
            .map(|start| now.duration_since(start).as_secs_f64());
    }

    /// A short human-readable summary, as carried over from the original
    /// Python `Loop.status` property (used by monitor/GUI display).
    pub fn status(&self) -> String {
        if self.is_recording {
            "recording".to_string()
        } else if self.is_playback {
            format!("play - {:.1}sec", self.duration.unwrap_or(0.0))
        } else if let Some(duration) = self.duration {
            format!("stop - {duration:.1}sec")
        } else {
            String::new()
        }
    }
}
