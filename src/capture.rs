//! The capture pipeline (spec.md §4.1): the callback sink every inbound and
//! loopback message passes through.

use std::sync::Arc;

use crate::engine::Engine;
use crate::loop_slot::N_LOOPS;
use crate::message::{EventType, MidiMessage};

impl Engine {
    /// `capture(msg_bytes, driver_delta_seconds, loopback)` from spec.md
    /// §4.1. Called by the MIDI driver for real input (`loopback = false`).
    ///
    /// `driver_delta_seconds` is accepted for parity with the driver
    /// callback signature but, per spec.md §4.1 step 2, the engine always
    /// recomputes its own delta from its monotonic clock rather than trust
    /// the driver's timestamp.
    pub fn capture(self: &Arc<Self>, msg_bytes: &[u8], driver_delta_seconds: f64) {
        self.capture_inner(msg_bytes, driver_delta_seconds, None);
    }

    /// Feedback path from a loop player (spec.md §4.3 step 2): `n` is the
    /// slot that played the message back, used only to pick the monitor
    /// display column (spec.md §6 "Monitor display format").
    pub(crate) fn capture_loopback(self: &Arc<Self>, msg_bytes: &[u8], n: usize) {
        self.capture_inner(msg_bytes, 0.0, Some(n));
    }

    fn capture_inner(
        self: &Arc<Self>,
        msg_bytes: &[u8],
        _driver_delta_seconds: f64,
        loop_index: Option<usize>,
    ) {
        let loopback = loop_index.is_some();

        let Some(mut message) = MidiMessage::from_bytes(msg_bytes, 0.0) else {
            return;
        };

        if !loopback {
            for n in 0..N_LOOPS {
                if self.matches_toggle_signature(&message, n) {
                    self.toggle_loop(n);
                    return;
                }
            }
        }

        let now = crate::clock::now();
        let mut state = self.state.lock().unwrap();

        let delta = if state.notebook.is_empty() {
            0.0
        } else {
            now.duration_since(state.last_event).as_secs_f64()
        };
        state.last_event = now;
        message.delta_seconds = delta;
        state.notebook.push(message);

        if self.config.monitor {
            let message_position = loop_index
                .or_else(|| state.loops.iter().position(|l| l.is_recording))
                .unwrap_or(0);
            drop(state);
            self.write_midi_message(&message, message_position, !loopback);
            state = self.state.lock().unwrap();
        }

        if !loopback {
            for n in 0..N_LOOPS {
                if state.loops[n].is_recording {
                    self.handle_message_loop(&mut state, message, n);
                }
            }
        }
    }

    fn matches_toggle_signature(&self, message: &MidiMessage, n: usize) -> bool {
        let signature = self.config.loop_toggle_message_signature[n];
        message.event_type() == EventType::ControlChange
            && message.data1 == signature.controller
            && message.data2 == signature.value
    }

    /// `handle_message_loop(msg, n)` from spec.md §4.1: append to the
    /// recording slot's body once it has an anchor NoteOn, and set up the
    /// slave's `sync_delay` the moment that anchor fires.
    pub(crate) fn handle_message_loop(
        &self,
        state: &mut crate::engine::EngineState,
        message: MidiMessage,
        n: usize,
    ) {
        if state.loops[n].start_recording_time.is_none() {
            if message.event_type() != EventType::NoteOn {
                return;
            }
            let last_event = state.last_event;
            state.loops[n].start_recording_time = Some(last_event);
            if n > 0 && self.sync.is_active() {
                if let Some(last_tick) = self.sync.last_tick() {
                    state.loops[n].sync_delay =
                        Some(last_event.duration_since(last_tick).as_secs_f64());
                }
            }
        }

        state.loops[n].messages.push(message);
    }

    /// Monitor display line (spec.md §6 "Monitor display format"): four
    /// 19-character columns, one per slot, the active one prefixed `*` for
    /// a recording-source message or a space for a loopback one.
    fn write_midi_message(&self, message: &MidiMessage, position: usize, recording: bool) {
        let mut line = String::from(" ");
        for n in 0..N_LOOPS {
            if n == position {
                let marker = if recording { '*' } else { ' ' };
                line.push_str(&format!(" {marker}{message:<19}|"));
            } else {
                line.push_str(&format!("  {:<19}|", ""));
            }
        }
        self.write_message(&line);
    }
}
