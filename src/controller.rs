//! The loop controller (spec.md §4.2): toggle semantics, double-tap
//! detection, and the start/stop/play/clean transitions for a slot.

use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;
use crate::loop_slot::N_LOOPS;

/// Two toggles on the same slot inside this window count as a double-tap.
const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(500);

impl Engine {
    /// `toggle_loop(n)` from spec.md §4.2. `last_toggle_time[n]` is updated
    /// only on the single-tap branch, so a run of sub-500ms taps keeps
    /// re-triggering "clear & record" rather than only the second one.
    pub fn toggle_loop(self: &Arc<Self>, n: usize) {
        let now = crate::clock::now();

        let since_last = {
            let state = self.state.lock().unwrap();
            now.duration_since(state.last_toggle_time[n])
        };

        if since_last < DOUBLE_TAP_WINDOW {
            self.clean_loop(n);
            self.start_loop_recording(n);
            return;
        }

        self.state.lock().unwrap().last_toggle_time[n] = now;

        let (is_playback, is_recording, is_clean) = {
            let state = self.state.lock().unwrap();
            (
                state.loops[n].is_playback,
                state.loops[n].is_recording,
                state.loops[n].is_clean(),
            )
        };

        if is_playback {
            self.stop_loop(n);
        } else if is_recording {
            let playable = self.stop_loop_recording(n);
            if playable {
                self.play_loop(n);
            } else {
                self.state.lock().unwrap().loops[n].clean();
                self.start_loop_recording(n);
            }
        } else if is_clean {
            self.start_loop_recording(n);
        } else {
            self.play_loop(n);
        }
    }

    /// `start_recording(n)` from spec.md §4.2: only one slot may record at
    /// a time, so every other slot stops first; a re-record of the master
    /// invalidates every slave.
    pub(crate) fn start_loop_recording(self: &Arc<Self>, n: usize) {
        {
            let now = crate::clock::now();
            let mut state = self.state.lock().unwrap();
            for loop_slot in state.loops.iter_mut() {
                loop_slot.stop_recording(now);
            }
            state.loops[n].is_playback = false;
        }

        if let Some(player) = self.players.lock().unwrap()[n].take() {
            player.force_exit();
        }

        if n == 0 {
            self.clean_loop(0);
            for slave in 1..N_LOOPS {
                self.stop_loop(slave);
            }
        }

        self.state.lock().unwrap().loops[n].start_recording();
    }

    /// `stop_recording(n)`: fixes the slot's duration and reports whether
    /// the captured body is playable.
    pub(crate) fn stop_loop_recording(&self, n: usize) -> bool {
        let now = crate::clock::now();
        let mut state = self.state.lock().unwrap();
        state.loops[n].stop_recording(now);
        state.loops[n].is_playable()
    }

    /// `play_loop(n)` from spec.md §4.2, including the master-resume
    /// exception: if the master is re-triggered while a slave is already
    /// playing and a master player is already running, the existing master
    /// player is left alone so the slaves' phase lock survives.
    pub fn play_loop(self: &Arc<Self>, n: usize) {
        let non_master_playing = {
            let state = self.state.lock().unwrap();
            state.loops[1..].iter().any(|l| l.is_playback)
        };

        self.state.lock().unwrap().loops[n].is_playback = true;

        let prior_exists = self.players.lock().unwrap()[n].is_some();
        let need_resume_master = n == 0 && non_master_playing && prior_exists;

        if !need_resume_master {
            let handle = self.spawn_player(n);
            let mut players = self.players.lock().unwrap();
            let prior = players[n].take();
            players[n] = Some(handle);
            drop(players);
            if let Some(prior) = prior {
                prior.force_exit();
            }
        }
    }

    /// `stop_loop(n)`: mutes output. Only slaves actually end their player
    /// thread on this; the master's player keeps running muted (spec.md §9).
    pub fn stop_loop(&self, n: usize) {
        self.state.lock().unwrap().loops[n].is_playback = false;
    }

    /// `clean_loop(n)`: resets the slot; cleaning the master deactivates
    /// sync, causing any waiting slave to free-run.
    pub fn clean_loop(&self, n: usize) {
        self.state.lock().unwrap().loops[n].clean();
        if n == 0 {
            self.sync.deactivate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::driver::{InputConnection, InputPortDriver, OutputConnection, OutputPortDriver};
    use crate::error::EngineResult;
    use crate::sink::RecordingSink;
    use crate::smf::MidlySmfWriter;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    struct NullInputDriver;
    impl InputPortDriver for NullInputDriver {
        fn port_names(&self) -> EngineResult<Vec<String>> {
            Ok(vec![])
        }
        fn open(
            &self,
            _index: usize,
            _client_name: &str,
            _callback: Box<dyn FnMut(&[u8], f64) + Send>,
        ) -> EngineResult<Box<dyn InputConnection>> {
            unreachable!()
        }
    }

    struct NullOutputDriver;
    impl OutputPortDriver for NullOutputDriver {
        fn port_names(&self) -> EngineResult<Vec<String>> {
            Ok(vec![])
        }
        fn open(&self, _index: usize, _client_name: &str) -> EngineResult<Box<dyn OutputConnection>> {
            unreachable!()
        }
    }

    fn test_engine() -> Arc<Engine> {
        let sink = Arc::new(RecordingSink::new());
        let config = EngineConfig::new(sink);
        Engine::new(
            config,
            Box::new(NullInputDriver),
            Box::new(NullOutputDriver),
            Box::new(MidlySmfWriter::new),
        )
    }

    #[test]
    fn clean_slot_starts_recording_on_toggle() {
        let engine = test_engine();
        engine.toggle_loop(0);
        let state = engine.state.lock().unwrap();
        assert!(state.loops[0].is_recording);
    }

    #[test]
    fn at_most_one_slot_records_at_a_time() {
        let engine = test_engine();
        engine.toggle_loop(0);
        engine.toggle_loop(1);
        let state = engine.state.lock().unwrap();
        assert!(!state.loops[0].is_recording);
        assert!(state.loops[1].is_recording);
    }

    #[test]
    fn double_tap_clears_and_restarts_recording() {
        let engine = test_engine();
        engine.state.lock().unwrap().loops[3].is_playback = true;

        engine.toggle_loop(3);
        thread::sleep(Duration::from_millis(50));
        engine.toggle_loop(3);

        let state = engine.state.lock().unwrap();
        assert!(state.loops[3].is_recording);
        assert!(state.loops[3].messages.is_empty());
        assert!(!state.loops[3].is_playback);
    }

    #[test]
    fn recording_with_empty_body_restarts_recording_on_toggle() {
        let engine = test_engine();
        engine.toggle_loop(0); // -> recording
        // no messages captured; toggling again (slowly) should stop, see
        // it's not playable, and restart recording rather than play.
        thread::sleep(Duration::from_millis(600));
        engine.toggle_loop(0);
        let state = engine.state.lock().unwrap();
        assert!(state.loops[0].is_recording);
    }
}
