//! The process-wide engine context (spec.md §3 "Engine state", §9
//! "Process-wide engine context"): the shared handle every thread holds a
//! clone of.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::EngineConfig;
use crate::driver::{InputConnection, InputPortDriver, OutputConnection, OutputPortDriver};
use crate::error::{EngineError, EngineResult};
use crate::loop_slot::{LoopSlot, N_LOOPS};
use crate::message::MidiMessage;
use crate::smf::SmfWriter;
use crate::sync::SyncBarrier;

/// Everything guarded by the single "capture-log lock" named in spec.md §9:
/// the notebook log, the four loop slots, the double-tap timestamps, and the
/// currently-selected port indices. One lock for all of it keeps the
/// ordering guarantees in spec.md §5 trivially true: whichever thread holds
/// the lock sees a fully consistent snapshot of loop + log state.
pub(crate) struct EngineState {
    pub notebook: Vec<MidiMessage>,
    pub last_event: Instant,
    pub loops: [LoopSlot; N_LOOPS],
    pub last_toggle_time: [Instant; N_LOOPS],
    pub input_port: Option<usize>,
    pub output_port: Option<usize>,
}

impl EngineState {
    fn new() -> Self {
        let now = crate::clock::now();
        Self {
            notebook: Vec::new(),
            last_event: now,
            loops: Default::default(),
            last_toggle_time: [now; N_LOOPS],
            input_port: None,
            output_port: None,
        }
    }
}

/// A running loop player: the cooperative-cancellation flag and join handle
/// described in spec.md §5 "Cancellation & timeouts".
pub(crate) struct PlayerHandle {
    pub force_exit: Arc<AtomicBool>,
    pub join_handle: Option<std::thread::JoinHandle<()>>,
}

impl PlayerHandle {
    pub fn force_exit(&self) {
        self.force_exit.store(true, Ordering::SeqCst);
    }
}

pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) state: Mutex<EngineState>,
    pub(crate) sync: SyncBarrier,
    pub(crate) output: Mutex<Option<Box<dyn OutputConnection>>>,
    pub(crate) input_driver: Box<dyn InputPortDriver>,
    pub(crate) output_driver: Box<dyn OutputPortDriver>,
    pub(crate) smf_writer_factory: Box<dyn Fn() -> Box<dyn SmfWriter> + Send + Sync>,
    pub(crate) input_connections: Mutex<Vec<Box<dyn InputConnection>>>,
    pub(crate) players: Mutex<[Option<PlayerHandle>; N_LOOPS]>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        input_driver: Box<dyn InputPortDriver>,
        output_driver: Box<dyn OutputPortDriver>,
        smf_writer_factory: Box<dyn Fn() -> Box<dyn SmfWriter> + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(EngineState::new()),
            sync: SyncBarrier::new(),
            output: Mutex::new(None),
            input_driver,
            output_driver,
            smf_writer_factory,
            input_connections: Mutex::new(Vec::new()),
            players: Mutex::new(Default::default()),
        })
    }

    pub fn write_message(&self, line: &str) {
        self.config.write_message_function.write_message(line);
    }

    pub fn input_port_names(&self) -> EngineResult<Vec<String>> {
        self.input_driver.port_names()
    }

    pub fn output_port_names(&self) -> EngineResult<Vec<String>> {
        self.output_driver.port_names()
    }

    /// Select which input port to record from (`None` means "all ports").
    /// An out-of-range index is reported and falls back to `None`.
    pub fn set_input_port(&self, port: Option<usize>) -> EngineResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(p) = port {
            let count = self.input_driver.port_names()?.len();
            if p >= count {
                self.write_message(&format!(
                    "MIDI in port {p} is invalid: using all ports."
                ));
                state.input_port = None;
                return Ok(());
            }
        }
        state.input_port = port;
        Ok(())
    }

    /// Select the output port used by loop players. Stops every playing
    /// loop (master last, matching the Python setter's reversed iteration)
    /// and closes any previously-open output connection.
    pub fn set_output_port(self: &Arc<Self>, port: Option<usize>) -> EngineResult<()> {
        self.write_message(&format!("Setting MIDI output port to {port:?}."));

        let resolved = if let Some(p) = port {
            let count = self.output_driver.port_names()?.len();
            if p >= count {
                self.write_message(&format!(
                    "MIDI out port {p} is invalid: stopping output."
                ));
                None
            } else {
                Some(p)
            }
        } else {
            None
        };

        for n in (0..N_LOOPS).rev() {
            let is_playback = self.state.lock().unwrap().loops[n].is_playback;
            if is_playback {
                self.stop_loop(n);
            }
        }

        self.state.lock().unwrap().output_port = resolved;
        *self.output.lock().unwrap() = None;
        Ok(())
    }

    /// Open every configured input port (or all driver-reported ports, if
    /// none was selected) and register the capture callback on each.
    pub fn start_recording(self: &Arc<Self>) -> EngineResult<()> {
        let selected = self.state.lock().unwrap().input_port;

        match selected {
            Some(port) => {
                let count = self.input_driver.port_names()?.len();
                if port >= count {
                    self.write_message(&format!(
                        "MIDI in port {port} is invalid: using all ports."
                    ));
                    self.state.lock().unwrap().input_port = None;
                    return self.start_recording();
                }
                self.open_input_port(port)?;
            }
            None => {
                let count = self.input_driver.port_names()?.len();
                for n in 0..count {
                    self.open_input_port(n)?;
                }
            }
        }
        Ok(())
    }

    fn open_input_port(self: &Arc<Self>, port: usize) -> EngineResult<()> {
        let engine = Arc::clone(self);
        let connection = self.input_driver.open(
            port,
            "midi-notebook",
            Box::new(move |bytes, driver_delta_seconds| {
                engine.capture(bytes, driver_delta_seconds);
            }),
        )?;
        self.input_connections.lock().unwrap().push(connection);
        Ok(())
    }

    /// Lazily acquire the shared output connection, opening it on first use
    /// (spec.md §5 "Shared resources").
    pub(crate) fn ensure_output_connection(&self) -> EngineResult<()> {
        let mut output = self.output.lock().unwrap();
        if output.is_some() {
            return Ok(());
        }
        let port = self
            .state
            .lock()
            .unwrap()
            .output_port
            .ok_or(EngineError::OutputPortNotSelected)?;
        let connection = self.output_driver.open(port, "midi-notebook")?;
        *output = Some(connection);
        Ok(())
    }

    pub(crate) fn send_output(&self, bytes: &[u8]) -> EngineResult<()> {
        let mut output = self.output.lock().unwrap();
        match output.as_mut() {
            Some(conn) => conn.send_message(bytes),
            None => Err(EngineError::OutputPortNotSelected),
        }
    }

    /// Reset the engine to its just-constructed state: clears the notebook
    /// log, force-exits every player, and deactivates sync. Mirrors
    /// `MidiNotebookContext.clean_all` in the original implementation.
    pub fn clean_all(self: &Arc<Self>) {
        let mut players = self.players.lock().unwrap();
        for slot in players.iter_mut() {
            if let Some(player) = slot.take() {
                player.force_exit();
            }
        }
        drop(players);

        let mut state = self.state.lock().unwrap();
        state.notebook.clear();
        state.last_event = crate::clock::now();
        for loop_slot in state.loops.iter_mut() {
            loop_slot.clean();
        }
        state.last_toggle_time = [crate::clock::now(); N_LOOPS];
        drop(state);

        self.sync.deactivate();
    }

    /// `print_info()` from the original `MidiNotebookContext`: reports
    /// available ports and which ones are currently selected through the
    /// write-message sink.
    pub fn print_info(&self) -> EngineResult<()> {
        let selected_input = self.state.lock().unwrap().input_port;
        self.write_message("MIDI IN PORTS:");
        for (n, name) in self.input_port_names()?.into_iter().enumerate() {
            let marker = if Some(n) == selected_input { " [SELECTED]" } else { "" };
            self.write_message(&format!("[{n}] {name}{marker}"));
        }
        if selected_input.is_none() {
            self.write_message("Recording from ALL MIDI ports.");
        }
        self.write_message("");

        let selected_output = self.state.lock().unwrap().output_port;
        self.write_message("MIDI OUT PORTS:");
        for (n, name) in self.output_port_names()?.into_iter().enumerate() {
            let marker = if Some(n) == selected_output { " [SELECTED]" } else { "" };
            self.write_message(&format!("[{n}] {name}{marker}"));
        }
        if selected_output.is_none() {
            self.write_message("Playback disabled (no output port selected).");
        }

        Ok(())
    }
}
