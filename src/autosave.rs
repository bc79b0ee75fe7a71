//! The Idle Autosave Loop (spec.md §4.6): a ~1 Hz poller that triggers the
//! exporter once the notebook has gone quiet for `long_pause` seconds.
//!
//! Matches `MidiNotebookContext.start_main_loop` in the original Python
//! source: `long_pause = None` disables autosave entirely, and polling I/O
//! errors are swallowed rather than killing the loop (spec.md §7).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::engine::Engine;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A handle to the background autosave thread, stoppable from the host
/// thread on shutdown.
pub struct AutosaveHandle {
    stop: Arc<AtomicBool>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl AutosaveHandle {
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Engine {
    /// Spawn the T3 autosave poller (spec.md §5). Runs until `stop()` is
    /// called on the returned handle.
    pub fn spawn_autosave_loop(self: &Arc<Self>) -> AutosaveHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let engine = Arc::clone(self);

        let join_handle = thread::spawn(move || loop {
            if thread_stop.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(POLL_INTERVAL);
            if thread_stop.load(Ordering::SeqCst) {
                return;
            }
            if engine.is_time_to_save() {
                if let Err(e) = engine.save_midi_file() {
                    log::warn!("autosave failed: {e}");
                }
            }
        });

        AutosaveHandle {
            stop,
            join_handle: Some(join_handle),
        }
    }
}
