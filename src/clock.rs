//! Monotonic wall-clock helpers shared by the capture pipeline, loop
//! controller, and loop players.
//!
//! The engine only ever needs two operations on time: "what time is it" and
//! "how many seconds between two timestamps". [`std::time::Instant`] already
//! gives us both with monotonicity guarantees, so this module is a thin
//! wrapper rather than a full clock trait — there is no simulated-clock
//! requirement in the spec, and the tests that need deterministic timing
//! inject fixed `f64` deltas directly into [`crate::message::MidiMessage`]
//! rather than mocking `Instant`.

use std::time::Instant;

/// Current monotonic time.
pub fn now() -> Instant {
    Instant::now()
}

/// Seconds elapsed from `earlier` to now, as an `f64`.
pub fn elapsed_secs_since(earlier: Instant) -> f64 {
    now().duration_since(earlier).as_secs_f64()
}
