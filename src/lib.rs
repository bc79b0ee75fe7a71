//! Realtime MIDI monitor, looper, and notebook engine.
//!
//! This crate is the Looper Engine described in spec.md: a realtime capture
//! pipeline, four phase-locked loop slots, loopback-aware fan-out, and an
//! offline MIDI file exporter. GUI shell, command-line parsing beyond the
//! two `-inN`/`-outN` flags, and the persisted configuration file's callers
//! live in the `midi_notebook` binary; everything here is driver-agnostic.

pub mod autosave;
pub mod capture;
pub mod cli;
pub mod clock;
pub mod config;
pub mod controller;
pub mod driver;
pub mod engine;
pub mod error;
pub mod exporter;
pub mod loop_slot;
pub mod message;
pub mod player;
pub mod sink;
pub mod smf;
pub mod sync;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use message::MidiMessage;
