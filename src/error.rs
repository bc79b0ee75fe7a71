//! Error taxonomy for the engine's fallible edges.
//!
//! None of these are fatal to a running engine (spec.md §7): the binary logs
//! them through the [`crate::sink::MessageSink`] and keeps going. They exist
//! so callers get a typed `Result` instead of engine methods silently
//! swallowing everything.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("MIDI in port {0} is invalid: using all ports")]
    InvalidInputPort(usize),

    #[error("MIDI out port {0} is invalid: stopping output")]
    InvalidOutputPort(usize),

    #[error("Please select a MIDI output port.")]
    OutputPortNotSelected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write MIDI file: {0}")]
    MidiFileWrite(String),

    #[error("failed to open MIDI driver: {0}")]
    Driver(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
