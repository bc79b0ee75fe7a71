//! Capability interfaces for MIDI port I/O (spec.md §6), and a `midir`-backed
//! implementation for the runnable binary.
//!
//! The core engine (capture, controller, player, sync, exporter) only ever
//! sees [`InputPortDriver`] / [`OutputPortDriver`] / [`OutputConnection`].
//! Nothing downstream of those traits knows `midir` exists.

use crate::error::{EngineError, EngineResult};

/// Enumerates and opens MIDI input ports, registering a callback for each
/// inbound message.
pub trait InputPortDriver: Send + Sync {
    /// Port names in driver-reported order.
    fn port_names(&self) -> EngineResult<Vec<String>>;

    /// Open port `index`, invoking `callback(bytes, driver_delta_seconds)`
    /// for every message received. The returned handle keeps the connection
    /// alive; dropping it closes the port.
    fn open(
        &self,
        index: usize,
        client_name: &str,
        callback: Box<dyn FnMut(&[u8], f64) + Send>,
    ) -> EngineResult<Box<dyn InputConnection>>;
}

/// A live input connection. Carries no API surface of its own — its only
/// job is to keep the underlying driver connection alive for as long as the
/// engine holds it, and to close it on drop.
pub trait InputConnection: Send {}

/// Enumerates and opens MIDI output ports.
pub trait OutputPortDriver: Send + Sync {
    fn port_names(&self) -> EngineResult<Vec<String>>;

    fn open(&self, index: usize, client_name: &str) -> EngineResult<Box<dyn OutputConnection>>;
}

/// A live output connection messages get sent through.
pub trait OutputConnection: Send {
    fn send_message(&mut self, bytes: &[u8]) -> EngineResult<()>;
}

/// `midir`-backed [`InputPortDriver`].
pub struct MidirInputDriver;

impl InputPortDriver for MidirInputDriver {
    fn port_names(&self) -> EngineResult<Vec<String>> {
        let midi_in =
            midir::MidiInput::new("midi-notebook-probe").map_err(|e| EngineError::Driver(e.to_string()))?;
        Ok(midi_in
            .ports()
            .iter()
            .map(|p| {
                midi_in
                    .port_name(p)
                    .unwrap_or_else(|_| "<unknown port>".to_string())
            })
            .collect())
    }

    fn open(
        &self,
        index: usize,
        client_name: &str,
        mut callback: Box<dyn FnMut(&[u8], f64) + Send>,
    ) -> EngineResult<Box<dyn InputConnection>> {
        let midi_in =
            midir::MidiInput::new(client_name).map_err(|e| EngineError::Driver(e.to_string()))?;
        let ports = midi_in.ports();
        let port = ports
            .get(index)
            .ok_or(EngineError::InvalidInputPort(index))?
            .clone();

        let mut last_stamp_us: Option<u64> = None;
        let connection = midi_in
            .connect(
                &port,
                client_name,
                move |stamp_us, bytes, _| {
                    let delta = match last_stamp_us {
                        Some(prev) => (stamp_us.saturating_sub(prev)) as f64 / 1_000_000.0,
                        None => 0.0,
                    };
                    last_stamp_us = Some(stamp_us);
                    callback(bytes, delta);
                },
                (),
            )
            .map_err(|e| EngineError::Driver(e.to_string()))?;

        Ok(Box::new(MidirInputConnection { connection }))
    }
}

struct MidirInputConnection {
    #[allow(dead_code)]
    connection: midir::MidiInputConnection<()>,
}

impl InputConnection for MidirInputConnection {}

/// `midir`-backed [`OutputPortDriver`].
pub struct MidirOutputDriver;

impl OutputPortDriver for MidirOutputDriver {
    fn port_names(&self) -> EngineResult<Vec<String>> {
        let midi_out = midir::MidiOutput::new("midi-notebook-probe")
            .map_err(|e| EngineError::Driver(e.to_string()))?;
        Ok(midi_out
            .ports()
            .iter()
            .map(|p| {
                midi_out
                    .port_name(p)
                    .unwrap_or_else(|_| "<unknown port>".to_string())
            })
            .collect())
    }

    fn open(&self, index: usize, client_name: &str) -> EngineResult<Box<dyn OutputConnection>> {
        let midi_out =
            midir::MidiOutput::new(client_name).map_err(|e| EngineError::Driver(e.to_string()))?;
        let ports = midi_out.ports();
        let port = ports
            .get(index)
            .ok_or(EngineError::InvalidOutputPort(index))?
            .clone();
        let connection = midi_out
            .connect(&port, client_name)
            .map_err(|e| EngineError::Driver(e.to_string()))?;
        Ok(Box::new(MidirOutputConnection { connection }))
    }
}

struct MidirOutputConnection {
    connection: midir::MidiOutputConnection,
}

impl OutputConnection for MidirOutputConnection {
    fn send_message(&mut self, bytes: &[u8]) -> EngineResult<()> {
        self.connection
            .send(bytes)
            .map_err(|e| EngineError::Driver(e.to_string()))
    }
}
