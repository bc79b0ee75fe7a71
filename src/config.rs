//! Engine configuration (spec.md §6): the in-memory options the engine is
//! constructed with, and the persisted INI-like file they can be loaded
//! from / saved to.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::EngineResult;
use crate::loop_slot::N_LOOPS;
use crate::sink::MessageSink;

/// A loop-toggle MIDI signature: the `(controller_number, value)` pair of a
/// ControlChange message that toggles a given slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ToggleSignature {
    pub controller: u8,
    pub value: u8,
}

/// The options enumerated in spec.md §6's "Engine configuration" table.
pub struct EngineConfig {
    pub long_pause: Option<f64>,
    pub midi_file_name: String,
    pub bpm: f64,
    pub monitor: bool,
    pub write_message_function: Arc<dyn MessageSink>,
    pub loop_toggle_message_signature: [ToggleSignature; N_LOOPS],
}

impl EngineConfig {
    pub fn new(write_message_function: Arc<dyn MessageSink>) -> Self {
        Self {
            long_pause: Some(30.0),
            midi_file_name: "midi_notebook-{0}.mid".to_string(),
            bpm: 120.0,
            monitor: true,
            write_message_function,
            loop_toggle_message_signature: Default::default(),
        }
    }
}

/// Ports selected at startup, read from / written to the persisted config
/// alongside the toggle signatures.
#[derive(Clone, Copy, Debug, Default)]
pub struct PortSelection {
    pub input_port: Option<usize>,
    pub output_port: Option<usize>,
}

/// Reader/writer for the INI-like persisted configuration file described in
/// spec.md §6: sections `MIDI_PORTS` (`input`, `output`) and
/// `LOOP_MIDI_TRIGGERS` (`loop_N_ccn`, `loop_N_value`).
///
/// There's no ecosystem INI crate in wide use for this shape in the
/// retrieved reference pack, and the original Python's `configparser`
/// output needs to round-trip verbatim, so this is a small hand-rolled
/// reader/writer rather than a dependency (see DESIGN.md).
pub struct PersistedConfig {
    path: PathBuf,
}

impl PersistedConfig {
    pub const FILE_NAME: &'static str = "midi_notebook.config";

    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the file if present. Missing file is not an error (defaults
    /// apply); malformed integers are tolerated and leave the field `None`,
    /// matching the original's `configparser.getint` fallback behavior.
    pub fn read(&self) -> EngineResult<(PortSelection, [ToggleSignature; N_LOOPS])> {
        let mut ports = PortSelection::default();
        let mut signatures = [ToggleSignature::default(); N_LOOPS];

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((ports, signatures)),
            Err(e) => return Err(e.into()),
        };

        let sections = parse_ini(&contents);

        if let Some(section) = sections.get("MIDI_PORTS") {
            ports.input_port = section.get("input").and_then(|v| v.parse().ok());
            ports.output_port = section.get("output").and_then(|v| v.parse().ok());
        }

        if let Some(section) = sections.get("LOOP_MIDI_TRIGGERS") {
            for (n, sig) in signatures.iter_mut().enumerate() {
                if let Some(v) = section
                    .get(&format!("loop_{n}_ccn"))
                    .and_then(|v| v.parse().ok())
                {
                    sig.controller = v;
                }
                if let Some(v) = section
                    .get(&format!("loop_{n}_value"))
                    .and_then(|v| v.parse().ok())
                {
                    sig.value = v;
                }
            }
        }

        Ok((ports, signatures))
    }

    /// Serialize the current ports and toggle signatures verbatim.
    pub fn write(
        &self,
        ports: PortSelection,
        signatures: &[ToggleSignature; N_LOOPS],
    ) -> EngineResult<()> {
        let mut out = String::new();

        out.push_str("[MIDI_PORTS]\n");
        out.push_str(&format!(
            "input = {}\n",
            ports.input_port.map(|p| p.to_string()).unwrap_or_default()
        ));
        out.push_str(&format!(
            "output = {}\n",
            ports
                .output_port
                .map(|p| p.to_string())
                .unwrap_or_default()
        ));
        out.push('\n');

        out.push_str("[LOOP_MIDI_TRIGGERS]\n");
        for (n, sig) in signatures.iter().enumerate() {
            out.push_str(&format!("loop_{n}_ccn = {}\n", sig.controller));
            out.push_str(&format!("loop_{n}_value = {}\n", sig.value));
        }

        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

/// Minimal `[section]` / `key = value` INI parser. Blank lines and lines
/// starting with `#` or `;` are ignored.
fn parse_ini(contents: &str) -> HashMap<String, HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current = String::new();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            current = name.to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            sections
                .entry(current.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use std::sync::Arc;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = PersistedConfig::new("/tmp/__midi_notebook_does_not_exist__.config");
        let (ports, sigs) = cfg.read().unwrap();
        assert_eq!(ports.input_port, None);
        assert_eq!(sigs[0], ToggleSignature::default());
    }

    #[test]
    fn round_trips_ports_and_signatures() {
        let dir = std::env::temp_dir().join(format!(
            "midi_notebook_test_{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("midi_notebook.config");
        let cfg = PersistedConfig::new(&path);

        let ports = PortSelection {
            input_port: Some(1),
            output_port: Some(2),
        };
        let mut sigs = [ToggleSignature::default(); N_LOOPS];
        sigs[2] = ToggleSignature {
            controller: 22,
            value: 127,
        };

        cfg.write(ports, &sigs).unwrap();
        let (read_ports, read_sigs) = cfg.read().unwrap();
        assert_eq!(read_ports.input_port, Some(1));
        assert_eq!(read_ports.output_port, Some(2));
        assert_eq!(read_sigs[2], sigs[2]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn malformed_integer_leaves_field_unset() {
        let dir = std::env::temp_dir().join(format!(
            "midi_notebook_test_malformed_{:?}",
            std::thread::current().id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("midi_notebook.config");
        std::fs::write(&path, "[MIDI_PORTS]\ninput = not-a-number\noutput = 3\n").unwrap();

        let cfg = PersistedConfig::new(&path);
        let (ports, _) = cfg.read().unwrap();
        assert_eq!(ports.input_port, None);
        assert_eq!(ports.output_port, Some(3));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sink_receives_lines() {
        let sink = Arc::new(RecordingSink::new());
        sink.write_message("hello");
        assert_eq!(sink.lines(), vec!["hello".to_string()]);
    }
}
