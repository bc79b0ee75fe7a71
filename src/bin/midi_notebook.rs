//! Runnable binary wiring the Looper Engine to real MIDI hardware.
//!
//! Mirrors `midi_notebook.py`'s `main()`: read the persisted config for
//! toggle signatures, parse `-inN`/`-outN`, print port info, start
//! recording, install a Ctrl+C handler that saves once and exits, then run
//! the idle-autosave poller until interrupted.

use std::sync::Arc;

use midi_notebook::cli::CliArgs;
use midi_notebook::config::{EngineConfig, PersistedConfig};
use midi_notebook::driver::{MidirInputDriver, MidirOutputDriver};
use midi_notebook::sink::LogSink;
use midi_notebook::smf::MidlySmfWriter;
use midi_notebook::Engine;

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match CliArgs::parse(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let persisted = PersistedConfig::new(PersistedConfig::FILE_NAME);
    let (ports, signatures) = persisted.read().unwrap_or_default();

    let sink = Arc::new(LogSink);
    let mut config = EngineConfig::new(sink);
    config.loop_toggle_message_signature = signatures;

    let engine = Engine::new(
        config,
        Box::new(MidirInputDriver),
        Box::new(MidirOutputDriver),
        Box::new(MidlySmfWriter::new),
    );

    let input_port = cli.input_port.or(ports.input_port);
    let output_port = cli.output_port.or(ports.output_port);

    if let Err(e) = engine.set_input_port(input_port) {
        log::error!("{e}");
    }
    if let Err(e) = engine.set_output_port(output_port) {
        log::error!("{e}");
    }

    if let Err(e) = engine.print_info() {
        log::error!("{e}");
    }

    if let Err(e) = engine.start_recording() {
        log::error!("failed to start recording: {e}");
        std::process::exit(1);
    }

    let shutdown_engine = Arc::clone(&engine);
    ctrlc::set_handler(move || {
        if let Err(e) = shutdown_engine.save_midi_file() {
            log::error!("failed to save on shutdown: {e}");
        }
        println!("Bye.");
        std::process::exit(0);
    })
    .expect("failed to install Ctrl+C handler");

    println!("Press Ctrl+C to save and exit.");

    let _autosave = engine.spawn_autosave_loop();

    loop {
        std::thread::sleep(std::time::Duration::from_secs(3600));
    }
}
