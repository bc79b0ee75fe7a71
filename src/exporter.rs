//! The MIDI File Exporter (spec.md §4.5): drains the notebook log and lowers
//! it into a two-track Standard MIDI File via the [`crate::smf::SmfWriter`]
//! capability.

use std::fs::File;

use crate::engine::Engine;
use crate::message::{EventType, MidiMessage};

const TEMPO_TRACK: usize = 0;
const SONG_TRACK: usize = 1;
const SUSTAIN_FALLBACK_SECONDS: f64 = 15.0;

struct NoteEvent {
    note: u8,
    velocity: u8,
    channel: u8,
    time_beats: f64,
    duration_beats: f64,
}

struct ControllerEvent {
    controller: u8,
    value: u8,
    channel: u8,
    time_beats: f64,
}

impl Engine {
    /// `is_time_to_save()` from spec.md §4.6: `long_pause = None` disables
    /// autosave entirely.
    pub(crate) fn is_time_to_save(&self) -> bool {
        let Some(long_pause) = self.config.long_pause else {
            return false;
        };
        let state = self.state.lock().unwrap();
        crate::clock::elapsed_secs_since(state.last_event) > long_pause
    }

    /// `save_midi_file()` from spec.md §4.5. A no-op on an empty log, per
    /// spec.md §4.5 and §7 ("autosave on an empty log: silent no-op").
    ///
    /// The notebook log is only drained once the file has actually been
    /// written (spec.md §4.5 step 6 "Clear the notebook log after a
    /// successful write"; §7 "polling I/O errors in the autosave thread are
    /// swallowed" — which only retries correctly if a failed write leaves the
    /// log intact for the next poll). Messages captured while this write was
    /// in flight are not touched.
    pub fn save_midi_file(&self) -> crate::error::EngineResult<()> {
        let messages = {
            let state = self.state.lock().unwrap();
            state.notebook.clone()
        };

        if messages.is_empty() {
            return Ok(());
        }

        let count = messages.len();
        let mut writer = (self.smf_writer_factory)();

        writer.add_track_name(TEMPO_TRACK, "Tempo track");
        writer.add_tempo(TEMPO_TRACK, self.config.bpm);
        writer.add_track_name(SONG_TRACK, "Song track");

        let (notes, controllers) = self.classify_and_pair(&messages);

        for note in &notes {
            writer.add_note(
                SONG_TRACK,
                note.channel,
                note.note,
                note.time_beats,
                note.duration_beats,
                note.velocity,
            );
        }
        for cc in &controllers {
            writer.add_controller_event(SONG_TRACK, cc.channel, cc.time_beats, cc.controller, cc.value);
        }

        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        let file_name = self.config.midi_file_name.replacen("{0}", &timestamp, 1);

        self.write_message(&format!("Saving {count} MIDI messages to {file_name}..."));

        let mut file = File::create(&file_name)?;
        writer.write_file(&mut file)?;

        // Only the messages present in the snapshot we just wrote are
        // removed; the notebook is append-only, so they are still exactly
        // the first `count` entries.
        {
            let mut state = self.state.lock().unwrap();
            let drain_to = count.min(state.notebook.len());
            state.notebook.drain(0..drain_to);
        }

        self.write_message("Saved.");
        Ok(())
    }

    /// Walks the drained log once, converting seconds to beats as it goes
    /// (spec.md §4.5 steps 2-3), then pairs NoteOn/NoteOff in a second pass
    /// (step 4): for each note-on, the first not-yet-used note-off of the
    /// same pitch with a later time wins; unmatched note-ons fall back to a
    /// fixed 15-second sustain.
    fn classify_and_pair(&self, messages: &[MidiMessage]) -> (Vec<NoteEvent>, Vec<ControllerEvent>) {
        let bpm = self.config.bpm;
        let mut total_seconds = 0.0;

        let mut notes: Vec<NoteEvent> = Vec::new();
        let mut note_offs: Vec<(u8, f64, bool)> = Vec::new(); // (pitch, time_beats, used)
        let mut controllers: Vec<ControllerEvent> = Vec::new();

        for message in messages {
            total_seconds += message.delta_seconds;
            let time_beats = total_seconds * bpm / 60.0;

            match message.event_type() {
                EventType::NoteOn => notes.push(NoteEvent {
                    note: message.data1,
                    velocity: message.data2,
                    channel: message.channel(),
                    time_beats,
                    duration_beats: 0.0, // filled in during pairing, below
                }),
                EventType::NoteOff => note_offs.push((message.data1, time_beats, false)),
                EventType::ControlChange => controllers.push(ControllerEvent {
                    controller: message.data1,
                    value: message.data2,
                    channel: message.channel(),
                    time_beats,
                }),
                EventType::Other => {
                    self.write_message(&format!("unknown message: skipping {message}"));
                }
            }
        }

        let sustain_fallback_beats = SUSTAIN_FALLBACK_SECONDS * bpm / 60.0;
        for note in &mut notes {
            let matched = note_offs
                .iter_mut()
                .find(|(pitch, time_beats, used)| !*used && *pitch == note.note && *time_beats > note.time_beats);

            note.duration_beats = match matched {
                Some((_, off_time, used)) => {
                    *used = true;
                    *off_time - note.time_beats
                }
                None => sustain_fallback_beats,
            };
        }

        (notes, controllers)
    }
}
