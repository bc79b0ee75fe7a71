//! The MIDI file writer capability (spec.md §6, modeled on
//! `midiutil.MidiFile3`'s `addNote`/`addControllerEvent`/`addTempo`/
//! `addTrackName`/`writeFile` API), backed by `midly` for the runnable
//! binary.

use std::io::Write;

use crate::error::{EngineError, EngineResult};

/// Standard MIDI resolution of 480 ticks per quarter note. `midly`'s timing
/// is tick-based while the exporter in spec.md §4.5 works in beats, so this
/// is the conversion factor between the two.
pub const TICKS_PER_BEAT: u16 = 480;

/// Capability interface mirroring the consumed MIDI file writer (spec.md
/// §6). Track numbers, times, and durations are all caller-supplied exactly
/// as the exporter computes them.
pub trait SmfWriter {
    fn add_track_name(&mut self, track: usize, name: &str);
    fn add_tempo(&mut self, track: usize, bpm: f64);
    fn add_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        start_beats: f64,
        duration_beats: f64,
        velocity: u8,
    );
    fn add_controller_event(&mut self, track: usize, channel: u8, time_beats: f64, cc: u8, value: u8);
    fn write_file(&self, sink: &mut dyn Write) -> EngineResult<()>;
}

#[derive(Clone, Copy, Debug)]
enum EventKind {
    NoteOn(u8, u8),
    NoteOff(u8, u8),
    Controller(u8, u8),
}

#[derive(Clone, Copy, Debug)]
struct TimedEvent {
    tick: u32,
    channel: u8,
    kind: EventKind,
}

#[derive(Default)]
struct TrackBuilder {
    name: Option<String>,
    tempo_bpm: Option<f64>,
    events: Vec<TimedEvent>,
}

/// `midly`-backed [`SmfWriter`]. Builds a two-track (or N-track, if the
/// caller addresses more) Standard MIDI File entirely in memory, then emits
/// it on [`write_file`](SmfWriter::write_file).
#[derive(Default)]
pub struct MidlySmfWriter {
    tracks: Vec<TrackBuilder>,
}

impl MidlySmfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn track_mut(&mut self, track: usize) -> &mut TrackBuilder {
        if self.tracks.len() <= track {
            self.tracks.resize_with(track + 1, TrackBuilder::default);
        }
        &mut self.tracks[track]
    }

    fn beats_to_ticks(beats: f64) -> u32 {
        (beats * f64::from(TICKS_PER_BEAT)).round().max(0.0) as u32
    }
}

impl SmfWriter for MidlySmfWriter {
    fn add_track_name(&mut self, track: usize, name: &str) {
        self.track_mut(track).name = Some(name.to_string());
    }

    fn add_tempo(&mut self, track: usize, bpm: f64) {
        self.track_mut(track).tempo_bpm = Some(bpm);
    }

    fn add_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        start_beats: f64,
        duration_beats: f64,
        velocity: u8,
    ) {
        let start_tick = Self::beats_to_ticks(start_beats);
        let end_tick = Self::beats_to_ticks(start_beats + duration_beats).max(start_tick + 1);
        let builder = self.track_mut(track);
        builder.events.push(TimedEvent {
            tick: start_tick,
            channel,
            kind: EventKind::NoteOn(pitch, velocity),
        });
        builder.events.push(TimedEvent {
            tick: end_tick,
            channel,
            kind: EventKind::NoteOff(pitch, velocity),
        });
    }

    fn add_controller_event(
        &mut self,
        track: usize,
        channel: u8,
        time_beats: f64,
        cc: u8,
        value: u8,
    ) {
        let tick = Self::beats_to_ticks(time_beats);
        self.track_mut(track).events.push(TimedEvent {
            tick,
            channel,
            kind: EventKind::Controller(cc, value),
        });
    }

    fn write_file(&self, sink: &mut dyn Write) -> EngineResult<()> {
        use midly::num::{u15, u24, u28, u4, u7};
        use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

        let mut smf = Smf::new(Header::new(
            if self.tracks.len() > 1 {
                Format::Parallel
            } else {
                Format::SingleTrack
            },
            Timing::Metrical(u15::new(TICKS_PER_BEAT)),
        ));

        for builder in &self.tracks {
            let mut events: Vec<TimedEvent> = builder.events.clone();
            events.sort_by_key(|e| e.tick);

            let mut track: Track = Vec::new();
            let mut cursor: u32 = 0;

            if let Some(name) = &builder.name {
                track.push(TrackEvent {
                    delta: u28::new(0),
                    kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
                });
            }

            if let Some(bpm) = builder.tempo_bpm {
                let micros_per_beat = (60_000_000.0 / bpm).round() as u32;
                track.push(TrackEvent {
                    delta: u28::new(0),
                    kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_beat))),
                });
            }

            for event in &events {
                let delta = event.tick.saturating_sub(cursor);
                cursor = event.tick;
                let channel = u4::new(event.channel & 0x0F);
                let message = match event.kind {
                    EventKind::NoteOn(pitch, velocity) => MidiMessage::NoteOn {
                        key: u7::new(pitch & 0x7F),
                        vel: u7::new(velocity & 0x7F),
                    },
                    EventKind::NoteOff(pitch, velocity) => MidiMessage::NoteOff {
                        key: u7::new(pitch & 0x7F),
                        vel: u7::new(velocity & 0x7F),
                    },
                    EventKind::Controller(cc, value) => MidiMessage::Controller {
                        controller: u7::new(cc & 0x7F),
                        value: u7::new(value & 0x7F),
                    },
                };
                track.push(TrackEvent {
                    delta: u28::new(delta),
                    kind: TrackEventKind::Midi { channel, message },
                });
            }

            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            });

            smf.tracks.push(track);
        }

        smf.write(sink)
            .map_err(|e| EngineError::MidiFileWrite(e.to_string()))
    }
}
