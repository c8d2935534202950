//! MIDI file loading
//!
//! Parses a Standard MIDI File with `midly` and turns its note-on/note-off
//! pairs into time-ordered [`Element`]s, one [`Track`] per (track chunk,
//! channel) that carries notes.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use log::{debug, info};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use super::types::{Element, ElementKind, Instrument, NoteEvent, QuarterLength, Stream, Track};
use crate::config::LoaderConfig;
use crate::error::PianistError;

/// A note as found in the file, in absolute ticks.
#[derive(Debug, Clone, Copy)]
struct RawNote {
    start: u64,
    end: u64,
    pitch: u8,
    velocity: u8,
}

/// Per-channel state while walking one track chunk.
#[derive(Debug, Default)]
struct ChannelNotes {
    program: Option<u8>,
    sounding: HashMap<u8, (u64, u8)>,
    notes: Vec<RawNote>,
}

impl ChannelNotes {
    fn note_on(&mut self, tick: u64, pitch: u8, velocity: u8) {
        // Re-striking a key that is still down ends the earlier note.
        if let Some((start, vel)) = self.sounding.insert(pitch, (tick, velocity)) {
            self.close(start, tick, pitch, vel);
        }
    }

    fn note_off(&mut self, tick: u64, pitch: u8) {
        if let Some((start, velocity)) = self.sounding.remove(&pitch) {
            self.close(start, tick, pitch, velocity);
        }
    }

    fn close(&mut self, start: u64, end: u64, pitch: u8, velocity: u8) {
        self.notes.push(RawNote {
            start,
            end,
            pitch,
            velocity,
        });
    }

    fn close_all(&mut self, tick: u64) {
        let mut sounding: Vec<_> = self.sounding.drain().collect();
        sounding.sort_by_key(|(pitch, _)| *pitch);
        for (pitch, (start, velocity)) in sounding {
            self.close(start, tick, pitch, velocity);
        }
    }
}

/// Read and parse a MIDI file.
///
/// # Errors
/// - [`PianistError::Io`] if the file cannot be read
/// - [`PianistError::MidiParse`] / [`PianistError::UnsupportedTiming`] from [`parse_midi`]
pub fn read_midi(path: impl AsRef<Path>, config: &LoaderConfig) -> Result<Stream, PianistError> {
    let path = path.as_ref();
    info!("Loading music file: {}", path.display());
    let data = fs::read(path).map_err(|e| PianistError::io(path, e))?;
    parse_midi(&data, config)
}

/// Parse the bytes of a Standard MIDI File.
///
/// # Example
/// ```rust,no_run
/// use pianist::{parse_midi, LoaderConfig};
///
/// let bytes = std::fs::read("mz_311_1.mid").unwrap();
/// let stream = parse_midi(&bytes, &LoaderConfig::default()).unwrap();
/// for track in &stream.tracks {
///     println!("{:?}: {} elements", track.instrument, track.elements.len());
/// }
/// ```
pub fn parse_midi(data: &[u8], config: &LoaderConfig) -> Result<Stream, PianistError> {
    let smf = Smf::parse(data).map_err(|e| PianistError::MidiParse(e.to_string()))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(fps, subframes) => {
            return Err(PianistError::UnsupportedTiming(format!(
                "SMPTE timecode ({:?}, {} subframes)",
                fps, subframes
            )))
        }
    };
    if ticks_per_quarter == 0 {
        return Err(PianistError::MidiParse(
            "header declares zero ticks per quarter note".to_string(),
        ));
    }

    let converter = TickConverter::new(ticks_per_quarter, config);
    let mut conductor = Vec::new();
    let mut tracks = Vec::new();

    for (index, events) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        let mut name = None;
        let mut meta: Vec<(u64, ElementKind)> = Vec::new();
        let mut channels: BTreeMap<u8, ChannelNotes> = BTreeMap::new();

        for event in events {
            tick += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let state = channels.entry(channel.as_int()).or_default();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            state.note_on(tick, key.as_int(), vel.as_int());
                        }
                        // Note-on with velocity 0 is a note-off
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            state.note_off(tick, key.as_int());
                        }
                        MidiMessage::ProgramChange { program } => {
                            state.program.get_or_insert(program.as_int());
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => {
                    name = Some(String::from_utf8_lossy(bytes).trim().to_string());
                }
                TrackEventKind::Meta(MetaMessage::Tempo(micros)) => {
                    meta.push((
                        tick,
                        ElementKind::Tempo {
                            micros_per_quarter: micros.as_int(),
                        },
                    ));
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(numerator, power, _, _)) => {
                    meta.push((
                        tick,
                        ElementKind::TimeSignature {
                            numerator,
                            denominator: 1u32 << power.min(31),
                        },
                    ));
                }
                TrackEventKind::Meta(MetaMessage::KeySignature(fifths, minor)) => {
                    meta.push((tick, ElementKind::KeySignature { fifths, minor }));
                }
                _ => {}
            }
        }

        let meta_elements: Vec<Element> = meta
            .into_iter()
            .map(|(t, kind)| Element {
                offset: converter.offset(t),
                kind,
            })
            .collect();

        let mut with_notes = channels
            .into_iter()
            .map(|(channel, mut state)| {
                state.close_all(tick);
                (channel, state)
            })
            .filter(|(_, state)| !state.notes.is_empty())
            .peekable();

        if with_notes.peek().is_none() {
            conductor.extend(meta_elements);
            continue;
        }

        for (channel, state) in with_notes {
            let program = state.program.unwrap_or(0);
            let mut elements = meta_elements.clone();
            elements.extend(build_elements(&state.notes, &converter));
            // Stable: meta events stay ahead of notes at the same offset
            elements.sort_by(|a, b| a.offset.cmp(&b.offset));

            let instrument = Instrument::from_channel_program(channel, program);
            debug!(
                "Track {} channel {} ({:?}, program {}): {} elements",
                index,
                channel,
                instrument,
                program,
                elements.len()
            );
            tracks.push(Track {
                index,
                channel,
                name: name.clone(),
                program,
                instrument,
                elements,
            });
        }
    }

    conductor.sort_by(|a, b| a.offset.cmp(&b.offset));
    Ok(Stream {
        ticks_per_quarter,
        conductor,
        tracks,
    })
}

/// Converts absolute ticks to (optionally quantized) quarter lengths.
#[derive(Debug)]
struct TickConverter {
    ticks_per_quarter: i64,
    divisors: Option<Vec<i64>>,
}

impl TickConverter {
    fn new(ticks_per_quarter: u16, config: &LoaderConfig) -> Self {
        let divisors = config.quantize.then(|| {
            config
                .quarter_length_divisors
                .iter()
                .filter(|&&d| d > 0)
                .map(|&d| i64::from(d))
                .collect::<Vec<_>>()
        });
        Self {
            ticks_per_quarter: i64::from(ticks_per_quarter),
            divisors: divisors.filter(|d| !d.is_empty()),
        }
    }

    fn offset(&self, tick: u64) -> QuarterLength {
        let exact = QuarterLength::new(tick as i64, self.ticks_per_quarter);
        match &self.divisors {
            Some(divisors) => quantize(exact, divisors),
            None => exact,
        }
    }

    /// The shortest duration a note may have after conversion.
    fn min_duration(&self) -> QuarterLength {
        match &self.divisors {
            Some(divisors) => {
                QuarterLength::new(1, divisors.iter().copied().max().unwrap_or(1))
            }
            None => QuarterLength::new(1, self.ticks_per_quarter),
        }
    }
}

/// Snap a value to the nearest multiple of `1/d` over all divisors `d`.
/// Ties go to the divisor listed first.
pub(crate) fn quantize(value: QuarterLength, divisors: &[i64]) -> QuarterLength {
    divisors
        .iter()
        .map(|&d| {
            let snapped = (value * d).round() / d;
            let error = if snapped > value {
                snapped - value
            } else {
                value - snapped
            };
            (snapped, error)
        })
        .min_by(|a, b| a.1.cmp(&b.1))
        .map(|(snapped, _)| snapped)
        .unwrap_or(value)
}

/// Group notes by onset into Note/Chord elements and fill the gaps with rests.
fn build_elements(notes: &[RawNote], converter: &TickConverter) -> Vec<Element> {
    let min_duration = converter.min_duration();
    let mut converted: Vec<(QuarterLength, NoteEvent)> = notes
        .iter()
        .map(|note| {
            let onset = converter.offset(note.start);
            let release = converter.offset(note.end);
            let duration = if release > onset {
                release - onset
            } else {
                min_duration
            };
            (
                onset,
                NoteEvent {
                    pitch: note.pitch,
                    duration,
                    velocity: note.velocity,
                },
            )
        })
        .collect();
    converted.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.pitch.cmp(&b.1.pitch)));

    let mut elements = Vec::new();
    let mut cursor = QuarterLength::from_integer(0);
    let mut i = 0;
    while i < converted.len() {
        let onset = converted[i].0;
        let mut group: Vec<NoteEvent> = Vec::new();
        while i < converted.len() && converted[i].0 == onset {
            let note = converted[i].1.clone();
            match group.last_mut() {
                // Same key struck twice at one onset: keep the longer one
                Some(last) if last.pitch == note.pitch => {
                    if note.duration > last.duration {
                        *last = note;
                    }
                }
                _ => group.push(note),
            }
            i += 1;
        }

        if onset > cursor {
            elements.push(Element {
                offset: cursor,
                kind: ElementKind::Rest {
                    duration: onset - cursor,
                },
            });
        }

        let end = onset
            + group
                .iter()
                .map(|n| n.duration)
                .max()
                .unwrap_or(min_duration);
        if end > cursor {
            cursor = end;
        }

        let kind = if group.len() == 1 {
            ElementKind::Note(group.remove(0))
        } else {
            ElementKind::Chord(group)
        };
        elements.push(Element {
            offset: onset,
            kind,
        });
    }

    elements
}
