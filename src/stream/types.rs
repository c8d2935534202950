//! Stream type definitions
//!
//! A [`Stream`] is the parsed, track-partitioned view of a MIDI file. Every
//! musical event is an [`Element`] with an exact offset in quarter lengths.

use num_rational::Rational64;

/// Time positions and durations, in quarter notes.
///
/// Exact rationals keep offset comparisons exact, so two hands striking "at the
/// same time" compare equal even for triplet positions like 1/3.
pub type QuarterLength = Rational64;

/// Convert a quarter length to `f64`.
pub fn quarter_length_to_f64(value: QuarterLength) -> f64 {
    *value.numer() as f64 / *value.denom() as f64
}

/// Human-readable quarter length: `2.0`, `0.75`, or `1/3` when the value has
/// no finite decimal expansion.
///
/// # Example
/// ```
/// use pianist::stream::{format_quarter_length, QuarterLength};
///
/// assert_eq!(format_quarter_length(QuarterLength::from_integer(2)), "2.0");
/// assert_eq!(format_quarter_length(QuarterLength::new(3, 4)), "0.75");
/// assert_eq!(format_quarter_length(QuarterLength::new(4, 3)), "4/3");
/// ```
pub fn format_quarter_length(value: QuarterLength) -> String {
    let denom = *value.denom();
    if denom == 1 {
        format!("{}.0", value.numer())
    } else if (denom as u64).is_power_of_two() {
        format!("{}", quarter_length_to_f64(value))
    } else {
        format!("{}/{}", value.numer(), denom)
    }
}

/// Name of a MIDI pitch with octave, e.g. 60 -> `C4`.
pub fn pitch_name(pitch: u8) -> String {
    const NAMES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    let octave = i16::from(pitch / 12) - 1;
    format!("{}{}", NAMES[usize::from(pitch % 12)], octave)
}

/// A single sounding note inside a [`Element`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEvent {
    pub pitch: u8,
    pub duration: QuarterLength,
    pub velocity: u8,
}

/// What an element is.
///
/// Only `Note`, `Rest` and `Chord` are musical content; the remaining variants
/// carry context from meta events and are skipped by the image extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementKind {
    Note(NoteEvent),
    Rest { duration: QuarterLength },
    /// Notes struck together, ordered by ascending pitch.
    Chord(Vec<NoteEvent>),
    Tempo { micros_per_quarter: u32 },
    TimeSignature { numerator: u8, denominator: u32 },
    KeySignature { fifths: i8, minor: bool },
}

/// An event positioned in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub offset: QuarterLength,
    pub kind: ElementKind,
}

impl Element {
    /// Sounding length of the element. Chords report their longest note; meta
    /// elements have zero duration.
    pub fn duration(&self) -> QuarterLength {
        match &self.kind {
            ElementKind::Note(note) => note.duration,
            ElementKind::Rest { duration } => *duration,
            ElementKind::Chord(notes) => notes
                .iter()
                .map(|n| n.duration)
                .max()
                .unwrap_or_else(|| QuarterLength::from_integer(0)),
            _ => QuarterLength::from_integer(0),
        }
    }

    pub fn is_musical(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Note(_) | ElementKind::Rest { .. } | ElementKind::Chord(_)
        )
    }
}

/// General MIDI instrument family of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    /// Programs 0-5 (acoustic and electric pianos). Harpsichord (6) and
    /// clavinet (7) are not pianos.
    Piano,
    /// Anything on the percussion channel.
    Percussion,
    Other(u8),
}

impl Instrument {
    /// Channel index 9 (MIDI channel 10) is reserved for percussion.
    pub const PERCUSSION_CHANNEL: u8 = 9;
    /// General MIDI programs below this are pianos.
    pub const PIANO_PROGRAMS: u8 = 6;

    pub fn from_channel_program(channel: u8, program: u8) -> Self {
        if channel == Self::PERCUSSION_CHANNEL {
            Instrument::Percussion
        } else if program < Self::PIANO_PROGRAMS {
            Instrument::Piano
        } else {
            Instrument::Other(program)
        }
    }

    pub fn is_piano(&self) -> bool {
        matches!(self, Instrument::Piano)
    }

    pub fn name(&self) -> String {
        match self {
            Instrument::Piano => "Piano".to_string(),
            Instrument::Percussion => "Percussion".to_string(),
            Instrument::Other(program) => format!("Program {}", program),
        }
    }
}

/// Notes of one MIDI channel within one MIDI track.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Index of the track chunk in the file.
    pub index: usize,
    pub channel: u8,
    pub name: Option<String>,
    pub program: u8,
    pub instrument: Instrument,
    /// Elements in non-decreasing offset order.
    pub elements: Vec<Element>,
}

/// All elements of tracks sharing one instrument, merged in time order.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub instrument: Instrument,
    /// Elements ordered by offset; ties keep track order.
    pub elements: Vec<Element>,
}

/// A parsed MIDI file.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub ticks_per_quarter: u16,
    /// Meta elements from tracks that carry no notes (tempo maps and the like).
    pub conductor: Vec<Element>,
    pub tracks: Vec<Track>,
}

impl Stream {
    /// Group tracks by instrument.
    ///
    /// Parts appear in the order their instrument first appears among the
    /// tracks. Within a part, elements at the same offset keep the order of
    /// their tracks, so a right-hand track listed before a left-hand track is
    /// visited first.
    pub fn partition_by_instrument(&self) -> Vec<Part> {
        let mut parts: Vec<(Instrument, Vec<(usize, usize, &Element)>)> = Vec::new();

        for (track_pos, track) in self.tracks.iter().enumerate() {
            let slot = match parts.iter().position(|(inst, _)| *inst == track.instrument) {
                Some(slot) => slot,
                None => {
                    parts.push((track.instrument, Vec::new()));
                    parts.len() - 1
                }
            };
            parts[slot].1.extend(
                track
                    .elements
                    .iter()
                    .enumerate()
                    .map(|(seq, element)| (track_pos, seq, element)),
            );
        }

        parts
            .into_iter()
            .map(|(instrument, mut entries)| {
                entries.sort_by(|a, b| {
                    a.2.offset
                        .cmp(&b.2.offset)
                        .then(a.0.cmp(&b.0))
                        .then(a.1.cmp(&b.1))
                });
                Part {
                    instrument,
                    elements: entries.into_iter().map(|(_, _, e)| e.clone()).collect(),
                }
            })
            .collect()
    }

    /// Every tempo change in the file as `(offset, microseconds per quarter)`,
    /// sorted by offset.
    pub fn tempo_map(&self) -> Vec<(QuarterLength, u32)> {
        let mut tempos: Vec<(QuarterLength, u32)> = self
            .conductor
            .iter()
            .chain(self.tracks.iter().flat_map(|t| t.elements.iter()))
            .filter_map(|e| match e.kind {
                ElementKind::Tempo { micros_per_quarter } => Some((e.offset, micros_per_quarter)),
                _ => None,
            })
            .collect();
        tempos.sort_by(|a, b| a.0.cmp(&b.0));
        tempos.dedup();
        tempos
    }
}
