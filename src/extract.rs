//! # Image Extraction
//!
//! Reduce a [`Stream`] to a [`Sequence`] of musical images, using only the
//! piano part.
//!
//! ## Hand Assignment
//!
//! Elements of the piano part are visited in time order. When both hands play
//! at the same offset the right hand's element comes first (the right-hand
//! track precedes the left-hand track), so:
//! - the first element at a new offset is the **right hand** of a new image
//! - a second element at the same offset is the **left hand**, completing it
//! - a third element at the same offset is discarded (some files carry extra
//!   voices that would otherwise produce a spurious one-handed image)
//!
//! A right hand that never receives a left hand gets five rests when the next
//! offset arrives. The right hand pending when the part ends is dropped unless
//! [`ExtractorConfig::flush_tail`] is set.
//!
//! ## State Machine
//! ```text
//!                 same offset
//!        ┌──────────────────────────────┐
//!        ▼                              │ emit (pending, chord)
//!   ┌─────────┐   any offset       ┌────┴──────────┐
//!   │  Empty  │ ─────────────────▶ │ OnePending(c) │ ◀─┐ new offset:
//!   └─────────┘                    └───────────────┘ ──┘ emit (c, rests)
//!     │  ▲ same offset: discard
//!     └──┘
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use pianist::{read_midi, stream_to_sequence, ExtractorConfig, LoaderConfig};
//!
//! let stream = read_midi("mz_311_1.mid", &LoaderConfig::default())?;
//! let sequence = stream_to_sequence(&stream, &ExtractorConfig::default())?;
//! println!("{:?}", sequence.shape()); // [N, 2, 5, 2]
//! # Ok::<(), pianist::PianistError>(())
//! ```

use log::{debug, warn};

use crate::config::{ChordOverflow, ExtractorConfig};
use crate::error::PianistError;
use crate::image::{Chord, Image, Note, Sequence, NOTES_PER_CHORD};
use crate::stream::{format_quarter_length, Element, ElementKind, QuarterLength, Stream};

/// Pairing state between elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeState {
    /// No chord waiting for a partner.
    #[default]
    Empty,
    /// A right-hand chord waiting for its left hand.
    OnePending(Chord),
}

/// Pairs right- and left-hand chords into images, one element at a time.
#[derive(Debug, Clone, Default)]
pub struct ImageMerger {
    /// Offset of the last element; `None` sorts below every offset.
    clock: Option<QuarterLength>,
    state: MergeState,
    images: Vec<Image>,
    discarded: usize,
}

impl ImageMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the chord of the next element, in time order.
    pub fn push(&mut self, offset: QuarterLength, chord: Chord) {
        let same_offset = self.clock == Some(offset);
        self.state = match (self.state, same_offset) {
            (MergeState::OnePending(right), true) => {
                self.images.push(Image::new(right, chord));
                MergeState::Empty
            }
            (MergeState::Empty, true) => {
                debug!(
                    "Discarding extra chord at offset {}",
                    format_quarter_length(offset)
                );
                self.discarded += 1;
                MergeState::Empty
            }
            (MergeState::OnePending(right), false) => {
                self.images.push(Image::right_only(right));
                MergeState::OnePending(chord)
            }
            (MergeState::Empty, false) => MergeState::OnePending(chord),
        };
        self.clock = Some(offset);
    }

    pub fn state(&self) -> MergeState {
        self.state
    }

    /// Images completed so far.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Number of coincident chords thrown away.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Finish the part. A still-pending right hand becomes a final image only
    /// when `flush_tail` is set.
    pub fn finish(mut self, flush_tail: bool) -> Vec<Image> {
        if let MergeState::OnePending(right) = self.state {
            if flush_tail {
                self.images.push(Image::right_only(right));
            } else {
                debug!("Dropping unpaired chord at end of part");
            }
        }
        self.images
    }
}

/// The chord an element contributes, or `None` for non-musical elements.
pub fn element_chord(
    element: &Element,
    policy: ChordOverflow,
) -> Result<Option<Chord>, PianistError> {
    if !element.is_musical() {
        return Ok(None);
    }
    let notes: Vec<Note> = match &element.kind {
        ElementKind::Note(note) => vec![Note::new(note.pitch, note.duration)],
        ElementKind::Chord(notes) => notes
            .iter()
            .map(|n| Note::new(n.pitch, n.duration))
            .collect(),
        _ => return Ok(Some(Chord::REST)),
    };

    if let Some(chord) = Chord::from_notes(&notes) {
        return Ok(Some(chord));
    }
    match policy {
        ChordOverflow::Truncate => {
            warn!(
                "Chord at offset {} has {} notes, keeping the lowest {}",
                format_quarter_length(element.offset),
                notes.len(),
                NOTES_PER_CHORD
            );
            Ok(Some(Chord::truncated(&notes)))
        }
        ChordOverflow::Error => Err(PianistError::ChordOverflow {
            offset: format_quarter_length(element.offset),
            count: notes.len(),
        }),
    }
}

/// Extract the musical images of every piano part, in part order.
///
/// Files without a piano part give an empty sequence.
///
/// # Errors
/// [`PianistError::ChordOverflow`] when a chord has more than five notes and
/// `config.chord_overflow` is [`ChordOverflow::Error`].
pub fn stream_to_sequence(
    stream: &Stream,
    config: &ExtractorConfig,
) -> Result<Sequence, PianistError> {
    let mut images = Vec::new();
    let mut piano_parts = 0;

    for part in stream.partition_by_instrument() {
        if !part.instrument.is_piano() {
            continue;
        }
        piano_parts += 1;

        let mut merger = ImageMerger::new();
        for element in &part.elements {
            if let Some(chord) = element_chord(element, config.chord_overflow)? {
                merger.push(element.offset, chord);
            }
        }
        if merger.discarded() > 0 {
            debug!(
                "Discarded {} coincident chords in piano part",
                merger.discarded()
            );
        }
        images.extend(merger.finish(config.flush_tail));
    }

    if piano_parts == 0 {
        warn!("No piano part found in stream");
    }
    Ok(Sequence::new(images))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Instrument, NoteEvent, Track};

    fn ql(quarters: i64) -> QuarterLength {
        QuarterLength::from_integer(quarters)
    }

    fn note_element(offset: i64, pitch: u8) -> Element {
        Element {
            offset: ql(offset),
            kind: ElementKind::Note(NoteEvent {
                pitch,
                duration: ql(1),
                velocity: 80,
            }),
        }
    }

    fn single(pitch: u8) -> Chord {
        Chord::from_notes(&[Note::new(pitch, ql(1))]).unwrap()
    }

    fn piano_stream(elements: Vec<Element>) -> Stream {
        Stream {
            ticks_per_quarter: 480,
            conductor: Vec::new(),
            tracks: vec![Track {
                index: 0,
                channel: 0,
                name: None,
                program: 0,
                instrument: Instrument::Piano,
                elements,
            }],
        }
    }

    #[test]
    fn test_merger_pairs_same_offset() {
        let mut merger = ImageMerger::new();
        merger.push(ql(0), single(72));
        assert_eq!(merger.state(), MergeState::OnePending(single(72)));
        merger.push(ql(0), single(48));
        assert_eq!(merger.state(), MergeState::Empty);
        assert_eq!(merger.images(), &[Image::new(single(72), single(48))]);
    }

    #[test]
    fn test_merger_third_coincident_chord_discarded() {
        let mut merger = ImageMerger::new();
        merger.push(ql(1), single(72));
        merger.push(ql(1), single(48));
        merger.push(ql(1), single(60));
        assert_eq!(merger.discarded(), 1);
        assert_eq!(merger.state(), MergeState::Empty);

        let images = merger.finish(true);
        assert_eq!(images, vec![Image::new(single(72), single(48))]);
    }

    #[test]
    fn test_merger_lone_right_hand_gets_rest_left_hand() {
        let mut merger = ImageMerger::new();
        merger.push(ql(0), single(72));
        merger.push(ql(1), single(74));
        assert_eq!(merger.images(), &[Image::right_only(single(72))]);
        assert_eq!(merger.state(), MergeState::OnePending(single(74)));
    }

    #[test]
    fn test_merger_unpaired_tail_dropped() {
        let mut merger = ImageMerger::new();
        merger.push(ql(5), single(72));
        assert!(merger.finish(false).is_empty());
    }

    #[test]
    fn test_merger_unpaired_tail_flushed_on_request() {
        let mut merger = ImageMerger::new();
        merger.push(ql(5), single(72));
        assert_eq!(merger.finish(true), vec![Image::right_only(single(72))]);
    }

    #[test]
    fn test_first_element_at_offset_zero_is_new_offset() {
        let mut merger = ImageMerger::new();
        merger.push(ql(0), single(72));
        assert_eq!(merger.discarded(), 0);
        assert_eq!(merger.state(), MergeState::OnePending(single(72)));
    }

    #[test]
    fn test_element_chords() {
        let rest = Element {
            offset: ql(0),
            kind: ElementKind::Rest { duration: ql(2) },
        };
        assert_eq!(
            element_chord(&rest, ChordOverflow::Truncate).unwrap(),
            Some(Chord::REST)
        );

        let tempo = Element {
            offset: ql(0),
            kind: ElementKind::Tempo {
                micros_per_quarter: 500_000,
            },
        };
        assert_eq!(element_chord(&tempo, ChordOverflow::Truncate).unwrap(), None);

        let chord = Element {
            offset: ql(0),
            kind: ElementKind::Chord(vec![
                NoteEvent {
                    pitch: 60,
                    duration: ql(1),
                    velocity: 80,
                },
                NoteEvent {
                    pitch: 64,
                    duration: ql(2),
                    velocity: 80,
                },
            ]),
        };
        let result = element_chord(&chord, ChordOverflow::Truncate)
            .unwrap()
            .unwrap();
        assert_eq!(result.notes()[0], Note::new(60, ql(1)));
        assert_eq!(result.notes()[1], Note::new(64, ql(2)));
        assert!(result.notes()[2].is_rest());
    }

    #[test]
    fn test_chord_overflow_policies() {
        let notes = (60..67)
            .map(|pitch| NoteEvent {
                pitch,
                duration: ql(1),
                velocity: 80,
            })
            .collect();
        let element = Element {
            offset: QuarterLength::new(5, 2),
            kind: ElementKind::Chord(notes),
        };

        let truncated = element_chord(&element, ChordOverflow::Truncate)
            .unwrap()
            .unwrap();
        assert_eq!(truncated.notes()[4].pitch, 64);

        match element_chord(&element, ChordOverflow::Error) {
            Err(PianistError::ChordOverflow { offset, count }) => {
                assert_eq!(offset, "2.5");
                assert_eq!(count, 7);
            }
            other => panic!("Expected ChordOverflow, got {:?}", other),
        }
    }

    #[test]
    fn test_coincidence_scenario() {
        // Notes A and B at offset 1.0, then a spurious third element at 1.0,
        // then a closing note so the pair is not the last pending state
        let stream = piano_stream(vec![
            note_element(1, 69),
            note_element(1, 71),
            note_element(1, 40),
            note_element(2, 72),
            note_element(2, 36),
        ]);
        let sequence = stream_to_sequence(&stream, &ExtractorConfig::default()).unwrap();

        assert_eq!(
            sequence.images(),
            &[
                Image::new(single(69), single(71)),
                Image::new(single(72), single(36)),
            ]
        );
        assert!(sequence
            .iter()
            .flat_map(|i| i.right.notes().iter().chain(i.left.notes().iter()))
            .all(|n| n.pitch != 40));
    }

    #[test]
    fn test_unpaired_tail_scenario() {
        let stream = piano_stream(vec![note_element(5, 60)]);
        let sequence = stream_to_sequence(&stream, &ExtractorConfig::default()).unwrap();
        assert!(sequence.is_empty());

        let flushed = stream_to_sequence(
            &stream,
            &ExtractorConfig {
                flush_tail: true,
                ..ExtractorConfig::default()
            },
        )
        .unwrap();
        assert_eq!(flushed.len(), 1);
    }

    #[test]
    fn test_non_piano_parts_ignored() {
        let mut stream = piano_stream(vec![note_element(0, 60), note_element(0, 48)]);
        stream.tracks.push(Track {
            index: 1,
            channel: 2,
            name: None,
            program: 40,
            instrument: Instrument::Other(40),
            elements: vec![note_element(0, 76), note_element(1, 77)],
        });
        let sequence = stream_to_sequence(&stream, &ExtractorConfig::default()).unwrap();
        assert_eq!(sequence.images(), &[Image::new(single(60), single(48))]);
    }

    #[test]
    fn test_meta_elements_do_not_move_clock() {
        let stream = piano_stream(vec![
            note_element(0, 72),
            Element {
                offset: ql(0),
                kind: ElementKind::TimeSignature {
                    numerator: 3,
                    denominator: 4,
                },
            },
            note_element(0, 48),
            note_element(1, 74),
            note_element(2, 76),
        ]);
        let sequence = stream_to_sequence(&stream, &ExtractorConfig::default()).unwrap();
        assert_eq!(
            sequence.images(),
            &[
                Image::new(single(72), single(48)),
                Image::right_only(single(74)),
            ]
        );
    }

    #[test]
    fn test_chords_always_five_notes_and_valid() {
        let stream = piano_stream(vec![
            note_element(0, 60),
            Element {
                offset: ql(1),
                kind: ElementKind::Rest { duration: ql(1) },
            },
            note_element(2, 127),
            note_element(3, 21),
            Element {
                offset: ql(4),
                kind: ElementKind::Chord(
                    (48..55)
                        .map(|pitch| NoteEvent {
                            pitch,
                            duration: ql(2),
                            velocity: 80,
                        })
                        .collect(),
                ),
            },
        ]);
        let config = ExtractorConfig {
            flush_tail: true,
            ..ExtractorConfig::default()
        };
        let sequence = stream_to_sequence(&stream, &config).unwrap();
        assert_eq!(sequence.shape(), [5, 2, 5, 2]);
        for image in &sequence {
            for chord in [&image.right, &image.left] {
                assert_eq!(chord.notes().len(), NOTES_PER_CHORD);
                for note in chord.notes() {
                    let valid = (0..=127).contains(&note.pitch) && note.duration > ql(0);
                    assert!(note.is_rest() || valid);
                }
            }
        }

        // The seven-note chord keeps its five lowest pitches
        let last = sequence.images()[4].right;
        let pitches: Vec<u8> = last.notes().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![48, 49, 50, 51, 52]);
    }
}
