//! # Musical Image Types
//!
//! If a performance is a sheet of music, a musical image is one vertical slice
//! of it: what the right and left hand play at one moment.
//!
//! ## Shape
//! ```text
//! Image            2 hands  [right, left]
//!   └── Chord      5 notes  (one per finger, Rest-padded)
//!         └── Note 2 values (pitch, duration)
//! ```
//!
//! An image is therefore a 2×5×2 tensor, and a [`Sequence`] of N images is
//! N×2×5×2.
//!
//! ## Rest Sentinel
//! A rest, and every unused finger, is the note `(0, 0)`. An image of two
//! resting hands is all zeros, which is also the padding used by the window
//! batcher.

use crate::stream::{quarter_length_to_f64, QuarterLength};

/// Notes per hand.
pub const NOTES_PER_CHORD: usize = 5;
/// Hands per image.
pub const HANDS: usize = 2;
/// Values per note: pitch and duration.
pub const NOTE_FEATURES: usize = 2;
/// Number of scalars in one image.
pub const IMAGE_SIZE: usize = HANDS * NOTES_PER_CHORD * NOTE_FEATURES;

/// A (pitch, duration) pair. Duration is in quarter lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub pitch: u8,
    pub duration: QuarterLength,
}

impl Note {
    /// The `(0, 0)` sentinel.
    pub const REST: Note = Note {
        pitch: 0,
        duration: QuarterLength::new_raw(0, 1),
    };

    pub fn new(pitch: u8, duration: QuarterLength) -> Self {
        Self { pitch, duration }
    }

    pub fn is_rest(&self) -> bool {
        *self == Self::REST
    }

    pub fn to_array(&self) -> [f32; NOTE_FEATURES] {
        [
            f32::from(self.pitch),
            quarter_length_to_f64(self.duration) as f32,
        ]
    }
}

/// Exactly five notes played by one hand, Rest-padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord([Note; NOTES_PER_CHORD]);

impl Chord {
    /// Five rests.
    pub const REST: Chord = Chord([Note::REST; NOTES_PER_CHORD]);

    /// Pad `notes` with rests up to five.
    ///
    /// Returns `None` when there are more than five notes.
    ///
    /// # Example
    /// ```
    /// use pianist::{Chord, Note, QuarterLength};
    ///
    /// let c = Note::new(60, QuarterLength::from_integer(1));
    /// let chord = Chord::from_notes(&[c]).unwrap();
    /// assert_eq!(chord.notes()[0], c);
    /// assert!(chord.notes()[1..].iter().all(Note::is_rest));
    /// ```
    pub fn from_notes(notes: &[Note]) -> Option<Self> {
        if notes.len() > NOTES_PER_CHORD {
            return None;
        }
        let mut slots = [Note::REST; NOTES_PER_CHORD];
        slots[..notes.len()].copy_from_slice(notes);
        Some(Chord(slots))
    }

    /// Keep at most the first five notes.
    pub fn truncated(notes: &[Note]) -> Self {
        let kept = &notes[..notes.len().min(NOTES_PER_CHORD)];
        let mut slots = [Note::REST; NOTES_PER_CHORD];
        slots[..kept.len()].copy_from_slice(kept);
        Chord(slots)
    }

    pub fn notes(&self) -> &[Note; NOTES_PER_CHORD] {
        &self.0
    }

    pub fn is_rest(&self) -> bool {
        self.0.iter().all(Note::is_rest)
    }
}

/// One time-slice of a two-hand performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Image {
    pub right: Chord,
    pub left: Chord,
}

impl Image {
    /// Both hands resting; all values zero.
    pub const ZERO: Image = Image {
        right: Chord::REST,
        left: Chord::REST,
    };

    pub fn new(right: Chord, left: Chord) -> Self {
        Self { right, left }
    }

    /// A right-hand chord with a resting left hand.
    pub fn right_only(right: Chord) -> Self {
        Self {
            right,
            left: Chord::REST,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.right.is_rest() && self.left.is_rest()
    }

    /// Row-major values in `[hand][note][feature]` order.
    pub fn to_array(&self) -> [f32; IMAGE_SIZE] {
        let mut out = [0.0; IMAGE_SIZE];
        for (h, chord) in [&self.right, &self.left].into_iter().enumerate() {
            for (n, note) in chord.notes().iter().enumerate() {
                let base = (h * NOTES_PER_CHORD + n) * NOTE_FEATURES;
                out[base..base + NOTE_FEATURES].copy_from_slice(&note.to_array());
            }
        }
        out
    }
}

/// Ordered musical images of a performance, one per distinct offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sequence {
    images: Vec<Image>,
}

impl Sequence {
    pub fn new(images: Vec<Image>) -> Self {
        Self { images }
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Image> {
        self.images.iter()
    }

    /// `[N, 2, 5, 2]`
    pub fn shape(&self) -> [usize; 4] {
        [self.images.len(), HANDS, NOTES_PER_CHORD, NOTE_FEATURES]
    }

    /// All values, row-major, matching [`shape()`](Self::shape).
    pub fn to_flat(&self) -> Vec<f32> {
        self.images.iter().flat_map(|i| i.to_array()).collect()
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Image;
    type IntoIter = std::slice::Iter<'a, Image>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}
