//! # Stream Module
//!
//! Parse a MIDI file into a structured, time-ordered stream of notes, chords
//! and rests per track.
//!
//! ## Sub-modules
//! - `types` - Stream, Track, Part, Element type definitions
//! - `loader` - `midly`-based MIDI parsing and quantization
//! - `dump` - Human-readable text dumps (`stream.log`, `stream_flatten.log`)
//!
//! ## Key Types
//! - [`Stream`] - A whole file: conductor meta events plus one [`Track`] per
//!   (track chunk, channel) that plays notes
//! - [`Element`] - An offset plus an [`ElementKind`] (Note, Rest, Chord, or a
//!   meta event)
//! - [`Part`] - Tracks of one [`Instrument`] merged in time order
//!
//! ## Entry Points
//! - [`read_midi()`] - Load a `.mid` file from disk
//! - [`parse_midi()`] - Parse bytes already in memory
//!
//! ## Time Model
//!
//! Offsets and durations are exact [`QuarterLength`] rationals. With the default
//! [`LoaderConfig`](crate::LoaderConfig), onsets and releases are snapped to the
//! nearest 1/4 or 1/3 of a quarter note, so a left hand recorded a few ticks
//! late still lines up with the right hand.
//!
//! ## Element Construction
//! 1. Note-on/note-off pairs are matched per channel (velocity-0 note-on counts
//!    as note-off; notes still held at the end of the track are closed there)
//! 2. Notes with the same onset become one `Chord`, lone notes stay `Note`
//! 3. Gaps in a track, including before its first note, become `Rest`s
//! 4. Tempo, time and key signature meta events are kept as context elements
//!
//! ## Example
//! ```rust,no_run
//! use pianist::{read_midi, LoaderConfig};
//!
//! let stream = read_midi("mz_311_1.mid", &LoaderConfig::default())?;
//! for part in stream.partition_by_instrument() {
//!     println!("{}: {} elements", part.instrument.name(), part.elements.len());
//! }
//! # Ok::<(), pianist::PianistError>(())
//! ```

mod dump;
mod loader;
mod types;


pub use dump::{STREAM_FLAT_LOG, STREAM_LOG};
pub use loader::{parse_midi, read_midi};
pub use types::{
    format_quarter_length, pitch_name, quarter_length_to_f64, Element, ElementKind, Instrument,
    NoteEvent, Part, QuarterLength, Stream, Track,
};
