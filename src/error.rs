//! # Error Types
//!
//! This module defines all error types for the pianist pipeline and player.
//!
//! Errors carry enough context (file path, offset in quarter lengths) to find the
//! offending input. Data-quality issues inside an otherwise valid file, such as a
//! third chord sounding at one offset or an unpaired chord at the end of a track,
//! are not errors: the extractor drops them and logs at debug level.
//!
//! ## Error Types
//! - `Io` - A file could not be read or written
//! - `MidiParse` - The bytes are not a valid Standard MIDI File
//! - `UnsupportedTiming` - SMPTE timecode files (only metrical timing is handled)
//! - `ChordOverflow` - More than five simultaneous notes with [`ChordOverflow::Error`](crate::ChordOverflow::Error)
//! - `InvalidWindowLength` / `EmptySequence` - Window batcher preconditions
//! - `Config` - Invalid YAML configuration
//! - `Audio` - Output device or stream failures in the player
//!
//! ## Usage
//! ```rust,no_run
//! use pianist::{midi_to_batch, Config, PianistError};
//!
//! match midi_to_batch("mz_311_1.mid", &Config::default()) {
//!     Ok(batch) => println!("{} training pairs", batch.len()),
//!     Err(PianistError::Io { path, source }) => {
//!         eprintln!("Cannot read {}: {}", path.display(), source);
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PianistError {
    /// A file could not be read or written.
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not a valid Standard MIDI File.
    ///
    /// # Example
    /// ```
    /// # use pianist::PianistError;
    /// let err = PianistError::MidiParse("invalid header".to_string());
    /// assert_eq!(err.to_string(), "Invalid MIDI file: invalid header");
    /// ```
    #[error("Invalid MIDI file: {0}")]
    MidiParse(String),

    /// The file uses SMPTE timecode instead of ticks per quarter note.
    #[error("Unsupported MIDI timing: {0}")]
    UnsupportedTiming(String),

    /// A chord has more notes than a hand can hold and the overflow policy
    /// rejects it.
    ///
    /// # Example
    /// ```
    /// # use pianist::PianistError;
    /// let err = PianistError::ChordOverflow {
    ///     offset: "2.5".to_string(),
    ///     count: 7,
    /// };
    /// assert_eq!(
    ///     err.to_string(),
    ///     "Chord at offset 2.5 has 7 notes, at most 5 are supported"
    /// );
    /// ```
    #[error("Chord at offset {offset} has {count} notes, at most 5 are supported")]
    ChordOverflow { offset: String, count: usize },

    #[error("Window length must be at least 1")]
    InvalidWindowLength,

    #[error("Cannot build training windows from an empty sequence")]
    EmptySequence,

    /// Invalid configuration values or YAML syntax.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

impl PianistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
