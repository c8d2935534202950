pub mod batch;
pub mod config;
pub mod error;
pub mod extract;
pub mod image;
pub mod player;
pub mod stream;

use std::path::{Path, PathBuf};

use log::info;

pub use batch::{sequence_to_batch, Batch, DEFAULT_WINDOW_LENGTH};
pub use config::{ChordOverflow, Config, ExtractorConfig, LoaderConfig};
pub use error::*;
pub use extract::{stream_to_sequence, ImageMerger, MergeState};
pub use image::{Chord, Image, Note, Sequence, HANDS, IMAGE_SIZE, NOTES_PER_CHORD, NOTE_FEATURES};
pub use player::{Pianist, PlaybackOutcome, PlayerConfig};
pub use stream::{parse_midi, read_midi, QuarterLength, Stream};

/// Load a MIDI file and extract its musical images.
///
/// Writes `stream.log` and `stream_flatten.log` to `config.log_dir` (or the
/// current directory) when `config.show_log` is set.
pub fn midi_to_sequence(path: impl AsRef<Path>, config: &Config) -> Result<Sequence, PianistError> {
    let path = path.as_ref();
    let stream = read_midi(path, &config.loader)?;
    if config.show_log {
        let dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        stream.write_logs(&dir)?;
    }
    let sequence = stream_to_sequence(&stream, &config.extractor)?;
    info!("Extracted {} images from {}", sequence.len(), path.display());
    Ok(sequence)
}

/// Convert a MIDI file to training windows.
/// This is the main entry point for the library.
pub fn midi_to_batch(path: impl AsRef<Path>, config: &Config) -> Result<Batch, PianistError> {
    let sequence = midi_to_sequence(path, config)?;
    sequence_to_batch(&sequence, config.window_length)
}
