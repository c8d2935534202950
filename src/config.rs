//! # Configuration
//!
//! Settings for every stage of the pipeline plus the audio player, loadable
//! from a YAML file. All keys are optional; anything left out keeps its
//! default.
//!
//! ```yaml
//! window-length: 32
//! show-log: true
//! log-dir: logs
//! quantize: true
//! quarter-length-divisors: [4, 3]
//! chord-overflow: truncate
//! flush-tail: false
//! player:
//!   frequency: 44100
//!   bit-size: -16
//!   channels: 2
//!   buffer: 1024
//!   volume: 0.8
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::batch::DEFAULT_WINDOW_LENGTH;
use crate::error::PianistError;
use crate::player::PlayerConfig;

/// How the stream loader turns ticks into quarter lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Snap onsets and releases to a grid.
    pub quantize: bool,
    /// Grid resolutions in divisions of a quarter note. `[4, 3]` allows
    /// sixteenths and eighth-note triplets.
    pub quarter_length_divisors: Vec<u32>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            quantize: true,
            quarter_length_divisors: vec![4, 3],
        }
    }
}

/// What to do with a chord of more than five notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChordOverflow {
    /// Keep the five lowest notes.
    #[default]
    Truncate,
    /// Fail with [`PianistError::ChordOverflow`].
    Error,
}

/// How the image extractor handles irregular input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtractorConfig {
    pub chord_overflow: ChordOverflow,
    /// Emit the last chord of a piano part as an image with a resting left
    /// hand instead of dropping it.
    pub flush_tail: bool,
}

/// Everything the `pianist` pipeline and player can be told.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub loader: LoaderConfig,
    pub extractor: ExtractorConfig,
    pub window_length: usize,
    /// Write `stream.log` and `stream_flatten.log` while loading.
    pub show_log: bool,
    /// Where the stream dumps go (current directory when unset).
    pub log_dir: Option<PathBuf>,
    pub player: PlayerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loader: LoaderConfig::default(),
            extractor: ExtractorConfig::default(),
            window_length: DEFAULT_WINDOW_LENGTH,
            show_log: false,
            log_dir: None,
            player: PlayerConfig::default(),
        }
    }
}

/// Raw configuration for YAML deserialization
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawConfig {
    window_length: Option<usize>,
    show_log: Option<bool>,
    log_dir: Option<PathBuf>,
    quantize: Option<bool>,
    quarter_length_divisors: Option<Vec<u32>>,
    chord_overflow: Option<ChordOverflow>,
    flush_tail: Option<bool>,
    player: Option<PlayerConfig>,
}

impl Config {
    /// Parse a YAML document.
    ///
    /// # Example
    /// ```
    /// use pianist::{ChordOverflow, Config};
    ///
    /// let config = Config::from_yaml("window-length: 16\nchord-overflow: error\n").unwrap();
    /// assert_eq!(config.window_length, 16);
    /// assert_eq!(config.extractor.chord_overflow, ChordOverflow::Error);
    /// assert!(config.loader.quantize);
    /// ```
    ///
    /// # Errors
    /// [`PianistError::Config`] on YAML syntax errors, unknown keys, or
    /// out-of-range values.
    pub fn from_yaml(content: &str) -> Result<Self, PianistError> {
        // An empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| PianistError::Config(e.to_string()))?;

        let defaults = Self::default();
        let config = Self {
            loader: LoaderConfig {
                quantize: raw.quantize.unwrap_or(defaults.loader.quantize),
                quarter_length_divisors: raw
                    .quarter_length_divisors
                    .unwrap_or(defaults.loader.quarter_length_divisors),
            },
            extractor: ExtractorConfig {
                chord_overflow: raw.chord_overflow.unwrap_or_default(),
                flush_tail: raw.flush_tail.unwrap_or(false),
            },
            window_length: raw.window_length.unwrap_or(defaults.window_length),
            show_log: raw.show_log.unwrap_or(false),
            log_dir: raw.log_dir,
            player: raw.player.unwrap_or_default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PianistError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| PianistError::io(path, e))?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> Result<(), PianistError> {
        if self.window_length == 0 {
            return Err(PianistError::Config(
                "window-length must be at least 1".to_string(),
            ));
        }
        if self.loader.quantize && self.loader.quarter_length_divisors.is_empty() {
            return Err(PianistError::Config(
                "quarter-length-divisors cannot be empty when quantizing".to_string(),
            ));
        }
        if self.loader.quarter_length_divisors.contains(&0) {
            return Err(PianistError::Config(
                "quarter-length-divisors must be positive".to_string(),
            ));
        }
        self.player.validate()
    }
}
