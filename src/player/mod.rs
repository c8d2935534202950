//! # Player Module
//!
//! Play a MIDI file through the default audio output, blocking until it ends.
//!
//! ## Sub-modules
//! - `synth` - Turns a parsed stream into timed notes and renders them
//! - `cpal_backend` - [`AudioBackend`] on top of a `cpal` output stream
//!
//! ## Key Types
//! - [`PlayerConfig`] - Mixer settings (sample rate, sample format, channels,
//!   buffer size, volume)
//! - [`AudioBackend`] - What the player needs from an audio device: load, play,
//!   poll, fade out, stop
//! - [`Pianist`] - Owns a backend for its whole lifetime; the device is
//!   released when the `Pianist` is dropped
//!
//! ## Interrupts
//! [`Pianist::listen_music()`] watches an [`AtomicBool`] while polling. When it
//! flips, playback fades out over [`FADEOUT`] and stops, and the call returns
//! [`PlaybackOutcome::Interrupted`] so the caller can exit.
//!
//! ## Example
//! ```rust,no_run
//! use pianist::player::{Pianist, PlayerConfig};
//!
//! let mut mozart = Pianist::new(PlayerConfig::default())?;
//! mozart.play_music("mz_311_1.mid")?;
//! # Ok::<(), pianist::PianistError>(())
//! ```

mod cpal_backend;
mod synth;


use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::info;
use serde::Deserialize;

use crate::error::PianistError;

pub use cpal_backend::CpalBackend;
pub use synth::{schedule, ScheduledNote, Synth};

/// How often playback state is polled.
pub const POLL_RATE_HZ: u64 = 30;

/// Fade applied when playback is interrupted.
pub const FADEOUT: Duration = Duration::from_millis(1000);

/// Mixer settings.
///
/// `bit_size` follows the usual mixer convention: the magnitude is the sample
/// width and a negative value means signed samples. `32` selects float
/// samples.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PlayerConfig {
    /// Sample rate in Hz.
    pub frequency: u32,
    pub bit_size: i8,
    /// 1 is mono, 2 is stereo.
    pub channels: u16,
    /// Frames per audio buffer.
    pub buffer: u32,
    /// 0.0 to 1.0
    pub volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frequency: 44100,
            bit_size: -16,
            channels: 2,
            buffer: 1024,
            volume: 0.8,
        }
    }
}

impl PlayerConfig {
    pub fn validate(&self) -> Result<(), PianistError> {
        if self.frequency == 0 {
            return Err(PianistError::Config(
                "player frequency must be positive".to_string(),
            ));
        }
        if self.channels == 0 {
            return Err(PianistError::Config(
                "player needs at least one channel".to_string(),
            ));
        }
        if self.buffer == 0 {
            return Err(PianistError::Config(
                "player buffer must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(PianistError::Config(format!(
                "player volume {} is outside 0.0-1.0",
                self.volume
            )));
        }
        self.sample_format().map(|_| ())
    }

    /// The `cpal` sample format selected by `bit_size`.
    pub fn sample_format(&self) -> Result<cpal::SampleFormat, PianistError> {
        match self.bit_size {
            8 => Ok(cpal::SampleFormat::U8),
            -8 => Ok(cpal::SampleFormat::I8),
            16 => Ok(cpal::SampleFormat::U16),
            -16 => Ok(cpal::SampleFormat::I16),
            32 => Ok(cpal::SampleFormat::F32),
            other => Err(PianistError::Config(format!(
                "unsupported bit size {} (use 8, -8, 16, -16 or 32)",
                other
            ))),
        }
    }
}

/// An audio device able to play one MIDI file at a time.
pub trait AudioBackend {
    fn set_volume(&mut self, volume: f32);

    /// Prepare a file for playback, replacing whatever was loaded.
    fn load(&mut self, path: &Path) -> Result<(), PianistError>;

    /// Start playing the loaded file. Returns immediately.
    fn play(&mut self) -> Result<(), PianistError>;

    /// Whether sound is still being produced.
    fn is_busy(&self) -> bool;

    /// Start fading out over `duration`. Returns immediately.
    fn fadeout(&mut self, duration: Duration);

    fn stop(&mut self);
}

/// How a blocking playback call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Interrupted,
}

/// Plays MIDI files on an [`AudioBackend`] it owns.
#[derive(Debug)]
pub struct Pianist<B: AudioBackend> {
    config: PlayerConfig,
    backend: B,
}

impl Pianist<CpalBackend> {
    /// Open the default output device with `config`.
    pub fn new(config: PlayerConfig) -> Result<Self, PianistError> {
        let backend = CpalBackend::open(&config)?;
        Self::with_backend(config, backend)
    }
}

impl<B: AudioBackend> Pianist<B> {
    pub fn with_backend(config: PlayerConfig, mut backend: B) -> Result<Self, PianistError> {
        config.validate()?;
        backend.set_volume(config.volume);
        Ok(Self { config, backend })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Play a file, blocking until it finishes.
    pub fn play_music(&mut self, path: impl AsRef<Path>) -> Result<(), PianistError> {
        self.play_until(path.as_ref(), None).map(|_| ())
    }

    /// Play a file, blocking until it finishes or `interrupt` is set.
    pub fn listen_music(
        &mut self,
        path: impl AsRef<Path>,
        interrupt: &AtomicBool,
    ) -> Result<PlaybackOutcome, PianistError> {
        self.play_until(path.as_ref(), Some(interrupt))
    }

    /// Fade out over `duration`, wait for the fade, then stop.
    pub fn stop_with_fadeout(&mut self, duration: Duration) {
        self.backend.fadeout(duration);
        let deadline = Instant::now() + duration;
        while self.backend.is_busy() && Instant::now() < deadline {
            thread::sleep(poll_interval());
        }
        self.backend.stop();
    }

    fn play_until(
        &mut self,
        path: &Path,
        interrupt: Option<&AtomicBool>,
    ) -> Result<PlaybackOutcome, PianistError> {
        self.backend.load(path)?;
        self.backend.play()?;
        info!("Playing {}", path.display());

        while self.backend.is_busy() {
            if interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                info!("Playback interrupted, fading out");
                self.stop_with_fadeout(FADEOUT);
                return Ok(PlaybackOutcome::Interrupted);
            }
            thread::sleep(poll_interval());
        }
        Ok(PlaybackOutcome::Finished)
    }
}

fn poll_interval() -> Duration {
    Duration::from_millis(1000 / POLL_RATE_HZ)
}
