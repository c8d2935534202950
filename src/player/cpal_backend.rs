use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig,
    SupportedBufferSize, SupportedStreamConfigRange,
};
use log::{debug, error, info, warn};

use super::synth::{schedule, Synth};
use super::{AudioBackend, PlayerConfig};
use crate::config::LoaderConfig;
use crate::error::PianistError;
use crate::stream::read_midi;

/// Default output device driven by a [`Synth`].
///
/// The synth is shared with the audio callback; the output stream only exists
/// between [`play()`](AudioBackend::play) and [`stop()`](AudioBackend::stop).
pub struct CpalBackend {
    device: cpal::Device,
    stream_config: StreamConfig,
    sample_format: SampleFormat,
    synth: Arc<Mutex<Synth>>,
    stream: Option<cpal::Stream>,
    volume: f32,
}

impl std::fmt::Debug for CpalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalBackend")
            .field("stream_config", &self.stream_config)
            .field("sample_format", &self.sample_format)
            .field("playing", &self.stream.is_some())
            .field("volume", &self.volume)
            .finish()
    }
}

impl CpalBackend {
    /// Open the host's default output device.
    pub fn open(config: &PlayerConfig) -> Result<Self, PianistError> {
        config.validate()?;
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PianistError::Audio("no output device available".to_string()))?;
        info!(
            "Opened audio device '{}'",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );

        let ranges = device
            .supported_output_configs()
            .map_err(|e| PianistError::Audio(e.to_string()))?;
        let (stream_config, sample_format) = choose_config(ranges, config)?;
        if stream_config.sample_rate.0 != config.frequency
            || stream_config.channels != config.channels
            || sample_format != config.sample_format()?
        {
            warn!(
                "Device does not support {} Hz, {} channels, {:?}; using {:?} {:?}",
                config.frequency,
                config.channels,
                config.sample_format()?,
                stream_config,
                sample_format
            );
        }
        debug!("Audio stream config: {:?} {:?}", stream_config, sample_format);

        Ok(Self {
            device,
            synth: Arc::new(Mutex::new(Synth::silent(stream_config.sample_rate.0))),
            stream_config,
            sample_format,
            stream: None,
            volume: config.volume,
        })
    }

    fn synth(&self) -> Result<MutexGuard<'_, Synth>, PianistError> {
        self.synth
            .lock()
            .map_err(|_| PianistError::Audio("synth lock poisoned".to_string()))
    }

    fn build_stream<T>(&self) -> Result<cpal::Stream, PianistError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let synth = Arc::clone(&self.synth);
        let channels = usize::from(self.stream_config.channels);

        self.device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| match synth.lock() {
                    Ok(mut synth) => {
                        for frame in data.chunks_mut(channels) {
                            let value: T = Sample::from_sample(synth.next_sample());
                            for sample in frame.iter_mut() {
                                *sample = value;
                            }
                        }
                    }
                    Err(_) => {
                        for sample in data.iter_mut() {
                            *sample = T::EQUILIBRIUM;
                        }
                    }
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| PianistError::Audio(e.to_string()))
    }
}

/// Pick the supported output configuration closest to `config`.
///
/// Ranges covering the requested sample rate win, then the requested sample
/// format, then the requested channel count. The sample rate is clamped into
/// the chosen range and the buffer size into its supported frame range.
pub(crate) fn choose_config(
    ranges: impl IntoIterator<Item = SupportedStreamConfigRange>,
    config: &PlayerConfig,
) -> Result<(StreamConfig, SampleFormat), PianistError> {
    let wanted_format = config.sample_format()?;
    let range = ranges
        .into_iter()
        .filter(|range| range.channels() != 0 && is_renderable(range.sample_format()))
        .min_by_key(|range| {
            (
                rate_distance(range, config.frequency),
                range.sample_format() != wanted_format,
                range.channels() != config.channels,
            )
        })
        .ok_or_else(|| {
            PianistError::Audio("device lists no usable output configuration".to_string())
        })?;

    let sample_rate = SampleRate(
        config
            .frequency
            .clamp(range.min_sample_rate().0, range.max_sample_rate().0),
    );
    let buffer_size = match *range.buffer_size() {
        SupportedBufferSize::Unknown => BufferSize::Default,
        SupportedBufferSize::Range { min, max } => {
            BufferSize::Fixed(config.buffer.clamp(min, max))
        }
    };

    Ok((
        StreamConfig {
            channels: range.channels(),
            sample_rate,
            buffer_size,
        },
        range.sample_format(),
    ))
}

fn rate_distance(range: &SupportedStreamConfigRange, rate: u32) -> u32 {
    let (min, max) = (range.min_sample_rate().0, range.max_sample_rate().0);
    if rate < min {
        min - rate
    } else {
        rate.saturating_sub(max)
    }
}

/// Sample formats [`CpalBackend`] can build a stream for.
fn is_renderable(format: SampleFormat) -> bool {
    matches!(
        format,
        SampleFormat::I8
            | SampleFormat::I16
            | SampleFormat::U8
            | SampleFormat::U16
            | SampleFormat::F32
    )
}

impl AudioBackend for CpalBackend {
    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
        if let Ok(mut synth) = self.synth.lock() {
            synth.set_volume(volume);
        }
    }

    fn load(&mut self, path: &Path) -> Result<(), PianistError> {
        self.stop();

        // Play what was performed, not the grid it would snap to
        let loader = LoaderConfig {
            quantize: false,
            ..LoaderConfig::default()
        };
        let stream = read_midi(path, &loader)?;
        let notes = schedule(&stream);
        debug!("Scheduled {} notes from {}", notes.len(), path.display());

        let mut synth = Synth::new(self.stream_config.sample_rate.0, notes);
        synth.set_volume(self.volume);
        *self.synth()? = synth;
        Ok(())
    }

    fn play(&mut self) -> Result<(), PianistError> {
        let stream = match self.sample_format {
            SampleFormat::I8 => self.build_stream::<i8>()?,
            SampleFormat::I16 => self.build_stream::<i16>()?,
            SampleFormat::U8 => self.build_stream::<u8>()?,
            SampleFormat::U16 => self.build_stream::<u16>()?,
            SampleFormat::F32 => self.build_stream::<f32>()?,
            other => {
                return Err(PianistError::Audio(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        };
        stream
            .play()
            .map_err(|e| PianistError::Audio(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.stream.is_some() && self.synth().map(|s| !s.is_finished()).unwrap_or(false)
    }

    fn fadeout(&mut self, duration: Duration) {
        let samples = (duration.as_secs_f64() * f64::from(self.stream_config.sample_rate.0)) as u64;
        if let Ok(mut synth) = self.synth.lock() {
            synth.fadeout(samples);
        }
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause audio stream: {}", e);
            }
        }
        if let Ok(mut synth) = self.synth.lock() {
            synth.stop();
        }
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.stop();
        debug!("Released audio device");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(
        channels: u16,
        rates: (u32, u32),
        buffer: SupportedBufferSize,
        format: SampleFormat,
    ) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(rates.0),
            SampleRate(rates.1),
            buffer,
            format,
        )
    }

    fn frames(min: u32, max: u32) -> SupportedBufferSize {
        SupportedBufferSize::Range { min, max }
    }

    #[test]
    fn test_exact_match_is_kept() {
        let ranges = vec![
            range(2, (48000, 48000), frames(64, 4096), SampleFormat::F32),
            range(2, (8000, 96000), frames(64, 4096), SampleFormat::I16),
        ];
        let (stream_config, format) = choose_config(ranges, &PlayerConfig::default()).unwrap();

        assert_eq!(format, SampleFormat::I16);
        assert_eq!(stream_config.channels, 2);
        assert_eq!(stream_config.sample_rate, SampleRate(44100));
        assert_eq!(stream_config.buffer_size, BufferSize::Fixed(1024));
    }

    #[test]
    fn test_float_only_device_at_48k() {
        let ranges = vec![range(2, (48000, 48000), frames(256, 512), SampleFormat::F32)];
        let (stream_config, format) = choose_config(ranges, &PlayerConfig::default()).unwrap();

        assert_eq!(format, SampleFormat::F32);
        assert_eq!(stream_config.sample_rate, SampleRate(48000));
        assert_eq!(stream_config.buffer_size, BufferSize::Fixed(512));
    }

    #[test]
    fn test_rate_coverage_beats_format() {
        let ranges = vec![
            range(2, (48000, 48000), frames(64, 4096), SampleFormat::I16),
            range(2, (44100, 48000), frames(64, 4096), SampleFormat::F32),
        ];
        let (stream_config, format) = choose_config(ranges, &PlayerConfig::default()).unwrap();

        assert_eq!(format, SampleFormat::F32);
        assert_eq!(stream_config.sample_rate, SampleRate(44100));
    }

    #[test]
    fn test_unknown_buffer_size_uses_default() {
        let ranges = vec![range(
            1,
            (22050, 44100),
            SupportedBufferSize::Unknown,
            SampleFormat::I16,
        )];
        let (stream_config, _) = choose_config(ranges, &PlayerConfig::default()).unwrap();

        assert_eq!(stream_config.channels, 1);
        assert_eq!(stream_config.buffer_size, BufferSize::Default);
    }

    #[test]
    fn test_unrenderable_formats_skipped() {
        let ranges = vec![
            range(2, (44100, 44100), frames(64, 4096), SampleFormat::F64),
            range(0, (44100, 44100), frames(64, 4096), SampleFormat::I16),
        ];
        let result = choose_config(ranges, &PlayerConfig::default());
        assert!(matches!(result, Err(PianistError::Audio(_))));
    }
}
