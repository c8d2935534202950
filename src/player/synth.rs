//! Note scheduling and a small additive piano voice
//!
//! [`schedule()`] flattens a [`Stream`] into notes timed in seconds using its
//! tempo map. [`Synth`] renders those notes one sample at a time for the
//! audio callback.

use std::f32::consts::TAU;

use crate::stream::{quarter_length_to_f64, ElementKind, Instrument, QuarterLength, Stream};

/// 120 BPM, used until the first tempo event.
const DEFAULT_MICROS_PER_QUARTER: u32 = 500_000;

const ATTACK_SECONDS: f32 = 0.005;
const RELEASE_SECONDS: f32 = 0.08;
/// Exponential decay rate of a struck string, per second.
const DECAY_PER_SECOND: f32 = 2.5;
/// Relative amplitudes of the fundamental and its overtones.
const HARMONICS: [f32; 3] = [1.0, 0.5, 0.25];
/// Headroom so a few simultaneous voices stay out of the clipper.
const VOICE_GAIN: f32 = 0.25;

/// A note timed in seconds from the start of the file.
///
/// # Fields
/// - `midi_note`: MIDI pitch (60 = middle C)
/// - `velocity`: MIDI velocity 1-127
/// - `start_time`: Onset in seconds
/// - `duration`: Held length in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledNote {
    pub midi_note: u8,
    pub velocity: u8,
    pub start_time: f64,
    pub duration: f64,
}

impl ScheduledNote {
    pub fn frequency(&self) -> f32 {
        440.0 * 2f32.powf((f32::from(self.midi_note) - 69.0) / 12.0)
    }
}

/// Piecewise-linear map from quarter lengths to seconds.
struct TempoMap {
    /// `(quarters, seconds, seconds per quarter)` at each tempo change
    segments: Vec<(f64, f64, f64)>,
}

impl TempoMap {
    fn new(changes: &[(QuarterLength, u32)]) -> Self {
        let mut segments = vec![(0.0, 0.0, seconds_per_quarter(DEFAULT_MICROS_PER_QUARTER))];
        for &(offset, micros) in changes {
            let quarters = quarter_length_to_f64(offset);
            let (last_quarters, last_seconds, last_rate) = segments[segments.len() - 1];
            let seconds = last_seconds + (quarters - last_quarters) * last_rate;
            let segment = (quarters, seconds, seconds_per_quarter(micros));
            if quarters <= last_quarters {
                let last = segments.len() - 1;
                segments[last] = segment;
            } else {
                segments.push(segment);
            }
        }
        Self { segments }
    }

    fn seconds(&self, offset: QuarterLength) -> f64 {
        let quarters = quarter_length_to_f64(offset);
        let (start_quarters, start_seconds, rate) = self
            .segments
            .iter()
            .rev()
            .find(|(q, _, _)| *q <= quarters)
            .copied()
            .unwrap_or(self.segments[0]);
        start_seconds + (quarters - start_quarters) * rate
    }
}

fn seconds_per_quarter(micros_per_quarter: u32) -> f64 {
    f64::from(micros_per_quarter) / 1_000_000.0
}

/// All pitched notes of `stream`, ordered by start time.
///
/// Percussion tracks are skipped; everything else is played with the same
/// piano voice.
pub fn schedule(stream: &Stream) -> Vec<ScheduledNote> {
    let tempo = TempoMap::new(&stream.tempo_map());
    let mut notes = Vec::new();

    for track in &stream.tracks {
        if track.instrument == Instrument::Percussion {
            continue;
        }
        for element in &track.elements {
            let events = match &element.kind {
                ElementKind::Note(note) => std::slice::from_ref(note),
                ElementKind::Chord(chord) => chord.as_slice(),
                _ => continue,
            };
            for event in events {
                let start_time = tempo.seconds(element.offset);
                let end_time = tempo.seconds(element.offset + event.duration);
                notes.push(ScheduledNote {
                    midi_note: event.pitch,
                    velocity: event.velocity,
                    start_time,
                    duration: end_time - start_time,
                });
            }
        }
    }

    notes.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    notes
}

#[derive(Debug, Clone)]
struct Voice {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    /// Samples since the note was struck
    age: u64,
    /// Samples until the key is released
    hold: u64,
}

impl Voice {
    fn render(&mut self, sample_rate: f32) -> f32 {
        let t = self.age as f32 / sample_rate;
        let attack = (t / ATTACK_SECONDS).min(1.0);
        let release = if self.age > self.hold {
            let released = (self.age - self.hold) as f32 / sample_rate;
            (1.0 - released / RELEASE_SECONDS).max(0.0)
        } else {
            1.0
        };
        let envelope = attack * (-DECAY_PER_SECOND * t).exp() * release;

        let mut value = 0.0;
        for (k, weight) in HARMONICS.iter().enumerate() {
            value += weight * (self.phase * (k + 1) as f32).sin();
        }
        let norm: f32 = HARMONICS.iter().sum();

        self.phase = (self.phase + TAU * self.frequency / sample_rate) % TAU;
        self.age += 1;
        value / norm * envelope * self.amplitude
    }

    fn is_done(&self, sample_rate: f32) -> bool {
        self.age > self.hold + (RELEASE_SECONDS * sample_rate) as u64
    }
}

#[derive(Debug, Clone, Copy)]
struct Fade {
    remaining: u64,
    total: u64,
}

/// Renders scheduled notes to mono samples in `-1.0..=1.0`.
#[derive(Debug, Clone)]
pub struct Synth {
    sample_rate: f32,
    notes: Vec<ScheduledNote>,
    /// Index of the next note to strike
    next: usize,
    voices: Vec<Voice>,
    /// Samples rendered so far
    clock: u64,
    volume: f32,
    fade: Option<Fade>,
    stopped: bool,
}

impl Synth {
    /// `notes` must be ordered by start time, as [`schedule()`] returns them.
    pub fn new(sample_rate: u32, notes: Vec<ScheduledNote>) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            notes,
            next: 0,
            voices: Vec::new(),
            clock: 0,
            volume: 1.0,
            fade: None,
            stopped: false,
        }
    }

    /// A synth with nothing to play.
    pub fn silent(sample_rate: u32) -> Self {
        Self::new(sample_rate, Vec::new())
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// True once every note has been struck and has died away, or after a
    /// fade or stop completed.
    pub fn is_finished(&self) -> bool {
        self.stopped || (self.next >= self.notes.len() && self.voices.is_empty())
    }

    /// Ramp the output down to silence over `samples` samples.
    pub fn fadeout(&mut self, samples: u64) {
        if samples == 0 {
            self.stop();
            return;
        }
        self.fade = Some(Fade {
            remaining: samples,
            total: samples,
        });
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        self.voices.clear();
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.stopped {
            return 0.0;
        }

        let now = self.clock as f64 / f64::from(self.sample_rate);
        while let Some(note) = self.notes.get(self.next) {
            if note.start_time > now {
                break;
            }
            self.voices.push(Voice {
                frequency: note.frequency(),
                amplitude: f32::from(note.velocity) / 127.0 * VOICE_GAIN,
                phase: 0.0,
                age: 0,
                hold: (note.duration * f64::from(self.sample_rate)) as u64,
            });
            self.next += 1;
        }

        let sample_rate = self.sample_rate;
        let mix: f32 = self.voices.iter_mut().map(|v| v.render(sample_rate)).sum();
        self.voices.retain(|v| !v.is_done(sample_rate));
        self.clock += 1;

        let mut gain = self.volume;
        let mut faded_out = false;
        if let Some(fade) = &mut self.fade {
            gain *= fade.remaining as f32 / fade.total as f32;
            if fade.remaining == 0 {
                faded_out = true;
            } else {
                fade.remaining -= 1;
            }
        }
        if faded_out {
            self.stop();
        }

        // Soft clip
        (mix * gain).tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{Element, NoteEvent, Track};

    fn element(offset: i64, kind: ElementKind) -> Element {
        Element {
            offset: QuarterLength::from_integer(offset),
            kind,
        }
    }

    fn note(pitch: u8, quarters: i64) -> NoteEvent {
        NoteEvent {
            pitch,
            duration: QuarterLength::from_integer(quarters),
            velocity: 100,
        }
    }

    fn track(channel: u8, elements: Vec<Element>) -> Track {
        Track {
            index: 1,
            channel,
            name: None,
            program: 0,
            instrument: Instrument::from_channel_program(channel, 0),
            elements,
        }
    }

    fn stream(conductor: Vec<Element>, tracks: Vec<Track>) -> Stream {
        Stream {
            ticks_per_quarter: 480,
            conductor,
            tracks,
        }
    }

    #[test]
    fn test_schedule_default_tempo() {
        let s = stream(
            vec![],
            vec![track(
                0,
                vec![
                    element(0, ElementKind::Note(note(60, 1))),
                    element(2, ElementKind::Note(note(62, 2))),
                ],
            )],
        );
        let notes = schedule(&s);

        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].start_time, 0.0);
        assert_eq!(notes[0].duration, 0.5);
        assert_eq!(notes[1].start_time, 1.0);
        assert_eq!(notes[1].duration, 1.0);
    }

    #[test]
    fn test_schedule_follows_tempo_changes() {
        // 60 BPM from the start, 120 BPM from quarter 2
        let conductor = vec![
            element(0, ElementKind::Tempo { micros_per_quarter: 1_000_000 }),
            element(2, ElementKind::Tempo { micros_per_quarter: 500_000 }),
        ];
        let s = stream(
            conductor,
            vec![track(0, vec![element(1, ElementKind::Note(note(60, 2)))])],
        );
        let notes = schedule(&s);

        assert_eq!(notes[0].start_time, 1.0);
        // One quarter at 60 BPM, one at 120 BPM
        assert_eq!(notes[0].duration, 1.5);
    }

    #[test]
    fn test_schedule_skips_percussion_and_expands_chords() {
        let s = stream(
            vec![],
            vec![
                track(0, vec![element(0, ElementKind::Chord(vec![note(60, 1), note(64, 1)]))]),
                track(
                    Instrument::PERCUSSION_CHANNEL,
                    vec![element(0, ElementKind::Note(note(36, 1)))],
                ),
            ],
        );
        let pitches: Vec<u8> = schedule(&s).iter().map(|n| n.midi_note).collect();
        assert_eq!(pitches, vec![60, 64]);
    }

    #[test]
    fn test_frequency() {
        let a4 = ScheduledNote {
            midi_note: 69,
            velocity: 100,
            start_time: 0.0,
            duration: 1.0,
        };
        assert!((a4.frequency() - 440.0).abs() < 1e-3);
    }

    #[test]
    fn test_synth_finishes_after_release() {
        let sample_rate = 1000;
        let notes = vec![ScheduledNote {
            midi_note: 60,
            velocity: 100,
            start_time: 0.0,
            duration: 0.1,
        }];
        let mut synth = Synth::new(sample_rate, notes);
        assert!(!synth.is_finished());

        let mut peak: f32 = 0.0;
        for _ in 0..1000 {
            let sample = synth.next_sample();
            assert!((-1.0..=1.0).contains(&sample));
            peak = peak.max(sample.abs());
        }
        assert!(peak > 0.0);
        assert!(synth.is_finished());
    }

    #[test]
    fn test_silent_synth_is_finished() {
        let mut synth = Synth::silent(44100);
        assert!(synth.is_finished());
        assert_eq!(synth.next_sample(), 0.0);
    }

    #[test]
    fn test_fadeout_stops_synth() {
        let notes = vec![ScheduledNote {
            midi_note: 60,
            velocity: 100,
            start_time: 0.0,
            duration: 10.0,
        }];
        let mut synth = Synth::new(1000, notes);
        for _ in 0..100 {
            synth.next_sample();
        }
        synth.fadeout(50);
        for _ in 0..51 {
            synth.next_sample();
        }
        assert!(synth.is_finished());
        assert_eq!(synth.next_sample(), 0.0);
    }
}
