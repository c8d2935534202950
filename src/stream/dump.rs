//! Text dumps of a parsed stream, for eyeballing what the loader produced.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use super::types::{format_quarter_length, pitch_name, Element, ElementKind, Stream, Track};
use crate::error::PianistError;

/// File name of the hierarchical dump.
pub const STREAM_LOG: &str = "stream.log";
/// File name of the flat dump.
pub const STREAM_FLAT_LOG: &str = "stream_flatten.log";

fn describe(element: &Element) -> String {
    match &element.kind {
        ElementKind::Note(note) => format!(
            "<Note {} ({}) ql={} vel={}>",
            pitch_name(note.pitch),
            note.pitch,
            format_quarter_length(note.duration),
            note.velocity
        ),
        ElementKind::Rest { duration } => {
            format!("<Rest ql={}>", format_quarter_length(*duration))
        }
        ElementKind::Chord(notes) => {
            let names: Vec<String> = notes.iter().map(|n| pitch_name(n.pitch)).collect();
            format!(
                "<Chord {} ql={}>",
                names.join(" "),
                format_quarter_length(element.duration())
            )
        }
        ElementKind::Tempo { micros_per_quarter } => {
            format!("<Tempo {:.2} bpm>", 60_000_000.0 / f64::from(*micros_per_quarter))
        }
        ElementKind::TimeSignature {
            numerator,
            denominator,
        } => format!("<TimeSignature {}/{}>", numerator, denominator),
        ElementKind::KeySignature { fifths, minor } => format!(
            "<KeySignature {} {}>",
            fifths,
            if *minor { "minor" } else { "major" }
        ),
    }
}

fn describe_track(track: &Track) -> String {
    format!(
        "<Track {} channel={} {} program={}{}>",
        track.index,
        track.channel + 1,
        track.instrument.name(),
        track.program,
        track
            .name
            .as_ref()
            .map(|n| format!(" '{}'", n))
            .unwrap_or_default()
    )
}

impl Stream {
    /// Hierarchical dump: conductor elements, then each track with its elements
    /// indented below it.
    pub fn show_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "<Stream ticks_per_quarter={}>", self.ticks_per_quarter);
        if !self.conductor.is_empty() {
            let _ = writeln!(out, "    <Conductor>");
            for element in &self.conductor {
                let _ = writeln!(
                    out,
                    "        {{{}}} {}",
                    format_quarter_length(element.offset),
                    describe(element)
                );
            }
        }
        for track in &self.tracks {
            let _ = writeln!(out, "    {}", describe_track(track));
            for element in &track.elements {
                let _ = writeln!(
                    out,
                    "        {{{}}} {}",
                    format_quarter_length(element.offset),
                    describe(element)
                );
            }
        }
        out
    }

    /// Flat dump: every element of the file in offset order, tagged with the
    /// track it came from.
    pub fn show_flat_text(&self) -> String {
        let mut rows: Vec<(&Element, String)> = self
            .conductor
            .iter()
            .map(|e| (e, "conductor".to_string()))
            .collect();
        for track in &self.tracks {
            let tag = format!("track {}.{}", track.index, track.channel + 1);
            rows.extend(track.elements.iter().map(|e| (e, tag.clone())));
        }
        rows.sort_by(|a, b| a.0.offset.cmp(&b.0.offset));

        let mut out = String::new();
        for (element, tag) in rows {
            let _ = writeln!(
                out,
                "{{{}}} {} [{}]",
                format_quarter_length(element.offset),
                describe(element),
                tag
            );
        }
        out
    }

    /// Write [`STREAM_LOG`] and [`STREAM_FLAT_LOG`] into `dir`, returning their
    /// paths.
    pub fn write_logs(&self, dir: &Path) -> Result<(PathBuf, PathBuf), PianistError> {
        let tree = dir.join(STREAM_LOG);
        let flat = dir.join(STREAM_FLAT_LOG);
        fs::write(&tree, self.show_text()).map_err(|e| PianistError::io(&tree, e))?;
        fs::write(&flat, self.show_flat_text()).map_err(|e| PianistError::io(&flat, e))?;
        info!("Wrote stream dumps to {} and {}", tree.display(), flat.display());
        Ok((tree, flat))
    }
}
