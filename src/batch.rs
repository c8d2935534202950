//! # Window Batching
//!
//! Turn a [`Sequence`] into (input, target) pairs for next-image prediction.
//!
//! An input is `length` consecutive images; its target is the image that comes
//! right after. Windows are zero-padded at both ends of the performance. For a
//! sequence `(I1, I2, ..., IN)` and a length of 3:
//!
//! ```text
//! (0,  0,  I1) -> I2
//! (0,  I1, I2) -> I3
//! ...
//! (IN-2, IN-1, IN) -> 0
//! (IN-1, IN, 0)    -> 0
//! (IN,   0,  0)    -> 0
//! ```
//!
//! The all-zero window with target `I1` carries no information and is never
//! produced. Trailing pairs whose window is entirely zero (a performance that
//! ends in rests) are trimmed, so there are at most `N + length - 1` pairs.
//!
//! ## Example
//! ```
//! use pianist::{sequence_to_batch, Chord, Image, Note, QuarterLength, Sequence};
//!
//! let c = Chord::from_notes(&[Note::new(60, QuarterLength::from_integer(1))]).unwrap();
//! let sequence = Sequence::new(vec![Image::right_only(c)]);
//! let batch = sequence_to_batch(&sequence, 3)?;
//!
//! assert_eq!(batch.input_shape(), [3, 3, 2, 5, 2]);
//! assert_eq!(batch.target_shape(), [3, 2, 5, 2]);
//! # Ok::<(), pianist::PianistError>(())
//! ```

use std::collections::VecDeque;

use log::debug;

use crate::error::PianistError;
use crate::image::{Image, Sequence, HANDS, NOTES_PER_CHORD, NOTE_FEATURES};

/// Images per input window unless configured otherwise.
pub const DEFAULT_WINDOW_LENGTH: usize = 32;

/// Parallel inputs and targets produced by [`sequence_to_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    window_length: usize,
    inputs: Vec<Vec<Image>>,
    targets: Vec<Image>,
}

impl Batch {
    /// Number of (input, target) pairs.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn inputs(&self) -> &[Vec<Image>] {
        &self.inputs
    }

    pub fn targets(&self) -> &[Image] {
        &self.targets
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&[Image], &Image)> + '_ {
        self.inputs
            .iter()
            .map(Vec::as_slice)
            .zip(self.targets.iter())
    }

    /// `[M, L, 2, 5, 2]`
    pub fn input_shape(&self) -> [usize; 5] {
        [
            self.len(),
            self.window_length,
            HANDS,
            NOTES_PER_CHORD,
            NOTE_FEATURES,
        ]
    }

    /// `[M, 2, 5, 2]`
    pub fn target_shape(&self) -> [usize; 4] {
        [self.len(), HANDS, NOTES_PER_CHORD, NOTE_FEATURES]
    }

    /// Input values, row-major, matching [`input_shape()`](Self::input_shape).
    pub fn inputs_flat(&self) -> Vec<f32> {
        self.inputs
            .iter()
            .flatten()
            .flat_map(|image| image.to_array())
            .collect()
    }

    /// Target values, row-major, matching [`target_shape()`](Self::target_shape).
    pub fn targets_flat(&self) -> Vec<f32> {
        self.targets
            .iter()
            .flat_map(|image| image.to_array())
            .collect()
    }
}

fn is_zero_window(window: &[Image]) -> bool {
    window.iter().all(Image::is_zero)
}

fn slide(window: &mut VecDeque<Image>, image: Image) {
    window.pop_front();
    window.push_back(image);
}

/// Slide a window of `length` images over `sequence`.
///
/// # Errors
/// - [`PianistError::InvalidWindowLength`] if `length` is 0
/// - [`PianistError::EmptySequence`] if there are no images
pub fn sequence_to_batch(sequence: &Sequence, length: usize) -> Result<Batch, PianistError> {
    if length == 0 {
        return Err(PianistError::InvalidWindowLength);
    }
    if sequence.is_empty() {
        return Err(PianistError::EmptySequence);
    }

    let capacity = sequence.len() + length;
    let mut inputs: Vec<Vec<Image>> = Vec::with_capacity(capacity);
    let mut targets: Vec<Image> = Vec::with_capacity(capacity);
    let mut window: VecDeque<Image> = std::iter::repeat(Image::ZERO).take(length).collect();

    for image in sequence {
        inputs.push(window.iter().copied().collect());
        targets.push(*image);
        slide(&mut window, *image);
    }

    // (0, ..., 0) -> I1
    inputs.remove(0);
    targets.remove(0);

    // Drain: the window runs off the end of the performance
    for _ in 0..length - 1 {
        inputs.push(window.iter().copied().collect());
        targets.push(Image::ZERO);
        slide(&mut window, Image::ZERO);
    }
    inputs.push(window.iter().copied().collect());
    targets.push(Image::ZERO);

    while inputs.last().is_some_and(|w| is_zero_window(w)) {
        inputs.pop();
        targets.pop();
    }

    debug!(
        "Built {} window pairs of length {} from {} images",
        targets.len(),
        length,
        sequence.len()
    );
    Ok(Batch {
        window_length: length,
        inputs,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Chord, Note};
    use crate::stream::QuarterLength;

    fn image(pitch: u8) -> Image {
        let chord = Chord::from_notes(&[Note::new(pitch, QuarterLength::from_integer(1))]).unwrap();
        Image::right_only(chord)
    }

    fn z() -> Image {
        Image::ZERO
    }

    #[test]
    fn test_zero_length_rejected() {
        let sequence = Sequence::new(vec![image(60)]);
        assert!(matches!(
            sequence_to_batch(&sequence, 0),
            Err(PianistError::InvalidWindowLength)
        ));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        assert!(matches!(
            sequence_to_batch(&Sequence::default(), 4),
            Err(PianistError::EmptySequence)
        ));
    }

    #[test]
    fn test_single_image() {
        let i1 = image(60);
        let batch = sequence_to_batch(&Sequence::new(vec![i1]), 3).unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(
            batch.inputs(),
            &[vec![z(), z(), i1], vec![z(), i1, z()], vec![i1, z(), z()]]
        );
        assert_eq!(batch.targets(), &[z(), z(), z()]);
    }

    #[test]
    fn test_three_distinct_images() {
        let (i1, i2, i3) = (image(60), image(62), image(64));
        let batch = sequence_to_batch(&Sequence::new(vec![i1, i2, i3]), 3).unwrap();

        // N + L - 1 pairs, none trimmed
        assert_eq!(batch.len(), 5);
        assert_eq!(
            batch.inputs(),
            &[
                vec![z(), z(), i1],
                vec![z(), i1, i2],
                vec![i1, i2, i3],
                vec![i2, i3, z()],
                vec![i3, z(), z()],
            ]
        );
        assert_eq!(batch.targets(), &[i2, i3, z(), z(), z()]);
    }

    #[test]
    fn test_trailing_zero_windows_trimmed() {
        let i1 = image(60);
        let batch = sequence_to_batch(&Sequence::new(vec![i1, z(), z()]), 2).unwrap();

        // (0, I1)->0, (I1, 0)->0 survive; (0, 0)->0 twice is trimmed
        assert_eq!(batch.inputs(), &[vec![z(), i1], vec![i1, z()]]);
        assert_eq!(batch.targets(), &[z(), z()]);
    }

    #[test]
    fn test_trim_stops_at_first_non_zero_window() {
        // A zero window in the middle stays; only the tail is trimmed
        let i1 = image(60);
        let i2 = image(62);
        let sequence = Sequence::new(vec![i1, z(), z(), i2, z(), z(), z()]);
        let batch = sequence_to_batch(&sequence, 2).unwrap();

        assert!(batch.inputs().contains(&vec![z(), z()]));
        assert_eq!(batch.inputs().last(), Some(&vec![i2, z()]));
        assert_eq!(batch.inputs().len(), batch.targets().len());
    }

    #[test]
    fn test_all_zero_sequence_trims_to_empty() {
        let batch = sequence_to_batch(&Sequence::new(vec![z(), z()]), 3).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.input_shape(), [0, 3, 2, 5, 2]);
    }

    #[test]
    fn test_sliding_window_consistency() {
        let images: Vec<Image> = (0..10).map(|k| image(40 + k)).collect();
        let length = 4;
        let batch = sequence_to_batch(&Sequence::new(images), length).unwrap();

        assert_eq!(batch.inputs().len(), batch.targets().len());
        assert_eq!(batch.len(), 10 + length - 1);
        for i in 1..batch.len() {
            assert_eq!(batch.targets()[i - 1], batch.inputs()[i][length - 1]);
        }
    }

    #[test]
    fn test_window_length_one() {
        let (i1, i2) = (image(60), image(62));
        let batch = sequence_to_batch(&Sequence::new(vec![i1, i2]), 1).unwrap();
        assert_eq!(batch.inputs(), &[vec![i1], vec![i2]]);
        assert_eq!(batch.targets(), &[i2, z()]);
    }

    #[test]
    fn test_flat_shapes() {
        let batch = sequence_to_batch(&Sequence::new(vec![image(60), image(62)]), 4).unwrap();
        let [m, l, h, n, f] = batch.input_shape();
        assert_eq!(batch.inputs_flat().len(), m * l * h * n * f);
        let [m, h, n, f] = batch.target_shape();
        assert_eq!(batch.targets_flat().len(), m * h * n * f);
        assert_eq!(batch.pairs().count(), batch.len());
    }
}
