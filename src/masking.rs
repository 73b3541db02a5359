//! Random span noise masks.
//!
//! The number of noise tokens and noise spans is fixed by the sequence length,
//! noise density and mean span length. Spans alternate between non-noise and
//! noise, beginning with non-noise; subject to those counts every arrangement
//! is equally likely.

use rand::Rng;
use rand::seq::SliceRandom;

use crate::errors::SpanPackError;
use crate::planner::round_half_even;

/// Boolean noise mask over a token window (`true` marks noise).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NoiseMask {
    bits: Vec<bool>,
}

impl NoiseMask {
    /// Wrap an explicit mask.
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Number of positions covered by the mask.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True when the mask covers no positions.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Mask bits in position order.
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Count of noise positions.
    pub fn noise_count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    /// Count of maximal runs of noise positions.
    pub fn span_count(&self) -> usize {
        self.bits
            .iter()
            .enumerate()
            .filter(|(idx, bit)| **bit && (*idx == 0 || !self.bits[idx - 1]))
            .count()
    }

    /// Mask with every position flipped.
    pub fn complement(&self) -> Self {
        Self {
            bits: self.bits.iter().map(|bit| !bit).collect(),
        }
    }
}

/// Noise token and noise span counts used for a window of `length` tokens.
///
/// Noise tokens are clamped to `[1, length - 1]` and at least one span is used.
pub fn noise_budget(
    length: usize,
    noise_density: f64,
    mean_noise_span_length: f64,
) -> (usize, usize) {
    let upper = length.saturating_sub(1).max(1);
    let noise_tokens = round_half_even(length as f64 * noise_density).clamp(1, upper);
    let noise_spans = round_half_even(noise_tokens as f64 / mean_noise_span_length).max(1);
    (noise_tokens, noise_spans)
}

/// Build a random span noise mask of `length` positions.
pub fn random_spans_noise_mask<R: Rng + ?Sized>(
    length: usize,
    noise_density: f64,
    mean_noise_span_length: f64,
    rng: &mut R,
) -> Result<NoiseMask, SpanPackError> {
    if length < 2 {
        return Err(SpanPackError::Configuration(format!(
            "noise mask length must be at least 2, got {length}"
        )));
    }
    let (noise_tokens, noise_spans) = noise_budget(length, noise_density, mean_noise_span_length);
    let nonnoise_tokens = length - noise_tokens;
    if nonnoise_tokens < noise_spans {
        return Err(SpanPackError::Configuration(format!(
            "{nonnoise_tokens} non-noise tokens cannot separate {noise_spans} noise spans \
             (length {length}, density {noise_density})"
        )));
    }

    let noise_span_lengths = random_segmentation(noise_tokens, noise_spans, rng);
    let nonnoise_span_lengths = random_segmentation(nonnoise_tokens, noise_spans, rng);

    let mut bits = Vec::with_capacity(length);
    for (nonnoise, noise) in nonnoise_span_lengths.into_iter().zip(noise_span_lengths) {
        bits.extend(std::iter::repeat_n(false, nonnoise));
        bits.extend(std::iter::repeat_n(true, noise));
    }
    bits.truncate(length);
    Ok(NoiseMask { bits })
}

/// Partition `num_items` into `num_segments` positive lengths uniformly at random.
///
/// Requires `1 <= num_segments <= num_items`.
fn random_segmentation<R: Rng + ?Sized>(
    num_items: usize,
    num_segments: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut cuts: Vec<bool> = (0..num_items.saturating_sub(1))
        .map(|gap| gap + 1 < num_segments)
        .collect();
    cuts.shuffle(rng);

    let mut lengths = Vec::with_capacity(num_segments);
    let mut current = 1;
    for cut in cuts {
        if cut {
            lengths.push(current);
            current = 1;
        } else {
            current += 1;
        }
    }
    lengths.push(current);
    lengths
}
