//! Raw-length planning for span corruption.
//!
//! Fusing each noise span into one sentinel shortens the encoder input, so a
//! sample must draw more raw tokens than the desired input length. The planner
//! finds the largest raw length whose encoded input (non-noise tokens, one
//! sentinel per span, one end token) still fits the desired length.

use serde::{Deserialize, Serialize};

use crate::constants::masking::BALANCED_NOISE_DENSITY;
use crate::errors::SpanPackError;

/// Raw and encoded lengths for one span-corruption configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthPlan {
    /// Raw tokens drawn per sample; used as the packed window length.
    pub raw_len: usize,
    /// Length of the encoded input stream, end token included.
    pub input_len: usize,
    /// Length of the encoded target stream, end token included.
    pub target_len: usize,
}

/// Round to nearest integer, ties to even.
pub(crate) fn round_half_even(value: f64) -> usize {
    value.round_ties_even().max(0.0) as usize
}

/// Reject a noise density outside `(0, 1)` or a mean span length below one.
pub fn validate_noise_parameters(
    noise_density: f64,
    mean_noise_span_length: f64,
) -> Result<(), SpanPackError> {
    if !(noise_density > 0.0 && noise_density < 1.0) {
        return Err(SpanPackError::Configuration(format!(
            "noise_density must be in (0, 1), got {noise_density}"
        )));
    }
    if !(mean_noise_span_length >= 1.0) || !mean_noise_span_length.is_finite() {
        return Err(SpanPackError::Configuration(format!(
            "mean_noise_span_length must be a finite value >= 1, got {mean_noise_span_length}"
        )));
    }
    Ok(())
}

/// Encoded `(input_len, target_len)` for `raw_len` raw tokens.
///
/// Saturates instead of overflowing for parameters [`plan`] would reject.
pub fn encoded_lengths(
    raw_len: usize,
    noise_density: f64,
    mean_noise_span_length: f64,
) -> (usize, usize) {
    let noise_tokens = round_half_even(raw_len as f64 * noise_density);
    let nonnoise_tokens = raw_len.saturating_sub(noise_tokens);
    let noise_spans = round_half_even(noise_tokens as f64 / mean_noise_span_length);
    (
        nonnoise_tokens.saturating_add(noise_spans).saturating_add(1),
        noise_tokens.saturating_add(noise_spans).saturating_add(1),
    )
}

/// Plan the raw length whose encoded input fills `desired_len` without padding.
///
/// The returned lengths are those of a sample assembled from `raw_len` tokens.
pub fn plan(
    desired_len: usize,
    noise_density: f64,
    mean_noise_span_length: f64,
) -> Result<LengthPlan, SpanPackError> {
    validate_noise_parameters(noise_density, mean_noise_span_length)?;
    let mut raw_len = desired_len;
    while encoded_lengths(raw_len + 1, noise_density, mean_noise_span_length).0 <= desired_len {
        raw_len += 1;
    }
    let (input_len, target_len) = encoded_lengths(raw_len, noise_density, mean_noise_span_length);

    // At half density an odd raw length rounds one extra token into noise;
    // dropping that token keeps the target from outgrowing the input.
    if noise_density == BALANCED_NOISE_DENSITY && target_len > input_len && raw_len > 1 {
        raw_len -= 1;
    }
    let (input_len, target_len) = encoded_lengths(raw_len, noise_density, mean_noise_span_length);
    Ok(LengthPlan {
        raw_len,
        input_len,
        target_len,
    })
}
