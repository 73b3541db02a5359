use serde::{Deserialize, Serialize};

use crate::constants::masking::{
    DEFAULT_MASK_SEED, DEFAULT_MEAN_NOISE_SPAN_LENGTH, DEFAULT_NOISE_DENSITY, DEFAULT_SEQ_LENGTH,
};
use crate::errors::SpanPackError;
use crate::planner::validate_noise_parameters;
use crate::splits::SplitRatios;

/// Span-corruption settings shared by every split of a corpus.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanCorruptionConfig {
    /// Desired encoded input length, end token included.
    pub seq_length: usize,
    /// Fraction of raw tokens replaced by noise spans.
    pub noise_density: f64,
    /// Average length of one noise span.
    pub mean_noise_span_length: f64,
    /// RNG seed for the dataset-owned mask generator.
    pub seed: u64,
}

impl Default for SpanCorruptionConfig {
    fn default() -> Self {
        Self {
            seq_length: DEFAULT_SEQ_LENGTH,
            noise_density: DEFAULT_NOISE_DENSITY,
            mean_noise_span_length: DEFAULT_MEAN_NOISE_SPAN_LENGTH,
            seed: DEFAULT_MASK_SEED,
        }
    }
}

impl SpanCorruptionConfig {
    /// Reject settings that cannot produce a valid mask.
    pub fn validate(&self) -> Result<(), SpanPackError> {
        validate_noise_parameters(self.noise_density, self.mean_noise_span_length)?;
        if self.seq_length < 2 {
            return Err(SpanPackError::Configuration(format!(
                "seq_length must be at least 2, got {}",
                self.seq_length
            )));
        }
        Ok(())
    }
}

/// Corpus-level settings for building per-split datasets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Relative train/validation/test document shares.
    pub splits: SplitRatios,
    /// Span-corruption settings applied to every split.
    pub corruption: SpanCorruptionConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_span_corruption_recipe() {
        let config = SpanCorruptionConfig::default();
        assert_eq!(config.seq_length, 512);
        assert_eq!(config.noise_density, 0.15);
        assert_eq!(config.mean_noise_span_length, 3.0);
        assert_eq!(config.seed, 42);
        config.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: SpanCorruptionConfig =
            serde_json::from_str(r#"{ "seq_length": 128, "seed": 7 }"#).unwrap();
        assert_eq!(config.seq_length, 128);
        assert_eq!(config.seed, 7);
        assert_eq!(config.noise_density, 0.15);

        let corpus: CorpusConfig =
            serde_json::from_str(r#"{ "corruption": { "noise_density": 0.5 } }"#).unwrap();
        assert_eq!(corpus.corruption.noise_density, 0.5);
        assert_eq!(corpus.splits, SplitRatios::default());
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let bad = [
            SpanCorruptionConfig {
                noise_density: 0.0,
                ..Default::default()
            },
            SpanCorruptionConfig {
                noise_density: 1.0,
                ..Default::default()
            },
            SpanCorruptionConfig {
                noise_density: f64::NAN,
                ..Default::default()
            },
            SpanCorruptionConfig {
                mean_noise_span_length: 0.5,
                ..Default::default()
            },
            SpanCorruptionConfig {
                mean_noise_span_length: 0.0,
                ..Default::default()
            },
            SpanCorruptionConfig {
                seq_length: 1,
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(SpanPackError::Configuration(_))
            ));
        }
    }
}
