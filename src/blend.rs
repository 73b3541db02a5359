//! Weighted interleaving of several training datasets.

use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::data::TrainingSample;
use crate::dataset::TrainingDataset;
use crate::errors::SpanPackError;

/// Scale `weights` to sum to one.
pub fn normalize_weights(weights: &[f64]) -> Result<Vec<f64>, SpanPackError> {
    if weights.is_empty() {
        return Err(SpanPackError::Configuration(
            "blending needs at least one weight".into(),
        ));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(SpanPackError::Configuration(format!(
            "blend weights must be finite and non-negative: {weights:?}"
        )));
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(SpanPackError::Configuration(
            "blend weights must not all be zero".into(),
        ));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

/// Interleave `size` draws so each dataset's share tracks its weight.
///
/// Draw `i` goes to the dataset furthest behind its quota
/// (`weight * max(i, 1) - drawn`); ties go to the lowest index. Returns the
/// dataset of each draw and that dataset's running sample index.
pub fn build_blending_indices(weights: &[f64], size: usize) -> (Vec<usize>, Vec<usize>) {
    let mut dataset_index = Vec::with_capacity(size);
    let mut dataset_sample_index = Vec::with_capacity(size);
    let mut drawn = vec![0usize; weights.len()];

    for i in 0..size {
        let scale = i.max(1) as f64;
        let mut best = 0;
        let mut best_error = f64::NEG_INFINITY;
        for (idx, weight) in weights.iter().enumerate() {
            let error = weight * scale - drawn[idx] as f64;
            if error > best_error {
                best = idx;
                best_error = error;
            }
        }
        dataset_index.push(best);
        dataset_sample_index.push(drawn[best]);
        drawn[best] += 1;
    }
    (dataset_index, dataset_sample_index)
}

/// Datasets mixed by weight into one index space.
///
/// The blend holds as many samples as its members combined. A member asked for
/// more samples than it holds wraps around to its start.
pub struct BlendedDataset {
    datasets: Vec<Arc<dyn TrainingDataset>>,
    weights: Vec<f64>,
    dataset_index: Vec<usize>,
    dataset_sample_index: Vec<usize>,
}

impl BlendedDataset {
    /// Blend `datasets` by `weights` (normalized internally).
    pub fn new(
        datasets: Vec<Arc<dyn TrainingDataset>>,
        weights: &[f64],
    ) -> Result<Self, SpanPackError> {
        if datasets.len() != weights.len() {
            return Err(SpanPackError::Configuration(format!(
                "{} datasets but {} blend weights",
                datasets.len(),
                weights.len()
            )));
        }
        let weights = normalize_weights(weights)?;
        if let Some(empty) = datasets.iter().position(|dataset| dataset.is_empty()) {
            return Err(SpanPackError::Configuration(format!(
                "blended dataset member {empty} holds no samples"
            )));
        }

        let size = datasets.iter().map(|dataset| dataset.len()).sum();
        let started = Instant::now();
        let (dataset_index, dataset_sample_index) = build_blending_indices(&weights, size);
        debug!(
            members = datasets.len(),
            size,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "built blending indices"
        );
        Ok(Self {
            datasets,
            weights,
            dataset_index,
            dataset_sample_index,
        })
    }

    /// Normalized member weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Member dataset serving each blended index.
    pub fn dataset_index(&self) -> &[usize] {
        &self.dataset_index
    }

    /// Member `(dataset, sample)` behind blended index `idx`.
    pub fn source_of(&self, idx: usize) -> Option<(usize, usize)> {
        let dataset = *self.dataset_index.get(idx)?;
        let sample = self.dataset_sample_index[idx] % self.datasets[dataset].len();
        Some((dataset, sample))
    }
}

impl TrainingDataset for BlendedDataset {
    fn len(&self) -> usize {
        self.dataset_index.len()
    }

    fn get(&self, idx: usize) -> Result<TrainingSample, SpanPackError> {
        let (dataset, sample) = self.source_of(idx).ok_or(SpanPackError::OutOfRange {
            index: idx,
            len: self.dataset_index.len(),
        })?;
        self.datasets[dataset].get(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Member whose sample `i` is `[tag, i]`.
    struct Tagged {
        tag: u32,
        len: usize,
    }

    impl TrainingDataset for Tagged {
        fn len(&self) -> usize {
            self.len
        }

        fn get(&self, idx: usize) -> Result<TrainingSample, SpanPackError> {
            if idx >= self.len {
                return Err(SpanPackError::OutOfRange {
                    index: idx,
                    len: self.len,
                });
            }
            Ok(TrainingSample {
                text: vec![self.tag, idx as u32],
                prefix_len: 1,
            })
        }
    }

    fn tagged(tag: u32, len: usize) -> Arc<dyn TrainingDataset> {
        Arc::new(Tagged { tag, len })
    }

    #[test]
    fn weights_are_normalized_and_validated() {
        assert_eq!(normalize_weights(&[3.0, 1.0]).unwrap(), vec![0.75, 0.25]);
        assert!(normalize_weights(&[]).is_err());
        assert!(normalize_weights(&[0.0, 0.0]).is_err());
        assert!(normalize_weights(&[1.0, -1.0]).is_err());
    }

    #[test]
    fn interleave_tracks_weights() {
        let (datasets, samples) = build_blending_indices(&[0.5, 0.25, 0.25], 8);
        assert_eq!(datasets, vec![0, 1, 2, 0, 0, 1, 2, 0]);
        assert_eq!(samples, vec![0, 0, 0, 1, 2, 1, 1, 3]);

        let (datasets, _) = build_blending_indices(&[0.7, 0.3], 1_000);
        let first = datasets.iter().filter(|d| **d == 0).count();
        assert!((699..=701).contains(&first));
    }

    #[test]
    fn blended_samples_come_from_members_and_wrap() {
        let blend = BlendedDataset::new(vec![tagged(7, 2), tagged(9, 2)], &[3.0, 1.0]).unwrap();
        assert_eq!(blend.len(), 4);
        assert_eq!(blend.dataset_index(), &[0, 1, 0, 0]);
        // The heavier member is drawn three times but holds two samples.
        assert_eq!(blend.source_of(3), Some((0, 0)));
        assert_eq!(blend.get(3).unwrap().text, vec![7, 0]);
        assert_eq!(blend.get(1).unwrap().text, vec![9, 0]);
        assert!(matches!(
            blend.get(4),
            Err(SpanPackError::OutOfRange { index: 4, len: 4 })
        ));
    }

    #[test]
    fn rejects_mismatched_or_empty_members() {
        assert!(BlendedDataset::new(vec![tagged(1, 2)], &[1.0, 1.0]).is_err());
        assert!(BlendedDataset::new(vec![tagged(1, 2), tagged(2, 0)], &[1.0, 1.0]).is_err());
    }
}
