use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::constants::splits::{ALL_SPLITS, WEIGHT_SEPARATORS};
use crate::errors::SpanPackError;
use crate::types::DocId;

/// Logical dataset partitions over a document corpus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
    /// Test split.
    Test,
}

impl SplitLabel {
    /// Name used in cache artifact filenames.
    pub fn as_str(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "valid",
            SplitLabel::Test => "test",
        }
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relative weights for train/validation/test document assignment.
///
/// Weights need not sum to one; they are normalized when ranges are derived.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Weight assigned to train.
    pub train: f64,
    /// Weight assigned to validation.
    pub validation: f64,
    /// Weight assigned to test.
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 949.0,
            validation: 50.0,
            test: 1.0,
        }
    }
}

impl SplitRatios {
    /// Parse a weight string such as `"949,50,1"` or `"98/2/0"`.
    ///
    /// Missing trailing weights are treated as zero.
    pub fn parse(raw: &str) -> Result<Self, SpanPackError> {
        let mut weights = Vec::with_capacity(3);
        for part in raw.split(WEIGHT_SEPARATORS.as_slice()) {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let value: f64 = part.parse().map_err(|_| {
                SpanPackError::Configuration(format!("invalid split weight '{part}' in '{raw}'"))
            })?;
            weights.push(value);
        }
        if weights.len() > 3 {
            return Err(SpanPackError::Configuration(format!(
                "expected at most 3 split weights, found {} in '{raw}'",
                weights.len()
            )));
        }
        weights.resize(3, 0.0);
        Self {
            train: weights[0],
            validation: weights[1],
            test: weights[2],
        }
        .normalized()
    }

    /// Validate weights and scale them to sum to `1.0`.
    pub fn normalized(self) -> Result<Self, SpanPackError> {
        let weights = [self.train, self.validation, self.test];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(SpanPackError::Configuration(
                "split weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(SpanPackError::Configuration(
                "split weights must not all be zero".to_string(),
            ));
        }
        Ok(Self {
            train: self.train / sum,
            validation: self.validation / sum,
            test: self.test / sum,
        })
    }

    fn weight(&self, label: SplitLabel) -> f64 {
        match label {
            SplitLabel::Train => self.train,
            SplitLabel::Validation => self.validation,
            SplitLabel::Test => self.test,
        }
    }

    /// Contiguous document ranges for each split over `total_docs` documents.
    ///
    /// Ranges are ordered train, validation, test and together cover
    /// `0..total_docs` exactly; any rounding drift is absorbed so the final
    /// boundary lands on `total_docs`.
    pub fn document_ranges(
        &self,
        total_docs: u64,
    ) -> Result<[(SplitLabel, Range<DocId>); 3], SpanPackError> {
        let ratios = self.normalized()?;
        let mut bounds = [0i64; 4];
        for (idx, label) in ALL_SPLITS.iter().enumerate() {
            let share = (ratios.weight(*label) * total_docs as f64).round_ties_even() as i64;
            bounds[idx + 1] = bounds[idx] + share;
        }
        let drift = bounds[3] - total_docs as i64;
        for bound in bounds.iter_mut().skip(1) {
            *bound -= drift;
        }
        let clamp = |value: i64| value.clamp(0, total_docs as i64) as DocId;
        let range = |idx: usize| clamp(bounds[idx])..clamp(bounds[idx + 1]).max(clamp(bounds[idx]));
        Ok([
            (SplitLabel::Train, range(0)),
            (SplitLabel::Validation, range(1)),
            (SplitLabel::Test, range(2)),
        ])
    }
}
