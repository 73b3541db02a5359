use crate::constants::masking::FUSED_SPAN_MARKER;
use crate::masking::NoiseMask;
use crate::types::SentinelValue;

/// Per-position sentinel markers derived from a noise mask.
///
/// `0` keeps the original token, a positive value is the sentinel token id that
/// replaces a span's first token, and a negative value marks a masked token
/// that is fused into the preceding sentinel and deleted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentinelMap {
    values: Vec<SentinelValue>,
}

impl SentinelMap {
    /// Marker values in position order.
    pub fn as_slice(&self) -> &[SentinelValue] {
        &self.values
    }

    /// Number of positions covered.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no positions are covered.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Count of span starts (positions replaced by a sentinel).
    pub fn sentinel_count(&self) -> usize {
        self.values.iter().filter(|value| **value > 0).count()
    }

    /// Count of positions removed by span fusion.
    pub fn deleted_count(&self) -> usize {
        self.values.iter().filter(|value| **value < 0).count()
    }
}

/// Assign sentinel ids to the start of every masked run.
///
/// Runs are ranked left to right from 1; the run with rank `r` starts with
/// sentinel id `vocab_len - r`, so sentinel ids decrease from the top of the
/// vocabulary.
pub fn create_sentinel_ids(mask: &NoiseMask, vocab_len: usize) -> SentinelMap {
    let mut values = Vec::with_capacity(mask.len());
    let mut rank: SentinelValue = 0;
    let mut previous = false;
    for &masked in mask.as_slice() {
        let value = match (masked, previous) {
            (true, false) => {
                rank += 1;
                vocab_len as SentinelValue - rank
            }
            (true, true) => FUSED_SPAN_MARKER,
            (false, _) => 0,
        };
        values.push(value);
        previous = masked;
    }
    SentinelMap { values }
}
