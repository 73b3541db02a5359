use crate::data::TrainingSample;
use crate::masking::NoiseMask;
use crate::sentinel::{SentinelMap, create_sentinel_ids};
use crate::types::TokenId;

/// Apply a sentinel map to `tokens`, fusing masked runs, and append `eos_id`.
pub fn filter_input_ids(
    tokens: &[TokenId],
    sentinels: &SentinelMap,
    eos_id: TokenId,
) -> Vec<TokenId> {
    debug_assert_eq!(tokens.len(), sentinels.len());
    let mut out = Vec::with_capacity(tokens.len().saturating_sub(sentinels.deleted_count()) + 1);
    for (&token, &marker) in tokens.iter().zip(sentinels.as_slice()) {
        match marker {
            0 => out.push(token),
            marker if marker > 0 => out.push(marker as TokenId),
            _ => {}
        }
    }
    out.push(eos_id);
    out
}

/// Corrupt `tokens` with `mask` and lay out the input and target streams.
///
/// Noise spans become sentinels in the input; the target carries the noise
/// tokens with the kept runs replaced by sentinels.
pub fn build_training_sample(
    tokens: &[TokenId],
    mask: &NoiseMask,
    vocab_len: usize,
    eos_id: TokenId,
) -> TrainingSample {
    let input_sentinels = create_sentinel_ids(mask, vocab_len);
    let target_sentinels = create_sentinel_ids(&mask.complement(), vocab_len);

    let input = filter_input_ids(tokens, &input_sentinels, eos_id);
    let target = filter_input_ids(tokens, &target_sentinels, eos_id);

    let prefix_len = input.len();
    let mut text = input;
    text.extend_from_slice(&target);
    TrainingSample { text, prefix_len }
}
