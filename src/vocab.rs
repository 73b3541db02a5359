use serde::{Deserialize, Serialize};

use crate::errors::SpanPackError;
use crate::types::TokenId;

/// Tokenizer facts needed to corrupt and assemble samples.
pub trait Vocabulary: Send + Sync {
    /// Total vocabulary size, sentinel ids included.
    fn vocab_size(&self) -> usize;
    /// Token appended to the end of the input and target streams.
    fn eos_token_id(&self) -> TokenId;
    /// Reserved sentinel ids, one per possible noise span in a sample.
    fn sentinel_token_ids(&self) -> &[TokenId];
}

/// Control and sentinel ids of a tokenizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    /// Vocabulary size, sentinel ids included.
    pub vocab_size: usize,
    /// Beginning-of-sequence id.
    pub bos_id: Option<TokenId>,
    /// End-of-sequence id.
    pub eos_id: TokenId,
    /// Padding id.
    pub pad_id: Option<TokenId>,
    /// Mask id.
    pub mask_id: Option<TokenId>,
    /// Separator id.
    pub sep_id: Option<TokenId>,
    /// Classification id.
    pub cls_id: Option<TokenId>,
    /// Extra ids reserved as span sentinels.
    pub sentinel_ids: Vec<TokenId>,
}

impl SpecialTokens {
    /// Tokens with `extra_ids` sentinels taking the top ids of the vocabulary.
    ///
    /// Sentinel `k` (0-based) is `vocab_size - 1 - k`, matching the ids the
    /// sentinel encoder assigns to successive spans.
    pub fn with_extra_ids(vocab_size: usize, eos_id: TokenId, extra_ids: usize) -> Self {
        let sentinel_ids = (0..extra_ids.min(vocab_size))
            .map(|k| (vocab_size - 1 - k) as TokenId)
            .collect();
        Self {
            vocab_size,
            bos_id: None,
            eos_id,
            pad_id: None,
            mask_id: None,
            sep_id: None,
            cls_id: None,
            sentinel_ids,
        }
    }
}

impl Vocabulary for SpecialTokens {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn eos_token_id(&self) -> TokenId {
        self.eos_id
    }

    fn sentinel_token_ids(&self) -> &[TokenId] {
        &self.sentinel_ids
    }
}

/// Check that `vocab` can supply a sentinel for each of `max_spans` spans.
pub fn validate_sentinels(vocab: &dyn Vocabulary, max_spans: usize) -> Result<(), SpanPackError> {
    let available = vocab.sentinel_token_ids().len();
    if available == 0 {
        return Err(SpanPackError::Configuration(
            "tokenizer provides no sentinel ids; reserve extra ids for span corruption".into(),
        ));
    }
    if available < max_spans {
        return Err(SpanPackError::Configuration(format!(
            "samples can hold {max_spans} noise spans but only {available} sentinel ids exist"
        )));
    }
    if vocab.vocab_size() <= max_spans {
        return Err(SpanPackError::Configuration(format!(
            "vocabulary of {} ids cannot hold {max_spans} sentinels",
            vocab.vocab_size()
        )));
    }
    let vocab_size = vocab.vocab_size();
    if let Some((rank, id)) = vocab.sentinel_token_ids()[..max_spans]
        .iter()
        .enumerate()
        .find(|(rank, id)| **id as usize != vocab_size - 1 - rank)
    {
        return Err(SpanPackError::Configuration(format!(
            "sentinel {rank} is token {id}, expected {}; sentinels must take the top ids \
             in descending order",
            vocab_size - 1 - rank
        )));
    }
    if (vocab.eos_token_id() as usize) >= vocab_size {
        return Err(SpanPackError::Configuration(format!(
            "end token {} is outside the vocabulary of {} ids",
            vocab.eos_token_id(),
            vocab.vocab_size()
        )));
    }
    Ok(())
}
