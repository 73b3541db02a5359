use serde::{Deserialize, Serialize};

pub use crate::types::{DocId, TokenId};

/// Half-open token range `[start, end)` inside one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Document the range points into.
    pub doc_id: DocId,
    /// First token offset (inclusive).
    pub start: u64,
    /// Last token offset (exclusive).
    pub end: u64,
}

impl Span {
    /// Build a span; `end` must not precede `start`.
    pub fn new(doc_id: DocId, start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { doc_id, start, end }
    }

    /// Number of tokens the span contributes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// True for a zero-length span.
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

impl From<(DocId, u64, u64)> for Span {
    fn from((doc_id, start, end): (DocId, u64, u64)) -> Self {
        Self::new(doc_id, start, end)
    }
}

/// Ordered spans that together fill one packed window.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedSample {
    /// Spans in corpus order.
    pub spans: Vec<Span>,
}

impl PackedSample {
    /// Total tokens covered by all spans.
    pub fn token_len(&self) -> u64 {
        self.spans.iter().map(Span::len).sum()
    }

    /// Spans as `(doc_id, start, end)` triples.
    pub fn triples(&self) -> Vec<(DocId, u64, u64)> {
        self.spans
            .iter()
            .map(|span| (span.doc_id, span.start, span.end))
            .collect()
    }
}

/// One span-corruption training example.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Input stream followed by target stream.
    pub text: Vec<TokenId>,
    /// Length of the input stream; positions from here on are targets.
    pub prefix_len: usize,
}

impl TrainingSample {
    /// Input (encoder-side) tokens, end token included.
    pub fn input(&self) -> &[TokenId] {
        &self.text[..self.prefix_len]
    }

    /// Target tokens, end token included.
    pub fn target(&self) -> &[TokenId] {
        &self.text[self.prefix_len..]
    }
}
