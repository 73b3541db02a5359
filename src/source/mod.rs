//! Document store interfaces.
//!
//! Ownership model:
//! - `DocumentStore` is the packer- and dataset-facing view of a tokenized corpus.
//! - `InMemoryDocuments` keeps documents in memory (tests, small corpora).
//! - `indexed::IndexedDataset` reads the `MMIDIDX` `.idx`/`.bin` corpus layout.

use std::sync::Arc;

use crate::data::Span;
use crate::errors::SpanPackError;
use crate::types::{DocId, TokenId};

/// Memory-mapped `.idx`/`.bin` corpus reader and writer.
pub mod indexed;

pub use indexed::{IndexedDataset, IndexedDatasetWriter, TokenDtype};

/// Ordered, immutable corpus of tokenized documents.
///
/// Document ids are dense (`0..doc_count()`), and a document's length must be
/// available without reading its tokens.
pub trait DocumentStore: Send + Sync {
    /// Number of documents in the corpus.
    fn doc_count(&self) -> u64;
    /// Token length of `doc_id`.
    fn doc_length(&self, doc_id: DocId) -> Result<u32, SpanPackError>;
    /// Tokens `[start, end)` of `doc_id`.
    fn slice(&self, doc_id: DocId, start: u64, end: u64) -> Result<Vec<TokenId>, SpanPackError>;

    /// Append the tokens covered by `span` to `out`.
    fn extend_with_span(&self, span: &Span, out: &mut Vec<TokenId>) -> Result<(), SpanPackError> {
        out.extend(self.slice(span.doc_id, span.start, span.end)?);
        Ok(())
    }
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn doc_count(&self) -> u64 {
        (**self).doc_count()
    }

    fn doc_length(&self, doc_id: DocId) -> Result<u32, SpanPackError> {
        (**self).doc_length(doc_id)
    }

    fn slice(&self, doc_id: DocId, start: u64, end: u64) -> Result<Vec<TokenId>, SpanPackError> {
        (**self).slice(doc_id, start, end)
    }
}

/// Document store backed by in-memory token vectors.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDocuments {
    documents: Arc<Vec<Vec<TokenId>>>,
}

impl InMemoryDocuments {
    /// Create a store from prebuilt documents.
    pub fn new(documents: Vec<Vec<TokenId>>) -> Self {
        Self {
            documents: Arc::new(documents),
        }
    }

    /// Create a store of documents with the given lengths.
    ///
    /// Token values are consecutive ids starting at `first_token`, so every
    /// position in the corpus holds a distinct token.
    pub fn with_lengths(lengths: &[usize], first_token: TokenId) -> Self {
        let mut next = first_token;
        let documents = lengths
            .iter()
            .map(|len| {
                let doc: Vec<TokenId> = (next..next + *len as TokenId).collect();
                next += *len as TokenId;
                doc
            })
            .collect();
        Self::new(documents)
    }

    fn document(&self, doc_id: DocId) -> Result<&[TokenId], SpanPackError> {
        self.documents
            .get(doc_id as usize)
            .map(Vec::as_slice)
            .ok_or(SpanPackError::OutOfRange {
                index: doc_id as usize,
                len: self.documents.len(),
            })
    }
}

impl DocumentStore for InMemoryDocuments {
    fn doc_count(&self) -> u64 {
        self.documents.len() as u64
    }

    fn doc_length(&self, doc_id: DocId) -> Result<u32, SpanPackError> {
        let len = self.document(doc_id)?.len();
        u32::try_from(len).map_err(|_| {
            SpanPackError::Format(format!("document {doc_id} length {len} exceeds u32"))
        })
    }

    fn slice(&self, doc_id: DocId, start: u64, end: u64) -> Result<Vec<TokenId>, SpanPackError> {
        let doc = self.document(doc_id)?;
        if start > end || end as usize > doc.len() {
            return Err(SpanPackError::OutOfRange {
                index: end as usize,
                len: doc.len(),
            });
        }
        Ok(doc[start as usize..end as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_documents_slice_by_range() {
        let store = InMemoryDocuments::with_lengths(&[3, 2], 10);
        assert_eq!(store.doc_count(), 2);
        assert_eq!(store.doc_length(1).unwrap(), 2);
        assert_eq!(store.slice(0, 1, 3).unwrap(), vec![11, 12]);
        assert_eq!(store.slice(1, 0, 2).unwrap(), vec![13, 14]);

        let mut out = Vec::new();
        store.extend_with_span(&Span::new(0, 0, 1), &mut out).unwrap();
        store.extend_with_span(&Span::new(1, 1, 2), &mut out).unwrap();
        assert_eq!(out, vec![10, 14]);
    }

    #[test]
    fn in_memory_documents_reject_out_of_range_access() {
        let store = InMemoryDocuments::new(vec![vec![1, 2, 3]]);
        assert!(matches!(
            store.doc_length(1),
            Err(SpanPackError::OutOfRange { index: 1, len: 1 })
        ));
        assert!(store.slice(0, 2, 4).is_err());
        assert!(store.slice(0, 2, 1).is_err());
    }

    #[test]
    fn arc_wrapped_store_delegates() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocuments::with_lengths(&[4], 0));
        assert_eq!(store.doc_count(), 1);
        assert_eq!(store.slice(0, 2, 4).unwrap(), vec![2, 3]);
    }
}
