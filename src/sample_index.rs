//! Packed sample index: build, persistence, and coordinated build-once loading.
//!
//! Documents are walked in corpus order and cut into windows of exactly
//! `window_len` tokens. A window may cross document boundaries; tokens left in
//! the open window after the last document are dropped. The result is cached
//! per split in `{prefix}_{split}_indexmap.bin` and rebuilt only when absent.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::constants::sample_index::{
    BINCODE_PREFIX, INDEXMAP_SUFFIX, SAMPLE_INDEX_VERSION, TEMP_ARTIFACT_PREFIX,
};
use crate::coordination::{Coordinator, synchronize};
use crate::data::{PackedSample, Span};
use crate::errors::SpanPackError;
use crate::source::DocumentStore;
use crate::types::DocId;

/// Ordered packed samples for one corpus split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleIndex {
    window_len: u64,
    docs: Range<DocId>,
    samples: Vec<PackedSample>,
}

impl SampleIndex {
    /// Wrap samples built for `docs` with windows of `window_len` tokens.
    pub fn new(window_len: u64, docs: Range<DocId>, samples: Vec<PackedSample>) -> Self {
        Self {
            window_len,
            docs,
            samples,
        }
    }

    /// Tokens per packed window.
    pub fn window_len(&self) -> u64 {
        self.window_len
    }

    /// Document range the index was built over.
    pub fn docs(&self) -> Range<DocId> {
        self.docs.clone()
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no full window could be packed.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample at `idx`.
    pub fn get(&self, idx: usize) -> Option<&PackedSample> {
        self.samples.get(idx)
    }

    /// All samples in order.
    pub fn samples(&self) -> &[PackedSample] {
        &self.samples
    }
}

/// Counters reported by one packing pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackStats {
    /// Documents visited.
    pub documents: u64,
    /// Tokens visited.
    pub tokens: u64,
    /// Samples emitted.
    pub samples: usize,
    /// Tokens left in the open window after the last document.
    pub dropped_tokens: u64,
}

/// Open window being filled across documents.
#[derive(Default)]
struct Accumulator {
    spans: Vec<Span>,
    len: u64,
}

impl Accumulator {
    fn push(&mut self, span: Span) {
        self.len += span.len();
        self.spans.push(span);
    }

    fn take(&mut self) -> PackedSample {
        self.len = 0;
        PackedSample {
            spans: std::mem::take(&mut self.spans),
        }
    }
}

/// Cut documents `docs` of `store` into windows of exactly `window_len` tokens.
pub fn build_samples_mapping(
    store: &dyn DocumentStore,
    docs: Range<DocId>,
    window_len: u64,
) -> Result<(Vec<PackedSample>, PackStats), SpanPackError> {
    if window_len == 0 {
        return Err(SpanPackError::Configuration(
            "packed window length must be positive".into(),
        ));
    }
    if docs.end > store.doc_count() {
        return Err(SpanPackError::OutOfRange {
            index: docs.end as usize,
            len: store.doc_count() as usize,
        });
    }

    let mut samples = Vec::new();
    let mut stats = PackStats::default();
    let mut open = Accumulator::default();

    for doc_id in docs {
        let doc_len = u64::from(store.doc_length(doc_id)?);
        stats.documents += 1;
        stats.tokens += doc_len;

        let mut offset = 0;
        if open.len + doc_len > window_len {
            offset = window_len - open.len;
            open.push(Span::new(doc_id, 0, offset));
            samples.push(open.take());
        }

        while doc_len - offset >= window_len {
            samples.push(PackedSample {
                spans: vec![Span::new(doc_id, offset, offset + window_len)],
            });
            offset += window_len;
        }

        if offset < doc_len {
            open.push(Span::new(doc_id, offset, doc_len));
            if open.len == window_len {
                samples.push(open.take());
            }
        }
    }

    stats.samples = samples.len();
    stats.dropped_tokens = open.len;
    Ok((samples, stats))
}

/// Cache artifact path for `split` of the corpus at `prefix`.
pub fn indexmap_path(prefix: &Path, split: &str) -> PathBuf {
    let mut raw = prefix.as_os_str().to_os_string();
    raw.push(format!("_{split}{INDEXMAP_SUFFIX}"));
    PathBuf::from(raw)
}

#[derive(Serialize, Deserialize)]
struct PersistedSampleIndex {
    window_len: u64,
    doc_start: DocId,
    doc_end: DocId,
    samples: Vec<PackedSample>,
}

fn encode_sample_index(index: &SampleIndex) -> Result<Vec<u8>, SpanPackError> {
    let persisted = PersistedSampleIndex {
        window_len: index.window_len,
        doc_start: index.docs.start,
        doc_end: index.docs.end,
        samples: index.samples.clone(),
    };
    let payload = bincode::serialize(&persisted)
        .map_err(|err| SpanPackError::IndexStore(format!("failed to encode sample index: {err}")))?;
    let mut buf = Vec::with_capacity(2 + payload.len());
    buf.push(SAMPLE_INDEX_VERSION);
    buf.push(BINCODE_PREFIX);
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn decode_sample_index(bytes: &[u8]) -> Result<SampleIndex, SpanPackError> {
    match bytes.first() {
        None => return Err(SpanPackError::IndexStore("sample index artifact is empty".into())),
        Some(version) if *version != SAMPLE_INDEX_VERSION => {
            return Err(SpanPackError::IndexStore(format!(
                "sample index version mismatch (expected {SAMPLE_INDEX_VERSION}, found {version})"
            )));
        }
        Some(_) => {}
    }
    if bytes.get(1).copied() != Some(BINCODE_PREFIX) {
        return Err(SpanPackError::IndexStore(
            "bincode payload missing expected prefix".into(),
        ));
    }
    let persisted: PersistedSampleIndex = bincode::deserialize(&bytes[2..])
        .map_err(|err| SpanPackError::IndexStore(format!("corrupt sample index: {err}")))?;
    Ok(SampleIndex {
        window_len: persisted.window_len,
        docs: persisted.doc_start..persisted.doc_end,
        samples: persisted.samples,
    })
}

/// Persist `index` to `path`, replacing it atomically.
pub fn write_sample_index(path: &Path, index: &SampleIndex) -> Result<(), SpanPackError> {
    let payload = encode_sample_index(index)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut staged = tempfile::Builder::new()
        .prefix(TEMP_ARTIFACT_PREFIX)
        .tempfile_in(&dir)?;
    staged.write_all(&payload)?;
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .map_err(|err| SpanPackError::Io(err.error))?;
    Ok(())
}

/// Load the index at `path` and check it was built for `docs` and `window_len`.
pub fn read_sample_index(
    path: &Path,
    docs: Range<DocId>,
    window_len: u64,
) -> Result<SampleIndex, SpanPackError> {
    let bytes = fs::read(path)?;
    let index = decode_sample_index(&bytes)?;
    if index.window_len != window_len {
        return Err(SpanPackError::IndexStore(format!(
            "sample index {} was built for windows of {} tokens, expected {window_len}",
            path.display(),
            index.window_len
        )));
    }
    if index.docs != docs {
        return Err(SpanPackError::IndexStore(format!(
            "sample index {} covers documents {:?}, expected {docs:?}",
            path.display(),
            index.docs
        )));
    }
    Ok(index)
}

/// Build the index at `path` once across all participants, then load it everywhere.
///
/// Only the leader builds, and only when the artifact is absent. Every
/// participant then waits on the barrier before reading, so nobody reads a
/// partially written artifact. A leader that fails to build returns before the
/// barrier.
pub fn build_or_load(
    store: &dyn DocumentStore,
    docs: Range<DocId>,
    path: &Path,
    window_len: u64,
    coordinator: &dyn Coordinator,
) -> Result<SampleIndex, SpanPackError> {
    if coordinator.is_leader() && !path.is_file() {
        info!(
            path = %path.display(),
            "could not find sample index; building it on the leader"
        );
        let started = Instant::now();
        let (samples, stats) = build_samples_mapping(store, docs.clone(), window_len)?;
        debug!(
            documents = stats.documents,
            tokens = stats.tokens,
            samples = stats.samples,
            "packed documents into windows of {window_len} tokens"
        );
        if stats.dropped_tokens > 0 {
            warn!(
                dropped_tokens = stats.dropped_tokens,
                "dropped tokens of the final partial window"
            );
        }
        write_sample_index(path, &SampleIndex::new(window_len, docs.clone(), samples))?;
        info!(
            path = %path.display(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "saved sample index"
        );
    }

    synchronize(coordinator)?;

    let started = Instant::now();
    let index = read_sample_index(path, docs, window_len)?;
    info!(
        path = %path.display(),
        samples = index.len(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "loaded sample index"
    );
    Ok(index)
}
