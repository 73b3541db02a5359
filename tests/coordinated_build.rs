use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use spanpack::sample_index::{indexmap_path, read_sample_index};
use spanpack::source::DocumentStore;
use spanpack::{
    Coordinator, DocId, InMemoryDocuments, SampleIndex, SingleProcess, SpanCorruptionConfig,
    SpanCorruptionDataset, SpanPackError, SpecialTokens, SplitLabel, ThreadGroup, TokenId,
    Vocabulary, build_or_load,
};
use tempfile::tempdir;

/// Store that counts length lookups, which only the packer performs.
struct CountingStore {
    inner: InMemoryDocuments,
    length_lookups: AtomicUsize,
}

impl CountingStore {
    fn new(lengths: &[usize]) -> Self {
        Self {
            inner: InMemoryDocuments::with_lengths(lengths, 0),
            length_lookups: AtomicUsize::new(0),
        }
    }

    fn lookups(&self) -> usize {
        self.length_lookups.load(Ordering::SeqCst)
    }
}

impl DocumentStore for CountingStore {
    fn doc_count(&self) -> u64 {
        self.inner.doc_count()
    }

    fn doc_length(&self, doc_id: DocId) -> Result<u32, SpanPackError> {
        self.length_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.doc_length(doc_id)
    }

    fn slice(&self, doc_id: DocId, start: u64, end: u64) -> Result<Vec<TokenId>, SpanPackError> {
        self.inner.slice(doc_id, start, end)
    }
}

fn doc_lengths() -> Vec<usize> {
    (0..64).map(|i| 1 + (i * 37) % 90).collect()
}

fn build_on_threads(
    store: &Arc<CountingStore>,
    docs: Range<DocId>,
    path: &Path,
    window_len: u64,
    participants: usize,
) -> Vec<SampleIndex> {
    let members = ThreadGroup::new(participants).unwrap();
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let store = Arc::clone(store);
            let docs = docs.clone();
            let path = path.to_path_buf();
            thread::spawn(move || {
                build_or_load(&*store, docs, &path, window_len, &member).unwrap()
            })
        })
        .collect();
    handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect()
}

#[test]
fn one_participant_builds_and_everyone_loads_the_same_index() {
    let dir = tempdir().unwrap();
    let path = indexmap_path(&dir.path().join("corpus"), "train");
    let store = Arc::new(CountingStore::new(&doc_lengths()));
    let docs = 0..store.doc_count();

    let loaded = build_on_threads(&store, docs.clone(), &path, 48, 6);

    assert_eq!(store.lookups(), docs.end as usize);
    assert_eq!(loaded.len(), 6);
    assert!(!loaded[0].is_empty());
    assert!(loaded.iter().all(|index| index == &loaded[0]));
    assert_eq!(read_sample_index(&path, docs, 48).unwrap(), loaded[0]);

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .filter(|name| name.to_string_lossy().starts_with(".indexmap-"))
        .collect();
    assert!(leftovers.is_empty(), "temporary artifacts left behind: {leftovers:?}");
}

#[test]
fn existing_artifact_is_never_rebuilt() {
    let dir = tempdir().unwrap();
    let path = indexmap_path(&dir.path().join("corpus"), "valid");
    let store = Arc::new(CountingStore::new(&doc_lengths()));
    let docs = 10..40;

    let first = build_or_load(&*store, docs.clone(), &path, 32, &SingleProcess).unwrap();
    let after_first = store.lookups();
    assert_eq!(after_first, 30);

    let second = build_on_threads(&store, docs, &path, 32, 3);
    assert_eq!(store.lookups(), after_first);
    assert!(second.iter().all(|index| index == &first));
}

#[test]
fn mismatched_window_is_rejected_on_load() {
    let dir = tempdir().unwrap();
    let path = indexmap_path(&dir.path().join("corpus"), "train");
    let store = CountingStore::new(&doc_lengths());
    build_or_load(&store, 0..64, &path, 32, &SingleProcess).unwrap();

    let err = build_or_load(&store, 0..64, &path, 16, &SingleProcess).unwrap_err();
    assert!(matches!(err, SpanPackError::IndexStore(_)));
}

#[test]
fn datasets_built_on_every_thread_agree() {
    let dir = tempdir().unwrap();
    let prefix = dir.path().join("corpus");
    let store = Arc::new(CountingStore::new(&doc_lengths()));
    let vocab: Arc<dyn Vocabulary> = Arc::new(SpecialTokens::with_extra_ids(4_096, 1, 16));
    let config = SpanCorruptionConfig {
        seq_length: 32,
        ..Default::default()
    };

    let members = ThreadGroup::new(4).unwrap();
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let store: Arc<dyn DocumentStore> = store.clone();
            let vocab = Arc::clone(&vocab);
            let config = config.clone();
            let prefix = prefix.clone();
            thread::spawn(move || {
                let dataset = SpanCorruptionDataset::build(
                    format!("rank{}", member.rank()),
                    store,
                    &prefix,
                    SplitLabel::Train,
                    0..64,
                    config,
                    vocab,
                    &member,
                )
                .unwrap();
                (member.is_leader(), dataset.index().clone())
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(results.iter().filter(|(leader, _)| *leader).count(), 1);
    assert_eq!(store.lookups(), 64);
    assert!(results.iter().all(|(_, index)| index == &results[0].1));
    assert!(indexmap_path(&prefix, "train").is_file());
}
