//! Span-corruption datasets over packed sample indexes.
//!
//! A [`SpanCorruptionDataset`] maps sample `i` to a freshly masked
//! [`TrainingSample`]: the packed spans of sample `i` are sliced from the
//! document store, a new noise mask is drawn, and the input and target streams
//! are assembled. Masks are re-randomized on every access.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::assembler::build_training_sample;
use crate::blend::BlendedDataset;
use crate::config::{CorpusConfig, SpanCorruptionConfig};
use crate::constants::splits::ALL_SPLITS;
use crate::coordination::Coordinator;
use crate::data::TrainingSample;
use crate::errors::SpanPackError;
use crate::masking::{noise_budget, random_spans_noise_mask};
use crate::planner::{LengthPlan, plan};
use crate::sample_index::{SampleIndex, build_or_load, indexmap_path};
use crate::source::DocumentStore;
use crate::splits::SplitLabel;
use crate::types::DocId;
use crate::vocab::{Vocabulary, validate_sentinels};

/// Indexed collection of training samples.
pub trait TrainingDataset: Send + Sync {
    /// Number of samples.
    fn len(&self) -> usize;

    /// True when the dataset holds no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample at `idx`.
    fn get(&self, idx: usize) -> Result<TrainingSample, SpanPackError>;
}

/// Validate `config` against `vocab` and plan the packed window length.
///
/// Fails when the configuration is out of range, when the planned window
/// cannot hold its noise spans, or when the vocabulary lacks a sentinel for
/// every span a window can produce.
pub fn plan_for(
    config: &SpanCorruptionConfig,
    vocab: &dyn Vocabulary,
) -> Result<LengthPlan, SpanPackError> {
    config.validate()?;
    let length_plan = plan(
        config.seq_length,
        config.noise_density,
        config.mean_noise_span_length,
    )?;
    let (noise_tokens, noise_spans) = noise_budget(
        length_plan.raw_len,
        config.noise_density,
        config.mean_noise_span_length,
    );
    if length_plan.raw_len < 2 || length_plan.raw_len - noise_tokens < noise_spans {
        return Err(SpanPackError::Configuration(format!(
            "window of {} raw tokens cannot hold {noise_spans} noise spans separated by \
             non-noise tokens",
            length_plan.raw_len
        )));
    }
    validate_sentinels(vocab, noise_spans)?;
    Ok(length_plan)
}

/// Span-corruption view over one packed split of a corpus.
pub struct SpanCorruptionDataset {
    name: String,
    store: Arc<dyn DocumentStore>,
    index: SampleIndex,
    config: SpanCorruptionConfig,
    plan: LengthPlan,
    vocab: Arc<dyn Vocabulary>,
    rng: Mutex<StdRng>,
}

impl SpanCorruptionDataset {
    /// Wrap an already built `index` whose windows match the planned raw length.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        index: SampleIndex,
        config: SpanCorruptionConfig,
        vocab: Arc<dyn Vocabulary>,
    ) -> Result<Self, SpanPackError> {
        let plan = plan_for(&config, vocab.as_ref())?;
        if index.window_len() != plan.raw_len as u64 {
            return Err(SpanPackError::Configuration(format!(
                "sample index packs windows of {} tokens but the plan needs {}",
                index.window_len(),
                plan.raw_len
            )));
        }
        let rng = Mutex::new(StdRng::seed_from_u64(config.seed));
        Ok(Self {
            name: name.into(),
            store,
            index,
            config,
            plan,
            vocab,
            rng,
        })
    }

    /// Plan, build or load the split's sample index, and wrap it.
    ///
    /// The index is cached at `{prefix}_{split}_indexmap.bin`; the coordinator
    /// decides which participant builds it.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        name: impl Into<String>,
        store: Arc<dyn DocumentStore>,
        prefix: &Path,
        split: SplitLabel,
        docs: Range<DocId>,
        config: SpanCorruptionConfig,
        vocab: Arc<dyn Vocabulary>,
        coordinator: &dyn Coordinator,
    ) -> Result<Self, SpanPackError> {
        let name = name.into();
        let length_plan = plan_for(&config, vocab.as_ref())?;
        debug!(
            dataset = %name,
            raw_len = length_plan.raw_len,
            input_len = length_plan.input_len,
            target_len = length_plan.target_len,
            "planned span corruption lengths"
        );
        let path = indexmap_path(prefix, split.as_str());
        let index = build_or_load(
            store.as_ref(),
            docs,
            &path,
            length_plan.raw_len as u64,
            coordinator,
        )?;
        Self::new(name, store, index, config, vocab)
    }

    /// Dataset name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw and encoded lengths used by every sample.
    pub fn plan(&self) -> LengthPlan {
        self.plan
    }

    /// Packed sample index backing this dataset.
    pub fn index(&self) -> &SampleIndex {
        &self.index
    }

    /// Corruption settings.
    pub fn config(&self) -> &SpanCorruptionConfig {
        &self.config
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True when no full window could be packed.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sample `idx`, masked with the dataset-owned generator.
    pub fn at(&self, idx: usize) -> Result<TrainingSample, SpanPackError> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        self.at_with_rng(idx, &mut *rng)
    }

    /// Sample `idx`, masked with `rng`.
    pub fn at_with_rng<R: Rng + ?Sized>(
        &self,
        idx: usize,
        rng: &mut R,
    ) -> Result<TrainingSample, SpanPackError> {
        let packed = self.index.get(idx).ok_or(SpanPackError::OutOfRange {
            index: idx,
            len: self.index.len(),
        })?;
        let mut tokens = Vec::with_capacity(self.plan.raw_len);
        for span in &packed.spans {
            self.store.extend_with_span(span, &mut tokens)?;
        }
        let mask = random_spans_noise_mask(
            tokens.len(),
            self.config.noise_density,
            self.config.mean_noise_span_length,
            rng,
        )?;
        Ok(build_training_sample(
            &tokens,
            &mask,
            self.vocab.vocab_size(),
            self.vocab.eos_token_id(),
        ))
    }
}

impl TrainingDataset for SpanCorruptionDataset {
    fn len(&self) -> usize {
        self.index.len()
    }

    fn get(&self, idx: usize) -> Result<TrainingSample, SpanPackError> {
        self.at(idx)
    }
}

/// Per-split datasets; a split with no documents is `None`.
#[derive(Default)]
pub struct SplitDatasets {
    /// Training split.
    pub train: Option<SpanCorruptionDataset>,
    /// Validation split.
    pub valid: Option<SpanCorruptionDataset>,
    /// Test split.
    pub test: Option<SpanCorruptionDataset>,
}

impl SplitDatasets {
    /// Dataset for `split`, if it was built.
    pub fn get(&self, split: SplitLabel) -> Option<&SpanCorruptionDataset> {
        match split {
            SplitLabel::Train => self.train.as_ref(),
            SplitLabel::Validation => self.valid.as_ref(),
            SplitLabel::Test => self.test.as_ref(),
        }
    }
}

/// Divide the corpus at `prefix` into train/valid/test documents and build a
/// dataset for every split that received documents.
///
/// Split shares come from `config.splits` and every split is corrupted with
/// `config.corruption`.
pub fn build_train_valid_test_datasets(
    store: Arc<dyn DocumentStore>,
    prefix: &Path,
    config: &CorpusConfig,
    vocab: Arc<dyn Vocabulary>,
    coordinator: &dyn Coordinator,
) -> Result<SplitDatasets, SpanPackError> {
    let total_docs = store.doc_count();
    let ranges = config.splits.document_ranges(total_docs)?;
    info!(
        prefix = %prefix.display(),
        documents = total_docs,
        "building span corruption datasets"
    );

    let mut datasets = SplitDatasets::default();
    for (split, docs) in ranges {
        info!(
            split = %split,
            start = docs.start,
            end = docs.end,
            "split document range"
        );
        if docs.is_empty() {
            continue;
        }
        let dataset = SpanCorruptionDataset::build(
            split.as_str(),
            Arc::clone(&store),
            prefix,
            split,
            docs,
            config.corruption.clone(),
            Arc::clone(&vocab),
            coordinator,
        )?;
        match split {
            SplitLabel::Train => datasets.train = Some(dataset),
            SplitLabel::Validation => datasets.valid = Some(dataset),
            SplitLabel::Test => datasets.test = Some(dataset),
        }
    }
    Ok(datasets)
}

/// One corpus taking part in a blend.
#[derive(Clone)]
pub struct WeightedCorpus {
    /// Relative share of the corpus in every split it contributes to.
    pub weight: f64,
    /// Prefix the corpus's sample indexes are stored under.
    pub prefix: PathBuf,
    /// Token storage of the corpus.
    pub store: Arc<dyn DocumentStore>,
}

/// Per-split blends; a split no corpus contributed samples to is `None`.
#[derive(Default)]
pub struct BlendedSplits {
    /// Training split.
    pub train: Option<BlendedDataset>,
    /// Validation split.
    pub valid: Option<BlendedDataset>,
    /// Test split.
    pub test: Option<BlendedDataset>,
}

impl BlendedSplits {
    /// Blend for `split`, if one was built.
    pub fn get(&self, split: SplitLabel) -> Option<&BlendedDataset> {
        match split {
            SplitLabel::Train => self.train.as_ref(),
            SplitLabel::Validation => self.valid.as_ref(),
            SplitLabel::Test => self.test.as_ref(),
        }
    }
}

/// Build train/valid/test datasets for every corpus in `corpora` and blend
/// each split across the corpora that contributed samples to it.
///
/// Each corpus is split with the same `config.splits` shares. A corpus whose
/// split is missing or holds no samples is left out of that split's blend and
/// the remaining weights are renormalized.
pub fn build_blended_train_valid_test_datasets(
    corpora: &[WeightedCorpus],
    config: &CorpusConfig,
    vocab: Arc<dyn Vocabulary>,
    coordinator: &dyn Coordinator,
) -> Result<BlendedSplits, SpanPackError> {
    if corpora.is_empty() {
        return Err(SpanPackError::Configuration(
            "blending needs at least one corpus".into(),
        ));
    }

    let mut members: [(Vec<Arc<dyn TrainingDataset>>, Vec<f64>); 3] = Default::default();
    for corpus in corpora {
        let splits = build_train_valid_test_datasets(
            Arc::clone(&corpus.store),
            &corpus.prefix,
            config,
            Arc::clone(&vocab),
            coordinator,
        )?;
        for ((datasets, weights), dataset) in members
            .iter_mut()
            .zip([splits.train, splits.valid, splits.test])
        {
            let Some(dataset) = dataset else { continue };
            if dataset.is_empty() {
                warn!(
                    prefix = %corpus.prefix.display(),
                    split = dataset.name(),
                    "split holds no samples; leaving it out of the blend"
                );
                continue;
            }
            datasets.push(Arc::new(dataset));
            weights.push(corpus.weight);
        }
    }

    let mut blended = BlendedSplits::default();
    for (split, (datasets, weights)) in ALL_SPLITS.into_iter().zip(members) {
        if datasets.is_empty() {
            continue;
        }
        info!(split = %split, members = datasets.len(), "blending split");
        let blend = BlendedDataset::new(datasets, &weights)?;
        match split {
            SplitLabel::Train => blended.train = Some(blend),
            SplitLabel::Validation => blended.valid = Some(blend),
            SplitLabel::Test => blended.test = Some(blend),
        }
    }
    Ok(blended)
}
