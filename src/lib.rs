#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Sequence assembly from sentinel maps.
pub mod assembler;
/// Weighted blending of several datasets.
pub mod blend;
/// Span-corruption and corpus configuration types.
pub mod config;
/// Centralized constants used across masking, persistence, splits, and sources.
pub mod constants;
/// Single-builder election and barrier primitives.
pub mod coordination;
/// Span, packed sample, and training sample types.
pub mod data;
/// Span-corruption datasets and split construction.
pub mod dataset;
/// Random noise-span masks.
pub mod masking;
/// Raw-length planning for a desired encoded input length.
pub mod planner;
/// Packed sample index build, persistence, and coordinated loading.
pub mod sample_index;
/// Sentinel id maps for noise masks.
pub mod sentinel;
/// Document store trait and built-in stores.
pub mod source;
/// Train/validation/test document partitioning.
pub mod splits;
/// Shared type aliases.
pub mod types;
/// Tokenizer vocabulary facts.
pub mod vocab;

mod errors;

pub use assembler::{build_training_sample, filter_input_ids};
pub use blend::BlendedDataset;
pub use config::{CorpusConfig, SpanCorruptionConfig};
pub use coordination::{Coordinator, SingleProcess, ThreadGroup, synchronize};
pub use data::{PackedSample, Span, TrainingSample};
pub use dataset::{
    BlendedSplits, SpanCorruptionDataset, SplitDatasets, TrainingDataset, WeightedCorpus,
    build_blended_train_valid_test_datasets, build_train_valid_test_datasets,
};
pub use errors::SpanPackError;
pub use masking::{NoiseMask, random_spans_noise_mask};
pub use planner::{LengthPlan, plan, validate_noise_parameters};
pub use sample_index::{SampleIndex, build_or_load, build_samples_mapping};
pub use sentinel::{SentinelMap, create_sentinel_ids};
pub use source::{DocumentStore, InMemoryDocuments, IndexedDataset, IndexedDatasetWriter};
pub use splits::{SplitLabel, SplitRatios};
pub use types::{DocId, SentinelValue, TokenId};
pub use vocab::{SpecialTokens, Vocabulary};
