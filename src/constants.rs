use crate::splits::SplitLabel;

/// Constants used by noise-mask generation and length planning.
pub mod masking {
    /// Default fraction of raw tokens selected as noise.
    pub const DEFAULT_NOISE_DENSITY: f64 = 0.15;
    /// Default mean length of one noise span, in tokens.
    pub const DEFAULT_MEAN_NOISE_SPAN_LENGTH: f64 = 3.0;
    /// Default desired encoder input length.
    pub const DEFAULT_SEQ_LENGTH: usize = 512;
    /// Default seed for the dataset-owned mask generator.
    pub const DEFAULT_MASK_SEED: u64 = 42;
    /// Noise density at which target length is trimmed to match input length.
    pub const BALANCED_NOISE_DENSITY: f64 = 0.5;
    /// Sentinel marker for masked positions that are fused into a preceding sentinel.
    pub const FUSED_SPAN_MARKER: i64 = -1;
}

/// Constants used by sample-index persistence and wire encoding.
pub mod sample_index {
    /// Version tag for persisted sample-index artifacts.
    pub const SAMPLE_INDEX_VERSION: u8 = 1;
    /// Prefix marker for bincode-encoded payloads.
    pub const BINCODE_PREFIX: u8 = b'B';
    /// Filename suffix appended to `{prefix}_{split}` for index artifacts.
    pub const INDEXMAP_SUFFIX: &str = "_indexmap.bin";
    /// Filename prefix for in-progress artifact writes.
    pub const TEMP_ARTIFACT_PREFIX: &str = ".indexmap-";
}

/// Constants used by the `MMIDIDX` indexed corpus layout.
pub mod indexed {
    /// Magic header of an `.idx` file.
    pub const IDX_MAGIC: &[u8; 9] = b"MMIDIDX\x00\x00";
    /// Supported `.idx` layout version.
    pub const IDX_VERSION: u64 = 1;
    /// Header size in bytes: magic, version, dtype, sequence count, doc-index count.
    pub const IDX_HEADER_LEN: usize = 9 + 8 + 1 + 8 + 8;
    /// Extension of the index file.
    pub const IDX_EXTENSION: &str = "idx";
    /// Extension of the token data file.
    pub const BIN_EXTENSION: &str = "bin";
    /// Width in bytes of one entry of the sizes table.
    pub const SIZE_ENTRY_WIDTH: usize = 4;
    /// Width in bytes of one entry of the pointer and doc-index tables.
    pub const OFFSET_ENTRY_WIDTH: usize = 8;
}

/// Constants used by train/validation/test split planning.
pub mod splits {
    use super::SplitLabel;

    /// Canonical split iteration order.
    pub const ALL_SPLITS: [SplitLabel; 3] =
        [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];
    /// Separators accepted between split weights.
    pub const WEIGHT_SEPARATORS: [char; 2] = [',', '/'];
}
