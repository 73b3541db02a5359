use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spanpack::source::indexed::idx_path;
use spanpack::source::{DocumentStore, IndexedDataset, IndexedDatasetWriter, TokenDtype};
use spanpack::{
    CorpusConfig, SingleProcess, SpanCorruptionConfig, SpecialTokens, SplitLabel, SplitRatios,
    Vocabulary, build_train_valid_test_datasets,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SplitArg {
    Train,
    Validation,
    Test,
}

impl From<SplitArg> for SplitLabel {
    fn from(value: SplitArg) -> Self {
        match value {
            SplitArg::Train => SplitLabel::Train,
            SplitArg::Validation => SplitLabel::Validation,
            SplitArg::Test => SplitLabel::Test,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "pack_corpus",
    about = "Pack an indexed corpus and print span-corruption samples",
    long_about = "Open (or synthesize) an MMIDIDX corpus at PREFIX, build or load the per-split sample indexes, and print assembled samples.",
    after_help = "Set RUST_LOG=spanpack=debug to see packing statistics."
)]
struct PackCorpusCli {
    #[arg(long, value_name = "PREFIX", help = "Corpus prefix; reads PREFIX.idx and PREFIX.bin")]
    prefix: PathBuf,
    #[arg(
        long,
        default_value_t = 0,
        help = "Synthesize this many random documents at PREFIX when no corpus exists"
    )]
    synthesize: usize,
    #[arg(long, default_value_t = 32_128, help = "Vocabulary size, sentinels included")]
    vocab_size: usize,
    #[arg(long, default_value_t = 100, help = "Sentinel ids reserved at the top of the vocabulary")]
    extra_ids: usize,
    #[arg(long, default_value_t = 1, help = "End-of-sequence token id")]
    eos_id: u32,
    #[arg(
        long,
        value_name = "FILE",
        help = "JSON corpus config; replaces the split and masking flags below"
    )]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 512, help = "Desired encoder input length")]
    seq_length: usize,
    #[arg(long, default_value_t = 0.15, help = "Fraction of raw tokens masked")]
    noise_density: f64,
    #[arg(long, default_value_t = 3.0, help = "Mean noise span length")]
    mean_noise_span_length: f64,
    #[arg(long, default_value_t = 42, help = "Mask generator seed")]
    seed: u64,
    #[arg(
        long = "split-ratios",
        value_name = "TRAIN,VALIDATION,TEST",
        default_value = "949,50,1",
        help = "Relative document shares per split"
    )]
    split_ratios: String,
    #[arg(long, value_enum, default_value = "train", help = "Split to print samples from")]
    split: SplitArg,
    #[arg(long, default_value_t = 2, help = "Number of samples to print")]
    samples: usize,
}

/// Exclusive upper bound for synthesized token ids: below the sentinels and
/// within `u16` storage. Ids 0 and 1 stay reserved for padding and EOS.
fn ordinary_token_limit(vocab_size: usize, extra_ids: usize) -> Result<u32, String> {
    let ordinary = vocab_size
        .checked_sub(extra_ids)
        .filter(|ordinary| *ordinary > 2)
        .ok_or_else(|| {
            format!("--vocab-size {vocab_size} must exceed --extra-ids {extra_ids} by at least 3")
        })?;
    Ok(ordinary.min(usize::from(u16::MAX)) as u32)
}

fn synthesize_corpus(cli: &PackCorpusCli) -> Result<(), Box<dyn Error>> {
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let mut writer = IndexedDatasetWriter::create(&cli.prefix, TokenDtype::U16)?;
    let ordinary = ordinary_token_limit(cli.vocab_size, cli.extra_ids)?;
    for _ in 0..cli.synthesize {
        let len = rng.random_range(16..2_048);
        let doc: Vec<u32> = (0..len).map(|_| rng.random_range(2..ordinary)).collect();
        writer.add_document(&doc)?;
    }
    let stats = writer.finish()?;
    println!(
        "wrote {} documents ({} tokens) to {}",
        stats.num_documents,
        stats.total_tokens,
        cli.prefix.display()
    );
    Ok(())
}

fn corpus_config(cli: &PackCorpusCli) -> Result<CorpusConfig, Box<dyn Error>> {
    if let Some(path) = &cli.config {
        let raw = fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&raw)?);
    }
    Ok(CorpusConfig {
        splits: SplitRatios::parse(&cli.split_ratios)?,
        corruption: SpanCorruptionConfig {
            seq_length: cli.seq_length,
            noise_density: cli.noise_density,
            mean_noise_span_length: cli.mean_noise_span_length,
            seed: cli.seed,
        },
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let cli = PackCorpusCli::parse();
    if !idx_path(&cli.prefix).is_file() {
        if cli.synthesize == 0 {
            return Err(format!(
                "no corpus at {}; pass --synthesize N to create one",
                cli.prefix.display()
            )
            .into());
        }
        synthesize_corpus(&cli)?;
    }

    let store: Arc<dyn DocumentStore> = Arc::new(IndexedDataset::open(&cli.prefix)?);
    let vocab: Arc<dyn Vocabulary> = Arc::new(SpecialTokens::with_extra_ids(
        cli.vocab_size,
        cli.eos_id,
        cli.extra_ids,
    ));
    let config = corpus_config(&cli)?;

    let datasets =
        build_train_valid_test_datasets(store, &cli.prefix, &config, vocab, &SingleProcess)?;

    let split: SplitLabel = cli.split.into();
    let Some(dataset) = datasets.get(split) else {
        println!("split {split} received no documents");
        return Ok(());
    };
    let plan = dataset.plan();
    println!(
        "{split}: {} samples of {} raw tokens (input {}, target {})",
        dataset.len(),
        plan.raw_len,
        plan.input_len,
        plan.target_len
    );
    for idx in 0..cli.samples.min(dataset.len()) {
        let sample = dataset.at(idx)?;
        println!("sample {idx}");
        println!("  input:  {:?}", sample.input());
        println!("  target: {:?}", sample.target());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_ids_stop_below_the_sentinels() {
        assert_eq!(ordinary_token_limit(32_128, 100), Ok(32_028));
        assert_eq!(ordinary_token_limit(250_000, 100), Ok(u32::from(u16::MAX)));
    }

    #[test]
    fn extra_ids_at_or_above_the_vocabulary_are_rejected() {
        assert!(ordinary_token_limit(100, 200).is_err());
        assert!(ordinary_token_limit(100, 100).is_err());
        assert!(ordinary_token_limit(102, 100).is_err());
        assert_eq!(ordinary_token_limit(103, 100), Ok(3));
    }

    #[test]
    fn config_file_replaces_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        fs::write(
            &path,
            r#"{ "splits": { "train": 1.0, "validation": 0.0, "test": 0.0 },
                 "corruption": { "seq_length": 128 } }"#,
        )
        .unwrap();
        let cli = PackCorpusCli::parse_from([
            "pack_corpus",
            "--prefix",
            "unused",
            "--config",
            path.to_str().unwrap(),
        ]);
        let config = corpus_config(&cli).unwrap();
        assert_eq!(config.corruption.seq_length, 128);
        assert_eq!(config.corruption.noise_density, 0.15);
        assert_eq!(config.splits.validation, 0.0);
    }
}
