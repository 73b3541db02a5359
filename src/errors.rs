use std::io;

use thiserror::Error;

/// Error type for configuration, corpus format, index persistence, and coordination failures.
#[derive(Debug, Error)]
pub enum SpanPackError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("corpus format error: {0}")]
    Format(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("sample index store failure: {0}")]
    IndexStore(String),
    #[error("coordination failure: {0}")]
    Coordination(String),
    #[error("index {index} is out of range for length {len}")]
    OutOfRange { index: usize, len: usize },
}
