//! `MMIDIDX` indexed corpus format.
//!
//! A corpus is a pair of files sharing one prefix:
//! - `{prefix}.bin`: raw little-endian token data;
//! - `{prefix}.idx`: magic `MMIDIDX\0\0`, `u64` version, `u8` dtype code,
//!   `u64` sequence count, `u64` doc-index count, then `i32` sizes,
//!   `i64` byte pointers and `i64` doc-index entries.
//!
//! Each sequence is treated as one document.

use memmap2::Mmap;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::DocumentStore;
use crate::constants::indexed::{
    BIN_EXTENSION, IDX_EXTENSION, IDX_HEADER_LEN, IDX_MAGIC, IDX_VERSION, OFFSET_ENTRY_WIDTH,
    SIZE_ENTRY_WIDTH,
};
use crate::errors::SpanPackError;
use crate::types::{DocId, TokenId};

/// Element type of the `.bin` token data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenDtype {
    /// Unsigned 8-bit tokens (code 1).
    U8,
    /// Signed 8-bit tokens (code 2).
    I8,
    /// Signed 16-bit tokens (code 3).
    I16,
    /// Signed 32-bit tokens (code 4).
    I32,
    /// Signed 64-bit tokens (code 5).
    I64,
    /// Unsigned 16-bit tokens (code 8).
    U16,
}

impl TokenDtype {
    /// Decode a dtype code; floating point codes are not valid token types.
    pub fn from_code(code: u8) -> Result<Self, SpanPackError> {
        match code {
            1 => Ok(Self::U8),
            2 => Ok(Self::I8),
            3 => Ok(Self::I16),
            4 => Ok(Self::I32),
            5 => Ok(Self::I64),
            8 => Ok(Self::U16),
            6 | 7 => Err(SpanPackError::Format(format!(
                "dtype code {code} is a floating point type; token data must be integers"
            ))),
            other => Err(SpanPackError::Format(format!("unknown dtype code {other}"))),
        }
    }

    /// Code written to the `.idx` header.
    pub fn code(self) -> u8 {
        match self {
            Self::U8 => 1,
            Self::I8 => 2,
            Self::I16 => 3,
            Self::I32 => 4,
            Self::I64 => 5,
            Self::U16 => 8,
        }
    }

    /// Width of one token in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 => 4,
            Self::I64 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> Option<TokenId> {
        match self {
            Self::U8 => Some(bytes[0] as TokenId),
            Self::I8 => TokenId::try_from(bytes[0] as i8).ok(),
            Self::I16 => TokenId::try_from(i16::from_le_bytes([bytes[0], bytes[1]])).ok(),
            Self::U16 => Some(u16::from_le_bytes([bytes[0], bytes[1]]) as TokenId),
            Self::I32 => {
                TokenId::try_from(i32::from_le_bytes(bytes[..4].try_into().ok()?)).ok()
            }
            Self::I64 => {
                TokenId::try_from(i64::from_le_bytes(bytes[..8].try_into().ok()?)).ok()
            }
        }
    }

    fn encode(self, token: TokenId, out: &mut Vec<u8>) -> Option<()> {
        match self {
            Self::U8 => out.push(u8::try_from(token).ok()?),
            Self::I8 => out.extend_from_slice(&i8::try_from(token).ok()?.to_le_bytes()),
            Self::I16 => out.extend_from_slice(&i16::try_from(token).ok()?.to_le_bytes()),
            Self::U16 => out.extend_from_slice(&u16::try_from(token).ok()?.to_le_bytes()),
            Self::I32 => out.extend_from_slice(&i32::try_from(token).ok()?.to_le_bytes()),
            Self::I64 => out.extend_from_slice(&i64::from(token).to_le_bytes()),
        }
        Some(())
    }
}

/// `{prefix}.idx`
pub fn idx_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, IDX_EXTENSION)
}

/// `{prefix}.bin`
pub fn bin_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, BIN_EXTENSION)
}

fn with_suffix(prefix: &Path, extension: &str) -> PathBuf {
    let mut raw = prefix.as_os_str().to_os_string();
    raw.push(".");
    raw.push(extension);
    PathBuf::from(raw)
}

/// Read-only document store over an indexed `.idx`/`.bin` corpus.
pub struct IndexedDataset {
    prefix: PathBuf,
    dtype: TokenDtype,
    sizes: Vec<i32>,
    pointers: Vec<i64>,
    doc_idx: Vec<i64>,
    data: Option<Mmap>,
}

impl fmt::Debug for IndexedDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedDataset")
            .field("prefix", &self.prefix)
            .field("dtype", &self.dtype)
            .field("sequences", &self.sizes.len())
            .finish()
    }
}

impl IndexedDataset {
    /// Open the corpus stored at `{prefix}.idx` and `{prefix}.bin`.
    pub fn open<P: AsRef<Path>>(prefix: P) -> Result<Self, SpanPackError> {
        let prefix = prefix.as_ref().to_path_buf();
        let index = fs::read(idx_path(&prefix))?;
        let (dtype, sizes, pointers, doc_idx) = parse_index(&index)?;

        let bin = File::open(bin_path(&prefix))?;
        let bin_len = bin.metadata()?.len();
        // SAFETY: the token file is treated as immutable for the lifetime of the map.
        let data = if bin_len == 0 {
            None
        } else {
            Some(unsafe { Mmap::map(&bin)? })
        };

        let dataset = Self {
            prefix,
            dtype,
            sizes,
            pointers,
            doc_idx,
            data,
        };
        dataset.verify_extents(bin_len)?;
        Ok(dataset)
    }

    /// Token element type.
    pub fn dtype(&self) -> TokenDtype {
        self.dtype
    }

    /// Per-document token lengths.
    pub fn sizes(&self) -> &[i32] {
        &self.sizes
    }

    /// Document-index table as stored (one entry per document plus a sentinel).
    pub fn doc_idx(&self) -> &[i64] {
        &self.doc_idx
    }

    /// Total number of tokens across all documents.
    pub fn total_tokens(&self) -> u64 {
        self.sizes.iter().map(|size| *size as u64).sum()
    }

    fn verify_extents(&self, bin_len: u64) -> Result<(), SpanPackError> {
        let width = self.dtype.width() as u64;
        for (doc, (size, pointer)) in self.sizes.iter().zip(&self.pointers).enumerate() {
            if *size < 0 || *pointer < 0 {
                return Err(SpanPackError::Format(format!(
                    "document {doc} has negative size or pointer"
                )));
            }
            let end = *pointer as u64 + *size as u64 * width;
            if end > bin_len {
                return Err(SpanPackError::Format(format!(
                    "document {doc} ends at byte {end} beyond token file of {bin_len} bytes"
                )));
            }
        }
        Ok(())
    }

    fn size_of(&self, doc_id: DocId) -> Result<u32, SpanPackError> {
        self.sizes
            .get(doc_id as usize)
            .map(|size| *size as u32)
            .ok_or(SpanPackError::OutOfRange {
                index: doc_id as usize,
                len: self.sizes.len(),
            })
    }
}

impl DocumentStore for IndexedDataset {
    fn doc_count(&self) -> u64 {
        self.sizes.len() as u64
    }

    fn doc_length(&self, doc_id: DocId) -> Result<u32, SpanPackError> {
        self.size_of(doc_id)
    }

    fn slice(&self, doc_id: DocId, start: u64, end: u64) -> Result<Vec<TokenId>, SpanPackError> {
        let size = self.size_of(doc_id)? as u64;
        if start > end || end > size {
            return Err(SpanPackError::OutOfRange {
                index: end as usize,
                len: size as usize,
            });
        }
        if start == end {
            return Ok(Vec::new());
        }
        let width = self.dtype.width();
        let base = self.pointers[doc_id as usize] as usize;
        let from = base + start as usize * width;
        let to = base + end as usize * width;
        let bytes = self
            .data
            .as_ref()
            .and_then(|data| data.get(from..to))
            .ok_or_else(|| {
                SpanPackError::Format(format!("document {doc_id} range exceeds token file"))
            })?;
        bytes
            .chunks_exact(width)
            .map(|chunk| {
                self.dtype.decode(chunk).ok_or_else(|| {
                    SpanPackError::Format(format!(
                        "document {doc_id} holds a token outside the u32 id range"
                    ))
                })
            })
            .collect()
    }
}

type ParsedIndex = (TokenDtype, Vec<i32>, Vec<i64>, Vec<i64>);

fn parse_index(bytes: &[u8]) -> Result<ParsedIndex, SpanPackError> {
    if bytes.len() < IDX_HEADER_LEN {
        return Err(SpanPackError::Format(format!(
            "index file of {} bytes is shorter than its header",
            bytes.len()
        )));
    }
    if &bytes[..IDX_MAGIC.len()] != IDX_MAGIC {
        return Err(SpanPackError::Format("index file magic mismatch".into()));
    }
    let mut cursor = IDX_MAGIC.len();
    let version = read_u64(bytes, &mut cursor);
    if version != IDX_VERSION {
        return Err(SpanPackError::Format(format!(
            "index version mismatch (expected {IDX_VERSION}, found {version})"
        )));
    }
    let dtype = TokenDtype::from_code(bytes[cursor])?;
    cursor += 1;
    let sequences = read_u64(bytes, &mut cursor) as usize;
    let doc_entries = read_u64(bytes, &mut cursor) as usize;

    let expected = sequences
        .checked_mul(SIZE_ENTRY_WIDTH + OFFSET_ENTRY_WIDTH)
        .and_then(|tables| tables.checked_add(doc_entries.checked_mul(OFFSET_ENTRY_WIDTH)?))
        .and_then(|tables| tables.checked_add(IDX_HEADER_LEN));
    if expected != Some(bytes.len()) {
        return Err(SpanPackError::Format(format!(
            "index tables are not i32 sizes and i64 offsets: {sequences} sequences and \
             {doc_entries} doc entries do not fit {} bytes",
            bytes.len()
        )));
    }

    let sizes = bytes[cursor..cursor + sequences * SIZE_ENTRY_WIDTH]
        .chunks_exact(SIZE_ENTRY_WIDTH)
        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    cursor += sequences * SIZE_ENTRY_WIDTH;
    let pointers = read_i64_table(bytes, &mut cursor, sequences);
    let doc_idx = read_i64_table(bytes, &mut cursor, doc_entries);
    Ok((dtype, sizes, pointers, doc_idx))
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[*cursor..*cursor + 8]);
    *cursor += 8;
    u64::from_le_bytes(raw)
}

fn read_i64_table(bytes: &[u8], cursor: &mut usize, count: usize) -> Vec<i64> {
    let table = bytes[*cursor..*cursor + count * OFFSET_ENTRY_WIDTH]
        .chunks_exact(OFFSET_ENTRY_WIDTH)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            i64::from_le_bytes(raw)
        })
        .collect();
    *cursor += count * OFFSET_ENTRY_WIDTH;
    table
}

/// Summary of a written indexed corpus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexedCorpusStats {
    /// Documents written.
    pub num_documents: usize,
    /// Tokens written across all documents.
    pub total_tokens: u64,
}

/// Streaming writer for the `.idx`/`.bin` corpus layout.
pub struct IndexedDatasetWriter {
    prefix: PathBuf,
    dtype: TokenDtype,
    bin_writer: BufWriter<File>,
    sizes: Vec<i32>,
    pointers: Vec<i64>,
    byte_offset: i64,
    scratch: Vec<u8>,
}

impl IndexedDatasetWriter {
    /// Create `{prefix}.bin`; `{prefix}.idx` is written by [`Self::finish`].
    pub fn create<P: AsRef<Path>>(prefix: P, dtype: TokenDtype) -> Result<Self, SpanPackError> {
        let prefix = prefix.as_ref().to_path_buf();
        if let Some(parent) = prefix.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let bin_writer = BufWriter::new(File::create(bin_path(&prefix))?);
        Ok(Self {
            prefix,
            dtype,
            bin_writer,
            sizes: Vec::new(),
            pointers: Vec::new(),
            byte_offset: 0,
            scratch: Vec::new(),
        })
    }

    /// Append one document.
    pub fn add_document(&mut self, tokens: &[TokenId]) -> Result<(), SpanPackError> {
        let size = i32::try_from(tokens.len()).map_err(|_| {
            SpanPackError::Format(format!("document of {} tokens exceeds i32", tokens.len()))
        })?;
        self.scratch.clear();
        for &token in tokens {
            self.dtype.encode(token, &mut self.scratch).ok_or_else(|| {
                SpanPackError::Format(format!("token {token} does not fit dtype {:?}", self.dtype))
            })?;
        }
        self.bin_writer.write_all(&self.scratch)?;
        self.pointers.push(self.byte_offset);
        self.sizes.push(size);
        self.byte_offset += self.scratch.len() as i64;
        Ok(())
    }

    /// Flush token data and write the index file.
    pub fn finish(mut self) -> Result<IndexedCorpusStats, SpanPackError> {
        self.bin_writer.flush()?;

        let sequences = self.sizes.len();
        let mut index = Vec::with_capacity(
            IDX_HEADER_LEN + sequences * (SIZE_ENTRY_WIDTH + 2 * OFFSET_ENTRY_WIDTH) + 8,
        );
        index.extend_from_slice(IDX_MAGIC);
        index.extend_from_slice(&IDX_VERSION.to_le_bytes());
        index.push(self.dtype.code());
        index.extend_from_slice(&(sequences as u64).to_le_bytes());
        index.extend_from_slice(&(sequences as u64 + 1).to_le_bytes());
        for size in &self.sizes {
            index.extend_from_slice(&size.to_le_bytes());
        }
        for pointer in &self.pointers {
            index.extend_from_slice(&pointer.to_le_bytes());
        }
        for doc in 0..=sequences {
            index.extend_from_slice(&(doc as i64).to_le_bytes());
        }
        fs::write(idx_path(&self.prefix), &index)?;

        Ok(IndexedCorpusStats {
            num_documents: sequences,
            total_tokens: self.sizes.iter().map(|size| *size as u64).sum(),
        })
    }
}
