/// Token id as stored in a tokenized corpus.
/// Example: `31999`
pub type TokenId = u32;
/// Zero-based document identifier within a corpus.
/// Example: `0`, `1_204_331`
pub type DocId = u64;
/// Per-position sentinel marker (`0` keep, `> 0` replacement id, `< 0` delete).
/// Examples: `0`, `32099`, `-1`
pub type SentinelValue = i64;
