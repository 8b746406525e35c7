use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of input")]
    Truncated,

    #[error("reached end of file at a clean document boundary")]
    TruncatedInterim,

    #[error("malformed BSON: {0}")]
    MalformedBson(String),

    #[error("unrecognized framing document type: {0}")]
    UnknownDocumentType(i32),

    #[error(
        "declared uncompressed chunk size {declared} does not match inflated size {actual}"
    )]
    FrameSizeMismatch { declared: u32, actual: u32 },

    #[error("zlib decompression failed")]
    DecompressionFailure(#[source] std::io::Error),

    #[error("varint exceeded the maximum 10-byte encoding of a 64-bit value")]
    VarintOverflow,

    #[error("flattened reference document has {actual} metrics, header declares {expected}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("{0} byte(s) remained in the delta stream after decoding all expected deltas")]
    TrailingBytes(usize),

    #[error("decoding was cancelled")]
    Cancelled,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
