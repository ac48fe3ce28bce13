//! Error types and the related `Result<T>`

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

/// Which wire-format record a truncation or signature error happened in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RecordKind {
    Eocd,
    Cdfh,
    Lfh,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecordKind::Eocd => "End Of Central Directory Record",
            RecordKind::Cdfh => "Central Directory File Header",
            RecordKind::Lfh => "Local File Header",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O (reading the source or writing the sink).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source is shorter than the smallest possible End Of Central
    /// Directory Record.
    #[error("Source is too short to contain a Zip archive ({0} bytes)")]
    TruncatedSource(u64),

    /// No verified End Of Central Directory signature was found in the
    /// trailing search window.
    #[error("Couldn't find End Of Central Directory Record")]
    EocdNotFound,

    /// A fixed-size record header was cut short.
    #[error("Truncated {0} header")]
    TruncatedHeader(RecordKind),

    /// A variable-length tail (name/extra/comment) was cut short.
    #[error("Truncated {0} tail")]
    TruncatedTail(RecordKind),

    /// A Central Directory File Header's signature didn't match at the
    /// expected position.
    #[error("Bad Central Directory File Header signature at entry {0}")]
    BadCdfhSignature(usize),

    /// A Local File Header's signature didn't match at the expected
    /// position.
    #[error("Bad Local File Header signature")]
    BadLfhSignature,

    /// The archive claims to span multiple disks/volumes.
    #[error("Multi-volume (spanned) archives are not supported")]
    MultiVolumeUnsupported,

    /// The Central Directory's declared offset + size extends past the
    /// EOCD record that's supposed to immediately follow it.
    #[error(
        "Central Directory ({cd_end} bytes in) overruns End Of Central Directory Record at {eocd_offset}"
    )]
    CentralDirectoryOverrun { cd_end: u64, eocd_offset: u64 },

    /// A compression method other than Stored (0) or Deflate (8).
    #[error("Unsupported compression method {0}")]
    UnsupportedMethod(u16),

    /// A DOS date/time field decoded to a value outside the accepted range.
    #[error("DOS date/time field out of range")]
    DateTimeRange,

    /// Two entries in the Central Directory share a name.
    #[error("Duplicate entry name in Central Directory: {0:?}")]
    DuplicateName(Vec<u8>),

    /// Decompression produced the wrong number of bytes.
    #[error("Size mismatch: expected {expected} bytes, got {got}")]
    SizeMismatch { expected: u64, got: u64 },

    /// Decompression produced bytes with the wrong CRC-32.
    #[error("CRC-32 mismatch: expected {expected:#010x}, got {got:#010x}")]
    CrcMismatch { expected: u32, got: u32 },

    /// A 64-bit length or offset didn't fit in a `usize`
    /// (only possible on 32-bit targets).
    #[error("Zip archive field too large for this platform's address space")]
    TooLarge,

    /// The Local File Header's name/size/CRC/method disagreed with the
    /// Central Directory's record for the same entry. Only checked when
    /// the `check-local-metadata` feature is enabled.
    #[error("Local File Header doesn't match Central Directory entry for {0:?}")]
    LocalHeaderMismatch(Vec<u8>),
}
