//! Errors raised while building or decoding NVS partitions.

use thiserror::Error;

/// Errors that can occur while generating or reading an NVS partition.
///
/// Messages are shown to the user as-is by the HTTP API, so they name the
/// offending key or row.
#[derive(Debug, Error)]
pub enum NvsError {
    /// Partition size is not a multiple of the flash page size.
    #[error("Size of partition must be multiple of 4096 (got {0:#x})")]
    SizeNotAligned(usize),

    /// Partition size leaves fewer than two data pages.
    #[error("Minimum NVS partition size needed is 0x3000 bytes (got {0:#x})")]
    SizeTooSmall(usize),

    /// Partition size could not be parsed.
    #[error("Invalid partition size `{0}`")]
    InvalidSize(String),

    /// The data does not fit in the requested partition size.
    #[error("Size parameter is less than the size of data. Please increase size.")]
    InsufficientSize,

    /// Key is empty.
    #[error("Key must not be empty")]
    EmptyKey,

    /// Key exceeds the 15 byte limit.
    #[error("Length of key `{0}` should be <= 15 characters.")]
    KeyTooLong(String),

    /// A value was written before any namespace was opened.
    #[error("First entry should be a namespace (got `{0}`)")]
    NoNamespace(String),

    /// Namespace declared twice.
    #[error("Namespace `{0}` is already defined")]
    DuplicateNamespace(String),

    /// Only 254 namespaces fit in a partition.
    #[error("Too many namespaces (maximum is 254)")]
    TooManyNamespaces,

    /// Key written twice in the same namespace.
    #[error("Duplicate key `{key}` in namespace `{namespace}`")]
    DuplicateKey { namespace: String, key: String },

    /// Value exceeds the largest size an item can have.
    #[error("{key}: Size exceeds max allowed length ({len} > {max} bytes)")]
    ValueTooLarge { key: String, len: usize, max: usize },

    /// Value text does not match its encoding.
    #[error("{key}: invalid {encoding} value: {reason}")]
    InvalidValue {
        key: String,
        encoding: String,
        reason: String,
    },

    /// Unknown encoding name.
    #[error("{0}: Unsupported encoding")]
    UnsupportedEncoding(String),

    /// Malformed CSV input.
    #[error("line {line}: {message}")]
    Csv { line: u64, message: String },

    /// A `file` row could not be resolved.
    #[error("{key}: cannot read file `{path}`: {reason}")]
    File {
        key: String,
        path: String,
        reason: String,
    },

    /// A page failed validation while reading.
    #[error("page {page}: {reason}")]
    CorruptPage { page: usize, reason: String },

    /// An item failed validation while reading.
    #[error("page {page}, entry {entry}: {reason}")]
    CorruptItem {
        page: usize,
        entry: usize,
        reason: String,
    },
}

impl NvsError {
    pub(crate) fn invalid_value(key: &str, encoding: &str, reason: impl Into<String>) -> Self {
        NvsError::InvalidValue {
            key: key.to_string(),
            encoding: encoding.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<csv::Error> for NvsError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let message = match err.kind() {
            csv::ErrorKind::Deserialize { err, .. } => err.to_string(),
            _ => err.to_string(),
        };
        NvsError::Csv { line, message }
    }
}
