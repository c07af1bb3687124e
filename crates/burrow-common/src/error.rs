//! Error types for Burrow.

use thiserror::Error;

/// Result type alias using BurrowError.
pub type Result<T> = std::result::Result<T, BurrowError>;

/// Errors that can occur in Burrow operations.
#[derive(Debug, Error)]
pub enum BurrowError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Paged file errors
    #[error("File not open: {0}")]
    FileNotOpen(String),

    #[error("Page not found: {page_no} in file {file}")]
    PageNotFound { file: String, page_no: u32 },

    #[error("Page corrupted: {0}")]
    Corrupted(String),

    // Buffer pool errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    // Heap errors
    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Record too short: {got} bytes, key needs {need} at offset {offset}")]
    RecordTooShort {
        got: usize,
        need: usize,
        offset: usize,
    },

    // Index errors
    #[error("Index metadata mismatch on field: {field}")]
    MetadataMismatch { field: &'static str },

    #[error("Invalid scan operators: low must be GT or GTE, high must be LT or LTE")]
    BadOpcodes,

    #[error("Invalid scan range: low bound exceeds high bound")]
    BadScanRange,

    #[error("No key found in scan range")]
    NoSuchKey,

    #[error("Scan not initialized")]
    ScanNotInitialized,

    #[error("Scan completed")]
    ScanComplete,

    // Configuration errors
    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },
}
