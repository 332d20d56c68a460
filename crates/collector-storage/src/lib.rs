//! # collector-storage
//!
//! Resumable chunked transfers for the evidence collector.
//!
//! Agents on unreliable links upload large evidence as a sequence of byte
//! ranges. Each in-flight upload lives in its own transfer file, outside the
//! repository directory, until the last byte arrives.
//!
//! ## Modules
//!
//! - [`transfer`]: transfer file header and chunk reassembly.

pub mod transfer;

pub use transfer::{Chunk, ChunkOutcome, TransferHeader, TransferStore, HEADER_LEN};

/// Error types for transfer storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error on a transfer file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transfer file too short to hold a header.
    #[error("malformed transfer header: {len} bytes")]
    MalformedHeader { len: usize },
}

/// Convenience result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
