//! Chunk reassembly.
//!
//! ## Transfer file format
//!
//! ```text
//! offset 0   u32 LE  transfer id
//! offset 4   u32 LE  base offset (payload bytes durably written)
//! offset 8   u32 LE  total size
//! offset 12  payload bytes at their final offsets
//! ```
//!
//! A chunk is only applied when it continues exactly where the file left
//! off. Duplicates and out-of-order chunks get the stored offset back so the
//! agent can resynchronize. A chunk from a different transfer id discards
//! the partial upload and the agent restarts from zero.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use collector_types::InstanceId;
use tracing::{debug, info, warn};

use crate::{Result, StorageError};

/// Size of the transfer file header in bytes.
pub const HEADER_LEN: u64 = 12;

/// Persistent state of one in-flight transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferHeader {
    pub id: u32,
    pub base_offset: u32,
    pub total_size: u32,
}

impl TransferHeader {
    fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut buf = [0u8; HEADER_LEN as usize];
        buf[0..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.base_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.total_size.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8; HEADER_LEN as usize]) -> Self {
        let word = |i: usize| u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
        Self {
            id: word(0),
            base_offset: word(4),
            total_size: word(8),
        }
    }

    fn read_from(file: &mut File) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN as usize];
        file.seek(SeekFrom::Start(0))?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..])? {
                0 => return Err(StorageError::MalformedHeader { len: filled }),
                n => filled += n,
            }
        }
        Ok(Self::decode(&buf))
    }

    fn write_to(&self, file: &mut File) -> Result<()> {
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.encode())?;
        Ok(())
    }
}

/// One byte range of an upload, as received from the agent.
#[derive(Clone, Copy, Debug)]
pub struct Chunk<'a> {
    /// Correlates all chunks of one upload attempt.
    pub id: u32,
    /// Offset the agent believes is already stored.
    pub base_offset: u32,
    /// Declared length of `content`.
    pub chunk_len: u32,
    /// Declared size of the complete payload.
    pub total_size: u32,
    pub content: &'a [u8],
}

/// Result of applying a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// The transfer was inconsistent and has been discarded; start over at 0.
    Restart,
    /// Nothing written; continue from the stored offset.
    Resync { base_offset: u32 },
    /// Chunk written; the upload continues.
    Accepted { base_offset: u32 },
    /// Last chunk written; the transfer file is gone.
    Complete { payload: Vec<u8> },
}

impl ChunkOutcome {
    /// The offset to report back to the agent.
    pub fn base_offset(&self) -> u32 {
        match self {
            ChunkOutcome::Restart => 0,
            ChunkOutcome::Resync { base_offset } | ChunkOutcome::Accepted { base_offset } => {
                *base_offset
            }
            ChunkOutcome::Complete { payload } => payload.len() as u32,
        }
    }
}

/// Directory of in-flight transfer files, one per instance.
#[derive(Clone, Debug)]
pub struct TransferStore {
    dir: PathBuf,
}

impl TransferStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Transfer directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the transfer file for `instance`.
    pub fn path(&self, instance: &InstanceId) -> PathBuf {
        self.dir.join(instance.as_str())
    }

    /// Header of the in-flight transfer for `instance`, if any.
    pub fn pending(&self, instance: &InstanceId) -> Result<Option<TransferHeader>> {
        match File::open(self.path(instance)) {
            Ok(mut file) => TransferHeader::read_from(&mut file).map(Some),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop the in-flight transfer for `instance`. Returns whether one existed.
    pub fn discard(&self, instance: &InstanceId) -> Result<bool> {
        match fs::remove_file(self.path(instance)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply one chunk to the transfer for `instance`.
    pub fn write_chunk(&self, instance: &InstanceId, chunk: &Chunk<'_>) -> Result<ChunkOutcome> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(instance);

        let (mut file, mut header) = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(mut file) => match TransferHeader::read_from(&mut file) {
                Ok(header) => (file, header),
                Err(StorageError::MalformedHeader { len }) => {
                    warn!(instance = %instance, len, "Truncated transfer file, discarding");
                    drop(file);
                    self.discard(instance)?;
                    return Ok(ChunkOutcome::Restart);
                }
                Err(e) => return Err(e),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create_new(true)
                    .open(&path)?;
                let header = TransferHeader {
                    id: chunk.id,
                    base_offset: 0,
                    total_size: chunk.total_size,
                };
                header.write_to(&mut file)?;
                info!(
                    instance = %instance,
                    transfer_id = chunk.id,
                    total_size = chunk.total_size,
                    "Starting chunked transfer"
                );
                (file, header)
            }
            Err(e) => return Err(e.into()),
        };

        if header.id != chunk.id || header.total_size != chunk.total_size {
            warn!(
                instance = %instance,
                stored_id = header.id,
                incoming_id = chunk.id,
                stored_size = header.total_size,
                incoming_size = chunk.total_size,
                "Transfer mismatch, discarding partial upload"
            );
            drop(file);
            self.discard(instance)?;
            return Ok(ChunkOutcome::Restart);
        }

        if header.base_offset != chunk.base_offset
            || chunk.content.len() != chunk.chunk_len as usize
        {
            debug!(
                instance = %instance,
                stored_base = header.base_offset,
                claimed_base = chunk.base_offset,
                chunk_len = chunk.chunk_len,
                content_len = chunk.content.len(),
                "Chunk out of sequence, asking agent to resync"
            );
            return Ok(ChunkOutcome::Resync {
                base_offset: header.base_offset,
            });
        }

        let end = u32::try_from(chunk.content.len())
            .ok()
            .and_then(|len| header.base_offset.checked_add(len))
            .filter(|end| *end <= header.total_size);
        let Some(end) = end else {
            warn!(
                instance = %instance,
                base = header.base_offset,
                len = chunk.content.len(),
                total_size = header.total_size,
                "Chunk overruns declared size, discarding partial upload"
            );
            drop(file);
            self.discard(instance)?;
            return Ok(ChunkOutcome::Restart);
        };

        file.seek(SeekFrom::Start(HEADER_LEN + u64::from(header.base_offset)))?;
        file.write_all(chunk.content)?;
        header.base_offset = end;
        header.write_to(&mut file)?;
        file.sync_data()?;

        if header.base_offset < header.total_size {
            debug!(
                instance = %instance,
                base = header.base_offset,
                total_size = header.total_size,
                "Chunk accepted"
            );
            return Ok(ChunkOutcome::Accepted {
                base_offset: header.base_offset,
            });
        }

        let mut payload = Vec::with_capacity(header.total_size as usize);
        file.seek(SeekFrom::Start(HEADER_LEN))?;
        file.take(u64::from(header.total_size))
            .read_to_end(&mut payload)?;
        self.discard(instance)?;

        info!(
            instance = %instance,
            transfer_id = header.id,
            size = payload.len(),
            "Chunked transfer complete"
        );
        Ok(ChunkOutcome::Complete { payload })
    }
}
