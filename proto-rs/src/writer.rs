use crate::error::ProtoError;
use crate::snapshot::{CacheEntry, ResponseSnapshot};
use bincode::Options;
use std::io::{self, Write};

// Archive format constants
pub const ARCHIVE_MAGIC: [u8; 4] = [0x50, 0x57, 0x43, 0x53]; // "PWCS"
pub const ARCHIVE_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 32;
/// Largest encoded entry accepted in an archive
pub const MAX_ENTRY_SIZE: usize = 64 * 1024 * 1024;

pub(crate) fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

/// Encode a single snapshot (no header, no length prefix)
pub fn encode_snapshot(snapshot: &ResponseSnapshot) -> Result<Vec<u8>, ProtoError> {
    Ok(codec().serialize(snapshot)?)
}

/// Decode a snapshot produced by [`encode_snapshot`]
pub fn decode_snapshot(data: &[u8]) -> Result<ResponseSnapshot, ProtoError> {
    Ok(codec().deserialize(data)?)
}

/// Header of a cache store archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub created_at: u64, // Unix timestamp in milliseconds
    pub reserved: [u8; 16],
}

impl ArchiveHeader {
    /// Create a new header stamped with the current time
    pub fn new() -> Self {
        Self::with_timestamp(chrono::Utc::now().timestamp_millis().max(0) as u64)
    }

    pub fn with_timestamp(created_at: u64) -> Self {
        Self {
            magic: ARCHIVE_MAGIC,
            version: ARCHIVE_VERSION,
            created_at,
            reserved: [0; 16],
        }
    }
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer for cache store archives: a header followed by length-prefixed entries
pub struct SnapshotWriter<W: Write> {
    writer: W,
    header_written: bool,
}

impl<W: Write> SnapshotWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn write_header(&mut self, header: &ArchiveHeader) -> io::Result<()> {
        if self.header_written {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Header already written",
            ));
        }

        self.writer.write_all(&header.magic)?;
        self.writer.write_all(&header.version.to_be_bytes())?;
        self.writer.write_all(&header.created_at.to_be_bytes())?;
        self.writer.write_all(&header.reserved)?;

        self.header_written = true;
        Ok(())
    }

    pub fn write_entry(&mut self, entry: &CacheEntry) -> io::Result<()> {
        let encoded = codec()
            .serialize(entry)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if encoded.len() > MAX_ENTRY_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "Entry too large"));
        }
        let len = encoded.len() as u32;
        self.writer.write_all(&len.to_be_bytes())?;
        self.writer.write_all(&encoded)?;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }
}
