use crate::snapshot::CacheEntry;
use crate::writer::{ARCHIVE_MAGIC, ARCHIVE_VERSION, ArchiveHeader, HEADER_SIZE, MAX_ENTRY_SIZE, codec};
use bincode::Options;
use std::io::{self, BufReader, Read};

/// Reader for cache store archives written by [`crate::SnapshotWriter`]
pub struct SnapshotReader<R: Read> {
    reader: BufReader<R>,
    header: Option<ArchiveHeader>,
    position: usize,
}

impl<R: Read> SnapshotReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            header: None,
            position: 0,
        }
    }

    pub fn read_header(&mut self) -> io::Result<ArchiveHeader> {
        if let Some(ref header) = self.header {
            return Ok(header.clone());
        }

        let mut header_buf = [0u8; HEADER_SIZE];
        self.reader.read_exact(&mut header_buf)?;

        if header_buf[0..4] != ARCHIVE_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid archive magic bytes",
            ));
        }

        let mut word = [0u8; 4];
        word.copy_from_slice(&header_buf[4..8]);
        let version = u32::from_be_bytes(word);
        if version != ARCHIVE_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Unsupported archive version: {} (expected {})",
                    version, ARCHIVE_VERSION
                ),
            ));
        }

        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&header_buf[8..16]);
        let created_at = u64::from_be_bytes(stamp);

        let mut reserved = [0u8; 16];
        reserved.copy_from_slice(&header_buf[16..32]);

        let header = ArchiveHeader {
            magic: ARCHIVE_MAGIC,
            version,
            created_at,
            reserved,
        };

        self.header = Some(header.clone());
        self.position += HEADER_SIZE;
        Ok(header)
    }

    /// Read the next entry; `Ok(None)` at a clean end of stream
    pub fn read_entry(&mut self) -> io::Result<Option<CacheEntry>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.reader.read(&mut len_buf[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Truncated entry length",
                ));
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_ENTRY_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Entry length {} exceeds {} bytes", len, MAX_ENTRY_SIZE),
            ));
        }
        let mut data = vec![0u8; len];
        self.reader.read_exact(&mut data)?;
        self.position += len_buf.len() + len;

        codec()
            .deserialize(&data)
            .map(Some)
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to decode entry: {}", e),
                )
            })
    }

    pub fn header(&self) -> Option<&ArchiveHeader> {
        self.header.as_ref()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn read_all_entries(&mut self) -> io::Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.read_entry()? {
            entries.push(entry);
        }
        Ok(entries)
    }
}
