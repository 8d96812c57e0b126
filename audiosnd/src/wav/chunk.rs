//! RIFF chunk framing
//!
//! A chunk is a four-byte tag, a little-endian u32 body size and the body.

use crate::error::{Error, Result};
use std::io::{BufRead, Read};

/// Size of a chunk header (tag + size)
pub const CHUNK_HEADER_LEN: usize = 8;

const READ_BLOCK: usize = 64 * 1024;
const MAX_PREALLOC: usize = 16 * 1024 * 1024;

/// Known chunk tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkId {
    Riff,
    Wave,
    Fmt,
    Data,
    List,
    Fact,
    Other([u8; 4]),
}

impl ChunkId {
    pub fn from_bytes(tag: [u8; 4]) -> Self {
        match &tag {
            b"RIFF" => ChunkId::Riff,
            b"WAVE" => ChunkId::Wave,
            b"fmt " => ChunkId::Fmt,
            b"data" => ChunkId::Data,
            b"LIST" => ChunkId::List,
            b"fact" => ChunkId::Fact,
            _ => ChunkId::Other(tag),
        }
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        match self {
            ChunkId::Riff => *b"RIFF",
            ChunkId::Wave => *b"WAVE",
            ChunkId::Fmt => *b"fmt ",
            ChunkId::Data => *b"data",
            ChunkId::List => *b"LIST",
            ChunkId::Fact => *b"fact",
            ChunkId::Other(tag) => *tag,
        }
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.as_bytes()))
    }
}

/// Chunk header as read from the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub size: u32,
}

/// Sequential chunk reader over a buffered byte source
pub struct ChunkReader<R: BufRead> {
    inner: R,
}

impl<R: BufRead> ChunkReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read and check a four-byte tag
    pub fn expect_tag(&mut self, expected: &[u8; 4]) -> Result<()> {
        let mut tag = [0u8; 4];
        if read_full(&mut self.inner, &mut tag)? < 4 || &tag != expected {
            return Err(Error::ContainerFormat(format!(
                "expected '{}' tag",
                String::from_utf8_lossy(expected)
            )));
        }
        Ok(())
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut bytes = [0u8; 4];
        if read_full(&mut self.inner, &mut bytes)? < 4 {
            return Err(Error::Truncated("u32 field".to_string()));
        }
        Ok(u32::from_le_bytes(bytes))
    }

    /// Next chunk header, or `None` at end of stream or on a blank tag
    pub fn next_header(&mut self) -> Result<Option<ChunkHeader>> {
        let mut tag = [0u8; 4];
        if read_full(&mut self.inner, &mut tag)? < 4 {
            return Ok(None);
        }
        if tag.iter().all(|b| *b == 0 || *b == b' ') {
            return Ok(None);
        }
        let id = ChunkId::from_bytes(tag);
        let mut size = [0u8; 4];
        if read_full(&mut self.inner, &mut size)? < 4 {
            return Err(Error::Truncated(format!("size of '{}' chunk", id)));
        }
        Ok(Some(ChunkHeader {
            id,
            size: u32::from_le_bytes(size),
        }))
    }

    /// Read exactly `header.size` body bytes, reporting the running total
    pub fn read_body(
        &mut self,
        header: &ChunkHeader,
        progress: &mut dyn FnMut(u64),
    ) -> Result<Vec<u8>> {
        let size = header.size as usize;
        let mut body = Vec::with_capacity(size.min(MAX_PREALLOC));
        let mut block = vec![0u8; READ_BLOCK.min(size.max(1))];

        while body.len() < size {
            let want = (size - body.len()).min(block.len());
            let got = read_full(&mut self.inner, &mut block[..want])?;
            body.extend_from_slice(&block[..got]);
            progress(body.len() as u64);
            if got < want {
                return Err(Error::Truncated(format!(
                    "'{}' chunk advertises {} bytes, only {} present",
                    header.id,
                    size,
                    body.len()
                )));
            }
        }
        self.skip_pad(header)?;
        Ok(body)
    }

    /// Discard a chunk body
    pub fn skip_body(&mut self, header: &ChunkHeader) -> Result<()> {
        let copied = std::io::copy(
            &mut (&mut self.inner).take(header.size as u64),
            &mut std::io::sink(),
        )?;
        if copied < header.size as u64 {
            return Err(Error::Truncated(format!(
                "'{}' chunk advertises {} bytes, only {} present",
                header.id, header.size, copied
            )));
        }
        self.skip_pad(header)
    }

    /// Odd-sized chunks may be followed by one zero pad byte. Tags never
    /// start with a zero byte, so a leading zero is consumed as padding.
    fn skip_pad(&mut self, header: &ChunkHeader) -> Result<()> {
        if header.size % 2 == 1 {
            let buf = self.inner.fill_buf()?;
            if buf.first() == Some(&0) {
                self.inner.consume(1);
            }
        }
        Ok(())
    }
}

/// Read until `buf` is full or the source ends; returns bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_chunk_id_mapping() {
        assert_eq!(ChunkId::from_bytes(*b"fmt "), ChunkId::Fmt);
        assert_eq!(ChunkId::from_bytes(*b"junk"), ChunkId::Other(*b"junk"));
        assert_eq!(ChunkId::Other(*b"bext").to_string(), "bext");
        assert_eq!(ChunkId::Data.as_bytes(), *b"data");
    }

    #[test]
    fn test_blank_tag_ends_iteration() {
        let mut reader = ChunkReader::new(Cursor::new(vec![0u8; 8]));
        assert!(reader.next_header().unwrap().is_none());

        let mut reader = ChunkReader::new(Cursor::new(b"da".to_vec()));
        assert!(reader.next_header().unwrap().is_none());
    }

    #[test]
    fn test_short_body_is_truncated() {
        let mut bytes = b"abcd".to_vec();
        bytes.extend_from_slice(&10u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3]);
        let mut reader = ChunkReader::new(Cursor::new(bytes));
        let header = reader.next_header().unwrap().unwrap();
        assert_eq!(header.size, 10);
        let err = reader.read_body(&header, &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::Truncated(_)));
    }

    #[test]
    fn test_odd_chunk_padding_is_skipped() {
        let mut bytes = b"odd!".to_vec();
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(&[9, 9, 9, 0]);
        bytes.extend_from_slice(b"next");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let mut reader = ChunkReader::new(Cursor::new(bytes));

        let first = reader.next_header().unwrap().unwrap();
        reader.skip_body(&first).unwrap();
        let second = reader.next_header().unwrap().unwrap();
        assert_eq!(second.id, ChunkId::Other(*b"next"));
        assert_eq!(second.size, 0);
    }

    #[test]
    fn test_progress_reports_running_total() {
        let mut bytes = b"data".to_vec();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[1, 2, 3, 4]);
        let mut reader = ChunkReader::new(Cursor::new(bytes));
        let header = reader.next_header().unwrap().unwrap();

        let mut seen = Vec::new();
        let body = reader.read_body(&header, &mut |n| seen.push(n)).unwrap();
        assert_eq!(body, vec![1, 2, 3, 4]);
        assert_eq!(seen.last(), Some(&4));
    }
}
