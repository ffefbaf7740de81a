// Pull-based byte sources for the decoder.
//
// The decoder never needs the whole file: header parsing and entropy
// decoding both consume one byte at a time. SliceSource serves an
// in-memory buffer (e.g. a completed download); ChunkSource refills a
// small fixed buffer through a read closure (flash, SD, PSRAM window).

use crate::error::DecodeError;

/// Chunk size for closure-backed reads.
pub const CHUNK_SIZE: usize = 1024;

/// Sequential byte input.
pub trait ByteSource {
    /// Next byte, or `None` once the stream is exhausted.
    fn next_byte(&mut self) -> Result<Option<u8>, DecodeError>;

    /// Next byte; end of stream is an error.
    fn require_byte(&mut self) -> Result<u8, DecodeError> {
        self.next_byte()?.ok_or(DecodeError::UnexpectedEndOfStream)
    }

    fn require_u16(&mut self) -> Result<u16, DecodeError> {
        let hi = self.require_byte()?;
        let lo = self.require_byte()?;
        Ok(u16::from_be_bytes([hi, lo]))
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        for b in buf.iter_mut() {
            *b = self.require_byte()?;
        }
        Ok(())
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        for _ in 0..n {
            self.require_byte()?;
        }
        Ok(())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    #[inline]
    fn next_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        (**self).next_byte()
    }
}

/// Reads from an in-memory slice.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceSource<'_> {
    #[inline]
    fn next_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        let b = self.data.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }

    fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        if self.data.len() - self.pos < n {
            self.pos = self.data.len();
            return Err(DecodeError::UnexpectedEndOfStream);
        }
        self.pos += n;
        Ok(())
    }
}

/// Reads through `read_fn(offset, buf) -> bytes read`, buffering
/// `CHUNK_SIZE` bytes at a time. A zero-length read ends the stream.
pub struct ChunkSource<F> {
    read_fn: F,
    offset: u32, // absolute offset of next byte to fetch
    end: u32,    // end-of-data offset (exclusive)
    buf: [u8; CHUNK_SIZE],
    pos: usize,
    len: usize,
}

impl<F> ChunkSource<F>
where
    F: FnMut(u32, &mut [u8]) -> Result<usize, &'static str>,
{
    pub fn new(read_fn: F, start: u32, end: u32) -> Self {
        Self {
            read_fn,
            offset: start,
            end,
            buf: [0u8; CHUNK_SIZE],
            pos: 0,
            len: 0,
        }
    }

    fn refill(&mut self) -> Result<(), DecodeError> {
        self.pos = 0;
        self.len = 0;
        if self.offset >= self.end {
            return Ok(());
        }
        let want = CHUNK_SIZE.min((self.end - self.offset) as usize);
        let n = (self.read_fn)(self.offset, &mut self.buf[..want]).map_err(DecodeError::Source)?;
        let n = n.min(want);
        self.offset += n as u32;
        self.len = n;
        Ok(())
    }
}

impl<F> ByteSource for ChunkSource<F>
where
    F: FnMut(u32, &mut [u8]) -> Result<usize, &'static str>,
{
    fn next_byte(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.pos >= self.len {
            self.refill()?;
            if self.len == 0 {
                return Ok(None);
            }
        }
        let b = self.buf[self.pos];
        self.pos += 1;
        Ok(Some(b))
    }
}
