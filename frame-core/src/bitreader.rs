// Entropy-coded segment bit reader.
//
// Bits are served MSB-first from a 32-bit left-aligned accumulator.
// 0xFF 0x00 is un-stuffed to a literal 0xFF, 0xFF fill bytes are skipped,
// and any other marker is stashed: the accumulator stops filling and
// further reads past the real bits fail with StreamMarkerEncountered.
// peek() pads with zero bits so the Huffman lookup can always index a
// full window near the end of a segment.

use crate::error::DecodeError;
use crate::source::ByteSource;

pub const M_RST0: u8 = 0xD0;
pub const M_RST7: u8 = 0xD7;

pub struct BitReader<R> {
    source: R,
    buf: u32,
    bits: u8,
    marker: Option<u8>,
    exhausted: bool,
}

impl<R: ByteSource> BitReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source,
            buf: 0,
            bits: 0,
            marker: None,
            exhausted: false,
        }
    }

    /// Byte-level access for header parsing; only valid while no bits are
    /// buffered (between segments).
    pub fn source_mut(&mut self) -> &mut R {
        debug_assert!(self.bits == 0, "bit buffer not drained");
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Marker that terminated the current segment, if one was reached.
    pub fn pending_marker(&self) -> Option<u8> {
        self.marker
    }

    // next entropy byte; None once a marker or the end of input is reached
    fn fetch(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.marker.is_some() || self.exhausted {
            return Ok(None);
        }
        let Some(b) = self.source.next_byte()? else {
            self.exhausted = true;
            return Ok(None);
        };
        if b != 0xFF {
            return Ok(Some(b));
        }
        loop {
            match self.source.next_byte()? {
                None => {
                    self.exhausted = true;
                    return Ok(None);
                }
                Some(0x00) => return Ok(Some(0xFF)),
                Some(0xFF) => continue,
                Some(m) => {
                    self.marker = Some(m);
                    return Ok(None);
                }
            }
        }
    }

    fn fill(&mut self, n: u8) -> Result<(), DecodeError> {
        while self.bits < n {
            let Some(b) = self.fetch()? else {
                break;
            };
            self.buf |= (b as u32) << (24 - self.bits);
            self.bits += 8;
        }
        Ok(())
    }

    fn past_end(&self) -> DecodeError {
        match self.marker {
            Some(m) => DecodeError::StreamMarkerEncountered(m),
            None => DecodeError::UnexpectedEndOfStream,
        }
    }

    /// Next `n` bits (n <= 16) without consuming them, zero-padded past
    /// the end of the segment.
    #[inline]
    pub fn peek(&mut self, n: u8) -> Result<u32, DecodeError> {
        debug_assert!(n > 0 && n <= 16);
        self.fill(n)?;
        Ok(self.buf >> (32 - n as u32))
    }

    /// Drop `n` bits previously inspected with `peek`.
    #[inline]
    pub fn consume(&mut self, n: u8) -> Result<(), DecodeError> {
        if n > self.bits {
            return Err(self.past_end());
        }
        self.buf = if n >= 32 { 0 } else { self.buf << n as u32 };
        self.bits -= n;
        Ok(())
    }

    pub fn next_bits(&mut self, n: u8) -> Result<u32, DecodeError> {
        if n == 0 {
            return Ok(0);
        }
        let v = self.peek(n)?;
        self.consume(n)?;
        Ok(v)
    }

    #[inline]
    pub fn next_bit(&mut self) -> Result<u32, DecodeError> {
        self.next_bits(1)
    }

    /// Sign-extended value of a `size`-bit magnitude category (F.2.2.1).
    pub fn receive_extend(&mut self, size: u8) -> Result<i32, DecodeError> {
        if size == 0 {
            return Ok(0);
        }
        if size > 16 {
            return Err(DecodeError::Malformed("coefficient size > 16"));
        }
        let bits = self.next_bits(size)?;
        Ok(extend(bits, size))
    }

    /// Discard the partial byte and consume restart marker `RST{expected}`.
    pub fn restart(&mut self, expected: u8) -> Result<(), DecodeError> {
        let want = M_RST0 + (expected & 7);
        // encoder padding never spans a whole byte
        let leftover = self.bits;
        self.buf = 0;
        self.bits = 0;
        if leftover >= 8 {
            log::warn!("jpeg: entropy data where RST{} expected", expected & 7);
            return Err(DecodeError::RestartMarkerMismatch);
        }

        let found = match self.marker.take() {
            Some(m) => Some(m),
            None => self.scan_marker()?,
        };
        match found {
            Some(m) if m == want => Ok(()),
            Some(m) => {
                log::warn!("jpeg: expected RST{}, found marker 0x{:02X}", expected & 7, m);
                if !(M_RST0..=M_RST7).contains(&m) {
                    self.marker = Some(m);
                }
                Err(DecodeError::RestartMarkerMismatch)
            }
            None => {
                log::warn!("jpeg: RST{} missing", expected & 7);
                Err(DecodeError::RestartMarkerMismatch)
            }
        }
    }

    // byte-aligned read of the next marker; None if data bytes come first
    fn scan_marker(&mut self) -> Result<Option<u8>, DecodeError> {
        if self.exhausted {
            return Ok(None);
        }
        match self.source.next_byte()? {
            Some(0xFF) => {}
            Some(_) => return Ok(None),
            None => {
                self.exhausted = true;
                return Ok(None);
            }
        }
        loop {
            match self.source.next_byte()? {
                Some(0xFF) => continue,
                Some(0x00) | None => return Ok(None),
                Some(m) => return Ok(Some(m)),
            }
        }
    }
}

#[inline]
pub fn extend(bits: u32, size: u8) -> i32 {
    let half = 1u32 << (size as u32 - 1);
    if bits < half {
        bits as i32 - ((1i32 << size as u32) - 1)
    } else {
        bits as i32
    }
}
