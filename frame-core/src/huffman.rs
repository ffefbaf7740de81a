// Canonical Huffman tables (ITU T.81 Annex C) and symbol decoding.
//
// Codes up to LOOKUP_BITS long resolve with a single table lookup; longer
// codes fall back to the canonical maxcode/valoffset walk (F.2.2.3).
// Tables are built once per DHT segment and never modified afterwards.

use crate::bitreader::BitReader;
use crate::error::DecodeError;
use crate::source::ByteSource;

pub const LOOKUP_BITS: u8 = 9;
const LOOKUP_SIZE: usize = 1 << LOOKUP_BITS;

#[derive(Clone)]
pub struct HuffmanTable {
    // (code length << 8) | symbol; 0 = not resolvable by lookup
    lookup: [u16; LOOKUP_SIZE],
    // largest code of each length, -1 if none
    maxcode: [i32; 17],
    // index into `values` minus the first code of each length
    valoffset: [i32; 17],
    values: [u8; 256],
}

impl HuffmanTable {
    /// Build from the 16 code-length counts and the symbol list of a DHT
    /// entry.
    pub fn build(counts: &[u8; 16], symbols: &[u8]) -> Result<Self, DecodeError> {
        let total: usize = counts.iter().map(|&c| c as usize).sum();
        if total > 256 {
            return Err(DecodeError::Malformed("Huffman table has more than 256 codes"));
        }
        if symbols.len() < total {
            return Err(DecodeError::Malformed("Huffman table truncated"));
        }

        let mut table = HuffmanTable {
            lookup: [0; LOOKUP_SIZE],
            maxcode: [-1; 17],
            valoffset: [0; 17],
            values: [0; 256],
        };
        table.values[..total].copy_from_slice(&symbols[..total]);

        let mut code: u32 = 0;
        let mut k: usize = 0;
        for len in 1..=16usize {
            let n = counts[len - 1] as usize;
            // codes of this length must fit in `len` bits
            if code as usize + n > 1 << len {
                return Err(DecodeError::Malformed("over-subscribed Huffman table"));
            }
            if n > 0 {
                table.valoffset[len] = k as i32 - code as i32;
                for _ in 0..n {
                    if len <= LOOKUP_BITS as usize {
                        let shift = LOOKUP_BITS as usize - len;
                        let first = (code as usize) << shift;
                        let entry = ((len as u16) << 8) | table.values[k] as u16;
                        table.lookup[first..first + (1 << shift)].fill(entry);
                    }
                    code += 1;
                    k += 1;
                }
                table.maxcode[len] = code as i32 - 1;
            }
            code <<= 1;
        }
        Ok(table)
    }

    /// Decode one symbol from the entropy-coded segment.
    pub fn decode_symbol<R: ByteSource>(&self, r: &mut BitReader<R>) -> Result<u8, DecodeError> {
        let peek = r.peek(LOOKUP_BITS)? as usize;
        let entry = self.lookup[peek];
        if entry != 0 {
            r.consume((entry >> 8) as u8)?;
            return Ok(entry as u8);
        }
        self.decode_slow(r)
    }

    fn decode_slow<R: ByteSource>(&self, r: &mut BitReader<R>) -> Result<u8, DecodeError> {
        let mut code: i32 = 0;
        for len in 1..=16usize {
            code = (code << 1) | r.next_bit()? as i32;
            if code <= self.maxcode[len] {
                let idx = self.valoffset[len] + code;
                return Ok(self.values[idx as usize]);
            }
        }
        Err(DecodeError::InvalidHuffmanCode)
    }
}
