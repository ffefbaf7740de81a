// JPEG marker parsing (ITU T.81 Annex B).
//
// Streams the header one byte at a time from a ByteSource, stopping right
// after the SOS segment so the same source continues with entropy data.
// APPn/COM and other segments we do not need are skipped by length, so
// large EXIF blocks cost no memory.

use alloc::boxed::Box;

use crate::error::DecodeError;
use crate::huffman::HuffmanTable;
use crate::source::ByteSource;

// marker bytes

const M_SOF0: u8 = 0xC0;
const M_DHT: u8 = 0xC4;
const M_DAC: u8 = 0xCC;
const M_SOI: u8 = 0xD8;
const M_EOI: u8 = 0xD9;
const M_SOS: u8 = 0xDA;
const M_DQT: u8 = 0xDB;
const M_DRI: u8 = 0xDD;
const M_TEM: u8 = 0x01;

pub const MAX_COMPONENTS: usize = 3;

// T.81 B.2.3: blocks per MCU in an interleaved scan
const MAX_BLOCKS_PER_MCU: u32 = 10;

/// Frame component as declared in SOF and bound to tables in SOS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Component {
    pub id: u8,
    pub h: u8,
    pub v: u8,
    /// quantization table selector
    pub tq: u8,
    /// DC / AC Huffman table selectors
    pub td: u8,
    pub ta: u8,
}

/// Everything needed to decode the scan. Immutable once `parse` returns.
pub struct JpegHeader {
    pub(crate) width: u16,
    pub(crate) height: u16,
    pub(crate) num_components: u8,
    pub(crate) components: [Component; MAX_COMPONENTS],
    pub(crate) max_h: u8,
    pub(crate) max_v: u8,
    // zig-zag order, as stored in DQT
    pub(crate) qt: [Option<[u16; 64]>; 4],
    pub(crate) dc_tables: [Option<Box<HuffmanTable>>; 4],
    pub(crate) ac_tables: [Option<Box<HuffmanTable>>; 4],
    pub(crate) restart_interval: u16,
    pub(crate) scan_components: u8,
    // frame component index for each scan component
    pub(crate) scan_order: [u8; MAX_COMPONENTS],
}

impl JpegHeader {
    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn components(&self) -> &[Component] {
        &self.components[..self.num_components as usize]
    }

    pub fn is_grayscale(&self) -> bool {
        self.num_components == 1
    }

    /// MCU size in pixels.
    pub fn mcu_size(&self) -> (u16, u16) {
        (self.max_h as u16 * 8, self.max_v as u16 * 8)
    }

    /// MCU columns and rows covering the frame.
    pub fn mcu_grid(&self) -> (u16, u16) {
        let (mw, mh) = self.mcu_size();
        (self.width.div_ceil(mw), self.height.div_ceil(mh))
    }

    pub fn restart_interval(&self) -> u16 {
        self.restart_interval
    }

    /// Scan component order as frame component indices.
    pub fn scan_order(&self) -> &[u8] {
        &self.scan_order[..self.scan_components as usize]
    }

    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            num_components: 0,
            components: [Component::default(); MAX_COMPONENTS],
            max_h: 1,
            max_v: 1,
            qt: [None; 4],
            dc_tables: [None, None, None, None],
            ac_tables: [None, None, None, None],
            restart_interval: 0,
            scan_components: 0,
            scan_order: [0; MAX_COMPONENTS],
        }
    }

    /// Parse SOI through SOS. On success the source is positioned at the
    /// first byte of entropy-coded data.
    pub fn parse<R: ByteSource>(src: &mut R) -> Result<Self, DecodeError> {
        if src.require_byte()? != 0xFF || src.require_byte()? != M_SOI {
            return Err(DecodeError::Malformed("missing SOI marker"));
        }

        let mut hdr = Self::empty();
        let mut have_frame = false;

        loop {
            let marker = next_marker(src)?;
            match marker {
                M_SOF0 => {
                    if have_frame {
                        return Err(DecodeError::Malformed("duplicate SOF"));
                    }
                    hdr.parse_sof(src)?;
                    have_frame = true;
                }
                0xC1 => return Err(DecodeError::UnsupportedFormat("extended sequential (SOF1)")),
                0xC2 => return Err(DecodeError::UnsupportedFormat("progressive (SOF2)")),
                0xC3 => return Err(DecodeError::UnsupportedFormat("lossless (SOF3)")),
                0xC5..=0xC7 | 0xCD..=0xCF => {
                    return Err(DecodeError::UnsupportedFormat("hierarchical (differential SOF)"));
                }
                0xC9..=0xCB | M_DAC => {
                    return Err(DecodeError::UnsupportedFormat("arithmetic coding"));
                }
                M_DHT => hdr.parse_dht(src)?,
                M_DQT => hdr.parse_dqt(src)?,
                M_DRI => hdr.parse_dri(src)?,
                M_SOS => {
                    if !have_frame {
                        return Err(DecodeError::Malformed("SOS before SOF"));
                    }
                    hdr.parse_sos(src)?;
                    hdr.validate_tables()?;
                    log::debug!(
                        "jpeg: header {}x{} comps={} mcu={}x{} ri={}",
                        hdr.width,
                        hdr.height,
                        hdr.num_components,
                        hdr.max_h * 8,
                        hdr.max_v * 8,
                        hdr.restart_interval
                    );
                    return Ok(hdr);
                }
                M_EOI => return Err(DecodeError::Malformed("EOI before SOS")),
                // standalone markers carry no length
                M_TEM | 0xD0..=0xD7 => {}
                _ => {
                    let len = segment_len(src)?;
                    src.skip(len)?;
                }
            }
        }
    }

    fn parse_sof<R: ByteSource>(&mut self, src: &mut R) -> Result<(), DecodeError> {
        let len = segment_len(src)?;
        let precision = src.require_byte()?;
        if precision != 8 {
            return Err(DecodeError::UnsupportedFormat("sample precision other than 8 bits"));
        }
        self.height = src.require_u16()?;
        self.width = src.require_u16()?;
        let n = src.require_byte()?;
        match n {
            1 | 3 => {}
            4 => return Err(DecodeError::UnsupportedFormat("4-component (CMYK) image")),
            0 => return Err(DecodeError::Malformed("SOF without components")),
            _ => return Err(DecodeError::UnsupportedFormat("component count other than 1 or 3")),
        }
        if len != 6 + 3 * n as usize {
            return Err(DecodeError::Malformed("bad SOF length"));
        }
        if self.width == 0 {
            return Err(DecodeError::Malformed("zero image width"));
        }
        if self.height == 0 {
            return Err(DecodeError::UnsupportedFormat("height defined by DNL"));
        }

        self.num_components = n;
        self.max_h = 1;
        self.max_v = 1;
        let mut blocks = 0u32;
        for i in 0..n as usize {
            let id = src.require_byte()?;
            let samp = src.require_byte()?;
            let tq = src.require_byte()?;
            let (h, v) = (samp >> 4, samp & 0x0F);
            if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
                return Err(DecodeError::Malformed("sampling factor out of range"));
            }
            if tq > 3 {
                return Err(DecodeError::Malformed("quantization table selector out of range"));
            }
            if self.components[..i].iter().any(|c| c.id == id) {
                return Err(DecodeError::Malformed("duplicate component id"));
            }
            self.components[i] = Component {
                id,
                h,
                v,
                tq,
                td: 0,
                ta: 0,
            };
            self.max_h = self.max_h.max(h);
            self.max_v = self.max_v.max(v);
            blocks += h as u32 * v as u32;
        }

        if n == 1 {
            // a single-component scan is non-interleaved: one block per MCU
            self.components[0].h = 1;
            self.components[0].v = 1;
            self.max_h = 1;
            self.max_v = 1;
        } else if blocks > MAX_BLOCKS_PER_MCU {
            return Err(DecodeError::Malformed("too many blocks per MCU"));
        }
        Ok(())
    }

    fn parse_dqt<R: ByteSource>(&mut self, src: &mut R) -> Result<(), DecodeError> {
        let mut remaining = segment_len(src)?;
        while remaining > 0 {
            let info = src.require_byte()?;
            let (pq, tq) = (info >> 4, (info & 0x0F) as usize);
            if tq > 3 {
                return Err(DecodeError::Malformed("DQT id out of range"));
            }
            let entry = match pq {
                0 => 64,
                1 => 128,
                _ => return Err(DecodeError::Malformed("DQT precision")),
            };
            remaining = remaining
                .checked_sub(1 + entry)
                .ok_or(DecodeError::Malformed("DQT truncated"))?;

            let mut table = [0u16; 64];
            for q in table.iter_mut() {
                *q = if pq == 0 {
                    src.require_byte()? as u16
                } else {
                    src.require_u16()?
                };
            }
            self.qt[tq] = Some(table);
        }
        Ok(())
    }

    fn parse_dht<R: ByteSource>(&mut self, src: &mut R) -> Result<(), DecodeError> {
        let mut remaining = segment_len(src)?;
        while remaining > 0 {
            remaining = remaining
                .checked_sub(17)
                .ok_or(DecodeError::Malformed("DHT truncated"))?;
            let info = src.require_byte()?;
            let (class, id) = (info >> 4, (info & 0x0F) as usize);
            if class > 1 || id > 3 {
                return Err(DecodeError::Malformed("DHT class or id out of range"));
            }
            let mut counts = [0u8; 16];
            src.read_exact(&mut counts)?;
            let total: usize = counts.iter().map(|&c| c as usize).sum();
            if total > 256 {
                return Err(DecodeError::Malformed("Huffman table has more than 256 codes"));
            }
            remaining = remaining
                .checked_sub(total)
                .ok_or(DecodeError::Malformed("DHT truncated"))?;

            let mut symbols = [0u8; 256];
            src.read_exact(&mut symbols[..total])?;
            let table = Box::new(HuffmanTable::build(&counts, &symbols[..total])?);
            if class == 0 {
                self.dc_tables[id] = Some(table);
            } else {
                self.ac_tables[id] = Some(table);
            }
        }
        Ok(())
    }

    fn parse_dri<R: ByteSource>(&mut self, src: &mut R) -> Result<(), DecodeError> {
        if segment_len(src)? != 2 {
            return Err(DecodeError::Malformed("bad DRI length"));
        }
        self.restart_interval = src.require_u16()?;
        Ok(())
    }

    fn parse_sos<R: ByteSource>(&mut self, src: &mut R) -> Result<(), DecodeError> {
        let len = segment_len(src)?;
        let ns = src.require_byte()?;
        if ns == 0 || ns > self.num_components {
            return Err(DecodeError::Malformed("bad SOS component count"));
        }
        if len != 4 + 2 * ns as usize {
            return Err(DecodeError::Malformed("bad SOS length"));
        }
        if ns < self.num_components {
            return Err(DecodeError::UnsupportedFormat("non-interleaved multi-scan image"));
        }

        for i in 0..ns as usize {
            let cs = src.require_byte()?;
            let tables = src.require_byte()?;
            let (td, ta) = (tables >> 4, tables & 0x0F);
            if td > 3 || ta > 3 {
                return Err(DecodeError::Malformed("Huffman table selector out of range"));
            }
            let idx = self.components[..self.num_components as usize]
                .iter()
                .position(|c| c.id == cs)
                .ok_or(DecodeError::Malformed("SOS references unknown component"))?;
            if self.scan_order[..i].contains(&(idx as u8)) {
                return Err(DecodeError::Malformed("component repeated in SOS"));
            }
            self.components[idx].td = td;
            self.components[idx].ta = ta;
            self.scan_order[i] = idx as u8;
        }
        self.scan_components = ns;

        let ss = src.require_byte()?;
        let se = src.require_byte()?;
        let ah_al = src.require_byte()?;
        if ss != 0 || se != 63 || ah_al != 0 {
            return Err(DecodeError::UnsupportedFormat("spectral selection or successive approximation"));
        }
        Ok(())
    }

    fn validate_tables(&self) -> Result<(), DecodeError> {
        for &ci in self.scan_order() {
            let c = &self.components[ci as usize];
            if self.qt[c.tq as usize].is_none() {
                return Err(DecodeError::Malformed("missing quantization table"));
            }
            if self.dc_tables[c.td as usize].is_none() {
                return Err(DecodeError::Malformed("missing DC Huffman table"));
            }
            if self.ac_tables[c.ta as usize].is_none() {
                return Err(DecodeError::Malformed("missing AC Huffman table"));
            }
        }
        Ok(())
    }
}

// next marker code, skipping any garbage and 0xFF fill bytes before it
fn next_marker<R: ByteSource>(src: &mut R) -> Result<u8, DecodeError> {
    loop {
        while src.require_byte()? != 0xFF {}
        let mut b = src.require_byte()?;
        while b == 0xFF {
            b = src.require_byte()?;
        }
        if b != 0x00 {
            return Ok(b);
        }
    }
}

// segment payload length, excluding the two length bytes
fn segment_len<R: ByteSource>(src: &mut R) -> Result<usize, DecodeError> {
    let len = src.require_u16()? as usize;
    len.checked_sub(2)
        .ok_or(DecodeError::Malformed("segment length < 2"))
}
