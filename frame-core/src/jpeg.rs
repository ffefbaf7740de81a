//! Baseline JPEG decoder.
//!
//! Pulls bytes from a [`ByteSource`], decodes one MCU at a time in raster
//! order and hands each finished MCU to a [`TileSink`] as an RGB888
//! [`PixelTile`]. Peak memory is the header tables plus two MCU-sized
//! pixel buffers, independent of image size.
//!
//! ```text
//! Unopened --open()--> HeaderParsed --decode()--> Decoding --> Complete
//!     \                     \                        \
//!      +---------------------+------------------------+--> Failed
//! ```
//!
//! Any error leaves the decoder in `Failed`; further calls return
//! `InvalidState`.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::bitreader::{BitReader, M_RST0, M_RST7};
use crate::blit::TileSink;
use crate::color::ycbcr_to_rgb;
use crate::error::{BlitError, DecodeError};
use crate::header::{JpegHeader, MAX_COMPONENTS};
use crate::huffman::HuffmanTable;
use crate::idct;
use crate::source::ByteSource;
use crate::tile::PixelTile;

// zig-zag scan order

#[rustfmt::skip]
const ZZ: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Unopened,
    HeaderParsed,
    Decoding,
    Complete,
    Failed,
}

/// Power-of-two output reduction, applied as a box average per tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scale {
    #[default]
    Full,
    Half,
    Quarter,
    Eighth,
}

impl Scale {
    pub const ALL: [Scale; 4] = [Scale::Full, Scale::Half, Scale::Quarter, Scale::Eighth];

    pub const fn divisor(self) -> u16 {
        match self {
            Scale::Full => 1,
            Scale::Half => 2,
            Scale::Quarter => 4,
            Scale::Eighth => 8,
        }
    }

    /// Output dimensions for a `width` x `height` source.
    pub fn apply(self, width: u16, height: u16) -> (u16, u16) {
        let d = self.divisor();
        (width.div_ceil(d), height.div_ceil(d))
    }

    /// Mildest reduction whose output fits `max_w` x `max_h`; `Eighth` if
    /// nothing fits.
    pub fn fit(width: u16, height: u16, max_w: u16, max_h: u16) -> Scale {
        Scale::ALL
            .into_iter()
            .find(|s| {
                let (w, h) = s.apply(width, height);
                w <= max_w && h <= max_h
            })
            .unwrap_or(Scale::Eighth)
    }
}

/// Statistics of a completed decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeSummary {
    /// output size after scaling
    pub width: u16,
    pub height: u16,
    pub mcus: u32,
    pub tiles_written: u32,
    /// tiles the sink reported as entirely out of bounds
    pub tiles_skipped: u32,
}

pub struct JpegDecoder<R> {
    reader: BitReader<R>,
    header: Option<JpegHeader>,
    scale: Scale,
    state: DecoderState,
}

impl<R: ByteSource> JpegDecoder<R> {
    pub fn new(source: R) -> Self {
        Self::with_scale(source, Scale::Full)
    }

    pub fn with_scale(source: R, scale: Scale) -> Self {
        Self {
            reader: BitReader::new(source),
            header: None,
            scale,
            state: DecoderState::Unopened,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn header(&self) -> Option<&JpegHeader> {
        self.header.as_ref()
    }

    pub fn scale(&self) -> Scale {
        self.scale
    }

    /// Change the output scale; only before decoding starts.
    pub fn set_scale(&mut self, scale: Scale) -> Result<(), DecodeError> {
        match self.state {
            DecoderState::Unopened | DecoderState::HeaderParsed => {
                self.scale = scale;
                Ok(())
            }
            _ => Err(DecodeError::InvalidState),
        }
    }

    /// Output dimensions once the header is known.
    pub fn output_size(&self) -> Option<(u16, u16)> {
        self.header
            .as_ref()
            .map(|h| self.scale.apply(h.width, h.height))
    }

    pub fn open(&mut self) -> Result<&JpegHeader, DecodeError> {
        if self.state != DecoderState::Unopened {
            return Err(DecodeError::InvalidState);
        }
        match JpegHeader::parse(self.reader.source_mut()) {
            Ok(h) => {
                self.state = DecoderState::HeaderParsed;
                let h: &JpegHeader = self.header.insert(h);
                Ok(h)
            }
            Err(e) => {
                log::warn!("jpeg: header rejected: {}", e);
                self.state = DecoderState::Failed;
                Err(e)
            }
        }
    }

    pub fn decode<S: TileSink>(&mut self, sink: &mut S) -> Result<DecodeSummary, DecodeError> {
        self.run(sink, None)
    }

    /// Like `decode`, checking `cancel` before every MCU.
    pub fn decode_cancellable<S: TileSink>(
        &mut self,
        sink: &mut S,
        cancel: &AtomicBool,
    ) -> Result<DecodeSummary, DecodeError> {
        self.run(sink, Some(cancel))
    }

    fn run<S: TileSink>(
        &mut self,
        sink: &mut S,
        cancel: Option<&AtomicBool>,
    ) -> Result<DecodeSummary, DecodeError> {
        if self.state == DecoderState::Unopened {
            self.open()?;
        }
        if self.state != DecoderState::HeaderParsed {
            return Err(DecodeError::InvalidState);
        }
        let Some(header) = self.header.as_ref() else {
            return Err(DecodeError::InvalidState);
        };

        self.state = DecoderState::Decoding;
        match decode_scan(header, &mut self.reader, self.scale, sink, cancel) {
            Ok(summary) => {
                self.state = DecoderState::Complete;
                Ok(summary)
            }
            Err(e) => {
                self.state = DecoderState::Failed;
                match e {
                    DecodeError::Cancelled => log::info!("jpeg: decode cancelled"),
                    _ => log::warn!("jpeg: decode failed: {}", e),
                }
                Err(e)
            }
        }
    }
}

/// One decoder bound to one sink for one image.
pub struct DecodeSession<'a, R, S> {
    decoder: JpegDecoder<R>,
    sink: &'a mut S,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, R: ByteSource, S: TileSink> DecodeSession<'a, R, S> {
    pub fn new(decoder: JpegDecoder<R>, sink: &'a mut S) -> Self {
        Self {
            decoder,
            sink,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn decoder(&self) -> &JpegDecoder<R> {
        &self.decoder
    }

    /// Decode to completion. The decoder is returned so callers can inspect
    /// its final state.
    pub fn run(mut self) -> (JpegDecoder<R>, Result<DecodeSummary, DecodeError>) {
        let result = self.decoder.run(self.sink, self.cancel);
        (self.decoder, result)
    }
}

// MCU loop

struct Plane {
    // block columns and rows of this component within one MCU
    h: usize,
    v: usize,
    samples: Vec<u8>,
}

fn decode_scan<R: ByteSource, S: TileSink>(
    hdr: &JpegHeader,
    reader: &mut BitReader<R>,
    scale: Scale,
    sink: &mut S,
    cancel: Option<&AtomicBool>,
) -> Result<DecodeSummary, DecodeError> {
    let (w, h) = (hdr.width as usize, hdr.height as usize);
    let (mcu_w, mcu_h) = (hdr.max_h as usize * 8, hdr.max_v as usize * 8);
    let (mcus_x, mcus_y) = (w.div_ceil(mcu_w), h.div_ceil(mcu_h));
    let total = (mcus_x * mcus_y) as u32;
    let (out_w, out_h) = scale.apply(hdr.width, hdr.height);
    let div = scale.divisor() as usize;

    log::info!(
        "jpeg: baseline {}x{} comps={} -> {}x{} ({} MCUs)",
        w,
        h,
        hdr.num_components,
        out_w,
        out_h,
        total
    );

    let n = hdr.num_components as usize;
    let mut planes: [Option<Plane>; MAX_COMPONENTS] = [None, None, None];
    for (slot, c) in planes.iter_mut().zip(hdr.components()) {
        let (ch, cv) = (c.h as usize, c.v as usize);
        *slot = Some(Plane {
            h: ch,
            v: cv,
            samples: vec![0u8; ch * 8 * cv * 8],
        });
    }

    // tables resolved once; presence checked by the header parser
    let mut tables: [Option<(&HuffmanTable, &HuffmanTable, &[u16; 64])>; MAX_COMPONENTS] =
        [None, None, None];
    for (slot, c) in tables.iter_mut().zip(hdr.components()) {
        match (
            hdr.dc_tables[c.td as usize].as_deref(),
            hdr.ac_tables[c.ta as usize].as_deref(),
            hdr.qt[c.tq as usize].as_ref(),
        ) {
            (Some(dc), Some(ac), Some(qt)) => *slot = Some((dc, ac, qt)),
            _ => return Err(DecodeError::Malformed("missing table")),
        }
    }

    let mut rgb = vec![0u8; mcu_w * mcu_h * 3];
    let mut scaled = if div > 1 {
        vec![0u8; mcu_w.div_ceil(div) * mcu_h.div_ceil(div) * 3]
    } else {
        Vec::new()
    };

    let mut preds = [0i32; MAX_COMPONENTS];
    let mut coef = [0i32; 64];
    let mut pix = [0u8; 64];
    let mut mcus = 0u32;
    let mut next_rst = 0u8;
    let mut written = 0u32;
    let mut skipped = 0u32;

    for my in 0..mcus_y {
        for mx in 0..mcus_x {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return Err(DecodeError::Cancelled);
            }

            for &ci in hdr.scan_order() {
                let ci = ci as usize;
                let (Some(plane), Some((dc, ac, qt))) = (planes[ci].as_mut(), tables[ci]) else {
                    return Err(DecodeError::InvalidState);
                };
                let stride = plane.h * 8;
                for bv in 0..plane.v {
                    for bh in 0..plane.h {
                        decode_block(reader, dc, ac, &mut preds[ci], qt, &mut coef)
                            .map_err(scan_error)?;
                        idct::transform(&coef, &mut pix);
                        for r in 0..8 {
                            let dst = (bv * 8 + r) * stride + bh * 8;
                            plane.samples[dst..dst + 8].copy_from_slice(&pix[r * 8..r * 8 + 8]);
                        }
                    }
                }
            }

            mcus += 1;

            // clip to the image
            let (x0, y0) = (mx * mcu_w, my * mcu_h);
            let cw = mcu_w.min(w - x0);
            let chh = mcu_h.min(h - y0);
            color_convert(&planes[..n], hdr.max_h as usize, hdr.max_v as usize, cw, chh, &mut rgb);

            let tile = if div == 1 {
                PixelTile::new(x0 as u16, y0 as u16, cw as u16, chh as u16, &rgb[..cw * chh * 3])
            } else {
                let (tw, th) = box_downscale(&rgb, cw, chh, div, &mut scaled);
                PixelTile::new(
                    (x0 / div) as u16,
                    (y0 / div) as u16,
                    tw as u16,
                    th as u16,
                    &scaled[..tw * th * 3],
                )
            };

            match sink.write_tile(&tile) {
                Ok(()) => written += 1,
                Err(BlitError::OutOfBounds) => {
                    log::trace!("jpeg: tile at {},{} out of bounds", tile.x, tile.y);
                    skipped += 1;
                }
                Err(BlitError::Target(e)) => {
                    log::warn!("jpeg: sink rejected tile at {},{}: {:?}", tile.x, tile.y, e);
                    return Err(DecodeError::Sink);
                }
            }

            if hdr.restart_interval > 0
                && mcus % hdr.restart_interval as u32 == 0
                && mcus < total
            {
                reader.restart(next_rst)?;
                next_rst = (next_rst + 1) & 7;
                preds.fill(0);
            }
        }
    }

    Ok(DecodeSummary {
        width: out_w,
        height: out_h,
        mcus,
        tiles_written: written,
        tiles_skipped: skipped,
    })
}

// markers met while MCU data is still expected
fn scan_error(e: DecodeError) -> DecodeError {
    match e {
        DecodeError::StreamMarkerEncountered(m) if (M_RST0..=M_RST7).contains(&m) => {
            DecodeError::RestartMarkerMismatch
        }
        DecodeError::StreamMarkerEncountered(_) => DecodeError::UnexpectedEndOfStream,
        other => other,
    }
}

// Huffman-decode one block, dequantize and de-zigzag into `block`
fn decode_block<R: ByteSource>(
    r: &mut BitReader<R>,
    dc: &HuffmanTable,
    ac: &HuffmanTable,
    pred: &mut i32,
    qt: &[u16; 64],
    block: &mut [i32; 64],
) -> Result<(), DecodeError> {
    block.fill(0);

    let t = dc.decode_symbol(r)?;
    if t > 11 {
        return Err(DecodeError::Malformed("DC magnitude category > 11"));
    }
    *pred = pred.wrapping_add(r.receive_extend(t)?);
    block[0] = pred.saturating_mul(qt[0] as i32);

    let mut k = 1usize;
    while k < 64 {
        let rs = ac.decode_symbol(r)?;
        let (run, size) = ((rs >> 4) as usize, rs & 0x0F);
        if size == 0 {
            if run != 15 {
                break; // EOB
            }
            k += 16; // ZRL
            if k > 64 {
                return Err(DecodeError::Malformed("AC run past end of block"));
            }
            continue;
        }
        k += run;
        if k > 63 {
            return Err(DecodeError::Malformed("AC run past end of block"));
        }
        block[ZZ[k]] = r.receive_extend(size)?.saturating_mul(qt[k] as i32);
        k += 1;
    }
    Ok(())
}

// Upsample (nearest neighbour) and convert the clipped MCU region to RGB888.
fn color_convert(
    planes: &[Option<Plane>],
    max_h: usize,
    max_v: usize,
    cw: usize,
    ch: usize,
    out: &mut [u8],
) {
    let sample = |plane: &Plane, x: usize, y: usize| -> u8 {
        let sx = x * plane.h / max_h;
        let sy = y * plane.v / max_v;
        plane.samples[sy * plane.h * 8 + sx]
    };

    match planes {
        [Some(luma)] => {
            for y in 0..ch {
                for x in 0..cw {
                    let v = sample(luma, x, y);
                    let o = (y * cw + x) * 3;
                    out[o..o + 3].copy_from_slice(&[v, v, v]);
                }
            }
        }
        [Some(luma), Some(cb), Some(cr)] => {
            for y in 0..ch {
                for x in 0..cw {
                    let px = ycbcr_to_rgb(sample(luma, x, y), sample(cb, x, y), sample(cr, x, y));
                    let o = (y * cw + x) * 3;
                    out[o..o + 3].copy_from_slice(&px);
                }
            }
        }
        _ => {}
    }
}

// Box-average `src` (cw x ch RGB888) by `div` into `dst`; returns the
// reduced size. Partial boxes at the image edge average what exists.
fn box_downscale(src: &[u8], cw: usize, ch: usize, div: usize, dst: &mut [u8]) -> (usize, usize) {
    let (tw, th) = (cw.div_ceil(div), ch.div_ceil(div));
    for ty in 0..th {
        for tx in 0..tw {
            let mut acc = [0u32; 3];
            let mut count = 0u32;
            for y in ty * div..((ty + 1) * div).min(ch) {
                for x in tx * div..((tx + 1) * div).min(cw) {
                    let i = (y * cw + x) * 3;
                    acc[0] += src[i] as u32;
                    acc[1] += src[i + 1] as u32;
                    acc[2] += src[i + 2] as u32;
                    count += 1;
                }
            }
            let o = (ty * tw + tx) * 3;
            for c in 0..3 {
                dst[o + c] = ((acc[c] + count / 2) / count) as u8;
            }
        }
    }
    (tw, th)
}
