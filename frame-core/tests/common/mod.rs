// Test-side baseline JPEG encoder and tile sinks.
//
// Quantization is all ones so the only losses are coefficient rounding
// and, for 4:2:0, chroma averaging. Huffman tables are generated here
// (not the Annex K ones) with long codes so the decoder's slow path is
// exercised too.

#![allow(dead_code)]

use std::f64::consts::PI;

use embedded_graphics_core::pixelcolor::RgbColor;
use frame_core::{BlitError, PixelTile, TileSink};

#[rustfmt::skip]
pub const ZZ: [usize; 64] = [
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
pub enum Layout {
    Gray,
    Yuv444,
    Yuv420,
}

/// Source image: 1 (gray) or 3 (RGB) bytes per pixel.
#[derive(Debug, Clone)]
pub struct Image {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub pixels: Vec<u8>,
}

impl Image {
    pub fn rgb(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * self.channels;
        if self.channels == 1 {
            [self.pixels[i]; 3]
        } else {
            [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
        }
    }
}

fn round(x: f64) -> i32 {
    (x + 0.5).floor() as i32
}

fn clamp8(x: i32) -> u8 {
    x.clamp(0, 255) as u8
}

pub fn gray_gradient(width: usize, height: usize) -> Image {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let (xf, yf) = (x as f64, y as f64);
            let v = 128.0 + 60.0 * (xf / 5.0).sin() * (yf / 7.0).cos() + xf - yf;
            pixels.push(clamp8(round(v)));
        }
    }
    Image {
        width,
        height,
        channels: 1,
        pixels,
    }
}

pub fn rgb_pattern(width: usize, height: usize) -> Image {
    let mut pixels = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        for x in 0..width {
            let (xf, yf) = (x as f64, y as f64);
            pixels.push(clamp8(round(40.0 + 4.0 * xf)));
            pixels.push(clamp8(round(200.0 - 3.0 * yf)));
            pixels.push(clamp8(round(128.0 + 50.0 * ((xf + yf) / 6.0).sin())));
        }
    }
    Image {
        width,
        height,
        channels: 3,
        pixels,
    }
}

// Huffman tables

struct Table {
    counts: [u8; 16],
    symbols: Vec<u8>,
    codes: [(u32, u32); 256],
}

impl Table {
    fn new(lengths: &[(u8, usize)]) -> Self {
        let mut counts = [0u8; 16];
        let mut symbols = Vec::new();
        for len in 1..=16 {
            for &(sym, l) in lengths {
                if l == len {
                    counts[len - 1] += 1;
                    symbols.push(sym);
                }
            }
        }
        let mut codes = [(0u32, 0u32); 256];
        let mut code = 0u32;
        let mut k = 0;
        for len in 1..=16u32 {
            for _ in 0..counts[len as usize - 1] {
                codes[symbols[k] as usize] = (code, len);
                code += 1;
                k += 1;
            }
            code <<= 1;
        }
        Self {
            counts,
            symbols,
            codes,
        }
    }

    fn dc() -> Self {
        let mut lengths = vec![(0u8, 2usize)];
        lengths.extend((1..=11u8).map(|s| (s, 4)));
        Self::new(&lengths)
    }

    fn ac() -> Self {
        let mut lengths = vec![(0x00u8, 2usize), (0xF0, 11)];
        for run in 0..16u8 {
            for size in 1..=10u8 {
                let len = if size <= 2 { 7 } else { 11 };
                lengths.push(((run << 4) | size, len));
            }
        }
        Self::new(&lengths)
    }

    fn segment_body(&self, class_id: u8) -> Vec<u8> {
        let mut v = vec![class_id];
        v.extend_from_slice(&self.counts);
        v.extend_from_slice(&self.symbols);
        v
    }
}

// entropy coder

struct BitWriter {
    out: Vec<u8>,
    acc: u32,
    n: u32,
}

impl BitWriter {
    fn put(&mut self, bits: u32, len: u32) {
        for i in (0..len).rev() {
            self.acc = (self.acc << 1) | ((bits >> i) & 1);
            self.n += 1;
            if self.n == 8 {
                let b = self.acc as u8;
                self.out.push(b);
                if b == 0xFF {
                    self.out.push(0x00);
                }
                self.acc = 0;
                self.n = 0;
            }
        }
    }

    fn flush(&mut self) {
        while self.n != 0 {
            self.put(1, 1);
        }
    }

    fn marker(&mut self, m: u8) {
        self.flush();
        self.out.extend_from_slice(&[0xFF, m]);
    }
}

fn magnitude(v: i32) -> (u32, u32) {
    if v == 0 {
        return (0, 0);
    }
    let size = 32 - v.unsigned_abs().leading_zeros();
    let bits = if v < 0 { (v - 1) as u32 & ((1 << size) - 1) } else { v as u32 };
    (size, bits)
}

fn fdct(samples: &[u8; 64]) -> [i32; 64] {
    let c = |u: usize| if u == 0 { std::f64::consts::FRAC_1_SQRT_2 } else { 1.0 };
    let mut cos = [[0f64; 8]; 8];
    for (u, row) in cos.iter_mut().enumerate() {
        for (x, v) in row.iter_mut().enumerate() {
            *v = (((2 * x + 1) * u) as f64 * PI / 16.0).cos();
        }
    }
    let mut out = [0i32; 64];
    for v in 0..8 {
        for u in 0..8 {
            let mut s = 0.0;
            for y in 0..8 {
                for x in 0..8 {
                    s += (samples[y * 8 + x] as f64 - 128.0) * cos[u][x] * cos[v][y];
                }
            }
            let lim = if u == 0 && v == 0 { 2047 } else { 1023 };
            out[v * 8 + u] = (0.25 * c(u) * c(v) * s).round().clamp(-lim as f64, lim as f64) as i32;
        }
    }
    out
}

fn encode_block(w: &mut BitWriter, samples: &[u8; 64], pred: &mut i32, dc: &Table, ac: &Table) {
    let coef = fdct(samples);
    let (size, bits) = magnitude(coef[0] - *pred);
    *pred = coef[0];
    let (code, len) = dc.codes[size as usize];
    w.put(code, len);
    w.put(bits, size);

    let mut run = 0u32;
    for &z in &ZZ[1..] {
        let v = coef[z];
        if v == 0 {
            run += 1;
            continue;
        }
        while run >= 16 {
            let (code, len) = ac.codes[0xF0];
            w.put(code, len);
            run -= 16;
        }
        let (size, bits) = magnitude(v);
        let (code, len) = ac.codes[((run << 4) | size) as usize];
        w.put(code, len);
        w.put(bits, size);
        run = 0;
    }
    if run > 0 {
        let (code, len) = ac.codes[0x00];
        w.put(code, len);
    }
}

struct Plane {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Plane {
    // 8x8 block at (x0, y0), edges replicated
    fn block(&self, x0: usize, y0: usize) -> [u8; 64] {
        let mut b = [0u8; 64];
        for y in 0..8 {
            for x in 0..8 {
                let sx = (x0 + x).min(self.width - 1);
                let sy = (y0 + y).min(self.height - 1);
                b[y * 8 + x] = self.data[sy * self.width + sx];
            }
        }
        b
    }

    // 2x2 average over the MCU-padded area
    fn downsample(&self, width: usize, height: usize) -> Plane {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let mut s = 0u32;
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let sx = (2 * x + dx).min(self.width - 1);
                    let sy = (2 * y + dy).min(self.height - 1);
                    s += self.data[sy * self.width + sx] as u32;
                }
                data.push(((s + 2) / 4) as u8);
            }
        }
        Plane {
            width,
            height,
            data,
        }
    }
}

fn planes(img: &Image) -> Vec<Plane> {
    let n = img.width * img.height;
    if img.channels == 1 {
        return vec![Plane {
            width: img.width,
            height: img.height,
            data: img.pixels.clone(),
        }];
    }
    let (mut y, mut cb, mut cr) = (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
    for px in img.pixels.chunks(3) {
        let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);
        y.push(clamp8(round(0.299 * r + 0.587 * g + 0.114 * b)));
        cb.push(clamp8(round(128.0 - 0.168736 * r - 0.331264 * g + 0.5 * b)));
        cr.push(clamp8(round(128.0 + 0.5 * r - 0.418688 * g - 0.081312 * b)));
    }
    [y, cb, cr]
        .into_iter()
        .map(|data| Plane {
            width: img.width,
            height: img.height,
            data,
        })
        .collect()
}

fn segment(out: &mut Vec<u8>, marker: u8, body: &[u8]) {
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((body.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(body);
}

/// Encode `img` as baseline JPEG. `restart_interval` 0 omits DRI.
pub fn encode(img: &Image, layout: Layout, restart_interval: u16) -> Vec<u8> {
    assert_eq!(layout == Layout::Gray, img.channels == 1);
    let dc = Table::dc();
    let ac = Table::ac();
    let (w, h) = (img.width, img.height);

    let mut out = vec![0xFF, 0xD8];
    segment(&mut out, 0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
    let mut dqt = vec![0x00];
    dqt.extend_from_slice(&[1u8; 64]);
    segment(&mut out, 0xDB, &dqt);

    let comps: &[(u8, u8)] = match layout {
        Layout::Gray => &[(1, 0x11)],
        Layout::Yuv444 => &[(1, 0x11), (2, 0x11), (3, 0x11)],
        Layout::Yuv420 => &[(1, 0x22), (2, 0x11), (3, 0x11)],
    };
    let mut sof = vec![8];
    sof.extend_from_slice(&(h as u16).to_be_bytes());
    sof.extend_from_slice(&(w as u16).to_be_bytes());
    sof.push(comps.len() as u8);
    for &(id, samp) in comps {
        sof.extend_from_slice(&[id, samp, 0]);
    }
    segment(&mut out, 0xC0, &sof);

    let mut dht = dc.segment_body(0x00);
    dht.extend(ac.segment_body(0x10));
    segment(&mut out, 0xC4, &dht);

    if restart_interval > 0 {
        segment(&mut out, 0xDD, &restart_interval.to_be_bytes());
    }

    let mut sos = vec![comps.len() as u8];
    for &(id, _) in comps {
        sos.extend_from_slice(&[id, 0x00]);
    }
    sos.extend_from_slice(&[0, 63, 0]);
    segment(&mut out, 0xDA, &sos);

    let mcu = if layout == Layout::Yuv420 { 16 } else { 8 };
    let (mcus_x, mcus_y) = (w.div_ceil(mcu), h.div_ceil(mcu));
    let mut planes = planes(img);
    if layout == Layout::Yuv420 {
        let (cw, ch) = (mcus_x * 8, mcus_y * 8);
        planes[1] = planes[1].downsample(cw, ch);
        planes[2] = planes[2].downsample(cw, ch);
    }

    let mut bw = BitWriter {
        out,
        acc: 0,
        n: 0,
    };
    let mut preds = [0i32; 3];
    let total = mcus_x * mcus_y;
    let mut count = 0;
    let mut rst = 0u8;
    for my in 0..mcus_y {
        for mx in 0..mcus_x {
            match layout {
                Layout::Gray | Layout::Yuv444 => {
                    for (ci, plane) in planes.iter().enumerate() {
                        encode_block(&mut bw, &plane.block(mx * 8, my * 8), &mut preds[ci], &dc, &ac);
                    }
                }
                Layout::Yuv420 => {
                    for bv in 0..2 {
                        for bh in 0..2 {
                            let b = planes[0].block(mx * 16 + bh * 8, my * 16 + bv * 8);
                            encode_block(&mut bw, &b, &mut preds[0], &dc, &ac);
                        }
                    }
                    for ci in 1..3 {
                        let b = planes[ci].block(mx * 8, my * 8);
                        encode_block(&mut bw, &b, &mut preds[ci], &dc, &ac);
                    }
                }
            }
            count += 1;
            if restart_interval > 0 && count % restart_interval as usize == 0 && count < total {
                bw.marker(0xD0 + rst);
                rst = (rst + 1) & 7;
                preds = [0; 3];
            }
        }
    }
    bw.marker(0xD9);
    bw.out
}

// stream surgery

/// Offset of the first `0xFF marker` pair.
pub fn find_marker(data: &[u8], marker: u8) -> Option<usize> {
    data.windows(2).position(|w| w == [0xFF, marker])
}

/// Drop every RSTn marker from the entropy data.
pub fn strip_restart_markers(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == 0xFF && i + 1 < data.len() && (0xD0..=0xD7).contains(&data[i + 1]) {
            i += 2;
            continue;
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

/// Remove a whole marker segment (marker, length and payload).
pub fn remove_segment(data: &[u8], marker: u8) -> Vec<u8> {
    let Some(at) = find_marker(data, marker) else {
        return data.to_vec();
    };
    let len = u16::from_be_bytes([data[at + 2], data[at + 3]]) as usize;
    let mut out = data[..at].to_vec();
    out.extend_from_slice(&data[at + 2 + len..]);
    out
}

// sinks

/// Paints tiles into an RGB888 canvas and records their placement.
pub struct CanvasSink {
    pub width: usize,
    pub height: usize,
    pub rgb: Vec<u8>,
    pub tiles: Vec<(u16, u16, u16, u16)>,
}

impl CanvasSink {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            rgb: vec![0; width * height * 3],
            tiles: Vec::new(),
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.rgb[i], self.rgb[i + 1], self.rgb[i + 2]]
    }

    /// Largest per-channel difference against `img`.
    pub fn max_error(&self, img: &Image) -> u8 {
        let mut worst = 0u8;
        for y in 0..img.height {
            for x in 0..img.width {
                let (a, b) = (self.pixel(x, y), img.rgb(x, y));
                for c in 0..3 {
                    worst = worst.max(a[c].abs_diff(b[c]));
                }
            }
        }
        worst
    }
}

impl TileSink for CanvasSink {
    type Error = &'static str;

    fn write_tile(&mut self, tile: &PixelTile<'_>) -> Result<(), BlitError<&'static str>> {
        self.tiles.push((tile.x, tile.y, tile.width, tile.height));
        for row in 0..tile.height {
            for col in 0..tile.width {
                let (x, y) = (tile.x as usize + col as usize, tile.y as usize + row as usize);
                if x >= self.width || y >= self.height {
                    return Err(BlitError::Target("tile outside canvas"));
                }
                let p = tile.pixel(col, row);
                let i = (y * self.width + x) * 3;
                self.rgb[i..i + 3].copy_from_slice(&[p.r(), p.g(), p.b()]);
            }
        }
        Ok(())
    }
}
