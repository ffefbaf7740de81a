// Decoded pixel rectangle handed from the decoder to a TileSink.
//
// The pixel slice borrows the decoder's tile buffer, so a tile cannot
// outlive the write_tile call that receives it.

use embedded_graphics_core::geometry::{Point, Size};
use embedded_graphics_core::pixelcolor::Rgb888;
use embedded_graphics_core::primitives::Rectangle;

/// RGB888, row-major, `width * height * 3` bytes.
#[derive(Debug, Clone, Copy)]
pub struct PixelTile<'a> {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
    pixels: &'a [u8],
}

impl<'a> PixelTile<'a> {
    pub fn new(x: u16, y: u16, width: u16, height: u16, pixels: &'a [u8]) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 3);
        Self {
            x,
            y,
            width,
            height,
            pixels,
        }
    }

    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    /// Pixel at tile-local coordinates.
    #[inline]
    pub fn pixel(&self, col: u16, row: u16) -> Rgb888 {
        let i = (row as usize * self.width as usize + col as usize) * 3;
        Rgb888::new(self.pixels[i], self.pixels[i + 1], self.pixels[i + 2])
    }

    /// Placement in image coordinates.
    pub fn bounds(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.x as i32, self.y as i32),
            Size::new(self.width as u32, self.height as u32),
        )
    }
}
