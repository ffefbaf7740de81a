// Tile sinks: where decoded pixels go.
//
// FrameBlitter places tiles on any embedded-graphics DrawTarget at an
// origin offset, clips them against the target's bounding box and
// converts RGB888 to the target's native colour on the way. Each tile is
// one fill_contiguous call, so bus-backed displays set the address window
// once per tile.

use alloc::vec;
use alloc::vec::Vec;
use core::convert::Infallible;
use core::fmt::Debug;

use embedded_graphics_core::Pixel;
use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{OriginDimensions, Point, Size};
use embedded_graphics_core::pixelcolor::{PixelColor, Rgb888};
use embedded_graphics_core::primitives::{PointsIter, Rectangle};

use crate::error::BlitError;
use crate::tile::PixelTile;

/// Consumer of decoded tiles.
pub trait TileSink {
    type Error: Debug;

    /// Write one tile. `BlitError::OutOfBounds` means nothing was
    /// written and the decoder may carry on.
    fn write_tile(&mut self, tile: &PixelTile<'_>) -> Result<(), BlitError<Self::Error>>;
}

impl<S: TileSink + ?Sized> TileSink for &mut S {
    type Error = S::Error;

    fn write_tile(&mut self, tile: &PixelTile<'_>) -> Result<(), BlitError<Self::Error>> {
        (**self).write_tile(tile)
    }
}

pub struct FrameBlitter<D> {
    target: D,
    origin: Point,
}

impl<D> FrameBlitter<D>
where
    D: DrawTarget,
    D::Color: From<Rgb888>,
{
    pub fn new(target: D) -> Self {
        Self {
            target,
            origin: Point::zero(),
        }
    }

    /// Place image pixel (0, 0) at `origin` on the target. Negative
    /// coordinates crop the image's top-left.
    pub fn with_origin(target: D, origin: Point) -> Self {
        Self { target, origin }
    }

    pub fn set_origin(&mut self, origin: Point) {
        self.origin = origin;
    }

    pub fn target(&mut self) -> &mut D {
        &mut self.target
    }

    pub fn into_inner(self) -> D {
        self.target
    }
}

impl<D> TileSink for FrameBlitter<D>
where
    D: DrawTarget,
    D::Color: From<Rgb888>,
    D::Error: Debug,
{
    type Error = D::Error;

    fn write_tile(&mut self, tile: &PixelTile<'_>) -> Result<(), BlitError<D::Error>> {
        let placed = Rectangle::new(tile.bounds().top_left + self.origin, tile.bounds().size);
        let clip = placed.intersection(&self.target.bounding_box());
        if clip.is_zero_sized() {
            return Err(BlitError::OutOfBounds);
        }

        let base = placed.top_left;
        let colors = clip.points().map(|p| {
            let local = p - base;
            D::Color::from(tile.pixel(local.x as u16, local.y as u16))
        });
        self.target
            .fill_contiguous(&clip, colors)
            .map_err(BlitError::Target)
    }
}

/// In-memory frame buffer, row-major. Doubles as a DrawTarget for
/// off-screen composition and as a test double for panels.
pub struct FrameBuffer<C> {
    size: Size,
    pixels: Vec<C>,
}

impl<C: PixelColor> FrameBuffer<C> {
    pub fn new(width: u32, height: u32, background: C) -> Self {
        Self {
            size: Size::new(width, height),
            pixels: vec![background; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<C> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.size.width as usize + x as usize)
            .copied()
    }

    pub fn pixels(&self) -> &[C] {
        &self.pixels
    }
}

impl<C: PixelColor> OriginDimensions for FrameBuffer<C> {
    fn size(&self) -> Size {
        self.size
    }
}

impl<C: PixelColor> DrawTarget for FrameBuffer<C> {
    type Color = C;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let (w, h) = (self.size.width as i32, self.size.height as i32);
        for Pixel(p, color) in pixels {
            if p.x >= 0 && p.y >= 0 && p.x < w && p.y < h {
                self.pixels[(p.y * w + p.x) as usize] = color;
            }
        }
        Ok(())
    }
}
