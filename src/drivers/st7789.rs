// ST7789 TFT driver (board-independent)
// Tested on 240x240 IPS modules. No framebuffer: every draw call opens a
// column/row window and streams big-endian RGB565 straight into panel RAM.
// The controller has 320 rows of RAM; the 240-row glass sits at the top,
// so rotations that flip Y shift the window by ROW_OFFSET.

use embedded_graphics_core::draw_target::DrawTarget;
use embedded_graphics_core::geometry::{Dimensions, OriginDimensions, Point, Size};
use embedded_graphics_core::pixelcolor::{IntoStorage, Rgb565};
use embedded_graphics_core::primitives::{PointsIter, Rectangle};
use embedded_graphics_core::Pixel;
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiDevice;
use esp_hal::delay::Delay;

pub const WIDTH: u16 = 240;
pub const HEIGHT: u16 = 240;

pub const SPI_FREQ_MHZ: u32 = 40;

const ROW_OFFSET: u16 = 80;

// pixels per SPI burst
const BURST_PIXELS: usize = 128;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    fn madctl(self) -> u8 {
        match self {
            Rotation::Deg0 => 0x00,
            Rotation::Deg90 => madctl::MX | madctl::MV,
            Rotation::Deg180 => madctl::MX | madctl::MY,
            Rotation::Deg270 => madctl::MY | madctl::MV,
        }
    }

    // (x, y) offset into controller RAM
    fn offset(self) -> (u16, u16) {
        match self {
            Rotation::Deg0 | Rotation::Deg90 => (0, 0),
            Rotation::Deg180 => (0, ROW_OFFSET),
            Rotation::Deg270 => (ROW_OFFSET, 0),
        }
    }
}

mod cmd {
    pub const SW_RESET: u8 = 0x01;
    pub const SLEEP_OUT: u8 = 0x11;
    pub const NORMAL_MODE: u8 = 0x13;
    pub const INVERSION_ON: u8 = 0x21;
    pub const DISPLAY_ON: u8 = 0x29;
    pub const COLUMN_ADDR: u8 = 0x2A;
    pub const ROW_ADDR: u8 = 0x2B;
    pub const WRITE_RAM: u8 = 0x2C;
    pub const MEMORY_ACCESS: u8 = 0x36;
    pub const PIXEL_FORMAT: u8 = 0x3A;
}

mod madctl {
    pub const MY: u8 = 0x80;
    pub const MX: u8 = 0x40;
    pub const MV: u8 = 0x20;
}

/// Bus or pin failure while talking to the panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayError {
    Spi,
    Pin,
}

pub struct St7789<SPI, DC, RST, BL> {
    spi: SPI,
    dc: DC,
    rst: RST,
    backlight: BL,
    rotation: Rotation,
}

impl<SPI, DC, RST, BL> St7789<SPI, DC, RST, BL>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, backlight: BL) -> Self {
        Self {
            spi,
            dc,
            rst,
            backlight,
            rotation: Rotation::Deg0,
        }
    }

    pub fn reset(&mut self, delay: &mut Delay) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(|_| DisplayError::Pin)?;
        delay.delay_millis(10);
        self.rst.set_low().map_err(|_| DisplayError::Pin)?;
        delay.delay_millis(10);
        self.rst.set_high().map_err(|_| DisplayError::Pin)?;
        delay.delay_millis(120);
        Ok(())
    }

    /// Hardware reset, wake, 16-bit colour, inversion on (IPS glass),
    /// then display and backlight on.
    pub fn init(&mut self, delay: &mut Delay) -> Result<(), DisplayError> {
        self.reset(delay)?;

        self.send_command(cmd::SW_RESET)?;
        delay.delay_millis(150);
        self.send_command(cmd::SLEEP_OUT)?;
        delay.delay_millis(120);

        self.send_command(cmd::PIXEL_FORMAT)?;
        self.send_data(&[0x55])?;
        self.send_command(cmd::MEMORY_ACCESS)?;
        self.send_data(&[self.rotation.madctl()])?;
        self.send_command(cmd::INVERSION_ON)?;
        self.send_command(cmd::NORMAL_MODE)?;
        delay.delay_millis(10);

        self.send_command(cmd::DISPLAY_ON)?;
        delay.delay_millis(20);
        self.set_backlight(true)
    }

    /// Takes effect for everything drawn afterwards; panel RAM is not
    /// rewritten.
    pub fn set_rotation(&mut self, rotation: Rotation) -> Result<(), DisplayError> {
        self.rotation = rotation;
        self.send_command(cmd::MEMORY_ACCESS)?;
        self.send_data(&[rotation.madctl()])
    }

    fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        let res = if on {
            self.backlight.set_high()
        } else {
            self.backlight.set_low()
        };
        res.map_err(|_| DisplayError::Pin)
    }

    // ── Windowed RAM writes ─────────────────────────────────

    // `area` must already be clipped to the panel
    fn open_window(&mut self, area: &Rectangle) -> Result<(), DisplayError> {
        let (ox, oy) = self.rotation.offset();
        let x0 = area.top_left.x as u16 + ox;
        let y0 = area.top_left.y as u16 + oy;
        let x1 = x0 + area.size.width as u16 - 1;
        let y1 = y0 + area.size.height as u16 - 1;

        self.send_command(cmd::COLUMN_ADDR)?;
        self.send_data(&[(x0 >> 8) as u8, x0 as u8, (x1 >> 8) as u8, x1 as u8])?;
        self.send_command(cmd::ROW_ADDR)?;
        self.send_data(&[(y0 >> 8) as u8, y0 as u8, (y1 >> 8) as u8, y1 as u8])?;
        self.send_command(cmd::WRITE_RAM)
    }

    fn stream_pixels<I>(&mut self, colors: I) -> Result<(), DisplayError>
    where
        I: IntoIterator<Item = Rgb565>,
    {
        let mut burst = [0u8; BURST_PIXELS * 2];
        let mut len = 0;
        self.dc.set_high().map_err(|_| DisplayError::Pin)?;
        for color in colors {
            let [hi, lo] = color.into_storage().to_be_bytes();
            burst[len] = hi;
            burst[len + 1] = lo;
            len += 2;
            if len == burst.len() {
                self.spi.write(&burst).map_err(|_| DisplayError::Spi)?;
                len = 0;
            }
        }
        if len > 0 {
            self.spi.write(&burst[..len]).map_err(|_| DisplayError::Spi)?;
        }
        Ok(())
    }

    // ── Low-level SPI ───────────────────────────────────────

    fn send_command(&mut self, cmd: u8) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(|_| DisplayError::Pin)?;
        self.spi.write(&[cmd]).map_err(|_| DisplayError::Spi)
    }

    fn send_data(&mut self, data: &[u8]) -> Result<(), DisplayError> {
        self.dc.set_high().map_err(|_| DisplayError::Pin)?;
        self.spi.write(data).map_err(|_| DisplayError::Spi)
    }
}

impl<SPI, DC, RST, BL> OriginDimensions for St7789<SPI, DC, RST, BL> {
    fn size(&self) -> Size {
        match self.rotation {
            Rotation::Deg0 | Rotation::Deg180 => Size::new(WIDTH as u32, HEIGHT as u32),
            Rotation::Deg90 | Rotation::Deg270 => Size::new(HEIGHT as u32, WIDTH as u32),
        }
    }
}

impl<SPI, DC, RST, BL> DrawTarget for St7789<SPI, DC, RST, BL>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    BL: OutputPin,
{
    type Color = Rgb565;
    type Error = DisplayError;

    // one 1x1 window per pixel; fine for text, slow for images
    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let bounds = self.bounding_box();
        for Pixel(coord, color) in pixels {
            if !inside(&bounds, coord) {
                continue;
            }
            self.open_window(&Rectangle::new(coord, Size::new(1, 1)))?;
            self.stream_pixels([color])?;
        }
        Ok(())
    }

    fn fill_contiguous<I>(&mut self, area: &Rectangle, colors: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Self::Color>,
    {
        let visible = area.intersection(&self.bounding_box());
        if visible.is_zero_sized() {
            return Ok(());
        }
        self.open_window(&visible)?;
        if visible == *area {
            return self.stream_pixels(colors);
        }
        // row-major walk of `area`, keeping only what lands on glass
        let pixels = area
            .points()
            .zip(colors)
            .filter(|(p, _)| inside(&visible, *p))
            .map(|(_, c)| c);
        self.stream_pixels(pixels)
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        let visible = area.intersection(&self.bounding_box());
        if visible.is_zero_sized() {
            return Ok(());
        }
        self.open_window(&visible)?;
        let count = visible.size.width as usize * visible.size.height as usize;
        self.stream_pixels(core::iter::repeat_n(color, count))
    }
}

fn inside(r: &Rectangle, p: Point) -> bool {
    p.x >= r.top_left.x
        && p.y >= r.top_left.y
        && p.x < r.top_left.x + r.size.width as i32
        && p.y < r.top_left.y + r.size.height as i32
}
