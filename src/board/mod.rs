//! ESP32-C3 photo frame board support.
//!
//! Maps the physical wiring (see `pins`) to named subsystems so the
//! application never touches GPIO numbers or peripheral setup.

pub mod button;
pub mod pins;

use embedded_hal_bus::spi::ExclusiveDevice;
use esp_hal::{
    Blocking,
    delay::Delay,
    gpio::{Input, InputConfig, Io, Level, Output, OutputConfig, Pull},
    peripherals::{Peripherals, WIFI},
    spi,
    time::Rate,
};

use crate::drivers::st7789::{SPI_FREQ_MHZ, St7789};

// Type Aliases
pub type SpiBus = spi::master::Spi<'static, Blocking>;
pub type SpiDevice = ExclusiveDevice<SpiBus, Output<'static>, Delay>;
pub type Tft = St7789<SpiDevice, Output<'static>, Output<'static>, Output<'static>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    SpiConfig,
    ChipSelect,
}

/// Display subsystem hardware: panel driver, not yet initialised.
pub struct DisplayHw {
    pub tft: Tft,
}

/// Complete board hardware.
pub struct Board {
    pub display: DisplayHw,
    /// Radio peripheral, handed to `net::Link`.
    pub wifi: WIFI<'static>,
    _io: Io<'static>,
}

impl Board {
    pub fn init(p: Peripherals) -> Result<Self, BoardError> {
        let mut io = Io::new(p.IO_MUX);
        let skip = Input::new(p.GPIO9, InputConfig::default().with_pull(Pull::Up));
        button::install(&mut io, skip);

        // GPIO setup
        let cs = Output::new(p.GPIO21, Level::High, OutputConfig::default());
        let dc = Output::new(p.GPIO4, Level::High, OutputConfig::default());
        let rst = Output::new(p.GPIO5, Level::High, OutputConfig::default());
        let bl = Output::new(p.GPIO6, Level::Low, OutputConfig::default());

        // SPI bus
        let spi_cfg = spi::master::Config::default()
            .with_frequency(Rate::from_mhz(SPI_FREQ_MHZ))
            .with_mode(spi::Mode::_0);
        let spi_bus = spi::master::Spi::new(p.SPI2, spi_cfg)
            .map_err(|_| BoardError::SpiConfig)?
            .with_sck(p.GPIO8)
            .with_mosi(p.GPIO10);

        let spi_dev =
            ExclusiveDevice::new(spi_bus, cs, Delay::new()).map_err(|_| BoardError::ChipSelect)?;

        Ok(Board {
            display: DisplayHw {
                tft: St7789::new(spi_dev, dc, rst, bl),
            },
            wifi: p.WIFI,
            _io: io,
        })
    }
}
