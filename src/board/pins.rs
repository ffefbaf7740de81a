//! GPIO |     Function    |      Notes
//! -----+-----------------+----------------------------------
//!  4   | TFT DC          | Data/Command select
//!  5   | TFT RST         | Reset (active low)
//!  6   | TFT BL          | Backlight enable (active high)
//!  8   | SPI2 SCK        | Display clock
//!  9   | BOOT button     | Active LOW, internal pullup; skip image
//! 10   | SPI2 MOSI       | Display data (panel is write-only)
//! 21   | TFT CS          | Display chip select

// ----- TFT Display -----
pub const TFT_CS: u8 = 21;
pub const TFT_DC: u8 = 4;
pub const TFT_RST: u8 = 5;
pub const TFT_BL: u8 = 6;

// ----- SPI Bus -----
pub const SPI_SCK: u8 = 8;
pub const SPI_MOSI: u8 = 10;

// ----- Skip Button -----
pub const BTN_SKIP: u8 = 9; // BOOT strap, digital, active LOW
