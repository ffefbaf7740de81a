// WiFi photo frame firmware (ESP32-C3 + ST7789 SPI panel)

#![no_std]

extern crate alloc;

pub mod apps;
pub mod board;
pub mod config;
pub mod drivers;
pub mod net;
