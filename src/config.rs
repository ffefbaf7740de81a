// Build-time configuration.
//
// Values come from environment variables at compile time, e.g.
//
//     FRAME_WIFI_SSID=home FRAME_WIFI_PASSWORD=secret \
//     FRAME_IMAGE_URL=http://10.0.0.5:8000/frame/ \
//     cargo build -p photo-frame --release --target riscv32imc-unknown-none-elf
//
// Anything unset falls back to the defaults below.
//
// The whole JPEG is held in RAM before decoding, so FRAME_MAX_IMAGE_KB
// is the largest file the frame can show. Larger downloads are refused
// as soon as the server announces their length.

use alloc::format;
use alloc::string::String;

use frame_core::RetryPolicy;
use log::warn;

use crate::drivers::st7789::Rotation;

const DEFAULT_SSID: &str = "YOUR_SSID";
const DEFAULT_PASSWORD: &str = "YOUR_PASSWORD";
const DEFAULT_IMAGE_URL: &str = "http://192.168.1.100/images/";
const DEFAULT_IMAGE_NAME: &str = "current.jpg";
const DEFAULT_UPDATE_SECS: u32 = 3600;
const DEFAULT_MAX_IMAGE_KB: usize = 96;

// heap is ~250 KiB and the radio and decoder need their share
const MAX_IMAGE_KB_RANGE: (usize, usize) = (8, 160);

// below this the server gets hammered for no visible change
const MIN_UPDATE_SECS: u32 = 10;

pub struct FrameConfig {
    pub ssid: &'static str,
    pub password: &'static str,
    /// Directory URL, normally ending in `/`.
    pub image_url: &'static str,
    pub image_name: &'static str,
    pub update_secs: u32,
    pub retry: RetryPolicy,
    /// Largest download kept in memory for decoding.
    pub max_image_bytes: usize,
    /// Panel orientation, FRAME_ROTATION in degrees.
    pub rotation: Rotation,
}

impl FrameConfig {
    pub fn from_env() -> Self {
        Self {
            ssid: option_env!("FRAME_WIFI_SSID").unwrap_or(DEFAULT_SSID),
            password: option_env!("FRAME_WIFI_PASSWORD").unwrap_or(DEFAULT_PASSWORD),
            image_url: option_env!("FRAME_IMAGE_URL").unwrap_or(DEFAULT_IMAGE_URL),
            image_name: option_env!("FRAME_IMAGE_NAME").unwrap_or(DEFAULT_IMAGE_NAME),
            update_secs: parse_secs(option_env!("FRAME_UPDATE_SECS")),
            retry: RetryPolicy::default(),
            max_image_bytes: parse_kib(option_env!("FRAME_MAX_IMAGE_KB")) * 1024,
            rotation: parse_rotation(option_env!("FRAME_ROTATION")),
        }
    }

    /// `image_url` joined with `image_name`, with exactly one `/` between.
    pub fn full_url(&self) -> String {
        let base = self.image_url.trim_end_matches('/');
        let name = self.image_name.trim_start_matches('/');
        format!("{}/{}", base, name)
    }

    pub fn has_credentials(&self) -> bool {
        self.ssid != DEFAULT_SSID && !self.ssid.is_empty()
    }
}

fn parse_secs(raw: Option<&str>) -> u32 {
    let Some(raw) = raw else {
        return DEFAULT_UPDATE_SECS;
    };
    match raw.trim().parse::<u32>() {
        Ok(secs) if secs >= MIN_UPDATE_SECS => secs,
        Ok(secs) => {
            warn!("config: FRAME_UPDATE_SECS={} too short, using {}", secs, MIN_UPDATE_SECS);
            MIN_UPDATE_SECS
        }
        Err(_) => {
            warn!(
                "config: FRAME_UPDATE_SECS={:?} is not a number, using {}",
                raw, DEFAULT_UPDATE_SECS
            );
            DEFAULT_UPDATE_SECS
        }
    }
}

fn parse_kib(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_MAX_IMAGE_KB;
    };
    let (lo, hi) = MAX_IMAGE_KB_RANGE;
    match raw.trim().parse::<usize>() {
        Ok(kib) if (lo..=hi).contains(&kib) => kib,
        Ok(kib) => {
            let clamped = kib.clamp(lo, hi);
            warn!("config: FRAME_MAX_IMAGE_KB={} out of range, using {}", kib, clamped);
            clamped
        }
        Err(_) => {
            warn!(
                "config: FRAME_MAX_IMAGE_KB={:?} is not a number, using {}",
                raw, DEFAULT_MAX_IMAGE_KB
            );
            DEFAULT_MAX_IMAGE_KB
        }
    }
}

fn parse_rotation(raw: Option<&str>) -> Rotation {
    match raw.map(str::trim) {
        None | Some("0") => Rotation::Deg0,
        Some("90") => Rotation::Deg90,
        Some("180") => Rotation::Deg180,
        Some("270") => Rotation::Deg270,
        Some(other) => {
            warn!("config: FRAME_ROTATION={:?} is not 0/90/180/270, using 0", other);
            Rotation::Deg0
        }
    }
}
