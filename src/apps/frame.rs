// Photo frame refresh loop.
//
// Every cycle: make sure WiFi is up, download `<image_url><image_name>`
// into RAM, decode it straight onto the panel (scaled down to fit and
// centred), then sleep for the update interval or until the BOOT button
// is pressed. A press during a decode cancels it between MCUs. Long
// intervals are spent disconnected from the access point.
//
// Failures never clear the screen: whatever was drawn last stays up and
// a one-line banner at the bottom says what went wrong. The next cycle
// simply tries again.

use alloc::format;
use alloc::string::String;
use core::fmt;

use embassy_futures::select::{Either, select};
use embassy_time::{Delay, Duration, Timer};
use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::{FONT_6X10, FONT_9X15_BOLD};
use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};
use frame_core::{
    BufferSink, DecodeError, DecodeSummary, FetchError, FetchRequest, FrameBlitter, ImageFetcher, JpegDecoder, Scale,
    SinkError, SliceSource,
};
use log::{info, warn};

use crate::board::Tft;
use crate::board::button;
use crate::config::FrameConfig;
use crate::drivers::st7789::DisplayError;
use crate::net::{Credentials, HttpTransport, Link, NetError};

// ── Layout ──────────────────────────────────────────────────────────

const BANNER_H: u32 = 14;

// waits at least this long give the access point back
const IDLE_DISCONNECT_SECS: u32 = 300;
const HEADING_Y: i32 = 80;
const BODY_Y: i32 = 120;
const BODY_LINE_GAP: i32 = 14;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleError {
    Net(NetError),
    Fetch(FetchError),
    Decode(DecodeError),
    Display(DisplayError),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Net(e) => write!(f, "WiFi: {}", e),
            CycleError::Fetch(FetchError::Sink(SinkError::Full)) => f.write_str("image too large"),
            CycleError::Fetch(e) => write!(f, "download: {}", e),
            CycleError::Decode(e) => write!(f, "{}", e),
            CycleError::Display(e) => write!(f, "display: {:?}", e),
        }
    }
}

impl From<NetError> for CycleError {
    fn from(e: NetError) -> Self {
        CycleError::Net(e)
    }
}

impl From<FetchError> for CycleError {
    fn from(e: FetchError) -> Self {
        CycleError::Fetch(e)
    }
}

impl From<DecodeError> for CycleError {
    fn from(e: DecodeError) -> Self {
        CycleError::Decode(e)
    }
}

impl From<DisplayError> for CycleError {
    fn from(e: DisplayError) -> Self {
        CycleError::Display(e)
    }
}

/// How a cycle ended when nothing failed.
#[derive(Debug, Clone, Copy)]
pub enum Shown {
    Image(DecodeSummary),
    Skipped,
}

// ── Refresh loop ────────────────────────────────────────────────────

pub struct FrameApp {
    cfg: FrameConfig,
    url: String,
    fetcher: ImageFetcher<HttpTransport, Delay>,
    buffer: BufferSink,
}

impl FrameApp {
    pub fn new(cfg: FrameConfig, link: &Link) -> Self {
        let url = cfg.full_url();
        let buffer = BufferSink::new(cfg.max_image_bytes);
        Self {
            url,
            fetcher: ImageFetcher::new(HttpTransport::new(link.stack()), Delay),
            buffer,
            cfg,
        }
    }

    pub async fn run(&mut self, link: &mut Link, tft: &mut Tft) -> ! {
        if !self.cfg.has_credentials() {
            warn!("frame: no WiFi credentials configured (FRAME_WIFI_SSID)");
        }
        let joining = format!("Joining '{}'...", self.cfg.ssid);
        if let Err(e) = render_screen(tft, "Photo Frame", &[&joining]) {
            warn!("frame: status screen failed: {:?}", e);
        }

        let mut cycle: u32 = 0;
        loop {
            cycle += 1;
            button::rearm();
            info!("frame: cycle {} -> {}", cycle, self.url);

            match self.cycle(link, tft).await {
                Ok(Shown::Image(s)) => info!(
                    "frame: shown {}x{} ({} tiles, {} clipped)",
                    s.width, s.height, s.tiles_written, s.tiles_skipped
                ),
                Ok(Shown::Skipped) => info!("frame: skipped"),
                Err(e) => {
                    warn!("frame: cycle {} failed: {}", cycle, e);
                    if let Err(e) = render_banner(tft, &format!("{}", e)) {
                        warn!("frame: banner failed: {:?}", e);
                    }
                }
            }

            info!("frame: next update in {} s", self.cfg.update_secs);
            if self.cfg.update_secs >= IDLE_DISCONNECT_SECS {
                link.disconnect().await;
            }
            let wait = Timer::after(Duration::from_secs(self.cfg.update_secs as u64));
            if let Either::Second(_) = link.drive(select(wait, button::SKIP.wait())).await {
                info!("frame: skip pressed");
            }
        }
    }

    async fn cycle(&mut self, link: &mut Link, tft: &mut Tft) -> Result<Shown, CycleError> {
        let creds = Credentials {
            ssid: self.cfg.ssid,
            password: self.cfg.password,
        };
        link.connect(&creds).await?;
        if let Some(dbm) = link.rssi() {
            info!("frame: signal {} dBm", dbm);
        }

        let req = FetchRequest::new(&self.url, &mut self.buffer).with_retry(self.cfg.retry);
        let report = link.drive(self.fetcher.fetch(req)).await?;
        info!("frame: {} bytes in {} attempt(s)", report.bytes, report.attempts);

        if button::pressed() {
            return Ok(Shown::Skipped);
        }
        match show_image(tft, self.buffer.as_slice()) {
            Err(CycleError::Decode(DecodeError::Cancelled)) => Ok(Shown::Skipped),
            other => other.map(Shown::Image),
        }
    }
}

/// Decode `jpeg` onto the panel, fitted and centred. The panel is only
/// cleared once the header has parsed, so a bad download leaves the
/// previous picture in place.
fn show_image(tft: &mut Tft, jpeg: &[u8]) -> Result<DecodeSummary, CycleError> {
    let mut dec = JpegDecoder::new(SliceSource::new(jpeg));
    let (w, h) = {
        let hdr = dec.open()?;
        (hdr.width(), hdr.height())
    };

    let panel = tft.size();
    let scale = Scale::fit(w, h, panel.width as u16, panel.height as u16);
    dec.set_scale(scale)?;
    let (ow, oh) = dec.output_size().ok_or(DecodeError::InvalidState)?;
    info!("frame: {}x{} -> {}x{} ({:?})", w, h, ow, oh, scale);

    tft.clear(Rgb565::BLACK)?;
    let placed = Rectangle::new(centred(panel, ow, oh), Size::new(ow as u32, oh as u32));
    let mut blitter = FrameBlitter::new(tft.cropped(&placed));
    Ok(dec.decode_cancellable(&mut blitter, &button::CANCEL)?)
}

fn centred(panel: Size, w: u16, h: u16) -> Point {
    Point::new(
        (panel.width as i32 - w as i32).max(0) / 2,
        (panel.height as i32 - h as i32).max(0) / 2,
    )
}

// ── Display helpers ─────────────────────────────────────────────────

/// Full-screen status page:
///
///     ┌──────────────────────┐
///     │                      │
///     │      heading         │  ← bold, centred
///     │                      │
///     │     body line 1      │  ← small, centred
///     │     body line 2      │
///     │                      │
///     └──────────────────────┘
///
fn render_screen(tft: &mut Tft, heading: &str, lines: &[&str]) -> Result<(), DisplayError> {
    tft.clear(Rgb565::BLACK)?;
    let centre_x = tft.size().width as i32 / 2;
    let centred = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Top)
        .build();

    let heading_style = MonoTextStyle::new(&FONT_9X15_BOLD, Rgb565::WHITE);
    Text::with_text_style(heading, Point::new(centre_x, HEADING_Y), heading_style, centred).draw(tft)?;

    let body_style = MonoTextStyle::new(&FONT_6X10, Rgb565::CSS_LIGHT_GRAY);
    for (i, line) in lines.iter().enumerate() {
        let y = BODY_Y + i as i32 * BODY_LINE_GAP;
        Text::with_text_style(line, Point::new(centre_x, y), body_style, centred).draw(tft)?;
    }
    Ok(())
}

/// One-line error strip along the bottom edge, drawn over the picture.
fn render_banner(tft: &mut Tft, text: &str) -> Result<(), DisplayError> {
    let size = tft.size();
    let band = Rectangle::new(
        Point::new(0, (size.height - BANNER_H) as i32),
        Size::new(size.width, BANNER_H),
    );
    band.into_styled(PrimitiveStyle::with_fill(Rgb565::CSS_DARK_RED)).draw(tft)?;

    let style = MonoTextStyle::new(&FONT_6X10, Rgb565::WHITE);
    let left = TextStyleBuilder::new().baseline(Baseline::Top).build();
    // 6 px glyphs: whatever does not fit is cut at the panel edge
    Text::with_text_style(text, band.top_left + Point::new(3, 2), style, left).draw(tft)?;
    Ok(())
}
