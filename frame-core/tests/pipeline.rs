// Download -> decode -> blit, the way the firmware's refresh loop drives it.

mod common;

use core::convert::Infallible;

use common::{Layout, encode, rgb_pattern};
use embassy_futures::block_on;
use embedded_graphics_core::geometry::Point;
use embedded_graphics_core::pixelcolor::{Rgb565, Rgb888, RgbColor};
use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorType, Read};
use frame_core::{
    BufferSink, FetchError, FetchRequest, FrameBlitter, FrameBuffer, ImageFetcher, JpegDecoder, RetryPolicy, Scale,
    SliceSource, Transport, TransportFault,
};

struct Body<'a> {
    data: &'a [u8],
}

impl ErrorType for Body<'_> {
    type Error = Infallible;
}

impl Read for Body<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

// serves `image` at `path`, refusing the first `refusals` connections
struct StaticServer {
    path: &'static str,
    image: Vec<u8>,
    refusals: usize,
}

impl Transport for StaticServer {
    type Body<'a> = Body<'a>;

    async fn get(&mut self, url: &str) -> Result<Body<'_>, FetchError> {
        if self.refusals > 0 {
            self.refusals -= 1;
            return Err(FetchError::Transport(TransportFault::ConnectionRefused));
        }
        if !url.ends_with(self.path) {
            return Err(FetchError::NotFound);
        }
        Ok(Body { data: &self.image })
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

#[test]
fn fetched_image_is_fitted_and_centred_on_the_panel() {
    let img = rgb_pattern(64, 48);
    let server = StaticServer {
        path: "/images/current.jpg",
        image: encode(&img, Layout::Yuv420, 4),
        refusals: 1,
    };
    let mut fetcher = ImageFetcher::new(server, NoDelay);
    let mut buffer = BufferSink::new(64 * 1024);
    let report = block_on(fetcher.fetch(
        FetchRequest::new("http://192.168.1.100/images/current.jpg", &mut buffer)
            .with_retry(RetryPolicy::new(3, 10, 2, 100)),
    ))
    .unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(report.bytes, buffer.len());

    // 40x30 panel: Half (32x24) is the mildest scale that fits
    let mut dec = JpegDecoder::new(SliceSource::new(buffer.as_slice()));
    let hdr = dec.open().unwrap();
    let scale = Scale::fit(hdr.width(), hdr.height(), 40, 30);
    assert_eq!(scale, Scale::Half);
    dec.set_scale(scale).unwrap();
    let (w, h) = dec.output_size().unwrap();
    assert_eq!((w, h), (32, 24));

    let origin = Point::new((40 - w as i32) / 2, (30 - h as i32) / 2);
    let mut panel = FrameBlitter::with_origin(FrameBuffer::new(40, 30, Rgb565::BLACK), origin);
    let summary = dec.decode(&mut panel).unwrap();
    assert_eq!(summary.tiles_skipped, 0);

    let fb = panel.into_inner();
    assert_eq!(fb.pixel(3, 2), Some(Rgb565::BLACK));
    assert_eq!(fb.pixel(36, 27), Some(Rgb565::BLACK));
    // top-left output pixel averages source (0..2, 0..2): roughly (42, 198, 136)
    let px = fb.pixel(4, 3).unwrap();
    let expect = Rgb565::from(Rgb888::new(42, 198, 136));
    assert!(px.r().abs_diff(expect.r()) <= 2);
    assert!(px.g().abs_diff(expect.g()) <= 4);
    assert!(px.b().abs_diff(expect.b()) <= 2);
}

#[test]
fn missing_image_fails_without_retries() {
    let server = StaticServer {
        path: "/images/current.jpg",
        image: Vec::new(),
        refusals: 0,
    };
    let mut fetcher = ImageFetcher::new(server, NoDelay);
    let mut buffer = BufferSink::new(1024);
    let result = block_on(fetcher.fetch(FetchRequest::new("http://192.168.1.100/images/other.jpg", &mut buffer)));
    assert_eq!(result, Err(FetchError::NotFound));
}
