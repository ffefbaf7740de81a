// frame-core: streaming image pipeline for a WiFi photo frame.
// source:    pull-based byte sources (slice, chunked closure reads)
// bitreader: MSB-first entropy bit reader with 0xFF byte un-stuffing
// huffman:   canonical Huffman tables, 9-bit lookup + canonical walk
// idct:      integer 8x8 inverse DCT (IJG islow)
// color:     fixed-point YCbCr -> RGB
// header:    JPEG marker parsing into an immutable JpegHeader
// jpeg:      baseline decoder state machine, MCU loop, decode sessions
// tile:      decoded pixel tiles handed from decoder to sink
// blit:      tile clipping + pixel format conversion onto a DrawTarget
// fetch:     retrying byte streamer from a network transport into a sink
// http:      HTTP/1.0 request/response framing over any async reader

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bitreader;
pub mod blit;
pub mod color;
pub mod error;
pub mod header;
pub mod huffman;
pub mod idct;
pub mod jpeg;
pub mod source;
pub mod tile;

#[cfg(feature = "fetch")]
pub mod fetch;
#[cfg(feature = "fetch")]
pub mod http;

pub use blit::{FrameBlitter, FrameBuffer, TileSink};
pub use error::{BlitError, DecodeError};
pub use header::JpegHeader;
pub use jpeg::{DecodeSession, DecodeSummary, DecoderState, JpegDecoder, Scale};
pub use source::{ByteSource, ChunkSource, SliceSource};
pub use tile::PixelTile;

#[cfg(feature = "fetch")]
pub use error::{FetchError, SinkError, TransportFault};
#[cfg(feature = "fetch")]
pub use fetch::{BufferSink, ByteSink, FetchReport, FetchRequest, ImageFetcher, RetryPolicy, Transport};
