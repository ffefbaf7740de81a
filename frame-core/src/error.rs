// Error taxonomy for decode, blit and fetch.
//
// Every failure is returned as a typed result; callers decide whether to
// re-fetch (network) or discard the image (decode). Nothing here allocates.

use core::fmt;

/// Terminal failure of a decode session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Valid JPEG, but outside the baseline 8-bit sequential profile.
    UnsupportedFormat(&'static str),
    /// Structurally broken header or table data.
    Malformed(&'static str),
    InvalidHuffmanCode,
    UnexpectedEndOfStream,
    /// Bits were requested past a marker that ends the entropy segment.
    StreamMarkerEncountered(u8),
    /// Expected restart marker missing or out of sequence.
    RestartMarkerMismatch,
    /// The byte source itself failed (SD read, flash read, ...).
    Source(&'static str),
    Cancelled,
    /// The tile sink reported a non-recoverable error.
    Sink,
    /// Operation not valid in the decoder's current state.
    InvalidState,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnsupportedFormat(what) => write!(f, "unsupported JPEG: {}", what),
            DecodeError::Malformed(what) => write!(f, "malformed JPEG: {}", what),
            DecodeError::InvalidHuffmanCode => write!(f, "invalid Huffman code"),
            DecodeError::UnexpectedEndOfStream => write!(f, "unexpected end of stream"),
            DecodeError::StreamMarkerEncountered(m) => {
                write!(f, "marker 0xFF{:02X} inside entropy data", m)
            }
            DecodeError::RestartMarkerMismatch => write!(f, "restart marker mismatch"),
            DecodeError::Source(what) => write!(f, "source read failed: {}", what),
            DecodeError::Cancelled => write!(f, "decode cancelled"),
            DecodeError::Sink => write!(f, "tile sink failed"),
            DecodeError::InvalidState => write!(f, "decoder in wrong state"),
        }
    }
}

impl core::error::Error for DecodeError {}

/// Failure writing one tile to a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlitError<E> {
    /// Tile lies entirely outside the destination; nothing was written.
    OutOfBounds,
    /// The destination (display bus, frame buffer) rejected the write.
    Target(E),
}

impl<E: fmt::Debug> fmt::Display for BlitError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlitError::OutOfBounds => write!(f, "tile outside destination"),
            BlitError::Target(e) => write!(f, "destination write failed: {:?}", e),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for BlitError<E> {}

#[cfg(feature = "fetch")]
pub use fetch_errors::*;

#[cfg(feature = "fetch")]
mod fetch_errors {
    use core::fmt;

    /// Why a transport-level operation failed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TransportFault {
        ConnectionRefused,
        Timeout,
        /// Peer or link dropped the connection mid-transfer.
        Reset,
        Unreachable,
        /// Unparseable response.
        Protocol,
        /// Non-success HTTP status not covered by a dedicated variant.
        Status(u16),
    }

    /// Why a byte sink refused data.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum SinkError {
        /// Temporarily unable to accept data; the whole fetch may be retried.
        Busy,
        /// Capacity exhausted.
        Full,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FetchError {
        NotFound,
        AuthFailed,
        Transport(TransportFault),
        Sink(SinkError),
        InvalidUrl,
    }

    impl FetchError {
        /// True for failures worth another attempt after a backoff.
        pub fn is_transient(&self) -> bool {
            matches!(
                self,
                FetchError::Transport(
                    TransportFault::ConnectionRefused
                        | TransportFault::Timeout
                        | TransportFault::Reset
                ) | FetchError::Sink(SinkError::Busy)
            )
        }
    }

    impl fmt::Display for TransportFault {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                TransportFault::ConnectionRefused => write!(f, "connection refused"),
                TransportFault::Timeout => write!(f, "timed out"),
                TransportFault::Reset => write!(f, "connection reset"),
                TransportFault::Unreachable => write!(f, "host unreachable"),
                TransportFault::Protocol => write!(f, "protocol error"),
                TransportFault::Status(code) => write!(f, "HTTP status {}", code),
            }
        }
    }

    impl fmt::Display for FetchError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                FetchError::NotFound => write!(f, "not found"),
                FetchError::AuthFailed => write!(f, "authentication failed"),
                FetchError::Transport(t) => write!(f, "transport error: {}", t),
                FetchError::Sink(SinkError::Busy) => write!(f, "sink busy"),
                FetchError::Sink(SinkError::Full) => write!(f, "sink full"),
                FetchError::InvalidUrl => write!(f, "invalid URL"),
            }
        }
    }

    impl core::error::Error for FetchError {}
}
