//! Minimal HTTP/1.0 client framing.
//!
//! Just enough to GET an image from a LAN server: split a plain `http://`
//! URL, build the request head, parse the response head and hand back the
//! body as a bounded [`Read`]. The connection itself belongs to the caller,
//! so the same code runs over an `embassy-net` socket on the device and over
//! an in-memory reader in tests.

use alloc::format;
use alloc::string::String;
use core::fmt;

use embedded_io_async::{ErrorKind, ErrorType, Read};

use crate::error::{FetchError, TransportFault};
use crate::fetch::io_fault;

/// Response heads longer than this are rejected.
pub const MAX_HEAD: usize = 1024;

/// `http://host[:port]/path`, borrowed from the caller's string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpUrl<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

impl<'a> HttpUrl<'a> {
    pub fn parse(url: &'a str) -> Result<Self, FetchError> {
        let rest = url.strip_prefix("http://").ok_or(FetchError::InvalidUrl)?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| FetchError::InvalidUrl)?),
            None => (authority, 80),
        };
        if host.is_empty() || port == 0 {
            return Err(FetchError::InvalidUrl);
        }
        Ok(Self { host, port, path })
    }

    pub fn request_head(&self) -> String {
        let mut head = format!("GET {} HTTP/1.0\r\nHost: {}", self.path, self.host);
        if self.port != 80 {
            head.push_str(&format!(":{}", self.port));
        }
        head.push_str("\r\nUser-Agent: photo-frame\r\nAccept: image/jpeg\r\nConnection: close\r\n\r\n");
        head
    }
}

/// Parsed status line and the headers we act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub content_length: Option<usize>,
    /// Bytes up to and including the blank line.
    pub header_len: usize,
}

impl ResponseHead {
    /// `Ok(None)` while the blank line has not arrived yet.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>, FetchError> {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return Ok(None);
        };
        let text = core::str::from_utf8(&buf[..end]).map_err(|_| protocol())?;
        let mut lines = text.split("\r\n");

        let status_line = lines.next().unwrap_or("");
        let mut parts = status_line.splitn(3, ' ');
        if !parts.next().is_some_and(|v| v.starts_with("HTTP/")) {
            return Err(protocol());
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(protocol)?;

        let mut content_length = None;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = Some(value.trim().parse::<usize>().map_err(|_| protocol())?);
            }
        }

        Ok(Some(Self {
            status,
            content_length,
            header_len: end + 4,
        }))
    }
}

/// Map a status code onto the fetch error taxonomy. Redirects are not
/// followed.
pub fn check_status(status: u16) -> Result<(), FetchError> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(FetchError::NotFound),
        401 | 403 => Err(FetchError::AuthFailed),
        other => Err(FetchError::Transport(TransportFault::Status(other))),
    }
}

fn protocol() -> FetchError {
    FetchError::Transport(TransportFault::Protocol)
}

/// Read the response head from `conn` into `head` and return the body.
/// Any body bytes that arrived with the head are served first.
pub async fn read_response<'b, R: Read>(mut conn: R, head: &'b mut [u8]) -> Result<HttpBody<'b, R>, FetchError> {
    let mut filled = 0usize;
    loop {
        if filled == head.len() {
            return Err(protocol());
        }
        let n = conn.read(&mut head[filled..]).await.map_err(io_fault)?;
        if n == 0 {
            // closed before the head was complete
            return Err(FetchError::Transport(TransportFault::Reset));
        }
        filled += n;
        if let Some(resp) = ResponseHead::parse(&head[..filled])? {
            log::debug!("http: status {} length {:?}", resp.status, resp.content_length);
            check_status(resp.status)?;
            let head: &'b [u8] = head;
            return Ok(HttpBody {
                conn,
                early: &head[resp.header_len..filled],
                remaining: resp.content_length,
            });
        }
    }
}

/// Response body. Bounded by `Content-Length` when the server sent one,
/// otherwise by the connection closing.
pub struct HttpBody<'b, R> {
    conn: R,
    early: &'b [u8],
    remaining: Option<usize>,
}

impl<R> HttpBody<'_, R> {
    /// Bytes still expected, if the length is known.
    pub fn remaining(&self) -> Option<usize> {
        self.remaining
    }
}

#[derive(Debug)]
pub enum BodyError<E> {
    Io(E),
    /// Connection closed before `Content-Length` bytes arrived.
    Truncated,
}

impl<E: fmt::Display> fmt::Display for BodyError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyError::Io(e) => write!(f, "{}", e),
            BodyError::Truncated => write!(f, "body truncated"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> core::error::Error for BodyError<E> {}

impl<E: embedded_io_async::Error> embedded_io_async::Error for BodyError<E> {
    fn kind(&self) -> ErrorKind {
        match self {
            BodyError::Io(e) => e.kind(),
            BodyError::Truncated => ErrorKind::ConnectionReset,
        }
    }
}

impl<R: Read> ErrorType for HttpBody<'_, R> {
    type Error = BodyError<R::Error>;
}

impl<R: Read> Read for HttpBody<'_, R> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let limit = match self.remaining {
            Some(0) => return Ok(0),
            Some(left) => buf.len().min(left),
            None => buf.len(),
        };
        if limit == 0 {
            return Ok(0);
        }

        let n = if !self.early.is_empty() {
            let n = limit.min(self.early.len());
            buf[..n].copy_from_slice(&self.early[..n]);
            self.early = &self.early[n..];
            n
        } else {
            let n = self.conn.read(&mut buf[..limit]).await.map_err(BodyError::Io)?;
            if n == 0 {
                return match self.remaining {
                    Some(_) => Err(BodyError::Truncated),
                    None => Ok(0),
                };
            }
            n
        };

        if let Some(left) = self.remaining.as_mut() {
            *left -= n;
        }
        Ok(n)
    }
}
