//! Retrying image download.
//!
//! [`ImageFetcher`] streams a response body from a [`Transport`] into a
//! [`ByteSink`] in fixed-size chunks. Transient failures (refused, timed
//! out or reset connections, a busy sink) restart the whole transfer after
//! an exponential backoff; anything else is returned immediately.

use alloc::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use embedded_io_async::{ErrorKind, Read};

use crate::error::{FetchError, SinkError, TransportFault};

/// Body bytes moved per read.
pub const FETCH_CHUNK: usize = 512;

/// Something that can open a URL and return its body as a byte stream.
#[allow(async_fn_in_trait)]
pub trait Transport {
    type Body<'a>: Read
    where
        Self: 'a;

    async fn get(&mut self, url: &str) -> Result<Self::Body<'_>, FetchError>;

    /// Body length announced up front, if any.
    fn body_len<'a>(_body: &Self::Body<'a>) -> Option<usize>
    where
        Self: 'a,
    {
        None
    }
}

/// Destination for downloaded bytes.
pub trait ByteSink {
    /// Called before every attempt; discard anything from a failed one.
    fn begin(&mut self);

    /// The transport announced a body of `len` bytes. Refusing here
    /// saves downloading something that cannot be stored.
    fn expect_len(&mut self, _len: usize) -> Result<(), SinkError> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Called once the body has been fully written.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn begin(&mut self) {
        (**self).begin()
    }

    fn expect_len(&mut self, len: usize) -> Result<(), SinkError> {
        (**self).expect_len(len)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        (**self).write(data)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Accumulates the body in memory, up to a fixed capacity. The decoder
/// reads from a byte slice, so this is where the largest displayable
/// file size is set.
pub struct BufferSink {
    data: Vec<u8>,
    capacity: usize,
}

impl BufferSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            capacity,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ByteSink for BufferSink {
    fn begin(&mut self) {
        self.data.clear();
    }

    fn expect_len(&mut self, len: usize) -> Result<(), SinkError> {
        if len > self.capacity {
            return Err(SinkError::Full);
        }
        self.data.try_reserve(len).map_err(|_| SinkError::Full)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.data.len() + data.len() > self.capacity {
            return Err(SinkError::Full);
        }
        self.data
            .try_reserve(data.len())
            .map_err(|_| SinkError::Full)?;
        self.data.extend_from_slice(data);
        Ok(())
    }
}

/// Attempt limit and backoff schedule. The wait before attempt `n + 1`
/// is `min(base_delay_ms * multiplier^(n - 1), max_delay_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u32,
    pub multiplier: u32,
    pub max_delay_ms: u32,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u8, base_delay_ms: u32, multiplier: u32, max_delay_ms: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            multiplier,
            max_delay_ms,
        }
    }

    /// Single attempt, no retries.
    pub const fn once() -> Self {
        Self::new(1, 0, 1, 0)
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u8) -> u32 {
        let exp = attempt.saturating_sub(1) as u32;
        let factor = self.multiplier.saturating_pow(exp);
        self.base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1_000, 2, 30_000)
    }
}

/// One image load.
pub struct FetchRequest<'a, S> {
    pub url: &'a str,
    pub sink: &'a mut S,
    pub retry: RetryPolicy,
}

impl<'a, S: ByteSink> FetchRequest<'a, S> {
    pub fn new(url: &'a str, sink: &'a mut S) -> Self {
        Self {
            url,
            sink,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchReport {
    pub attempts: u8,
    pub bytes: usize,
}

pub struct ImageFetcher<T, D> {
    transport: T,
    delay: D,
}

impl<T: Transport, D: DelayNs> ImageFetcher<T, D> {
    pub fn new(transport: T, delay: D) -> Self {
        Self { transport, delay }
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (T, D) {
        (self.transport, self.delay)
    }

    pub async fn fetch<S: ByteSink>(&mut self, req: FetchRequest<'_, S>) -> Result<FetchReport, FetchError> {
        if req.url.is_empty() {
            return Err(FetchError::InvalidUrl);
        }
        let max = req.retry.max_attempts.max(1);
        let mut attempt = 0u8;

        loop {
            attempt += 1;
            match self.attempt(req.url, &mut *req.sink).await {
                Ok(bytes) => {
                    log::info!("fetch: {} ({} bytes, attempt {})", req.url, bytes, attempt);
                    return Ok(FetchReport {
                        attempts: attempt,
                        bytes,
                    });
                }
                Err(e) if e.is_transient() && attempt < max => {
                    let wait = req.retry.backoff(attempt);
                    log::warn!(
                        "fetch: attempt {}/{} failed: {}, retrying in {} ms",
                        attempt,
                        max,
                        e,
                        wait
                    );
                    self.delay.delay_ms(wait).await;
                }
                Err(e) => {
                    log::warn!("fetch: {} failed after {} attempt(s): {}", req.url, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn attempt<S: ByteSink>(&mut self, url: &str, sink: &mut S) -> Result<usize, FetchError> {
        sink.begin();
        let mut body = self.transport.get(url).await?;
        if let Some(len) = T::body_len(&body) {
            sink.expect_len(len).map_err(FetchError::Sink)?;
        }
        let mut buf = [0u8; FETCH_CHUNK];
        let mut total = 0usize;
        loop {
            let n = body.read(&mut buf).await.map_err(io_fault)?;
            if n == 0 {
                break;
            }
            sink.write(&buf[..n]).map_err(FetchError::Sink)?;
            total += n;
        }
        sink.finish().map_err(FetchError::Sink)?;
        Ok(total)
    }
}

pub(crate) fn io_fault<E: embedded_io_async::Error>(e: E) -> FetchError {
    let fault = match e.kind() {
        ErrorKind::TimedOut => TransportFault::Timeout,
        ErrorKind::ConnectionRefused => TransportFault::ConnectionRefused,
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            TransportFault::Reset
        }
        ErrorKind::NotConnected | ErrorKind::AddrNotAvailable => TransportFault::Unreachable,
        _ => TransportFault::Protocol,
    };
    FetchError::Transport(fault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt;
    use embassy_futures::block_on;
    use std::collections::VecDeque;

    #[derive(Debug)]
    struct MockIoError(ErrorKind);

    impl fmt::Display for MockIoError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    impl core::error::Error for MockIoError {}

    impl embedded_io_async::Error for MockIoError {
        fn kind(&self) -> ErrorKind {
            self.0
        }
    }

    struct MockBody {
        data: Vec<u8>,
        pos: usize,
        declared: Option<usize>,
        // fail with this kind once `pos` reaches the end of `data`
        fail: Option<ErrorKind>,
    }

    impl embedded_io_async::ErrorType for MockBody {
        type Error = MockIoError;
    }

    impl Read for MockBody {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, MockIoError> {
            if self.pos == self.data.len() {
                return match self.fail {
                    Some(kind) => Err(MockIoError(kind)),
                    None => Ok(0),
                };
            }
            let n = buf.len().min(self.data.len() - self.pos).min(100);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    enum Outcome {
        Body(Vec<u8>),
        DropAfter(Vec<u8>, ErrorKind),
        // body announcing a length up front
        Declared(Vec<u8>, usize),
        Fail(FetchError),
    }

    struct MockTransport {
        script: VecDeque<Outcome>,
        calls: usize,
    }

    impl MockTransport {
        fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
            Self {
                script: script.into_iter().collect(),
                calls: 0,
            }
        }
    }

    impl Transport for MockTransport {
        type Body<'a> = MockBody;

        async fn get(&mut self, _url: &str) -> Result<MockBody, FetchError> {
            self.calls += 1;
            match self.script.pop_front() {
                Some(Outcome::Body(data)) => Ok(MockBody {
                    data,
                    pos: 0,
                    declared: None,
                    fail: None,
                }),
                Some(Outcome::DropAfter(data, kind)) => Ok(MockBody {
                    data,
                    pos: 0,
                    declared: None,
                    fail: Some(kind),
                }),
                Some(Outcome::Declared(data, len)) => Ok(MockBody {
                    data,
                    pos: 0,
                    declared: Some(len),
                    fail: None,
                }),
                Some(Outcome::Fail(e)) => Err(e),
                None => Err(FetchError::Transport(TransportFault::Unreachable)),
            }
        }

        fn body_len<'a>(body: &MockBody) -> Option<usize>
        where
            Self: 'a,
        {
            body.declared
        }
    }

    #[derive(Default)]
    struct RecordingDelay(Vec<u32>);

    impl DelayNs for RecordingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.0.push(ns / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.0.push(ms);
        }
    }

    // fails with Busy on the first `busy` attempts
    struct FlakySink {
        inner: BufferSink,
        busy: usize,
        begun: usize,
    }

    impl ByteSink for FlakySink {
        fn begin(&mut self) {
            self.begun += 1;
            self.inner.begin();
        }

        fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
            if self.begun <= self.busy {
                return Err(SinkError::Busy);
            }
            self.inner.write(data)
        }
    }

    const POLICY: RetryPolicy = RetryPolicy::new(4, 250, 3, 10_000);
    const REFUSED: FetchError = FetchError::Transport(TransportFault::ConnectionRefused);

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7) as u8).collect()
    }

    #[test]
    fn two_transient_failures_then_success() {
        let mut fetcher = ImageFetcher::new(
            MockTransport::new([
                Outcome::Fail(REFUSED),
                Outcome::DropAfter(image(300), ErrorKind::TimedOut),
                Outcome::Body(image(1500)),
            ]),
            RecordingDelay::default(),
        );
        let mut sink = BufferSink::new(4096);
        let report = block_on(fetcher.fetch(FetchRequest::new("http://h/a.jpg", &mut sink).with_retry(POLICY)));
        assert_eq!(
            report,
            Ok(FetchReport {
                attempts: 3,
                bytes: 1500
            })
        );
        // partial body from the dropped attempt was discarded
        assert_eq!(sink.as_slice(), &image(1500)[..]);
        let (transport, delay) = fetcher.into_parts();
        assert_eq!(transport.calls, 3);
        assert_eq!(delay.0, vec![250, 750]);
    }

    #[test]
    fn not_found_is_not_retried() {
        let mut fetcher = ImageFetcher::new(
            MockTransport::new([Outcome::Fail(FetchError::NotFound), Outcome::Body(image(10))]),
            RecordingDelay::default(),
        );
        let mut sink = BufferSink::new(64);
        let result = block_on(fetcher.fetch(FetchRequest::new("http://h/a.jpg", &mut sink).with_retry(POLICY)));
        assert_eq!(result, Err(FetchError::NotFound));
        let (transport, delay) = fetcher.into_parts();
        assert_eq!(transport.calls, 1);
        assert!(delay.0.is_empty());
    }

    #[test]
    fn gives_up_after_max_attempts_with_last_error() {
        let mut fetcher = ImageFetcher::new(
            MockTransport::new([
                Outcome::Fail(REFUSED),
                Outcome::Fail(REFUSED),
                Outcome::DropAfter(image(10), ErrorKind::ConnectionReset),
            ]),
            RecordingDelay::default(),
        );
        let mut sink = BufferSink::new(64);
        let policy = RetryPolicy::new(3, 100, 2, 150);
        let result = block_on(fetcher.fetch(FetchRequest::new("http://h/a.jpg", &mut sink).with_retry(policy)));
        assert_eq!(result, Err(FetchError::Transport(TransportFault::Reset)));
        let (transport, delay) = fetcher.into_parts();
        assert_eq!(transport.calls, 3);
        // second delay capped at max_delay_ms
        assert_eq!(delay.0, vec![100, 150]);
    }

    #[test]
    fn busy_sink_is_retried() {
        let mut fetcher = ImageFetcher::new(
            MockTransport::new([
                Outcome::Body(image(200)),
                Outcome::Body(image(200)),
                Outcome::Body(image(200)),
            ]),
            RecordingDelay::default(),
        );
        let mut sink = FlakySink {
            inner: BufferSink::new(1024),
            busy: 2,
            begun: 0,
        };
        let report = block_on(fetcher.fetch(FetchRequest::new("http://h/a.jpg", &mut sink).with_retry(POLICY)));
        assert_eq!(report.map(|r| r.attempts), Ok(3));
        assert_eq!(sink.inner.len(), 200);
        let (transport, delay) = fetcher.into_parts();
        assert_eq!(transport.calls, 3);
        assert_eq!(delay.0, vec![250, 750]);
    }

    #[test]
    fn full_sink_fails_immediately() {
        let mut fetcher = ImageFetcher::new(
            MockTransport::new([Outcome::Body(image(2000)), Outcome::Body(image(2000))]),
            RecordingDelay::default(),
        );
        let mut sink = BufferSink::new(1000);
        let result = block_on(fetcher.fetch(FetchRequest::new("http://h/a.jpg", &mut sink).with_retry(POLICY)));
        assert_eq!(result, Err(FetchError::Sink(SinkError::Full)));
        assert_eq!(fetcher.into_parts().0.calls, 1);
    }

    #[test]
    fn announced_oversize_body_is_refused_before_reading() {
        let mut fetcher = ImageFetcher::new(
            MockTransport::new([Outcome::Declared(image(2000), 2000)]),
            RecordingDelay::default(),
        );
        let mut sink = BufferSink::new(1000);
        let result = block_on(fetcher.fetch(FetchRequest::new("http://h/a.jpg", &mut sink).with_retry(POLICY)));
        assert_eq!(result, Err(FetchError::Sink(SinkError::Full)));
        // nothing was copied into the buffer
        assert!(sink.is_empty());
        let (transport, delay) = fetcher.into_parts();
        assert_eq!(transport.calls, 1);
        assert!(delay.0.is_empty());
    }

    #[test]
    fn announced_body_within_capacity_is_fetched() {
        let mut fetcher = ImageFetcher::new(
            MockTransport::new([Outcome::Declared(image(1000), 1000)]),
            RecordingDelay::default(),
        );
        let mut sink = BufferSink::new(1000);
        let report = block_on(fetcher.fetch(FetchRequest::new("http://h/a.jpg", &mut sink)));
        assert_eq!(report.map(|r| r.bytes), Ok(1000));
        assert_eq!(sink.as_slice(), &image(1000)[..]);
    }

    #[test]
    fn empty_url_is_invalid() {
        let mut fetcher = ImageFetcher::new(MockTransport::new(Vec::<Outcome>::new()), RecordingDelay::default());
        let mut sink = BufferSink::new(16);
        let result = block_on(fetcher.fetch(FetchRequest::new("", &mut sink)));
        assert_eq!(result, Err(FetchError::InvalidUrl));
    }

    #[test]
    fn backoff_schedule_saturates() {
        let p = RetryPolicy::new(10, 500, 2, 4_000);
        let waits: Vec<u32> = (1..=6).map(|n| p.backoff(n)).collect();
        assert_eq!(waits, vec![500, 1000, 2000, 4000, 4000, 4000]);
        assert_eq!(RetryPolicy::new(10, u32::MAX, 10, u32::MAX).backoff(9), u32::MAX);
    }
}
