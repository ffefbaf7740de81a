// HTTP GET over an embassy-net TCP socket.
//
// One connection per request (HTTP/1.0, `Connection: close`). Hosts must
// be IPv4 literals; the frame talks to a server on the local network and
// carries no DNS resolver. Request and response framing live in
// `frame_core::http`, this file only owns the socket.

use alloc::vec;
use alloc::vec::Vec;

use embassy_net::tcp::{ConnectError, TcpSocket};
use embassy_net::{IpAddress, IpEndpoint, Ipv4Address, Stack};
use embassy_time::Duration;
use embedded_io_async::Write as AsyncWrite;
use frame_core::http::{self, HttpBody, HttpUrl, MAX_HEAD};
use frame_core::{FetchError, Transport, TransportFault};
use log::{debug, warn};

const RX_BUF: usize = 4096;
const TX_BUF: usize = 512;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpTransport {
    stack: Stack<'static>,
    rx: Vec<u8>,
    tx: Vec<u8>,
    head: Vec<u8>,
}

impl HttpTransport {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            rx: vec![0; RX_BUF],
            tx: vec![0; TX_BUF],
            head: vec![0; MAX_HEAD],
        }
    }
}

impl Transport for HttpTransport {
    type Body<'a> = HttpBody<'a, TcpSocket<'a>>;

    async fn get(&mut self, url: &str) -> Result<Self::Body<'_>, FetchError> {
        let url = HttpUrl::parse(url)?;
        let addr: Ipv4Address = url.host.parse().map_err(|_| {
            warn!("http: '{}' is not an IPv4 address", url.host);
            FetchError::InvalidUrl
        })?;

        let HttpTransport {
            stack,
            rx,
            tx,
            head,
        } = self;
        let mut socket = TcpSocket::new(*stack, rx, tx);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        debug!("http: connecting to {}:{}", addr, url.port);
        socket
            .connect(IpEndpoint::new(IpAddress::Ipv4(addr), url.port))
            .await
            .map_err(connect_fault)?;

        let request = url.request_head();
        socket
            .write_all(request.as_bytes())
            .await
            .map_err(|_| FetchError::Transport(TransportFault::Reset))?;
        socket
            .flush()
            .await
            .map_err(|_| FetchError::Transport(TransportFault::Reset))?;

        http::read_response(socket, head).await
    }

    fn body_len<'a>(body: &Self::Body<'a>) -> Option<usize>
    where
        Self: 'a,
    {
        body.remaining()
    }
}

fn connect_fault(e: ConnectError) -> FetchError {
    let fault = match e {
        // RST in reply to our SYN
        ConnectError::ConnectionReset => TransportFault::ConnectionRefused,
        ConnectError::TimedOut => TransportFault::Timeout,
        ConnectError::NoRoute => TransportFault::Unreachable,
        _ => TransportFault::Protocol,
    };
    FetchError::Transport(fault)
}
