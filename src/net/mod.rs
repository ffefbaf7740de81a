// WiFi station link.
//
// Owns the radio controller, the embassy-net stack and its runner. No
// embassy task is spawned for the runner: callers hand their network
// future to `Link::drive`, which multiplexes it with the runner via
// `select`, so the stack only runs while something needs it.
//
// Phases: radio init (once, at boot) -> `connect` (associate with a 10 s
// timeout, then DHCP) -> any number of `drive` calls -> optionally
// `disconnect`. `connect` is cheap to call again when the link is
// already up, and re-associates after a `disconnect`.

pub mod http;

use alloc::string::String;
use core::future::Future;

use embassy_futures::select::{Either, select};
use embassy_net::{Runner, Stack, StackResources};
use embassy_time::{Duration, with_timeout};
use esp_hal::peripherals::WIFI;
use esp_radio::wifi::{ClientConfig, Config, ModeConfig, WifiController, WifiDevice};
use log::{info, warn};
use static_cell::StaticCell;

pub use http::HttpTransport;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DHCP_TIMEOUT: Duration = Duration::from_secs(20);

// sockets: one TCP for HTTP, one UDP for DHCP, one spare
const SOCKETS: usize = 3;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
static RESOURCES: StaticCell<StackResources<SOCKETS>> = StaticCell::new();

pub struct Credentials<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    Radio,
    Config,
    Start,
    Associate,
    /// No association within the connect timeout.
    Timeout,
    Dhcp,
}

impl core::fmt::Display for NetError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            NetError::Radio => "radio init failed",
            NetError::Config => "WiFi config rejected",
            NetError::Start => "WiFi start failed",
            NetError::Associate => "association failed",
            NetError::Timeout => "association timed out",
            NetError::Dhcp => "no DHCP lease",
        })
    }
}

pub struct Link {
    controller: WifiController<'static>,
    runner: Runner<'static, WifiDevice<'static>>,
    stack: Stack<'static>,
    started: bool,
}

impl Link {
    /// Bring up the radio and the IP stack. Call once.
    pub fn new(wifi: WIFI<'static>) -> Result<Self, NetError> {
        let radio = esp_radio::init().map_err(|e| {
            warn!("net: radio init failed: {:?}", e);
            NetError::Radio
        })?;
        let radio: &'static esp_radio::Controller<'static> = RADIO.init(radio);

        let (controller, interfaces) =
            esp_radio::wifi::new(radio, wifi, Config::default()).map_err(|e| {
                warn!("net: wifi::new failed: {:?}", e);
                NetError::Radio
            })?;

        let net_config = embassy_net::Config::dhcpv4(Default::default());
        let seed = {
            let rng = esp_hal::rng::Rng::new();
            (rng.random() as u64) << 32 | rng.random() as u64
        };
        let resources = RESOURCES.init(StackResources::new());
        let (stack, runner) = embassy_net::new(interfaces.sta, net_config, resources, seed);

        Ok(Self {
            controller,
            runner,
            stack,
            started: false,
        })
    }

    pub fn stack(&self) -> Stack<'static> {
        self.stack
    }

    pub fn is_up(&self) -> bool {
        self.stack.is_link_up() && self.stack.is_config_up()
    }

    /// Associate with `creds` and wait for a DHCP lease.
    pub async fn connect(&mut self, creds: &Credentials<'_>) -> Result<(), NetError> {
        if self.is_up() {
            return Ok(());
        }

        let client_cfg = ClientConfig::default()
            .with_ssid(String::from(creds.ssid))
            .with_password(String::from(creds.password));
        self.controller
            .set_config(&ModeConfig::Client(client_cfg))
            .map_err(|e| {
                warn!("net: set_config failed: {:?}", e);
                NetError::Config
            })?;

        if !self.started {
            self.controller.start_async().await.map_err(|e| {
                warn!("net: start failed: {:?}", e);
                NetError::Start
            })?;
            self.started = true;
        }

        info!("net: connecting to '{}'", creds.ssid);
        match with_timeout(CONNECT_TIMEOUT, self.controller.connect_async()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("net: connect failed: {:?}", e);
                return Err(NetError::Associate);
            }
            Err(_) => {
                warn!("net: no association after {} s", CONNECT_TIMEOUT.as_secs());
                return Err(NetError::Timeout);
            }
        }

        let stack = self.stack;
        self.drive(with_timeout(DHCP_TIMEOUT, stack.wait_config_up()))
            .await
            .map_err(|_| NetError::Dhcp)?;

        if let Some(cfg) = self.stack.config_v4() {
            info!("net: up, address {}", cfg.address.address());
        }
        Ok(())
    }

    /// Signal strength of the current association in dBm.
    pub fn rssi(&self) -> Option<i32> {
        if !self.is_up() {
            return None;
        }
        match self.controller.rssi() {
            Ok(dbm) => Some(dbm),
            Err(e) => {
                warn!("net: rssi unavailable: {:?}", e);
                None
            }
        }
    }

    /// Leave the access point. The radio stays started.
    pub async fn disconnect(&mut self) {
        if !self.started || !self.stack.is_link_up() {
            return;
        }
        match self.controller.disconnect_async().await {
            Ok(()) => info!("net: disconnected"),
            Err(e) => warn!("net: disconnect failed: {:?}", e),
        }
    }

    /// Run `fut` to completion while servicing the network stack.
    pub async fn drive<F: Future>(&mut self, fut: F) -> F::Output {
        match select(self.runner.run(), fut).await {
            Either::Second(out) => out,
            // runner.run() returns `!`, this arm is unreachable
            Either::First(_) => unreachable!(),
        }
    }
}
