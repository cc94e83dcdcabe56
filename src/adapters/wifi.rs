//! WiFi station bring-up and link supervision.
//!
//! The network stack reports IP acquired / lost through the system event
//! loop; [`LinkMonitor`] turns those callbacks into
//! `System.NetworkAvailable` messages on the device-protocol bus, posting
//! only on transitions and always with zero timeout.
//!
//! [`StationSupervisor`] keeps the station associated: while the link is
//! down it retries with exponential backoff (2 s → 4 s → 8 s … capped at
//! 60 s).
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: [`EspStation`] wraps `esp_idf_svc::wifi`.
//! - **all other targets**: the supervisor runs against any [`StationLink`].

use core::time::Duration;
use std::thread::JoinHandle;
use std::time::Instant;

use log::{info, warn};

use crate::bus::{BusHandle, Event, PostError};
use crate::drivers::task_pin::{self, TaskSpec};
use crate::error::Error;

const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

// ───────────────────────────────────────────────────────────────
// Link events
// ───────────────────────────────────────────────────────────────

/// Converts IP-layer callbacks into `NetworkAvailable` messages.
#[derive(Debug)]
pub struct LinkMonitor {
    bus: BusHandle,
    last: Option<bool>,
}

impl LinkMonitor {
    pub fn new(bus: BusHandle) -> Self {
        Self { bus, last: None }
    }

    pub fn is_up(&self) -> bool {
        self.last == Some(true)
    }

    /// Record the link state. Returns `true` when a message was posted.
    pub fn report(&mut self, up: bool) -> bool {
        if self.last == Some(up) {
            return false;
        }
        self.last = Some(up);
        info!("WiFi: IP {}", if up { "acquired" } else { "lost" });
        match self.bus.post_event(Event::NetworkAvailable(up), Duration::ZERO) {
            Ok(()) => true,
            Err(PostError::Full) => {
                // Forget the edge so the next callback reposts it.
                self.last = None;
                false
            }
            Err(PostError::Closed) => false,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Station supervision
// ───────────────────────────────────────────────────────────────

/// The station side of the WiFi driver.
pub trait StationLink: Send + 'static {
    /// Associate and wait for the interface to come up.
    fn connect(&mut self) -> Result<(), Error>;
    fn is_connected(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connected,
    Reconnecting { attempt: u32 },
}

#[derive(Debug)]
pub struct StationSupervisor<L> {
    link: L,
    state: WifiState,
    backoff: Duration,
    next_attempt: Option<Instant>,
}

impl<L: StationLink> StationSupervisor<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            state: WifiState::Disconnected,
            backoff: INITIAL_BACKOFF,
            next_attempt: None,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn tick(&mut self, now: Instant) {
        match self.state {
            WifiState::Connected => {
                if !self.link.is_connected() {
                    warn!("WiFi: association lost, reconnecting");
                    self.state = WifiState::Reconnecting { attempt: 0 };
                    self.next_attempt = Some(now);
                }
            }
            WifiState::Disconnected => self.attempt(now, 0),
            WifiState::Reconnecting { attempt } => {
                if self.next_attempt.is_none_or(|at| now >= at) {
                    self.attempt(now, attempt);
                }
            }
        }
    }

    fn attempt(&mut self, now: Instant, attempt: u32) {
        match self.link.connect() {
            Ok(()) => {
                info!("WiFi: station connected (attempt {})", attempt + 1);
                self.state = WifiState::Connected;
                self.backoff = INITIAL_BACKOFF;
                self.next_attempt = None;
            }
            Err(e) => {
                warn!("WiFi: connect failed: {} (retry in {:?})", e, self.backoff);
                self.state = WifiState::Reconnecting { attempt: attempt + 1 };
                self.next_attempt = Some(now + self.backoff);
                self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Run the supervisor on its own thread, ticking every `period`.
pub fn spawn_supervisor<L: StationLink>(
    spec: TaskSpec,
    link: L,
    period: Duration,
) -> std::io::Result<JoinHandle<()>> {
    task_pin::spawn_on_core(spec, move || {
        let mut supervisor = StationSupervisor::new(link);
        loop {
            supervisor.tick(Instant::now());
            std::thread::sleep(period);
        }
    })
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF station
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp::{EspStation, subscribe_ip_events};

#[cfg(target_os = "espidf")]
mod esp {
    use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::ipv4::IpEvent;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
    use log::{info, warn};

    use super::{LinkMonitor, StationLink};
    use crate::bus::BusHandle;
    use crate::config::NodeConfig;
    use crate::error::{ConfigError, Error};

    pub struct EspStation {
        wifi: BlockingWifi<EspWifi<'static>>,
    }

    impl EspStation {
        pub fn new(
            modem: Modem,
            sysloop: EspSystemEventLoop,
            nvs: Option<EspDefaultNvsPartition>,
            config: &NodeConfig,
        ) -> Result<Self, Error> {
            if !config.has_wifi_credentials() {
                return Err(Error::Config(ConfigError::InvalidSsid));
            }
            let esp_wifi = EspWifi::new(modem, sysloop.clone(), nvs)
                .map_err(|_| Error::Init("wifi driver"))?;
            let mut wifi =
                BlockingWifi::wrap(esp_wifi, sysloop).map_err(|_| Error::Init("wifi wrap"))?;

            let auth_method = if config.wifi_password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            };
            wifi.set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: config
                    .wifi_ssid
                    .as_str()
                    .try_into()
                    .map_err(|_| Error::Config(ConfigError::InvalidSsid))?,
                password: config
                    .wifi_password
                    .as_str()
                    .try_into()
                    .map_err(|_| Error::Config(ConfigError::InvalidPassword))?,
                auth_method,
                ..Default::default()
            }))
            .map_err(|_| Error::Init("wifi configuration"))?;
            wifi.start().map_err(|_| Error::Init("wifi start"))?;
            info!("WiFi: station started for '{}'", config.wifi_ssid);
            Ok(Self { wifi })
        }
    }

    impl StationLink for EspStation {
        fn connect(&mut self) -> Result<(), Error> {
            self.wifi.connect().map_err(|e| {
                warn!("WiFi: connect: {}", e);
                Error::Init("wifi connect")
            })?;
            self.wifi.wait_netif_up().map_err(|e| {
                warn!("WiFi: netif: {}", e);
                Error::Init("wifi netif")
            })
        }

        fn is_connected(&self) -> bool {
            self.wifi.is_connected().unwrap_or(false)
        }
    }

    /// Forward IP acquired / lost to `bus`. Keep the subscription alive for
    /// as long as the events are wanted.
    pub fn subscribe_ip_events(
        sysloop: &EspSystemEventLoop,
        bus: BusHandle,
    ) -> Result<EspSubscription<'static, System>, Error> {
        let mut monitor = LinkMonitor::new(bus);
        sysloop
            .subscribe::<IpEvent, _>(move |event| match event {
                IpEvent::DhcpIpAssigned(_) => {
                    monitor.report(true);
                }
                IpEvent::DhcpIpDeassigned(_) => {
                    monitor.report(false);
                }
                _ => {}
            })
            .map_err(|_| Error::Init("ip event subscription"))
    }
}

#[cfg(not(target_os = "espidf"))]
pub use sim::SimStation;

#[cfg(not(target_os = "espidf"))]
mod sim {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use log::info;

    use super::StationLink;
    use crate::error::Error;

    /// Host stand-in: fails the first `fail_first` attempts, then connects.
    /// The association can be dropped from another thread via [`SimStation::link_flag`].
    #[derive(Debug, Clone)]
    pub struct SimStation {
        up: Arc<AtomicBool>,
        fail_first: u32,
        attempts: Arc<AtomicU32>,
    }

    impl SimStation {
        pub fn new(fail_first: u32) -> Self {
            Self {
                up: Arc::new(AtomicBool::new(false)),
                fail_first,
                attempts: Arc::new(AtomicU32::new(0)),
            }
        }

        pub fn link_flag(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.up)
        }

        pub fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::Acquire)
        }
    }

    impl StationLink for SimStation {
        fn connect(&mut self) -> Result<(), Error> {
            let n = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
            if n <= self.fail_first {
                return Err(Error::Init("wifi connect"));
            }
            info!("WiFi(sim): associated (attempt {})", n);
            self.up.store(true, Ordering::Release);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.up.load(Ordering::Acquire)
        }
    }
}
