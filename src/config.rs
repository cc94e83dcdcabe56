//! Node configuration parameters
//!
//! All tunable parameters for the lamp and LED nodes. Defaults match the
//! companion controller's factory setup; the server host and WiFi
//! credentials can be overridden at build time through `LAMP_SERVER_HOST`,
//! `LAMP_WIFI_SSID` and `LAMP_WIFI_PASS`.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SERVER_HOST: &str = "unihiker.local";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Boot button on the XIAO ESP32-S3.
pub const BOOT_BUTTON_GPIO: u16 = 0;

const MAX_HOST_LEN: usize = 64;
const MAX_SSID_LEN: usize = 32;
const MIN_WPA2_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Companion controller ---
    /// Hostname (mDNS or DNS) of the TCP server.
    pub server_host: heapless::String<MAX_HOST_LEN>,
    pub server_port: u16,

    // --- Connection policy ---
    /// Wait after a session ends before reconnecting.
    pub reconnect_cooldown_ms: u32,
    /// Upper bound on a single `connect()` attempt.
    pub connect_timeout_ms: u32,

    // --- Buses ---
    /// How long a thread handler may block when the target bus is full.
    pub post_timeout_ms: u32,
    pub main_queue_depth: usize,
    pub panel_queue_depth: usize,
    pub led_queue_depth: usize,

    // --- Timing ---
    /// Period of the device-protocol thread's software timer.
    pub timer_period_ms: u32,
    /// Button sampling period.
    pub button_poll_ms: u32,
    pub button_gpio: u16,

    // --- WiFi ---
    pub wifi_ssid: heapless::String<MAX_SSID_LEN>,
    pub wifi_password: heapless::String<MAX_PASSWORD_LEN>,
}

/// Build-time overrides, checked against the field capacities at compile
/// time.
const BUILD_SERVER_HOST: &str = match option_env!("LAMP_SERVER_HOST") {
    Some(host) => host,
    None => DEFAULT_SERVER_HOST,
};
const BUILD_WIFI_SSID: &str = match option_env!("LAMP_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "",
};
const BUILD_WIFI_PASS: &str = match option_env!("LAMP_WIFI_PASS") {
    Some(pass) => pass,
    None => "",
};

const _: () = assert!(BUILD_SERVER_HOST.len() <= MAX_HOST_LEN, "LAMP_SERVER_HOST is too long");
const _: () = assert!(BUILD_WIFI_SSID.len() <= MAX_SSID_LEN, "LAMP_WIFI_SSID is too long");
const _: () = assert!(BUILD_WIFI_PASS.len() <= MAX_PASSWORD_LEN, "LAMP_WIFI_PASS is too long");

/// Copy `s` into a fixed-capacity field; overlong input is `err`, never
/// truncated.
fn fit<const N: usize>(s: &str, err: ConfigError) -> Result<heapless::String<N>, ConfigError> {
    heapless::String::try_from(s).map_err(|_| err)
}

impl Default for NodeConfig {
    fn default() -> Self {
        let factory = Self {
            server_host: heapless::String::new(),
            server_port: DEFAULT_SERVER_PORT,

            reconnect_cooldown_ms: 3000,
            connect_timeout_ms: 5000,

            post_timeout_ms: 100,
            main_queue_depth: 128,
            panel_queue_depth: 128,
            led_queue_depth: 32,

            timer_period_ms: 1000, // 1 Hz
            button_poll_ms: 10,
            button_gpio: BOOT_BUTTON_GPIO,

            wifi_ssid: heapless::String::new(),
            wifi_password: heapless::String::new(),
        };
        // Lengths are asserted above, so this cannot fail.
        factory
            .clone()
            .with_overrides(BUILD_SERVER_HOST, BUILD_WIFI_SSID, BUILD_WIFI_PASS)
            .unwrap_or(factory)
    }
}

impl NodeConfig {
    /// Replace the server host and station credentials. Values that do not
    /// fit their field are rejected rather than cut short.
    pub fn with_overrides(
        mut self,
        host: &str,
        ssid: &str,
        password: &str,
    ) -> Result<Self, ConfigError> {
        self.server_host = fit(host, ConfigError::InvalidServerHost)?;
        self.wifi_ssid = fit(ssid, ConfigError::InvalidSsid)?;
        self.wifi_password = fit(password, ConfigError::InvalidPassword)?;
        Ok(self)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(u64::from(self.reconnect_cooldown_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.connect_timeout_ms))
    }

    pub fn post_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.post_timeout_ms))
    }

    pub fn timer_period(&self) -> Duration {
        Duration::from_millis(u64::from(self.timer_period_ms))
    }

    pub fn button_poll(&self) -> Duration {
        Duration::from_millis(u64::from(self.button_poll_ms))
    }

    /// Parse a JSON override document; missing fields are an error.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|_| ConfigError::Parse)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_host.is_empty() {
            return Err(ConfigError::EmptyServerHost);
        }
        if self.server_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.main_queue_depth == 0 || self.panel_queue_depth == 0 || self.led_queue_depth == 0 {
            return Err(ConfigError::ZeroQueueDepth);
        }
        if self.timer_period_ms == 0 || self.button_poll_ms == 0 {
            return Err(ConfigError::ZeroPeriod);
        }
        if !self.wifi_ssid.is_empty() {
            validate_ssid(&self.wifi_ssid)?;
            validate_password(&self.wifi_password)?;
        }
        Ok(())
    }

    /// Whether station credentials were provided.
    pub fn has_wifi_credentials(&self) -> bool {
        !self.wifi_ssid.is_empty()
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

pub fn validate_ssid(ssid: &str) -> Result<(), ConfigError> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_LEN || !is_printable_ascii(ssid) {
        return Err(ConfigError::InvalidSsid);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ConfigError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < MIN_WPA2_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return Err(ConfigError::InvalidPassword);
    }
    Ok(())
}
