//! Lamp node firmware entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  callbacks (IP events, button poll, 1 Hz timer)                  │
//! │        │ post, zero timeout                                      │
//! │        ▼                                                         │
//! │  ┌──────────────┐  DeviceUpdate   ┌───────────────────┐          │
//! │  │  main bus    │ ──────────────▶ │    panel bus      │          │
//! │  │  MainQueue   │ ◀────────────── │   PanelThread     │          │
//! │  │  (app, core1)│   UserCommand   │ (protocol, core0) │          │
//! │  └──────────────┘                 └─────────┬─────────┘          │
//! │         │                                   │ owns               │
//! │         ▼                                   ▼                    │
//! │   LightDevice ── RGB LEDC          ConnectionManager ── tcp-rx   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::time::Duration;

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{PinDriver, Pull};
use esp_idf_svc::hal::ledc::{LedcDriver, LedcTimerDriver, config::TimerConfig};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::FromValueType;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use lampnode::adapters::wifi::{self, EspStation};
use lampnode::app::{AppContext, MainQueue, PanelThread};
use lampnode::bus::{Event, EventRouter};
use lampnode::config::NodeConfig;
use lampnode::device::{LightConfig, LightDevice, LocalAttributeStore};
use lampnode::drivers::button;
use lampnode::drivers::led::RgbLightDriver;
use lampnode::drivers::task_pin::{self, Core, TaskSpec};
use lampnode::drivers::ticker;
use lampnode::error::Error;
use lampnode::net::{
    ConnectionManager, ConnectionSettings, PROTOCOL_TASK_PRIORITY, TcpSocketFactory,
};

const PANEL_TASK: TaskSpec = TaskSpec::new(Core::Pro, PROTOCOL_TASK_PRIORITY, 8, "panel\0");
const TIMER_TASK: TaskSpec = TaskSpec::new(Core::Pro, 4, 3, "timer\0");
const BUTTON_TASK: TaskSpec = TaskSpec::new(Core::App, 4, 3, "button\0");
const WIFI_TASK: TaskSpec = TaskSpec::new(Core::Pro, 3, 6, "wifi-sup\0");

const PANEL_TIMER_ID: u32 = 1;
const WIFI_POLL: Duration = Duration::from_secs(1);
const FATAL_GRACE: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  LampNode v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    if let Err(e) = run() {
        fatal(e);
    }
    Ok(())
}

/// Logs flush during the grace period, then the chip restarts.
fn fatal(e: Error) -> ! {
    error!("Fatal: {}, restarting in {:?}", e, FATAL_GRACE);
    std::thread::sleep(FATAL_GRACE);
    esp_idf_svc::hal::reset::restart()
}

fn run() -> Result<(), Error> {
    // ── Config ────────────────────────────────────────────────
    let config = NodeConfig::default();
    config.validate()?;
    info!(
        "Config: server {}:{}, cooldown {:?}",
        config.server_host,
        config.server_port,
        config.reconnect_cooldown()
    );

    let peripherals = Peripherals::take().map_err(|_| Error::Init("peripherals"))?;
    let sysloop = EspSystemEventLoop::take().map_err(|_| Error::Init("event loop"))?;
    let nvs = match EspDefaultNvsPartition::take() {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("NVS unavailable ({}), WiFi calibration not persisted", e);
            None
        }
    };

    // ── Buses ─────────────────────────────────────────────────
    let (ctx, buses) = AppContext::new(&config);

    // ── Light endpoint ────────────────────────────────────────
    let store = LocalAttributeStore::new(&LightConfig::default());

    let timer = LedcTimerDriver::new(
        peripherals.ledc.timer0,
        &TimerConfig::default().frequency(5.kHz().into()),
    )
    .map_err(|_| Error::Init("ledc timer"))?;
    let red = LedcDriver::new(peripherals.ledc.channel0, &timer, peripherals.pins.gpio4)
        .map_err(|_| Error::Init("ledc red"))?;
    let green = LedcDriver::new(peripherals.ledc.channel1, &timer, peripherals.pins.gpio5)
        .map_err(|_| Error::Init("ledc green"))?;
    let blue = LedcDriver::new(peripherals.ledc.channel2, &timer, peripherals.pins.gpio6)
        .map_err(|_| Error::Init("ledc blue"))?;

    let mut light = LightDevice::new(store, RgbLightDriver::new(red, green, blue));
    // Bring the LEDs in line with the stored attributes.
    let state = light.get_state()?;
    light.set_state(state)?;
    info!("Lamp: initial state {:?}", state);

    // ── Device-protocol thread ────────────────────────────────
    let panel_ctx = ctx.clone();
    let panel_bus = buses.panel;
    let settings = ConnectionSettings::from_config(&config);
    task_pin::spawn_on_core(PANEL_TASK, move || {
        let connection = ConnectionManager::new(TcpSocketFactory, settings, panel_ctx.panel.clone());
        let mut panel = PanelThread::new(panel_ctx, connection);
        EventRouter::new("panel").run(&panel_bus, &mut panel);
    })
    .map_err(|_| Error::Init("panel thread"))?;

    // ── Timer and input threads ───────────────────────────────
    ticker::spawn_ticker(TIMER_TASK, PANEL_TIMER_ID, config.timer_period(), ctx.panel.clone())
        .map_err(|_| Error::Init("timer thread"))?;

    let mut boot_pin =
        PinDriver::input(peripherals.pins.gpio0).map_err(|_| Error::Init("button gpio"))?;
    boot_pin.set_pull(Pull::Up).map_err(|_| Error::Init("button pull"))?;
    button::spawn_poller(
        BUTTON_TASK,
        boot_pin,
        config.button_poll(),
        ctx.main.clone(),
        Event::ButtonClick { pin: config.button_gpio },
    )
    .map_err(|_| Error::Init("button thread"))?;

    // ── WiFi ──────────────────────────────────────────────────
    let _ip_events = wifi::subscribe_ip_events(&sysloop, ctx.panel.clone())?;
    match EspStation::new(peripherals.modem, sysloop.clone(), nvs, &config) {
        Ok(station) => {
            wifi::spawn_supervisor(WIFI_TASK, station, WIFI_POLL)
                .map_err(|_| Error::Init("wifi thread"))?;
        }
        Err(Error::Config(e)) => warn!("WiFi: not started ({}), running offline", e),
        Err(e) => return Err(e),
    }

    // ── Application loop ──────────────────────────────────────
    info!("System ready. Entering event loop.");
    let boot_button = config.button_gpio;
    let mut app = MainQueue::new(ctx, light, boot_button);
    EventRouter::new("main").run(&buses.main, &mut app);

    Err(Error::Init("main bus closed"))
}
