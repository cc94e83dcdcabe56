//! BLE LED node firmware entry point.
//!
//! A single characteristic toggles the user LED; the boot button toggles
//! it locally. Every change is notified to a subscribed central, and the
//! status LED mirrors the BLE connection.
#![deny(unused_must_use)]

use core::time::Duration;
use std::sync::Arc;

use anyhow::Result;
use esp_idf_svc::hal::gpio::{PinDriver, Pull};
use esp_idf_svc::hal::peripherals::Peripherals;
use log::{error, info};

use lampnode::ble::gatt;
use lampnode::ble::{LedNode, LedService};
use lampnode::bus::{Event, EventRouter, MessageBus};
use lampnode::config::NodeConfig;
use lampnode::drivers::button;
use lampnode::drivers::task_pin::{Core, TaskSpec};
use lampnode::error::Error;

const BUTTON_TASK: TaskSpec = TaskSpec::new(Core::App, 4, 3, "button\0");
const FATAL_GRACE: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("BLE LED node v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        error!("Fatal: {}, restarting in {:?}", e, FATAL_GRACE);
        std::thread::sleep(FATAL_GRACE);
        esp_idf_svc::hal::reset::restart();
    }
    Ok(())
}

fn run() -> Result<(), Error> {
    let config = NodeConfig::default();
    config.validate()?;

    let peripherals = Peripherals::take().map_err(|_| Error::Init("peripherals"))?;
    let (bus, handle) = MessageBus::new("led", config.led_queue_depth);

    let user_led =
        PinDriver::output(peripherals.pins.gpio2).map_err(|_| Error::Init("user LED gpio"))?;
    let status_led =
        PinDriver::output(peripherals.pins.gpio3).map_err(|_| Error::Init("status LED gpio"))?;

    let service = Arc::new(LedService::new(handle.clone()));
    let notifier = gatt::start(c"ble-led", Arc::clone(&service), handle.clone())?;

    let mut button_pin =
        PinDriver::input(peripherals.pins.gpio0).map_err(|_| Error::Init("button gpio"))?;
    button_pin.set_pull(Pull::Up).map_err(|_| Error::Init("button pull"))?;
    button::spawn_poller(
        BUTTON_TASK,
        button_pin,
        config.button_poll(),
        handle,
        Event::ToggleLed,
    )
    .map_err(|_| Error::Init("button thread"))?;

    let mut node = LedNode::new(user_led, status_led, notifier, service);
    node.start();
    info!("LED node ready. Entering event loop.");
    EventRouter::new("led").run(&bus, &mut node);

    Err(Error::Init("led bus closed"))
}
