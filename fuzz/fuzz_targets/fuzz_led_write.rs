//! Fuzz target: LED characteristic write handler
//!
//! Arbitrary payloads and offsets must either be accepted as exactly one
//! `SetLed` message or rejected with an ATT error and nothing posted.
//!
//! cargo fuzz run fuzz_led_write

#![no_main]

use core::time::Duration;

use libfuzzer_sys::fuzz_target;
use lampnode::ble::LedService;
use lampnode::bus::{Event, MessageBus};

fuzz_target!(|input: (u16, Vec<u8>)| {
    let (offset, data) = input;
    let (bus, handle) = MessageBus::new("led", 4);
    let service = LedService::new(handle);

    match service.on_write(&data, offset) {
        Ok(n) => {
            assert_eq!(n, 1);
            let msg = bus.receive(Some(Duration::ZERO)).expect("write must post");
            assert_eq!(Event::decode(&msg), Some(Event::SetLed(data[0] == 1)));
            assert!(bus.is_empty());
        }
        Err(_) => assert!(bus.is_empty(), "rejected write posted a message"),
    }
});
