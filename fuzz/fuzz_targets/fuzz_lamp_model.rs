//! Fuzz target: `LampModel::parse` and the receive-path decoder
//!
//! Feeds arbitrary bytes as one received chunk. Parsing must never panic,
//! a failed parse must leave the previous content untouched, and anything
//! that parses must survive a stringify/parse cycle.
//!
//! cargo fuzz run fuzz_lamp_model

#![no_main]

use libfuzzer_sys::fuzz_target;
use lampnode::model::LampModel;
use lampnode::net::connection::{RX_BUFFER_LEN, decode_chunk};

fuzz_target!(|data: &[u8]| {
    let chunk = &data[..data.len().min(RX_BUFFER_LEN)];
    let _ = decode_chunk(chunk);

    let Ok(text) = core::str::from_utf8(chunk) else {
        return;
    };
    let previous = LampModel::build("lamp-esp", "update", 0, 1);
    let mut model = previous.clone();
    match model.parse(Some(text)) {
        Ok(()) => {
            let again = model.stringify().expect("parsed model must encode");
            let mut reparsed = LampModel::default();
            reparsed.parse(Some(&again)).expect("encoded model must parse");
            assert_eq!(reparsed, model);
        }
        Err(_) => assert_eq!(model, previous, "failed parse mutated the model"),
    }
});
