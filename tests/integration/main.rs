//! Integration test driver for the `tests/integration/` submodules.
//!
//! Each `mod` below exercises one subsystem against the mock ports in
//! `mock_hw`. All tests run on the host with no hardware required.

mod connection_tests;
mod led_node_tests;
mod mock_hw;
mod thread_tests;
