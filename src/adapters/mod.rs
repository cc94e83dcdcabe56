//! Adapters for platform services the lamp node consumes.
//!
//! | Adapter | Provides                     | Connects to      |
//! |---------|------------------------------|------------------|
//! | `wifi`  | `StationLink`, `LinkMonitor` | ESP-IDF WiFi STA |

pub mod wifi;
