//! miaolink - BLE central driver for MiaoMiao-style sensor transmitters.
//!
//! A transmitter clips onto a glucose sensor, reads it over NFC, and
//! streams the result to the host every five minutes as a 363-byte
//! envelope split across Nordic-UART notifications. This crate
//! reassembles those envelopes and decodes them into typed readings.
//!
//! The library is `no_std` and radio-agnostic: the platform supplies a
//! [`ble::Transport`] and a [`ble::FragmentSource`]. On nRF52 targets the
//! `embedded` feature provides both on top of `nrf-softdevice`.
//!
//! Host tests: `cargo test`.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;
pub mod state;
pub mod time;

pub use config::SessionConfig;
pub use error::{AttachError, Error, MalformedPacket, TransportError};
pub use protocol::{DevicePacket, DeviceReading, SensorPayload, SensorReading, SensorStatus, SerialNumber};
pub use session::{Emitter, Session};
pub use state::{ConnectionState, DeviceState, LinkState};
pub use time::Timestamp;
