#![doc(html_root_url = "https://docs.rs/firmata-bridge/0.1.0")]

//! <h1 align="center">FIRMATA-BRIDGE</h1>
//! <div style="text-align:center;font-style:italic;">A Firmata protocol client engine, over serial or Bluetooth LE - written in Rust.</div>
//! <br/>
//!
//! # Features
//!
//! **Firmata-Bridge** drives microcontrollers running a [Firmata](https://github.com/firmata/protocol)
//! sketch (StandardFirmata, StandardFirmataBLE, ...) from the host side:
//!
//! - The [`Firmata`](io::Firmata) engine encodes commands, decodes the incoming byte stream and keeps a
//!   [`Pins`](io::Pins) model in sync with the device.
//! - Sysex sub-protocols plug in as [`Extension`](io::Extension)s: [`I2c`](io::I2c) is provided.
//! - Any byte link can carry the protocol through the [`Transport`](io::Transport) trait:
//!   [`Serial`](io::Serial) and [`BleTransport`](io::BleTransport) are provided. The latter drives any
//!   BLE stack implementing [`GattLink`](io::GattLink).
//!
//! # Prerequisites
//!
//! - [StandardFirmata.ino](https://github.com/firmata/arduino/blob/main/examples/StandardFirmata/StandardFirmata.ino)
//!   (or a compatible sketch) **MUST** be installed on the board.
//!
//! # Getting Started
//!
//! The following code blinks the Arduino embedded led on pin 13.
//! ```no_run
//! use std::time::Duration;
//! use firmata_bridge::io::{Firmata, FirmataOptions, PinModeId, Serial};
//!
//! let mut firmata = Firmata::new(Serial::default(), FirmataOptions::default())?;
//! firmata.pin_mode(13, PinModeId::OUTPUT)?;
//! for state in [true, false].into_iter().cycle().take(10) {
//!     firmata.digital_write(13, state)?;
//!     std::thread::sleep(Duration::from_millis(500));
//! }
//! # Ok::<(), firmata_bridge::errors::Error>(())
//! ```
//!
//! # Logging
//!
//! Diagnostics go through the [`log`](https://docs.rs/log) facade. Each component carries its own
//! [`Tracer`](utils::Tracer) (target + level) in its options: `firmata::engine`, `firmata::i2c`,
//! `firmata::ble` and `firmata::serial`.
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates `serialport` crate _libudev_ feature under-the-hood (required on Linux only for port listing).
//! - **serde** -- Enables serialize/deserialize capabilities for data types and options.
//! - **mocks** -- Provides mocked transports and BLE link (useful for tests mostly).

pub mod errors;
pub mod io;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod utils;
