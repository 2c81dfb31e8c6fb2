//! Firmata protocol engine, its pin model, sysex extensions and transports.

mod data;
mod extension;
pub mod firmata;
pub mod i2c;
mod transports;

pub use data::*;
pub use extension::Extension;
pub use firmata::{Firmata, FirmataOptions, StringCallback};
pub use i2c::{I2c, I2cKey};
pub(crate) use transports::private;
pub use transports::ble::{
    BleOptions, BleTransport, GattLink, LinkEvent, LinkEvents, LinkFactory, FIRMATA_SERVICE,
    RX_CHARACTERISTIC, TX_CHARACTERISTIC,
};
pub use transports::serial::Serial;
pub use transports::{PortDescriptor, Transport};
