//! Scripted collaborators for tests: transports, serial port and BLE link.

use std::time::Duration;

use crate::io::{Firmata, FirmataOptions};
use crate::mocks::transport::MockTransport;

pub mod link;
pub mod serial_port;
pub mod transport;

/// Replies of a small board to the bootstrap queries: version 2.5, firmware "Hi" v2.5, 3 pins
/// (pin 2 analog capable, bound to A0).
pub const BOOT_REPLIES: &[u8] = &[
    0xF9, 0x02, 0x05, // version
    0xF0, 0x79, 0x02, 0x05, 0x48, 0x00, 0x69, 0x00, 0xF7, // firmware
    0xF0, 0x6C, 0x00, 0x01, 0x01, 0x01, 0x7F, 0x01, 0x01, 0x03, 0x08, 0x7F, 0x02, 0x0A, 0x7F,
    0xF7, // capabilities
    0xF0, 0x6A, 0x7F, 0x7F, 0x00, 0xF7, // analog mapping
];

/// A ready engine on a [`MockTransport`] fed with [`BOOT_REPLIES`], with its write history
/// cleared. The returned transport shares its state with the engine's.
pub fn create_ready_firmata() -> (Firmata, MockTransport) {
    let transport = MockTransport::with_incoming(BOOT_REPLIES);
    let options = FirmataOptions::default().with_timeout(Duration::from_millis(100));
    let firmata = match Firmata::new(transport.clone(), options) {
        Ok(firmata) => firmata,
        Err(error) => panic!("Mock engine creation failed: {}", error),
    };
    transport.take_written();
    (firmata, transport)
}
