//! I2C over Firmata: <https://github.com/firmata/protocol/blob/master/i2c.md>

use std::collections::HashMap;
use std::sync::Arc;

use log::LevelFilter;
use parking_lot::RwLock;

use crate::errors::Error;
use crate::io::firmata::constants::*;
use crate::io::{Extension, Firmata};
use crate::utils::{format_as_hex, from_7bit_pair, to_7bit_pair, tracer, Tracer};

/// Identifies a reply stream: device address (7 or 10 bits) and register, `None` when the
/// request did not specify one.
pub type I2cKey = (u16, Option<u16>);

#[derive(Clone, Debug, Default)]
struct I2cEntry {
    reporting: bool,
    data: Vec<u8>,
}

type I2cTable = Arc<RwLock<HashMap<I2cKey, I2cEntry>>>;

/// Handle on the I2C devices of a board.
///
/// Creating it registers a reply handler into the engine: both share the table of last replies,
/// so the handle can be cloned and kept apart from the engine. Requests go through the engine
/// given to each call.
///
/// # Example
/// ```no_run
/// use firmata_bridge::io::{Firmata, FirmataOptions, I2c, Serial};
///
/// let mut firmata = Firmata::new(Serial::default(), FirmataOptions::default())?;
/// let i2c = I2c::new(&mut firmata);
/// i2c.config(&mut firmata, 0)?;
/// let whoami = i2c.read_once(&mut firmata, 0x68, Some(0x75), 1)?;
/// println!("WHO_AM_I: {:?}", whoami);
/// # Ok::<(), firmata_bridge::errors::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct I2c {
    table: I2cTable,
    tracer: Tracer,
}

impl I2c {
    /// Creates the handle and registers its reply handler into `firmata`.
    pub fn new(firmata: &mut Firmata) -> Self {
        Self::with_tracer(firmata, Tracer::new("firmata::i2c", LevelFilter::Warn))
    }

    /// Same as [`I2c::new`] with a custom tracer.
    pub fn with_tracer(firmata: &mut Firmata, tracer: Tracer) -> Self {
        let i2c = Self {
            table: Arc::new(RwLock::new(HashMap::new())),
            tracer,
        };
        firmata.register_extension(I2cReplyHandler {
            table: i2c.table.clone(),
            tracer,
        });
        i2c
    }

    /// Configures the `delay` in microseconds for I2C devices that require a delay between when the
    /// register is written to and the data in that register can be read.
    pub fn config(&self, firmata: &mut Firmata, delay_us: u16) -> Result<(), Error> {
        let [lsb, msb] = to_7bit_pair(delay_us as u32);
        firmata.sysex_command(&[I2C_CONFIG, lsb, msb])
    }

    /// Starts (or stops, with a `byte_count` of 0) the continuous read of `byte_count` bytes.
    ///
    /// Stopping also forgets the last reply for that key.
    pub fn report(
        &self,
        firmata: &mut Firmata,
        address: u16,
        register: Option<u16>,
        byte_count: u16,
    ) -> Result<(), Error> {
        let mode = match byte_count {
            0 => I2C_STOP_READING,
            _ => I2C_READ_CONTINUOUSLY,
        };
        {
            let mut table = self.table.write();
            let entry = table.entry((address, register)).or_default();
            entry.reporting = byte_count > 0;
            if byte_count == 0 {
                entry.data.clear();
            }
        }
        firmata.sysex_command(&request(address, mode, register, Some(byte_count)))
    }

    /// The last reply for `(address, register)` if it is continuously read, empty otherwise.
    ///
    /// Never sends anything.
    pub fn read(&self, address: u16, register: Option<u16>) -> Vec<u8> {
        match self.table.read().get(&(address, register)) {
            Some(entry) if entry.reporting => entry.data.clone(),
            _ => vec![],
        }
    }

    /// Requests `byte_count` bytes once and waits (up to the engine timeout) for a reply.
    ///
    /// # Notes
    /// Replies are not matched against the request: the first I2C reply received ends the wait,
    /// even one for another device. The bytes returned are the last ones stored for
    /// `(address, register)`.
    pub fn read_once(
        &self,
        firmata: &mut Firmata,
        address: u16,
        register: Option<u16>,
        byte_count: u16,
    ) -> Result<Vec<u8>, Error> {
        firmata.sysex_command(&request(address, I2C_READ_ONCE, register, Some(byte_count)))?;
        let timeout = firmata.options().timeout;
        if !firmata.await_sysex_response(I2C_REPLY, timeout)? {
            tracer!(self.tracer, Warn, "No I2C reply from 0x{:02X} within {:?}", address, timeout);
        }
        Ok(self
            .table
            .read()
            .get(&(address, register))
            .map(|entry| entry.data.clone())
            .unwrap_or_default())
    }

    /// Writes `data` to the device at `address`.
    pub fn write(&self, firmata: &mut Firmata, address: u16, data: &[u8]) -> Result<(), Error> {
        let mut payload = request(address, I2C_WRITE, None, None);
        for &byte in data {
            payload.extend_from_slice(&to_7bit_pair(byte as u32));
        }
        firmata.sysex_command(&payload)
    }

    /// Whether `(address, register)` is continuously read.
    pub fn is_reporting(&self, address: u16, register: Option<u16>) -> bool {
        self.table
            .read()
            .get(&(address, register))
            .is_some_and(|entry| entry.reporting)
    }
}

/// Builds an I2C_REQUEST payload (without the sysex framing).
fn request(address: u16, mode: u8, register: Option<u16>, byte_count: Option<u16>) -> Vec<u8> {
    let [address_lsb, mut address_msb] = to_7bit_pair(address as u32);
    if address_msb != 0 {
        address_msb |= I2C_10BIT_ADDRESS_MODE;
    }
    let mut payload = vec![I2C_REQUEST, address_lsb, address_msb | mode];
    if let Some(register) = register {
        payload.extend_from_slice(&to_7bit_pair(register as u32));
    }
    if let Some(byte_count) = byte_count {
        payload.extend_from_slice(&to_7bit_pair(byte_count as u32));
    }
    payload
}

/// The part of [`I2c`] living inside the engine.
struct I2cReplyHandler {
    table: I2cTable,
    tracer: Tracer,
}

impl Extension for I2cReplyHandler {
    /// Handle an I2C_REPLY message (0x77): address, register, then data bytes as 7-bit pairs.
    fn handle_sysex(&mut self, command: u8, data: &[u8]) -> bool {
        if command != I2C_REPLY {
            return false;
        }
        tracer!(self.tracer, Trace, "I2C reply: [{}]", format_as_hex(data));

        let [address_lsb, address_msb, register_lsb, register_msb, bytes @ ..] = data else {
            tracer!(self.tracer, Debug, "I2C reply too short: [{}]", format_as_hex(data));
            return true;
        };
        let address = from_7bit_pair(*address_lsb, *address_msb);
        let register = match from_7bit_pair(*register_lsb, *register_msb) {
            I2C_REGISTER_NOT_SPECIFIED => None,
            register => Some(register),
        };
        let values: Vec<u8> = bytes
            .chunks_exact(2)
            .map(|pair| from_7bit_pair(pair[0], pair[1]) as u8)
            .collect();

        self.table
            .write()
            .entry((address, register))
            .or_default()
            .data = values;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use serial_test::serial;

    use super::*;
    use crate::mocks::create_ready_firmata;

    const ABC_REPLY: &[u8] = &[
        0xF0, 0x77, 0x08, 0x00, 0x7F, 0x7F, 0x41, 0x00, 0x42, 0x00, 0x43, 0x00, 0xF7,
    ];

    #[test]
    fn test_config() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        i2c.config(&mut firmata, 1000).unwrap();
        assert_eq!(transport.written(), vec![0xF0, 0x78, 0x68, 0x07, 0xF7]);
    }

    #[test]
    fn test_report_requests() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);

        i2c.report(&mut firmata, 0x08, None, 3).unwrap();
        assert_eq!(
            transport.take_written(),
            vec![0xF0, 0x76, 0x08, 0x10, 0x03, 0x00, 0xF7]
        );
        assert!(i2c.is_reporting(0x08, None));

        i2c.report(&mut firmata, 0x68, Some(0x3B), 6).unwrap();
        assert_eq!(
            transport.take_written(),
            vec![0xF0, 0x76, 0x68, 0x10, 0x3B, 0x00, 0x06, 0x00, 0xF7]
        );

        i2c.report(&mut firmata, 0x08, None, 0).unwrap();
        assert_eq!(
            transport.take_written(),
            vec![0xF0, 0x76, 0x08, 0x18, 0x00, 0x00, 0xF7]
        );
        assert!(!i2c.is_reporting(0x08, None));
        assert!(i2c.is_reporting(0x68, Some(0x3B)));
    }

    #[test]
    fn test_ten_bits_address() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        i2c.report(&mut firmata, 0x2A5, None, 1).unwrap();
        // 0x2A5 = 0b101_0100101: MSB 0x05 | 10-bit flag | read continuously.
        assert_eq!(
            transport.take_written(),
            vec![0xF0, 0x76, 0x25, 0x35, 0x01, 0x00, 0xF7]
        );
        i2c.write(&mut firmata, 0x80, &[0x01]).unwrap();
        assert_eq!(
            transport.take_written(),
            vec![0xF0, 0x76, 0x00, 0x21, 0x01, 0x00, 0xF7]
        );
    }

    #[test]
    fn test_write() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        i2c.write(&mut firmata, 0x40, &[0x00, 0xFF]).unwrap();
        assert_eq!(
            transport.written(),
            vec![0xF0, 0x76, 0x40, 0x00, 0x00, 0x00, 0x7F, 0x01, 0xF7]
        );
    }

    #[test]
    fn test_continuous_read() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        i2c.report(&mut firmata, 8, None, 3).unwrap();

        transport.push_incoming(ABC_REPLY);
        assert_eq!(firmata.parse(0).unwrap(), 0xF077);
        assert_eq!(i2c.read(8, None), b"ABC".to_vec());
        assert!(i2c.read(8, Some(0)).is_empty(), "Other register");
        assert!(i2c.read(9, None).is_empty(), "Other device");

        i2c.report(&mut firmata, 8, None, 0).unwrap();
        assert!(i2c.read(8, None).is_empty());

        // Restarting does not bring the old bytes back.
        i2c.report(&mut firmata, 8, None, 3).unwrap();
        assert!(i2c.read(8, None).is_empty());
    }

    #[test]
    fn test_read_without_reporting_is_empty() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        transport.push_incoming(ABC_REPLY);
        firmata.parse(0).unwrap();
        assert!(i2c.read(8, None).is_empty());
        assert!(transport.written().is_empty(), "Read never sends");
    }

    #[test]
    fn test_read_once() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        transport.push_incoming(&[
            0xF0, 0x77, 0x68, 0x00, 0x75, 0x00, 0x68, 0x00, 0xF7, // WHO_AM_I = 0x68
        ]);
        let data = i2c.read_once(&mut firmata, 0x68, Some(0x75), 1).unwrap();
        assert_eq!(data, vec![0x68]);
        assert_eq!(
            transport.written(),
            vec![0xF0, 0x76, 0x68, 0x08, 0x75, 0x00, 0x01, 0x00, 0xF7]
        );
        assert!(!i2c.is_reporting(0x68, Some(0x75)));
    }

    #[test]
    fn test_read_once_accepts_any_reply() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        transport.push_incoming(ABC_REPLY);
        let data = i2c.read_once(&mut firmata, 0x68, None, 1).unwrap();
        assert!(data.is_empty());
        assert!(transport.pending() == 0);
    }

    #[test]
    #[serial]
    fn test_read_once_timeout() {
        let (mut firmata, _transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        let start = Instant::now();
        let data = i2c.read_once(&mut firmata, 0x68, None, 1).unwrap();
        assert!(data.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_short_reply_is_dropped() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        i2c.report(&mut firmata, 8, None, 1).unwrap();
        transport.push_incoming(&[0xF0, 0x77, 0x08, 0x00, 0x7F, 0xF7]);
        assert_eq!(firmata.parse(0).unwrap(), 0xF077);
        assert!(i2c.read(8, None).is_empty());
    }

    #[test]
    fn test_handler_ignores_other_subcommands() {
        let table: I2cTable = Default::default();
        let mut handler = I2cReplyHandler {
            table: table.clone(),
            tracer: Tracer::new("firmata::i2c", LevelFilter::Off),
        };
        assert!(!handler.handle_sysex(I2C_CONFIG, &[0x00, 0x00]));
        assert!(handler.handle_sysex(I2C_REPLY, &[0x01, 0x00, 0x02, 0x00, 0x7F, 0x01]));
        let table = table.read();
        assert_eq!(table.get(&(1, Some(2))).unwrap().data, vec![0xFF]);
    }

    #[test]
    fn test_shared_table() {
        let (mut firmata, transport) = create_ready_firmata();
        let i2c = I2c::new(&mut firmata);
        let clone = i2c.clone();
        i2c.report(&mut firmata, 8, None, 3).unwrap();
        transport.push_incoming(ABC_REPLY);
        firmata.parse(0).unwrap();
        assert_eq!(clone.read(8, None), b"ABC".to_vec());
    }
}
