use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};

use crate::errors::Error;
use crate::errors::Error::NotOpen;
use crate::io::transports::{PortDescriptor, Transport};
use crate::utils::{format_as_hex, tracer, Tracer};

/// Baud rate StandardFirmata sketches use.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// How long a `read` waits when nothing is pending.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Transport over an OS serial port (8N1, no flow control).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug)]
pub struct Serial {
    /// The connection port.
    port: String,
    /// The connection speed.
    baud_rate: u32,
    #[cfg_attr(feature = "serde", serde(skip, default = "Serial::default_tracer"))]
    tracer: Tracer,
    /// A Read/Write io object.
    #[cfg_attr(feature = "serde", serde(skip))]
    io: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
}

impl Serial {
    /// Constructs a new `Serial` transport for communication through the specified port at
    /// [`DEFAULT_BAUD_RATE`].
    ///
    /// # Example
    /// ```no_run
    /// use firmata_bridge::io::{Firmata, FirmataOptions, Serial};
    ///
    /// let firmata = Firmata::new(Serial::new("/dev/ttyACM0"), FirmataOptions::default()).unwrap();
    /// println!("Ready: {}", firmata.is_ready());
    /// ```
    pub fn new<P: Into<String>>(port: P) -> Self {
        Self::with_baud_rate(port, DEFAULT_BAUD_RATE)
    }

    /// Constructs a new `Serial` transport with a custom baud rate.
    pub fn with_baud_rate<P: Into<String>>(port: P, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            tracer: Self::default_tracer(),
            io: Arc::new(Mutex::new(None)),
        }
    }

    /// Replaces the tracer used for diagnostics.
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    fn default_tracer() -> Tracer {
        Tracer::new("firmata::serial", LevelFilter::Warn)
    }

    /// Retrieves the configured port.
    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    /// Retrieves the configured baud rate.
    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Enumerates the serial ports of the machine.
    pub fn list_ports() -> Result<Vec<PortDescriptor>, Error> {
        let ports = serialport::available_ports()?;
        Ok(ports
            .into_iter()
            .map(|info| match info.port_type {
                SerialPortType::UsbPort(usb) => PortDescriptor::new(
                    info.port_name,
                    usb.product.or(usb.manufacturer).unwrap_or_default(),
                    match usb.serial_number {
                        Some(serial) => {
                            format!("USB VID:PID={:04X}:{:04X} SER={}", usb.vid, usb.pid, serial)
                        }
                        None => format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid),
                    },
                ),
                SerialPortType::BluetoothPort => {
                    PortDescriptor::new(info.port_name, "Bluetooth", "")
                }
                SerialPortType::PciPort | SerialPortType::Unknown => {
                    PortDescriptor::new(info.port_name, "", "")
                }
            })
            .collect())
    }
}

impl Default for Serial {
    /// Creates a new serial transport connection with the first available port or an empty string if no ports are available.
    ///
    /// # Notes
    /// The first available port will be used, None otherwise, which will probably lead to an error
    /// during the open phase.
    #[cfg(not(tarpaulin_include))]
    fn default() -> Self {
        let ports = serialport::available_ports().unwrap_or_else(|_| vec![]);
        match ports.first() {
            Some(port) => Self::new(&port.port_name),
            None => Self::new(""),
        }
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({})", self.port)
    }
}

impl Transport for Serial {
    fn open(&mut self) -> Result<(), Error> {
        if self.is_open() {
            return Ok(());
        }
        let connexion = serialport::new(self.port.clone(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_SLICE)
            .open()?;
        tracer!(self.tracer, Debug, "Serial port is now opened: {:?}", connexion);

        *self.io.lock() = Some(connexion);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        if self.io.lock().take().is_some() {
            tracer!(self.tracer, Debug, "Serial port {} closed", self.port);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.io.lock().is_some()
    }

    fn available(&self) -> Result<usize, Error> {
        let lock = self.io.lock();
        Ok(lock.as_ref().ok_or(NotOpen)?.bytes_to_read()? as usize)
    }

    /// Reads what the port has pending, up to `max_bytes`.
    ///
    /// When nothing is pending, waits for up to 50ms for incoming bytes: a timeout is not an
    /// error, it yields an empty read.
    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        let mut lock = self.io.lock();
        let io = lock.as_mut().ok_or(NotOpen)?;
        let wanted = match io.bytes_to_read()? as usize {
            0 => max_bytes,
            pending => pending.min(max_bytes),
        };
        let mut buf = vec![0u8; wanted];
        let count = match io.read(&mut buf) {
            Ok(count) => count,
            Err(error) if error.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(error) => return Err(error.into()),
        };
        buf.truncate(count);
        if count > 0 {
            tracer!(self.tracer, Trace, "Serial read: [{}]", format_as_hex(&buf));
        }
        Ok(buf)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let mut lock = self.io.lock();
        lock.as_mut().ok_or(NotOpen)?.write_all(bytes)?;
        tracer!(self.tracer, Trace, "Serial write: [{}]", format_as_hex(bytes));
        Ok(bytes.len())
    }
}
