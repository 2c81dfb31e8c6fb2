use std::fmt::{Debug, Display};

use crate::errors::Error;
use self::private::TraitToAny;

pub mod ble;
pub mod serial;

pub(crate) mod private {
    use std::any::Any;

    pub trait TraitToAny: 'static {
        fn as_any(&self) -> &dyn Any;
    }

    impl<T: 'static> TraitToAny for T {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }
}

/// The byte-level capability any link must provide to carry the Firmata protocol.
///
/// A transport knows nothing about the protocol: it only shuttles bytes. The engine relies on
/// `read` waiting a short slice when nothing is available so that its await loops do not spin.
pub trait Transport: Debug + Display + Send + TraitToAny {
    /// Opens communication (in a blocking way) using the transport layer.
    ///
    /// # Errors
    /// `IoError` if the link cannot be established (including when already connected, for
    /// transports that care).
    fn open(&mut self) -> Result<(), Error>;

    /// Gracefully shuts down the transport layer.
    fn close(&mut self) -> Result<(), Error>;

    /// Reports the current connectivity, without side effects.
    fn is_open(&self) -> bool;

    /// Number of bytes that can be read right away.
    fn available(&self) -> Result<usize, Error>;

    /// Reads at most `max_bytes` immediately-available bytes.
    ///
    /// # Notes
    /// Never blocks indefinitely: when nothing is available, waits up to an implementation-defined
    /// short slice then returns what it has (possibly nothing).
    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error>;

    /// Writes `bytes` to the link.
    ///
    /// # Returns
    /// The number of bytes accepted: delivery is full or an error.
    ///
    /// # Errors
    /// `NotOpen` if not connected, `IoError` on transmission failure.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error>;
}

/// A discovered remote endpoint a transport can connect to.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PortDescriptor {
    /// Address or OS identifier used to connect.
    pub port: String,
    /// Human-readable name.
    pub description: String,
    /// Capability or hardware id (empty for BLE).
    pub hardware_id: String,
}

impl PortDescriptor {
    pub fn new<P: Into<String>, D: Into<String>, H: Into<String>>(
        port: P,
        description: D,
        hardware_id: H,
    ) -> Self {
        Self {
            port: port.into(),
            description: description.into(),
            hardware_id: hardware_id.into(),
        }
    }
}

impl Display for PortDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.description.is_empty() {
            true => write!(f, "{}", self.port),
            false => write!(f, "{} ({})", self.port, self.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_descriptor_display() {
        let port = PortDescriptor::new("AA:BB:CC:DD:EE:FF", "Nano33", "");
        assert_eq!(port.to_string(), "AA:BB:CC:DD:EE:FF (Nano33)");
        let port = PortDescriptor::new("/dev/ttyACM0", "", "");
        assert_eq!(port.to_string(), "/dev/ttyACM0");
        assert!(port.hardware_id.is_empty());
    }
}
