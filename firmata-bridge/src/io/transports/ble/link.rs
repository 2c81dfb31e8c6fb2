use tokio::sync::mpsc::UnboundedSender;

use crate::errors::Error;

/// Firmata BLE service (Nordic UART Service).
pub const FIRMATA_SERVICE: u128 = 0x6e400001_b5a3_f393_e0a9_e50e24dcca9e;
/// Characteristic the client writes commands to.
pub const TX_CHARACTERISTIC: u128 = 0x6e400002_b5a3_f393_e0a9_e50e24dcca9e;
/// Characteristic the device notifies replies on.
pub const RX_CHARACTERISTIC: u128 = 0x6e400003_b5a3_f393_e0a9_e50e24dcca9e;

/// What a [`GattLink`] reports back, asynchronously, to the bridge worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A device was seen while scanning.
    Advertisement {
        address: String,
        name: Option<String>,
        connectable: bool,
        services: Vec<u128>,
    },
    /// The link-layer connection is up.
    Connected,
    /// Service discovery ended: every service and characteristic UUID found.
    ServicesDiscovered(Vec<u128>),
    /// The last `write_request` was acknowledged.
    WriteComplete,
    /// Bytes notified by the device.
    Notification(Vec<u8>),
    /// The connection dropped.
    Disconnected(String),
    /// The operation in progress failed.
    Failed(String),
}

/// Channel a link reports its events on.
pub type LinkEvents = UnboundedSender<LinkEvent>;

/// Builds the link, inside the worker thread, given the channel to report events on.
pub type LinkFactory = Box<dyn FnOnce(LinkEvents) -> Box<dyn GattLink> + Send>;

/// Seam to a concrete BLE stack.
///
/// Every call only initiates an operation and returns right away: outcomes are reported as
/// [`LinkEvent`]s. All calls are made from the bridge worker thread.
pub trait GattLink {
    /// Starts discovering devices: each one seen is reported as [`LinkEvent::Advertisement`].
    fn start_scan(&mut self) -> Result<(), Error>;

    /// Stops discovering devices. Harmless if no scan is active.
    fn stop_scan(&mut self);

    /// Connects to the device at `address`: [`LinkEvent::Connected`] once done.
    fn connect(&mut self, address: &str) -> Result<(), Error>;

    /// Discovers services and characteristics: [`LinkEvent::ServicesDiscovered`] once done.
    fn discover_services(&mut self) -> Result<(), Error>;

    /// Subscribes to the notifications of `characteristic`.
    fn enable_notifications(&mut self, characteristic: u128) -> Result<(), Error>;

    /// Writes `bytes` to `characteristic`: [`LinkEvent::WriteComplete`] once acknowledged.
    fn write_request(&mut self, characteristic: u128, bytes: &[u8]) -> Result<(), Error>;

    /// Closes the connection, if any. Harmless otherwise.
    fn close(&mut self);
}
