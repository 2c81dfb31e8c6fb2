use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::bounded;
use log::LevelFilter;
use tokio::sync::mpsc::UnboundedSender;

use crate::errors::Error;
use crate::errors::Error::NotOpen;
use crate::io::transports::ble::worker::{Job, Outcome, Request, Shared};
use crate::io::transports::{PortDescriptor, Transport};
use crate::utils::{format_as_hex, tracer, Tracer};

pub mod link;
mod queue;
mod worker;

pub use link::*;

/// Tunables of a [`BleTransport`].
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct BleOptions {
    /// Address of the device to connect to: the first suitable device found when empty.
    pub port: String,
    /// How long a scan lasts.
    pub scan_time: Duration,
    /// Bound on the link-layer connection and on each write acknowledgement.
    pub connect_timeout: Duration,
    /// How long a `read` waits when nothing is queued.
    pub read_wait: Duration,
    /// Notifications kept before the oldest ones get dropped.
    pub max_queued_messages: usize,
    /// Sampling interval requested from the device once connected.
    pub reporting_interval: Duration,
    #[cfg_attr(feature = "serde", serde(skip, default = "BleOptions::default_tracer"))]
    pub tracer: Tracer,
}

impl Default for BleOptions {
    fn default() -> Self {
        Self {
            port: String::new(),
            scan_time: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            read_wait: Duration::from_millis(10),
            max_queued_messages: 1000,
            reporting_interval: Duration::from_millis(1024),
            tracer: Self::default_tracer(),
        }
    }
}

impl BleOptions {
    fn default_tracer() -> Tracer {
        Tracer::new("firmata::ble", LevelFilter::Warn)
    }

    pub fn with_port<P: Into<String>>(mut self, port: P) -> Self {
        self.port = port.into();
        self
    }

    pub fn with_scan_time(mut self, scan_time: Duration) -> Self {
        self.scan_time = scan_time;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_read_wait(mut self, read_wait: Duration) -> Self {
        self.read_wait = read_wait;
        self
    }

    pub fn with_max_queued_messages(mut self, max_queued_messages: usize) -> Self {
        self.max_queued_messages = max_queued_messages.max(1);
        self
    }

    pub fn with_reporting_interval(mut self, reporting_interval: Duration) -> Self {
        self.reporting_interval = reporting_interval;
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }
}

/// Transport over a Bluetooth LE GATT link exposing the Firmata (Nordic UART) service.
///
/// The link itself is driven by a dedicated worker thread: every operation here is a job
/// request the caller blocks on until the worker completes it. Notifications are queued as they
/// arrive and served by `read`.
///
/// # Example
/// ```no_run
/// use firmata_bridge::io::{BleOptions, BleTransport, Firmata, FirmataOptions, LinkFactory};
///
/// # fn my_ble_stack() -> LinkFactory { unimplemented!() }
/// let ble = BleTransport::new(my_ble_stack(), BleOptions::default())?;
/// let firmata = Firmata::new(ble, FirmataOptions::default())?;
/// # Ok::<(), firmata_bridge::errors::Error>(())
/// ```
pub struct BleTransport {
    options: BleOptions,
    shared: Arc<Shared>,
    requests: UnboundedSender<Request>,
    worker: Option<JoinHandle<()>>,
    /// Writes are only queued until `end_batch`.
    batching: bool,
}

impl BleTransport {
    /// Starts the worker thread, which builds its link through `factory`.
    ///
    /// Nothing is scanned nor connected yet: see [`BleTransport::scan`] and `open`.
    pub fn new<F>(factory: F, options: BleOptions) -> Result<Self, Error>
    where
        F: FnOnce(LinkEvents) -> Box<dyn GattLink> + Send + 'static,
    {
        let shared = Arc::new(Shared::new(options.max_queued_messages));
        let (requests, worker) = worker::spawn(factory, shared.clone(), options.clone())?;
        Ok(Self {
            options,
            shared,
            requests,
            worker: Some(worker),
            batching: false,
        })
    }

    /// Scans for `scan_time` and lists the Firmata devices seen.
    pub fn scan(&self) -> Result<Vec<PortDescriptor>, Error> {
        match self.request(Job::Scan)? {
            Outcome::Ports(ports) => Ok(ports),
            Outcome::Done => Ok(vec![]),
        }
    }

    /// Lists the Firmata devices around, using a throw-away transport.
    pub fn list_ports(factory: LinkFactory, options: BleOptions) -> Result<Vec<PortDescriptor>, Error> {
        Self::new(factory, options)?.scan()
    }

    pub fn options(&self) -> &BleOptions {
        &self.options
    }

    /// Holds back the following writes until [`BleTransport::end_batch`] sends them all at once.
    pub fn begin_batch(&mut self) {
        self.batching = true;
    }

    /// Sends every write queued since [`BleTransport::begin_batch`] as a single link write.
    pub fn end_batch(&mut self) -> Result<(), Error> {
        self.batching = false;
        self.request(Job::Write).map(|_| ())
    }

    /// Hands `job` to the worker and blocks until it is done.
    fn request(&self, job: Job) -> Result<Outcome, Error> {
        let (reply, completion) = bounded(1);
        self.requests
            .send(Request { job, reply })
            .map_err(|_| Error::io("BLE worker stopped"))?;
        completion.recv().map_err(|_| Error::io("BLE worker stopped"))?
    }
}

impl Transport for BleTransport {
    /// Connects to `options.port`, or to the first Firmata device a scan finds.
    ///
    /// # Errors
    /// `IoError` with the reason the connection sequence stopped at, or if already connected.
    fn open(&mut self) -> Result<(), Error> {
        if self.is_open() {
            return Err(Error::io("already connected"));
        }
        self.request(Job::Connect {
            port: self.options.port.clone(),
        })?;
        tracer!(self.options.tracer, Debug, "{} connected", self);
        Ok(())
    }

    /// Never fails: a link already down is fine.
    fn close(&mut self) -> Result<(), Error> {
        if let Err(error) = self.request(Job::Disconnect) {
            tracer!(self.options.tracer, Debug, "Disconnect ignored: {}", error);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.is_connected()
    }

    fn available(&self) -> Result<usize, Error> {
        Ok(self.shared.inbound.available())
    }

    /// Takes whole queued notifications up to `max_bytes`, waiting `read_wait` for a first one.
    ///
    /// Notifications queued before the link dropped can still be read.
    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        if self.shared.inbound.is_empty() && !self.is_open() {
            return Err(NotOpen);
        }
        Ok(self.shared.inbound.read(max_bytes, self.options.read_wait))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        if !self.is_open() {
            return Err(NotOpen);
        }
        tracer!(self.options.tracer, Trace, "BLE queue: [{}]", format_as_hex(bytes));
        self.shared.outbound.lock().push_back(bytes.to_vec());
        if !self.batching {
            self.request(Job::Write)?;
        }
        Ok(bytes.len())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        let _ = self.request(Job::Disconnect);
        let _ = self.request(Job::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracer!(self.options.tracer, Error, "BLE worker panicked");
            }
        }
    }
}

impl Debug for BleTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("options", &self.options)
            .field("connected", &self.is_open())
            .field("queued", &self.shared.inbound.len())
            .field("batching", &self.batching)
            .finish()
    }
}

impl Display for BleTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.options.port.is_empty() {
            true => write!(f, "Ble(auto)"),
            false => write!(f, "Ble({})", self.options.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serial_test::serial;

    use super::*;
    use crate::io::{Firmata, FirmataOptions};
    use crate::mocks::link::{advertisement, MockLinkHandle, MockLinkScript};
    use crate::mocks::BOOT_REPLIES;

    fn options() -> BleOptions {
        BleOptions::default()
            .with_scan_time(Duration::from_millis(50))
            .with_connect_timeout(Duration::from_millis(200))
    }

    fn transport(script: MockLinkScript, options: BleOptions) -> (BleTransport, MockLinkHandle) {
        let link = MockLinkHandle::new(script);
        let ble = BleTransport::new(link.factory(), options).unwrap();
        (ble, link)
    }

    fn connected(script: MockLinkScript) -> (BleTransport, MockLinkHandle) {
        let (mut ble, link) = transport(script, options().with_port("AA"));
        ble.open().unwrap();
        (ble, link)
    }

    #[test]
    fn test_options() {
        let options = BleOptions::default();
        assert_eq!(options.port, "");
        assert_eq!(options.scan_time, Duration::from_secs(10));
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.read_wait, Duration::from_millis(10));
        assert_eq!(options.max_queued_messages, 1000);
        assert_eq!(options.reporting_interval, Duration::from_millis(1024));
        assert_eq!(options.tracer.target(), "firmata::ble");
        assert_eq!(options.with_max_queued_messages(0).max_queued_messages, 1);
    }

    #[test]
    fn test_scan_filters_and_deduplicates() {
        let mut script = MockLinkScript::with_devices(&["AA", "BB", "AA"]);
        script.devices.push(advertisement("CC", false));
        script.devices.push(LinkEvent::Advertisement {
            address: String::from("DD"),
            name: None,
            connectable: true,
            services: vec![0x180F],
        });
        let (ble, link) = transport(script, options());

        let ports = ble.scan().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, "AA");
        assert_eq!(ports[0].description, "Device AA");
        assert_eq!(ports[0].hardware_id, "");
        assert_eq!(ports[1].port, "BB");
        assert_eq!(link.calls(), vec!["start_scan", "stop_scan"]);
    }

    #[test]
    fn test_scan_failure() {
        let script = MockLinkScript {
            fail_scan: true,
            ..Default::default()
        };
        let (ble, _) = transport(script, options());
        assert_eq!(ble.scan().unwrap_err().to_string(), "Transport error: scan failed.");
    }

    #[test]
    fn test_list_ports() {
        let link = MockLinkHandle::new(MockLinkScript::with_devices(&["AA"]));
        let ports = BleTransport::list_ports(link.factory(), options()).unwrap();
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].to_string(), "AA (Device AA)");
    }

    #[test]
    fn test_connect_to_given_port() {
        let (ble, link) = connected(MockLinkScript::default());
        assert!(ble.is_open());
        assert_eq!(
            link.calls(),
            vec!["connect AA", "discover_services", "enable_notifications", "write"]
        );
        assert_eq!(link.written(), vec![vec![0xF0, 0x7A, 0x00, 0x08, 0xF7]]);
    }

    #[test]
    fn test_connect_negotiates_reporting_interval() {
        let options = options()
            .with_port("AA")
            .with_reporting_interval(Duration::from_millis(100));
        let (mut ble, link) = transport(MockLinkScript::default(), options);
        ble.open().unwrap();
        assert_eq!(link.written(), vec![vec![0xF0, 0x7A, 0x64, 0x00, 0xF7]]);
    }

    #[test]
    fn test_auto_connect_picks_first_device() {
        let (mut ble, link) = transport(MockLinkScript::with_devices(&["AA", "BB"]), options());
        ble.open().unwrap();
        assert!(ble.is_open());
        let calls = link.calls();
        assert_eq!(calls[..3], ["start_scan", "stop_scan", "connect AA"]);
        assert!(!calls.contains(&String::from("connect BB")));
    }

    #[test]
    fn test_auto_connect_without_device() {
        let (mut ble, link) = transport(MockLinkScript::default(), options());
        let error = ble.open().unwrap_err();
        assert_eq!(error.to_string(), "Transport error: No suitable devices found.");
        assert!(!ble.is_open());
        assert!(link.calls().contains(&String::from("close")));
    }

    #[test]
    fn test_connect_without_tx_characteristic() {
        let script = MockLinkScript {
            services: vec![FIRMATA_SERVICE, RX_CHARACTERISTIC],
            ..Default::default()
        };
        let (mut ble, link) = transport(script, options().with_port("AA"));
        let error = ble.open().unwrap_err();
        assert_eq!(error.to_string(), "Transport error: Failed to find TX characteristic.");
        assert!(!ble.is_open());
        assert_eq!(link.calls().last(), Some(&String::from("close")));
    }

    #[test]
    fn test_connect_without_rx_characteristic() {
        let script = MockLinkScript {
            services: vec![FIRMATA_SERVICE, TX_CHARACTERISTIC],
            ..Default::default()
        };
        let (mut ble, _) = transport(script, options().with_port("AA"));
        let error = ble.open().unwrap_err();
        assert_eq!(error.to_string(), "Transport error: Failed to find RX characteristic.");
    }

    #[test]
    fn test_connect_failure_is_reported() {
        let script = MockLinkScript {
            fail_connect: Some(String::from("Peripheral refused")),
            ..Default::default()
        };
        let (mut ble, _) = transport(script, options().with_port("AA"));
        let error = ble.open().unwrap_err();
        assert_eq!(error.to_string(), "Transport error: Peripheral refused.");
        assert!(!ble.is_open());
    }

    #[test]
    #[serial]
    fn test_connect_timeout() {
        let script = MockLinkScript {
            silent_connect: true,
            ..Default::default()
        };
        let (mut ble, _) = transport(script, options().with_port("AA"));
        let start = std::time::Instant::now();
        let error = ble.open().unwrap_err();
        assert_eq!(error.to_string(), "Transport error: Connection timed out.");
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn test_open_twice() {
        let (mut ble, _) = connected(MockLinkScript::default());
        let error = ble.open().unwrap_err();
        assert_eq!(error.to_string(), "Transport error: already connected.");
        assert!(ble.is_open());
    }

    #[test]
    fn test_write() {
        let (mut ble, link) = connected(MockLinkScript::default());
        assert_eq!(ble.write(&[0xF9]).unwrap(), 1);
        assert_eq!(ble.write(&[0xF5, 0x0D, 0x01]).unwrap(), 3);
        assert_eq!(link.written()[1..], [vec![0xF9], vec![0xF5, 0x0D, 0x01]]);
    }

    #[test]
    fn test_batched_writes_go_out_together() {
        let (mut ble, link) = connected(MockLinkScript::default());
        ble.begin_batch();
        ble.write(&[0xF9]).unwrap();
        ble.write(&[0xF0, 0x79, 0xF7]).unwrap();
        assert_eq!(link.written().len(), 1);
        ble.end_batch().unwrap();
        assert_eq!(link.written()[1], vec![0xF9, 0xF0, 0x79, 0xF7]);

        // Nothing queued: nothing written.
        ble.begin_batch();
        ble.end_batch().unwrap();
        assert_eq!(link.written().len(), 2);
    }

    #[test]
    #[serial]
    fn test_unacknowledged_write() {
        let script = MockLinkScript {
            silent_write: true,
            ..Default::default()
        };
        let (mut ble, link) = transport(script, options().with_port("AA"));
        let error = ble.open().unwrap_err();
        assert_eq!(error.to_string(), "Transport error: Connection timed out.");
        assert_eq!(link.written().len(), 1);
    }

    #[test]
    fn test_write_requires_connection() {
        let (mut ble, link) = transport(MockLinkScript::default(), options());
        assert!(matches!(ble.write(&[0xF9]), Err(NotOpen)));
        assert!(link.written().is_empty());
    }

    #[test]
    fn test_read_notifications() {
        let (mut ble, link) = connected(MockLinkScript::default());
        assert_eq!(ble.available().unwrap(), 0);
        assert!(ble.read(10).unwrap().is_empty());

        link.emit(LinkEvent::Notification(vec![0xF9, 0x02]));
        link.emit(LinkEvent::Notification(vec![0x05]));
        let start = std::time::Instant::now();
        while ble.available().unwrap() < 3 && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(ble.available().unwrap(), 3);
        assert_eq!(ble.read(10).unwrap(), vec![0xF9, 0x02, 0x05]);
        assert_eq!(ble.available().unwrap(), 0);
    }

    #[test]
    fn test_read_requires_connection_or_data() {
        let (mut ble, _) = transport(MockLinkScript::default(), options());
        assert!(matches!(ble.read(10), Err(NotOpen)));
    }

    #[test]
    fn test_unsolicited_disconnection() {
        let (mut ble, link) = connected(MockLinkScript::default());
        link.emit(LinkEvent::Notification(vec![0xF9, 0x02, 0x05]));
        link.emit(LinkEvent::Disconnected(String::from("Link lost")));
        let start = std::time::Instant::now();
        while ble.is_open() && start.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!ble.is_open());

        // Received before the link dropped: still readable.
        assert_eq!(ble.read(10).unwrap(), vec![0xF9, 0x02, 0x05]);
        assert!(matches!(ble.read(10), Err(NotOpen)));
        assert!(matches!(ble.write(&[0xF9]), Err(NotOpen)));
    }

    #[test]
    fn test_close() {
        let (mut ble, link) = connected(MockLinkScript::default());
        assert!(ble.close().is_ok());
        assert!(!ble.is_open());
        assert!(link.calls().ends_with(&[String::from("stop_scan"), String::from("close")]));
        // Closing twice is fine.
        assert!(ble.close().is_ok());
    }

    #[test]
    fn test_drop_stops_worker() {
        let (ble, link) = connected(MockLinkScript::default());
        drop(ble);
        let calls = link.calls();
        assert_eq!(calls.iter().filter(|call| *call == "close").count(), 2);
    }

    #[test]
    fn test_display() {
        let (ble, _) = transport(MockLinkScript::default(), options());
        assert_eq!(ble.to_string(), "Ble(auto)");
        let (ble, _) = transport(MockLinkScript::default(), options().with_port("AA"));
        assert_eq!(ble.to_string(), "Ble(AA)");
        assert!(format!("{:?}", ble).contains("connected: false"));
    }

    #[test]
    fn test_firmata_over_ble() {
        let script = MockLinkScript {
            responder: Some(Arc::new(|bytes: &[u8]| match bytes {
                [0xF9] => vec![BOOT_REPLIES[..3].to_vec()],
                [0xF0, 0x79, 0xF7] => vec![BOOT_REPLIES[3..12].to_vec()],
                [0xF0, 0x6B, 0xF7] => vec![BOOT_REPLIES[12..28].to_vec()],
                [0xF0, 0x69, 0xF7] => vec![BOOT_REPLIES[28..].to_vec()],
                _ => vec![],
            })),
            ..MockLinkScript::with_devices(&["AA"])
        };
        let link = MockLinkHandle::new(script);
        let ble = BleTransport::new(link.factory(), options()).unwrap();
        let options = FirmataOptions::default().with_timeout(Duration::from_millis(500));
        let mut firmata = Firmata::new(ble, options).unwrap();

        assert!(firmata.is_ready());
        assert_eq!(firmata.identity().to_string(), "Hi v2.5");
        let capable = firmata.pins().iter().filter(|pin| !pin.supported_modes.is_empty());
        assert_eq!(capable.count(), 3);
        assert_eq!(firmata.pins().pin_for_channel(0).map(|pin| pin.id), Some(2));

        firmata.digital_write(1, true).unwrap();
        assert_eq!(link.written().last(), Some(&vec![0xF5, 0x01, 0x01]));

        link.emit(LinkEvent::Notification(vec![0xE0, 0x7F, 0x03]));
        assert!(firmata.await_response(0xE0, Duration::from_millis(500)).unwrap());
        assert_eq!(firmata.analog_read_channel(0), Some(0x1FF));
    }
}
