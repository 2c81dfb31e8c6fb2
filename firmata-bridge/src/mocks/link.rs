use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Error;
use crate::io::{
    GattLink, LinkEvent, LinkEvents, LinkFactory, FIRMATA_SERVICE, RX_CHARACTERISTIC,
    TX_CHARACTERISTIC,
};

/// Builds the notifications a device sends back for the bytes written to it.
pub type Responder = Arc<dyn Fn(&[u8]) -> Vec<Vec<u8>> + Send + Sync>;

/// How a [`MockLink`] behaves.
#[derive(Clone)]
pub struct MockLinkScript {
    /// Events emitted when a scan starts.
    pub devices: Vec<LinkEvent>,
    /// UUIDs reported by service discovery.
    pub services: Vec<u128>,
    pub fail_scan: bool,
    /// Connection attempts end with this [`LinkEvent::Failed`] reason.
    pub fail_connect: Option<String>,
    /// Connection attempts never complete.
    pub silent_connect: bool,
    /// Writes are never acknowledged.
    pub silent_write: bool,
    pub responder: Option<Responder>,
}

impl Default for MockLinkScript {
    fn default() -> Self {
        Self {
            devices: vec![],
            services: vec![FIRMATA_SERVICE, TX_CHARACTERISTIC, RX_CHARACTERISTIC],
            fail_scan: false,
            fail_connect: None,
            silent_connect: false,
            silent_write: false,
            responder: None,
        }
    }
}

impl MockLinkScript {
    /// A script advertising connectable Firmata devices at each of `addresses`.
    pub fn with_devices(addresses: &[&str]) -> Self {
        Self {
            devices: addresses.iter().map(|address| advertisement(address, true)).collect(),
            ..Default::default()
        }
    }
}

/// A device advertisement for the Firmata service.
pub fn advertisement(address: &str, connectable: bool) -> LinkEvent {
    LinkEvent::Advertisement {
        address: String::from(address),
        name: Some(format!("Device {}", address)),
        connectable,
        services: vec![FIRMATA_SERVICE],
    }
}

struct MockLinkState {
    events: Option<LinkEvents>,
    calls: Vec<String>,
    written: Vec<Vec<u8>>,
    script: MockLinkScript,
}

/// Test side of a [`MockLink`]: builds the link factory and inspects what the worker did.
#[derive(Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockLinkState>>,
}

impl MockLinkHandle {
    pub fn new(script: MockLinkScript) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockLinkState {
                events: None,
                calls: vec![],
                written: vec![],
                script,
            })),
        }
    }

    /// The factory to give to a BLE transport.
    pub fn factory(&self) -> LinkFactory {
        let state = self.state.clone();
        Box::new(move |events: LinkEvents| {
            state.lock().events = Some(events);
            Box::new(MockLink { state }) as Box<dyn GattLink>
        })
    }

    /// Sends an event to the worker as if the link raised it.
    pub fn emit(&self, event: LinkEvent) {
        if let Some(events) = &self.state.lock().events {
            let _ = events.send(event);
        }
    }

    /// Names of the link methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Every buffer written to the TX characteristic.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().written.clone()
    }
}

/// Scripted [`GattLink`]: answers instantly, on the worker's event channel.
pub struct MockLink {
    state: Arc<Mutex<MockLinkState>>,
}

impl MockLink {
    fn record(&self, call: String) -> MockLinkScript {
        let mut state = self.state.lock();
        state.calls.push(call);
        state.script.clone()
    }

    fn emit(&self, event: LinkEvent) {
        if let Some(events) = &self.state.lock().events {
            let _ = events.send(event);
        }
    }
}

impl GattLink for MockLink {
    fn start_scan(&mut self) -> Result<(), Error> {
        let script = self.record(String::from("start_scan"));
        if script.fail_scan {
            return Err(Error::io("Mock scan failure"));
        }
        script.devices.into_iter().for_each(|device| self.emit(device));
        Ok(())
    }

    fn stop_scan(&mut self) {
        self.record(String::from("stop_scan"));
    }

    fn connect(&mut self, address: &str) -> Result<(), Error> {
        let script = self.record(format!("connect {}", address));
        match script.fail_connect {
            Some(reason) => self.emit(LinkEvent::Failed(reason)),
            None if script.silent_connect => {}
            None => self.emit(LinkEvent::Connected),
        }
        Ok(())
    }

    fn discover_services(&mut self) -> Result<(), Error> {
        let script = self.record(String::from("discover_services"));
        self.emit(LinkEvent::ServicesDiscovered(script.services));
        Ok(())
    }

    fn enable_notifications(&mut self, _: u128) -> Result<(), Error> {
        self.record(String::from("enable_notifications"));
        Ok(())
    }

    fn write_request(&mut self, _: u128, bytes: &[u8]) -> Result<(), Error> {
        let script = self.record(String::from("write"));
        self.state.lock().written.push(bytes.to_vec());
        if !script.silent_write {
            self.emit(LinkEvent::WriteComplete);
        }
        if let Some(responder) = script.responder {
            responder(bytes)
                .into_iter()
                .for_each(|reply| self.emit(LinkEvent::Notification(reply)));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.record(String::from("close"));
    }
}
