//! The thread owning the BLE link.
//!
//! The worker is an actor: the caller sends it [`Request`]s and blocks on the reply channel each
//! one carries. Inside, a current-thread tokio runtime multiplexes requests, link events and the
//! deadline of the job in progress. One job runs at a time: requests arriving meanwhile wait
//! their turn, except [`Job::Stop`] which preempts everything.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::Sender;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

use crate::errors::Error;
use crate::io::firmata::constants::{END_SYSEX, SAMPLING_INTERVAL, START_SYSEX};
use crate::io::transports::ble::link::*;
use crate::io::transports::ble::queue::RxQueue;
use crate::io::transports::ble::BleOptions;
use crate::io::PortDescriptor;
use crate::utils::{format_as_hex, to_7bit_pair, tracer};

/// State shared by the caller and the worker.
#[derive(Debug)]
pub(crate) struct Shared {
    /// Only written by the worker.
    pub(crate) connected: AtomicBool,
    pub(crate) outbound: Mutex<VecDeque<Vec<u8>>>,
    pub(crate) inbound: RxQueue,
}

impl Shared {
    pub(crate) fn new(max_queued_messages: usize) -> Self {
        Self {
            connected: AtomicBool::new(false),
            outbound: Mutex::new(VecDeque::new()),
            inbound: RxQueue::new(max_queued_messages),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// What the caller asks the worker to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Job {
    Scan,
    /// Connect to `port`, or to the first suitable device found when empty.
    Connect { port: String },
    Disconnect,
    /// Send everything queued for output as a single write.
    Write,
    Stop,
}

impl Display for Job {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Scan => write!(f, "scan"),
            Job::Connect { port } if port.is_empty() => write!(f, "connect(auto)"),
            Job::Connect { port } => write!(f, "connect({})", port),
            Job::Disconnect => write!(f, "disconnect"),
            Job::Write => write!(f, "write"),
            Job::Stop => write!(f, "stop"),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Done,
    Ports(Vec<PortDescriptor>),
}

pub(crate) type Reply = Sender<Result<Outcome, Error>>;

pub(crate) struct Request {
    pub(crate) job: Job,
    pub(crate) reply: Reply,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Connecting {
    /// No port given: waiting for a suitable advertisement.
    Scanning,
    /// Waiting for the link-layer connection.
    Linking,
    Discovering,
    /// Notifications enabled, waiting for the reporting interval write to complete.
    Negotiating,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Scanning,
    Connecting(Connecting),
    Writing,
    Stopped,
}

/// Starts the worker thread.
///
/// # Returns
/// The channel to send requests to and the thread handle.
pub(crate) fn spawn<F>(
    factory: F,
    shared: Arc<Shared>,
    options: BleOptions,
) -> Result<(UnboundedSender<Request>, JoinHandle<()>), Error>
where
    F: FnOnce(LinkEvents) -> Box<dyn GattLink> + Send + 'static,
{
    let (requests, requests_rx) = unbounded_channel();
    let handle = std::thread::Builder::new()
        .name(String::from("ble-worker"))
        .spawn(move || {
            let (events, events_rx) = unbounded_channel();
            let worker = Worker {
                link: factory(events),
                events: events_rx,
                requests: requests_rx,
                shared,
                options,
                state: State::Idle,
                current: None,
                deferred: VecDeque::new(),
                deadline: None,
                found: vec![],
            };
            worker.run();
        })?;
    Ok((requests, handle))
}

struct Worker {
    link: Box<dyn GattLink>,
    events: UnboundedReceiver<LinkEvent>,
    requests: UnboundedReceiver<Request>,
    shared: Arc<Shared>,
    options: BleOptions,
    state: State,
    /// Reply channel of the job in progress.
    current: Option<Reply>,
    deferred: VecDeque<Request>,
    deadline: Option<Instant>,
    /// Suitable devices seen by the current scan.
    found: Vec<PortDescriptor>,
}

impl Worker {
    fn run(mut self) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
        {
            Ok(runtime) => runtime,
            Err(error) => {
                tracer!(self.options.tracer, Error, "BLE worker runtime failed: {}", error);
                return;
            }
        };
        runtime.block_on(self.event_loop());
        tracer!(self.options.tracer, Debug, "BLE worker exited");
    }

    async fn event_loop(&mut self) {
        while self.state != State::Stopped {
            let deadline = self.deadline;
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(request) => self.on_request(request),
                    // The transport is gone without a Stop.
                    None => self.stop(None),
                },
                Some(event) = self.events.recv() => self.on_event(event),
                _ = wait_until(deadline) => self.on_deadline(),
            }
            self.start_deferred();
        }
    }

    fn on_request(&mut self, request: Request) {
        tracer!(self.options.tracer, Debug, "Job {} requested in {:?}", request.job, self.state);
        match request.job {
            Job::Stop => self.stop(Some(request.reply)),
            _ if self.state != State::Idle => self.deferred.push_back(request),
            _ => self.start(request),
        }
    }

    fn start_deferred(&mut self) {
        while self.state == State::Idle {
            match self.deferred.pop_front() {
                Some(request) => self.start(request),
                None => break,
            }
        }
    }

    fn start(&mut self, request: Request) {
        self.current = Some(request.reply);
        match request.job {
            Job::Scan => match self.link.start_scan() {
                Ok(()) => self.begin_scan(State::Scanning),
                Err(error) => {
                    tracer!(self.options.tracer, Warn, "Scan failed: {}", error);
                    self.complete(Err(Error::io("scan failed")));
                }
            },
            Job::Connect { .. } if self.shared.is_connected() => {
                self.complete(Err(Error::io("already connected")))
            }
            Job::Connect { port } if port.is_empty() => match self.link.start_scan() {
                Ok(()) => self.begin_scan(State::Connecting(Connecting::Scanning)),
                Err(error) => self.fail_connect(error.to_string()),
            },
            Job::Connect { port } => self.link_to(&port),
            Job::Disconnect => {
                self.link.stop_scan();
                self.link.close();
                self.shared.connected.store(false, Ordering::SeqCst);
                self.complete(Ok(Outcome::Done));
            }
            Job::Write => self.write(),
            Job::Stop => self.stop(None),
        }
    }

    fn begin_scan(&mut self, state: State) {
        self.found.clear();
        self.state = state;
        self.deadline = Some(Instant::now() + self.options.scan_time);
    }

    fn link_to(&mut self, address: &str) {
        tracer!(self.options.tracer, Debug, "Connecting to {}", address);
        match self.link.connect(address) {
            Ok(()) => {
                self.state = State::Connecting(Connecting::Linking);
                self.deadline = Some(Instant::now() + self.options.connect_timeout);
            }
            Err(error) => self.fail_connect(error.to_string()),
        }
    }

    fn write(&mut self) {
        let bytes: Vec<u8> = self.shared.outbound.lock().drain(..).flatten().collect();
        if bytes.is_empty() {
            return self.complete(Ok(Outcome::Done));
        }
        if !self.shared.is_connected() {
            return self.complete(Err(Error::NotOpen));
        }
        tracer!(self.options.tracer, Trace, "BLE write: [{}]", format_as_hex(&bytes));
        match self.link.write_request(TX_CHARACTERISTIC, &bytes) {
            Ok(()) => {
                self.state = State::Writing;
                self.deadline = Some(Instant::now() + self.options.connect_timeout);
            }
            Err(error) => self.complete(Err(error)),
        }
    }

    fn on_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Advertisement {
                address,
                name,
                connectable,
                services,
            } => {
                let scanning = matches!(
                    self.state,
                    State::Scanning | State::Connecting(Connecting::Scanning)
                );
                if !scanning || !connectable || !services.contains(&FIRMATA_SERVICE) {
                    return;
                }
                if self.found.iter().any(|port| port.port == address) {
                    return;
                }
                tracer!(self.options.tracer, Debug, "Found {} ({:?})", address, name);
                self.found
                    .push(PortDescriptor::new(address.clone(), name.unwrap_or_default(), ""));
                if self.state == State::Connecting(Connecting::Scanning) {
                    self.link.stop_scan();
                    self.link_to(&address);
                }
            }
            LinkEvent::Connected => {
                if self.state == State::Connecting(Connecting::Linking) {
                    match self.link.discover_services() {
                        Ok(()) => self.state = State::Connecting(Connecting::Discovering),
                        Err(error) => self.fail_connect(error.to_string()),
                    }
                }
            }
            LinkEvent::ServicesDiscovered(uuids) => {
                if self.state == State::Connecting(Connecting::Discovering) {
                    self.negotiate(&uuids);
                }
            }
            LinkEvent::WriteComplete => match self.state {
                State::Connecting(Connecting::Negotiating) => {
                    self.shared.connected.store(true, Ordering::SeqCst);
                    tracer!(self.options.tracer, Info, "BLE link ready");
                    self.complete(Ok(Outcome::Done));
                }
                State::Writing => self.complete(Ok(Outcome::Done)),
                _ => {}
            },
            LinkEvent::Notification(bytes) => {
                tracer!(self.options.tracer, Trace, "BLE notification: [{}]", format_as_hex(&bytes));
                let evicted = self.shared.inbound.push(bytes);
                if evicted > 0 {
                    tracer!(self.options.tracer, Debug, "Inbound queue full: {} dropped", evicted);
                }
            }
            LinkEvent::Disconnected(reason) => {
                tracer!(self.options.tracer, Info, "BLE link lost: {}", reason);
                self.shared.connected.store(false, Ordering::SeqCst);
                match self.state {
                    State::Connecting(_) => self.fail_connect(String::from("Disconnected")),
                    State::Writing => self.complete(Err(Error::io("Disconnected"))),
                    _ => {}
                }
            }
            LinkEvent::Failed(reason) => match self.state {
                State::Connecting(_) => self.fail_connect(reason),
                State::Writing => self.complete(Err(Error::io(reason))),
                State::Scanning => {
                    self.link.stop_scan();
                    tracer!(self.options.tracer, Warn, "Scan failed: {}", reason);
                    self.complete(Err(Error::io("scan failed")));
                }
                _ => tracer!(self.options.tracer, Debug, "Ignored link failure: {}", reason),
            },
        }
    }

    /// Checks the Firmata characteristics are there, subscribes to replies and sets the
    /// reporting interval.
    fn negotiate(&mut self, uuids: &[u128]) {
        if !uuids.contains(&TX_CHARACTERISTIC) {
            return self.fail_connect(String::from("Failed to find TX characteristic"));
        }
        if !uuids.contains(&RX_CHARACTERISTIC) {
            return self.fail_connect(String::from("Failed to find RX characteristic"));
        }
        if let Err(error) = self.link.enable_notifications(RX_CHARACTERISTIC) {
            return self.fail_connect(error.to_string());
        }
        let interval = self.options.reporting_interval.as_millis().min(0x3FFF) as u32;
        let [lsb, msb] = to_7bit_pair(interval);
        let frame = [START_SYSEX, SAMPLING_INTERVAL, lsb, msb, END_SYSEX];
        match self.link.write_request(TX_CHARACTERISTIC, &frame) {
            Ok(()) => self.state = State::Connecting(Connecting::Negotiating),
            Err(error) => self.fail_connect(error.to_string()),
        }
    }

    fn on_deadline(&mut self) {
        match self.state {
            State::Scanning => {
                self.link.stop_scan();
                let ports = std::mem::take(&mut self.found);
                tracer!(self.options.tracer, Debug, "Scan done: {} device(s)", ports.len());
                self.complete(Ok(Outcome::Ports(ports)));
            }
            State::Connecting(Connecting::Scanning) => {
                self.fail_connect(String::from("No suitable devices found"))
            }
            State::Connecting(_) => self.fail_connect(String::from("Connection timed out")),
            State::Writing => self.complete(Err(Error::io("Write timed out"))),
            State::Idle | State::Stopped => self.deadline = None,
        }
    }

    /// Aborts a connection: the link is closed and the caller gets `reason`.
    fn fail_connect(&mut self, reason: String) {
        tracer!(self.options.tracer, Warn, "BLE connection failed: {}", reason);
        self.link.stop_scan();
        self.link.close();
        self.shared.connected.store(false, Ordering::SeqCst);
        self.complete(Err(Error::io(reason)));
    }

    /// Ends the job in progress: the worker is idle again and the caller is woken.
    fn complete(&mut self, result: Result<Outcome, Error>) {
        self.state = State::Idle;
        self.deadline = None;
        if let Some(reply) = self.current.take() {
            // The caller may have given up waiting.
            let _ = reply.try_send(result);
        }
    }

    fn stop(&mut self, reply: Option<Reply>) {
        self.link.stop_scan();
        self.link.close();
        self.shared.connected.store(false, Ordering::SeqCst);
        if let Some(pending) = self.current.take() {
            let _ = pending.try_send(Err(Error::io("Transport stopped")));
        }
        for request in self.deferred.drain(..) {
            let _ = request.reply.try_send(Err(Error::io("Transport stopped")));
        }
        self.state = State::Stopped;
        self.deadline = None;
        if let Some(reply) = reply {
            let _ = reply.try_send(Ok(Outcome::Done));
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
