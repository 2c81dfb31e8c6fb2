use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::errors::Error;
use crate::errors::Error::NotOpen;
use crate::io::Transport;

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    fail_open: bool,
    fail_write: bool,
    chunk: Option<usize>,
    incoming: VecDeque<u8>,
    written: Vec<u8>,
}

/// In-memory transport: bytes pushed with [`MockTransport::push_incoming`] are served by `read`,
/// bytes written are recorded.
///
/// Clones share the same state so a test can keep a handle on a transport moved into an engine.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Creates a transport which will serve `incoming` once opened.
    pub fn with_incoming(incoming: &[u8]) -> Self {
        let transport = Self::default();
        transport.push_incoming(incoming);
        transport
    }

    /// Appends bytes to the stream served by `read`.
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.state.lock().incoming.extend(bytes);
    }

    /// Limits every `read` to `chunk` bytes, fragmenting the stream.
    pub fn with_chunk(self, chunk: usize) -> Self {
        self.state.lock().chunk = Some(chunk);
        self
    }

    /// Makes `open` fail.
    pub fn failing_open(self) -> Self {
        self.state.lock().fail_open = true;
        self
    }

    /// Makes `write` fail (or succeed again).
    pub fn fail_write(&self, fail: bool) {
        self.state.lock().fail_write = fail;
    }

    /// All bytes written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Returns the bytes written so far and forgets them.
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().written)
    }

    /// Bytes pushed but not yet read.
    pub fn pending(&self) -> usize {
        self.state.lock().incoming.len()
    }
}

impl Display for MockTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransport")
    }
}

impl Transport for MockTransport {
    fn open(&mut self) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(Error::io("Mock open failure"));
        }
        state.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.state.lock().open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn available(&self) -> Result<usize, Error> {
        Ok(self.state.lock().incoming.len())
    }

    fn read(&mut self, max_bytes: usize) -> Result<Vec<u8>, Error> {
        {
            let mut state = self.state.lock();
            if !state.open {
                return Err(NotOpen);
            }
            if !state.incoming.is_empty() {
                let len = max_bytes
                    .min(state.chunk.unwrap_or(usize::MAX))
                    .min(state.incoming.len());
                return Ok(state.incoming.drain(..len).collect());
            }
        }
        // Nothing pending: wait a short slice like a real link would.
        std::thread::sleep(Duration::from_millis(1));
        Ok(vec![])
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(NotOpen);
        }
        if state.fail_write {
            return Err(Error::io("Mock write failure"));
        }
        state.written.extend_from_slice(bytes);
        Ok(bytes.len())
    }
}
