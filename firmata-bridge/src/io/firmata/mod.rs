//! Official Firmata documentation: https://github.com/firmata/protocol
//! Helper unofficial documentation: https://github.com/martin-eden/firmata_protocol/blob/main/protocol.md

pub mod constants;
mod decode;

use std::fmt::{Debug, Display, Formatter};
use std::time::{Duration, Instant};

use log::LevelFilter;

use crate::errors::Error;
use crate::io::firmata::constants::*;
use crate::io::{DeviceIdentity, Extension, Pin, PinModeId, Pins, Transport};
use crate::utils::{format_as_hex, to_7bit_pair, tracer, Tracer};

/// Callback receiving the STRING_DATA messages no extension claimed.
pub type StringCallback = Box<dyn FnMut(&str) + Send>;

/// Tunables of a [`Firmata`] engine.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FirmataOptions {
    /// How long construction waits for each bootstrap reply.
    pub timeout: Duration,
    /// Maximum number of bytes pulled from the transport by a single `parse`.
    pub read_chunk: usize,
    #[cfg_attr(feature = "serde", serde(skip, default = "FirmataOptions::default_tracer"))]
    pub tracer: Tracer,
}

impl Default for FirmataOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            read_chunk: 1024,
            tracer: Self::default_tracer(),
        }
    }
}

impl FirmataOptions {
    fn default_tracer() -> Tracer {
        Tracer::new("firmata::engine", LevelFilter::Warn)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk.max(1);
        self
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }
}

/// Client side of the [Firmata protocol](https://github.com/firmata/protocol) over any [`Transport`].
///
/// The engine keeps a [`Pins`] model in sync with the device: outgoing commands update it
/// immediately, incoming messages update it when decoded by [`Firmata::parse`]. Nothing runs in
/// the background: bytes are only consumed when `parse` (or an `await_*` helper) is called.
pub struct Firmata {
    /// Transport layer used to communicate with the device.
    transport: Box<dyn Transport>,
    pins: Pins,
    identity: DeviceIdentity,
    /// Bytes of an interrupted command, kept for the next `parse`.
    partial: Vec<u8>,
    extensions: Vec<Box<dyn Extension>>,
    on_string: StringCallback,
    options: FirmataOptions,
    ready: bool,
}

impl Firmata {
    /// Opens `transport` and runs the bootstrap sequence.
    ///
    /// The device is asked for its protocol version: the engine is ready only if that reply
    /// arrives within `options.timeout`. When it does, the firmware identity, pin capabilities,
    /// analog mapping and pin states are queried in turn.
    ///
    /// # Errors
    /// Only transport errors: a silent device gives an engine that is not ready.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_bridge::io::{Firmata, FirmataOptions, PinModeId, Serial};
    ///
    /// let mut firmata = Firmata::new(Serial::new("/dev/ttyACM0"), FirmataOptions::default())?;
    /// firmata.pin_mode(13, PinModeId::OUTPUT)?;
    /// firmata.digital_write(13, true)?;
    /// # Ok::<(), firmata_bridge::errors::Error>(())
    /// ```
    pub fn new<T: Transport>(transport: T, options: FirmataOptions) -> Result<Self, Error> {
        Self::from_boxed(Box::new(transport), options)
    }

    /// Same as [`Firmata::new`] for an already boxed transport.
    pub fn from_boxed(
        transport: Box<dyn Transport>,
        options: FirmataOptions,
    ) -> Result<Self, Error> {
        let tracer = options.tracer;
        let mut firmata = Self {
            transport,
            pins: Pins::default(),
            identity: DeviceIdentity::default(),
            partial: vec![],
            extensions: vec![],
            on_string: Box::new(move |message: &str| {
                tracer!(tracer, Info, "Firmata string: {}", message);
            }),
            options,
            ready: false,
        };

        firmata.transport.open()?;
        tracer!(tracer, Debug, "{} opened", firmata.transport);

        firmata.standard_command(&[REPORT_VERSION])?;
        firmata.ready = firmata.await_response(REPORT_VERSION, firmata.options.timeout)?;
        match firmata.ready {
            true => firmata.initialize()?,
            false => tracer!(
                tracer,
                Warn,
                "No version reply from {} within {:?}",
                firmata.transport,
                firmata.options.timeout
            ),
        }
        Ok(firmata)
    }

    /// Queries everything the model needs: firmware, capabilities, analog mapping, pin states.
    fn initialize(&mut self) -> Result<(), Error> {
        let timeout = self.options.timeout;

        self.sysex_query(REPORT_FIRMWARE)?;
        if !self.await_sysex_response(REPORT_FIRMWARE, timeout)? {
            tracer!(self.options.tracer, Warn, "No firmware report received");
        }

        self.pins.reset_all();
        self.sysex_query(CAPABILITY_QUERY)?;
        if !self.await_sysex_response(CAPABILITY_RESPONSE, timeout)? {
            tracer!(self.options.tracer, Warn, "No capability response received");
        }

        self.sysex_query(ANALOG_MAPPING_QUERY)?;
        if !self.await_sysex_response(ANALOG_MAPPING_RESPONSE, timeout)? {
            tracer!(self.options.tracer, Warn, "No analog mapping response received");
        }
        let analog_pins: Vec<u8> = self.pins.analog_pins().map(|pin| pin.id).collect();
        for pin in analog_pins {
            self.pin_mode(pin, PinModeId::ANALOG)?;
        }

        // Replies are absorbed by later parse calls.
        let known_pins: Vec<u8> = self
            .pins
            .iter()
            .filter(|pin| !pin.supported_modes.is_empty())
            .map(|pin| pin.id)
            .collect();
        for pin in known_pins {
            self.sysex_command(&[PIN_STATE_QUERY, pin])?;
        }

        tracer!(self.options.tracer, Info, "Connected to {}", self.identity);
        Ok(())
    }

    // ########################################
    // Accessors

    /// Whether the device answered the version request during construction.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Firmware name and version as last reported by the device.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn pins(&self) -> &Pins {
        &self.pins
    }

    pub fn pins_mut(&mut self) -> &mut Pins {
        &mut self.pins
    }

    pub fn options(&self) -> &FirmataOptions {
        &self.options
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }

    /// Registers a sysex extension: it is offered frames after the ones registered before it.
    pub fn register_extension<E: Extension + 'static>(&mut self, extension: E) {
        self.extensions.push(Box::new(extension));
    }

    /// Replaces the callback receiving the STRING_DATA messages no extension claimed.
    ///
    /// The default one logs them at info level.
    pub fn on_string<F: FnMut(&str) + Send + 'static>(&mut self, callback: F) {
        self.on_string = Box::new(callback);
    }

    /// Closes the underlying transport.
    pub fn close(&mut self) -> Result<(), Error> {
        self.transport.close()
    }

    // ########################################
    // Read/Write on pins

    /// Sets the `mode` of the specified `pin`.
    ///
    /// Send a SET_PIN_MODE (0xF4) message.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    pub fn pin_mode(&mut self, pin: u8, mode: PinModeId) -> Result<(), Error> {
        let Some(instance) = self.addressable_pin(pin) else {
            return Ok(());
        };
        instance.mode = Some(mode);
        self.standard_command(&[SET_PIN_MODE, pin, mode as u8])
    }

    /// Writes `level` to the digital `pin`.
    ///
    /// Send a SET_DIGITAL_PIN_VALUE (0xF5) message: only that pin is affected, unlike a
    /// DIGITAL_MESSAGE which sets a whole port.
    pub fn digital_write(&mut self, pin: u8, level: bool) -> Result<(), Error> {
        let Some(instance) = self.addressable_pin(pin) else {
            return Ok(());
        };
        instance.value = u32::from(level);
        self.standard_command(&[SET_DIGITAL_PIN_VALUE, pin, u8::from(level)])
    }

    /// Writes `value` to the analog (or PWM, servo...) `pin`.
    ///
    /// Pins up to 15 with values up to 14 bits use an ANALOG_MESSAGE (0xE0): the pin lives in the
    /// low nibble of the command. Anything larger uses an EXTENDED_ANALOG sysex (0x6F) carrying as
    /// many 7-bit groups as the value needs (at least two).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#extended-analog>
    pub fn analog_write(&mut self, pin: u8, value: u32) -> Result<(), Error> {
        let Some(instance) = self.addressable_pin(pin) else {
            return Ok(());
        };
        instance.value = value;

        if pin <= MAX_COMPACT_ANALOG_PIN && value <= MAX_COMPACT_ANALOG_VALUE {
            let [lsb, msb] = to_7bit_pair(value);
            return self.standard_command(&[ANALOG_MESSAGE | pin, lsb, msb]);
        }

        let mut payload = vec![EXTENDED_ANALOG, pin];
        payload.extend_from_slice(&to_7bit_pair(value));
        let mut remaining = value >> 14;
        while remaining > 0 {
            payload.push((remaining & 0x7F) as u8);
            remaining >>= 7;
        }
        self.sysex_command(&payload)
    }

    /// The model of `pin`, `None` (and logged) for pins the protocol cannot address.
    fn addressable_pin(&mut self, pin: u8) -> Option<&mut Pin> {
        let instance = self.pins.pin_mut(pin);
        if instance.is_none() {
            tracer!(self.options.tracer, Debug, "Pin {} out of range: nothing sent", pin);
        }
        instance
    }

    /// Writes `value` to the pin bound to analog `channel` ("A0" => 0).
    ///
    /// # Returns
    /// `false` (and nothing is sent) if no pin is bound to that channel.
    pub fn analog_write_channel(&mut self, channel: u8, value: u32) -> Result<bool, Error> {
        match self.pins.pin_for_channel(channel).map(|pin| pin.id) {
            Some(pin) => self.analog_write(pin, value).map(|_| true),
            None => {
                tracer!(self.options.tracer, Debug, "No pin bound to channel A{}", channel);
                Ok(false)
            }
        }
    }

    /// Last known digital level of `pin`.
    pub fn digital_read(&self, pin: u8) -> Option<bool> {
        self.pins.digital_read(pin)
    }

    /// Last known value of `pin`.
    pub fn analog_read(&self, pin: u8) -> Option<u32> {
        self.pins.analog_read(pin)
    }

    /// Last known value of the pin bound to analog `channel`.
    pub fn analog_read_channel(&self, channel: u8) -> Option<u32> {
        self.pins.analog_read_channel(channel)
    }

    // ########################################
    // Reporting

    /// Enables or disables the periodic report of an analog `channel`.
    ///
    /// Send a REPORT_ANALOG (0xC0) message.
    pub fn report_analog(&mut self, channel: u8, enable: bool) -> Result<(), Error> {
        self.standard_command(&[REPORT_ANALOG | (channel & 0x0F), u8::from(enable)])
    }

    /// Enables or disables the report of digital `port` (8 pins) changes.
    ///
    /// Send a REPORT_DIGITAL (0xD0) message.
    pub fn report_digital(&mut self, port: u8, enable: bool) -> Result<(), Error> {
        self.standard_command(&[REPORT_DIGITAL | (port & 0x0F), u8::from(enable)])
    }

    /// Sets the interval between analog reports, capped to 14 bits (16383 ms).
    ///
    /// Send a SAMPLING_INTERVAL (0x7A) sysex.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#sampling-interval>
    pub fn set_sampling_interval(&mut self, interval_ms: u16) -> Result<(), Error> {
        let [lsb, msb] = to_7bit_pair(u32::from(interval_ms).min(0x3FFF));
        self.sysex_command(&[SAMPLING_INTERVAL, lsb, msb])
    }

    /// Sends a software reset request.
    pub fn system_reset(&mut self) -> Result<(), Error> {
        self.standard_command(&[SYSTEM_RESET])
    }

    // ########################################
    // Raw commands

    /// Writes `bytes` as-is.
    pub fn standard_command(&mut self, bytes: &[u8]) -> Result<(), Error> {
        tracer!(self.options.tracer, Trace, "Send: [{}]", format_as_hex(bytes));
        self.transport.write(bytes)?;
        Ok(())
    }

    /// Writes `bytes` wrapped in START_SYSEX / END_SYSEX.
    pub fn sysex_command(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let mut frame = Vec::with_capacity(bytes.len() + 2);
        frame.push(START_SYSEX);
        frame.extend_from_slice(bytes);
        frame.push(END_SYSEX);
        self.standard_command(&frame)
    }

    /// Sends a sysex frame made of the sole `command` byte.
    pub fn sysex_query(&mut self, command: u8) -> Result<(), Error> {
        self.sysex_command(&[command])
    }

    // ########################################
    // Awaiting

    /// Decodes incoming commands one at a time until one with `command` completes, or `timeout`
    /// elapses.
    ///
    /// Channel-addressed commands (ANALOG_MESSAGE, DIGITAL_MESSAGE, ...) match on their high
    /// nibble: awaiting `0xE0` is satisfied by `0xE3`.
    pub fn await_response(&mut self, command: u8, timeout: Duration) -> Result<bool, Error> {
        self.await_code(timeout, |code| match command < 0xF0 {
            true => code <= 0xFF && (code as u8) & 0xF0 == command & 0xF0,
            false => code == command as u16,
        })
    }

    /// Decodes incoming commands one at a time until a sysex frame with `command` completes, or
    /// `timeout` elapses.
    pub fn await_sysex_response(&mut self, command: u8, timeout: Duration) -> Result<bool, Error> {
        let target = ((START_SYSEX as u16) << 8) | command as u16;
        self.await_code(timeout, |code| code == target)
    }

    fn await_code<F>(&mut self, timeout: Duration, matches: F) -> Result<bool, Error>
    where
        F: Fn(u16) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if matches(self.parse(1)?) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
        }
    }
}

impl Debug for Firmata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firmata")
            .field("transport", &self.transport)
            .field("identity", &self.identity)
            .field("ready", &self.ready)
            .field("partial", &self.partial)
            .field("extensions", &self.extensions.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Display for Firmata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Firmata [firmware={}, ready={}, transport={}]",
            self.identity, self.ready, self.transport
        )
    }
}
