use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};

use crate::io::firmata::constants::{MAX_PINS, SYSEX_REALTIME};

/// Represents the pin model a [`Firmata`](crate::io::Firmata) engine keeps in sync with the device.
///
/// Pins are index-addressed (`0..128`). A reverse map from analog channel to pin index is
/// maintained alongside so that analog messages (which carry a channel, not a pin) can be routed.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pins {
    pins: Vec<Pin>,
    channels: HashMap<u8, u8>,
}

impl Default for Pins {
    fn default() -> Self {
        let mut pins = Self {
            pins: Vec::with_capacity(MAX_PINS),
            channels: HashMap::new(),
        };
        pins.reset_all();
        pins
    }
}

impl Pins {
    /// Sets every pin back to its unknown state: no mode, no capability, no channel, value 0.
    pub fn reset_all(&mut self) {
        self.pins = (0..MAX_PINS)
            .map(|id| Pin {
                id: id as u8,
                ..Default::default()
            })
            .collect();
        self.channels.clear();
    }

    /// Applies a CAPABILITY_RESPONSE payload (0x6C) to the model.
    ///
    /// The payload is a sequence of `(mode, resolution)` pairs per pin, each pin run ending with
    /// `0x7F`. Pins with no pair before their `0x7F` end up with no capability at all. All
    /// capability lists are cleared first, so applying the same report twice gives the same state.
    ///
    /// # Returns
    /// The number of `(mode, resolution)` pairs skipped because their mode is unknown.
    pub fn apply_capability_report(&mut self, payload: &[u8]) -> usize {
        for pin in self.pins.iter_mut() {
            pin.supported_modes.clear();
        }

        let mut skipped = 0;
        let mut index = 0;
        let mut i = 0;
        while i < payload.len() && index < MAX_PINS {
            if payload[i] == SYSEX_REALTIME {
                index += 1;
                i += 1;
                continue;
            }
            // A mode byte without its resolution ends the report.
            let Some(&resolution) = payload.get(i + 1) else {
                break;
            };
            match PinModeId::from_u8(payload[i]) {
                Some(id) => self.pins[index]
                    .supported_modes
                    .push(PinMode { id, resolution }),
                None => skipped += 1,
            }
            i += 2;
        }
        skipped
    }

    /// Applies an ANALOG_MAPPING_RESPONSE payload (0x6A) to the model.
    ///
    /// Byte `i` is the analog channel of pin `i` (`0x7F` for none). Pins past the end of the
    /// payload keep their current channel. A channel can only belong to one pin: the last pin
    /// claiming it wins.
    pub fn apply_analog_mapping(&mut self, payload: &[u8]) {
        for (index, &channel) in payload.iter().enumerate().take(MAX_PINS) {
            let channel = (channel != SYSEX_REALTIME).then_some(channel);
            self.set_analog_channel(index as u8, channel);
        }
    }

    /// Assigns (or removes) the analog `channel` of the given pin, keeping channels unique.
    pub fn set_analog_channel(&mut self, pin: u8, channel: Option<u8>) {
        let Some(previous) = self.pins.get(pin as usize).map(|p| p.analog_channel) else {
            return;
        };
        if let Some(previous) = previous {
            if self.channels.get(&previous) == Some(&pin) {
                self.channels.remove(&previous);
            }
        }
        if let Some(channel) = channel {
            if let Some(owner) = self.channels.insert(channel, pin) {
                if owner != pin {
                    self.pins[owner as usize].analog_channel = None;
                }
            }
        }
        self.pins[pin as usize].analog_channel = channel;
    }

    /// Retrieves a pin by its index.
    pub fn pin(&self, pin: u8) -> Option<&Pin> {
        self.pins.get(pin as usize)
    }

    /// Retrieves a mutable pin by its index.
    ///
    /// The analog channel must be changed through [`Pins::set_analog_channel`] to keep the reverse
    /// map coherent.
    pub fn pin_mut(&mut self, pin: u8) -> Option<&mut Pin> {
        self.pins.get_mut(pin as usize)
    }

    /// Retrieves the pin bound to the analog `channel`.
    pub fn pin_for_channel(&self, channel: u8) -> Option<&Pin> {
        self.channels
            .get(&channel)
            .and_then(|&pin| self.pins.get(pin as usize))
    }

    /// Iterates over all pins.
    pub fn iter(&self) -> impl Iterator<Item = &Pin> {
        self.pins.iter()
    }

    /// Iterates over the pins having an analog channel.
    pub fn analog_pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.iter().filter(|pin| pin.analog_channel.is_some())
    }

    /// Stores the value reported by an ANALOG_MESSAGE for `channel`.
    ///
    /// # Returns
    /// `false` if no pin is bound to that channel.
    pub fn set_channel_value(&mut self, channel: u8, value: u32) -> bool {
        match self.channels.get(&channel) {
            Some(&pin) => {
                self.pins[pin as usize].value = value;
                true
            }
            None => false,
        }
    }

    /// Stores the values reported by a DIGITAL_MESSAGE for the 8 pins of `port`.
    ///
    /// Only pins currently in an input mode are updated; each gets 0 or 1.
    pub fn set_port_value(&mut self, port: u8, bits: u16) {
        for i in 0..8usize {
            let index = port as usize * 8 + i;
            if let Some(pin) = self.pins.get_mut(index) {
                if matches!(pin.mode, Some(PinModeId::INPUT) | Some(PinModeId::PULLUP)) {
                    pin.value = ((bits >> i) & 0x01) as u32;
                }
            }
        }
    }

    /// Reads the last known digital level of `pin`.
    pub fn digital_read(&self, pin: u8) -> Option<bool> {
        self.pin(pin).map(|pin| pin.value != 0)
    }

    /// Reads the last known value of `pin`.
    pub fn analog_read(&self, pin: u8) -> Option<u32> {
        self.pin(pin).map(|pin| pin.value)
    }

    /// Reads the last known value of the pin bound to analog `channel` ("A0" => 0).
    pub fn analog_read_channel(&self, channel: u8) -> Option<u32> {
        self.pin_for_channel(channel).map(|pin| pin.value)
    }
}

/// Represents the current state and capabilities of a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default, PartialEq)]
pub struct Pin {
    /// The pin index.
    pub id: u8,
    /// Currently configured mode: `None` until known.
    pub mode: Option<PinModeId>,
    /// All pin supported modes with their resolution, in capability report order.
    pub supported_modes: Vec<PinMode>,
    /// For analog pin, this is the channel number ie "A0"=>0, "A1"=>1, etc...
    pub analog_channel: Option<u8>,
    /// Last value read or written.
    pub value: u32,
}

impl Pin {
    /// Verifies if a pin supports the given mode and returns it if it does.
    pub fn supports_mode(&self, mode: PinModeId) -> Option<PinMode> {
        self.supported_modes.iter().find(|m| m.id == mode).copied()
    }

    /// The resolutions of the supported modes, in the same order.
    pub fn resolutions(&self) -> Vec<u8> {
        self.supported_modes.iter().map(|m| m.resolution).collect()
    }

    /// The resolution of the current mode, if any.
    pub fn resolution(&self) -> Option<u8> {
        self.mode
            .and_then(|mode| self.supports_mode(mode))
            .map(|mode| mode.resolution)
    }
}

impl Debug for Pin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mode_str = match self.mode {
            Some(mode) => mode.to_string(),
            None => String::from("UNSET"),
        };
        f.debug_struct("Pin")
            .field("id", &self.id)
            .field("mode", &mode_str)
            .field("supported modes", &self.supported_modes)
            .field("channel", &self.analog_channel)
            .field("value", &self.value)
            .finish()
    }
}

// ########################################

/// Firmware identity as reported by the device.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Firmware name (e.g. "StandardFirmata.ino").
    pub name: String,
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl Display for DeviceIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} v{}.{}", self.name, self.major, self.minor)
    }
}

// ########################################

/// Represents a mode a pin supports.
///
/// # Fields
/// - `id`: The ID of the mode.
/// - `resolution`: The resolution (number of bits) this mode uses.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default, Copy, PartialEq, Eq)]
pub struct PinMode {
    /// Mode identifier.
    pub id: PinModeId,
    /// Resolution (number of bits) this mode uses.
    pub resolution: u8,
}

impl Display for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Debug for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            PinModeId::UNSUPPORTED => write!(f, "[{}]", self.id),
            _ => write!(f, "[id: {}, resolution: {}]", self.id, self.resolution),
        }
    }
}

// ########################################

/// Enumerates the possible modes for a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
#[repr(u8)]
pub enum PinModeId {
    /// Same as INPUT defined in Arduino.
    INPUT = 0,
    /// Same as OUTPUT defined in Arduino.h
    OUTPUT = 1,
    /// Analog pin in analogInput mode
    ANALOG = 2,
    /// Digital pin in PWM output mode
    PWM = 3,
    /// Digital pin in Servo output mode
    SERVO = 4,
    /// shiftIn/shiftOut mode
    SHIFT = 5,
    /// Pin included in I2C setup
    I2C = 6,
    /// Pin configured for 1-wire
    ONEWIRE = 7,
    /// Pin configured for stepper motor
    STEPPER = 8,
    /// Pin configured for rotary encoders
    ENCODER = 9,
    /// Pin configured for serial communication
    SERIAL = 0x0A,
    /// Enable internal pull-up resistor for pin
    PULLUP = 0x0B,
    /// Pin configured for SPI
    SPI = 0x0C,
    /// Pin configured for proximity sensors
    SONAR = 0x0D,
    /// Pin configured for piezzo buzzer tone generation
    TONE = 0x0E,
    /// Pin configured for DHT humidity and temperature sensors
    DHT = 0x0F,
    /// Pin configured to be ignored by digitalWrite and capabilityResponse
    #[default]
    UNSUPPORTED = 0x7F,
}

impl PinModeId {
    /// Converts a `u8` byte value into a `PinModeId`.
    ///
    /// # Returns
    /// `None` if the value does not match any known pin mode.
    pub fn from_u8(value: u8) -> Option<PinModeId> {
        match value {
            0 => Some(PinModeId::INPUT),
            1 => Some(PinModeId::OUTPUT),
            2 => Some(PinModeId::ANALOG),
            3 => Some(PinModeId::PWM),
            4 => Some(PinModeId::SERVO),
            5 => Some(PinModeId::SHIFT),
            6 => Some(PinModeId::I2C),
            7 => Some(PinModeId::ONEWIRE),
            8 => Some(PinModeId::STEPPER),
            9 => Some(PinModeId::ENCODER),
            0x0A => Some(PinModeId::SERIAL),
            0x0B => Some(PinModeId::PULLUP),
            0x0C => Some(PinModeId::SPI),
            0x0D => Some(PinModeId::SONAR),
            0x0E => Some(PinModeId::TONE),
            0x0F => Some(PinModeId::DHT),
            0x7F => Some(PinModeId::UNSUPPORTED),
            _ => None,
        }
    }
}

impl From<PinModeId> for u8 {
    fn from(mode: PinModeId) -> u8 {
        mode as u8
    }
}

impl Display for PinModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
