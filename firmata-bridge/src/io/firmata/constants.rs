//! Firmata protocol constants
//! <https://github.com/firmata/protocol/blob/master/protocol.md>

// ########################################
// Message command bytes (128-255/0x80-0xFF)

/// Send data for a digital port (collection of 8 pins)
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin (or PWM)
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable analog input by pin #
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input by port pair
pub const REPORT_DIGITAL: u8 = 0xD0;
//
/// Set a pin to INPUT/OUTPUT/PWM/etc
pub const SET_PIN_MODE: u8 = 0xF4;
/// Set value of an individual digital pin
pub const SET_DIGITAL_PIN_VALUE: u8 = 0xF5;
//
/// Report protocol version
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI
pub const SYSTEM_RESET: u8 = 0xFF;
//
/// Start a MIDI Sysex message
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI Sysex message
pub const END_SYSEX: u8 = 0xF7;

// Extended command set using sysex (0-127/0x00-0x7F)

/// Analog write (PWM, Servo, etc) to any pin
pub const EXTENDED_ANALOG: u8 = 0x6F;
/// Ask for supported modes and resolution of all pins
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolution
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for mapping of analog to pin numbers
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
/// Reply with mapping info
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Ask for a pin's current mode and value
pub const PIN_STATE_QUERY: u8 = 0x6D;
/// Reply with pin's current mode and value
pub const PIN_STATE_RESPONSE: u8 = 0x6E;
/// String message with 14-bits per char
pub const STRING_DATA: u8 = 0x71;
/// Send an I2C read/write request
pub const I2C_REQUEST: u8 = 0x76;
/// Reply to an I2C read request
pub const I2C_REPLY: u8 = 0x77;
/// Config I2C settings such as delay times and power pins
pub const I2C_CONFIG: u8 = 0x78;
/// Report name and version of the firmware
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Set the poll rate of the main loop
pub const SAMPLING_INTERVAL: u8 = 0x7A;
/// MIDI Reserved for realtime messages: also the "end of pin" and "no channel" marker.
pub const SYSEX_REALTIME: u8 = 0x7F;

// I2C request mode flags (OR-ed into the address MSB byte).
pub const I2C_WRITE: u8 = 0x00;
pub const I2C_READ_ONCE: u8 = 0x08;
pub const I2C_READ_CONTINUOUSLY: u8 = 0x10;
pub const I2C_STOP_READING: u8 = 0x18;
pub const I2C_10BIT_ADDRESS_MODE: u8 = 0x20;
/// Register value sent back by the firmware when the request had no register.
pub const I2C_REGISTER_NOT_SPECIFIED: u16 = 0x3FFF;

// Other values
/// Largest value a compact (3 bytes) analog message can carry.
pub const MAX_COMPACT_ANALOG_VALUE: u32 = 0x3FFF;
/// Highest pin addressable by a compact analog message.
pub const MAX_COMPACT_ANALOG_PIN: u8 = 15;
/// Number of pins tracked by the pin model.
pub const MAX_PINS: usize = 128;
