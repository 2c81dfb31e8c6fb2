use crate::errors::Error;
use crate::io::firmata::constants::*;
use crate::io::firmata::Firmata;
use crate::io::PinModeId;
use crate::utils::{decode_7bit_string, format_as_hex, from_7bit_pair, tracer};

/// Outcome of decoding the command starting at some buffer index.
enum Step {
    /// A command completed, the next one starts at `next`.
    Completed { code: u16, next: usize },
    /// Not a command start (or a corrupted one): resume at `next`.
    Skipped { next: usize },
    /// The buffer ends before the command does.
    Interrupted,
}

impl Firmata {
    /// Reads what the transport has and decodes as many commands as possible.
    ///
    /// Bytes of a command cut by the end of the buffer are kept and completed by the next call.
    /// When `max_commands` is not 0, decoding stops once that many commands completed: the
    /// remaining bytes are kept, untouched, for the next call.
    ///
    /// # Returns
    /// The code of the last completed command, 0 if none: the command byte for standard commands
    /// (e.g. `0xE3`), `0xF0 << 8 | subcommand` for sysex frames (e.g. `0xF079`).
    pub fn parse(&mut self, max_commands: usize) -> Result<u16, Error> {
        let incoming = self.transport.read(self.options.read_chunk)?;
        if !incoming.is_empty() {
            tracer!(self.options.tracer, Trace, "Received: [{}]", format_as_hex(&incoming));
        }

        let mut buffer = std::mem::take(&mut self.partial);
        buffer.extend_from_slice(&incoming);

        let mut last_completed = 0;
        let mut completed = 0;
        let mut i = 0;
        while i < buffer.len() {
            match self.decode_at(&buffer, i) {
                Step::Completed { code, next } => {
                    last_completed = code;
                    completed += 1;
                    i = next;
                    if max_commands != 0 && completed >= max_commands {
                        break;
                    }
                }
                Step::Skipped { next } => i = next,
                Step::Interrupted => break,
            }
        }

        buffer.drain(..i);
        self.partial = buffer;
        Ok(last_completed)
    }

    fn decode_at(&mut self, buffer: &[u8], start: usize) -> Step {
        let command = buffer[start];
        match command {
            START_SYSEX => {
                let Some(length) = buffer[start + 1..].iter().position(|&b| b == END_SYSEX) else {
                    return Step::Interrupted;
                };
                let end = start + 1 + length;
                let next = end + 1;
                match buffer[start + 1..end].split_first() {
                    Some((&subcommand, payload)) => {
                        self.handle_sysex(subcommand, payload);
                        Step::Completed {
                            code: ((START_SYSEX as u16) << 8) | subcommand as u16,
                            next,
                        }
                    }
                    None => Step::Skipped { next },
                }
            }
            REPORT_VERSION => self.decode_three_bytes(buffer, start, |firmata, major, minor| {
                firmata.identity.major = major;
                firmata.identity.minor = minor;
                tracer!(firmata.options.tracer, Debug, "Protocol version {}.{}", major, minor);
            }),
            _ if command & 0xF0 == ANALOG_MESSAGE => {
                self.decode_three_bytes(buffer, start, |firmata, lsb, msb| {
                    let channel = command & 0x0F;
                    let value = from_7bit_pair(lsb, msb) as u32;
                    if !firmata.pins.set_channel_value(channel, value) {
                        tracer!(firmata.options.tracer, Debug, "No pin bound to channel A{}", channel);
                    }
                })
            }
            _ if command & 0xF0 == DIGITAL_MESSAGE => {
                self.decode_three_bytes(buffer, start, |firmata, lsb, msb| {
                    firmata.pins.set_port_value(command & 0x0F, from_7bit_pair(lsb, msb));
                })
            }
            _ => Step::Skipped { next: start + 1 },
        }
    }

    /// Decodes a command followed by two data bytes.
    ///
    /// A data byte with its high bit set means the command was corrupted: only the command byte
    /// is skipped so that decoding resynchronizes on the next command byte.
    fn decode_three_bytes<F>(&mut self, buffer: &[u8], start: usize, apply: F) -> Step
    where
        F: FnOnce(&mut Firmata, u8, u8),
    {
        let data = &buffer[start + 1..buffer.len().min(start + 3)];
        if data.iter().any(|&byte| byte & 0x80 != 0) {
            return Step::Skipped { next: start + 1 };
        }
        if data.len() < 2 {
            return Step::Interrupted;
        }
        apply(self, data[0], data[1]);
        Step::Completed {
            code: buffer[start] as u16,
            next: start + 3,
        }
    }

    /// Dispatches a sysex frame: built-in responses first, then registered extensions in order.
    ///
    /// # Returns
    /// Whether someone handled the frame. Unhandled frames are dropped.
    pub fn handle_sysex(&mut self, command: u8, data: &[u8]) -> bool {
        match command {
            REPORT_FIRMWARE => self.handle_firmware_report(data),
            CAPABILITY_RESPONSE => {
                let skipped = self.pins.apply_capability_report(data);
                if skipped > 0 {
                    tracer!(self.options.tracer, Debug, "Skipped {} unknown pin modes", skipped);
                }
            }
            PIN_STATE_RESPONSE => self.handle_pin_state_response(data),
            ANALOG_MAPPING_RESPONSE => self.pins.apply_analog_mapping(data),
            STRING_DATA => self.handle_string(&decode_7bit_string(data)),
            _ => {
                let handled = self
                    .extensions
                    .iter_mut()
                    .any(|extension| extension.handle_sysex(command, data));
                if !handled {
                    tracer!(
                        self.options.tracer,
                        Debug,
                        "Unhandled sysex 0x{:02X}: [{}]",
                        command,
                        format_as_hex(data)
                    );
                }
                return handled;
            }
        }
        true
    }

    /// Handle a REPORT_FIRMWARE message (0x79 - report name and version of the firmware).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#query-firmware-name-and-version>
    fn handle_firmware_report(&mut self, data: &[u8]) {
        let [major, minor, name @ ..] = data else {
            tracer!(self.options.tracer, Debug, "Firmware report too short: [{}]", format_as_hex(data));
            return;
        };
        self.identity.major = *major;
        self.identity.minor = *minor;
        self.identity.name = decode_7bit_string(name);
        tracer!(self.options.tracer, Debug, "Firmware: {}", self.identity);
    }

    /// Handle a PIN_STATE_RESPONSE message (0x6E - report pin current mode and state)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#pin-state-query>
    fn handle_pin_state_response(&mut self, data: &[u8]) {
        let [pin, mode, state @ ..] = data else {
            tracer!(self.options.tracer, Debug, "Pin state too short: [{}]", format_as_hex(data));
            return;
        };
        let Some(instance) = self.pins.pin_mut(*pin) else {
            return;
        };
        match PinModeId::from_u8(*mode) {
            Some(mode) => instance.mode = Some(mode),
            None => tracer!(self.options.tracer, Debug, "Pin {} has unknown mode {}", pin, mode),
        }
        // Up to 21 bits, 7 per byte, LSB first.
        instance.value = state
            .iter()
            .take(3)
            .enumerate()
            .fold(0, |value, (i, byte)| value | ((*byte as u32 & 0x7F) << (7 * i)));
    }

    fn handle_string(&mut self, message: &str) {
        let handled = self
            .extensions
            .iter_mut()
            .any(|extension| extension.handle_string(message));
        if !handled {
            (self.on_string)(message);
        }
    }
}
