/// A sysex sub-protocol plugged into a [`Firmata`](crate::io::Firmata) engine.
///
/// Extensions are offered, in registration order, every sysex frame the engine does not handle
/// itself, and every string message. The first one answering `true` stops the dispatch.
pub trait Extension: Send {
    /// Handles a sysex frame: `command` is the subcommand byte, `data` the payload between it and
    /// END_SYSEX.
    fn handle_sysex(&mut self, command: u8, data: &[u8]) -> bool;

    /// Handles a STRING_DATA message.
    fn handle_string(&mut self, _data: &str) -> bool {
        false
    }
}
