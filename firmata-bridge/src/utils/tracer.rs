//! Leveled diagnostics handed explicitly to each component.
//!
//! Every component (engine, I2C extension, transports) receives its own [`Tracer`] through its
//! options. A tracer couples a `log` target with the most verbose level that component is allowed
//! to emit: there is no process-wide debug switch, two engines may trace at different levels.

use log::{Level, LevelFilter};

/// A `log` target paired with the verbosity allowed for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tracer {
    target: &'static str,
    level: LevelFilter,
}

impl Tracer {
    /// Creates a tracer emitting on `target` up to `level` (included).
    pub const fn new(target: &'static str, level: LevelFilter) -> Self {
        Self { target, level }
    }

    /// Returns the same tracer with another verbosity.
    pub const fn with_level(self, level: LevelFilter) -> Self {
        Self {
            target: self.target,
            level,
        }
    }

    /// The `log` target records are emitted on.
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// The most verbose level this tracer lets through.
    pub fn level(&self) -> LevelFilter {
        self.level
    }

    /// Checks if a record at `level` would be forwarded to `log`.
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.level
    }
}

/// Emits a `log` record through a [`Tracer`] if its level allows it.
///
/// ```ignore
/// tracer!(self.tracer, Debug, "queue now holds {} entries", len);
/// ```
macro_rules! tracer {
    ($tracer:expr, $level:ident, $($arg:tt)+) => {{
        let tracer: &$crate::utils::Tracer = &$tracer;
        if tracer.enabled(log::Level::$level) {
            log::log!(target: tracer.target(), log::Level::$level, $($arg)+);
        }
    }};
}
pub(crate) use tracer;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracer_levels() {
        let tracer = Tracer::new("firmata::test", LevelFilter::Info);
        assert!(tracer.enabled(Level::Error));
        assert!(tracer.enabled(Level::Info));
        assert!(!tracer.enabled(Level::Debug));
        assert!(!tracer.enabled(Level::Trace));

        let tracer = tracer.with_level(LevelFilter::Off);
        assert!(!tracer.enabled(Level::Error));
        assert_eq!(tracer.target(), "firmata::test");
        assert_eq!(tracer.level(), LevelFilter::Off);
    }

    #[test]
    fn test_tracer_macro_compiles_for_every_level() {
        let tracer = Tracer::new("firmata::test", LevelFilter::Trace);
        tracer!(tracer, Error, "error {}", 1);
        tracer!(tracer, Warn, "warn");
        tracer!(tracer, Info, "info {:?}", [1, 2]);
        tracer!(tracer, Debug, "debug");
        tracer!(tracer, Trace, "trace {}", "x");
    }
}
