use log::error;
use snafu::Snafu;

pub use crate::errors::Error::*;

/// Errors raised by transports.
///
/// The protocol engine itself adds no error kind: a missing reply is reported
/// as `Ok(false)` by the await operations, never as an error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Transport error: {info}.
    IoError { info: String },
    /// Transport error: connection not open.
    NotOpen,
}

impl Error {
    /// Builds an [`Error::IoError`] out of any displayable reason.
    pub fn io<S: Into<String>>(info: S) -> Self {
        IoError { info: info.into() }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        error!("std::io error {:?}", error);
        let info = match error.kind() {
            std::io::ErrorKind::NotFound => String::from("Device not found or already in use"),
            std::io::ErrorKind::PermissionDenied => String::from("Device connection lost"),
            _ => error.to_string(),
        };
        IoError { info }
    }
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        std::io::Error::from(value).into()
    }
}
