use std::io;
use std::time::Duration;

use anyhow::anyhow;
use gdmlink_protocol::TransportError;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

pub use params::{BaudRate, SerialParams, SUPPORTED_BAUD_RATES};

use super::lock::DeviceLock;
use super::stream::StreamTransport;

pub mod params;

pub type SerialTransport = StreamTransport<SerialStream>;

/// Opens the serial port in raw 8N1 mode without flow control and locks it.
pub async fn open(path: &str, params: &SerialParams, write_timeout: Duration) -> crate::Result<SerialTransport> {
    log::debug!("Opening {} with {}", path, params);
    #[allow(unused_mut)]
    let mut serial_stream = params
        .builder(path)
        .open_native_async()
        .map_err(|err| map_tokio_serial_error(path, err))?;
    // exclusive access is left to the advisory lock, so a second open reports `Busy`
    #[cfg(unix)]
    serial_stream
        .set_exclusive(false)
        .map_err(|err| map_tokio_serial_error(path, err))?;
    let lock = DeviceLock::acquire(&serial_stream, path)?;
    Ok(StreamTransport::new(path.to_string(), lock, serial_stream, write_timeout))
}

fn map_tokio_serial_error(path: &str, err: tokio_serial::Error) -> crate::Error {
    // EBUSY from a port held with TIOCEXCL by some other program
    if err.description.to_ascii_lowercase().contains("busy") {
        return crate::Error::transport(TransportError::Busy(path.to_string()));
    }
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice | tokio_serial::ErrorKind::Io(io::ErrorKind::NotFound) => {
            crate::Error::transport(TransportError::NotFound(path.to_string()))
        }
        tokio_serial::ErrorKind::Io(kind) => crate::Error::transport(io::Error::new(kind, err.description)),
        _ => {
            crate::Error::transport(TransportError::config(anyhow!("{}: {}", path, err.description)))
        }
    }
}
