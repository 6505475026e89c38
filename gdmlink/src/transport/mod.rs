//! Byte level access to the meter.
use std::time::Duration;

use async_trait::async_trait;

pub use serial::{BaudRate, SerialParams};

pub mod lock;
pub mod serial;
pub mod stream;
#[cfg(unix)]
pub mod tmc;

#[cfg(test)]
pub mod mock;

/// An open, exclusively owned connection to the meter.
///
/// A read timeout is reported as [`crate::Error::protocol_timeout`]; any other error means the
/// handle is unusable and has to be replaced.
#[async_trait]
pub trait Transport: Send {
    fn path(&self) -> &str;

    fn is_open(&self) -> bool;

    /// Wait at most `timeout` for input and return whatever is available, possibly only part of
    /// a line.
    async fn read(&mut self, timeout: Duration) -> crate::Result<Vec<u8>>;

    /// Returns the number of bytes written. Short writes are not an error.
    async fn write(&mut self, data: &[u8]) -> crate::Result<usize>;

    /// Release the lock and the descriptor. Closing twice is a no-op.
    fn close(&mut self);
}

/// Open `path` as USB-TMC device if it looks like one, as serial port otherwise.
pub async fn open(
    path: &str,
    params: &SerialParams,
    write_timeout: Duration,
) -> crate::Result<Box<dyn Transport>> {
    #[cfg(unix)]
    {
        if tmc::is_tmc_path(path) {
            let transport = tmc::open(path, write_timeout).await?;
            return Ok(Box::new(transport));
        }
    }
    let transport = serial::open(path, params, write_timeout).await?;
    Ok(Box::new(transport))
}
