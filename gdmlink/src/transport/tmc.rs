//! USB-TMC character devices (`/dev/usbtmcN`), driven through tokio's readiness API.
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::ready;
use gdmlink_protocol::TransportError;
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, Interest, ReadBuf};

use super::lock::DeviceLock;
use super::stream::StreamTransport;

pub type TmcTransport = StreamTransport<TmcDevice>;

pub fn is_tmc_path(path: &str) -> bool {
    path.contains("usbtmc")
}

pub async fn open(path: &str, write_timeout: Duration) -> crate::Result<TmcTransport> {
    log::debug!("Opening USB-TMC device {}", path);
    let device = TmcDevice::open(path)?;
    let lock = DeviceLock::acquire(&device, path)?;
    Ok(StreamTransport::new(path.to_string(), lock, device, write_timeout))
}

pub struct TmcDevice {
    inner: AsyncFd<File>,
}

impl TmcDevice {
    fn open(path: &str) -> crate::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
            .open(path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => crate::Error::transport(TransportError::NotFound(path.to_string())),
                _ => crate::Error::transport(err),
            })?;
        let inner = AsyncFd::with_interest(file, Interest::READABLE | Interest::WRITABLE)
            .map_err(|err| crate::Error::transport(TransportError::config(err)))?;
        Ok(TmcDevice { inner })
    }
}

impl AsRawFd for TmcDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl AsyncRead for TmcDevice {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for TmcDevice {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.inner.poll_write_ready(cx))?;
            match guard.try_io(|inner| inner.get_ref().write(buf)) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
