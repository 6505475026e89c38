use std::io;
use std::time::Duration;

use async_trait::async_trait;
use gdmlink_protocol::TransportError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time;

use super::lock::DeviceLock;
use super::Transport;
use crate::Error;

const READ_CHUNK: usize = 1024;

/// A locked, byte-stream like device.
pub struct StreamTransport<T> {
    path: String,
    write_timeout: Duration,
    inner: Option<(DeviceLock, T)>,
}

impl<T> StreamTransport<T> {
    pub fn new(path: String, lock: DeviceLock, stream: T, write_timeout: Duration) -> Self {
        StreamTransport {
            path,
            write_timeout,
            inner: Some((lock, stream)),
        }
    }

    fn stream(&mut self) -> crate::Result<&mut T> {
        match self.inner.as_mut() {
            Some((_, stream)) => Ok(stream),
            None => Err(Error::transport(TransportError::Closed)),
        }
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for StreamTransport<T> {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    async fn read(&mut self, timeout: Duration) -> crate::Result<Vec<u8>> {
        let stream = self.stream()?;
        let mut data = vec![0; READ_CHUNK];
        let num_read = match time::timeout(timeout, stream.read(&mut data)).await {
            Ok(x) => x.map_err(Error::transport)?,
            Err(_) => return Err(Error::protocol_timeout()),
        };
        if num_read == 0 {
            return Err(Error::transport(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device returned end of file",
            )));
        }
        data.truncate(num_read);
        Ok(data)
    }

    async fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        let write_timeout = self.write_timeout;
        let stream = self.stream()?;
        let fut = async {
            let written = stream.write(data).await?;
            stream.flush().await?;
            Ok::<_, io::Error>(written)
        };
        match time::timeout(write_timeout, fut).await {
            Ok(x) => x.map_err(Error::transport),
            Err(_) => Err(Error::protocol_timeout()),
        }
    }

    fn close(&mut self) {
        if self.inner.take().is_some() {
            log::debug!("closed {}", self.path);
        }
    }
}
