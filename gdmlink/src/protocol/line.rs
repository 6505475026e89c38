use std::time::Duration;

use anyhow::anyhow;
use gdmlink_protocol::ProtocolError;
use tokio::time::Instant;

use super::scpi;
use crate::transport::Transport;
use crate::{Error, Timing};

const DRAIN_SLICE: Duration = Duration::from_millis(1);
const TERM: u8 = b'\n';

/// Frames the meter's responses into lines. There is never more than one query in flight, so
/// anything received after the terminating newline is dropped.
pub struct LineReader {
    buf: Vec<u8>,
    step_timeout: Duration,
    poll_slice: Duration,
}

impl LineReader {
    pub fn new(timing: &Timing) -> Self {
        LineReader {
            buf: Vec::new(),
            step_timeout: timing.step_timeout,
            poll_slice: timing.poll_slice,
        }
    }

    pub async fn send(&mut self, transport: &mut dyn Transport, command: &str) -> crate::Result<()> {
        log::debug!("send: {}", command);
        let data = scpi::frame(command);
        let written = transport.write(&data).await?;
        if written < data.len() {
            log::debug!("short write: {} of {} bytes", written, data.len());
        }
        Ok(())
    }

    /// Read until a newline arrives or the step timeout elapses. A trailing CR is stripped.
    /// On timeout the partial line is discarded.
    pub async fn read_line(&mut self, transport: &mut dyn Transport) -> crate::Result<String> {
        self.buf.clear();
        let deadline = Instant::now() + self.step_timeout;
        loop {
            if let Some(pos) = self.buf.iter().position(|x| *x == TERM) {
                self.buf.truncate(pos);
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
                let line = String::from_utf8(self.buf.split_off(0))
                    .map_err(|_| Error::protocol(anyhow!("Cannot decode as UTF-8")))?;
                log::debug!("received: {}", line);
                return Ok(line);
            }
            let now = Instant::now();
            if now >= deadline {
                if !self.buf.is_empty() {
                    log::debug!("dropping partial line {:?}", String::from_utf8_lossy(&self.buf));
                }
                self.buf.clear();
                return Err(Error::protocol_timeout());
            }
            let slice = self.poll_slice.min(deadline - now);
            match transport.read(slice).await {
                Ok(data) => self.buf.extend_from_slice(&data),
                Err(err) if err.is_timeout() => {}
                Err(err) => {
                    self.buf.clear();
                    return Err(err);
                }
            }
        }
    }

    pub async fn query(&mut self, transport: &mut dyn Transport, command: &str) -> crate::Result<String> {
        self.send(transport, command).await?;
        self.read_line(transport).await
    }

    /// Discard stale input, e.g. a late answer to a query which already timed out. Fails if the
    /// input does not settle within the step timeout.
    pub async fn drain(&mut self, transport: &mut dyn Transport) -> crate::Result<usize> {
        self.buf.clear();
        let deadline = Instant::now() + self.step_timeout;
        let mut count = 0;
        loop {
            if Instant::now() >= deadline {
                log::warn!("{} keeps sending, discarded {} bytes", transport.path(), count);
                return Err(Error::protocol(ProtocolError::UnexpectedResponse(format!(
                    "input did not settle within {:?}",
                    self.step_timeout
                ))));
            }
            match transport.read(DRAIN_SLICE).await {
                Ok(data) => count += data.len(),
                Err(err) if err.is_timeout() => break,
                Err(err) => return Err(err),
            }
        }
        if count > 0 {
            log::debug!("drained {} stale bytes", count);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn reader() -> LineReader {
        LineReader::new(&Timing::default())
    }

    #[tokio::test(start_paused = true)]
    async fn query_strips_termination() {
        let mut transport = MockTransport::new("mock").reply("VOLT:AC");
        let log = transport.log();
        let line = reader().query(&mut transport, scpi::FUNCTION).await.unwrap();
        assert_eq!(line, "VOLT:AC");
        assert_eq!(log.written(), vec!["SENS:FUNC1?"]);
    }

    #[tokio::test(start_paused = true)]
    async fn assembles_partial_reads() {
        let mut transport = MockTransport::new("mock").reply("+1.2345E+00").chunked(3);
        let line = reader().query(&mut transport, scpi::VALUE).await.unwrap();
        assert_eq!(line, "+1.2345E+00");
    }

    #[tokio::test(start_paused = true)]
    async fn lf_only_termination() {
        let mut transport = MockTransport::new("mock").reply_raw(b"5\n");
        let line = reader().query(&mut transport, scpi::RANGE).await.unwrap();
        assert_eq!(line, "5");
    }

    #[tokio::test(start_paused = true)]
    async fn drops_bytes_after_newline() {
        let mut transport = MockTransport::new("mock").reply_raw(b"RES\r\ngarbage").reply("12345");
        let mut reader = reader();
        assert_eq!(reader.query(&mut transport, scpi::FUNCTION).await.unwrap(), "RES");
        // the rest of the first chunk must not leak into the next answer
        assert_eq!(reader.query(&mut transport, scpi::VALUE).await.unwrap(), "12345");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_drops_partial_line() {
        let mut transport = MockTransport::new("mock").reply_raw(b"VOL");
        let mut reader = reader();
        let start = Instant::now();
        let err = reader.query(&mut transport, scpi::FUNCTION).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= Timing::default().step_timeout);
        assert!(reader.buf.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_discards_pending() {
        let mut transport = MockTransport::new("mock").unsolicited(b"late answer\r\n");
        assert_eq!(reader().drain(&mut transport).await.unwrap(), 13);
        assert_eq!(reader().drain(&mut transport).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_on_endless_input() {
        let mut transport = MockTransport::new("mock").babbling(b"+1.0000E+00\r\n");
        let mut reader = reader();
        let start = Instant::now();
        let err = reader.drain(&mut transport).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::UnexpectedResponse(_))));
        let step_timeout = Timing::default().step_timeout;
        assert!(start.elapsed() >= step_timeout);
        assert!(start.elapsed() < step_timeout * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_propagate() {
        let mut transport = MockTransport::new("mock").unplugged();
        let err = reader().query(&mut transport, scpi::FUNCTION).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
