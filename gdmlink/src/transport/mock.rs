//! Scripted stand-in for the meter. Each written command pops the next scripted reply, which
//! then becomes readable. Without a reply, reads wait out their timeout.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gdmlink_protocol::TransportError;
use tokio::time;

use super::Transport;
use crate::Error;

#[derive(Default)]
struct Shared {
    written: Vec<String>,
    closed: bool,
}

#[derive(Clone)]
pub struct MockLog(Arc<Mutex<Shared>>);

impl MockLog {
    /// Commands received so far, without line termination.
    pub fn written(&self) -> Vec<String> {
        self.0.lock().unwrap().written.clone()
    }

    pub fn closed(&self) -> bool {
        self.0.lock().unwrap().closed
    }
}

pub struct MockTransport {
    path: String,
    replies: VecDeque<Option<Vec<u8>>>,
    pending: VecDeque<u8>,
    chunk: usize,
    fail_reads: bool,
    babble: Option<Vec<u8>>,
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    pub fn new(path: &str) -> Self {
        MockTransport {
            path: path.to_string(),
            replies: VecDeque::new(),
            pending: VecDeque::new(),
            chunk: usize::MAX,
            fail_reads: false,
            babble: None,
            shared: Default::default(),
        }
    }

    /// Answer the next command with `line`, terminated with CR LF.
    pub fn reply(mut self, line: &str) -> Self {
        let mut data = line.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.replies.push_back(Some(data));
        self
    }

    pub fn reply_raw(mut self, data: &[u8]) -> Self {
        self.replies.push_back(Some(data.to_vec()));
        self
    }

    /// Leave the next command unanswered.
    pub fn silent(mut self) -> Self {
        self.replies.push_back(None);
        self
    }

    /// Bytes which are readable before anything was sent.
    pub fn unsolicited(mut self, data: &[u8]) -> Self {
        self.pending.extend(data.iter().copied());
        self
    }

    /// Hand out at most `chunk` bytes per read.
    pub fn chunked(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }

    /// Every read fails as if the device was unplugged.
    pub fn unplugged(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Whenever nothing else is pending, a read yields `data` after a millisecond. The input
    /// never settles.
    pub fn babbling(mut self, data: &[u8]) -> Self {
        self.babble = Some(data.to_vec());
        self
    }

    pub fn log(&self) -> MockLog {
        MockLog(self.shared.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        !self.shared.lock().unwrap().closed
    }

    async fn read(&mut self, timeout: Duration) -> crate::Result<Vec<u8>> {
        if !self.is_open() {
            return Err(Error::transport(TransportError::Closed));
        }
        if self.fail_reads {
            return Err(Error::transport(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "unplugged",
            )));
        }
        if self.pending.is_empty() {
            if let Some(babble) = &self.babble {
                time::sleep(Duration::from_millis(1).min(timeout)).await;
                return Ok(babble.clone());
            }
            time::sleep(timeout).await;
            return Err(Error::protocol_timeout());
        }
        let count = self.chunk.min(self.pending.len());
        Ok(self.pending.drain(..count).collect())
    }

    async fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        if !self.is_open() {
            return Err(Error::transport(TransportError::Closed));
        }
        let command = String::from_utf8_lossy(data).trim_end_matches("\r\n").to_string();
        self.shared.lock().unwrap().written.push(command);
        if let Some(Some(reply)) = self.replies.pop_front() {
            self.pending.extend(reply);
        }
        Ok(data.len())
    }

    fn close(&mut self) {
        self.shared.lock().unwrap().closed = true;
    }
}
