//! Locating the meter among the serial ports of the system.
use async_trait::async_trait;
use gdmlink_protocol::{ProtocolError, TransportError};

use crate::protocol::{scpi, LineReader};
use crate::transport::{self, SerialParams, Transport};
use crate::{Error, Timing};

const CANDIDATE_COUNT: usize = 10;

pub fn default_candidates() -> Vec<String> {
    (0..CANDIDATE_COUNT).map(|x| format!("/dev/ttyUSB{}", x)).collect()
}

#[async_trait]
pub trait Discover: Send {
    /// Returns an open transport connected to the meter.
    async fn discover(&mut self) -> crate::Result<Box<dyn Transport>>;
}

pub struct DeviceFinder {
    device: Option<String>,
    candidates: Vec<String>,
    params: SerialParams,
    timing: Timing,
}

impl DeviceFinder {
    /// With `device` given, that path is opened without probing.
    pub fn new(device: Option<String>, params: SerialParams, timing: Timing) -> Self {
        DeviceFinder {
            device,
            candidates: default_candidates(),
            params,
            timing,
        }
    }

    async fn probe(&self, path: &str) -> crate::Result<Box<dyn Transport>> {
        let mut transport = transport::open(path, &self.params, self.timing.write_timeout).await?;
        match identify(transport.as_mut(), &self.timing).await {
            Ok(idn) => {
                log::debug!("{} identifies as {}", path, idn);
                Ok(transport)
            }
            Err(err) => {
                transport.close();
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Discover for DeviceFinder {
    async fn discover(&mut self) -> crate::Result<Box<dyn Transport>> {
        if let Some(device) = &self.device {
            let transport = transport::open(device, &self.params, self.timing.write_timeout).await?;
            log::info!("Using {}", device);
            return Ok(transport);
        }
        for path in &self.candidates {
            match self.probe(path).await {
                Ok(transport) => {
                    log::info!("Found meter on {}", path);
                    return Ok(transport);
                }
                Err(Error::Transport(TransportError::NotFound(_))) => {}
                Err(Error::Transport(TransportError::Busy(_))) => {
                    log::info!("{} is in use by another process", path)
                }
                Err(err) => log::debug!("Skipping {}: {}", path, err),
            }
        }
        Err(Error::transport(TransportError::NotFound(format!(
            "no meter on {}..{}",
            self.candidates.first().map(String::as_str).unwrap_or(""),
            self.candidates.last().map(String::as_str).unwrap_or("")
        ))))
    }
}

/// Check that `transport` is connected to a GDM-8341. Devices which talk without being asked
/// are something else and get rejected before anything is sent to them.
pub async fn identify(transport: &mut dyn Transport, timing: &Timing) -> crate::Result<String> {
    match transport.read(timing.quiet_window).await {
        Ok(data) => {
            return Err(Error::protocol(ProtocolError::UnexpectedResponse(format!(
                "unsolicited data: {:?}",
                String::from_utf8_lossy(&data)
            ))))
        }
        Err(err) if err.is_timeout() => {}
        Err(err) => return Err(err),
    }
    let mut reader = LineReader::new(timing);
    let idn = reader.query(transport, scpi::IDENTIFY).await?;
    if idn.contains(scpi::MODEL) {
        Ok(idn)
    } else {
        Err(Error::protocol(ProtocolError::UnexpectedResponse(idn)))
    }
}
