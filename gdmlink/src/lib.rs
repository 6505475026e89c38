//! Driver for the GwInstek GDM-8341 multimeter: polls the meter over a serial line or a
//! USB-TMC device and produces decoded measurements.
use std::time::Duration;

pub mod app;
pub mod discovery;
pub mod protocol;
pub mod publish;
pub mod recovery;
pub mod session;
pub mod transport;

pub use gdmlink_protocol::{
    decode, DecodedMeasurement, Error, Mode, ProtocolError, RawReading, TransportError,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Time budgets of the individual protocol steps.
#[derive(Debug, Clone)]
pub struct Timing {
    /// Upper bound for receiving one response line
    pub step_timeout: Duration,
    /// Readiness wait of a single read attempt
    pub poll_slice: Duration,
    pub write_timeout: Duration,
    /// A meter must stay silent for this long after opening to be considered during discovery
    pub quiet_window: Duration,
    /// Pause after a failed discovery
    pub backoff: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            step_timeout: Duration::from_millis(500),
            poll_slice: Duration::from_millis(100),
            write_timeout: Duration::from_millis(500),
            quiet_window: Duration::from_millis(300),
            backoff: Duration::from_secs(2),
        }
    }
}
