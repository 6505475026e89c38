//! One measurement cycle: ask for the active function, then its value and range and, in
//! continuity mode, the beeper threshold. Every call to [`Session::step`] performs exactly one
//! transition so the caller can interleave operator commands between steps.
use std::fmt::{self, Display, Formatter};

use gdmlink_protocol::ProtocolError;

use crate::protocol::{scpi, LineReader};
use crate::transport::Transport;
use crate::{decode, DecodedMeasurement, Error, Mode, RawReading, Timing};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    AwaitingMode,
    AwaitingValue {
        mode: Mode,
    },
    AwaitingRange {
        mode: Mode,
        raw_value: String,
    },
    AwaitingThreshold {
        mode: Mode,
        raw_value: String,
        raw_range: String,
    },
    Complete(RawReading),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::AwaitingMode => "AwaitingMode",
            SessionState::AwaitingValue { .. } => "AwaitingValue",
            SessionState::AwaitingRange { .. } => "AwaitingRange",
            SessionState::AwaitingThreshold { .. } => "AwaitingThreshold",
            SessionState::Complete(_) => "Complete",
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub struct Session {
    reader: LineReader,
    state: SessionState,
    resync: bool,
    threshold_override: Option<i64>,
}

impl Session {
    pub fn new(timing: &Timing) -> Self {
        Session {
            reader: LineReader::new(timing),
            state: SessionState::Idle,
            resync: false,
            threshold_override: None,
        }
    }

    /// Report `ohms` as continuity threshold instead of what the meter answers.
    pub fn with_threshold(mut self, ohms: Option<i64>) -> Self {
        self.threshold_override = ohms;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Forget the current cycle, e.g. after the transport was replaced.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.resync = true;
    }

    /// Advance by one transition. Returns the measurement once a cycle completes.
    ///
    /// On error the session is back in `Idle` and the next cycle starts by draining whatever
    /// the meter still sends for the aborted one.
    pub async fn step(&mut self, transport: &mut dyn Transport) -> crate::Result<Option<DecodedMeasurement>> {
        let state = std::mem::replace(&mut self.state, SessionState::Idle);
        log::trace!("step from {}", state);
        match self.transition(transport, state).await {
            Ok(SessionState::Complete(reading)) => {
                self.state = SessionState::Idle;
                let measurement = decode(&reading);
                log::debug!("{}: {}", measurement.status_line(), measurement.display_value);
                Ok(Some(measurement))
            }
            Ok(next) => {
                self.state = next;
                Ok(None)
            }
            Err(err) => {
                if !matches!(err, Error::Protocol(ProtocolError::UnknownMode(_))) {
                    self.resync = true;
                }
                Err(err)
            }
        }
    }

    async fn transition(
        &mut self,
        transport: &mut dyn Transport,
        state: SessionState,
    ) -> crate::Result<SessionState> {
        let next = match state {
            SessionState::Idle => {
                if self.resync {
                    self.reader.drain(transport).await?;
                    self.resync = false;
                }
                self.reader.send(transport, scpi::FUNCTION).await?;
                SessionState::AwaitingMode
            }
            SessionState::AwaitingMode => {
                let token = self.reader.read_line(transport).await?;
                let mode = Mode::from_token(&token)
                    .ok_or_else(|| Error::protocol(ProtocolError::UnknownMode(token)))?;
                self.reader.send(transport, scpi::VALUE).await?;
                SessionState::AwaitingValue { mode }
            }
            SessionState::AwaitingValue { mode } => {
                let raw_value = self.reader.read_line(transport).await?;
                self.reader.send(transport, scpi::RANGE).await?;
                SessionState::AwaitingRange { mode, raw_value }
            }
            SessionState::AwaitingRange { mode, raw_value } => {
                let raw_range = self.reader.read_line(transport).await?;
                if mode.needs_threshold() {
                    self.reader.send(transport, scpi::CONTINUITY_THRESHOLD).await?;
                    SessionState::AwaitingThreshold {
                        mode,
                        raw_value,
                        raw_range,
                    }
                } else {
                    SessionState::Complete(RawReading {
                        mode,
                        raw_value,
                        raw_range,
                        raw_threshold: None,
                    })
                }
            }
            SessionState::AwaitingThreshold {
                mode,
                raw_value,
                raw_range,
            } => {
                let reported = self.reader.read_line(transport).await?;
                let raw_threshold = match self.threshold_override {
                    Some(ohms) => ohms.to_string(),
                    None => reported,
                };
                SessionState::Complete(RawReading {
                    mode,
                    raw_value,
                    raw_range,
                    raw_threshold: Some(raw_threshold),
                })
            }
            complete @ SessionState::Complete(_) => complete,
        };
        Ok(next)
    }

    /// Step until a cycle completes or fails.
    pub async fn run_cycle(&mut self, transport: &mut dyn Transport) -> crate::Result<DecodedMeasurement> {
        loop {
            if let Some(measurement) = self.step(transport).await? {
                return Ok(measurement);
            }
        }
    }

    /// Switch the meter to `mode`. The reading returned by the `MEAS` query is discarded, the
    /// next regular cycle picks up the new function.
    pub async fn inject(&mut self, transport: &mut dyn Transport, mode: Mode) -> crate::Result<()> {
        log::info!("switching to {}", mode.label());
        self.state = SessionState::Idle;
        let ret = self.reader.query(transport, mode.descriptor().query).await;
        if ret.is_err() {
            self.resync = true;
        }
        ret.map(|_| ())
    }

    /// Hand the front panel back to the operator.
    pub async fn release(&mut self, transport: &mut dyn Transport) -> crate::Result<()> {
        self.state = SessionState::Idle;
        self.resync = true;
        self.reader.send(transport, scpi::LOCAL).await
    }
}
