//! Data model shared between the GDM-8341 driver and its consumers: the mode registry, the
//! decoder turning raw responses into display text and the error types.
#[macro_use]
extern crate lazy_static;

pub mod decode;
pub mod error;
pub mod mode;

pub use crate::decode::{decode, DecodedMeasurement, RawReading, DEFAULT_CONTINUITY_THRESHOLD};
pub use crate::error::{Error, ProtocolError, TransportError};
pub use crate::mode::{Mode, ModeDescriptor, RangeLookup, RangeRule, ALL_MODES, MODES};

pub type Result<T> = std::result::Result<T, Error>;
