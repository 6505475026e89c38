//! Commands understood by the GDM-8341.

pub const FUNCTION: &str = "SENS:FUNC1?";
pub const VALUE: &str = "VAL1?";
pub const RANGE: &str = "CONF:RANG?";
pub const CONTINUITY_THRESHOLD: &str = "SENS:CONT:THR?";
/// Return the front panel to the operator
pub const LOCAL: &str = "SYST:LOC";
pub const IDENTIFY: &str = "*IDN?";

pub const TERMINATION: &str = "\r\n";

/// Substring of the `*IDN?` reply identifying our meter.
pub const MODEL: &str = "GDM8341";

pub fn frame(command: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(command.len() + TERMINATION.len());
    data.extend_from_slice(command.as_bytes());
    data.extend_from_slice(TERMINATION.as_bytes());
    data
}
