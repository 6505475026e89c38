use core::fmt;
use std::{
    convert::TryFrom,
    fmt::{Display, Formatter},
    str::FromStr,
};

use anyhow::anyhow;
use gdmlink_protocol::TransportError;

/// Baud rates the GDM-8341 can be configured to.
#[derive(Debug, PartialEq, Clone, Copy, Hash)]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

pub const SUPPORTED_BAUD_RATES: [BaudRate; 5] = [
    BaudRate::B9600,
    BaudRate::B19200,
    BaudRate::B38400,
    BaudRate::B57600,
    BaudRate::B115200,
];

impl BaudRate {
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = crate::Error;

    fn try_from(baud: u32) -> Result<Self, Self::Error> {
        SUPPORTED_BAUD_RATES
            .iter()
            .copied()
            .find(|x| x.as_u32() == baud)
            .ok_or_else(|| crate::Error::transport(TransportError::config(anyhow!("Unsupported baud rate {}", baud))))
    }
}

impl FromStr for BaudRate {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let baud: u32 = s
            .trim()
            .parse()
            .map_err(|_| crate::Error::transport(TransportError::config(anyhow!("Invalid baud rate `{}`", s))))?;
        BaudRate::try_from(baud)
    }
}

impl Display for BaudRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        BaudRate::B115200
    }
}

/// Line settings of the meter. Framing is fixed at 8N1 without flow control, only the baud
/// rate can be chosen.
#[derive(Debug, PartialEq, Clone, Default, Hash)]
pub struct SerialParams {
    pub baud: BaudRate,
}

impl SerialParams {
    pub fn new(baud: BaudRate) -> Self {
        SerialParams { baud }
    }

    pub fn from_baud(baud: u32) -> crate::Result<Self> {
        Ok(SerialParams::new(BaudRate::try_from(baud)?))
    }

    pub fn builder(&self, path: &str) -> tokio_serial::SerialPortBuilder {
        tokio_serial::new(path, self.baud.as_u32())
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
    }
}

impl Display for SerialParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::8N1", self.baud)
    }
}
