//! The meter's line oriented query/response protocol.
pub mod line;
pub mod scpi;

pub use line::LineReader;
