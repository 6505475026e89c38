//! Static registry of the measurement functions of the GDM-8341 and the range codes the meter
//! reports for each of them.
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    VoltDc,
    VoltAc,
    VoltDcAc,
    CurrentDc,
    CurrentAc,
    CurrentDcAc,
    Resistance,
    Frequency,
    Period,
    Temperature,
    Diode,
    Continuity,
    Capacitance,
}

#[derive(Debug)]
pub struct ModeDescriptor {
    /// Token as returned by `SENS:FUNC1?`
    pub token: &'static str,
    pub label: &'static str,
    /// Query which switches the meter into this mode and triggers a measurement
    pub query: &'static str,
    /// Unit of an unscaled reading, including the coupling
    pub unit: &'static str,
    pub coupling: Option<&'static str>,
    pub log_tag: &'static str,
}

/// Describes how a reading taken in a given range is shown.
#[derive(Debug, PartialEq)]
pub struct RangeRule {
    pub code: &'static str,
    pub scale: f64,
    pub unit: &'static str,
    pub precision: usize,
    pub label: &'static str,
}

/// Width and sign handling of the numeric part of a reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberStyle {
    pub width: usize,
    /// Reserve a column for the sign, non-negative values get a leading space.
    pub sign_column: bool,
}

#[derive(Debug, PartialEq)]
pub enum RangeLookup {
    Known(&'static RangeRule),
    Unknown,
    NoTable,
}

pub const MODE_COUNT: usize = 13;

pub const ALL_MODES: [Mode; MODE_COUNT] = [
    Mode::VoltDc,
    Mode::VoltAc,
    Mode::VoltDcAc,
    Mode::CurrentDc,
    Mode::CurrentAc,
    Mode::CurrentDcAc,
    Mode::Resistance,
    Mode::Frequency,
    Mode::Period,
    Mode::Temperature,
    Mode::Diode,
    Mode::Continuity,
    Mode::Capacitance,
];

pub static MODES: [ModeDescriptor; MODE_COUNT] = [
    ModeDescriptor {
        token: "VOLT",
        label: "Volts DC",
        query: "MEAS:VOLT:DC?",
        unit: "V DC",
        coupling: Some("DC"),
        log_tag: "VOLTSDC",
    },
    ModeDescriptor {
        token: "VOLT:AC",
        label: "Volts AC",
        query: "MEAS:VOLT:AC?",
        unit: "V AC",
        coupling: Some("AC"),
        log_tag: "VOLTSAC",
    },
    ModeDescriptor {
        token: "VOLT:DCAC",
        label: "Volts DC/AC",
        query: "MEAS:VOLT:DCAC?",
        unit: "V DC/AC",
        coupling: Some("DC/AC"),
        log_tag: "VOLTSDC",
    },
    ModeDescriptor {
        token: "CURR",
        label: "Current DC",
        query: "MEAS:CURR:DC?",
        unit: "A DC",
        coupling: Some("DC"),
        log_tag: "AMPSDC",
    },
    ModeDescriptor {
        token: "CURR:AC",
        label: "Current AC",
        query: "MEAS:CURR:AC?",
        unit: "A AC",
        coupling: Some("AC"),
        log_tag: "AMPSAC",
    },
    ModeDescriptor {
        token: "CURR:DCAC",
        label: "Current DC/AC",
        query: "MEAS:CURR:DCAC?",
        unit: "A DC/AC",
        coupling: Some("DC/AC"),
        log_tag: "AMPSDC",
    },
    ModeDescriptor {
        token: "RES",
        label: "Resistance",
        query: "MEAS:RES?",
        unit: "\u{03A9}",
        coupling: None,
        log_tag: "OHMS",
    },
    ModeDescriptor {
        token: "FREQ",
        label: "Frequency",
        query: "MEAS:FREQ?",
        unit: "Hz",
        coupling: None,
        log_tag: "FREQ",
    },
    ModeDescriptor {
        token: "PER",
        label: "Period",
        query: "MEAS:PER?",
        unit: "s",
        coupling: None,
        log_tag: "PERIOD",
    },
    ModeDescriptor {
        token: "TEMP",
        label: "Temperature",
        query: "MEAS:TEMP:TCO?",
        unit: "\u{00B0}C",
        coupling: None,
        log_tag: "TEMP",
    },
    ModeDescriptor {
        token: "DIOD",
        label: "Diode",
        query: "MEAS:DIOD?",
        unit: "V",
        coupling: None,
        log_tag: "DIODE",
    },
    ModeDescriptor {
        token: "CONT",
        label: "Continuity",
        query: "MEAS:CONT?",
        unit: "\u{03A9}",
        coupling: None,
        log_tag: "OHMS",
    },
    ModeDescriptor {
        token: "CAP",
        label: "Capacitance",
        query: "MEAS:CAP?",
        unit: "F",
        coupling: None,
        log_tag: "CAP",
    },
];

macro_rules! rule {
    ($code:expr, $scale:expr, $unit:expr, $precision:expr, $label:expr) => {
        RangeRule {
            code: $code,
            scale: $scale,
            unit: $unit,
            precision: $precision,
            label: $label,
        }
    };
}

static VOLT_DC_RANGES: [RangeRule; 5] = [
    rule!("0.5", 1e3, "mV", 2, "500mV"),
    rule!("5", 1.0, "V", 4, "5V"),
    rule!("50", 1.0, "V", 3, "50V"),
    rule!("500", 1.0, "V", 2, "500V"),
    rule!("1000", 1.0, "V", 1, "1000V"),
];

static VOLT_AC_RANGES: [RangeRule; 5] = [
    rule!("0.5", 1e3, "mV", 2, "500mV"),
    rule!("5", 1.0, "V", 4, "5V"),
    rule!("50", 1.0, "V", 3, "50V"),
    rule!("500", 1.0, "V", 2, "500V"),
    rule!("750", 1.0, "V", 1, "750V"),
];

static CURRENT_RANGES: [RangeRule; 6] = [
    rule!("0.0005", 1e6, "\u{00B5}A", 2, "500\u{00B5}A"),
    rule!("0.005", 1e3, "mA", 4, "5mA"),
    rule!("0.05", 1e3, "mA", 3, "50mA"),
    rule!("0.5", 1e3, "mA", 2, "500mA"),
    rule!("5", 1.0, "A", 1, "5A"),
    rule!("10", 1.0, "A", 3, "10A"),
];

static RESISTANCE_RANGES: [RangeRule; 6] = [
    rule!("50E+1", 1.0, "\u{03A9}", 2, "500\u{03A9}"),
    rule!("50E+2", 1e-3, "k\u{03A9}", 4, "5K\u{03A9}"),
    rule!("50E+3", 1e-3, "k\u{03A9}", 3, "50K\u{03A9}"),
    rule!("50E+4", 1e-3, "k\u{03A9}", 2, "500K\u{03A9}"),
    rule!("50E+5", 1e-6, "M\u{03A9}", 4, "5M\u{03A9}"),
    rule!("50E+6", 1e-6, "M\u{03A9}", 3, "50M\u{03A9}"),
];

static CAPACITANCE_RANGES: [RangeRule; 5] = [
    rule!("5E-9", 1e9, "nF", 3, "5nF"),
    rule!("5E-8", 1e9, "nF", 2, "50nF"),
    rule!("5E-7", 1e9, "nF", 1, "500nF"),
    rule!("5E-6", 1e6, "\u{00B5}F", 3, "5\u{00B5}F"),
    rule!("5E-5", 1e6, "\u{00B5}F", 2, "50\u{00B5}F"),
];

lazy_static! {
    static ref BY_TOKEN: HashMap<&'static str, Mode> =
        ALL_MODES.iter().map(|mode| (mode.descriptor().token, *mode)).collect();
}

impl Mode {
    pub fn descriptor(&self) -> &'static ModeDescriptor {
        &MODES[*self as usize]
    }

    /// Exact match against the response of `SENS:FUNC1?`.
    pub fn from_token(token: &str) -> Option<Mode> {
        BY_TOKEN.get(token).copied()
    }

    pub fn label(&self) -> &'static str {
        self.descriptor().label
    }

    pub fn ranges(&self) -> &'static [RangeRule] {
        match self {
            Mode::VoltDc => &VOLT_DC_RANGES,
            Mode::VoltAc | Mode::VoltDcAc => &VOLT_AC_RANGES,
            Mode::CurrentDc | Mode::CurrentAc | Mode::CurrentDcAc => &CURRENT_RANGES,
            Mode::Resistance => &RESISTANCE_RANGES,
            Mode::Capacitance => &CAPACITANCE_RANGES,
            Mode::Frequency | Mode::Period | Mode::Temperature | Mode::Diode | Mode::Continuity => &[],
        }
    }

    pub fn lookup_range(&self, code: &str) -> RangeLookup {
        let ranges = self.ranges();
        if ranges.is_empty() {
            return RangeLookup::NoTable;
        }
        match ranges.iter().find(|rule| rule.code == code) {
            Some(rule) => RangeLookup::Known(rule),
            None => RangeLookup::Unknown,
        }
    }

    pub fn number_style(&self) -> NumberStyle {
        match self {
            Mode::VoltDc | Mode::VoltAc | Mode::VoltDcAc => NumberStyle {
                width: 7,
                sign_column: true,
            },
            Mode::Capacitance => NumberStyle {
                width: 6,
                sign_column: true,
            },
            _ => NumberStyle {
                width: 6,
                sign_column: false,
            },
        }
    }

    /// Modes whose reading is replaced by the overload marker above [`OVERLOAD_THRESHOLD`].
    pub fn has_overload_marker(&self) -> bool {
        matches!(self, Mode::Resistance | Mode::Capacitance)
    }

    pub fn needs_threshold(&self) -> bool {
        *self == Mode::Continuity
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().token)
    }
}

/// The meter reports this value (and above) when a resistance or capacitance is out of range.
pub const OVERLOAD_THRESHOLD: f64 = 51_000_000_000_000.0;
