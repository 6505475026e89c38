//! Turns the raw responses of one measurement cycle into display text.
use serde::{Deserialize, Serialize};

use crate::mode::{Mode, NumberStyle, RangeLookup, RangeRule, OVERLOAD_THRESHOLD};

pub const DEFAULT_CONTINUITY_THRESHOLD: i64 = 20;

const OVERLOAD: &str = "OL";
const DIODE_OPEN: &str = "OL / OPEN";
const DIODE_OPEN_ABOVE: f64 = 9.999;
const CONTINUITY_DISPLAY_LIMIT: f64 = 1000.0;
const CONTINUITY_DISPLAY_CAP: f64 = 999.9;
const OHM: &str = "\u{03A9}";

/// Responses collected during one cycle, prior to decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    pub mode: Mode,
    pub raw_value: String,
    pub raw_range: String,
    pub raw_threshold: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMeasurement {
    pub mode: Mode,
    pub display_value: String,
    pub display_range_label: String,
    pub mode_label: String,
}

impl DecodedMeasurement {
    pub fn status_line(&self) -> String {
        format!("{}, {}", self.mode_label, self.display_range_label)
    }

    /// Line handed to the output file consumer: the value and a machine readable mode tag.
    pub fn publish_line(&self) -> String {
        format!("{}\t{}", self.display_value, self.mode.descriptor().log_tag)
    }
}

pub fn decode(reading: &RawReading) -> DecodedMeasurement {
    let mode = reading.mode;
    let value = parse_number(&reading.raw_value);
    let (display_value, display_range_label) = match mode {
        Mode::Continuity => {
            let threshold = reading
                .raw_threshold
                .as_deref()
                .and_then(parse_integer)
                .unwrap_or(DEFAULT_CONTINUITY_THRESHOLD);
            decode_continuity(value, threshold)
        }
        Mode::Diode => (decode_diode(value), "None".to_string()),
        _ => decode_ranged(mode, value, &reading.raw_range),
    };
    DecodedMeasurement {
        mode,
        display_value,
        display_range_label,
        mode_label: mode.label().to_string(),
    }
}

fn decode_ranged(mode: Mode, value: f64, raw_range: &str) -> (String, String) {
    let descriptor = mode.descriptor();
    let (text, label) = match mode.lookup_range(raw_range) {
        RangeLookup::Known(rule) => (format_with_rule(mode, rule, value), rule.label.to_string()),
        RangeLookup::Unknown => {
            log::debug!("unknown range code {:?} for mode {}", raw_range, mode);
            (format!("{:.6} {}", value, descriptor.unit), raw_range.to_string())
        }
        RangeLookup::NoTable => (format!("{:.6} {}", value, descriptor.unit), raw_range.to_string()),
    };
    if mode.has_overload_marker() && value >= OVERLOAD_THRESHOLD {
        return (OVERLOAD.to_string(), label);
    }
    (text, label)
}

fn format_with_rule(mode: Mode, rule: &RangeRule, value: f64) -> String {
    let number = format_number(value * rule.scale, rule.precision, mode.number_style());
    match mode.descriptor().coupling {
        Some(coupling) => format!("{} {} {}", number, rule.unit, coupling),
        None => format!("{} {}", number, rule.unit),
    }
}

fn decode_continuity(value: f64, threshold: i64) -> (String, String) {
    let style = NumberStyle {
        width: 5,
        sign_column: false,
    };
    let text = if value > threshold as f64 {
        let shown = if value > CONTINUITY_DISPLAY_LIMIT {
            CONTINUITY_DISPLAY_CAP
        } else {
            value
        };
        format!("OPEN [{}{}]", format_number(shown, 1, style), OHM)
    } else {
        format!("SHORT [{}{}]", format_number(value, 1, style), OHM)
    };
    (text, format!("Threshold: {}{}", threshold, OHM))
}

fn decode_diode(value: f64) -> String {
    if value > DIODE_OPEN_ABOVE {
        DIODE_OPEN.to_string()
    } else {
        let style = NumberStyle {
            width: 6,
            sign_column: false,
        };
        format!("{} V", format_number(value, 4, style))
    }
}

/// Zero padded fixed point, optionally with a space in place of a `+` sign.
pub fn format_number(value: f64, precision: usize, style: NumberStyle) -> String {
    if style.sign_column && !value.is_sign_negative() {
        format!(" {:0width$.prec$}", value, width = style.width.saturating_sub(1), prec = precision)
    } else {
        format!("{:0width$.prec$}", value, width = style.width, prec = precision)
    }
}

/// Parses the longest numeric prefix, `0.0` if there is none.
pub fn parse_number(text: &str) -> f64 {
    let text = text.trim_start();
    let end = numeric_prefix_len(text);
    text[..end].parse().unwrap_or(0.0)
}

/// Parses a leading integer, `None` if the text does not start with one.
pub fn parse_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end == digits_start {
        return None;
    }
    text[..end].parse().ok()
}

fn numeric_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let digits = |mut idx: usize| {
        while idx < bytes.len() && bytes[idx].is_ascii_digit() {
            idx += 1;
        }
        idx
    };

    let mut idx = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        idx += 1;
    }
    let int_end = digits(idx);
    let mut mantissa_digits = int_end - idx;
    idx = int_end;
    if idx < bytes.len() && bytes[idx] == b'.' {
        let frac_end = digits(idx + 1);
        mantissa_digits += frac_end - idx - 1;
        idx = frac_end;
    }
    if mantissa_digits == 0 {
        return 0;
    }
    if idx < bytes.len() && (bytes[idx] == b'e' || bytes[idx] == b'E') {
        let mut exp = idx + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        let exp_end = digits(exp);
        if exp_end > exp {
            idx = exp_end;
        }
    }
    idx
}
