//! Human-readable durations for the `server_process_time` field.
//!
//! Output follows the compact `72h3m0.5s` / `1.234ms` / `850ns` convention:
//! sub-second values use the largest unit that keeps the integer part
//! non-zero, longer values are split into hours, minutes and fractional
//! seconds. Trailing fractional zeros are dropped and zero prints as `0s`.

use std::fmt::Write as _;
use std::time::Duration;

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Longest fractional part the parser keeps; extra digits are below 1ns.
const MAX_FRACTION_DIGITS: usize = 18;

/// Errors from [`parse_duration`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration: {0:?}")]
    Invalid(String),
    #[error("missing unit in duration: {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

/// Formats a duration, e.g. `1.5s`, `250ms`, `3.2µs`, `1m30s`, `0s`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{nanos}ns");
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}µs", decimal(nanos / NANOS_PER_MICRO, nanos % NANOS_PER_MICRO, 3));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", decimal(nanos / NANOS_PER_MILLI, nanos % NANOS_PER_MILLI, 6));
    }

    let hours = nanos / NANOS_PER_HOUR;
    let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MIN;
    let seconds = (nanos % NANOS_PER_MIN) / NANOS_PER_SEC;
    let fraction = nanos % NANOS_PER_SEC;

    let mut out = String::new();
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    let _ = write!(out, "{}s", decimal(seconds, fraction, 9));
    out
}

/// Renders `whole.fraction` with `width` fractional digits, trailing zeros trimmed.
fn decimal(whole: u128, fraction: u128, width: usize) -> String {
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{fraction:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Parses a duration in the format produced by [`format_duration`].
///
/// Accepts a sequence of `<number>[.<fraction>]<unit>` components with units
/// `h`, `m`, `s`, `ms`, `us`/`µs`, `ns`, plus the bare string `0`. Signs are
/// rejected, so every successfully parsed value is non-negative.
///
/// # Errors
///
/// Returns a [`DurationParseError`] describing the first malformed component.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let overflow = || DurationParseError::Overflow(input.to_string());
    let mut rest = input;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let (whole_digits, after_whole) = split_digits(rest);
        let (fraction_digits, after_number) = match after_whole.strip_prefix('.') {
            Some(after_dot) => split_digits(after_dot),
            None => ("", after_whole),
        };
        if whole_digits.is_empty() && fraction_digits.is_empty() {
            return Err(DurationParseError::Invalid(input.to_string()));
        }

        let unit_end = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, remainder) = after_number.split_at(unit_end);
        if unit.is_empty() {
            return Err(DurationParseError::MissingUnit(input.to_string()));
        }
        let unit_nanos = unit_nanos(unit).ok_or_else(|| DurationParseError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let whole: u128 = if whole_digits.is_empty() {
            0
        } else {
            whole_digits.parse().map_err(|_| overflow())?
        };
        let mut component = whole.checked_mul(unit_nanos).ok_or_else(overflow)?;

        if !fraction_digits.is_empty() {
            let kept = &fraction_digits[..fraction_digits.len().min(MAX_FRACTION_DIGITS)];
            let fraction: u128 = kept.parse().map_err(|_| overflow())?;
            let scale = kept.bytes().fold(1u128, |acc, _| acc * 10);
            component += fraction * unit_nanos / scale;
        }

        total = total.checked_add(component).ok_or_else(overflow)?;
        rest = remainder;
    }

    let nanos = u64::try_from(total).map_err(|_| overflow())?;
    Ok(Duration::from_nanos(nanos))
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(NANOS_PER_MIN),
        "h" => Some(NANOS_PER_HOUR),
        _ => None,
    }
}
