//! Signed durations in Go `time.Duration` text form.
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{cmp::Ordering, fmt, str::FromStr, time};

use crate::{
    equality::Equalities,
    reflect::{Error, FromValue, Reflect, ToValue},
    value::Value,
};

/// A duration serialized as compound text such as `1h30m0s` or `250ms`.
///
/// Go durations are signed while [`std::time::Duration`] is not, so the sign is
/// kept alongside the magnitude. A negative [`Duration`] always compares less
/// than any [`std::time::Duration`] and never equals one.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Duration {
    duration: time::Duration,
    is_negative: bool,
}

/// Why a duration string was rejected
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// A number was not followed by one of `ns`, `us`, `ms`, `s`, `m` or `h`
    #[error("unknown unit {0:?} in duration")]
    InvalidUnit(String),

    /// A number was the last thing in the string
    #[error("missing unit in duration")]
    NoUnit,

    /// A unit was not preceded by a number
    #[error("invalid number {0:?} in duration")]
    NotANumber(String),
}

fn unit_nanos(unit: &str) -> Option<f64> {
    Some(match unit {
        "ns" => 1.0,
        // micro sign and Greek mu are both accepted
        "us" | "\u{00b5}s" | "\u{03bc}s" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60e9,
        "h" => 3600e9,
        _ => return None,
    })
}

impl From<time::Duration> for Duration {
    fn from(duration: time::Duration) -> Self {
        Self {
            duration,
            is_negative: false,
        }
    }
}

impl From<Duration> for time::Duration {
    fn from(Duration { duration, .. }: Duration) -> Self {
        duration
    }
}

impl Duration {
    /// Returns `true` if this `Duration` is negative.
    #[inline]
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.is_negative
    }

    /// Returns `true` for a zero length, whatever its sign.
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.duration.is_zero()
    }

    /// A negative duration of the given magnitude
    pub fn negative(duration: time::Duration) -> Self {
        Self {
            duration,
            is_negative: true,
        }
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// `value / scale` with the remainder as trimmed decimal digits.
fn write_fraction(f: &mut fmt::Formatter<'_>, value: u128, scale: u128, digits: usize) -> fmt::Result {
    let (whole, rest) = (value / scale, value % scale);
    if rest == 0 {
        return write!(f, "{whole}");
    }
    let fraction = format!("{rest:0digits$}");
    write!(f, "{whole}.{}", fraction.trim_end_matches('0'))
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.duration.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }
        if self.is_negative {
            f.write_str("-")?;
        }
        if nanos < 1_000_000_000 {
            let (scale, digits, unit) = match nanos {
                0..=999 => (1, 0, "ns"),
                1_000..=999_999 => (1_000, 3, "\u{00b5}s"),
                _ => (1_000_000, 6, "ms"),
            };
            write_fraction(f, nanos, scale, digits)?;
            return f.write_str(unit);
        }
        let secs = self.duration.as_secs();
        let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if hours > 0 || minutes > 0 {
            write!(f, "{minutes}m")?;
        }
        let sub = u128::from(seconds) * 1_000_000_000 + u128::from(self.duration.subsec_nanos());
        write_fraction(f, sub, 1_000_000_000, 9)?;
        f.write_str("s")
    }
}

impl FromStr for Duration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (is_negative, mut rest) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        if rest == "0" {
            rest = "";
        }

        let mut nanos = 0f64;
        while !rest.is_empty() {
            let number_end = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).ok_or(ParseError::NoUnit)?;
            let (number, tail) = rest.split_at(number_end);
            let unit_end = tail.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_end);

            let value = number
                .parse::<f64>()
                .map_err(|_| ParseError::NotANumber(number.to_string()))?;
            let scale = unit_nanos(unit).ok_or_else(|| ParseError::InvalidUnit(unit.to_string()))?;
            nanos += value * scale;
            rest = tail;
        }

        Ok(Duration {
            duration: time::Duration::from_nanos(nanos.round() as u64),
            is_negative,
        })
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

impl Reflect for Duration {
    fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
        Ok(Value::String(self.to_string()))
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::String(text) => text.parse().map_err(|e| ctx.invalid(e)),
            other => Err(ctx.mismatch("duration string", other)),
        }
    }

    fn is_zero(&self) -> bool {
        Duration::is_zero(self)
    }

    fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
        self == other
    }
}

impl PartialEq<time::Duration> for Duration {
    fn eq(&self, other: &time::Duration) -> bool {
        !self.is_negative && self.duration == *other
    }
}

impl PartialEq<Duration> for time::Duration {
    fn eq(&self, other: &Duration) -> bool {
        other == self
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_negative, other.is_negative) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            // the larger magnitude is the smaller negative value
            (true, true) => self.duration.cmp(&other.duration).reverse(),
            (false, false) => self.duration.cmp(&other.duration),
        }
    }
}

impl PartialOrd<time::Duration> for Duration {
    fn partial_cmp(&self, other: &time::Duration) -> Option<Ordering> {
        if self.is_negative {
            return Some(Ordering::Less);
        }
        self.duration.partial_cmp(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: time::Duration = time::Duration::from_secs(60);
    const HOUR: time::Duration = time::Duration::from_secs(60 * 60);

    #[test]
    fn parses_go_durations() {
        let cases: &[(&str, Duration)] = &[
            ("0", time::Duration::ZERO.into()),
            ("5s", time::Duration::from_secs(5).into()),
            ("-5s", Duration::negative(time::Duration::from_secs(5))),
            ("+5s", time::Duration::from_secs(5).into()),
            ("5.6s", time::Duration::from_millis(5600).into()),
            (".5s", time::Duration::from_millis(500).into()),
            ("12µs", time::Duration::from_micros(12).into()),
            ("12μs", time::Duration::from_micros(12).into()),
            ("3h30m", (3 * HOUR + 30 * MINUTE).into()),
            ("10.5s4m", (4 * MINUTE + time::Duration::from_millis(10_500)).into()),
            ("-2m3.4s", Duration::negative(2 * MINUTE + time::Duration::from_millis(3400))),
            ("52763797000ns", time::Duration::from_nanos(52_763_797_000).into()),
        ];
        for (input, expected) in cases {
            assert_eq!(&input.parse::<Duration>().unwrap(), expected, "parsing {input}");
        }
        assert_eq!("5".parse::<Duration>(), Err(ParseError::NoUnit));
        assert_eq!("5d".parse::<Duration>(), Err(ParseError::InvalidUnit("d".into())));
        assert_eq!("s".parse::<Duration>(), Err(ParseError::NotANumber(String::new())));
        assert_eq!("1.2.3s".parse::<Duration>(), Err(ParseError::NotANumber("1.2.3".into())));
    }

    #[test]
    fn formats_like_go() {
        let cases: &[(Duration, &str)] = &[
            (time::Duration::ZERO.into(), "0s"),
            (time::Duration::from_nanos(1).into(), "1ns"),
            (time::Duration::from_nanos(1_100).into(), "1.1\u{00b5}s"),
            (time::Duration::from_micros(2_200).into(), "2.2ms"),
            (time::Duration::from_millis(1_500).into(), "1.5s"),
            ((HOUR + 30 * MINUTE).into(), "1h30m0s"),
            ((4 * MINUTE + time::Duration::from_millis(10_500)).into(), "4m10.5s"),
            (Duration::negative(time::Duration::from_secs(61)), "-1m1s"),
        ];
        for (duration, text) in cases {
            assert_eq!(duration.to_string(), *text);
        }
        for text in ["0s", "1ns", "1h30m0s", "-1m1s"] {
            assert_eq!(text.parse::<Duration>().unwrap().to_string(), text);
        }
    }

    #[test]
    fn ordering_respects_sign() {
        let neg = Duration::negative(time::Duration::from_secs(1));
        assert!(neg < Duration::from(time::Duration::ZERO));
        assert!(Duration::negative(time::Duration::from_secs(2)) < neg);
        assert!(neg != time::Duration::from_secs(1));
        assert!(neg < time::Duration::ZERO);
    }

    #[test]
    fn zero_is_omitted() {
        assert!(Reflect::is_zero(&Duration::default()));
        assert_eq!(
            crate::reflect::to_value(&Duration::from(90 * MINUTE)).unwrap(),
            Value::from("1h30m0s")
        );
    }
}
