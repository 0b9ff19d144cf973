//! Timestamps at second and microsecond wire precision.
//!
//! Both types wrap an optional UTC instant; the zero value serializes as `null`
//! and is omitted from query parameters.
use std::fmt;

use chrono::{DateTime, DurationRound, SecondsFormat, TimeDelta, Utc};

use crate::{
    equality::Equalities,
    reflect::{Error, FromValue, Reflect, ToValue},
    value::Value,
};

macro_rules! timestamp {
    ($(#[$meta:meta])* $name:ident, $format:expr, $precision:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Option<DateTime<Utc>>);

        impl $name {
            /// The current instant
            pub fn now() -> Self {
                Self(Some(Utc::now()))
            }

            /// Whether this is the zero timestamp
            pub fn is_zero(&self) -> bool {
                self.0.is_none()
            }

            /// The wrapped instant, if any
            pub fn get(&self) -> Option<DateTime<Utc>> {
                self.0
            }

            /// The instant truncated to wire precision
            pub fn truncated(&self) -> Option<DateTime<Utc>> {
                self.0.map(|t| t.duration_trunc($precision).unwrap_or(t))
            }

            /// RFC 3339 text at wire precision, or `None` for the zero value
            pub fn to_rfc3339(&self) -> Option<String> {
                self.0.map(|t| t.to_rfc3339_opts($format, true))
            }

            /// Parse RFC 3339 text; the empty string and `null` are the zero value.
            pub fn parse(text: &str) -> Result<Self, chrono::ParseError> {
                if text.is_empty() || text == "null" {
                    return Ok(Self::default());
                }
                DateTime::parse_from_rfc3339(text).map(|t| Self(Some(t.with_timezone(&Utc))))
            }

            /// The query parameter form; zero values are omitted.
            pub fn to_query_parameter(&self) -> Option<String> {
                self.to_rfc3339()
            }
        }

        impl From<DateTime<Utc>> for $name {
            fn from(t: DateTime<Utc>) -> Self {
                Self(Some(t))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.to_rfc3339() {
                    Some(text) => write!(f, "{}({text})", stringify!($name)),
                    None => write!(f, "{}(zero)", stringify!($name)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.to_rfc3339().as_deref().unwrap_or("null"))
            }
        }

        impl Reflect for $name {
            fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
                Ok(self.to_rfc3339().map(Value::String).unwrap_or(Value::Null))
            }

            fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
                match value {
                    Value::Null => Ok(Self::default()),
                    Value::String(text) => Self::parse(text).map_err(|e| ctx.invalid(e)),
                    other => Err(ctx.mismatch("RFC 3339 timestamp", other)),
                }
            }

            // a zero timestamp is still written, as null
            fn is_zero(&self) -> bool {
                false
            }

            fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
                self == other
            }
        }
    };
}

timestamp!(
    /// A timestamp serialized with second precision, such as `2024-05-01T10:00:00Z`.
    Time,
    SecondsFormat::Secs,
    TimeDelta::seconds(1)
);

timestamp!(
    /// A timestamp serialized with microsecond precision, such as `2024-05-01T10:00:00.000001Z`.
    MicroTime,
    SecondsFormat::Micros,
    TimeDelta::microseconds(1)
);
