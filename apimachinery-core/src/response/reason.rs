//! StatusReason is an enumeration of possible failure causes.  Each StatusReason
//! must map to a single HTTP status code, but multiple reasons may map
//! to the same HTTP status code.
use std::{fmt, str::FromStr};

use crate::{
    equality::Equalities,
    reflect::{Error, FromValue, Reflect, ToValue},
    value::Value,
};

macro_rules! reasons {
    ($($(#[$meta:meta])* $variant:ident => $code:literal,)*) => {
        /// A machine-readable description of why an operation failed.
        ///
        /// Unrecognized reasons are preserved verbatim in [`StatusReason::Unknown`];
        /// the empty reason means the server declined to give one.
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub enum StatusReason {
            $($(#[$meta])* $variant,)*
            /// Any other reason, including the empty one
            Unknown(String),
        }

        impl StatusReason {
            /// The wire text of this reason
            pub fn as_str(&self) -> &str {
                match self {
                    $(StatusReason::$variant => stringify!($variant),)*
                    StatusReason::Unknown(text) => text,
                }
            }

            /// The HTTP code this reason maps to
            pub fn http_code(&self) -> u16 {
                match self {
                    $(StatusReason::$variant => $code,)*
                    StatusReason::Unknown(_) => 500,
                }
            }
        }

        impl FromStr for StatusReason {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $(stringify!($variant) => StatusReason::$variant,)*
                    other => StatusReason::Unknown(other.to_string()),
                })
            }
        }
    };
}

reasons! {
    /// The caller must present credentials, or the ones given are insufficient
    Unauthorized => 401,
    /// The server refuses to act on the requested resource
    Forbidden => 403,
    /// A resource required by the operation could not be found
    NotFound => 404,
    /// The resource being created already exists
    AlreadyExists => 409,
    /// The operation conflicts with the current state of the resource
    Conflict => 409,
    /// The item is no longer available and no forwarding address is known
    Gone => 410,
    /// The submitted data failed validation
    Invalid => 422,
    /// The server could not complete the action in time; retry
    ServerTimeout => 500,
    /// Stored data could not be read back
    StorageReadError => 500,
    /// The request could not be completed in the given time
    Timeout => 504,
    /// The client is being rate limited
    TooManyRequests => 429,
    /// The request itself is malformed
    BadRequest => 400,
    /// The action is not supported on the resource
    MethodNotAllowed => 405,
    /// None of the accepted content types can be produced
    NotAcceptable => 406,
    /// The request body is too large
    RequestEntityTooLarge => 413,
    /// The request content type is not understood
    UnsupportedMediaType => 415,
    /// An unexpected internal failure
    InternalError => 500,
    /// The content has expired and is no longer available
    Expired => 410,
    /// The server is temporarily unable to handle the request
    ServiceUnavailable => 503,
}

impl Default for StatusReason {
    fn default() -> Self {
        StatusReason::Unknown(String::new())
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for StatusReason {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(reason) => reason,
            Err(never) => match never {},
        }
    }
}

impl Reflect for StatusReason {
    fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
        Ok(Value::from(self.as_str()))
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::String(text) => Ok(Self::from(text.as_str())),
            other => Err(ctx.mismatch("string", other)),
        }
    }

    fn is_zero(&self) -> bool {
        self.as_str().is_empty()
    }

    fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
        self == other
    }
}
