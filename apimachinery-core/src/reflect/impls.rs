//! [`Reflect`] for scalars and containers.
use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;

use super::{Error, FromValue, Matched, Reflect, ToValue};
use crate::{
    equality::Equalities,
    value::{Map, Value},
};

macro_rules! reflect_int {
    ($($t:ty),*) => {
        $(
            impl Reflect for $t {
                fn to_value(&self, ctx: &mut ToValue) -> Result<Value, Error> {
                    i64::try_from(*self)
                        .map(Value::Int)
                        .map_err(|_| ctx.overflow(self, "int64"))
                }

                fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
                    match value {
                        Value::Null => Ok(0),
                        Value::Int(i) => <$t>::try_from(*i).map_err(|_| ctx.overflow(i, stringify!($t))),
                        // floats narrow only when the value is integral
                        Value::Float(f) if f.fract() == 0.0 => {
                            if *f >= <$t>::MIN as f64 && *f <= <$t>::MAX as f64 {
                                Ok(*f as $t)
                            } else {
                                Err(ctx.overflow(f, stringify!($t)))
                            }
                        }
                        other => Err(ctx.mismatch(stringify!($t), other)),
                    }
                }

                fn is_zero(&self) -> bool {
                    *self == 0
                }

                fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
                    self == other
                }
            }
        )*
    };
}

reflect_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

macro_rules! reflect_float {
    ($($t:ty),*) => {
        $(
            impl Reflect for $t {
                fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
                    Ok(Value::Float(f64::from(*self)))
                }

                fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
                    match value {
                        Value::Null => Ok(0.0),
                        Value::Int(i) => Ok(*i as $t),
                        Value::Float(f) => Ok(*f as $t),
                        other => Err(ctx.mismatch(stringify!($t), other)),
                    }
                }

                fn is_zero(&self) -> bool {
                    *self == 0.0
                }

                fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
                    self == other
                }
            }
        )*
    };
}

reflect_float!(f32, f64);

impl Reflect for bool {
    fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(false),
            Value::Bool(b) => Ok(*b),
            other => Err(ctx.mismatch("bool", other)),
        }
    }

    fn is_zero(&self) -> bool {
        !*self
    }

    fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
        self == other
    }
}

impl Reflect for String {
    fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
        Ok(Value::String(self.clone()))
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s.clone()),
            other => Err(ctx.mismatch("string", other)),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
        self == other
    }
}

/// Byte strings travel as standard base64 text.
impl Reflect for Bytes {
    fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
        Ok(Value::String(STANDARD.encode(self)))
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(Bytes::new()),
            Value::String(s) => STANDARD
                .decode(s)
                .map(Bytes::from)
                .map_err(|e| ctx.invalid(format!("illegal base64 data: {e}"))),
            other => Err(ctx.mismatch("base64 string", other)),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
        self == other
    }
}

impl Reflect for Value {
    fn to_value(&self, _: &mut ToValue) -> Result<Value, Error> {
        Ok(self.clone())
    }

    fn from_value(value: &Value, _: &mut FromValue) -> Result<Self, Error> {
        Ok(value.clone())
    }

    fn is_zero(&self) -> bool {
        self.is_null()
    }

    fn is_nil(&self) -> bool {
        self.is_null()
    }

    fn deep_equal(&self, other: &Self, _: &Equalities) -> bool {
        self == other
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn to_value(&self, ctx: &mut ToValue) -> Result<Value, Error> {
        match self {
            Some(v) => v.to_value(ctx),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other, ctx).map(Some),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }

    fn is_nil(&self) -> bool {
        self.is_none()
    }

    fn deep_equal(&self, other: &Self, eq: &Equalities) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => eq.deep_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T: Reflect> Reflect for Box<T> {
    fn to_value(&self, ctx: &mut ToValue) -> Result<Value, Error> {
        (**self).to_value(ctx)
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        T::from_value(value, ctx).map(Box::new)
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }

    fn deep_equal(&self, other: &Self, eq: &Equalities) -> bool {
        eq.deep_equal(&**self, &**other)
    }

    fn write_inline(&self, out: &mut Map, ctx: &mut ToValue) -> Result<(), Error> {
        (**self).write_inline(out, ctx)
    }

    fn read_inline(&mut self, map: &Map, matched: &mut Matched, ctx: &mut FromValue) -> Result<(), Error> {
        (**self).read_inline(map, matched, ctx)
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn to_value(&self, ctx: &mut ToValue) -> Result<Value, Error> {
        self.iter()
            .enumerate()
            .map(|(i, item)| ctx.nested(format!("[{i}]"), |ctx| item.to_value(ctx)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| ctx.nested(format!("[{i}]"), |ctx| T::from_value(item, ctx)))
                .collect(),
            other => Err(ctx.mismatch("array", other)),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn deep_equal(&self, other: &Self, eq: &Equalities) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| eq.deep_equal(a, b))
    }
}

impl<T: Reflect> Reflect for BTreeMap<String, T> {
    fn to_value(&self, ctx: &mut ToValue) -> Result<Value, Error> {
        self.iter()
            .map(|(k, v)| ctx.nested(k.clone(), |ctx| v.to_value(ctx)).map(|node| (k.clone(), node)))
            .collect::<Result<Map, _>>()
            .map(Value::Object)
    }

    fn from_value(value: &Value, ctx: &mut FromValue) -> Result<Self, Error> {
        match value {
            Value::Null => Ok(BTreeMap::new()),
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| ctx.nested(k.clone(), |ctx| T::from_value(v, ctx)).map(|item| (k.clone(), item)))
                .collect(),
            other => Err(ctx.mismatch("object", other)),
        }
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn deep_equal(&self, other: &Self, eq: &Equalities) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other)
                .all(|((ka, va), (kb, vb))| ka == kb && eq.deep_equal(va, vb))
    }
}
