use crate::{Error, Result, Value};
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};
use std::{any, borrow::Cow};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, format_description::BorrowedFormatItem};
use time::macros::format_description;
use uuid::Uuid;

/// Conversion between native Rust types and [`Value`].
///
/// Implemented for every type an entity field can hold. Row decoding goes through
/// `try_from_value`, which accepts the canonical variant and the alternate
/// representations backends commonly return (other integer widths with a range
/// check, text for temporal and uuid columns).
///
/// ```rust
/// use strata_core::{AsValue, Value};
/// let v = 42i32.as_value();
/// assert!(matches!(v, Value::Int32(Some(42))));
/// let n: i64 = AsValue::try_from_value(v).unwrap();
/// assert_eq!(n, 42);
/// ```
pub trait AsValue {
    /// The typed NULL of this type, also used as the column type prototype.
    fn as_empty_value() -> Value;
    fn as_value(self) -> Value;
    fn try_from_value(value: Value) -> Result<Self>
    where
        Self: Sized;
}

impl<T: AsValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.as_value()
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Varchar(Some(value.into()))
    }
}

fn mismatch<T>(value: &Value) -> Error {
    Error::msg(format!(
        "Cannot convert {:?} to {}",
        value,
        any::type_name::<T>()
    ))
}

macro_rules! impl_as_value_integer {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                #[allow(unreachable_patterns)]
                let wide: i128 = match value {
                    $destination(Some(v)) => return Ok(v),
                    Value::Int8(Some(v)) => v as _,
                    Value::Int16(Some(v)) => v as _,
                    Value::Int32(Some(v)) => v as _,
                    Value::Int64(Some(v)) => v as _,
                    Value::UInt8(Some(v)) => v as _,
                    Value::UInt16(Some(v)) => v as _,
                    Value::UInt32(Some(v)) => v as _,
                    Value::UInt64(Some(v)) => v as _,
                    Value::Decimal(Some(v)) if v.fract().is_zero() => {
                        v.to_i128().ok_or_else(|| mismatch::<Self>(&value))?
                    }
                    Value::Varchar(Some(ref v)) => v
                        .trim()
                        .parse::<i128>()
                        .map_err(|_| mismatch::<Self>(&value))?,
                    _ => return Err(mismatch::<Self>(&value)),
                };
                <$source>::try_from(wide).map_err(|_| {
                    Error::msg(format!(
                        "Value {} is out of range for {}",
                        wide,
                        any::type_name::<Self>(),
                    ))
                })
            }
        }
    };
}
impl_as_value_integer!(i8, Value::Int8);
impl_as_value_integer!(i16, Value::Int16);
impl_as_value_integer!(i32, Value::Int32);
impl_as_value_integer!(i64, Value::Int64);
impl_as_value_integer!(u8, Value::UInt8);
impl_as_value_integer!(u16, Value::UInt16);
impl_as_value_integer!(u32, Value::UInt32);
impl_as_value_integer!(u64, Value::UInt64);

macro_rules! impl_as_value_float {
    ($source:ty, $destination:path) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                #[allow(unreachable_patterns)]
                match value {
                    $destination(Some(v)) => Ok(v),
                    Value::Float32(Some(v)) => Ok(v as _),
                    Value::Float64(Some(v)) => Ok(v as _),
                    Value::Int8(Some(v)) => Ok(v as _),
                    Value::Int16(Some(v)) => Ok(v as _),
                    Value::Int32(Some(v)) => Ok(v as _),
                    Value::Int64(Some(v)) => Ok(v as _),
                    Value::UInt8(Some(v)) => Ok(v as _),
                    Value::UInt16(Some(v)) => Ok(v as _),
                    Value::UInt32(Some(v)) => Ok(v as _),
                    Value::UInt64(Some(v)) => Ok(v as _),
                    Value::Decimal(Some(v)) => {
                        v.to_f64().map(|v| v as _).ok_or_else(|| mismatch::<Self>(&value))
                    }
                    Value::Varchar(Some(ref v)) => {
                        v.trim().parse().map_err(|_| mismatch::<Self>(&value))
                    }
                    _ => Err(mismatch::<Self>(&value)),
                }
            }
        }
    };
}
impl_as_value_float!(f32, Value::Float32);
impl_as_value_float!(f64, Value::Float64);

impl AsValue for bool {
    fn as_empty_value() -> Value {
        Value::Boolean(None)
    }
    fn as_value(self) -> Value {
        Value::Boolean(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if let Value::Boolean(Some(v)) = value {
            return Ok(v);
        }
        value.as_flag().ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl AsValue for Decimal {
    fn as_empty_value() -> Value {
        Value::Decimal(None)
    }
    fn as_value(self) -> Value {
        Value::Decimal(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        let result = match &value {
            Value::Decimal(Some(v)) => Some(*v),
            Value::Int8(Some(v)) => Decimal::from_i8(*v),
            Value::Int16(Some(v)) => Decimal::from_i16(*v),
            Value::Int32(Some(v)) => Decimal::from_i32(*v),
            Value::Int64(Some(v)) => Decimal::from_i64(*v),
            Value::UInt8(Some(v)) => Decimal::from_u8(*v),
            Value::UInt16(Some(v)) => Decimal::from_u16(*v),
            Value::UInt32(Some(v)) => Decimal::from_u32(*v),
            Value::UInt64(Some(v)) => Decimal::from_u64(*v),
            Value::Float32(Some(v)) => Decimal::from_f32(*v),
            Value::Float64(Some(v)) => Decimal::from_f64(*v),
            Value::Varchar(Some(v)) => v.trim().parse().ok(),
            _ => None,
        };
        result.ok_or_else(|| mismatch::<Self>(&value))
    }
}

impl AsValue for String {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Varchar(Some(v)) => Ok(v),
            Value::Uuid(Some(v)) => Ok(v.to_string()),
            Value::Json(Some(serde_json::Value::String(v))) => Ok(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for Cow<'static, str> {
    fn as_empty_value() -> Value {
        Value::Varchar(None)
    }
    fn as_value(self) -> Value {
        Value::Varchar(Some(self.into_owned()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        String::try_from_value(value).map(Cow::Owned)
    }
}

impl AsValue for Box<[u8]> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Blob(Some(v)) => Ok(v),
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for Vec<u8> {
    fn as_empty_value() -> Value {
        Value::Blob(None)
    }
    fn as_value(self) -> Value {
        Value::Blob(Some(self.into_boxed_slice()))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        Box::<[u8]>::try_from_value(value).map(Into::into)
    }
}

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[hour]:[minute]:[second].[subsecond]"),
    format_description!("[hour]:[minute]:[second]"),
    format_description!("[hour]:[minute]"),
];
const TIMESTAMP_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
];
const TIMESTAMPTZ_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond][offset_hour]:[offset_minute]"
    ),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour]:[offset_minute]"),
    format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond][offset_hour]:[offset_minute]"
    ),
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second][offset_hour]:[offset_minute]"),
];

macro_rules! impl_as_value_temporal {
    ($source:ty, $destination:path, |$text:ident| $parse:expr) => {
        impl AsValue for $source {
            fn as_empty_value() -> Value {
                $destination(None)
            }
            fn as_value(self) -> Value {
                $destination(Some(self))
            }
            fn try_from_value(value: Value) -> Result<Self> {
                match value {
                    $destination(Some(v)) => Ok(v),
                    Value::Varchar(Some(ref $text)) => {
                        let $text = $text.trim();
                        let parsed: Option<$source> = $parse;
                        parsed.ok_or_else(|| mismatch::<Self>(&value))
                    }
                    _ => Err(mismatch::<Self>(&value)),
                }
            }
        }
    };
}
impl_as_value_temporal!(Date, Value::Date, |text| Date::parse(text, DATE_FORMAT).ok());
impl_as_value_temporal!(Time, Value::Time, |text| TIME_FORMATS
    .iter()
    .find_map(|f| Time::parse(text, f).ok()));
impl_as_value_temporal!(PrimitiveDateTime, Value::Timestamp, |text| TIMESTAMP_FORMATS
    .iter()
    .find_map(|f| PrimitiveDateTime::parse(text, f).ok()));
impl_as_value_temporal!(
    OffsetDateTime,
    Value::TimestampWithTimezone,
    |text| TIMESTAMPTZ_FORMATS
        .iter()
        .find_map(|f| OffsetDateTime::parse(text, f).ok())
);

impl AsValue for Uuid {
    fn as_empty_value() -> Value {
        Value::Uuid(None)
    }
    fn as_value(self) -> Value {
        Value::Uuid(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => {
                Uuid::parse_str(v.trim()).map_err(|_| mismatch::<Self>(&value))
            }
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl AsValue for serde_json::Value {
    fn as_empty_value() -> Value {
        Value::Json(None)
    }
    fn as_value(self) -> Value {
        Value::Json(Some(self))
    }
    fn try_from_value(value: Value) -> Result<Self> {
        match value {
            Value::Json(Some(v)) => Ok(v),
            Value::Varchar(Some(ref v)) => {
                serde_json::from_str(v).map_err(|_| mismatch::<Self>(&value))
            }
            _ => Err(mismatch::<Self>(&value)),
        }
    }
}

impl<T: AsValue> AsValue for Option<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        match self {
            Some(v) => v.as_value(),
            None => T::as_empty_value(),
        }
    }
    fn try_from_value(value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::try_from_value(value).map(Some)
    }
}

impl<T: AsValue> AsValue for Box<T> {
    fn as_empty_value() -> Value {
        T::as_empty_value()
    }
    fn as_value(self) -> Value {
        (*self).as_value()
    }
    fn try_from_value(value: Value) -> Result<Self> {
        T::try_from_value(value).map(Box::new)
    }
}

impl Value {
    /// Converts `self` into the variant of `prototype`, with the rules of
    /// [`AsValue::try_from_value`]. Nulls become the typed null of the prototype.
    pub fn converted_like(self, prototype: &Value) -> Result<Value> {
        fn convert<T: AsValue>(value: Value) -> Result<Value> {
            T::try_from_value(value).map(AsValue::as_value)
        }
        if self.is_null() {
            return Ok(prototype.as_null());
        }
        match prototype {
            Value::Null => Ok(self),
            Value::Boolean(..) => convert::<bool>(self),
            Value::Int8(..) => convert::<i8>(self),
            Value::Int16(..) => convert::<i16>(self),
            Value::Int32(..) => convert::<i32>(self),
            Value::Int64(..) => convert::<i64>(self),
            Value::UInt8(..) => convert::<u8>(self),
            Value::UInt16(..) => convert::<u16>(self),
            Value::UInt32(..) => convert::<u32>(self),
            Value::UInt64(..) => convert::<u64>(self),
            Value::Float32(..) => convert::<f32>(self),
            Value::Float64(..) => convert::<f64>(self),
            Value::Decimal(..) => convert::<Decimal>(self),
            Value::Varchar(..) => convert::<String>(self),
            Value::Blob(..) => convert::<Box<[u8]>>(self),
            Value::Date(..) => convert::<Date>(self),
            Value::Time(..) => convert::<Time>(self),
            Value::Timestamp(..) => convert::<PrimitiveDateTime>(self),
            Value::TimestampWithTimezone(..) => convert::<OffsetDateTime>(self),
            Value::Uuid(..) => convert::<Uuid>(self),
            Value::Json(..) => convert::<serde_json::Value>(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn integers_cross_width() {
        assert_eq!(i16::try_from_value(Value::Int64(Some(300))).unwrap(), 300);
        assert!(i8::try_from_value(Value::Int64(Some(300))).is_err());
        assert!(u32::try_from_value(Value::Int32(Some(-1))).is_err());
        assert_eq!(u64::try_from_value(Value::Varchar(Some(" 12 ".into()))).unwrap(), 12);
    }

    #[test]
    fn optional_values() {
        assert_eq!(Option::<i32>::try_from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i32>::try_from_value(Value::Int32(None)).unwrap(), None);
        assert_eq!(
            Option::<i32>::try_from_value(Value::Int64(Some(4))).unwrap(),
            Some(4)
        );
        assert!(matches!(None::<String>.as_value(), Value::Varchar(None)));
        assert!(i32::try_from_value(Value::Null).is_err());
    }

    #[test]
    fn temporal_from_text() {
        assert_eq!(
            Date::try_from_value(Value::Varchar(Some("2021-12-31".into()))).unwrap(),
            date!(2021 - 12 - 31)
        );
        assert_eq!(
            PrimitiveDateTime::try_from_value(Value::Varchar(Some("2021-12-31 23:59:01".into())))
                .unwrap(),
            datetime!(2021-12-31 23:59:01)
        );
        assert!(Date::try_from_value(Value::Varchar(Some("31/12/2021".into()))).is_err());
    }

    #[test]
    fn flags() {
        assert!(bool::try_from_value(Value::Int64(Some(1))).unwrap());
        assert!(!bool::try_from_value(Value::Int32(Some(0))).unwrap());
    }

    #[test]
    fn converted_like_prototype() {
        let id = Value::Int64(None);
        assert_eq!(Value::Int32(Some(5)).converted_like(&id).unwrap(), Value::Int64(Some(5)));
        assert_eq!(Value::Null.converted_like(&id).unwrap(), Value::Int64(None));
        assert_eq!(
            Value::Varchar(Some("2021-12-31".into()))
                .converted_like(&Value::Date(None))
                .unwrap(),
            Value::Date(Some(date!(2021 - 12 - 31)))
        );
        assert!(Value::Int64(Some(300)).converted_like(&Value::Int8(None)).is_err());
        assert!(Value::Int64(Some(3)).converted_like(&Value::Varchar(None)).is_err());
    }
}
