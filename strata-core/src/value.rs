use rust_decimal::Decimal;
use std::fmt::Write;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use uuid::Uuid;

/// Dynamically typed scalar moved between entities, statements and rows.
///
/// Every variant except `Null` carries an `Option` payload: the variant keeps the
/// column type while `None` marks a SQL NULL of that type. Entity descriptors use
/// the empty variants as type prototypes.
#[derive(Default, Debug, Clone, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Boolean(Option<bool>),
    Int8(Option<i8>),
    Int16(Option<i16>),
    Int32(Option<i32>),
    Int64(Option<i64>),
    UInt8(Option<u8>),
    UInt16(Option<u16>),
    UInt32(Option<u32>),
    UInt64(Option<u64>),
    Float32(Option<f32>),
    Float64(Option<f64>),
    Decimal(Option<Decimal>),
    Varchar(Option<String>),
    Blob(Option<Box<[u8]>>),
    Date(Option<Date>),
    Time(Option<Time>),
    Timestamp(Option<PrimitiveDateTime>),
    TimestampWithTimezone(Option<OffsetDateTime>),
    Uuid(Option<Uuid>),
    Json(Option<serde_json::Value>),
}

impl Value {
    pub fn same_type(&self, other: &Self) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Boolean(v) => v.is_none(),
            Value::Int8(v) => v.is_none(),
            Value::Int16(v) => v.is_none(),
            Value::Int32(v) => v.is_none(),
            Value::Int64(v) => v.is_none(),
            Value::UInt8(v) => v.is_none(),
            Value::UInt16(v) => v.is_none(),
            Value::UInt32(v) => v.is_none(),
            Value::UInt64(v) => v.is_none(),
            Value::Float32(v) => v.is_none(),
            Value::Float64(v) => v.is_none(),
            Value::Decimal(v) => v.is_none(),
            Value::Varchar(v) => v.is_none(),
            Value::Blob(v) => v.is_none(),
            Value::Date(v) => v.is_none(),
            Value::Time(v) => v.is_none(),
            Value::Timestamp(v) => v.is_none(),
            Value::TimestampWithTimezone(v) => v.is_none(),
            Value::Uuid(v) => v.is_none(),
            Value::Json(v) => v.is_none(),
        }
    }

    /// Whether the value is the "unset" value of its type: null, zero, false, empty
    /// text or blob, nil uuid or a JSON null.
    ///
    /// By-example selections and the save merge only consider non default values.
    pub fn is_default(&self) -> bool {
        match self {
            v if v.is_null() => true,
            Value::Boolean(Some(v)) => !v,
            Value::Int8(Some(v)) => *v == 0,
            Value::Int16(Some(v)) => *v == 0,
            Value::Int32(Some(v)) => *v == 0,
            Value::Int64(Some(v)) => *v == 0,
            Value::UInt8(Some(v)) => *v == 0,
            Value::UInt16(Some(v)) => *v == 0,
            Value::UInt32(Some(v)) => *v == 0,
            Value::UInt64(Some(v)) => *v == 0,
            Value::Float32(Some(v)) => *v == 0.0,
            Value::Float64(Some(v)) => *v == 0.0,
            Value::Decimal(Some(v)) => v.is_zero(),
            Value::Varchar(Some(v)) => v.is_empty(),
            Value::Blob(Some(v)) => v.is_empty(),
            Value::Uuid(Some(v)) => v.is_nil(),
            Value::Json(Some(v)) => v.is_null(),
            _ => false,
        }
    }

    /// The typed null of the same variant.
    pub fn as_null(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(..) => Value::Boolean(None),
            Value::Int8(..) => Value::Int8(None),
            Value::Int16(..) => Value::Int16(None),
            Value::Int32(..) => Value::Int32(None),
            Value::Int64(..) => Value::Int64(None),
            Value::UInt8(..) => Value::UInt8(None),
            Value::UInt16(..) => Value::UInt16(None),
            Value::UInt32(..) => Value::UInt32(None),
            Value::UInt64(..) => Value::UInt64(None),
            Value::Float32(..) => Value::Float32(None),
            Value::Float64(..) => Value::Float64(None),
            Value::Decimal(..) => Value::Decimal(None),
            Value::Varchar(..) => Value::Varchar(None),
            Value::Blob(..) => Value::Blob(None),
            Value::Date(..) => Value::Date(None),
            Value::Time(..) => Value::Time(None),
            Value::Timestamp(..) => Value::Timestamp(None),
            Value::TimestampWithTimezone(..) => Value::TimestampWithTimezone(None),
            Value::Uuid(..) => Value::Uuid(None),
            Value::Json(..) => Value::Json(None),
        }
    }

    /// Interprets the value as a boolean flag, the way backends return `EXISTS`.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => *v,
            Value::Int8(v) => v.map(|v| v != 0),
            Value::Int16(v) => v.map(|v| v != 0),
            Value::Int32(v) => v.map(|v| v != 0),
            Value::Int64(v) => v.map(|v| v != 0),
            Value::UInt8(v) => v.map(|v| v != 0),
            Value::UInt16(v) => v.map(|v| v != 0),
            Value::UInt32(v) => v.map(|v| v != 0),
            Value::UInt64(v) => v.map(|v| v != 0),
            _ => None,
        }
    }

    /// JSON representation used by set valued parameters.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            v if v.is_null() => Json::Null,
            Value::Boolean(Some(v)) => Json::Bool(*v),
            Value::Int8(Some(v)) => Json::from(*v),
            Value::Int16(Some(v)) => Json::from(*v),
            Value::Int32(Some(v)) => Json::from(*v),
            Value::Int64(Some(v)) => Json::from(*v),
            Value::UInt8(Some(v)) => Json::from(*v),
            Value::UInt16(Some(v)) => Json::from(*v),
            Value::UInt32(Some(v)) => Json::from(*v),
            Value::UInt64(Some(v)) => Json::from(*v),
            Value::Float32(Some(v)) => Json::from(*v),
            Value::Float64(Some(v)) => Json::from(*v),
            Value::Decimal(Some(v)) => Json::String(v.to_string()),
            Value::Varchar(Some(v)) => Json::String(v.clone()),
            Value::Blob(Some(v)) => {
                let mut out = String::with_capacity(2 + v.len() * 2);
                out.push_str("\\x");
                for b in v.iter() {
                    let _ = write!(out, "{:02x}", b);
                }
                Json::String(out)
            }
            Value::Date(Some(v)) => Json::String(format_date(v)),
            Value::Time(Some(v)) => Json::String(format_time(v)),
            Value::Timestamp(Some(v)) => {
                Json::String(format!("{}T{}", format_date(&v.date()), format_time(&v.time())))
            }
            Value::TimestampWithTimezone(Some(v)) => {
                let (h, m, _) = v.offset().as_hms();
                Json::String(format!(
                    "{}T{}{}{:02}:{:02}",
                    format_date(&v.date()),
                    format_time(&v.time()),
                    if v.offset().is_negative() { '-' } else { '+' },
                    h.abs(),
                    m.abs(),
                ))
            }
            Value::Uuid(Some(v)) => Json::String(v.to_string()),
            Value::Json(Some(v)) => v.clone(),
            _ => Json::Null,
        }
    }
}

pub(crate) fn format_date(value: &Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        value.year(),
        value.month() as u8,
        value.day()
    )
}

pub(crate) fn format_time(value: &Time) -> String {
    let mut out = format!(
        "{:02}:{:02}:{:02}",
        value.hour(),
        value.minute(),
        value.second()
    );
    let nanos = value.nanosecond();
    if nanos != 0 {
        let _ = write!(out, ".{:09}", nanos);
        while out.ends_with('0') {
            out.pop();
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    #[test]
    fn default_values() {
        assert!(Value::Null.is_default());
        assert!(Value::Int32(Some(0)).is_default());
        assert!(Value::Varchar(Some("".into())).is_default());
        assert!(Value::Uuid(Some(Uuid::nil())).is_default());
        assert!(!Value::Int32(Some(7)).is_default());
        assert!(!Value::Boolean(Some(true)).is_default());
        assert!(!Value::Varchar(Some("a".into())).is_default());
    }

    #[test]
    fn json_rendering() {
        assert_eq!(Value::Int64(Some(5)).to_json(), serde_json::json!(5));
        assert_eq!(Value::Varchar(None).to_json(), serde_json::Value::Null);
        assert_eq!(
            Value::Date(Some(date!(2024 - 03 - 09))).to_json(),
            serde_json::json!("2024-03-09")
        );
        assert_eq!(
            Value::Time(Some(time!(7:05:00.25))).to_json(),
            serde_json::json!("07:05:00.25")
        );
        assert_eq!(
            Value::Timestamp(Some(datetime!(2024-03-09 10:00))).to_json(),
            serde_json::json!("2024-03-09T10:00:00")
        );
        assert_eq!(
            Value::Blob(Some([1u8, 171].into())).to_json(),
            serde_json::json!("\\x01ab")
        );
    }
}
