use crate::{StructType, Type};

use prost_types::value::Kind;
use prost_types::Value as SpannerValue;

#[derive(Debug, Clone, PartialEq)]
pub struct StructValue(pub Vec<(Option<String>, Value)>);

impl StructValue {
    pub fn try_from(tpe: &StructType, values: Vec<SpannerValue>) -> Result<Self, crate::Error> {
        if tpe.len() != values.len() {
            Err(crate::Error::Codec(format!(
                "unmatched number of fields: expected {}, got {}",
                tpe.len(),
                values.len()
            )))
        } else {
            tpe.fields()
                .iter()
                .zip(values)
                .map(|((name, tpe), value)| {
                    Value::try_from(tpe, value).map(|value| (name.clone(), value))
                })
                .collect::<Result<Vec<(Option<String>, Value)>, crate::Error>>()
                .map(StructValue)
        }
    }
}

/// A value decoded from a result set.
///
/// Values of temporal types are decoded using `chrono` when the `temporal` feature is enabled,
/// and kept in their canonical string form otherwise.
// https://github.com/googleapis/googleapis/blob/master/google/spanner/v1/type.proto
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(Type),
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    #[cfg(feature = "json")]
    Json(serde_json::Value),
    #[cfg(feature = "numeric")]
    Numeric(bigdecimal::BigDecimal),
    #[cfg(feature = "temporal")]
    Timestamp(chrono::DateTime<chrono::Utc>),
    #[cfg(not(feature = "temporal"))]
    Timestamp(String),
    #[cfg(feature = "temporal")]
    Date(chrono::NaiveDate),
    #[cfg(not(feature = "temporal"))]
    Date(String),
    Array(Type, Vec<Value>),
    Struct(StructValue),
}

fn invalid(tpe: &Type, what: &str) -> crate::Error {
    crate::Error::Codec(format!("{} is not a valid {:?}", what, tpe))
}

impl Value {
    pub fn try_from(tpe: &Type, value: SpannerValue) -> Result<Self, crate::Error> {
        let kind = match value.kind {
            None | Some(Kind::NullValue(_)) => return Ok(Value::Null(tpe.clone())),
            Some(kind) => kind,
        };
        match (tpe, kind) {
            (Type::Bool, Kind::BoolValue(b)) => Ok(Value::Bool(b)),
            (Type::Int64, Kind::StringValue(s)) => s
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|_| invalid(tpe, &s)),
            (Type::Float64, Kind::NumberValue(n)) => Ok(Value::Float64(n)),
            (Type::Float64, Kind::StringValue(s)) => match s.as_str() {
                "NaN" => Ok(Value::Float64(f64::NAN)),
                "Infinity" => Ok(Value::Float64(f64::INFINITY)),
                "-Infinity" => Ok(Value::Float64(f64::NEG_INFINITY)),
                _ => Err(invalid(tpe, &s)),
            },
            (Type::String, Kind::StringValue(s)) => Ok(Value::String(s)),
            (Type::Bytes, Kind::StringValue(s)) => base64::decode(&s)
                .map(Value::Bytes)
                .map_err(|_| invalid(tpe, &s)),
            #[cfg(feature = "json")]
            (Type::Json, Kind::StringValue(s)) => serde_json::from_str(&s)
                .map(Value::Json)
                .map_err(|_| invalid(tpe, &s)),
            #[cfg(feature = "numeric")]
            (Type::Numeric, Kind::StringValue(s)) => s
                .parse::<bigdecimal::BigDecimal>()
                .map(Value::Numeric)
                .map_err(|_| invalid(tpe, &s)),
            #[cfg(feature = "temporal")]
            (Type::Timestamp, Kind::StringValue(s)) => chrono::DateTime::parse_from_rfc3339(&s)
                .map(|ts| Value::Timestamp(ts.with_timezone(&chrono::Utc)))
                .map_err(|_| invalid(tpe, &s)),
            #[cfg(not(feature = "temporal"))]
            (Type::Timestamp, Kind::StringValue(s)) => Ok(Value::Timestamp(s)),
            #[cfg(feature = "temporal")]
            (Type::Date, Kind::StringValue(s)) => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| invalid(tpe, &s)),
            #[cfg(not(feature = "temporal"))]
            (Type::Date, Kind::StringValue(s)) => Ok(Value::Date(s)),
            (Type::Array(inner), Kind::ListValue(list_value)) => list_value
                .values
                .into_iter()
                .map(|v| Value::try_from(inner, v))
                .collect::<Result<Vec<Value>, crate::Error>>()
                .map(|values| Value::Array(inner.as_ref().clone(), values)),
            (Type::Struct(row_type), Kind::ListValue(list_value)) => {
                StructValue::try_from(row_type, list_value.values).map(Value::Struct)
            }
            _ => Err(crate::Error::Codec(format!(
                "invalid value kind for type {:?}",
                tpe
            ))),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }
}
