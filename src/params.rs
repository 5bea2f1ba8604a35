use std::collections::BTreeMap;
use std::fmt;

use prost_types::value::Kind;
use prost_types::{ListValue, Value as SpannerValue};

use crate::Type;

/// A string holding an ISO-8601 date which should be bound as a `DATE` rather than a `STRING`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateStr(pub String);

/// A string holding an RFC 3339 timestamp which should be bound as a `TIMESTAMP` rather than a `STRING`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampStr(pub String);

/// A value bound to a statement placeholder.
///
/// The variant determines the Cloud Spanner type sent along with the value, see [`Param::spanner_type`].
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    /// Fixed-precision decimals travel as `FLOAT64`, see [`cast_for_spanner`].
    #[cfg(feature = "numeric")]
    Numeric(bigdecimal::BigDecimal),
    String(String),
    Bytes(Vec<u8>),
    DateStr(DateStr),
    TimestampStr(TimestampStr),
    #[cfg(feature = "temporal")]
    Date(chrono::NaiveDate),
    #[cfg(feature = "temporal")]
    Timestamp(chrono::DateTime<chrono::Utc>),
    #[cfg(feature = "json")]
    Json(serde_json::Value),
    /// A value whose type is left for the server to infer.
    Untyped(String),
    Array(Vec<Param>),
}

impl Param {
    /// The type declared for this value, or `None` when the server should infer it.
    ///
    /// This follows the first matching rule: bool, float, int, timestamps, dates, bytes then strings.
    pub fn spanner_type(&self) -> Option<Type> {
        match self {
            Param::Bool(_) => Some(Type::Bool),
            Param::Float64(_) => Some(Type::Float64),
            #[cfg(feature = "numeric")]
            Param::Numeric(_) => Some(Type::Float64),
            Param::Int64(_) => Some(Type::Int64),
            Param::TimestampStr(_) => Some(Type::Timestamp),
            #[cfg(feature = "temporal")]
            Param::Timestamp(_) => Some(Type::Timestamp),
            Param::DateStr(_) => Some(Type::Date),
            #[cfg(feature = "temporal")]
            Param::Date(_) => Some(Type::Date),
            Param::Bytes(_) => Some(Type::Bytes),
            Param::String(_) => Some(Type::String),
            #[cfg(feature = "json")]
            Param::Json(_) => Some(Type::Json),
            Param::Array(values) => values
                .iter()
                .find_map(Param::spanner_type)
                .map(Type::array),
            Param::Null | Param::Untyped(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Null => write!(f, "NULL"),
            Param::Bool(b) => write!(f, "{}", b),
            Param::Int64(i) => write!(f, "{}", i),
            Param::Float64(v) => write!(f, "{}", v),
            #[cfg(feature = "numeric")]
            Param::Numeric(d) => write!(f, "{}", d),
            Param::String(s) | Param::Untyped(s) => write!(f, "{:?}", s),
            Param::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Param::DateStr(DateStr(s)) | Param::TimestampStr(TimestampStr(s)) => {
                write!(f, "{:?}", s)
            }
            #[cfg(feature = "temporal")]
            Param::Date(d) => write!(f, "{}", d),
            #[cfg(feature = "temporal")]
            Param::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            #[cfg(feature = "json")]
            Param::Json(json) => write!(f, "{}", json),
            Param::Array(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Converts fixed-precision decimals to 64-bit floats for transport; other values pass through unchanged.
pub fn cast_for_spanner(param: Param) -> Param {
    match param {
        #[cfg(feature = "numeric")]
        Param::Numeric(decimal) => {
            use bigdecimal::ToPrimitive;
            decimal
                .to_f64()
                .map(Param::Float64)
                .unwrap_or(Param::Untyped(decimal.to_string()))
        }
        other => other,
    }
}

/// Derives the type map of a set of bound values. Values of unknown type are omitted.
pub fn param_types(params: &BTreeMap<String, Param>) -> BTreeMap<String, Type> {
    params
        .iter()
        .filter_map(|(name, value)| value.spanner_type().map(|tpe| (name.clone(), tpe)))
        .collect()
}

fn float_value(f: f64) -> Kind {
    if f.is_nan() {
        Kind::StringValue("NaN".to_string())
    } else if f.is_infinite() && f.is_sign_positive() {
        Kind::StringValue("Infinity".to_string())
    } else if f.is_infinite() {
        Kind::StringValue("-Infinity".to_string())
    } else {
        Kind::NumberValue(f)
    }
}

impl From<&Param> for SpannerValue {
    fn from(value: &Param) -> Self {
        let kind = match value {
            Param::Null => Kind::NullValue(0),
            Param::Bool(b) => Kind::BoolValue(*b),
            Param::Int64(i) => Kind::StringValue(i.to_string()),
            Param::Float64(f) => float_value(*f),
            #[cfg(feature = "numeric")]
            Param::Numeric(d) => Kind::StringValue(d.to_string()),
            Param::String(s) | Param::Untyped(s) => Kind::StringValue(s.clone()),
            Param::Bytes(b) => Kind::StringValue(base64::encode(b)),
            Param::DateStr(DateStr(s)) | Param::TimestampStr(TimestampStr(s)) => {
                Kind::StringValue(s.clone())
            }
            #[cfg(feature = "temporal")]
            Param::Date(d) => Kind::StringValue(d.format("%Y-%m-%d").to_string()),
            #[cfg(feature = "temporal")]
            Param::Timestamp(ts) => Kind::StringValue(
                ts.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
            ),
            #[cfg(feature = "json")]
            Param::Json(json) => Kind::StringValue(json.to_string()),
            Param::Array(values) => Kind::ListValue(ListValue {
                values: values.iter().map(SpannerValue::from).collect(),
            }),
        };
        SpannerValue { kind: Some(kind) }
    }
}

/// The parameters passed along with a statement, in either placeholder style.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    None,
    /// Values for `%s` placeholders, in order.
    Positional(Vec<Param>),
    /// Values for `%(name)s` placeholders. Keys that no placeholder refers to are ignored.
    Named(BTreeMap<String, Param>),
}

impl Params {
    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(values) => values.is_empty(),
            Params::Named(values) => values.is_empty(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Params::None
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl From<Vec<Param>> for Params {
    fn from(values: Vec<Param>) -> Self {
        Params::Positional(values)
    }
}

impl From<BTreeMap<String, Param>> for Params {
    fn from(values: BTreeMap<String, Param>) -> Self {
        Params::Named(values)
    }
}

impl<T: Into<Params>> From<Option<T>> for Params {
    fn from(values: Option<T>) -> Self {
        values.map(Into::into).unwrap_or(Params::None)
    }
}

/// Builds positional [`Params`] from any values implementing [`crate::ToSpanner`].
///
/// ```
/// # use spanner_dbapi::{params, Param, Params};
/// let params = params![10, "x"];
/// assert_eq!(params, Params::Positional(vec![Param::Int64(10), Param::String("x".into())]));
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::Positional(::std::vec::Vec::new())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::Positional(::std::vec![$($crate::ToSpanner::to_spanner(&$value)),+])
    };
}

/// Builds named [`Params`] for `%(name)s` placeholders.
///
/// ```
/// # use spanner_dbapi::{named_params, Params};
/// let params = named_params! { "x" => "v", "y" => 42 };
/// assert_eq!(params.len(), 2);
/// ```
#[macro_export]
macro_rules! named_params {
    ($($name:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut params = ::std::collections::BTreeMap::new();
        $(
            params.insert(::std::string::String::from($name), $crate::ToSpanner::to_spanner(&$value));
        )*
        $crate::Params::Named(params)
    }};
}
