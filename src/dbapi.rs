//! Module level globals, type objects and constructors of the DB-API.
use std::fmt;

use crate::{Param, TypeCode};
#[cfg(feature = "temporal")]
use crate::Error;

#[cfg(feature = "temporal")]
use chrono::TimeZone;

pub const APILEVEL: &str = "2.0";

/// `%s` placeholders, as well as `%(name)s`.
pub const PARAMSTYLE: &str = "format";

/// Connections must not be shared between threads, see [`crate::Connection`].
pub const THREADSAFETY: u8 = 1;

/// Compares equal to each of the type codes it groups, see [`crate::Column::type_code`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TypeObject(&'static [TypeCode]);

impl TypeObject {
    pub fn type_codes(&self) -> &'static [TypeCode] {
        self.0
    }
}

impl fmt::Debug for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(TypeCode::name))
            .finish()
    }
}

impl PartialEq<TypeCode> for TypeObject {
    fn eq(&self, other: &TypeCode) -> bool {
        self.0.contains(other)
    }
}

impl PartialEq<TypeObject> for TypeCode {
    fn eq(&self, other: &TypeObject) -> bool {
        other == self
    }
}

pub const STRING: TypeObject = TypeObject(&[TypeCode::String]);
pub const BINARY: TypeObject = TypeObject(&[
    TypeCode::Unspecified,
    TypeCode::Bytes,
    TypeCode::Array,
    TypeCode::Struct,
]);
pub const NUMBER: TypeObject = TypeObject(&[
    TypeCode::Bool,
    TypeCode::Int64,
    TypeCode::Float64,
    TypeCode::Numeric,
]);
pub const DATETIME: TypeObject = TypeObject(&[TypeCode::Timestamp, TypeCode::Date]);
pub const ROWID: TypeObject = TypeObject(&[TypeCode::String]);

pub fn binary(value: impl AsRef<[u8]>) -> Param {
    Param::Bytes(value.as_ref().to_vec())
}

#[cfg(feature = "temporal")]
fn invalid(what: &str) -> Error {
    Error::Data(format!("invalid {}", what))
}

#[cfg(feature = "temporal")]
pub fn date(year: i32, month: u32, day: u32) -> Result<Param, Error> {
    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .map(Param::Date)
        .ok_or_else(|| invalid("date"))
}

/// Cloud Spanner has no `TIME` type: times are bound as strings for the server to interpret.
#[cfg(feature = "temporal")]
pub fn time(hour: u32, minute: u32, second: u32) -> Result<Param, Error> {
    chrono::NaiveTime::from_hms_opt(hour, minute, second)
        .map(|time| Param::Untyped(time.format("%H:%M:%S").to_string()))
        .ok_or_else(|| invalid("time"))
}

/// A timestamp in UTC.
#[cfg(feature = "temporal")]
pub fn timestamp(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Result<Param, Error> {
    chrono::NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .map(|naive| Param::Timestamp(chrono::Utc.from_utc_datetime(&naive)))
        .ok_or_else(|| invalid("timestamp"))
}

#[cfg(feature = "temporal")]
fn from_ticks(ticks: i64) -> Result<chrono::DateTime<chrono::Utc>, Error> {
    chrono::Utc
        .timestamp_opt(ticks, 0)
        .single()
        .ok_or_else(|| invalid("number of seconds since the epoch"))
}

/// The UTC date `ticks` seconds after the epoch.
#[cfg(feature = "temporal")]
pub fn date_from_ticks(ticks: i64) -> Result<Param, Error> {
    from_ticks(ticks).map(|timestamp| Param::Date(timestamp.date_naive()))
}

#[cfg(feature = "temporal")]
pub fn time_from_ticks(ticks: i64) -> Result<Param, Error> {
    from_ticks(ticks).map(|timestamp| Param::Untyped(timestamp.format("%H:%M:%S").to_string()))
}

#[cfg(feature = "temporal")]
pub fn timestamp_from_ticks(ticks: i64) -> Result<Param, Error> {
    from_ticks(ticks).map(Param::Timestamp)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_type_objects() {
        assert_eq!(NUMBER, TypeCode::Int64);
        assert_eq!(TypeCode::Float64, NUMBER);
        assert_eq!(DATETIME, TypeCode::Date);
        assert_eq!(BINARY, TypeCode::Bytes);
        assert_eq!(STRING, TypeCode::String);
        assert_ne!(STRING, TypeCode::Int64);
        assert_ne!(TypeCode::Timestamp, NUMBER);
    }

    #[test]
    fn test_binary() {
        assert_eq!(binary("abc"), Param::Bytes(b"abc".to_vec()));
    }

    #[cfg(feature = "temporal")]
    #[test]
    fn test_temporal_constructors() {
        assert_eq!(
            date(2021, 2, 28).unwrap(),
            Param::Date(chrono::NaiveDate::from_ymd_opt(2021, 2, 28).unwrap())
        );
        assert!(matches!(date(2021, 2, 30), Err(Error::Data(_))));
        assert_eq!(
            time(13, 5, 9).unwrap(),
            Param::Untyped("13:05:09".to_string())
        );
        assert_eq!(
            timestamp(1970, 1, 2, 0, 0, 0).unwrap(),
            timestamp_from_ticks(86_400).unwrap()
        );
        assert_eq!(date_from_ticks(86_400).unwrap(), date(1970, 1, 2).unwrap());
        assert_eq!(
            time_from_ticks(3_661).unwrap(),
            Param::Untyped("01:01:01".to_string())
        );
    }
}
