use crate::{Error, Type, Value};

/// Conversion of a decoded column value into a native type, see [`crate::Row::get`].
///
/// Only `Option<T>` and [`Value`] accept `NULL`s; every other implementation fails with a data error.
pub trait FromSpanner<'a>: Sized {
    fn from_spanner(tpe: &'a Type, value: &'a Value) -> Result<Self, Error>;

    #[allow(unused_variables)]
    fn from_spanner_null(tpe: &Type) -> Result<Self, Error> {
        Err(Error::Data(format!(
            "NULL {} cannot be read as {}",
            tpe.code().name(),
            std::any::type_name::<Self>()
        )))
    }

    fn from_spanner_nullable(tpe: &'a Type, value: &'a Value) -> Result<Self, Error> {
        match value {
            Value::Null(_) => Self::from_spanner_null(tpe),
            not_null => Self::from_spanner(tpe, not_null),
        }
    }
}

impl<'a, T> FromSpanner<'a> for Option<T>
where
    T: FromSpanner<'a>,
{
    fn from_spanner(tpe: &'a Type, value: &'a Value) -> Result<Self, Error> {
        T::from_spanner(tpe, value).map(Some)
    }

    fn from_spanner_null(_tpe: &Type) -> Result<Self, Error> {
        Ok(None)
    }
}

impl<'a> FromSpanner<'a> for Value {
    fn from_spanner(_tpe: &'a Type, value: &'a Value) -> Result<Self, Error> {
        Ok(value.clone())
    }

    fn from_spanner_null(tpe: &Type) -> Result<Self, Error> {
        Ok(Value::Null(tpe.clone()))
    }
}

fn mismatch<T>(tpe: &Type) -> Error {
    Error::Data(format!(
        "{} column cannot be read as {}",
        tpe.code().name(),
        std::any::type_name::<T>()
    ))
}

// Reads the payload of a single `Value` variant.
macro_rules! from_variant {
    ($t:ty, $variant:ident, |$v:ident| $read:expr) => {
        impl<'a> FromSpanner<'a> for $t {
            fn from_spanner(tpe: &'a Type, value: &'a Value) -> Result<Self, Error> {
                match value {
                    Value::$variant($v) => Ok($read),
                    _ => Err(mismatch::<$t>(tpe)),
                }
            }
        }
    };
}

// INT64 columns narrow into smaller integers when the value fits.
macro_rules! from_int64 {
    ($($t:ty),+) => {
        $(
            impl<'a> FromSpanner<'a> for $t {
                fn from_spanner(tpe: &'a Type, value: &'a Value) -> Result<Self, Error> {
                    match value {
                        Value::Int64(v) => <$t>::try_from(*v).map_err(|_| {
                            Error::Data(format!("{} is out of range for {}", v, stringify!($t)))
                        }),
                        _ => Err(mismatch::<$t>(tpe)),
                    }
                }
            }
        )+
    };
}

from_int64!(i8, u8, i16, u16, i32, u32, i64, u64);

from_variant!(bool, Bool, |v| *v);
from_variant!(f64, Float64, |v| *v);
from_variant!(String, String, |v| v.clone());
from_variant!(&'a str, String, |v| v.as_str());
from_variant!(Vec<u8>, Bytes, |v| v.clone());
from_variant!(&'a [u8], Bytes, |v| v.as_slice());

#[cfg(feature = "temporal")]
from_variant!(chrono::NaiveDate, Date, |v| *v);
#[cfg(feature = "temporal")]
from_variant!(chrono::DateTime<chrono::Utc>, Timestamp, |v| *v);
#[cfg(feature = "numeric")]
from_variant!(bigdecimal::BigDecimal, Numeric, |v| v.clone());
#[cfg(feature = "json")]
from_variant!(serde_json::Value, Json, |v| v.clone());

#[cfg(test)]
mod test {
    use super::*;

    fn read<'a, T: FromSpanner<'a>>(tpe: &'a Type, value: &'a Value) -> Result<T, Error> {
        T::from_spanner_nullable(tpe, value)
    }

    #[test]
    fn test_integers() {
        let value = Value::Int64(200);
        assert_eq!(read::<i64>(&Type::Int64, &value).unwrap(), 200);
        assert_eq!(read::<u8>(&Type::Int64, &value).unwrap(), 200);
        assert_eq!(read::<u64>(&Type::Int64, &value).unwrap(), 200);
        assert!(matches!(read::<i8>(&Type::Int64, &value), Err(Error::Data(_))));
        assert!(read::<u32>(&Type::Int64, &Value::Int64(-1)).is_err());
        assert!(read::<i64>(&Type::Float64, &Value::Float64(1.0)).is_err());
    }

    #[test]
    fn test_scalars() {
        assert!(read::<bool>(&Type::Bool, &Value::Bool(true)).unwrap());
        assert_eq!(read::<f64>(&Type::Float64, &Value::Float64(0.5)).unwrap(), 0.5);
        assert!(read::<f64>(&Type::Int64, &Value::Int64(1)).is_err());

        let text = Value::String("corro".to_string());
        assert_eq!(read::<&str>(&Type::String, &text).unwrap(), "corro");
        assert_eq!(read::<String>(&Type::String, &text).unwrap(), "corro");
        assert!(read::<Vec<u8>>(&Type::String, &text).is_err());

        let bytes = Value::Bytes(vec![1, 2, 3]);
        assert_eq!(read::<&[u8]>(&Type::Bytes, &bytes).unwrap(), &[1, 2, 3]);
        assert_eq!(read::<Vec<u8>>(&Type::Bytes, &bytes).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_nulls() {
        let null = Value::Null(Type::String);
        assert_eq!(read::<Option<String>>(&Type::String, &null).unwrap(), None);
        assert_eq!(read::<Value>(&Type::String, &null).unwrap(), null);
        assert!(matches!(
            read::<String>(&Type::String, &null),
            Err(Error::Data(_))
        ));
        assert_eq!(
            read::<Option<i64>>(&Type::Int64, &Value::Int64(3)).unwrap(),
            Some(3)
        );
    }

    #[cfg(feature = "temporal")]
    #[test]
    fn test_temporal() {
        let date = chrono::NaiveDate::from_ymd_opt(2021, 10, 1).unwrap();
        assert_eq!(
            read::<chrono::NaiveDate>(&Type::Date, &Value::Date(date)).unwrap(),
            date
        );
        assert!(read::<chrono::NaiveDate>(&Type::String, &Value::String("2021-10-01".into())).is_err());
    }
}
