use crate::{DateStr, Param, TimestampStr};

/// Conversion of native values into bound statement parameters.
pub trait ToSpanner {
    fn to_spanner(&self) -> Param;
}

macro_rules! simple_to {
    ($t:ty, $v:ident, $self:ident, $into:expr) => {
        impl ToSpanner for $t {
            fn to_spanner(&self) -> Param {
                let $self = self;
                Param::$v($into)
            }
        }
    };
    ($t:ty, i64_from) => {
        simple_to!($t, Int64, v, i64::from(*v));
    };
    ($t:ty, $v:ident, clone) => {
        simple_to!($t, $v, v, v.clone());
    };
}

impl<T> ToSpanner for Option<T>
where
    T: ToSpanner,
{
    fn to_spanner(&self) -> Param {
        match self.as_ref() {
            Some(v) => v.to_spanner(),
            None => Param::Null,
        }
    }
}

impl<T> ToSpanner for &T
where
    T: ToSpanner + ?Sized,
{
    fn to_spanner(&self) -> Param {
        (*self).to_spanner()
    }
}

impl<T> ToSpanner for Vec<T>
where
    T: ToSpanner,
{
    fn to_spanner(&self) -> Param {
        Param::Array(self.iter().map(ToSpanner::to_spanner).collect())
    }
}

impl ToSpanner for Param {
    fn to_spanner(&self) -> Param {
        self.clone()
    }
}

simple_to!(i8, i64_from);
simple_to!(u8, i64_from);
simple_to!(i16, i64_from);
simple_to!(u16, i64_from);
simple_to!(i32, i64_from);
simple_to!(u32, i64_from);
simple_to!(i64, i64_from);
simple_to!(bool, Bool, v, *v);
simple_to!(f32, Float64, v, f64::from(*v));
simple_to!(f64, Float64, v, *v);
simple_to!(String, String, clone);
simple_to!(str, String, v, v.to_string());
simple_to!([u8], Bytes, v, v.to_vec());
simple_to!(DateStr, DateStr, clone);
simple_to!(TimestampStr, TimestampStr, clone);

#[cfg(feature = "numeric")]
simple_to!(bigdecimal::BigDecimal, Numeric, clone);
#[cfg(feature = "temporal")]
simple_to!(chrono::NaiveDate, Date, clone);
#[cfg(feature = "temporal")]
simple_to!(chrono::DateTime<chrono::Utc>, Timestamp, clone);
#[cfg(feature = "json")]
simple_to!(serde_json::Value, Json, clone);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_to_spanner() {
        assert_eq!(42_u32.to_spanner(), Param::Int64(42));
        assert_eq!("x".to_spanner(), Param::String("x".to_string()));
        assert_eq!(Some(true).to_spanner(), Param::Bool(true));
        assert_eq!(None::<i64>.to_spanner(), Param::Null);
        assert_eq!(
            b"ab".as_slice().to_spanner(),
            Param::Bytes(vec![b'a', b'b'])
        );
        assert_eq!(
            DateStr("2020-01-01".to_string()).to_spanner(),
            Param::DateStr(DateStr("2020-01-01".to_string()))
        );
        assert_eq!(
            vec![1, 2].to_spanner(),
            Param::Array(vec![Param::Int64(1), Param::Int64(2)])
        );
    }
}
