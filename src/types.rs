use google_api_proto::google::spanner::v1 as proto;

use std::convert::TryFrom;

/// The Cloud Spanner [`Struct`](https://cloud.google.com/spanner/docs/data-types#struct_type) type which is composed of optionally named fields and their data type.
///
/// This is also the shape of a result set row, as reported in the metadata of a streaming result set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructType(Vec<(Option<String>, Type)>);

impl StructType {
    /// Creates a new `StructType` with the provided fields.
    ///
    /// Note that Cloud Spanner allows "unnamed" fields. If a provided field name is the empty string,
    /// it will be converted to a `None` in the resulting `StructType`.
    pub fn new(fields: Vec<(&str, Type)>) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(name, tpe)| {
                    let field_name = if !name.is_empty() {
                        Some(name.to_string())
                    } else {
                        None
                    };
                    (field_name, tpe)
                })
                .collect(),
        )
    }

    /// Returns a reference to this struct's fields.
    pub fn fields(&self) -> &Vec<(Option<String>, Type)> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the index of the provided field name.
    /// Returns `None` if no field matches the provided name.
    /// Note that this function ignores unnamed fields.
    pub fn field_index(&self, field_name: &str) -> Option<usize> {
        self.0.iter().position(|(name, _)| match name {
            Some(col) => *col == field_name,
            None => false,
        })
    }
}

impl TryFrom<&proto::StructType> for StructType {
    type Error = crate::Error;

    fn try_from(value: &proto::StructType) -> Result<Self, Self::Error> {
        value
            .fields
            .iter()
            .map(|field| {
                field
                    .r#type
                    .as_ref()
                    .ok_or_else(|| {
                        Self::Error::Codec(format!("field '{}' is missing type", field.name))
                    })
                    .and_then(Type::try_from)
                    .map(|tpe| {
                        let name = if field.name.is_empty() {
                            None
                        } else {
                            Some(field.name.clone())
                        };
                        (name, tpe)
                    })
            })
            .collect::<Result<Vec<(Option<String>, Type)>, Self::Error>>()
            .map(StructType)
    }
}

/// The type codes reported by Cloud Spanner, as exposed in a cursor's `description`.
///
/// These compare against the DB-API type objects, see [`crate::STRING`] and friends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Unspecified,
    Bool,
    Int64,
    Float64,
    Timestamp,
    Date,
    String,
    Bytes,
    Array,
    Struct,
    Numeric,
    Json,
}

impl TypeCode {
    pub fn name(&self) -> &'static str {
        match self {
            TypeCode::Unspecified => "TYPE_CODE_UNSPECIFIED",
            TypeCode::Bool => "BOOL",
            TypeCode::Int64 => "INT64",
            TypeCode::Float64 => "FLOAT64",
            TypeCode::Timestamp => "TIMESTAMP",
            TypeCode::Date => "DATE",
            TypeCode::String => "STRING",
            TypeCode::Bytes => "BYTES",
            TypeCode::Array => "ARRAY",
            TypeCode::Struct => "STRUCT",
            TypeCode::Numeric => "NUMERIC",
            TypeCode::Json => "JSON",
        }
    }

    /// The display size of fixed-width types, as used in a cursor's `description`.
    pub fn display_size(&self) -> Option<usize> {
        match self {
            TypeCode::Bool => Some(1),
            TypeCode::Date => Some(4),
            TypeCode::Float64 | TypeCode::Int64 => Some(8),
            TypeCode::Timestamp => Some(12),
            _ => None,
        }
    }
}

impl From<TypeCode> for proto::TypeCode {
    fn from(value: TypeCode) -> Self {
        match value {
            TypeCode::Unspecified => proto::TypeCode::Unspecified,
            TypeCode::Bool => proto::TypeCode::Bool,
            TypeCode::Int64 => proto::TypeCode::Int64,
            TypeCode::Float64 => proto::TypeCode::Float64,
            TypeCode::Timestamp => proto::TypeCode::Timestamp,
            TypeCode::Date => proto::TypeCode::Date,
            TypeCode::String => proto::TypeCode::String,
            TypeCode::Bytes => proto::TypeCode::Bytes,
            TypeCode::Array => proto::TypeCode::Array,
            TypeCode::Struct => proto::TypeCode::Struct,
            TypeCode::Numeric => proto::TypeCode::Numeric,
            TypeCode::Json => proto::TypeCode::Json,
        }
    }
}

/// An enumeration of all Cloud Spanner [data types](https://cloud.google.com/spanner/docs/data-types).
///
/// Refer to the Cloud Spanner documentation for detailed information about individual data types.
#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    /// The [`BOOL`](https://cloud.google.com/spanner/docs/data-types#boolean_type) data type.
    ///
    /// * Storage size: 1 byte
    Bool,

    /// The [`INT64`](https://cloud.google.com/spanner/docs/data-types#integer_type) data type.
    ///
    /// * Storage size: 8 bytes
    Int64,

    /// The [`FLOAT64`](https://cloud.google.com/spanner/docs/data-types#floating_point_types) data type.
    ///
    /// Supports the special `NaN`, `+inf` and `-inf` values.
    Float64,

    /// The [`STRING`](https://cloud.google.com/spanner/docs/data-types#string_type) data type.
    String,

    /// The [`BYTES`](https://cloud.google.com/spanner/docs/data-types#bytes_type) data type.
    Bytes,

    /// The [`JSON`](https://cloud.google.com/spanner/docs/data-types#json_type) data type.
    #[cfg(feature = "json")]
    Json,

    /// The [`NUMERIC`](https://cloud.google.com/spanner/docs/data-types#numeric_type) data type.
    #[cfg(feature = "numeric")]
    Numeric,

    /// The [`TIMESTAMP`](https://cloud.google.com/spanner/docs/data-types#timestamp_type) data type.
    Timestamp,

    /// The [`DATE`](https://cloud.google.com/spanner/docs/data-types#date_type) data type.
    ///
    /// * Canonical format: `YYYY-[M]M-[D]D`
    Date,

    /// The [`ARRAY`](https://cloud.google.com/spanner/docs/data-types#array_type) data type.
    Array(
        /// The array's element type.
        Box<Type>,
    ),

    /// The [`STRUCT`](https://cloud.google.com/spanner/docs/data-types#struct_type) data type.
    Struct(StructType),
}

impl Type {
    /// Creates a new `Type::Array` with elements of the specified type.
    pub fn array(inner: Type) -> Self {
        Type::Array(Box::new(inner))
    }

    /// Creates a new `Type::Struct` with the provided field names and types.
    pub fn strct(fields: Vec<(&str, Type)>) -> Self {
        Type::Struct(StructType::new(fields))
    }

    pub fn code(&self) -> TypeCode {
        match self {
            Type::Bool => TypeCode::Bool,
            Type::Int64 => TypeCode::Int64,
            Type::Float64 => TypeCode::Float64,
            Type::String => TypeCode::String,
            Type::Bytes => TypeCode::Bytes,
            #[cfg(feature = "json")]
            Type::Json => TypeCode::Json,
            #[cfg(feature = "numeric")]
            Type::Numeric => TypeCode::Numeric,
            Type::Timestamp => TypeCode::Timestamp,
            Type::Date => TypeCode::Date,
            Type::Array(_) => TypeCode::Array,
            Type::Struct(_) => TypeCode::Struct,
        }
    }
}

impl TryFrom<&proto::Type> for Type {
    type Error = crate::Error;

    fn try_from(value: &proto::Type) -> Result<Self, Self::Error> {
        match proto::TypeCode::from_i32(value.code) {
            Some(proto::TypeCode::Bool) => Ok(Type::Bool),
            Some(proto::TypeCode::Int64) => Ok(Type::Int64),
            Some(proto::TypeCode::Float64) => Ok(Type::Float64),
            Some(proto::TypeCode::String) => Ok(Type::String),
            Some(proto::TypeCode::Bytes) => Ok(Type::Bytes),
            Some(proto::TypeCode::Timestamp) => Ok(Type::Timestamp),
            Some(proto::TypeCode::Date) => Ok(Type::Date),
            #[cfg(feature = "json")]
            Some(proto::TypeCode::Json) => Ok(Type::Json),
            #[cfg(not(feature = "json"))]
            Some(proto::TypeCode::Json) => Err(Self::Error::Codec(
                "JSON type support is not enabled; use the 'json' feature to enable it"
                    .to_string(),
            )),
            #[cfg(feature = "numeric")]
            Some(proto::TypeCode::Numeric) => Ok(Type::Numeric),
            #[cfg(not(feature = "numeric"))]
            Some(proto::TypeCode::Numeric) => Err(Self::Error::Codec(
                "NUMERIC type support is not enabled; use the 'numeric' feature to enable it"
                    .to_string(),
            )),
            Some(proto::TypeCode::Array) => value
                .array_element_type
                .as_ref()
                .ok_or_else(|| Self::Error::Codec("missing array element type".to_string()))
                .and_then(|tpe| Type::try_from(tpe.as_ref()))
                .map(|tpe| Type::Array(Box::new(tpe))),
            Some(proto::TypeCode::Struct) => value
                .struct_type
                .as_ref()
                .ok_or_else(|| Self::Error::Codec("missing struct type definition".to_string()))
                .and_then(StructType::try_from)
                .map(Type::Struct),
            Some(other) => Err(Self::Error::Codec(format!("unsupported type {:?}", other))),
            None => Err(Self::Error::Codec(format!(
                "unknown type code {}",
                value.code
            ))),
        }
    }
}

impl From<&Type> for proto::Type {
    fn from(value: &Type) -> Self {
        let code = proto::TypeCode::from(value.code()) as i32;
        match value {
            Type::Array(inner) => proto::Type {
                code,
                array_element_type: Some(Box::new(inner.as_ref().into())),
                ..Default::default()
            },
            Type::Struct(StructType(fields)) => proto::Type {
                code,
                struct_type: Some(proto::StructType {
                    fields: fields
                        .iter()
                        .map(|(name, tpe)| proto::struct_type::Field {
                            name: name.clone().unwrap_or_default(),
                            r#type: Some(tpe.into()),
                        })
                        .collect(),
                }),
                ..Default::default()
            },
            _ => proto::Type {
                code,
                ..Default::default()
            },
        }
    }
}
