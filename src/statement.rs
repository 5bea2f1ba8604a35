use std::collections::BTreeMap;

use google_api_proto::google::spanner::v1 as proto;

use crate::params::param_types;
use crate::{Param, Type};

/// A single SQL invocation in Cloud Spanner's `@name` parameter style, ready to be sent to the server.
///
/// This is the output of [`crate::rewrite`]: the keys of `param_types` are always a subset of the keys
/// of `params`, values of unknown type are left for the server to infer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: BTreeMap<String, Param>,
    pub param_types: BTreeMap<String, Type>,
}

impl Statement {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Default::default()
        }
    }

    /// A statement with the provided parameters, deriving their types.
    pub fn with_params(sql: impl Into<String>, params: BTreeMap<String, Param>) -> Self {
        let param_types = param_types(&params);
        Self {
            sql: sql.into(),
            params,
            param_types,
        }
    }

    pub(crate) fn proto_params(&self) -> Option<prost_types::Struct> {
        if self.params.is_empty() {
            None
        } else {
            Some(prost_types::Struct {
                fields: self
                    .params
                    .iter()
                    .map(|(name, value)| (name.clone(), value.into()))
                    .collect(),
            })
        }
    }

    pub(crate) fn proto_param_types(&self) -> BTreeMap<String, proto::Type> {
        self.param_types
            .iter()
            .map(|(name, tpe)| (name.clone(), tpe.into()))
            .collect()
    }
}
