//! Query parameter decoding (§4.2 "Query decode").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::XrpcErrorKind;

/// A single decoded parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<ParamPrimitive>),
}

/// A primitive that may appear inside a [`ParamValue::Array`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamPrimitive {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// The declared scalar type of a parameter, per lexicon schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Datetime,
    Integer,
    Float,
    Boolean,
    Array(ArrayItemType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayItemType {
    String,
    Datetime,
    Integer,
    Float,
    Boolean,
}

/// A decoded parameter map, keyed by declared parameter name. Absent
/// optional keys are omitted entirely, never stored as null (§3 invariant).
pub type Params = BTreeMap<String, ParamValue>;

fn decode_primitive(item_ty: ArrayItemType, raw: &str) -> ParamPrimitive {
    match item_ty {
        ArrayItemType::String | ArrayItemType::Datetime => {
            ParamPrimitive::String(raw.to_string())
        }
        ArrayItemType::Integer => ParamPrimitive::Integer(raw.parse().unwrap_or(0)),
        ArrayItemType::Float => ParamPrimitive::Float(raw.parse().unwrap_or(0.0)),
        ArrayItemType::Boolean => ParamPrimitive::Boolean(raw == "true"),
    }
}

/// Decode a query string (`name=value&name=value...`, no leading `?`) into
/// a [`Params`] map, given the declared schema of `(name, type)` pairs.
///
/// Per §4.2: a declared `array` parameter collects every occurrence of its
/// key (a lone scalar decodes as a one-element array); anything else takes
/// the first occurrence. Keys not present in `schema` are ignored — the
/// lexicon schema is the source of truth for what a query carries.
pub fn decode_query_params(
    query: &str,
    schema: &[(&str, ParamType)],
) -> Result<Params, XrpcErrorKind> {
    let pairs: Vec<(String, String)> = serde_html_form::from_str::<Vec<(String, String)>>(query)
        .map_err(|e| XrpcErrorKind::invalid_request(format!("invalid query string: {e}")))?;

    let mut out = Params::new();
    for (name, ty) in schema {
        let values: Vec<&str> = pairs
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect();
        if values.is_empty() {
            continue;
        }
        let value = match ty {
            ParamType::String | ParamType::Datetime => ParamValue::String(values[0].to_string()),
            ParamType::Integer => ParamValue::Integer(values[0].parse().unwrap_or(0)),
            ParamType::Float => ParamValue::Float(values[0].parse().unwrap_or(0.0)),
            ParamType::Boolean => ParamValue::Boolean(values[0] == "true"),
            ParamType::Array(item_ty) => {
                ParamValue::Array(values.iter().map(|v| decode_primitive(*item_ty, v)).collect())
            }
        };
        out.insert((*name).to_string(), value);
    }
    Ok(out)
}
