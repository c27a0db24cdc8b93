//! # Value Coercion
//!
//! Turns the raw strings found in a request (path captures, query values, header
//! values, form fields) into typed [`ParamValue`]s, driven by a parameter's declared
//! `type` and `format`.
//!
//! ## Scalars
//!
//! | type / format | Result |
//! |---------------|--------|
//! | `integer` / `int32` | [`ParamValue::Int32`] |
//! | `integer` / `int64` or none | [`ParamValue::Int64`] |
//! | `number` / `float` | [`ParamValue::Float`] |
//! | `number` / `double` or none | [`ParamValue::Double`] |
//! | `boolean` | [`ParamValue::Bool`] (see [`parse_bool`]) |
//! | `string` / `date` | [`ParamValue::Date`] (`YYYY-MM-DD`) |
//! | `string` / `date-time` | [`ParamValue::DateTime`] (RFC 3339) |
//! | `string` / `byte` | [`ParamValue::Bytes`] (base64, standard then URL-safe) |
//! | `string` / `binary` | [`ParamValue::Bytes`] (raw) |
//! | anything else | [`ParamValue::String`] |
//!
//! ## Arrays
//!
//! `multi` takes every raw value under the key and is only legal in query and form
//! data. Every other collection format splits the last raw value on its delimiter;
//! entries are trimmed and empty entries dropped. Nested `items` split each element
//! again with their own collection format.
//!
//! A failed conversion is always an [`ApiError::InvalidType`] naming the parameter,
//! the expected type and the offending string. Values are never silently defaulted.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

use crate::binder::FileUpload;
use crate::errors::ApiError;
use crate::spec::{CollectionFormat, Items, ParameterDescriptor, SimpleType};

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
    Array(Vec<ParamValue>),
    /// A decoded body or a default that has no closer scalar form.
    Json(Value),
    File(FileUpload),
}

impl ParamValue {
    /// JSON form used for struct binding and debugging.
    ///
    /// Bytes become a standard base64 string; files become an object with their
    /// header fields and base64 content.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int32(i) => Value::from(*i),
            ParamValue::Int64(i) => Value::from(*i),
            ParamValue::Float(f) => Number::from_f64(f64::from(*f)).map_or(Value::Null, Value::Number),
            ParamValue::Double(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            ParamValue::String(s) => Value::String(s.clone()),
            ParamValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            ParamValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            ParamValue::Bytes(b) => Value::String(STANDARD.encode(b)),
            ParamValue::Array(items) => Value::Array(items.iter().map(ParamValue::to_json).collect()),
            ParamValue::Json(v) => v.clone(),
            ParamValue::File(f) => f.to_json(),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value, widening `Int32`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int32(i) => Some(i64::from(*i)),
            ParamValue::Int64(i) => Some(*i),
            ParamValue::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(f64::from(*f)),
            ParamValue::Double(f) => Some(*f),
            ParamValue::Int32(i) => Some(f64::from(*i)),
            ParamValue::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ParamValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[ParamValue]> {
        match self {
            ParamValue::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_file(&self) -> Option<&FileUpload> {
        match self {
            ParamValue::File(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ParamValue::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::String(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::String(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int64(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Lenient boolean parsing.
///
/// True: `true 1 yes y on t ok enabled selected checked`.
/// False: `false 0 no n off f disabled`. Case-insensitive, surrounding whitespace
/// ignored.
#[must_use]
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" | "t" | "ok" | "enabled" | "selected" | "checked" => {
            Some(true)
        }
        "false" | "0" | "no" | "n" | "off" | "f" | "disabled" => Some(false),
        _ => None,
    }
}

/// Decode base64 in any of the standard or URL-safe alphabets, padded or not.
pub fn decode_base64(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let trimmed = raw.trim();
    STANDARD
        .decode(trimmed)
        .or_else(|_| URL_SAFE.decode(trimmed))
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .or_else(|_| URL_SAFE_NO_PAD.decode(trimmed))
}

/// Split one raw value by a non-`multi` collection format.
#[must_use]
pub fn split_collection(format: CollectionFormat, raw: &str) -> Vec<String> {
    let Some(sep) = format.separator() else {
        return vec![raw.to_string()];
    };
    raw.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Type name reported in errors for a type/format pair.
fn label(kind: Option<SimpleType>, format: Option<&str>) -> String {
    match (format, kind) {
        (Some(f), _) if !f.is_empty() => f.to_string(),
        (_, Some(k)) => k.to_string(),
        _ => "string".to_string(),
    }
}

/// Convert one raw string; `Err` carries the expected type label.
pub fn coerce_scalar(
    kind: Option<SimpleType>,
    format: Option<&str>,
    raw: &str,
) -> Result<ParamValue, String> {
    let fail = || label(kind, format);
    match kind {
        Some(SimpleType::Integer) => match format {
            Some("int32") => raw.trim().parse().map(ParamValue::Int32).map_err(|_| fail()),
            _ => raw.trim().parse().map(ParamValue::Int64).map_err(|_| fail()),
        },
        Some(SimpleType::Number) => match format {
            Some("float") => raw.trim().parse().map(ParamValue::Float).map_err(|_| fail()),
            _ => raw.trim().parse().map(ParamValue::Double).map_err(|_| fail()),
        },
        Some(SimpleType::Boolean) => parse_bool(raw).map(ParamValue::Bool).ok_or_else(fail),
        Some(SimpleType::String) | None => match format {
            Some("date") => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(ParamValue::Date)
                .map_err(|_| fail()),
            Some("date-time") => DateTime::parse_from_rfc3339(raw.trim())
                .map(ParamValue::DateTime)
                .map_err(|_| fail()),
            Some("byte") => decode_base64(raw).map(ParamValue::Bytes).map_err(|_| fail()),
            Some("binary") => Ok(ParamValue::Bytes(raw.as_bytes().to_vec())),
            _ => Ok(ParamValue::String(raw.to_string())),
        },
        Some(SimpleType::Object) => serde_json::from_str(raw)
            .map(ParamValue::Json)
            .map_err(|_| fail()),
        Some(SimpleType::Array | SimpleType::File) => Ok(ParamValue::String(raw.to_string())),
    }
}

/// Coerce one array element, recursing into nested item declarations.
fn coerce_item(items: &Items, raw: &str) -> Result<ParamValue, String> {
    match (items.kind, items.items.as_deref()) {
        (Some(SimpleType::Array), Some(inner)) => {
            let format = items.collection_format.unwrap_or_default();
            split_collection(format, raw)
                .iter()
                .map(|part| coerce_item(inner, part))
                .collect::<Result<Vec<_>, _>>()
                .map(ParamValue::Array)
        }
        (kind, _) => coerce_scalar(kind, items.format.as_deref(), raw),
    }
}

/// Turn a JSON default into a value of the declared type.
///
/// String defaults go through scalar coercion so `date`, `byte` and similar formats
/// come out typed; anything that does not fit is kept as JSON.
#[must_use]
pub fn coerce_default(
    kind: Option<SimpleType>,
    format: Option<&str>,
    items: Option<&Items>,
    value: &Value,
) -> ParamValue {
    match (kind, value) {
        (_, Value::Null) => ParamValue::Null,
        (Some(SimpleType::Array), Value::Array(elems)) => ParamValue::Array(
            elems
                .iter()
                .map(|e| match items {
                    Some(i) => coerce_default(i.kind, i.format.as_deref(), i.items.as_deref(), e),
                    None => ParamValue::Json(e.clone()),
                })
                .collect(),
        ),
        (Some(SimpleType::Array), Value::String(s)) => {
            let parts = split_collection(CollectionFormat::Csv, s);
            let elems: Vec<Value> = parts.into_iter().map(Value::String).collect();
            coerce_default(kind, format, items, &Value::Array(elems))
        }
        (Some(SimpleType::Integer), Value::Number(n)) => match (format, n.as_i64()) {
            (Some("int32"), Some(i)) => i32::try_from(i).map_or(ParamValue::Int64(i), ParamValue::Int32),
            (_, Some(i)) => ParamValue::Int64(i),
            _ => ParamValue::Json(value.clone()),
        },
        (Some(SimpleType::Number), Value::Number(n)) => match (format, n.as_f64()) {
            #[allow(clippy::cast_possible_truncation)]
            (Some("float"), Some(f)) => ParamValue::Float(f as f32),
            (_, Some(f)) => ParamValue::Double(f),
            _ => ParamValue::Json(value.clone()),
        },
        (_, Value::Bool(b)) => ParamValue::Bool(*b),
        (_, Value::String(s)) => {
            coerce_scalar(kind, format, s).unwrap_or_else(|_| ParamValue::String(s.clone()))
        }
        _ => ParamValue::Json(value.clone()),
    }
}

fn param_default(param: &ParameterDescriptor) -> Option<ParamValue> {
    param.default.as_ref().map(|d| {
        coerce_default(
            param.kind,
            param.format.as_deref(),
            param.items.as_ref(),
            d,
        )
    })
}

fn invalid_type(param: &ParameterDescriptor, expected: String, raw: &str) -> ApiError {
    ApiError::InvalidType {
        name: param.name.clone(),
        location: param.location.to_string(),
        expected,
        value: raw.to_string(),
    }
}

fn required(param: &ParameterDescriptor) -> ApiError {
    ApiError::Required {
        name: param.name.clone(),
        location: param.location.to_string(),
    }
}

/// Coerce the raw values found for a non-body, non-file parameter.
///
/// `values` is `None` when the key was absent from its source. Returns `Ok(None)`
/// when nothing should be bound (absent or empty, optional, no default).
///
/// # Errors
///
/// - [`ApiError::Required`] for a required parameter without default that is absent,
///   or empty while `allowEmptyValue` is off
/// - [`ApiError::InvalidCollectionFormat`] for `multi` outside query and form data
/// - [`ApiError::InvalidType`] when a value does not convert
pub fn coerce_param(
    param: &ParameterDescriptor,
    values: Option<&[String]>,
) -> Result<Option<ParamValue>, ApiError> {
    let has_key = values.is_some();
    let last = values.and_then(<[String]>::last).map_or("", String::as_str);

    if param.is_array() {
        return coerce_array(param, values, has_key, last);
    }

    if (!has_key || (!param.allow_empty_value && last.is_empty()))
        && param.required
        && param.default.is_none()
    {
        return Err(required(param));
    }

    if last.is_empty() {
        if let Some(default) = param_default(param) {
            return Ok(Some(default));
        }
        if has_key && param.allow_empty_value && matches!(param.kind, Some(SimpleType::String) | None) {
            return Ok(Some(ParamValue::String(String::new())));
        }
        return Ok(None);
    }

    coerce_scalar(param.kind, param.format.as_deref(), last)
        .map(Some)
        .map_err(|expected| invalid_type(param, expected, last))
}

fn coerce_array(
    param: &ParameterDescriptor,
    values: Option<&[String]>,
    has_key: bool,
    last: &str,
) -> Result<Option<ParamValue>, ApiError> {
    let format = param.collection_format.unwrap_or_default();
    let parts: Vec<String> = if format == CollectionFormat::Multi {
        if !param.location.allows_multi() {
            return Err(ApiError::InvalidCollectionFormat {
                name: param.name.clone(),
                location: param.location.to_string(),
                format: format.to_string(),
            });
        }
        values
            .unwrap_or_default()
            .iter()
            .filter(|v| !v.is_empty())
            .cloned()
            .collect()
    } else {
        split_collection(format, last)
    };

    if parts.is_empty() {
        if (!has_key || !param.allow_empty_value) && param.required && param.default.is_none() {
            return Err(required(param));
        }
        if let Some(default) = param_default(param) {
            return Ok(Some(default));
        }
        if has_key && param.allow_empty_value {
            return Ok(Some(ParamValue::Array(Vec::new())));
        }
        return Ok(None);
    }

    let elements = match &param.items {
        Some(items) => parts
            .iter()
            .map(|part| coerce_item(items, part).map_err(|expected| invalid_type(param, expected, part)))
            .collect::<Result<Vec<_>, _>>()?,
        None => parts.into_iter().map(ParamValue::String).collect(),
    };
    Ok(Some(ParamValue::Array(elements)))
}
