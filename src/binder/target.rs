use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::coerce::ParamValue;
use crate::errors::ApiError;
use crate::spec::ParameterDescriptor;

/// A destination the binder can assign parameters into by name.
pub trait BindTarget {
    fn set(&mut self, param: &ParameterDescriptor, value: ParamValue);
}

/// Bound parameters keyed by wire name, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundParams {
    entries: Vec<(String, ParamValue)>,
}

impl BoundParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for `name`.
    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// JSON object keyed by wire name.
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Re-key by struct field name and deserialize into `T`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Codec`] when the bound values do not fit `T`.
    pub fn to_struct<T: DeserializeOwned>(&self, params: &[ParameterDescriptor]) -> Result<T, ApiError> {
        let mut target = StructTarget::new();
        for param in params {
            if let Some(value) = self.get(&param.name) {
                target.set(param, value.clone());
            }
        }
        target.finish()
    }
}

impl BindTarget for BoundParams {
    fn set(&mut self, param: &ParameterDescriptor, value: ParamValue) {
        self.insert(param.name.clone(), value);
    }
}

/// Struct destination: values are keyed by field name and deserialized at the end.
///
/// Field names come from `x-rust-name` or the snake_case form of the wire name.
#[derive(Debug, Clone, Default)]
pub struct StructTarget {
    fields: Map<String, Value>,
}

impl StructTarget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Deserialize the collected fields into `T`.
    ///
    /// # Errors
    ///
    /// [`ApiError::Codec`] naming the serde failure.
    pub fn finish<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        serde_json::from_value(Value::Object(self.fields)).map_err(|e| ApiError::Codec {
            name: "request".to_string(),
            message: e.to_string(),
        })
    }
}

impl BindTarget for StructTarget {
    fn set(&mut self, param: &ParameterDescriptor, value: ParamValue) {
        self.fields.insert(param.field_name(), value.to_json());
    }
}
