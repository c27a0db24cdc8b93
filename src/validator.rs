//! # Validation
//!
//! Two kinds of checks live here:
//!
//! - [`ValidationIssue`]: structural problems found in an API definition at startup
//!   (reported by [`ApiDefinition::validate`](crate::spec::ApiDefinition::validate)).
//! - [`RequestValidator`]: the per-request seam run after binding. [`SchemaValidator`]
//!   is the stock implementation; it checks body parameters against their JSON
//!   schemas, compiled once with `jsonschema` when the validator is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::binder::BoundParams;
use crate::errors::ApiError;
use crate::router::RouteEntry;
use crate::spec::{ApiDefinition, ParameterLocation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// `METHOD /path` of the offending operation.
    pub location: String,
    pub kind: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(location: impl Into<String>, kind: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            location: location.into(),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.location, self.message)
    }
}

/// Checks bound parameters before the handler runs.
pub trait RequestValidator: Send + Sync {
    /// # Errors
    ///
    /// An [`ApiError`] (usually [`ApiError::Validation`] or a composite of them).
    fn validate(&self, route: &RouteEntry, params: &BoundParams) -> Result<(), ApiError>;
}

/// Body schema validation.
///
/// Keyed by `(operation_id, parameter name)`. Operations without a body schema, and
/// requests without a bound body, pass.
pub struct SchemaValidator {
    schemas: HashMap<(String, String), Arc<jsonschema::Validator>>,
}

impl SchemaValidator {
    /// Compile the body schema of every operation.
    ///
    /// # Errors
    ///
    /// Fails on the first schema `jsonschema` cannot compile.
    pub fn new(definition: &ApiDefinition) -> anyhow::Result<Self> {
        let mut schemas = HashMap::new();
        for op in &definition.operations {
            for param in &op.parameters {
                if param.location != ParameterLocation::Body {
                    continue;
                }
                let Some(schema) = &param.schema else {
                    continue;
                };
                let compiled = jsonschema::validator_for(schema).map_err(|e| {
                    anyhow::anyhow!(
                        "invalid schema for body {:?} of {}: {e}",
                        param.name,
                        op.operation_id
                    )
                })?;
                schemas.insert(
                    (op.operation_id.clone(), param.name.clone()),
                    Arc::new(compiled),
                );
            }
        }
        debug!(schemas = schemas.len(), "Compiled body schemas");
        Ok(Self { schemas })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl RequestValidator for SchemaValidator {
    fn validate(&self, route: &RouteEntry, params: &BoundParams) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        for param in &route.parameters {
            if param.location != ParameterLocation::Body {
                continue;
            }
            let key = (route.operation_id.clone(), param.name.clone());
            let (Some(schema), Some(value)) = (self.schemas.get(&key), params.get(&param.name)) else {
                continue;
            };
            let instance = value.to_json();
            errors.extend(schema.iter_errors(&instance).map(|e| ApiError::Validation {
                name: param.name.clone(),
                location: ParameterLocation::Body.to_string(),
                message: e.to_string(),
            }));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            debug!(operation_id = %route.operation_id, errors = errors.len(), "Body failed schema validation");
            Err(ApiError::composite(errors))
        }
    }
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.schemas.keys().map(|(op, p)| format!("{op}.{p}")).collect();
        keys.sort();
        f.debug_struct("SchemaValidator").field("schemas", &keys).finish()
    }
}
