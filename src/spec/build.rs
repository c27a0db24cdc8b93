use anyhow::{anyhow, Context};
use http::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::load::{OperationDocument, PathItem, SwaggerDocument};
use super::types::{ApiDefinition, OperationMeta, ParameterDescriptor};

/// Guard against self-referencing definitions.
const MAX_REF_DEPTH: usize = 32;

/// Resolve a `#/definitions/<name>` reference.
#[must_use]
pub fn resolve_schema_ref<'a>(
    definitions: &'a BTreeMap<String, Value>,
    ref_path: &str,
) -> Option<&'a Value> {
    ref_path
        .strip_prefix("#/definitions/")
        .and_then(|name| definitions.get(name))
}

/// Recursively inline `$ref` objects that point into `definitions`.
///
/// Inlined objects carry an `x-ref-name` with the definition name.
pub fn expand_schema_refs(definitions: &BTreeMap<String, Value>, value: &mut Value) {
    expand_at_depth(definitions, value, 0);
}

fn expand_at_depth(definitions: &BTreeMap<String, Value>, value: &mut Value, depth: usize) {
    if depth > MAX_REF_DEPTH {
        return;
    }
    match value {
        Value::Object(obj) => {
            if let Some(ref_path) = obj.get("$ref").and_then(Value::as_str) {
                if let Some(schema) = resolve_schema_ref(definitions, ref_path) {
                    let mut new_val = schema.clone();
                    expand_at_depth(definitions, &mut new_val, depth + 1);
                    if let (Some(name), Value::Object(o)) =
                        (ref_path.strip_prefix("#/definitions/"), &mut new_val)
                    {
                        o.insert("x-ref-name".to_string(), Value::String(name.to_string()));
                    }
                    *value = new_val;
                    return;
                }
            }
            for v in obj.values_mut() {
                expand_at_depth(definitions, v, depth + 1);
            }
        }
        Value::Array(arr) => {
            for v in arr.iter_mut() {
                expand_at_depth(definitions, v, depth + 1);
            }
        }
        _ => {}
    }
}

fn resolve_parameter(document: &SwaggerDocument, raw: &Value) -> anyhow::Result<ParameterDescriptor> {
    let resolved = match raw.get("$ref").and_then(Value::as_str) {
        Some(ref_path) => {
            let name = ref_path
                .strip_prefix("#/parameters/")
                .ok_or_else(|| anyhow!("unsupported parameter reference {ref_path}"))?;
            document
                .parameters
                .get(name)
                .ok_or_else(|| anyhow!("unresolved parameter reference {ref_path}"))?
        }
        None => raw,
    };
    let mut param: ParameterDescriptor = serde_json::from_value(resolved.clone())
        .with_context(|| format!("invalid parameter {resolved}"))?;
    if let Some(schema) = param.schema.as_mut() {
        expand_schema_refs(&document.definitions, schema);
    }
    Ok(param)
}

/// Operation parameters override path-level ones with the same name and location.
fn merge_parameters(
    path_level: &[ParameterDescriptor],
    op_level: Vec<ParameterDescriptor>,
) -> Vec<ParameterDescriptor> {
    let mut merged: Vec<ParameterDescriptor> = path_level
        .iter()
        .filter(|p| {
            !op_level
                .iter()
                .any(|o| o.name == p.name && o.location == p.location)
        })
        .cloned()
        .collect();
    merged.extend(op_level);
    merged
}

fn operations_of(item: &PathItem) -> [(Method, Option<&OperationDocument>); 7] {
    [
        (Method::GET, item.get.as_ref()),
        (Method::PUT, item.put.as_ref()),
        (Method::POST, item.post.as_ref()),
        (Method::DELETE, item.delete.as_ref()),
        (Method::OPTIONS, item.options.as_ref()),
        (Method::HEAD, item.head.as_ref()),
        (Method::PATCH, item.patch.as_ref()),
    ]
}

/// Turn a parsed document into an [`ApiDefinition`].
pub fn build_definition(document: SwaggerDocument) -> anyhow::Result<ApiDefinition> {
    if let Some(version) = &document.swagger {
        if version != "2.0" {
            warn!(version = %version, "Spec declares an unexpected swagger version");
        }
    }

    let mut operations = Vec::new();
    for (path, item) in &document.paths {
        let path_params = item
            .parameters
            .iter()
            .map(|raw| resolve_parameter(&document, raw))
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| format!("parameters of path {path}"))?;

        for (method, op) in operations_of(item) {
            let Some(op) = op else { continue };
            let op_params = op
                .parameters
                .iter()
                .map(|raw| resolve_parameter(&document, raw))
                .collect::<anyhow::Result<Vec<_>>>()
                .with_context(|| format!("parameters of {method} {path}"))?;

            let operation_id = op
                .operation_id
                .clone()
                .unwrap_or_else(|| format!("{} {}", method, path));

            debug!(method = %method, path = %path, operation_id = %operation_id, "Loaded operation");

            operations.push(OperationMeta {
                method,
                path: path.clone(),
                operation_id,
                parameters: merge_parameters(&path_params, op_params),
                consumes: op.consumes.clone(),
                produces: op.produces.clone(),
                security: op.security.clone(),
            });
        }
    }

    Ok(ApiDefinition {
        base_path: document.base_path,
        consumes: document.consumes,
        produces: document.produces,
        operations,
        security: document.security,
        security_definitions: document.security_definitions,
    })
}
