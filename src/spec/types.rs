use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::validator::ValidationIssue;

/// Scheme name -> required scopes. One map is an AND group; a list of maps is an OR.
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterLocation {
    #[serde(rename = "path")]
    Path,
    #[serde(rename = "query")]
    Query,
    #[serde(rename = "header")]
    Header,
    #[serde(rename = "formData")]
    FormData,
    #[serde(rename = "body")]
    Body,
    /// Anything else found in a document. Binding such a parameter fails.
    #[serde(other)]
    Unknown,
}

impl ParameterLocation {
    /// Only query strings and forms can repeat a key.
    #[inline]
    #[must_use]
    pub fn allows_multi(self) -> bool {
        matches!(self, ParameterLocation::Query | ParameterLocation::FormData)
    }
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::FormData => "formData",
            ParameterLocation::Body => "body",
            ParameterLocation::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    File,
    Object,
}

impl std::fmt::Display for SimpleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SimpleType::String => "string",
            SimpleType::Integer => "integer",
            SimpleType::Number => "number",
            SimpleType::Boolean => "boolean",
            SimpleType::Array => "array",
            SimpleType::File => "file",
            SimpleType::Object => "object",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionFormat {
    #[default]
    Csv,
    Ssv,
    Tsv,
    Pipes,
    Multi,
}

impl CollectionFormat {
    /// Delimiter for a single raw value; `None` for `multi`.
    #[inline]
    #[must_use]
    pub fn separator(self) -> Option<char> {
        match self {
            CollectionFormat::Csv => Some(','),
            CollectionFormat::Ssv => Some(' '),
            CollectionFormat::Tsv => Some('\t'),
            CollectionFormat::Pipes => Some('|'),
            CollectionFormat::Multi => None,
        }
    }
}

impl std::fmt::Display for CollectionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CollectionFormat::Csv => "csv",
            CollectionFormat::Ssv => "ssv",
            CollectionFormat::Tsv => "tsv",
            CollectionFormat::Pipes => "pipes",
            CollectionFormat::Multi => "multi",
        };
        f.write_str(s)
    }
}

/// Element description of an array parameter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Items {
    #[serde(rename = "type", default)]
    pub kind: Option<SimpleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Items>>,
    #[serde(rename = "collectionFormat", default, skip_serializing_if = "Option::is_none")]
    pub collection_format: Option<CollectionFormat>,
}

impl Items {
    pub fn new(kind: SimpleType, format: Option<&str>) -> Self {
        Self {
            kind: Some(kind),
            format: format.map(str::to_string),
            items: None,
            collection_format: None,
        }
    }
}

/// One declared operation parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    /// Wire name (query key, header name, path capture, form field).
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SimpleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Items>,
    #[serde(rename = "collectionFormat", default, skip_serializing_if = "Option::is_none")]
    pub collection_format: Option<CollectionFormat>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "allowEmptyValue", default)]
    pub allow_empty_value: bool,
    /// Body schema; selects the decode shape and feeds schema validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Explicit struct field name; defaults to the snake_case wire name.
    #[serde(rename = "x-rust-name", default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ParameterDescriptor {
    pub fn new(name: impl Into<String>, location: ParameterLocation) -> Self {
        Self {
            name: name.into(),
            location,
            kind: None,
            format: None,
            items: None,
            collection_format: None,
            required: false,
            default: None,
            allow_empty_value: false,
            schema: None,
            field: None,
        }
    }

    /// Path parameters are always required.
    pub fn path(name: impl Into<String>) -> Self {
        let mut p = Self::new(name, ParameterLocation::Path);
        p.required = true;
        p
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::new(name, ParameterLocation::Query)
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::new(name, ParameterLocation::Header)
    }

    pub fn form(name: impl Into<String>) -> Self {
        Self::new(name, ParameterLocation::FormData)
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, ParameterLocation::FormData).typed(SimpleType::File, None)
    }

    pub fn body(name: impl Into<String>, schema: Value) -> Self {
        let mut p = Self::new(name, ParameterLocation::Body);
        p.schema = Some(schema);
        p
    }

    #[must_use]
    pub fn typed(mut self, kind: SimpleType, format: Option<&str>) -> Self {
        self.kind = Some(kind);
        self.format = format.map(str::to_string);
        self
    }

    #[must_use]
    pub fn collection_of(mut self, items: Items, format: CollectionFormat) -> Self {
        self.kind = Some(SimpleType::Array);
        self.items = Some(items);
        self.collection_format = Some(format);
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty_value = true;
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Name used when binding into a struct.
    #[must_use]
    pub fn field_name(&self) -> String {
        match &self.field {
            Some(f) => f.clone(),
            None => to_snake_case(&self.name),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == Some(SimpleType::File)
    }

    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.kind == Some(SimpleType::Array)
    }

    /// Type name used in error messages: the format when present, else the type.
    #[must_use]
    pub fn type_label(&self) -> String {
        match (&self.format, self.kind) {
            (Some(f), _) if !f.is_empty() => f.clone(),
            (_, Some(k)) => k.to_string(),
            _ => String::new(),
        }
    }
}

/// Convert `X-Request-Id` / `petId` / `pet_id` into `x_request_id` / `pet_id`.
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if ch.is_ascii_alphanumeric() {
            out.push(ch);
            prev_lower = true;
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Declared operation, before compilation into a route.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationMeta {
    pub method: Method,
    /// Path relative to the base path, with `{name}` placeholders.
    pub path: String,
    pub operation_id: String,
    pub parameters: Vec<ParameterDescriptor>,
    /// Operation-level override of the document `consumes`.
    pub consumes: Option<Vec<String>>,
    pub produces: Option<Vec<String>>,
    pub security: Option<Vec<SecurityRequirement>>,
}

impl OperationMeta {
    pub fn new(method: Method, path: impl Into<String>, operation_id: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            operation_id: operation_id.into(),
            parameters: Vec::new(),
            consumes: None,
            produces: None,
            security: None,
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParameterDescriptor) -> Self {
        self.parameters.push(param);
        self
    }

    #[must_use]
    pub fn consumes<S: Into<String>>(mut self, mimes: impl IntoIterator<Item = S>) -> Self {
        self.consumes = Some(mimes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn produces<S: Into<String>>(mut self, mimes: impl IntoIterator<Item = S>) -> Self {
        self.produces = Some(mimes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn secured(mut self, requirements: Vec<SecurityRequirement>) -> Self {
        self.security = Some(requirements);
        self
    }

    /// Structural checks on the parameter table.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let location = format!("{} {}", self.method, self.path);
        let mut issues = Vec::new();

        let bodies = self
            .parameters
            .iter()
            .filter(|p| p.location == ParameterLocation::Body)
            .count();
        if bodies > 1 {
            issues.push(ValidationIssue::new(
                &location,
                "MultipleBodyParameters",
                format!("{bodies} body parameters declared, at most one is allowed"),
            ));
        }

        for p in &self.parameters {
            if p.collection_format.is_some()
                && (p.location == ParameterLocation::Body || p.is_file())
            {
                issues.push(ValidationIssue::new(
                    &location,
                    "IgnoredCollectionFormat",
                    format!("collectionFormat on {} parameter {:?} is ignored", p.location, p.name),
                ));
            }
            if p.location == ParameterLocation::Path && !self.path.contains(&format!("{{{}}}", p.name)) {
                issues.push(ValidationIssue::new(
                    &location,
                    "UnknownPathParameter",
                    format!("path parameter {:?} does not appear in the path", p.name),
                ));
            }
        }
        issues
    }
}

/// Security scheme as declared in `securityDefinitions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Everything the router needs to know about an API.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiDefinition {
    pub base_path: String,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub operations: Vec<OperationMeta>,
    pub security: Vec<SecurityRequirement>,
    pub security_definitions: BTreeMap<String, SecurityScheme>,
}

impl ApiDefinition {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn consumes<S: Into<String>>(mut self, mimes: impl IntoIterator<Item = S>) -> Self {
        self.consumes = mimes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn produces<S: Into<String>>(mut self, mimes: impl IntoIterator<Item = S>) -> Self {
        self.produces = mimes.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn operation(mut self, op: OperationMeta) -> Self {
        self.operations.push(op);
        self
    }

    #[must_use]
    pub fn secured(mut self, requirements: Vec<SecurityRequirement>) -> Self {
        self.security = requirements;
        self
    }

    #[must_use]
    pub fn security_definition(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.security_definitions.insert(name.into(), scheme);
        self
    }

    /// Issues across every operation.
    #[must_use]
    pub fn validate(&self) -> Vec<ValidationIssue> {
        self.operations.iter().flat_map(OperationMeta::validate).collect()
    }
}
