use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use super::build::build_definition;
use super::types::{ApiDefinition, SecurityRequirement, SecurityScheme};

/// Raw Swagger 2.0 document, reduced to what the runtime reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwaggerDocument {
    #[serde(default)]
    pub swagger: Option<String>,
    #[serde(rename = "basePath", default)]
    pub base_path: String,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    /// Shared parameters addressed by `#/parameters/<name>`.
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    /// Schemas addressed by `#/definitions/<name>`.
    #[serde(default)]
    pub definitions: BTreeMap<String, Value>,
    #[serde(default)]
    pub security: Vec<SecurityRequirement>,
    #[serde(rename = "securityDefinitions", default)]
    pub security_definitions: BTreeMap<String, SecurityScheme>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItem {
    #[serde(default)]
    pub parameters: Vec<Value>,
    pub get: Option<OperationDocument>,
    pub put: Option<OperationDocument>,
    pub post: Option<OperationDocument>,
    pub delete: Option<OperationDocument>,
    pub options: Option<OperationDocument>,
    pub head: Option<OperationDocument>,
    pub patch: Option<OperationDocument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationDocument {
    #[serde(rename = "operationId", default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub consumes: Option<Vec<String>>,
    #[serde(default)]
    pub produces: Option<Vec<String>>,
    #[serde(default)]
    pub parameters: Vec<Value>,
    #[serde(default)]
    pub security: Option<Vec<SecurityRequirement>>,
}

fn is_json_path(file_path: &str) -> bool {
    file_path.ends_with(".json")
}

/// Load an API definition from a Swagger 2.0 file (`.yaml`, `.yml` or `.json`).
pub fn load_spec(file_path: &str) -> anyhow::Result<ApiDefinition> {
    let content = std::fs::read_to_string(file_path)
        .with_context(|| format!("Failed to read spec file {file_path}"))?;
    let document: SwaggerDocument = if is_json_path(file_path) {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON spec {file_path}"))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML spec {file_path}"))?
    };
    build_definition(document)
}

/// Load an API definition from an in-memory YAML or JSON document.
pub fn load_spec_from_str(content: &str) -> anyhow::Result<ApiDefinition> {
    // YAML is a superset of JSON, one parser covers both.
    let document: SwaggerDocument =
        serde_yaml::from_str(content).context("Failed to parse spec document")?;
    build_definition(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{CollectionFormat, ParameterLocation};
    use http::Method;
    use std::io::Write;

    const PETSTORE: &str = r##"
swagger: "2.0"
basePath: /api
consumes: [application/json]
produces: [application/json]
parameters:
  limit:
    name: limit
    in: query
    type: integer
    format: int32
    default: 20
definitions:
  Pet:
    type: object
    required: [name]
    properties:
      name: {type: string}
      tag: {$ref: "#/definitions/Tag"}
  Tag:
    type: string
paths:
  /pets:
    get:
      operationId: listPets
      parameters:
        - $ref: "#/parameters/limit"
        - name: tags
          in: query
          type: array
          items: {type: string}
          collectionFormat: multi
    post:
      operationId: createPet
      parameters:
        - name: pet
          in: body
          required: true
          schema: {$ref: "#/definitions/Pet"}
  /pets/{id}:
    parameters:
      - name: id
        in: path
        required: true
        type: integer
        format: int64
    get:
      operationId: getPetById
    delete:
      operationId: deletePet
      security:
        - api_key: []
securityDefinitions:
  api_key:
    type: apiKey
    name: X-API-Key
    in: header
"##;

    #[test]
    fn test_load_from_str() {
        let def = load_spec_from_str(PETSTORE).unwrap();
        assert_eq!(def.base_path, "/api");
        assert_eq!(def.operations.len(), 4);

        let list = def
            .operations
            .iter()
            .find(|o| o.operation_id == "listPets")
            .unwrap();
        assert_eq!(list.method, Method::GET);
        assert_eq!(list.parameters.len(), 2);
        assert_eq!(list.parameters[0].name, "limit");
        assert_eq!(list.parameters[1].collection_format, Some(CollectionFormat::Multi));

        let get = def
            .operations
            .iter()
            .find(|o| o.operation_id == "getPetById")
            .unwrap();
        assert_eq!(get.parameters.len(), 1);
        assert_eq!(get.parameters[0].location, ParameterLocation::Path);

        let create = def
            .operations
            .iter()
            .find(|o| o.operation_id == "createPet")
            .unwrap();
        let schema = create.parameters[0].schema.as_ref().unwrap();
        assert_eq!(schema["properties"]["tag"]["type"], "string");
        assert_eq!(schema["x-ref-name"], "Pet");

        assert!(def.security_definitions.contains_key("api_key"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(PETSTORE.as_bytes()).unwrap();
        let def = load_spec(file.path().to_str().unwrap()).unwrap();
        assert_eq!(def.operations.len(), 4);
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(load_spec("/definitely/not/here.yaml").is_err());
    }
}
