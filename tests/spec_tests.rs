mod common;

use brrtrouter_runtime::load_spec;
use brrtrouter_runtime::spec::{ParameterLocation, SimpleType};
use common::petstore::PETSTORE_YAML;
use common::temp_files::{cleanup_temp_files, create_temp_json, create_temp_yaml};
use http::Method;

#[test]
fn test_load_yaml_file() {
    let path = create_temp_yaml(PETSTORE_YAML);
    let definition = load_spec(path.to_str().unwrap()).unwrap();
    cleanup_temp_files(&[path]);

    assert_eq!(definition.base_path, "/api");
    assert_eq!(definition.operations.len(), 6);
    assert_eq!(definition.security_definitions["apiKey"].name.as_deref(), Some("X-API-Key"));

    let list = definition
        .operations
        .iter()
        .find(|op| op.operation_id == "listPets")
        .unwrap();
    let limit = &list.parameters[0];
    assert_eq!(limit.name, "limit");
    assert_eq!(limit.kind, Some(SimpleType::Integer));
    assert_eq!(limit.default, Some(serde_json::json!(20)));
}

#[test]
fn test_path_level_parameters_are_merged() {
    let path = create_temp_yaml(PETSTORE_YAML);
    let definition = load_spec(path.to_str().unwrap()).unwrap();
    cleanup_temp_files(&[path]);

    for id in ["getPet", "deletePet"] {
        let op = definition
            .operations
            .iter()
            .find(|op| op.operation_id == id)
            .unwrap();
        assert_eq!(op.parameters.len(), 1, "{id}");
        assert_eq!(op.parameters[0].location, ParameterLocation::Path);
        assert_eq!(op.parameters[0].format.as_deref(), Some("int64"));
    }
}

#[test]
fn test_body_schema_refs_are_expanded() {
    let path = create_temp_yaml(PETSTORE_YAML);
    let definition = load_spec(path.to_str().unwrap()).unwrap();
    cleanup_temp_files(&[path]);

    let add = definition
        .operations
        .iter()
        .find(|op| op.operation_id == "addPet")
        .unwrap();
    let schema = add.parameters[0].schema.as_ref().unwrap();
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["x-ref-name"], "Pet");
    assert_eq!(schema["required"][0], "name");
}

#[test]
fn test_load_json_file_and_default_operation_id() {
    let spec = r#"{
        "swagger": "2.0",
        "basePath": "/v1",
        "paths": {
            "/health": {
                "get": {}
            },
            "/items/{itemId}": {
                "put": {
                    "operationId": "updateItem",
                    "consumes": ["application/xml"],
                    "parameters": [
                        {"name": "itemId", "in": "path", "required": true, "type": "string"},
                        {"name": "item", "in": "body", "schema": {"type": "object"}}
                    ]
                }
            }
        }
    }"#;
    let path = create_temp_json(spec);
    let definition = load_spec(path.to_str().unwrap()).unwrap();
    cleanup_temp_files(&[path]);

    assert_eq!(definition.base_path, "/v1");
    let health = definition
        .operations
        .iter()
        .find(|op| op.path == "/health")
        .unwrap();
    assert_eq!(health.operation_id, "GET /health");
    assert_eq!(health.method, Method::GET);

    let update = definition
        .operations
        .iter()
        .find(|op| op.operation_id == "updateItem")
        .unwrap();
    assert_eq!(update.consumes.as_deref(), Some(&["application/xml".to_string()][..]));
    assert_eq!(update.parameters[0].field_name(), "item_id");
}

#[test]
fn test_missing_file_is_an_error() {
    let err = load_spec("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read spec file"), "{err}");
}

#[test]
fn test_unresolved_parameter_ref_is_an_error() {
    let spec = r##"
swagger: "2.0"
paths:
  /pets:
    get:
      parameters:
        - $ref: "#/parameters/missing"
"##;
    let path = create_temp_yaml(spec);
    let result = load_spec(path.to_str().unwrap());
    cleanup_temp_files(&[path]);
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("missing"), "{err:#}");
}
