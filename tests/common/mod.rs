#![allow(dead_code)]

pub mod temp_files {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

    /// Creates a temporary spec file with a unique name
    pub fn create_temp_spec(content: &str, ext: &str) -> PathBuf {
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::SeqCst);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();

        let path = std::env::temp_dir().join(format!(
            "brrt_runtime_test_{}_{}_{}.{}",
            std::process::id(),
            counter,
            nanos,
            ext
        ));

        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn create_temp_yaml(content: &str) -> PathBuf {
        create_temp_spec(content, "yaml")
    }

    pub fn create_temp_json(content: &str) -> PathBuf {
        create_temp_spec(content, "json")
    }

    /// Cleanup temporary files (best effort)
    pub fn cleanup_temp_files(paths: &[PathBuf]) {
        for path in paths {
            let _ = std::fs::remove_file(path);
        }
    }
}

pub mod petstore {
    use brrtrouter_runtime::coerce::ParamValue;
    use brrtrouter_runtime::runtime_config::RuntimeConfig;
    use brrtrouter_runtime::security::{ApiKeyAuth, BasicAuth, BearerAuth};
    use brrtrouter_runtime::validator::SchemaValidator;
    use brrtrouter_runtime::{
        load_spec_from_str, Api, ApiDefinition, ApiError, ApiService, BoundRequest, Reply,
    };
    use http::Method;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::io::Cursor;
    use std::sync::Arc;

    pub const VALID_API_KEY: &str = "let-me-in";
    pub const VALID_TOKEN: &str = "good-token";
    pub const BOUNDARY: &str = "XyZzyBoundary";

    pub const PETSTORE_YAML: &str = r##"
swagger: "2.0"
info:
  title: Petstore
  version: "1.0.0"
basePath: /api
consumes:
  - application/json
produces:
  - application/json
  - application/xml
securityDefinitions:
  basic:
    type: basic
  apiKey:
    type: apiKey
    name: X-API-Key
    in: header
  petstore_auth:
    type: oauth2
    flow: implicit
    authorizationUrl: https://example.com/oauth/authorize
    scopes:
      read: read pets
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
      id:
        type: integer
        format: int64
      name:
        type: string
        minLength: 1
      tag:
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
          items:
            type: string
          collectionFormat: csv
    post:
      operationId: addPet
      security:
        - basic: []
      parameters:
        - name: pet
          in: body
          required: true
          schema:
            $ref: "#/definitions/Pet"
  /pets/{id}:
    parameters:
      - name: id
        in: path
        required: true
        type: integer
        format: int64
    get:
      operationId: getPet
    delete:
      operationId: deletePet
      security:
        - apiKey: []
  /pets/{id}/photo:
    post:
      operationId: uploadPhoto
      consumes:
        - multipart/form-data
      parameters:
        - name: caption
          in: formData
          type: string
        - name: photo
          in: formData
          type: file
          required: true
  /secure/items:
    get:
      operationId: listItems
      security:
        - petstore_auth: [read]
        - apiKey: []
"##;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename = "pet")]
    pub struct Pet {
        pub id: i64,
        pub name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub tag: Option<String>,
    }

    pub fn definition() -> ApiDefinition {
        load_spec_from_str(PETSTORE_YAML).unwrap()
    }

    pub fn echo(req: &BoundRequest) -> Result<Reply, ApiError> {
        Ok(Reply::json(req.params.to_json()))
    }

    fn get_pet(req: &BoundRequest) -> Result<Reply, ApiError> {
        let id = req.param("id").and_then(ParamValue::as_i64).unwrap_or_default();
        Ok(Reply::json(Pet {
            id,
            name: "Rex".to_string(),
            tag: None,
        }))
    }

    fn list_items(req: &BoundRequest) -> Result<Reply, ApiError> {
        Ok(Reply::json(json!({ "principal": req.principal.clone() })))
    }

    fn unauthenticated(what: &str) -> ApiError {
        ApiError::Unauthenticated(what.to_string())
    }

    /// Petstore handlers plus basic, api key and bearer authenticators.
    pub fn api(definition: &ApiDefinition) -> Api {
        let mut api = Api::new();
        api.register_handler("listPets", echo);
        api.register_handler("addPet", echo);
        api.register_handler("getPet", get_pet);
        api.register_handler("deletePet", echo);
        api.register_handler("uploadPhoto", echo);
        api.register_handler("listItems", list_items);

        api.register_auth(
            "basic",
            Arc::new(BasicAuth::new(|user: &str, pass: &str| {
                if user == "admin" && pass == "secret" {
                    Ok(json!({ "user": user }))
                } else {
                    Err(unauthenticated("basic"))
                }
            })),
        );
        api.register_auth(
            "apiKey",
            Arc::new(ApiKeyAuth::header("X-API-Key", |key: &str| {
                if key == VALID_API_KEY {
                    Ok(json!({ "client": "service" }))
                } else {
                    Err(unauthenticated("apiKey"))
                }
            })),
        );
        api.register_auth(
            "petstore_auth",
            Arc::new(BearerAuth::new(|token: &str, scopes: &[String]| {
                if token == VALID_TOKEN && scopes.iter().any(|s| s == "read") {
                    Ok(json!({ "sub": "alice", "scopes": scopes }))
                } else {
                    Err(unauthenticated("petstore_auth"))
                }
            })),
        );
        api.set_validator(Arc::new(SchemaValidator::new(definition).unwrap()));
        api
    }

    pub fn service() -> ApiService {
        let definition = definition();
        let api = api(&definition);
        ApiService::new(Arc::new(api), &definition, RuntimeConfig::default()).unwrap()
    }

    pub fn request(
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> http::Request<Cursor<Vec<u8>>> {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Cursor::new(body.to_vec())).unwrap()
    }

    pub fn call(
        service: &ApiService,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> http::Response<Vec<u8>> {
        service.serve(request(method, uri, headers, body))
    }

    pub fn json_body(response: &http::Response<Vec<u8>>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    pub fn header<'a>(response: &'a http::Response<Vec<u8>>, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// `Authorization` value for basic credentials.
    pub fn basic_auth(user: &str, pass: &str) -> String {
        use base64::Engine;
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        format!("Basic {encoded}")
    }

    /// A multipart body with text fields and `(field, filename, content)` files.
    pub fn multipart(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        for (name, filename, content) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    pub fn multipart_content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }
}
