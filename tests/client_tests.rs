mod common;

use brrtrouter_runtime::binder::FileUpload;
use brrtrouter_runtime::client::{self, ClientError, ClientRequest, ClientResponse};
use brrtrouter_runtime::security::ApiKeyLocation;
use brrtrouter_runtime::{ApiService, CodecRegistry, Payload};
use common::petstore::{service, Pet, VALID_API_KEY};
use http::{Method, StatusCode};
use serde_json::{json, Value};
use std::io::Cursor;

fn send(
    service: &ApiService,
    request: ClientRequest,
    media_type: &str,
    auth: Option<&dyn client::ClientAuthInfoWriter>,
) -> ClientResponse {
    let codecs = CodecRegistry::with_defaults();
    let http = request.build_http(media_type, "/api", &codecs, auth).unwrap();
    service.serve(http.map(Cursor::new)).into()
}

#[test]
fn test_add_pet_with_basic_auth() {
    let service = service();
    let mut request = ClientRequest::new(Method::POST, "/pets");
    request.set_body_param(Payload::structured(json!({"name": "Rex", "tag": "dog"})));

    let response = send(
        &service,
        request,
        "application/json",
        Some(&client::basic_auth("admin", "secret")),
    );
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.decode(&CodecRegistry::with_defaults()).unwrap();
    assert_eq!(echoed, json!({"pet": {"name": "Rex", "tag": "dog"}}));
}

#[test]
fn test_wrong_credentials_become_response_error() {
    let service = service();
    let mut request = ClientRequest::new(Method::POST, "/pets");
    request.set_body_param(Payload::structured(json!({"name": "Rex"})));

    let response = send(
        &service,
        request,
        "application/json",
        Some(&client::basic_auth("admin", "guess")),
    );
    assert_eq!(response.code(), 401);
    let err = response.to_error("addPet");
    assert!(matches!(err, ClientError::Response { code: 401, .. }));
    assert!(err.to_string().starts_with("addPet (status 401)"), "{err}");
}

#[test]
fn test_get_pet_decodes_xml() {
    let service = service();
    let writer = |req: &mut ClientRequest| -> Result<(), ClientError> {
        req.set_path_param("id", "7");
        req.set_header_param("Accept", &["application/xml"])
    };
    let request = ClientRequest::from_writer(Method::GET, "/pets/{id}", &writer).unwrap();

    let response = send(&service, request, "application/json", None);
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.media_type(), "application/xml");
    let pet: Pet = response.decode(&CodecRegistry::with_defaults()).unwrap();
    assert_eq!(pet.id, 7);
    assert_eq!(pet.name, "Rex");
}

#[test]
fn test_query_params_reach_the_binder() {
    let service = service();
    let mut request = ClientRequest::new(Method::GET, "/pets");
    request.set_query_param("limit", &["5"]);
    request.set_query_param("tags", &["cat,dog"]);

    let response = send(&service, request, "application/json", None);
    let echoed: Value = response.decode(&CodecRegistry::with_defaults()).unwrap();
    assert_eq!(echoed, json!({"limit": 5, "tags": ["cat", "dog"]}));
}

#[test]
fn test_upload_photo_as_multipart() {
    let service = service();
    let mut request = ClientRequest::new(Method::POST, "/pets/{id}/photo");
    request.set_path_param("id", "7");
    request.set_form_param("caption", &["Good boy"]);
    request.set_file_param(
        "photo",
        vec![FileUpload::new("rex.png", Some("image/png".into()), b"\x89PNG".to_vec())],
    );

    let response = send(&service, request, "multipart/form-data", None);
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.decode(&CodecRegistry::with_defaults()).unwrap();
    assert_eq!(echoed["id"], 7);
    assert_eq!(echoed["caption"], "Good boy");
    assert_eq!(echoed["photo"]["filename"], "rex.png");
    assert_eq!(echoed["photo"]["size"], 4);
}

#[test]
fn test_delete_pet_with_api_key_header() {
    let service = service();
    let mut request = ClientRequest::new(Method::DELETE, "/pets/{id}");
    request.set_path_param("id", "3");

    let auth = client::api_key_auth("X-API-Key", ApiKeyLocation::Header, VALID_API_KEY);
    let response = send(&service, request, "application/json", Some(&auth));
    assert_eq!(response.status(), StatusCode::OK);
    let echoed: Value = response.decode(&CodecRegistry::with_defaults()).unwrap();
    assert_eq!(echoed, json!({"id": 3}));

    let mut request = ClientRequest::new(Method::DELETE, "/pets/{id}");
    request.set_path_param("id", "3");
    let response = send(&service, request, "application/json", None);
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
