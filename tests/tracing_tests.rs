mod common;

use common::petstore::{basic_auth, call, service};
use http::Method;
use tracing_util::TestTracing;

#[test]
fn test_request_complete_is_logged() {
    let tracing = TestTracing::init();
    let service = service();

    let id = ulid::Ulid::new().to_string();
    let response = call(&service, Method::GET, "/api/pets/5", &[("X-Request-Id", &id)], b"");
    assert_eq!(response.status(), 200);

    let events = tracing.logs.with_message("Request complete");
    assert_eq!(events.len(), 1, "{}", tracing.logs.contents());
    let fields = &events[0]["fields"];
    assert_eq!(fields["request_id"], id.as_str());
    assert_eq!(fields["method"], "GET");
    assert_eq!(fields["path"], "/api/pets/5");
    assert_eq!(fields["operation_id"], "getPet");
    assert_eq!(fields["status"], 200);
}

#[test]
fn test_routing_table_is_logged() {
    let tracing = TestTracing::init();
    let _service = service();

    let events = tracing.logs.with_message("Routing table loaded");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["fields"]["routes_count"], 6);
    assert_eq!(events[0]["fields"]["base_path"], "/api");
}

#[test]
fn test_credentials_are_not_logged() {
    let tracing = TestTracing::init();
    let service = service();

    let auth = basic_auth("admin", "hunter2-wrong");
    let token = "Bearer super-secret-token-value";
    call(&service, Method::POST, "/api/pets", &[("Authorization", &auth)], b"");
    call(&service, Method::GET, "/api/secure/items", &[("Authorization", token)], b"");
    call(
        &service,
        Method::DELETE,
        "/api/pets/1",
        &[("X-API-Key", "not-the-right-key")],
        b"",
    );

    let logs = tracing.logs.contents();
    assert!(!logs.contains("hunter2-wrong"));
    assert!(!logs.contains("super-secret-token-value"));
    assert!(!logs.contains("not-the-right-key"));
}

#[test]
fn test_not_found_is_logged_without_operation() {
    let tracing = TestTracing::init();
    let service = service();

    call(&service, Method::GET, "/api/nowhere", &[], b"");
    let events = tracing.logs.with_message("Request complete");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["fields"]["status"], 404);
    assert_eq!(events[0]["fields"]["operation_id"], "");
}
