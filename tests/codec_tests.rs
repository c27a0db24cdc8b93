mod common;

use brrtrouter_runtime::codec::{resolve_sink, CodecError, Consumable, Sink};
use brrtrouter_runtime::coerce::ParamValue;
use brrtrouter_runtime::runtime_config::RuntimeConfig;
use brrtrouter_runtime::{
    Api, ApiDefinition, ApiError, ApiService, BoundRequest, Consumer, OperationMeta,
    ParameterDescriptor, Payload, Producer, Reply,
};
use common::petstore::{call, header};
use http::{Method, StatusCode};
use serde_json::json;
use std::io::{Read, Write};
use std::sync::Arc;

const SHOUT_MIME: &str = "text/x-shout";
const TEXT_MIME_OFFER: &str = "text/plain";

/// Reads text and trims it.
struct TrimConsumer;

impl Consumer for TrimConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        let mut raw = String::new();
        reader.read_to_string(&mut raw)?;
        match resolve_sink(target) {
            Some(Sink::Text(text)) => {
                *text = raw.trim().to_string();
                Ok(())
            }
            _ => Err(CodecError::Unsupported {
                codec: "trim consumer",
                payload: "non-text",
            }),
        }
    }
}

/// Writes text upper-cased.
struct ShoutProducer;

impl Producer for ShoutProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Text(text) => {
                writer.write_all(text.to_uppercase().as_bytes())?;
                Ok(())
            }
            other => Err(CodecError::Unsupported {
                codec: "shout producer",
                payload: other.kind(),
            }),
        }
    }
}

fn echo_message(req: &BoundRequest) -> Result<Reply, ApiError> {
    let message = req
        .param("message")
        .and_then(ParamValue::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(Reply::ok(message))
}

fn pet(_: &BoundRequest) -> Result<Reply, ApiError> {
    Ok(Reply::json(json!({"name": "Rex"})))
}

fn service() -> ApiService {
    let definition = ApiDefinition::new("/")
        .operation(
            OperationMeta::new(Method::POST, "/echo", "echo")
                .consumes([SHOUT_MIME])
                .produces([TEXT_MIME_OFFER, SHOUT_MIME])
                .param(ParameterDescriptor::body("message", json!({"type": "string"}))),
        )
        .operation(
            OperationMeta::new(Method::GET, "/pet", "pet")
                .produces(["application/json", "application/yaml"]),
        )
        .operation(
            OperationMeta::new(Method::GET, "/legacy", "legacy").produces(["application/vnd.legacy"]),
        );

    let mut api = Api::new();
    api.register_consumer(SHOUT_MIME, Arc::new(TrimConsumer));
    api.register_producer(SHOUT_MIME, Arc::new(ShoutProducer));
    api.register_handler("echo", echo_message);
    api.register_handler("pet", pet);
    api.register_handler("legacy", pet);
    ApiService::new(Arc::new(api), &definition, RuntimeConfig::default()).unwrap()
}

#[test]
fn test_registered_codecs_are_used() {
    let service = service();
    let response = call(
        &service,
        Method::POST,
        "/echo",
        &[("Content-Type", SHOUT_MIME), ("Accept", SHOUT_MIME)],
        b"  hello there \n",
    );
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some(SHOUT_MIME));
    assert_eq!(response.body(), b"HELLO THERE");

    let response = call(
        &service,
        Method::POST,
        "/echo",
        &[("Content-Type", SHOUT_MIME)],
        b"  hello there \n",
    );
    assert_eq!(header(&response, "content-type"), Some(TEXT_MIME_OFFER));
    assert_eq!(response.body(), b"hello there");
}

#[test]
fn test_yaml_response() {
    let service = service();
    let response = call(
        &service,
        Method::GET,
        "/pet",
        &[("Accept", "application/yaml")],
        b"",
    );
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("application/yaml"));
    assert_eq!(String::from_utf8(response.body().clone()).unwrap(), "name: Rex\n");
}

#[test]
fn test_missing_producer_falls_back_to_default() {
    let service = service();
    let response = call(&service, Method::GET, "/legacy", &[], b"");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body, json!({"name": "Rex"}));
}

#[test]
fn test_producer_failure_renders_error() {
    let definition = ApiDefinition::new("/").operation(
        OperationMeta::new(Method::GET, "/loud", "loud").produces([SHOUT_MIME]),
    );
    let mut api = Api::new();
    api.register_producer(SHOUT_MIME, Arc::new(ShoutProducer));
    api.register_handler("loud", pet);
    let service = ApiService::new(Arc::new(api), &definition, RuntimeConfig::default()).unwrap();
    let response = call(&service, Method::GET, "/loud", &[], b"");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(header(&response, "content-type"), Some("application/json"));
}
