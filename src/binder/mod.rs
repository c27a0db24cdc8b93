//! # Binder Module
//!
//! [`UntypedRequestBinder`] walks an operation's parameter table and assigns every
//! parameter it can find into a [`BindTarget`]. It needs no generated code: the
//! target is either an ordered [`BoundParams`] map keyed by wire name, or a
//! [`StructTarget`] keyed by field name and finished into any `DeserializeOwned`
//! type.
//!
//! ## Per location
//!
//! | Location | Source | Conversion |
//! |----------|--------|------------|
//! | `path` | router captures | [`coerce_param`] |
//! | `query` | query string, every value | [`coerce_param`] |
//! | `header` | every header value | [`coerce_param`] |
//! | `formData` | parsed form (memoized on the request) | [`coerce_param`], or a [`FileUpload`] |
//! | `body` | the request body | the request [`Consumer`] |
//!
//! Form parameters require a `multipart/form-data` or
//! `application/x-www-form-urlencoded` request (415 otherwise). A form that fails to
//! parse is reported as a 400 on the parameter that needed it.
//!
//! A body parameter is decoded into a string when its schema is `type: string`,
//! into bytes when the format is also `binary`, and into a JSON value otherwise. A
//! request without a body binds the default, reports a required body, or binds
//! nothing. Decode failures become [`ApiError::Codec`].
//!
//! Failures do not stop the walk: every parameter is attempted and the errors are
//! returned together as one [`ApiError::Composite`], or as the lone error when only
//! one parameter failed.

mod form;
mod target;
mod upload;

pub use self::form::{parse_multipart, parse_urlencoded, FormData};
pub use self::target::{BindTarget, BoundParams, StructTarget};
pub use self::upload::{FileHeader, FileUpload};

pub(crate) use self::form::parse_form;

use serde_json::Value;
use tracing::debug;

use crate::codec::{CodecError, Consumer, MULTIPART_FORM_MIME, URLENCODED_FORM_MIME};
use crate::coerce::{coerce_default, coerce_param, ParamValue};
use crate::errors::ApiError;
use crate::request::HttpRequest;
use crate::router::RouteParams;
use crate::spec::{ParameterDescriptor, ParameterLocation};

/// Reason reported for a required file missing from the form.
const MISSING_FILE: &str = "http: no such file";

/// What a body parameter decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyShape {
    Text,
    Bytes,
    Structured,
}

impl BodyShape {
    fn of(param: &ParameterDescriptor) -> Self {
        let schema = param.schema.as_ref();
        let field = |name: &str| schema.and_then(|s| s.get(name)).and_then(Value::as_str);
        match (field("type"), field("format")) {
            (Some("string"), Some("binary")) => BodyShape::Bytes,
            (Some("string"), _) => BodyShape::Text,
            _ => BodyShape::Structured,
        }
    }
}

/// Binds one operation's parameters from a request.
#[derive(Debug, Clone, Copy)]
pub struct UntypedRequestBinder<'a> {
    parameters: &'a [ParameterDescriptor],
    max_form_memory: u64,
}

impl<'a> UntypedRequestBinder<'a> {
    #[must_use]
    pub fn new(parameters: &'a [ParameterDescriptor], max_form_memory: u64) -> Self {
        Self {
            parameters,
            max_form_memory,
        }
    }

    /// Bind every declared parameter into `target`.
    ///
    /// `consumer` is the codec selected for the request `Content-Type`; it is only
    /// used for a body parameter.
    ///
    /// # Errors
    ///
    /// An [`ApiError::Composite`] holding one error per failed parameter, or the error
    /// itself when only one failed. The target may be partially populated.
    pub fn bind(
        &self,
        request: &mut HttpRequest,
        route_params: &RouteParams,
        consumer: Option<&dyn Consumer>,
        target: &mut dyn BindTarget,
    ) -> Result<(), ApiError> {
        let mut errors = Vec::new();
        for param in self.parameters {
            match self.bind_param(param, request, route_params, consumer) {
                Ok(Some(value)) => target.set(param, value),
                Ok(None) => {}
                Err(err) => {
                    debug!(
                        request_id = %request.request_id(),
                        param = %param.name,
                        location = %param.location,
                        error = %err,
                        "Parameter binding failed"
                    );
                    errors.push(err);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::composite(errors))
        }
    }

    fn bind_param(
        &self,
        param: &ParameterDescriptor,
        request: &mut HttpRequest,
        route_params: &RouteParams,
        consumer: Option<&dyn Consumer>,
    ) -> Result<Option<ParamValue>, ApiError> {
        match param.location {
            ParameterLocation::Path => {
                let values = route_params.get(&param.name).map(|v| vec![v.to_string()]);
                coerce_param(param, values.as_deref())
            }
            ParameterLocation::Query => coerce_param(param, request.query_values(&param.name).as_deref()),
            ParameterLocation::Header => coerce_param(param, request.header_values(&param.name).as_deref()),
            ParameterLocation::FormData => self.bind_form_param(param, request),
            ParameterLocation::Body => bind_body(param, request, consumer),
            ParameterLocation::Unknown => Err(ApiError::InvalidLocation {
                name: param.name.clone(),
                location: param.location.to_string(),
            }),
        }
    }

    fn bind_form_param(
        &self,
        param: &ParameterDescriptor,
        request: &mut HttpRequest,
    ) -> Result<Option<ParamValue>, ApiError> {
        let media = request.content_type()?;
        if media.essence != MULTIPART_FORM_MIME && media.essence != URLENCODED_FORM_MIME {
            return Err(ApiError::UnsupportedMediaType {
                media_type: media.essence,
                allowed: vec![MULTIPART_FORM_MIME.to_string(), URLENCODED_FORM_MIME.to_string()],
            });
        }

        let parse_error = |reason: String| ApiError::Parse {
            name: param.name.clone(),
            location: param.location.to_string(),
            value: String::new(),
            reason,
        };
        let form = request.form(self.max_form_memory).map_err(parse_error)?;

        if param.is_file() {
            return match form.file(&param.name) {
                Some(upload) => Ok(Some(ParamValue::File(upload.clone()))),
                None if param.required => Err(parse_error(MISSING_FILE.to_string())),
                None => Ok(None),
            };
        }
        coerce_param(param, form.values(&param.name))
    }
}

fn body_default(param: &ParameterDescriptor) -> Option<ParamValue> {
    param.default.as_ref().map(|d| match BodyShape::of(param) {
        BodyShape::Structured => ParamValue::Json(d.clone()),
        _ => coerce_default(param.kind, param.format.as_deref(), param.items.as_ref(), d),
    })
}

fn codec_error(param: &ParameterDescriptor, err: &CodecError) -> ApiError {
    ApiError::Codec {
        name: param.name.clone(),
        message: err.to_string(),
    }
}

fn bind_body(
    param: &ParameterDescriptor,
    request: &mut HttpRequest,
    consumer: Option<&dyn Consumer>,
) -> Result<Option<ParamValue>, ApiError> {
    if !request.has_body() {
        if let Some(default) = body_default(param) {
            return Ok(Some(default));
        }
        if param.required {
            return Err(ApiError::Required {
                name: param.name.clone(),
                location: param.location.to_string(),
            });
        }
        return Ok(None);
    }

    let Some(consumer) = consumer else {
        return Err(ApiError::internal(format!(
            "no consumer available to decode body parameter {}",
            param.name
        )));
    };

    let decoded = match BodyShape::of(param) {
        BodyShape::Text => {
            let mut text = String::new();
            consumer
                .consume(request.body_mut(), &mut text)
                .map(|()| ParamValue::String(text))
        }
        BodyShape::Bytes => {
            let mut bytes = Vec::new();
            consumer
                .consume(request.body_mut(), &mut bytes)
                .map(|()| ParamValue::Bytes(bytes))
        }
        BodyShape::Structured => {
            let mut value = Value::Null;
            consumer
                .consume(request.body_mut(), &mut value)
                .map(|()| ParamValue::Json(value))
        }
    };

    match decoded {
        Ok(ParamValue::Json(Value::Null)) => Ok(body_default(param).or(Some(ParamValue::Json(Value::Null)))),
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_end_of_input() => match body_default(param) {
            Some(default) => Ok(Some(default)),
            None => Err(codec_error(param, &err)),
        },
        Err(err) => Err(codec_error(param, &err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonConsumer;
    use crate::request::RequestBody;
    use http::{HeaderMap, HeaderValue, Method};
    use serde_json::json;

    fn request(uri: &str, content_type: Option<&str>, body: &[u8]) -> HttpRequest {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        headers.insert(
            http::header::CONTENT_LENGTH,
            HeaderValue::from_str(&body.len().to_string()).unwrap(),
        );
        HttpRequest::new(
            Method::POST,
            uri.parse().unwrap(),
            headers,
            RequestBody::from_bytes(body.to_vec()),
        )
    }

    #[test]
    fn test_body_shapes() {
        let text = ParameterDescriptor::body("b", json!({"type": "string"}));
        let bytes = ParameterDescriptor::body("b", json!({"type": "string", "format": "binary"}));
        let object = ParameterDescriptor::body("b", json!({"type": "object"}));
        assert_eq!(BodyShape::of(&text), BodyShape::Text);
        assert_eq!(BodyShape::of(&bytes), BodyShape::Bytes);
        assert_eq!(BodyShape::of(&object), BodyShape::Structured);
    }

    #[test]
    fn test_body_decoded_with_consumer() {
        let params = vec![ParameterDescriptor::body("pet", json!({"type": "object"})).required()];
        let mut req = request("/pets", Some("application/json"), br#"{"name":"Rex"}"#);
        let mut bound = BoundParams::new();
        UntypedRequestBinder::new(&params, 1024)
            .bind(&mut req, &RouteParams::default(), Some(&JsonConsumer), &mut bound)
            .unwrap();
        assert_eq!(bound.get("pet"), Some(&ParamValue::Json(json!({"name": "Rex"}))));
    }

    #[test]
    fn test_string_body_is_decoded_not_copied() {
        let params = vec![ParameterDescriptor::body("name", json!({"type": "string"}))];
        let mut req = request("/names", Some("application/json"), br#""Tom""#);
        let mut bound = BoundParams::new();
        UntypedRequestBinder::new(&params, 1024)
            .bind(&mut req, &RouteParams::default(), Some(&JsonConsumer), &mut bound)
            .unwrap();
        assert_eq!(bound.get("name"), Some(&ParamValue::String("Tom".to_string())));
    }

    #[test]
    fn test_missing_body_uses_default_or_required() {
        let params = vec![ParameterDescriptor::body("pet", json!({"type": "object"}))
            .with_default(json!({"name": "default"}))];
        let mut req = request("/pets", Some("application/json"), b"");
        let mut bound = BoundParams::new();
        UntypedRequestBinder::new(&params, 1024)
            .bind(&mut req, &RouteParams::default(), Some(&JsonConsumer), &mut bound)
            .unwrap();
        assert_eq!(bound.get("pet"), Some(&ParamValue::Json(json!({"name": "default"}))));

        let params = vec![ParameterDescriptor::body("pet", json!({"type": "object"})).required()];
        let mut req = request("/pets", Some("application/json"), b"");
        let err = UntypedRequestBinder::new(&params, 1024)
            .bind(&mut req, &RouteParams::default(), Some(&JsonConsumer), &mut BoundParams::new())
            .unwrap_err();
        assert_eq!(err.primary().to_string(), "pet in body is required");
    }

    #[test]
    fn test_malformed_body_is_codec_error() {
        let params = vec![ParameterDescriptor::body("pet", json!({"type": "object"}))];
        let mut req = request("/pets", Some("application/json"), b"{\"name\": ");
        let err = UntypedRequestBinder::new(&params, 1024)
            .bind(&mut req, &RouteParams::default(), Some(&JsonConsumer), &mut BoundParams::new())
            .unwrap_err();
        let primary = err.primary();
        assert!(matches!(primary, ApiError::Codec { name, .. } if name == "pet"));
        assert_eq!(primary.status(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_unknown_location_is_internal() {
        let mut param = ParameterDescriptor::query("session");
        param.location = ParameterLocation::Unknown;
        let params = vec![param];
        let mut req = request("/pets", None, b"");
        let err = UntypedRequestBinder::new(&params, 1024)
            .bind(&mut req, &RouteParams::default(), None, &mut BoundParams::new())
            .unwrap_err();
        assert_eq!(err.primary().status(), http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_errors_are_collected_per_parameter() {
        let params = vec![
            ParameterDescriptor::query("a").required(),
            ParameterDescriptor::header("X-B").required(),
        ];
        let mut req = request("/pets", None, b"");
        let err = UntypedRequestBinder::new(&params, 1024)
            .bind(&mut req, &RouteParams::default(), None, &mut BoundParams::new())
            .unwrap_err();
        let names: Vec<Option<&str>> = err.errors().iter().map(|e| e.param_name()).collect();
        assert_eq!(names, vec![Some("a"), Some("X-B")]);
    }
}
