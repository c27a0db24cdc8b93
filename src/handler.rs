//! Operation handlers and their inputs and outputs.
//!
//! A handler receives a [`BoundRequest`] (the bound parameters, the authenticated
//! principal and the matched route) and returns a [`Reply`] or an [`ApiError`].
//! Closures with the right signature are handlers.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::binder::BoundParams;
use crate::codec::Payload;
use crate::coerce::ParamValue;
use crate::errors::ApiError;
use crate::ids::RequestId;
use crate::router::MatchedRoute;
use crate::security::Principal;

/// Business logic for one operation.
pub trait OperationHandler: Send + Sync {
    /// # Errors
    ///
    /// Any [`ApiError`]; it is rendered like every other pipeline error.
    fn handle(&self, request: &BoundRequest) -> Result<Reply, ApiError>;
}

impl<F> OperationHandler for F
where
    F: Fn(&BoundRequest) -> Result<Reply, ApiError> + Send + Sync,
{
    fn handle(&self, request: &BoundRequest) -> Result<Reply, ApiError> {
        self(request)
    }
}

/// Everything a handler gets to see.
#[derive(Debug, Clone)]
pub struct BoundRequest {
    pub request_id: RequestId,
    pub method: Method,
    pub route: MatchedRoute,
    pub params: BoundParams,
    pub principal: Option<Principal>,
}

impl BoundRequest {
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    #[must_use]
    pub fn operation_id(&self) -> &str {
        &self.route.entry.operation_id
    }

    /// Bound parameters as a struct, keyed by field name.
    ///
    /// # Errors
    ///
    /// [`ApiError::Codec`] when the values do not fit `T`.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        self.params.to_struct(&self.route.entry.parameters)
    }
}

/// A handler's response.
///
/// Without a payload nothing is produced and no `Content-Type` is set.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub payload: Option<Payload>,
}

impl Reply {
    #[must_use]
    pub fn new(status: StatusCode, payload: Option<Payload>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            payload,
        }
    }

    /// 200 with a payload.
    pub fn ok(payload: impl Into<Payload>) -> Self {
        Self::new(StatusCode::OK, Some(payload.into()))
    }

    /// 200 with a structured payload encoded by the negotiated producer.
    pub fn json<T: Serialize + Send + 'static>(value: T) -> Self {
        Self::new(StatusCode::OK, Some(Payload::structured(value)))
    }

    /// 204 without a body.
    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, None)
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a header; invalid names or values are dropped with a warning.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid reply header"),
        }
        self
    }
}
