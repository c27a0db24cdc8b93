//! # Error Taxonomy
//!
//! Every failure on the request path is an [`ApiError`]. Each variant knows its
//! HTTP status code, so the rendering step never has to guess:
//!
//! | Variant | Status |
//! |---------|--------|
//! | `Parse`, `Codec` | 400 |
//! | `Unauthenticated` | 401 |
//! | `Forbidden` | 403 |
//! | `NotFound` | 404 |
//! | `MethodNotAllowed` | 405 |
//! | `NotAcceptable` | 406 |
//! | `UnsupportedMediaType` | 415 |
//! | `Required`, `InvalidType`, `InvalidCollectionFormat`, `Validation`, `Composite` | 422 |
//! | `InvalidLocation`, `Internal` | 500 |
//! | `Custom` | as given |
//!
//! Parameter errors always name the parameter they belong to. Errors from several
//! parameters are aggregated into a [`ApiError::Composite`], which is flattened
//! before rendering.
//!
//! `ApiError` is `Clone` so a cached bind result can be handed out repeatedly
//! within one request.

use http::StatusCode;
use serde::Serialize;

/// Request-path error with a fixed HTTP status mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// A header or a form body could not be parsed.
    #[error("parsing {name} {location} from {value:?} failed, because {reason}")]
    Parse {
        name: String,
        location: String,
        value: String,
        reason: String,
    },

    /// The request content type is not accepted by the operation.
    #[error("unsupported media type {media_type:?}, only {allowed:?} are allowed")]
    UnsupportedMediaType {
        media_type: String,
        allowed: Vec<String>,
    },

    /// No producible media type satisfies the `Accept` header.
    #[error("unsupported media type requested, only {available:?} are available")]
    NotAcceptable {
        accept: String,
        available: Vec<String>,
    },

    #[error("{name} in {location} is required")]
    Required { name: String, location: String },

    #[error("{name} in {location} must be of type {expected}: {value:?}")]
    InvalidType {
        name: String,
        location: String,
        expected: String,
        value: String,
    },

    #[error("the collection format {format:?} is not supported for the {location} param {name:?}")]
    InvalidCollectionFormat {
        name: String,
        location: String,
        format: String,
    },

    #[error("invalid parameter location {location:?} for {name}")]
    InvalidLocation { name: String, location: String },

    /// A consumer failed to decode the body for a parameter.
    #[error("{name} in body: {message}")]
    Codec { name: String, message: String },

    /// Schema validation of an already bound value failed.
    #[error("{name} in {location} failed validation: {message}")]
    Validation {
        name: String,
        location: String,
        message: String,
    },

    #[error("path {path} was not found")]
    NotFound { path: String },

    #[error("method {method} is not allowed, but [{}] are", .allowed.join(","))]
    MethodNotAllowed { method: String, allowed: Vec<String> },

    #[error("unauthenticated for {0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("validation failure list")]
    Composite(Vec<ApiError>),

    #[error("{0}")]
    Internal(String),

    #[error("{message}")]
    Custom { code: u16, message: String },
}

/// Wire representation of a rendered error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename = "error")]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

impl ApiError {
    /// Build a composite error, or return the single error unchanged.
    ///
    /// Nested composites are flattened so the list only holds leaf errors.
    #[must_use]
    pub fn composite(errors: Vec<ApiError>) -> ApiError {
        let mut flat = Vec::with_capacity(errors.len());
        for err in errors {
            err.flatten_into(&mut flat);
        }
        if flat.len() == 1 {
            if let Some(single) = flat.pop() {
                return single;
            }
        }
        ApiError::Composite(flat)
    }

    fn flatten_into(self, out: &mut Vec<ApiError>) {
        match self {
            ApiError::Composite(inner) => {
                for err in inner {
                    err.flatten_into(out);
                }
            }
            other => out.push(other),
        }
    }

    /// Shorthand for a 500 with a message.
    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }

    /// Shorthand for a 403 with a message.
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Parse { .. } | ApiError::Codec { .. } => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            ApiError::Required { .. }
            | ApiError::InvalidType { .. }
            | ApiError::InvalidCollectionFormat { .. }
            | ApiError::Validation { .. }
            | ApiError::Composite(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidLocation { .. } | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Custom { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Name of the parameter this error is attributed to, if any.
    #[must_use]
    pub fn param_name(&self) -> Option<&str> {
        match self {
            ApiError::Required { name, .. }
            | ApiError::InvalidType { name, .. }
            | ApiError::InvalidCollectionFormat { name, .. }
            | ApiError::InvalidLocation { name, .. }
            | ApiError::Codec { name, .. }
            | ApiError::Validation { name, .. } => Some(name),
            ApiError::Parse { name, location, .. } if location != "header" => Some(name),
            _ => None,
        }
    }

    /// The error that actually gets rendered: the first leaf of a composite.
    ///
    /// An empty composite renders as itself.
    #[must_use]
    pub fn primary(&self) -> &ApiError {
        match self {
            ApiError::Composite(errors) => errors.first().map_or(self, ApiError::primary),
            other => other,
        }
    }

    /// Leaf errors, in order.
    #[must_use]
    pub fn errors(&self) -> Vec<&ApiError> {
        match self {
            ApiError::Composite(errors) => errors.iter().flat_map(ApiError::errors).collect(),
            other => vec![other],
        }
    }

    /// Body rendered to the client for this error.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let primary = self.primary();
        ErrorBody {
            code: primary.status().as_u16(),
            message: primary.to_string(),
        }
    }
}
