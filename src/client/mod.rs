//! # Client Module
//!
//! The outbound mirror of the [`binder`](crate::binder): a [`ClientRequest`] collects
//! path, query, header, form, file and body parameters and renders them into an
//! `http::Request<Vec<u8>>` through the same [`CodecRegistry`](crate::CodecRegistry)
//! producers the server side uses. A [`ClientResponse`] wraps the reply and decodes it
//! with the consumer matching its `Content-Type`.
//!
//! No transport is bundled. Send the built request with any HTTP client (or hand it
//! to an [`ApiService`](crate::ApiService) in tests) and wrap what comes back.
//!
//! ## Writers
//!
//! Operation parameters are written by a [`ClientRequestWriter`]; credentials by a
//! [`ClientAuthInfoWriter`]. Both are implemented for closures. Auth writers run
//! after the request writer, so they win on conflicting parameters.
//!
//! ```rust
//! use brrtrouter_runtime::client::{bearer_token, ClientError, ClientRequest};
//! use brrtrouter_runtime::CodecRegistry;
//! use http::Method;
//!
//! let writer = |req: &mut ClientRequest| -> Result<(), ClientError> {
//!     req.set_path_param("id", "1234");
//!     req.set_query_param("hello", &["world"]);
//!     Ok(())
//! };
//! let request = ClientRequest::from_writer(Method::GET, "/flats/{id}/", &writer).unwrap();
//! let http = request
//!     .build_http("application/json", "/api", &CodecRegistry::with_defaults(), Some(&bearer_token("t0ken")))
//!     .unwrap();
//! assert_eq!(http.uri(), "/api/flats/1234/?hello=world");
//! assert_eq!(http.headers()["authorization"], "Bearer t0ken");
//! ```

mod auth;
mod request;
mod response;

pub use self::auth::{
    api_key_auth, basic_auth, bearer_token, compose, ApiKeyWriter, BasicAuthWriter,
    BearerTokenWriter, ComposedAuthWriter,
};
pub use self::request::ClientRequest;
pub use self::response::{ClientResponse, ClientResponseReader};

use crate::codec::CodecError;

/// Failures while building a request or reading a response.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("path parameter {0} was not set")]
    MissingPathParam(String),

    #[error("no producer registered for {0}")]
    NoProducer(String),

    #[error("no consumer registered for {0}")]
    NoConsumer(String),

    #[error("reading file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Http(#[from] http::Error),

    /// A response the caller did not expect, usually a non-2xx status.
    #[error("{operation} (status {code}): {message}")]
    Response {
        operation: String,
        code: u16,
        message: String,
    },
}

/// Writes the parameters of one operation onto a request.
pub trait ClientRequestWriter {
    fn write_to_request(&self, request: &mut ClientRequest) -> Result<(), ClientError>;
}

impl<F> ClientRequestWriter for F
where
    F: Fn(&mut ClientRequest) -> Result<(), ClientError>,
{
    fn write_to_request(&self, request: &mut ClientRequest) -> Result<(), ClientError> {
        self(request)
    }
}

/// Writes credentials onto a request.
pub trait ClientAuthInfoWriter: Send + Sync {
    fn authenticate_request(&self, request: &mut ClientRequest) -> Result<(), ClientError>;
}

impl<F> ClientAuthInfoWriter for F
where
    F: Fn(&mut ClientRequest) -> Result<(), ClientError> + Send + Sync,
{
    fn authenticate_request(&self, request: &mut ClientRequest) -> Result<(), ClientError> {
        self(request)
    }
}
