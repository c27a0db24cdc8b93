//! Credential writers for outbound requests, one per security scheme the server side
//! understands.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::AUTHORIZATION;

use super::{ClientAuthInfoWriter, ClientError, ClientRequest};
use crate::security::ApiKeyLocation;

/// `Authorization: Basic` with base64 `username:password`.
pub struct BasicAuthWriter {
    username: String,
    password: String,
}

pub fn basic_auth(username: impl Into<String>, password: impl Into<String>) -> BasicAuthWriter {
    BasicAuthWriter {
        username: username.into(),
        password: password.into(),
    }
}

impl ClientAuthInfoWriter for BasicAuthWriter {
    fn authenticate_request(&self, request: &mut ClientRequest) -> Result<(), ClientError> {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        request.set_header_param(AUTHORIZATION.as_str(), &[format!("Basic {encoded}").as_str()])
    }
}

impl std::fmt::Debug for BasicAuthWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthWriter")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// An API key sent as a header or a query parameter.
pub struct ApiKeyWriter {
    name: String,
    location: ApiKeyLocation,
    value: String,
}

pub fn api_key_auth(
    name: impl Into<String>,
    location: ApiKeyLocation,
    value: impl Into<String>,
) -> ApiKeyWriter {
    ApiKeyWriter {
        name: name.into(),
        location,
        value: value.into(),
    }
}

impl ClientAuthInfoWriter for ApiKeyWriter {
    fn authenticate_request(&self, request: &mut ClientRequest) -> Result<(), ClientError> {
        match self.location {
            ApiKeyLocation::Header => request.set_header_param(&self.name, &[self.value.as_str()]),
            ApiKeyLocation::Query => {
                request.set_query_param(self.name.clone(), &[self.value.as_str()]);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for ApiKeyWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyWriter")
            .field("name", &self.name)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

/// `Authorization: Bearer <token>`.
pub struct BearerTokenWriter {
    token: String,
}

pub fn bearer_token(token: impl Into<String>) -> BearerTokenWriter {
    BearerTokenWriter { token: token.into() }
}

impl ClientAuthInfoWriter for BearerTokenWriter {
    fn authenticate_request(&self, request: &mut ClientRequest) -> Result<(), ClientError> {
        request.set_header_param(AUTHORIZATION.as_str(), &[format!("Bearer {}", self.token).as_str()])
    }
}

impl std::fmt::Debug for BearerTokenWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenWriter").finish_non_exhaustive()
    }
}

/// Several writers applied in order; the first failure stops the chain.
pub struct ComposedAuthWriter {
    writers: Vec<Box<dyn ClientAuthInfoWriter>>,
}

pub fn compose(writers: Vec<Box<dyn ClientAuthInfoWriter>>) -> ComposedAuthWriter {
    ComposedAuthWriter { writers }
}

impl ClientAuthInfoWriter for ComposedAuthWriter {
    fn authenticate_request(&self, request: &mut ClientRequest) -> Result<(), ClientError> {
        for writer in &self.writers {
            writer.authenticate_request(request)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ComposedAuthWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedAuthWriter")
            .field("writers", &self.writers.len())
            .finish()
    }
}
