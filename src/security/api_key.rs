use tracing::debug;

use super::{AuthOutcome, Authenticator, Principal, ScopedAuthRequest};
use crate::errors::ApiError;
use crate::logging::redact;

type VerifyFn = dyn Fn(&str) -> Result<Principal, ApiError> + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Query,
    Header,
}

impl ApiKeyLocation {
    /// Parse the `in` field of an `apiKey` security definition.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "query" => Some(Self::Query),
            "header" => Some(Self::Header),
            _ => None,
        }
    }
}

/// API key read from a named header or query parameter.
pub struct ApiKeyAuth {
    name: String,
    location: ApiKeyLocation,
    verify: Box<VerifyFn>,
}

impl ApiKeyAuth {
    pub fn new<F>(name: impl Into<String>, location: ApiKeyLocation, verify: F) -> Self
    where
        F: Fn(&str) -> Result<Principal, ApiError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            location,
            verify: Box::new(verify),
        }
    }

    pub fn header<F>(name: impl Into<String>, verify: F) -> Self
    where
        F: Fn(&str) -> Result<Principal, ApiError> + Send + Sync + 'static,
    {
        Self::new(name, ApiKeyLocation::Header, verify)
    }

    pub fn query<F>(name: impl Into<String>, verify: F) -> Self
    where
        F: Fn(&str) -> Result<Principal, ApiError> + Send + Sync + 'static,
    {
        Self::new(name, ApiKeyLocation::Query, verify)
    }
}

impl Authenticator for ApiKeyAuth {
    fn authenticate(&self, req: &mut ScopedAuthRequest<'_>) -> Result<AuthOutcome, ApiError> {
        let key = match self.location {
            ApiKeyLocation::Header => req.request.header(&self.name).map(str::to_string),
            ApiKeyLocation::Query => req
                .request
                .query_values(&self.name)
                .and_then(|mut v| v.pop()),
        };
        match key {
            Some(key) if !key.is_empty() => {
                debug!(name = %self.name, location = ?self.location, key = %redact(&key), "Verifying api key");
                (self.verify)(&key).map(AuthOutcome::Authenticated)
            }
            _ => Ok(AuthOutcome::NotApplicable),
        }
    }
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("name", &self.name)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}
