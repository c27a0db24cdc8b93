use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

use super::{AuthOutcome, Authenticator, Principal, ScopedAuthRequest};
use crate::errors::ApiError;

type VerifyFn = dyn Fn(&str, &str) -> Result<Principal, ApiError> + Send + Sync;

/// HTTP basic authentication.
///
/// A request without a well-formed `Authorization: Basic` header is not applicable;
/// a well-formed header is handed to the verify function.
pub struct BasicAuth {
    realm: String,
    verify: Box<VerifyFn>,
}

impl BasicAuth {
    pub fn new<F>(verify: F) -> Self
    where
        F: Fn(&str, &str) -> Result<Principal, ApiError> + Send + Sync + 'static,
    {
        Self {
            realm: "API".to_string(),
            verify: Box::new(verify),
        }
    }

    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    #[must_use]
    pub fn realm(&self) -> &str {
        &self.realm
    }
}

/// Decode `Basic <base64(user:pass)>`.
fn credentials(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

impl Authenticator for BasicAuth {
    fn authenticate(&self, req: &mut ScopedAuthRequest<'_>) -> Result<AuthOutcome, ApiError> {
        let Some((user, password)) = req.request.header("authorization").and_then(credentials) else {
            return Ok(AuthOutcome::NotApplicable);
        };
        debug!(user = %user, realm = %self.realm, "Verifying basic credentials");
        (self.verify)(&user, &password).map(AuthOutcome::Authenticated)
    }

    fn challenge(&self) -> Option<String> {
        Some(format!("Basic realm=\"{}\"", self.realm))
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth").field("realm", &self.realm).finish_non_exhaustive()
    }
}
