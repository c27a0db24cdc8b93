use tracing::debug;

use super::{AuthOutcome, Authenticator, Principal, ScopedAuthRequest};
use crate::codec::{MULTIPART_FORM_MIME, URLENCODED_FORM_MIME};
use crate::errors::ApiError;
use crate::logging::redact;

type VerifyFn = dyn Fn(&str, &[String]) -> Result<Principal, ApiError> + Send + Sync;

const ACCESS_TOKEN: &str = "access_token";

/// OAuth2 style bearer token.
///
/// The token is looked up in the `Authorization: Bearer` header, then the
/// `access_token` query parameter, then an `access_token` form field. The verify
/// function receives the token and the scopes the requirement lists.
pub struct BearerAuth {
    verify: Box<VerifyFn>,
}

impl BearerAuth {
    pub fn new<F>(verify: F) -> Self
    where
        F: Fn(&str, &[String]) -> Result<Principal, ApiError> + Send + Sync + 'static,
    {
        Self {
            verify: Box::new(verify),
        }
    }
}

fn token_from_header(header: &str) -> Option<String> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

fn token_from_form(req: &mut ScopedAuthRequest<'_>) -> Option<String> {
    let content_type = req.request.content_type().ok()?;
    if content_type.essence != URLENCODED_FORM_MIME && content_type.essence != MULTIPART_FORM_MIME {
        return None;
    }
    let form = req.request.form(req.max_form_memory).ok()?;
    form.values(ACCESS_TOKEN)?.last().cloned()
}

impl Authenticator for BearerAuth {
    fn authenticate(&self, req: &mut ScopedAuthRequest<'_>) -> Result<AuthOutcome, ApiError> {
        let token = req
            .request
            .header("authorization")
            .and_then(token_from_header)
            .or_else(|| req.request.query_values(ACCESS_TOKEN).and_then(|mut v| v.pop()))
            .filter(|t| !t.is_empty())
            .or_else(|| token_from_form(req));
        let Some(token) = token else {
            return Ok(AuthOutcome::NotApplicable);
        };
        debug!(token = %redact(&token), scopes = ?req.required_scopes, "Verifying bearer token");
        (self.verify)(&token, req.required_scopes).map(AuthOutcome::Authenticated)
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").finish_non_exhaustive()
    }
}
