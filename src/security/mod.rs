//! # Security
//!
//! Authentication and authorization for secured operations.
//!
//! ## Model
//!
//! An operation's `security` list is an OR of requirement groups; each group is an
//! AND of named schemes with their required scopes:
//!
//! ```text
//! security:
//!   - basic: []                 # group 1: basic alone
//!   - apiKey: []                # group 2: api key AND oauth with "read"
//!     oauth: [read]
//! ```
//!
//! Each scheme name maps to an [`Authenticator`] registered on the [`Api`]. An
//! authenticator answers one of three ways:
//!
//! | Result | Meaning |
//! |--------|---------|
//! | `Ok(AuthOutcome::NotApplicable)` | the request carries no credentials for this scheme |
//! | `Ok(AuthOutcome::Authenticated(p))` | credentials are valid, `p` is the principal |
//! | `Err(e)` | credentials were presented and rejected |
//!
//! The first group whose schemes all authenticate wins; its last principal is kept.
//! An empty group makes the operation available anonymously. When no group succeeds
//! the request fails with the last authenticator error, or with
//! `Unauthenticated("invalid credentials")` if none applied.
//!
//! After authentication the [`Authorizer`] sees the request and the principal and
//! may reject it (403 by convention).
//!
//! ## Built-in authenticators
//!
//! - [`BasicAuth`] - `Authorization: Basic`, with a `WWW-Authenticate` realm
//! - [`ApiKeyAuth`] - key in a named header or query parameter
//! - [`BearerAuth`] - `Authorization: Bearer`, `access_token` query or form field
//!
//! [`Api`]: crate::api::Api

mod api_key;
mod basic;
mod bearer;

pub use api_key::{ApiKeyAuth, ApiKeyLocation};
pub use basic::BasicAuth;
pub use bearer::BearerAuth;

use anyhow::anyhow;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::api::Api;
use crate::errors::ApiError;
use crate::request::HttpRequest;
use crate::spec::SecurityRequirement;

/// Whatever an authenticator says the caller is.
pub type Principal = Value;

#[derive(Debug, Clone, PartialEq)]
pub enum AuthOutcome {
    NotApplicable,
    Authenticated(Principal),
}

/// What an authenticator gets to look at.
pub struct ScopedAuthRequest<'a> {
    pub request: &'a mut HttpRequest,
    /// Scopes the current requirement lists for this scheme.
    pub required_scopes: &'a [String],
    /// Form size limit, for authenticators that read form fields.
    pub max_form_memory: u64,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, req: &mut ScopedAuthRequest<'_>) -> Result<AuthOutcome, ApiError>;

    /// Value for `WWW-Authenticate` when the request ends up unauthenticated.
    fn challenge(&self) -> Option<String> {
        None
    }
}

pub trait Authorizer: Send + Sync {
    fn authorize(&self, request: &HttpRequest, principal: Option<&Principal>) -> Result<(), ApiError>;
}

/// Accepts every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _request: &HttpRequest, _principal: Option<&Principal>) -> Result<(), ApiError> {
        Ok(())
    }
}

impl<F> Authorizer for F
where
    F: Fn(&HttpRequest, Option<&Principal>) -> Result<(), ApiError> + Send + Sync,
{
    fn authorize(&self, request: &HttpRequest, principal: Option<&Principal>) -> Result<(), ApiError> {
        self(request, principal)
    }
}

#[derive(Clone)]
struct SchemeAuthenticator {
    scheme: String,
    scopes: Vec<String>,
    authenticator: Arc<dyn Authenticator>,
}

/// One requirement group: every scheme must authenticate.
#[derive(Clone, Default)]
pub struct RouteAuthenticator {
    schemes: Vec<SchemeAuthenticator>,
}

impl RouteAuthenticator {
    /// An empty group admits anonymous requests.
    #[must_use]
    pub fn allows_anonymous(&self) -> bool {
        self.schemes.is_empty()
    }

    /// Scheme names in declaration order.
    #[must_use]
    pub fn schemes(&self) -> Vec<&str> {
        self.schemes.iter().map(|s| s.scheme.as_str()).collect()
    }

    fn authenticate(
        &self,
        request: &mut HttpRequest,
        max_form_memory: u64,
    ) -> Result<Option<Principal>, ApiError> {
        let mut principal = None;
        for scheme in &self.schemes {
            let mut scoped = ScopedAuthRequest {
                request: &mut *request,
                required_scopes: &scheme.scopes,
                max_form_memory,
            };
            match scheme.authenticator.authenticate(&mut scoped)? {
                AuthOutcome::Authenticated(p) => {
                    debug!(scheme = %scheme.scheme, "Scheme authenticated");
                    principal = Some(p);
                }
                AuthOutcome::NotApplicable => {
                    debug!(scheme = %scheme.scheme, "No credentials for scheme");
                    return Ok(None);
                }
            }
        }
        Ok(principal)
    }
}

/// All requirement groups of a route; any one group may satisfy the request.
#[derive(Clone, Default)]
pub struct RouteAuthenticators {
    groups: Vec<RouteAuthenticator>,
}

impl RouteAuthenticators {
    /// Resolve scheme names against the authenticators registered on `api`.
    ///
    /// # Errors
    ///
    /// Fails when a requirement names a scheme with no registered authenticator.
    pub fn build(requirements: &[SecurityRequirement], api: &Api) -> anyhow::Result<Self> {
        let mut groups = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let mut schemes = Vec::with_capacity(requirement.len());
            for (scheme, scopes) in requirement {
                let authenticator = api
                    .authenticator(scheme)
                    .ok_or_else(|| anyhow!("no authenticator registered for scheme {scheme:?}"))?;
                schemes.push(SchemeAuthenticator {
                    scheme: scheme.clone(),
                    scopes: scopes.clone(),
                    authenticator,
                });
            }
            groups.push(RouteAuthenticator { schemes });
        }
        Ok(Self { groups })
    }

    /// No requirements at all: the route is public.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn allows_anonymous(&self) -> bool {
        self.groups.iter().any(RouteAuthenticator::allows_anonymous)
    }

    #[must_use]
    pub fn groups(&self) -> &[RouteAuthenticator] {
        &self.groups
    }

    /// Challenges of every scheme on the route, deduplicated, in declaration order.
    #[must_use]
    pub fn challenges(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for scheme in self.groups.iter().flat_map(|g| g.schemes.iter()) {
            if let Some(challenge) = scheme.authenticator.challenge() {
                if !out.contains(&challenge) {
                    out.push(challenge);
                }
            }
        }
        out
    }

    /// Try each group in order.
    ///
    /// Returns `Ok(None)` for a public route or when an anonymous group is reached
    /// before any group authenticates.
    ///
    /// # Errors
    ///
    /// The last authenticator error, or `Unauthenticated("invalid credentials")`
    /// when no group produced a principal.
    pub fn authenticate(
        &self,
        request: &mut HttpRequest,
        max_form_memory: u64,
    ) -> Result<Option<Principal>, ApiError> {
        if self.groups.is_empty() {
            return Ok(None);
        }
        let mut last_error = None;
        for group in &self.groups {
            if group.allows_anonymous() {
                return Ok(None);
            }
            match group.authenticate(request, max_form_memory) {
                Ok(Some(principal)) => return Ok(Some(principal)),
                Ok(None) => {}
                Err(e) => {
                    debug!(schemes = ?group.schemes(), error = %e, "Requirement group rejected");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ApiError::Unauthenticated("invalid credentials".into())))
    }
}

impl std::fmt::Debug for RouteAuthenticators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let groups: Vec<Vec<&str>> = self.groups.iter().map(RouteAuthenticator::schemes).collect();
        f.debug_struct("RouteAuthenticators").field("groups", &groups).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestBody;
    use http::{HeaderMap, Method};
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Fixed(Result<AuthOutcome, ApiError>);

    impl Authenticator for Fixed {
        fn authenticate(&self, _req: &mut ScopedAuthRequest<'_>) -> Result<AuthOutcome, ApiError> {
            self.0.clone()
        }
    }

    fn api() -> Api {
        let mut api = Api::new();
        api.register_auth("yes", Arc::new(Fixed(Ok(AuthOutcome::Authenticated(json!("alice"))))));
        api.register_auth("no", Arc::new(Fixed(Ok(AuthOutcome::NotApplicable))));
        api.register_auth(
            "bad",
            Arc::new(Fixed(Err(ApiError::Unauthenticated("bad token".into())))),
        );
        api
    }

    fn requirement(schemes: &[&str]) -> SecurityRequirement {
        schemes.iter().map(|s| (s.to_string(), Vec::new())).collect::<BTreeMap<_, _>>()
    }

    fn request() -> HttpRequest {
        HttpRequest::new(Method::GET, "/".parse().unwrap(), HeaderMap::new(), RequestBody::empty())
    }

    fn run(requirements: &[SecurityRequirement]) -> Result<Option<Principal>, ApiError> {
        let auths = RouteAuthenticators::build(requirements, &api()).unwrap();
        auths.authenticate(&mut request(), 1024)
    }

    #[test]
    fn test_public_route() {
        assert_eq!(run(&[]).unwrap(), None);
    }

    #[test]
    fn test_or_picks_first_successful_group() {
        let principal = run(&[requirement(&["no"]), requirement(&["yes"])]).unwrap();
        assert_eq!(principal, Some(json!("alice")));
    }

    #[test]
    fn test_and_requires_all_schemes() {
        let err = run(&[requirement(&["yes", "no"])]).unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated("invalid credentials".into()));
    }

    #[test]
    fn test_rejection_error_is_reported() {
        let err = run(&[requirement(&["bad"]), requirement(&["no"])]).unwrap_err();
        assert_eq!(err, ApiError::Unauthenticated("bad token".into()));
    }

    #[test]
    fn test_empty_group_allows_anonymous() {
        let auths = RouteAuthenticators::build(&[requirement(&["no"]), BTreeMap::new()], &api()).unwrap();
        assert!(auths.allows_anonymous());
        assert_eq!(auths.authenticate(&mut request(), 1024).unwrap(), None);
    }

    #[test]
    fn test_unknown_scheme_fails_build() {
        let err = RouteAuthenticators::build(&[requirement(&["missing"])], &api()).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
