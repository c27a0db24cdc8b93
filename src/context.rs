//! # Request Context
//!
//! [`Context`] runs the stages of the request pipeline against one [`HttpRequest`]:
//!
//! 1. [`route_info`](Context::route_info) - match method and path (404 / 405)
//! 2. [`negotiate`](Context::negotiate) - validate `Content-Type`, pick the consumer,
//!    check that `Accept` leaves a producible format (415 / 406)
//! 3. [`authorize`](Context::authorize) - authenticators, then the authorizer (401 / 403)
//! 4. [`bind_and_validate`](Context::bind_and_validate) - bind every parameter and run
//!    the request validator (400 / 422)
//! 5. [`respond`](Context::respond) / [`respond_error`](Context::respond_error) -
//!    serialize through the negotiated producer
//!
//! Every stage caches its result on the request state, so calling a stage twice
//! (for example binding from a handler wrapper and again from the service) does not
//! re-read the body.

use http::header::{HeaderValue, ALLOW, CONTENT_TYPE, WWW_AUTHENTICATE};
use http::{Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::api::Api;
use crate::binder::{BindTarget, BoundParams, UntypedRequestBinder};
use crate::codec::{
    Consumer, Payload, Producer, JSON_MIME, MULTIPART_FORM_MIME, TEXT_MIME, URLENCODED_FORM_MIME,
    WILDCARD_MIME,
};
use crate::errors::ApiError;
use crate::handler::Reply;
use crate::negotiate::{negotiate_from_headers, validate_content_type};
use crate::request::{allows_body, can_have_body, HttpRequest, REQUEST_ID_HEADER};
use crate::router::{MatchedRoute, RouteEntry, RouteResolution, Router};
use crate::runtime_config::RuntimeConfig;
use crate::security::Principal;

/// Body used when no producer can render an error.
const FALLBACK_ERROR_BODY: &str = "internal server error";

/// Shared, read-only state of the request pipeline.
#[derive(Clone, Debug)]
pub struct Context {
    api: Arc<Api>,
    router: Arc<Router>,
    config: RuntimeConfig,
}

impl Context {
    #[must_use]
    pub fn new(api: Arc<Api>, router: Arc<Router>, config: RuntimeConfig) -> Self {
        Self {
            api,
            router,
            config,
        }
    }

    #[must_use]
    pub fn api(&self) -> &Api {
        &self.api
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The route for the request's method and path.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] when no route has the path, [`ApiError::MethodNotAllowed`]
    /// (with the sorted list of methods that do exist) when only the method is wrong.
    pub fn route_info(&self, req: &mut HttpRequest) -> Result<MatchedRoute, ApiError> {
        if let Some(route) = &req.state().route {
            return Ok(route.clone());
        }
        let path = req.path().to_string();
        match self.router.resolve(&req.method, &path) {
            RouteResolution::Matched(route) => {
                req.state_mut().route = Some(route.clone());
                Ok(route)
            }
            RouteResolution::MethodNotAllowed(allowed) => Err(ApiError::MethodNotAllowed {
                method: req.method.to_string(),
                allowed,
            }),
            RouteResolution::NotFound => Err(ApiError::NotFound { path }),
        }
    }

    /// Content negotiation for a matched route.
    ///
    /// The request `Content-Type` is only examined when the request carries a body
    /// and either the operation reads one or the method may have one. A body-less
    /// `GET` or `DELETE` is never rejected for its content type.
    ///
    /// Returns the consumer for the request body, if one was selected. Form media
    /// types need no consumer.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Parse`] for a malformed `Content-Type`
    /// - [`ApiError::UnsupportedMediaType`] when the media type is not in `consumes`
    ///   or has no registered consumer
    /// - [`ApiError::NotAcceptable`] when `Accept` rules out every producible format
    pub fn negotiate(
        &self,
        req: &mut HttpRequest,
        route: &RouteEntry,
    ) -> Result<Option<Arc<dyn Consumer>>, ApiError> {
        let mut consumer = None;
        let mut request_format = String::new();

        if req.has_body() && (route.expects_body() || can_have_body(&req.method)) {
            let media = req.content_type()?;
            validate_content_type(&route.consumes, &media.essence)?;
            let found = route
                .consumers
                .get(&media.essence)
                .cloned()
                .or_else(|| self.api.codecs().consumer_for(&media.essence));
            let is_form = media.essence == MULTIPART_FORM_MIME || media.essence == URLENCODED_FORM_MIME;
            match found {
                Some(found) => consumer = Some(found),
                // Form bodies are read by the binder's form parser.
                None if is_form => {}
                None => {
                    debug!(media_type = %media.essence, "No consumer registered for media type");
                    return Err(ApiError::UnsupportedMediaType {
                        media_type: media.essence,
                        allowed: route.consumes.clone(),
                    });
                }
            }
            request_format = media.essence;
        }

        if route.produces.is_empty() && request_format.is_empty() {
            request_format = WILDCARD_MIME.to_string();
        }
        let format = negotiate_from_headers(&req.headers, &route.produces, &request_format);
        if format.is_empty() {
            return Err(ApiError::NotAcceptable {
                accept: req.header_values("accept").unwrap_or_default().join(", "),
                available: route.produces.clone(),
            });
        }
        Ok(consumer)
    }

    /// Negotiated response media type, cached on success.
    ///
    /// `None` when the `Accept` header rules out every offer.
    pub fn response_format(&self, req: &mut HttpRequest, offers: &[String]) -> Option<String> {
        if let Some(format) = &req.state().response_format {
            return Some(format.clone());
        }
        let format = negotiate_from_headers(&req.headers, offers, "");
        if format.is_empty() {
            return None;
        }
        req.state_mut().response_format = Some(format.clone());
        Some(format)
    }

    /// Negotiate, then bind every declared parameter into `target`.
    ///
    /// # Errors
    ///
    /// The negotiation error, or the (composite) binding error.
    pub fn bind_valid_request(
        &self,
        req: &mut HttpRequest,
        route: &MatchedRoute,
        target: &mut dyn BindTarget,
    ) -> Result<(), ApiError> {
        let consumer = self.negotiate(req, &route.entry)?;
        UntypedRequestBinder::new(&route.entry.parameters, self.config.max_form_memory).bind(
            req,
            &route.params,
            consumer.as_deref(),
            target,
        )
    }

    /// Bind into a [`BoundParams`] and run the registered request validator.
    ///
    /// The outcome, success or failure, is cached on the request: a second call
    /// returns the same result without touching the body again.
    ///
    /// # Errors
    ///
    /// As [`bind_valid_request`](Self::bind_valid_request), plus validator errors.
    pub fn bind_and_validate(
        &self,
        req: &mut HttpRequest,
        route: &MatchedRoute,
    ) -> Result<BoundParams, ApiError> {
        if let Some(result) = &req.state().bound {
            return result.clone();
        }
        let mut params = BoundParams::new();
        let result = self
            .bind_valid_request(req, route, &mut params)
            .and_then(|()| match self.api.validator() {
                Some(validator) => validator.validate(&route.entry, &params),
                None => Ok(()),
            })
            .map(|()| params);
        req.state_mut().bound = Some(result.clone());
        result
    }

    /// Authenticate against the route's requirements, then ask the authorizer.
    ///
    /// On a 401 the challenges of the route's authenticators are stored on the
    /// request state for the `WWW-Authenticate` header.
    ///
    /// # Errors
    ///
    /// [`ApiError::Unauthenticated`] or whatever the authenticator or authorizer
    /// returned.
    pub fn authorize(
        &self,
        req: &mut HttpRequest,
        route: &MatchedRoute,
    ) -> Result<Option<Principal>, ApiError> {
        if let Some(principal) = &req.state().principal {
            return Ok(Some(principal.clone()));
        }
        let authenticators = &route.entry.authenticators;
        let principal = match authenticators.authenticate(req, self.config.max_form_memory) {
            Ok(principal) => principal,
            Err(err) => {
                if err.status() == StatusCode::UNAUTHORIZED {
                    req.state_mut().challenges = authenticators.challenges();
                }
                return Err(err);
            }
        };
        self.api.authorizer().authorize(req, principal.as_ref())?;
        req.state_mut().principal = principal.clone();
        Ok(principal)
    }

    fn producer_for(&self, route: Option<&MatchedRoute>, format: &str) -> Option<Arc<dyn Producer>> {
        route
            .and_then(|r| r.entry.producers.get(format).cloned())
            .or_else(|| self.api.codecs().producer_for(format))
    }

    fn offers(&self, route: Option<&MatchedRoute>) -> Vec<String> {
        match route {
            Some(route) if !route.entry.produces.is_empty() => route.entry.produces.clone(),
            _ => vec![self.api.default_produces().to_string()],
        }
    }

    fn base_response(req: &HttpRequest, status: StatusCode) -> http::Response<Vec<u8>> {
        let mut response = http::Response::new(Vec::new());
        *response.status_mut() = status;
        if let Ok(id) = HeaderValue::from_str(&req.request_id().to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, id);
        }
        response
    }

    /// Serialize a handler reply.
    ///
    /// The format comes from the `Accept` negotiation against the route's `produces`.
    /// When nothing is negotiable, or the negotiated format has no producer, the
    /// API default is used. `204` replies and `HEAD` requests get no body.
    pub fn respond(
        &self,
        req: &mut HttpRequest,
        route: Option<&MatchedRoute>,
        reply: Reply,
    ) -> http::Response<Vec<u8>> {
        let Reply {
            status,
            headers,
            payload,
        } = reply;

        let default_format = self.api.default_produces().to_string();
        let offers = self.offers(route);
        let mut format = self
            .response_format(req, &offers)
            .unwrap_or_else(|| default_format.clone());
        let producer = match self.producer_for(route, &format) {
            Some(producer) => producer,
            None => match self.api.codecs().producer_for(&default_format) {
                Some(producer) => {
                    format = default_format;
                    producer
                }
                None => {
                    let err = ApiError::internal(format!("can't find a producer for {format}"));
                    return self.respond_error(req, route, &err);
                }
            },
        };

        let mut response = Self::base_response(req, status);
        for (name, value) in &headers {
            response.headers_mut().append(name.clone(), value.clone());
        }
        let Some(payload) = payload else {
            return response;
        };
        if status == StatusCode::NO_CONTENT || !allows_body(&req.method) {
            return response;
        }

        let mut body = Vec::new();
        if let Err(err) = producer.produce(&mut body, payload) {
            error!(request_id = %req.request_id(), format = %format, error = %err, "Producer failed");
            let err = ApiError::internal(err.to_string());
            return self.respond_error(req, route, &err);
        }
        if !response.headers().contains_key(CONTENT_TYPE) {
            if let Ok(value) = HeaderValue::from_str(&format) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
        }
        *response.body_mut() = body;
        response
    }

    /// Render an error as `{"code": n, "message": "..."}`.
    ///
    /// Composite errors are flattened and the first one is rendered. The body goes
    /// through the negotiated producer when there is one, else JSON, else a fixed
    /// plain-text 500. `405` responses carry `Allow`; `401` responses carry the
    /// route's `WWW-Authenticate` challenges.
    pub fn respond_error(
        &self,
        req: &mut HttpRequest,
        route: Option<&MatchedRoute>,
        err: &ApiError,
    ) -> http::Response<Vec<u8>> {
        let primary = err.primary();
        let status = primary.status();
        let mut response = Self::base_response(req, status);

        if let ApiError::MethodNotAllowed { allowed, .. } = primary {
            if let Ok(value) = HeaderValue::from_str(&allowed.join(",")) {
                response.headers_mut().insert(ALLOW, value);
            }
        }
        if status == StatusCode::UNAUTHORIZED {
            for challenge in req.state().challenges() {
                if let Ok(value) = HeaderValue::from_str(challenge) {
                    response.headers_mut().append(WWW_AUTHENTICATE, value);
                }
            }
        }
        if req.method == Method::HEAD {
            return response;
        }

        let offers = self.offers(route);
        let negotiated = self
            .response_format(req, &offers)
            .and_then(|format| self.producer_for(route, &format).map(|p| (format, p)));
        let candidates = negotiated.into_iter().chain(
            self.api
                .codecs()
                .producer_for(JSON_MIME)
                .map(|p| (JSON_MIME.to_string(), p)),
        );

        for (format, producer) in candidates {
            let mut body = Vec::new();
            match producer.produce(&mut body, Payload::structured(primary.to_body())) {
                Ok(()) => {
                    if let Ok(value) = HeaderValue::from_str(&format) {
                        response.headers_mut().insert(CONTENT_TYPE, value);
                    }
                    *response.body_mut() = body;
                    return response;
                }
                Err(produce_err) => {
                    warn!(format = %format, error = %produce_err, "Could not render error body");
                }
            }
        }

        let mut response = Self::base_response(req, StatusCode::INTERNAL_SERVER_ERROR);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_MIME));
        *response.body_mut() = FALLBACK_ERROR_BODY.as_bytes().to_vec();
        response
    }
}
