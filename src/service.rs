//! # API Service
//!
//! [`ApiService`] is the transport-independent entry point: it takes an
//! `http::Request` whose body is any `Read`, runs the full pipeline, and returns an
//! `http::Response<Vec<u8>>`. Plugging it into a server means converting that
//! server's request type into `http::Request` and writing the response back.
//!
//! ```rust
//! use brrtrouter_runtime::api::Api;
//! use brrtrouter_runtime::errors::ApiError;
//! use brrtrouter_runtime::handler::{BoundRequest, Reply};
//! use brrtrouter_runtime::runtime_config::RuntimeConfig;
//! use brrtrouter_runtime::service::ApiService;
//! use brrtrouter_runtime::spec::{ApiDefinition, OperationMeta};
//! use http::Method;
//! use std::sync::Arc;
//!
//! fn ping(_: &BoundRequest) -> Result<Reply, ApiError> {
//!     Ok(Reply::json("pong"))
//! }
//!
//! let definition = ApiDefinition::new("/api")
//!     .operation(OperationMeta::new(Method::GET, "/ping", "ping"));
//! let mut api = Api::new();
//! api.register_handler("ping", ping);
//!
//! let service = ApiService::new(Arc::new(api), &definition, RuntimeConfig::default()).unwrap();
//! let request = http::Request::get("/api/ping").body(std::io::empty()).unwrap();
//! let response = service.serve(request);
//! assert_eq!(response.status(), 200);
//! assert_eq!(response.body(), b"\"pong\"");
//! ```

use std::any::Any;
use std::io::Read;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::api::Api;
use crate::context::Context;
use crate::errors::ApiError;
use crate::handler::{BoundRequest, Reply};
use crate::request::HttpRequest;
use crate::router::{MatchedRoute, Router};
use crate::runtime_config::RuntimeConfig;
use crate::spec::ApiDefinition;

#[derive(Clone, Debug)]
pub struct ApiService {
    context: Context,
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl ApiService {
    /// Build the router for `definition` and wrap it with `api`.
    ///
    /// # Errors
    ///
    /// Whatever [`Router::new`] rejects: a fatal definition issue or an unregistered
    /// security scheme.
    pub fn new(api: Arc<Api>, definition: &ApiDefinition, config: RuntimeConfig) -> anyhow::Result<Self> {
        let router = Router::new(definition, &api, &config)?;
        Ok(Self {
            context: Context::new(api, Arc::new(router), config),
        })
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Handle one request end to end.
    pub fn serve<B: Read + Send + 'static>(&self, request: http::Request<B>) -> http::Response<Vec<u8>> {
        let mut request = HttpRequest::from_http(request);
        self.handle(&mut request)
    }

    /// Handle an already wrapped request.
    pub fn handle(&self, req: &mut HttpRequest) -> http::Response<Vec<u8>> {
        let start = Instant::now();
        let (route, outcome) = match self.context.route_info(req) {
            Ok(route) => {
                let outcome = self.execute(req, &route);
                (Some(route), outcome)
            }
            Err(err) => (None, Err(err)),
        };
        let response = match outcome {
            Ok(reply) => self.context.respond(req, route.as_ref(), reply),
            Err(err) => self.context.respond_error(req, route.as_ref(), &err),
        };
        info!(
            request_id = %req.request_id(),
            method = %req.method,
            path = %req.path(),
            operation_id = route.as_ref().map_or("", |r| r.entry.operation_id.as_str()),
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Request complete"
        );
        response
    }

    fn execute(&self, req: &mut HttpRequest, route: &MatchedRoute) -> Result<Reply, ApiError> {
        let ctx = &self.context;
        ctx.negotiate(req, &route.entry)?;
        let principal = ctx.authorize(req, route)?;
        let params = ctx.bind_and_validate(req, route)?;

        let bound = BoundRequest {
            request_id: req.request_id(),
            method: req.method.clone(),
            route: route.clone(),
            params,
            principal,
        };
        let handler = Arc::clone(&route.entry.handler);
        match catch_unwind(AssertUnwindSafe(|| handler.handle(&bound))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    request_id = %bound.request_id,
                    operation_id = %route.entry.operation_id,
                    panic_message = %message,
                    "Handler panicked"
                );
                Err(ApiError::internal(message))
            }
        }
    }
}
