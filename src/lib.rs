//! # brrtrouter-runtime
//!
//! Runtime support for OpenAPI (Swagger 2.0) driven HTTP services: routing, content
//! negotiation, parameter binding, security and serialization codecs.
//!
//! ## Overview
//!
//! Given an [`ApiDefinition`] (loaded from a document with [`load_spec`] or built in
//! code) and an [`Api`] holding codecs, authenticators and handlers, an
//! [`ApiService`] takes an `http::Request` and:
//!
//! 1. resolves method and path to a route (404, or 405 with `Allow`)
//! 2. validates `Content-Type` against the operation's `consumes` and picks the
//!    consumer (415), and checks `Accept` against `produces` (406)
//! 3. authenticates and authorizes (401 / 403)
//! 4. binds every declared parameter from path, query, header, form, file or body,
//!    coercing it to its declared type (400 / 422)
//! 5. calls the operation handler and serializes its reply through the negotiated
//!    producer
//!
//! No async runtime or server is bundled; [`ApiService::serve`] is synchronous and
//! takes any `Read` body, so it can sit behind whichever HTTP server the
//! application uses.
//!
//! ## Architecture
//!
//! - **[`codec`]** - `Consumer` / `Producer` traits, the codec registry and the
//!   JSON, XML, YAML, CSV, text, byte stream and form codecs
//! - **[`negotiate`]** - `Content-Type` parsing and `Accept` negotiation
//! - **[`coerce`]** - string to typed value conversion per declared type and format
//! - **[`binder`]** - the untyped request binder, form parsing and file uploads
//! - **[`client`]** - outbound request writers, response readers and credential writers
//! - **[`router`]** - radix tree router with `{name}` and composite segments
//! - **[`security`]** - authenticators (basic, api key, bearer) and authorizers
//! - **[`context`]** - the pipeline stages, each cached on the request
//! - **[`service`]** - the end-to-end [`ApiService`]
//! - **[`spec`]** - the API definition model and Swagger 2.0 loader
//! - **[`errors`]** - [`ApiError`] and its status mapping
//!
//! ## Example
//!
//! ```rust
//! use brrtrouter_runtime::{Api, ApiDefinition, ApiError, ApiService, BoundRequest, Reply};
//! use brrtrouter_runtime::runtime_config::RuntimeConfig;
//! use brrtrouter_runtime::spec::{OperationMeta, ParameterDescriptor, SimpleType};
//! use http::Method;
//! use std::sync::Arc;
//!
//! fn get_pet(req: &BoundRequest) -> Result<Reply, ApiError> {
//!     let id = req.param("id").and_then(|v| v.as_i64()).unwrap_or_default();
//!     Ok(Reply::json(serde_json::json!({ "id": id, "name": "Rex" })))
//! }
//!
//! let definition = ApiDefinition::new("/api").operation(
//!     OperationMeta::new(Method::GET, "/pets/{id}", "getPet").param(
//!         ParameterDescriptor::path("id").typed(SimpleType::Integer, Some("int64")),
//!     ),
//! );
//! let mut api = Api::new();
//! api.register_handler("getPet", get_pet);
//!
//! let service = ApiService::new(Arc::new(api), &definition, RuntimeConfig::default()).unwrap();
//! let response = service.serve(http::Request::get("/api/pets/7").body(std::io::empty()).unwrap());
//! assert_eq!(response.status(), 200);
//! ```
//!
//! ## Logging
//!
//! Everything logs through `tracing` with structured fields (`request_id`,
//! `operation_id`, `method`, `path`). [`logging::init_logging_with_config`] installs
//! a JSON or pretty subscriber configured from `BRRTR_LOG_*` variables.

pub mod api;
pub mod binder;
pub mod client;
pub mod codec;
pub mod coerce;
pub mod context;
pub mod errors;
pub mod handler;
pub mod ids;
pub mod logging;
pub mod negotiate;
pub mod request;
pub mod router;
pub mod runtime_config;
pub mod security;
pub mod service;
pub mod spec;
pub mod validator;

pub use api::Api;
pub use codec::{CodecRegistry, Consumer, Payload, Producer};
pub use context::Context;
pub use errors::{ApiError, ErrorBody};
pub use handler::{BoundRequest, OperationHandler, Reply};
pub use request::HttpRequest;
pub use router::{MatchedRoute, RouteEntry, Router};
pub use service::ApiService;
pub use spec::{load_spec, load_spec_from_str, ApiDefinition, OperationMeta, ParameterDescriptor};
