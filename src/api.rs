//! # API Registry
//!
//! [`Api`] gathers everything the runtime needs besides the operation metadata:
//! the codec registry, authenticators per security scheme, the authorizer, the
//! optional request validator, and the operation handlers.
//!
//! It is configured with `&mut self` methods during setup, then shared read-only
//! (usually behind an `Arc`) by the router and the request pipeline.

use http::Method;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::codec::{CodecRegistry, Consumer, Producer, JSON_MIME};
use crate::handler::OperationHandler;
use crate::security::{AllowAll, Authenticator, Authorizer};
use crate::spec::OperationMeta;
use crate::validator::RequestValidator;

pub struct Api {
    codecs: CodecRegistry,
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    authorizer: Arc<dyn Authorizer>,
    validator: Option<Arc<dyn RequestValidator>>,
    handlers: HashMap<String, Arc<dyn OperationHandler>>,
    route_handlers: HashMap<(Method, String), Arc<dyn OperationHandler>>,
    default_consumes: String,
    default_produces: String,
}

impl Default for Api {
    fn default() -> Self {
        Self::new()
    }
}

impl Api {
    /// An API with the standard codecs, no handlers, and an authorizer that allows
    /// every authenticated request.
    #[must_use]
    pub fn new() -> Self {
        Self::with_codecs(CodecRegistry::with_defaults())
    }

    #[must_use]
    pub fn with_codecs(codecs: CodecRegistry) -> Self {
        Self {
            codecs,
            authenticators: HashMap::new(),
            authorizer: Arc::new(AllowAll),
            validator: None,
            handlers: HashMap::new(),
            route_handlers: HashMap::new(),
            default_consumes: JSON_MIME.to_string(),
            default_produces: JSON_MIME.to_string(),
        }
    }

    #[must_use]
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn register_consumer(&mut self, mime: impl Into<String>, consumer: Arc<dyn Consumer>) {
        self.codecs.register_consumer(mime, consumer);
    }

    pub fn register_producer(&mut self, mime: impl Into<String>, producer: Arc<dyn Producer>) {
        self.codecs.register_producer(mime, producer);
    }

    /// Authenticator for a scheme named in `securityDefinitions`.
    pub fn register_auth(&mut self, scheme: impl Into<String>, authenticator: Arc<dyn Authenticator>) {
        let scheme = scheme.into();
        debug!(scheme = %scheme, "Registered authenticator");
        self.authenticators.insert(scheme, authenticator);
    }

    #[must_use]
    pub fn authenticator(&self, scheme: &str) -> Option<Arc<dyn Authenticator>> {
        self.authenticators.get(scheme).cloned()
    }

    pub fn set_authorizer(&mut self, authorizer: Arc<dyn Authorizer>) {
        self.authorizer = authorizer;
    }

    #[must_use]
    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    pub fn set_validator(&mut self, validator: Arc<dyn RequestValidator>) {
        self.validator = Some(validator);
    }

    #[must_use]
    pub fn validator(&self) -> Option<&Arc<dyn RequestValidator>> {
        self.validator.as_ref()
    }

    /// Handler for an operation id.
    pub fn register_handler<H: OperationHandler + 'static>(&mut self, operation_id: impl Into<String>, handler: H) {
        let operation_id = operation_id.into();
        debug!(operation_id = %operation_id, "Registered handler");
        self.handlers.insert(operation_id, Arc::new(handler));
    }

    /// Handler for a declared method and path; wins over an operation id handler.
    pub fn register_route_handler<H: OperationHandler + 'static>(
        &mut self,
        method: Method,
        path: impl Into<String>,
        handler: H,
    ) {
        let path = path.into();
        debug!(method = %method, path = %path, "Registered route handler");
        self.route_handlers.insert((method, path), Arc::new(handler));
    }

    #[must_use]
    pub fn handler_for(&self, op: &OperationMeta) -> Option<Arc<dyn OperationHandler>> {
        self.route_handlers
            .get(&(op.method.clone(), op.path.clone()))
            .or_else(|| self.handlers.get(&op.operation_id))
            .cloned()
    }

    /// Media type used when neither the operation nor the document declares `consumes`.
    #[must_use]
    pub fn default_consumes(&self) -> &str {
        &self.default_consumes
    }

    /// Media type used when neither the operation nor the document declares
    /// `produces`, and for responses when negotiation finds nothing.
    #[must_use]
    pub fn default_produces(&self) -> &str {
        &self.default_produces
    }

    pub fn set_default_consumes(&mut self, mime: impl Into<String>) {
        self.default_consumes = mime.into();
    }

    pub fn set_default_produces(&mut self, mime: impl Into<String>) {
        self.default_produces = mime.into();
    }
}

impl std::fmt::Debug for Api {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<&String> = self.authenticators.keys().collect();
        schemes.sort();
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("Api")
            .field("codecs", &self.codecs)
            .field("authenticators", &schemes)
            .field("handlers", &handlers)
            .field("route_handlers", &self.route_handlers.len())
            .field("default_consumes", &self.default_consumes)
            .field("default_produces", &self.default_produces)
            .finish_non_exhaustive()
    }
}
