//! Route compilation and lookup.

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::radix::RadixRouter;
use crate::api::Api;
use crate::codec::{Consumer, Producer};
use crate::handler::OperationHandler;
use crate::runtime_config::RuntimeConfig;
use crate::security::RouteAuthenticators;
use crate::spec::{ApiDefinition, OperationMeta, ParameterDescriptor, ParameterLocation};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Capture name / value pairs. Names are shared with the route tree.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{([^{}]+?)\}([^/]*)").expect("placeholder pattern is valid")
});

/// Issue kinds that make an API definition unusable.
const FATAL_ISSUES: &[&str] = &["MultipleBodyParameters"];

/// Path parameters of a matched route, percent-decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(ParamVec);

impl RouteParams {
    /// Value of a capture. The last capture wins when a name repeats.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn push(&mut self, name: impl Into<Arc<str>>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Compiled metadata for one (method, path) pair.
pub struct RouteEntry {
    pub method: Method,
    /// Declared path, relative to the base path, with `{name}` placeholders.
    pub path_pattern: String,
    pub base_path: String,
    pub operation_id: String,
    pub parameters: Vec<ParameterDescriptor>,
    pub consumes: Vec<String>,
    pub produces: Vec<String>,
    pub consumers: HashMap<String, Arc<dyn Consumer>>,
    pub producers: HashMap<String, Arc<dyn Producer>>,
    pub authenticators: RouteAuthenticators,
    pub handler: Arc<dyn OperationHandler>,
    /// Capture name -> declared text following it inside its segment.
    composites: Vec<(String, String)>,
}

impl RouteEntry {
    /// Base path plus declared path.
    #[must_use]
    pub fn full_path(&self) -> String {
        format!("{}{}", self.base_path, self.path_pattern)
    }

    /// Whether the operation reads the body (a body or form parameter).
    #[must_use]
    pub fn expects_body(&self) -> bool {
        self.parameters.iter().any(|p| {
            matches!(
                p.location,
                ParameterLocation::Body | ParameterLocation::FormData
            )
        })
    }

    /// Split decoded raw captures into route params, decomposing composite segments.
    fn decode_params(&self, raw: ParamVec) -> RouteParams {
        let mut params = RouteParams::default();
        for (name, value) in raw {
            let decoded = match urlencoding::decode(&value) {
                Ok(v) => v.into_owned(),
                Err(_) => value,
            };
            match self.composites.iter().find(|(n, _)| n.as_str() == name.as_ref()) {
                Some((_, pattern)) => {
                    let mut pairs = Vec::new();
                    decode_composite_params(&name, &decoded, pattern, &mut pairs);
                    for (n, v) in pairs {
                        params.push(n, v);
                    }
                }
                None => params.push(name, decoded),
            }
        }
        params
    }
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("path_pattern", &self.path_pattern)
            .field("base_path", &self.base_path)
            .field("operation_id", &self.operation_id)
            .field("parameters", &self.parameters.len())
            .field("consumes", &self.consumes)
            .field("produces", &self.produces)
            .finish_non_exhaustive()
    }
}

/// A route matched for a request, with its decoded path parameters.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    pub entry: Arc<RouteEntry>,
    pub params: RouteParams,
}

/// Outcome of resolving a request against the routing table.
#[derive(Debug, Clone)]
pub enum RouteResolution {
    Matched(MatchedRoute),
    /// The path exists for these other methods, sorted.
    MethodNotAllowed(Vec<String>),
    NotFound,
}

/// Convert `{name}` placeholders to `:name` captures.
///
/// Only the first capture of a segment survives; the rest of the segment is
/// recovered from the declared pattern after matching.
#[must_use]
pub fn to_router_path(path: &str) -> String {
    PLACEHOLDER.replace_all(path, ":$1").into_owned()
}

/// Split a composite capture into the named values of its declared segment.
///
/// `pattern` is the declared text following the capture `name` inside its segment,
/// e.g. `.{petSubId}` for `p_{petId}.{petSubId}`. Each static separator is matched
/// at its leftmost occurrence. A value that does not contain the separator is
/// assigned whole to `name`.
pub fn decode_composite_params(
    name: &str,
    value: &str,
    pattern: &str,
    out: &mut Vec<(String, String)>,
) {
    if pattern.is_empty() {
        out.push((name.to_string(), value.to_string()));
        return;
    }
    let (separator, rest) = match pattern.split_once('{') {
        Some((sep, rest)) => (sep, Some(rest)),
        None => (pattern, None),
    };
    if separator.is_empty() {
        out.push((name.to_string(), value.to_string()));
        return;
    }
    let Some((left, right)) = value.split_once(separator) else {
        out.push((name.to_string(), value.to_string()));
        return;
    };
    out.push((name.to_string(), left.to_string()));
    if let Some(rest) = rest {
        let (next, tail) = rest.split_once('}').unwrap_or((rest, ""));
        decode_composite_params(next, right, tail, out);
    }
}

/// Collapse repeated slashes, drop a trailing slash, and map `/` to the empty string.
#[must_use]
pub fn clean_base_path(base_path: &str) -> String {
    let parts: Vec<&str> = base_path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Composite segment suffixes of a declared path.
fn composites_of(path: &str) -> Vec<(String, String)> {
    PLACEHOLDER
        .captures_iter(path)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let rest = caps.get(2)?.as_str();
            (!rest.is_empty()).then(|| (name.to_string(), rest.to_string()))
        })
        .collect()
}

fn join_path(base_path: &str, path: &str) -> String {
    if path.starts_with('/') {
        format!("{base_path}{path}")
    } else {
        format!("{base_path}/{path}")
    }
}

/// Per-method routing table built from an [`ApiDefinition`].
#[derive(Clone)]
pub struct Router {
    radix: RadixRouter,
    base_path: String,
    routes: Vec<Arc<RouteEntry>>,
    debug: bool,
}

impl Router {
    /// Compile every operation that has a registered handler.
    ///
    /// # Arguments
    ///
    /// * `definition` - Operations, base path and API-wide defaults
    /// * `api` - Codecs, authenticators and handlers
    /// * `config` - Runtime settings (`debug` enables per-route logs)
    ///
    /// # Errors
    ///
    /// Fails when the definition declares more than one body parameter on an
    /// operation, or when an operation requires a security scheme with no registered
    /// authenticator.
    pub fn new(definition: &ApiDefinition, api: &Api, config: &RuntimeConfig) -> anyhow::Result<Self> {
        for issue in definition.validate() {
            if FATAL_ISSUES.contains(&issue.kind.as_str()) {
                anyhow::bail!("invalid API definition: {issue}");
            }
            warn!(location = %issue.location, kind = %issue.kind, message = %issue.message, "API definition issue");
        }

        let base_path = clean_base_path(&definition.base_path);
        let mut radix = RadixRouter::default();
        let mut routes = Vec::new();

        for op in &definition.operations {
            let Some(handler) = api.handler_for(op) else {
                warn!(
                    method = %op.method,
                    path = %op.path,
                    operation_id = %op.operation_id,
                    "No handler registered for operation, skipping route"
                );
                continue;
            };
            let entry = Arc::new(Self::compile(definition, api, op, &base_path, handler)?);
            let native = to_router_path(&join_path(&base_path, &op.path));
            if config.debug {
                info!(method = %op.method, path = %native, operation_id = %op.operation_id, "Registered route");
            }
            if let Some(replaced) = radix.insert(&native, Arc::clone(&entry)) {
                warn!(
                    method = %op.method,
                    path = %native,
                    replaced = %replaced.operation_id,
                    operation_id = %op.operation_id,
                    "Route registered twice, last registration wins"
                );
            }
            routes.push(entry);
        }

        // RT5: Routing table loaded
        info!(
            routes_count = routes.len(),
            base_path = %base_path,
            "Routing table loaded"
        );

        Ok(Self {
            radix,
            base_path,
            routes,
            debug: config.debug,
        })
    }

    fn compile(
        definition: &ApiDefinition,
        api: &Api,
        op: &OperationMeta,
        base_path: &str,
        handler: Arc<dyn OperationHandler>,
    ) -> anyhow::Result<RouteEntry> {
        let pick = |declared: &Option<Vec<String>>, document: &[String], fallback: &str| -> Vec<String> {
            match declared {
                Some(list) if !list.is_empty() => list.clone(),
                _ if !document.is_empty() => document.to_vec(),
                _ => vec![fallback.to_string()],
            }
        };
        let consumes = pick(&op.consumes, &definition.consumes, api.default_consumes());
        let produces = pick(&op.produces, &definition.produces, api.default_produces());
        let security = op.security.as_ref().unwrap_or(&definition.security);
        let authenticators = RouteAuthenticators::build(security, api)
            .map_err(|e| e.context(format!("security of {} {}", op.method, op.path)))?;

        Ok(RouteEntry {
            method: op.method.clone(),
            path_pattern: op.path.clone(),
            base_path: base_path.to_string(),
            operation_id: op.operation_id.clone(),
            parameters: op.parameters.clone(),
            consumers: api.codecs().consumers_for(&consumes),
            producers: api.codecs().producers_for(&produces),
            consumes,
            produces,
            authenticators,
            handler,
            composites: composites_of(&op.path),
        })
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Every compiled route, in definition order.
    #[must_use]
    pub fn routes(&self) -> &[Arc<RouteEntry>] {
        &self.routes
    }

    /// Route for exactly this method and path.
    ///
    /// The path is matched as sent: no slash collapsing and no trailing slash
    /// normalization.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Option<MatchedRoute> {
        // RT1: Route match attempt
        debug!(method = %method, path = %path, "Route match attempt");
        let (entry, raw) = self.radix.lookup(method, path)?;
        let params = entry.decode_params(raw);
        if self.debug {
            info!(
                method = %method,
                path = %path,
                operation_id = %entry.operation_id,
                route_pattern = %entry.path_pattern,
                path_params = ?params,
                "Route matched"
            );
        }
        Some(MatchedRoute { entry, params })
    }

    /// Methods registered for `path` other than `method`, sorted.
    #[must_use]
    pub fn other_methods(&self, method: &Method, path: &str) -> Vec<String> {
        let mut methods: Vec<String> = self
            .radix
            .methods_for(path)
            .into_iter()
            .filter(|m| m != method)
            .map(|m| m.as_str().to_string())
            .collect();
        methods.sort();
        methods
    }

    /// Match, or explain why nothing matched.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> RouteResolution {
        if let Some(matched) = self.lookup(method, path) {
            return RouteResolution::Matched(matched);
        }
        let others = self.other_methods(method, path);
        if others.is_empty() {
            // RT4: No route found
            warn!(method = %method, path = %path, "No route matched");
            RouteResolution::NotFound
        } else {
            debug!(method = %method, path = %path, allowed = ?others, "Method not allowed");
            RouteResolution::MethodNotAllowed(others)
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: Vec<String> = self
            .routes
            .iter()
            .map(|r| format!("{} {}", r.method, r.full_path()))
            .collect();
        f.debug_struct("Router")
            .field("base_path", &self.base_path)
            .field("routes", &routes)
            .finish()
    }
}
