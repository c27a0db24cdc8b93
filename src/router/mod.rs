//! # Router Module
//!
//! Maps `(method, path)` to a compiled [`RouteEntry`] holding everything the
//! later pipeline stages need: parameters, consumes/produces with their codecs,
//! security requirements and the operation handler.
//!
//! ## Compilation
//!
//! [`Router::new`] turns each declared `{name}` placeholder into a native `:name`
//! capture and prefixes the cleaned base path (`/api///` becomes `/api`). A segment
//! may hold a static prefix and several placeholders (`p_{petId}.{petSubId}`): the
//! tree captures everything after the prefix and [`decode_composite_params`] splits
//! it again using the declared pattern. Operations without a registered handler are
//! skipped with a warning.
//!
//! ## Matching
//!
//! - the request path is matched as sent; a trailing slash is a distinct path and
//!   no redirect is ever issued
//! - static segments win over captures, and the search backtracks
//! - captures are percent-decoded; an invalid escape keeps the raw text
//! - a path that exists for other methods resolves to
//!   [`RouteResolution::MethodNotAllowed`] with those methods sorted, which feeds
//!   the `Allow` header of the 405 response
//!
//! ## Example
//!
//! ```rust,ignore
//! let router = Router::new(&definition, &api, &RuntimeConfig::from_env())?;
//! match router.resolve(&Method::GET, "/api/pets/12") {
//!     RouteResolution::Matched(m) => println!("{}", m.params.get("id").unwrap_or_default()),
//!     RouteResolution::MethodNotAllowed(allowed) => println!("Allow: {}", allowed.join(",")),
//!     RouteResolution::NotFound => println!("404"),
//! }
//! ```

mod core;
mod radix;

pub use self::core::{
    clean_base_path, decode_composite_params, to_router_path, MatchedRoute, ParamVec, RouteEntry,
    RouteParams, RouteResolution, Router, MAX_INLINE_PARAMS,
};
