//! # Spec Module
//!
//! Operation metadata consumed by the router and the binder.
//!
//! An [`ApiDefinition`] can be assembled in code with the builder methods on
//! [`ApiDefinition`], [`OperationMeta`] and [`ParameterDescriptor`], or loaded from a
//! Swagger 2.0 document (YAML or JSON) with [`load_spec`] / [`load_spec_from_str`].
//!
//! The loader understands the subset the runtime needs: `basePath`, `consumes`,
//! `produces`, `paths` with path-level and operation-level parameters,
//! `parameters` references, `definitions` references inside body schemas,
//! `security` and `securityDefinitions`. Everything else in the document is ignored.

mod build;
mod load;
mod types;

pub use build::*;
pub use load::*;
pub use types::*;
