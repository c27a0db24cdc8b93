//! # Runtime Configuration
//!
//! Environment driven settings for the request pipeline.
//!
//! ## Environment Variables
//!
//! ### `BRRTR_DEBUG`
//!
//! Enables verbose routing logs (every registered route at startup, every lookup
//! miss). `SWAGGER_DEBUG` and `DEBUG` are accepted as aliases. Any value that is not
//! empty, `0` or `false` counts as on.
//!
//! ### `BRRTR_MAX_FORM_MEMORY`
//!
//! Upper bound in bytes for a buffered form body (urlencoded or multipart). Accepts
//! decimal (`33554432`) or hexadecimal (`0x2000000`).
//!
//! Default: 32 MiB
//!
//! ## Usage
//!
//! ```rust
//! use brrtrouter_runtime::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Form limit: {} bytes", config.max_form_memory);
//! ```

use std::env;

/// Default form buffering limit.
pub const DEFAULT_MAX_FORM_MEMORY: u64 = 32 << 20;

const DEBUG_VARS: &[&str] = &["BRRTR_DEBUG", "SWAGGER_DEBUG", "DEBUG"];

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Verbose routing logs.
    pub debug: bool,
    /// Form body limit in bytes (default: 32 MiB).
    pub max_form_memory: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            max_form_memory: DEFAULT_MAX_FORM_MEMORY,
        }
    }
}

fn flag_enabled(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let debug = DEBUG_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .any(|v| flag_enabled(&v));
        let max_form_memory = lookup("BRRTR_MAX_FORM_MEMORY")
            .and_then(|v| parse_size(&v))
            .unwrap_or(DEFAULT_MAX_FORM_MEMORY);
        RuntimeConfig {
            debug,
            max_form_memory,
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn with_max_form_memory(mut self, bytes: u64) -> Self {
        self.max_form_memory = bytes;
        self
    }
}
