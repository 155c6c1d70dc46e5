//! Reload configuration
//!
//! Controls which loaded modules are eligible for reloading and how far a
//! reload pass reaches. Every field has a default, so a partial JSON document
//! is a valid configuration:
//!
//! ```json
//! {
//!   "blocked_substrings": ["rebind", "vendored."],
//!   "reload_scope": "all_scanned"
//! }
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Matches the textual representation of built-in and frozen modules
pub const DEFAULT_BUILTIN_PATTERN: &str = r"module '[^']+' \((?:built-in|frozen)\)";

/// Package name of the reload engine, blocked regardless of configuration
pub const ENGINE_PACKAGE: &str = env!("CARGO_PKG_NAME");

/// Internal modules that must never be reloaded
pub const DEFAULT_BLOCKED_SUBSTRINGS: &[&str] = &[
    ENGINE_PACKAGE,
    "expat",
    "debugger",
    "xml.parsers.expat.",
    "typing.",
    "runtime_internal",
];

/// Version-tagged path token of the runtime's standard library, e.g. `stdlib-0.1`
pub fn default_stdlib_marker() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let major_minor: Vec<&str> = version.split('.').take(2).collect();
    format!("stdlib-{}", major_minor.join("."))
}

/// Which modules a reload pass evicts and re-executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadScope {
    /// Only modules referenced from the caller's scopes
    #[default]
    Referenced,
    /// Every module in the scanned module snapshot
    AllScanned,
}

/// Reload engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Regex run against a module's textual representation
    pub builtin_pattern: String,
    /// Token identifying standard library modules by origin
    pub stdlib_marker: String,
    /// Module names containing any of these are never reloaded. Replaces
    /// the default list; [`ENGINE_PACKAGE`] is blocked either way.
    pub blocked_substrings: Vec<String>,
    pub reload_scope: ReloadScope,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            builtin_pattern: DEFAULT_BUILTIN_PATTERN.to_string(),
            stdlib_marker: default_stdlib_marker(),
            blocked_substrings: DEFAULT_BLOCKED_SUBSTRINGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reload_scope: ReloadScope::default(),
        }
    }
}

impl ReloadConfig {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Builder-style scope override
    pub fn with_reload_scope(mut self, scope: ReloadScope) -> Self {
        self.reload_scope = scope;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.builtin_regex().map(|_| ())
    }

    /// Compile [`ReloadConfig::builtin_pattern`]
    pub fn builtin_regex(&self) -> Result<Regex> {
        Regex::new(&self.builtin_pattern)
            .map_err(|e| Error::Config(format!("invalid builtin_pattern: {}", e)))
    }
}
