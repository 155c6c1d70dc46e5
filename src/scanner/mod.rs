//! Module Snapshot Scanner
//!
//! Point-in-time captures of what a reload pass operates on: the dynamic
//! classes visible in a namespace, and the loaded modules eligible for
//! reloading. Both scans are pure reads.

use crate::config::{ReloadConfig, ENGINE_PACKAGE};
use crate::error::Result;
use crate::modules::{Module, ModuleCache, ModuleRef};
use crate::registry::ClassRegistry;
use crate::runtime::{ClassRef, Namespace, Runtime, Value};
use indexmap::IndexMap;
use regex::Regex;
use std::rc::Rc;

/// Dynamic classes of one namespace, keyed by the name they are bound to
pub type DynamicClasses = IndexMap<String, ClassRef>;

/// Loaded modules eligible for reloading, in cache order
pub type ModuleSnapshot = IndexMap<String, ModuleRef>;

/// Exclusion rules for [`Scanner::scan_live_modules`]
#[derive(Debug, Clone)]
pub struct ModuleFilter {
    builtin: Regex,
    stdlib_marker: String,
    blocked: Vec<String>,
}

impl ModuleFilter {
    /// Build the filter; the engine's own package is always blocked
    pub fn from_config(config: &ReloadConfig) -> Result<Self> {
        let mut blocked = config.blocked_substrings.clone();
        if !blocked.iter().any(|entry| entry == ENGINE_PACKAGE) {
            blocked.push(ENGINE_PACKAGE.to_string());
        }
        Ok(Self {
            builtin: config.builtin_regex()?,
            stdlib_marker: config.stdlib_marker.clone(),
            blocked,
        })
    }

    /// Whether a cached module may be reloaded
    pub fn admits(&self, name: &str, module: &Module) -> bool {
        let repr = module.repr();
        !self.builtin.is_match(&repr)
            && (self.stdlib_marker.is_empty() || !repr.contains(&self.stdlib_marker))
            && !name.starts_with('_')
            && !self.blocked.iter().any(|blocked| name.contains(blocked.as_str()))
    }
}

/// Scans the module cache and namespaces against the class registry
pub struct Scanner {
    modules: ModuleCache,
    registry: Rc<dyn ClassRegistry>,
    filter: ModuleFilter,
}

impl Scanner {
    /// Scanner over a runtime's cache and registry
    pub fn new(runtime: &Runtime, config: &ReloadConfig) -> Result<Self> {
        Self::with_handles(runtime.modules().clone(), Rc::clone(runtime.registry()), config)
    }

    pub fn with_handles(
        modules: ModuleCache,
        registry: Rc<dyn ClassRegistry>,
        config: &ReloadConfig,
    ) -> Result<Self> {
        Ok(Self {
            modules,
            registry,
            filter: ModuleFilter::from_config(config)?,
        })
    }

    pub fn filter(&self) -> &ModuleFilter {
        &self.filter
    }

    /// Name → class for every value of `namespace` the registry tracks
    pub fn scan_dynamic_classes(&self, namespace: &dyn Namespace) -> DynamicClasses {
        namespace
            .names()
            .into_iter()
            .filter_map(|name| match namespace.lookup(&name) {
                Some(Value::Class(class)) if self.registry.is_dynamic(&class) => {
                    Some((name, class))
                }
                _ => None,
            })
            .collect()
    }

    /// Loaded modules that pass the exclusion rules
    pub fn scan_live_modules(&self) -> ModuleSnapshot {
        self.modules
            .entries()
            .into_iter()
            .filter(|(name, module)| self.filter.admits(name, module))
            .collect()
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("modules", &self.modules)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
