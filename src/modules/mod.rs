//! Module System
//!
//! Module objects, the loaded-module cache and the loader seam that supplies
//! module bodies.
//!
//! # Features
//! - Module objects with a sorted attribute table
//! - Insertion-ordered loaded-module cache (each module executed once)
//! - Pluggable [`ModuleLoader`]; [`MemoryLoader`] keeps definitions in memory
//!   and lets callers replace them to simulate an edit
//!
//! # Example
//! ```no_run
//! use rebind::modules::MemoryLoader;
//! use rebind::runtime::Runtime;
//! use std::rc::Rc;
//!
//! let loader = Rc::new(MemoryLoader::new());
//! loader.define("greeting", |m| {
//!     m.set("message", "hello");
//!     Ok(())
//! });
//! let runtime = Runtime::new(loader);
//! let module = runtime.import("greeting").unwrap();
//! assert!(module.has_attr("message"));
//! ```

use crate::runtime::{ModuleBuilder, Namespace, Value};
use crate::error::Result;
use indexmap::IndexMap;
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a loaded module
pub type ModuleRef = Rc<Module>;

/// Executable body of a module
pub type ModuleBody = Rc<dyn Fn(&mut ModuleBuilder<'_>) -> Result<()>>;

/// How a module was provided to the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    /// Regular module executed from a definition
    Source,
    /// Compiled into the runtime
    Builtin,
    /// Snapshotted into the runtime image
    Frozen,
}

/// A loaded module
pub struct Module {
    name: String,
    kind: ModuleKind,
    origin: Option<String>,
    attributes: RefCell<BTreeMap<String, Value>>,
}

impl Module {
    pub fn new(name: impl Into<String>, kind: ModuleKind, origin: Option<String>) -> ModuleRef {
        Rc::new(Self {
            name: name.into(),
            kind,
            origin,
            attributes: RefCell::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModuleKind {
        self.kind
    }

    /// Where the module definition came from
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.attributes.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.borrow_mut().insert(name.into(), value.into());
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.borrow().contains_key(name)
    }

    /// Attribute names in sorted order
    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.borrow().keys().cloned().collect()
    }

    /// Textual representation, e.g. `<module 'json' (built-in)>`
    pub fn repr(&self) -> String {
        match (self.kind, &self.origin) {
            (ModuleKind::Builtin, _) => format!("<module '{}' (built-in)>", self.name),
            (ModuleKind::Frozen, _) => format!("<module '{}' (frozen)>", self.name),
            (ModuleKind::Source, Some(origin)) => {
                format!("<module '{}' from '{}'>", self.name, origin)
            }
            (ModuleKind::Source, None) => format!("<module '{}'>", self.name),
        }
    }
}

impl Namespace for Module {
    fn names(&self) -> Vec<String> {
        self.attribute_names()
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("attributes", &self.attribute_names())
            .finish()
    }
}

/// Loaded-module cache keyed by module name
///
/// Cloning yields another handle to the same cache. Iteration follows
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct ModuleCache {
    modules: Rc<RefCell<IndexMap<String, ModuleRef>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ModuleRef> {
        self.modules.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.borrow().contains_key(name)
    }

    /// Insert or replace a module, keeping its original position on replace
    pub fn insert(&self, module: ModuleRef) {
        self.modules
            .borrow_mut()
            .insert(module.name().to_string(), module);
    }

    /// Remove a module; later entries keep their relative order
    pub fn evict(&self, name: &str) -> Option<ModuleRef> {
        self.modules.borrow_mut().shift_remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.borrow().keys().cloned().collect()
    }

    /// Snapshot of all `(name, module)` pairs in insertion order
    pub fn entries(&self) -> Vec<(String, ModuleRef)> {
        self.modules
            .borrow()
            .iter()
            .map(|(name, module)| (name.clone(), Rc::clone(module)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.modules.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.borrow().is_empty()
    }
}

/// Everything the runtime needs to execute a module
#[derive(Clone)]
pub struct ModuleSpec {
    pub kind: ModuleKind,
    pub origin: Option<String>,
    pub body: ModuleBody,
}

impl ModuleSpec {
    /// Regular source module
    pub fn source<F>(origin: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut ModuleBuilder<'_>) -> Result<()> + 'static,
    {
        Self {
            kind: ModuleKind::Source,
            origin: Some(origin.into()),
            body: Rc::new(body),
        }
    }

    /// Module compiled into the runtime
    pub fn builtin<F>(body: F) -> Self
    where
        F: Fn(&mut ModuleBuilder<'_>) -> Result<()> + 'static,
    {
        Self {
            kind: ModuleKind::Builtin,
            origin: None,
            body: Rc::new(body),
        }
    }

    /// Module snapshotted into the runtime image
    pub fn frozen<F>(body: F) -> Self
    where
        F: Fn(&mut ModuleBuilder<'_>) -> Result<()> + 'static,
    {
        Self {
            kind: ModuleKind::Frozen,
            origin: None,
            body: Rc::new(body),
        }
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Source of module definitions
pub trait ModuleLoader {
    /// Find the current definition of a module, `None` if it does not exist
    fn find(&self, name: &str) -> Option<ModuleSpec>;
}

/// In-memory module definitions
#[derive(Debug, Default)]
pub struct MemoryLoader {
    definitions: RefCell<HashMap<String, ModuleSpec>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define or replace a source module
    pub fn define<F>(&self, name: &str, body: F)
    where
        F: Fn(&mut ModuleBuilder<'_>) -> Result<()> + 'static,
    {
        let origin = format!("memory://{}", name.replace('.', "/"));
        self.define_spec(name, ModuleSpec::source(origin, body));
    }

    /// Define or replace a module from a full spec
    pub fn define_spec(&self, name: &str, spec: ModuleSpec) {
        self.definitions.borrow_mut().insert(name.to_string(), spec);
    }

    /// Delete a definition; returns whether it existed
    pub fn remove(&self, name: &str) -> bool {
        self.definitions.borrow_mut().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.borrow().contains_key(name)
    }
}

impl ModuleLoader for MemoryLoader {
    fn find(&self, name: &str) -> Option<ModuleSpec> {
        self.definitions.borrow().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_repr() {
        let builtin = Module::new("sys", ModuleKind::Builtin, None);
        let frozen = Module::new("zipimport", ModuleKind::Frozen, None);
        let source = Module::new("app", ModuleKind::Source, Some("memory://app".into()));
        let bare = Module::new("bare", ModuleKind::Source, None);

        assert_eq!(builtin.repr(), "<module 'sys' (built-in)>");
        assert_eq!(frozen.repr(), "<module 'zipimport' (frozen)>");
        assert_eq!(source.repr(), "<module 'app' from 'memory://app'>");
        assert_eq!(bare.to_string(), "<module 'bare'>");
    }

    #[test]
    fn test_attributes_are_sorted() {
        let module = Module::new("m", ModuleKind::Source, None);
        module.set("zeta", 1i64);
        module.set("alpha", 2i64);
        assert_eq!(module.names(), vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(module.lookup("alpha"), Some(Value::Int(2)));
    }

    #[test]
    fn test_cache_preserves_insertion_order_on_evict() {
        let cache = ModuleCache::new();
        for name in ["a", "b", "c"] {
            cache.insert(Module::new(name, ModuleKind::Source, None));
        }
        assert!(cache.evict("b").is_some());
        assert!(cache.evict("b").is_none());
        assert_eq!(cache.names(), vec!["a".to_string(), "c".to_string()]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_handles_are_shared() {
        let cache = ModuleCache::new();
        let other = cache.clone();
        cache.insert(Module::new("shared", ModuleKind::Source, None));
        assert!(other.contains("shared"));
    }

    #[test]
    fn test_memory_loader_replace_and_remove() {
        let loader = MemoryLoader::new();
        assert!(loader.find("m").is_none());

        loader.define("pkg.m", |_| Ok(()));
        let spec = loader.find("pkg.m").unwrap();
        assert_eq!(spec.kind, ModuleKind::Source);
        assert_eq!(spec.origin.as_deref(), Some("memory://pkg/m"));

        loader.define_spec("pkg.m", ModuleSpec::frozen(|_| Ok(())));
        assert_eq!(loader.find("pkg.m").unwrap().kind, ModuleKind::Frozen);

        assert!(loader.remove("pkg.m"));
        assert!(!loader.contains("pkg.m"));
    }
}
