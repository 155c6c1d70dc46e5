//! Shared test helpers for integration tests

#![allow(dead_code)]

use rebind::modules::MemoryLoader;
use rebind::prelude::*;
use std::rc::Rc;

/// A runtime plus the loader backing it, so tests can edit module definitions
pub struct Harness {
    pub loader: Rc<MemoryLoader>,
    pub runtime: Runtime,
}

impl Harness {
    pub fn new() -> Self {
        let loader = Rc::new(MemoryLoader::new());
        let runtime = Runtime::new(loader.clone());
        Self { loader, runtime }
    }

    /// Run one reload pass with the given configuration
    pub fn reload_with(
        &self,
        config: &ReloadConfig,
        locals: &mut Scope,
        globals: &mut Scope,
    ) -> rebind::Result<ReloadReport> {
        let reloader = Reloader::new(&self.runtime, config)?;
        let modules = reloader.scan_live_modules();
        reloader.re_import_modules(&modules, locals, globals)
    }

    /// Run one reload pass with the default configuration
    pub fn reload(&self, locals: &mut Scope, globals: &mut Scope) -> rebind::Result<ReloadReport> {
        self.reload_with(&ReloadConfig::default(), locals, globals)
    }

    /// Attribute of an imported module
    pub fn attr(&self, module: &str, name: &str) -> Value {
        self.runtime
            .import(module)
            .unwrap()
            .get(name)
            .unwrap_or_else(|| panic!("{} has no attribute {}", module, name))
    }
}

/// Class bound to `name` in a scope
pub fn class_in(scope: &Scope, name: &str) -> ClassRef {
    scope
        .get(name)
        .and_then(Value::as_class)
        .cloned()
        .unwrap_or_else(|| panic!("{} is not a class", name))
}

/// Define a module with one dynamic class `Counter` whose `version` attribute
/// identifies the definition
pub fn define_counter(loader: &MemoryLoader, version: i64) {
    loader.define("counters", move |m| {
        m.dynamic_class("Counter")
            .attr("version", version)
            .method("bump", |args| {
                let this = args[0].as_instance().cloned().unwrap();
                let count = this.field("count").and_then(|v| v.as_int()).unwrap_or(0);
                this.set("count", count + 1);
                Ok(Value::Int(count + 1))
            })
            .finish();
        Ok(())
    });
}
