//! Hosted object runtime
//!
//! The runtime owns the loaded-module cache, the module loader and a handle to
//! the dynamic class registry. Module bodies run against a [`ModuleBuilder`]
//! that defines functions, classes and values on the module being executed.

mod scope;
mod value;

pub use scope::{Namespace, Scope};
pub use value::{
    Class, ClassId, ClassRef, Function, FunctionRef, Instance, InstanceRef, NativeFn, ObjectId,
    Value,
};

use crate::error::{Error, Result};
use crate::modules::{Module, ModuleCache, ModuleLoader, ModuleRef, ModuleSpec};
use crate::registry::{ClassRegistry, DynamicClassRegistry};
use rustc_hash::FxHashMap as HashMap;
use std::rc::Rc;
use tracing::{debug, info};

/// The rebind runtime
pub struct Runtime {
    modules: ModuleCache,
    loader: Rc<dyn ModuleLoader>,
    registry: Rc<dyn ClassRegistry>,
}

impl Runtime {
    /// Create a runtime with an empty cache and a fresh registry
    pub fn new(loader: Rc<dyn ModuleLoader>) -> Self {
        Self::with_registry(loader, Rc::new(DynamicClassRegistry::new()))
    }

    /// Create a runtime sharing an existing registry
    pub fn with_registry(loader: Rc<dyn ModuleLoader>, registry: Rc<dyn ClassRegistry>) -> Self {
        Self {
            modules: ModuleCache::new(),
            loader,
            registry,
        }
    }

    /// Handle to the loaded-module cache
    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    pub fn registry(&self) -> &Rc<dyn ClassRegistry> {
        &self.registry
    }

    pub fn loader(&self) -> &Rc<dyn ModuleLoader> {
        &self.loader
    }

    /// Import a module by name
    ///
    /// Returns the cached module when present; otherwise executes the
    /// loader's current definition. The module is visible in the cache while
    /// its body runs and is removed again if the body fails.
    pub fn import(&self, name: &str) -> Result<ModuleRef> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module);
        }
        let spec = self
            .loader
            .find(name)
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;
        self.execute(name, spec)
    }

    fn execute(&self, name: &str, spec: ModuleSpec) -> Result<ModuleRef> {
        let module = Module::new(name, spec.kind, spec.origin.clone());
        self.modules.insert(Rc::clone(&module));
        info!(module = name, kind = ?spec.kind, "executing module");

        let mut builder = ModuleBuilder {
            runtime: self,
            module: Rc::clone(&module),
        };
        if let Err(err) = (spec.body)(&mut builder) {
            debug!(module = name, error = %err, "module body failed, evicting");
            self.modules.evict(name);
            return Err(err.in_module(name));
        }
        Ok(module)
    }

    /// Create an instance and register it when its class is dynamic
    pub fn instantiate<K, V>(
        &self,
        class: &ClassRef,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> InstanceRef
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let instance = Instance::new(Rc::clone(class));
        for (name, value) in fields {
            instance.set(name, value);
        }
        if self.registry.is_dynamic(class) {
            self.registry.record_instance(class, &instance);
        }
        instance
    }

    /// Call a function, or construct an instance of a class
    ///
    /// Constructing runs the class's `__init__` method, if any, with `args`.
    pub fn call(&self, callee: &Value, args: &[Value]) -> Result<Value> {
        match callee {
            Value::Function(func) => func.call(args),
            Value::Class(class) => {
                let instance = self.instantiate(class, std::iter::empty::<(String, Value)>());
                if class.has_attr("__init__") {
                    instance.call_method("__init__", args)?;
                }
                Ok(Value::Instance(instance))
            }
            other => Err(Error::execution(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("modules", &self.modules.names())
            .field("dynamic_classes", &self.registry.created_classes().len())
            .finish_non_exhaustive()
    }
}

/// Handed to a module body while it executes
pub struct ModuleBuilder<'rt> {
    runtime: &'rt Runtime,
    module: ModuleRef,
}

impl<'rt> ModuleBuilder<'rt> {
    /// Name of the module being executed
    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn module(&self) -> &ModuleRef {
        &self.module
    }

    pub fn runtime(&self) -> &'rt Runtime {
        self.runtime
    }

    /// Bind a plain value
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.module.set(name, value);
    }

    /// Define a module-level function
    pub fn function<F>(&mut self, name: &str, body: F) -> FunctionRef
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        let func = Function::new(name, self.module.name(), Rc::new(body));
        self.module.set(name, Rc::clone(&func));
        func
    }

    /// Start a class that is not tracked for migration
    pub fn class(&mut self, name: &str) -> ClassBuilder<'_, 'rt> {
        ClassBuilder::new(self, name, false)
    }

    /// Start a class whose instances migrate on reload
    pub fn dynamic_class(&mut self, name: &str) -> ClassBuilder<'_, 'rt> {
        ClassBuilder::new(self, name, true)
    }

    /// `import name`: bind the module under its own name
    pub fn import(&mut self, name: &str) -> Result<ModuleRef> {
        self.import_as(name, name)
    }

    /// `import name as alias`
    pub fn import_as(&mut self, name: &str, alias: &str) -> Result<ModuleRef> {
        let module = self.runtime.import(name)?;
        self.module.set(alias, Rc::clone(&module));
        Ok(module)
    }

    /// `from module import attr as alias`
    pub fn import_from(&mut self, module: &str, attr: &str, alias: Option<&str>) -> Result<Value> {
        let source = self.runtime.import(module)?;
        let value = source.get(attr).ok_or_else(|| Error::MissingAttribute {
            module: module.to_string(),
            name: attr.to_string(),
        })?;
        self.module.set(alias.unwrap_or(attr), value.clone());
        Ok(value)
    }
}

/// Collects the attributes of a class being defined
pub struct ClassBuilder<'b, 'rt> {
    builder: &'b mut ModuleBuilder<'rt>,
    name: String,
    attributes: HashMap<String, Value>,
    dynamic: bool,
    dependencies: Vec<Option<String>>,
}

impl<'b, 'rt> ClassBuilder<'b, 'rt> {
    fn new(builder: &'b mut ModuleBuilder<'rt>, name: &str, dynamic: bool) -> Self {
        Self {
            builder,
            name: name.to_string(),
            attributes: HashMap::default(),
            dynamic,
            dependencies: Vec::new(),
        }
    }

    /// Add a method; the instance is passed as first argument
    pub fn method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + 'static,
    {
        let func = Function::new(name, self.builder.name(), Rc::new(body));
        self.attributes.insert(name.to_string(), Value::Function(func));
        self
    }

    /// Add a class attribute
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Record a module to re-import before instances of this class migrate.
    /// `None` is an absent marker and is skipped on reload.
    pub fn depends_on(mut self, module: Option<&str>) -> Self {
        self.dependencies.push(module.map(str::to_string));
        self
    }

    /// Create the class and bind it on the module
    pub fn finish(self) -> ClassRef {
        let module_name = self.builder.name().to_string();
        let class = Class::new(self.name.clone(), module_name.clone(), self.attributes);
        if self.dynamic {
            let mut modifications = Vec::with_capacity(self.dependencies.len() + 1);
            modifications.push(Some(module_name));
            modifications.extend(self.dependencies);
            self.builder
                .runtime
                .registry
                .register(&class, modifications);
        }
        self.builder.module.set(self.name, Rc::clone(&class));
        class
    }
}
