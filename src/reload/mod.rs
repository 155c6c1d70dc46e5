//! Reload & Rebind Engine
//!
//! Re-executes modules and patches every outstanding reference to their old
//! contents:
//!
//! 1. classify the caller's scopes into callables sourced from modules and
//!    direct module bindings
//! 2. resolve the module-level name of every callable (handles aliases)
//! 3. snapshot the dynamic classes of each affected module, then evict it
//! 4. re-execute the modules and migrate the instances of every snapshotted
//!    class onto its new definition
//! 5. write the fresh values back into the scopes
//!
//! A failure part-way leaves already-evicted modules out of the cache; there
//! is no rollback.

use crate::config::{ReloadConfig, ReloadScope};
use crate::error::{Error, Result};
use crate::modules::{Module, ModuleKind, ModuleRef};
use crate::runtime::{Runtime, Scope, Value};
use crate::scanner::{DynamicClasses, ModuleSnapshot, Scanner};
use indexmap::IndexSet;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::rc::Rc;
use tracing::{debug, info, trace};

/// Pre-eviction dynamic-class snapshots, keyed by module name
pub type Snapshots = HashMap<String, DynamicClasses>;

/// Scope name excluded from module rebinding
const BUILTINS_BINDING: &str = "__builtins__";

/// What a reload pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    /// Modules that were evicted and are loaded again
    pub reloaded: Vec<String>,
    /// Scope names that now hold fresh values
    pub rebound: Vec<String>,
    /// Instances whose class pointer was rewritten
    pub migrated_instances: usize,
}

/// State shared by every `re_import` of one pass
struct ReloadPass<'s> {
    snapshots: &'s Snapshots,
    migrated: HashSet<String>,
    migrated_instances: usize,
}

impl<'s> ReloadPass<'s> {
    fn new(snapshots: &'s Snapshots) -> Self {
        Self {
            snapshots,
            migrated: HashSet::default(),
            migrated_instances: 0,
        }
    }
}

/// A callable bound in a scope, traced back to its module
struct CallableBinding {
    variable: String,
    module: String,
    exposed_as: String,
}

/// Drives reload passes against one runtime
pub struct Reloader<'rt> {
    runtime: &'rt Runtime,
    scanner: Scanner,
    scope: ReloadScope,
}

impl<'rt> Reloader<'rt> {
    pub fn new(runtime: &'rt Runtime, config: &ReloadConfig) -> Result<Self> {
        Ok(Self {
            runtime,
            scanner: Scanner::new(runtime, config)?,
            scope: config.reload_scope,
        })
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    /// Loaded modules eligible for reloading
    pub fn scan_live_modules(&self) -> ModuleSnapshot {
        self.scanner.scan_live_modules()
    }

    /// Reload one module and migrate the instances of its dynamic classes
    ///
    /// Returns the cached module untouched if it is already loaded.
    /// `snapshots` must hold an entry for `module_name`.
    pub fn re_import(&self, module_name: &str, snapshots: &Snapshots) -> Result<ModuleRef> {
        let mut pass = ReloadPass::new(snapshots);
        self.re_import_in(&mut pass, module_name)
    }

    fn re_import_in(&self, pass: &mut ReloadPass<'_>, module_name: &str) -> Result<ModuleRef> {
        if let Some(module) = self.runtime.modules().get(module_name) {
            return Ok(module);
        }
        if !pass.snapshots.contains_key(module_name) {
            return Err(Error::MissingSnapshot(module_name.to_string()));
        }
        let module = self.runtime.import(module_name)?;
        self.migrate(pass, module_name, &module)?;
        Ok(module)
    }

    /// Move the instances of every snapshotted class of `module_name` onto
    /// the class of the same name in `module`. Runs at most once per module
    /// and pass.
    fn migrate(&self, pass: &mut ReloadPass<'_>, module_name: &str, module: &Module) -> Result<()> {
        let snapshots = pass.snapshots;
        let classes = snapshots
            .get(module_name)
            .ok_or_else(|| Error::MissingSnapshot(module_name.to_string()))?;
        if !pass.migrated.insert(module_name.to_string()) {
            return Ok(());
        }
        let registry = self.runtime.registry();

        for (variable, old_class) in classes {
            for dependency in registry.modifications(old_class).iter().skip(1).flatten() {
                match self.runtime.import(dependency) {
                    Ok(_) => {}
                    Err(err) if err.is_module_not_found() => {
                        debug!(class = %old_class.qualified_name(), dependency = %dependency, "skipping missing dependency");
                    }
                    Err(err) => return Err(err),
                }
            }

            let new_class = match module.get(variable) {
                Some(Value::Class(class)) => class,
                Some(other) => {
                    return Err(Error::NotAClass {
                        module: module_name.to_string(),
                        name: variable.clone(),
                        found: other.type_name(),
                    })
                }
                None => {
                    return Err(Error::MissingAttribute {
                        module: module_name.to_string(),
                        name: variable.clone(),
                    })
                }
            };

            if Rc::ptr_eq(old_class, &new_class) {
                debug!(class = %new_class.qualified_name(), "class unchanged, nothing to migrate");
                continue;
            }

            let instances = registry.instances(old_class);
            for instance in &instances {
                trace!(instance = %instance.id(), class = %new_class.qualified_name(), "rebinding instance");
                instance.set_class(Rc::clone(&new_class));
            }
            registry.adopt_instances(old_class, &new_class);
            pass.migrated_instances += instances.len();
            debug!(
                class = %new_class.qualified_name(),
                old = %old_class.id(),
                new = %new_class.id(),
                instances = instances.len(),
                "migrated dynamic class"
            );
        }
        Ok(())
    }

    /// Reload the modules referenced from `locals` and `globals` and rebind
    /// every stale name in place
    ///
    /// `modules` is the eligible universe, normally
    /// [`Reloader::scan_live_modules`] taken right before the call.
    pub fn re_import_modules(
        &self,
        modules: &ModuleSnapshot,
        locals: &mut Scope,
        globals: &mut Scope,
    ) -> Result<ReloadReport> {
        info!(eligible = modules.len(), "starting reload pass");

        let local_callables = callables_from_modules(locals, modules);
        let global_callables = callables_from_modules(globals, modules);
        let local_modules = module_bindings(locals);
        let global_modules = module_bindings(globals);

        let mut affected: IndexSet<String> = local_modules
            .iter()
            .chain(&global_modules)
            .map(|(_, module)| module.name().to_string())
            .collect();
        let local_callables = translate(local_callables, modules, locals, &mut affected)?;
        let global_callables = translate(global_callables, modules, globals, &mut affected)?;

        let targets: Vec<String> = match self.scope {
            ReloadScope::Referenced => affected
                .iter()
                .filter(|name| modules.contains_key(name.as_str()))
                .cloned()
                .collect(),
            ReloadScope::AllScanned => modules.keys().cloned().collect(),
        };
        let mut snapshots = Snapshots::default();
        for name in &targets {
            let module = &modules[name.as_str()];
            snapshots.insert(name.clone(), self.scanner.scan_dynamic_classes(&**module));
            self.runtime.modules().evict(name);
            debug!(module = %name, "evicted module");
        }

        let mut pass = ReloadPass::new(&snapshots);
        let local_modules = self.reload_bindings(&mut pass, local_modules)?;
        let global_modules = self.reload_bindings(&mut pass, global_modules)?;
        let local_callables = self.resolve_callables(&mut pass, local_callables)?;
        let global_callables = self.resolve_callables(&mut pass, global_callables)?;

        for name in affected.iter().chain(&targets) {
            if pass.snapshots.contains_key(name.as_str()) {
                // Modules pulled in by another module's body were imported
                // without migration.
                let module = self.re_import_in(&mut pass, name)?;
                self.migrate(&mut pass, name, &module)?;
            } else {
                self.runtime.import(name)?;
            }
        }

        let mut rebound = Vec::new();
        for (variable, value) in local_callables {
            locals.insert(variable.clone(), value);
            rebound.push(variable);
        }
        for (variable, value) in global_callables {
            globals.insert(variable.clone(), value);
            rebound.push(variable);
        }
        for (variable, module) in local_modules {
            locals.insert(variable.clone(), module);
            rebound.push(variable);
        }
        for (variable, module) in global_modules {
            globals.insert(variable.clone(), module);
            rebound.push(variable);
        }

        let report = ReloadReport {
            reloaded: targets
                .into_iter()
                .filter(|name| self.runtime.modules().contains(name))
                .collect(),
            rebound,
            migrated_instances: pass.migrated_instances,
        };
        info!(
            reloaded = report.reloaded.len(),
            rebound = report.rebound.len(),
            migrated = report.migrated_instances,
            "reload pass finished"
        );
        Ok(report)
    }

    fn reload_bindings(
        &self,
        pass: &mut ReloadPass<'_>,
        bindings: Vec<(String, ModuleRef)>,
    ) -> Result<Vec<(String, ModuleRef)>> {
        bindings
            .into_iter()
            .map(|(variable, module)| Ok((variable, self.re_import_in(pass, module.name())?)))
            .collect()
    }

    fn resolve_callables(
        &self,
        pass: &mut ReloadPass<'_>,
        bindings: Vec<CallableBinding>,
    ) -> Result<Vec<(String, Value)>> {
        bindings
            .into_iter()
            .map(|binding| {
                let module = self
                    .re_import_in(pass, &binding.module)
                    .map_err(|err| err.in_binding(&binding.module, &binding.exposed_as))?;
                let value = module
                    .get(&binding.exposed_as)
                    .ok_or_else(|| Error::MissingAttribute {
                        module: binding.module.clone(),
                        name: binding.exposed_as.clone(),
                    })?;
                Ok((binding.variable, value))
            })
            .collect()
    }
}

impl std::fmt::Debug for Reloader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reloader")
            .field("scanner", &self.scanner)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Name under which `module` exposes the value bound to `variable` in `scope`
///
/// Same name when the module has it; otherwise the first module attribute
/// holding the identical value, which resolves `from m import X as Y`.
pub fn get_module_variable(module: &Module, scope: &Scope, variable: &str) -> Result<String> {
    if module.has_attr(variable) {
        return Ok(variable.to_string());
    }
    let unresolved = || Error::UnresolvedBinding {
        variable: variable.to_string(),
        module: module.name().to_string(),
    };
    let value = scope.get(variable).ok_or_else(unresolved)?;
    module
        .attribute_names()
        .into_iter()
        .find(|name| module.get(name).is_some_and(|candidate| candidate.is_same(value)))
        .ok_or_else(unresolved)
}

/// `(variable, module name)` for callables whose defining module is eligible
fn callables_from_modules(scope: &Scope, modules: &ModuleSnapshot) -> Vec<(String, String)> {
    scope
        .iter()
        .filter(|(_, value)| value.is_callable())
        .filter_map(|(variable, value)| {
            let module = value.defining_module()?;
            modules
                .contains_key(module)
                .then(|| (variable.clone(), module.to_string()))
        })
        .collect()
}

/// Direct `import module` bindings
fn module_bindings(scope: &Scope) -> Vec<(String, ModuleRef)> {
    scope
        .iter()
        .filter(|(variable, _)| variable.as_str() != BUILTINS_BINDING)
        .filter_map(|(variable, value)| match value {
            Value::Module(module) if module.kind() != ModuleKind::Builtin => {
                Some((variable.clone(), Rc::clone(module)))
            }
            _ => None,
        })
        .collect()
}

fn translate(
    callables: Vec<(String, String)>,
    modules: &ModuleSnapshot,
    scope: &Scope,
    affected: &mut IndexSet<String>,
) -> Result<Vec<CallableBinding>> {
    callables
        .into_iter()
        .map(|(variable, module_name)| {
            let module = &modules[module_name.as_str()];
            affected.insert(module_name.clone());
            let exposed_as = get_module_variable(module, scope, &variable)?;
            if exposed_as != variable {
                debug!(variable = %variable, module = %module_name, exposed_as = %exposed_as, "resolved alias");
            }
            Ok(CallableBinding {
                variable,
                module: module_name,
                exposed_as,
            })
        })
        .collect()
}
