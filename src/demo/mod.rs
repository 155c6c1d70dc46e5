//! End-to-end reload demonstration
//!
//! A module defines `StandardClass` (not tracked) and `SomeDynamicClass`
//! (tracked). One instance of each is created, the module is edited to add a
//! `foo` method to both classes, and a reload pass runs over the caller's
//! scopes. Afterwards the dynamic instance belongs to the new class while the
//! standard instance is left on the old one.

use crate::config::ReloadConfig;
use crate::error::{Error, Result};
use crate::modules::MemoryLoader;
use crate::reload::{ReloadReport, Reloader};
use crate::runtime::{InstanceRef, ModuleBuilder, Runtime, Scope, Value};
use std::rc::Rc;

/// Name of the module edited by the demonstration
pub const DEMO_MODULE: &str = "imported_module";

/// Install the original or the edited definition of [`DEMO_MODULE`]
pub fn define_imported_module(loader: &MemoryLoader, modified: bool) {
    loader.define(DEMO_MODULE, move |m| define_classes(m, modified));
}

fn define_classes(m: &mut ModuleBuilder<'_>, modified: bool) -> Result<()> {
    let mut standard = m.class("StandardClass").method("__init__", init_label("standard"));
    if modified {
        standard = standard.method("foo", |_| Ok(Value::from("StandardClass.foo")));
    }
    standard.finish();

    let mut dynamic = m
        .dynamic_class("SomeDynamicClass")
        .method("__init__", init_label("dynamic"));
    if modified {
        dynamic = dynamic.method("foo", |args| {
            let label = self_arg(args)?.get("label").unwrap_or(Value::None);
            Ok(Value::from(format!("SomeDynamicClass.foo on {}", label)))
        });
    }
    dynamic.finish();
    Ok(())
}

fn init_label(label: &'static str) -> impl Fn(&[Value]) -> Result<Value> + 'static {
    move |args| {
        self_arg(args)?.set("label", label);
        Ok(Value::None)
    }
}

fn self_arg(args: &[Value]) -> Result<&InstanceRef> {
    args.first()
        .and_then(Value::as_instance)
        .ok_or_else(|| Error::execution("method called without an instance"))
}

/// Observations of one class/instance pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassObservation {
    pub class_has_foo: bool,
    pub instance_is_current: bool,
}

/// Everything the demonstration checks
#[derive(Debug, Clone)]
pub struct DemoOutcome {
    pub standard_before: ClassObservation,
    pub dynamic_before: ClassObservation,
    pub standard_after: ClassObservation,
    pub dynamic_after: ClassObservation,
    /// Result of calling `foo` on the migrated dynamic instance
    pub dynamic_foo: Option<String>,
    pub report: ReloadReport,
}

impl DemoOutcome {
    /// Whether the run behaved as documented on this module
    pub fn matches_expectations(&self) -> bool {
        let untouched = ClassObservation {
            class_has_foo: false,
            instance_is_current: true,
        };
        self.standard_before == untouched
            && self.dynamic_before == untouched
            && self.standard_after
                == ClassObservation {
                    class_has_foo: true,
                    instance_is_current: false,
                }
            && self.dynamic_after
                == ClassObservation {
                    class_has_foo: true,
                    instance_is_current: true,
                }
    }
}

fn observe(scope: &Scope, class_name: &str, instance: &InstanceRef) -> Result<ClassObservation> {
    let class = scope
        .get(class_name)
        .and_then(Value::as_class)
        .ok_or_else(|| Error::execution(format!("'{}' is not bound to a class", class_name)))?;
    Ok(ClassObservation {
        class_has_foo: class.has_attr("foo"),
        instance_is_current: instance.is_instance(class),
    })
}

fn construct(runtime: &Runtime, scope: &Scope, class_name: &str) -> Result<InstanceRef> {
    let class = scope
        .get(class_name)
        .ok_or_else(|| Error::execution(format!("'{}' is not bound", class_name)))?;
    match runtime.call(class, &[])? {
        Value::Instance(instance) => Ok(instance),
        other => Err(Error::execution(format!(
            "constructing '{}' produced a {}",
            class_name,
            other.type_name()
        ))),
    }
}

/// Run the demonstration on a fresh runtime
pub fn run(config: &ReloadConfig) -> Result<DemoOutcome> {
    let loader = Rc::new(MemoryLoader::new());
    define_imported_module(&loader, false);
    let runtime = Runtime::new(loader.clone());

    // from imported_module import StandardClass, SomeDynamicClass
    let module = runtime.import(DEMO_MODULE)?;
    let mut globals = Scope::new();
    for name in ["StandardClass", "SomeDynamicClass"] {
        let value = module.get(name).ok_or_else(|| Error::MissingAttribute {
            module: DEMO_MODULE.to_string(),
            name: name.to_string(),
        })?;
        globals.insert(name, value);
    }
    let mut locals = Scope::new();

    let standard_instance = construct(&runtime, &globals, "StandardClass")?;
    let dynamic_instance = construct(&runtime, &globals, "SomeDynamicClass")?;
    locals.insert("standard_instance", Rc::clone(&standard_instance));
    locals.insert("dynamic_instance", Rc::clone(&dynamic_instance));

    let standard_before = observe(&globals, "StandardClass", &standard_instance)?;
    let dynamic_before = observe(&globals, "SomeDynamicClass", &dynamic_instance)?;

    define_imported_module(&loader, true);
    let reloader = Reloader::new(&runtime, config)?;
    let modules = reloader.scan_live_modules();
    let report = reloader.re_import_modules(&modules, &mut locals, &mut globals)?;

    let standard_after = observe(&globals, "StandardClass", &standard_instance)?;
    let dynamic_after = observe(&globals, "SomeDynamicClass", &dynamic_instance)?;
    let dynamic_foo = dynamic_instance
        .call_method("foo", &[])
        .ok()
        .and_then(|value| value.as_str().map(str::to_string));

    Ok(DemoOutcome {
        standard_before,
        dynamic_before,
        standard_after,
        dynamic_after,
        dynamic_foo,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_matches_expectations() {
        let outcome = run(&ReloadConfig::default()).unwrap();
        assert!(outcome.matches_expectations(), "{:?}", outcome);
        assert_eq!(
            outcome.dynamic_foo.as_deref(),
            Some("SomeDynamicClass.foo on dynamic")
        );
        assert_eq!(outcome.report.migrated_instances, 1);
    }
}
