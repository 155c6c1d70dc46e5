//! Integration tests for reload passes

mod common;
use common::{class_in, define_counter, Harness};
use rebind::prelude::*;
use std::rc::Rc;

mod migration {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dynamic_instance_keeps_state_after_reload() {
        let h = Harness::new();
        define_counter(&h.loader, 1);
        let mut globals: Scope = [("Counter", h.attr("counters", "Counter"))].into_iter().collect();
        let mut locals = Scope::new();

        let counter = h.runtime.instantiate(&class_in(&globals, "Counter"), [("count", 5i64)]);
        counter.set("owner", "alice");

        define_counter(&h.loader, 2);
        let report = h.reload(&mut locals, &mut globals).unwrap();

        let new_class = class_in(&globals, "Counter");
        assert!(counter.is_instance(&new_class));
        assert_eq!(new_class.get_attr("version"), Some(Value::Int(2)));
        assert_eq!(counter.field("count"), Some(Value::Int(5)));
        assert_eq!(counter.field("owner"), Some(Value::from("alice")));
        assert_eq!(counter.get("version"), Some(Value::Int(2)));
        assert_eq!(report.migrated_instances, 1);
    }

    #[test]
    fn test_non_dynamic_instance_is_orphaned() {
        let h = Harness::new();
        h.loader.define("plain", |m| {
            m.class("Widget").attr("version", 1i64).finish();
            Ok(())
        });
        let mut globals: Scope = [("Widget", h.attr("plain", "Widget"))].into_iter().collect();
        let mut locals = Scope::new();
        let old_class = class_in(&globals, "Widget");
        let widget = h.runtime.instantiate(&old_class, [("size", 3i64)]);

        h.loader.define("plain", |m| {
            m.class("Widget").attr("version", 2i64).finish();
            Ok(())
        });
        h.reload(&mut locals, &mut globals).unwrap();

        let new_class = class_in(&globals, "Widget");
        assert!(!Rc::ptr_eq(&old_class, &new_class));
        assert!(widget.is_instance(&old_class));
        assert!(!widget.is_instance(&new_class));
        assert_eq!(widget.get("version"), Some(Value::Int(1)));
    }

    #[test]
    fn test_migration_chains_across_reloads() {
        let h = Harness::new();
        define_counter(&h.loader, 1);
        let mut globals: Scope = [("Counter", h.attr("counters", "Counter"))].into_iter().collect();
        let mut locals = Scope::new();
        let counter = h.runtime.instantiate(&class_in(&globals, "Counter"), [("count", 0i64)]);

        for version in 2..=4 {
            define_counter(&h.loader, version);
            h.reload(&mut locals, &mut globals).unwrap();
            counter.call_method("bump", &[]).unwrap();
        }

        let current = class_in(&globals, "Counter");
        assert!(counter.is_instance(&current));
        assert_eq!(current.get_attr("version"), Some(Value::Int(4)));
        assert_eq!(counter.field("count"), Some(Value::Int(3)));
        assert_eq!(h.runtime.registry().instances(&current).len(), 1);
    }

    #[test]
    fn test_missing_dependency_is_tolerated() {
        let h = Harness::new();
        let define = |loader: &rebind::modules::MemoryLoader, version: i64| {
            loader.define("models", move |m| {
                m.dynamic_class("Model")
                    .depends_on(Some("deleted_helpers"))
                    .depends_on(None)
                    .attr("version", version)
                    .finish();
                Ok(())
            });
        };
        define(&h.loader, 1);
        let mut globals: Scope = [("Model", h.attr("models", "Model"))].into_iter().collect();
        let mut locals = Scope::new();
        let model = h.runtime.instantiate(&class_in(&globals, "Model"), [("id", 9i64)]);

        define(&h.loader, 2);
        h.reload(&mut locals, &mut globals).unwrap();

        assert!(model.is_instance(&class_in(&globals, "Model")));
        assert!(!h.runtime.modules().contains("deleted_helpers"));
    }

    #[test]
    fn test_existing_dependency_is_imported() {
        let h = Harness::new();
        h.loader.define("helpers", |m| {
            m.function("fmt", |_| Ok(Value::None));
            Ok(())
        });
        h.loader.define("models", |m| {
            m.dynamic_class("Model").depends_on(Some("helpers")).finish();
            Ok(())
        });
        let mut globals: Scope = [("Model", h.attr("models", "Model"))].into_iter().collect();
        let mut locals = Scope::new();
        h.runtime.instantiate(&class_in(&globals, "Model"), [("id", 1i64)]);

        h.reload(&mut locals, &mut globals).unwrap();

        assert!(h.runtime.modules().contains("helpers"));
    }
}

mod rebinding {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_alias_is_rebound_to_new_definition() {
        let h = Harness::new();
        let define = |loader: &rebind::modules::MemoryLoader, answer: i64| {
            loader.define("tools", move |m| {
                m.function("compute", move |_| Ok(Value::Int(answer)));
                Ok(())
            });
        };
        define(&h.loader, 1);
        // from tools import compute as calc
        let mut locals: Scope = [("calc", h.attr("tools", "compute"))].into_iter().collect();
        let mut globals = Scope::new();

        define(&h.loader, 2);
        let report = h.reload(&mut locals, &mut globals).unwrap();

        let calc = locals.get("calc").unwrap();
        assert!(calc.is_same(&h.attr("tools", "compute")));
        assert_eq!(h.runtime.call(calc, &[]).unwrap(), Value::Int(2));
        assert_eq!(report.rebound, vec!["calc".to_string()]);
    }

    #[test]
    fn test_module_binding_is_rebound() {
        let h = Harness::new();
        h.loader.define("config_mod", |m| {
            m.set("level", 1i64);
            Ok(())
        });
        let old = h.runtime.import("config_mod").unwrap();
        let mut globals: Scope = [("config_mod", old.clone())].into_iter().collect();
        let mut locals = Scope::new();

        h.loader.define("config_mod", |m| {
            m.set("level", 2i64);
            Ok(())
        });
        let report = h.reload(&mut locals, &mut globals).unwrap();

        let new = globals.get("config_mod").and_then(Value::as_module).unwrap();
        assert!(!Rc::ptr_eq(&old, new));
        assert_eq!(new.get("level"), Some(Value::Int(2)));
        assert_eq!(report.reloaded, vec!["config_mod".to_string()]);
    }

    #[test]
    fn test_module_aliased_import_is_rebound() {
        let h = Harness::new();
        h.loader.define("numpyish", |m| {
            m.set("tag", "v1");
            Ok(())
        });
        // import numpyish as np
        let mut locals: Scope = [("np", h.runtime.import("numpyish").unwrap())].into_iter().collect();
        let mut globals = Scope::new();

        h.loader.define("numpyish", |m| {
            m.set("tag", "v2");
            Ok(())
        });
        h.reload(&mut locals, &mut globals).unwrap();

        let np = locals.get("np").and_then(Value::as_module).unwrap();
        assert_eq!(np.get("tag"), Some(Value::from("v2")));
    }

    #[test]
    fn test_function_reference_pulls_in_its_module() {
        let h = Harness::new();
        h.loader.define("service", |m| {
            m.dynamic_class("Session").attr("version", 1i64).finish();
            m.function("connect", |_| Ok(Value::None));
            Ok(())
        });
        // Only a function is bound; the class instance lives elsewhere.
        let mut globals: Scope = [("connect", h.attr("service", "connect"))].into_iter().collect();
        let mut locals = Scope::new();
        let session_class = h.attr("service", "Session");
        let session = h.runtime.instantiate(session_class.as_class().unwrap(), [("user", "bob")]);

        h.loader.define("service", |m| {
            m.dynamic_class("Session").attr("version", 2i64).finish();
            m.function("connect", |_| Ok(Value::Bool(true)));
            Ok(())
        });
        h.reload(&mut locals, &mut globals).unwrap();

        assert_eq!(session.get("version"), Some(Value::Int(2)));
        assert_eq!(session.field("user"), Some(Value::from("bob")));
    }

    #[test]
    fn test_unrelated_values_are_untouched() {
        let h = Harness::new();
        define_counter(&h.loader, 1);
        let mut globals: Scope = [("Counter", h.attr("counters", "Counter"))].into_iter().collect();
        globals.insert("answer", 42i64);
        let mut locals: Scope = [("name", Value::from("x"))].into_iter().collect();

        define_counter(&h.loader, 2);
        let report = h.reload(&mut locals, &mut globals).unwrap();

        assert_eq!(globals.get("answer"), Some(&Value::Int(42)));
        assert_eq!(locals.get("name"), Some(&Value::from("x")));
        assert_eq!(report.rebound, vec!["Counter".to_string()]);
    }
}

mod re_import {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_re_import_is_idempotent_within_a_pass() {
        let h = Harness::new();
        let runs = Rc::new(std::cell::Cell::new(0));
        let counter = runs.clone();
        h.loader.define("once", move |m| {
            counter.set(counter.get() + 1);
            m.dynamic_class("Thing").finish();
            Ok(())
        });
        let module = h.runtime.import("once").unwrap();
        let reloader = Reloader::new(&h.runtime, &ReloadConfig::default()).unwrap();
        let mut snapshots = Snapshots::default();
        snapshots.insert("once".into(), reloader.scanner().scan_dynamic_classes(&*module));
        h.runtime.modules().evict("once");

        let first = reloader.re_import("once", &snapshots).unwrap();
        let second = reloader.re_import("once", &snapshots).unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn test_failed_reload_leaves_module_evicted() {
        let h = Harness::new();
        define_counter(&h.loader, 1);
        let mut globals: Scope = [("Counter", h.attr("counters", "Counter"))].into_iter().collect();
        let mut locals = Scope::new();

        h.loader.define("counters", |_| Err(Error::execution("unexpected indent")));
        let err = h.reload(&mut locals, &mut globals).unwrap_err();

        assert!(matches!(err, Error::Execution { .. }));
        assert_eq!(
            err.to_string(),
            "ExecutionError: unexpected indent (in counters.Counter)"
        );
        assert!(!h.runtime.modules().contains("counters"));
        // The stale binding is left as it was.
        assert!(globals.get("Counter").and_then(Value::as_class).is_some());
    }

    #[test]
    fn test_removed_class_is_reported() {
        let h = Harness::new();
        define_counter(&h.loader, 1);
        let mut globals: Scope = [("counters", h.runtime.import("counters").unwrap())]
            .into_iter()
            .collect();
        let mut locals = Scope::new();

        h.loader.define("counters", |_| Ok(()));
        let err = h.reload(&mut locals, &mut globals).unwrap_err();

        assert!(matches!(err, Error::MissingAttribute { ref name, .. } if name == "Counter"));
    }
}

mod scope_modes {
    use super::*;
    use pretty_assertions::assert_eq;

    fn define_app(h: &Harness, version: i64) {
        h.loader.define("app", |m| {
            m.import("models")?;
            Ok(())
        });
        h.loader.define("models", move |m| {
            m.dynamic_class("User").attr("version", version).finish();
            Ok(())
        });
    }

    #[test]
    fn test_referenced_scope_leaves_indirect_modules_alone() {
        let h = Harness::new();
        define_app(&h, 1);
        let mut globals: Scope = [("app", h.runtime.import("app").unwrap())].into_iter().collect();
        let mut locals = Scope::new();
        let user_class = h.attr("models", "User");
        let user = h.runtime.instantiate(user_class.as_class().unwrap(), [("name", "ann")]);

        define_app(&h, 2);
        let report = h.reload(&mut locals, &mut globals).unwrap();

        assert_eq!(report.reloaded, vec!["app".to_string()]);
        assert_eq!(user.get("version"), Some(Value::Int(1)));
    }

    #[test]
    fn test_reexported_class_is_not_counted_as_migrated() {
        let h = Harness::new();
        h.loader.define("models", |m| {
            m.dynamic_class("User").finish();
            Ok(())
        });
        h.loader.define("app", |m| {
            m.import_from("models", "User", None)?;
            Ok(())
        });
        let mut globals: Scope = [("app", h.runtime.import("app").unwrap())].into_iter().collect();
        let mut locals = Scope::new();
        let user_class = h.attr("app", "User").as_class().unwrap().clone();
        let user = h.runtime.instantiate(&user_class, [("name", "ann")]);

        let report = h.reload(&mut locals, &mut globals).unwrap();

        assert_eq!(report.reloaded, vec!["app".to_string()]);
        assert_eq!(report.migrated_instances, 0);
        assert!(Rc::ptr_eq(&user.class(), &user_class));
    }

    #[test]
    fn test_all_scanned_scope_migrates_indirect_modules() {
        let h = Harness::new();
        define_app(&h, 1);
        let mut globals: Scope = [("app", h.runtime.import("app").unwrap())].into_iter().collect();
        let mut locals = Scope::new();
        let user_class = h.attr("models", "User");
        let user = h.runtime.instantiate(user_class.as_class().unwrap(), [("name", "ann")]);

        define_app(&h, 2);
        let config = ReloadConfig::default().with_reload_scope(ReloadScope::AllScanned);
        let report = h.reload_with(&config, &mut locals, &mut globals).unwrap();

        assert_eq!(report.reloaded, vec!["app".to_string(), "models".to_string()]);
        assert_eq!(user.get("version"), Some(Value::Int(2)));
        assert_eq!(user.field("name"), Some(Value::from("ann")));
        assert_eq!(report.migrated_instances, 1);
    }
}

mod demo {
    use super::*;
    use pretty_assertions::assert_eq;
    use rebind::demo;

    #[test]
    fn test_end_to_end_scenario() {
        let outcome = demo::run(&ReloadConfig::default()).unwrap();

        assert!(!outcome.standard_before.class_has_foo);
        assert!(outcome.standard_before.instance_is_current);
        assert!(outcome.standard_after.class_has_foo);
        assert!(!outcome.standard_after.instance_is_current);

        assert!(!outcome.dynamic_before.class_has_foo);
        assert!(outcome.dynamic_after.class_has_foo);
        assert!(outcome.dynamic_after.instance_is_current);
        assert!(outcome.matches_expectations());
        assert_eq!(outcome.report.reloaded, vec![demo::DEMO_MODULE.to_string()]);
    }
}
