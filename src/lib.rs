//! Rebind: hot module reloading with live instance re-binding
//!
//! Rebind hosts a small dynamic object runtime (modules, classes, instances,
//! functions) and reloads its modules in place. When a module is re-executed,
//! existing instances of its *dynamic* classes are moved onto the new class
//! definitions, and the caller's local/global bindings are rewritten to point
//! at the fresh functions, classes and modules. Instance state is preserved;
//! only behavior changes.
//!
//! # Quick Start
//!
//! ```no_run
//! use rebind::prelude::*;
//! use std::rc::Rc;
//!
//! fn main() -> rebind::Result<()> {
//!     let loader = Rc::new(MemoryLoader::new());
//!     loader.define("shapes", |m| {
//!         m.dynamic_class("Circle").attr("sides", 0i64).finish();
//!         Ok(())
//!     });
//!     let runtime = Runtime::new(loader.clone());
//!
//!     let mut globals = Scope::new();
//!     globals.insert("shapes", runtime.import("shapes")?);
//!     let mut locals = Scope::new();
//!
//!     // ... edit the module, then:
//!     let reloader = Reloader::new(&runtime, &ReloadConfig::default())?;
//!     let modules = reloader.scan_live_modules();
//!     reloader.re_import_modules(&modules, &mut locals, &mut globals)?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Runtime** | [`runtime`], [`modules`] |
//! | **Reload core** | [`registry`], [`scanner`], [`reload`] |
//! | **Ambient** | [`config`], [`error`](Error), [`prelude`], [`demo`] |
//!
//! Everything is single-threaded (`Rc`/`RefCell`); a reload pass runs to
//! completion before returning and must not be re-entered from a module body.

pub mod config;
pub mod demo;
pub mod modules;
pub mod prelude;
pub mod registry;
pub mod reload;
pub mod runtime;
pub mod scanner;

mod error;

pub use error::{Error, ModuleContext, Result};
pub use reload::{get_module_variable, ReloadReport, Reloader};
pub use runtime::{Runtime, Value};

/// Rebind version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
