//! Prelude module for convenient imports
//!
//! ```no_run
//! use rebind::prelude::*;
//! use std::rc::Rc;
//!
//! let runtime = Runtime::new(Rc::new(MemoryLoader::new()));
//! ```

// Runtime
pub use crate::runtime::{
    Class, ClassRef, Instance, InstanceRef, ModuleBuilder, Namespace, Runtime, Scope, Value,
};

// Modules
pub use crate::modules::{MemoryLoader, Module, ModuleCache, ModuleKind, ModuleLoader, ModuleRef, ModuleSpec};

// Reload core
pub use crate::registry::{ClassRegistry, DynamicClassRegistry};
pub use crate::reload::{get_module_variable, ReloadReport, Reloader, Snapshots};
pub use crate::scanner::{DynamicClasses, ModuleSnapshot, Scanner};

// Configuration and errors
pub use crate::config::{ReloadConfig, ReloadScope};
pub use crate::error::{Error, Result};
