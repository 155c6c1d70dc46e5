//! Error types for the rebind runtime and reload engine

use std::fmt;
use thiserror::Error;

/// Where a failure happened while a module was being (re)loaded
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleContext {
    /// Module being executed when the error was raised
    pub module: Option<String>,
    /// Attribute or binding involved, if any
    pub binding: Option<String>,
}

impl ModuleContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the module name
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Set the binding name
    pub fn with_binding(mut self, binding: impl Into<String>) -> Self {
        self.binding = Some(binding.into());
        self
    }
}

impl fmt::Display for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.module, &self.binding) {
            (Some(module), Some(binding)) => write!(f, " (in {}.{})", module, binding),
            (Some(module), None) => write!(f, " (in {})", module),
            (None, Some(binding)) => write!(f, " (at {})", binding),
            (None, None) => Ok(()),
        }
    }
}

/// Main error type for rebind
#[derive(Error, Debug)]
pub enum Error {
    /// The loader has no definition for the requested module
    #[error("ModuleNotFoundError: no module named '{0}'")]
    ModuleNotFound(String),

    /// A reload was requested for a module with no pre-eviction snapshot
    #[error("KeyError: no dynamic class snapshot was taken for module '{0}'")]
    MissingSnapshot(String),

    /// A scope value could not be traced back to any attribute of its module
    #[error("LookupError: '{variable}' is not exposed by module '{module}'")]
    UnresolvedBinding { variable: String, module: String },

    /// A reloaded module no longer defines an attribute that was snapshotted
    #[error("AttributeError: module '{module}' has no attribute '{name}'")]
    MissingAttribute { module: String, name: String },

    /// A snapshotted dynamic class was redefined as something that is not a class
    #[error("TypeError: '{module}.{name}' is a {found}, expected a class")]
    NotAClass {
        module: String,
        name: String,
        found: &'static str,
    },

    /// Failure raised by a module body or a function call
    #[error("ExecutionError: {message}{context}")]
    Execution {
        message: String,
        context: ModuleContext,
    },

    /// Invalid reload configuration
    #[error("ConfigError: {0}")]
    Config(String),

    /// IO error
    #[error("IOError: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Malformed JSON configuration
    #[error("JSONError: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create an execution error without context
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution {
            message: message.into(),
            context: ModuleContext::new(),
        }
    }

    /// Attach the module being executed to an execution error
    pub fn in_module(self, module: &str) -> Self {
        match self {
            Error::Execution { message, context } if context.module.is_none() => {
                Error::Execution {
                    message,
                    context: context.with_module(module),
                }
            }
            other => other,
        }
    }

    /// Attach the module attribute being evaluated to an execution error
    ///
    /// Ignored when the error already names a binding, or was raised inside
    /// a different module.
    pub fn in_binding(self, module: &str, binding: &str) -> Self {
        match self {
            Error::Execution { message, context }
                if context.binding.is_none()
                    && context.module.as_deref().map_or(true, |m| m == module) =>
            {
                Error::Execution {
                    message,
                    context: context.with_module(module).with_binding(binding),
                }
            }
            other => other,
        }
    }

    /// Whether this error means "the module does not exist"
    pub fn is_module_not_found(&self) -> bool {
        matches!(self, Error::ModuleNotFound(_))
    }

    /// Whether this error is a broken caller contract rather than a runtime failure
    pub fn is_precondition_violation(&self) -> bool {
        matches!(
            self,
            Error::MissingSnapshot(_) | Error::UnresolvedBinding { .. }
        )
    }
}

/// Result type for rebind operations
pub type Result<T> = std::result::Result<T, Error>;
