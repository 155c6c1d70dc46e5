//! Runtime value types
//!
//! This module defines the runtime representation of values, classes,
//! instances and functions. Reference types are shared through `Rc` and
//! compared by identity.

use crate::error::{Error, Result};
use crate::modules::ModuleRef;
use rustc_hash::FxHashMap as HashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Type alias for native function implementations
pub type NativeFn = Rc<dyn Fn(&[Value]) -> Result<Value>>;

/// Shared handle to a class
pub type ClassRef = Rc<Class>;

/// Shared handle to an instance
pub type InstanceRef = Rc<Instance>;

/// Shared handle to a function
pub type FunctionRef = Rc<Function>;

static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a class object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u64);

impl ClassId {
    fn next() -> Self {
        Self(NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Process-unique identity of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

/// A runtime value
#[derive(Clone)]
pub enum Value {
    /// The absent value
    None,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Immutable string
    Str(Rc<str>),
    /// Function defined by a module
    Function(FunctionRef),
    /// Class defined by a module
    Class(ClassRef),
    /// Object instance
    Instance(InstanceRef),
    /// Loaded module
    Module(ModuleRef),
}

impl Value {
    /// Get the type name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::Module(_) => "module",
        }
    }

    /// Identity for reference values, equality for primitives
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Functions and classes can be called
    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::Class(_))
    }

    /// Name of the module a function or class was defined in
    pub fn defining_module(&self) -> Option<&str> {
        match self {
            Value::Function(func) => Some(func.module()),
            Value::Class(class) => Some(class.module()),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassRef> {
        match self {
            Value::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceRef> {
        match self {
            Value::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Value::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_module(&self) -> Option<&ModuleRef> {
        match self {
            Value::Module(module) => Some(module),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(&**s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Float(n) => write!(f, "Float({})", n),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Function(func) => write!(f, "Function({}.{})", func.module(), func.name()),
            Value::Class(class) => write!(f, "Class({} {})", class.qualified_name(), class.id()),
            Value::Instance(instance) => write!(
                f,
                "Instance({} of {})",
                instance.id(),
                instance.class().qualified_name()
            ),
            Value::Module(module) => write!(f, "Module({})", module.name()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Function(func) => write!(f, "<function {}.{}>", func.module(), func.name()),
            Value::Class(class) => write!(f, "<class '{}'>", class.qualified_name()),
            Value::Instance(instance) => {
                write!(f, "<{} object>", instance.class().qualified_name())
            }
            Value::Module(module) => write!(f, "{}", module),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<FunctionRef> for Value {
    fn from(func: FunctionRef) -> Self {
        Value::Function(func)
    }
}

impl From<ClassRef> for Value {
    fn from(class: ClassRef) -> Self {
        Value::Class(class)
    }
}

impl From<InstanceRef> for Value {
    fn from(instance: InstanceRef) -> Self {
        Value::Instance(instance)
    }
}

impl From<ModuleRef> for Value {
    fn from(module: ModuleRef) -> Self {
        Value::Module(module)
    }
}

/// A function defined by a module body
pub struct Function {
    name: String,
    module: String,
    body: NativeFn,
}

impl Function {
    pub fn new(name: impl Into<String>, module: impl Into<String>, body: NativeFn) -> FunctionRef {
        Rc::new(Self {
            name: name.into(),
            module: module.into(),
            body,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        (self.body)(args).map_err(|err| err.in_binding(&self.module, &self.name))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// A class object
///
/// Classes are immutable once built. Redefining a class means building a new
/// `Class` with a fresh [`ClassId`]; instances are moved onto it by rewriting
/// their behavior pointer.
pub struct Class {
    id: ClassId,
    name: String,
    module: String,
    attributes: HashMap<String, Value>,
}

impl Class {
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        attributes: HashMap<String, Value>,
    ) -> ClassRef {
        Rc::new(Self {
            id: ClassId::next(),
            name: name.into(),
            module: module.into(),
            attributes,
        })
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module the class was defined in
    pub fn module(&self) -> &str {
        &self.module
    }

    /// `module.Name`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    /// Look up a class attribute or method
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Attribute names, sorted
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("module", &self.module)
            .field("attributes", &self.attribute_names())
            .finish()
    }
}

/// An object instance
///
/// `class` is the behavior pointer: the only link between an instance and the
/// class that answers its method lookups. A reload swaps it in place; `fields`
/// are never touched by a reload.
pub struct Instance {
    id: ObjectId,
    class: RefCell<ClassRef>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub(crate) fn new(class: ClassRef) -> InstanceRef {
        Rc::new(Self {
            id: ObjectId::next(),
            class: RefCell::new(class),
            fields: RefCell::new(HashMap::default()),
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Current class of the instance
    pub fn class(&self) -> ClassRef {
        Rc::clone(&self.class.borrow())
    }

    /// Rewrite the behavior pointer
    pub fn set_class(&self, class: ClassRef) {
        *self.class.borrow_mut() = class;
    }

    /// Whether the instance currently belongs to exactly this class object
    pub fn is_instance(&self, class: &ClassRef) -> bool {
        Rc::ptr_eq(&self.class.borrow(), class)
    }

    /// Read a field, falling back to the class attributes
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.fields.borrow().get(name) {
            return Some(value.clone());
        }
        self.class.borrow().get_attr(name)
    }

    /// Read an instance field only
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.borrow_mut().insert(name.into(), value.into());
    }

    /// Field names, sorted
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Call a method resolved through the current class, passing the
    /// instance as first argument
    pub fn call_method(self: &Rc<Self>, name: &str, args: &[Value]) -> Result<Value> {
        let class = self.class();
        let method = match class.get_attr(name) {
            Some(Value::Function(func)) => func,
            Some(other) => {
                return Err(Error::execution(format!(
                    "'{}.{}' is a {}, not a method",
                    class.qualified_name(),
                    name,
                    other.type_name()
                )))
            }
            None => {
                return Err(Error::execution(format!(
                    "'{}' object has no method '{}'",
                    class.qualified_name(),
                    name
                )))
            }
        };
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(Value::Instance(Rc::clone(self)));
        call_args.extend_from_slice(args);
        method.call(&call_args)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("class", &self.class().qualified_name())
            .field("fields", &self.field_names())
            .finish()
    }
}
