//! Runtime value representation.
//!
//! Objects use `Rc<RefCell<JsObject>>` for reference semantics: cloning a
//! `Value::Object` only bumps the reference count, and mutation through
//! one handle is visible through every other handle — the same model the
//! teacher interpreter uses, just with `IndexMap` in place of a
//! `BTreeMap` so own-property iteration (`for…in`, `Object.keys`) walks
//! in insertion order rather than lexicographic order, per this engine's
//! property-enumeration invariant.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::FunctionDef;
use crate::context::Context;
use crate::signal::Signal;

pub type ObjectRef = Rc<RefCell<JsObject>>;

#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{}", crate::terms::format_number(*n)),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(o) => {
                let obj = o.borrow();
                match &obj.kind {
                    ObjectKind::Array => write!(f, "[Array({})]", obj.data.array_len()),
                    ObjectKind::Function => write!(f, "[Function: {}]", obj.data.function_name().unwrap_or("anonymous")),
                    ObjectKind::Error => write!(f, "[object Error]"),
                    _ => write!(f, "[object Object]"),
                }
            }
        }
    }
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Builds a minimal Error-shaped value for engine-raised exceptions
    /// (TDZ access, const reassignment, bad arithmetic, ...) that doesn't
    /// go through `new Error(...)` and so has no context to borrow a
    /// prototype from. `name`/`message` are both real own properties, not
    /// just internal slots, so script-level `catch (e) { e.message }`
    /// reads the same way for host-raised and script-thrown errors alike.
    pub fn make_error(name: &'static str, message: String) -> Value {
        let mut obj = JsObject::new(None);
        obj.kind = ObjectKind::Error;
        obj.define("name", PropertyDescriptor::data(Value::string(name)));
        obj.define("message", PropertyDescriptor::data(Value::string(message.clone())));
        obj.data = ObjectData::Error { name: name.into(), message: message.into() };
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(o) => {
                if o.borrow().kind == ObjectKind::Function {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }
}

/// What kind of built-in internal slot an object carries, used to route
/// host-facing operations (`Array.prototype` methods, `instanceof`
/// checks, `JSON.stringify` shape detection) without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Plain,
    Array,
    Function,
    Date,
    Error,
    Regex,
    /// A value handed back from [`crate::bridge::HostBridge`]; opaque to
    /// script code beyond property/method forwarding.
    HostWrapped,
}

pub enum ObjectData {
    None,
    Array(Vec<Value>),
    Function(Callable),
    Date(f64),
    Error { name: Rc<str>, message: Rc<str> },
    Regex { pattern: Rc<str>, flags: Rc<str>, compiled: regex::Regex },
    Host(Rc<dyn std::any::Any>),
}

impl ObjectData {
    fn array_len(&self) -> usize {
        match self {
            ObjectData::Array(v) => v.len(),
            _ => 0,
        }
    }

    fn function_name(&self) -> Option<&str> {
        match self {
            ObjectData::Function(c) => c.name(),
            _ => None,
        }
    }
}

/// A callable's body: either a user-defined closure over an AST function,
/// or a host-provided native function (builtins, bridge wrappers).
#[derive(Clone)]
pub enum Callable {
    /// `is_arrow` functions never call `Context::set_this` on their own
    /// call frame, so `this` resolution falls through to whatever frame
    /// was active when the arrow was *defined* — the lexical-`this`
    /// capture falls straight out of the context parent chain.
    Script { def: Rc<FunctionDef>, closure: Rc<Context>, is_arrow: bool },
    Native { name: Option<Rc<str>>, func: NativeFn },
}

impl Callable {
    pub fn name(&self) -> Option<&str> {
        match self {
            Callable::Script { def, .. } => def.name.as_deref(),
            Callable::Native { name, .. } => name.as_deref(),
        }
    }
}

pub type NativeFn = Rc<dyn Fn(&Rc<Context>, &Value, &[Value]) -> Result<Value, Signal>>;

#[derive(Clone)]
pub struct PropertyDescriptor {
    pub value: Value,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    pub fn data(value: Value) -> Self {
        PropertyDescriptor { value, writable: true, enumerable: true, configurable: true }
    }

    pub fn readonly(value: Value) -> Self {
        PropertyDescriptor { value, writable: false, enumerable: true, configurable: false }
    }

    pub fn hidden(value: Value) -> Self {
        PropertyDescriptor { value, writable: true, enumerable: false, configurable: true }
    }
}

pub struct JsObject {
    pub own: IndexMap<Rc<str>, PropertyDescriptor>,
    pub proto: Option<ObjectRef>,
    pub kind: ObjectKind,
    pub data: ObjectData,
}

impl JsObject {
    pub fn new(proto: Option<ObjectRef>) -> Self {
        JsObject { own: IndexMap::new(), proto, kind: ObjectKind::Plain, data: ObjectData::None }
    }

    pub fn new_array(proto: Option<ObjectRef>, elements: Vec<Value>) -> Self {
        JsObject { own: IndexMap::new(), proto, kind: ObjectKind::Array, data: ObjectData::Array(elements) }
    }

    pub fn new_function(proto: Option<ObjectRef>, callable: Callable) -> Self {
        JsObject { own: IndexMap::new(), proto, kind: ObjectKind::Function, data: ObjectData::Function(callable) }
    }

    pub fn callable(&self) -> Option<&Callable> {
        match &self.data {
            ObjectData::Function(c) => Some(c),
            _ => None,
        }
    }

    pub fn get_own(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.own.get(key)
    }

    pub fn set_own(&mut self, key: Rc<str>, value: Value) {
        match self.own.get_mut(&key) {
            Some(desc) if desc.writable => desc.value = value,
            Some(_) => {}
            None => {
                self.own.insert(key, PropertyDescriptor::data(value));
            }
        }
    }

    pub fn define(&mut self, key: impl Into<Rc<str>>, desc: PropertyDescriptor) {
        self.own.insert(key.into(), desc);
    }

    /// Walks the own-property map then the prototype chain, per the
    /// spec's property-resolution order.
    pub fn lookup(this: &ObjectRef, key: &str) -> Option<Value> {
        let mut cur = Some(this.clone());
        while let Some(obj_ref) = cur {
            let obj = obj_ref.borrow();
            if let Some(desc) = obj.own.get(key) {
                return Some(desc.value.clone());
            }
            cur = obj.proto.clone();
        }
        None
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.own.contains_key(key)
    }

    pub fn has(this: &ObjectRef, key: &str) -> bool {
        let mut cur = Some(this.clone());
        while let Some(obj_ref) = cur {
            let obj = obj_ref.borrow();
            if obj.own.contains_key(key) {
                return true;
            }
            cur = obj.proto.clone();
        }
        false
    }

    pub fn array_elements(&self) -> Option<&[Value]> {
        match &self.data {
            ObjectData::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn array_elements_mut(&mut self) -> Option<&mut Vec<Value>> {
        match &mut self.data {
            ObjectData::Array(v) => Some(v),
            _ => None,
        }
    }
}
