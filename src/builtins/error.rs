//! `Error` and its sibling constructors (`TypeError`, `ReferenceError`,
//! `RangeError`, `SyntaxError`), sharing one prototype shape per kind.

use crate::terms;
use crate::value::{ObjectData, ObjectKind, ObjectRef, PropertyDescriptor, Value};

use super::{define_method, Builtins};

/// Installs `name`/`message`/`toString` on one error prototype. Called
/// once per error kind with that kind's own prototype and display name
/// (spec §4.6: "prototype: `name`, `message`, `toString`").
pub fn install_prototype(proto: &ObjectRef, name: &'static str) {
    proto.borrow_mut().define("name", PropertyDescriptor::data(Value::string(name)));
    proto.borrow_mut().define("message", PropertyDescriptor::data(Value::string("")));
    define_method(proto, "toString", None, |_ctx, this, _args| {
        let name = super::builtin_lookup_string(this, "name", "Error");
        let message = super::builtin_lookup_string(this, "message", "");
        Ok(Value::string(if message.is_empty() { name } else { format!("{name}: {message}") }))
    });
}

/// Builds the constructor for one error kind. Called both with `new` and
/// without (`Error("boom")` is equivalent to `new Error("boom")` in this
/// engine, since construct() dispatches every native constructor the same
/// way regardless of call form — see [`crate::evaluator::construct`]).
pub fn constructor(b: &Builtins, proto: &ObjectRef, name: &'static str) -> Value {
    let proto = proto.clone();
    let ctor = super::native(name, Some(b.function_proto.clone()), move |_ctx, _this, args| {
        let message = match args.first() {
            Some(v) if !matches!(v, Value::Undefined) => terms::to_js_string(v),
            _ => String::new(),
        };
        let mut obj = crate::value::JsObject::new(Some(proto.clone()));
        obj.kind = ObjectKind::Error;
        obj.define("name", PropertyDescriptor::data(Value::string(name)));
        obj.define("message", PropertyDescriptor::data(Value::string(message.clone())));
        obj.data = ObjectData::Error { name: name.into(), message: message.into() };
        Ok(Value::Object(std::rc::Rc::new(std::cell::RefCell::new(obj))))
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    proto.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor.clone()));
    ctor
}
