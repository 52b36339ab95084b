//! Host interop surface, consumed by the core and implemented externally
//! by whatever application embeds this engine (spec §6: "Host bridge
//! (consumed by the core, implemented externally)").
//!
//! The core only defines the trait boundary and the `Java` global that
//! forwards to it; the shape of a wrapped host type/instance — what
//! static members it exposes, what `new Wrapper(...)` constructs — is
//! entirely up to the implementor, built out of this crate's own
//! [`Value`]/[`JsObject`]/[`Callable`] primitives so a host-returned value
//! is an ordinary engine value from the evaluator's point of view.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::Context;
use crate::signal::Signal;
use crate::value::{Callable, JsObject, ObjectData, ObjectKind, ObjectRef, PropertyDescriptor, Value};

/// Implemented by the hosting application and installed with
/// [`crate::JsEngine::set_bridge`]. `for_type` backs `Java.type(name)`;
/// when no bridge is installed, `Java` itself evaluates to `undefined`.
pub trait HostBridge {
    /// Returns a callable wrapper value for the fully qualified host type
    /// name, or `None` if no such type exists. The wrapper exposes the
    /// type's static members by property access and constructs an
    /// instance when invoked via `new`.
    fn for_type(&self, fully_qualified_name: &str) -> Option<Value>;
}

/// Builds a host-wrapped object around an opaque `Rc<dyn Any>` payload,
/// giving it the two script-visible methods the spec requires every
/// wrapped external value to carry: `getJavaValue()` returns the
/// underlying payload (still opaque to script, re-wrapped identically)
/// and `getJsValue()` returns the representation used for arithmetic and
/// comparison — `js_repr` is that representation, computed once by the
/// caller (typically a primitive, since that's what gets compared).
pub fn wrap_host_value(
    payload: Rc<dyn std::any::Any>,
    proto: Option<ObjectRef>,
    js_repr: Value,
) -> Value {
    let mut obj = JsObject::new(proto);
    obj.kind = ObjectKind::HostWrapped;
    obj.data = ObjectData::Host(payload);
    let self_repr = js_repr.clone();
    let get_java_value: crate::value::NativeFn =
        Rc::new(|_ctx: &Rc<Context>, this: &Value, _args: &[Value]| Ok(this.clone()));
    let get_js_value: crate::value::NativeFn =
        Rc::new(move |_ctx: &Rc<Context>, _this: &Value, _args: &[Value]| Ok(self_repr.clone()));
    obj.define(
        "getJavaValue",
        PropertyDescriptor::hidden(Value::Object(Rc::new(RefCell::new(JsObject::new_function(
            None,
            Callable::Native { name: Some("getJavaValue".into()), func: get_java_value },
        ))))),
    );
    obj.define(
        "getJsValue",
        PropertyDescriptor::hidden(Value::Object(Rc::new(RefCell::new(JsObject::new_function(
            None,
            Callable::Native { name: Some("getJsValue".into()), func: get_js_value },
        ))))),
    );
    Value::Object(Rc::new(RefCell::new(obj)))
}

/// `Java.to(x)` — script-level unwrap. A host-wrapped value is its own
/// handle (the wrapping step never copies the payload out), so unwrapping
/// is just confirming `x` carries one; anything else "is not wrappable"
/// and yields `null` per spec §6.
pub fn java_to(value: &Value) -> Value {
    match value {
        Value::Object(o) if o.borrow().kind == ObjectKind::HostWrapped => value.clone(),
        _ => Value::Null,
    }
}

/// Builds the `Java` global: `{ type(name), to(x) }` when a bridge is
/// installed, or `undefined` when `ctx.root.bridge` is empty.
pub fn java_global(ctx: &Rc<Context>) -> Value {
    let bridge = ctx.root.bridge.borrow().clone();
    let Some(bridge) = bridge else { return Value::Undefined };

    let mut obj = JsObject::new(None);
    let bridge_for_type = bridge.clone();
    let type_fn: crate::value::NativeFn = Rc::new(move |_ctx, _this, args| {
        let name = args.first().map(crate::terms::to_js_string).unwrap_or_default();
        match bridge_for_type.for_type(&name) {
            Some(v) => Ok(v),
            None => Err(Signal::type_error(format!("Java type not found: {name}"), Default::default())),
        }
    });
    obj.define(
        "type",
        PropertyDescriptor::data(Value::Object(Rc::new(RefCell::new(JsObject::new_function(
            None,
            Callable::Native { name: Some("type".into()), func: type_fn },
        ))))),
    );
    let to_fn: crate::value::NativeFn =
        Rc::new(move |_ctx, _this, args| Ok(java_to(args.first().unwrap_or(&Value::Undefined))));
    obj.define(
        "to",
        PropertyDescriptor::data(Value::Object(Rc::new(RefCell::new(JsObject::new_function(
            None,
            Callable::Native { name: Some("to".into()), func: to_fn },
        ))))),
    );
    Value::Object(Rc::new(RefCell::new(obj)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoBridge;
    impl HostBridge for NoBridge {
        fn for_type(&self, _name: &str) -> Option<Value> {
            None
        }
    }

    #[test]
    fn java_to_rejects_plain_values() {
        assert!(matches!(java_to(&Value::Number(1.0)), Value::Null));
    }

    #[test]
    fn java_to_round_trips_a_wrapped_value() {
        let payload: Rc<dyn std::any::Any> = Rc::new(42i64);
        let wrapped = wrap_host_value(payload, None, Value::Number(42.0));
        let unwrapped = java_to(&wrapped);
        assert!(matches!(unwrapped, Value::Object(_)));
    }
}
