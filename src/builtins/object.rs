//! `Object` constructor and static methods; `Object.prototype` itself
//! (`hasOwnProperty`, `toString`, `valueOf`, `isPrototypeOf`) is installed
//! directly here too, since [`Builtins::install`](super::Builtins::install)
//! builds `object_proto` before any other prototype exists to chain from.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::Context;
use crate::evaluator::make_array;
use crate::signal::Signal;
use crate::terms;
use crate::value::{JsObject, ObjectKind, PropertyDescriptor, Value};

use super::{arg, define_method, Builtins};

pub fn constructor(_ctx: &Rc<Context>, b: &Builtins) -> Value {
    let object_proto = b.object_proto.clone();
    install_object_prototype(&object_proto);

    let proto_for_ctor = object_proto.clone();
    let ctor = super::native("Object", Some(b.function_proto.clone()), move |ctx, _this, args| match args.first() {
        Some(Value::Object(o)) => Ok(Value::Object(o.clone())),
        Some(v) if v.is_nullish() || args.is_empty() => Ok(Value::Object(Rc::new(RefCell::new(JsObject::new(Some(ctx.root.builtins.object_proto.clone())))))),
        _ => Ok(Value::Object(Rc::new(RefCell::new(JsObject::new(Some(proto_for_ctor.clone())))))),
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(object_proto.clone())));
    object_proto.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor.clone()));

    define_method(ctor_obj, "keys", None, |ctx, _this, args| Ok(make_array(ctx, own_enumerable_keys(&arg(args, 0)).into_iter().map(Value::string).collect())));
    define_method(ctor_obj, "values", None, |ctx, _this, args| {
        let target = arg(args, 0);
        let vals = own_enumerable_keys(&target)
            .into_iter()
            .map(|k| crate::evaluator::get_property(ctx, &target, &k, ctx.current_node.get()))
            .collect::<Result<_, _>>()?;
        Ok(make_array(ctx, vals))
    });
    define_method(ctor_obj, "entries", None, |ctx, _this, args| {
        let target = arg(args, 0);
        let mut out = Vec::new();
        for k in own_enumerable_keys(&target) {
            let v = crate::evaluator::get_property(ctx, &target, &k, ctx.current_node.get())?;
            out.push(make_array(ctx, vec![Value::string(k), v]));
        }
        Ok(make_array(ctx, out))
    });
    define_method(ctor_obj, "assign", None, |ctx, _this, args| {
        let Some(Value::Object(target)) = args.first() else {
            return Err(Signal::type_error("Cannot convert undefined or null to object", ctx.current_node.get()));
        };
        for source in &args[1..] {
            for k in own_enumerable_keys(source) {
                let v = crate::evaluator::get_property(ctx, source, &k, ctx.current_node.get())?;
                target.borrow_mut().set_own(Rc::from(k.as_str()), v);
            }
        }
        Ok(Value::Object(target.clone()))
    });
    define_method(ctor_obj, "freeze", None, |_ctx, _this, args| {
        if let Value::Object(o) = arg(args, 0) {
            let mut b = o.borrow_mut();
            for desc in b.own.values_mut() {
                desc.writable = false;
                desc.configurable = false;
            }
            b.define("__frozen__", PropertyDescriptor { value: Value::Bool(true), writable: false, enumerable: false, configurable: false });
        }
        Ok(arg(args, 0))
    });
    define_method(ctor_obj, "isFrozen", None, |_ctx, _this, args| {
        Ok(Value::Bool(match arg(args, 0) {
            Value::Object(o) => o.borrow().has_own("__frozen__"),
            _ => true,
        }))
    });
    define_method(ctor_obj, "getPrototypeOf", None, |_ctx, _this, args| {
        Ok(match arg(args, 0) {
            Value::Object(o) => o.borrow().proto.clone().map(Value::Object).unwrap_or(Value::Null),
            _ => Value::Null,
        })
    });
    define_method(ctor_obj, "setPrototypeOf", None, |_ctx, _this, args| {
        if let Value::Object(o) = arg(args, 0) {
            o.borrow_mut().proto = match arg(args, 1) {
                Value::Object(p) => Some(p),
                _ => None,
            };
        }
        Ok(arg(args, 0))
    });
    define_method(ctor_obj, "create", None, |_ctx, _this, args| {
        let proto = match arg(args, 0) {
            Value::Object(p) => Some(p),
            Value::Null => None,
            _ => return Err(Signal::type_error("Object prototype may only be an Object or null", Default::default())),
        };
        let obj = Rc::new(RefCell::new(JsObject::new(proto)));
        if let Some(Value::Object(props)) = args.get(1) {
            for key in props.borrow().own.keys().cloned().collect::<Vec<_>>() {
                if let Some(Value::Object(desc)) = props.borrow().get_own(&key).map(|d| d.value.clone()) {
                    let value = desc.borrow().get_own("value").map(|d| d.value.clone()).unwrap_or(Value::Undefined);
                    obj.borrow_mut().define(key, PropertyDescriptor::data(value));
                }
            }
        }
        Ok(Value::Object(obj))
    });
    define_method(ctor_obj, "defineProperty", None, |_ctx, _this, args| {
        let Value::Object(target) = arg(args, 0) else {
            return Err(Signal::type_error("Object.defineProperty called on non-object", Default::default()));
        };
        let key = terms::to_js_string(&arg(args, 1));
        let Value::Object(desc) = arg(args, 2) else {
            return Err(Signal::type_error("Property description must be an object", Default::default()));
        };
        let d = desc.borrow();
        let value = d.get_own("value").map(|p| p.value.clone()).unwrap_or(Value::Undefined);
        let writable = d.get_own("writable").map(|p| terms::to_boolean(&p.value)).unwrap_or(false);
        let enumerable = d.get_own("enumerable").map(|p| terms::to_boolean(&p.value)).unwrap_or(false);
        let configurable = d.get_own("configurable").map(|p| terms::to_boolean(&p.value)).unwrap_or(false);
        target.borrow_mut().define(key, PropertyDescriptor { value, writable, enumerable, configurable });
        Ok(Value::Object(target))
    });
    define_method(ctor_obj, "is", None, |_ctx, _this, args| Ok(Value::Bool(object_is(&arg(args, 0), &arg(args, 1)))));

    ctor
}

fn object_is(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x.is_nan() && y.is_nan() {
                true
            } else {
                x == y && x.is_sign_positive() == y.is_sign_positive()
            }
        }
        _ => terms::strict_eq(a, b),
    }
}

pub(crate) fn own_enumerable_keys(v: &Value) -> Vec<String> {
    match v {
        Value::Object(o) => {
            let b = o.borrow();
            if b.kind == ObjectKind::Array {
                let mut keys: Vec<String> = (0..b.array_elements().unwrap().len()).map(|i| i.to_string()).collect();
                keys.extend(b.own.iter().filter(|(_, d)| d.enumerable).map(|(k, _)| k.to_string()));
                keys
            } else {
                b.own.iter().filter(|(_, d)| d.enumerable).map(|(k, _)| k.to_string()).collect()
            }
        }
        _ => Vec::new(),
    }
}

fn install_object_prototype(proto: &crate::value::ObjectRef) {
    define_method(proto, "hasOwnProperty", None, |_ctx, this, args| {
        let key = terms::to_js_string(&arg(args, 0));
        Ok(Value::Bool(match this {
            Value::Object(o) => {
                let b = o.borrow();
                if b.kind == ObjectKind::Array {
                    if key == "length" {
                        return Ok(Value::Bool(true));
                    }
                    if let Some(idx) = crate::evaluator::parse_array_index(&key) {
                        return Ok(Value::Bool(idx < b.array_elements().unwrap().len()));
                    }
                }
                b.has_own(&key)
            }
            _ => false,
        }))
    });
    define_method(proto, "isPrototypeOf", None, |_ctx, this, args| {
        let (Value::Object(candidate_proto), Value::Object(obj)) = (this, arg(args, 0)) else {
            return Ok(Value::Bool(false));
        };
        let mut cur = obj.borrow().proto.clone();
        while let Some(p) = cur {
            if Rc::ptr_eq(&p, candidate_proto) {
                return Ok(Value::Bool(true));
            }
            cur = p.borrow().proto.clone();
        }
        Ok(Value::Bool(false))
    });
    define_method(proto, "toString", None, |_ctx, this, _args| {
        Ok(Value::string(match this {
            Value::Object(o) if o.borrow().kind == ObjectKind::Array => "[object Array]",
            Value::Object(o) if o.borrow().kind == ObjectKind::Function => "[object Function]",
            _ => "[object Object]",
        }))
    });
    define_method(proto, "valueOf", None, |_ctx, this, _args| Ok(this.clone()));
}
