//! `Array` constructor, `Array.isArray`/`from`/`of`, and `Array.prototype`.

use std::rc::Rc;

use crate::context::Context;
use crate::error::Position;
use crate::evaluator::{call_value, get_property, make_array, parse_array_index};
use crate::signal::Signal;
use crate::terms;
use crate::value::{ObjectKind, PropertyDescriptor, Value};

use super::{arg, define_method, native, Builtins};

fn this_elements(this: &Value) -> Vec<Value> {
    match this {
        Value::Object(o) if o.borrow().kind == ObjectKind::Array => o.borrow().array_elements().unwrap().to_vec(),
        _ => Vec::new(),
    }
}

/// Applies `f` to the live element vector in place; a no-op for a
/// non-array `this` (native array methods called off-prototype on a
/// plain object silently do nothing rather than panic).
fn with_elements_mut<R>(this: &Value, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
    match this {
        Value::Object(o) if o.borrow().kind == ObjectKind::Array => {
            let mut b = o.borrow_mut();
            Some(f(b.array_elements_mut().unwrap()))
        }
        _ => None,
    }
}

fn at(ctx: &Rc<Context>) -> Position {
    ctx.current_node.get()
}

pub fn constructor(ctx: &Rc<Context>, b: &Builtins) -> Value {
    let proto = b.array_proto.clone();
    let ctor = native("Array", Some(b.function_proto.clone()), move |ctx, _this, args| {
        if args.len() == 1 {
            if let Value::Number(n) = &args[0] {
                if *n < 0.0 || n.fract() != 0.0 {
                    return Err(Signal::range_error("Invalid array length", at(ctx)));
                }
                return Ok(make_array(ctx, vec![Value::Undefined; *n as usize]));
            }
        }
        Ok(make_array(ctx, args.to_vec()))
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    proto.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor.clone()));

    define_method(ctor_obj, "isArray", None, |_ctx, _this, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Object(o) if o.borrow().kind == ObjectKind::Array)))
    });
    define_method(ctor_obj, "of", None, |ctx, _this, args| Ok(make_array(ctx, args.to_vec())));
    define_method(ctor_obj, "from", None, |ctx, _this, args| {
        let source = arg(args, 0);
        let map_fn = args.get(1).cloned();
        let items: Vec<Value> = match &source {
            Value::Object(o) if o.borrow().kind == ObjectKind::Array => o.borrow().array_elements().unwrap().to_vec(),
            Value::String(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
            Value::Object(_) => {
                let len = terms::to_number(&get_property(ctx, &source, "length", at(ctx))?) as usize;
                (0..len).map(|i| get_property(ctx, &source, &i.to_string(), at(ctx))).collect::<Result<_, _>>()?
            }
            _ => Vec::new(),
        };
        let mapped = match map_fn {
            Some(f) if !matches!(f, Value::Undefined) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| call_value(ctx, &f, Value::Undefined, &[v, Value::Number(i as f64)], at(ctx)))
                .collect::<Result<_, _>>()?,
            _ => items,
        };
        Ok(make_array(ctx, mapped))
    });
    ctor
}

pub fn install_prototype(proto: &crate::value::ObjectRef) {
    define_method(proto, "push", None, |_ctx, this, args| {
        let len = with_elements_mut(this, |v| {
            v.extend_from_slice(args);
            v.len()
        })
        .unwrap_or(0);
        Ok(Value::Number(len as f64))
    });

    define_method(proto, "pop", None, |_ctx, this, _args| {
        Ok(with_elements_mut(this, |v| v.pop()).flatten().unwrap_or(Value::Undefined))
    });

    define_method(proto, "shift", None, |_ctx, this, _args| {
        Ok(with_elements_mut(this, |v| if v.is_empty() { None } else { Some(v.remove(0)) }).flatten().unwrap_or(Value::Undefined))
    });

    define_method(proto, "unshift", None, |_ctx, this, args| {
        let len = with_elements_mut(this, |v| {
            for (i, a) in args.iter().cloned().enumerate() {
                v.insert(i, a);
            }
            v.len()
        })
        .unwrap_or(0);
        Ok(Value::Number(len as f64))
    });

    define_method(proto, "slice", None, |ctx, this, args| {
        let elems = this_elements(this);
        let len = elems.len() as i64;
        let start = normalize_index(arg(args, 0), len, 0);
        let end = normalize_index(arg(args, 1), len, len);
        let slice = if start < end { elems[start as usize..end as usize].to_vec() } else { Vec::new() };
        Ok(make_array(ctx, slice))
    });

    define_method(proto, "splice", None, |ctx, this, args| {
        let elems = this_elements(this);
        let len = elems.len() as i64;
        let start = normalize_index(arg(args, 0), len, 0) as usize;
        let delete_count = if args.len() < 2 {
            elems.len() - start
        } else {
            (terms::to_number(&arg(args, 1)).max(0.0) as usize).min(elems.len() - start)
        };
        let items: Vec<Value> = args.get(2..).map(|s| s.to_vec()).unwrap_or_default();
        let removed = with_elements_mut(this, |v| {
            let removed: Vec<Value> = v.splice(start..start + delete_count, items).collect();
            removed
        })
        .unwrap_or_default();
        Ok(make_array(ctx, removed))
    });

    define_method(proto, "concat", None, |ctx, this, args| {
        let mut out = this_elements(this);
        for a in args {
            match a {
                Value::Object(o) if o.borrow().kind == ObjectKind::Array => out.extend_from_slice(o.borrow().array_elements().unwrap()),
                other => out.push(other.clone()),
            }
        }
        Ok(make_array(ctx, out))
    });

    define_method(proto, "join", None, |_ctx, this, args| {
        let sep = match args.first() {
            Some(Value::Undefined) | None => ",".to_string(),
            Some(v) => terms::to_js_string(v),
        };
        let elems = this_elements(this);
        let joined = elems
            .iter()
            .map(|e| if e.is_nullish() { String::new() } else { terms::to_js_string(e) })
            .collect::<Vec<_>>()
            .join(&sep);
        Ok(Value::string(joined))
    });

    define_method(proto, "indexOf", None, |_ctx, this, args| {
        let elems = this_elements(this);
        let needle = arg(args, 0);
        let from = normalize_index(args.get(1).cloned().unwrap_or(Value::Number(0.0)), elems.len() as i64, 0) as usize;
        for (i, e) in elems.iter().enumerate().skip(from) {
            if terms::strict_eq(e, &needle) {
                return Ok(Value::Number(i as f64));
            }
        }
        Ok(Value::Number(-1.0))
    });

    define_method(proto, "lastIndexOf", None, |_ctx, this, args| {
        let elems = this_elements(this);
        let needle = arg(args, 0);
        for (i, e) in elems.iter().enumerate().rev() {
            if terms::strict_eq(e, &needle) {
                return Ok(Value::Number(i as f64));
            }
        }
        Ok(Value::Number(-1.0))
    });

    define_method(proto, "includes", None, |_ctx, this, args| {
        let elems = this_elements(this);
        let needle = arg(args, 0);
        let found = elems.iter().any(|e| {
            terms::strict_eq(e, &needle) || (matches!(e, Value::Number(n) if n.is_nan()) && matches!(needle, Value::Number(n) if n.is_nan()))
        });
        Ok(Value::Bool(found))
    });

    define_method(proto, "find", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            if terms::to_boolean(&call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?) {
                return Ok(e.clone());
            }
        }
        Ok(Value::Undefined)
    });

    define_method(proto, "findIndex", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            if terms::to_boolean(&call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?) {
                return Ok(Value::Number(i as f64));
            }
        }
        Ok(Value::Number(-1.0))
    });

    define_method(proto, "map", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        let mut out = Vec::with_capacity(elems.len());
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            out.push(call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?);
        }
        Ok(make_array(ctx, out))
    });

    define_method(proto, "filter", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        let mut out = Vec::new();
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            if terms::to_boolean(&call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?) {
                out.push(e.clone());
            }
        }
        Ok(make_array(ctx, out))
    });

    define_method(proto, "forEach", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?;
        }
        Ok(Value::Undefined)
    });

    define_method(proto, "some", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            if terms::to_boolean(&call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?) {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    });

    define_method(proto, "every", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            if !terms::to_boolean(&call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?) {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    });

    define_method(proto, "reduce", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        let mut iter = elems.iter().enumerate();
        let mut acc = match args.get(1) {
            Some(init) => init.clone(),
            None => match iter.next() {
                Some((_, v)) => v.clone(),
                None => return Err(Signal::type_error("Reduce of empty array with no initial value", at(ctx))),
            },
        };
        for (i, e) in iter {
            let arr = make_array(ctx, elems.clone());
            acc = call_value(ctx, &cb, Value::Undefined, &[acc, e.clone(), Value::Number(i as f64), arr], at(ctx))?;
        }
        Ok(acc)
    });

    define_method(proto, "reduceRight", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        let mut iter = elems.iter().enumerate().rev();
        let mut acc = match args.get(1) {
            Some(init) => init.clone(),
            None => match iter.next() {
                Some((_, v)) => v.clone(),
                None => return Err(Signal::type_error("Reduce of empty array with no initial value", at(ctx))),
            },
        };
        for (i, e) in iter {
            let arr = make_array(ctx, elems.clone());
            acc = call_value(ctx, &cb, Value::Undefined, &[acc, e.clone(), Value::Number(i as f64), arr], at(ctx))?;
        }
        Ok(acc)
    });

    define_method(proto, "sort", None, |ctx, this, args| {
        let cmp = args.first().cloned();
        let mut elems = this_elements(this);
        let mut err = None;
        elems.sort_by(|a, b| {
            if err.is_some() {
                return std::cmp::Ordering::Equal;
            }
            match &cmp {
                Some(f) if !matches!(f, Value::Undefined) => {
                    match call_value(ctx, f, Value::Undefined, &[a.clone(), b.clone()], at(ctx)) {
                        Ok(v) => terms::to_number(&v).partial_cmp(&0.0).unwrap_or(std::cmp::Ordering::Equal),
                        Err(e) => {
                            err = Some(e);
                            std::cmp::Ordering::Equal
                        }
                    }
                }
                _ => terms::to_js_string(a).cmp(&terms::to_js_string(b)),
            }
        });
        if let Some(e) = err {
            return Err(e);
        }
        with_elements_mut(this, |v| *v = elems);
        Ok(this.clone())
    });

    define_method(proto, "reverse", None, |_ctx, this, _args| {
        with_elements_mut(this, |v| v.reverse());
        Ok(this.clone())
    });

    define_method(proto, "flat", None, |ctx, this, args| {
        let depth = match args.first() {
            Some(v) if !matches!(v, Value::Undefined) => terms::to_number(v) as i64,
            _ => 1,
        };
        Ok(make_array(ctx, flatten(&this_elements(this), depth)))
    });

    define_method(proto, "flatMap", None, |ctx, this, args| {
        let elems = this_elements(this);
        let cb = arg(args, 0);
        let mut out = Vec::new();
        for (i, e) in elems.iter().enumerate() {
            let arr = make_array(ctx, elems.clone());
            let mapped = call_value(ctx, &cb, Value::Undefined, &[e.clone(), Value::Number(i as f64), arr], at(ctx))?;
            match mapped {
                Value::Object(o) if o.borrow().kind == ObjectKind::Array => out.extend_from_slice(o.borrow().array_elements().unwrap()),
                other => out.push(other),
            }
        }
        Ok(make_array(ctx, out))
    });

    define_method(proto, "toString", None, |_ctx, this, _args| {
        let elems = this_elements(this);
        Ok(Value::string(
            elems.iter().map(|e| if e.is_nullish() { String::new() } else { terms::to_js_string(e) }).collect::<Vec<_>>().join(","),
        ))
    });
}

fn flatten(elems: &[Value], depth: i64) -> Vec<Value> {
    let mut out = Vec::new();
    for e in elems {
        match e {
            Value::Object(o) if depth > 0 && o.borrow().kind == ObjectKind::Array => {
                out.extend(flatten(o.borrow().array_elements().unwrap(), depth - 1));
            }
            other => out.push(other.clone()),
        }
    }
    out
}

/// Clamps a JS-style (possibly negative, possibly fractional/NaN) index
/// argument into `0..=len`, matching the `slice`/`splice` argument
/// coercion rule: negative counts back from the end, missing uses
/// `default`.
fn normalize_index(v: Value, len: i64, default: i64) -> i64 {
    if matches!(v, Value::Undefined) {
        return default.clamp(0, len);
    }
    let n = terms::to_number(&v);
    if n.is_nan() {
        return 0;
    }
    let n = n as i64;
    if n < 0 {
        (len + n).max(0)
    } else {
        n.min(len)
    }
}
