//! `RegExp` construction and `RegExp.prototype`, backed by the `regex`
//! crate (spec §4.6: "Semantics follow the host regex engine with
//! JS-compatible flag translation").

use std::rc::Rc;

use crate::context::Context;
use crate::error::Position;
use crate::evaluator::make_array;
use crate::signal::Signal;
use crate::terms;
use crate::value::{JsObject, ObjectData, ObjectKind, ObjectRef, PropertyDescriptor, Value};

use super::{arg, define_method, Builtins};

/// Translates the closed JS flag set (`i`, `m`, `s`, `g`) into a
/// `regex`-crate source string. `i`/`m`/`s` map onto the crate's own
/// inline flag group (`(?ims)`); `g` ("global") has no per-pattern
/// equivalent in the `regex` crate — this engine keeps it only as
/// metadata on the `JsRegExp` for `toString()`/`.global`, and `exec`
/// always matches from the start of the string rather than tracking a
/// `lastIndex` cursor (see DESIGN.md).
fn translate(pattern: &str, flags: &str) -> String {
    let mut inline = String::new();
    for c in flags.chars() {
        match c {
            'i' => inline.push('i'),
            'm' => inline.push('m'),
            's' => inline.push('s'),
            _ => {}
        }
    }
    if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{inline}){pattern}")
    }
}

/// Compiles (or fetches the memoized compilation of) a regex literal's
/// pattern/flags pair and wraps it as a `RegExp` instance.
pub fn make_regex(ctx: &Rc<Context>, pattern: Rc<str>, flags: Rc<str>, at: Position) -> Result<Value, Signal> {
    let key = (pattern.clone(), flags.clone());
    let cached = ctx.root.regex_cache.borrow().get(&key).cloned();
    let compiled = match cached {
        Some(r) => r,
        None => {
            let source = translate(&pattern, &flags);
            let re = regex::Regex::new(&source).map_err(|e| Signal::throw(Value::make_error("SyntaxError", format!("Invalid regular expression: {e}")), at))?;
            let rc = Rc::new(re);
            ctx.root.regex_cache.borrow_mut().insert(key, rc.clone());
            rc
        }
    };
    let mut obj = JsObject::new(Some(ctx.root.builtins.regex_proto.clone()));
    obj.kind = ObjectKind::Regex;
    obj.data = ObjectData::Regex { pattern, flags, compiled: (*compiled).clone() };
    Ok(Value::Object(Rc::new(std::cell::RefCell::new(obj))))
}

pub fn constructor(ctx: &Rc<Context>, b: &Builtins) -> Value {
    let proto = b.regex_proto.clone();
    let _ = ctx;
    let ctor = super::native("RegExp", Some(b.function_proto.clone()), |ctx, _this, args| {
        let (pattern, flags) = match arg(args, 0) {
            Value::Object(o) if o.borrow().kind == ObjectKind::Regex => {
                let b = o.borrow();
                let ObjectData::Regex { pattern, flags, .. } = &b.data else { unreachable!() };
                (pattern.clone(), flags.clone())
            }
            other => (Rc::from(terms::to_js_string(&other)), Rc::from(String::new())),
        };
        let flags = match args.get(1) {
            Some(f) if !matches!(f, Value::Undefined) => Rc::from(terms::to_js_string(f)),
            _ => flags,
        };
        make_regex(ctx, pattern, flags, ctx.current_node.get())
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    proto.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor.clone()));
    ctor
}

fn regex_data(v: &Value) -> Option<(Rc<str>, Rc<str>, regex::Regex)> {
    match v {
        Value::Object(o) if o.borrow().kind == ObjectKind::Regex => {
            let b = o.borrow();
            let ObjectData::Regex { pattern, flags, compiled } = &b.data else { return None };
            Some((pattern.clone(), flags.clone(), compiled.clone()))
        }
        _ => None,
    }
}

/// Runs `compiled.captures` against `s` and converts the result into the
/// JS `exec`-shaped array (`[fullMatch, group1, group2, ...]` with an
/// `index` and `input` property), or `null` on no match. Shared between
/// `RegExp.prototype.exec` and `String.prototype.match`.
pub(crate) fn exec(regex_val: &Value, s: &str, ctx: &Rc<Context>) -> Result<Value, Signal> {
    let Some((_, _, compiled)) = regex_data(regex_val) else {
        return Ok(Value::Null);
    };
    match compiled.captures(s) {
        None => Ok(Value::Null),
        Some(caps) => {
            let groups: Vec<Value> = caps.iter().map(|m| m.map(|m| Value::string(m.as_str())).unwrap_or(Value::Undefined)).collect();
            let index = caps.get(0).map(|m| s[..m.start()].chars().count()).unwrap_or(0);
            let arr = make_array(ctx, groups);
            if let Value::Object(o) = &arr {
                o.borrow_mut().define("index", PropertyDescriptor::data(Value::Number(index as f64)));
                o.borrow_mut().define("input", PropertyDescriptor::data(Value::string(s)));
            }
            Ok(arr)
        }
    }
}

pub fn install_prototype(proto: &ObjectRef) {
    define_method(proto, "test", None, |_ctx, this, args| {
        let s = terms::to_js_string(&arg(args, 0));
        Ok(Value::Bool(regex_data(this).map(|(_, _, re)| re.is_match(&s)).unwrap_or(false)))
    });

    define_method(proto, "exec", None, |ctx, this, args| {
        let s = terms::to_js_string(&arg(args, 0));
        exec(this, &s, ctx)
    });

    define_method(proto, "toString", None, |_ctx, this, _args| {
        Ok(match regex_data(this) {
            Some((pattern, flags, _)) => Value::string(format!("/{pattern}/{flags}")),
            None => Value::string("/(?:)/"),
        })
    });

    proto.borrow_mut().define(
        "source",
        PropertyDescriptor::readonly(Value::Undefined),
    );
}
