//! `String` constructor and `String.prototype`.

use std::rc::Rc;

use crate::context::Context;
use crate::error::Position;
use crate::evaluator::{call_value, make_array};
use crate::signal::Signal;
use crate::terms;
use crate::value::{ObjectRef, PropertyDescriptor, Value};

use super::{arg, define_method, native, Builtins};

fn this_string(this: &Value) -> String {
    terms::to_js_string(this)
}

fn at(ctx: &Rc<Context>) -> Position {
    ctx.current_node.get()
}

/// Clamps a JS string index argument (possibly negative, possibly
/// fractional/NaN) into `0..=len`, the shared rule behind `slice` and the
/// `String.prototype` search methods' `fromIndex` argument.
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

pub fn constructor(b: &Builtins) -> Value {
    let proto = b.string_proto.clone();
    let ctor = native("String", Some(b.function_proto.clone()), |_ctx, _this, args| {
        Ok(Value::string(match args.first() {
            Some(v) => terms::to_js_string(v),
            None => String::new(),
        }))
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    proto.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor.clone()));
    ctor
}

pub fn install_prototype(proto: &ObjectRef) {
    define_method(proto, "charAt", None, |_ctx, this, args| {
        let s = this_string(this);
        let i = terms::to_number(&arg(args, 0)) as i64;
        Ok(Value::string(if i < 0 { String::new() } else { s.chars().nth(i as usize).map(|c| c.to_string()).unwrap_or_default() }))
    });

    define_method(proto, "charCodeAt", None, |_ctx, this, args| {
        let s = this_string(this);
        let i = terms::to_number(&arg(args, 0)) as i64;
        Ok(match (i >= 0).then(|| s.chars().nth(i as usize)).flatten() {
            Some(c) => Value::Number(c as u32 as f64),
            None => Value::Number(f64::NAN),
        })
    });

    define_method(proto, "codePointAt", None, |_ctx, this, args| {
        let s = this_string(this);
        let i = terms::to_number(&arg(args, 0)) as i64;
        Ok(match (i >= 0).then(|| s.chars().nth(i as usize)).flatten() {
            Some(c) => Value::Number(c as u32 as f64),
            None => Value::Undefined,
        })
    });

    define_method(proto, "indexOf", None, |_ctx, this, args| {
        let s = this_string(this);
        let needle = terms::to_js_string(&arg(args, 0));
        let from = normalize_index(args.get(1).cloned().unwrap_or(Value::Number(0.0)), s.chars().count() as i64, 0) as usize;
        let char_indices: Vec<usize> = s.char_indices().map(|(i, _)| i).chain(std::iter::once(s.len())).collect();
        let byte_start = char_indices.get(from).copied().unwrap_or(s.len());
        match s[byte_start..].find(&needle) {
            Some(byte_off) => {
                let char_off = s[..byte_start + byte_off].chars().count();
                Ok(Value::Number(char_off as f64))
            }
            None => Ok(Value::Number(-1.0)),
        }
    });

    define_method(proto, "lastIndexOf", None, |_ctx, this, args| {
        let s = this_string(this);
        let needle = terms::to_js_string(&arg(args, 0));
        match s.rfind(&needle) {
            Some(byte_off) => Ok(Value::Number(s[..byte_off].chars().count() as f64)),
            None => Ok(Value::Number(-1.0)),
        }
    });

    define_method(proto, "includes", None, |_ctx, this, args| {
        Ok(Value::Bool(this_string(this).contains(&terms::to_js_string(&arg(args, 0)))))
    });

    define_method(proto, "startsWith", None, |_ctx, this, args| {
        Ok(Value::Bool(this_string(this).starts_with(&terms::to_js_string(&arg(args, 0)))))
    });

    define_method(proto, "endsWith", None, |_ctx, this, args| {
        Ok(Value::Bool(this_string(this).ends_with(&terms::to_js_string(&arg(args, 0)))))
    });

    define_method(proto, "slice", None, |_ctx, this, args| {
        let s = this_string(this);
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len() as i64;
        let start = normalize_index(arg(args, 0), len, 0);
        let end = normalize_index(arg(args, 1), len, len);
        Ok(Value::string(if start < end { chars[start as usize..end as usize].iter().collect::<String>() } else { String::new() }))
    });

    define_method(proto, "substring", None, |_ctx, this, args| {
        let s = this_string(this);
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len() as i64;
        let clamp = |v: Value| terms::to_number(&v).max(0.0).min(len as f64) as i64;
        let a = if matches!(arg(args, 0), Value::Undefined) { 0 } else { clamp(arg(args, 0)) };
        let b = if matches!(args.get(1), None | Some(Value::Undefined)) { len } else { clamp(arg(args, 1)) };
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        Ok(Value::string(chars[start as usize..end as usize].iter().collect::<String>()))
    });

    define_method(proto, "substr", None, |_ctx, this, args| {
        let s = this_string(this);
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len() as i64;
        let start = normalize_index(arg(args, 0), len, 0) as usize;
        let count = match args.get(1) {
            Some(v) if !matches!(v, Value::Undefined) => terms::to_number(v).max(0.0) as usize,
            _ => chars.len().saturating_sub(start),
        };
        let end = (start + count).min(chars.len());
        Ok(Value::string(if start < end { chars[start..end].iter().collect::<String>() } else { String::new() }))
    });

    define_method(proto, "split", None, |ctx, this, args| {
        let s = this_string(this);
        match args.first() {
            None | Some(Value::Undefined) => Ok(make_array(ctx, vec![Value::string(s)])),
            Some(Value::String(sep)) if sep.is_empty() => Ok(make_array(ctx, s.chars().map(|c| Value::string(c.to_string())).collect())),
            Some(sep) => {
                let sep = terms::to_js_string(sep);
                Ok(make_array(ctx, s.split(sep.as_str()).map(Value::string).collect()))
            }
        }
    });

    define_method(proto, "replace", None, |ctx, this, args| {
        let s = this_string(this);
        let pattern = terms::to_js_string(&arg(args, 0));
        let replacement = arg(args, 1);
        Ok(Value::string(match s.find(&pattern) {
            Some(byte_off) => {
                let rep = resolve_replacement(ctx, &replacement, &pattern, byte_off, &s)?;
                format!("{}{}{}", &s[..byte_off], rep, &s[byte_off + pattern.len()..])
            }
            None => s,
        }))
    });

    define_method(proto, "replaceAll", None, |ctx, this, args| {
        let s = this_string(this);
        let pattern = terms::to_js_string(&arg(args, 0));
        let replacement = arg(args, 1);
        if pattern.is_empty() {
            return Ok(Value::string(s));
        }
        let mut out = String::new();
        let mut rest = s.as_str();
        let mut consumed = 0usize;
        while let Some(byte_off) = rest.find(&pattern) {
            out.push_str(&rest[..byte_off]);
            out.push_str(&resolve_replacement(ctx, &replacement, &pattern, consumed + byte_off, &s)?);
            rest = &rest[byte_off + pattern.len()..];
            consumed += byte_off + pattern.len();
        }
        out.push_str(rest);
        Ok(Value::string(out))
    });

    define_method(proto, "toUpperCase", None, |_ctx, this, _args| Ok(Value::string(this_string(this).to_uppercase())));
    define_method(proto, "toLowerCase", None, |_ctx, this, _args| Ok(Value::string(this_string(this).to_lowercase())));
    define_method(proto, "trim", None, |_ctx, this, _args| Ok(Value::string(this_string(this).trim().to_string())));
    define_method(proto, "trimStart", None, |_ctx, this, _args| Ok(Value::string(this_string(this).trim_start().to_string())));
    define_method(proto, "trimEnd", None, |_ctx, this, _args| Ok(Value::string(this_string(this).trim_end().to_string())));

    define_method(proto, "repeat", None, |ctx, this, args| {
        let n = terms::to_number(&arg(args, 0));
        if n < 0.0 || !n.is_finite() {
            return Err(Signal::range_error("Invalid count value", at(ctx)));
        }
        Ok(Value::string(this_string(this).repeat(n as usize)))
    });

    define_method(proto, "padStart", None, |_ctx, this, args| {
        Ok(Value::string(pad(&this_string(this), args, true)))
    });
    define_method(proto, "padEnd", None, |_ctx, this, args| {
        Ok(Value::string(pad(&this_string(this), args, false)))
    });

    define_method(proto, "concat", None, |_ctx, this, args| {
        let mut s = this_string(this);
        for a in args {
            s.push_str(&terms::to_js_string(a));
        }
        Ok(Value::string(s))
    });

    define_method(proto, "toString", None, |_ctx, this, _args| Ok(Value::string(this_string(this))));
    define_method(proto, "valueOf", None, |_ctx, this, _args| Ok(Value::string(this_string(this))));

    define_method(proto, "match", None, |ctx, this, args| {
        let s = this_string(this);
        let regex_val = match arg(args, 0) {
            re @ Value::Object(_) => re,
            other => crate::builtins::regexp::make_regex(ctx, terms::to_js_string(&other).into(), "".into(), at(ctx))?,
        };
        crate::builtins::regexp::exec(&regex_val, &s, ctx)
    });
}

fn pad(s: &str, args: &[Value], at_start: bool) -> String {
    let target_len = terms::to_number(&arg(args, 0)).max(0.0) as usize;
    let fill = match args.get(1) {
        Some(Value::Undefined) | None => " ".to_string(),
        Some(v) => terms::to_js_string(v),
    };
    let cur_len = s.chars().count();
    if fill.is_empty() || cur_len >= target_len {
        return s.to_string();
    }
    let need = target_len - cur_len;
    let padding: String = fill.chars().cycle().take(need).collect();
    if at_start {
        format!("{padding}{s}")
    } else {
        format!("{s}{padding}")
    }
}

fn resolve_replacement(ctx: &Rc<Context>, replacement: &Value, matched: &str, byte_off: usize, whole: &str) -> Result<String, crate::signal::Signal> {
    match replacement {
        Value::Object(o) if o.borrow().callable().is_some() => {
            let result = call_value(
                ctx,
                replacement,
                Value::Undefined,
                &[Value::string(matched), Value::Number(whole[..byte_off].chars().count() as f64), Value::string(whole)],
                at(ctx),
            )?;
            Ok(terms::to_js_string(&result))
        }
        other => Ok(terms::to_js_string(other).replace("$&", matched)),
    }
}
