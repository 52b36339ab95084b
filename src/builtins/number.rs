//! `Number` constructor/statics and `Number.prototype`.

use crate::signal::Signal;
use crate::terms;
use crate::value::{ObjectRef, PropertyDescriptor, Value};

use super::{arg, define_method, native, Builtins};

pub fn constructor(b: &Builtins) -> Value {
    let proto = b.number_proto.clone();
    let ctor = native("Number", Some(b.function_proto.clone()), |_ctx, _this, args| {
        Ok(Value::Number(match args.first() {
            Some(v) => terms::to_number(v),
            None => 0.0,
        }))
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    proto.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor.clone()));

    ctor_obj.borrow_mut().define("MAX_SAFE_INTEGER", PropertyDescriptor::readonly(Value::Number(9007199254740991.0)));
    ctor_obj.borrow_mut().define("MIN_SAFE_INTEGER", PropertyDescriptor::readonly(Value::Number(-9007199254740991.0)));
    ctor_obj.borrow_mut().define("MAX_VALUE", PropertyDescriptor::readonly(Value::Number(f64::MAX)));
    ctor_obj.borrow_mut().define("MIN_VALUE", PropertyDescriptor::readonly(Value::Number(f64::MIN_POSITIVE)));
    ctor_obj.borrow_mut().define("EPSILON", PropertyDescriptor::readonly(Value::Number(f64::EPSILON)));
    ctor_obj.borrow_mut().define("NaN", PropertyDescriptor::readonly(Value::Number(f64::NAN)));
    ctor_obj.borrow_mut().define("POSITIVE_INFINITY", PropertyDescriptor::readonly(Value::Number(f64::INFINITY)));
    ctor_obj.borrow_mut().define("NEGATIVE_INFINITY", PropertyDescriptor::readonly(Value::Number(f64::NEG_INFINITY)));

    define_method(ctor_obj, "isInteger", None, |_ctx, _this, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n == n.trunc())))
    });
    define_method(ctor_obj, "isFinite", None, |_ctx, _this, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
    });
    define_method(ctor_obj, "isNaN", None, |_ctx, _this, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
    });
    define_method(ctor_obj, "isSafeInteger", None, |_ctx, _this, args| {
        Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n == n.trunc() && n.abs() <= 9007199254740991.0)))
    });
    define_method(ctor_obj, "parseFloat", None, |_ctx, _this, args| Ok(Value::Number(parse_leading_float(&terms::to_js_string(&arg(args, 0))))));
    define_method(ctor_obj, "parseInt", None, |_ctx, _this, args| {
        Ok(Value::Number(parse_leading_int(&terms::to_js_string(&arg(args, 0)), args.get(1))))
    });
    ctor
}

pub fn install_prototype(proto: &ObjectRef) {
    define_method(proto, "toFixed", None, |ctx, this, args| {
        let n = terms::to_number(this);
        let digits = terms::to_number(&arg(args, 0)) as i32;
        if !(0..=100).contains(&digits) {
            return Err(Signal::range_error("toFixed() digits argument must be between 0 and 100", ctx.current_node.get()));
        }
        if n.is_nan() {
            return Ok(Value::string("NaN"));
        }
        Ok(Value::string(format!("{:.*}", digits as usize, n)))
    });

    define_method(proto, "toString", None, |ctx, this, args| {
        let n = terms::to_number(this);
        let radix = match args.first() {
            Some(v) if !matches!(v, Value::Undefined) => terms::to_number(v) as u32,
            _ => 10,
        };
        if radix == 10 {
            return Ok(Value::string(terms::format_number(n)));
        }
        if !(2..=36).contains(&radix) {
            return Err(Signal::range_error("toString() radix must be between 2 and 36", ctx.current_node.get()));
        }
        Ok(Value::string(to_radix_string(n, radix)))
    });

    define_method(proto, "valueOf", None, |_ctx, this, _args| Ok(Value::Number(terms::to_number(this))));
}

fn to_radix_string(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let negative = n < 0.0;
    let mut int_part = n.abs().trunc() as u64;
    let digits = "0123456789abcdefghijklmnopqrstuvwxyz".as_bytes();
    let mut out = Vec::new();
    if int_part == 0 {
        out.push(b'0');
    }
    while int_part > 0 {
        out.push(digits[(int_part % radix as u64) as usize]);
        int_part /= radix as u64;
    }
    out.reverse();
    let mut s = String::from_utf8(out).unwrap();
    if negative {
        s.insert(0, '-');
    }
    s
}

fn parse_leading_float(s: &str) -> f64 {
    let trimmed = s.trim_start();
    let mut end = 0;
    let bytes = trimmed.as_bytes();
    let mut seen_dot = false;
    let mut seen_digit = false;
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => {
                seen_digit = true;
                i += 1;
            }
            b'.' if !seen_dot => {
                seen_dot = true;
                i += 1;
            }
            b'e' | b'E' if seen_digit => {
                let save = i;
                i += 1;
                if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                    i += 1;
                }
                if i < bytes.len() && bytes[i].is_ascii_digit() {
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                } else {
                    i = save;
                }
                break;
            }
            _ => break,
        }
        end = i;
    }
    if !seen_digit {
        return f64::NAN;
    }
    trimmed[..end.max(i.min(trimmed.len()))].parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_leading_int(s: &str, radix_arg: Option<&Value>) -> f64 {
    let mut trimmed = s.trim_start();
    let negative = trimmed.starts_with('-');
    if trimmed.starts_with('+') || trimmed.starts_with('-') {
        trimmed = &trimmed[1..];
    }
    let mut radix = match radix_arg {
        Some(v) if !matches!(v, Value::Undefined) => terms::to_number(v) as u32,
        _ => 0,
    };
    if radix == 0 {
        if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
            radix = 16;
            trimmed = &trimmed[2..];
        } else {
            radix = 10;
        }
    } else if radix == 16 && (trimmed.starts_with("0x") || trimmed.starts_with("0X")) {
        trimmed = &trimmed[2..];
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let end = trimmed.find(|c: char| !c.is_digit(radix)).unwrap_or(trimmed.len());
    if end == 0 {
        return f64::NAN;
    }
    let value = i64::from_str_radix(&trimmed[..end], radix).map(|v| v as f64).unwrap_or(f64::NAN);
    if negative {
        -value
    } else {
        value
    }
}
