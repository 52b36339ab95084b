//! The `Math` namespace object.

use crate::terms;
use crate::value::{PropertyDescriptor, Value};

use super::{arg, define_method, new_plain};

pub fn object() -> Value {
    let obj = new_plain(None);
    obj.borrow_mut().define("PI", PropertyDescriptor::readonly(Value::Number(std::f64::consts::PI)));
    obj.borrow_mut().define("E", PropertyDescriptor::readonly(Value::Number(std::f64::consts::E)));
    obj.borrow_mut().define("LN2", PropertyDescriptor::readonly(Value::Number(std::f64::consts::LN_2)));
    obj.borrow_mut().define("LN10", PropertyDescriptor::readonly(Value::Number(std::f64::consts::LN_10)));
    obj.borrow_mut().define("SQRT2", PropertyDescriptor::readonly(Value::Number(std::f64::consts::SQRT_2)));

    define_method(&obj, "abs", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).abs())));
    define_method(&obj, "floor", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).floor())));
    define_method(&obj, "ceil", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).ceil())));
    define_method(&obj, "round", None, |_ctx, _this, args| {
        let n = terms::to_number(&arg(args, 0));
        Ok(Value::Number((n + 0.5).floor()))
    });
    define_method(&obj, "trunc", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).trunc())));
    define_method(&obj, "sqrt", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).sqrt())));
    define_method(&obj, "cbrt", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).cbrt())));
    define_method(&obj, "pow", None, |_ctx, _this, args| {
        Ok(Value::Number(terms::to_number(&arg(args, 0)).powf(terms::to_number(&arg(args, 1)))))
    });
    define_method(&obj, "exp", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).exp())));
    define_method(&obj, "log", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).ln())));
    define_method(&obj, "log2", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).log2())));
    define_method(&obj, "log10", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).log10())));
    define_method(&obj, "sin", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).sin())));
    define_method(&obj, "cos", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).cos())));
    define_method(&obj, "tan", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).tan())));
    define_method(&obj, "atan", None, |_ctx, _this, args| Ok(Value::Number(terms::to_number(&arg(args, 0)).atan())));
    define_method(&obj, "atan2", None, |_ctx, _this, args| {
        Ok(Value::Number(terms::to_number(&arg(args, 0)).atan2(terms::to_number(&arg(args, 1)))))
    });
    define_method(&obj, "hypot", None, |_ctx, _this, args| {
        Ok(Value::Number(args.iter().map(|v| terms::to_number(v).powi(2)).sum::<f64>().sqrt()))
    });
    define_method(&obj, "max", None, |_ctx, _this, args| {
        if args.is_empty() {
            return Ok(Value::Number(f64::NEG_INFINITY));
        }
        let mut max = f64::NEG_INFINITY;
        for a in args {
            let n = terms::to_number(a);
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            if n > max {
                max = n;
            }
        }
        Ok(Value::Number(max))
    });
    define_method(&obj, "min", None, |_ctx, _this, args| {
        if args.is_empty() {
            return Ok(Value::Number(f64::INFINITY));
        }
        let mut min = f64::INFINITY;
        for a in args {
            let n = terms::to_number(a);
            if n.is_nan() {
                return Ok(Value::Number(f64::NAN));
            }
            if n < min {
                min = n;
            }
        }
        Ok(Value::Number(min))
    });
    define_method(&obj, "sign", None, |_ctx, _this, args| {
        let n = terms::to_number(&arg(args, 0));
        Ok(Value::Number(if n.is_nan() { f64::NAN } else if n > 0.0 { 1.0 } else if n < 0.0 { -1.0 } else { n }))
    });
    define_method(&obj, "random", None, |_ctx, _this, _args| Ok(Value::Number(pseudo_random())));

    Value::Object(obj)
}

/// A tiny xorshift generator reseeded from the address of a fresh stack
/// allocation each call — adequate for test-data shuffling, not for
/// anything security-sensitive (spec §5: no security sandbox is claimed
/// for this engine beyond the bridge on/off switch, and `Math.random` is
/// explicitly not cryptographic in ECMAScript either).
fn pseudo_random() -> f64 {
    use std::cell::Cell;
    thread_local! {
        static STATE: Cell<u64> = Cell::new(0x2545F4914F6CDD1D);
    }
    STATE.with(|s| {
        let mut x = s.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        s.set(x);
        (x >> 11) as f64 / (1u64 << 53) as f64
    })
}
