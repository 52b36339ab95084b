//! The `console` namespace object: `log`/`warn`/`error` sink through the
//! host-provided console callback set via `JsEngine::set_console_sink`
//! (spec §6), each tagged with its level so a host can filter (matching
//! how the teacher's own console implementation distinguishes the three
//! levels rather than flattening them to one stream).

use crate::terms;
use crate::value::Value;

use super::{define_method, new_plain};

fn format_args(args: &[Value]) -> String {
    args.iter().map(terms::to_js_string).collect::<Vec<_>>().join(" ")
}

fn emit(ctx: &std::rc::Rc<crate::context::Context>, level: &str, args: &[Value]) {
    if let Some(sink) = ctx.root.console_sink.borrow().as_ref() {
        sink(level, &format_args(args));
    }
}

pub fn object() -> Value {
    let obj = new_plain(None);
    define_method(&obj, "log", None, |ctx, _this, args| {
        emit(ctx, "log", args);
        Ok(Value::Undefined)
    });
    define_method(&obj, "warn", None, |ctx, _this, args| {
        emit(ctx, "warn", args);
        Ok(Value::Undefined)
    });
    define_method(&obj, "error", None, |ctx, _this, args| {
        emit(ctx, "error", args);
        Ok(Value::Undefined)
    });
    Value::Object(obj)
}
