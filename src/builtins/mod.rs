//! Built-in objects: singleton constructors and singleton prototypes,
//! installed once per engine instance (spec §4.6) and shared from the
//! root [`crate::context::RootData`] for the lifetime of that instance.
//! The prototypes themselves carry no per-engine state once built, so
//! per spec §5 they'd be safe to share *across* engine instances too —
//! this engine doesn't bother, since building them is cheap and it keeps
//! `Builtins` an ordinary owned value instead of a reference-counted one.

mod array;
mod console;
mod date;
mod error;
mod json;
mod math;
mod number;
mod object;
mod regexp;
mod string;
mod textcodec;

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::VarKind;
use crate::context::Context;
use crate::signal::Signal;
use crate::value::{Callable, JsObject, NativeFn, ObjectRef, PropertyDescriptor, Value};

/// Every built-in prototype object, grouped so the evaluator can attach
/// the right one when it manufactures a value of a given shape (array
/// literal, regex literal, thrown error, ...) without re-deriving it.
pub struct Builtins {
    pub object_proto: ObjectRef,
    pub function_proto: ObjectRef,
    pub array_proto: ObjectRef,
    pub string_proto: ObjectRef,
    pub number_proto: ObjectRef,
    pub boolean_proto: ObjectRef,
    pub error_proto: ObjectRef,
    pub type_error_proto: ObjectRef,
    pub reference_error_proto: ObjectRef,
    pub range_error_proto: ObjectRef,
    pub syntax_error_proto: ObjectRef,
    pub regex_proto: ObjectRef,
    pub date_proto: ObjectRef,
}

/// Wraps a Rust closure as a native [`Callable`] value. Every built-in
/// method and constructor in this module goes through this one
/// constructor so the calling convention (`ctx`, bound `this`, argument
/// slice, `Result<Value, Signal>`) is uniform between hand-written
/// natives and the evaluator's own call dispatch.
pub fn native(
    name: &'static str,
    proto: Option<ObjectRef>,
    f: impl Fn(&Rc<Context>, &Value, &[Value]) -> Result<Value, Signal> + 'static,
) -> Value {
    let func: NativeFn = Rc::new(f);
    Value::Object(Rc::new(RefCell::new(JsObject::new_function(
        proto,
        Callable::Native { name: Some(name.into()), func },
    ))))
}

fn new_plain(proto: Option<ObjectRef>) -> ObjectRef {
    Rc::new(RefCell::new(JsObject::new(proto)))
}

fn define_method(
    target: &ObjectRef,
    name: &'static str,
    proto: Option<ObjectRef>,
    f: impl Fn(&Rc<Context>, &Value, &[Value]) -> Result<Value, Signal> + 'static,
) {
    target.borrow_mut().define(name, PropertyDescriptor::hidden(native(name, proto, f)));
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

/// Reads a string-valued own-or-inherited property off `this` (error
/// `name`/`message`, mainly), falling back to `default` for any
/// non-object or unset value.
fn builtin_lookup_string(this: &Value, key: &str, default: &str) -> String {
    match this {
        Value::Object(o) => match crate::value::JsObject::lookup(o, key) {
            Some(v) => crate::terms::to_js_string(&v),
            None => default.to_string(),
        },
        _ => default.to_string(),
    }
}

impl Builtins {
    /// Builds every prototype object. Constructors (and the functions
    /// that live only on constructors, like `Array.isArray`) are
    /// installed separately by [`install_globals`] once a root
    /// [`Context`] exists to declare them into, since a few constructors
    /// close over `ctx` (e.g. `JSON.parse` needs it to construct arrays
    /// and objects with the right prototypes).
    pub fn install() -> Builtins {
        let object_proto = new_plain(None);
        let function_proto = new_plain(Some(object_proto.clone()));
        let array_proto = new_plain(Some(object_proto.clone()));
        let string_proto = new_plain(Some(object_proto.clone()));
        let number_proto = new_plain(Some(object_proto.clone()));
        let boolean_proto = new_plain(Some(object_proto.clone()));
        let error_proto = new_plain(Some(object_proto.clone()));
        let type_error_proto = new_plain(Some(error_proto.clone()));
        let reference_error_proto = new_plain(Some(error_proto.clone()));
        let range_error_proto = new_plain(Some(error_proto.clone()));
        let syntax_error_proto = new_plain(Some(error_proto.clone()));
        let regex_proto = new_plain(Some(object_proto.clone()));
        let date_proto = new_plain(Some(object_proto.clone()));

        array::install_prototype(&array_proto);
        string::install_prototype(&string_proto);
        number::install_prototype(&number_proto);
        error::install_prototype(&error_proto, "Error");
        error::install_prototype(&type_error_proto, "TypeError");
        error::install_prototype(&reference_error_proto, "ReferenceError");
        error::install_prototype(&range_error_proto, "RangeError");
        error::install_prototype(&syntax_error_proto, "SyntaxError");
        regexp::install_prototype(&regex_proto);
        date::install_prototype(&date_proto);

        Builtins {
            object_proto,
            function_proto,
            array_proto,
            string_proto,
            number_proto,
            boolean_proto,
            error_proto,
            type_error_proto,
            reference_error_proto,
            range_error_proto,
            syntax_error_proto,
            regex_proto,
            date_proto,
        }
    }
}

/// Declares every global built-in (`Array`, `Object`, `Math`, `JSON`,
/// `Date`, `RegExp`, `String`, `Number`, `Error` and its siblings,
/// `console`, `TextEncoder`/`TextDecoder`/`Uint8Array`) as root `var`
/// bindings. `Java` is deliberately not declared here: it resolves
/// dynamically off the live bridge slot (see [`crate::evaluator`]) so
/// that `setBridge(null)` takes effect on the next read instead of
/// leaving a stale binding around.
pub fn install_globals(ctx: &Rc<Context>) {
    let b = &ctx.root.builtins;
    let globals: Vec<(&'static str, Value)> = vec![
        ("Object", object::constructor(ctx, b)),
        ("Array", array::constructor(ctx, b)),
        ("String", string::constructor(b)),
        ("Number", number::constructor(b)),
        ("Math", math::object()),
        ("JSON", json::object(ctx)),
        ("Date", date::constructor(b)),
        ("RegExp", regexp::constructor(ctx, b)),
        ("Error", error::constructor(b, &b.error_proto, "Error")),
        ("TypeError", error::constructor(b, &b.type_error_proto, "TypeError")),
        ("ReferenceError", error::constructor(b, &b.reference_error_proto, "ReferenceError")),
        ("RangeError", error::constructor(b, &b.range_error_proto, "RangeError")),
        ("SyntaxError", error::constructor(b, &b.syntax_error_proto, "SyntaxError")),
        ("console", console::object()),
        ("TextEncoder", textcodec::text_encoder_constructor(b)),
        ("TextDecoder", textcodec::text_decoder_constructor(b)),
        ("Uint8Array", textcodec::uint8array_constructor(b)),
    ];
    for (name, value) in globals {
        ctx.declare(name.into(), VarKind::Var, Some(value));
    }
}

pub(crate) use arg as builtin_arg;
pub(crate) use define_method as builtin_method;
pub(crate) use new_plain as builtin_new_plain;
