//! `TextEncoder`/`TextDecoder` (UTF-8 string/byte-array conversion) and a
//! minimal `Uint8Array` to carry the bytes between them, per spec §4.6's
//! text-codec bridge. There's no typed-array family beyond this one view;
//! `Uint8Array` here is a plain array-kind object holding byte-range
//! `Value::Number`s, not a real `ArrayBuffer` view.

use std::cell::RefCell;
use std::rc::Rc;

use crate::evaluator::make_array;
use crate::signal::Signal;
use crate::terms;
use crate::value::{ObjectKind, PropertyDescriptor, Value};

use super::{arg, define_method, Builtins};

fn bytes_of(v: &Value) -> Vec<u8> {
    match v {
        Value::Object(o) if o.borrow().kind == ObjectKind::Array => o
            .borrow()
            .array_elements()
            .unwrap()
            .iter()
            .map(|e| match e {
                Value::Number(n) => *n as i64 as u8,
                _ => 0,
            })
            .collect(),
        _ => Vec::new(),
    }
}

pub fn text_encoder_constructor(b: &Builtins) -> Value {
    let proto = super::new_plain(Some(b.object_proto.clone()));
    define_method(&proto, "encode", None, |ctx, _this, args| {
        let s = terms::to_js_string(&arg(args, 0));
        let bytes: Vec<Value> = s.as_bytes().iter().map(|byte| Value::Number(*byte as f64)).collect();
        Ok(make_array(ctx, bytes))
    });
    proto.borrow_mut().define("encoding", PropertyDescriptor::readonly(Value::string("utf-8")));

    let proto_for_ctor = proto.clone();
    let ctor = super::native("TextEncoder", Some(b.function_proto.clone()), move |ctx, _this, _args| {
        let obj = crate::value::JsObject::new(Some(proto_for_ctor.clone()));
        let _ = ctx;
        Ok(Value::Object(Rc::new(RefCell::new(obj))))
    });
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    ctor
}

pub fn text_decoder_constructor(b: &Builtins) -> Value {
    let proto = super::new_plain(Some(b.object_proto.clone()));
    define_method(&proto, "decode", None, |_ctx, _this, args| {
        let bytes = bytes_of(&arg(args, 0));
        Ok(Value::string(String::from_utf8_lossy(&bytes).into_owned()))
    });
    proto.borrow_mut().define("encoding", PropertyDescriptor::readonly(Value::string("utf-8")));

    let proto_for_ctor = proto.clone();
    let ctor = super::native("TextDecoder", Some(b.function_proto.clone()), move |_ctx, _this, _args| Ok(Value::Object(Rc::new(RefCell::new(crate::value::JsObject::new(Some(proto_for_ctor.clone())))))));
    let Value::Object(ctor_obj) = &ctor else { unreachable!() };
    ctor_obj.borrow_mut().define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    ctor
}

pub fn uint8array_constructor(b: &Builtins) -> Value {
    super::native("Uint8Array", Some(b.function_proto.clone()), |ctx, _this, args| {
        let elements = match args.first() {
            Some(Value::Object(o)) if o.borrow().kind == ObjectKind::Array => o.borrow().array_elements().unwrap().iter().map(|v| Value::Number(match v { Value::Number(n) => (*n as i64 as u8) as f64, _ => 0.0 })).collect(),
            Some(Value::Number(n)) => vec![Value::Number(0.0); *n as usize],
            _ => Vec::new(),
        };
        let arr = make_array(ctx, elements);
        if let Value::Object(o) = &arr {
            o.borrow_mut().proto = Some(ctx.root.builtins.array_proto.clone());
        }
        Ok(arr)
    })
}
