//! `JSON.stringify` / `JSON.parse`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::Context;
use crate::evaluator::{call_value, make_array};
use crate::signal::Signal;
use crate::terms;
use crate::value::{JsObject, ObjectKind, PropertyDescriptor, Value};

use super::{arg, define_method, new_plain};

pub fn object(_ctx: &Rc<Context>) -> Value {
    let obj = new_plain(None);
    define_method(&obj, "stringify", None, |ctx, _this, args| {
        let value = arg(args, 0);
        let mut seen = Vec::new();
        Ok(match stringify(ctx, &value, &mut seen)? {
            Some(s) => Value::string(s),
            None => Value::Undefined,
        })
    });
    define_method(&obj, "parse", None, |ctx, _this, args| {
        let text = terms::to_js_string(&arg(args, 0));
        let mut p = JsonParser { bytes: text.as_bytes(), pos: 0 };
        p.skip_ws();
        let value = p.parse_value(ctx)?;
        p.skip_ws();
        if p.pos != p.bytes.len() {
            return Err(Signal::throw(Value::make_error("SyntaxError", "Unexpected non-whitespace character after JSON".to_string()), ctx.current_node.get()));
        }
        Ok(value)
    });
    Value::Object(obj)
}

fn stringify(ctx: &Rc<Context>, v: &Value, seen: &mut Vec<*const ()>) -> Result<Option<String>, Signal> {
    Ok(match v {
        Value::Undefined => None,
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(if n.is_finite() { terms::format_number(*n) } else { "null".to_string() }),
        Value::String(s) => Some(quote(s)),
        Value::Object(o) if o.borrow().callable().is_some() => None,
        Value::Object(o) => {
            // toJSON() takes priority, matching the host's own serializer.
            if let Some(to_json) = JsObject::lookup(o, "toJSON") {
                if matches!(&to_json, Value::Object(f) if f.borrow().callable().is_some()) {
                    let replaced = call_value(ctx, &to_json, v.clone(), &[], ctx.current_node.get())?;
                    return stringify(ctx, &replaced, seen);
                }
            }
            let ptr = Rc::as_ptr(o) as *const ();
            if seen.contains(&ptr) {
                return Err(Signal::type_error("Converting circular structure to JSON", ctx.current_node.get()));
            }
            seen.push(ptr);
            let result = if o.borrow().kind == ObjectKind::Array {
                let elems = o.borrow().array_elements().unwrap().to_vec();
                let parts: Vec<String> = elems
                    .iter()
                    .map(|e| stringify(ctx, e, seen).map(|s| s.unwrap_or_else(|| "null".to_string())))
                    .collect::<Result<_, _>>()?;
                Some(format!("[{}]", parts.join(",")))
            } else {
                let keys = super::object::own_enumerable_keys(v);
                let mut parts = Vec::new();
                for k in keys {
                    let field = crate::evaluator::get_property(ctx, v, &k, ctx.current_node.get())?;
                    if let Some(s) = stringify(ctx, &field, seen)? {
                        parts.push(format!("{}:{}", quote(&k), s));
                    }
                }
                Some(format!("{{{}}}", parts.join(",")))
            };
            seen.pop();
            result
        }
    })
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct JsonParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> JsonParser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\n' | b'\r') {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn err(&self, ctx: &Rc<Context>, msg: &str) -> Signal {
        Signal::throw(Value::make_error("SyntaxError", format!("{msg} in JSON at position {}", self.pos)), ctx.current_node.get())
    }

    fn expect(&mut self, ctx: &Rc<Context>, b: u8) -> Result<(), Signal> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(ctx, &format!("Expected '{}'", b as char)))
        }
    }

    fn parse_value(&mut self, ctx: &Rc<Context>) -> Result<Value, Signal> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_object(ctx),
            Some(b'[') => self.parse_array(ctx),
            Some(b'"') => Ok(Value::string(self.parse_string(ctx)?)),
            Some(b't') => self.parse_literal(ctx, "true", Value::Bool(true)),
            Some(b'f') => self.parse_literal(ctx, "false", Value::Bool(false)),
            Some(b'n') => self.parse_literal(ctx, "null", Value::Null),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(ctx),
            _ => Err(self.err(ctx, "Unexpected token")),
        }
    }

    fn parse_literal(&mut self, ctx: &Rc<Context>, text: &str, value: Value) -> Result<Value, Signal> {
        if self.bytes[self.pos..].starts_with(text.as_bytes()) {
            self.pos += text.len();
            Ok(value)
        } else {
            Err(self.err(ctx, "Unexpected token"))
        }
    }

    fn parse_number(&mut self, ctx: &Rc<Context>) -> Result<Value, Signal> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            while self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        text.parse::<f64>().map(Value::Number).map_err(|_| self.err(ctx, "Invalid number"))
    }

    fn parse_string(&mut self, ctx: &Rc<Context>) -> Result<String, Signal> {
        self.expect(ctx, b'"')?;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.err(ctx, "Unterminated string")),
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'"') => out.push('"'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'/') => out.push('/'),
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'b') => out.push('\u{8}'),
                        Some(b'f') => out.push('\u{c}'),
                        Some(b'u') => {
                            let hex = std::str::from_utf8(&self.bytes[self.pos + 1..self.pos + 5]).map_err(|_| self.err(ctx, "Invalid escape"))?;
                            let code = u32::from_str_radix(hex, 16).map_err(|_| self.err(ctx, "Invalid escape"))?;
                            out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                            self.pos += 4;
                        }
                        _ => return Err(self.err(ctx, "Invalid escape")),
                    }
                    self.pos += 1;
                }
                Some(_) => {
                    let rest = std::str::from_utf8(&self.bytes[self.pos..]).map_err(|_| self.err(ctx, "Invalid UTF-8"))?;
                    let c = rest.chars().next().unwrap();
                    out.push(c);
                    self.pos += c.len_utf8();
                }
            }
        }
    }

    fn parse_array(&mut self, ctx: &Rc<Context>) -> Result<Value, Signal> {
        self.expect(ctx, b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(make_array(ctx, items));
        }
        loop {
            items.push(self.parse_value(ctx)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.skip_ws();
                }
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.err(ctx, "Expected ',' or ']'")),
            }
        }
        Ok(make_array(ctx, items))
    }

    fn parse_object(&mut self, ctx: &Rc<Context>) -> Result<Value, Signal> {
        self.expect(ctx, b'{')?;
        let obj = Rc::new(RefCell::new(JsObject::new(Some(ctx.root.builtins.object_proto.clone()))));
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(obj));
        }
        loop {
            self.skip_ws();
            let key = self.parse_string(ctx)?;
            self.skip_ws();
            self.expect(ctx, b':')?;
            let value = self.parse_value(ctx)?;
            obj.borrow_mut().define(key, PropertyDescriptor::data(value));
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                }
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.err(ctx, "Expected ',' or '}'")),
            }
        }
        Ok(Value::Object(obj))
    }
}
