//! Embeddable ECMAScript-subset interpreter: lexer, parser, tree-walking
//! evaluator and prototype-based built-ins, fronted by [`JsEngine`] (spec
//! §6: "Engine surface"). A secondary Gherkin-style feature-file front
//! end shares the lexer/parser plumbing (spec §4.3, §8 scenario 8) and is
//! exposed separately through [`gherkin`].

pub mod ast;
pub mod bridge;
pub mod builtins;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod gherkin;
pub mod lexer;
pub mod literals;
pub mod parser;
pub mod signal;
pub mod source;
pub mod terms;
pub mod token;
pub mod value;

use std::cell::RefCell;
use std::rc::Rc;

use context::{Context, ScopeKind};
use error::EngineError;
use source::SourceBuffer;
use value::JsObject;

pub use bridge::HostBridge;
pub use error::{CompileError, ErrorKind, Position};
pub use value::{ObjectRef, Value};

/// One interpreter instance: a root [`Context`] (global bindings, the
/// console sink, the host bridge slot and the built-in prototypes) plus
/// every `eval` call against it shares that same root, so declarations
/// from one call are visible to the next (spec §6: "sharing root context
/// across calls").
///
/// Not `Send`/`Sync` — every value in the object graph is `Rc`/`RefCell`,
/// matching the single-threaded, synchronous execution model of spec §5.
/// Run one `JsEngine` per thread.
pub struct JsEngine {
    ctx: Rc<Context>,
}

impl Default for JsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEngine {
    /// Builds a fresh engine: installs every built-in prototype and
    /// global (`Array`, `Object`, `String`, ..., `console`), with no
    /// console sink and no host bridge configured yet.
    pub fn new() -> Self {
        let global_object = Rc::new(RefCell::new(JsObject::new(None)));
        let ctx = Context::new_root(global_object, builtins::Builtins::install());
        builtins::install_globals(&ctx);
        JsEngine { ctx }
    }

    /// Parses and evaluates `source` against the shared root context,
    /// returning the completion value of the last statement or the first
    /// thrown/compile error (spec §6).
    pub fn eval(&self, source: &str) -> Result<Value, EngineError> {
        let buffer = Rc::new(SourceBuffer::new(source));
        let program = parser::parse_program(buffer)?;
        evaluator::run_program(&self.ctx, &program)
    }

    /// Declares or overwrites a root `var` binding, visible to every
    /// subsequent `eval` call (spec §6: "`set(name, value)` — read/write
    /// root bindings").
    pub fn set(&self, name: &str, value: Value) {
        self.ctx.declare(name.into(), ast::VarKind::Var, Some(value));
    }

    /// Reads a root binding, or `undefined` if it was never declared —
    /// matching the non-throwing `typeof` behavior spec §8 requires for
    /// unbound names, rather than surfacing a `ReferenceError` here.
    pub fn get(&self, name: &str) -> Value {
        if self.ctx.has(name) {
            self.ctx.get(name, Position::default()).unwrap_or(Value::Undefined)
        } else {
            Value::Undefined
        }
    }

    /// Diverts every `console.log`/`.warn`/`.error` call to `sink(level,
    /// message)` instead of the default no-op. `level` is one of `"log"`,
    /// `"warn"`, `"error"`.
    pub fn set_console_sink(&self, sink: impl Fn(&str, &str) + 'static) {
        *self.ctx.root.console_sink.borrow_mut() = Some(Rc::new(sink));
    }

    /// Enables (`Some`) or disables (`None`) host interop; with no bridge
    /// installed, the `Java` global evaluates to `undefined` (spec §6).
    pub fn set_bridge(&self, bridge: Option<Rc<dyn HostBridge>>) {
        *self.ctx.root.bridge.borrow_mut() = bridge;
    }

    /// Best-effort cancellation (spec §5): the next loop back-edge or
    /// call boundary the evaluator reaches raises an uncatchable
    /// cancellation signal.
    pub fn cancel(&self) {
        self.ctx.root.cancelled.set(true);
    }

    /// A fresh child scope sharing this engine's root — mainly useful for
    /// hosts that want to sandbox one batch of declarations (e.g. a
    /// single Gherkin step) without polluting the shared root context.
    pub fn child_scope(&self) -> Rc<Context> {
        self.ctx.child(ScopeKind::Block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_shares_root_context_across_calls() {
        let engine = JsEngine::new();
        engine.eval("let counter = 0;").unwrap();
        engine.eval("counter = counter + 1;").unwrap();
        let v = engine.eval("counter;").unwrap();
        assert_eq!(terms::to_number(&v), 1.0);
    }

    #[test]
    fn set_and_get_round_trip_root_bindings() {
        let engine = JsEngine::new();
        engine.set("greeting", Value::string("hi"));
        assert_eq!(terms::to_js_string(&engine.get("greeting")), "hi");
        let v = engine.eval("greeting + ' there';").unwrap();
        assert_eq!(terms::to_js_string(&v), "hi there");
    }

    #[test]
    fn console_sink_receives_log_output() {
        let engine = JsEngine::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let log2 = log.clone();
        engine.set_console_sink(move |level, message| log2.borrow_mut().push(format!("{level}:{message}")));
        engine.eval("console.log('hello', 1);").unwrap();
        assert_eq!(log.borrow().as_slice(), ["log:hello 1"]);
    }

    #[test]
    fn unbound_typeof_does_not_throw() {
        let engine = JsEngine::new();
        let v = engine.eval("typeof neverDeclared;").unwrap();
        assert_eq!(terms::to_js_string(&v), "undefined");
    }

    #[test]
    fn with_no_bridge_java_is_undefined() {
        let engine = JsEngine::new();
        let v = engine.eval("typeof Java;").unwrap();
        assert_eq!(terms::to_js_string(&v), "undefined");
    }
}
