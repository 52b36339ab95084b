//! The `Context` tree: lexical scope frames, the binding store, `this`
//! resolution and the root context's engine-wide state (console sink,
//! host bridge, global object, eval-id counter).
//!
//! Scoping is resolved structurally by walking the parent-pointer chain
//! of `Context` nodes — one child context per block/function/catch — so
//! a nested `let` shadowing an outer binding of the same name is simply a
//! lookup that stops at the nearer context. `Binding.level`/`.previous`
//! are still populated for data-model fidelity with the shadow-stack
//! description in the spec, but nothing reads `.previous` to resolve a
//! name; see DESIGN.md.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::VarKind;
use crate::bridge::HostBridge;
use crate::error::Position;
use crate::signal::Signal;
use crate::value::{ObjectRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Root,
    Function,
    Block,
    Catch,
}

#[derive(Clone)]
pub struct Binding {
    pub name: Rc<str>,
    pub value: Value,
    pub level: u32,
    pub kind: VarKind,
    pub initialized: bool,
    pub eval_id: u32,
    pub previous: Option<Box<Binding>>,
}

#[derive(Clone, Default)]
pub struct CallInfo {
    pub is_new: bool,
    pub callee_name: Option<Rc<str>>,
}

pub type ConsoleSink = Rc<dyn Fn(&str, &str)>;

/// State shared by every context descending from one root — the engine's
/// global object, console sink, host bridge and eval-id counter.
pub struct RootData {
    pub global_object: ObjectRef,
    pub console_sink: RefCell<Option<ConsoleSink>>,
    pub bridge: RefCell<Option<Rc<dyn HostBridge>>>,
    pub builtins: crate::builtins::Builtins,
    /// Compiled regex cache keyed by `(pattern, flags)`, shared across
    /// every literal that evaluates to the same pattern/flags pair — the
    /// engine-wide memoization spec §5 asks for ("Regex compilation is
    /// memoized per literal node") without threading interior mutability
    /// through every `Expr` node.
    pub regex_cache: RefCell<IndexMap<(Rc<str>, Rc<str>), Rc<regex::Regex>>>,
    eval_counter: Cell<u32>,
    /// Best-effort cancellation (spec §5): consulted at loop back-edges
    /// and call boundaries; setting this makes the next check raise an
    /// uncatchable cancellation signal.
    pub cancelled: Cell<bool>,
}

impl RootData {
    pub fn next_eval_id(&self) -> u32 {
        let id = self.eval_counter.get();
        self.eval_counter.set(id + 1);
        id
    }
}

pub struct Context {
    pub kind: ScopeKind,
    pub parent: Option<Rc<Context>>,
    pub root: Rc<RootData>,
    bindings: RefCell<IndexMap<Rc<str>, Binding>>,
    this_val: RefCell<Option<Value>>,
    pub current_node: Cell<Position>,
    pub call_info: RefCell<Option<CallInfo>>,
    level: u32,
}

impl Context {
    pub fn new_root(global_object: ObjectRef, builtins: crate::builtins::Builtins) -> Rc<Context> {
        let root = Rc::new(RootData {
            global_object,
            console_sink: RefCell::new(None),
            bridge: RefCell::new(None),
            builtins,
            regex_cache: RefCell::new(IndexMap::new()),
            eval_counter: Cell::new(0),
            cancelled: Cell::new(false),
        });
        Rc::new(Context {
            kind: ScopeKind::Root,
            parent: None,
            root,
            bindings: RefCell::new(IndexMap::new()),
            this_val: RefCell::new(Some(Value::Undefined)),
            current_node: Cell::new(Position::default()),
            call_info: RefCell::new(None),
            level: 0,
        })
    }

    pub fn child(self: &Rc<Self>, kind: ScopeKind) -> Rc<Context> {
        let level = match kind {
            ScopeKind::Block | ScopeKind::Catch => self.level + 1,
            ScopeKind::Function | ScopeKind::Root => 0,
        };
        Rc::new(Context {
            kind,
            parent: Some(self.clone()),
            root: self.root.clone(),
            bindings: RefCell::new(IndexMap::new()),
            this_val: RefCell::new(None), // established later via set_this, or inherited lexically
            current_node: Cell::new(self.current_node.get()),
            call_info: RefCell::new(None),
            level,
        })
    }

    /// The nearest ancestor (including self) that hoisted `var`
    /// declarations land in.
    fn function_scope(self: &Rc<Self>) -> Rc<Context> {
        let mut cur = self.clone();
        loop {
            match cur.kind {
                ScopeKind::Function | ScopeKind::Root => return cur,
                _ => {
                    let parent = cur.parent.clone().expect("non-root context always has a parent");
                    cur = parent;
                }
            }
        }
    }

    pub fn set_this(&self, value: Value) {
        *self.this_val.borrow_mut() = Some(value);
    }

    pub fn this_value(self: &Rc<Self>) -> Value {
        let mut cur = self.clone();
        loop {
            if let Some(v) = cur.this_val.borrow().clone() {
                return v;
            }
            match cur.parent.clone() {
                Some(p) => cur = p,
                None => return Value::Undefined,
            }
        }
    }

    /// Declares a new binding. `var` hoists to the nearest function/root
    /// scope and is idempotent (re-running `var x` never raises); `let`
    /// and `const` declare in the current block and start in the
    /// temporal dead zone when `init` is `None`.
    pub fn declare(self: &Rc<Self>, name: Rc<str>, kind: VarKind, init: Option<Value>) {
        let target = if kind == VarKind::Var { self.function_scope() } else { self.clone() };
        let mut map = target.bindings.borrow_mut();
        let initialized = init.is_some() || kind == VarKind::Var;
        let value = init.unwrap_or(Value::Undefined);
        let eval_id = target.root.next_eval_id();
        if kind == VarKind::Var {
            if let Some(existing) = map.get_mut(&name) {
                if init.is_some() {
                    existing.value = value;
                }
                existing.eval_id = eval_id;
                return;
            }
        }
        let previous = map.swap_remove(&name).map(Box::new);
        map.insert(name.clone(), Binding { name, value, level: target.level, kind, initialized, eval_id, previous });
    }

    /// Looks up a binding by walking the context chain outward,
    /// returning the context that owns it (so `set` can write back to
    /// the right scope).
    fn resolve(self: &Rc<Self>, name: &str) -> Option<Rc<Context>> {
        let mut cur = self.clone();
        loop {
            if cur.bindings.borrow().contains_key(name) {
                return Some(cur);
            }
            match cur.parent.clone() {
                Some(p) => cur = p,
                None => return None,
            }
        }
    }

    /// Reads a binding's value. An unresolved name is *not* a
    /// `ReferenceError` here — per this engine's data model (§3), only a
    /// temporal-dead-zone access is: `typeof neverDeclared` must read
    /// `"undefined"` without throwing, so a plain identifier reference to
    /// a name nobody declared reads the same way. Callers that need
    /// classic-JS "undeclared reference throws" behavior for some other
    /// purpose should call [`Context::has`] first.
    pub fn get(self: &Rc<Self>, name: &str, at: Position) -> Result<Value, Signal> {
        let Some(owner) = self.resolve(name) else {
            return Ok(Value::Undefined);
        };
        let map = owner.bindings.borrow();
        let binding = &map[name];
        if !binding.initialized {
            return Err(Signal::reference_error(format!("Cannot access '{name}' before initialization"), at));
        }
        Ok(binding.value.clone())
    }

    pub fn has(self: &Rc<Self>, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn set(self: &Rc<Self>, name: &str, value: Value, at: Position) -> Result<(), Signal> {
        let owner = match self.resolve(name) {
            Some(o) => o,
            None => {
                // Undeclared assignment creates an implicit global, matching
                // non-strict-mode JS (this engine has no strict-mode Non-goal
                // carve-out, so the lenient behavior is the only one).
                self.root_context().declare(name.into(), VarKind::Var, Some(value));
                return Ok(());
            }
        };
        let mut map = owner.bindings.borrow_mut();
        let binding = map.get_mut(name).expect("resolve just found this key");
        if binding.kind == VarKind::Const && binding.initialized {
            return Err(Signal::type_error("Assignment to constant variable.", at));
        }
        binding.value = value;
        binding.initialized = true;
        Ok(())
    }

    fn root_context(self: &Rc<Self>) -> Rc<Context> {
        let mut cur = self.clone();
        while let Some(p) = cur.parent.clone() {
            cur = p;
        }
        cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::JsObject;

    fn root() -> Rc<Context> {
        Context::new_root(Rc::new(RefCell::new(JsObject::new(None))), crate::builtins::Builtins::install())
    }

    #[test]
    fn var_hoists_through_block_to_function_scope() {
        let fn_ctx = root().child(ScopeKind::Function);
        let block = fn_ctx.child(ScopeKind::Block);
        block.declare("x".into(), VarKind::Var, Some(Value::Number(1.0)));
        assert!(fn_ctx.has("x"));
        assert_eq!(block.get("x", Position::default()).unwrap().type_of(), "number");
    }

    #[test]
    fn let_in_tdz_raises_reference_error_until_initialized() {
        let ctx = root().child(ScopeKind::Block);
        ctx.declare("y".into(), VarKind::Let, None);
        assert!(ctx.get("y", Position::default()).is_err());
        ctx.set("y", Value::Number(2.0), Position::default()).unwrap();
        assert_eq!(ctx.get("y", Position::default()).unwrap().type_of(), "number");
    }

    #[test]
    fn const_reassignment_is_type_error() {
        let ctx = root().child(ScopeKind::Block);
        ctx.declare("z".into(), VarKind::Const, Some(Value::Number(1.0)));
        let err = ctx.set("z", Value::Number(2.0), Position::default()).unwrap_err();
        let thrown = match err {
            Signal::Throw(v, _) => v,
            _ => panic!("expected a thrown value"),
        };
        assert_eq!(crate::terms::to_js_string(&thrown), "TypeError: Assignment to constant variable.");
        assert!(matches!(ctx.get("z", Position::default()).unwrap(), Value::Number(n) if n == 1.0));
    }

    #[test]
    fn nested_block_shadows_outer_binding_without_mutating_it() {
        let outer = root().child(ScopeKind::Block);
        outer.declare("v".into(), VarKind::Let, Some(Value::Number(1.0)));
        let inner = outer.child(ScopeKind::Block);
        inner.declare("v".into(), VarKind::Let, Some(Value::Number(2.0)));
        assert_eq!(inner.get("v", Position::default()).unwrap().type_of(), "number");
        drop(inner);
        assert!(matches!(outer.get("v", Position::default()).unwrap(), Value::Number(n) if n == 1.0));
    }
}
