//! The tree-walking evaluator: statement and expression dispatch, variable
//! hoisting, destructuring, function/class construction and the member
//! get/set machinery shared by plain property access and the built-ins.
//!
//! There is deliberately no bytecode or intermediate form here — every
//! `Stmt`/`Expr` node is interpreted directly against a [`Context`], per
//! this engine's data model. Control flow that needs to unwind past
//! ordinary expression evaluation (`return`, `break`, `continue`, `throw`)
//! travels as a [`Signal`] through the same `Result` every other fallible
//! operation here uses.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::*;
use crate::context::{CallInfo, Context, ScopeKind};
use crate::error::{EngineError, Position};
use crate::signal::{EvalResult, Signal};
use crate::terms;
use crate::value::{Callable, JsObject, ObjectData, ObjectKind, ObjectRef, PropertyDescriptor, Value};

/// Parses and evaluates `program` in `ctx`, translating the terminal
/// [`Signal`] into the host-facing result. A bare top-level `return` is
/// accepted (ends evaluation early with that value) rather than rejected,
/// since this evaluator never validates "return outside a function" at
/// parse time; `break`/`continue` with no enclosing loop are similarly
/// swallowed rather than surfaced as an engine bug.
pub fn run_program(ctx: &Rc<Context>, program: &Program) -> Result<Value, EngineError> {
    hoist(ctx, &program.body);
    match eval_stmt_list(ctx, &program.body) {
        Ok(v) => Ok(v),
        Err(Signal::Return(v)) => Ok(v),
        Err(Signal::Break(_)) | Err(Signal::Continue(_)) => Ok(Value::Undefined),
        Err(Signal::Throw(v, stack)) => Err(EngineError::Thrown { message: terms::to_js_string(&v), stack }),
    }
}

fn check_cancelled(ctx: &Rc<Context>, at: Position) -> EvalResult<()> {
    if ctx.root.cancelled.get() {
        return Err(Signal::throw(Value::make_error("Error", "Execution cancelled".to_string()), at));
    }
    Ok(())
}

// ─── Statements ──────────────────────────────────────────────────────────

fn eval_stmt_list(ctx: &Rc<Context>, stmts: &[Stmt]) -> EvalResult<Value> {
    let mut last = Value::Undefined;
    for s in stmts {
        last = eval_stmt(ctx, s)?;
    }
    Ok(last)
}

/// Evaluates one statement, returning its completion value: most
/// statement forms complete with `undefined`, but expression statements
/// and the compound forms that wrap them (`block`, `if`, loops) propagate
/// the value of whatever ran last, so `eval("if (true) { 1 + 1 }")` reads
/// back `2` the way a REPL would expect.
fn eval_stmt(ctx: &Rc<Context>, stmt: &Stmt) -> EvalResult<Value> {
    ctx.current_node.set(stmt.pos);
    check_cancelled(ctx, stmt.pos)?;
    match &stmt.node {
        StmtKind::Expr(e) => eval_expr(ctx, e),
        StmtKind::VarDecl { kind, decls } => {
            for d in decls {
                let v = match &d.init {
                    Some(e) => eval_expr(ctx, e)?,
                    None => Value::Undefined,
                };
                bind_pattern(ctx, &d.name, v, Some(*kind), stmt.pos)?;
            }
            Ok(Value::Undefined)
        }
        StmtKind::Block(body) => {
            let block_ctx = ctx.child(ScopeKind::Block);
            hoist_functions_only(&block_ctx, body);
            eval_stmt_list(&block_ctx, body)
        }
        StmtKind::If { test, consequent, alternate } => {
            if terms::to_boolean(&eval_expr(ctx, test)?) {
                eval_stmt(ctx, consequent)
            } else if let Some(alt) = alternate {
                eval_stmt(ctx, alt)
            } else {
                Ok(Value::Undefined)
            }
        }
        StmtKind::While { .. }
        | StmtKind::DoWhile { .. }
        | StmtKind::For { .. }
        | StmtKind::ForIn { .. }
        | StmtKind::ForOf { .. }
        | StmtKind::Labeled { .. } => eval_loop_or_labeled(ctx, stmt, &[]),
        StmtKind::Return(e) => {
            let v = match e {
                Some(e) => eval_expr(ctx, e)?,
                None => Value::Undefined,
            };
            Err(Signal::Return(v))
        }
        StmtKind::Break(l) => Err(Signal::Break(l.clone())),
        StmtKind::Continue(l) => Err(Signal::Continue(l.clone())),
        StmtKind::Switch { discriminant, cases } => eval_switch(ctx, discriminant, cases, &[]),
        StmtKind::Throw(e) => {
            let v = eval_expr(ctx, e)?;
            Err(Signal::throw(v, stmt.pos))
        }
        StmtKind::Try { block, handler, finalizer } => eval_try(ctx, block, handler, finalizer, stmt.pos),
        StmtKind::FunctionDecl(_) => Ok(Value::Undefined), // already bound by hoisting
        StmtKind::ClassDecl { name, superclass: _, methods } => {
            let value = build_class(ctx, methods)?;
            ctx.declare(name.clone(), VarKind::Let, Some(value));
            Ok(Value::Undefined)
        }
        StmtKind::Empty => Ok(Value::Undefined),
    }
}

/// Peels through a stack of `label:` wrappers (`outer: inner: for (...)`)
/// collecting every label that attaches to the same loop/switch, then
/// dispatches to the right loop evaluator with that label set — a bare
/// `break`/`continue` always matches its innermost loop regardless of
/// labels, while `break outer`/`continue outer` only matches a loop that
/// carries that label.
fn eval_loop_or_labeled(ctx: &Rc<Context>, stmt: &Stmt, inherited_labels: &[Rc<str>]) -> EvalResult<Value> {
    match &stmt.node {
        StmtKind::Labeled { label, body } => {
            let mut labels = inherited_labels.to_vec();
            labels.push(label.clone());
            match &body.node {
                StmtKind::While { .. }
                | StmtKind::DoWhile { .. }
                | StmtKind::For { .. }
                | StmtKind::ForIn { .. }
                | StmtKind::ForOf { .. }
                | StmtKind::Labeled { .. } => eval_loop_or_labeled(ctx, body, &labels),
                _ => match eval_stmt(ctx, body) {
                    Err(Signal::Break(Some(l))) if labels.contains(&l) => Ok(Value::Undefined),
                    other => other,
                },
            }
        }
        StmtKind::While { test, body } => eval_while(ctx, test, body, inherited_labels),
        StmtKind::DoWhile { body, test } => eval_do_while(ctx, body, test, inherited_labels),
        StmtKind::For { init, test, update, body } => eval_for(ctx, init, test, update, body, inherited_labels, stmt.pos),
        StmtKind::ForIn { left, right, body } => eval_for_in(ctx, left, right, body, inherited_labels),
        StmtKind::ForOf { left, right, body } => eval_for_of(ctx, left, right, body, inherited_labels),
        _ => eval_stmt(ctx, stmt),
    }
}

fn matches_label(target: &Option<Rc<str>>, labels: &[Rc<str>]) -> bool {
    match target {
        None => true,
        Some(l) => labels.iter().any(|x| x == l),
    }
}

fn eval_while(ctx: &Rc<Context>, test: &Expr, body: &Stmt, labels: &[Rc<str>]) -> EvalResult<Value> {
    let mut last = Value::Undefined;
    while terms::to_boolean(&eval_expr(ctx, test)?) {
        check_cancelled(ctx, test.pos)?;
        match eval_stmt(ctx, body) {
            Ok(v) => last = v,
            Err(Signal::Break(t)) if matches_label(&t, labels) => break,
            Err(Signal::Continue(t)) if matches_label(&t, labels) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(last)
}

fn eval_do_while(ctx: &Rc<Context>, body: &Stmt, test: &Expr, labels: &[Rc<str>]) -> EvalResult<Value> {
    let mut last = Value::Undefined;
    loop {
        match eval_stmt(ctx, body) {
            Ok(v) => last = v,
            Err(Signal::Break(t)) if matches_label(&t, labels) => break,
            Err(Signal::Continue(t)) if matches_label(&t, labels) => {}
            Err(e) => return Err(e),
        }
        check_cancelled(ctx, test.pos)?;
        if !terms::to_boolean(&eval_expr(ctx, test)?) {
            break;
        }
    }
    Ok(last)
}

/// The loop variable lives in a single block scope shared by every
/// iteration rather than a fresh copy per iteration (the classic
/// "closures over the per-iteration `let`" case); see DESIGN.md.
fn eval_for(
    ctx: &Rc<Context>,
    init: &Option<Box<ForInit>>,
    test: &Option<Expr>,
    update: &Option<Expr>,
    body: &Stmt,
    labels: &[Rc<str>],
    pos: Position,
) -> EvalResult<Value> {
    let for_ctx = ctx.child(ScopeKind::Block);
    if let Some(init) = init {
        match &**init {
            ForInit::VarDecl { kind, decls } => {
                for d in decls {
                    let v = match &d.init {
                        Some(e) => eval_expr(&for_ctx, e)?,
                        None => Value::Undefined,
                    };
                    bind_pattern(&for_ctx, &d.name, v, Some(*kind), pos)?;
                }
            }
            ForInit::Expr(e) => {
                eval_expr(&for_ctx, e)?;
            }
            ForInit::Pattern(_) => unreachable!("a bare pattern only appears as a for-in/for-of target"),
        }
    }
    let mut last = Value::Undefined;
    loop {
        if let Some(t) = test {
            if !terms::to_boolean(&eval_expr(&for_ctx, t)?) {
                break;
            }
        }
        match eval_stmt(&for_ctx, body) {
            Ok(v) => last = v,
            Err(Signal::Break(t)) if matches_label(&t, labels) => break,
            Err(Signal::Continue(t)) if matches_label(&t, labels) => {}
            Err(e) => return Err(e),
        }
        if let Some(u) = update {
            eval_expr(&for_ctx, u)?;
        }
        check_cancelled(ctx, pos)?;
    }
    Ok(last)
}

fn bind_for_target(ctx: &Rc<Context>, left: &ForInit, value: Value, at: Position) -> EvalResult<()> {
    match left {
        ForInit::VarDecl { kind, decls } => bind_pattern(ctx, &decls[0].name, value, Some(*kind), at),
        ForInit::Pattern(p) => bind_pattern(ctx, p, value, None, at),
        ForInit::Expr(e) => set_ref_value(ctx, e, value, at),
    }
}

fn eval_for_of(ctx: &Rc<Context>, left: &ForInit, right: &Expr, body: &Stmt, labels: &[Rc<str>]) -> EvalResult<Value> {
    let iterable = eval_expr(ctx, right)?;
    let items = iterate_to_vec(ctx, &iterable, right.pos)?;
    let mut last = Value::Undefined;
    for item in items {
        let iter_ctx = ctx.child(ScopeKind::Block);
        bind_for_target(&iter_ctx, left, item, right.pos)?;
        match eval_stmt(&iter_ctx, body) {
            Ok(v) => last = v,
            Err(Signal::Break(t)) if matches_label(&t, labels) => break,
            Err(Signal::Continue(t)) if matches_label(&t, labels) => continue,
            Err(e) => return Err(e),
        }
        check_cancelled(ctx, right.pos)?;
    }
    Ok(last)
}

fn eval_for_in(ctx: &Rc<Context>, left: &ForInit, right: &Expr, body: &Stmt, labels: &[Rc<str>]) -> EvalResult<Value> {
    let obj_val = eval_expr(ctx, right)?;
    let keys = enumerate_keys(&obj_val);
    let mut last = Value::Undefined;
    for key in keys {
        let iter_ctx = ctx.child(ScopeKind::Block);
        bind_for_target(&iter_ctx, left, Value::string(key), right.pos)?;
        match eval_stmt(&iter_ctx, body) {
            Ok(v) => last = v,
            Err(Signal::Break(t)) if matches_label(&t, labels) => break,
            Err(Signal::Continue(t)) if matches_label(&t, labels) => continue,
            Err(e) => return Err(e),
        }
        check_cancelled(ctx, right.pos)?;
    }
    Ok(last)
}

fn enumerate_keys(v: &Value) -> Vec<String> {
    let Value::Object(o) = v else { return Vec::new() };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    let mut cur = Some(o.clone());
    while let Some(obj_ref) = cur {
        let b = obj_ref.borrow();
        if b.kind == ObjectKind::Array {
            for i in 0..b.array_elements().unwrap().len() {
                let k = i.to_string();
                if seen.insert(k.clone()) {
                    out.push(k);
                }
            }
        }
        for (k, d) in b.own.iter() {
            if d.enumerable && seen.insert(k.to_string()) {
                out.push(k.to_string());
            }
        }
        cur = b.proto.clone();
    }
    out
}

fn eval_switch(ctx: &Rc<Context>, discriminant: &Expr, cases: &[SwitchCase], labels: &[Rc<str>]) -> EvalResult<Value> {
    let d = eval_expr(ctx, discriminant)?;
    let switch_ctx = ctx.child(ScopeKind::Block);
    for c in cases {
        hoist_functions_only(&switch_ctx, &c.consequent);
    }
    let mut matched = None;
    for (i, c) in cases.iter().enumerate() {
        if let Some(t) = &c.test {
            if terms::strict_eq(&d, &eval_expr(&switch_ctx, t)?) {
                matched = Some(i);
                break;
            }
        }
    }
    let matched = matched.or_else(|| cases.iter().position(|c| c.test.is_none()));
    let Some(start) = matched else { return Ok(Value::Undefined) };
    let mut last = Value::Undefined;
    for c in &cases[start..] {
        match eval_stmt_list(&switch_ctx, &c.consequent) {
            Ok(v) => last = v,
            Err(Signal::Break(t)) if matches_label(&t, labels) => return Ok(last),
            Err(e) => return Err(e),
        }
    }
    Ok(last)
}

fn eval_try(
    ctx: &Rc<Context>,
    block: &[Stmt],
    handler: &Option<CatchClause>,
    finalizer: &Option<Vec<Stmt>>,
    pos: Position,
) -> EvalResult<Value> {
    let block_ctx = ctx.child(ScopeKind::Block);
    hoist_functions_only(&block_ctx, block);
    let result = match eval_stmt_list(&block_ctx, block) {
        Err(Signal::Throw(v, stack)) => match handler {
            Some(h) => {
                let catch_ctx = ctx.child(ScopeKind::Catch);
                if let Some(p) = &h.param {
                    bind_pattern(&catch_ctx, p, v, Some(VarKind::Let), pos)?;
                }
                hoist_functions_only(&catch_ctx, &h.body);
                eval_stmt_list(&catch_ctx, &h.body)
            }
            None => Err(Signal::Throw(v, stack)),
        },
        other => other,
    };
    match finalizer {
        Some(fin) => {
            let fin_ctx = ctx.child(ScopeKind::Block);
            hoist_functions_only(&fin_ctx, fin);
            match eval_stmt_list(&fin_ctx, fin) {
                Ok(_) => result,
                Err(e) => Err(e),
            }
        }
        None => result,
    }
}

// ─── Hoisting ────────────────────────────────────────────────────────────

/// Hoists `var` declarations (as `undefined`) and top-level function
/// declarations (eagerly bound to their closure) into `ctx`, without
/// descending into nested function/arrow bodies — the usual two-pass
/// "collect declarations, then execute" shape of a hoisting interpreter.
fn hoist(ctx: &Rc<Context>, body: &[Stmt]) {
    hoist_vars(ctx, body);
    hoist_functions_only(ctx, body);
}

fn hoist_vars(ctx: &Rc<Context>, stmts: &[Stmt]) {
    for s in stmts {
        match &s.node {
            StmtKind::VarDecl { kind: VarKind::Var, decls } => {
                for d in decls {
                    hoist_pattern_names(ctx, &d.name);
                }
            }
            StmtKind::Block(b) => hoist_vars(ctx, b),
            StmtKind::If { consequent, alternate, .. } => {
                hoist_vars(ctx, std::slice::from_ref(consequent.as_ref()));
                if let Some(a) = alternate {
                    hoist_vars(ctx, std::slice::from_ref(a.as_ref()));
                }
            }
            StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => hoist_vars(ctx, std::slice::from_ref(body.as_ref())),
            StmtKind::For { init, body, .. } => {
                if let Some(init) = init {
                    if let ForInit::VarDecl { kind: VarKind::Var, decls } = init.as_ref() {
                        for d in decls {
                            hoist_pattern_names(ctx, &d.name);
                        }
                    }
                }
                hoist_vars(ctx, std::slice::from_ref(body.as_ref()));
            }
            StmtKind::ForIn { left, body, .. } | StmtKind::ForOf { left, body, .. } => {
                if let ForInit::VarDecl { kind: VarKind::Var, decls } = left.as_ref() {
                    for d in decls {
                        hoist_pattern_names(ctx, &d.name);
                    }
                }
                hoist_vars(ctx, std::slice::from_ref(body.as_ref()));
            }
            StmtKind::Try { block, handler, finalizer } => {
                hoist_vars(ctx, block);
                if let Some(h) = handler {
                    hoist_vars(ctx, &h.body);
                }
                if let Some(f) = finalizer {
                    hoist_vars(ctx, f);
                }
            }
            StmtKind::Switch { cases, .. } => {
                for c in cases {
                    hoist_vars(ctx, &c.consequent);
                }
            }
            StmtKind::Labeled { body, .. } => hoist_vars(ctx, std::slice::from_ref(body.as_ref())),
            _ => {}
        }
    }
}

fn hoist_pattern_names(ctx: &Rc<Context>, pattern: &Pattern) {
    match pattern {
        Pattern::Ident(name) => ctx.declare(name.clone(), VarKind::Var, None),
        Pattern::Array(elems) => {
            for e in elems.iter().flatten() {
                hoist_pattern_names(ctx, e);
            }
        }
        Pattern::Object(props) => {
            for p in props {
                hoist_pattern_names(ctx, &p.value);
            }
        }
        Pattern::Assign(inner, _) => hoist_pattern_names(ctx, inner),
        Pattern::Rest(inner) => hoist_pattern_names(ctx, inner),
    }
}

fn hoist_functions_only(ctx: &Rc<Context>, stmts: &[Stmt]) {
    for s in stmts {
        if let StmtKind::FunctionDecl(def) = &s.node {
            let value = make_function_value(def.clone(), ctx.clone(), false, Some(ctx.root.builtins.function_proto.clone()));
            if let Some(name) = &def.name {
                ctx.declare(name.clone(), VarKind::Var, Some(value));
            }
        }
    }
}

// ─── Destructuring ───────────────────────────────────────────────────────

/// Binds `value` against `pattern`. `kind` of `Some` declares a fresh
/// binding of that `VarKind` (used by `var`/`let`/`const`/parameters/catch);
/// `None` assigns into an existing binding instead (destructuring
/// assignment, `for (x of xs)` with a bare identifier target).
fn bind_pattern(ctx: &Rc<Context>, pattern: &Pattern, value: Value, kind: Option<VarKind>, at: Position) -> EvalResult<()> {
    match pattern {
        Pattern::Ident(name) => {
            match kind {
                Some(k) => ctx.declare(name.clone(), k, Some(value)),
                None => ctx.set(name, value, at)?,
            }
            Ok(())
        }
        Pattern::Assign(inner, default) => {
            let v = if matches!(value, Value::Undefined) { eval_expr(ctx, default)? } else { value };
            bind_pattern(ctx, inner, v, kind, at)
        }
        Pattern::Rest(inner) => bind_pattern(ctx, inner, value, kind, at),
        Pattern::Array(elems) => {
            let items = iterate_to_vec(ctx, &value, at)?;
            let mut it = items.into_iter();
            for elem in elems {
                match elem {
                    None => {
                        it.next();
                    }
                    Some(Pattern::Rest(inner)) => {
                        let rest: Vec<Value> = it.by_ref().collect();
                        bind_pattern(ctx, inner, make_array(ctx, rest), kind, at)?;
                        break;
                    }
                    Some(p) => {
                        let v = it.next().unwrap_or(Value::Undefined);
                        bind_pattern(ctx, p, v, kind, at)?;
                    }
                }
            }
            Ok(())
        }
        Pattern::Object(props) => {
            let mut used: Vec<String> = Vec::new();
            for p in props {
                if p.key.as_ref() == "..." {
                    let rest = rest_object(ctx, &value, &used);
                    bind_pattern(ctx, &p.value, rest, kind, at)?;
                    continue;
                }
                used.push(p.key.to_string());
                let v = get_property(ctx, &value, &p.key, at)?;
                bind_pattern(ctx, &p.value, v, kind, at)?;
            }
            Ok(())
        }
    }
}

fn rest_object(ctx: &Rc<Context>, value: &Value, used: &[String]) -> Value {
    let obj = Rc::new(RefCell::new(JsObject::new(Some(ctx.root.builtins.object_proto.clone()))));
    if let Value::Object(src) = value {
        let entries: Vec<(Rc<str>, Value)> = src
            .borrow()
            .own
            .iter()
            .filter(|(k, d)| d.enumerable && !used.iter().any(|u| u.as_str() == k.as_ref()))
            .map(|(k, d)| (k.clone(), d.value.clone()))
            .collect();
        for (k, v) in entries {
            obj.borrow_mut().set_own(k, v);
        }
    }
    Value::Object(obj)
}

// ─── Expressions ─────────────────────────────────────────────────────────

pub fn eval_expr(ctx: &Rc<Context>, expr: &Expr) -> EvalResult<Value> {
    check_cancelled(ctx, expr.pos)?;
    match &expr.node {
        ExprKind::Number(n) => Ok(Value::Number(*n)),
        ExprKind::String(s) => Ok(Value::String(s.clone())),
        ExprKind::Bool(b) => Ok(Value::Bool(*b)),
        ExprKind::Null => Ok(Value::Null),
        ExprKind::Undefined => Ok(Value::Undefined),
        ExprKind::Regex { pattern, flags } => crate::builtins::regexp::make_regex(ctx, pattern.clone(), flags.clone(), expr.pos),
        ExprKind::Template { quasis, exprs } => eval_template(ctx, quasis, exprs),
        ExprKind::Ident(name) => {
            if name.as_ref() == "Java" {
                return Ok(crate::bridge::java_global(ctx));
            }
            ctx.get(name, expr.pos)
        }
        ExprKind::This => Ok(ctx.this_value()),
        ExprKind::Array(elements) => eval_array_literal(ctx, elements),
        ExprKind::Object(props) => eval_object_literal(ctx, props),
        ExprKind::Member { .. } => Ok(eval_chain(ctx, expr)?.map(|(v, _)| v).unwrap_or(Value::Undefined)),
        ExprKind::Call { .. } => Ok(eval_chain(ctx, expr)?.map(|(v, _)| v).unwrap_or(Value::Undefined)),
        ExprKind::New { callee, args } => {
            let callee_val = eval_expr(ctx, callee)?;
            let argv = eval_args(ctx, args)?;
            construct(ctx, &callee_val, &argv, expr.pos)
        }
        ExprKind::Unary { op, argument } => eval_unary(ctx, *op, argument),
        ExprKind::Update { op, argument, prefix } => eval_update(ctx, *op, argument, *prefix, expr.pos),
        ExprKind::Binary { op, left, right } => {
            let l = eval_expr(ctx, left)?;
            let r = eval_expr(ctx, right)?;
            eval_binary_op(ctx, *op, l, r, expr.pos)
        }
        ExprKind::Logical { op, left, right } => eval_logical(ctx, *op, left, right),
        ExprKind::Assign { op, left, right } => eval_assign(ctx, *op, left, right, expr.pos),
        ExprKind::Conditional { test, consequent, alternate } => {
            if terms::to_boolean(&eval_expr(ctx, test)?) {
                eval_expr(ctx, consequent)
            } else {
                eval_expr(ctx, alternate)
            }
        }
        ExprKind::Sequence(exprs) => {
            let mut last = Value::Undefined;
            for e in exprs {
                last = eval_expr(ctx, e)?;
            }
            Ok(last)
        }
        ExprKind::FunctionExpr(def) => Ok(make_function_value(def.clone(), ctx.clone(), false, Some(ctx.root.builtins.function_proto.clone()))),
        ExprKind::Arrow(def) => Ok(make_arrow_value(def.clone(), ctx.clone())),
        ExprKind::Typeof(e) => Ok(Value::string(eval_expr(ctx, e)?.type_of())),
        ExprKind::Void(e) => {
            eval_expr(ctx, e)?;
            Ok(Value::Undefined)
        }
        ExprKind::Delete(e) => eval_delete(ctx, e),
    }
}

/// Evaluates a possible `Member`/`Call` chain, short-circuiting the whole
/// remaining chain to `None` the moment an optional link (`?.`) sees a
/// nullish object — `a?.b.c()` must not throw trying to read `.c` off
/// `undefined` when `a` was nullish, it must skip straight to `undefined`.
/// Returns the receiver object alongside the value so a method call
/// (`obj.method()`) can bind `this` to `obj` without re-evaluating it.
fn eval_chain(ctx: &Rc<Context>, expr: &Expr) -> EvalResult<Option<(Value, Value)>> {
    match &expr.node {
        ExprKind::Member { object, property, optional } => {
            let Some((obj, _)) = eval_chain(ctx, object)? else { return Ok(None) };
            if *optional && obj.is_nullish() {
                return Ok(None);
            }
            let key = member_key(ctx, property)?;
            let v = get_property(ctx, &obj, &key, expr.pos)?;
            Ok(Some((v, obj)))
        }
        ExprKind::Call { callee, args, optional } => {
            let Some((callee_val, this_val)) = eval_chain(ctx, callee)? else { return Ok(None) };
            if *optional && callee_val.is_nullish() {
                return Ok(None);
            }
            let argv = eval_args(ctx, args)?;
            let result = call_value(ctx, &callee_val, this_val, &argv, expr.pos)?;
            Ok(Some((result, Value::Undefined)))
        }
        _ => Ok(Some((eval_expr(ctx, expr)?, Value::Undefined))),
    }
}

fn member_key(ctx: &Rc<Context>, key: &MemberKey) -> EvalResult<String> {
    Ok(match key {
        MemberKey::Name(n) => n.to_string(),
        MemberKey::Computed(e) => terms::to_js_string(&eval_expr(ctx, e)?),
    })
}

fn eval_template(ctx: &Rc<Context>, quasis: &[Rc<str>], exprs: &[Expr]) -> EvalResult<Value> {
    let mut out = String::new();
    out.push_str(&quasis[0]);
    for (i, e) in exprs.iter().enumerate() {
        let v = eval_expr(ctx, e)?;
        out.push_str(&terms::to_js_string(&v));
        out.push_str(&quasis[i + 1]);
    }
    Ok(Value::string(out))
}

fn eval_array_literal(ctx: &Rc<Context>, elements: &[Option<Argument>]) -> EvalResult<Value> {
    let mut out = Vec::new();
    for el in elements {
        match el {
            None => out.push(Value::Undefined),
            Some(Argument::Normal(e)) => out.push(eval_expr(ctx, e)?),
            Some(Argument::Spread(e)) => {
                let v = eval_expr(ctx, e)?;
                out.extend(iterate_to_vec(ctx, &v, e.pos)?);
            }
        }
    }
    Ok(make_array(ctx, out))
}

fn eval_object_literal(ctx: &Rc<Context>, props: &[ObjProp]) -> EvalResult<Value> {
    let obj = Rc::new(RefCell::new(JsObject::new(Some(ctx.root.builtins.object_proto.clone()))));
    for p in props {
        let key = prop_key_name(ctx, &p.key)?;
        let value = eval_expr(ctx, &p.value)?;
        obj.borrow_mut().define(key, PropertyDescriptor::data(value));
    }
    Ok(Value::Object(obj))
}

fn prop_key_name(ctx: &Rc<Context>, key: &PropKey) -> EvalResult<Rc<str>> {
    Ok(match key {
        PropKey::Ident(n) => n.clone(),
        PropKey::String(s) => s.clone(),
        PropKey::Number(n) => terms::format_number(*n).into(),
        PropKey::Computed(e) => terms::to_js_string(&eval_expr(ctx, e)?).into(),
    })
}

fn eval_args(ctx: &Rc<Context>, args: &[Argument]) -> EvalResult<Vec<Value>> {
    let mut out = Vec::new();
    for a in args {
        match a {
            Argument::Normal(e) => out.push(eval_expr(ctx, e)?),
            Argument::Spread(e) => {
                let v = eval_expr(ctx, e)?;
                out.extend(iterate_to_vec(ctx, &v, e.pos)?);
            }
        }
    }
    Ok(out)
}

/// Expands a value for `...spread` and `for (x of v)` without exposing a
/// `Symbol.iterator` protocol to script: arrays iterate their elements and
/// strings iterate code points, which is every iterable this engine's
/// built-ins produce.
pub(crate) fn iterate_to_vec(ctx: &Rc<Context>, v: &Value, at: Position) -> EvalResult<Vec<Value>> {
    let _ = ctx;
    match v {
        Value::Object(o) if o.borrow().kind == ObjectKind::Array => Ok(o.borrow().array_elements().unwrap().to_vec()),
        Value::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
        _ => Err(Signal::type_error(format!("{} is not iterable", terms::to_js_string(v)), at)),
    }
}

pub(crate) fn make_array(ctx: &Rc<Context>, elements: Vec<Value>) -> Value {
    Value::Object(Rc::new(RefCell::new(JsObject::new_array(Some(ctx.root.builtins.array_proto.clone()), elements))))
}

fn eval_unary(ctx: &Rc<Context>, op: UnaryOp, argument: &Expr) -> EvalResult<Value> {
    let v = eval_expr(ctx, argument)?;
    Ok(match op {
        UnaryOp::Neg => Value::Number(-terms::to_number(&to_primitive(ctx, &v, Hint::Number)?)),
        UnaryOp::Pos => Value::Number(terms::to_number(&to_primitive(ctx, &v, Hint::Number)?)),
        UnaryOp::Not => Value::Bool(!terms::to_boolean(&v)),
        UnaryOp::BitNot => Value::Number(!terms::to_int32(terms::to_number(&to_primitive(ctx, &v, Hint::Number)?)) as f64),
    })
}

fn eval_update(ctx: &Rc<Context>, op: UpdateOp, argument: &Expr, prefix: bool, at: Position) -> EvalResult<Value> {
    let old = terms::to_number(&get_ref_value(ctx, argument, at)?);
    let new_val = match op {
        UpdateOp::Inc => old + 1.0,
        UpdateOp::Dec => old - 1.0,
    };
    set_ref_value(ctx, argument, Value::Number(new_val), at)?;
    Ok(Value::Number(if prefix { new_val } else { old }))
}

fn eval_logical(ctx: &Rc<Context>, op: LogicalOp, left: &Expr, right: &Expr) -> EvalResult<Value> {
    let l = eval_expr(ctx, left)?;
    match op {
        LogicalOp::And => {
            if terms::to_boolean(&l) {
                eval_expr(ctx, right)
            } else {
                Ok(l)
            }
        }
        LogicalOp::Or => {
            if terms::to_boolean(&l) {
                Ok(l)
            } else {
                eval_expr(ctx, right)
            }
        }
        LogicalOp::NullishCoalesce => {
            if l.is_nullish() {
                eval_expr(ctx, right)
            } else {
                Ok(l)
            }
        }
    }
}

fn eval_delete(ctx: &Rc<Context>, argument: &Expr) -> EvalResult<Value> {
    if let ExprKind::Member { object, property, optional } = &argument.node {
        let obj = eval_expr(ctx, object)?;
        if *optional && obj.is_nullish() {
            return Ok(Value::Bool(true));
        }
        let key = member_key(ctx, property)?;
        if let Value::Object(o) = &obj {
            let mut b = o.borrow_mut();
            if b.kind == ObjectKind::Array {
                if let Some(idx) = parse_array_index(&key) {
                    if let Some(elems) = b.array_elements_mut() {
                        if idx < elems.len() {
                            elems[idx] = Value::Undefined;
                        }
                        return Ok(Value::Bool(true));
                    }
                }
            }
            b.own.shift_remove(key.as_str());
        }
        return Ok(Value::Bool(true));
    }
    eval_expr(ctx, argument)?;
    Ok(Value::Bool(true))
}

fn eval_assign(ctx: &Rc<Context>, op: AssignOp, left: &AssignTarget, right: &Expr, at: Position) -> EvalResult<Value> {
    match (left, op) {
        (AssignTarget::Pattern(pat), AssignOp::Assign) => {
            let v = eval_expr(ctx, right)?;
            bind_pattern(ctx, pat, v.clone(), None, at)?;
            Ok(v)
        }
        (AssignTarget::Expr(target), AssignOp::Assign) => {
            let v = eval_expr(ctx, right)?;
            set_ref_value(ctx, target, v.clone(), at)?;
            Ok(v)
        }
        (AssignTarget::Expr(target), AssignOp::AndAssign) => {
            let cur = get_ref_value(ctx, target, at)?;
            if !terms::to_boolean(&cur) {
                return Ok(cur);
            }
            let v = eval_expr(ctx, right)?;
            set_ref_value(ctx, target, v.clone(), at)?;
            Ok(v)
        }
        (AssignTarget::Expr(target), AssignOp::OrAssign) => {
            let cur = get_ref_value(ctx, target, at)?;
            if terms::to_boolean(&cur) {
                return Ok(cur);
            }
            let v = eval_expr(ctx, right)?;
            set_ref_value(ctx, target, v.clone(), at)?;
            Ok(v)
        }
        (AssignTarget::Expr(target), AssignOp::NullishAssign) => {
            let cur = get_ref_value(ctx, target, at)?;
            if !cur.is_nullish() {
                return Ok(cur);
            }
            let v = eval_expr(ctx, right)?;
            set_ref_value(ctx, target, v.clone(), at)?;
            Ok(v)
        }
        (AssignTarget::Expr(target), compound) => {
            let bin_op = compound.as_binary_op().expect("every remaining AssignOp maps to a binary op");
            let cur = get_ref_value(ctx, target, at)?;
            let rhs = eval_expr(ctx, right)?;
            let v = eval_binary_op(ctx, bin_op, cur, rhs, at)?;
            set_ref_value(ctx, target, v.clone(), at)?;
            Ok(v)
        }
        (AssignTarget::Pattern(_), _) => unreachable!("the parser only emits a pattern target for plain `=`"),
    }
}

fn get_ref_value(ctx: &Rc<Context>, expr: &Expr, at: Position) -> EvalResult<Value> {
    match &expr.node {
        ExprKind::Ident(name) => ctx.get(name, at),
        ExprKind::Member { .. } => eval_expr(ctx, expr),
        _ => Err(Signal::type_error("Invalid left-hand side in assignment", at)),
    }
}

fn set_ref_value(ctx: &Rc<Context>, expr: &Expr, value: Value, at: Position) -> EvalResult<()> {
    match &expr.node {
        ExprKind::Ident(name) => ctx.set(name, value, at),
        ExprKind::Member { object, property, .. } => {
            let obj = eval_expr(ctx, object)?;
            let key = member_key(ctx, property)?;
            set_property(ctx, &obj, &key, value, at)
        }
        _ => Err(Signal::type_error("Invalid left-hand side in assignment", at)),
    }
}

/// Parses a canonical array index string (`"0"`, `"41"`, never `"01"` or
/// `"-1"`), the same grammar JS uses to tell array indices apart from
/// ordinary string property keys.
pub(crate) fn parse_array_index(key: &str) -> Option<usize> {
    if key == "0" {
        return Some(0);
    }
    if key.is_empty() || key.starts_with('0') || !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    key.parse::<usize>().ok()
}

pub(crate) fn get_property(ctx: &Rc<Context>, target: &Value, key: &str, at: Position) -> EvalResult<Value> {
    match target {
        Value::Undefined | Value::Null => Err(Signal::type_error(
            format!("Cannot read properties of {} (reading '{key}')", terms::to_js_string(target)),
            at,
        )),
        Value::String(s) => Ok(get_string_property(ctx, s, key)),
        Value::Number(_) => Ok(JsObject::lookup(&ctx.root.builtins.number_proto, key).unwrap_or(Value::Undefined)),
        Value::Bool(_) => Ok(JsObject::lookup(&ctx.root.builtins.boolean_proto, key).unwrap_or(Value::Undefined)),
        Value::Object(o) => {
            let kind = o.borrow().kind;
            if kind == ObjectKind::Array {
                if key == "length" {
                    return Ok(Value::Number(o.borrow().array_elements().unwrap().len() as f64));
                }
                if let Some(idx) = parse_array_index(key) {
                    let b = o.borrow();
                    return Ok(b.array_elements().unwrap().get(idx).cloned().unwrap_or(Value::Undefined));
                }
            }
            Ok(JsObject::lookup(o, key).unwrap_or(Value::Undefined))
        }
    }
}

fn get_string_property(ctx: &Rc<Context>, s: &Rc<str>, key: &str) -> Value {
    if key == "length" {
        return Value::Number(s.chars().count() as f64);
    }
    if let Some(idx) = parse_array_index(key) {
        return s.chars().nth(idx).map(|c| Value::string(c.to_string())).unwrap_or(Value::Undefined);
    }
    JsObject::lookup(&ctx.root.builtins.string_proto, key).unwrap_or(Value::Undefined)
}

pub(crate) fn set_property(_ctx: &Rc<Context>, target: &Value, key: &str, value: Value, at: Position) -> EvalResult<()> {
    let Value::Object(o) = target else {
        if target.is_nullish() {
            return Err(Signal::type_error(
                format!("Cannot set properties of {} (setting '{key}')", terms::to_js_string(target)),
                at,
            ));
        }
        return Ok(()); // primitives silently ignore property writes
    };
    let is_array = o.borrow().kind == ObjectKind::Array;
    if is_array {
        if key == "length" {
            let new_len = terms::to_number(&value).max(0.0) as usize;
            o.borrow_mut().array_elements_mut().unwrap().resize(new_len, Value::Undefined);
            return Ok(());
        }
        if let Some(idx) = parse_array_index(key) {
            let mut b = o.borrow_mut();
            let elems = b.array_elements_mut().unwrap();
            if idx >= elems.len() {
                elems.resize(idx + 1, Value::Undefined);
            }
            elems[idx] = value;
            return Ok(());
        }
    }
    o.borrow_mut().set_own(Rc::from(key), value);
    Ok(())
}

fn eval_add(ctx: &Rc<Context>, l: Value, r: Value) -> EvalResult<Value> {
    let lp = to_primitive(ctx, &l, Hint::Default)?;
    let rp = to_primitive(ctx, &r, Hint::Default)?;
    if matches!(lp, Value::String(_)) || matches!(rp, Value::String(_)) {
        Ok(Value::string(format!("{}{}", terms::to_js_string(&lp), terms::to_js_string(&rp))))
    } else {
        Ok(Value::Number(terms::to_number(&lp) + terms::to_number(&rp)))
    }
}

/// Which primitive a coercion site prefers when unwrapping an object:
/// `Default` is what `+` and string-context coercions use (`Date` prefers
/// its display string there — the one real-world spot the "number" default
/// would surprise script authors doing `"" + someDate`); `Number` is what
/// every other arithmetic/relational/bitwise operator uses (`Date` prefers
/// its millisecond `valueOf()` there, so `d2 - d1` time-diffs instead of
/// subtracting two parsed display strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hint {
    Default,
    Number,
}

/// A deliberately narrow `ToPrimitive`: under `Hint::Number`, `Date` unwraps
/// to its raw millisecond count; under `Hint::Default`, it unwraps to its
/// string form instead. Anything else calls a `valueOf` it actually owns or
/// inherits before falling back to `to_js_string`, regardless of hint — no
/// built-in prototype in this engine installs a `valueOf` that returns an
/// object, so the recursion here always terminates in one hop.
pub(crate) fn to_primitive(ctx: &Rc<Context>, v: &Value, hint: Hint) -> EvalResult<Value> {
    let Value::Object(o) = v else { return Ok(v.clone()) };
    if o.borrow().kind == ObjectKind::Date {
        if let ObjectData::Date(ms) = o.borrow().data {
            return Ok(match hint {
                Hint::Number => Value::Number(ms),
                Hint::Default => Value::string(crate::builtins::date::to_display_string(ms)),
            });
        }
    }
    if let Some(f @ Value::Object(_)) = JsObject::lookup(o, "valueOf") {
        if matches!(&f, Value::Object(fo) if fo.borrow().kind == ObjectKind::Function) {
            let r = call_value(ctx, &f, v.clone(), &[], Position::default())?;
            if !matches!(r, Value::Object(_)) {
                return Ok(r);
            }
        }
    }
    Ok(Value::string(terms::to_js_string(v)))
}

/// `ToPrimitive(Hint::Number)` on both operands, then `ToNumber` on each —
/// the shared first step of every numeric/bitwise binary operator below
/// (spec §4.5: "objects via `valueOf()` then `toString()`").
fn to_number_pair(ctx: &Rc<Context>, l: &Value, r: &Value) -> EvalResult<(f64, f64)> {
    let lp = to_primitive(ctx, l, Hint::Number)?;
    let rp = to_primitive(ctx, r, Hint::Number)?;
    Ok((terms::to_number(&lp), terms::to_number(&rp)))
}

fn eval_binary_op(ctx: &Rc<Context>, op: BinaryOp, l: Value, r: Value, at: Position) -> EvalResult<Value> {
    use BinaryOp::*;
    Ok(match op {
        Add => return eval_add(ctx, l, r),
        Sub => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number(ln - rn)
        }
        Mul => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number(ln * rn)
        }
        Div => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number(ln / rn)
        }
        Mod => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number(ln % rn)
        }
        Exp => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number(ln.powf(rn))
        }
        Eq => Value::Bool(terms::loose_eq(&l, &r)),
        Ne => Value::Bool(!terms::loose_eq(&l, &r)),
        StrictEq => Value::Bool(terms::strict_eq(&l, &r)),
        StrictNe => Value::Bool(!terms::strict_eq(&l, &r)),
        Lt | Le | Gt | Ge => {
            let lp = to_primitive(ctx, &l, Hint::Number)?;
            let rp = to_primitive(ctx, &r, Hint::Number)?;
            let ord = terms::compare(&lp, &rp);
            Value::Bool(match op {
                Lt => matches!(ord, terms::Ordering3::Less),
                Le => matches!(ord, terms::Ordering3::Less | terms::Ordering3::Equal),
                Gt => matches!(ord, terms::Ordering3::Greater),
                Ge => matches!(ord, terms::Ordering3::Greater | terms::Ordering3::Equal),
                _ => unreachable!(),
            })
        }
        BitAnd => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number((terms::to_int32(ln) & terms::to_int32(rn)) as f64)
        }
        BitOr => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number((terms::to_int32(ln) | terms::to_int32(rn)) as f64)
        }
        BitXor => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number((terms::to_int32(ln) ^ terms::to_int32(rn)) as f64)
        }
        Shl => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number((terms::to_int32(ln) << (terms::to_uint32(rn) & 31)) as f64)
        }
        Shr => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number((terms::to_int32(ln) >> (terms::to_uint32(rn) & 31)) as f64)
        }
        UShr => {
            let (ln, rn) = to_number_pair(ctx, &l, &r)?;
            Value::Number((terms::to_uint32(ln) >> (terms::to_uint32(rn) & 31)) as f64)
        }
        In => return eval_in(&l, &r, at),
        InstanceOf => return eval_instanceof(&l, &r, at),
    })
}

fn eval_in(key: &Value, obj: &Value, at: Position) -> EvalResult<Value> {
    let Value::Object(o) = obj else {
        return Err(Signal::type_error("Cannot use 'in' operator to search for a property", at));
    };
    let k = terms::to_js_string(key);
    if o.borrow().kind == ObjectKind::Array {
        if k == "length" {
            return Ok(Value::Bool(true));
        }
        if let Some(idx) = parse_array_index(&k) {
            return Ok(Value::Bool(idx < o.borrow().array_elements().unwrap().len()));
        }
    }
    Ok(Value::Bool(JsObject::has(o, &k)))
}

fn eval_instanceof(obj: &Value, ctor: &Value, at: Position) -> EvalResult<Value> {
    let Value::Object(ctor_obj) = ctor else {
        return Err(Signal::type_error("Right-hand side of 'instanceof' is not callable", at));
    };
    if ctor_obj.borrow().kind != ObjectKind::Function {
        return Err(Signal::type_error("Right-hand side of 'instanceof' is not callable", at));
    }
    let Some(Value::Object(proto)) = JsObject::lookup(ctor_obj, "prototype") else {
        return Ok(Value::Bool(false));
    };
    let Value::Object(o) = obj else { return Ok(Value::Bool(false)) };
    let mut cur = o.borrow().proto.clone();
    while let Some(p) = cur {
        if Rc::ptr_eq(&p, &proto) {
            return Ok(Value::Bool(true));
        }
        cur = p.borrow().proto.clone();
    }
    Ok(Value::Bool(false))
}

// ─── Functions, calls and construction ──────────────────────────────────

pub(crate) fn make_function_value(def: Rc<FunctionDef>, closure: Rc<Context>, is_arrow: bool, proto: Option<ObjectRef>) -> Value {
    let callable = Callable::Script { def, closure, is_arrow };
    Value::Object(Rc::new(RefCell::new(JsObject::new_function(proto, callable))))
}

fn make_arrow_value(def: Rc<ArrowDef>, closure: Rc<Context>) -> Value {
    let body = match &def.body {
        ArrowBody::Expr(e) => vec![Stmt::new(StmtKind::Return(Some((**e).clone())), e.pos)],
        ArrowBody::Block(stmts) => stmts.clone(),
    };
    let fn_def = Rc::new(FunctionDef { name: None, params: def.params.clone(), body });
    let proto = closure.root.builtins.function_proto.clone();
    make_function_value(fn_def, closure, true, Some(proto))
}

fn bind_params(ctx: &Rc<Context>, params: &[Param], args: &[Value], at: Position) -> EvalResult<()> {
    let mut idx = 0;
    for p in params {
        if p.is_rest {
            let rest = args.get(idx..).map(|s| s.to_vec()).unwrap_or_default();
            bind_pattern(ctx, &p.pattern, make_array(ctx, rest), Some(VarKind::Let), at)?;
            break;
        }
        let mut v = args.get(idx).cloned().unwrap_or(Value::Undefined);
        idx += 1;
        if matches!(v, Value::Undefined) {
            if let Some(def) = &p.default {
                v = eval_expr(ctx, def)?;
            }
        }
        bind_pattern(ctx, &p.pattern, v, Some(VarKind::Let), at)?;
    }
    Ok(())
}

/// Invokes a callable value — native or script — binding `this` for
/// ordinary calls and leaving it to fall through the lexical context chain
/// for arrow functions (see [`Callable::Script`]).
pub(crate) fn call_value(ctx: &Rc<Context>, callee: &Value, this: Value, args: &[Value], at: Position) -> EvalResult<Value> {
    let Value::Object(obj) = callee else {
        return Err(Signal::type_error(format!("{} is not a function", terms::to_js_string(callee)), at));
    };
    let callable = {
        let b = obj.borrow();
        match b.callable() {
            Some(c) => c.clone(),
            None => return Err(Signal::type_error(format!("{} is not a function", terms::to_js_string(callee)), at)),
        }
    };
    match callable {
        Callable::Native { func, .. } => func(ctx, &this, args).map_err(|e| e.push_frame(at)),
        Callable::Script { def, closure, is_arrow } => {
            let fn_ctx = closure.child(ScopeKind::Function);
            if !is_arrow {
                fn_ctx.set_this(this);
            }
            *fn_ctx.call_info.borrow_mut() = Some(CallInfo { is_new: false, callee_name: def.name.clone() });
            bind_params(&fn_ctx, &def.params, args, at)?;
            hoist(&fn_ctx, &def.body);
            match eval_stmt_list(&fn_ctx, &def.body) {
                Ok(_) => Ok(Value::Undefined),
                Err(Signal::Return(v)) => Ok(v),
                Err(e) => Err(e.push_frame(at)),
            }
        }
    }
}

/// Passed as `this` to a native constructor invoked through `new`, so the
/// rare native that must tell `new X()` apart from a bare `X()` call (only
/// `Date`, per spec §4.6: "`Date()` called without `new` returns the
/// current-time toString") has a signal to check; every other native
/// constructor ignores `this` entirely and just builds+returns its own
/// object either way (see DESIGN.md).
pub(crate) const NEW_CALL_SENTINEL: Value = Value::Bool(true);

/// `new callee(...args)`. Native constructors (`Array`, `Object`, `Date`,
/// the `Error` family, `RegExp`, ...) build and return their own object
/// regardless of whether they were invoked with `new` — this engine has no
/// separate `[[Construct]]` slot for them, since none of their semantics
/// actually depend on `new.target` (see DESIGN.md). Script/class
/// constructors get a fresh instance linked to `callee.prototype` and an
/// explicit-object-return override, matching ordinary JS construction.
pub(crate) fn construct(ctx: &Rc<Context>, callee: &Value, args: &[Value], at: Position) -> EvalResult<Value> {
    let Value::Object(func_obj) = callee else {
        return Err(Signal::type_error(format!("{} is not a constructor", terms::to_js_string(callee)), at));
    };
    let callable = {
        let b = func_obj.borrow();
        match b.callable() {
            Some(c) => c.clone(),
            None => return Err(Signal::type_error(format!("{} is not a constructor", terms::to_js_string(callee)), at)),
        }
    };
    match callable {
        Callable::Native { func, .. } => func(ctx, &NEW_CALL_SENTINEL, args),
        Callable::Script { def, closure, .. } => {
            let proto = match JsObject::lookup(func_obj, "prototype") {
                Some(Value::Object(p)) => Some(p),
                _ => Some(ctx.root.builtins.object_proto.clone()),
            };
            let instance = Rc::new(RefCell::new(JsObject::new(proto)));
            let this = Value::Object(instance);
            let fn_ctx = closure.child(ScopeKind::Function);
            fn_ctx.set_this(this.clone());
            *fn_ctx.call_info.borrow_mut() = Some(CallInfo { is_new: true, callee_name: def.name.clone() });
            bind_params(&fn_ctx, &def.params, args, at)?;
            hoist(&fn_ctx, &def.body);
            match eval_stmt_list(&fn_ctx, &def.body) {
                Ok(_) => Ok(this),
                Err(Signal::Return(v @ Value::Object(_))) => Ok(v),
                Err(Signal::Return(_)) => Ok(this),
                Err(e) => Err(e.push_frame(at)),
            }
        }
    }
}

/// Builds a class's constructor function and prototype object. `extends`
/// is parsed but never consulted here — there is no inherited prototype
/// link or `super` forwarding (see DESIGN.md); every class is effectively
/// a plain constructor function with its methods pre-installed.
fn build_class(ctx: &Rc<Context>, methods: &[ClassMethod]) -> EvalResult<Value> {
    let b = &ctx.root.builtins;
    let proto = Rc::new(RefCell::new(JsObject::new(Some(b.object_proto.clone()))));
    let ctor_method = methods.iter().find(|m| m.is_constructor);
    let ctor_def = Rc::new(FunctionDef {
        name: None,
        params: ctor_method.map(|m| m.params.clone()).unwrap_or_default(),
        body: ctor_method.map(|m| m.body.clone()).unwrap_or_default(),
    });
    let ctor_value = make_function_value(ctor_def, ctx.clone(), false, Some(b.function_proto.clone()));
    let Value::Object(ctor_obj) = &ctor_value else { unreachable!("make_function_value always returns an object") };
    ctor_obj
        .borrow_mut()
        .define("prototype", PropertyDescriptor::hidden(Value::Object(proto.clone())));
    proto.borrow_mut().define("constructor", PropertyDescriptor::hidden(ctor_value.clone()));
    for m in methods {
        if m.is_constructor {
            continue;
        }
        let key = prop_key_name(ctx, &m.key)?;
        let def = Rc::new(FunctionDef { name: Some(key.clone()), params: m.params.clone(), body: m.body.clone() });
        let f = make_function_value(def, ctx.clone(), false, Some(b.function_proto.clone()));
        let target = if m.is_static { ctor_obj.clone() } else { proto.clone() };
        target.borrow_mut().define(key, PropertyDescriptor::hidden(f));
    }
    Ok(ctor_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::source::SourceBuffer;

    fn eval_source(src: &str) -> Value {
        let buf = Rc::new(SourceBuffer::new(src));
        let program = parse_program(buf).expect("valid program");
        let ctx = Context::new_root(
            Rc::new(RefCell::new(JsObject::new(None))),
            crate::builtins::Builtins::install(),
        );
        crate::builtins::install_globals(&ctx);
        run_program(&ctx, &program).expect("evaluates without throwing")
    }

    #[test]
    fn closures_capture_their_defining_scope() {
        let v = eval_source(
            "function makeCounter() { let n = 0; return function () { n = n + 1; return n; }; } \
             let c = makeCounter(); c(); c(); c();",
        );
        assert_eq!(terms::to_number(&v), 3.0);
    }

    #[test]
    fn prototype_chain_is_walked_for_inherited_methods() {
        let v = eval_source(
            "function Animal(name) { this.name = name; } \
             Animal.prototype.greet = function () { return 'hi ' + this.name; }; \
             let a = new Animal('rex'); a.greet();",
        );
        assert_eq!(terms::to_js_string(&v), "hi rex");
    }

    #[test]
    fn let_in_tdz_throws_until_the_declaration_runs() {
        let buf = Rc::new(SourceBuffer::new("{ x; let x = 1; }"));
        let program = parse_program(buf).expect("valid program");
        let ctx = Context::new_root(
            Rc::new(RefCell::new(JsObject::new(None))),
            crate::builtins::Builtins::install(),
        );
        crate::builtins::install_globals(&ctx);
        assert!(run_program(&ctx, &program).is_err());
    }

    #[test]
    fn regex_vs_division_disambiguates_by_context() {
        let v = eval_source("let a = 10; let b = 2; let r = a / b / 1;");
        assert_eq!(terms::to_number(&v), 1.0);
    }

    #[test]
    fn nested_template_braces_interpolate_correctly() {
        let v = eval_source("let o = { a: { b: 5 } }; `val: ${o.a.b + 1}`;");
        assert_eq!(terms::to_js_string(&v), "val: 6");
    }

    #[test]
    fn destructuring_defaults_and_rest_bind_correctly() {
        let v = eval_source("function f({ a, b = 2, ...rest }) { return a + b + rest.c; } f({ a: 1, c: 10 });");
        assert_eq!(terms::to_number(&v), 13.0);
    }

    #[test]
    fn optional_chaining_short_circuits_the_whole_tail() {
        let v = eval_source("let o = null; o?.a.b.c;");
        assert!(matches!(v, Value::Undefined));
    }

    #[test]
    fn unresolved_identifier_reads_as_undefined_under_typeof() {
        let v = eval_source("typeof neverDeclared;");
        assert_eq!(terms::to_js_string(&v), "undefined");
    }

    #[test]
    fn labeled_continue_skips_to_the_next_outer_iteration() {
        let v = eval_source(
            "let out = []; \
             outer: for (let i = 0; i < 3; i = i + 1) { \
               for (let j = 0; j < 3; j = j + 1) { \
                 if (j === 1) continue outer; \
                 out.push(i * 10 + j); \
               } \
             } out.length;",
        );
        assert_eq!(terms::to_number(&v), 3.0);
    }
}
