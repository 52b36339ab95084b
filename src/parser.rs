//! Recursive-descent parser with Pratt-style expression precedence.
//!
//! Unlike a best-effort scanner, every parse function returns
//! `Result<_, CompileError>` and the first syntax error aborts the whole
//! parse — there is no partial tree and no skip-and-recover.

use std::rc::Rc;

use crate::ast::*;
use crate::error::{CompileError, Position};
use crate::source::SourceBuffer;
use crate::token::{Token, TokenType};

type PResult<T> = Result<T, CompileError>;

pub struct Parser {
    tokens: Vec<Token>,
    /// Parallel to `tokens`: whether a line terminator appeared in the
    /// source between this token and the previous primary token. Drives
    /// automatic semicolon insertion.
    newline_before: Vec<bool>,
    pos: usize,
}

pub fn parse_program(buffer: Rc<SourceBuffer>) -> PResult<Program> {
    let all = crate::lexer::Lexer::tokenize(buffer);
    Parser::new(all).parse_program()
}

impl Parser {
    pub fn new(all_tokens: Vec<Token>) -> Self {
        let mut tokens = Vec::with_capacity(all_tokens.len());
        let mut newline_before = Vec::with_capacity(all_tokens.len());
        let mut pending_newline = false;
        for tok in all_tokens {
            match tok.ty {
                TokenType::Whitespace | TokenType::LineComment | TokenType::BlockComment => continue,
                TokenType::LineTerminator => {
                    pending_newline = true;
                    continue;
                }
                _ => {
                    newline_before.push(pending_newline);
                    pending_newline = false;
                    tokens.push(tok);
                }
            }
        }
        Parser { tokens, newline_before, pos: 0 }
    }

    // ---- token stream helpers ----

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn ty(&self) -> TokenType {
        self.cur().ty
    }

    fn peek2_ty(&self) -> TokenType {
        self.tokens.get(self.pos + 1).map(|t| t.ty).unwrap_or(TokenType::Eof)
    }

    fn pos_here(&self) -> Position {
        self.cur().position()
    }

    fn newline_before_cur(&self) -> bool {
        self.newline_before.get(self.pos).copied().unwrap_or(true)
    }

    fn at_eof(&self) -> bool {
        self.ty() == TokenType::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, ty: TokenType) -> bool {
        self.ty() == ty
    }

    fn eat(&mut self, ty: TokenType) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ty: TokenType, what: &str) -> PResult<Token> {
        if self.check(ty) {
            Ok(self.advance())
        } else {
            Err(self.err(format!("expected {what}, found `{}`", self.cur().text)))
        }
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError::syntax(message, self.pos_here())
    }

    /// Automatic semicolon insertion: an explicit `;` always terminates;
    /// otherwise a newline before the current token, `}`, or EOF also
    /// terminates. Anything else is a syntax error.
    fn eat_semicolon(&mut self) -> PResult<()> {
        if self.eat(TokenType::Semicolon) {
            return Ok(());
        }
        if self.newline_before_cur() || self.check(TokenType::RBrace) || self.at_eof() {
            return Ok(());
        }
        Err(self.err(format!("expected `;`, found `{}`", self.cur().text)))
    }

    /// Restricted productions (`return`, `throw`, `continue`, `break`,
    /// postfix `++`/`--`) must not continue across a line terminator.
    fn no_line_terminator_here(&self) -> bool {
        !self.newline_before_cur()
    }

    fn ident_name(&mut self) -> PResult<Rc<str>> {
        if self.ty() == TokenType::Ident || self.ty().is_keyword() {
            Ok(self.advance().text)
        } else {
            Err(self.err(format!("expected identifier, found `{}`", self.cur().text)))
        }
    }

    // ---- program / statements ----

    pub fn parse_program(&mut self) -> PResult<Program> {
        let mut body = Vec::new();
        while !self.at_eof() {
            body.push(self.parse_statement()?);
        }
        Ok(Program { body })
    }

    fn parse_statement(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        match self.ty() {
            TokenType::Semicolon => {
                self.advance();
                Ok(Stmt::new(StmtKind::Empty, pos))
            }
            TokenType::LBrace => self.parse_block_stmt(),
            TokenType::Var | TokenType::Let | TokenType::Const => self.parse_var_decl_stmt(),
            TokenType::If => self.parse_if(),
            TokenType::While => self.parse_while(),
            TokenType::Do => self.parse_do_while(),
            TokenType::For => self.parse_for(),
            TokenType::Return => self.parse_return(),
            TokenType::Break => self.parse_break(),
            TokenType::Continue => self.parse_continue(),
            TokenType::Switch => self.parse_switch(),
            TokenType::Throw => self.parse_throw(),
            TokenType::Try => self.parse_try(),
            TokenType::Function => {
                let def = self.parse_function_def()?;
                Ok(Stmt::new(StmtKind::FunctionDecl(Rc::new(def)), pos))
            }
            TokenType::Class => self.parse_class_decl(),
            TokenType::Ident if self.peek2_ty() == TokenType::Colon => {
                let label = self.advance().text;
                self.advance(); // colon
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::new(StmtKind::Labeled { label, body }, pos))
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_block_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        Ok(Stmt::new(StmtKind::Block(self.parse_block_body()?), pos))
    }

    fn parse_block_body(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenType::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.check(TokenType::RBrace) && !self.at_eof() {
            stmts.push(self.parse_statement()?);
        }
        self.expect(TokenType::RBrace, "`}`")?;
        Ok(stmts)
    }

    fn var_kind(&mut self) -> VarKind {
        match self.advance().ty {
            TokenType::Var => VarKind::Var,
            TokenType::Let => VarKind::Let,
            _ => VarKind::Const,
        }
    }

    fn parse_var_decl_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        let kind = self.var_kind();
        let decls = self.parse_var_declarators()?;
        self.eat_semicolon()?;
        Ok(Stmt::new(StmtKind::VarDecl { kind, decls }, pos))
    }

    fn parse_var_declarators(&mut self) -> PResult<Vec<VarDeclarator>> {
        let mut decls = Vec::new();
        loop {
            let name = self.parse_binding_pattern()?;
            let init = if self.eat(TokenType::Eq) { Some(self.parse_assignment_expr()?) } else { None };
            decls.push(VarDeclarator { name, init });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        Ok(decls)
    }

    fn parse_binding_pattern(&mut self) -> PResult<Pattern> {
        match self.ty() {
            TokenType::LBracket => self.parse_array_pattern(),
            TokenType::LBrace => self.parse_object_pattern(),
            _ => Ok(Pattern::Ident(self.ident_name()?)),
        }
    }

    fn parse_pattern_with_default(&mut self) -> PResult<Pattern> {
        let pat = self.parse_binding_pattern()?;
        if self.eat(TokenType::Eq) {
            let def = self.parse_assignment_expr()?;
            Ok(Pattern::Assign(Box::new(pat), Box::new(def)))
        } else {
            Ok(pat)
        }
    }

    fn parse_array_pattern(&mut self) -> PResult<Pattern> {
        self.expect(TokenType::LBracket, "`[`")?;
        let mut elements = Vec::new();
        while !self.check(TokenType::RBracket) && !self.at_eof() {
            if self.check(TokenType::Comma) {
                elements.push(None);
                self.advance();
                continue;
            }
            if self.eat(TokenType::DotDotDot) {
                let inner = self.parse_binding_pattern()?;
                elements.push(Some(Pattern::Rest(Box::new(inner))));
                break;
            }
            elements.push(Some(self.parse_pattern_with_default()?));
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBracket, "`]`")?;
        Ok(Pattern::Array(elements))
    }

    fn parse_object_pattern(&mut self) -> PResult<Pattern> {
        self.expect(TokenType::LBrace, "`{`")?;
        let mut props = Vec::new();
        let mut rest = None;
        while !self.check(TokenType::RBrace) && !self.at_eof() {
            if self.eat(TokenType::DotDotDot) {
                rest = Some(Box::new(Pattern::Ident(self.ident_name()?)));
                break;
            }
            let key = self.ident_name()?;
            let value = if self.eat(TokenType::Colon) { self.parse_binding_pattern()? } else { Pattern::Ident(key.clone()) };
            let value = if self.eat(TokenType::Eq) {
                let def = self.parse_assignment_expr()?;
                Pattern::Assign(Box::new(value), Box::new(def))
            } else {
                value
            };
            props.push(ObjPatProp { key, value });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBrace, "`}`")?;
        if let Some(r) = rest {
            props.push(ObjPatProp { key: "...".into(), value: *r });
        }
        Ok(Pattern::Object(props))
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        self.expect(TokenType::LParen, "`(`")?;
        let test = self.parse_expression()?;
        self.expect(TokenType::RParen, "`)`")?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate =
            if self.eat(TokenType::Else) { Some(Box::new(self.parse_statement()?)) } else { None };
        Ok(Stmt::new(StmtKind::If { test, consequent, alternate }, pos))
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        self.expect(TokenType::LParen, "`(`")?;
        let test = self.parse_expression()?;
        self.expect(TokenType::RParen, "`)`")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(StmtKind::While { test, body }, pos))
    }

    fn parse_do_while(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        let body = Box::new(self.parse_statement()?);
        self.expect(TokenType::While, "`while`")?;
        self.expect(TokenType::LParen, "`(`")?;
        let test = self.parse_expression()?;
        self.expect(TokenType::RParen, "`)`")?;
        self.eat_semicolon()?;
        Ok(Stmt::new(StmtKind::DoWhile { body, test }, pos))
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        self.expect(TokenType::LParen, "`(`")?;

        if matches!(self.ty(), TokenType::Var | TokenType::Let | TokenType::Const) {
            let kind = self.var_kind();
            let name = self.parse_binding_pattern()?;
            if self.eat(TokenType::In) {
                let right = self.parse_expression()?;
                self.expect(TokenType::RParen, "`)`")?;
                let body = Box::new(self.parse_statement()?);
                let left = Box::new(ForInit::VarDecl { kind, decls: vec![VarDeclarator { name, init: None }] });
                return Ok(Stmt::new(StmtKind::ForIn { left, right, body }, pos));
            }
            if self.eat(TokenType::Of) {
                let right = self.parse_assignment_expr()?;
                self.expect(TokenType::RParen, "`)`")?;
                let body = Box::new(self.parse_statement()?);
                let left = Box::new(ForInit::VarDecl { kind, decls: vec![VarDeclarator { name, init: None }] });
                return Ok(Stmt::new(StmtKind::ForOf { left, right, body }, pos));
            }
            let init_val = if self.eat(TokenType::Eq) { Some(self.parse_assignment_expr()?) } else { None };
            let mut decls = vec![VarDeclarator { name, init: init_val }];
            while self.eat(TokenType::Comma) {
                let n = self.parse_binding_pattern()?;
                let i = if self.eat(TokenType::Eq) { Some(self.parse_assignment_expr()?) } else { None };
                decls.push(VarDeclarator { name: n, init: i });
            }
            self.expect(TokenType::Semicolon, "`;`")?;
            return self.finish_c_style_for(pos, Some(Box::new(ForInit::VarDecl { kind, decls })));
        }

        if self.check(TokenType::Semicolon) {
            self.advance();
            return self.finish_c_style_for(pos, None);
        }

        let expr = self.parse_expression()?;
        if self.eat(TokenType::In) {
            let right = self.parse_expression()?;
            self.expect(TokenType::RParen, "`)`")?;
            let body = Box::new(self.parse_statement()?);
            let left = Box::new(ForInit::Expr(expr));
            return Ok(Stmt::new(StmtKind::ForIn { left, right, body }, pos));
        }
        if self.eat(TokenType::Of) {
            let right = self.parse_assignment_expr()?;
            self.expect(TokenType::RParen, "`)`")?;
            let body = Box::new(self.parse_statement()?);
            let left = Box::new(ForInit::Expr(expr));
            return Ok(Stmt::new(StmtKind::ForOf { left, right, body }, pos));
        }
        self.expect(TokenType::Semicolon, "`;`")?;
        self.finish_c_style_for(pos, Some(Box::new(ForInit::Expr(expr))))
    }

    fn finish_c_style_for(&mut self, pos: Position, init: Option<Box<ForInit>>) -> PResult<Stmt> {
        let test = if !self.check(TokenType::Semicolon) { Some(self.parse_expression()?) } else { None };
        self.expect(TokenType::Semicolon, "`;`")?;
        let update = if !self.check(TokenType::RParen) { Some(self.parse_expression()?) } else { None };
        self.expect(TokenType::RParen, "`)`")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::new(StmtKind::For { init, test, update, body }, pos))
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        let value = if matches!(self.ty(), TokenType::Semicolon | TokenType::RBrace | TokenType::Eof)
            || !self.no_line_terminator_here()
        {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.eat_semicolon()?;
        Ok(Stmt::new(StmtKind::Return(value), pos))
    }

    fn parse_break(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        let label = if self.check(TokenType::Ident) && self.no_line_terminator_here() {
            Some(self.advance().text)
        } else {
            None
        };
        self.eat_semicolon()?;
        Ok(Stmt::new(StmtKind::Break(label), pos))
    }

    fn parse_continue(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        let label = if self.check(TokenType::Ident) && self.no_line_terminator_here() {
            Some(self.advance().text)
        } else {
            None
        };
        self.eat_semicolon()?;
        Ok(Stmt::new(StmtKind::Continue(label), pos))
    }

    fn parse_switch(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        self.expect(TokenType::LParen, "`(`")?;
        let discriminant = self.parse_expression()?;
        self.expect(TokenType::RParen, "`)`")?;
        self.expect(TokenType::LBrace, "`{`")?;
        let mut cases = Vec::new();
        while !self.check(TokenType::RBrace) && !self.at_eof() {
            let test = if self.eat(TokenType::Case) {
                Some(self.parse_expression()?)
            } else {
                self.expect(TokenType::Default, "`case` or `default`")?;
                None
            };
            self.expect(TokenType::Colon, "`:`")?;
            let mut consequent = Vec::new();
            while !matches!(self.ty(), TokenType::Case | TokenType::Default | TokenType::RBrace | TokenType::Eof) {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.expect(TokenType::RBrace, "`}`")?;
        Ok(Stmt::new(StmtKind::Switch { discriminant, cases }, pos))
    }

    fn parse_throw(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        if !self.no_line_terminator_here() {
            return Err(self.err("illegal newline after `throw`"));
        }
        let argument = self.parse_expression()?;
        self.eat_semicolon()?;
        Ok(Stmt::new(StmtKind::Throw(argument), pos))
    }

    fn parse_try(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        let block = self.parse_block_body()?;
        let handler = if self.eat(TokenType::Catch) {
            let param = if self.eat(TokenType::LParen) {
                let p = self.parse_binding_pattern()?;
                self.expect(TokenType::RParen, "`)`")?;
                Some(p)
            } else {
                None
            };
            let body = self.parse_block_body()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat(TokenType::Finally) { Some(self.parse_block_body()?) } else { None };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.err("missing `catch` or `finally` after `try`"));
        }
        Ok(Stmt::new(StmtKind::Try { block, handler, finalizer }, pos))
    }

    fn parse_function_def(&mut self) -> PResult<FunctionDef> {
        self.expect(TokenType::Function, "`function`")?;
        let name = if self.check(TokenType::Ident) { Some(self.advance().text) } else { None };
        let params = self.parse_params()?;
        let body = self.parse_block_body()?;
        Ok(FunctionDef { name, params, body })
    }

    fn parse_class_decl(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        self.advance();
        let name = self.ident_name()?;
        let superclass = if self.eat_ident_kw("extends") { Some(self.parse_lhs_expr()?) } else { None };
        let methods = self.parse_class_body()?;
        Ok(Stmt::new(StmtKind::ClassDecl { name, superclass, methods }, pos))
    }

    /// `extends` is not a reserved keyword in this engine's closed set, so
    /// it is recognized contextually by identifier text.
    fn eat_ident_kw(&mut self, kw: &str) -> bool {
        if self.check(TokenType::Ident) && &*self.cur().text == kw {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_class_body(&mut self) -> PResult<Vec<ClassMethod>> {
        self.expect(TokenType::LBrace, "`{`")?;
        let mut methods = Vec::new();
        while !self.check(TokenType::RBrace) && !self.at_eof() {
            if self.eat(TokenType::Semicolon) {
                continue;
            }
            let is_static = self.check(TokenType::Ident)
                && &*self.cur().text == "static"
                && self.peek2_ty() != TokenType::LParen;
            if is_static {
                self.advance();
            }
            let key = self.parse_prop_key()?;
            let params = self.parse_params()?;
            let body = self.parse_block_body()?;
            let is_constructor = matches!(&key, PropKey::Ident(s) if &**s == "constructor") && !is_static;
            methods.push(ClassMethod { key, is_static, is_constructor, params, body });
        }
        self.expect(TokenType::RBrace, "`}`")?;
        Ok(methods)
    }

    fn parse_prop_key(&mut self) -> PResult<PropKey> {
        match self.ty() {
            TokenType::String => {
                let tok = self.advance();
                Ok(PropKey::String(crate::literals::decode_string(&tok.text).into()))
            }
            TokenType::Number => {
                let tok = self.advance();
                Ok(PropKey::Number(crate::literals::decode_number(&tok.text)))
            }
            TokenType::LBracket => {
                self.advance();
                let expr = self.parse_assignment_expr()?;
                self.expect(TokenType::RBracket, "`]`")?;
                Ok(PropKey::Computed(Box::new(expr)))
            }
            _ => Ok(PropKey::Ident(self.ident_name()?)),
        }
    }

    fn parse_params(&mut self) -> PResult<Vec<Param>> {
        self.expect(TokenType::LParen, "`(`")?;
        let mut params = Vec::new();
        while !self.check(TokenType::RParen) && !self.at_eof() {
            if self.eat(TokenType::DotDotDot) {
                let pattern = self.parse_binding_pattern()?;
                params.push(Param { pattern, default: None, is_rest: true });
                break;
            }
            let pattern = self.parse_binding_pattern()?;
            let default = if self.eat(TokenType::Eq) { Some(self.parse_assignment_expr()?) } else { None };
            params.push(Param { pattern, default, is_rest: false });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen, "`)`")?;
        Ok(params)
    }

    fn parse_expr_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.pos_here();
        let expr = self.parse_expression()?;
        self.eat_semicolon()?;
        Ok(Stmt::new(StmtKind::Expr(expr), pos))
    }

    // ---- expressions ----

    fn parse_expression(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let expr = self.parse_assignment_expr()?;
        if self.check(TokenType::Comma) {
            let mut exprs = vec![expr];
            while self.eat(TokenType::Comma) {
                exprs.push(self.parse_assignment_expr()?);
            }
            Ok(Expr::new(ExprKind::Sequence(exprs), pos))
        } else {
            Ok(expr)
        }
    }

    fn parse_assignment_expr(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        let left = self.parse_conditional_expr()?;
        if let Some(op) = self.assignment_op() {
            self.advance();
            let right = Box::new(self.parse_assignment_expr()?);
            let target = self.expr_to_assign_target(left)?;
            return Ok(Expr::new(ExprKind::Assign { op, left: Box::new(target), right }, pos));
        }
        Ok(left)
    }

    fn expr_to_assign_target(&self, expr: Expr) -> PResult<AssignTarget> {
        match &expr.node {
            ExprKind::Ident(_) | ExprKind::Member { .. } => Ok(AssignTarget::Expr(expr)),
            ExprKind::Array(_) | ExprKind::Object(_) => {
                Ok(AssignTarget::Pattern(Self::expr_to_pattern(&expr)?))
            }
            _ => Err(CompileError::syntax("invalid assignment target", expr.pos)),
        }
    }

    /// Re-interprets an already-parsed array/object literal as a
    /// destructuring pattern, for assignment (not declaration) targets
    /// such as `[a, b] = f();`.
    fn expr_to_pattern(expr: &Expr) -> PResult<Pattern> {
        match &expr.node {
            ExprKind::Ident(name) => Ok(Pattern::Ident(name.clone())),
            ExprKind::Array(elems) => {
                let mut out = Vec::with_capacity(elems.len());
                for e in elems {
                    out.push(match e {
                        None => None,
                        Some(Argument::Spread(inner)) => Some(Pattern::Rest(Box::new(Self::expr_to_pattern(inner)?))),
                        Some(Argument::Normal(inner)) => Some(Self::expr_to_pattern(inner)?),
                    });
                }
                Ok(Pattern::Array(out))
            }
            ExprKind::Object(props) => {
                let mut out = Vec::with_capacity(props.len());
                for p in props {
                    let key = match &p.key {
                        PropKey::Ident(s) | PropKey::String(s) => s.clone(),
                        _ => return Err(CompileError::syntax("unsupported destructuring key", expr.pos)),
                    };
                    out.push(ObjPatProp { key, value: Self::expr_to_pattern(&p.value)? });
                }
                Ok(Pattern::Object(out))
            }
            ExprKind::Assign { op: AssignOp::Assign, left, right } => match left.as_ref() {
                AssignTarget::Expr(e) => Ok(Pattern::Assign(Box::new(Self::expr_to_pattern(e)?), right.clone())),
                AssignTarget::Pattern(p) => Ok(Pattern::Assign(Box::new(p.clone()), right.clone())),
            },
            _ => Err(CompileError::syntax("invalid destructuring target", expr.pos)),
        }
    }

    fn assignment_op(&self) -> Option<AssignOp> {
        use AssignOp::*;
        Some(match self.ty() {
            TokenType::Eq => Assign,
            TokenType::PlusEq => AddAssign,
            TokenType::MinusEq => SubAssign,
            TokenType::StarEq => MulAssign,
            TokenType::SlashEq => DivAssign,
            TokenType::PercentEq => ModAssign,
            TokenType::StarStarEq => ExpAssign,
            TokenType::AmpEq => BitAndAssign,
            TokenType::PipeEq => BitOrAssign,
            TokenType::CaretEq => BitXorAssign,
            TokenType::LtLtEq => ShlAssign,
            TokenType::GtGtEq => ShrAssign,
            TokenType::GtGtGtEq => UShrAssign,
            TokenType::AmpAmpEq => AndAssign,
            TokenType::PipePipeEq => OrAssign,
            TokenType::QuestionQuestionEq => NullishAssign,
            _ => return None,
        })
    }

    /// Tries to parse `ident => ...` or `(params) => ...`; returns `Ok(None)`
    /// (cursor unchanged) if this position isn't an arrow function.
    fn try_parse_arrow(&mut self) -> PResult<Option<Expr>> {
        let pos = self.pos_here();
        if self.check(TokenType::Ident) && self.peek2_ty() == TokenType::Arrow {
            let name = self.advance().text;
            self.advance(); // =>
            let params = vec![Param { pattern: Pattern::Ident(name), default: None, is_rest: false }];
            return Ok(Some(self.finish_arrow(pos, params)?));
        }
        if self.check(TokenType::LParen) && self.scan_is_arrow() {
            let params = self.parse_params()?;
            self.expect(TokenType::Arrow, "`=>`")?;
            return Ok(Some(self.finish_arrow(pos, params)?));
        }
        Ok(None)
    }

    /// Lookahead: does the parenthesized group starting here close with a
    /// matching `)` immediately followed by `=>`?
    fn scan_is_arrow(&self) -> bool {
        let mut depth = 0i32;
        let mut i = self.pos;
        loop {
            match self.tokens.get(i).map(|t| t.ty) {
                Some(TokenType::LParen) => depth += 1,
                Some(TokenType::RParen) => {
                    depth -= 1;
                    if depth == 0 {
                        return self.tokens.get(i + 1).map(|t| t.ty) == Some(TokenType::Arrow);
                    }
                }
                Some(TokenType::Eof) | None => return false,
                _ => {}
            }
            i += 1;
        }
    }

    fn finish_arrow(&mut self, pos: Position, params: Vec<Param>) -> PResult<Expr> {
        let body = if self.check(TokenType::LBrace) {
            ArrowBody::Block(self.parse_block_body()?)
        } else {
            ArrowBody::Expr(Box::new(self.parse_assignment_expr()?))
        };
        Ok(Expr::new(ExprKind::Arrow(Rc::new(ArrowDef { params, body })), pos))
    }

    fn parse_conditional_expr(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let test = self.parse_nullish_coalesce()?;
        if self.eat(TokenType::Question) {
            let consequent = self.parse_assignment_expr()?;
            self.expect(TokenType::Colon, "`:`")?;
            let alternate = self.parse_assignment_expr()?;
            Ok(Expr::new(
                ExprKind::Conditional { test: Box::new(test), consequent: Box::new(consequent), alternate: Box::new(alternate) },
                pos,
            ))
        } else {
            Ok(test)
        }
    }

    fn parse_nullish_coalesce(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let mut left = self.parse_logical_or()?;
        while self.eat(TokenType::QuestionQuestion) {
            let right = self.parse_logical_or()?;
            left = Expr::new(ExprKind::Logical { op: LogicalOp::NullishCoalesce, left: Box::new(left), right: Box::new(right) }, pos);
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let mut left = self.parse_logical_and()?;
        while self.eat(TokenType::PipePipe) {
            let right = self.parse_logical_and()?;
            left = Expr::new(ExprKind::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right) }, pos);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let mut left = self.parse_bitwise_or()?;
        while self.eat(TokenType::AmpAmp) {
            let right = self.parse_bitwise_or()?;
            left = Expr::new(ExprKind::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right) }, pos);
        }
        Ok(left)
    }

    fn parse_bin_level(&mut self, next: fn(&mut Self) -> PResult<Expr>, ops: &[(TokenType, BinaryOp)]) -> PResult<Expr> {
        let pos = self.pos_here();
        let mut left = next(self)?;
        loop {
            let matched = ops.iter().find(|(t, _)| *t == self.ty());
            let Some((_, op)) = matched else { break };
            let op = *op;
            self.advance();
            let right = next(self)?;
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, pos);
        }
        Ok(left)
    }

    fn parse_bitwise_or(&mut self) -> PResult<Expr> {
        self.parse_bin_level(Self::parse_bitwise_xor, &[(TokenType::Pipe, BinaryOp::BitOr)])
    }
    fn parse_bitwise_xor(&mut self) -> PResult<Expr> {
        self.parse_bin_level(Self::parse_bitwise_and, &[(TokenType::Caret, BinaryOp::BitXor)])
    }
    fn parse_bitwise_and(&mut self) -> PResult<Expr> {
        self.parse_bin_level(Self::parse_equality, &[(TokenType::Amp, BinaryOp::BitAnd)])
    }
    fn parse_equality(&mut self) -> PResult<Expr> {
        self.parse_bin_level(
            Self::parse_relational,
            &[
                (TokenType::EqEq, BinaryOp::Eq),
                (TokenType::BangEq, BinaryOp::Ne),
                (TokenType::EqEqEq, BinaryOp::StrictEq),
                (TokenType::BangEqEq, BinaryOp::StrictNe),
            ],
        )
    }
    fn parse_relational(&mut self) -> PResult<Expr> {
        self.parse_bin_level(
            Self::parse_shift,
            &[
                (TokenType::Lt, BinaryOp::Lt),
                (TokenType::Gt, BinaryOp::Gt),
                (TokenType::LtEq, BinaryOp::Le),
                (TokenType::GtEq, BinaryOp::Ge),
                (TokenType::Instanceof, BinaryOp::InstanceOf),
                (TokenType::In, BinaryOp::In),
            ],
        )
    }
    fn parse_shift(&mut self) -> PResult<Expr> {
        self.parse_bin_level(
            Self::parse_additive,
            &[(TokenType::LtLt, BinaryOp::Shl), (TokenType::GtGt, BinaryOp::Shr), (TokenType::GtGtGt, BinaryOp::UShr)],
        )
    }
    fn parse_additive(&mut self) -> PResult<Expr> {
        self.parse_bin_level(Self::parse_multiplicative, &[(TokenType::Plus, BinaryOp::Add), (TokenType::Minus, BinaryOp::Sub)])
    }
    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        self.parse_bin_level(
            Self::parse_exponentiation,
            &[(TokenType::Star, BinaryOp::Mul), (TokenType::Slash, BinaryOp::Div), (TokenType::Percent, BinaryOp::Mod)],
        )
    }

    fn parse_exponentiation(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let base = self.parse_unary()?;
        if self.eat(TokenType::StarStar) {
            let exp = self.parse_exponentiation()?; // right-associative
            Ok(Expr::new(ExprKind::Binary { op: BinaryOp::Exp, left: Box::new(base), right: Box::new(exp) }, pos))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        macro_rules! unary {
            ($op:expr) => {{
                self.advance();
                let arg = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Unary { op: $op, argument: arg }, pos))
            }};
        }
        match self.ty() {
            TokenType::Bang => unary!(UnaryOp::Not),
            TokenType::Tilde => unary!(UnaryOp::BitNot),
            TokenType::Minus => unary!(UnaryOp::Neg),
            TokenType::Plus => unary!(UnaryOp::Pos),
            TokenType::Typeof => {
                self.advance();
                Ok(Expr::new(ExprKind::Typeof(Box::new(self.parse_unary()?)), pos))
            }
            TokenType::Void => {
                self.advance();
                Ok(Expr::new(ExprKind::Void(Box::new(self.parse_unary()?)), pos))
            }
            TokenType::Delete => {
                self.advance();
                Ok(Expr::new(ExprKind::Delete(Box::new(self.parse_unary()?)), pos))
            }
            TokenType::PlusPlus => {
                self.advance();
                let arg = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Update { op: UpdateOp::Inc, argument: arg, prefix: true }, pos))
            }
            TokenType::MinusMinus => {
                self.advance();
                let arg = Box::new(self.parse_unary()?);
                Ok(Expr::new(ExprKind::Update { op: UpdateOp::Dec, argument: arg, prefix: true }, pos))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let mut expr = self.parse_call_expr()?;
        if self.no_line_terminator_here() {
            match self.ty() {
                TokenType::PlusPlus => {
                    self.advance();
                    expr = Expr::new(ExprKind::Update { op: UpdateOp::Inc, argument: Box::new(expr), prefix: false }, pos);
                }
                TokenType::MinusMinus => {
                    self.advance();
                    expr = Expr::new(ExprKind::Update { op: UpdateOp::Dec, argument: Box::new(expr), prefix: false }, pos);
                }
                _ => {}
            }
        }
        Ok(expr)
    }

    fn parse_call_expr(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let mut expr = self.parse_lhs_expr()?;
        loop {
            match self.ty() {
                TokenType::LParen => {
                    let args = self.parse_arguments()?;
                    expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args, optional: false }, pos);
                }
                TokenType::Dot => {
                    self.advance();
                    let name = self.ident_name()?;
                    expr = Expr::new(ExprKind::Member { object: Box::new(expr), property: MemberKey::Name(name), optional: false }, pos);
                }
                TokenType::QuestionDot => {
                    self.advance();
                    if self.check(TokenType::LParen) {
                        let args = self.parse_arguments()?;
                        expr = Expr::new(ExprKind::Call { callee: Box::new(expr), args, optional: true }, pos);
                    } else if self.check(TokenType::LBracket) {
                        self.advance();
                        let idx = self.parse_expression()?;
                        self.expect(TokenType::RBracket, "`]`")?;
                        expr = Expr::new(ExprKind::Member { object: Box::new(expr), property: MemberKey::Computed(Box::new(idx)), optional: true }, pos);
                    } else {
                        let name = self.ident_name()?;
                        expr = Expr::new(ExprKind::Member { object: Box::new(expr), property: MemberKey::Name(name), optional: true }, pos);
                    }
                }
                TokenType::LBracket => {
                    self.advance();
                    let idx = self.parse_expression()?;
                    self.expect(TokenType::RBracket, "`]`")?;
                    expr = Expr::new(ExprKind::Member { object: Box::new(expr), property: MemberKey::Computed(Box::new(idx)), optional: false }, pos);
                }
                TokenType::Backtick => {
                    // Tagged templates are not part of the supported surface;
                    // treat a template literal directly following an
                    // expression as a syntax error rather than silently
                    // dropping the tag.
                    break;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> PResult<Vec<Argument>> {
        self.expect(TokenType::LParen, "`(`")?;
        let mut args = Vec::new();
        while !self.check(TokenType::RParen) && !self.at_eof() {
            if self.eat(TokenType::DotDotDot) {
                args.push(Argument::Spread(self.parse_assignment_expr()?));
            } else {
                args.push(Argument::Normal(self.parse_assignment_expr()?));
            }
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RParen, "`)`")?;
        Ok(args)
    }

    fn parse_lhs_expr(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        if self.check(TokenType::New) {
            self.advance();
            let callee = self.parse_member_expr_no_call()?;
            let args = if self.check(TokenType::LParen) { self.parse_arguments()? } else { Vec::new() };
            return Ok(Expr::new(ExprKind::New { callee: Box::new(callee), args }, pos));
        }
        self.parse_primary()
    }

    /// A `new` callee parses member accesses but stops before a call, so
    /// `new a.b.C(x)` attaches `(x)` to the `new`, not to `C`.
    fn parse_member_expr_no_call(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        let mut expr = if self.check(TokenType::New) {
            self.advance();
            let callee = self.parse_member_expr_no_call()?;
            let args = if self.check(TokenType::LParen) { self.parse_arguments()? } else { Vec::new() };
            Expr::new(ExprKind::New { callee: Box::new(callee), args }, pos)
        } else {
            self.parse_primary()?
        };
        loop {
            match self.ty() {
                TokenType::Dot => {
                    self.advance();
                    let name = self.ident_name()?;
                    expr = Expr::new(ExprKind::Member { object: Box::new(expr), property: MemberKey::Name(name), optional: false }, pos);
                }
                TokenType::LBracket => {
                    self.advance();
                    let idx = self.parse_expression()?;
                    self.expect(TokenType::RBracket, "`]`")?;
                    expr = Expr::new(ExprKind::Member { object: Box::new(expr), property: MemberKey::Computed(Box::new(idx)), optional: false }, pos);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        match self.ty() {
            TokenType::Number => {
                let tok = self.advance();
                Ok(Expr::new(ExprKind::Number(crate::literals::decode_number(&tok.text)), pos))
            }
            TokenType::String => {
                let tok = self.advance();
                Ok(Expr::new(ExprKind::String(crate::literals::decode_string(&tok.text).into()), pos))
            }
            TokenType::Regex => {
                let tok = self.advance();
                let (pattern, flags) = crate::literals::decode_regex(&tok.text);
                Ok(Expr::new(ExprKind::Regex { pattern: pattern.into(), flags: flags.into() }, pos))
            }
            TokenType::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), pos))
            }
            TokenType::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), pos))
            }
            TokenType::Null => {
                self.advance();
                Ok(Expr::new(ExprKind::Null, pos))
            }
            TokenType::This => {
                self.advance();
                Ok(Expr::new(ExprKind::This, pos))
            }
            TokenType::Ident => {
                let tok = self.advance();
                if &*tok.text == "undefined" {
                    Ok(Expr::new(ExprKind::Undefined, pos))
                } else {
                    Ok(Expr::new(ExprKind::Ident(tok.text), pos))
                }
            }
            TokenType::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenType::RParen, "`)`")?;
                Ok(expr)
            }
            TokenType::LBracket => self.parse_array_literal(),
            TokenType::LBrace => self.parse_object_literal(),
            TokenType::Function => {
                let def = self.parse_function_def()?;
                Ok(Expr::new(ExprKind::FunctionExpr(Rc::new(def)), pos))
            }
            TokenType::Backtick => self.parse_template(),
            _ => Err(self.err(format!("unexpected token `{}`", self.cur().text))),
        }
    }

    fn parse_array_literal(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        self.advance();
        let mut elements = Vec::new();
        while !self.check(TokenType::RBracket) && !self.at_eof() {
            if self.check(TokenType::Comma) {
                elements.push(None);
                self.advance();
                continue;
            }
            if self.eat(TokenType::DotDotDot) {
                elements.push(Some(Argument::Spread(self.parse_assignment_expr()?)));
            } else {
                elements.push(Some(Argument::Normal(self.parse_assignment_expr()?)));
            }
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBracket, "`]`")?;
        Ok(Expr::new(ExprKind::Array(elements), pos))
    }

    fn parse_object_literal(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        self.advance();
        let mut props = Vec::new();
        while !self.check(TokenType::RBrace) && !self.at_eof() {
            let key = self.parse_prop_key()?;
            if matches!(self.ty(), TokenType::Comma | TokenType::RBrace) {
                if let PropKey::Ident(ref name) = key {
                    props.push(ObjProp { key: key.clone(), value: Expr::new(ExprKind::Ident(name.clone()), pos), shorthand: true });
                    self.eat(TokenType::Comma);
                    continue;
                }
            }
            if self.check(TokenType::LParen) {
                let params = self.parse_params()?;
                let body = self.parse_block_body()?;
                let def = FunctionDef { name: None, params, body };
                props.push(ObjProp { key, value: Expr::new(ExprKind::FunctionExpr(Rc::new(def)), pos), shorthand: false });
                if !self.eat(TokenType::Comma) {
                    break;
                }
                continue;
            }
            self.expect(TokenType::Colon, "`:`")?;
            let value = self.parse_assignment_expr()?;
            props.push(ObjProp { key, value, shorthand: false });
            if !self.eat(TokenType::Comma) {
                break;
            }
        }
        self.expect(TokenType::RBrace, "`}`")?;
        Ok(Expr::new(ExprKind::Object(props), pos))
    }

    fn parse_template(&mut self) -> PResult<Expr> {
        let pos = self.pos_here();
        self.expect(TokenType::Backtick, "`` ` ``")?;
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        loop {
            let chunk = self.expect(TokenType::TemplateString, "template text")?;
            quasis.push(crate::literals::decode_string_body(&chunk.text).into());
            if self.eat(TokenType::DollarLCurly) {
                exprs.push(self.parse_expression()?);
                self.expect(TokenType::RBrace, "`}`")?;
            } else {
                break;
            }
        }
        self.expect(TokenType::Backtick, "`` ` ``")?;
        Ok(Expr::new(ExprKind::Template { quasis, exprs }, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceBuffer;

    fn parse(src: &str) -> Program {
        parse_program(Rc::new(SourceBuffer::new(src))).expect("parse should succeed")
    }

    fn parse_err(src: &str) -> CompileError {
        parse_program(Rc::new(SourceBuffer::new(src))).expect_err("parse should fail")
    }

    #[test]
    fn parses_var_decl_with_destructuring_defaults_and_rest() {
        let prog = parse("let [a, b = 2, ...rest] = xs;");
        assert_eq!(prog.body.len(), 1);
        match &prog.body[0].node {
            StmtKind::VarDecl { kind: VarKind::Let, decls } => {
                assert_eq!(decls.len(), 1);
                match &decls[0].name {
                    Pattern::Array(elems) => {
                        assert_eq!(elems.len(), 3);
                        assert!(matches!(elems[0], Some(Pattern::Ident(_))));
                        assert!(matches!(elems[1], Some(Pattern::Assign(_, _))));
                        assert!(matches!(elems[2], Some(Pattern::Rest(_))));
                    }
                    other => panic!("expected array pattern, got {other:?}"),
                }
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_arrow_function_with_block_body() {
        let prog = parse("const f = (x, y = 1) => { return x + y; };");
        match &prog.body[0].node {
            StmtKind::VarDecl { decls, .. } => match decls[0].init.as_ref().unwrap().node {
                ExprKind::Arrow(ref def) => {
                    assert_eq!(def.params.len(), 2);
                    assert!(matches!(def.body, ArrowBody::Block(_)));
                }
                ref other => panic!("expected arrow, got {other:?}"),
            },
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_bare_identifier_arrow_with_expression_body() {
        let prog = parse("const sq = x => x * x;");
        match &prog.body[0].node {
            StmtKind::VarDecl { decls, .. } => {
                assert!(matches!(decls[0].init.as_ref().unwrap().node, ExprKind::Arrow(_)));
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_optional_chaining_and_nullish_coalescing() {
        let prog = parse("a?.b?.(c) ?? d;");
        match &prog.body[0].node {
            StmtKind::Expr(expr) => match &expr.node {
                ExprKind::Logical { op: LogicalOp::NullishCoalesce, left, .. } => {
                    assert!(matches!(left.node, ExprKind::Call { optional: true, .. }));
                }
                other => panic!("expected nullish-coalesce, got {other:?}"),
            },
            other => panic!("expected expr stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_template_with_interpolation() {
        let prog = parse("`x=${1 + 1}`;");
        match &prog.body[0].node {
            StmtKind::Expr(expr) => match &expr.node {
                ExprKind::Template { quasis, exprs } => {
                    assert_eq!(quasis.len(), 2);
                    assert_eq!(exprs.len(), 1);
                    assert_eq!(&*quasis[0], "x=");
                }
                other => panic!("expected template, got {other:?}"),
            },
            other => panic!("expected expr stmt, got {other:?}"),
        }
    }

    #[test]
    fn parses_for_of_and_for_in() {
        let prog = parse("for (const x of xs) {} for (const k in obj) {}");
        assert!(matches!(prog.body[0].node, StmtKind::ForOf { .. }));
        assert!(matches!(prog.body[1].node, StmtKind::ForIn { .. }));
    }

    #[test]
    fn parses_try_catch_finally() {
        let prog = parse("try { throw 1; } catch (e) { x = e; } finally { y = 2; }");
        match &prog.body[0].node {
            StmtKind::Try { handler, finalizer, .. } => {
                assert!(handler.is_some());
                assert!(finalizer.is_some());
            }
            other => panic!("expected try, got {other:?}"),
        }
    }

    #[test]
    fn applies_automatic_semicolon_insertion() {
        let prog = parse("let a = 1\nlet b = 2\n");
        assert_eq!(prog.body.len(), 2);
    }

    #[test]
    fn restricts_return_across_newline() {
        let prog = parse("function f() {\n  return\n  1;\n}");
        match &prog.body[0].node {
            StmtKind::FunctionDecl(def) => {
                assert!(matches!(def.body[0].node, StmtKind::Return(None)));
            }
            other => panic!("expected function decl, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unexpected_token() {
        let err = parse_err("let = ;");
        assert_eq!(err.kind, crate::error::ErrorKind::SyntaxError);
    }

    #[test]
    fn parses_class_with_discarded_extends() {
        let prog = parse("class B extends A { constructor() { this.x = 1; } m() {} static s() {} }");
        match &prog.body[0].node {
            StmtKind::ClassDecl { superclass, methods, .. } => {
                assert!(superclass.is_some());
                assert!(methods.iter().any(|m| m.is_constructor));
                assert!(methods.iter().any(|m| m.is_static));
            }
            other => panic!("expected class decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_destructuring_assignment_target() {
        let prog = parse("[a, b] = [b, a];");
        match &prog.body[0].node {
            StmtKind::Expr(expr) => match &expr.node {
                ExprKind::Assign { left, .. } => assert!(matches!(**left, AssignTarget::Pattern(_))),
                other => panic!("expected assign, got {other:?}"),
            },
            other => panic!("expected expr stmt, got {other:?}"),
        }
    }
}
