//! Single-pass scanner producing a token stream with context-sensitive
//! decisions: regex-vs-division, template-literal interpolation, and (in
//! Gherkin mode) line-leading keyword recognition.
//!
//! The lexer never interprets a lexeme's value — a [`Token`] carries only
//! its exact source span. Decoding (string escapes, numeric literals,
//! regex pattern/flags) happens in the parser, which is the only place
//! that needs the decoded value. This keeps the universal invariant that
//! concatenating every token's `text` in order reproduces the source
//! exactly, whitespace and comments included.

use std::rc::Rc;

use crate::source::SourceBuffer;
use crate::token::{RegexAllowed, Token, TokenType, keyword_type};

#[derive(Debug, Clone, Copy)]
enum Mode {
    /// Inside a template literal, between backticks. `pending_delim`
    /// tracks whether the text run for this position has already been
    /// emitted and the next token must be the delimiter (`${` or the
    /// closing backtick).
    TemplateBody { pending_delim: bool },
    /// Inside a `${ ... }` interpolation, at brace-nesting depth `depth`
    /// relative to the interpolation's own opening brace. A `}` at depth
    /// 0 closes the interpolation; anything deeper belongs to a nested
    /// object literal or block.
    Interpolation { depth: u32 },
}

pub struct Lexer {
    buffer: Rc<SourceBuffer>,
    pos: u32,
    line: u32,
    line_start: u32,
    regex_allowed: bool,
    modes: Vec<Mode>,
    gherkin: bool,
    /// True at the first token of a physical line not yet classified.
    /// Gherkin mode reads a whole line's worth of tokens at once on the
    /// first call for that line and queues the rest here.
    bol: bool,
    pending: Vec<Token>,
}

const STEP_PREFIXES: &[&str] = &["Given", "When", "Then", "And", "But", "*"];

impl Lexer {
    pub fn new(buffer: Rc<SourceBuffer>) -> Self {
        Lexer {
            buffer,
            pos: 0,
            line: 1,
            line_start: 0,
            regex_allowed: true,
            modes: Vec::new(),
            gherkin: false,
            bol: true,
            pending: Vec::new(),
        }
    }

    pub fn new_gherkin(buffer: Rc<SourceBuffer>) -> Self {
        let mut lexer = Lexer::new(buffer);
        lexer.gherkin = true;
        lexer
    }

    /// Tokenize the whole buffer as JavaScript, including whitespace and
    /// comment tokens, terminated by a single trailing `Eof`.
    pub fn tokenize(buffer: Rc<SourceBuffer>) -> Vec<Token> {
        let mut lexer = Lexer::new(buffer);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.ty == TokenType::Eof;
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    /// Tokenize the whole buffer in Gherkin mode.
    pub fn tokenize_gherkin(buffer: Rc<SourceBuffer>) -> Vec<Token> {
        let mut lexer = Lexer::new_gherkin(buffer);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.ty == TokenType::Eof;
            out.push(tok);
            if done {
                break;
            }
        }
        out
    }

    fn bytes(&self) -> &[u8] {
        self.buffer.text().as_bytes()
    }

    fn at(&self, i: u32) -> u8 {
        let b = self.bytes();
        if (i as usize) < b.len() { b[i as usize] } else { 0 }
    }

    fn peek(&self) -> u8 {
        self.at(self.pos)
    }

    fn peek_at(&self, delta: u32) -> u8 {
        self.at(self.pos + delta)
    }

    fn bump(&mut self) -> u8 {
        let ch = self.peek();
        self.pos += 1;
        if ch == b'\n' {
            self.line += 1;
            self.line_start = self.pos;
        }
        ch
    }

    fn column(&self, offset: u32) -> u32 {
        offset.saturating_sub(self.line_start) + 1
    }

    fn make(&self, ty: TokenType, start: u32, line: u32) -> Token {
        let text: Rc<str> = self.buffer.slice(start, self.pos).into();
        Token { ty, text, line, column: self.column(start), offset: start, buffer: self.buffer.clone() }
    }

    pub fn next_token(&mut self) -> Token {
        if self.gherkin {
            return self.next_token_gherkin();
        }
        if let Some(mode) = self.modes.last().copied() {
            if let Mode::TemplateBody { pending_delim } = mode {
                let tok = self.next_in_template(pending_delim);
                if tok.ty.is_primary() {
                    self.update_regex_flag(tok.ty);
                }
                return tok;
            }
        }
        let tok = self.scan_ordinary();
        self.after_ordinary(&tok);
        if tok.ty.is_primary() {
            self.update_regex_flag(tok.ty);
        }
        tok
    }

    fn update_regex_flag(&mut self, ty: TokenType) {
        match ty.regex_allowed_after() {
            RegexAllowed::Yes => self.regex_allowed = true,
            RegexAllowed::No => self.regex_allowed = false,
            RegexAllowed::Inherit => {}
        }
    }

    fn after_ordinary(&mut self, tok: &Token) {
        match tok.ty {
            TokenType::Backtick => self.modes.push(Mode::TemplateBody { pending_delim: false }),
            TokenType::LBrace => {
                if let Some(Mode::Interpolation { depth }) = self.modes.last_mut() {
                    *depth += 1;
                }
            }
            TokenType::RBrace => {
                if let Some(Mode::Interpolation { depth }) = self.modes.last_mut() {
                    if *depth > 0 {
                        *depth -= 1;
                    } else {
                        self.modes.pop();
                        self.modes.push(Mode::TemplateBody { pending_delim: false });
                    }
                }
            }
            _ => {}
        }
    }

    fn next_token_gherkin(&mut self) -> Token {
        if let Some(tok) = self.pending.pop() {
            return tok;
        }
        let start = self.pos;
        let line = self.line;
        if self.pos >= self.bytes().len() as u32 {
            return self.make(TokenType::Eof, start, line);
        }
        let ch = self.peek();
        if ch == b'\n' {
            self.bump();
            self.bol = true;
            return self.make(TokenType::LineTerminator, start, line);
        }
        if ch == b' ' || ch == b'\t' || ch == b'\r' {
            while matches!(self.peek(), b' ' | b'\t' | b'\r') {
                self.bump();
            }
            return self.make(TokenType::Whitespace, start, line);
        }

        // `self.pos` is the first non-whitespace character of its line.
        // Classify the whole remainder of the line at once and queue it.
        let mut line_end = self.pos;
        while line_end < self.bytes().len() as u32 && self.at(line_end) != b'\n' {
            line_end += 1;
        }
        let line_text = self.buffer.slice(self.pos, line_end);
        self.bol = false;

        let mut toks: Vec<(TokenType, u32, u32)> = Vec::new(); // (ty, start, end) offsets
        if line_text.starts_with('#') {
            toks.push((TokenType::LineComment, self.pos, line_end));
        } else if line_text.starts_with('@') {
            let mut p = self.pos;
            let bytes = self.bytes();
            while p < line_end {
                if bytes[p as usize] == b' ' || bytes[p as usize] == b'\t' {
                    let ws_start = p;
                    while p < line_end && (bytes[p as usize] == b' ' || bytes[p as usize] == b'\t') {
                        p += 1;
                    }
                    toks.push((TokenType::Whitespace, ws_start, p));
                } else {
                    let tag_start = p;
                    while p < line_end && bytes[p as usize] != b' ' && bytes[p as usize] != b'\t' {
                        p += 1;
                    }
                    toks.push((TokenType::GTag, tag_start, p));
                }
            }
        } else if let Some(kw_len) = gherkin_keyword_len(line_text, "Scenario Outline:") {
            toks.push((TokenType::GScenario, self.pos, self.pos + kw_len));
            toks.push((TokenType::GDesc, self.pos + kw_len, line_end));
        } else if let Some(kw_len) = gherkin_keyword_len(line_text, "Feature:") {
            toks.push((TokenType::GFeature, self.pos, self.pos + kw_len));
            toks.push((TokenType::GDesc, self.pos + kw_len, line_end));
        } else if let Some(kw_len) = gherkin_keyword_len(line_text, "Scenario:") {
            toks.push((TokenType::GScenario, self.pos, self.pos + kw_len));
            toks.push((TokenType::GDesc, self.pos + kw_len, line_end));
        } else if let Some(prefix) = STEP_PREFIXES.iter().find(|p| is_step_prefix(line_text, p)) {
            let kw_len = prefix.len() as u32;
            let prefix_end = self.pos + kw_len;
            toks.push((TokenType::GPrefix, self.pos, prefix_end));
            let bytes = self.bytes();
            let mut rhs_start = prefix_end;
            while rhs_start < line_end && (bytes[rhs_start as usize] == b' ' || bytes[rhs_start as usize] == b'\t') {
                rhs_start += 1;
            }
            if rhs_start > prefix_end {
                toks.push((TokenType::Whitespace, prefix_end, rhs_start));
            }
            toks.push((TokenType::GRhs, rhs_start, line_end));
        } else {
            toks.push((TokenType::GDesc, self.pos, line_end));
        }

        self.pos = line_end;
        let made: Vec<Token> = toks.into_iter().map(|(ty, s, e)| self.make_span(ty, s, e, line)).collect();
        let mut iter = made.into_iter();
        let first = iter.next().expect("gherkin line always yields at least one token");
        self.pending.extend(iter.rev());
        first
    }

    fn make_span(&self, ty: TokenType, start: u32, end: u32, line: u32) -> Token {
        let text: Rc<str> = self.buffer.slice(start, end).into();
        Token { ty, text, line, column: self.column(start), offset: start, buffer: self.buffer.clone() }
    }

    fn next_in_template(&mut self, pending_delim: bool) -> Token {
        let start = self.pos;
        let line = self.line;
        if pending_delim {
            if self.peek() == b'`' {
                self.bump();
                self.modes.pop();
                return self.make(TokenType::Backtick, start, line);
            }
            if self.peek() == b'$' && self.peek_at(1) == b'{' {
                self.bump();
                self.bump();
                self.modes.pop();
                self.modes.push(Mode::Interpolation { depth: 0 });
                return self.make(TokenType::DollarLCurly, start, line);
            }
            // Defensive: unterminated template, treat as EOF.
            return self.make(TokenType::Eof, start, line);
        }

        while self.pos < self.bytes().len() as u32 {
            if self.peek() == b'`' {
                break;
            }
            if self.peek() == b'$' && self.peek_at(1) == b'{' {
                break;
            }
            if self.peek() == b'\\' {
                self.bump();
                if self.pos < self.bytes().len() as u32 {
                    self.bump_utf8();
                }
                continue;
            }
            self.bump_utf8();
        }
        if let Some(Mode::TemplateBody { pending_delim }) = self.modes.last_mut() {
            *pending_delim = true;
        }
        self.make(TokenType::TemplateString, start, line)
    }

    /// Advance past one (possibly multi-byte) UTF-8 character.
    fn bump_utf8(&mut self) {
        let b0 = self.peek();
        let len: u32 = if b0 < 0x80 {
            1
        } else if b0 & 0xE0 == 0xC0 {
            2
        } else if b0 & 0xF0 == 0xE0 {
            3
        } else if b0 & 0xF8 == 0xF0 {
            4
        } else {
            1
        };
        for _ in 0..len {
            self.bump();
        }
    }

    fn scan_ordinary(&mut self) -> Token {
        let start = self.pos;
        let line = self.line;

        if self.pos >= self.bytes().len() as u32 {
            return self.make(TokenType::Eof, start, line);
        }

        let ch = self.peek();

        if ch == b' ' || ch == b'\t' || ch == b'\r' {
            while matches!(self.peek(), b' ' | b'\t' | b'\r') {
                self.bump();
            }
            return self.make(TokenType::Whitespace, start, line);
        }
        if ch == b'\n' {
            self.bump();
            return self.make(TokenType::LineTerminator, start, line);
        }
        if ch == b'/' && self.peek_at(1) == b'/' {
            while self.pos < self.bytes().len() as u32 && self.peek() != b'\n' {
                self.bump();
            }
            return self.make(TokenType::LineComment, start, line);
        }
        if ch == b'/' && self.peek_at(1) == b'*' {
            self.bump();
            self.bump();
            while self.pos < self.bytes().len() as u32 {
                if self.peek() == b'*' && self.peek_at(1) == b'/' {
                    self.bump();
                    self.bump();
                    break;
                }
                self.bump();
            }
            return self.make(TokenType::BlockComment, start, line);
        }
        if ch == b'"' || ch == b'\'' {
            return self.scan_string(start, line, ch);
        }
        if ch == b'`' {
            self.bump();
            return self.make(TokenType::Backtick, start, line);
        }
        if ch.is_ascii_digit() || (ch == b'.' && self.peek_at(1).is_ascii_digit()) {
            return self.scan_number(start, line);
        }
        if is_ident_start(ch) {
            return self.scan_ident(start, line);
        }
        if ch == b'/' {
            if self.regex_allowed {
                return self.scan_regex(start, line);
            }
            self.bump();
            if self.peek() == b'=' {
                self.bump();
                return self.make(TokenType::SlashEq, start, line);
            }
            return self.make(TokenType::Slash, start, line);
        }
        self.scan_punct(start, line)
    }

    fn scan_string(&mut self, start: u32, line: u32, quote: u8) -> Token {
        self.bump();
        while self.pos < self.bytes().len() as u32 && self.peek() != quote {
            if self.peek() == b'\\' {
                self.bump();
                if self.pos < self.bytes().len() as u32 {
                    self.bump();
                }
            } else {
                self.bump_utf8();
            }
        }
        if self.peek() == quote {
            self.bump();
        }
        self.make(TokenType::String, start, line)
    }

    fn scan_number(&mut self, start: u32, line: u32) -> Token {
        if self.peek() == b'0' && matches!(self.peek_at(1), b'x' | b'X' | b'o' | b'O' | b'b' | b'B') {
            self.bump();
            self.bump();
            while self.peek().is_ascii_alphanumeric() || self.peek() == b'_' {
                self.bump();
            }
            return self.make(TokenType::Number, start, line);
        }
        while self.peek().is_ascii_digit() || self.peek() == b'_' {
            self.bump();
        }
        if self.peek() == b'.' {
            self.bump();
            while self.peek().is_ascii_digit() || self.peek() == b'_' {
                self.bump();
            }
        }
        if matches!(self.peek(), b'e' | b'E') {
            self.bump();
            if matches!(self.peek(), b'+' | b'-') {
                self.bump();
            }
            while self.peek().is_ascii_digit() {
                self.bump();
            }
        }
        self.make(TokenType::Number, start, line)
    }

    fn scan_ident(&mut self, start: u32, line: u32) -> Token {
        while is_ident_continue(self.peek()) {
            self.bump();
        }
        let text = self.buffer.slice(start, self.pos);
        let ty = keyword_type(text).unwrap_or(TokenType::Ident);
        self.make(ty, start, line)
    }

    fn scan_regex(&mut self, start: u32, line: u32) -> Token {
        self.bump(); // opening /
        let mut in_class = false;
        loop {
            if self.pos >= self.bytes().len() as u32 {
                break;
            }
            match self.peek() {
                b'\\' => {
                    self.bump();
                    if self.pos < self.bytes().len() as u32 {
                        self.bump();
                    }
                }
                b'[' => {
                    in_class = true;
                    self.bump();
                }
                b']' => {
                    in_class = false;
                    self.bump();
                }
                b'/' if !in_class => {
                    self.bump();
                    break;
                }
                b'\n' => break,
                _ => {
                    self.bump();
                }
            }
        }
        while is_ident_continue(self.peek()) {
            self.bump();
        }
        self.make(TokenType::Regex, start, line)
    }

    fn scan_punct(&mut self, start: u32, line: u32) -> Token {
        let ch = self.bump();
        macro_rules! two {
            ($next:expr, $yes:expr, $no:expr) => {
                if self.peek() == $next {
                    self.bump();
                    $yes
                } else {
                    $no
                }
            };
        }
        let ty = match ch {
            b'(' => TokenType::LParen,
            b')' => TokenType::RParen,
            b'{' => TokenType::LBrace,
            b'}' => TokenType::RBrace,
            b'[' => TokenType::LBracket,
            b']' => TokenType::RBracket,
            b';' => TokenType::Semicolon,
            b',' => TokenType::Comma,
            b':' => TokenType::Colon,
            b'~' => TokenType::Tilde,
            b'.' => {
                if self.peek() == b'.' && self.peek_at(1) == b'.' {
                    self.bump();
                    self.bump();
                    TokenType::DotDotDot
                } else {
                    TokenType::Dot
                }
            }
            b'?' => {
                if self.peek() == b'.' && !self.peek_at(1).is_ascii_digit() {
                    self.bump();
                    TokenType::QuestionDot
                } else if self.peek() == b'?' {
                    self.bump();
                    two!(b'=', TokenType::QuestionQuestionEq, TokenType::QuestionQuestion)
                } else {
                    TokenType::Question
                }
            }
            b'+' => {
                if self.peek() == b'+' {
                    self.bump();
                    TokenType::PlusPlus
                } else {
                    two!(b'=', TokenType::PlusEq, TokenType::Plus)
                }
            }
            b'-' => {
                if self.peek() == b'-' {
                    self.bump();
                    TokenType::MinusMinus
                } else {
                    two!(b'=', TokenType::MinusEq, TokenType::Minus)
                }
            }
            b'*' => {
                if self.peek() == b'*' {
                    self.bump();
                    two!(b'=', TokenType::StarStarEq, TokenType::StarStar)
                } else {
                    two!(b'=', TokenType::StarEq, TokenType::Star)
                }
            }
            b'%' => two!(b'=', TokenType::PercentEq, TokenType::Percent),
            b'=' => {
                if self.peek() == b'=' {
                    self.bump();
                    two!(b'=', TokenType::EqEqEq, TokenType::EqEq)
                } else if self.peek() == b'>' {
                    self.bump();
                    TokenType::Arrow
                } else {
                    TokenType::Eq
                }
            }
            b'!' => {
                if self.peek() == b'=' {
                    self.bump();
                    two!(b'=', TokenType::BangEqEq, TokenType::BangEq)
                } else {
                    TokenType::Bang
                }
            }
            b'<' => {
                if self.peek() == b'<' {
                    self.bump();
                    two!(b'=', TokenType::LtLtEq, TokenType::LtLt)
                } else {
                    two!(b'=', TokenType::LtEq, TokenType::Lt)
                }
            }
            b'>' => {
                if self.peek() == b'>' {
                    self.bump();
                    if self.peek() == b'>' {
                        self.bump();
                        two!(b'=', TokenType::GtGtGtEq, TokenType::GtGtGt)
                    } else {
                        two!(b'=', TokenType::GtGtEq, TokenType::GtGt)
                    }
                } else {
                    two!(b'=', TokenType::GtEq, TokenType::Gt)
                }
            }
            b'&' => {
                if self.peek() == b'&' {
                    self.bump();
                    two!(b'=', TokenType::AmpAmpEq, TokenType::AmpAmp)
                } else {
                    two!(b'=', TokenType::AmpEq, TokenType::Amp)
                }
            }
            b'|' => {
                if self.peek() == b'|' {
                    self.bump();
                    two!(b'=', TokenType::PipePipeEq, TokenType::PipePipe)
                } else {
                    two!(b'=', TokenType::PipeEq, TokenType::Pipe)
                }
            }
            b'^' => two!(b'=', TokenType::CaretEq, TokenType::Caret),
            _ => {
                log::warn!("unrecognized character {:?} at offset {}", ch as char, start);
                TokenType::Invalid
            }
        };
        self.make(ty, start, line)
    }
}

/// `line` starts with exact keyword `kw` (e.g. `"Feature:"`); returns its
/// byte length if so.
fn gherkin_keyword_len(line: &str, kw: &str) -> Option<u32> {
    if line.starts_with(kw) { Some(kw.len() as u32) } else { None }
}

/// `line` starts with step-prefix word `prefix` followed by whitespace or
/// end of line (so `Given` doesn't match a description word like
/// `Givenomics`).
fn is_step_prefix(line: &str, prefix: &str) -> bool {
    line.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t'))
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch == b'$'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        let buf = Rc::new(SourceBuffer::new(src));
        Lexer::tokenize(buf)
    }

    fn primaries(src: &str) -> Vec<TokenType> {
        lex(src).into_iter().filter(|t| t.ty.is_primary()).map(|t| t.ty).collect()
    }

    #[test]
    fn round_trips_source_text() {
        let src = "  let x = 1; // comment\n/* block */ x += 2;\n";
        let toks = lex(src);
        let joined: String = toks.iter().map(|t| t.text.as_ref()).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn disambiguates_regex_vs_division() {
        let tys = primaries("const a=6; const b=3; const c=a/b/2; const re=/a\\/b/;");
        assert!(tys.contains(&TokenType::Regex));
        assert_eq!(tys.iter().filter(|t| **t == TokenType::Slash).count(), 2);
    }

    #[test]
    fn tokenizes_template_with_nested_braces() {
        let tys = primaries("`x=${ ({b:o.a}).b }`");
        assert_eq!(
            tys,
            vec![
                TokenType::Backtick,
                TokenType::TemplateString,
                TokenType::DollarLCurly,
                TokenType::LParen,
                TokenType::LBrace,
                TokenType::Ident,
                TokenType::Colon,
                TokenType::Ident,
                TokenType::Dot,
                TokenType::Ident,
                TokenType::RBrace,
                TokenType::RParen,
                TokenType::Dot,
                TokenType::Ident,
                TokenType::TemplateString,
                TokenType::Backtick,
            ]
        );
    }

    #[test]
    fn keywords_recognized() {
        let tys = primaries("let x = typeof x;");
        assert_eq!(tys[0], TokenType::Let);
        assert!(tys.contains(&TokenType::Typeof));
    }

    fn lex_gherkin(src: &str) -> Vec<Token> {
        let buf = Rc::new(SourceBuffer::new(src));
        Lexer::tokenize_gherkin(buf)
    }

    #[test]
    fn gherkin_round_trips_source_text() {
        let src = "@smoke\nFeature: Login\n  users can log in\n\n  Scenario: happy path\n    Given a user\n    When they log in\n    Then it works\n";
        let toks = lex_gherkin(src);
        let joined: String = toks.iter().map(|t| t.text.as_ref()).collect();
        assert_eq!(joined, src);
    }

    #[test]
    fn gherkin_classifies_keyword_lines() {
        let src = "Feature: Login\n  Scenario: happy path\n    Given a user\n    And something else\n";
        let toks = lex_gherkin(src);
        let primary: Vec<(TokenType, &str)> =
            toks.iter().filter(|t| t.ty.is_primary()).map(|t| (t.ty, t.text.as_ref())).collect();
        assert_eq!(primary[0], (TokenType::GFeature, "Feature:"));
        assert_eq!(primary[1], (TokenType::GDesc, " Login"));
        assert_eq!(primary[2], (TokenType::GScenario, "Scenario:"));
        assert_eq!(primary[3], (TokenType::GDesc, " happy path"));
        assert_eq!(primary[4], (TokenType::GPrefix, "Given"));
        assert_eq!(primary[5], (TokenType::GRhs, "a user"));
        assert_eq!(primary[6], (TokenType::GPrefix, "And"));
        assert_eq!(primary[7], (TokenType::GRhs, "something else"));
    }

    #[test]
    fn gherkin_splits_multiple_tags() {
        let src = "@smoke @wip\nFeature: X\n";
        let toks = lex_gherkin(src);
        let tags: Vec<&str> =
            toks.iter().filter(|t| t.ty == TokenType::GTag).map(|t| t.text.as_ref()).collect();
        assert_eq!(tags, vec!["@smoke", "@wip"]);
    }
}
