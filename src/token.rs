//! Token types shared by the JavaScript and Gherkin lexing modes.
//!
//! `TokenType` is a closed, data-less enumeration; the three orthogonal
//! classifications the lexer needs at each position — is this token
//! "primary" (non-whitespace/comment), is it a reserved keyword, and does a
//! `/` immediately following it start a regex literal — are attached via
//! [`TokenType::is_primary`], [`TokenType::is_keyword`] and
//! [`TokenType::regex_allowed_after`] rather than folded into the variant
//! itself, so the lexer's regex/division disambiguation is one table
//! lookup instead of scattered match arms.

use std::collections::HashMap;
use std::rc::Rc;

use once_cell::sync::Lazy;

use crate::source::SourceBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegexAllowed {
    Yes,
    No,
    /// Whitespace/comments: leave the lexer's regex-allowed flag unchanged.
    Inherit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,
    Whitespace,
    LineTerminator,
    LineComment,
    BlockComment,

    Number,
    String,
    Regex,
    Ident,

    Backtick,
    TemplateString,
    DollarLCurly,

    // Keywords (closed set per the external interface)
    Null,
    True,
    False,
    Function,
    Return,
    Try,
    Catch,
    Finally,
    Throw,
    New,
    Var,
    Let,
    Const,
    If,
    Else,
    Typeof,
    Instanceof,
    Delete,
    For,
    In,
    Of,
    Do,
    While,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    This,
    Void,
    /// `class` is accepted syntactically (Non-goals: the object model
    /// stays prototype-based) but carries no inheritance semantics.
    Class,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Dot,
    DotDotDot,
    Colon,
    Question,
    QuestionDot,
    QuestionQuestion,
    Arrow,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,
    Amp,
    AmpAmp,
    Pipe,
    PipePipe,
    Caret,
    Tilde,
    Bang,
    Lt,
    Gt,
    LtEq,
    GtEq,
    EqEq,
    BangEq,
    EqEqEq,
    BangEqEq,
    LtLt,
    GtGt,
    GtGtGt,

    // Assignment
    Eq,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    LtLtEq,
    GtGtEq,
    GtGtGtEq,
    StarStarEq,
    AmpAmpEq,
    PipePipeEq,
    QuestionQuestionEq,

    PlusPlus,
    MinusMinus,

    // Gherkin-mode extras
    GTag,
    GFeature,
    GScenario,
    GPrefix,
    GDesc,
    GKeyword,
    GRhs,
    GExpr,

    /// Lexer-level recovery token for an unrecognized character; the
    /// parser turns this into a syntax error rather than panicking.
    Invalid,
}

impl TokenType {
    pub fn is_primary(self) -> bool {
        !matches!(
            self,
            TokenType::Whitespace | TokenType::LineTerminator | TokenType::LineComment | TokenType::BlockComment
        )
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenType::Null
                | TokenType::True
                | TokenType::False
                | TokenType::Function
                | TokenType::Return
                | TokenType::Try
                | TokenType::Catch
                | TokenType::Finally
                | TokenType::Throw
                | TokenType::New
                | TokenType::Var
                | TokenType::Let
                | TokenType::Const
                | TokenType::If
                | TokenType::Else
                | TokenType::Typeof
                | TokenType::Instanceof
                | TokenType::Delete
                | TokenType::For
                | TokenType::In
                | TokenType::Of
                | TokenType::Do
                | TokenType::While
                | TokenType::Switch
                | TokenType::Case
                | TokenType::Default
                | TokenType::Break
                | TokenType::Continue
                | TokenType::This
                | TokenType::Void
                | TokenType::Class
        )
    }

    /// Whether a `/` seen immediately after a token of this type should be
    /// read as the start of a regex literal.
    pub fn regex_allowed_after(self) -> RegexAllowed {
        use TokenType::*;
        match self {
            Whitespace | LineTerminator | LineComment | BlockComment => RegexAllowed::Inherit,
            Number | String | Regex | Ident | RParen | RBracket | This | TemplateString => RegexAllowed::No,
            _ => RegexAllowed::Yes,
        }
    }
}

/// A single lexed token. `text` is always the exact source slice the token
/// spans, so concatenating a token stream's text reproduces the source.
#[derive(Debug, Clone)]
pub struct Token {
    pub ty: TokenType,
    pub text: Rc<str>,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub buffer: Rc<SourceBuffer>,
}

impl Token {
    pub fn len(&self) -> u32 {
        self.text.len() as u32
    }

    pub fn end_offset(&self) -> u32 {
        self.offset + self.len()
    }

    pub fn position(&self) -> crate::error::Position {
        crate::error::Position { line: self.line, column: self.column, offset: self.offset }
    }
}

/// The closed keyword table (spec §6: "Keyword set (closed)"), built once
/// and shared across every `Lexer` instance rather than re-matched at every
/// identifier — a `match` over ~30 arms is already fast, but a lazily-built
/// static table is the idiomatic way to express "this set is closed and
/// fixed for the process," which is also what later consumers (the
/// external keyword listing) want to iterate without re-deriving.
static KEYWORDS: Lazy<HashMap<&'static str, TokenType>> = Lazy::new(|| {
    use TokenType::*;
    HashMap::from([
        ("null", Null),
        ("true", True),
        ("false", False),
        ("function", Function),
        ("return", Return),
        ("try", Try),
        ("catch", Catch),
        ("finally", Finally),
        ("throw", Throw),
        ("new", New),
        ("var", Var),
        ("let", Let),
        ("const", Const),
        ("if", If),
        ("else", Else),
        ("typeof", Typeof),
        ("instanceof", Instanceof),
        ("delete", Delete),
        ("for", For),
        ("in", In),
        ("of", Of),
        ("do", Do),
        ("while", While),
        ("switch", Switch),
        ("case", Case),
        ("default", Default),
        ("break", Break),
        ("continue", Continue),
        ("this", This),
        ("void", Void),
        ("class", Class),
    ])
});

pub fn keyword_type(ident: &str) -> Option<TokenType> {
    KEYWORDS.get(ident).copied()
}
