//! Gherkin feature-file front end (spec §4.3): consumes the lexer's
//! Gherkin-mode token stream and builds a [`Feature`] value object — tags,
//! one `Scenario` per [`FeatureSection`], each with its ordered `Step`s. This
//! is an alternate entry point over the same [`crate::lexer::Lexer`]; it
//! shares the token/position plumbing with the JavaScript parser but never
//! touches `Value` or `Context` — the step text itself is handed to the
//! evaluator elsewhere, as plain JavaScript source.
//!
//! Like [`crate::parser`], a malformed feature file aborts the whole parse:
//! there is no partial `Feature` returned.

use std::rc::Rc;

use crate::error::{CompileError, Position};
use crate::source::SourceBuffer;
use crate::token::{Token, TokenType};

type PResult<T> = Result<T, CompileError>;

/// An `@tag` attached to a feature or a scenario, name stored without the
/// leading `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
}

/// One `Given`/`When`/`Then`/`And`/`But`/`*` line. `text` is the raw
/// remainder of the line after the prefix (and any separating whitespace),
/// trimmed — a position-preserving slice of the source, not yet parsed as
/// JavaScript; the host evaluates it as an expression when the step runs.
///
/// `keyword` is reserved for a step-level keyword distinct from its prefix
/// (see `Open Question: Gherkin token G_RHS` in the design notes); the
/// lexer never produces one today, so it is always `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub prefix: String,
    pub keyword: Option<String>,
    pub text: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scenario {
    pub tags: Vec<Tag>,
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
}

/// A `Feature:` block wraps exactly one `Scenario` today (spec §4.3); the
/// wrapper exists so a future `Scenario Outline` expansion has somewhere to
/// attach additional scenarios without changing `Feature`'s shape.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureSection {
    pub scenario: Scenario,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Feature {
    pub tags: Vec<Tag>,
    pub name: String,
    pub description: String,
    pub sections: Vec<FeatureSection>,
}

const STEP_PREFIXES: &[&str] = &["Given", "When", "Then", "And", "But", "*"];

pub fn parse_feature(buffer: Rc<SourceBuffer>) -> PResult<Feature> {
    let tokens = crate::lexer::Lexer::tokenize_gherkin(buffer);
    GherkinParser::new(tokens).parse_feature()
}

struct GherkinParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl GherkinParser {
    fn new(all_tokens: Vec<Token>) -> Self {
        // Whitespace and comments carry no Gherkin-level meaning; keep
        // everything else, including `LineTerminator`, which is how a blank
        // line (a paragraph break inside a description block) is detected.
        let tokens: Vec<Token> = all_tokens
            .into_iter()
            .filter(|t| !matches!(t.ty, TokenType::Whitespace | TokenType::LineComment | TokenType::BlockComment))
            .collect();
        GherkinParser { tokens, pos: 0 }
    }

    fn cur(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn ty(&self) -> TokenType {
        self.cur().ty
    }

    fn pos_here(&self) -> Position {
        self.cur().position()
    }

    fn advance(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        self.ty() == TokenType::Eof
    }

    /// Consume one trailing `LineTerminator`, if present (absent only at
    /// the very end of a file with no trailing newline).
    fn skip_newline(&mut self) {
        if self.ty() == TokenType::LineTerminator {
            self.advance();
        }
    }

    /// Skip blank lines (bare `LineTerminator` tokens) between meaningful
    /// lines.
    fn skip_blank_lines(&mut self) {
        while self.ty() == TokenType::LineTerminator {
            self.advance();
        }
    }

    fn expect(&mut self, ty: TokenType, what: &str) -> PResult<Token> {
        if self.ty() == ty {
            Ok(self.advance())
        } else {
            Err(CompileError::syntax(format!("expected {what}, found {:?}", self.ty()), self.pos_here()))
        }
    }

    fn parse_feature(&mut self) -> PResult<Feature> {
        self.skip_blank_lines();
        let tags = self.parse_tags()?;
        self.expect(TokenType::GFeature, "'Feature:'")?;
        let (name, description) = self.parse_name_and_description()?;
        let mut sections = Vec::new();
        self.skip_blank_lines();
        while self.ty() == TokenType::GTag || self.ty() == TokenType::GScenario {
            sections.push(self.parse_section()?);
            self.skip_blank_lines();
        }
        if !self.at_eof() {
            return Err(CompileError::syntax(
                format!("unexpected {:?} after feature body", self.ty()),
                self.pos_here(),
            ));
        }
        Ok(Feature { tags, name, description, sections })
    }

    /// Zero or more `@tag` lines, each possibly holding several
    /// space-separated tags (spec §8 scenario 8: "tagged scenario").
    fn parse_tags(&mut self) -> PResult<Vec<Tag>> {
        let mut tags = Vec::new();
        loop {
            self.skip_blank_lines();
            if self.ty() != TokenType::GTag {
                break;
            }
            while self.ty() == TokenType::GTag {
                let text = self.advance().text;
                tags.push(Tag { name: text.trim_start_matches('@').to_string() });
            }
            self.skip_newline();
        }
        Ok(tags)
    }

    /// Gathers the `GDesc` line immediately after a `Feature:`/`Scenario:`
    /// keyword plus any further contiguous description lines: "the first
    /// trimmed non-empty line is the name; the remainder, joined with
    /// newlines, is the description" (spec §4.3).
    fn parse_name_and_description(&mut self) -> PResult<(String, String)> {
        let mut lines: Vec<String> = Vec::new();
        if self.ty() == TokenType::GDesc {
            lines.push(self.advance().text.to_string());
            self.skip_newline();
        }
        loop {
            match self.ty() {
                TokenType::GDesc => {
                    lines.push(self.advance().text.to_string());
                    self.skip_newline();
                }
                TokenType::LineTerminator => {
                    // A blank line only continues the description block if
                    // a further description line follows it; otherwise it
                    // closes the block and is left for the caller.
                    let save = self.pos;
                    self.skip_blank_lines();
                    if self.ty() == TokenType::GDesc {
                        lines.push(String::new());
                    } else {
                        self.pos = save;
                        break;
                    }
                }
                _ => break,
            }
        }
        let mut name = String::new();
        let mut rest = Vec::new();
        let mut found_name = false;
        for line in lines {
            let trimmed = line.trim();
            if !found_name {
                if trimmed.is_empty() {
                    continue;
                }
                name = trimmed.to_string();
                found_name = true;
            } else {
                rest.push(trimmed.to_string());
            }
        }
        Ok((name, rest.join("\n")))
    }

    fn parse_section(&mut self) -> PResult<FeatureSection> {
        let tags = self.parse_tags()?;
        self.expect(TokenType::GScenario, "'Scenario:'")?;
        let (name, description) = self.parse_name_and_description()?;
        let steps = self.parse_steps()?;
        Ok(FeatureSection { scenario: Scenario { tags, name, description, steps } })
    }

    fn parse_steps(&mut self) -> PResult<Vec<Step>> {
        let mut steps = Vec::new();
        loop {
            self.skip_blank_lines();
            if self.ty() != TokenType::GPrefix {
                break;
            }
            let prefix_tok = self.advance();
            let prefix = prefix_tok.text.to_string();
            if !STEP_PREFIXES.contains(&prefix.as_str()) {
                return Err(CompileError::syntax(format!("unrecognized step prefix '{prefix}'"), prefix_tok.position()));
            }
            let text = if self.ty() == TokenType::GRhs {
                self.advance().text.trim().to_string()
            } else {
                String::new()
            };
            steps.push(Step { prefix, keyword: None, text, line: prefix_tok.line });
            self.skip_newline();
        }
        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Feature {
        let buf = Rc::new(SourceBuffer::new(src));
        parse_feature(buf).unwrap()
    }

    #[test]
    fn parses_tagged_feature_with_one_scenario() {
        let src = "@smoke\nFeature: Login\n  users can log in\n\n  Scenario: happy path\n    Given a user\n    When they log in\n    Then it works\n";
        let f = parse(src);
        assert_eq!(f.tags, vec![Tag { name: "smoke".into() }]);
        assert_eq!(f.name, "Login");
        assert_eq!(f.description, "users can log in");
        assert_eq!(f.sections.len(), 1);
        let scenario = &f.sections[0].scenario;
        assert_eq!(scenario.name, "happy path");
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0], Step { prefix: "Given".into(), keyword: None, text: "a user".into(), line: 6 });
        assert_eq!(scenario.steps[1].prefix, "When");
        assert_eq!(scenario.steps[2].text, "it works");
    }

    #[test]
    fn parses_multiple_tags_on_one_line() {
        let src = "@smoke @wip\nFeature: X\n  Scenario: only\n    Given a\n";
        let f = parse(src);
        assert_eq!(f.tags, vec![Tag { name: "smoke".into() }, Tag { name: "wip".into() }]);
    }

    #[test]
    fn parses_and_and_but_prefixes() {
        let src = "Feature: X\n  Scenario: only\n    Given a\n    And b\n    But not c\n    Then d\n";
        let f = parse(src);
        let steps = &f.sections[0].scenario.steps;
        assert_eq!(steps.iter().map(|s| s.prefix.as_str()).collect::<Vec<_>>(), vec!["Given", "And", "But", "Then"]);
    }

    #[test]
    fn scenario_without_description_has_empty_description() {
        let src = "Feature: X\n  Scenario: only\n    Given a\n";
        let f = parse(src);
        assert_eq!(f.sections[0].scenario.description, "");
    }

    #[test]
    fn multiple_scenarios_in_one_feature() {
        let src = "Feature: X\n  Scenario: one\n    Given a\n  Scenario: two\n    Given b\n";
        let f = parse(src);
        assert_eq!(f.sections.len(), 2);
        assert_eq!(f.sections[0].scenario.name, "one");
        assert_eq!(f.sections[1].scenario.name, "two");
    }

    #[test]
    fn missing_feature_keyword_is_a_syntax_error() {
        let buf = Rc::new(SourceBuffer::new("Scenario: oops\n  Given a\n"));
        assert!(parse_feature(buf).is_err());
    }

    #[test]
    fn scenario_tags_are_captured_separately_from_feature_tags() {
        let src = "Feature: X\n  @slow\n  Scenario: only\n    Given a\n";
        let f = parse(src);
        assert!(f.tags.is_empty());
        assert_eq!(f.sections[0].scenario.tags, vec![Tag { name: "slow".into() }]);
    }
}
