// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recursive-descent parser for the rule script language.
//!
//! ```text
//! script   := rule*
//! rule     := '{' pattern '::' actions '}'
//! pattern  := ID condition? | '(' pattern ')'
//! condition := and_cond ('or' and_cond)*
//! and_cond := not_cond ('and'? not_cond)*       # juxtaposition conjoins
//! not_cond := 'not'? op
//! op       := '(' condition ')' | BINOP pattern | '==' ID
//!           | attr (STRING | REGEX) | 'is_top' | 'is_leaf'
//!           | 'can_head' ID | 'can_be_headed_by' ID
//! actions  := (action (';' action)* ';'?)?
//! ```
//!
//! Every produced AST node carries the span of the tokens it came from;
//! rules and actions also keep their source text for error reporting.

use thiserror::Error;

use super::lexer::{BinOp, LexError, Tok, Token, tokenize};
use super::{Rule, Span};
use crate::action::{Action, ActionKind, AttrValue, Selector};
use crate::pattern::{Pattern, PatternKind, StrCond};
use crate::tree::{AttrKind, Side};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("(at line {line}, col {col}) unexpected token {token:?}")]
    UnexpectedToken {
        line: usize,
        col: usize,
        token: String,
    },
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("(at line {line}, col {col}) invalid regex: {source}")]
    Regex {
        line: usize,
        col: usize,
        source: regex::Error,
    },
    #[error(transparent)]
    Lex(#[from] LexError),
}

/// Parse a script: a sequence of `{ pattern :: actions }` rules.
pub fn parse_script(src: &str) -> Result<Vec<Rule>, ParseError> {
    let mut parser = Parser::new(src)?;
    let mut rules = Vec::new();
    while parser.peek().is_some() {
        rules.push(parser.rule()?);
    }
    Ok(rules)
}

/// Parse a single standalone pattern, e.g. for grep-style queries.
pub fn parse_pattern(src: &str) -> Result<Pattern, ParseError> {
    let mut parser = Parser::new(src)?;
    let pattern = parser.pattern()?;
    parser.expect_eof()?;
    Ok(pattern)
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, ParseError> {
        Ok(Parser {
            src,
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    // - Token plumbing ------------------------------------------------------

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        let token = self.tokens.get(self.pos).cloned();
        match token {
            Some(token) => {
                self.pos += 1;
                Ok(token)
            }
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<Token, ParseError> {
        if self.peek() == Some(tok) {
            self.bump()
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.peek().is_none() {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ParseError {
        match self.tokens.get(self.pos) {
            Some(token) => ParseError::UnexpectedToken {
                line: token.span.line,
                col: token.span.col,
                token: self.src[token.span.start..token.span.end].to_owned(),
            },
            None => ParseError::UnexpectedEof,
        }
    }

    /// Span from `start` through the last consumed token.
    fn close_span(&self, start: Span) -> Span {
        let end = self.tokens[self.pos - 1].span.end;
        Span {
            start: start.start,
            end,
            line: start.line,
            col: start.col,
        }
    }

    fn slice(&self, span: Span) -> String {
        self.src[span.start..span.end].to_owned()
    }

    // - Rules ---------------------------------------------------------------

    fn rule(&mut self) -> Result<Rule, ParseError> {
        let open = self.expect(&Tok::LBrace)?;
        let pattern = self.pattern()?;
        self.expect(&Tok::CommandSep)?;
        let actions = self.actions()?;
        self.expect(&Tok::RBrace)?;
        let span = self.close_span(open.span);
        Ok(Rule {
            pattern,
            actions,
            span,
            text: self.slice(span),
        })
    }

    // - Patterns ------------------------------------------------------------

    fn pattern(&mut self) -> Result<Pattern, ParseError> {
        match self.peek() {
            Some(Tok::LParen) => {
                let open = self.bump()?;
                let inner = self.pattern()?;
                self.expect(&Tok::RParen)?;
                Ok(Pattern::with_span(inner.kind, self.close_span(open.span)))
            }
            Some(Tok::Id(name)) => {
                let name = name.clone();
                let token = self.bump()?;
                let body = if self.starts_not_cond() {
                    self.condition()?
                } else {
                    Pattern::with_span(PatternKind::AlwaysTrue, token.span)
                };
                let span = self.close_span(token.span);
                let not_root = Pattern::with_span(PatternKind::NotRoot(Box::new(body)), span);
                Ok(Pattern::with_span(
                    PatternKind::SetBackref(name, Box::new(not_root)),
                    span,
                ))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Whether the upcoming token can begin a `not_cond`.
    fn starts_not_cond(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Tok::Not
                    | Tok::LParen
                    | Tok::BinOp(_)
                    | Tok::Equals
                    | Tok::Form
                    | Tok::Lemma
                    | Tok::Cpostag
                    | Tok::Postag
                    | Tok::Feats
                    | Tok::Deprel
                    | Tok::IsTop
                    | Tok::IsLeaf
                    | Tok::CanHead
                    | Tok::CanBeHeadedBy
            )
        )
    }

    fn condition(&mut self) -> Result<Pattern, ParseError> {
        let start = self.current_span();
        let mut items = vec![self.and_cond()?];
        while self.peek() == Some(&Tok::Or) {
            self.bump()?;
            items.push(self.and_cond()?);
        }
        if items.len() == 1 {
            Ok(items.swap_remove(0))
        } else {
            Ok(Pattern::with_span(
                PatternKind::Or(items),
                self.close_span(start),
            ))
        }
    }

    fn and_cond(&mut self) -> Result<Pattern, ParseError> {
        let start = self.current_span();
        let mut items = vec![self.not_cond()?];
        loop {
            if self.peek() == Some(&Tok::And) {
                self.bump()?;
            } else if !self.starts_not_cond() {
                break;
            }
            items.push(self.not_cond()?);
        }
        if items.len() == 1 {
            Ok(items.swap_remove(0))
        } else {
            Ok(Pattern::with_span(
                PatternKind::And(items),
                self.close_span(start),
            ))
        }
    }

    fn not_cond(&mut self) -> Result<Pattern, ParseError> {
        if self.peek() == Some(&Tok::Not) {
            let start = self.bump()?.span;
            let inner = self.op_cond()?;
            Ok(Pattern::with_span(
                PatternKind::Not(Box::new(inner)),
                self.close_span(start),
            ))
        } else {
            self.op_cond()
        }
    }

    fn op_cond(&mut self) -> Result<Pattern, ParseError> {
        let start = self.current_span();
        match self.peek() {
            Some(Tok::LParen) => {
                self.bump()?;
                let inner = self.condition()?;
                self.expect(&Tok::RParen)?;
                Ok(Pattern::with_span(inner.kind, self.close_span(start)))
            }
            Some(&Tok::BinOp(op)) => {
                self.bump()?;
                let sub = Box::new(self.pattern()?);
                let kind = match op {
                    BinOp::LeftChild => PatternKind::HasLeftChild(sub),
                    BinOp::RightChild => PatternKind::HasRightChild(sub),
                    BinOp::RightHead => PatternKind::HasRightHead(sub),
                    BinOp::LeftHead => PatternKind::HasLeftHead(sub),
                    BinOp::AdjacentLeftChild => PatternKind::HasAdjacentLeftChild(sub),
                    BinOp::AdjacentRightChild => PatternKind::HasAdjacentRightChild(sub),
                    BinOp::AdjacentRightHead => PatternKind::HasAdjacentRightHead(sub),
                    BinOp::AdjacentLeftHead => PatternKind::HasAdjacentLeftHead(sub),
                    BinOp::Child => PatternKind::HasChild(sub),
                    BinOp::Successor => PatternKind::HasSuccessor(sub),
                    BinOp::Head => PatternKind::HasHead(sub),
                    BinOp::Predecessor => PatternKind::HasPredecessor(sub),
                    BinOp::LeftNeighbor => PatternKind::HasLeftNeighbor(sub),
                    BinOp::RightNeighbor => PatternKind::HasRightNeighbor(sub),
                    BinOp::AdjacentLeftNeighbor => PatternKind::HasAdjacentLeftNeighbor(sub),
                    BinOp::AdjacentRightNeighbor => PatternKind::HasAdjacentRightNeighbor(sub),
                };
                Ok(Pattern::with_span(kind, self.close_span(start)))
            }
            Some(Tok::Equals) => {
                self.bump()?;
                let name = self.id()?;
                Ok(Pattern::with_span(
                    PatternKind::EqualsBackref(name),
                    self.close_span(start),
                ))
            }
            Some(
                Tok::Form | Tok::Lemma | Tok::Cpostag | Tok::Postag | Tok::Feats | Tok::Deprel,
            ) => {
                let attr = self.attr()?;
                let cond = self.str_cond()?;
                Ok(Pattern::with_span(
                    PatternKind::Attr(attr, cond),
                    self.close_span(start),
                ))
            }
            Some(Tok::IsTop) => {
                self.bump()?;
                Ok(Pattern::with_span(PatternKind::IsTop, self.close_span(start)))
            }
            Some(Tok::IsLeaf) => {
                self.bump()?;
                Ok(Pattern::with_span(PatternKind::IsLeaf, self.close_span(start)))
            }
            Some(Tok::CanHead) => {
                self.bump()?;
                let name = self.id()?;
                Ok(Pattern::with_span(
                    PatternKind::CanHead(name),
                    self.close_span(start),
                ))
            }
            Some(Tok::CanBeHeadedBy) => {
                self.bump()?;
                let name = self.id()?;
                Ok(Pattern::with_span(
                    PatternKind::CanBeHeadedBy(name),
                    self.close_span(start),
                ))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn str_cond(&mut self) -> Result<StrCond, ParseError> {
        match self.peek() {
            Some(Tok::Str(text)) => {
                let text = text.clone();
                self.bump()?;
                Ok(StrCond::Literal(text))
            }
            Some(Tok::Regex {
                body,
                ignore_case,
                anywhere,
            }) => {
                let (body, ignore_case, anywhere) = (body.clone(), *ignore_case, *anywhere);
                let token = self.bump()?;
                StrCond::regex(&body, ignore_case, anywhere).map_err(|source| {
                    ParseError::Regex {
                        line: token.span.line,
                        col: token.span.col,
                        source,
                    }
                })
            }
            _ => Err(self.unexpected()),
        }
    }

    fn attr(&mut self) -> Result<AttrKind, ParseError> {
        let kind = match self.peek() {
            Some(Tok::Form) => AttrKind::Form,
            Some(Tok::Lemma) => AttrKind::Lemma,
            Some(Tok::Cpostag) => AttrKind::Cpostag,
            Some(Tok::Postag) => AttrKind::Postag,
            Some(Tok::Feats) => AttrKind::Feats,
            Some(Tok::Deprel) => AttrKind::Deprel,
            _ => return Err(self.unexpected()),
        };
        self.bump()?;
        Ok(kind)
    }

    // - Actions -------------------------------------------------------------

    fn actions(&mut self) -> Result<Vec<Action>, ParseError> {
        let mut actions = Vec::new();
        if self.peek() == Some(&Tok::RBrace) {
            return Ok(actions);
        }
        loop {
            actions.push(self.action()?);
            if self.peek() == Some(&Tok::Semicolon) {
                self.bump()?;
                if self.peek() == Some(&Tok::RBrace) {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(actions)
    }

    fn action(&mut self) -> Result<Action, ParseError> {
        let start = self.current_span();
        let kind = match self.peek() {
            Some(Tok::Copy | Tok::Move) => {
                let is_copy = self.peek() == Some(&Tok::Copy);
                self.bump()?;
                let sel_what = self.selector()?;
                let what = self.id()?;
                let side = self.side()?;
                let sel_anchor = self.selector()?;
                let anchor = self.id()?;
                if is_copy {
                    ActionKind::Copy {
                        what,
                        sel_what,
                        anchor,
                        sel_anchor,
                        side,
                    }
                } else {
                    ActionKind::Move {
                        what,
                        sel_what,
                        anchor,
                        sel_anchor,
                        side,
                    }
                }
            }
            Some(Tok::Delete) => {
                self.bump()?;
                let sel_what = self.selector()?;
                let what = self.id()?;
                ActionKind::Delete { what, sel_what }
            }
            Some(Tok::Set) => {
                self.bump()?;
                let attr = self.attr()?;
                let node = self.id()?;
                let text = self.string()?;
                let value = if attr == AttrKind::Feats {
                    AttrValue::Feats(text.split('|').map(str::to_owned).collect())
                } else {
                    AttrValue::Text(text)
                };
                ActionKind::SetAttr { node, attr, value }
            }
            Some(Tok::SetHead | Tok::TrySetHead) => {
                let strict = self.peek() == Some(&Tok::SetHead);
                self.bump()?;
                let first = self.id()?;
                let headed_by = match self.peek() {
                    Some(Tok::Heads) => false,
                    Some(Tok::HeadedBy) => true,
                    _ => return Err(self.unexpected()),
                };
                self.bump()?;
                let second = self.id()?;
                // `x headed_by y`: x gets head y. `x heads y`: y gets head x.
                let (node, head) = if headed_by {
                    (first, second)
                } else {
                    (second, first)
                };
                ActionKind::SetHead { node, head, strict }
            }
            Some(Tok::Group) => {
                self.bump()?;
                let a = self.id()?;
                let b = self.id()?;
                ActionKind::Group { a, b }
            }
            _ => return Err(self.unexpected()),
        };
        let span = self.close_span(start);
        Ok(Action {
            kind,
            span,
            text: self.slice(span),
        })
    }

    fn selector(&mut self) -> Result<Selector, ParseError> {
        match self.peek() {
            Some(Tok::Node) => {
                self.bump()?;
                Ok(Selector::Node)
            }
            Some(Tok::Group) => {
                self.bump()?;
                Ok(Selector::Group)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn side(&mut self) -> Result<Side, ParseError> {
        match self.peek() {
            Some(Tok::Before) => {
                self.bump()?;
                Ok(Side::Before)
            }
            Some(Tok::After) => {
                self.bump()?;
                Ok(Side::After)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn id(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Tok::Id(name)) => {
                let name = name.clone();
                self.bump()?;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn string(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Tok::Str(text)) => {
                let text = text.clone();
                self.bump()?;
                Ok(text)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Span of the upcoming token (for opening a combined span), or of the
    /// last token at EOF.
    fn current_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some(token) => token.span,
            None => self.tokens.last().map(|t| t.span).unwrap_or_default(),
        }
    }
}
