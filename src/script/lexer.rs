// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Script lexer: identifiers and keywords, quoted strings (no escapes),
//! `/body/ig` regex literals, the structural-relation operators, `==`,
//! `::`, braces, parens, semicolons, and `#`-to-end-of-line comments.
//! Spaces are skipped; any other stray character (tabs included) is a
//! [`LexError`]. Every token carries its [`Span`].

use thiserror::Error;

use super::Span;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("(at line {line}, col {col}) invalid character {ch:?}")]
pub struct LexError {
    pub line: usize,
    pub col: usize,
    pub ch: char,
}

/// Structural binary operators, `.`-side marking the dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `.<--`
    LeftChild,
    /// `-->.`
    RightChild,
    /// `<--.`
    RightHead,
    /// `.-->`
    LeftHead,
    /// `.<-`
    AdjacentLeftChild,
    /// `->.`
    AdjacentRightChild,
    /// `<-.`
    AdjacentRightHead,
    /// `.->`
    AdjacentLeftHead,
    /// `>`
    Child,
    /// `>>`
    Successor,
    /// `<`
    Head,
    /// `<<`
    Predecessor,
    /// `$--`
    LeftNeighbor,
    /// `$++`
    RightNeighbor,
    /// `$-`
    AdjacentLeftNeighbor,
    /// `$+`
    AdjacentRightNeighbor,
}

/// Longest first, so the lexer can take the first prefix match.
const BINARY_OPS: &[(&str, BinOp)] = &[
    (".<--", BinOp::LeftChild),
    ("-->.", BinOp::RightChild),
    ("<--.", BinOp::RightHead),
    (".-->", BinOp::LeftHead),
    (".<-", BinOp::AdjacentLeftChild),
    ("->.", BinOp::AdjacentRightChild),
    ("<-.", BinOp::AdjacentRightHead),
    (".->", BinOp::AdjacentLeftHead),
    ("$--", BinOp::LeftNeighbor),
    ("$++", BinOp::RightNeighbor),
    (">>", BinOp::Successor),
    ("<<", BinOp::Predecessor),
    ("$-", BinOp::AdjacentLeftNeighbor),
    ("$+", BinOp::AdjacentRightNeighbor),
    (">", BinOp::Child),
    ("<", BinOp::Head),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Id(String),
    Str(String),
    Regex {
        body: String,
        ignore_case: bool,
        anywhere: bool,
    },
    BinOp(BinOp),
    Equals,
    CommandSep,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Semicolon,

    // Keywords.
    And,
    Or,
    Not,
    IsTop,
    IsLeaf,
    Form,
    Lemma,
    Cpostag,
    Postag,
    Feats,
    Deprel,
    CanHead,
    CanBeHeadedBy,
    Copy,
    Move,
    Delete,
    Node,
    Group,
    Before,
    After,
    Set,
    SetHead,
    TrySetHead,
    Heads,
    HeadedBy,
}

fn keyword(ident: &str) -> Option<Tok> {
    Some(match ident {
        "and" => Tok::And,
        "or" => Tok::Or,
        "not" => Tok::Not,
        "is_top" => Tok::IsTop,
        "is_leaf" => Tok::IsLeaf,
        "form" => Tok::Form,
        "lemma" => Tok::Lemma,
        "cpostag" => Tok::Cpostag,
        "postag" => Tok::Postag,
        "feats" => Tok::Feats,
        "deprel" => Tok::Deprel,
        "can_head" => Tok::CanHead,
        "can_be_headed_by" => Tok::CanBeHeadedBy,
        "copy" => Tok::Copy,
        "move" => Tok::Move,
        "delete" => Tok::Delete,
        "node" => Tok::Node,
        "group" => Tok::Group,
        "before" => Tok::Before,
        "after" => Tok::After,
        "set" => Tok::Set,
        "set_head" => Tok::SetHead,
        "try_set_head" => Tok::TrySetHead,
        "heads" => Tok::Heads,
        "headed_by" => Tok::HeadedBy,
        _ => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

/// Tokenize a whole script or pattern.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
        line_start: 0,
    };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

impl Lexer<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn col_at(&self, pos: usize) -> usize {
        pos - self.line_start + 1
    }

    fn error_at(&self, pos: usize, line: usize, col: usize) -> LexError {
        let ch = self.src[pos..].chars().next().unwrap_or('\u{FFFD}');
        LexError { line, col, ch }
    }

    fn newline(&mut self) {
        self.line += 1;
        self.line_start = self.pos;
    }

    fn next_token(&mut self) -> Result<Option<Token>, LexError> {
        // Skip spaces, newlines, and comments.
        loop {
            match self.peek() {
                None => return Ok(None),
                Some(b' ') => self.pos += 1,
                Some(b'\n') => {
                    self.pos += 1;
                    self.newline();
                }
                Some(b'#') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                Some(_) => break,
            }
        }

        let start = self.pos;
        let line = self.line;
        let col = self.col_at(start);
        let emit = |lexer: &Lexer<'_>, tok: Tok| {
            Ok(Some(Token {
                tok,
                span: Span {
                    start,
                    end: lexer.pos,
                    line,
                    col,
                },
            }))
        };

        match self.bytes[start] {
            b'(' => {
                self.pos += 1;
                emit(self, Tok::LParen)
            }
            b')' => {
                self.pos += 1;
                emit(self, Tok::RParen)
            }
            b'{' => {
                self.pos += 1;
                emit(self, Tok::LBrace)
            }
            b'}' => {
                self.pos += 1;
                emit(self, Tok::RBrace)
            }
            b';' => {
                self.pos += 1;
                emit(self, Tok::Semicolon)
            }
            b':' => {
                if self.bytes.get(start + 1) == Some(&b':') {
                    self.pos += 2;
                    emit(self, Tok::CommandSep)
                } else {
                    Err(self.error_at(start, line, col))
                }
            }
            b'=' => {
                if self.bytes.get(start + 1) == Some(&b'=') {
                    self.pos += 2;
                    emit(self, Tok::Equals)
                } else {
                    Err(self.error_at(start, line, col))
                }
            }
            c if c == b'_' || c.is_ascii_alphabetic() => {
                self.pos += 1;
                while self
                    .peek()
                    .is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric())
                {
                    self.pos += 1;
                }
                let ident = &self.src[start..self.pos];
                let tok = keyword(ident).unwrap_or_else(|| Tok::Id(ident.to_owned()));
                emit(self, tok)
            }
            quote @ (b'"' | b'\'') => {
                self.pos += 1;
                while let Some(c) = self.peek() {
                    if c == quote {
                        break;
                    }
                    self.pos += 1;
                    if c == b'\n' {
                        self.newline();
                    }
                }
                if self.peek().is_none() {
                    return Err(self.error_at(start, line, col));
                }
                let body = self.src[start + 1..self.pos].to_owned();
                self.pos += 1;
                emit(self, Tok::Str(body))
            }
            b'/' => {
                self.pos += 1;
                while let Some(c) = self.peek() {
                    if c == b'/' {
                        break;
                    }
                    self.pos += 1;
                    if c == b'\n' {
                        self.newline();
                    }
                }
                if self.peek().is_none() {
                    return Err(self.error_at(start, line, col));
                }
                let body = self.src[start + 1..self.pos].to_owned();
                self.pos += 1;
                let mut ignore_case = false;
                let mut anywhere = false;
                while let Some(flag) = self.peek() {
                    match flag {
                        b'i' => ignore_case = true,
                        b'g' => anywhere = true,
                        _ => break,
                    }
                    self.pos += 1;
                }
                emit(
                    self,
                    Tok::Regex {
                        body,
                        ignore_case,
                        anywhere,
                    },
                )
            }
            _ => {
                for &(text, op) in BINARY_OPS {
                    if self.src[start..].starts_with(text) {
                        self.pos += text.len();
                        return emit(self, Tok::BinOp(op));
                    }
                }
                Err(self.error_at(start, line, col))
            }
        }
    }
}
