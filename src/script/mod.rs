// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Rule Scripts
//!
//! A script is an ordered list of rules, each a tree pattern paired with a
//! list of actions:
//!
//! ```text
//! { d cpostag "DT" < h :: move node d before node h; }
//! ```
//!
//! [`run_script`] applies the rules to one tree:
//!
//! * rules run in order, each to its own fixed point before the next;
//! * a rule only ever fires on *original* nodes (the nodes present when
//!   the rule started), so nodes created by `copy` are not re-matched by
//!   the rule that created them;
//! * each original node fires a given rule at most once, scanning from the
//!   root upward by current index;
//! * action errors abort the run and carry the action's script position.

pub mod lexer;
pub mod parser;

pub use lexer::{BinOp, LexError, Tok, Token, tokenize};
pub use parser::{ParseError, parse_pattern, parse_script};

use crate::action::{Action, ActionError};
use crate::pattern::Pattern;
use crate::state::TreeState;
use crate::tree::Tree;

/// Byte range and position of an AST node in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    /// 1-based line of the first token.
    pub line: usize,
    /// 1-based column of the first token.
    pub col: usize,
}

/// One `{ pattern :: actions }` rule, with its source span and text.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub actions: Vec<Action>,
    pub span: Span,
    pub text: String,
}

/// Apply a script to a tree, returning the rewritten tree.
pub fn run_script(tree: &Tree, rules: &[Rule]) -> Result<Tree, ActionError> {
    let mut state = TreeState::new(tree.clone());

    for rule in rules {
        // Snapshot the rule's "original" nodes: whatever exists right now,
        // the root included. Marks are remapped through every mutation, so
        // they keep denoting these nodes even as indices shift.
        state.unmark_all();
        for node in 0..=state.tree.len() {
            state.mark(node);
        }

        loop {
            state.backrefs.clear();

            let mut matched = None;
            for node in 0..=state.tree.len() {
                if !state.is_marked(node) {
                    continue;
                }
                if rule.pattern.matches(&state.tree, node, &mut state.backrefs) {
                    matched = Some(node);
                    break;
                }
            }
            let Some(node) = matched else {
                break;
            };

            // Once per node, even if the actions leave it in place.
            state.unmark(node);
            for action in &rule.actions {
                action.apply(&mut state)?;
            }
        }
    }

    Ok(state.tree)
}
