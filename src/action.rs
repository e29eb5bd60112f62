// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Tree Actions
//!
//! Actions are the mutation half of a rule: once a pattern has matched and
//! bound backreferences, each action resolves its names against the
//! [`TreeState`] and rewrites tree, bindings, marks, and groupings
//! together. A failing action reports which rule text it came from via its
//! recorded span.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::script::Span;
use crate::state::TreeState;
use crate::tree::{AttrKind, Side, TreeError};

/// How a backreferenced node expands into the set an action operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Just the node itself.
    Node,
    /// The node's gathered group: descendants plus explicit grouping
    /// partners, transitively.
    Group,
}

/// Replacement value for a `set` action; feats are split at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Text(String),
    Feats(Vec<String>),
}

/// Why an action failed.
#[derive(Debug, Error)]
pub enum ActionErrorKind {
    #[error("node {name:?} was not matched in the pattern")]
    UnmatchedBackref { name: String },
    #[error("can't move root")]
    CannotMoveRoot,
    #[error("can't move something before root")]
    CannotMoveBeforeRoot,
    #[error("can't delete root")]
    CannotDeleteRoot,
    #[error("can't set {attr} on root")]
    CannotSetOnRoot { attr: AttrKind },
    #[error("can't set root's head")]
    CannotSetRootHead,
    #[error("can't set head, invalid head")]
    InvalidHead,
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// An action failure, annotated with the offending action's position and
/// source text when it came from a parsed script.
#[derive(Debug)]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub span: Option<Span>,
    pub text: Option<String>,
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(span) = self.span {
            write!(f, "(at line {}, col {}) ", span.line, span.col)?;
        }
        write!(f, "{}", self.kind)?;
        if let Some(text) = &self.text {
            writeln!(f)?;
            for line in text.lines() {
                write!(f, "\n    {line}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl std::error::Error for ActionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ActionErrorKind> for ActionError {
    fn from(kind: ActionErrorKind) -> Self {
        ActionError {
            kind,
            span: None,
            text: None,
        }
    }
}

/// An action AST node with its source span and text.
#[derive(Debug, Clone)]
pub struct Action {
    pub kind: ActionKind,
    pub span: Span,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Move `what` (expanded by its selector) before/after `anchor`.
    Move {
        what: String,
        sel_what: Selector,
        anchor: String,
        sel_anchor: Selector,
        side: Side,
    },
    /// Append copies of `what` at the tail, then move them to `anchor`.
    Copy {
        what: String,
        sel_what: Selector,
        anchor: String,
        sel_anchor: Selector,
        side: Side,
    },
    /// Delete `what`; orphans re-attach to the nearest surviving ancestor.
    Delete { what: String, sel_what: Selector },
    /// Overwrite one attribute of the node bound to `node`.
    SetAttr {
        node: String,
        attr: AttrKind,
        value: AttrValue,
    },
    /// Re-parent `node` under `head`. When not `strict`, an impossible
    /// head is silently ignored.
    SetHead {
        node: String,
        head: String,
        strict: bool,
    },
    /// Group two bound nodes together for future gathers.
    Group { a: String, b: String },
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Action {
            kind,
            span: Span::default(),
            text: String::new(),
        }
    }

    /// Apply the action, annotating any failure with this action's
    /// position in the script.
    pub fn apply(&self, state: &mut TreeState) -> Result<(), ActionError> {
        self.kind.apply(state).map_err(|kind| ActionError {
            kind,
            span: Some(self.span),
            text: (!self.text.is_empty()).then(|| self.text.clone()),
        })
    }
}

impl ActionKind {
    pub fn apply(&self, state: &mut TreeState) -> Result<(), ActionErrorKind> {
        match self {
            ActionKind::Move {
                what,
                sel_what,
                anchor,
                sel_anchor,
                side,
            } => {
                let what = resolve(state, what)?;
                let anchor = resolve(state, anchor)?;
                if what == 0 {
                    return Err(ActionErrorKind::CannotMoveRoot);
                }
                if *side == Side::Before && anchor == 0 {
                    return Err(ActionErrorKind::CannotMoveBeforeRoot);
                }
                let moved = gather(state, what, *sel_what);
                move_with_anchor(state, moved, anchor, *sel_anchor, *side)
            }

            ActionKind::Copy {
                what,
                sel_what,
                anchor,
                sel_anchor,
                side,
            } => {
                let what = resolve(state, what)?;
                let anchor = resolve(state, anchor)?;
                if what == 0 {
                    return Err(ActionErrorKind::CannotMoveRoot);
                }
                if *side == Side::Before && anchor == 0 {
                    return Err(ActionErrorKind::CannotMoveBeforeRoot);
                }
                let copied = gather(state, what, *sel_what);
                state.tree.append_copy(&copied)?;

                // The fresh copies sit at the tail; move them as a block.
                let new_len = state.tree.len();
                let moved: Vec<usize> = (new_len - copied.len() + 1..=new_len).collect();
                move_with_anchor(state, moved, anchor, *sel_anchor, *side)
            }

            ActionKind::Delete { what, sel_what } => {
                let what = resolve(state, what)?;
                let nodes = gather(state, what, *sel_what);
                if nodes.contains(&0) {
                    return Err(ActionErrorKind::CannotDeleteRoot);
                }
                state.delete(&nodes)?;
                Ok(())
            }

            ActionKind::SetAttr { node, attr, value } => {
                let node = resolve(state, node)?;
                if node == 0 {
                    return Err(ActionErrorKind::CannotSetOnRoot { attr: *attr });
                }
                match value {
                    AttrValue::Text(text) => state.tree.set_attr(node, *attr, text),
                    AttrValue::Feats(feats) => state.tree.set_feats(node, feats.clone()),
                }
                Ok(())
            }

            ActionKind::SetHead { node, head, strict } => {
                let node = resolve(state, node)?;
                let head = resolve(state, head)?;
                if node == 0 {
                    return Err(ActionErrorKind::CannotSetRootHead);
                }
                let can_set = state.tree.can_set_head(node, head);
                if *strict && !can_set {
                    return Err(ActionErrorKind::InvalidHead);
                }
                if can_set {
                    state.tree.set_head(node, head)?;
                }
                Ok(())
            }

            ActionKind::Group { a, b } => {
                let a = resolve(state, a)?;
                let b = resolve(state, b)?;
                state.group_together(a, b);
                Ok(())
            }
        }
    }
}

fn resolve(state: &TreeState, name: &str) -> Result<usize, ActionErrorKind> {
    state
        .backrefs
        .get(name)
        .copied()
        .ok_or_else(|| ActionErrorKind::UnmatchedBackref {
            name: name.to_owned(),
        })
}

fn gather(state: &TreeState, node: usize, selector: Selector) -> Vec<usize> {
    match selector {
        Selector::Node => vec![node],
        Selector::Group => state.gather_group(node),
    }
}

/// Move `moved` next to `anchor`. A group anchor resolves to the leftmost
/// (before) or rightmost (after) member of the anchor group that is not
/// itself being moved; if the moved set swallows the whole anchor group,
/// there is nowhere sensible to go and the move is a no-op.
fn move_with_anchor(
    state: &mut TreeState,
    moved: Vec<usize>,
    anchor: usize,
    sel_anchor: Selector,
    side: Side,
) -> Result<(), ActionErrorKind> {
    let mut anchor = anchor;
    if sel_anchor == Selector::Group {
        let moved_set: BTreeSet<usize> = moved.iter().copied().collect();
        let candidates: BTreeSet<usize> = state
            .gather_group(anchor)
            .into_iter()
            .filter(|node| !moved_set.contains(node))
            .collect();
        anchor = match side {
            Side::Before => match candidates.first() {
                Some(&node) => node,
                None => return Ok(()),
            },
            Side::After => match candidates.last() {
                Some(&node) => node,
                None => return Ok(()),
            },
        };
    }
    state.move_nodes(&moved, anchor, side)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::{Tree, Word};

    // 1 The -> 2, 2 cat -> 3, 3 sat -> 0, 4 down -> 3
    fn state() -> TreeState {
        TreeState::new(
            Tree::new(vec![
                Word::new("The", "DT", 2, "det"),
                Word::new("cat", "NN", 3, "nsubj"),
                Word::new("sat", "VB", 0, "root"),
                Word::new("down", "RB", 3, "advmod"),
            ])
            .unwrap(),
        )
    }

    fn forms(state: &TreeState) -> Vec<&str> {
        state.tree.words().iter().map(|w| w.form.as_str()).collect()
    }

    #[test]
    fn move_node_before_node() {
        let mut state = state();
        state.backrefs.insert("d".into(), 4);
        state.backrefs.insert("h".into(), 1);
        ActionKind::Move {
            what: "d".into(),
            sel_what: Selector::Node,
            anchor: "h".into(),
            sel_anchor: Selector::Node,
            side: Side::Before,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(forms(&state), vec!["down", "The", "cat", "sat"]);
        // Backrefs track the moved nodes.
        assert_eq!(state.backrefs.get("d"), Some(&1));
        assert_eq!(state.backrefs.get("h"), Some(&2));
    }

    #[test]
    fn move_group_moves_subtree() {
        let mut state = state();
        state.backrefs.insert("c".into(), 2);
        state.backrefs.insert("a".into(), 4);
        // Group of "cat" is {2, 1}; move it after "down".
        ActionKind::Move {
            what: "c".into(),
            sel_what: Selector::Group,
            anchor: "a".into(),
            sel_anchor: Selector::Node,
            side: Side::After,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(forms(&state), vec!["sat", "down", "The", "cat"]);
    }

    #[test]
    fn move_before_group_anchor_picks_leftmost_survivor() {
        let mut state = state();
        state.backrefs.insert("d".into(), 4);
        state.backrefs.insert("s".into(), 3);
        // Anchor group of "sat" is the whole tree; minus the moved {4}
        // its leftmost member is "The"(1).
        ActionKind::Move {
            what: "d".into(),
            sel_what: Selector::Node,
            anchor: "s".into(),
            sel_anchor: Selector::Group,
            side: Side::Before,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(forms(&state), vec!["down", "The", "cat", "sat"]);
    }

    #[test]
    fn move_onto_consumed_group_anchor_is_noop() {
        let mut state = state();
        state.backrefs.insert("c".into(), 2);
        // Anchor group of "The" is {1}; moving group {2, 1} consumes it.
        state.backrefs.insert("t".into(), 1);
        let before = forms(&state).join(" ");
        ActionKind::Move {
            what: "c".into(),
            sel_what: Selector::Group,
            anchor: "t".into(),
            sel_anchor: Selector::Group,
            side: Side::After,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(forms(&state).join(" "), before);
    }

    #[test]
    fn move_root_is_refused() {
        let mut state = state();
        state.backrefs.insert("r".into(), 0);
        state.backrefs.insert("h".into(), 1);
        let err = ActionKind::Move {
            what: "r".into(),
            sel_what: Selector::Node,
            anchor: "h".into(),
            sel_anchor: Selector::Node,
            side: Side::After,
        }
        .apply(&mut state)
        .unwrap_err();
        assert!(matches!(err, ActionErrorKind::CannotMoveRoot));
    }

    #[test]
    fn move_before_root_is_refused() {
        let mut state = state();
        state.backrefs.insert("d".into(), 4);
        state.backrefs.insert("r".into(), 0);
        let err = ActionKind::Move {
            what: "d".into(),
            sel_what: Selector::Node,
            anchor: "r".into(),
            sel_anchor: Selector::Node,
            side: Side::Before,
        }
        .apply(&mut state)
        .unwrap_err();
        assert!(matches!(err, ActionErrorKind::CannotMoveBeforeRoot));
    }

    #[test]
    fn copy_appends_then_moves() {
        let mut state = state();
        state.backrefs.insert("c".into(), 2);
        state.backrefs.insert("s".into(), 3);
        // Copy group {2, 1} after "sat".
        ActionKind::Copy {
            what: "c".into(),
            sel_what: Selector::Group,
            anchor: "s".into(),
            sel_anchor: Selector::Node,
            side: Side::After,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(
            forms(&state),
            vec!["The", "cat", "sat", "The", "cat", "down"]
        );
        // Copied "The" hangs off the copied "cat", which kept "sat".
        assert_eq!(state.tree.head(4), 5);
        assert_eq!(state.tree.head(5), 3);
    }

    #[test]
    fn delete_group_removes_subtree() {
        let mut state = state();
        state.backrefs.insert("c".into(), 2);
        ActionKind::Delete {
            what: "c".into(),
            sel_what: Selector::Group,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(forms(&state), vec!["sat", "down"]);
    }

    #[test]
    fn delete_root_group_is_refused() {
        let mut state = state();
        state.backrefs.insert("r".into(), 0);
        let err = ActionKind::Delete {
            what: "r".into(),
            sel_what: Selector::Group,
        }
        .apply(&mut state)
        .unwrap_err();
        assert!(matches!(err, ActionErrorKind::CannotDeleteRoot));
    }

    #[test]
    fn set_attr_and_feats() {
        let mut state = state();
        state.backrefs.insert("x".into(), 1);
        ActionKind::SetAttr {
            node: "x".into(),
            attr: AttrKind::Deprel,
            value: AttrValue::Text("mark".into()),
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.tree.word(1).deprel, "mark");

        ActionKind::SetAttr {
            node: "x".into(),
            attr: AttrKind::Feats,
            value: AttrValue::Feats(vec!["a".into(), "b".into()]),
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.tree.word(1).feats, vec!["a", "b"]);
    }

    #[test]
    fn set_attr_on_root_is_refused() {
        let mut state = state();
        state.backrefs.insert("r".into(), 0);
        let err = ActionKind::SetAttr {
            node: "r".into(),
            attr: AttrKind::Form,
            value: AttrValue::Text("x".into()),
        }
        .apply(&mut state)
        .unwrap_err();
        assert!(matches!(
            err,
            ActionErrorKind::CannotSetOnRoot {
                attr: AttrKind::Form
            }
        ));
    }

    #[test]
    fn strict_set_head_rejects_cycle() {
        let mut state = state();
        // "cat"(2) is below "sat"(3): heading sat by cat would cycle.
        state.backrefs.insert("x".into(), 3);
        state.backrefs.insert("y".into(), 2);
        let err = ActionKind::SetHead {
            node: "x".into(),
            head: "y".into(),
            strict: true,
        }
        .apply(&mut state)
        .unwrap_err();
        assert!(matches!(err, ActionErrorKind::InvalidHead));
    }

    #[test]
    fn try_set_head_silently_skips_cycle() {
        let mut state = state();
        let before = state.tree.clone();
        state.backrefs.insert("x".into(), 3);
        state.backrefs.insert("y".into(), 2);
        ActionKind::SetHead {
            node: "x".into(),
            head: "y".into(),
            strict: false,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.tree, before);
    }

    #[test]
    fn set_head_reparents_when_legal() {
        let mut state = state();
        state.backrefs.insert("x".into(), 1);
        state.backrefs.insert("y".into(), 3);
        ActionKind::SetHead {
            node: "x".into(),
            head: "y".into(),
            strict: true,
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.tree.head(1), 3);
    }

    #[test]
    fn group_action_extends_gather() {
        let mut state = state();
        state.backrefs.insert("a".into(), 1);
        state.backrefs.insert("b".into(), 4);
        ActionKind::Group {
            a: "a".into(),
            b: "b".into(),
        }
        .apply(&mut state)
        .unwrap();
        assert_eq!(state.gather_group(1), vec![1, 4]);
    }

    #[test]
    fn unmatched_backref_reports_name() {
        let mut state = state();
        let err = ActionKind::Delete {
            what: "ghost".into(),
            sel_what: Selector::Node,
        }
        .apply(&mut state)
        .unwrap_err();
        assert!(matches!(
            err,
            ActionErrorKind::UnmatchedBackref { ref name } if name == "ghost"
        ));
    }

    #[test]
    fn action_error_renders_position_and_text() {
        let mut action = Action::new(ActionKind::Delete {
            what: "x".into(),
            sel_what: Selector::Node,
        });
        action.span = Span {
            start: 10,
            end: 23,
            line: 2,
            col: 5,
        };
        action.text = "delete node x".into();
        let mut state = state();
        let err = action.apply(&mut state).unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.starts_with("(at line 2, col 5) "));
        assert!(rendered.contains("\n    delete node x"));
    }
}
