// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Tree Patterns
//!
//! A [`Pattern`] is a Boolean expression matched at a single node of a
//! [`Tree`]: attribute predicates, structural relations (children, heads,
//! linear neighbors, with adjacency variants), logical combinators, and
//! named backreferences that bind matched nodes for later sub-patterns and
//! for actions.
//!
//! ## The backreference contract
//!
//! Matching may consult and extend the [`Backrefs`] map, under one
//! invariant every variant upholds:
//!
//! * if the pattern does **not** match, the map is exactly as it was on
//!   entry;
//! * if it matches, it may have bound names to nodes.
//!
//! [`And`](PatternKind::And) restores a snapshot on failure,
//! [`Not`](PatternKind::Not) evaluates its child on a throwaway clone, and
//! [`SetBackref`](PatternKind::SetBackref) reinstates the previous binding
//! (or its absence) when its body fails. Matching never fails with an
//! error and never panics; a node index of 0 (the root) simply fails the
//! predicates that need a word.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use regex::Regex;

use crate::script::Span;
use crate::tree::{AttrKind, Tree};

/// Named node bindings accumulated during a match.
pub type Backrefs = HashMap<String, usize>;

/// A string predicate: exact equality or a compiled regex.
#[derive(Debug, Clone)]
pub enum StrCond {
    Literal(String),
    Regex(Regex),
}

impl StrCond {
    /// Build the regex form from a `/body/flags` literal: `i` ignores
    /// case, `g` matches anywhere instead of anchoring the whole string.
    pub fn regex(body: &str, ignore_case: bool, anywhere: bool) -> Result<Self, regex::Error> {
        Ok(StrCond::Regex(compile_regex(body, ignore_case, anywhere)?))
    }

    pub fn test(&self, text: &str) -> bool {
        match self {
            StrCond::Literal(expected) => expected == text,
            StrCond::Regex(regex) => regex.is_match(text),
        }
    }
}

/// Process-wide compiled-regex cache; `Regex` is an `Arc` wrapper, so
/// clones out of the cache are cheap.
static REGEX_CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();

/// Compile (or fetch from the cache) the regex for a pattern literal.
/// Without `anywhere` the body is wrapped in `^(?:…)$` so alternations
/// anchor as a whole.
pub fn compile_regex(
    body: &str,
    ignore_case: bool,
    anywhere: bool,
) -> Result<Regex, regex::Error> {
    let mut source = String::new();
    if ignore_case {
        source.push_str("(?i)");
    }
    if anywhere {
        source.push_str(body);
    } else {
        source.push_str("^(?:");
        source.push_str(body);
        source.push_str(")$");
    }

    let cache = REGEX_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(regex) = cache.get(source.as_str()) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(&source)?;
    cache.insert(source, regex.clone());
    Ok(regex)
}

/// A pattern AST node with its source span.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum PatternKind {
    /// Attribute predicate; fails at the root. Feats are tested against
    /// their `|`-joined form.
    Attr(AttrKind, StrCond),

    /// Matches only the root node 0.
    IsRoot,
    /// Requires a word node, then evaluates the body. The implicit wrapper
    /// of every top-level rule pattern.
    NotRoot(Box<Pattern>),
    /// A word whose head is the root.
    IsTop,
    /// A node without children (the root of an empty tree included).
    IsLeaf,

    HasLeftChild(Box<Pattern>),
    HasRightChild(Box<Pattern>),
    HasChild(Box<Pattern>),
    /// Any transitive descendant matches.
    HasSuccessor(Box<Pattern>),
    HasAdjacentLeftChild(Box<Pattern>),
    HasAdjacentRightChild(Box<Pattern>),
    HasAdjacentChild(Box<Pattern>),

    HasLeftHead(Box<Pattern>),
    HasRightHead(Box<Pattern>),
    HasHead(Box<Pattern>),
    /// Some ancestor (the root included) matches.
    HasPredecessor(Box<Pattern>),
    HasAdjacentLeftHead(Box<Pattern>),
    HasAdjacentRightHead(Box<Pattern>),
    HasAdjacentHead(Box<Pattern>),

    HasLeftNeighbor(Box<Pattern>),
    HasRightNeighbor(Box<Pattern>),
    HasAdjacentLeftNeighbor(Box<Pattern>),
    HasAdjacentRightNeighbor(Box<Pattern>),

    /// The node could head the node bound to the name without a cycle.
    CanHead(String),
    /// The node could be headed by the node bound to the name.
    CanBeHeadedBy(String),

    And(Vec<Pattern>),
    Or(Vec<Pattern>),
    Not(Box<Pattern>),
    AlwaysTrue,

    /// Bind the name to this node, then require the body.
    SetBackref(String, Box<Pattern>),
    /// The node is the one already bound to the name.
    EqualsBackref(String),
}

impl Pattern {
    pub fn new(kind: PatternKind) -> Self {
        Pattern {
            kind,
            span: Span::default(),
        }
    }

    pub fn with_span(kind: PatternKind, span: Span) -> Self {
        Pattern { kind, span }
    }

    /// Match this pattern at `node`, binding backreferences on success.
    pub fn matches(&self, tree: &Tree, node: usize, backrefs: &mut Backrefs) -> bool {
        use PatternKind::*;
        match &self.kind {
            AlwaysTrue => true,
            IsRoot => node == 0,
            NotRoot(body) => node != 0 && body.matches(tree, node, backrefs),
            IsTop => node != 0 && tree.head(node) == 0,
            IsLeaf => tree.children(node).is_empty(),

            Attr(attr, cond) => node != 0 && cond.test(&tree.attr(node, *attr)),

            HasLeftChild(c) => tree
                .children(node)
                .iter()
                .any(|&child| child < node && c.matches(tree, child, backrefs)),
            HasRightChild(c) => tree
                .children(node)
                .iter()
                .any(|&child| child > node && c.matches(tree, child, backrefs)),
            HasChild(c) => tree
                .children(node)
                .iter()
                .any(|&child| c.matches(tree, child, backrefs)),
            HasSuccessor(c) => tree
                .descendants(node)
                .iter()
                .any(|&child| c.matches(tree, child, backrefs)),
            HasAdjacentLeftChild(c) => tree
                .children(node)
                .iter()
                .any(|&child| child + 1 == node && c.matches(tree, child, backrefs)),
            HasAdjacentRightChild(c) => tree
                .children(node)
                .iter()
                .any(|&child| child == node + 1 && c.matches(tree, child, backrefs)),
            HasAdjacentChild(c) => tree.children(node).iter().any(|&child| {
                (child + 1 == node || child == node + 1) && c.matches(tree, child, backrefs)
            }),

            HasLeftHead(c) => {
                node != 0 && {
                    let head = tree.head(node);
                    head < node && c.matches(tree, head, backrefs)
                }
            }
            HasRightHead(c) => {
                node != 0 && {
                    let head = tree.head(node);
                    head > node && c.matches(tree, head, backrefs)
                }
            }
            HasHead(c) => node != 0 && c.matches(tree, tree.head(node), backrefs),
            HasPredecessor(c) => {
                if node == 0 {
                    return false;
                }
                let mut current = node;
                loop {
                    current = tree.head(current);
                    if c.matches(tree, current, backrefs) {
                        return true;
                    }
                    if current == 0 {
                        return false;
                    }
                }
            }
            HasAdjacentLeftHead(c) => {
                node != 0 && {
                    let head = tree.head(node);
                    head + 1 == node && c.matches(tree, head, backrefs)
                }
            }
            HasAdjacentRightHead(c) => {
                node != 0 && {
                    let head = tree.head(node);
                    head == node + 1 && c.matches(tree, head, backrefs)
                }
            }
            HasAdjacentHead(c) => {
                node != 0 && {
                    let head = tree.head(node);
                    (head + 1 == node || head == node + 1)
                        && c.matches(tree, head, backrefs)
                }
            }

            HasLeftNeighbor(c) => {
                node != 0 && (0..node).any(|neighbor| c.matches(tree, neighbor, backrefs))
            }
            HasRightNeighbor(c) => {
                (node + 1..=tree.len()).any(|neighbor| c.matches(tree, neighbor, backrefs))
            }
            HasAdjacentLeftNeighbor(c) => node != 0 && c.matches(tree, node - 1, backrefs),
            HasAdjacentRightNeighbor(c) => {
                node != tree.len() && c.matches(tree, node + 1, backrefs)
            }

            CanHead(name) => backrefs
                .get(name)
                .is_some_and(|&child| tree.can_set_head(child, node)),
            CanBeHeadedBy(name) => backrefs
                .get(name)
                .is_some_and(|&head| tree.can_set_head(node, head)),

            And(conditions) => {
                let saved = backrefs.clone();
                for condition in conditions {
                    if !condition.matches(tree, node, backrefs) {
                        *backrefs = saved;
                        return false;
                    }
                }
                true
            }
            Or(conditions) => conditions
                .iter()
                .any(|condition| condition.matches(tree, node, backrefs)),
            Not(condition) => {
                // A matching body may bind names, but since the negation
                // fails in that case, those bindings must never escape.
                let mut probe = backrefs.clone();
                !condition.matches(tree, node, &mut probe)
            }

            SetBackref(name, condition) => {
                let previous = backrefs.insert(name.clone(), node);
                if condition.matches(tree, node, backrefs) {
                    true
                } else {
                    match previous {
                        Some(old) => backrefs.insert(name.clone(), old),
                        None => backrefs.remove(name),
                    };
                    false
                }
            }
            EqualsBackref(name) => backrefs.get(name) == Some(&node),
        }
    }

    /// Whether any word node of the tree matches, each probed with a fresh
    /// backreference map. This is the grep-style query entry point.
    pub fn matches_anywhere(&self, tree: &Tree) -> bool {
        (1..=tree.len()).any(|node| {
            let mut backrefs = Backrefs::new();
            self.matches(tree, node, &mut backrefs)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tree::Word;

    fn p(kind: PatternKind) -> Pattern {
        Pattern::new(kind)
    }

    fn boxed(kind: PatternKind) -> Box<Pattern> {
        Box::new(Pattern::new(kind))
    }

    fn form(text: &str) -> PatternKind {
        PatternKind::Attr(AttrKind::Form, StrCond::Literal(text.to_owned()))
    }

    // 1 The -> 2, 2 cat -> 3, 3 sat -> 0, 4 down -> 3
    fn tree() -> Tree {
        Tree::new(vec![
            Word::new("The", "DT", 2, "det"),
            Word::new("cat", "NN", 3, "nsubj"),
            Word::new("sat", "VB", 0, "root"),
            Word::new("down", "RB", 3, "advmod"),
        ])
        .unwrap()
    }

    fn matches(pattern: &Pattern, node: usize) -> bool {
        pattern.matches(&tree(), node, &mut Backrefs::new())
    }

    #[test]
    fn attr_literal_and_root_guard() {
        let pattern = p(form("cat"));
        assert!(matches(&pattern, 2));
        assert!(!matches(&pattern, 1));
        assert!(!matches(&pattern, 0));
    }

    #[test]
    fn attr_regex_flags() {
        let anchored = p(PatternKind::Attr(
            AttrKind::Form,
            StrCond::regex("ca", false, false).unwrap(),
        ));
        assert!(!matches(&anchored, 2));

        let anywhere = p(PatternKind::Attr(
            AttrKind::Form,
            StrCond::regex("ca", false, true).unwrap(),
        ));
        assert!(matches(&anywhere, 2));

        let case = p(PatternKind::Attr(
            AttrKind::Form,
            StrCond::regex("CAT", true, false).unwrap(),
        ));
        assert!(matches(&case, 2));
    }

    #[test]
    fn anchored_alternation_is_whole_string() {
        let cond = StrCond::regex("a|bc", false, false).unwrap();
        assert!(cond.test("a"));
        assert!(cond.test("bc"));
        assert!(!cond.test("ax"));
        assert!(!cond.test("xbc"));
    }

    #[test]
    fn regex_cache_reuses_compilations() {
        let first = compile_regex("cache_me_[0-9]+", false, false).unwrap();
        let second = compile_regex("cache_me_[0-9]+", false, false).unwrap();
        assert_eq!(first.as_str(), second.as_str());
    }

    #[test]
    fn structural_children() {
        // "sat" has left child "cat" and right child "down".
        assert!(matches(&p(PatternKind::HasLeftChild(boxed(form("cat")))), 3));
        assert!(!matches(&p(PatternKind::HasLeftChild(boxed(form("down")))), 3));
        assert!(matches(&p(PatternKind::HasRightChild(boxed(form("down")))), 3));
        assert!(matches(&p(PatternKind::HasChild(boxed(form("down")))), 3));
        // Successor reaches grandchildren.
        assert!(matches(&p(PatternKind::HasSuccessor(boxed(form("The")))), 3));
        assert!(!matches(&p(PatternKind::HasChild(boxed(form("The")))), 3));
    }

    #[test]
    fn adjacency_variants() {
        // "cat"(2) is adjacent-left child of "sat"(3).
        assert!(matches(
            &p(PatternKind::HasAdjacentLeftChild(boxed(form("cat")))),
            3
        ));
        assert!(!matches(
            &p(PatternKind::HasAdjacentLeftChild(boxed(form("The")))),
            3
        ));
        // "down"(4) is adjacent-right child of "sat"(3).
        assert!(matches(
            &p(PatternKind::HasAdjacentRightChild(boxed(form("down")))),
            3
        ));
        assert!(matches(
            &p(PatternKind::HasAdjacentChild(boxed(form("down")))),
            3
        ));
    }

    #[test]
    fn head_relations() {
        // "cat"(2) has right head "sat"(3), adjacent.
        assert!(matches(&p(PatternKind::HasHead(boxed(form("sat")))), 2));
        assert!(matches(&p(PatternKind::HasRightHead(boxed(form("sat")))), 2));
        assert!(!matches(&p(PatternKind::HasLeftHead(boxed(form("sat")))), 2));
        assert!(matches(
            &p(PatternKind::HasAdjacentRightHead(boxed(form("sat")))),
            2
        ));
        // "down"(4) has left head "sat"(3), adjacent.
        assert!(matches(
            &p(PatternKind::HasAdjacentLeftHead(boxed(form("sat")))),
            4
        ));
        // Head predicates fail at the root.
        assert!(!matches(&p(PatternKind::HasHead(boxed(PatternKind::AlwaysTrue))), 0));
    }

    #[test]
    fn predecessor_walks_to_root() {
        let pattern = p(PatternKind::HasPredecessor(boxed(form("sat"))));
        assert!(matches(&pattern, 1));
        let root = p(PatternKind::HasPredecessor(boxed(PatternKind::IsRoot)));
        assert!(matches(&root, 1));
        assert!(matches(&root, 3));
        assert!(!matches(&root, 0));
    }

    #[test]
    fn neighbors() {
        assert!(matches(&p(PatternKind::HasLeftNeighbor(boxed(form("The")))), 3));
        assert!(!matches(&p(PatternKind::HasLeftNeighbor(boxed(form("down")))), 3));
        assert!(matches(&p(PatternKind::HasRightNeighbor(boxed(form("down")))), 1));
        assert!(matches(
            &p(PatternKind::HasAdjacentLeftNeighbor(boxed(form("cat")))),
            3
        ));
        assert!(matches(
            &p(PatternKind::HasAdjacentRightNeighbor(boxed(form("down")))),
            3
        ));
        // No right neighbor at the last node.
        assert!(!matches(
            &p(PatternKind::HasAdjacentRightNeighbor(boxed(
                PatternKind::AlwaysTrue
            ))),
            4
        ));
    }

    #[test]
    fn is_top_and_is_leaf() {
        assert!(matches(&p(PatternKind::IsTop), 3));
        assert!(!matches(&p(PatternKind::IsTop), 2));
        assert!(!matches(&p(PatternKind::IsTop), 0));
        assert!(matches(&p(PatternKind::IsLeaf), 1));
        assert!(!matches(&p(PatternKind::IsLeaf), 3));
    }

    #[test]
    fn can_head_respects_cycles() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        backrefs.insert("x".into(), 3);

        // Node 1 may head "sat"? No: 1 is a descendant of 3.
        let can = p(PatternKind::CanHead("x".into()));
        assert!(!can.matches(&tree, 1, &mut backrefs));
        assert!(!can.matches(&tree, 3, &mut backrefs));

        backrefs.insert("x".into(), 1);
        assert!(can.matches(&tree, 4, &mut backrefs));

        // Unbound name matches nothing.
        let unbound = p(PatternKind::CanHead("missing".into()));
        assert!(!unbound.matches(&tree, 4, &mut backrefs));
    }

    #[test]
    fn can_be_headed_by() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        backrefs.insert("h".into(), 3);
        let pattern = p(PatternKind::CanBeHeadedBy("h".into()));
        assert!(pattern.matches(&tree, 1, &mut backrefs));
        // "sat" cannot be headed by itself.
        assert!(!pattern.matches(&tree, 3, &mut backrefs));
    }

    #[test]
    fn set_backref_binds_on_success() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        let pattern = p(PatternKind::SetBackref(
            "n".into(),
            boxed(PatternKind::AlwaysTrue),
        ));
        assert!(pattern.matches(&tree, 2, &mut backrefs));
        assert_eq!(backrefs.get("n"), Some(&2));
    }

    #[test]
    fn set_backref_restores_previous_binding_on_failure() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        backrefs.insert("n".into(), 4);
        let pattern = p(PatternKind::SetBackref("n".into(), boxed(form("never"))));
        assert!(!pattern.matches(&tree, 2, &mut backrefs));
        assert_eq!(backrefs.get("n"), Some(&4));
    }

    #[test]
    fn set_backref_removes_fresh_binding_on_failure() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        let pattern = p(PatternKind::SetBackref("n".into(), boxed(form("never"))));
        assert!(!pattern.matches(&tree, 2, &mut backrefs));
        assert!(!backrefs.contains_key("n"));
    }

    #[test]
    fn and_rolls_back_partial_bindings() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        backrefs.insert("kept".into(), 1);
        // First conjunct binds, second fails: the binding must vanish.
        let pattern = p(PatternKind::And(vec![
            p(PatternKind::SetBackref(
                "bound".into(),
                boxed(PatternKind::AlwaysTrue),
            )),
            p(form("never")),
        ]));
        assert!(!pattern.matches(&tree, 2, &mut backrefs));
        assert!(!backrefs.contains_key("bound"));
        assert_eq!(backrefs.get("kept"), Some(&1));
    }

    #[test]
    fn not_never_mutates_the_map() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        let pattern = p(PatternKind::Not(boxed(PatternKind::SetBackref(
            "leak".into(),
            boxed(PatternKind::AlwaysTrue),
        ))));
        // Body matches and binds, so the negation fails; either way the
        // caller's map stays clean.
        assert!(!pattern.matches(&tree, 2, &mut backrefs));
        assert!(backrefs.is_empty());

        let double = p(PatternKind::Not(boxed(PatternKind::Not(boxed(
            PatternKind::SetBackref("leak".into(), boxed(PatternKind::AlwaysTrue)),
        )))));
        assert!(double.matches(&tree, 2, &mut backrefs));
        assert!(backrefs.is_empty());
    }

    #[test]
    fn or_takes_first_success() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        let pattern = p(PatternKind::Or(vec![
            p(form("never")),
            p(PatternKind::SetBackref("n".into(), boxed(PatternKind::AlwaysTrue))),
        ]));
        assert!(pattern.matches(&tree, 2, &mut backrefs));
        assert_eq!(backrefs.get("n"), Some(&2));
    }

    #[test]
    fn equals_backref() {
        let tree = tree();
        let mut backrefs = Backrefs::new();
        backrefs.insert("x".into(), 2);
        let pattern = p(PatternKind::EqualsBackref("x".into()));
        assert!(pattern.matches(&tree, 2, &mut backrefs));
        assert!(!pattern.matches(&tree, 3, &mut backrefs));
    }

    #[test]
    fn matches_anywhere_probes_word_nodes() {
        let pattern = p(PatternKind::SetBackref("x".into(), boxed(form("down"))));
        assert!(pattern.matches_anywhere(&tree()));
        let missing = p(form("dog"));
        assert!(!missing.matches_anywhere(&tree()));
    }

    #[test]
    fn feats_match_joined_text() {
        let mut tree = tree();
        tree.set_feats(2, vec!["Num=Sg".into(), "Def=Def".into()]);
        let pattern = p(PatternKind::Attr(
            AttrKind::Feats,
            StrCond::Literal("Num=Sg|Def=Def".into()),
        ));
        let mut backrefs = Backrefs::new();
        assert!(pattern.matches(&tree, 2, &mut backrefs));
    }
}
