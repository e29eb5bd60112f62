// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Dependency Tree Model
//!
//! A [`Tree`] is a validated dependency parse: `N` word nodes numbered
//! `1..=N` plus a synthetic root node `0`. Every word has exactly one head
//! in `0..=N`, and every word transitively reaches the root; construction
//! enforces both, so any `Tree` you can hold is well-formed.
//!
//! Mutations (`reorder`, `delete`, `set_head`, `append_copy`,
//! [`move_nodes`](Tree::move_nodes)) either leave the tree in a new valid
//! state or fail without touching it. [`move_nodes`](Tree::move_nodes)
//! returns the permutation it applied so callers tracking node indices
//! (see [`TreeState`](crate::TreeState)) can remap them without re-deriving
//! it.

use std::borrow::Cow;
use std::collections::BTreeSet;

use thiserror::Error;

/// Errors from tree construction and mutation.
///
/// Mutation primitives are total-failure: on error the tree is unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A node index fell outside the valid range for the operation.
    #[error("node index {0} out of range")]
    IndexOutOfRange(usize),

    /// The slice passed to `reorder` was not a permutation of `0..N`.
    #[error("invalid reordering: {0:?}")]
    InvalidReordering(Vec<usize>),

    /// Re-parenting would make a node its own (possibly indirect) ancestor.
    #[error("future head {head} is a (possibly indirect) child of {node}")]
    WouldCreateCycle { node: usize, head: usize },

    /// Some node does not reach the root. With one head per node this is
    /// also how a head cycle manifests.
    #[error("disconnected node in tree; heads {0:?}")]
    Disconnected(Vec<usize>),
}

/// The seven CoNLL-X fields of a single word node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub form: String,
    pub lemma: String,
    pub cpostag: String,
    pub postag: String,
    pub feats: Vec<String>,
    /// Parent node index; `0` is the synthetic root.
    pub head: usize,
    pub deprel: String,
}

impl Word {
    /// Build a word from the fields that usually matter, with an empty
    /// lemma, no feats, and `postag` mirroring `cpostag`.
    pub fn new(form: &str, cpostag: &str, head: usize, deprel: &str) -> Self {
        Word {
            form: form.to_owned(),
            lemma: String::new(),
            cpostag: cpostag.to_owned(),
            postag: cpostag.to_owned(),
            feats: Vec::new(),
            head,
            deprel: deprel.to_owned(),
        }
    }
}

/// The textual attributes of a word, for typed dispatch in patterns and
/// actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Form,
    Lemma,
    Cpostag,
    Postag,
    Feats,
    Deprel,
}

impl AttrKind {
    pub const fn name(self) -> &'static str {
        match self {
            AttrKind::Form => "form",
            AttrKind::Lemma => "lemma",
            AttrKind::Cpostag => "cpostag",
            AttrKind::Postag => "postag",
            AttrKind::Feats => "feats",
            AttrKind::Deprel => "deprel",
        }
    }
}

impl std::fmt::Display for AttrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side of an anchor node moved nodes land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

/// A dependency tree with a derived child index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    words: Vec<Word>,
    /// `children[h]` lists the immediate children of `h`, ascending.
    /// Length `N + 1`; index 0 holds the top nodes.
    children: Vec<Vec<usize>>,
}

impl Tree {
    /// Construct a tree, validating head ranges and connectivity.
    pub fn new(words: Vec<Word>) -> Result<Self, TreeError> {
        let n = words.len();
        for word in &words {
            if word.head > n {
                return Err(TreeError::IndexOutOfRange(word.head));
            }
        }

        let children = index_children(&words);

        // Every word has exactly one head, so BFS from the root over the
        // child index never revisits a node; an unreachable node means a
        // disconnected (cyclic) component.
        let mut queue = vec![0usize];
        let mut i = 0;
        while i < queue.len() {
            let node = queue[i];
            i += 1;
            queue.extend_from_slice(&children[node]);
        }
        if queue.len() != n + 1 {
            let heads = words.iter().map(|w| w.head).collect();
            return Err(TreeError::Disconnected(heads));
        }

        Ok(Tree { words, children })
    }

    /// Number of word nodes (the root is not counted).
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// All words in sentence order.
    pub fn words(&self) -> &[Word] {
        &self.words
    }

    /// The word at 1-based index `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is 0 or greater than `len()`.
    pub fn word(&self, node: usize) -> &Word {
        &self.words[node - 1]
    }

    /// Head of `node`. See [`word`](Tree::word) for the index contract.
    pub fn head(&self, node: usize) -> usize {
        self.words[node - 1].head
    }

    /// Immediate children of `node`, ascending. `node` may be 0.
    pub fn children(&self, node: usize) -> &[usize] {
        &self.children[node]
    }

    /// All transitive descendants of `node` in depth-first preorder.
    /// `node` may be 0, which yields every word node.
    pub fn descendants(&self, node: usize) -> Vec<usize> {
        let mut out = Vec::new();
        self.collect_descendants(node, &mut out);
        out
    }

    fn collect_descendants(&self, node: usize, out: &mut Vec<usize>) {
        for &child in &self.children[node] {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Whether `head` may become the head of `node` without creating a
    /// cycle.
    pub fn can_set_head(&self, node: usize, head: usize) -> bool {
        head != node && !self.descendants(node).contains(&head)
    }

    /// Textual value of an attribute; feats are `|`-joined.
    pub fn attr(&self, node: usize, attr: AttrKind) -> Cow<'_, str> {
        let word = self.word(node);
        match attr {
            AttrKind::Form => Cow::Borrowed(word.form.as_str()),
            AttrKind::Lemma => Cow::Borrowed(word.lemma.as_str()),
            AttrKind::Cpostag => Cow::Borrowed(word.cpostag.as_str()),
            AttrKind::Postag => Cow::Borrowed(word.postag.as_str()),
            AttrKind::Feats => Cow::Owned(word.feats.join("|")),
            AttrKind::Deprel => Cow::Borrowed(word.deprel.as_str()),
        }
    }

    /// Set a textual attribute; a feats value is split on `|`.
    pub fn set_attr(&mut self, node: usize, attr: AttrKind, value: &str) {
        let word = &mut self.words[node - 1];
        match attr {
            AttrKind::Form => word.form = value.to_owned(),
            AttrKind::Lemma => word.lemma = value.to_owned(),
            AttrKind::Cpostag => word.cpostag = value.to_owned(),
            AttrKind::Postag => word.postag = value.to_owned(),
            AttrKind::Feats => word.feats = value.split('|').map(str::to_owned).collect(),
            AttrKind::Deprel => word.deprel = value.to_owned(),
        }
    }

    /// Replace the feature set of `node`.
    pub fn set_feats(&mut self, node: usize, feats: Vec<String>) {
        self.words[node - 1].feats = feats;
    }

    /// Reorder nodes: `perm[i]` is the new 0-based position of old 0-based
    /// node `i`. Heads are remapped along; head 0 stays 0.
    pub fn reorder(&mut self, perm: &[usize]) -> Result<(), TreeError> {
        let n = self.len();
        let mut seen = vec![false; n];
        if perm.len() != n {
            return Err(TreeError::InvalidReordering(perm.to_vec()));
        }
        for &p in perm {
            if p >= n || seen[p] {
                return Err(TreeError::InvalidReordering(perm.to_vec()));
            }
            seen[p] = true;
        }

        let old = std::mem::take(&mut self.words);
        let mut reordered: Vec<(usize, Word)> = old
            .into_iter()
            .enumerate()
            .map(|(old_index, mut word)| {
                if word.head != 0 {
                    word.head = perm[word.head - 1] + 1;
                }
                (perm[old_index], word)
            })
            .collect();
        reordered.sort_by_key(|&(new_index, _)| new_index);
        self.words = reordered.into_iter().map(|(_, word)| word).collect();
        self.children = index_children(&self.words);
        Ok(())
    }

    /// Delete the given word nodes. Each surviving orphan's head is lifted
    /// along the old head chain until it lands on a surviving ancestor
    /// (the root survives everything). Survivors are compacted in their
    /// original order.
    pub fn delete(&mut self, nodes: &[usize]) -> Result<(), TreeError> {
        let n = self.len();
        let deleted = check_word_indices(nodes, n)?;

        // Lift arcs of orphaned nodes past deleted ancestors.
        let mut alive_heads = Vec::with_capacity(n);
        for node in 1..=n {
            let mut head = self.head(node);
            while deleted.contains(&head) {
                head = self.head(head);
            }
            alive_heads.push(head);
        }

        // Compact surviving indices, keeping 0 fixed.
        let mut new_index = vec![0usize; n + 1];
        let mut next = 1;
        for node in 1..=n {
            if !deleted.contains(&node) {
                new_index[node] = next;
                next += 1;
            }
        }

        let old = std::mem::take(&mut self.words);
        self.words = old
            .into_iter()
            .enumerate()
            .filter(|&(i, _)| !deleted.contains(&(i + 1)))
            .map(|(i, mut word)| {
                word.head = new_index[alive_heads[i]];
                word
            })
            .collect();
        self.children = index_children(&self.words);
        Ok(())
    }

    /// Make `head` the head of `node`.
    pub fn set_head(&mut self, node: usize, head: usize) -> Result<(), TreeError> {
        if node == 0 || node > self.len() {
            return Err(TreeError::IndexOutOfRange(node));
        }
        if head > self.len() {
            return Err(TreeError::IndexOutOfRange(head));
        }
        if !self.can_set_head(node, head) {
            return Err(TreeError::WouldCreateCycle { node, head });
        }
        self.words[node - 1].head = head;
        self.children = index_children(&self.words);
        Ok(())
    }

    /// Append duplicates of the given nodes at the end of the tree, in
    /// ascending original order. A copy whose original head was also
    /// copied points at the corresponding copy; otherwise it keeps the
    /// original head.
    pub fn append_copy(&mut self, nodes: &[usize]) -> Result<(), TreeError> {
        let n = self.len();
        let copied = check_word_indices(nodes, n)?;

        let mut new_index = vec![0usize; n + 1];
        for (offset, &node) in copied.iter().enumerate() {
            new_index[node] = n + offset + 1;
        }

        for &node in &copied {
            let mut word = self.words[node - 1].clone();
            if copied.contains(&word.head) {
                word.head = new_index[word.head];
            }
            self.words.push(word);
        }
        self.children = index_children(&self.words);
        Ok(())
    }

    /// Move the given nodes next to each other, before or after `anchor`.
    /// Returns the permutation handed to [`reorder`](Tree::reorder) so
    /// auxiliary index maps can follow along.
    pub fn move_nodes(
        &mut self,
        nodes: &[usize],
        anchor: usize,
        side: Side,
    ) -> Result<Vec<usize>, TreeError> {
        let n = self.len();
        let what = check_word_indices(nodes, n)?;
        if anchor > n {
            return Err(TreeError::IndexOutOfRange(anchor));
        }

        let mut perm = vec![0usize; n];
        let mut next = 0;

        // Non-moved nodes strictly before the anchor.
        for node in 1..anchor {
            if what.contains(&node) {
                continue;
            }
            perm[node - 1] = next;
            next += 1;
        }

        // Anchor itself, when moving after it.
        if side == Side::After && anchor != 0 {
            perm[anchor - 1] = next;
            next += 1;
        }

        // The moved block, ascending.
        for &node in &what {
            if node != anchor {
                perm[node - 1] = next;
                next += 1;
            }
        }

        // Anchor itself, when moving before it.
        if side == Side::Before && anchor != 0 {
            perm[anchor - 1] = next;
            next += 1;
        }

        // Everything after the anchor.
        for node in (anchor + 1)..=n {
            if what.contains(&node) {
                continue;
            }
            perm[node - 1] = next;
            next += 1;
        }

        self.reorder(&perm)?;
        Ok(perm)
    }
}

fn index_children(words: &[Word]) -> Vec<Vec<usize>> {
    let mut children = vec![Vec::new(); words.len() + 1];
    for (i, word) in words.iter().enumerate() {
        children[word.head].push(i + 1);
    }
    children
}

/// Validate word-node indices, deduplicating and sorting them.
fn check_word_indices(nodes: &[usize], n: usize) -> Result<BTreeSet<usize>, TreeError> {
    for &node in nodes {
        if node == 0 || node > n {
            return Err(TreeError::IndexOutOfRange(node));
        }
    }
    Ok(nodes.iter().copied().collect())
}
