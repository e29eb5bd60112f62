// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # TreeState
//!
//! Joint owner of a [`Tree`] and the bookkeeping that indexes into it:
//! the backreference map, per-node marks, and the explicit grouping
//! relation. Node indices shift whenever the tree is reordered or loses
//! nodes, so every mutation goes through [`TreeState::move_nodes`] or
//! [`TreeState::delete`], which remap all three maps in the same step.
//! If `x` is bound to node 12 and node 12 becomes node 1, `x` is bound to
//! node 1 afterwards, never to a stale index.

use std::collections::{BTreeSet, HashMap};

use bit_set::BitSet;

use crate::pattern::Backrefs;
use crate::tree::{Side, Tree, TreeError};

/// A tree plus backreferences, marks, and groupings, kept in sync.
#[derive(Debug, Clone)]
pub struct TreeState {
    pub tree: Tree,
    pub backrefs: Backrefs,
    marked: BitSet,
    grouped: HashMap<usize, BTreeSet<usize>>,
}

impl TreeState {
    pub fn new(tree: Tree) -> Self {
        TreeState {
            tree,
            backrefs: Backrefs::new(),
            marked: BitSet::new(),
            grouped: HashMap::new(),
        }
    }

    // - Joint mutations -----------------------------------------------------

    /// Move nodes in the tree and remap backrefs, marks, and groupings by
    /// the applied permutation.
    pub fn move_nodes(
        &mut self,
        nodes: &[usize],
        anchor: usize,
        side: Side,
    ) -> Result<(), TreeError> {
        let perm = self.tree.move_nodes(nodes, anchor, side)?;
        let remap = |node: usize| if node == 0 { 0 } else { perm[node - 1] + 1 };

        self.backrefs.values_mut().for_each(|node| *node = remap(*node));

        let marked = self.marked.iter().map(remap).collect();
        self.marked = marked;

        let grouped = self
            .grouped
            .drain()
            .map(|(node, partners)| (remap(node), partners.iter().map(|&p| remap(p)).collect()))
            .collect();
        self.grouped = grouped;
        Ok(())
    }

    /// Delete nodes from the tree; bindings, marks, and groupings of the
    /// deleted nodes are dropped and surviving indices compacted.
    pub fn delete(&mut self, nodes: &[usize]) -> Result<(), TreeError> {
        let n = self.tree.len();
        let deleted: BTreeSet<usize> = nodes.iter().copied().collect();
        self.tree.delete(nodes)?;

        // Survivors, compacted in original order; 0 stays 0.
        let mut new_index = vec![0usize; n + 1];
        let mut next = 1;
        for node in 1..=n {
            if !deleted.contains(&node) {
                new_index[node] = next;
                next += 1;
            }
        }

        self.backrefs.retain(|_, node| !deleted.contains(node));
        self.backrefs
            .values_mut()
            .for_each(|node| *node = new_index[*node]);

        let marked = self
            .marked
            .iter()
            .filter(|node| !deleted.contains(node))
            .map(|node| new_index[node])
            .collect();
        self.marked = marked;

        let grouped = self
            .grouped
            .drain()
            .filter(|(node, _)| !deleted.contains(node))
            .map(|(node, partners)| {
                let partners = partners
                    .iter()
                    .filter(|&&p| !deleted.contains(&p))
                    .map(|&p| new_index[p])
                    .collect();
                (new_index[node], partners)
            })
            .collect();
        self.grouped = grouped;
        Ok(())
    }

    // - Marks ---------------------------------------------------------------

    pub fn mark(&mut self, node: usize) {
        self.marked.insert(node);
    }

    pub fn unmark(&mut self, node: usize) {
        self.marked.remove(node);
    }

    pub fn unmark_all(&mut self) {
        self.marked.clear();
    }

    pub fn is_marked(&self, node: usize) -> bool {
        self.marked.contains(node)
    }

    // - Grouping ------------------------------------------------------------

    /// Symmetrically group two nodes: each will be gathered with the
    /// other's group from now on, regardless of head relations.
    pub fn group_together(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.grouped.entry(a).or_default().insert(b);
        self.grouped.entry(b).or_default().insert(a);
    }

    /// The group of `node`: BFS closure over children and explicit
    /// grouping partners, each node visited once. The seed comes first.
    pub fn gather_group(&self, node: usize) -> Vec<usize> {
        let mut group = vec![node];
        let mut seen = BTreeSet::from([node]);
        let mut i = 0;
        while i < group.len() {
            let current = group[i];
            i += 1;
            for &child in self.tree.children(current) {
                if seen.insert(child) {
                    group.push(child);
                }
            }
            if let Some(partners) = self.grouped.get(&current) {
                for &partner in partners {
                    if seen.insert(partner) {
                        group.push(partner);
                    }
                }
            }
        }
        group
    }
}
