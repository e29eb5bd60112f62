// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

/*!
Weft is a query-and-rewrite engine for dependency parses in the CoNLL-X
format. You write declarative rules: a tree pattern with named
backreferences, paired with actions that move, copy, delete, re-parent, or
relabel the matched nodes. The rules run over a stream of trees.

# Example

```
use weft::{parse_script, read_trees, run_script, tree_to_conll};

let conll = "1\tHi\t_\tUH\tUH\t_\t2\tintj\t_\t_\n\
             2\t!\t_\t.\t.\t_\t0\troot\t_\t_\n\n";
let tree = read_trees(conll.as_bytes()).next().unwrap().unwrap();

// Delete punctuation; orphans re-attach to the nearest surviving head.
let rules = parse_script(r#"{ x cpostag "." :: delete node x; }"#).unwrap();
let rewritten = run_script(&tree, &rules).unwrap();

assert_eq!(
    tree_to_conll(&rewritten).unwrap(),
    "1\tHi\t_\tUH\tUH\t_\t0\tintj\t_\t_\n\n",
);
```

# Components

- [`tree`]: the validated [`Tree`] model and its mutation primitives.
- [`conll`]: the streaming CoNLL-X reader and the bit-exact writer.
- [`pattern`]: the [`Pattern`] language and matcher with backreference
  binding; [`Pattern::matches_anywhere`] is the grep-style entry point.
- [`action`]: the [`Action`] interpreter over a [`TreeState`].
- [`state`]: [`TreeState`], holding tree, backrefs, marks, and groupings,
  reindexed together through every mutation.
- [`script`]: lexer, parser, and the [`run_script`] driver.
*/

pub mod action;
pub mod conll;
pub mod pattern;
pub mod script;
pub mod state;
pub mod tree;

pub use action::{Action, ActionError, ActionErrorKind, ActionKind, AttrValue, Selector};
pub use conll::{ConllError, TreeReader, read_trees, tree_to_conll, write_tree};
pub use pattern::{Backrefs, Pattern, PatternKind, StrCond};
pub use script::{LexError, ParseError, Rule, Span, parse_pattern, parse_script, run_script};
pub use state::TreeState;
pub use tree::{AttrKind, Side, Tree, TreeError, Word};
