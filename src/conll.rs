// SPDX-FileCopyrightText: 2025 Knitli Inc. <knitli@knit.li>
// SPDX-FileContributor: Adam Poulemanos <adam@knit.li>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # CoNLL-X Codec
//!
//! Reads and writes the line-oriented CoNLL-X dependency format: one
//! 10-column tab-separated record per word, a blank line after each tree.
//! [`read_trees`] yields each tree (or the error that ruined it) as it is
//! completed; [`write_tree`] validates fields and serializes bit-exactly.
//!
//! Columns 0–7 are id, form, lemma, cpostag, postag, feats, head, deprel;
//! columns 8 and 9 are ignored on read and written as `_`. A literal `_`
//! decodes to an empty lemma / empty feature list.

use std::io::{BufRead, Write};

use thiserror::Error;

use crate::tree::{Tree, Word};

#[derive(Debug, Error)]
pub enum ConllError {
    /// A malformed input line, or a record set that does not form a tree.
    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// A tree field that cannot be encoded in CoNLL-X.
    #[error("invalid {name}: {value:?}")]
    InvalidField { name: &'static str, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Whether a field value can live in a CoNLL file: no whitespace, not the
/// reserved `_`, and non-empty unless the field is optional.
fn valid_field(text: &str, empty_allowed: bool) -> bool {
    if text.contains([' ', '\t', '\n']) {
        return false;
    }
    if text == "_" {
        return false;
    }
    if !empty_allowed && text.is_empty() {
        return false;
    }
    true
}

/// Iterate over the trees in a CoNLL-X stream.
pub fn read_trees<R: BufRead>(reader: R) -> TreeReader<R> {
    TreeReader {
        reader,
        line_no: 0,
        words: Vec::new(),
        skipping: false,
        done: false,
    }
}

/// Streaming CoNLL-X reader.
///
/// Yields `Ok(Tree)` per blank-line-terminated record block (the final
/// blank line is optional at EOF). A malformed line yields one `Err` with
/// its 1-based line number; the rest of that tree is skipped and iteration
/// resumes at the next blank line.
pub struct TreeReader<R> {
    reader: R,
    line_no: usize,
    words: Vec<Word>,
    skipping: bool,
    done: bool,
}

impl<R: BufRead> TreeReader<R> {
    fn finish_tree(&mut self) -> Result<Tree, ConllError> {
        let words = std::mem::take(&mut self.words);
        Tree::new(words).map_err(|e| ConllError::Parse {
            line: self.line_no,
            reason: e.to_string(),
        })
    }

    fn push_word(&mut self, line: &str) -> Result<(), ConllError> {
        let line_no = self.line_no;
        let fail = |reason: String| ConllError::Parse { line: line_no, reason };

        let parts: Vec<&str> = line.split('\t').collect();
        if parts.len() != 10 {
            return Err(fail(format!(
                "expected 10 tab-separated fields, got {}",
                parts.len()
            )));
        }

        let id = (self.words.len() + 1).to_string();
        if parts[0] != id {
            return Err(fail(format!(
                "field 0: expected {:?}, got {:?}",
                id, parts[0]
            )));
        }
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(fail(format!("field {i}: empty")));
            }
        }

        if !valid_field(parts[1], false) {
            return Err(fail(format!("field 1: invalid FORM {:?}", parts[1])));
        }
        let lemma = if parts[2] == "_" {
            String::new()
        } else {
            if !valid_field(parts[2], true) {
                return Err(fail(format!("field 2: invalid LEMMA {:?}", parts[2])));
            }
            parts[2].to_owned()
        };
        if !valid_field(parts[3], false) {
            return Err(fail(format!("field 3: invalid CPOSTAG {:?}", parts[3])));
        }
        if !valid_field(parts[4], false) {
            return Err(fail(format!("field 4: invalid POSTAG {:?}", parts[4])));
        }
        let feats: Vec<String> = if parts[5] == "_" {
            Vec::new()
        } else {
            let feats: Vec<String> = parts[5].split('|').map(str::to_owned).collect();
            if feats.iter().any(|f| !valid_field(f, false)) {
                return Err(fail(format!("field 5: invalid FEATS {:?}", parts[5])));
            }
            feats
        };
        let head: usize = parts[6]
            .parse()
            .map_err(|_| fail(format!("field 6: invalid HEAD {:?}", parts[6])))?;
        if !valid_field(parts[7], false) {
            return Err(fail(format!("field 7: invalid DEPREL {:?}", parts[7])));
        }

        self.words.push(Word {
            form: parts[1].to_owned(),
            lemma,
            cpostag: parts[3].to_owned(),
            postag: parts[4].to_owned(),
            feats,
            head,
            deprel: parts[7].to_owned(),
        });
        Ok(())
    }
}

impl<R: BufRead> Iterator for TreeReader<R> {
    type Item = Result<Tree, ConllError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e.into()));
                }
                Ok(0) => {
                    self.done = true;
                    if self.skipping || self.words.is_empty() {
                        return None;
                    }
                    return Some(self.finish_tree());
                }
                Ok(_) => {}
            }
            self.line_no += 1;
            let text = line.strip_suffix('\n').unwrap_or(&line);

            if text.is_empty() {
                self.skipping = false;
                if !self.words.is_empty() {
                    return Some(self.finish_tree());
                }
                continue;
            }
            if self.skipping {
                continue;
            }
            if let Err(e) = self.push_word(text) {
                self.words.clear();
                self.skipping = true;
                return Some(Err(e));
            }
        }
    }
}

/// Serialize one tree, terminated by a blank line.
pub fn write_tree<W: Write>(writer: &mut W, tree: &Tree) -> Result<(), ConllError> {
    for (i, word) in tree.words().iter().enumerate() {
        if !valid_field(&word.form, false) {
            return Err(ConllError::InvalidField {
                name: "FORM",
                value: word.form.clone(),
            });
        }
        if !valid_field(&word.lemma, true) {
            return Err(ConllError::InvalidField {
                name: "LEMMA",
                value: word.lemma.clone(),
            });
        }
        if !valid_field(&word.cpostag, false) {
            return Err(ConllError::InvalidField {
                name: "CPOSTAG",
                value: word.cpostag.clone(),
            });
        }
        if !valid_field(&word.postag, false) {
            return Err(ConllError::InvalidField {
                name: "POSTAG",
                value: word.postag.clone(),
            });
        }
        if word.feats.iter().any(|f| !valid_field(f, false)) {
            return Err(ConllError::InvalidField {
                name: "FEATS",
                value: word.feats.join("|"),
            });
        }
        if !valid_field(&word.deprel, false) {
            return Err(ConllError::InvalidField {
                name: "DEPREL",
                value: word.deprel.clone(),
            });
        }

        let lemma: &str = if word.lemma.is_empty() { "_" } else { &word.lemma };
        let feats = if word.feats.is_empty() {
            "_".to_owned()
        } else {
            word.feats.join("|")
        };
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t_\t_",
            i + 1,
            word.form,
            lemma,
            word.cpostag,
            word.postag,
            feats,
            word.head,
            word.deprel
        )?;
    }
    writeln!(writer)?;
    Ok(())
}

/// Serialize one tree to a `String`.
pub fn tree_to_conll(tree: &Tree) -> Result<String, ConllError> {
    let mut out = Vec::new();
    write_tree(&mut out, tree)?;
    // write_tree only emits UTF-8.
    Ok(String::from_utf8_lossy(&out).into_owned())
}
