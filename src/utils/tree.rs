//! Newick parsing and the per-site tree walk used to rebuild amino-acid
//! composition and substitutions from HyPhy's ancestral `substitutions` block.

use crate::utils::error::{EtlError, Result};
use crate::utils::sequence::{is_nucleotide, translate, Tally};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TreeNode {
    pub name: String,
    pub branch_length: Option<f64>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn leaf_names(&self) -> Vec<&str> {
        if self.is_leaf() {
            return vec![self.name.as_str()];
        }
        self.children.iter().flat_map(|c| c.leaf_names()).collect()
    }
}

/// Parses a Newick string. An unnamed root is called `root`, matching the
/// node name HyPhy uses in ancestral reconstructions.
pub fn parse_newick(input: &str) -> Result<TreeNode> {
    let mut parser = NewickParser {
        chars: input.chars().collect(),
        pos: 0,
    };

    parser.skip_ws();
    let mut root = parser.parse_node()?;
    parser.skip_ws();
    if parser.peek() == Some(';') {
        parser.pos += 1;
    }
    parser.skip_ws();
    if parser.pos < parser.chars.len() {
        return Err(parser.error("trailing characters"));
    }

    if root.name.is_empty() {
        root.name = "root".to_string();
    }
    Ok(root)
}

struct NewickParser {
    chars: Vec<char>,
    pos: usize,
}

impl NewickParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_ws(&mut self) {
        while self.peek().map(char::is_whitespace).unwrap_or(false) {
            self.pos += 1;
        }
    }

    fn error(&self, what: &str) -> EtlError {
        EtlError::ProcessingError {
            message: format!("invalid Newick tree at position {}: {}", self.pos, what),
        }
    }

    fn parse_node(&mut self) -> Result<TreeNode> {
        let mut node = TreeNode::default();

        if self.peek() == Some('(') {
            self.pos += 1;
            loop {
                self.skip_ws();
                node.children.push(self.parse_node()?);
                self.skip_ws();
                match self.bump() {
                    Some(',') => continue,
                    Some(')') => break,
                    _ => return Err(self.error("expected ',' or ')'")),
                }
            }
        }

        self.skip_ws();
        node.name = self.parse_name()?;
        self.skip_annotations()?;

        if self.peek() == Some(':') {
            self.pos += 1;
            self.skip_ws();
            let start = self.pos;
            while let Some(c) = self.peek() {
                if matches!(c, ',' | ')' | ';' | '[' | '{') || c.is_whitespace() {
                    break;
                }
                self.pos += 1;
            }
            let text: String = self.chars[start..self.pos].iter().collect();
            node.branch_length = text.parse().ok();
            self.skip_annotations()?;
        }

        Ok(node)
    }

    fn parse_name(&mut self) -> Result<String> {
        let mut name = String::new();

        if let Some(quote @ ('\'' | '"')) = self.peek() {
            self.pos += 1;
            loop {
                match self.bump() {
                    Some(c) if c == quote => {
                        // doubled quote is a literal quote
                        if self.peek() == Some(quote) {
                            self.pos += 1;
                            name.push(quote);
                        } else {
                            break;
                        }
                    }
                    Some(c) => name.push(c),
                    None => return Err(self.error("unterminated quoted name")),
                }
            }
            return Ok(name);
        }

        while let Some(c) = self.peek() {
            if matches!(c, '(' | ')' | ',' | ':' | ';' | '[' | '{') || c.is_whitespace() {
                break;
            }
            name.push(c);
            self.pos += 1;
        }
        Ok(name)
    }

    fn skip_annotations(&mut self) -> Result<()> {
        loop {
            self.skip_ws();
            let close = match self.peek() {
                Some('{') => '}',
                Some('[') => ']',
                _ => return Ok(()),
            };
            while let Some(c) = self.bump() {
                if c == close {
                    break;
                }
            }
            if self.pos > self.chars.len() {
                return Err(self.error("unterminated annotation"));
            }
        }
    }
}

/// Composition and substitution counters for one site, bucketed by branch tag.
#[derive(Debug, Clone, Default)]
pub struct SiteTally {
    pub composition: Vec<(String, Tally)>,
    pub substitutions: Vec<(String, Tally)>,
}

impl SiteTally {
    pub fn composition_for(&self, tag: &str) -> Option<&Tally> {
        self.composition.iter().find(|(t, _)| t == tag).map(|(_, c)| c)
    }

    pub fn substitutions_for(&self, tag: &str) -> Option<&Tally> {
        self.substitutions.iter().find(|(t, _)| t == tag).map(|(_, c)| c)
    }

    fn bucket<'a>(buckets: &'a mut Vec<(String, Tally)>, tag: &str) -> &'a mut Tally {
        let idx = match buckets.iter().position(|(t, _)| t == tag) {
            Some(idx) => idx,
            None => {
                buckets.push((tag.to_string(), Tally::default()));
                buckets.len() - 1
            }
        };
        &mut buckets[idx].1
    }
}

/// Walks the tree for one site. `codons` maps node names to the codon HyPhy
/// reconstructed there; nodes without an entry inherit their parent's codon.
/// `tag_of` assigns a branch to a bucket; untagged branches are not counted.
pub fn tally_site<F>(tree: &TreeNode, codons: &Map<String, Value>, tag_of: F) -> SiteTally
where
    F: Fn(&str) -> Option<String>,
{
    let mut tally = SiteTally::default();
    walk(tree, None, codons, &tag_of, &mut tally);
    tally
}

fn walk<F>(
    node: &TreeNode,
    parent_codon: Option<&str>,
    codons: &Map<String, Value>,
    tag_of: &F,
    tally: &mut SiteTally,
) where
    F: Fn(&str) -> Option<String>,
{
    let own = codons.get(&node.name).and_then(Value::as_str);
    let codon = own.or(parent_codon).unwrap_or("");
    let tag = parent_codon.and_then(|_| tag_of(&node.name));

    if let (Some(codon), Some(parent), Some(tag)) = (own, parent_codon, tag.as_deref()) {
        if !parent.is_empty() && differs(parent, codon) {
            let (from, to) = (translate(parent), translate(codon));
            let pair = if from < to {
                format!("{}:{}", from, to)
            } else {
                format!("{}:{}", to, from)
            };
            SiteTally::bucket(&mut tally.substitutions, tag).increment(&pair);
        }
    }

    if node.is_leaf() {
        if let Some(tag) = tag.as_deref() {
            SiteTally::bucket(&mut tally.composition, tag).increment(translate(codon));
        }
        return;
    }

    for child in &node.children {
        walk(child, Some(codon), codons, tag_of, tally);
    }
}

/// True if at least one aligned position holds two different nucleotides.
fn differs(parent: &str, child: &str) -> bool {
    child
        .chars()
        .zip(parent.chars())
        .any(|(c, p)| is_nucleotide(c) && is_nucleotide(p) && c != p)
}
