//! Newick tree parsing and writing.
//!
//! The parser is a single-pass, stack-based scanner over the input bytes.
//! It supports quoted labels (single quotes, doubled to escape) and skips
//! square-bracket comments. The writer quotes labels containing Newick
//! metacharacters and trims trailing zeros from branch lengths.

use crate::tree::{Node, NodeId, PhyloTree};
use filix_core::{FilixError, Result};

/// Parses a Newick string into a [`PhyloTree`].
pub fn parse(input: &str) -> Result<PhyloTree> {
    Parser::new(input).run()
}

/// Serializes a tree to a Newick string, terminated by `;`.
pub fn write(tree: &PhyloTree) -> String {
    let mut buf = String::new();
    write_subtree(tree, tree.root(), &mut buf);
    buf.push(';');
    buf
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    nodes: Vec<Node>,
    /// Stack of internal nodes whose closing `)` has not been seen yet.
    open: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            input: input.as_bytes(),
            pos: 0,
            nodes: Vec::new(),
            open: Vec::new(),
        }
    }

    fn run(mut self) -> Result<PhyloTree> {
        // The node most recently completed at the current nesting level; a
        // label or branch length applies to it.
        let mut last: Option<NodeId> = None;
        loop {
            self.skip_layout()?;
            let byte = match self.peek() {
                Some(b) => b,
                None => {
                    return Err(FilixError::Parse(
                        "expected ';' at end of Newick string".into(),
                    ))
                }
            };
            match byte {
                b'(' => {
                    if last.is_some() {
                        return Err(FilixError::Parse(format!(
                            "unexpected '(' at byte {}",
                            self.pos
                        )));
                    }
                    self.pos += 1;
                    let id = self.alloc_child()?;
                    self.open.push(id);
                }
                b',' => {
                    self.pos += 1;
                    if self.open.is_empty() {
                        return Err(FilixError::Parse(format!(
                            "unexpected ',' at byte {}",
                            self.pos - 1
                        )));
                    }
                    if last.is_none() {
                        self.alloc_child()?;
                    }
                    last = None;
                }
                b')' => {
                    self.pos += 1;
                    if last.is_none() && !self.open.is_empty() {
                        self.alloc_child()?;
                    }
                    last = match self.open.pop() {
                        Some(id) => Some(id),
                        None => {
                            return Err(FilixError::Parse(format!(
                                "unbalanced ')' at byte {}",
                                self.pos - 1
                            )))
                        }
                    };
                }
                b';' => {
                    if !self.open.is_empty() {
                        return Err(FilixError::Parse(
                            "unbalanced '(' in Newick string".into(),
                        ));
                    }
                    if self.nodes.is_empty() {
                        return Err(FilixError::Parse("empty Newick string".into()));
                    }
                    return PhyloTree::from_nodes(self.nodes, 0);
                }
                _ => {
                    let id = match last {
                        Some(id) => id,
                        None => self.alloc_child()?,
                    };
                    self.read_label(id)?;
                    last = Some(id);
                }
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Skips whitespace and `[...]` comments.
    fn skip_layout(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'[') => {
                    let start = self.pos;
                    while let Some(b) = self.peek() {
                        self.pos += 1;
                        if b == b']' {
                            break;
                        }
                    }
                    if self.input.get(self.pos - 1) != Some(&b']') {
                        return Err(FilixError::Parse(format!(
                            "unterminated comment starting at byte {}",
                            start
                        )));
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    /// Allocates an unnamed node attached under the innermost open node, or
    /// as the root when the tree is still empty.
    fn alloc_child(&mut self) -> Result<NodeId> {
        let parent = self.open.last().copied();
        if parent.is_none() && !self.nodes.is_empty() {
            return Err(FilixError::Parse(format!(
                "unexpected content after complete tree at byte {}",
                self.pos
            )));
        }
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent,
            children: Vec::new(),
            branch_length: None,
            name: None,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        Ok(id)
    }

    /// Reads an optional label and optional `:length` onto node `id`.
    fn read_label(&mut self, id: NodeId) -> Result<()> {
        if self.nodes[id].name.is_some() || self.nodes[id].branch_length.is_some() {
            return Err(FilixError::Parse(format!(
                "unexpected input at byte {}",
                self.pos
            )));
        }
        let start = self.pos;
        let name = if self.peek() == Some(b'\'') {
            self.read_quoted()?
        } else {
            self.read_bare()
        };
        if !name.is_empty() {
            self.nodes[id].name = Some(name);
        }
        self.skip_layout()?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_layout()?;
            let text = self.read_number();
            let length: f64 = text.parse().map_err(|_| {
                FilixError::Parse(format!("invalid branch length: '{}'", text))
            })?;
            self.nodes[id].branch_length = Some(length);
        }
        if self.pos == start {
            return Err(FilixError::Parse(format!(
                "unexpected character '{}' at byte {}",
                self.input[self.pos] as char, self.pos
            )));
        }
        Ok(())
    }

    /// Reads a quoted label; a doubled quote inside is an escaped quote.
    fn read_quoted(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(FilixError::Parse(format!(
                        "unterminated quoted label starting at byte {}",
                        start
                    )))
                }
                Some(b'\'') => {
                    if self.input.get(self.pos + 1) == Some(&b'\'') {
                        bytes.push(b'\'');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        return Ok(String::from_utf8_lossy(&bytes).into_owned());
                    }
                }
                Some(b) => {
                    bytes.push(b);
                    self.pos += 1;
                }
            }
        }
    }

    /// Reads an unquoted label, stopping at Newick metacharacters.
    fn read_bare(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace()
                || matches!(b, b'(' | b')' | b',' | b':' | b';' | b'[' | b']' | b'\'')
            {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_number(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }
}

fn write_subtree(tree: &PhyloTree, id: NodeId, buf: &mut String) {
    let node = match tree.get_node(id) {
        Some(n) => n,
        None => return,
    };
    if !node.children.is_empty() {
        buf.push('(');
        for (i, &child) in node.children.iter().enumerate() {
            if i > 0 {
                buf.push(',');
            }
            write_subtree(tree, child, buf);
        }
        buf.push(')');
    }
    if let Some(name) = &node.name {
        write_name(name, buf);
    }
    if let Some(length) = node.branch_length {
        buf.push(':');
        let formatted = format!("{:.10}", length);
        let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
        buf.push_str(trimmed);
    }
}

fn write_name(name: &str, buf: &mut String) {
    let needs_quoting = name.is_empty()
        || name.bytes().any(|b| {
            b.is_ascii_whitespace()
                || matches!(b, b'(' | b')' | b',' | b':' | b';' | b'[' | b']' | b'\'')
        });
    if needs_quoting {
        buf.push('\'');
        for ch in name.chars() {
            if ch == '\'' {
                buf.push_str("''");
            } else {
                buf.push(ch);
            }
        }
        buf.push('\'');
    } else {
        buf.push_str(name);
    }
}
