//! Owned syntax trees built from the tree-sitter bash grammar.

use std::cell::RefCell;
use std::fmt;
use tree_sitter::{Node, Parser, TreeCursor};

#[derive(Debug, Clone, PartialEq, Eq)]
/// A node of a parsed script. Read-only once built.
pub struct SyntaxNode {
    pub kind: &'static str,
    /// Grammar field this node fills in its parent (`name`, `argument`, ...).
    pub field: Option<&'static str>,
    pub named: bool,
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based line of the first byte.
    pub line: usize,
    /// 1-based column (in bytes) of the first byte.
    pub column: usize,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn named_children(&self) -> impl Iterator<Item = &SyntaxNode> {
        self.children.iter().filter(|c| c.named)
    }

    pub fn child_by_field(&self, field: &str) -> Option<&SyntaxNode> {
        self.children.iter().find(|c| c.field == Some(field))
    }

    /// Pre-order iterator over this node and all descendants.
    pub fn descendants(&self) -> Vec<&SyntaxNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }
}

#[derive(Debug, Clone)]
/// A parsed script together with the source it was parsed from.
pub struct SyntaxTree {
    source: String,
    root: SyntaxNode,
}

impl SyntaxTree {
    pub fn new(source: String, root: SyntaxNode) -> Self {
        Self { source, root }
    }

    pub fn root(&self) -> &SyntaxNode {
        &self.root
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn text(&self, node: &SyntaxNode) -> &str {
        self.source.get(node.start_byte..node.end_byte).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// The grammar could not produce an error-free tree.
pub struct ParseFailure {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}, column {})", self.message, self.line, self.column)
    }
}

/// Turns script text into a syntax tree.
pub trait Grammar: Send + Sync {
    fn parse(&self, text: &str) -> Result<SyntaxTree, ParseFailure>;
}

thread_local! {
    static BASH_PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

#[derive(Debug, Default, Clone, Copy)]
/// tree-sitter-bash backed grammar; one parser per worker thread.
pub struct BashGrammar;

impl Grammar for BashGrammar {
    fn parse(&self, text: &str) -> Result<SyntaxTree, ParseFailure> {
        BASH_PARSER.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                let mut parser = Parser::new();
                parser
                    .set_language(&tree_sitter_bash::LANGUAGE.into())
                    .map_err(|e| ParseFailure {
                        message: format!("failed to load bash grammar: {e}"),
                        line: 1,
                        column: 1,
                    })?;
                *slot = Some(parser);
            }
            let parser = slot.as_mut().ok_or_else(|| ParseFailure {
                message: "bash parser unavailable".into(),
                line: 1,
                column: 1,
            })?;
            let tree = parser.parse(text, None).ok_or_else(|| ParseFailure {
                message: "parser returned no tree".into(),
                line: 1,
                column: 1,
            })?;
            let root = tree.root_node();
            if root.has_error() {
                return Err(first_error(root));
            }
            let mut cursor = root.walk();
            let node = convert(&mut cursor);
            Ok(SyntaxTree::new(text.to_string(), node))
        })
    }
}

fn convert(cursor: &mut TreeCursor<'_>) -> SyntaxNode {
    let node = cursor.node();
    let field = cursor.field_name();
    let mut children = Vec::new();
    if cursor.goto_first_child() {
        loop {
            children.push(convert(cursor));
            if !cursor.goto_next_sibling() {
                break;
            }
        }
        cursor.goto_parent();
    }
    let pos = node.start_position();
    SyntaxNode {
        kind: node.kind(),
        field,
        named: node.is_named(),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        line: pos.row + 1,
        column: pos.column + 1,
        children,
    }
}

fn first_error(root: Node<'_>) -> ParseFailure {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let pos = node.start_position();
            let message = if node.is_missing() {
                format!("missing {}", node.kind())
            } else {
                "syntax error".to_string()
            };
            return ParseFailure {
                message,
                line: pos.row + 1,
                column: pos.column + 1,
            };
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev().filter(|c| c.has_error()));
    }
    let pos = root.start_position();
    ParseFailure {
        message: "syntax error".into(),
        line: pos.row + 1,
        column: pos.column + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_builds_owned_tree() {
        let tree = BashGrammar.parse("cp \"${DISTDIR}\"/foo.tar \"${T}\"\n").unwrap();
        let root = tree.root();
        assert_eq!(root.kind, "program");
        let cmd = root
            .descendants()
            .into_iter()
            .find(|n| n.kind == "command")
            .unwrap();
        let name = cmd.child_by_field("name").unwrap();
        assert_eq!(tree.text(name), "cp");
        assert_eq!(cmd.line, 1);
        assert_eq!(cmd.column, 1);
    }

    #[test]
    fn test_parse_failure_is_reported() {
        let err = BashGrammar.parse("src_install() {\n\tif true; then\n}\n").unwrap_err();
        assert!(err.line >= 1);
    }
}
