//! Structural quote-context resolution.
//!
//! A shell word is flattened into [`Piece`]s following the syntax tree, not
//! the raw text: double/single quoted strings mark everything they enclose as
//! quoted, while command and process substitutions are opaque (the commands
//! inside are separate nodes with their own quote context, so the innermost
//! enclosing quote always decides).

use super::tree::{SyntaxNode, SyntaxTree};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece<'t> {
    /// Literal text; `node` is the leaf or the enclosing node for gaps.
    Text {
        text: &'t str,
        quoted: bool,
        node: &'t SyntaxNode,
    },
    /// `$VAR` or `${VAR...}`.
    Var {
        name: &'t str,
        text: &'t str,
        quoted: bool,
        node: &'t SyntaxNode,
    },
    /// Substitution whose output is unknown statically.
    Opaque { quoted: bool },
}

/// Flatten `node` (typically a command argument) into pieces.
pub fn flatten<'t>(tree: &'t SyntaxTree, node: &'t SyntaxNode) -> Vec<Piece<'t>> {
    let mut out = Vec::new();
    walk(tree, node, false, &mut out);
    out
}

fn walk<'t>(tree: &'t SyntaxTree, node: &'t SyntaxNode, quoted: bool, out: &mut Vec<Piece<'t>>) {
    match node.kind {
        "string" | "translated_string" => {
            let open = if node.kind == "translated_string" { 2 } else { 1 };
            let start = (node.start_byte + open).min(node.end_byte);
            let end = node.end_byte.saturating_sub(1).max(start);
            walk_children(tree, node, start, end, true, out);
        }
        "raw_string" | "ansi_c_string" => {
            let text = tree.text(node);
            let inner = text
                .trim_start_matches('$')
                .strip_prefix('\'')
                .and_then(|t| t.strip_suffix('\''))
                .unwrap_or(text);
            out.push(Piece::Text {
                text: inner,
                quoted: true,
                node,
            });
        }
        "simple_expansion" | "expansion" => {
            let name = node
                .children
                .iter()
                .find(|c| c.kind == "variable_name" || c.kind == "special_variable_name")
                .map_or("", |c| tree.text(c));
            out.push(Piece::Var {
                name,
                text: tree.text(node),
                quoted,
                node,
            });
            if node.kind == "expansion" {
                for child in &node.children {
                    nested_vars(tree, child, quoted, out);
                }
            }
        }
        "command_substitution" | "process_substitution" | "arithmetic_expansion" => {
            out.push(Piece::Opaque { quoted });
        }
        _ if node.children.is_empty() => out.push(Piece::Text {
            text: tree.text(node),
            quoted,
            node,
        }),
        _ => walk_children(tree, node, node.start_byte, node.end_byte, quoted, out),
    }
}

/// Expansions nested in an operand such as `${FOO:-${DISTDIR}}`. They follow
/// the outer expansion in quote context unless a string inside re-quotes them.
fn nested_vars<'t>(
    tree: &'t SyntaxTree,
    node: &'t SyntaxNode,
    quoted: bool,
    out: &mut Vec<Piece<'t>>,
) {
    match node.kind {
        "simple_expansion" | "expansion" => walk(tree, node, quoted, out),
        "string" | "translated_string" | "raw_string" | "ansi_c_string" => {
            for child in &node.children {
                nested_vars(tree, child, true, out);
            }
        }
        "command_substitution" | "process_substitution" | "arithmetic_expansion" => {}
        _ => {
            for child in &node.children {
                nested_vars(tree, child, quoted, out);
            }
        }
    }
}

fn walk_children<'t>(
    tree: &'t SyntaxTree,
    node: &'t SyntaxNode,
    start: usize,
    end: usize,
    quoted: bool,
    out: &mut Vec<Piece<'t>>,
) {
    let src = tree.source();
    let mut cursor = start;
    for child in &node.children {
        if child.end_byte <= start || child.start_byte >= end {
            continue;
        }
        if child.start_byte > cursor {
            push_gap(src, cursor, child.start_byte, quoted, node, out);
        }
        walk(tree, child, quoted, out);
        cursor = child.end_byte;
    }
    if cursor < end {
        push_gap(src, cursor, end, quoted, node, out);
    }
}

fn push_gap<'t>(
    src: &'t str,
    from: usize,
    to: usize,
    quoted: bool,
    node: &'t SyntaxNode,
    out: &mut Vec<Piece<'t>>,
) {
    if let Some(text) = src.get(from..to) {
        if !text.is_empty() {
            out.push(Piece::Text { text, quoted, node });
        }
    }
}

/// True when the unquoted parts of `pieces` form a glob: `*`, `?`, or a
/// `[...]` character class. Backslash-escaped characters are literal.
pub fn has_unquoted_glob(pieces: &[Piece<'_>]) -> bool {
    // Quoted text and expansions become inert placeholders so that a class
    // cannot be opened in one context and closed in another.
    let mut skeleton = String::new();
    for piece in pieces {
        match piece {
            Piece::Text {
                text,
                quoted: false,
                ..
            } => {
                let mut chars = text.chars();
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        chars.next();
                        skeleton.push('\u{1}');
                    } else {
                        skeleton.push(c);
                    }
                }
            }
            Piece::Text { .. } => skeleton.push('\u{1}'),
            Piece::Var { .. } => skeleton.push('\u{2}'),
            Piece::Opaque { .. } => skeleton.push('\u{3}'),
        }
    }
    if skeleton.contains('*') || skeleton.contains('?') {
        return true;
    }
    let mut open: Option<usize> = None;
    for (idx, c) in skeleton.char_indices() {
        match c {
            '[' if open.is_none() => open = Some(idx),
            ']' => {
                if let Some(start) = open {
                    if idx > start + 1 {
                        return true;
                    }
                }
            }
            '\u{1}' | '\u{2}' | '\u{3}' => open = None,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::tree::{BashGrammar, Grammar};
    use pretty_assertions::assert_eq;

    /// Flatten the first argument of the first command in `script`.
    fn first_arg_pieces(script: &str, f: impl FnOnce(&SyntaxTree, Vec<Piece<'_>>)) {
        let tree = BashGrammar.parse(script).unwrap();
        let cmd = tree
            .root()
            .descendants()
            .into_iter()
            .find(|n| n.kind == "command")
            .unwrap();
        let arg = cmd
            .named_children()
            .find(|c| c.kind != "command_name")
            .unwrap();
        let pieces = flatten(&tree, arg);
        f(&tree, pieces);
    }

    #[test]
    fn test_double_quoted_expansion_is_quoted() {
        first_arg_pieces("cp \"${DISTDIR}\"/foo-*.bar x\n", |_, pieces| {
            assert!(matches!(
                pieces[0],
                Piece::Var {
                    name: "DISTDIR",
                    quoted: true,
                    ..
                }
            ));
            assert!(pieces
                .iter()
                .any(|p| matches!(p, Piece::Text { text, quoted: false, .. } if text.contains('*'))));
            assert!(has_unquoted_glob(&pieces));
        });
    }

    #[test]
    fn test_fully_quoted_glob_is_literal() {
        first_arg_pieces("cp \"${DISTDIR}/foo-*.bar\" x\n", |_, pieces| {
            assert!(!has_unquoted_glob(&pieces));
        });
        first_arg_pieces("cp \"${DISTDIR}\"/'foo-*.bar' x\n", |_, pieces| {
            assert!(!has_unquoted_glob(&pieces));
        });
    }

    #[test]
    fn test_substitution_inside_string_is_opaque() {
        first_arg_pieces("echo \"$(ls ${DISTDIR}/*)\"\n", |_, pieces| {
            assert!(pieces.iter().any(|p| matches!(p, Piece::Opaque { quoted: true })));
            assert!(!pieces.iter().any(|p| matches!(p, Piece::Var { .. })));
        });
    }

    #[test]
    fn test_nested_expansion_inherits_quoting() {
        first_arg_pieces("cp \"${FOO:-${DISTDIR}}\"/*.bar x\n", |_, pieces| {
            let vars: Vec<(&str, bool)> = pieces
                .iter()
                .filter_map(|p| match p {
                    Piece::Var { name, quoted, .. } => Some((*name, *quoted)),
                    _ => None,
                })
                .collect();
            assert_eq!(vars, vec![("FOO", true), ("DISTDIR", true)]);
            assert!(has_unquoted_glob(&pieces));
        });
        first_arg_pieces("cp ${FOO:-\"${T}\"} x\n", |_, pieces| {
            assert!(pieces
                .iter()
                .any(|p| matches!(p, Piece::Var { name: "T", quoted: true, .. })));
            assert!(pieces
                .iter()
                .any(|p| matches!(p, Piece::Var { name: "FOO", quoted: false, .. })));
        });
    }

    #[test]
    fn test_escaped_star_is_literal() {
        first_arg_pieces("echo foo\\*bar\n", |_, pieces| {
            assert!(!has_unquoted_glob(&pieces));
        });
    }
}
