//! Tree-pattern detectors for embedded scripts.
//!
//! Every detector is stateless: findings depend only on the node handed to
//! it and the read-only tree, never on other detectors.

use super::quoting::{flatten, has_unquoted_glob, Piece};
use super::tree::{SyntaxNode, SyntaxTree};
use crate::models::Severity;

/// Variables whose expansion points into the distfiles directory.
pub const SENSITIVE_VARS: &[&str] = &["DISTDIR", "PORTAGE_ACTUAL_DISTDIR"];

/// Path-like variables that must be quoted when used as arguments.
pub const PATH_VARS: &[&str] = &[
    "D", "DISTDIR", "ED", "EPREFIX", "EROOT", "ESYSROOT", "FILESDIR", "HOME", "ROOT", "S",
    "SYSROOT", "T", "TMPDIR", "WORKDIR", "BROOT",
];

/// Install-root variables that are followed by an absolute path.
pub const ROOT_VARS: &[&str] = &["D", "ED", "ROOT", "EROOT", "BROOT", "SYSROOT", "ESYSROOT"];

/// Commands banned starting at a given EAPI.
const BANNED_COMMANDS: &[(&str, u32)] = &[
    ("dohtml", 7),
    ("dolib", 7),
    ("libopts", 7),
    ("einstall", 6),
    ("dosed", 4),
    ("dohard", 4),
];

pub mod kinds {
    pub const UNSAFE_GLOB: &str = "UnsafeGlob";
    pub const UNQUOTED_VARIABLE: &str = "UnquotedVariable";
    pub const MISSING_SLASH: &str = "MissingSlash";
    pub const UNNECESSARY_SLASH_STRIP: &str = "UnnecessarySlashStrip";
    pub const BANNED_COMMAND: &str = "BannedCommand";
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One match anchored to the triggering node's start.
pub struct Finding {
    pub kind: &'static str,
    pub severity: Severity,
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl Finding {
    fn at(kind: &'static str, severity: Severity, node: &SyntaxNode, message: String) -> Self {
        Self {
            kind,
            severity,
            message,
            line: node.line,
            column: node.column,
        }
    }
}

/// Read-only facts about the script being analyzed.
pub struct ScriptEnv<'a> {
    pub tree: &'a SyntaxTree,
    /// Numeric EAPI, `None` when unknown.
    pub eapi: Option<u32>,
}

pub trait Detector: Send + Sync {
    fn kind(&self) -> &'static str;
    /// Node kinds this detector is invoked on.
    fn interests(&self) -> &'static [&'static str];
    fn inspect(&self, node: &SyntaxNode, env: &ScriptEnv<'_>, out: &mut Vec<Finding>);
}

fn command_name<'t>(tree: &'t SyntaxTree, cmd: &'t SyntaxNode) -> Option<&'t str> {
    cmd.children
        .iter()
        .find(|c| c.kind == "command_name")
        .map(|c| tree.text(c))
}

/// Arguments of a `command` node: named children after the command name,
/// excluding redirects and comments.
pub fn command_args(cmd: &SyntaxNode) -> impl Iterator<Item = &SyntaxNode> {
    cmd.named_children()
        .skip_while(|c| c.kind != "command_name")
        .skip(1)
        .filter(|c| !c.kind.ends_with("redirect") && c.kind != "comment")
}

/// Words a glob would expand in: command arguments, `for` loop values and
/// array elements.
fn glob_operands(node: &SyntaxNode) -> Vec<&SyntaxNode> {
    match node.kind {
        "command" => command_args(node).collect(),
        "for_statement" => node
            .children
            .iter()
            .filter(|c| c.field == Some("value"))
            .collect(),
        "array" => node.named_children().filter(|c| c.kind != "comment").collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Default)]
pub struct UnsafeGlob;

impl Detector for UnsafeGlob {
    fn kind(&self) -> &'static str {
        kinds::UNSAFE_GLOB
    }

    fn interests(&self) -> &'static [&'static str] {
        &["command", "for_statement", "array"]
    }

    fn inspect(&self, node: &SyntaxNode, env: &ScriptEnv<'_>, out: &mut Vec<Finding>) {
        for arg in glob_operands(node) {
            let pieces = flatten(env.tree, arg);
            let sensitive = pieces.iter().find_map(|p| match p {
                Piece::Var { name, .. } if SENSITIVE_VARS.contains(name) => Some(*name),
                _ => None,
            });
            let Some(var) = sensitive else { continue };
            if has_unquoted_glob(&pieces) {
                out.push(Finding::at(
                    self.kind(),
                    Severity::Warning,
                    arg,
                    format!("unquoted glob combined with ${{{var}}}: {}", env.tree.text(arg)),
                ));
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct UnquotedVariable;

impl Detector for UnquotedVariable {
    fn kind(&self) -> &'static str {
        kinds::UNQUOTED_VARIABLE
    }

    fn interests(&self) -> &'static [&'static str] {
        &["command"]
    }

    fn inspect(&self, node: &SyntaxNode, env: &ScriptEnv<'_>, out: &mut Vec<Finding>) {
        for arg in command_args(node) {
            for piece in flatten(env.tree, arg) {
                if let Piece::Var {
                    name,
                    quoted: false,
                    node: var,
                    ..
                } = piece
                {
                    if PATH_VARS.contains(&name) {
                        out.push(Finding::at(
                            self.kind(),
                            Severity::Warning,
                            var,
                            format!("unquoted path variable ${{{name}}}"),
                        ));
                    }
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MissingSlash;

impl Detector for MissingSlash {
    fn kind(&self) -> &'static str {
        kinds::MISSING_SLASH
    }

    fn interests(&self) -> &'static [&'static str] {
        &["command"]
    }

    fn inspect(&self, node: &SyntaxNode, env: &ScriptEnv<'_>, out: &mut Vec<Finding>) {
        for arg in command_args(node) {
            let pieces = flatten(env.tree, arg);
            for pair in pieces.windows(2) {
                let (
                    Piece::Var {
                        name,
                        text: var_text,
                        node: var,
                        ..
                    },
                    Piece::Text { text, .. },
                ) = (&pair[0], &pair[1])
                else {
                    continue;
                };
                // `${D%/}` and friends are a different pattern
                if !ROOT_VARS.contains(name) || var_text.contains('%') {
                    continue;
                }
                // only a path component glued to the variable counts
                let glued = text
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'));
                if glued {
                    out.push(Finding::at(
                        self.kind(),
                        Severity::Warning,
                        var,
                        format!("${{{name}}} missing trailing slash before {text:?}"),
                    ));
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct UnnecessarySlashStrip;

impl Detector for UnnecessarySlashStrip {
    fn kind(&self) -> &'static str {
        kinds::UNNECESSARY_SLASH_STRIP
    }

    fn interests(&self) -> &'static [&'static str] {
        &["expansion"]
    }

    fn inspect(&self, node: &SyntaxNode, env: &ScriptEnv<'_>, out: &mut Vec<Finding>) {
        if env.eapi.map_or(true, |e| e < 7) {
            return;
        }
        let text = env.tree.text(node);
        let Some(inner) = text.strip_prefix("${").and_then(|t| t.strip_suffix('}')) else {
            return;
        };
        let Some(name) = inner.strip_suffix("%/") else {
            return;
        };
        if ROOT_VARS.contains(&name) {
            out.push(Finding::at(
                self.kind(),
                Severity::Info,
                node,
                format!("{text} is unnecessary: ${{{name}}} has no trailing slash"),
            ));
        }
    }
}

#[derive(Debug, Default)]
pub struct BannedCommand;

impl Detector for BannedCommand {
    fn kind(&self) -> &'static str {
        kinds::BANNED_COMMAND
    }

    fn interests(&self) -> &'static [&'static str] {
        &["command"]
    }

    fn inspect(&self, node: &SyntaxNode, env: &ScriptEnv<'_>, out: &mut Vec<Finding>) {
        let Some(eapi) = env.eapi else { return };
        let Some(name) = command_name(env.tree, node) else {
            return;
        };
        if let Some((_, since)) = BANNED_COMMANDS.iter().find(|(cmd, _)| *cmd == name) {
            if eapi >= *since {
                out.push(Finding::at(
                    self.kind(),
                    Severity::Error,
                    node,
                    format!("'{name}' is banned in EAPI {eapi}"),
                ));
            }
        }
    }
}
