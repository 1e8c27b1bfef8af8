//! Embedded-script analysis: one parse, many read-only detector passes.

pub mod detectors;
pub mod quoting;
pub mod tree;

pub use detectors::{Detector, Finding, ScriptEnv};
pub use tree::{BashGrammar, Grammar, ParseFailure, SyntaxNode, SyntaxTree};

/// Drives detectors over a parsed tree.
pub struct ShellAnalyzer;

impl ShellAnalyzer {
    /// Walk the tree once in pre-order, handing each node to every detector
    /// interested in its kind. Findings come out ordered by node position,
    /// then by detector order in `detectors`.
    pub fn run(detectors: &[&dyn Detector], env: &ScriptEnv<'_>) -> Vec<Finding> {
        let mut out = Vec::new();
        for node in env.tree.root().descendants() {
            for detector in detectors {
                if detector.interests().contains(&node.kind) {
                    detector.inspect(node, env, &mut out);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::detectors::{BannedCommand, UnquotedVariable, UnsafeGlob};
    use super::*;

    #[test]
    fn test_findings_ordered_by_position_then_detector() {
        let tree = BashGrammar
            .parse("src_install() {\n\tdohtml $D/*\n\tcp ${DISTDIR}/*.gz x\n}\n")
            .unwrap();
        let env = ScriptEnv {
            tree: &tree,
            eapi: Some(7),
        };
        let detectors: [&dyn Detector; 3] = [&UnsafeGlob, &UnquotedVariable, &BannedCommand];
        let kinds: Vec<_> = ShellAnalyzer::run(&detectors, &env)
            .into_iter()
            .map(|f| (f.line, f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (2, "UnquotedVariable"),
                (2, "BannedCommand"),
                (3, "UnsafeGlob"),
                (3, "UnquotedVariable"),
            ]
        );
    }

    #[test]
    fn test_same_tree_same_findings() {
        let tree = BashGrammar.parse("cp ${DISTDIR}/*.gz $T\n").unwrap();
        let env = ScriptEnv {
            tree: &tree,
            eapi: Some(8),
        };
        let a = ShellAnalyzer::run(&[&UnsafeGlob, &UnquotedVariable], &env);
        let b = ShellAnalyzer::run(&[&UnquotedVariable, &UnsafeGlob], &env);
        let mut a_kinds: Vec<_> = a.iter().map(|f| f.kind).collect();
        let mut b_kinds: Vec<_> = b.iter().map(|f| f.kind).collect();
        a_kinds.sort();
        b_kinds.sort();
        assert_eq!(a_kinds, b_kinds);
        assert_eq!(a.len(), 3);
    }
}
