//! Dependency and REQUIRED_USE expression parsing.
//!
//! Both share one grammar: whitespace separated tokens, parenthesized groups
//! introduced by `||`, `^^`, `??` or a USE conditional (`flag?`, `!flag?`),
//! and leaves parsed by a caller-supplied function (atoms or flag names).

use super::version::Version;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
/// One node of a parsed expression.
pub enum DepNode<T> {
    Leaf(T),
    AllOf(Vec<DepNode<T>>),
    AnyOf(Vec<DepNode<T>>),
    ExactlyOne(Vec<DepNode<T>>),
    AtMostOne(Vec<DepNode<T>>),
    Conditional {
        flag: String,
        negated: bool,
        children: Vec<DepNode<T>>,
    },
}

impl<T> DepNode<T> {
    /// Visit every leaf in document order.
    pub fn leaves<'a>(nodes: &'a [DepNode<T>], out: &mut Vec<&'a T>) {
        for node in nodes {
            match node {
                DepNode::Leaf(t) => out.push(t),
                DepNode::AllOf(c)
                | DepNode::AnyOf(c)
                | DepNode::ExactlyOne(c)
                | DepNode::AtMostOne(c)
                | DepNode::Conditional { children: c, .. } => DepNode::leaves(c, out),
            }
        }
    }

    /// Visit every USE conditional flag in document order.
    pub fn conditionals<'a>(nodes: &'a [DepNode<T>], out: &mut Vec<&'a str>) {
        for node in nodes {
            match node {
                DepNode::Leaf(_) => {}
                DepNode::Conditional { flag, children, .. } => {
                    out.push(flag);
                    DepNode::conditionals(children, out);
                }
                DepNode::AllOf(c)
                | DepNode::AnyOf(c)
                | DepNode::ExactlyOne(c)
                | DepNode::AtMostOne(c) => DepNode::conditionals(c, out),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepParseError(pub String);

impl std::fmt::Display for DepParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an expression whose leaves are produced by `leaf`.
pub fn parse_expr<T, F>(s: &str, leaf: F) -> Result<Vec<DepNode<T>>, DepParseError>
where
    F: Fn(&str) -> Result<T, DepParseError>,
{
    let tokens: Vec<&str> = s.split_whitespace().collect();
    let mut pos = 0;
    let nodes = parse_seq(&tokens, &mut pos, &leaf, false)?;
    if pos != tokens.len() {
        return Err(DepParseError(format!("unexpected {:?}", tokens[pos])));
    }
    Ok(nodes)
}

fn parse_seq<T, F>(
    tokens: &[&str],
    pos: &mut usize,
    leaf: &F,
    nested: bool,
) -> Result<Vec<DepNode<T>>, DepParseError>
where
    F: Fn(&str) -> Result<T, DepParseError>,
{
    let mut out = Vec::new();
    while *pos < tokens.len() {
        let tok = tokens[*pos];
        *pos += 1;
        match tok {
            ")" => {
                if nested {
                    return Ok(out);
                }
                return Err(DepParseError("unbalanced ')'".into()));
            }
            "(" => out.push(DepNode::AllOf(parse_seq(tokens, pos, leaf, true)?)),
            "||" | "^^" | "??" => {
                expect_open(tokens, pos, tok)?;
                let children = parse_seq(tokens, pos, leaf, true)?;
                out.push(match tok {
                    "||" => DepNode::AnyOf(children),
                    "^^" => DepNode::ExactlyOne(children),
                    _ => DepNode::AtMostOne(children),
                });
            }
            t if t.ends_with('?') => {
                let name = &t[..t.len() - 1];
                let (negated, flag) = match name.strip_prefix('!') {
                    Some(f) => (true, f),
                    None => (false, name),
                };
                if flag.is_empty() {
                    return Err(DepParseError(format!("empty USE conditional {t:?}")));
                }
                expect_open(tokens, pos, t)?;
                let children = parse_seq(tokens, pos, leaf, true)?;
                out.push(DepNode::Conditional {
                    flag: flag.to_string(),
                    negated,
                    children,
                });
            }
            t => out.push(DepNode::Leaf(leaf(t)?)),
        }
    }
    if nested {
        return Err(DepParseError("missing ')'".into()));
    }
    Ok(out)
}

fn expect_open(tokens: &[&str], pos: &mut usize, after: &str) -> Result<(), DepParseError> {
    if tokens.get(*pos) == Some(&"(") {
        *pos += 1;
        Ok(())
    } else {
        Err(DepParseError(format!("expected '(' after {after:?}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Less,
    LessEq,
    Equal,
    /// `=cat/pkg-1.2*`
    EqualGlob,
    /// `~cat/pkg-1.2`: any revision.
    Approx,
    GreaterEq,
    Greater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Default applied when the target does not declare the flag: `(+)` / `(-)`.
pub enum UseDefault {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One `[...]` USE dependency entry.
pub struct UseDep {
    pub flag: String,
    pub default: Option<UseDefault>,
    /// `flag?` / `!flag?` / `flag=` / `!flag=` forms.
    pub conditional: bool,
    pub negated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A package dependency atom, e.g. `>=dev-libs/foo-1.2:0=[bar(+),baz?]`.
pub struct Atom {
    pub blocker: bool,
    pub op: Option<Operator>,
    pub category: String,
    pub package: String,
    pub version: Option<Version>,
    pub slot: Option<String>,
    pub use_deps: Vec<UseDep>,
}

fn atom_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<cat>[A-Za-z0-9_][A-Za-z0-9+_.-]*)/(?P<pkg>[A-Za-z0-9_][A-Za-z0-9+_-]*)$")
            .expect("static atom regex")
    })
}

impl Atom {
    pub fn parse(s: &str) -> Result<Self, DepParseError> {
        let bad = |why: &str| DepParseError(format!("invalid atom {s:?}: {why}"));
        let mut rest = s;
        let blocker = rest.starts_with('!');
        rest = rest.trim_start_matches('!');

        let mut use_deps = Vec::new();
        if let Some(open) = rest.find('[') {
            let close = rest.rfind(']').filter(|c| *c > open && *c == rest.len() - 1);
            let close = close.ok_or_else(|| bad("unterminated use dependency"))?;
            for entry in rest[open + 1..close].split(',') {
                use_deps.push(parse_use_dep(entry).ok_or_else(|| bad("bad use dependency"))?);
            }
            rest = &rest[..open];
        }

        let mut slot = None;
        if let Some(idx) = rest.find(':') {
            let tail = &rest[idx + 1..];
            let tail = tail.split("::").next().unwrap_or(tail);
            slot = Some(tail.to_string());
            rest = &rest[..idx];
        }

        let (op, body) = [
            (">=", Operator::GreaterEq),
            ("<=", Operator::LessEq),
            ("=", Operator::Equal),
            ("~", Operator::Approx),
            ("<", Operator::Less),
            (">", Operator::Greater),
        ]
        .iter()
        .find_map(|(prefix, op)| rest.strip_prefix(prefix).map(|b| (Some(*op), b)))
        .unwrap_or((None, rest));

        let (name, version, op) = match op {
            Some(mut op) => {
                let mut body = body;
                if let Some(stripped) = body.strip_suffix('*') {
                    if op != Operator::Equal {
                        return Err(bad("glob suffix requires '='"));
                    }
                    op = Operator::EqualGlob;
                    body = stripped;
                }
                let (name, ver) = super::version::split_package_version(body)
                    .ok_or_else(|| bad("missing version"))?;
                let ver = Version::parse(ver).ok_or_else(|| bad("invalid version"))?;
                (name, Some(ver), Some(op))
            }
            None => (body, None, None),
        };

        let caps = atom_re().captures(name).ok_or_else(|| bad("malformed name"))?;
        Ok(Self {
            blocker,
            op,
            category: caps["cat"].to_string(),
            package: caps["pkg"].to_string(),
            version,
            slot,
            use_deps,
        })
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.category, self.package)
    }

    /// True when `version` of this atom's package satisfies the version
    /// restriction (slots and use deps are not considered).
    pub fn matches_version(&self, version: &Version) -> bool {
        let (Some(op), Some(want)) = (self.op, self.version.as_ref()) else {
            return true;
        };
        let ord = version.cmp(want);
        match op {
            Operator::Less => ord == Ordering::Less,
            Operator::LessEq => ord != Ordering::Greater,
            Operator::Equal => ord == Ordering::Equal,
            Operator::EqualGlob => version.as_str().starts_with(want.as_str()),
            Operator::Approx => version.base() == want.base(),
            Operator::GreaterEq => ord != Ordering::Less,
            Operator::Greater => ord == Ordering::Greater,
        }
    }
}

fn parse_use_dep(entry: &str) -> Option<UseDep> {
    let mut s = entry.trim();
    let mut negated = false;
    let mut conditional = false;
    if let Some(rest) = s.strip_prefix('!') {
        negated = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('-') {
        negated = true;
        s = rest;
    }
    if let Some(rest) = s.strip_suffix('?').or_else(|| s.strip_suffix('=')) {
        conditional = true;
        s = rest;
    }
    let mut default = None;
    if let Some(rest) = s.strip_suffix("(+)") {
        default = Some(UseDefault::Enabled);
        s = rest;
    } else if let Some(rest) = s.strip_suffix("(-)") {
        default = Some(UseDefault::Disabled);
        s = rest;
    }
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || "+_@-".contains(c)) {
        return None;
    }
    Some(UseDep {
        flag: s.to_string(),
        default,
        conditional,
        negated,
    })
}

/// Parse a dependency expression (`DEPEND`, `RDEPEND`, ...).
pub fn parse_depend(s: &str) -> Result<Vec<DepNode<Atom>>, DepParseError> {
    parse_expr(s, Atom::parse)
}

/// Parse a REQUIRED_USE expression; leaves are flag names with optional `!`.
pub fn parse_required_use(s: &str) -> Result<Vec<DepNode<String>>, DepParseError> {
    parse_expr(s, |t| {
        let flag = t.trim_start_matches('!');
        if flag.is_empty() {
            Err(DepParseError(format!("invalid flag {t:?}")))
        } else {
            Ok(t.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_atom_forms() {
        let a = Atom::parse(">=dev-libs/foo-1.2-r1:0/2=[bar(+),!baz?,-qux]").unwrap();
        assert_eq!(a.op, Some(Operator::GreaterEq));
        assert_eq!(a.key(), "dev-libs/foo");
        assert_eq!(a.version.as_ref().unwrap().as_str(), "1.2-r1");
        assert_eq!(a.slot.as_deref(), Some("0/2="));
        assert_eq!(a.use_deps.len(), 3);
        assert_eq!(a.use_deps[0].default, Some(UseDefault::Enabled));
        assert!(a.use_deps[1].conditional && a.use_deps[1].negated);
        assert!(a.use_deps[2].negated && !a.use_deps[2].conditional);

        let g = Atom::parse("=dev-lang/python-2*").unwrap();
        assert_eq!(g.op, Some(Operator::EqualGlob));
        assert!(g.matches_version(&Version::parse("2.7.18").unwrap()));
        assert!(!g.matches_version(&Version::parse("3.6").unwrap()));

        assert!(Atom::parse("!!dev-util/bar").unwrap().blocker);
        assert!(Atom::parse("dev-util").is_err());
        assert!(Atom::parse(">=dev-util/bar").is_err());
    }

    #[test]
    fn test_parse_groups_and_conditionals() {
        let nodes = parse_depend("a/b || ( c/d e/f ) ssl? ( dev-libs/openssl ) !test? ( x/y )")
            .unwrap();
        assert_eq!(nodes.len(), 4);
        assert!(matches!(nodes[1], DepNode::AnyOf(ref c) if c.len() == 2));
        let mut flags = Vec::new();
        DepNode::conditionals(&nodes, &mut flags);
        assert_eq!(flags, vec!["ssl", "test"]);
        let mut leaves = Vec::new();
        DepNode::leaves(&nodes, &mut leaves);
        assert_eq!(leaves.len(), 5);
    }

    #[test]
    fn test_unbalanced_expressions() {
        assert!(parse_depend("|| ( a/b").is_err());
        assert!(parse_depend("a/b )").is_err());
        assert!(parse_depend("ssl? a/b").is_err());
        assert!(parse_required_use("^^ ( a b ) c? ( !d )").is_ok());
    }

    #[test]
    fn test_approx_matches_any_revision() {
        let a = Atom::parse("~dev-libs/foo-1.2").unwrap();
        assert!(a.matches_version(&Version::parse("1.2-r5").unwrap()));
        assert!(!a.matches_version(&Version::parse("1.2.1").unwrap()));
    }
}
