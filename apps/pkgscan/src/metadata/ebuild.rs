//! Minimal ebuild reader.
//!
//! Extracts top-level variable assignments and `inherit` lines without
//! sourcing the file. Values referencing other variables are kept verbatim;
//! consumers decide how to treat unexpanded references.

use super::{IuseFlag, MetadataProvider, VersionMetadata, DEPEND_KEYS};
use crate::error::MetadataError;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

fn assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*)(?P<op>\+?=)(?P<rest>.*)$")
            .expect("static assignment regex")
    })
}

fn inherit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^inherit\s+(?P<list>[^#;]*)").expect("static inherit regex"))
}

#[derive(Debug, Default, Clone, Copy)]
/// Reads `.ebuild` files from disk.
pub struct EbuildProvider;

impl MetadataProvider for EbuildProvider {
    fn load(&self, path: &Path) -> Result<VersionMetadata, MetadataError> {
        let text = fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_ebuild(path, text)
    }
}

/// Parse ebuild `text`; `path` is used for error messages only.
pub fn parse_ebuild(path: &Path, text: String) -> Result<VersionMetadata, MetadataError> {
    let mut vars: BTreeMap<String, String> = BTreeMap::new();
    let mut var_lines: BTreeMap<String, usize> = BTreeMap::new();
    let mut inherit = Vec::new();

    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let lineno = i + 1;
        i += 1;
        if let Some(caps) = inherit_re().captures(line) {
            inherit.extend(caps["list"].split_whitespace().map(str::to_string));
            continue;
        }
        let Some(caps) = assign_re().captures(line) else {
            continue;
        };
        let name = caps["name"].to_string();
        let rest = caps.name("rest").map_or("", |m| m.as_str());
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let mut buf = String::new();
                let mut chunk = &rest[1..];
                loop {
                    if let Some(end) = find_closing(chunk, q) {
                        buf.push_str(&chunk[..end]);
                        break;
                    }
                    buf.push_str(chunk);
                    buf.push('\n');
                    if i >= lines.len() {
                        return Err(MetadataError::Unterminated {
                            path: path.to_path_buf(),
                            var: name,
                        });
                    }
                    chunk = lines[i];
                    i += 1;
                }
                buf
            }
            _ => rest.split_whitespace().next().unwrap_or("").to_string(),
        };
        var_lines.entry(name.clone()).or_insert(lineno);
        if &caps["op"] == "+=" {
            let slot = vars.entry(name).or_default();
            slot.push(' ');
            slot.push_str(&value);
        } else {
            vars.insert(name, value);
        }
    }

    let get = |k: &str| vars.get(k).cloned().unwrap_or_default();
    let iuse = get("IUSE")
        .split_whitespace()
        .map(|tok| match tok.chars().next() {
            Some('+') => IuseFlag {
                name: tok[1..].to_string(),
                default: Some(true),
            },
            Some('-') => IuseFlag {
                name: tok[1..].to_string(),
                default: Some(false),
            },
            _ => IuseFlag {
                name: tok.to_string(),
                default: None,
            },
        })
        .collect();
    let mut depends = BTreeMap::new();
    for key in DEPEND_KEYS {
        if let Some(v) = vars.get(*key) {
            depends.insert(*key, v.clone());
        }
    }
    let eapi = vars
        .get("EAPI")
        .map(|e| e.trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "0".to_string());

    Ok(VersionMetadata {
        eapi,
        inherit,
        iuse,
        keywords: get("KEYWORDS").split_whitespace().map(str::to_string).collect(),
        slot: get("SLOT"),
        depends,
        required_use: get("REQUIRED_USE"),
        var_lines,
        script: text,
    })
}

/// Byte offset of the first unescaped `quote` in `s`.
fn find_closing(s: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (idx, c) in s.char_indices() {
        if quote == '"' && escaped {
            escaped = false;
            continue;
        }
        if quote == '"' && c == '\\' {
            escaped = true;
            continue;
        }
        if c == quote {
            return Some(idx);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const EBUILD: &str = r#"# Copyright
EAPI=8

inherit python-r1 toolchain-funcs

DESCRIPTION="A \"quoted\" tool"
IUSE="+ssl -doc test"
KEYWORDS="~amd64 x86"
SLOT="0"
RDEPEND="
	dev-libs/foo
	ssl? ( dev-libs/openssl )
"
DEPEND="${RDEPEND}"
REQUIRED_USE='test? ( ssl )'

src_install() {
	local IUSE_INNER=1
	default
}
"#;

    #[test]
    fn test_parse_top_level_assignments() {
        let md = parse_ebuild(Path::new("x.ebuild"), EBUILD.to_string()).unwrap();
        assert_eq!(md.eapi, "8");
        assert_eq!(md.inherit, vec!["python-r1", "toolchain-funcs"]);
        assert_eq!(md.iuse.len(), 3);
        assert_eq!(md.iuse[0].default, Some(true));
        assert_eq!(md.iuse[1].default, Some(false));
        assert_eq!(md.iuse[2].default, None);
        assert!(md.has_flag("doc"));
        assert_eq!(md.keywords, vec!["~amd64", "x86"]);
        assert!(md.depends["RDEPEND"].contains("ssl? ( dev-libs/openssl )"));
        assert_eq!(md.depends["DEPEND"], "${RDEPEND}");
        assert_eq!(md.required_use, "test? ( ssl )");
        assert_eq!(md.var_lines["RDEPEND"], 10);
        assert!(!md.var_lines.contains_key("IUSE_INNER"));
    }

    #[test]
    fn test_unterminated_value() {
        let err = parse_ebuild(Path::new("x.ebuild"), "IUSE=\"foo\n".to_string());
        assert!(matches!(err, Err(MetadataError::Unterminated { .. })));
    }

    #[test]
    fn test_missing_eapi_defaults_to_zero() {
        let md = parse_ebuild(Path::new("x.ebuild"), "SLOT=0\n".to_string()).unwrap();
        assert_eq!(md.eapi, "0");
        assert_eq!(md.slot, "0");
    }
}
