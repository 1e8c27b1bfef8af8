//! Security advisories (GLSA) index.
//!
//! Advisories are read from `metadata/glsa/*.xml` or a configured directory.
//! The addon is disabled, not failed, when no advisory source is available.

use super::{Addon, AddonContext, AddonId, AddonValue};
use crate::error::AddonError;
use crate::metadata::version::Version;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

fn glsa_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"<glsa\s+id="([^"]+)""#).expect("static glsa id regex"))
}

fn package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<package\s+([^>]*)>(.*?)</package>").expect("static package regex")
    })
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"([A-Za-z_]+)="([^"]*)""#).expect("static attribute regex"))
}

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(vulnerable|unaffected)\s+([^>]*)>\s*([^<\s]+)\s*</(?:vulnerable|unaffected)>")
            .expect("static range regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    /// `r*` forms: same upstream version, compare revisions only.
    RevLt,
    RevLe,
    RevGe,
    RevGt,
}

impl RangeOp {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "lt" => Self::Lt,
            "le" => Self::Le,
            "eq" => Self::Eq,
            "ge" => Self::Ge,
            "gt" => Self::Gt,
            "rlt" => Self::RevLt,
            "rle" => Self::RevLe,
            "rge" => Self::RevGe,
            "rgt" => Self::RevGt,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub op: RangeOp,
    pub version: Version,
    /// `eq` with a trailing `*`.
    pub glob: bool,
}

impl VersionRange {
    pub fn matches(&self, v: &Version) -> bool {
        let ord = v.cmp(&self.version);
        let same_base = v.base() == self.version.base();
        let rev = v.revision().cmp(&self.version.revision());
        match self.op {
            RangeOp::Eq if self.glob => v.as_str().starts_with(self.version.as_str()),
            RangeOp::Eq => ord == Ordering::Equal,
            RangeOp::Lt => ord == Ordering::Less,
            RangeOp::Le => ord != Ordering::Greater,
            RangeOp::Ge => ord != Ordering::Less,
            RangeOp::Gt => ord == Ordering::Greater,
            RangeOp::RevLt => same_base && rev == Ordering::Less,
            RangeOp::RevLe => same_base && rev != Ordering::Greater,
            RangeOp::RevGe => same_base && rev != Ordering::Less,
            RangeOp::RevGt => same_base && rev == Ordering::Greater,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One `<package>` entry of an advisory.
pub struct Vulnerability {
    pub glsa: String,
    /// Affected arches; empty means every arch.
    pub arches: Vec<String>,
    pub vulnerable: Vec<VersionRange>,
    pub unaffected: Vec<VersionRange>,
}

impl Vulnerability {
    pub fn affects(&self, v: &Version) -> bool {
        self.vulnerable.iter().any(|r| r.matches(v)) && !self.unaffected.iter().any(|r| r.matches(v))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlsaIndex {
    pub by_package: BTreeMap<String, Vec<Vulnerability>>,
}

impl GlsaIndex {
    /// Parse every `*.xml` advisory in `dir`, in file-name order.
    pub fn load(dir: &Path) -> std::io::Result<Self> {
        let mut files: Vec<_> = fs::read_dir(dir)?
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "xml"))
            .collect();
        files.sort();
        let mut index = Self::default();
        for path in files {
            let text = match fs::read_to_string(&path) {
                Ok(t) => t,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "unreadable advisory");
                    continue;
                }
            };
            index.add_advisory(&text);
        }
        Ok(index)
    }

    pub fn add_advisory(&mut self, xml: &str) {
        let Some(id) = glsa_id_re().captures(xml).map(|c| c[1].to_string()) else {
            return;
        };
        for pkg in package_re().captures_iter(xml) {
            let attrs: BTreeMap<&str, &str> = attr_re()
                .captures_iter(pkg.get(1).map_or("", |m| m.as_str()))
                .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
                .collect();
            let Some(name) = attrs.get("name") else {
                continue;
            };
            let arches = match attrs.get("arch").copied() {
                None | Some("*") => Vec::new(),
                Some(list) => list.split_whitespace().map(str::to_string).collect(),
            };
            let mut vuln = Vulnerability {
                glsa: format!("GLSA-{id}"),
                arches,
                vulnerable: Vec::new(),
                unaffected: Vec::new(),
            };
            for range in range_re().captures_iter(pkg.get(2).map_or("", |m| m.as_str())) {
                let op = attr_re()
                    .captures_iter(&range[2])
                    .find(|c| &c[1] == "range")
                    .and_then(|c| RangeOp::parse(&c[2]));
                let raw = &range[3];
                let (raw, glob) = match raw.strip_suffix('*') {
                    Some(stripped) => (stripped, true),
                    None => (raw, false),
                };
                let (Some(op), Some(version)) = (op, Version::parse(raw)) else {
                    tracing::debug!(glsa = %id, raw, "skipping malformed range");
                    continue;
                };
                let entry = VersionRange { op, version, glob };
                if &range[1] == "vulnerable" {
                    vuln.vulnerable.push(entry);
                } else {
                    vuln.unaffected.push(entry);
                }
            }
            self.by_package.entry(name.to_string()).or_default().push(vuln);
        }
    }

    pub fn for_package(&self, key: &str) -> &[Vulnerability] {
        self.by_package.get(key).map_or(&[], Vec::as_slice)
    }
}

pub struct GlsaAddon;

impl Addon for GlsaAddon {
    fn id(&self) -> AddonId {
        AddonId::GLSA
    }

    fn compute(&self, ctx: &AddonContext<'_>) -> Result<AddonValue, AddonError> {
        let id = self.id().as_str();
        if !ctx.settings.glsa_enabled {
            return Err(AddonError::disabled(id, "turned off in configuration"));
        }
        let dir = ctx
            .settings
            .glsa_dir
            .clone()
            .unwrap_or_else(|| ctx.repo_root.join("metadata").join("glsa"));
        if !dir.is_dir() {
            return Err(AddonError::disabled(id, "no available glsa source"));
        }
        let index = GlsaIndex::load(&dir).map_err(|e| AddonError::failed(id, e.to_string()))?;
        tracing::debug!(packages = index.by_package.len(), "glsa index loaded");
        Ok(Arc::new(index))
    }
}
