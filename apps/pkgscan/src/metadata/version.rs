//! Package version parsing and ordering.
//!
//! Versions look like `1.2.3b_rc1_p2-r1`: dotted numeric components, an
//! optional letter, any number of suffixes and an optional revision.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?P<nums>\d+(?:\.\d+)*)(?P<letter>[a-z])?(?P<suffixes>(?:_(?:alpha|beta|pre|rc|p)\d*)*)(?:-r(?P<rev>\d+))?$",
        )
        .expect("static version regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SuffixKind {
    Alpha,
    Beta,
    Pre,
    Rc,
    P,
}

#[derive(Debug, Clone)]
/// A parsed package version.
pub struct Version {
    raw: String,
    base_len: usize,
    numbers: Vec<String>,
    letter: Option<char>,
    suffixes: Vec<(SuffixKind, u64)>,
    revision: u64,
}

impl Version {
    pub fn parse(s: &str) -> Option<Self> {
        let caps = version_re().captures(s)?;
        let numbers = caps["nums"].split('.').map(str::to_string).collect();
        let letter = caps.name("letter").and_then(|m| m.as_str().chars().next());
        let mut suffixes = Vec::new();
        if let Some(m) = caps.name("suffixes") {
            for part in m.as_str().split('_').filter(|p| !p.is_empty()) {
                let split = part
                    .find(|c: char| c.is_ascii_digit())
                    .unwrap_or(part.len());
                let (name, num) = part.split_at(split);
                let kind = match name {
                    "alpha" => SuffixKind::Alpha,
                    "beta" => SuffixKind::Beta,
                    "pre" => SuffixKind::Pre,
                    "rc" => SuffixKind::Rc,
                    _ => SuffixKind::P,
                };
                suffixes.push((kind, num.parse().unwrap_or(0)));
            }
        }
        let revision = caps
            .name("rev")
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let base_len = caps.name("rev").map_or(s.len(), |m| m.start() - 2);
        Some(Self {
            raw: s.to_string(),
            base_len,
            numbers,
            letter,
            suffixes,
            revision,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Version without its `-rN` revision.
    pub fn base(&self) -> &str {
        &self.raw[..self.base_len]
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

fn cmp_int_str(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn cmp_component(a: &str, b: &str) -> Ordering {
    if a.starts_with('0') || b.starts_with('0') {
        a.trim_end_matches('0').cmp(b.trim_end_matches('0'))
    } else {
        cmp_int_str(a, b)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut ord = cmp_int_str(&self.numbers[0], &other.numbers[0]);
        if ord != Ordering::Equal {
            return ord;
        }
        for (a, b) in self.numbers.iter().zip(other.numbers.iter()).skip(1) {
            ord = cmp_component(a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        ord = self.numbers.len().cmp(&other.numbers.len());
        if ord != Ordering::Equal {
            return ord;
        }
        ord = self.letter.cmp(&other.letter);
        if ord != Ordering::Equal {
            return ord;
        }
        for (a, b) in self.suffixes.iter().zip(other.suffixes.iter()) {
            ord = a.cmp(b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        let extra = |longer: &Version, n: usize| match longer.suffixes[n].0 {
            SuffixKind::P => Ordering::Greater,
            _ => Ordering::Less,
        };
        ord = match self.suffixes.len().cmp(&other.suffixes.len()) {
            Ordering::Greater => extra(self, other.suffixes.len()),
            Ordering::Less => extra(other, self.suffixes.len()).reverse(),
            Ordering::Equal => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
        self.revision.cmp(&other.revision)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split `pkg-1.0-r1` into `("pkg", "1.0-r1")`.
pub fn split_package_version(s: &str) -> Option<(&str, &str)> {
    let mut search = s.len();
    while let Some(idx) = s[..search].rfind('-') {
        let (name, ver) = (&s[..idx], &s[idx + 1..]);
        if !name.is_empty() && Version::parse(ver).is_some() {
            return Some((name, ver));
        }
        search = idx;
    }
    None
}
