//! Temporary repository fixtures for tests.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub struct RepoFixture {
    dir: TempDir,
}

impl RepoFixture {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `rel`, creating parent directories.
    pub fn file(self, rel: &str, content: &str) -> Self {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    /// Write `cat/pkg/pkg-ver.ebuild`.
    pub fn ebuild(self, cat_pkg: &str, version: &str, content: &str) -> Self {
        let pkg = cat_pkg.rsplit('/').next().unwrap();
        let rel = format!("{cat_pkg}/{pkg}-{version}.ebuild");
        self.file(&rel, content)
    }

    /// Minimal `profiles/` tree listing `categories` and `arches`.
    pub fn profiles(self, categories: &[&str], arches: &[&str]) -> Self {
        let mut cats = categories.join("\n");
        cats.push('\n');
        let mut arch = arches.join("\n");
        arch.push('\n');
        let desc: String = arches
            .iter()
            .map(|a| format!("{a} default/{a} stable\n"))
            .collect();
        let mut repo = self
            .file("profiles/categories", &cats)
            .file("profiles/arch.list", &arch)
            .file("profiles/profiles.desc", &desc)
            .file("profiles/use.desc", "ssl - Enable SSL\ntest - Enable tests\n");
        for a in arches {
            repo = repo.file(&format!("profiles/default/{a}/eapi"), "8\n");
        }
        repo
    }
}
