//! Result sinks: where the ordered issue stream ends up.
//!
//! `human` prints one colored line per issue plus a summary; `json` prints
//! one JSON object per line with a final summary object. `CollectSink` keeps
//! everything in memory.

use crate::models::{Issue, ScanSummary, Severity};
use owo_colors::OwoColorize;
use serde_json::json;
use std::io::{self, Write};

/// Consumer of the final, ordered issue stream.
pub trait ResultSink {
    fn accept(&mut self, issue: Issue);

    fn finish(&mut self, _summary: &ScanSummary) {}
}

#[derive(Debug, Default)]
/// Keeps issues in memory.
pub struct CollectSink {
    pub issues: Vec<Issue>,
    pub summary: Option<ScanSummary>,
}

impl ResultSink for CollectSink {
    fn accept(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    fn finish(&mut self, summary: &ScanSummary) {
        self.summary = Some(summary.clone());
    }
}

/// Colors are off when `NO_COLOR` is set.
pub fn use_colors() -> bool {
    std::env::var_os("NO_COLOR").is_none()
}

/// Prefix for fatal messages on stderr.
pub fn error_prefix() -> String {
    if use_colors() {
        "error:".red().bold().to_string()
    } else {
        "error:".to_string()
    }
}

pub fn note_prefix() -> String {
    if use_colors() {
        "note:".cyan().bold().to_string()
    } else {
        "note:".to_string()
    }
}

/// One human-readable line for `issue`.
pub fn render_issue(issue: &Issue, color: bool) -> String {
    let (icon, tag) = match issue.severity {
        Severity::Error => ("✖", "⟦error⟧"),
        Severity::Warning => ("▲", "⟦warn⟧"),
        Severity::Info => ("◆", "⟦info⟧"),
    };
    let unit = match issue.location {
        Some(loc) => format!("{}:{}:{}", issue.unit, loc.line, loc.column),
        None => issue.unit.clone(),
    };
    let rule = format!("❲{}/{}❳", issue.check, issue.kind);
    if !color {
        return format!("{icon} {tag} {unit} {rule} {}", issue.message);
    }
    let (icon, tag) = match issue.severity {
        Severity::Error => (icon.red().to_string(), tag.red().bold().to_string()),
        Severity::Warning => (icon.yellow().to_string(), tag.yellow().bold().to_string()),
        Severity::Info => (icon.blue().to_string(), tag.blue().bold().to_string()),
    };
    format!(
        "{icon} {tag} {} {} {}",
        unit.bold(),
        rule.bright_black(),
        issue.message
    )
}

pub fn render_summary(summary: &ScanSummary) -> String {
    let mut line = format!(
        "Summary: errors={} warnings={} infos={} units={}",
        summary.errors, summary.warnings, summary.infos, summary.units
    );
    if summary.cancelled {
        line.push_str(" (cancelled)");
    }
    line
}

/// Colored terminal output.
pub struct HumanSink<W: Write> {
    out: W,
    color: bool,
}

impl HumanSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout(), use_colors())
    }
}

impl<W: Write> HumanSink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, line: &str) {
        if let Err(err) = writeln!(self.out, "{line}") {
            tracing::warn!(%err, "failed to write result");
        }
    }
}

impl<W: Write> ResultSink for HumanSink<W> {
    fn accept(&mut self, issue: Issue) {
        let line = render_issue(&issue, self.color);
        self.write_line(&line);
    }

    fn finish(&mut self, summary: &ScanSummary) {
        let line = render_summary(summary);
        let line = if self.color {
            line.bold().to_string()
        } else {
            line
        };
        self.write_line(&line);
        let _ = self.out.flush();
    }
}

/// JSON lines: one issue object per line, then `{"summary": ...}`.
pub struct JsonSink<W: Write> {
    out: W,
}

impl JsonSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_value(&mut self, value: &serde_json::Value) {
        let res = serde_json::to_writer(&mut self.out, value)
            .map_err(io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"));
        if let Err(err) = res {
            tracing::warn!(%err, "failed to write result");
        }
    }
}

impl<W: Write> ResultSink for JsonSink<W> {
    fn accept(&mut self, issue: Issue) {
        match serde_json::to_value(&issue) {
            Ok(value) => self.write_value(&value),
            Err(err) => tracing::warn!(%err, "failed to encode result"),
        }
    }

    fn finish(&mut self, summary: &ScanSummary) {
        self.write_value(&json!({ "summary": summary }));
        let _ = self.out.flush();
    }
}
