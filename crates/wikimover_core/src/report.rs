use std::fmt::Write as _;

use serde::Serialize;

use crate::mover::MoveStatus;
use crate::replacement::Replacement;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplacementRow {
    pub from: String,
    pub to: String,
    pub actions: Vec<&'static str>,
    pub reason: String,
}

impl From<&Replacement> for ReplacementRow {
    fn from(replacement: &Replacement) -> Self {
        Self {
            from: replacement.from.full_name(),
            to: replacement.to.full_text(),
            actions: replacement.actions().names(),
            reason: replacement.reason().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveRecord {
    pub from: String,
    pub to: String,
    pub status: MoveStatus,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    FixLinks,
    Propose,
    Custom,
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditRecord {
    pub title: String,
    pub kind: EditKind,
    pub replaced: usize,
    pub attempts: usize,
    /// Unified diff of the change; filled for dry runs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Outcome of one move job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MoveReport {
    pub success: bool,
    pub dry_run: bool,
    pub resumed: bool,
    pub replacements: Vec<ReplacementRow>,
    pub moves: Vec<MoveRecord>,
    pub edits: Vec<EditRecord>,
    pub collected_pages: usize,
    pub failures: Vec<String>,
    pub warnings: Vec<String>,
}

impl MoveReport {
    pub fn set_replacements(&mut self, replacements: &[Replacement]) {
        self.replacements = replacements.iter().map(ReplacementRow::from).collect();
    }

    pub fn moved_count(&self) -> usize {
        self.moves
            .iter()
            .filter(|record| record.status == MoveStatus::Moved)
            .count()
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "move report");
        let _ = writeln!(out, "success: {}", self.success);
        let _ = writeln!(out, "dry_run: {}", self.dry_run);
        let _ = writeln!(out, "resumed: {}", self.resumed);
        let _ = writeln!(out, "replacements: {}", self.replacements.len());
        for row in &self.replacements {
            let _ = write!(out, "  - {} -> {} [{}]", row.from, row.to, row.actions.join(", "));
            if !row.reason.is_empty() {
                let _ = write!(out, " {}", row.reason);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "moves: {} ({} moved)", self.moves.len(), self.moved_count());
        for record in &self.moves {
            let _ = write!(out, "  - {} -> {}: {:?}", record.from, record.to, record.status);
            if let Some(detail) = &record.detail {
                let _ = write!(out, " ({detail})");
            }
            out.push('\n');
        }
        let _ = writeln!(out, "collected_pages: {}", self.collected_pages);
        let _ = writeln!(out, "edits: {}", self.edits.len());
        for edit in &self.edits {
            let _ = writeln!(
                out,
                "  - {} ({:?}, {} replaced, {} attempt(s))",
                edit.title, edit.kind, edit.replaced, edit.attempts
            );
            if let Some(diff) = &edit.diff {
                for line in diff.lines() {
                    let _ = writeln!(out, "    {line}");
                }
            }
        }
        write_list(&mut out, "failures", &self.failures);
        write_list(&mut out, "warnings", &self.warnings);
        out
    }

    /// Sortable wikitable of the plan, for the report page.
    pub fn render_wikitext(&self) -> String {
        let mut out = String::new();
        out.push_str("{| class=\"wikitable sortable\"\n! From !! To !! Actions !! Reason\n");
        for row in &self.replacements {
            let _ = writeln!(
                out,
                "|-\n| [[:{}]] || [[:{}]] || {} || {}",
                row.from,
                row.to,
                row.actions.join(", "),
                escape_cell(&row.reason)
            );
        }
        out.push_str("|}\n");
        if !self.failures.is_empty() {
            out.push_str("\n== Failures ==\n");
            for failure in &self.failures {
                let _ = writeln!(out, "* <nowiki>{failure}</nowiki>");
            }
        }
        out
    }
}

fn write_list(out: &mut String, label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "{label}:");
    for item in items {
        let _ = writeln!(out, "  - {item}");
    }
}

fn escape_cell(value: &str) -> String {
    if value.contains('|') || value.contains('[') || value.contains('{') {
        format!("<nowiki>{value}</nowiki>")
    } else {
        value.to_string()
    }
}
