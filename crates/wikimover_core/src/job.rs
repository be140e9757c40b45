use std::collections::BTreeSet;

use anyhow::{Context, Result, bail};
use similar::TextDiff;
use tracing::{info, warn};

use crate::collector::collect;
use crate::mover::{MoveStatus, move_one};
use crate::options::{FollowUps, MoveOptions};
use crate::persistence::SnapshotFile;
use crate::planner::{ConflictHandler, PlanReport, SkipExisting, plan};
use crate::replacement::{Actions, Replacement};
use crate::report::{EditKind, EditRecord, MoveRecord, MoveReport};
use crate::rewriter::{ParameterReplacers, ReplacementLookup, Rewriter};
use crate::store::{BacklinkKinds, ContentStore, Page, SaveStatus};
use crate::syntax::{collect_references, is_redirect, parse};
use crate::title::{NamespaceTable, Title};

/// Custom reconciliation for replacements carrying `Edit`.
pub trait PageEditor {
    /// New text for the destination page, or `None` to leave it alone.
    fn edit_page(&self, replacement: &Replacement, page: &Page) -> Result<Option<String>>;
}

/// Pluggable policies of a job.
pub struct JobHooks {
    pub conflicts: Box<dyn ConflictHandler>,
    pub replacers: ParameterReplacers,
    pub editor: Option<Box<dyn PageEditor>>,
}

impl Default for JobHooks {
    fn default() -> Self {
        Self {
            conflicts: Box::new(SkipExisting),
            replacers: ParameterReplacers::default(),
            editor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageChange {
    pub text: String,
    pub replaced: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAttempt {
    Missing,
    Unchanged,
    Saved { replaced: usize, attempts: usize },
    Previewed { replaced: usize, diff: String },
    GaveUp { attempts: usize },
}

/// Load, transform and save one page, reloading and re-applying the
/// transform on every edit conflict until `max_retries` is used up.
pub fn edit_with_retry<S, F>(
    store: &mut S,
    title: &Title,
    summary: &str,
    max_retries: usize,
    allow_create: bool,
    dry_run: bool,
    mut transform: F,
) -> Result<EditAttempt>
where
    S: ContentStore + ?Sized,
    F: FnMut(&Page) -> Result<Option<PageChange>>,
{
    let attempts = max_retries + 1;
    for attempt in 1..=attempts {
        let page = store
            .load_page(title)
            .with_context(|| format!("failed to load {title}"))?;
        if !page.exists && !allow_create {
            return Ok(EditAttempt::Missing);
        }
        let Some(change) = transform(&page)? else {
            return Ok(EditAttempt::Unchanged);
        };
        if change.text == page.text {
            return Ok(EditAttempt::Unchanged);
        }
        if dry_run {
            return Ok(EditAttempt::Previewed {
                replaced: change.replaced,
                diff: unified_diff(title, &page.text, &change.text),
            });
        }

        let updated = Page {
            text: change.text,
            ..page
        };
        match store
            .save_page(&updated, summary, true)
            .with_context(|| format!("failed to save {title}"))?
        {
            SaveStatus::Saved => {
                info!(page = %title, attempt, "saved page");
                return Ok(EditAttempt::Saved {
                    replaced: change.replaced,
                    attempts: attempt,
                });
            }
            SaveStatus::EditConflict => {
                warn!(page = %title, attempt, "edit conflict; reloading");
            }
        }
    }
    Ok(EditAttempt::GaveUp { attempts })
}

pub fn unified_diff(title: &Title, before: &str, after: &str) -> String {
    TextDiff::from_lines(before, after)
        .unified_diff()
        .context_radius(2)
        .header(&format!("{title} (current)"), &format!("{title} (updated)"))
        .to_string()
}

/// One bulk move: plan or resume, move, propose, edit, fix links, report.
pub struct MoveJob<'a, S: ContentStore + ?Sized> {
    store: &'a mut S,
    table: NamespaceTable,
    options: MoveOptions,
    hooks: JobHooks,
    snapshot: SnapshotFile,
}

impl<'a, S: ContentStore + ?Sized> MoveJob<'a, S> {
    pub fn new(
        store: &'a mut S,
        options: MoveOptions,
        hooks: JobHooks,
        snapshot: SnapshotFile,
    ) -> Self {
        let table = store.namespaces().clone();
        Self {
            store,
            table,
            options,
            hooks,
            snapshot,
        }
    }

    pub fn options(&self) -> &MoveOptions {
        &self.options
    }

    /// Classify `candidates` without persisting or changing anything.
    pub fn plan_only(&mut self, mut candidates: Vec<Replacement>) -> Result<(Vec<Replacement>, PlanReport)> {
        let already_proposed = self.already_proposed()?;
        let report = plan(
            &mut *self.store,
            &mut candidates,
            &self.options,
            self.hooks.conflicts.as_ref(),
            &already_proposed,
        )?;
        Ok((candidates, report))
    }

    /// Run the job. A snapshot left by an interrupted run takes precedence
    /// over `candidates`.
    pub fn run(&mut self, candidates: Vec<Replacement>) -> Result<MoveReport> {
        if let Some(saved) = self.snapshot.try_load(&self.table)? {
            warn!(
                path = %self.snapshot.path().display(),
                "unfinished run found; resuming it instead of planning"
            );
            let mut report = MoveReport::default();
            report.warnings.push(format!(
                "resumed the unfinished run in {}; new candidates were ignored",
                self.snapshot.path().display()
            ));
            return self.execute(saved, true, report);
        }

        let (replacements, plan_report) = self.plan_only(candidates)?;
        if !self.options.dry_run {
            self.snapshot.save(&replacements)?;
        }
        let report = MoveReport {
            warnings: plan_report.warnings,
            ..MoveReport::default()
        };
        self.execute(replacements, false, report)
    }

    /// Continue the run stored in the snapshot.
    pub fn resume(&mut self) -> Result<MoveReport> {
        let Some(saved) = self.snapshot.try_load(&self.table)? else {
            bail!(
                "no unfinished run at {}",
                self.snapshot.path().display()
            );
        };
        self.execute(saved, true, MoveReport::default())
    }

    fn already_proposed(&mut self) -> Result<BTreeSet<Title>> {
        let template = self.options.proposal_template.clone();
        let pages = self
            .store
            .backlinks(&template, BacklinkKinds::TRANSCLUSIONS)
            .with_context(|| format!("failed to list pages transcluding {template}"))?;
        Ok(pages.into_iter().map(|title| title.page()).collect())
    }

    fn execute(
        &mut self,
        mut replacements: Vec<Replacement>,
        resumed: bool,
        mut report: MoveReport,
    ) -> Result<MoveReport> {
        report.dry_run = self.options.dry_run;
        report.resumed = resumed;
        let already_proposed = self.already_proposed()?;

        let failed = if self.options.dry_run {
            BTreeSet::new()
        } else {
            self.move_pages(&mut replacements, &mut report)?
        };
        // Follow-ups of a failed move wait for the resumed run.
        let settled = replacements
            .iter()
            .filter(|replacement| !failed.contains(&replacement.from.page()))
            .cloned()
            .collect::<Vec<_>>();
        self.propose_deletions(&settled, &already_proposed, &mut report)?;
        self.apply_custom_edits(&settled, &mut report)?;
        if self.options.follows(FollowUps::FIX_LINKS) {
            self.fix_links(&settled, &mut report)?;
        }

        report.set_replacements(&replacements);
        report.success = report.failures.is_empty();
        self.publish_report(&mut report)?;

        if report.success && !self.options.dry_run {
            self.snapshot.delete()?;
        }
        info!(
            success = report.success,
            moved = report.moved_count(),
            edits = report.edits.len(),
            failures = report.failures.len(),
            "move job finished"
        );
        Ok(report)
    }

    /// Returns the sources whose move failed.
    fn move_pages(
        &mut self,
        replacements: &mut Vec<Replacement>,
        report: &mut MoveReport,
    ) -> Result<BTreeSet<Title>> {
        let mut failed = BTreeSet::new();
        let mut known = replacements
            .iter()
            .map(|replacement| replacement.from.page())
            .collect::<BTreeSet<_>>();
        let mut index = 0;
        while index < replacements.len() {
            if !replacements[index].wants(Actions::MOVE) {
                index += 1;
                continue;
            }
            let outcome = move_one(
                &mut *self.store,
                &mut replacements[index],
                &known,
                &self.options,
                self.hooks.conflicts.as_ref(),
            );
            let current = &replacements[index];
            report.moves.push(MoveRecord {
                from: current.from.full_name(),
                to: current.to.full_text(),
                status: outcome.status,
                detail: outcome.detail.clone(),
            });
            if outcome.status == MoveStatus::Failed {
                failed.insert(current.from.page());
                report.failures.push(format!(
                    "move {current}: {}",
                    outcome.detail.as_deref().unwrap_or("unknown error")
                ));
            }

            let grew = !outcome.added.is_empty();
            known.extend(outcome.added.iter().map(|added| added.from.page()));
            replacements.extend(outcome.added);
            if grew || outcome.status == MoveStatus::Skipped {
                self.snapshot.save(replacements)?;
            }
            index += 1;
        }
        Ok(failed)
    }

    fn propose_deletions(
        &mut self,
        replacements: &[Replacement],
        already_proposed: &BTreeSet<Title>,
        report: &mut MoveReport,
    ) -> Result<()> {
        let template = self.options.proposal_template.clone();
        let summary = self.options.summary_for("propose deletion");
        for replacement in replacements
            .iter()
            .filter(|replacement| replacement.wants(Actions::PROPOSE))
            .filter(|replacement| !already_proposed.contains(&replacement.from.page()))
        {
            let table = &self.table;
            let attempt = edit_with_retry(
                &mut *self.store,
                &replacement.from,
                &summary,
                self.options.max_edit_retries,
                false,
                self.options.dry_run,
                |page| Ok(add_proposal(table, &template, replacement.reason(), &page.text)),
            );
            record_edit(report, &replacement.from, EditKind::Propose, attempt);
        }
        Ok(())
    }

    fn apply_custom_edits(&mut self, replacements: &[Replacement], report: &mut MoveReport) -> Result<()> {
        let summary = self.options.summary_for("edit");
        for replacement in replacements
            .iter()
            .filter(|replacement| replacement.wants(Actions::EDIT))
        {
            let Some(editor) = self.hooks.editor.as_deref() else {
                report
                    .warnings
                    .push(format!("{replacement}: edit requested but no page editor is configured"));
                continue;
            };
            let attempt = edit_with_retry(
                &mut *self.store,
                &replacement.to,
                &summary,
                self.options.max_edit_retries,
                true,
                self.options.dry_run,
                |page| {
                    Ok(editor
                        .edit_page(replacement, page)?
                        .map(|text| PageChange { text, replaced: 1 }))
                },
            );
            record_edit(report, &replacement.to, EditKind::Custom, attempt);
        }
        Ok(())
    }

    fn fix_links(&mut self, replacements: &[Replacement], report: &mut MoveReport) -> Result<()> {
        let lookup = ReplacementLookup::new(replacements);
        if lookup.is_empty() {
            return Ok(());
        }
        let pages = collect(&mut *self.store, replacements, &self.options)?;
        report.collected_pages = pages.len();

        let rewriter = Rewriter::new(&self.table, &lookup, &self.hooks.replacers, &self.options);
        let summary = self.options.summary_for("fix links");
        for title in &pages {
            let attempt = edit_with_retry(
                &mut *self.store,
                title,
                &summary,
                self.options.max_edit_retries,
                false,
                self.options.dry_run,
                |page| {
                    let result = rewriter.rewrite(&page.title, &page.text);
                    Ok(result.changed().then_some(PageChange {
                        text: result.text,
                        replaced: result.replaced,
                    }))
                },
            );
            record_edit(report, title, EditKind::FixLinks, attempt);
        }
        Ok(())
    }

    fn publish_report(&mut self, report: &mut MoveReport) -> Result<()> {
        if !self.options.follows(FollowUps::EMIT_REPORT) {
            return Ok(());
        }
        let Some(page) = self.options.report_page.clone() else {
            report
                .warnings
                .push("report requested but no report page is configured".to_string());
            return Ok(());
        };
        let text = report.render_wikitext();
        let attempt = edit_with_retry(
            &mut *self.store,
            &page,
            &self.options.summary_for("report"),
            self.options.max_edit_retries,
            true,
            self.options.dry_run,
            |_| {
                Ok(Some(PageChange {
                    text: text.clone(),
                    replaced: 0,
                }))
            },
        );
        record_edit(report, &page, EditKind::Report, attempt);
        report.success = report.failures.is_empty();
        Ok(())
    }
}

/// Tag a page for deletion unless it already carries the template.
fn add_proposal(table: &NamespaceTable, template: &Title, reason: &str, text: &str) -> Option<PageChange> {
    let references = collect_references(table, &parse(text));
    if references.templates.iter().any(|used| used.same_page(template)) {
        return None;
    }
    let tag = format!("{{{{{}|{reason}}}}}", template.name());
    let text = if is_redirect(text) {
        format!("{}\n{tag}\n", text.trim_end())
    } else {
        format!("{tag}\n{text}")
    };
    Some(PageChange { text, replaced: 1 })
}

fn record_edit(report: &mut MoveReport, title: &Title, kind: EditKind, attempt: Result<EditAttempt>) {
    let title_text = title.full_name();
    match attempt {
        Ok(EditAttempt::Unchanged) => {}
        Ok(EditAttempt::Missing) => report
            .warnings
            .push(format!("{title_text}: page is missing; {kind:?} edit skipped")),
        Ok(EditAttempt::Saved { replaced, attempts }) => report.edits.push(EditRecord {
            title: title_text,
            kind,
            replaced,
            attempts,
            diff: None,
        }),
        Ok(EditAttempt::Previewed { replaced, diff }) => report.edits.push(EditRecord {
            title: title_text,
            kind,
            replaced,
            attempts: 0,
            diff: Some(diff),
        }),
        Ok(EditAttempt::GaveUp { attempts }) => report.failures.push(format!(
            "{title_text}: gave up after {attempts} edit conflict(s)"
        )),
        Err(error) => {
            warn!(page = %title_text, error = %format!("{error:#}"), "edit failed");
            report.failures.push(format!("{title_text}: {error:#}"));
        }
    }
}
