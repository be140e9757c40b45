use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::options::{FollowUps, MoveMode, MoveOptions, RedirectOption};
use crate::replacement::{Actions, PageSnapshot, Replacement};
use crate::store::{BacklinkKinds, ContentStore, Page};
use crate::syntax::{collect_references, parse};
use crate::title::Title;

pub const REASON_DUPLICATE_TO: &str = "duplicate To page";
pub const REASON_MISSING: &str = "page doesn't exist";
pub const REASON_UNUSED: &str = "unused";
pub const REASON_PROTECTED_UNUSED: &str = "no links, but marked to not be deleted";
pub const REASON_REDIRECT: &str = "redirect from page move";
pub const REASON_ALREADY_PROPOSED: &str = "already proposed for deletion";

/// Decides what happens to a replacement whose destination already exists.
pub trait ConflictHandler {
    fn resolve(&self, replacement: &mut Replacement);
}

/// Leave the page alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipExisting;

impl ConflictHandler for SkipExisting {
    fn resolve(&self, replacement: &mut Replacement) {
        let reason = format!("{} exists", replacement.to);
        replacement.skip(reason);
    }
}

/// Hand the pair to the page editor instead of moving.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditExisting;

impl ConflictHandler for EditExisting {
    fn resolve(&self, replacement: &mut Replacement) {
        let reason = format!("{} exists; edit only", replacement.to);
        replacement.add_with_reason(Actions::EDIT, reason);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanReport {
    pub planned: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

/// Reject plans that name a page as its own destination.
pub fn validate_replacements(replacements: &[Replacement]) -> Result<()> {
    for replacement in replacements {
        if replacement.from.same_page(&replacement.to) {
            bail!(
                "replacement moves {} onto itself; aborting before any change",
                replacement.from
            );
        }
    }
    Ok(())
}

/// Classify every replacement. Reads from the store but never writes.
pub fn plan<S: ContentStore + ?Sized>(
    store: &mut S,
    replacements: &mut [Replacement],
    options: &MoveOptions,
    conflicts: &dyn ConflictHandler,
    already_proposed: &BTreeSet<Title>,
) -> Result<PlanReport> {
    validate_replacements(replacements)?;
    mark_duplicate_destinations(replacements);

    let snapshots = load_snapshots(store, replacements, options)?;
    for replacement in replacements.iter_mut() {
        if replacement.is_skipped() {
            continue;
        }
        replacement.from_snapshot = snapshots.get(&replacement.from.page()).copied();
        replacement.to_snapshot = snapshots.get(&replacement.to.page()).copied();
        classify(store, replacement, options, conflicts, already_proposed)?;
    }

    let mut report = PlanReport::default();
    for replacement in replacements.iter() {
        if replacement.is_unclassified() {
            warn!(replacement = %replacement, "planner left replacement without actions");
            report
                .warnings
                .push(format!("{replacement}: no action was planned"));
        } else if replacement.is_skipped() {
            report.skipped += 1;
        } else {
            report.planned += 1;
        }
    }
    info!(
        planned = report.planned,
        skipped = report.skipped,
        warnings = report.warnings.len(),
        "planned replacements"
    );
    Ok(report)
}

fn mark_duplicate_destinations(replacements: &mut [Replacement]) {
    let mut claims: BTreeMap<Title, Vec<usize>> = BTreeMap::new();
    for (index, replacement) in replacements.iter().enumerate() {
        if !replacement.is_skipped() {
            claims.entry(replacement.to.page()).or_default().push(index);
        }
    }
    for indices in claims.values().filter(|indices| indices.len() > 1) {
        for index in indices {
            replacements[*index].skip(REASON_DUPLICATE_TO);
        }
    }
}

fn load_snapshots<S: ContentStore + ?Sized>(
    store: &mut S,
    replacements: &[Replacement],
    options: &MoveOptions,
) -> Result<BTreeMap<Title, PageSnapshot>> {
    let titles = replacements
        .iter()
        .filter(|replacement| !replacement.is_skipped())
        .flat_map(|replacement| [replacement.from.page(), replacement.to.page()])
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    if titles.is_empty() {
        return Ok(BTreeMap::new());
    }

    let pages = store.load_pages(&titles)?;
    let mut snapshots = BTreeMap::new();
    for page in pages {
        let protected = is_protected(store, &page, options);
        snapshots.insert(page.title.page(), page.snapshot(protected));
    }
    Ok(snapshots)
}

fn is_protected<S: ContentStore + ?Sized>(store: &S, page: &Page, options: &MoveOptions) -> bool {
    if !page.exists || options.do_not_delete_templates.is_empty() {
        return false;
    }
    let references = collect_references(store.namespaces(), &parse(&page.text));
    options
        .do_not_delete_templates
        .iter()
        .any(|template| references.templates.iter().any(|used| used.same_page(template)))
}

fn is_unused<S: ContentStore + ?Sized>(store: &mut S, title: &Title) -> Result<bool> {
    if !store.backlinks(title, BacklinkKinds::all())?.is_empty() {
        return Ok(false);
    }
    if title.is_category() && !store.category_members(title, false)?.is_empty() {
        return Ok(false);
    }
    Ok(true)
}

fn classify<S: ContentStore + ?Sized>(
    store: &mut S,
    replacement: &mut Replacement,
    options: &MoveOptions,
    conflicts: &dyn ConflictHandler,
    already_proposed: &BTreeSet<Title>,
) -> Result<()> {
    let from = replacement.from_snapshot.unwrap_or_default();
    let to = replacement.to_snapshot.unwrap_or_default();
    let proposed = already_proposed.contains(&replacement.from.page());
    let propose = |replacement: &mut Replacement, reason: &str| {
        if !proposed {
            replacement.add_with_reason(Actions::PROPOSE, reason);
        }
    };

    let unused = from.exists
        && options.follows(FollowUps::PROPOSE_UNUSED)
        && is_unused(store, &replacement.from)?;

    if options.mode == MoveMode::None {
        replacement.add(Actions::UPDATE_LINKS);
        if unused && !from.protected_from_deletion {
            propose(replacement, REASON_UNUSED);
        }
        return Ok(());
    }

    if !from.exists {
        replacement.skip(REASON_MISSING);
        return Ok(());
    }

    if unused {
        if !from.protected_from_deletion {
            propose(replacement, REASON_UNUSED);
            if replacement.is_unclassified() {
                replacement.skip(REASON_ALREADY_PROPOSED);
            }
            return Ok(());
        }
        replacement.set_reason(REASON_PROTECTED_UNUSED);
    }

    if to.exists && options.mode != MoveMode::MoveOverExisting {
        conflicts.resolve(replacement);
        return Ok(());
    }

    replacement.add(Actions::MOVE | Actions::UPDATE_LINKS);
    if options.redirects == RedirectOption::CreateButProposeDeletion && !from.is_redirect {
        propose(replacement, REASON_REDIRECT);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use crate::title::NamespaceTable;

    fn replacements(store: &MemoryStore, pairs: &[(&str, &str)]) -> Vec<Replacement> {
        pairs
            .iter()
            .map(|(from, to)| Replacement::new(store.title(from), store.title(to)))
            .collect()
    }

    fn options() -> MoveOptions {
        MoveOptions::new(&NamespaceTable::standard()).expect("options")
    }

    fn run_plan(store: &mut MemoryStore, items: &mut [Replacement], options: &MoveOptions) -> PlanReport {
        plan(store, items, options, &SkipExisting, &BTreeSet::new()).expect("plan")
    }

    #[test]
    fn duplicate_destinations_skip_every_claimant() {
        let mut store = MemoryStore::with_pages(&[("A", "a [[X]]"), ("B", "b [[X]]"), ("X", "[[A]] [[B]]")]);
        let mut items = replacements(&store, &[("A", "C"), ("B", "C")]);
        let report = run_plan(&mut store, &mut items, &options());
        for item in &items {
            assert!(item.is_skipped());
            assert_eq!(item.reason(), REASON_DUPLICATE_TO);
        }
        assert_eq!(report.skipped, 2);
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn existing_destination_is_skipped_by_default() {
        let mut store = MemoryStore::with_pages(&[("X", "x"), ("Y", "y"), ("Ref", "[[X]]")]);
        let mut items = replacements(&store, &[("X", "Y")]);
        run_plan(&mut store, &mut items, &options());
        assert!(items[0].is_skipped());
        assert_eq!(items[0].reason(), "Y exists");
        assert!(!items[0].wants(Actions::UPDATE_LINKS));
    }

    #[test]
    fn edit_existing_handler_requests_edit_only() {
        let mut store = MemoryStore::with_pages(&[("X", "x"), ("Y", "y"), ("Ref", "[[X]]")]);
        let mut items = replacements(&store, &[("X", "Y")]);
        plan(&mut store, &mut items, &options(), &EditExisting, &BTreeSet::new()).expect("plan");
        assert_eq!(items[0].actions(), Actions::EDIT);
    }

    #[test]
    fn unused_category_is_proposed_instead_of_moved() {
        let mut store = MemoryStore::with_pages(&[("Category:Cat1", "An empty category.")]);
        let mut items = replacements(&store, &[("Category:Cat1", "Category:Cat2")]);
        run_plan(&mut store, &mut items, &options());
        assert_eq!(items[0].actions(), Actions::PROPOSE);
        assert_eq!(items[0].reason(), REASON_UNUSED);
    }

    #[test]
    fn category_with_members_is_moved() {
        let mut store = MemoryStore::with_pages(&[
            ("Category:Cat1", "Parts."),
            ("Bolt", "A bolt.\n[[Category:Cat1]]"),
        ]);
        let mut items = replacements(&store, &[("Category:Cat1", "Category:Cat2")]);
        run_plan(&mut store, &mut items, &options());
        assert_eq!(items[0].actions(), Actions::MOVE | Actions::UPDATE_LINKS);
    }

    #[test]
    fn protected_unused_page_is_moved_with_reason() {
        let mut store = MemoryStore::with_pages(&[("Keep me", "{{Do not delete}} text")]);
        let mut items = replacements(&store, &[("Keep me", "Kept")]);
        let mut options = options();
        options.do_not_delete_templates = vec![store.title("Template:Do not delete")];
        run_plan(&mut store, &mut items, &options);
        assert_eq!(items[0].actions(), Actions::MOVE | Actions::UPDATE_LINKS);
        assert_eq!(items[0].reason(), REASON_PROTECTED_UNUSED);
        assert!(items[0].from_snapshot.expect("snapshot").protected_from_deletion);
    }

    #[test]
    fn missing_source_is_skipped() {
        let mut store = MemoryStore::with_pages(&[("Other", "o")]);
        let mut items = replacements(&store, &[("Ghost", "Spirit")]);
        run_plan(&mut store, &mut items, &options());
        assert!(items[0].is_skipped());
        assert_eq!(items[0].reason(), REASON_MISSING);
    }

    #[test]
    fn link_fix_only_mode_never_moves() {
        let mut store = MemoryStore::with_pages(&[("Old", "o"), ("New", "n"), ("Ref", "[[Old]]")]);
        let mut items = replacements(&store, &[("Old", "New")]);
        let mut options = options();
        options.mode = MoveMode::None;
        run_plan(&mut store, &mut items, &options);
        assert_eq!(items[0].actions(), Actions::UPDATE_LINKS);
    }

    #[test]
    fn redirect_left_behind_can_be_proposed() {
        let mut store = MemoryStore::with_pages(&[
            ("Old", "text"),
            ("Ref", "[[Old]]"),
            ("Old alias", "#REDIRECT [[Old]]"),
            ("Ref2", "[[Old alias]]"),
        ]);
        let mut items = replacements(&store, &[("Old", "New"), ("Old alias", "New alias")]);
        let mut options = options();
        options.redirects = RedirectOption::CreateButProposeDeletion;
        run_plan(&mut store, &mut items, &options);
        assert_eq!(
            items[0].actions(),
            Actions::MOVE | Actions::UPDATE_LINKS | Actions::PROPOSE
        );
        assert_eq!(items[0].reason(), REASON_REDIRECT);
        assert_eq!(items[1].actions(), Actions::MOVE | Actions::UPDATE_LINKS);
    }

    #[test]
    fn already_proposed_page_is_not_proposed_twice() {
        let mut store = MemoryStore::with_pages(&[("Orphan", "{{Proposeddeletion|old}}")]);
        let mut items = replacements(&store, &[("Orphan", "Renamed orphan")]);
        let proposed = BTreeSet::from([store.title("Orphan")]);
        plan(&mut store, &mut items, &options(), &SkipExisting, &proposed).expect("plan");
        assert!(items[0].is_skipped());
        assert_eq!(items[0].reason(), REASON_ALREADY_PROPOSED);
        assert!(!items[0].actions().contains(Actions::PROPOSE));
    }

    #[test]
    fn self_move_aborts_without_touching_the_store() {
        let mut store = MemoryStore::with_pages(&[("Same", "s"), ("Other", "o")]);
        let mut items = replacements(&store, &[("Other", "Another"), ("Same", "same")]);
        let error = plan(&mut store, &mut items, &options(), &SkipExisting, &BTreeSet::new())
            .expect_err("self-move must fail");
        assert!(error.to_string().contains("onto itself"));
        assert!(items.iter().all(Replacement::is_unclassified));
        assert_eq!(store.mutation_count(), 0);
    }

    #[test]
    fn planning_is_deterministic() {
        let pages = [
            ("A", "[[B]]"),
            ("B", "[[A]]"),
            ("C", "c"),
            ("Category:Empty", ""),
        ];
        let pairs = [("A", "A2"), ("B", "C"), ("Category:Empty", "Category:Void"), ("D", "E")];
        let mut first_store = MemoryStore::with_pages(&pages);
        let mut first = replacements(&first_store, &pairs);
        run_plan(&mut first_store, &mut first, &options());
        let mut second_store = MemoryStore::with_pages(&pages);
        let mut second = replacements(&second_store, &pairs);
        run_plan(&mut second_store, &mut second, &options());
        assert_eq!(first, second);
    }
}
