use std::collections::BTreeSet;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::options::{MoveMode, MoveOptions, RedirectOption};
use crate::planner::ConflictHandler;
use crate::replacement::Replacement;
use crate::store::{ContentStore, MoveRequest, MoveResult, Page};
use crate::syntax::{collect_references, parse};
use crate::title::Title;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    Moved,
    AlreadyMoved,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct MoveOutcome {
    pub status: MoveStatus,
    pub detail: Option<String>,
    /// Pages the store moved along with this one that the plan did not
    /// know about yet.
    pub added: Vec<Replacement>,
}

impl MoveOutcome {
    fn status(status: MoveStatus, detail: Option<String>) -> Self {
        Self {
            status,
            detail,
            added: Vec::new(),
        }
    }
}

/// Move one page. Store failures are reported in the outcome, not returned.
pub fn move_one<S: ContentStore + ?Sized>(
    store: &mut S,
    replacement: &mut Replacement,
    known: &BTreeSet<Title>,
    options: &MoveOptions,
    conflicts: &dyn ConflictHandler,
) -> MoveOutcome {
    match try_move(store, replacement, known, options, conflicts) {
        Ok(outcome) => outcome,
        Err(error) => {
            warn!(replacement = %replacement, error = %format!("{error:#}"), "move failed");
            MoveOutcome::status(MoveStatus::Failed, Some(format!("{error:#}")))
        }
    }
}

fn try_move<S: ContentStore + ?Sized>(
    store: &mut S,
    replacement: &mut Replacement,
    known: &BTreeSet<Title>,
    options: &MoveOptions,
    conflicts: &dyn ConflictHandler,
) -> Result<MoveOutcome> {
    let pages = store.load_pages(&[replacement.from.page(), replacement.to.page()])?;
    let (from, to) = match pages.as_slice() {
        [from, to] => (from, to),
        _ => bail!("store returned {} pages for a pair of titles", pages.len()),
    };

    if !from.exists || redirects_to(store, from, &replacement.to) {
        info!(replacement = %replacement, "already moved");
        return Ok(MoveOutcome::status(MoveStatus::AlreadyMoved, None));
    }

    if to.exists && options.mode != MoveMode::MoveOverExisting {
        conflicts.resolve(replacement);
        info!(replacement = %replacement, reason = replacement.reason(), "destination appeared");
        return Ok(MoveOutcome::status(
            MoveStatus::Skipped,
            Some(replacement.reason().to_string()),
        ));
    }

    let request = MoveRequest {
        from: replacement.from.page(),
        to: replacement.to.page(),
        summary: options.summary.clone(),
        move_talk: options.move_talk,
        move_subpages: options.move_subpages,
        suppress_redirect: options.redirects == RedirectOption::Suppress,
    };
    match store.move_page(&request)? {
        MoveResult::SourceMissing => {
            info!(replacement = %replacement, "source vanished before move");
            Ok(MoveOutcome::status(MoveStatus::AlreadyMoved, None))
        }
        MoveResult::Moved { side_effects } => {
            info!(from = %request.from, to = %request.to, extra = side_effects.len(), "moved page");
            let added = side_effects
                .into_iter()
                .filter(|(from, _)| !known.contains(&from.page()))
                .map(|(from, to)| replacement.inherit(from, to))
                .collect();
            Ok(MoveOutcome {
                status: MoveStatus::Moved,
                detail: None,
                added,
            })
        }
    }
}

/// True when `page` is the redirect a previous move left behind.
fn redirects_to<S: ContentStore + ?Sized>(store: &S, page: &Page, target: &Title) -> bool {
    if !page.is_redirect {
        return false;
    }
    collect_references(store.namespaces(), &parse(&page.text))
        .links
        .first()
        .is_some_and(|linked| linked.same_page(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{EditExisting, SkipExisting};
    use crate::replacement::Actions;
    use crate::testing::MemoryStore;
    use crate::title::NamespaceTable;

    fn planned(store: &MemoryStore, from: &str, to: &str) -> Replacement {
        Replacement::with_actions(
            store.title(from),
            store.title(to),
            Actions::MOVE | Actions::UPDATE_LINKS,
            "",
        )
    }

    fn options() -> MoveOptions {
        MoveOptions::new(&NamespaceTable::standard()).expect("options")
    }

    #[test]
    fn moves_page_and_reports_side_effects() {
        let mut store = MemoryStore::with_pages(&[
            ("User:Bot", "main"),
            ("User:Bot/Log", "log"),
            ("User talk:Bot", "talk"),
        ]);
        let mut replacement = planned(&store, "User:Bot", "User:Robot");
        let known = BTreeSet::from([replacement.from.clone()]);
        let outcome = move_one(&mut store, &mut replacement, &known, &options(), &SkipExisting);

        assert_eq!(outcome.status, MoveStatus::Moved);
        let added = outcome
            .added
            .iter()
            .map(|added| (added.from.full_name(), added.to.full_name()))
            .collect::<Vec<_>>();
        assert_eq!(
            added,
            [
                ("User talk:Bot".to_string(), "User talk:Robot".to_string()),
                ("User:Bot/Log".to_string(), "User:Robot/Log".to_string()),
            ]
        );
        assert!(outcome.added.iter().all(|added| added.actions() == replacement.actions()));
        assert_eq!(store.text("User:Robot/Log"), Some("log"));
        assert_eq!(store.text("User:Bot"), Some("#REDIRECT [[User:Robot]]"));
    }

    #[test]
    fn known_side_effects_are_not_added_again() {
        let mut store = MemoryStore::with_pages(&[("Guide", "g"), ("Guide/Intro", "i")]);
        let mut replacement = planned(&store, "Guide", "Manual");
        let known = BTreeSet::from([store.title("Guide"), store.title("Guide/Intro")]);
        let outcome = move_one(&mut store, &mut replacement, &known, &options(), &SkipExisting);
        assert_eq!(outcome.status, MoveStatus::Moved);
        assert!(outcome.added.is_empty());
    }

    #[test]
    fn missing_source_or_left_redirect_counts_as_already_moved() {
        let mut store = MemoryStore::with_pages(&[("Old", "#REDIRECT [[New]]"), ("New", "text")]);
        let mut replacement = planned(&store, "Old", "New");
        let outcome = move_one(&mut store, &mut replacement, &BTreeSet::new(), &options(), &SkipExisting);
        assert_eq!(outcome.status, MoveStatus::AlreadyMoved);
        assert!(!replacement.is_skipped());

        let mut gone = planned(&store, "Vanished", "Elsewhere");
        let outcome = move_one(&mut store, &mut gone, &BTreeSet::new(), &options(), &SkipExisting);
        assert_eq!(outcome.status, MoveStatus::AlreadyMoved);
        assert!(store.moves.is_empty());
    }

    #[test]
    fn destination_created_since_planning_consults_conflict_handler() {
        let mut store = MemoryStore::with_pages(&[("X", "x"), ("Y", "someone made this")]);
        let mut skipped = planned(&store, "X", "Y");
        let outcome = move_one(&mut store, &mut skipped, &BTreeSet::new(), &options(), &SkipExisting);
        assert_eq!(outcome.status, MoveStatus::Skipped);
        assert!(skipped.is_skipped());
        assert_eq!(skipped.reason(), "Y exists");

        let mut edited = planned(&store, "X", "Y");
        move_one(&mut store, &mut edited, &BTreeSet::new(), &options(), &EditExisting);
        assert!(edited.wants(Actions::EDIT));
        assert!(store.moves.is_empty());
    }

    #[test]
    fn store_errors_become_failures() {
        let mut store = MemoryStore::with_pages(&[("A", "a")]);
        store.crash_after_moves(0);
        let mut replacement = planned(&store, "A", "B");
        let outcome = move_one(&mut store, &mut replacement, &BTreeSet::new(), &options(), &SkipExisting);
        assert_eq!(outcome.status, MoveStatus::Failed);
        assert!(outcome.detail.expect("detail").contains("simulated crash"));
        assert!(store.exists("A"));
    }

    #[test]
    fn suppressed_redirects_leave_nothing_behind() {
        let mut store = MemoryStore::with_pages(&[("A", "a")]);
        let mut options = options();
        options.redirects = RedirectOption::Suppress;
        let mut replacement = planned(&store, "A", "B");
        move_one(&mut store, &mut replacement, &BTreeSet::new(), &options, &SkipExisting);
        assert!(!store.exists("A"));
        assert_eq!(store.text("B"), Some("a"));
        assert!(store.moves[0].suppress_redirect);
    }
}
