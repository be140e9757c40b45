use std::collections::BTreeSet;

use anyhow::{Context, Result};
use tracing::info;

use crate::options::{FollowUps, MoveOptions};
use crate::replacement::{Actions, Replacement};
use crate::store::{BacklinkKinds, ContentStore};
use crate::title::{NS_TEMPLATE, Title};

/// Pages whose text may reference a renamed title, sorted.
pub fn collect<S: ContentStore + ?Sized>(
    store: &mut S,
    replacements: &[Replacement],
    options: &MoveOptions,
) -> Result<Vec<Title>> {
    let mut pages = BTreeSet::new();
    let member_repointing = options.follows(FollowUps::FIX_CATEGORY_MEMBERS);

    for replacement in replacements
        .iter()
        .filter(|replacement| replacement.wants(Actions::UPDATE_LINKS))
    {
        let backlinks = store
            .backlinks(&replacement.from, BacklinkKinds::all())
            .with_context(|| format!("failed to load backlinks of {}", replacement.from))?;
        pages.extend(backlinks.into_iter().map(|title| title.page()));

        if member_repointing && replacement.from.is_category() {
            let members = store
                .category_members(&replacement.from, true)
                .with_context(|| format!("failed to load members of {}", replacement.from))?;
            pages.extend(members.into_iter().map(|title| title.page()));
        }

        pages.insert(replacement.to.page());
    }

    let collected = pages
        .into_iter()
        .filter(|title| !is_excluded(title, options))
        .collect::<Vec<_>>();
    info!(pages = collected.len(), "collected pages to re-examine");
    Ok(collected)
}

fn is_excluded(title: &Title, options: &MoveOptions) -> bool {
    if title.namespace() < 0 || options.excluded_namespaces.contains(&title.namespace()) {
        return true;
    }
    if options
        .report_page
        .as_ref()
        .is_some_and(|report| report.same_page(title))
    {
        return true;
    }
    options.template_docs_only && title.namespace() == NS_TEMPLATE && !title.is_doc_subpage()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use crate::title::NamespaceTable;

    fn linking(store: &MemoryStore, from: &str, to: &str) -> Replacement {
        Replacement::with_actions(store.title(from), store.title(to), Actions::UPDATE_LINKS, "")
    }

    fn names(titles: &[Title]) -> Vec<String> {
        titles.iter().map(Title::full_name).collect()
    }

    #[test]
    fn collects_backlinks_and_destinations_sorted() {
        let mut store = MemoryStore::with_pages(&[
            ("Zebra", "[[Widget]]"),
            ("Apple", "{{Widget}} [[Widget#Use]]"),
            ("Template:Widget", "tpl"),
            ("Unrelated", "[[Other]]"),
            ("Widget", "#REDIRECT [[Template:Widget]]"),
            ("Gadget", "g"),
        ]);
        let options = MoveOptions::new(&NamespaceTable::standard()).expect("options");
        let replacements = [linking(&store, "Widget", "Gadget")];
        let pages = collect(&mut store, &replacements, &options).expect("collect");
        assert_eq!(names(&pages), ["Apple", "Gadget", "Zebra"]);
    }

    #[test]
    fn skipped_replacements_contribute_nothing() {
        let mut store = MemoryStore::with_pages(&[("Ref", "[[X]]"), ("X", "x"), ("Y", "y")]);
        let options = MoveOptions::new(&NamespaceTable::standard()).expect("options");
        let mut replacement = linking(&store, "X", "Y");
        replacement.skip("Y exists");
        let pages = collect(&mut store, &[replacement], &options).expect("collect");
        assert!(pages.is_empty());
    }

    #[test]
    fn category_members_follow_member_repointing() {
        let mut store = MemoryStore::with_pages(&[
            ("Bolt", "[[Category:Parts]]"),
            ("Category:Small parts", "[[Category:Parts]]"),
            ("Nut", "[[Category:Small parts]]"),
        ]);
        let mut options = MoveOptions::new(&NamespaceTable::standard()).expect("options");
        let replacements = [linking(&store, "Category:Parts", "Category:Components")];

        let pages = collect(&mut store, &replacements, &options).expect("collect");
        assert_eq!(
            names(&pages),
            ["Bolt", "Nut", "Category:Components", "Category:Small parts"]
        );

        options.follow_ups.remove(FollowUps::FIX_CATEGORY_MEMBERS);
        let pages = collect(&mut store, &replacements, &options).expect("collect");
        assert_eq!(names(&pages), ["Category:Components"]);
    }

    #[test]
    fn exclusion_filter_applies() {
        let mut store = MemoryStore::with_pages(&[
            ("Template:Navbox", "[[Widget]]"),
            ("Template:Navbox/doc", "[[Widget]]"),
            ("User:Bot/Move report", "[[Widget]]"),
            ("Help:Widgets", "[[Widget]]"),
            ("Article", "[[Widget]]"),
        ]);
        let mut options = MoveOptions::new(&NamespaceTable::standard()).expect("options");
        options.template_docs_only = true;
        options.report_page = Some(store.title("User:Bot/Move report"));
        options.excluded_namespaces.insert(crate::title::NS_HELP);
        let replacements = [linking(&store, "Widget", "Gadget")];
        let pages = collect(&mut store, &replacements, &options).expect("collect");
        assert_eq!(names(&pages), ["Article", "Gadget", "Template:Navbox/doc"]);
    }
}
