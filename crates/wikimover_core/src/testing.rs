use std::collections::{BTreeMap, BTreeSet, VecDeque};

use anyhow::{Result, bail};

use crate::store::{BacklinkKinds, ContentStore, MoveRequest, MoveResult, Page, SaveStatus};
use crate::syntax::{collect_references, is_redirect, parse};
use crate::title::{NamespaceTable, Title};

const CONCURRENT_EDIT: &str = "\n<!-- concurrent edit -->";

#[derive(Debug, Clone)]
struct StoredPage {
    text: String,
    revision: u64,
}

/// In-memory wiki used by the engine tests.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    table: NamespaceTable,
    pages: BTreeMap<Title, StoredPage>,
    pub moves: Vec<MoveRequest>,
    pub saves: Vec<(Title, String)>,
    pending_conflicts: BTreeMap<Title, usize>,
    moves_before_crash: Option<usize>,
    offline_after_moves: Option<usize>,
    next_revision: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            table: NamespaceTable::standard(),
            pages: BTreeMap::new(),
            moves: Vec::new(),
            saves: Vec::new(),
            pending_conflicts: BTreeMap::new(),
            moves_before_crash: None,
            offline_after_moves: None,
            next_revision: 1,
        }
    }

    pub fn with_pages(pages: &[(&str, &str)]) -> Self {
        let mut store = Self::new();
        for (title, text) in pages {
            store.insert(title, text);
        }
        store
    }

    pub fn title(&self, text: &str) -> Title {
        self.table.parse_title(text).expect("parse test title")
    }

    pub fn insert(&mut self, title: &str, text: &str) {
        let title = self.title(title);
        self.put(title, text.to_string());
    }

    pub fn text(&self, title: &str) -> Option<&str> {
        self.pages
            .get(&self.title(title))
            .map(|page| page.text.as_str())
    }

    pub fn exists(&self, title: &str) -> bool {
        self.pages.contains_key(&self.title(title))
    }

    /// The next `times` saves of `title` race with another editor.
    pub fn conflict_on_save(&mut self, title: &str, times: usize) {
        let title = self.title(title);
        self.pending_conflicts.insert(title, times);
    }

    /// Fail every move after `count` successful ones, as if the process died.
    pub fn crash_after_moves(&mut self, count: usize) {
        self.moves_before_crash = Some(count);
    }

    /// Every call fails once `count` moves went through, so the job stops
    /// with an error right where a killed process would.
    pub fn go_offline_after_moves(&mut self, count: usize) {
        self.offline_after_moves = Some(count);
    }

    pub fn recover(&mut self) {
        self.moves_before_crash = None;
        self.offline_after_moves = None;
    }

    pub fn mutation_count(&self) -> usize {
        self.moves.len() + self.saves.len()
    }

    pub fn contents(&self) -> BTreeMap<String, String> {
        self.pages
            .iter()
            .map(|(title, page)| (title.full_name(), page.text.clone()))
            .collect()
    }

    fn ensure_online(&self) -> Result<()> {
        if self
            .offline_after_moves
            .is_some_and(|count| self.moves.len() >= count)
        {
            bail!("store unreachable");
        }
        Ok(())
    }

    fn put(&mut self, title: Title, text: String) {
        let revision = self.next_revision;
        self.next_revision += 1;
        self.pages.insert(title.page(), StoredPage { text, revision });
    }

    fn relocate(&mut self, from: &Title, to: &Title, leave_redirect: bool) {
        if let Some(page) = self.pages.remove(from) {
            self.put(to.page(), page.text);
            if leave_redirect {
                self.put(from.page(), format!("#REDIRECT [[{}]]", to.full_name()));
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for MemoryStore {
    fn namespaces(&self) -> &NamespaceTable {
        &self.table
    }

    fn load_page(&mut self, title: &Title) -> Result<Page> {
        self.ensure_online()?;
        let Some(stored) = self.pages.get(&title.page()) else {
            return Ok(Page::missing(title.page()));
        };
        let references = collect_references(&self.table, &parse(&stored.text));
        Ok(Page {
            title: title.page(),
            exists: true,
            is_redirect: is_redirect(&stored.text),
            is_disambiguation: references
                .templates
                .iter()
                .any(|template| template.name() == "Disambiguation"),
            text: stored.text.clone(),
            base_timestamp: Some(stored.revision.to_string()),
        })
    }

    fn save_page(&mut self, page: &Page, summary: &str, _minor: bool) -> Result<SaveStatus> {
        self.ensure_online()?;
        let title = page.title.page();
        if let Some(remaining) = self.pending_conflicts.get_mut(&title)
            && *remaining > 0
        {
            *remaining -= 1;
            let concurrent = self
                .pages
                .get(&title)
                .map(|stored| format!("{}{CONCURRENT_EDIT}", stored.text))
                .unwrap_or_else(|| CONCURRENT_EDIT.to_string());
            self.put(title.clone(), concurrent);
        }

        let current = self.pages.get(&title).map(|stored| stored.revision.to_string());
        if current != page.base_timestamp {
            return Ok(SaveStatus::EditConflict);
        }
        self.put(title.clone(), page.text.clone());
        self.saves.push((title, summary.to_string()));
        Ok(SaveStatus::Saved)
    }

    fn move_page(&mut self, request: &MoveRequest) -> Result<MoveResult> {
        self.ensure_online()?;
        let from = request.from.page();
        if !self.pages.contains_key(&from) {
            return Ok(MoveResult::SourceMissing);
        }
        if let Some(remaining) = self.moves_before_crash.as_mut() {
            if *remaining == 0 {
                bail!("simulated crash before moving {from}");
            }
            *remaining -= 1;
        }
        if let Some(existing) = self.pages.get(&request.to.page())
            && !is_redirect(&existing.text)
        {
            bail!("article already exists: {}", request.to);
        }

        let leave_redirect = !request.suppress_redirect;
        let mut side_effects = Vec::new();

        if request.move_talk
            && let (Some(talk_from), Some(talk_to)) = (
                self.table.talk_page(&from),
                self.table.talk_page(&request.to),
            )
            && self.pages.contains_key(&talk_from)
        {
            self.relocate(&talk_from, &talk_to, leave_redirect);
            side_effects.push((talk_from, talk_to));
        }

        if request.move_subpages {
            let subpages = self
                .pages
                .keys()
                .filter_map(|title| {
                    let suffix = title.subpage_suffix(&from)?;
                    let name = format!("{}{suffix}", request.to.name());
                    let target = self
                        .table
                        .make_title(request.to.namespace(), &name, None)
                        .ok()?;
                    Some((title.clone(), target))
                })
                .collect::<Vec<_>>();
            for (sub_from, sub_to) in subpages {
                self.relocate(&sub_from, &sub_to, leave_redirect);
                side_effects.push((sub_from, sub_to));
            }
        }

        self.relocate(&from, &request.to, leave_redirect);
        self.moves.push(request.clone());
        Ok(MoveResult::Moved { side_effects })
    }

    fn backlinks(&mut self, title: &Title, kinds: BacklinkKinds) -> Result<Vec<Title>> {
        self.ensure_online()?;
        let target = title.page();
        let mut found = Vec::new();
        for (page, stored) in &self.pages {
            if page.same_page(&target) {
                continue;
            }
            let references = collect_references(&self.table, &parse(&stored.text));
            let redirect_here = is_redirect(&stored.text)
                && references
                    .links
                    .first()
                    .is_some_and(|linked| linked.same_page(&target));
            if (kinds.contains(BacklinkKinds::LINKS) && refers(&references.links, &target))
                || (kinds.contains(BacklinkKinds::TRANSCLUSIONS) && refers(&references.templates, &target))
                || (kinds.contains(BacklinkKinds::FILE_USAGE) && refers(&references.files, &target))
                || (kinds.contains(BacklinkKinds::REDIRECTS) && redirect_here)
            {
                found.push(page.clone());
            }
        }
        Ok(found)
    }

    fn category_members(&mut self, category: &Title, recursive: bool) -> Result<Vec<Title>> {
        self.ensure_online()?;
        let mut members = BTreeSet::new();
        let mut visited = BTreeSet::from([category.page()]);
        let mut queue = VecDeque::from([category.page()]);
        while let Some(current) = queue.pop_front() {
            for (page, stored) in &self.pages {
                let references = collect_references(&self.table, &parse(&stored.text));
                if !references
                    .categories
                    .iter()
                    .any(|listed| listed.same_page(&current))
                {
                    continue;
                }
                members.insert(page.clone());
                if recursive && page.is_category() && visited.insert(page.clone()) {
                    queue.push_back(page.clone());
                }
            }
        }
        Ok(members.into_iter().collect())
    }
}

fn refers(titles: &[Title], target: &Title) -> bool {
    titles.iter().any(|linked| linked.same_page(target))
}
