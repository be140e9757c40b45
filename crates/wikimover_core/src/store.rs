use anyhow::Result;
use bitflags::bitflags;

use crate::replacement::PageSnapshot;
use crate::syntax::is_redirect;
use crate::title::{NamespaceTable, Title};

/// A page as loaded from the store. Missing pages come back with
/// `exists == false` and empty text rather than as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: Title,
    pub exists: bool,
    pub is_redirect: bool,
    pub is_disambiguation: bool,
    pub text: String,
    /// Revision timestamp the text was read at; sent back on save so the
    /// store can detect a concurrent edit.
    pub base_timestamp: Option<String>,
}

impl Page {
    pub fn missing(title: Title) -> Self {
        Self {
            title,
            exists: false,
            is_redirect: false,
            is_disambiguation: false,
            text: String::new(),
            base_timestamp: None,
        }
    }

    pub fn with_text(title: Title, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            title,
            exists: true,
            is_redirect: is_redirect(&text),
            is_disambiguation: false,
            text,
            base_timestamp: None,
        }
    }

    pub fn snapshot(&self, protected_from_deletion: bool) -> PageSnapshot {
        PageSnapshot {
            exists: self.exists,
            is_redirect: self.is_redirect,
            is_disambiguation: self.is_disambiguation,
            protected_from_deletion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    /// Someone else edited the page since it was loaded.
    EditConflict,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BacklinkKinds: u8 {
        const LINKS = 1;
        const TRANSCLUSIONS = 1 << 1;
        const FILE_USAGE = 1 << 2;
        const REDIRECTS = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub from: Title,
    pub to: Title,
    pub summary: String,
    pub move_talk: bool,
    pub move_subpages: bool,
    pub suppress_redirect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    /// Moved; `side_effects` lists the extra (from, to) pairs the store
    /// moved along with the page (talk pages, subpages).
    Moved { side_effects: Vec<(Title, Title)> },
    SourceMissing,
}

/// Remote content store the engine reads from and writes to.
pub trait ContentStore {
    fn namespaces(&self) -> &NamespaceTable;

    fn load_page(&mut self, title: &Title) -> Result<Page>;

    fn load_pages(&mut self, titles: &[Title]) -> Result<Vec<Page>> {
        titles.iter().map(|title| self.load_page(title)).collect()
    }

    fn save_page(&mut self, page: &Page, summary: &str, minor: bool) -> Result<SaveStatus>;

    fn move_page(&mut self, request: &MoveRequest) -> Result<MoveResult>;

    fn backlinks(&mut self, title: &Title, kinds: BacklinkKinds) -> Result<Vec<Title>>;

    fn category_members(&mut self, category: &Title, recursive: bool) -> Result<Vec<Title>>;
}
