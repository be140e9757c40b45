use std::collections::BTreeSet;

use anyhow::Result;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::title::{NS_TEMPLATE, NamespaceTable, Title};

pub const DEFAULT_SUMMARY: &str = "Bulk page move";
pub const DEFAULT_PROPOSAL_TEMPLATE: &str = "Proposeddeletion";
pub const DEFAULT_MAX_EDIT_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    /// Only fix links; never move a page.
    None,
    /// Move unless the destination already exists.
    #[default]
    MoveSafely,
    /// Move even when the destination exists.
    MoveOverExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectOption {
    #[default]
    Create,
    Suppress,
    CreateButProposeDeletion,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FollowUps: u8 {
        const FIX_LINKS = 1;
        const PROPOSE_UNUSED = 1 << 1;
        const UPDATE_CAPTION = 1 << 2;
        const FIX_CATEGORY_MEMBERS = 1 << 3;
        const EMIT_REPORT = 1 << 4;
    }
}

impl Default for FollowUps {
    fn default() -> Self {
        FollowUps::FIX_LINKS | FollowUps::PROPOSE_UNUSED | FollowUps::FIX_CATEGORY_MEMBERS
    }
}

/// Everything a job needs to know besides the rename list itself.
#[derive(Debug, Clone)]
pub struct MoveOptions {
    pub mode: MoveMode,
    pub redirects: RedirectOption,
    pub follow_ups: FollowUps,
    pub summary: String,
    pub move_talk: bool,
    pub move_subpages: bool,
    pub max_edit_retries: usize,
    pub dry_run: bool,
    pub template_docs_only: bool,
    pub excluded_namespaces: BTreeSet<i32>,
    pub report_page: Option<Title>,
    pub proposal_template: Title,
    pub do_not_delete_templates: Vec<Title>,
}

impl MoveOptions {
    pub fn new(table: &NamespaceTable) -> Result<Self> {
        Ok(Self {
            mode: MoveMode::default(),
            redirects: RedirectOption::default(),
            follow_ups: FollowUps::default(),
            summary: DEFAULT_SUMMARY.to_string(),
            move_talk: true,
            move_subpages: true,
            max_edit_retries: DEFAULT_MAX_EDIT_RETRIES,
            dry_run: false,
            template_docs_only: false,
            excluded_namespaces: BTreeSet::new(),
            report_page: None,
            proposal_template: table.make_title(NS_TEMPLATE, DEFAULT_PROPOSAL_TEMPLATE, None)?,
            do_not_delete_templates: Vec::new(),
        })
    }

    pub fn follows(&self, follow_up: FollowUps) -> bool {
        self.follow_ups.contains(follow_up)
    }

    pub fn moves_pages(&self) -> bool {
        self.mode != MoveMode::None
    }

    /// Summary for a follow-up edit, e.g. `Bulk page move (fix links)`.
    pub fn summary_for(&self, step: &str) -> String {
        format!("{} ({step})", self.summary)
    }
}
