use std::fmt;

use anyhow::{Result, bail};
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::title::Title;

bitflags! {
    /// What the job will do for one replacement. Bits are only ever added
    /// during a run; `SKIP` overrides every other bit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Actions: u8 {
        const MOVE = 1;
        const UPDATE_LINKS = 1 << 1;
        const EDIT = 1 << 2;
        const PROPOSE = 1 << 3;
        const SKIP = 1 << 4;
    }
}

const ACTION_NAMES: &[(Actions, &str)] = &[
    (Actions::MOVE, "move"),
    (Actions::UPDATE_LINKS, "update_links"),
    (Actions::EDIT, "edit"),
    (Actions::PROPOSE, "propose"),
    (Actions::SKIP, "skip"),
];

impl Actions {
    pub fn names(self) -> Vec<&'static str> {
        ACTION_NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut actions = Actions::empty();
        for name in names {
            let name = name.as_ref().trim();
            match ACTION_NAMES.iter().find(|(_, known)| *known == name) {
                Some((flag, _)) => actions |= *flag,
                None => bail!("unknown replacement action: {name:?}"),
            }
        }
        Ok(actions)
    }
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join(", "))
    }
}

impl Serialize for Actions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.names().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Actions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Actions::from_names(&names).map_err(serde::de::Error::custom)
    }
}

/// State of a page as seen once by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageSnapshot {
    pub exists: bool,
    pub is_redirect: bool,
    pub is_disambiguation: bool,
    pub protected_from_deletion: bool,
}

/// One planned rename of `from` to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub from: Title,
    pub to: Title,
    pub from_snapshot: Option<PageSnapshot>,
    pub to_snapshot: Option<PageSnapshot>,
    actions: Actions,
    reason: String,
}

impl Replacement {
    pub fn new(from: Title, to: Title) -> Self {
        Self::with_actions(from, to, Actions::empty(), String::new())
    }

    pub fn with_actions(from: Title, to: Title, actions: Actions, reason: impl Into<String>) -> Self {
        Self {
            from,
            to,
            from_snapshot: None,
            to_snapshot: None,
            actions,
            reason: reason.into(),
        }
    }

    /// A replacement for a page the store moved alongside `self`.
    pub fn inherit(&self, from: Title, to: Title) -> Self {
        Self::with_actions(from, to, self.actions, self.reason.clone())
    }

    pub fn actions(&self) -> Actions {
        self.actions
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn add(&mut self, actions: Actions) {
        self.actions |= actions;
    }

    pub fn add_with_reason(&mut self, actions: Actions, reason: impl Into<String>) {
        self.actions |= actions;
        self.reason = reason.into();
    }

    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.add_with_reason(Actions::SKIP, reason);
    }

    pub fn is_skipped(&self) -> bool {
        self.actions.contains(Actions::SKIP)
    }

    /// True when every bit in `actions` is set and the entry is not skipped.
    pub fn wants(&self, actions: Actions) -> bool {
        !self.is_skipped() && self.actions.contains(actions)
    }

    pub fn is_unclassified(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Display for Replacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
