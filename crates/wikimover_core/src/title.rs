use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use anyhow::{Result, bail};

use crate::config::CustomNamespace;

pub const NS_MEDIA: i32 = -2;
pub const NS_SPECIAL: i32 = -1;
pub const NS_MAIN: i32 = 0;
pub const NS_TALK: i32 = 1;
pub const NS_USER: i32 = 2;
pub const NS_PROJECT: i32 = 4;
pub const NS_FILE: i32 = 6;
pub const NS_MEDIAWIKI: i32 = 8;
pub const NS_TEMPLATE: i32 = 10;
pub const NS_HELP: i32 = 12;
pub const NS_CATEGORY: i32 = 14;
pub const NS_MODULE: i32 = 828;

const STANDARD_NAMESPACES: &[(i32, &str)] = &[
    (NS_MEDIA, "Media"),
    (NS_SPECIAL, "Special"),
    (NS_MAIN, ""),
    (NS_TALK, "Talk"),
    (NS_USER, "User"),
    (3, "User talk"),
    (NS_PROJECT, "Project"),
    (5, "Project talk"),
    (NS_FILE, "File"),
    (7, "File talk"),
    (NS_MEDIAWIKI, "MediaWiki"),
    (9, "MediaWiki talk"),
    (NS_TEMPLATE, "Template"),
    (11, "Template talk"),
    (NS_HELP, "Help"),
    (13, "Help talk"),
    (NS_CATEGORY, "Category"),
    (15, "Category talk"),
    (NS_MODULE, "Module"),
    (829, "Module talk"),
];

const STANDARD_ALIASES: &[(&str, i32)] = &[("Image", NS_FILE), ("Image talk", 7)];

const INVALID_TITLE_CHARS: &[char] = &['[', ']', '{', '}', '<', '>', '|'];

/// Namespace ids and names of one wiki, used to parse and print titles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceTable {
    names: BTreeMap<i32, String>,
    lookup: BTreeMap<String, i32>,
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl NamespaceTable {
    pub fn standard() -> Self {
        let mut table = Self {
            names: BTreeMap::new(),
            lookup: BTreeMap::new(),
        };
        for (id, name) in STANDARD_NAMESPACES {
            table.add_namespace(*id, name);
        }
        for (alias, id) in STANDARD_ALIASES {
            table.add_alias(alias, *id);
        }
        table
    }

    pub fn with_custom(custom: &[CustomNamespace]) -> Self {
        let mut table = Self::standard();
        for namespace in custom {
            table.add_namespace(namespace.id, &namespace.name);
            if let Some(talk) = &namespace.talk_name {
                table.add_namespace(namespace.id + 1, talk);
            }
        }
        table
    }

    pub fn add_namespace(&mut self, id: i32, name: &str) {
        let name = normalize_spaces(&name.replace('_', " "));
        if !name.is_empty() {
            self.lookup.insert(name.to_lowercase(), id);
        }
        self.names.insert(id, name);
    }

    pub fn add_alias(&mut self, alias: &str, id: i32) {
        let alias = normalize_spaces(&alias.replace('_', " "));
        if !alias.is_empty() {
            self.lookup.insert(alias.to_lowercase(), id);
        }
    }

    pub fn name(&self, id: i32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    pub fn id_for_prefix(&self, prefix: &str) -> Option<i32> {
        let key = normalize_spaces(&prefix.replace('_', " ")).to_lowercase();
        if key.is_empty() {
            return None;
        }
        self.lookup.get(&key).copied()
    }

    pub fn parse_title(&self, text: &str) -> Result<Title> {
        self.parse_title_in(text, NS_MAIN)
    }

    /// Parse `text`, falling back to `default_namespace` when it carries no
    /// recognised namespace prefix. A leading colon forces the main namespace.
    pub fn parse_title_in(&self, text: &str, default_namespace: i32) -> Result<Title> {
        let normalized = normalize_spaces(&text.replace('_', " "));
        let (mut body, mut default_namespace) = match normalized.strip_prefix(':') {
            Some(rest) => (rest.trim_start(), NS_MAIN),
            None => (normalized.as_str(), default_namespace),
        };

        let mut fragment = None;
        if let Some((page, section)) = body.split_once('#') {
            let section = section.trim();
            if !section.is_empty() {
                fragment = Some(section.to_string());
            }
            body = page.trim_end();
        }

        let mut name = body;
        if let Some((prefix, rest)) = body.split_once(':')
            && let Some(id) = self.id_for_prefix(prefix)
        {
            default_namespace = id;
            name = rest.trim_start();
        }

        if name.is_empty() {
            bail!("indecipherable title: {text:?}");
        }
        if name.contains(INVALID_TITLE_CHARS) {
            bail!("indecipherable title (invalid characters): {text:?}");
        }

        self.make_title(default_namespace, name, fragment)
    }

    pub fn make_title(&self, namespace: i32, name: &str, fragment: Option<String>) -> Result<Title> {
        let Some(namespace_name) = self.name(namespace) else {
            bail!("unknown namespace id {namespace} for title {name:?}");
        };
        let name = capitalize_first(&normalize_spaces(&name.replace('_', " ")));
        if name.is_empty() {
            bail!("indecipherable title: empty name in namespace {namespace}");
        }
        Ok(Title {
            namespace,
            namespace_name: namespace_name.to_string(),
            name,
            fragment,
        })
    }

    /// Talk page of a subject page, or `None` for talk and virtual namespaces.
    pub fn talk_page(&self, title: &Title) -> Option<Title> {
        if title.namespace < 0 || title.namespace % 2 == 1 {
            return None;
        }
        self.make_title(title.namespace + 1, &title.name, None).ok()
    }
}

/// A page identity: namespace id, normalized name and an optional fragment.
///
/// `==`, `Hash` and `Ord` consider the fragment; use [`Title::same_page`]
/// when only the page matters.
#[derive(Debug, Clone)]
pub struct Title {
    namespace: i32,
    namespace_name: String,
    name: String,
    fragment: Option<String>,
}

impl Title {
    pub fn namespace(&self) -> i32 {
        self.namespace
    }

    pub fn namespace_name(&self) -> &str {
        &self.namespace_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    pub fn full_name(&self) -> String {
        if self.namespace_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", self.namespace_name, self.name)
        }
    }

    pub fn full_text(&self) -> String {
        match &self.fragment {
            Some(fragment) => format!("{}#{fragment}", self.full_name()),
            None => self.full_name(),
        }
    }

    pub fn same_page(&self, other: &Title) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }

    pub fn page(&self) -> Title {
        self.with_fragment(None)
    }

    pub fn with_fragment(&self, fragment: Option<&str>) -> Title {
        Title {
            namespace: self.namespace,
            namespace_name: self.namespace_name.clone(),
            name: self.name.clone(),
            fragment: fragment.map(ToString::to_string),
        }
    }

    pub fn is_category(&self) -> bool {
        self.namespace == NS_CATEGORY
    }

    pub fn is_doc_subpage(&self) -> bool {
        self.name.ends_with("/doc")
    }

    /// Subpage suffix relative to `parent`, e.g. `/Archive 1`.
    pub fn subpage_suffix<'a>(&'a self, parent: &Title) -> Option<&'a str> {
        if self.namespace != parent.namespace {
            return None;
        }
        self.name
            .strip_prefix(parent.name.as_str())
            .filter(|suffix| suffix.starts_with('/'))
    }

    fn key(&self) -> (i32, &str, Option<&str>) {
        (self.namespace, &self.name, self.fragment.as_deref())
    }
}

impl PartialEq for Title {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Title {}

impl Hash for Title {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for Title {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Title {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_text())
    }
}

pub fn normalize_spaces(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut previous_was_space = false;

    for ch in value.chars() {
        if ch.is_whitespace() {
            if !previous_was_space {
                output.push(' ');
                previous_was_space = true;
            }
        } else {
            output.push(ch);
            previous_was_space = false;
        }
    }

    output.trim().to_string()
}

fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_title_normalizes_namespace_case_and_spacing() {
        let table = NamespaceTable::standard();
        let title = table.parse_title("category:_some__thing ").expect("parse");
        assert_eq!(title.namespace(), NS_CATEGORY);
        assert_eq!(title.name(), "Some thing");
        assert_eq!(title.full_name(), "Category:Some thing");
    }

    #[test]
    fn parse_title_resolves_aliases_and_leading_colon() {
        let table = NamespaceTable::standard();
        let image = table.parse_title("Image:Widget.png").expect("parse");
        assert_eq!(image.namespace(), NS_FILE);
        assert_eq!(image.full_name(), "File:Widget.png");

        let forced = table
            .parse_title_in(":Widget.png", NS_FILE)
            .expect("parse forced main");
        assert_eq!(forced.namespace(), NS_MAIN);
    }

    #[test]
    fn parse_title_keeps_unknown_prefix_in_name() {
        let table = NamespaceTable::standard();
        let title = table.parse_title("Star Trek: Voyager").expect("parse");
        assert_eq!(title.namespace(), NS_MAIN);
        assert_eq!(title.name(), "Star Trek: Voyager");
    }

    #[test]
    fn simple_and_full_equality_differ_on_fragment() {
        let table = NamespaceTable::standard();
        let plain = table.parse_title("Widget").expect("parse");
        let section = table.parse_title("widget#History").expect("parse");
        assert!(plain.same_page(&section));
        assert_ne!(plain, section);
        assert_eq!(plain, section.page());
        assert_eq!(section.full_text(), "Widget#History");
    }

    #[test]
    fn parse_title_rejects_indecipherable_input() {
        let table = NamespaceTable::standard();
        assert!(table.parse_title("").is_err());
        assert!(table.parse_title("Category:").is_err());
        assert!(table.parse_title("#Section only").is_err());
        assert!(table.parse_title("Bad[name]").is_err());
    }

    #[test]
    fn custom_namespaces_are_recognised() {
        let table = NamespaceTable::with_custom(&[CustomNamespace {
            name: "Lore".to_string(),
            id: 3000,
            talk_name: Some("Lore talk".to_string()),
        }]);
        let title = table.parse_title("lore:Origins").expect("parse");
        assert_eq!(title.namespace(), 3000);
        let talk = table.talk_page(&title).expect("talk page");
        assert_eq!(talk.full_name(), "Lore talk:Origins");
    }

    #[test]
    fn subpage_suffix_requires_slash_boundary() {
        let table = NamespaceTable::standard();
        let parent = table.parse_title("User:Bot").expect("parse");
        let child = table.parse_title("User:Bot/Log").expect("parse");
        let sibling = table.parse_title("User:Botany").expect("parse");
        assert_eq!(child.subpage_suffix(&parent), Some("/Log"));
        assert_eq!(sibling.subpage_suffix(&parent), None);
    }
}
