use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::options::{FollowUps, MoveOptions};
use crate::replacement::{Actions, Replacement};
use crate::syntax::{
    LinkNode, Node, TagBody, TemplateNode, has_namespace_prefix, is_redirect, parse, render,
    resolve_link_target, resolve_template_name, split_gallery_line,
};
use crate::title::{NS_FILE, NS_MAIN, NS_MEDIA, NS_TEMPLATE, NamespaceTable, Title};

/// Renames that should be applied to page text, keyed by the old page.
#[derive(Debug, Clone, Default)]
pub struct ReplacementLookup {
    targets: BTreeMap<Title, Title>,
}

impl ReplacementLookup {
    pub fn new(replacements: &[Replacement]) -> Self {
        let targets = replacements
            .iter()
            .filter(|replacement| replacement.wants(Actions::UPDATE_LINKS))
            .map(|replacement| (replacement.from.page(), replacement.to.clone()))
            .collect();
        Self { targets }
    }

    pub fn get(&self, title: &Title) -> Option<&Title> {
        self.targets.get(&title.page())
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Rewrites template parameters that hold page names. Registered per
/// template title; runs after the template name itself was rewritten.
pub trait ParameterReplacer {
    /// Returns the number of parameters changed.
    fn replace_parameters(
        &self,
        template: &mut TemplateNode,
        table: &NamespaceTable,
        lookup: &ReplacementLookup,
    ) -> usize;
}

#[derive(Default)]
pub struct ParameterReplacers {
    by_template: BTreeMap<Title, Box<dyn ParameterReplacer>>,
}

impl ParameterReplacers {
    pub fn register(&mut self, template: Title, replacer: Box<dyn ParameterReplacer>) {
        self.by_template.insert(template.page(), replacer);
    }

    pub fn get(&self, template: &Title) -> Option<&dyn ParameterReplacer> {
        self.by_template.get(&template.page()).map(Box::as_ref)
    }

    pub fn len(&self) -> usize {
        self.by_template.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_template.is_empty()
    }
}

/// Rewrites parameters whose whole value is a page name, e.g. the
/// positional list of an `{{About}}`-style hatnote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNameParameters {
    #[serde(default)]
    pub positional: Vec<usize>,
    #[serde(default)]
    pub named: Vec<String>,
    #[serde(default)]
    pub default_namespace: i32,
}

impl ParameterReplacer for PageNameParameters {
    fn replace_parameters(
        &self,
        template: &mut TemplateNode,
        table: &NamespaceTable,
        lookup: &ReplacementLookup,
    ) -> usize {
        let mut replaced = 0;
        let mut position = 0;
        for param in &mut template.params {
            let selected = match &param.name {
                Some(name) => self.named.iter().any(|wanted| wanted == name.trim()),
                None => {
                    position += 1;
                    self.positional.contains(&position)
                }
            };
            if !selected {
                continue;
            }
            let Some(value) = plain_text(&param.value) else {
                continue;
            };
            if let Some(new_value) = self.rewrite_value(&value, table, lookup) {
                param.value = vec![Node::Text(new_value)];
                replaced += 1;
            }
        }
        replaced
    }
}

impl PageNameParameters {
    fn rewrite_value(
        &self,
        value: &str,
        table: &NamespaceTable,
        lookup: &ReplacementLookup,
    ) -> Option<String> {
        let core = value.trim();
        if core.is_empty() {
            return None;
        }
        let old = table.parse_title_in(core, self.default_namespace).ok()?;
        let to = lookup.get(&old)?;
        let new = retarget(&old, to);
        let text = if has_namespace_prefix(table, core) || new.namespace() != self.default_namespace
        {
            new.full_text()
        } else {
            match new.fragment() {
                Some(fragment) => format!("{}#{fragment}", new.name()),
                None => new.name().to_string(),
            }
        };
        Some(replace_core(value, &text))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteResult {
    pub text: String,
    pub replaced: usize,
}

impl RewriteResult {
    pub fn changed(&self) -> bool {
        self.replaced > 0
    }
}

/// Rewrites links, template invocations and gallery lines in page text.
pub struct Rewriter<'a> {
    table: &'a NamespaceTable,
    lookup: &'a ReplacementLookup,
    replacers: &'a ParameterReplacers,
    update_caption: bool,
    fix_category_members: bool,
}

#[derive(Debug, Default)]
struct WalkState {
    is_redirect_page: bool,
    seen_first_link: bool,
    in_gallery: bool,
    replaced: usize,
}

impl<'a> Rewriter<'a> {
    pub fn new(
        table: &'a NamespaceTable,
        lookup: &'a ReplacementLookup,
        replacers: &'a ParameterReplacers,
        options: &MoveOptions,
    ) -> Self {
        Self {
            table,
            lookup,
            replacers,
            update_caption: options.follows(FollowUps::UPDATE_CAPTION),
            fix_category_members: options.follows(FollowUps::FIX_CATEGORY_MEMBERS),
        }
    }

    pub fn rewrite(&self, page: &Title, text: &str) -> RewriteResult {
        if self.lookup.is_empty() {
            return RewriteResult {
                text: text.to_string(),
                replaced: 0,
            };
        }
        let mut nodes = parse(text);
        let mut state = WalkState {
            is_redirect_page: is_redirect(text),
            ..WalkState::default()
        };
        self.walk(&mut nodes, &mut state);
        if state.replaced == 0 {
            return RewriteResult {
                text: text.to_string(),
                replaced: 0,
            };
        }
        debug!(page = %page, replaced = state.replaced, "rewrote references");
        RewriteResult {
            text: render(&nodes),
            replaced: state.replaced,
        }
    }

    fn walk(&self, nodes: &mut [Node], state: &mut WalkState) {
        for node in nodes {
            match node {
                Node::Text(_) | Node::Comment(_) => {}
                Node::Link(link) => self.rewrite_link(link, state),
                Node::Template(template) => self.rewrite_template(template, state),
                Node::Argument(argument) => {
                    if let Some(default) = &mut argument.default {
                        self.walk(default, state);
                    }
                }
                Node::Tag(tag) => match &mut tag.body {
                    TagBody::Nodes(body) => self.walk(body, state),
                    TagBody::Raw(body) if tag.name.eq_ignore_ascii_case("gallery") => {
                        if let Some(rewritten) = self.rewrite_gallery(body, state) {
                            *body = rewritten;
                        }
                    }
                    TagBody::Raw(_) | TagBody::SelfClosing => {}
                },
            }
        }
    }

    fn rewrite_link(&self, link: &mut LinkNode, state: &mut WalkState) {
        let first_on_redirect = state.is_redirect_page && !state.seen_first_link;
        state.seen_first_link = true;
        if let Some(caption) = &mut link.caption {
            self.walk(caption, state);
        }

        let Some(target) = resolve_link_target(self.table, &link.target) else {
            return;
        };
        if target.is_embed() && target.title.is_category() && !self.fix_category_members {
            return;
        }
        let Some((old, new)) = self.resolve_rename(&target.title) else {
            return;
        };

        let mut caption_renamed = false;
        if self.update_caption
            && let Some(caption) = &mut link.caption
            && let Some(text) = plain_text(caption)
            && let Some(new_caption) = renamed_caption(&text, &old, &new)
        {
            *caption = vec![Node::Text(new_caption)];
            caption_renamed = true;
        }

        if !caption_renamed && !target.is_embed() {
            if let Some(caption) = &mut link.caption {
                // `[[Widget|]]` shows what the pipe trick made of the old title.
                if caption.is_empty() {
                    caption.push(Node::Text(pipe_trick(old.name()).to_string()));
                }
            } else if !first_on_redirect && !state.in_gallery {
                let written = link.target.trim();
                let written = written.strip_prefix(':').unwrap_or(written).trim_start();
                link.caption = Some(vec![Node::Text(written.to_string())]);
            }
        }

        let colon = if target.leading_colon { ":" } else { "" };
        let new_target = format!("{colon}{}", new.full_text());
        link.target = replace_core(&link.target, &new_target);
        state.replaced += 1;
    }

    fn rewrite_template(&self, template: &mut TemplateNode, state: &mut WalkState) {
        for param in &mut template.params {
            self.walk(&mut param.value, state);
        }

        let Some(name) = resolve_template_name(self.table, &template.name) else {
            return;
        };
        let mut current = name.title.clone();
        if let Some(to) = self.lookup.get(&name.title) {
            let core = match to.namespace() {
                NS_TEMPLATE => to.name().to_string(),
                NS_MAIN => format!(":{}", to.name()),
                _ => to.full_name(),
            };
            template.name = format!("{}{}{core}{}", name.leading, name.prefix, name.trailing);
            current = to.page();
            state.replaced += 1;
        }

        if let Some(replacer) = self.replacers.get(&current) {
            state.replaced += replacer.replace_parameters(template, self.table, self.lookup);
        }
    }

    fn rewrite_gallery(&self, body: &str, state: &mut WalkState) -> Option<String> {
        let was_in_gallery = state.in_gallery;
        state.in_gallery = true;
        let mut output = String::with_capacity(body.len());
        let mut changed = false;

        for raw_line in body.split_inclusive('\n') {
            let line = split_gallery_line(raw_line);
            let mut target = line.target.to_string();
            let mut line_changed = false;

            if !line.target.trim().is_empty()
                && let Ok(old) = self.table.parse_title_in(line.target.trim(), NS_FILE)
                && let Some(to) = self.lookup.get(&old)
            {
                let new = retarget(&old, to);
                let text = if has_namespace_prefix(self.table, line.target)
                    || new.namespace() != NS_FILE
                {
                    new.full_name()
                } else {
                    new.name().to_string()
                };
                target = replace_core(line.target, &text);
                state.replaced += 1;
                line_changed = true;
            }

            let caption = line.caption.map(|caption| {
                let before = state.replaced;
                let mut nodes = parse(caption);
                self.walk(&mut nodes, state);
                if state.replaced > before {
                    line_changed = true;
                    render(&nodes)
                } else {
                    caption.to_string()
                }
            });

            if line_changed {
                changed = true;
                output.push_str(&target);
                if let Some(caption) = caption {
                    output.push('|');
                    output.push_str(&caption);
                }
                output.push_str(line.line_end);
            } else {
                output.push_str(raw_line);
            }
        }

        state.in_gallery = was_in_gallery;
        changed.then_some(output)
    }

    /// Old page (as written, with fragment) and its new title.
    fn resolve_rename(&self, written: &Title) -> Option<(Title, Title)> {
        if written.namespace() == NS_MEDIA {
            let file = self
                .table
                .make_title(NS_FILE, written.name(), written.fragment().map(ToString::to_string))
                .ok()?;
            let to = self.lookup.get(&file)?;
            let new = retarget(&file, to);
            let media = if new.namespace() == NS_FILE {
                self.table
                    .make_title(NS_MEDIA, new.name(), new.fragment().map(ToString::to_string))
                    .ok()?
            } else {
                new
            };
            return Some((written.clone(), media));
        }
        let to = self.lookup.get(written)?;
        Some((written.clone(), retarget(written, to)))
    }
}

/// New title for a reference to `old`, keeping its fragment unless the
/// destination names one itself.
fn retarget(old: &Title, to: &Title) -> Title {
    if to.fragment().is_some() {
        to.clone()
    } else {
        to.with_fragment(old.fragment())
    }
}

/// Caption text for a link whose caption spelled out the old title.
fn renamed_caption(caption: &str, old: &Title, new: &Title) -> Option<String> {
    let core = caption.trim();
    let candidates = [
        (old.full_text(), new.full_text()),
        (old.full_name(), new.full_name()),
        (old.name().to_string(), new.name().to_string()),
    ];
    for (old_text, new_text) in candidates {
        if core == old_text {
            return Some(replace_core(caption, &new_text));
        }
        if core == lowercase_first(&old_text) {
            return Some(replace_core(caption, &lowercase_first(&new_text)));
        }
    }
    None
}

/// Replace the trimmed part of `original` with `core`, keeping the
/// surrounding whitespace.
fn replace_core(original: &str, core: &str) -> String {
    let start = original.len() - original.trim_start().len();
    let end = original.trim_end().len().max(start);
    format!("{}{core}{}", &original[..start], &original[end..])
}

/// Visible text of a pipe-trick link: the name without a trailing
/// parenthetical or comma qualifier.
fn pipe_trick(name: &str) -> &str {
    if let Some(open) = name.rfind(" (")
        && name.ends_with(')')
    {
        return name[..open].trim_end();
    }
    match name.split_once(", ") {
        Some((head, _)) => head,
        None => name,
    }
}

fn plain_text(nodes: &[Node]) -> Option<String> {
    let mut text = String::new();
    for node in nodes {
        match node {
            Node::Text(value) => text.push_str(value),
            _ => return None,
        }
    }
    Some(text)
}

fn lowercase_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replacement(table: &NamespaceTable, from: &str, to: &str) -> Replacement {
        Replacement::with_actions(
            table.parse_title(from).expect("parse from"),
            table.parse_title(to).expect("parse to"),
            Actions::MOVE | Actions::UPDATE_LINKS,
            "",
        )
    }

    fn rewrite_with(
        options: &MoveOptions,
        replacements: &[Replacement],
        replacers: &ParameterReplacers,
        text: &str,
    ) -> RewriteResult {
        let table = NamespaceTable::standard();
        let lookup = ReplacementLookup::new(replacements);
        let page = table.parse_title("Some page").expect("parse page");
        Rewriter::new(&table, &lookup, replacers, options).rewrite(&page, text)
    }

    fn rewrite(follow_ups: FollowUps, pairs: &[(&str, &str)], text: &str) -> String {
        let table = NamespaceTable::standard();
        let mut options = MoveOptions::new(&table).expect("options");
        options.follow_ups = follow_ups;
        let replacements = pairs
            .iter()
            .map(|(from, to)| replacement(&table, from, to))
            .collect::<Vec<_>>();
        rewrite_with(&options, &replacements, &ParameterReplacers::default(), text).text
    }

    #[test]
    fn bare_link_keeps_visible_text() {
        assert_eq!(
            rewrite(FollowUps::FIX_LINKS, &[("Widget", "Gadget")], "See [[Widget]]."),
            "See [[Gadget|Widget]]."
        );
    }

    #[test]
    fn caption_matching_old_title_is_updated() {
        let follow_ups = FollowUps::FIX_LINKS | FollowUps::UPDATE_CAPTION;
        assert_eq!(
            rewrite(follow_ups, &[("Widget", "Gadget")], "[[Widget|Widget]]"),
            "[[Gadget|Gadget]]"
        );
        assert_eq!(
            rewrite(follow_ups, &[("Widget", "Gadget")], "[[widget| widget ]] [[Widget]]"),
            "[[Gadget| gadget ]] [[Gadget|Widget]]"
        );
        assert_eq!(
            rewrite(follow_ups, &[("Widget", "Gadget")], "[[Widget|a widget]]"),
            "[[Gadget|a widget]]"
        );
    }

    #[test]
    fn missing_caption_is_written_out_even_when_captions_are_updated() {
        let follow_ups = FollowUps::FIX_LINKS | FollowUps::UPDATE_CAPTION;
        assert_eq!(
            rewrite(follow_ups, &[("Widget", "Gadget")], "[[Widget]] [[Widget|a widget]]"),
            "[[Gadget|Widget]] [[Gadget|a widget]]"
        );
        assert_eq!(
            rewrite(follow_ups, &[("Widget", "Gadget")], "#REDIRECT [[Widget]]"),
            "#REDIRECT [[Gadget]]"
        );
    }

    #[test]
    fn pipe_trick_keeps_old_visible_text() {
        let pairs = [
            ("Widget", "Gadget"),
            ("Help:Widget (tool)", "Help:Gadget"),
            ("Paris, Texas", "Paris (Texas)"),
        ];
        for follow_ups in [FollowUps::FIX_LINKS, FollowUps::FIX_LINKS | FollowUps::UPDATE_CAPTION] {
            assert_eq!(
                rewrite(
                    follow_ups,
                    &pairs,
                    "[[Widget|]] [[Help:Widget (tool)|]] [[Paris, Texas|]]",
                ),
                "[[Gadget|Widget]] [[Help:Gadget|Widget]] [[Paris (Texas)|Paris]]"
            );
        }
    }

    #[test]
    fn fragment_and_leading_colon_survive() {
        assert_eq!(
            rewrite(
                FollowUps::FIX_LINKS | FollowUps::FIX_CATEGORY_MEMBERS,
                &[("Widget", "Gadget"), ("Category:Tools", "Category:Devices")],
                "[[Widget#History|history]] [[ :Category:Tools ]]",
            ),
            "[[Gadget#History|history]] [[ :Category:Devices |Category:Tools]]"
        );
    }

    #[test]
    fn category_membership_needs_member_repointing() {
        let pairs = [("Category:Tools", "Category:Devices")];
        let text = "Body\n[[Category:Tools]]";
        assert_eq!(rewrite(FollowUps::FIX_LINKS, &pairs, text), text);
        assert_eq!(
            rewrite(FollowUps::FIX_LINKS | FollowUps::FIX_CATEGORY_MEMBERS, &pairs, text),
            "Body\n[[Category:Devices]]"
        );
    }

    #[test]
    fn first_link_of_redirect_gets_no_caption() {
        assert_eq!(
            rewrite(
                FollowUps::FIX_LINKS,
                &[("Widget", "Gadget")],
                "#REDIRECT [[Widget]]\n[[Widget]]",
            ),
            "#REDIRECT [[Gadget]]\n[[Gadget|Widget]]"
        );
    }

    #[test]
    fn file_embed_keeps_parameters() {
        assert_eq!(
            rewrite(
                FollowUps::FIX_LINKS,
                &[("File:Widget.png", "File:Gadget.png")],
                "[[File:Widget.png|thumb|A [[Widget]]]] [[Image:Widget.png]] [[Media:Widget.png]]",
            ),
            "[[File:Gadget.png|thumb|A [[Widget]]]] [[File:Gadget.png]] [[Media:Gadget.png]]"
        );
    }

    #[test]
    fn gallery_lines_are_rewritten_in_place() {
        let text = "<gallery>\nWidget.png|some caption\nOther.png|[[Widget]]\nFile:Widget.png\n</gallery>";
        assert_eq!(
            rewrite(
                FollowUps::FIX_LINKS,
                &[("File:Widget.png", "File:Gadget.png"), ("Widget", "Gadget")],
                text,
            ),
            "<gallery>\nGadget.png|some caption\nOther.png|[[Gadget]]\nFile:Gadget.png\n</gallery>"
        );
    }

    #[test]
    fn template_names_follow_destination_namespace() {
        let pairs = [
            ("Template:Infobox widget", "Template:Infobox gadget"),
            ("Template:Old stub", "Stub notes"),
        ];
        assert_eq!(
            rewrite(
                FollowUps::FIX_LINKS,
                &pairs,
                "{{ subst:infobox widget\n|name=x}}{{Template:Old stub}}{{#if:x|y}}",
            ),
            "{{ subst:Infobox gadget\n|name=x}}{{:Stub notes}}{{#if:x|y}}"
        );
    }

    #[test]
    fn links_inside_templates_and_refs_are_rewritten() {
        assert_eq!(
            rewrite(
                FollowUps::FIX_LINKS | FollowUps::UPDATE_CAPTION,
                &[("Widget", "Gadget")],
                "{{Note|See [[Widget]]}}<ref>[[Widget|Widget]]</ref>{{{1|[[Widget]]}}}",
            ),
            "{{Note|See [[Gadget|Widget]]}}<ref>[[Gadget|Gadget]]</ref>{{{1|[[Gadget|Widget]]}}}"
        );
    }

    #[test]
    fn parameter_replacer_rewrites_page_name_values() {
        let table = NamespaceTable::standard();
        let options = MoveOptions::new(&table).expect("options");
        let mut replacers = ParameterReplacers::default();
        replacers.register(
            table.parse_title("Template:About").expect("parse"),
            Box::new(PageNameParameters {
                positional: vec![2, 3],
                named: vec!["page".to_string()],
                default_namespace: NS_MAIN,
            }),
        );
        let replacements = [replacement(&table, "Widget", "Gadget")];
        let result = rewrite_with(
            &options,
            &replacements,
            &replacers,
            "{{About|Widget|the tool| Widget |page=Widget#Use|other=Widget}}",
        );
        assert_eq!(
            result.text,
            "{{About|Widget|the tool| Gadget |page=Gadget#Use|other=Widget}}"
        );
        assert_eq!(result.replaced, 2);
    }

    #[test]
    fn skipped_replacements_are_not_applied() {
        let table = NamespaceTable::standard();
        let options = MoveOptions::new(&table).expect("options");
        let mut skipped = replacement(&table, "Widget", "Gadget");
        skipped.skip("Gadget exists");
        let result = rewrite_with(
            &options,
            &[skipped],
            &ParameterReplacers::default(),
            "[[Widget]]",
        );
        assert_eq!(result.text, "[[Widget]]");
        assert!(!result.changed());
    }

    #[test]
    fn untouched_text_is_returned_verbatim() {
        let text = "{{broken [[Other]] <!-- x";
        assert_eq!(rewrite(FollowUps::FIX_LINKS, &[("Widget", "Gadget")], text), text);
    }
}
