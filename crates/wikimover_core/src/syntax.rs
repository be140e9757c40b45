//! Lossless wikitext tree: `render(&parse(text)) == text` for every input.
//!
//! Only the constructs the mover rewrites are modelled (links, template
//! invocations, template arguments, comments and a fixed set of extension
//! tags); everything else stays as text.

use std::collections::HashSet;

use crate::title::{NS_FILE, NS_MAIN, NS_TEMPLATE, NamespaceTable, Title};

/// Tags whose bodies are kept verbatim.
const RAW_TAGS: &[&str] = &[
    "gallery",
    "nowiki",
    "pre",
    "syntaxhighlight",
    "source",
    "math",
    "templatedata",
    "imagemap",
    "inputbox",
    "categorytree",
];

/// Tags whose bodies are parsed as wikitext.
const WIKITEXT_TAGS: &[&str] = &[
    "ref",
    "references",
    "includeonly",
    "noinclude",
    "onlyinclude",
    "poem",
    "indicator",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Comment(String),
    Link(LinkNode),
    Template(TemplateNode),
    Argument(ArgumentNode),
    Tag(TagNode),
}

/// `[[target|caption]]`; `target` is kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkNode {
    pub target: String,
    pub caption: Option<Vec<Node>>,
}

/// `{{name|param|...}}`; `name` is kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateNode {
    pub name: String,
    pub params: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: Option<String>,
    pub value: Vec<Node>,
}

/// `{{{name|default}}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentNode {
    pub name: String,
    pub default: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagNode {
    pub name: String,
    pub attributes: String,
    pub body: TagBody,
    pub closing: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagBody {
    SelfClosing,
    Raw(String),
    Nodes(Vec<Node>),
}

impl TagNode {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

pub fn parse(text: &str) -> Vec<Node> {
    let mut parser = Parser {
        src: text,
        pos: 0,
        failed: HashSet::new(),
    };
    parser.parse_nodes(Stop::Eof).unwrap_or_else(|| vec![Node::Text(text.to_string())])
}

pub fn render(nodes: &[Node]) -> String {
    let mut out = String::new();
    render_into(nodes, &mut out);
    out
}

pub fn render_into(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) | Node::Comment(text) => out.push_str(text),
            Node::Link(link) => {
                out.push_str("[[");
                out.push_str(&link.target);
                if let Some(caption) = &link.caption {
                    out.push('|');
                    render_into(caption, out);
                }
                out.push_str("]]");
            }
            Node::Template(template) => {
                out.push_str("{{");
                out.push_str(&template.name);
                for param in &template.params {
                    out.push('|');
                    if let Some(name) = &param.name {
                        out.push_str(name);
                        out.push('=');
                    }
                    render_into(&param.value, out);
                }
                out.push_str("}}");
            }
            Node::Argument(argument) => {
                out.push_str("{{{");
                out.push_str(&argument.name);
                if let Some(default) = &argument.default {
                    out.push('|');
                    render_into(default, out);
                }
                out.push_str("}}}");
            }
            Node::Tag(tag) => {
                out.push('<');
                out.push_str(&tag.name);
                out.push_str(&tag.attributes);
                match &tag.body {
                    TagBody::SelfClosing => out.push_str("/>"),
                    TagBody::Raw(body) => {
                        out.push('>');
                        out.push_str(body);
                        out.push_str(&tag.closing);
                    }
                    TagBody::Nodes(body) => {
                        out.push('>');
                        render_into(body, out);
                        out.push_str(&tag.closing);
                    }
                }
            }
        }
    }
}

pub fn is_redirect(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed
        .get(..9)
        .is_some_and(|head| head.eq_ignore_ascii_case("#REDIRECT"))
}

/// A link target resolved to a title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub title: Title,
    pub leading_colon: bool,
}

impl LinkTarget {
    /// Category or file links without a leading colon categorize or embed
    /// the page instead of linking to it.
    pub fn is_embed(&self) -> bool {
        !self.leading_colon
            && matches!(
                self.title.namespace(),
                crate::title::NS_CATEGORY | NS_FILE | crate::title::NS_MEDIA
            )
    }
}

pub fn resolve_link_target(table: &NamespaceTable, target: &str) -> Option<LinkTarget> {
    let trimmed = target.trim();
    if trimmed.contains("://") || trimmed.starts_with("//") {
        return None;
    }
    let leading_colon = trimmed.starts_with(':');
    let title = table.parse_title(trimmed).ok()?;
    Some(LinkTarget {
        title,
        leading_colon,
    })
}

/// A template invocation name split into its parts so a rename can keep the
/// surrounding whitespace and any `subst:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateName<'a> {
    pub title: Title,
    pub leading: &'a str,
    pub prefix: &'a str,
    pub trailing: &'a str,
}

pub fn resolve_template_name<'a>(table: &NamespaceTable, raw: &'a str) -> Option<TemplateName<'a>> {
    let core = raw.trim();
    if core.is_empty() {
        return None;
    }
    let start = raw.len() - raw.trim_start().len();
    let end = start + core.len();
    let leading = &raw[..start];
    let trailing = &raw[end..];

    let mut prefix_len = 0;
    for modifier in ["safesubst:", "subst:"] {
        if core
            .get(..modifier.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(modifier))
        {
            prefix_len = modifier.len();
            break;
        }
    }
    let prefix = &core[..prefix_len];
    let name = core[prefix_len..].trim_start();
    if name.starts_with('#') {
        return None;
    }

    let title = if let Some(rest) = name.strip_prefix(':') {
        table.parse_title_in(rest, NS_MAIN).ok()?
    } else {
        table.parse_title_in(name, NS_TEMPLATE).ok()?
    };
    Some(TemplateName {
        title: title.page(),
        leading,
        prefix,
        trailing,
    })
}

/// One line of a `<gallery>` body: `target|caption`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryLine<'a> {
    pub target: &'a str,
    pub caption: Option<&'a str>,
    pub line_end: &'a str,
}

pub fn split_gallery_line(line: &str) -> GalleryLine<'_> {
    let content = line.trim_end_matches(['\r', '\n']);
    let line_end = &line[content.len()..];
    match content.split_once('|') {
        Some((target, caption)) => GalleryLine {
            target,
            caption: Some(caption),
            line_end,
        },
        None => GalleryLine {
            target: content,
            caption: None,
            line_end,
        },
    }
}

/// True when a gallery target names its namespace explicitly.
pub fn has_namespace_prefix(table: &NamespaceTable, target: &str) -> bool {
    target
        .trim()
        .split_once(':')
        .is_some_and(|(prefix, _)| table.id_for_prefix(prefix).is_some())
}

/// Titles a page refers to, gathered from its tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageReferences {
    pub links: Vec<Title>,
    pub categories: Vec<Title>,
    pub templates: Vec<Title>,
    pub files: Vec<Title>,
}

impl PageReferences {
    pub fn mentions(&self, title: &Title) -> bool {
        self.links
            .iter()
            .chain(&self.categories)
            .chain(&self.templates)
            .chain(&self.files)
            .any(|candidate| candidate.same_page(title))
    }
}

pub fn collect_references(table: &NamespaceTable, nodes: &[Node]) -> PageReferences {
    let mut references = PageReferences::default();
    collect_into(table, nodes, &mut references);
    references
}

fn collect_into(table: &NamespaceTable, nodes: &[Node], references: &mut PageReferences) {
    for node in nodes {
        match node {
            Node::Text(_) | Node::Comment(_) => {}
            Node::Link(link) => {
                if let Some(target) = resolve_link_target(table, &link.target) {
                    let title = target.title.page();
                    if target.is_embed() && title.is_category() {
                        references.categories.push(title);
                    } else if target.is_embed() {
                        references.files.push(title);
                    } else {
                        references.links.push(title);
                    }
                }
                if let Some(caption) = &link.caption {
                    collect_into(table, caption, references);
                }
            }
            Node::Template(template) => {
                if let Some(name) = resolve_template_name(table, &template.name) {
                    references.templates.push(name.title);
                }
                for param in &template.params {
                    collect_into(table, &param.value, references);
                }
            }
            Node::Argument(argument) => {
                if let Some(default) = &argument.default {
                    collect_into(table, default, references);
                }
            }
            Node::Tag(tag) => match &tag.body {
                TagBody::Nodes(body) => collect_into(table, body, references),
                TagBody::Raw(body) if tag.is("gallery") => {
                    for line in body.lines() {
                        let line = split_gallery_line(line);
                        if line.target.trim().is_empty() {
                            continue;
                        }
                        if let Ok(title) = table.parse_title_in(line.target, NS_FILE) {
                            references.files.push(title.page());
                        }
                    }
                }
                TagBody::Raw(_) | TagBody::SelfClosing => {}
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    Caption,
    Value,
    Default,
}

impl Stop {
    fn matches(self, rest: &str) -> bool {
        match self {
            Stop::Eof => false,
            Stop::Caption => rest.starts_with("]]"),
            Stop::Value => rest.starts_with('|') || rest.starts_with("}}"),
            Stop::Default => rest.starts_with("}}}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Construct {
    Link,
    Template,
    Argument,
    Tag,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    /// Openers that did not close. Whether a construct closes depends only
    /// on where it starts, so each one is tried once.
    failed: HashSet<(usize, Construct)>,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Parse until `stop` matches. `None` means the input ended first, which
    /// makes the enclosing construct plain text.
    fn parse_nodes(&mut self, stop: Stop) -> Option<Vec<Node>> {
        let mut nodes = Vec::new();
        let mut text_start = self.pos;

        loop {
            let rest = self.rest();
            if rest.is_empty() {
                push_text(&mut nodes, &self.src[text_start..self.pos]);
                return if stop == Stop::Eof { Some(nodes) } else { None };
            }
            if stop.matches(rest) {
                push_text(&mut nodes, &self.src[text_start..self.pos]);
                return Some(nodes);
            }

            let node_start = self.pos;
            let node = if rest.starts_with("<!--") {
                Some(self.parse_comment())
            } else if rest.starts_with("[[") {
                self.attempt(Construct::Link, Self::parse_link)
            } else if rest.starts_with("{{{") {
                self.attempt(Construct::Argument, Self::parse_argument)
                    .or_else(|| self.attempt(Construct::Template, Self::parse_template))
            } else if rest.starts_with("{{") {
                self.attempt(Construct::Template, Self::parse_template)
            } else if rest.starts_with('<') {
                self.attempt(Construct::Tag, Self::parse_tag)
            } else {
                None
            };

            match node {
                Some(node) => {
                    push_text(&mut nodes, &self.src[text_start..node_start]);
                    nodes.push(node);
                    text_start = self.pos;
                }
                None => {
                    let width = rest.chars().next().map_or(1, char::len_utf8);
                    self.pos += width;
                }
            }
        }
    }

    fn attempt(&mut self, construct: Construct, parse: fn(&mut Self) -> Option<Node>) -> Option<Node> {
        let saved = self.pos;
        if self.failed.contains(&(saved, construct)) {
            return None;
        }
        let node = parse(self);
        if node.is_none() {
            self.pos = saved;
            self.failed.insert((saved, construct));
        }
        node
    }

    fn parse_comment(&mut self) -> Node {
        let rest = self.rest();
        let end = rest[4..]
            .find("-->")
            .map_or(rest.len(), |index| index + 4 + 3);
        self.pos += end;
        Node::Comment(rest[..end].to_string())
    }

    fn parse_link(&mut self) -> Option<Node> {
        self.pos += 2;
        let rest = self.rest();
        for (index, ch) in rest.char_indices() {
            match ch {
                '|' => {
                    let target = &rest[..index];
                    if target.trim().is_empty() {
                        return None;
                    }
                    self.pos += index + 1;
                    let caption = self.parse_nodes(Stop::Caption)?;
                    self.pos += 2;
                    return Some(Node::Link(LinkNode {
                        target: target.to_string(),
                        caption: Some(caption),
                    }));
                }
                ']' if rest[index..].starts_with("]]") => {
                    let target = &rest[..index];
                    if target.trim().is_empty() {
                        return None;
                    }
                    self.pos += index + 2;
                    return Some(Node::Link(LinkNode {
                        target: target.to_string(),
                        caption: None,
                    }));
                }
                '[' | ']' | '{' | '}' | '<' | '>' | '\n' => return None,
                _ => {}
            }
        }
        None
    }

    fn parse_template(&mut self) -> Option<Node> {
        self.pos += 2;
        let rest = self.rest();
        let mut name_end = None;
        for (index, ch) in rest.char_indices() {
            match ch {
                '|' => {
                    name_end = Some(index);
                    break;
                }
                '}' if rest[index..].starts_with("}}") => {
                    name_end = Some(index);
                    break;
                }
                '{' | '}' | '[' | ']' | '<' => return None,
                _ => {}
            }
        }
        let name_end = name_end?;
        let name = &rest[..name_end];
        if name.trim().is_empty() {
            return None;
        }
        self.pos += name_end;

        let mut params = Vec::new();
        loop {
            let rest = self.rest();
            if rest.starts_with("}}") {
                self.pos += 2;
                return Some(Node::Template(TemplateNode {
                    name: name.to_string(),
                    params,
                }));
            }
            if !rest.starts_with('|') {
                return None;
            }
            self.pos += 1;
            let value = self.parse_nodes(Stop::Value)?;
            params.push(split_parameter(value));
        }
    }

    fn parse_argument(&mut self) -> Option<Node> {
        self.pos += 3;
        let rest = self.rest();
        for (index, ch) in rest.char_indices() {
            match ch {
                '|' => {
                    let name = &rest[..index];
                    self.pos += index + 1;
                    let default = self.parse_nodes(Stop::Default)?;
                    self.pos += 3;
                    return Some(Node::Argument(ArgumentNode {
                        name: name.to_string(),
                        default: Some(default),
                    }));
                }
                '}' if rest[index..].starts_with("}}}") => {
                    self.pos += index + 3;
                    return Some(Node::Argument(ArgumentNode {
                        name: rest[..index].to_string(),
                        default: None,
                    }));
                }
                '{' | '}' | '[' | ']' | '<' => return None,
                _ => {}
            }
        }
        None
    }

    fn parse_tag(&mut self) -> Option<Node> {
        let rest = self.rest();
        let name_len = rest[1..]
            .find(|ch: char| !ch.is_ascii_alphanumeric())
            .unwrap_or(rest.len() - 1);
        let name = &rest[1..1 + name_len];
        let lowered = name.to_ascii_lowercase();
        let raw_body = RAW_TAGS.contains(&lowered.as_str());
        if !raw_body && !WIKITEXT_TAGS.contains(&lowered.as_str()) {
            return None;
        }

        let after_name = &rest[1 + name_len..];
        if !after_name.starts_with(|ch: char| ch.is_whitespace() || ch == '>' || ch == '/') {
            return None;
        }
        let open_end = after_name.find('>')?;
        let open = &after_name[..open_end];
        if let Some(attributes) = open.strip_suffix('/') {
            self.pos += 1 + name_len + open_end + 1;
            return Some(Node::Tag(TagNode {
                name: name.to_string(),
                attributes: attributes.to_string(),
                body: TagBody::SelfClosing,
                closing: String::new(),
            }));
        }

        let body_start = self.pos + 1 + name_len + open_end + 1;
        let (close_start, close_end) = find_closing_tag(self.src, body_start, &lowered)?;
        let body_text = &self.src[body_start..close_start];
        let body = if raw_body {
            TagBody::Raw(body_text.to_string())
        } else {
            TagBody::Nodes(parse(body_text))
        };
        self.pos = close_end;
        Some(Node::Tag(TagNode {
            name: name.to_string(),
            attributes: open.to_string(),
            body,
            closing: self.src[close_start..close_end].to_string(),
        }))
    }
}

fn find_closing_tag(src: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let lowered = src[from..].to_ascii_lowercase();
    let needle = format!("</{name}");
    let mut search = 0;
    while let Some(found) = lowered[search..].find(&needle) {
        let start = search + found;
        let after = &lowered[start + needle.len()..];
        let trimmed = after.trim_start();
        if trimmed.starts_with('>') {
            let end = start + needle.len() + (after.len() - trimmed.len()) + 1;
            return Some((from + start, from + end));
        }
        search = start + needle.len();
    }
    None
}

fn split_parameter(mut value: Vec<Node>) -> Parameter {
    if let Some(Node::Text(text)) = value.first_mut()
        && let Some(index) = text.find('=')
    {
        let name = text[..index].to_string();
        let remainder = text[index + 1..].to_string();
        if remainder.is_empty() {
            value.remove(0);
        } else {
            *text = remainder;
        }
        return Parameter {
            name: Some(name),
            value,
        };
    }
    Parameter { name: None, value }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_lossless(text: &str) {
        assert_eq!(render(&parse(text)), text, "round trip of {text:?}");
    }

    #[test]
    fn render_reproduces_input_exactly() {
        for text in [
            "",
            "plain text with ] and } and | characters",
            "[[Widget]] and [[Widget|the widget]]s",
            "{{Infobox item|name = Widget|image=Widget.png|{{nested|[[Link]]}}}}",
            "{{{1|default [[Link]]}}}",
            "<gallery mode=\"packed\">\nWidget.png|A [[widget]]\nFile:Gadget.png\n</gallery>",
            "<ref name=\"a\">See [[Widget]]</ref><references/>",
            "<!-- [[Hidden]] -->[[Shown]]<!-- unclosed",
            "[[unclosed link and {{unclosed template",
            "[[File:Widget.png|thumb|A [[Widget]] in use]]",
            "<nowiki>[[Not a link]]</nowiki> <NOWIKI>x</nowiki >",
            "{{#if: {{{x|}}} | [[A]] | [[B]] }}",
            "ünïcödé [[Ünïcödé|ç]] {{Ŧemplate}}",
            "#REDIRECT [[Target]]",
        ] {
            assert_lossless(text);
        }
    }

    #[test]
    fn parse_builds_links_with_captions() {
        let nodes = parse("see [[Widget|the [[Gadget]] page]]");
        assert_eq!(nodes.len(), 2);
        let Node::Link(link) = &nodes[1] else {
            panic!("expected link, got {:?}", nodes[1]);
        };
        assert_eq!(link.target, "Widget");
        let caption = link.caption.as_ref().expect("caption");
        assert!(matches!(&caption[1], Node::Link(inner) if inner.target == "Gadget"));
    }

    #[test]
    fn parse_splits_named_and_positional_parameters() {
        let nodes = parse("{{About|Widget| page = Gadget }}");
        let Node::Template(template) = &nodes[0] else {
            panic!("expected template");
        };
        assert_eq!(template.name, "About");
        assert_eq!(template.params.len(), 2);
        assert_eq!(template.params[0].name, None);
        assert_eq!(template.params[1].name.as_deref(), Some(" page "));
        assert_eq!(render(&template.params[1].value), " Gadget ");
    }

    #[test]
    fn parse_keeps_gallery_raw_and_ref_parsed() {
        let nodes = parse("<gallery>\nA.png|[[B]]\n</gallery><ref>[[C]]</ref>");
        let Node::Tag(gallery) = &nodes[0] else {
            panic!("expected gallery");
        };
        assert!(matches!(&gallery.body, TagBody::Raw(body) if body == "\nA.png|[[B]]\n"));
        let Node::Tag(reference) = &nodes[1] else {
            panic!("expected ref");
        };
        assert!(matches!(&reference.body, TagBody::Nodes(body) if matches!(body[0], Node::Link(_))));
    }

    #[test]
    fn unclosed_constructs_fall_back_to_text() {
        let nodes = parse("[[Broken {{also broken");
        assert!(nodes.iter().all(|node| matches!(node, Node::Text(_))));
    }

    #[test]
    fn deeply_nested_unclosed_markup_parses_quickly() {
        for opener in ["{{a|", "[[a|", "{{{a|", "<ref>[[a|"] {
            let text = opener.repeat(200);
            let nodes = parse(&text);
            assert_eq!(render(&nodes), text);
        }
        let mixed = "{{a|[[b|{{{c|".repeat(60) + "]]";
        assert_eq!(render(&parse(&mixed)), mixed);
    }

    #[test]
    fn resolve_template_name_handles_prefixes() {
        let table = NamespaceTable::standard();
        let name = resolve_template_name(&table, " subst:about \n").expect("resolve");
        assert_eq!(name.title.full_name(), "Template:About");
        assert_eq!(name.prefix, "subst:");
        assert_eq!(name.leading, " ");
        assert_eq!(name.trailing, " \n");

        let main = resolve_template_name(&table, ":Widget").expect("resolve");
        assert_eq!(main.title.full_name(), "Widget");
        assert!(resolve_template_name(&table, "#if: x").is_none());
    }

    #[test]
    fn collect_references_classifies_titles() {
        let table = NamespaceTable::standard();
        let nodes = parse(
            "[[Widget]] [[Category:Tools]] [[:Category:Parts]] {{Stub}} [[File:A.png|thumb]]\n<gallery>\nB.png|b\n</gallery>",
        );
        let references = collect_references(&table, &nodes);
        let names = |titles: &[Title]| titles.iter().map(Title::full_name).collect::<Vec<_>>();
        assert_eq!(names(&references.links), ["Widget", "Category:Parts"]);
        assert_eq!(names(&references.categories), ["Category:Tools"]);
        assert_eq!(names(&references.templates), ["Template:Stub"]);
        assert_eq!(names(&references.files), ["File:A.png", "File:B.png"]);
    }

    #[test]
    fn is_redirect_is_case_insensitive() {
        assert!(is_redirect("  #redirect [[Target]]"));
        assert!(!is_redirect("Redirects are explained at [[Help:Redirect]]"));
    }
}
