use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::replacement::Replacement;
use crate::title::NamespaceTable;

#[derive(Debug, Deserialize)]
struct RenameEntry {
    from: String,
    to: String,
}

/// Read a rename list: a JSON array of `{"from", "to"}` objects, or one
/// `from,to` (or tab-separated) pair per line.
pub fn load_rename_list(path: &Path, table: &NamespaceTable) -> Result<Vec<Replacement>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_rename_list(&content, table).with_context(|| format!("invalid rename list {}", path.display()))
}

pub fn parse_rename_list(content: &str, table: &NamespaceTable) -> Result<Vec<Replacement>> {
    let content = strip_bom(content);
    let pairs = if content.trim_start().starts_with('[') {
        let entries: Vec<RenameEntry> =
            serde_json::from_str(content).context("failed to parse JSON rename list")?;
        entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| (index + 1, entry.from, entry.to))
            .collect::<Vec<_>>()
    } else {
        parse_delimited(content)?
    };

    let mut replacements = Vec::with_capacity(pairs.len());
    for (line, from, to) in pairs {
        let from = table
            .parse_title(&from)
            .with_context(|| format!("entry {line}: invalid source title `{from}`"))?;
        let to = table
            .parse_title(&to)
            .with_context(|| format!("entry {line}: invalid destination title `{to}`"))?;
        replacements.push(Replacement::new(from, to));
    }
    if replacements.is_empty() {
        bail!("rename list is empty");
    }
    Ok(replacements)
}

fn parse_delimited(content: &str) -> Result<Vec<(usize, String, String)>> {
    let mut pairs = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let delimiter = if line.contains('\t') { '\t' } else { ',' };
        let fields = split_fields(line, delimiter)
            .with_context(|| format!("line {}: unterminated quote", index + 1))?;
        let [from, to] = <[String; 2]>::try_from(fields).map_err(|fields| {
            if fields.len() < 2 {
                anyhow!("line {}: expected two columns separated by a comma or tab", index + 1)
            } else {
                anyhow!("line {}: more than two columns", index + 1)
            }
        })?;
        if pairs.is_empty() && from.eq_ignore_ascii_case("from") && to.eq_ignore_ascii_case("to") {
            continue;
        }
        pairs.push((index + 1, from, to));
    }
    Ok(pairs)
}

/// Split one line on `delimiter`, honoring double quotes (`""` is a literal
/// quote). Unquoted field text is trimmed.
fn split_fields(line: &str, delimiter: char) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }
        if ch == '"' && field.trim().is_empty() && !quoted {
            field.clear();
            quoted = true;
            in_quotes = true;
        } else if ch == delimiter {
            fields.push(finish_field(&mut field, quoted));
            quoted = false;
        } else if !(quoted && ch.is_whitespace()) {
            field.push(ch);
        }
    }
    if in_quotes {
        return None;
    }
    fields.push(finish_field(&mut field, quoted));
    Some(fields)
}

fn finish_field(field: &mut String, quoted: bool) -> String {
    let value = std::mem::take(field);
    if quoted { value } else { value.trim().to_string() }
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn names(replacements: &[Replacement]) -> Vec<(String, String)> {
        replacements
            .iter()
            .map(|replacement| (replacement.from.full_name(), replacement.to.full_text()))
            .collect()
    }

    #[test]
    fn reads_json_list() {
        let table = NamespaceTable::standard();
        let list = parse_rename_list(
            r#"[{"from": "Widget", "to": "Gadget"}, {"from": "category:old", "to": "Category:New#Top"}]"#,
            &table,
        )
        .expect("parse");
        assert_eq!(
            names(&list),
            [
                ("Widget".to_string(), "Gadget".to_string()),
                ("Category:Old".to_string(), "Category:New#Top".to_string()),
            ]
        );
    }

    #[test]
    fn reads_csv_and_tsv_with_header_and_comments() {
        let table = NamespaceTable::standard();
        let csv = "\u{feff}from,to\n# tools\nWidget,Gadget\n\"Foo, Bar\"\t\"Baz\"\n\n";
        let list = parse_rename_list(csv, &table).expect("parse");
        assert_eq!(
            names(&list),
            [
                ("Widget".to_string(), "Gadget".to_string()),
                ("Foo, Bar".to_string(), "Baz".to_string()),
            ]
        );
    }

    #[test]
    fn quoted_csv_fields_may_contain_the_delimiter() {
        let table = NamespaceTable::standard();
        let csv = "\"Foo, Bar\",Baz\n\"Say \"\"hi\"\"\" , \"Greeting, formal\"\n";
        let list = parse_rename_list(csv, &table).expect("parse");
        assert_eq!(
            names(&list),
            [
                ("Foo, Bar".to_string(), "Baz".to_string()),
                ("Say \"hi\"".to_string(), "Greeting, formal".to_string()),
            ]
        );

        let error = parse_rename_list("\"Foo, Bar,Baz\n", &table).expect_err("must fail");
        assert!(error.to_string().contains("unterminated quote"));
    }

    #[test]
    fn rejects_malformed_lines() {
        let table = NamespaceTable::standard();
        let error = parse_rename_list("Widget\n", &table).expect_err("must fail");
        assert!(error.to_string().contains("line 1"));
        assert!(parse_rename_list("A,B,C\n", &table).is_err());
        assert!(parse_rename_list("# nothing\n", &table).is_err());

        let error = parse_rename_list("Widget,Bad[name]\n", &table).expect_err("must fail");
        assert!(error.to_string().contains("entry 1: invalid destination"));
    }

    #[test]
    fn load_rename_list_reports_path() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("moves.csv");
        fs::write(&path, "A,B\n").expect("write");
        let table = NamespaceTable::standard();
        assert_eq!(load_rename_list(&path, &table).expect("load").len(), 1);

        let error = load_rename_list(&temp.path().join("missing.csv"), &table).expect_err("must fail");
        assert!(error.to_string().contains("failed to read"));
    }
}
