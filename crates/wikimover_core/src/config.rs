use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::options::{FollowUps, MoveMode, MoveOptions, RedirectOption};
use crate::rewriter::{PageNameParameters, ParameterReplacers};
use crate::title::{NS_TEMPLATE, NamespaceTable};

pub const DEFAULT_USER_AGENT: &str = "wikimover/0.1";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiConfig {
    #[serde(default)]
    pub wiki: WikiSection,
    #[serde(default, rename = "move")]
    pub move_pages: MoveSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub url: Option<String>,
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub custom_namespaces: Vec<CustomNamespace>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CustomNamespace {
    pub name: String,
    pub id: i32,
    pub talk_name: Option<String>,
}

/// `[move]`: defaults for every job. Unset keys keep the built-in defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MoveSection {
    pub mode: Option<MoveMode>,
    pub redirects: Option<RedirectOption>,
    pub summary: Option<String>,
    pub move_talk: Option<bool>,
    pub move_subpages: Option<bool>,
    pub propose_unused: Option<bool>,
    pub fix_links: Option<bool>,
    pub update_caption: Option<bool>,
    pub fix_category_members: Option<bool>,
    pub template_docs_only: Option<bool>,
    pub report_page: Option<String>,
    pub proposal_template: Option<String>,
    #[serde(default)]
    pub do_not_delete_templates: Vec<String>,
    #[serde(default)]
    pub excluded_namespaces: Vec<i32>,
    pub max_edit_retries: Option<usize>,
    pub snapshot_path: Option<PathBuf>,
    #[serde(default)]
    pub parameter_replacers: Vec<ParameterReplacerConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ParameterReplacerConfig {
    pub template: String,
    #[serde(flatten)]
    pub parameters: PageNameParameters,
}

impl WikiConfig {
    /// Resolve the wiki API URL: env > config > derived from `url`.
    pub fn api_url_owned(&self) -> Option<String> {
        if let Ok(value) = env::var("WIKI_API_URL") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        if let Some(api_url) = &self.wiki.api_url {
            return Some(api_url.clone());
        }
        self.wiki.url.as_deref().and_then(derive_api_url)
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Ok(value) = env::var("WIKI_USER_AGENT") {
            let trimmed = value.trim().to_string();
            if !trimmed.is_empty() {
                return trimmed;
            }
        }
        self.wiki
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn namespace_table(&self) -> NamespaceTable {
        NamespaceTable::with_custom(&self.wiki.custom_namespaces)
    }
}

impl MoveSection {
    pub fn to_options(&self, table: &NamespaceTable) -> Result<MoveOptions> {
        let mut options = MoveOptions::new(table)?;
        if let Some(mode) = self.mode {
            options.mode = mode;
        }
        if let Some(redirects) = self.redirects {
            options.redirects = redirects;
        }
        if let Some(summary) = &self.summary {
            if summary.trim().is_empty() {
                bail!("[move] summary cannot be empty");
            }
            options.summary = summary.trim().to_string();
        }
        if let Some(move_talk) = self.move_talk {
            options.move_talk = move_talk;
        }
        if let Some(move_subpages) = self.move_subpages {
            options.move_subpages = move_subpages;
        }
        for (flag, value) in [
            (FollowUps::PROPOSE_UNUSED, self.propose_unused),
            (FollowUps::FIX_LINKS, self.fix_links),
            (FollowUps::UPDATE_CAPTION, self.update_caption),
            (FollowUps::FIX_CATEGORY_MEMBERS, self.fix_category_members),
        ] {
            if let Some(enabled) = value {
                options.follow_ups.set(flag, enabled);
            }
        }
        if let Some(template_docs_only) = self.template_docs_only {
            options.template_docs_only = template_docs_only;
        }
        if let Some(max_edit_retries) = self.max_edit_retries {
            options.max_edit_retries = max_edit_retries;
        }
        options.excluded_namespaces = self.excluded_namespaces.iter().copied().collect();

        if let Some(report_page) = &self.report_page {
            let title = table
                .parse_title(report_page)
                .with_context(|| format!("invalid [move] report_page: {report_page}"))?;
            options.report_page = Some(title);
            options.follow_ups.insert(FollowUps::EMIT_REPORT);
        }
        if let Some(template) = &self.proposal_template {
            options.proposal_template = table
                .parse_title_in(template, NS_TEMPLATE)
                .with_context(|| format!("invalid [move] proposal_template: {template}"))?;
        }
        options.do_not_delete_templates = self
            .do_not_delete_templates
            .iter()
            .map(|template| {
                table
                    .parse_title_in(template, NS_TEMPLATE)
                    .with_context(|| format!("invalid [move] do_not_delete_templates entry: {template}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(options)
    }

    pub fn parameter_replacers(&self, table: &NamespaceTable) -> Result<ParameterReplacers> {
        let mut replacers = ParameterReplacers::default();
        for entry in &self.parameter_replacers {
            let template = table
                .parse_title_in(&entry.template, NS_TEMPLATE)
                .with_context(|| format!("invalid parameter replacer template: {}", entry.template))?;
            if entry.parameters.positional.is_empty() && entry.parameters.named.is_empty() {
                bail!("parameter replacer for {template} selects no parameters");
            }
            replacers.register(template, Box::new(entry.parameters.clone()));
        }
        Ok(replacers)
    }
}

/// Load and parse a WikiConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiConfig> {
    if !config_path.exists() {
        return Ok(WikiConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Derive the API URL from a wiki base URL by appending `/api.php`.
pub fn derive_api_url(wiki_url: &str) -> Option<String> {
    let trimmed = wiki_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.ends_with("/api.php") {
        return Some(trimmed.to_string());
    }
    Some(format!("{trimmed}/api.php"))
}
