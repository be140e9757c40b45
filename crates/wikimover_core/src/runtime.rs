use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::WikiConfig;
use crate::persistence::{SNAPSHOT_FILENAME, SnapshotFile};

pub const STATE_DIR_NAME: &str = ".wikimover";
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Heuristic,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Heuristic => "heuristic",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub project_root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
    pub executable_dir: Option<PathBuf>,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        let executable_dir = env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(Path::to_path_buf));
        Ok(Self {
            cwd,
            executable_dir,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub project_root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub root_source: ValueSource,
    pub config_source: ValueSource,
}

#[derive(Debug, Clone)]
pub struct RuntimeStatus {
    pub state_dir_exists: bool,
    pub config_exists: bool,
    pub snapshot_path: PathBuf,
    pub snapshot_exists: bool,
    pub warnings: Vec<String>,
}

impl ResolvedPaths {
    pub fn diagnostics(&self) -> String {
        format!(
            "project_root={} ({})\nstate_dir={}\nconfig_path={} ({})",
            normalize_for_display(&self.project_root),
            self.root_source.as_str(),
            normalize_for_display(&self.state_dir),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
        )
    }

    /// Snapshot location: `[move] snapshot_path` if set, relative paths
    /// resolved against the project root; otherwise inside the state dir.
    pub fn snapshot_path(&self, config: &WikiConfig) -> PathBuf {
        match config.move_pages.snapshot_path.as_deref() {
            Some(path) => absolutize(path, &self.project_root),
            None => self.state_dir.join(SNAPSHOT_FILENAME),
        }
    }

    pub fn snapshot_file(&self, config: &WikiConfig) -> SnapshotFile {
        SnapshotFile::new(self.snapshot_path(config))
    }
}

pub fn inspect_runtime(paths: &ResolvedPaths, config: &WikiConfig) -> RuntimeStatus {
    let state_dir_exists = paths.state_dir.exists();
    let config_exists = paths.config_path.exists();
    let snapshot_path = paths.snapshot_path(config);
    let snapshot_exists = snapshot_path.is_file();

    let mut warnings = Vec::new();
    if !state_dir_exists {
        warnings.push(format!(
            "{STATE_DIR_NAME}/ is missing; run `wikimover init` first"
        ));
    }
    if !config_exists {
        warnings.push("config.toml is missing; built-in defaults apply".to_string());
    }
    if config.api_url_owned().is_none() {
        warnings.push("no API URL configured; set [wiki] api_url or WIKI_API_URL".to_string());
    }

    RuntimeStatus {
        state_dir_exists,
        config_exists,
        snapshot_path,
        snapshot_exists,
        warnings,
    }
}

#[derive(Debug, Clone)]
pub struct InitReport {
    pub created_dirs: Vec<PathBuf>,
    pub wrote_config: bool,
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let (project_root, root_source) = resolve_project_root(context, overrides, &lookup_env)
        .context("failed to resolve project root")?;
    if project_root.is_file() {
        bail!(
            "project root is a file, not a directory: {}",
            normalize_for_display(&project_root)
        );
    }
    let state_dir = project_root.join(STATE_DIR_NAME);

    let (config_path, config_source) = if let Some(path) = overrides.config.as_deref() {
        (absolutize(path, &project_root), ValueSource::Flag)
    } else if let Some(value) = lookup_env("WIKIMOVER_CONFIG") {
        (
            absolutize(Path::new(value.trim()), &project_root),
            ValueSource::Env,
        )
    } else {
        (state_dir.join(CONFIG_FILENAME), ValueSource::Default)
    };

    Ok(ResolvedPaths {
        project_root,
        state_dir,
        config_path,
        root_source,
        config_source,
    })
}

pub fn init_layout(paths: &ResolvedPaths, force: bool) -> Result<InitReport> {
    let mut created_dirs = Vec::new();
    if !paths.state_dir.exists() {
        fs::create_dir_all(&paths.state_dir)
            .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
        created_dirs.push(paths.state_dir.clone());
    }
    let wrote_config = write_text_file(&paths.config_path, &render_default_config(), force)?;
    Ok(InitReport {
        created_dirs,
        wrote_config,
    })
}

pub fn render_default_config() -> String {
    "# wikimover configuration (materialized by `wikimover init`)\n\n[wiki]\n# url = \"https://your-wiki.example.org\"\n# api_url = \"https://your-wiki.example.org/api.php\"\n# user_agent = \"wikimover/0.1\"\n\n# [[wiki.custom_namespaces]]\n# name = \"Lore\"\n# id = 3000\n# talk_name = \"Lore talk\"\n\n[move]\nmode = \"move_safely\"\nredirects = \"create\"\nsummary = \"Bulk page move\"\nmove_talk = true\nmove_subpages = true\npropose_unused = true\nfix_links = true\nupdate_caption = false\nfix_category_members = true\ntemplate_docs_only = false\nproposal_template = \"Proposeddeletion\"\nmax_edit_retries = 3\n# report_page = \"User:MoveBot/Report\"\n# do_not_delete_templates = [\"Keep\"]\n# excluded_namespaces = [2, 3]\n\n# [[move.parameter_replacers]]\n# template = \"About\"\n# positional = [2, 3]\n# named = [\"see\"]\n".to_string()
}

fn resolve_project_root<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: &F,
) -> Result<(PathBuf, ValueSource)>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = overrides.project_root.as_deref() {
        return Ok((absolutize(path, &context.cwd), ValueSource::Flag));
    }

    if let Some(value) = lookup_env("WIKIMOVER_PROJECT_ROOT") {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            bail!("WIKIMOVER_PROJECT_ROOT is set but empty");
        }
        return Ok((absolutize(Path::new(trimmed), &context.cwd), ValueSource::Env));
    }

    Ok(detect_project_root_heuristic(
        &context.cwd,
        context.executable_dir.as_deref(),
    ))
}

fn detect_project_root_heuristic(cwd: &Path, executable_dir: Option<&Path>) -> (PathBuf, ValueSource) {
    let mut seen = HashSet::new();
    for candidate in candidate_roots(cwd, executable_dir) {
        let key = normalize_for_display(&candidate);
        if !seen.insert(key) {
            continue;
        }
        if candidate.join(STATE_DIR_NAME).is_dir() {
            return (candidate, ValueSource::Heuristic);
        }
    }
    (cwd.to_path_buf(), ValueSource::Default)
}

fn candidate_roots(cwd: &Path, executable_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut out = cwd.ancestors().map(Path::to_path_buf).collect::<Vec<_>>();
    if let Some(exe_dir) = executable_dir {
        out.extend(exe_dir.ancestors().map(Path::to_path_buf));
    }
    out
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

pub fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
