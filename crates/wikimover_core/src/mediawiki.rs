use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::fmt;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_USER_AGENT, WikiConfig};
use crate::store::{BacklinkKinds, ContentStore, MoveRequest, MoveResult, Page, SaveStatus};
use crate::title::{NS_CATEGORY, NS_FILE, NamespaceTable, Title};

const TITLES_PER_QUERY: usize = 50;

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_env() -> Self {
        Self::from_env_with_defaults("", DEFAULT_USER_AGENT)
    }

    pub fn from_config(config: &WikiConfig) -> Self {
        let api_default = config.api_url_owned().unwrap_or_default();
        Self::from_env_with_defaults(&api_default, &config.user_agent())
    }

    fn from_env_with_defaults(api_url_default: &str, user_agent_default: &str) -> Self {
        Self {
            api_url: env_value("WIKI_API_URL", api_url_default),
            user_agent: env_value("WIKI_USER_AGENT", user_agent_default),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

/// An `error` object returned by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: String,
    pub info: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MediaWiki API error [{}]: {}", self.code, self.info)
    }
}

impl std::error::Error for ApiError {}

fn api_error_code(error: &anyhow::Error) -> Option<&str> {
    error
        .downcast_ref::<ApiError>()
        .map(|api| api.code.as_str())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
}

/// Blocking MediaWiki API client backing [`ContentStore`].
pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    table: NamespaceTable,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig, table: NamespaceTable) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            bail!("no MediaWiki API URL configured; set [wiki] api_url or WIKI_API_URL");
        }
        Url::parse(&config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            table,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json(
            Method::Get,
            &[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
                ("type", "login".to_string()),
            ],
            false,
        )?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json(
            Method::Post,
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                info!(user = username, "logged in");
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    /// Log in with `WIKI_BOT_USER`/`WIKI_BOT_PASS`. Returns `false` when
    /// neither is set.
    pub fn login_from_env(&mut self) -> Result<bool> {
        let username = env::var("WIKI_BOT_USER").ok().filter(|value| !value.trim().is_empty());
        let password = env::var("WIKI_BOT_PASS").ok().filter(|value| !value.is_empty());
        match (username, password) {
            (Some(username), Some(password)) => {
                self.login(username.trim(), &password)?;
                Ok(true)
            }
            (None, None) => Ok(false),
            (Some(_), None) => bail!("WIKI_BOT_USER is set but WIKI_BOT_PASS is missing"),
            (None, Some(_)) => bail!("WIKI_BOT_PASS is set but WIKI_BOT_USER is missing"),
        }
    }

    /// Extend the namespace table with the wiki's own namespaces and aliases.
    pub fn load_site_namespaces(&mut self) -> Result<usize> {
        let response = self.request_json(
            Method::Get,
            &[
                ("action", "query".to_string()),
                ("meta", "siteinfo".to_string()),
                ("siprop", "namespaces|namespacealiases".to_string()),
            ],
            false,
        )?;
        let parsed: SiteInfoResponse =
            serde_json::from_value(response).context("failed to decode siteinfo response")?;
        let count = apply_site_namespaces(&mut self.table, parsed.query);
        debug!(namespaces = count, "loaded site namespaces");
        Ok(count)
    }

    fn request_json(
        &mut self,
        method: Method,
        params: &[(&str, String)],
        is_write: bool,
    ) -> Result<Value> {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };
        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let request = match method {
                Method::Get => self.client.get(&self.config.api_url).query(&pairs),
                Method::Post => self.client.post(&self.config.api_url).form(&pairs),
            };
            let response = request
                .header("User-Agent", self.config.user_agent.clone())
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    if let Some(error) = payload.get("error") {
                        return Err(api_error(error).into());
                    }
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    /// POST a write action with a CSRF token, fetching a fresh token once
    /// if the cached one was rejected.
    fn request_write(&mut self, params: &[(&str, String)]) -> Result<Value> {
        for refreshed in [false, true] {
            let token = self.ensure_csrf_token()?;
            let mut with_token = params.to_vec();
            with_token.push(("token", token));
            match self.request_json(Method::Post, &with_token, true) {
                Err(error) if !refreshed && api_error_code(&error) == Some("badtoken") => {
                    warn!("csrf token rejected; fetching a new one");
                    self.csrf_token = None;
                }
                other => return other,
            }
        }
        bail!("MediaWiki rejected a freshly fetched csrf token")
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json(
            Method::Get,
            &[
                ("action", "query".to_string()),
                ("meta", "tokens".to_string()),
            ],
            false,
        )?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }

    fn list_titles(&mut self, list: ListQuery, params: &[(&str, String)]) -> Result<Vec<Title>> {
        let mut titles = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut request = vec![
                ("action", "query".to_string()),
                ("list", list.name().to_string()),
                (list.limit_key(), "max".to_string()),
            ];
            request.extend(params.iter().cloned());
            if let Some(token) = &continue_token {
                request.push((list.continue_key(), token.clone()));
            }

            let response = self.request_json(Method::Get, &request, false)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .with_context(|| format!("failed to decode {} API response", list.name()))?;
            let (items, next) = list.take(parsed);
            titles.extend(items.into_iter().filter_map(|item| self.parse_remote_title(&item.title)));

            continue_token = next;
            if continue_token.is_none() {
                break;
            }
        }

        Ok(titles)
    }

    fn parse_remote_title(&self, text: &str) -> Option<Title> {
        match self.table.parse_title(text) {
            Ok(title) => Some(title),
            Err(error) => {
                warn!(title = text, error = %error, "ignoring unparseable title from API");
                None
            }
        }
    }

    fn category_level(&mut self, category: &Title) -> Result<Vec<Title>> {
        self.list_titles(
            ListQuery::CategoryMembers,
            &[
                ("cmtitle", category.full_name()),
                ("cmtype", "page|subcat|file".to_string()),
            ],
        )
    }
}

impl ContentStore for MediaWikiClient {
    fn namespaces(&self) -> &NamespaceTable {
        &self.table
    }

    fn load_page(&mut self, title: &Title) -> Result<Page> {
        let mut pages = self.load_pages(std::slice::from_ref(title))?;
        pages
            .pop()
            .ok_or_else(|| anyhow::anyhow!("page not returned by API: {title}"))
    }

    fn load_pages(&mut self, titles: &[Title]) -> Result<Vec<Page>> {
        let mut found = BTreeMap::new();
        for batch in titles.chunks(TITLES_PER_QUERY) {
            let names = batch
                .iter()
                .map(Title::full_name)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>();
            let response = self.request_json(
                Method::Get,
                &[
                    ("action", "query".to_string()),
                    ("titles", names.join("|")),
                    ("prop", "revisions|info|pageprops".to_string()),
                    ("rvprop", "content|timestamp|ids".to_string()),
                    ("rvslots", "main".to_string()),
                    ("ppprop", "disambiguation".to_string()),
                ],
                false,
            )?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode page content API response")?;
            for item in parsed.query.pages {
                if let Some(page) = page_from_item(&self.table, item) {
                    found.insert(page.title.clone(), page);
                }
            }
        }

        Ok(titles
            .iter()
            .map(|title| {
                found
                    .get(&title.page())
                    .cloned()
                    .unwrap_or_else(|| Page::missing(title.page()))
            })
            .collect())
    }

    fn save_page(&mut self, page: &Page, summary: &str, minor: bool) -> Result<SaveStatus> {
        let title = page.title.full_name();
        let mut params = vec![
            ("action", "edit".to_string()),
            ("title", title.clone()),
            ("text", page.text.clone()),
            ("summary", summary.to_string()),
            ("bot", "1".to_string()),
        ];
        if minor {
            params.push(("minor", "1".to_string()));
        }
        match &page.base_timestamp {
            Some(timestamp) => {
                params.push(("basetimestamp", timestamp.clone()));
                params.push(("nocreate", "1".to_string()));
            }
            None => params.push(("createonly", "1".to_string())),
        }

        let response = match self.request_write(&params) {
            Ok(response) => response,
            Err(error) => {
                if let Some(status) = conflict_status(&error) {
                    return Ok(status);
                }
                return Err(error).with_context(|| format!("failed to edit {title}"));
            }
        };
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        let edit = edit_payload
            .edit
            .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
        if edit.result.as_deref() != Some("Success") {
            bail!(
                "MediaWiki edit failed for {}: {}",
                title,
                edit.result.unwrap_or_else(|| "unknown".to_string())
            );
        }
        debug!(page = %title, nochange = edit.nochange, "edit accepted");
        Ok(SaveStatus::Saved)
    }

    fn move_page(&mut self, request: &MoveRequest) -> Result<MoveResult> {
        let mut params = vec![
            ("action", "move".to_string()),
            ("from", request.from.full_name()),
            ("to", request.to.full_name()),
            ("reason", request.summary.clone()),
        ];
        for (key, enabled) in [
            ("movetalk", request.move_talk),
            ("movesubpages", request.move_subpages),
            ("noredirect", request.suppress_redirect),
        ] {
            if enabled {
                params.push((key, "1".to_string()));
            }
        }

        let response = match self.request_write(&params) {
            Ok(response) => response,
            Err(error) if api_error_code(&error) == Some("missingtitle") => {
                return Ok(MoveResult::SourceMissing);
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to move {} to {}", request.from, request.to));
            }
        };
        let parsed: MoveResponse =
            serde_json::from_value(response).context("failed to decode move response")?;
        let payload = parsed
            .moved
            .ok_or_else(|| anyhow::anyhow!("missing move payload in API response"))?;
        Ok(MoveResult::Moved {
            side_effects: move_side_effects(&self.table, payload),
        })
    }

    fn backlinks(&mut self, title: &Title, kinds: BacklinkKinds) -> Result<Vec<Title>> {
        let target = title.page().full_name();
        let mut found = BTreeSet::new();

        if let Some(filter) = redirect_filter(kinds) {
            found.extend(self.list_titles(
                ListQuery::Backlinks,
                &[
                    ("bltitle", target.clone()),
                    ("blfilterredir", filter.to_string()),
                ],
            )?);
        }
        if kinds.contains(BacklinkKinds::TRANSCLUSIONS) {
            found.extend(self.list_titles(ListQuery::EmbeddedIn, &[("eititle", target.clone())])?);
        }
        if kinds.contains(BacklinkKinds::FILE_USAGE) && title.namespace() == NS_FILE {
            found.extend(self.list_titles(ListQuery::ImageUsage, &[("iutitle", target.clone())])?);
        }

        found.remove(&title.page());
        Ok(found.into_iter().collect())
    }

    fn category_members(&mut self, category: &Title, recursive: bool) -> Result<Vec<Title>> {
        let mut members = BTreeSet::new();
        let mut visited = BTreeSet::from([category.page()]);
        let mut queue = VecDeque::from([category.page()]);
        while let Some(current) = queue.pop_front() {
            for member in self.category_level(&current)? {
                if recursive && member.namespace() == NS_CATEGORY && visited.insert(member.clone()) {
                    queue.push_back(member.clone());
                }
                members.insert(member);
            }
        }
        Ok(members.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListQuery {
    Backlinks,
    EmbeddedIn,
    ImageUsage,
    CategoryMembers,
}

impl ListQuery {
    fn name(self) -> &'static str {
        match self {
            Self::Backlinks => "backlinks",
            Self::EmbeddedIn => "embeddedin",
            Self::ImageUsage => "imageusage",
            Self::CategoryMembers => "categorymembers",
        }
    }

    fn limit_key(self) -> &'static str {
        match self {
            Self::Backlinks => "bllimit",
            Self::EmbeddedIn => "eilimit",
            Self::ImageUsage => "iulimit",
            Self::CategoryMembers => "cmlimit",
        }
    }

    fn continue_key(self) -> &'static str {
        match self {
            Self::Backlinks => "blcontinue",
            Self::EmbeddedIn => "eicontinue",
            Self::ImageUsage => "iucontinue",
            Self::CategoryMembers => "cmcontinue",
        }
    }

    fn take(self, response: QueryResponse) -> (Vec<TitleQueryItem>, Option<String>) {
        let query = response.query;
        let continuation = response.continuation.unwrap_or_default();
        match self {
            Self::Backlinks => (query.backlinks, continuation.blcontinue),
            Self::EmbeddedIn => (query.embeddedin, continuation.eicontinue),
            Self::ImageUsage => (query.imageusage, continuation.iucontinue),
            Self::CategoryMembers => (query.categorymembers, continuation.cmcontinue),
        }
    }
}

/// `blfilterredir` value for the requested kinds, or `None` when no
/// `list=backlinks` query is needed.
fn redirect_filter(kinds: BacklinkKinds) -> Option<&'static str> {
    match (
        kinds.contains(BacklinkKinds::LINKS),
        kinds.contains(BacklinkKinds::REDIRECTS),
    ) {
        (true, true) => Some("all"),
        (true, false) => Some("nonredirects"),
        (false, true) => Some("redirects"),
        (false, false) => None,
    }
}

fn conflict_status(error: &anyhow::Error) -> Option<SaveStatus> {
    match api_error_code(error) {
        Some("editconflict" | "articleexists" | "pagedeleted") => Some(SaveStatus::EditConflict),
        _ => None,
    }
}

fn page_from_item(table: &NamespaceTable, item: PageQueryItem) -> Option<Page> {
    let title = table.parse_title(&item.title).ok()?.page();
    if item.missing || item.invalid {
        return Some(Page::missing(title));
    }
    let revision = item.revisions.into_iter().next();
    let text = revision
        .as_ref()
        .and_then(|revision| revision.slots.as_ref())
        .and_then(|slots| slots.main.as_ref())
        .map(|slot| slot.content.clone())
        .unwrap_or_default();
    Some(Page {
        title,
        exists: true,
        is_redirect: item.redirect,
        is_disambiguation: item
            .pageprops
            .as_ref()
            .is_some_and(|props| props.disambiguation.is_some()),
        text,
        base_timestamp: revision.map(|revision| revision.timestamp),
    })
}

fn move_side_effects(table: &NamespaceTable, payload: MovePayload) -> Vec<(Title, Title)> {
    let mut pairs = Vec::new();
    let mut push = |from: &str, to: &str| {
        if let (Ok(from), Ok(to)) = (table.parse_title(from), table.parse_title(to)) {
            pairs.push((from, to));
        }
    };
    if let (Some(from), Some(to)) = (&payload.talkfrom, &payload.talkto) {
        push(from, to);
    }
    for subpage in payload.subpages.iter().chain(&payload.subpages_talk) {
        if let (Some(from), Some(to)) = (&subpage.from, &subpage.to) {
            push(from, to);
        }
    }
    pairs
}

fn apply_site_namespaces(table: &mut NamespaceTable, query: SiteInfoPayload) -> usize {
    let mut count = 0;
    for namespace in query.namespaces.into_values() {
        table.add_namespace(namespace.id, &namespace.name);
        if let Some(canonical) = &namespace.canonical {
            table.add_alias(canonical, namespace.id);
        }
        count += 1;
    }
    for alias in query.namespacealiases {
        table.add_alias(&alias.alias, alias.id);
    }
    count
}

fn api_error(error: &Value) -> ApiError {
    ApiError {
        code: error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error")
            .to_string(),
        info: error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info")
            .to_string(),
    }
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    backlinks: Vec<TitleQueryItem>,
    #[serde(default)]
    embeddedin: Vec<TitleQueryItem>,
    #[serde(default)]
    imageusage: Vec<TitleQueryItem>,
    #[serde(default)]
    categorymembers: Vec<TitleQueryItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    blcontinue: Option<String>,
    eicontinue: Option<String>,
    iucontinue: Option<String>,
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleQueryItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    title: String,
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    invalid: bool,
    #[serde(default)]
    redirect: bool,
    pageprops: Option<PagePropsPayload>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct PagePropsPayload {
    disambiguation: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    timestamp: String,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
    #[serde(default)]
    nochange: bool,
}

#[derive(Debug, Deserialize, Default)]
struct MoveResponse {
    #[serde(rename = "move")]
    moved: Option<MovePayload>,
}

#[derive(Debug, Deserialize, Default)]
struct MovePayload {
    talkfrom: Option<String>,
    talkto: Option<String>,
    #[serde(default)]
    subpages: Vec<SubpageMove>,
    #[serde(default, rename = "subpages-talk")]
    subpages_talk: Vec<SubpageMove>,
}

#[derive(Debug, Deserialize, Default)]
struct SubpageMove {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SiteInfoResponse {
    #[serde(default)]
    query: SiteInfoPayload,
}

#[derive(Debug, Deserialize, Default)]
struct SiteInfoPayload {
    #[serde(default)]
    namespaces: BTreeMap<String, SiteNamespace>,
    #[serde(default)]
    namespacealiases: Vec<SiteNamespaceAlias>,
}

#[derive(Debug, Deserialize)]
struct SiteNamespace {
    id: i32,
    name: String,
    canonical: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SiteNamespaceAlias {
    id: i32,
    alias: String,
}
