//! The privileged background dispatcher
//!
//! Routes every inbound command either to browser APIs (navigation, tabs,
//! screenshots, cookies, bookmarks, history, network recording, PDF) or to
//! the active tab's content context (snapshot and all DOM actions). Each
//! handler catches its own errors; whatever goes wrong becomes a
//! `success=false` response with an error string, never a crash and never
//! a missing reply.
//!
//! Inbound messages are validated first: anything that is not an object
//! with a string `id` and a string `action` is logged and dropped without
//! a reply, because there is no correlation ID to answer to.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use url::Url;

use crate::browser::api::{BrowserApi, TabInfo, TabStatus};
use crate::browser::content::PageCommand;
use crate::error::{AgentfoxError, Result};
use crate::protocol::{
    Command, CommandPayload, CommandResponse, NetworkAction, TabsAction, TabsParams,
};

/// How long a navigation may take to reach the complete state.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll cadence for tab status probes during a navigation wait.
const NAVIGATION_POLL: Duration = Duration::from_millis(50);

/// Brief probe window after a go-back, to catch the no-history case.
const BACK_PROBE_DELAY: Duration = Duration::from_millis(100);

/// Routes commands between the browser APIs and the content context.
pub struct Dispatcher<B: BrowserApi> {
    api: Arc<B>,
    navigation_timeout: Duration,
}

impl<B: BrowserApi> Dispatcher<B> {
    pub fn new(api: Arc<B>) -> Self {
        Self {
            api,
            navigation_timeout: NAVIGATION_TIMEOUT,
        }
    }

    /// Override the navigation wait (tests use a short one).
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Handle one raw inbound message.
    ///
    /// Returns `None` for ill-formed messages (dropped without replying)
    /// and `Some` response carrying the same correlation ID otherwise.
    pub async fn handle(&self, raw: &Value) -> Option<CommandResponse> {
        let (id, action) = match (
            raw.as_object(),
            raw.get("id").and_then(Value::as_str),
            raw.get("action").and_then(Value::as_str),
        ) {
            (Some(_), Some(id), Some(action)) => (id.to_string(), action.to_string()),
            _ => {
                tracing::warn!("dropping ill-formed message: {}", raw);
                return None;
            }
        };

        let command = Command {
            id: id.clone(),
            action,
            params: raw.get("params").cloned().unwrap_or(Value::Null),
        };
        let payload = match command.payload() {
            Ok(payload) => payload,
            Err(e) => return Some(CommandResponse::fail(id, e)),
        };

        match self.execute(payload).await {
            Ok(result) => Some(CommandResponse::ok(id, result)),
            Err(e) => Some(CommandResponse::fail(id, e)),
        }
    }

    /// Execute one typed command. The sum is closed; every action is
    /// handled here.
    async fn execute(&self, payload: CommandPayload) -> Result<Value> {
        match payload {
            CommandPayload::Navigate(params) => self.navigate(&params.url).await,
            CommandPayload::NavigateBack => self.navigate_back().await,
            CommandPayload::Screenshot(params) => {
                let (data, mime_type) = self.api.screenshot(&params).await?;
                Ok(json!({"data": data, "mimeType": mime_type}))
            }
            CommandPayload::Tabs(params) => self.tabs(&params).await,
            CommandPayload::Close => {
                self.api.close_window().await?;
                Ok(json!({}))
            }
            CommandPayload::Resize(params) => {
                self.api.resize_window(params.width, params.height).await?;
                Ok(json!({}))
            }
            CommandPayload::GetCookies(params) => {
                let cookies = self.api.cookies(params.url.as_deref()).await?;
                Ok(json!({"cookies": cookies}))
            }
            CommandPayload::GetBookmarks(params) => {
                let bookmarks = self.api.bookmarks(params.query.as_deref()).await?;
                Ok(json!({"bookmarks": bookmarks}))
            }
            CommandPayload::GetHistory(params) => {
                let items = self.api.history(&params).await?;
                Ok(json!({"items": items}))
            }
            CommandPayload::NetworkRequests(params) => match params.action {
                NetworkAction::Start => {
                    let recording = self.api.network_set_recording(true).await?;
                    Ok(json!({"recording": recording}))
                }
                NetworkAction::Stop => {
                    let recording = self.api.network_set_recording(false).await?;
                    Ok(json!({"recording": recording}))
                }
                NetworkAction::Get => {
                    let requests = self.api.network_get(params.filter.as_deref()).await?;
                    let count = requests.len();
                    Ok(json!({"requests": requests, "count": count}))
                }
                NetworkAction::Clear => {
                    let count = self.api.network_clear().await?;
                    Ok(json!({"count": count}))
                }
            },
            CommandPayload::SavePdf(params) => {
                let result = self.api.save_pdf(&params).await?;
                Ok(serde_json::to_value(result)?)
            }

            // Page-interaction commands run in the content context.
            CommandPayload::Snapshot => self.content_execute(PageCommand::Snapshot).await,
            CommandPayload::Click(params) => {
                self.content_execute(PageCommand::Click(params)).await
            }
            CommandPayload::Type(params) => self.content_execute(PageCommand::Type(params)).await,
            CommandPayload::PressKey(params) => {
                self.content_execute(PageCommand::PressKey(params)).await
            }
            CommandPayload::Hover(params) => {
                self.content_execute(PageCommand::Hover(params)).await
            }
            CommandPayload::FillForm(params) => {
                self.content_execute(PageCommand::FillForm(params)).await
            }
            CommandPayload::SelectOption(params) => {
                self.content_execute(PageCommand::SelectOption(params)).await
            }
            CommandPayload::Evaluate(params) => {
                self.content_execute(PageCommand::Evaluate(params)).await
            }
            CommandPayload::WaitFor(params) => {
                self.content_execute(PageCommand::WaitFor(params)).await
            }
            CommandPayload::PageContent(params) => {
                self.content_execute(PageCommand::PageContent(params)).await
            }
        }
    }

    /// Forward a command to the active tab's content context.
    async fn content_execute(&self, command: PageCommand) -> Result<Value> {
        let handle = self
            .api
            .content()
            .await?
            .ok_or(AgentfoxError::ContentUnavailable)?;
        handle
            .execute(command)
            .await
            .map_err(|message| anyhow::anyhow!(message))
    }

    /// Navigate the active tab and wait for it to finish loading.
    async fn navigate(&self, url: &str) -> Result<Value> {
        let url = Url::parse(url)
            .map_err(|e| AgentfoxError::MalformedCommand(format!("invalid url {:?}: {}", url, e)))?;
        let tab = self.api.active_tab().await?;
        self.api.navigate(url.as_str()).await?;
        let tab = self.wait_for_complete(tab.id, url.as_str()).await?;
        Ok(json!({"url": tab.url, "title": tab.title}))
    }

    /// Go back one history entry, returning immediately when there is
    /// nothing to go back to.
    async fn navigate_back(&self) -> Result<Value> {
        let before = self.api.active_tab().await?;
        self.api.go_back().await?;

        tokio::time::sleep(BACK_PROBE_DELAY).await;
        let probed = self
            .api
            .tab_by_id(before.id)
            .await?
            .ok_or(AgentfoxError::TabClosed)?;
        // No history entry: the URL did not move and the tab is already
        // complete, so no load event will ever fire.
        if probed.url == before.url && probed.status == TabStatus::Complete {
            return Ok(json!({"url": probed.url, "title": probed.title}));
        }

        let tab = self.wait_for_complete(before.id, &probed.url).await?;
        Ok(json!({"url": tab.url, "title": tab.title}))
    }

    /// Poll a tab until it reports complete, it disappears, or the
    /// navigation timeout expires.
    async fn wait_for_complete(&self, tab_id: u64, url: &str) -> Result<TabInfo> {
        let deadline = tokio::time::Instant::now() + self.navigation_timeout;
        loop {
            let Some(tab) = self.api.tab_by_id(tab_id).await? else {
                return Err(AgentfoxError::TabClosed.into());
            };
            if tab.status == TabStatus::Complete {
                return Ok(tab);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AgentfoxError::NavigationTimeout {
                    url: url.to_string(),
                    seconds: self.navigation_timeout.as_secs(),
                }
                .into());
            }
            tokio::time::sleep(NAVIGATION_POLL).await;
        }
    }

    /// Tab management sub-operations.
    async fn tabs(&self, params: &TabsParams) -> Result<Value> {
        match params.action {
            TabsAction::List => {
                let tabs = self.api.list_tabs().await?;
                Ok(json!({"tabs": tabs}))
            }
            TabsAction::New => Ok(tab_result(self.api.new_tab().await?)),
            TabsAction::Close => Ok(tab_result(self.api.close_tab(params.index).await?)),
            TabsAction::Select => {
                let index = params.index.ok_or_else(|| {
                    AgentfoxError::MalformedCommand("tabs select requires an index".to_string())
                })?;
                Ok(tab_result(self.api.select_tab(index).await?))
            }
        }
    }
}

fn tab_result(tab: TabInfo) -> Value {
    json!({
        "index": tab.index,
        "title": tab.title,
        "url": tab.url,
        "active": tab.active,
    })
}
