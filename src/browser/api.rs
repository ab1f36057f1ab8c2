//! The browser-API surface the dispatcher consumes
//!
//! The background dispatcher does not talk to a browser directly; it talks
//! to this trait. A production embedding backs it with the real extension
//! APIs, tests back it with an in-memory double. Only the browser's notion
//! of "current window" is visible: tab addressing is by index within that
//! window.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::browser::content::ContentHandle;
use crate::error::Result;
use crate::protocol::{GetHistoryParams, SavePdfParams, ScreenshotParams};

/// Load state of a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    /// The tab is still loading.
    Loading,
    /// The tab finished loading.
    Complete,
}

/// One tab of the current window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    /// Stable identity for the lifetime of the tab.
    pub id: u64,
    /// Position within the current window.
    pub index: usize,
    /// Current URL.
    pub url: String,
    /// Current title.
    pub title: String,
    /// Whether this is the active tab.
    pub active: bool,
    /// Load state.
    pub status: TabStatus,
}

/// A cookie as reported by the browser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
    /// Expiry in seconds since the epoch; session cookies have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// A bookmark entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub title: String,
    pub url: String,
}

/// A browsing-history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub url: String,
    pub title: String,
    pub visit_count: u32,
    /// Last visit in milliseconds since the epoch.
    pub last_visit_time: f64,
}

/// One recorded network request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub url: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
}

/// Outcome of a save-pdf request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfResult {
    pub saved: bool,
    pub status: String,
}

/// The interface the background dispatcher consumes from the browser.
///
/// Navigation is split into a fire primitive plus status probes: the
/// dispatcher owns the wait-for-complete loop (with its timeout and
/// tab-closed detection) so every embedding gets identical semantics.
#[async_trait]
pub trait BrowserApi: Send + Sync {
    /// The active tab of the current window.
    async fn active_tab(&self) -> Result<TabInfo>;

    /// Probe one tab by ID; `None` once the tab is removed.
    async fn tab_by_id(&self, id: u64) -> Result<Option<TabInfo>>;

    /// Begin navigating the active tab.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Begin a history back navigation in the active tab.
    async fn go_back(&self) -> Result<()>;

    /// Capture a screenshot; returns base64 data and its MIME type.
    async fn screenshot(&self, params: &ScreenshotParams) -> Result<(String, String)>;

    /// All tabs of the current window.
    async fn list_tabs(&self) -> Result<Vec<TabInfo>>;

    /// Open a new tab and make it active.
    async fn new_tab(&self) -> Result<TabInfo>;

    /// Close a tab (the active one when `index` is `None`); returns the
    /// tab that became active.
    async fn close_tab(&self, index: Option<usize>) -> Result<TabInfo>;

    /// Make the tab at `index` active.
    async fn select_tab(&self, index: usize) -> Result<TabInfo>;

    /// Close the current window.
    async fn close_window(&self) -> Result<()>;

    /// Resize the current window.
    async fn resize_window(&self, width: u32, height: u32) -> Result<()>;

    /// Cookies, optionally restricted to one URL.
    async fn cookies(&self, url: Option<&str>) -> Result<Vec<Cookie>>;

    /// Bookmark search.
    async fn bookmarks(&self, query: Option<&str>) -> Result<Vec<Bookmark>>;

    /// History search.
    async fn history(&self, params: &GetHistoryParams) -> Result<Vec<HistoryItem>>;

    /// Toggle network-request recording; returns the new state.
    async fn network_set_recording(&self, recording: bool) -> Result<bool>;

    /// Recorded requests, optionally filtered by URL substring.
    async fn network_get(&self, filter: Option<&str>) -> Result<Vec<NetworkRequest>>;

    /// Drop recorded requests; returns how many were removed.
    async fn network_clear(&self) -> Result<usize>;

    /// Save the current page as a PDF.
    async fn save_pdf(&self, params: &SavePdfParams) -> Result<PdfResult>;

    /// The content context of the active tab; `None` on internal or blank
    /// pages where no content script runs.
    async fn content(&self) -> Result<Option<ContentHandle>>;
}
