//! Shared test fixtures
//!
//! [`FakeBrowser`] is an in-memory [`BrowserApi`] double: a handful of tabs
//! whose pages are real parsed documents served by content contexts, plus
//! canned cookies, bookmarks, and history. Knobs let tests simulate slow
//! loads and tabs vanishing mid-navigation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::browser::api::{
    Bookmark, BrowserApi, Cookie, HistoryItem, NetworkRequest, PdfResult, TabInfo, TabStatus,
};
use crate::browser::content::ContentHandle;
use crate::error::Result;
use crate::protocol::{GetHistoryParams, SavePdfParams, ScreenshotFormat, ScreenshotParams};

/// A 1x1 transparent PNG.
pub const TINY_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mP8z8BQDwAEhQGAhKmMIQAAAABJRU5ErkJggg==";

/// The page every fresh fake browser starts on.
pub const START_PAGE_HTML: &str = r#"<html><head><title>Start</title></head>
<body><button id="go">Go</button></body></html>"#;

pub const START_PAGE_URL: &str = "https://start.example/";

struct FakeTab {
    id: u64,
    url: String,
    title: String,
    status: TabStatus,
    content: Option<ContentHandle>,
    history: Vec<(String, String)>,
}

struct Inner {
    tabs: Vec<FakeTab>,
    active: usize,
    next_id: u64,
    pages: HashMap<String, String>,
    navigation_delay: Duration,
    recording: bool,
    requests: Vec<NetworkRequest>,
    cookies: Vec<Cookie>,
    bookmarks: Vec<Bookmark>,
    history: Vec<HistoryItem>,
    window_size: (u32, u32),
    window_closed: bool,
}

/// In-memory browser double.
pub struct FakeBrowser {
    inner: Arc<Mutex<Inner>>,
    close_on_navigate: AtomicBool,
}

impl Default for FakeBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBrowser {
    pub fn new() -> Self {
        let start = FakeTab {
            id: 1,
            url: START_PAGE_URL.to_string(),
            title: "Start".to_string(),
            status: TabStatus::Complete,
            content: Some(ContentHandle::spawn(
                START_PAGE_HTML,
                START_PAGE_URL,
                None,
            )),
            history: Vec::new(),
        };
        let inner = Inner {
            tabs: vec![start],
            active: 0,
            next_id: 2,
            pages: HashMap::from([(START_PAGE_URL.to_string(), START_PAGE_HTML.to_string())]),
            navigation_delay: Duration::ZERO,
            recording: false,
            requests: Vec::new(),
            cookies: vec![Cookie {
                name: "sid".to_string(),
                value: "fake-session".to_string(),
                domain: "start.example".to_string(),
                path: "/".to_string(),
                secure: true,
                http_only: true,
                expires: None,
            }],
            bookmarks: vec![Bookmark {
                title: "Example Domain".to_string(),
                url: "https://example.com/".to_string(),
            }],
            history: vec![HistoryItem {
                url: START_PAGE_URL.to_string(),
                title: "Start".to_string(),
                visit_count: 1,
                last_visit_time: 1_700_000_000_000.0,
            }],
            window_size: (1280, 720),
            window_closed: false,
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            close_on_navigate: AtomicBool::new(false),
        }
    }

    /// Register the document served for a URL.
    pub fn register_page(&self, url: &str, html: &str) {
        self.inner
            .lock()
            .unwrap()
            .pages
            .insert(url.to_string(), html.to_string());
    }

    /// Delay tab completion after navigate.
    pub fn set_navigation_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().navigation_delay = delay;
    }

    /// Remove the tab when the next navigation starts.
    pub fn close_tab_on_navigate(&self) {
        self.close_on_navigate.store(true, Ordering::SeqCst);
    }

    /// Turn the active tab into an internal page with no content context.
    pub fn open_internal_page(&self, url: &str) {
        let mut inner = self.inner.lock().unwrap();
        let active = inner.active;
        let tab = &mut inner.tabs[active];
        tab.url = url.to_string();
        tab.title = url.to_string();
        tab.content = None;
        tab.status = TabStatus::Complete;
    }

    /// Record a request (only kept while recording is on).
    pub fn record_request(&self, url: &str, method: &str, status: Option<u16>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.recording {
            inner.requests.push(NetworkRequest {
                url: url.to_string(),
                method: method.to_string(),
                status,
                resource_type: None,
            });
        }
    }

    /// Whether close was requested on the window.
    pub fn window_closed(&self) -> bool {
        self.inner.lock().unwrap().window_closed
    }

    /// Last requested window size.
    pub fn window_size(&self) -> (u32, u32) {
        self.inner.lock().unwrap().window_size
    }

    fn tab_info(inner: &Inner, index: usize) -> TabInfo {
        let tab = &inner.tabs[index];
        TabInfo {
            id: tab.id,
            index,
            url: tab.url.clone(),
            title: tab.title.clone(),
            active: index == inner.active,
            status: tab.status,
        }
    }
}

fn title_of(html: &str) -> String {
    let doc = Html::parse_document(html);
    Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_else(|| "Untitled".to_string())
}

#[async_trait]
impl BrowserApi for FakeBrowser {
    async fn active_tab(&self) -> Result<TabInfo> {
        let inner = self.inner.lock().unwrap();
        Ok(Self::tab_info(&inner, inner.active))
    }

    async fn tab_by_id(&self, id: u64) -> Result<Option<TabInfo>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tabs
            .iter()
            .position(|t| t.id == id)
            .map(|index| Self::tab_info(&inner, index)))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        if self.close_on_navigate.swap(false, Ordering::SeqCst) {
            let mut inner = self.inner.lock().unwrap();
            let active = inner.active;
            inner.tabs.remove(active);
            inner.active = 0;
            if inner.tabs.is_empty() {
                let id = inner.next_id;
                inner.next_id += 1;
                inner.tabs.push(FakeTab {
                    id,
                    url: "about:blank".to_string(),
                    title: String::new(),
                    status: TabStatus::Complete,
                    content: None,
                    history: Vec::new(),
                });
            }
            return Ok(());
        }

        let (delay, tab_id) = {
            let mut inner = self.inner.lock().unwrap();
            let active = inner.active;
            let html = inner.pages.get(url).cloned();
            let delay = inner.navigation_delay;
            let tab = &mut inner.tabs[active];
            let tab_id = tab.id;
            let previous = (tab.url.clone(), String::new());
            tab.history.push(previous);
            tab.url = url.to_string();
            tab.status = TabStatus::Loading;
            if delay.is_zero() {
                complete_load(tab, url, html.as_deref());
            }
            (delay, tab_id)
        };

        if !delay.is_zero() {
            let inner = Arc::clone(&self.inner);
            let url = url.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let mut inner = inner.lock().unwrap();
                let html = inner.pages.get(&url).cloned();
                if let Some(tab) = inner.tabs.iter_mut().find(|t| t.id == tab_id) {
                    complete_load(tab, &url, html.as_deref());
                }
            });
        }
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let active = inner.active;
        let entry = inner.tabs[active].history.pop();
        if let Some((url, _)) = entry {
            let html = inner.pages.get(&url).cloned();
            let tab = &mut inner.tabs[active];
            complete_load(tab, &url, html.as_deref());
        }
        Ok(())
    }

    async fn screenshot(&self, params: &ScreenshotParams) -> Result<(String, String)> {
        let format = params.format.unwrap_or(ScreenshotFormat::Png);
        Ok((TINY_PNG_BASE64.to_string(), format.mime_type().to_string()))
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        let inner = self.inner.lock().unwrap();
        Ok((0..inner.tabs.len())
            .map(|i| Self::tab_info(&inner, i))
            .collect())
    }

    async fn new_tab(&self) -> Result<TabInfo> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.tabs.push(FakeTab {
            id,
            url: "about:newtab".to_string(),
            title: "New Tab".to_string(),
            status: TabStatus::Complete,
            content: None,
            history: Vec::new(),
        });
        inner.active = inner.tabs.len() - 1;
        Ok(Self::tab_info(&inner, inner.active))
    }

    async fn close_tab(&self, index: Option<usize>) -> Result<TabInfo> {
        let mut inner = self.inner.lock().unwrap();
        let index = index.unwrap_or(inner.active);
        if index >= inner.tabs.len() {
            anyhow::bail!("no tab at index {}", index);
        }
        inner.tabs.remove(index);
        if inner.tabs.is_empty() {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.tabs.push(FakeTab {
                id,
                url: "about:blank".to_string(),
                title: String::new(),
                status: TabStatus::Complete,
                content: None,
                history: Vec::new(),
            });
        }
        if inner.active >= inner.tabs.len() {
            inner.active = inner.tabs.len() - 1;
        }
        Ok(Self::tab_info(&inner, inner.active))
    }

    async fn select_tab(&self, index: usize) -> Result<TabInfo> {
        let mut inner = self.inner.lock().unwrap();
        if index >= inner.tabs.len() {
            anyhow::bail!("no tab at index {}", index);
        }
        inner.active = index;
        Ok(Self::tab_info(&inner, index))
    }

    async fn close_window(&self) -> Result<()> {
        self.inner.lock().unwrap().window_closed = true;
        Ok(())
    }

    async fn resize_window(&self, width: u32, height: u32) -> Result<()> {
        self.inner.lock().unwrap().window_size = (width, height);
        Ok(())
    }

    async fn cookies(&self, url: Option<&str>) -> Result<Vec<Cookie>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .cookies
            .iter()
            .filter(|c| match url {
                Some(url) => url.contains(&c.domain),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn bookmarks(&self, query: Option<&str>) -> Result<Vec<Bookmark>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .bookmarks
            .iter()
            .filter(|b| match query {
                Some(q) => b.title.contains(q) || b.url.contains(q),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn history(&self, params: &GetHistoryParams) -> Result<Vec<HistoryItem>> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<HistoryItem> = inner
            .history
            .iter()
            .filter(|h| match &params.query {
                Some(q) => h.url.contains(q.as_str()) || h.title.contains(q.as_str()),
                None => true,
            })
            .filter(|h| {
                params
                    .start_time
                    .map(|t| h.last_visit_time >= t)
                    .unwrap_or(true)
            })
            .filter(|h| {
                params
                    .end_time
                    .map(|t| h.last_visit_time <= t)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        if let Some(max) = params.max_results {
            items.truncate(max as usize);
        }
        Ok(items)
    }

    async fn network_set_recording(&self, recording: bool) -> Result<bool> {
        self.inner.lock().unwrap().recording = recording;
        Ok(recording)
    }

    async fn network_get(&self, filter: Option<&str>) -> Result<Vec<NetworkRequest>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .requests
            .iter()
            .filter(|r| match filter {
                Some(f) => r.url.contains(f),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn network_clear(&self) -> Result<usize> {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.requests.len();
        inner.requests.clear();
        Ok(count)
    }

    async fn save_pdf(&self, params: &SavePdfParams) -> Result<PdfResult> {
        let mut status = "saved to Downloads".to_string();
        if let Some(header) = &params.header {
            status.push_str(&format!(" (header: {})", header));
        }
        Ok(PdfResult {
            saved: true,
            status,
        })
    }

    async fn content(&self) -> Result<Option<ContentHandle>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.tabs[inner.active].content.clone())
    }
}

/// Finish a load: title, content context, complete status.
fn complete_load(tab: &mut FakeTab, url: &str, html: Option<&str>) {
    let html = html.unwrap_or("<html><head><title>Untitled</title></head><body></body></html>");
    tab.url = url.to_string();
    tab.title = title_of(html);
    tab.content = Some(ContentHandle::spawn(html, url, None));
    tab.status = TabStatus::Complete;
}
