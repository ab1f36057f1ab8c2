//! Shared harness for the end-to-end pipeline tests
//!
//! Wires the whole request path in one process: an MCP client side made of
//! duplex pipes into the gateway, the gateway's broker on a temp-dir
//! socket, the real relay bridging that socket to a pair of
//! native-dialect pipes, and a browser double whose dispatcher answers on
//! the native side, exactly where the extension background sits in
//! production.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use agentfox::browser::api::{
    Bookmark, BrowserApi, Cookie, HistoryItem, NetworkRequest, PdfResult, TabInfo, TabStatus,
};
use agentfox::browser::content::ContentHandle;
use agentfox::browser::Dispatcher;
use agentfox::codec::{FrameCodec, FrameDialect};
use agentfox::gateway::McpGateway;
use agentfox::ipc::{BrokerConfig, IpcBroker};
use agentfox::protocol::{GetHistoryParams, SavePdfParams, ScreenshotFormat, ScreenshotParams};
use agentfox::relay::run_relay;
use agentfox::Result;

pub const EXAMPLE_HTML: &str = r#"<html><head><title>Example Domain</title></head>
<body>
  <h1>Example Domain</h1>
  <button id="submit">Submit</button>
</body></html>"#;

/// Single-tab browser double for pipeline tests.
pub struct TestBrowser {
    state: Mutex<TabState>,
    pages: Mutex<HashMap<String, String>>,
}

struct TabState {
    url: String,
    title: String,
    content: Option<ContentHandle>,
}

impl TestBrowser {
    pub fn new() -> Self {
        let content = ContentHandle::spawn(EXAMPLE_HTML, "https://example.com/", None);
        Self {
            state: Mutex::new(TabState {
                url: "https://example.com/".to_string(),
                title: "Example Domain".to_string(),
                content: Some(content),
            }),
            pages: Mutex::new(HashMap::from([(
                "https://example.com/".to_string(),
                EXAMPLE_HTML.to_string(),
            )])),
        }
    }

    pub fn register_page(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), html.to_string());
    }

    /// The live content handle, for simulating page-side activity.
    pub fn content_handle(&self) -> ContentHandle {
        self.state.lock().unwrap().content.clone().unwrap()
    }

    fn tab(&self) -> TabInfo {
        let state = self.state.lock().unwrap();
        TabInfo {
            id: 1,
            index: 0,
            url: state.url.clone(),
            title: state.title.clone(),
            active: true,
            status: TabStatus::Complete,
        }
    }
}

fn title_of(html: &str) -> String {
    html.split("<title>")
        .nth(1)
        .and_then(|rest| rest.split("</title>").next())
        .unwrap_or("Untitled")
        .trim()
        .to_string()
}

#[async_trait]
impl BrowserApi for TestBrowser {
    async fn active_tab(&self) -> Result<TabInfo> {
        Ok(self.tab())
    }

    async fn tab_by_id(&self, _id: u64) -> Result<Option<TabInfo>> {
        Ok(Some(self.tab()))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let html = self
            .pages
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or_else(|| "<html><head><title>Untitled</title></head><body></body></html>".to_string());
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.title = title_of(&html);
        state.content = Some(ContentHandle::spawn(&html, url, None));
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        Ok(())
    }

    async fn screenshot(&self, params: &ScreenshotParams) -> Result<(String, String)> {
        let format = params.format.unwrap_or(ScreenshotFormat::Png);
        Ok(("aGVsbG8=".to_string(), format.mime_type().to_string()))
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        Ok(vec![self.tab()])
    }

    async fn new_tab(&self) -> Result<TabInfo> {
        Ok(self.tab())
    }

    async fn close_tab(&self, _index: Option<usize>) -> Result<TabInfo> {
        Ok(self.tab())
    }

    async fn select_tab(&self, _index: usize) -> Result<TabInfo> {
        Ok(self.tab())
    }

    async fn close_window(&self) -> Result<()> {
        Ok(())
    }

    async fn resize_window(&self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    async fn cookies(&self, _url: Option<&str>) -> Result<Vec<Cookie>> {
        Ok(Vec::new())
    }

    async fn bookmarks(&self, _query: Option<&str>) -> Result<Vec<Bookmark>> {
        Ok(Vec::new())
    }

    async fn history(&self, _params: &GetHistoryParams) -> Result<Vec<HistoryItem>> {
        Ok(Vec::new())
    }

    async fn network_set_recording(&self, recording: bool) -> Result<bool> {
        Ok(recording)
    }

    async fn network_get(&self, _filter: Option<&str>) -> Result<Vec<NetworkRequest>> {
        Ok(Vec::new())
    }

    async fn network_clear(&self) -> Result<usize> {
        Ok(0)
    }

    async fn save_pdf(&self, _params: &SavePdfParams) -> Result<PdfResult> {
        Ok(PdfResult {
            saved: true,
            status: "saved".to_string(),
        })
    }

    async fn content(&self) -> Result<Option<ContentHandle>> {
        Ok(self.state.lock().unwrap().content.clone())
    }
}

/// The assembled pipeline plus the MCP client's end of the transport.
pub struct Pipeline {
    mcp_in: DuplexStream,
    mcp_out: DuplexStream,
    read_buf: Vec<u8>,
    parked: Vec<Value>,
    next_id: u64,
    pub browser: Arc<TestBrowser>,
    _dir: TempDir,
}

/// Build gateway + broker + relay + extension double, all talking through
/// their real framings.
pub async fn start_pipeline() -> Pipeline {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("agentfox-e2e.sock");

    let mut broker_config = BrokerConfig::new(&socket_path);
    broker_config.command_timeout = Duration::from_secs(10);
    let broker = Arc::new(IpcBroker::start(broker_config).unwrap());

    let gateway =
        McpGateway::new(Arc::clone(&broker)).with_attach_wait(Duration::from_secs(5));
    let (mcp_in, gw_stdin) = duplex(256 * 1024);
    let (gw_stdout, mcp_out) = duplex(256 * 1024);
    tokio::spawn(async move {
        let _ = gateway.run(gw_stdin, gw_stdout).await;
    });

    // The relay's stdio pair; the far ends play the browser runtime.
    let (ext_to_relay, relay_stdin) = duplex(256 * 1024);
    let (relay_stdout, ext_from_relay) = duplex(256 * 1024);
    let relay_socket = socket_path.clone();
    tokio::spawn(async move {
        let _ = run_relay(relay_stdin, relay_stdout, &relay_socket).await;
    });

    let browser = Arc::new(TestBrowser::new());
    tokio::spawn(extension_pump(
        Arc::clone(&browser),
        ext_from_relay,
        ext_to_relay,
    ));

    broker
        .wait_for_connection(Duration::from_secs(5))
        .await
        .unwrap();

    Pipeline {
        mcp_in,
        mcp_out,
        read_buf: Vec::new(),
        parked: Vec::new(),
        next_id: 1,
        browser,
        _dir: dir,
    }
}

/// The extension background: native frames in, dispatcher, native frames
/// out.
async fn extension_pump(
    browser: Arc<TestBrowser>,
    mut from_relay: DuplexStream,
    to_relay: DuplexStream,
) {
    let dispatcher = Arc::new(
        Dispatcher::new(browser).with_navigation_timeout(Duration::from_secs(5)),
    );
    let to_relay = Arc::new(tokio::sync::Mutex::new(to_relay));
    let mut decoder = FrameCodec::new(FrameDialect::Native);
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = match from_relay.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let Ok(messages) = decoder.push(&chunk[..n]) else {
            return;
        };
        for message in messages {
            let dispatcher = Arc::clone(&dispatcher);
            let to_relay = Arc::clone(&to_relay);
            tokio::spawn(async move {
                if let Some(response) = dispatcher.handle(&message).await {
                    let value = serde_json::to_value(response).unwrap();
                    let frame = FrameCodec::new(FrameDialect::Native)
                        .encode_frame(&value)
                        .unwrap();
                    let _ = to_relay.lock().await.write_all(&frame).await;
                }
            });
        }
    }
}

impl Pipeline {
    /// Issue a tools/call and return its JSON-RPC id.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let line = format!(
            "{}\n",
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "tools/call",
                "params": {"name": name, "arguments": arguments}
            })
        );
        self.mcp_in.write_all(line.as_bytes()).await.unwrap();
        id
    }

    /// Read responses until the one with the given id arrives; others are
    /// parked for later calls.
    pub async fn response(&mut self, id: u64) -> Value {
        if let Some(pos) = self.parked.iter().position(|r| r["id"] == json!(id)) {
            return self.parked.swap_remove(pos);
        }
        loop {
            let line = self.read_line().await;
            let value: Value = serde_json::from_str(&line).unwrap();
            if value["id"] == json!(id) {
                return value;
            }
            self.parked.push(value);
        }
    }

    /// Convenience: call a tool and await its result object.
    pub async fn tool_result(&mut self, name: &str, arguments: Value) -> Value {
        let id = self.call_tool(name, arguments).await;
        let response = self.response(id).await;
        response["result"].clone()
    }

    async fn read_line(&mut self) -> String {
        loop {
            if let Some(pos) = self.read_buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.read_buf.drain(..=pos).collect();
                return String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
            }
            let mut chunk = [0u8; 8192];
            let n = self.mcp_out.read(&mut chunk).await.unwrap();
            assert!(n > 0, "gateway closed the MCP transport");
            self.read_buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// First text block of a tool result.
pub fn result_text(result: &Value) -> String {
    result["content"][0]["text"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
