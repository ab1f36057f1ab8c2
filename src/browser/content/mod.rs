//! The content context: page-side command execution
//!
//! Each tab with a regular web page gets one content context. Because the
//! parsed document is not thread-safe, the context runs on a dedicated OS
//! thread that owns the [`page::Page`] and the [`refs::RefMap`]; the rest
//! of the program talks to it through a [`ContentHandle`] over a request
//! channel with oneshot replies. Commands on one page therefore execute
//! strictly sequentially, which is exactly the ordering the message bus of
//! a real browser enforces.
//!
//! Wait-for conditions do not block the worker: they are parked as waiters
//! and re-checked after mutations (with a 100 ms debounce) or when their
//! time budget runs out, so page activity arriving through the same handle
//! can still be processed while a wait is outstanding.

pub mod actions;
pub mod evaluate;
pub mod page;
pub mod refs;
pub mod snapshot;

use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::protocol::{
    ClickParams, EvaluateParams, FillFormParams, HoverParams, PageContentParams, PressKeyParams,
    SelectOptionParams, TypeParams, WaitForParams,
};
use page::Page;
use refs::RefMap;

/// Default overall budget for a wait-for with text conditions.
pub const WAIT_FOR_DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Debounce applied between a mutation and the waiter re-check.
pub const WAIT_FOR_DEBOUNCE: Duration = Duration::from_millis(100);

/// A command executed inside the content context.
#[derive(Debug, Clone)]
pub enum PageCommand {
    /// Build the accessibility tree; returns `{tree, url, title}`.
    Snapshot,
    Click(ClickParams),
    Type(TypeParams),
    PressKey(PressKeyParams),
    Hover(HoverParams),
    FillForm(FillFormParams),
    SelectOption(SelectOptionParams),
    Evaluate(EvaluateParams),
    WaitFor(WaitForParams),
    PageContent(PageContentParams),
    /// Replace the document, as a navigation does. Invalidates references.
    LoadDocument {
        html: String,
        url: String,
        title: Option<String>,
    },
    /// Append markup to the body, as page scripts do.
    AppendBodyHtml { html: String },
    /// Current `{url, title}`.
    Info,
    /// Take the synthetic-event log (used by embedders and tests).
    DrainEvents,
}

type Reply = std::result::Result<Value, String>;
type Request = (PageCommand, oneshot::Sender<Reply>);

/// Handle to a content context running on its own thread.
#[derive(Clone)]
pub struct ContentHandle {
    tx: mpsc::Sender<Request>,
}

impl std::fmt::Debug for ContentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHandle").finish_non_exhaustive()
    }
}

impl ContentHandle {
    /// Start a content context for a freshly loaded document.
    pub fn spawn(html: impl Into<String>, url: impl Into<String>, title: Option<String>) -> Self {
        let html = html.into();
        let url = url.into();
        let (tx, rx) = mpsc::channel::<Request>();
        std::thread::Builder::new()
            .name("agentfox-content".to_string())
            .spawn(move || worker_loop(Page::new(&html, url, title), rx))
            .expect("failed to spawn content context thread");
        Self { tx }
    }

    /// Execute one command and await its reply.
    ///
    /// # Errors
    ///
    /// Returns the handler's error string, or a termination message when
    /// the context thread is gone.
    pub async fn execute(&self, command: PageCommand) -> Reply {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((command, reply_tx))
            .map_err(|_| "content context terminated".to_string())?;
        match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => Err("content context terminated".to_string()),
        }
    }
}

/// A parked wait-for condition.
struct Waiter {
    text: Option<String>,
    text_gone: Option<String>,
    deadline: Instant,
    /// Earliest next re-check; pushed out by the mutation debounce.
    check_after: Option<Instant>,
    /// A bare `time` wait resolves `matched: true` at the deadline.
    pure_delay: bool,
    reply: oneshot::Sender<Reply>,
}

impl Waiter {
    fn satisfied(&self, body: &str) -> bool {
        if self.pure_delay {
            return false;
        }
        if let Some(text) = &self.text {
            if !body.contains(text.as_str()) {
                return false;
            }
        }
        if let Some(gone) = &self.text_gone {
            if body.contains(gone.as_str()) {
                return false;
            }
        }
        true
    }
}

fn worker_loop(mut page: Page, rx: mpsc::Receiver<Request>) {
    let mut refs = RefMap::new();
    let mut waiters: Vec<Waiter> = Vec::new();

    loop {
        service_waiters(&page, &mut waiters);

        let timeout = next_wake(&waiters)
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::from_millis(500));

        match rx.recv_timeout(timeout) {
            Ok((command, reply)) => match command {
                PageCommand::WaitFor(params) => {
                    register_waiter(&page, params, reply, &mut waiters);
                }
                command => {
                    let mutates = command_mutates(&command);
                    let result = dispatch(&mut page, &mut refs, command);
                    let _ = reply.send(result);
                    if mutates {
                        let check_after = Instant::now() + WAIT_FOR_DEBOUNCE;
                        for waiter in &mut waiters {
                            waiter.check_after = Some(check_after);
                        }
                    }
                }
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Resolve waiters whose check is due or whose budget expired.
fn service_waiters(page: &Page, waiters: &mut Vec<Waiter>) {
    if waiters.is_empty() {
        return;
    }
    let now = Instant::now();
    let body = page.body_text();
    let mut index = 0;
    while index < waiters.len() {
        let due_check = waiters[index]
            .check_after
            .map(|at| at <= now)
            .unwrap_or(false);
        let expired = waiters[index].deadline <= now;

        if due_check && waiters[index].satisfied(&body) {
            let waiter = waiters.swap_remove(index);
            let _ = waiter.reply.send(Ok(json!({"matched": true})));
            continue;
        }
        if due_check {
            waiters[index].check_after = None;
        }
        if expired {
            let waiter = waiters.swap_remove(index);
            let matched = waiter.pure_delay;
            let _ = waiter.reply.send(Ok(json!({"matched": matched})));
            continue;
        }
        index += 1;
    }
}

fn next_wake(waiters: &[Waiter]) -> Option<Instant> {
    waiters
        .iter()
        .flat_map(|w| std::iter::once(w.deadline).chain(w.check_after))
        .min()
}

/// Validate a wait-for request, check it immediately, and park it if it is
/// not yet satisfied.
fn register_waiter(
    page: &Page,
    params: WaitForParams,
    reply: oneshot::Sender<Reply>,
    waiters: &mut Vec<Waiter>,
) {
    if params.text.is_none() && params.text_gone.is_none() && params.time.is_none() {
        let _ = reply.send(Err(
            "wait_for requires at least one of text, textGone, or time".to_string(),
        ));
        return;
    }

    let budget = params
        .time
        .map(Duration::from_secs_f64)
        .unwrap_or(WAIT_FOR_DEFAULT_TIMEOUT);
    let pure_delay = params.text.is_none() && params.text_gone.is_none();

    let waiter = Waiter {
        text: params.text,
        text_gone: params.text_gone,
        deadline: Instant::now() + budget,
        check_after: None,
        pure_delay,
        reply,
    };

    // Text conditions are checked immediately; only unmet ones park.
    if !pure_delay && waiter.satisfied(&page.body_text()) {
        let _ = waiter.reply.send(Ok(json!({"matched": true})));
        return;
    }
    waiters.push(waiter);
}

/// Whether a command can change what waiters observe.
fn command_mutates(command: &PageCommand) -> bool {
    matches!(
        command,
        PageCommand::Click(_)
            | PageCommand::Type(_)
            | PageCommand::FillForm(_)
            | PageCommand::SelectOption(_)
            | PageCommand::Evaluate(_)
            | PageCommand::LoadDocument { .. }
            | PageCommand::AppendBodyHtml { .. }
    )
}

fn dispatch(page: &mut Page, refs: &mut RefMap, command: PageCommand) -> Reply {
    let result = match command {
        PageCommand::Snapshot => {
            let tree = snapshot::build_tree(page, refs);
            serde_json::to_value(tree)
                .map(|tree| json!({"tree": tree, "url": page.url(), "title": page.title()}))
                .map_err(|e| crate::error::AgentfoxError::Serialization(e))
        }
        PageCommand::Click(params) => actions::click(page, refs, &params),
        PageCommand::Type(params) => actions::type_text(page, refs, &params),
        PageCommand::PressKey(params) => actions::press_key(page, &params),
        PageCommand::Hover(params) => actions::hover(page, refs, &params),
        PageCommand::FillForm(params) => actions::fill_form(page, refs, &params),
        PageCommand::SelectOption(params) => actions::select_option(page, refs, &params),
        PageCommand::Evaluate(params) => {
            evaluate::evaluate(page, refs, &params, evaluate::EVALUATE_TIMEOUT)
                .map(|value| json!({"value": value}))
        }
        PageCommand::PageContent(params) => actions::page_content(page, &params),
        PageCommand::LoadDocument { html, url, title } => {
            page.load(&html, url, title);
            Ok(json!({"url": page.url(), "title": page.title()}))
        }
        PageCommand::AppendBodyHtml { html } => {
            page.append_body_html(&html);
            Ok(json!({}))
        }
        PageCommand::Info => Ok(json!({"url": page.url(), "title": page.title()})),
        PageCommand::DrainEvents => serde_json::to_value(page.drain_events())
            .map_err(crate::error::AgentfoxError::Serialization),
        PageCommand::WaitFor(_) => unreachable!("wait_for is handled by the worker loop"),
    };
    result.map_err(|e| e.to_string())
}
