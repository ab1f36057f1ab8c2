//! Command and response types for the browser pipeline
//!
//! A [`Command`] is the wire shape the gateway writes: a correlation ID, an
//! action tag, and a parameter record whose shape depends on the tag. The
//! browser-side dispatcher narrows the raw record into a [`CommandPayload`],
//! the closed tagged sum over every supported action; downstream code
//! matches on it exhaustively.
//!
//! A [`CommandResponse`] mirrors the command's ID and carries exactly one of
//! a result payload or an error string.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{AgentfoxError, Result};

/// The closed set of browser operations.
///
/// `as_str` yields the wire tag; [`Action::from_tag`] parses one.
///
/// # Examples
///
/// ```
/// use agentfox::protocol::Action;
///
/// assert_eq!(Action::PressKey.as_str(), "press_key");
/// assert_eq!(Action::from_tag("navigate"), Some(Action::Navigate));
/// assert_eq!(Action::from_tag("teleport"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Navigate,
    NavigateBack,
    Snapshot,
    Screenshot,
    Click,
    Type,
    PressKey,
    Hover,
    FillForm,
    SelectOption,
    Evaluate,
    WaitFor,
    Tabs,
    Close,
    Resize,
    GetCookies,
    GetBookmarks,
    GetHistory,
    NetworkRequests,
    SavePdf,
    PageContent,
}

/// Every action, in catalog order.
pub const ALL_ACTIONS: &[Action] = &[
    Action::Navigate,
    Action::NavigateBack,
    Action::Snapshot,
    Action::Screenshot,
    Action::Click,
    Action::Type,
    Action::PressKey,
    Action::Hover,
    Action::FillForm,
    Action::SelectOption,
    Action::Evaluate,
    Action::WaitFor,
    Action::Tabs,
    Action::Close,
    Action::Resize,
    Action::GetCookies,
    Action::GetBookmarks,
    Action::GetHistory,
    Action::NetworkRequests,
    Action::SavePdf,
    Action::PageContent,
];

impl Action {
    /// The snake_case wire tag for this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Navigate => "navigate",
            Action::NavigateBack => "navigate_back",
            Action::Snapshot => "snapshot",
            Action::Screenshot => "screenshot",
            Action::Click => "click",
            Action::Type => "type",
            Action::PressKey => "press_key",
            Action::Hover => "hover",
            Action::FillForm => "fill_form",
            Action::SelectOption => "select_option",
            Action::Evaluate => "evaluate",
            Action::WaitFor => "wait_for",
            Action::Tabs => "tabs",
            Action::Close => "close",
            Action::Resize => "resize",
            Action::GetCookies => "get_cookies",
            Action::GetBookmarks => "get_bookmarks",
            Action::GetHistory => "get_history",
            Action::NetworkRequests => "network_requests",
            Action::SavePdf => "save_pdf",
            Action::PageContent => "page_content",
        }
    }

    /// Parse a wire tag; `None` for anything outside the catalog.
    pub fn from_tag(tag: &str) -> Option<Action> {
        ALL_ACTIONS.iter().copied().find(|a| a.as_str() == tag)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command as written to the wire.
///
/// The parameter record is kept raw here; the dispatcher validates the
/// envelope shape first (string `id`, string `action`) and only then narrows
/// `params` into a [`CommandPayload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// Correlation ID, unique among in-flight commands.
    pub id: String,
    /// Action tag (see [`Action`]).
    pub action: String,
    /// Parameter record, shape determined by the action.
    #[serde(default)]
    pub params: Value,
}

impl Command {
    /// Build a command from a typed action and raw tool-call arguments.
    pub fn new(id: impl Into<String>, action: Action, params: Value) -> Self {
        Self {
            id: id.into(),
            action: action.as_str().to_string(),
            params,
        }
    }

    /// Narrow the raw parameter record into the typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::UnknownAction`] for a tag outside the
    /// catalog and [`AgentfoxError::MalformedCommand`] when the parameters
    /// do not match the action's shape.
    pub fn payload(&self) -> Result<CommandPayload> {
        CommandPayload::parse(&self.action, self.params.clone())
    }
}

/// Mouse button selector for click commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// DOM `MouseEvent.button` code.
    pub fn code(&self) -> u8 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
        }
    }
}

/// Keyboard modifier flags attached to pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyModifier {
    Shift,
    Control,
    Alt,
    Meta,
}

/// Image encoding for screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Jpeg,
}

impl ScreenshotFormat {
    /// MIME type for the encoded image.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ScreenshotFormat::Png => "image/png",
            ScreenshotFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Field kinds accepted by fill-form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Textbox,
    Checkbox,
    Radio,
    Combobox,
    Slider,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Textbox => "textbox",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::Combobox => "combobox",
            FieldType::Slider => "slider",
        };
        f.write_str(s)
    }
}

/// Tab management sub-operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabsAction {
    List,
    New,
    Close,
    Select,
}

/// Network recording sub-operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkAction {
    Start,
    Stop,
    Get,
    Clear,
}

/// Parameters for `navigate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigateParams {
    /// Absolute URL to load in the active tab.
    pub url: String,
}

/// Parameters for `screenshot`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotParams {
    /// Image encoding; defaults to PNG.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub format: Option<ScreenshotFormat>,
    /// Capture the full scrollable page instead of the viewport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_page: Option<bool>,
    /// Restrict the capture to one element.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub element_ref: Option<String>,
}

/// Parameters for `click`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickParams {
    /// Target element reference from the last snapshot.
    #[serde(rename = "ref")]
    pub element_ref: String,
    /// Mouse button; defaults to left.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<MouseButton>,
    /// Modifier keys held during the click.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Vec<KeyModifier>>,
    /// Emit a double-click sequence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub double_click: Option<bool>,
}

/// Parameters for `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeParams {
    /// Target element reference.
    #[serde(rename = "ref")]
    pub element_ref: String,
    /// Text to enter.
    pub text: String,
    /// Press Enter (and submit an enclosing form) afterwards.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<bool>,
    /// Emit per-character key sequences instead of one value assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slowly: Option<bool>,
}

/// Parameters for `press_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressKeyParams {
    /// Key name: a single character or a named key such as `Enter`.
    pub key: String,
}

/// Parameters for `hover`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoverParams {
    /// Target element reference.
    #[serde(rename = "ref")]
    pub element_ref: String,
}

/// One field in a fill-form batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    /// Target element reference.
    #[serde(rename = "ref")]
    pub element_ref: String,
    /// Human-readable field name, used in per-field error reports.
    pub name: String,
    /// Declared control type; validated against the element.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Desired value: a string for text-like fields, a boolean for
    /// checkbox/radio.
    pub value: Value,
}

/// Parameters for `fill_form`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillFormParams {
    /// Fields to fill, applied in order; per-field failures never abort the
    /// batch.
    pub fields: Vec<FormField>,
}

/// Parameters for `select_option`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectOptionParams {
    /// Target `SELECT` element reference.
    #[serde(rename = "ref")]
    pub element_ref: String,
    /// Option labels or values to select.
    pub values: Vec<String>,
}

/// Parameters for `evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateParams {
    /// A JavaScript function expression, e.g. `"() => document.title"`.
    pub function: String,
    /// Optional element reference passed to the function.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub element_ref: Option<String>,
}

/// Parameters for `wait_for`. At least one field must be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitForParams {
    /// Wait until this text appears in the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Wait until this text disappears from the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_gone: Option<String>,
    /// Time budget in seconds; alone it is a plain delay, combined with a
    /// text condition it is the overall timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// Parameters for `tabs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabsParams {
    /// Sub-operation to perform.
    pub action: TabsAction,
    /// Tab index for `close`/`select`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// Parameters for `resize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeParams {
    /// New window width in CSS pixels.
    pub width: u32,
    /// New window height in CSS pixels.
    pub height: u32,
}

/// Parameters for `get_cookies`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetCookiesParams {
    /// Restrict to cookies visible to this URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Parameters for `get_bookmarks`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetBookmarksParams {
    /// Free-text bookmark search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Parameters for `get_history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistoryParams {
    /// Free-text history search.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Maximum number of items to return.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    /// Lower visit-time bound, in milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    /// Upper visit-time bound, in milliseconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

/// Parameters for `network_requests`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkRequestsParams {
    /// Recording sub-operation.
    pub action: NetworkAction,
    /// Substring filter applied to recorded URLs on `get`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Parameters for `save_pdf`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePdfParams {
    /// Text placed in the page header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Text placed in the page footer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
}

/// Parameters for `page_content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageContentParams {
    /// Optional CSS selector narrowing the extraction target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// The closed tagged sum over every browser operation.
///
/// Produced by [`Command::payload`]; handled exhaustively by the dispatcher.
#[derive(Debug, Clone)]
pub enum CommandPayload {
    Navigate(NavigateParams),
    NavigateBack,
    Snapshot,
    Screenshot(ScreenshotParams),
    Click(ClickParams),
    Type(TypeParams),
    PressKey(PressKeyParams),
    Hover(HoverParams),
    FillForm(FillFormParams),
    SelectOption(SelectOptionParams),
    Evaluate(EvaluateParams),
    WaitFor(WaitForParams),
    Tabs(TabsParams),
    Close,
    Resize(ResizeParams),
    GetCookies(GetCookiesParams),
    GetBookmarks(GetBookmarksParams),
    GetHistory(GetHistoryParams),
    NetworkRequests(NetworkRequestsParams),
    SavePdf(SavePdfParams),
    PageContent(PageContentParams),
}

impl CommandPayload {
    /// Narrow a raw action tag and parameter record into the typed sum.
    ///
    /// A `null` parameter record is treated as an empty object so that
    /// actions whose parameters are all optional accept a bare command.
    ///
    /// # Errors
    ///
    /// Returns [`AgentfoxError::UnknownAction`] for an unrecognized tag and
    /// [`AgentfoxError::MalformedCommand`] when `params` does not match the
    /// action's parameter shape.
    pub fn parse(action: &str, params: Value) -> Result<CommandPayload> {
        let tag = Action::from_tag(action)
            .ok_or_else(|| AgentfoxError::UnknownAction(action.to_string()))?;
        let params = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };

        fn narrow<T: serde::de::DeserializeOwned>(action: Action, params: Value) -> Result<T> {
            serde_json::from_value(params).map_err(|e| {
                AgentfoxError::MalformedCommand(format!("{} parameters: {}", action, e)).into()
            })
        }

        let payload = match tag {
            Action::Navigate => CommandPayload::Navigate(narrow(tag, params)?),
            Action::NavigateBack => CommandPayload::NavigateBack,
            Action::Snapshot => CommandPayload::Snapshot,
            Action::Screenshot => CommandPayload::Screenshot(narrow(tag, params)?),
            Action::Click => CommandPayload::Click(narrow(tag, params)?),
            Action::Type => CommandPayload::Type(narrow(tag, params)?),
            Action::PressKey => CommandPayload::PressKey(narrow(tag, params)?),
            Action::Hover => CommandPayload::Hover(narrow(tag, params)?),
            Action::FillForm => CommandPayload::FillForm(narrow(tag, params)?),
            Action::SelectOption => CommandPayload::SelectOption(narrow(tag, params)?),
            Action::Evaluate => CommandPayload::Evaluate(narrow(tag, params)?),
            Action::WaitFor => CommandPayload::WaitFor(narrow(tag, params)?),
            Action::Tabs => CommandPayload::Tabs(narrow(tag, params)?),
            Action::Close => CommandPayload::Close,
            Action::Resize => CommandPayload::Resize(narrow(tag, params)?),
            Action::GetCookies => CommandPayload::GetCookies(narrow(tag, params)?),
            Action::GetBookmarks => CommandPayload::GetBookmarks(narrow(tag, params)?),
            Action::GetHistory => CommandPayload::GetHistory(narrow(tag, params)?),
            Action::NetworkRequests => CommandPayload::NetworkRequests(narrow(tag, params)?),
            Action::SavePdf => CommandPayload::SavePdf(narrow(tag, params)?),
            Action::PageContent => CommandPayload::PageContent(narrow(tag, params)?),
        };
        Ok(payload)
    }
}

/// A response correlated to a command by ID.
///
/// Exactly one of `result` and `error` is present; the constructors enforce
/// the invariant.
///
/// # Examples
///
/// ```
/// use agentfox::protocol::CommandResponse;
///
/// let ok = CommandResponse::ok("c1", serde_json::json!({"url": "https://example.com/"}));
/// assert!(ok.success && ok.result.is_some() && ok.error.is_none());
///
/// let fail = CommandResponse::fail("c1", "Tab closed during navigation");
/// assert!(!fail.success && fail.result.is_none() && fail.error.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Correlation ID mirroring the command.
    pub id: String,
    /// Whether the command succeeded.
    pub success: bool,
    /// Result payload, shape determined by the command's action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error string when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    /// Successful response carrying a result payload.
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response carrying an error string.
    pub fn fail(id: impl Into<String>, error: impl ToString) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}
