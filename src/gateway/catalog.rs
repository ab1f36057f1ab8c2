//! The static tool catalog published to the MCP client
//!
//! Each [`ToolSpec`] ties together a tool name, its description, the JSON
//! Schema for its parameters, the command [`Action`] it maps to, and a
//! formatter that converts the browser's result payload into MCP content
//! items. The catalog is static: it never changes during a session.

use serde_json::{json, Value};

use crate::gateway::rpc::{McpTool, ToolContent};
use crate::protocol::{Action, AxNode};

/// Formatter converting a command result payload into MCP content items.
pub type ResultFormatter = fn(&Value) -> Vec<ToolContent>;

/// One entry of the tool catalog.
pub struct ToolSpec {
    /// Unique tool name shown to the agent.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// The command action this tool maps to.
    pub action: Action,
    /// JSON Schema for the tool parameters.
    pub schema: Value,
    /// Result formatter.
    pub format: ResultFormatter,
}

/// The static catalog, with lookup by tool name.
pub struct ToolCatalog {
    tools: Vec<ToolSpec>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCatalog {
    /// Build the full catalog.
    pub fn new() -> Self {
        Self {
            tools: build_tools(),
        }
    }

    /// Look a tool up by name.
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// The catalog as published by `tools/list`.
    pub fn list(&self) -> Vec<McpTool> {
        self.tools
            .iter()
            .map(|t| McpTool {
                name: t.name.to_string(),
                description: t.description.to_string(),
                input_schema: t.schema.clone(),
            })
            .collect()
    }

    /// Number of published tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the catalog is empty (it never is).
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Pretty-printed JSON fallback formatter.
fn format_json(result: &Value) -> Vec<ToolContent> {
    let text = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    vec![ToolContent::Text { text }]
}

/// `{url, title}` payloads from navigation commands.
fn format_navigation(result: &Value) -> Vec<ToolContent> {
    let url = result["url"].as_str().unwrap_or("about:blank");
    let title = result["title"].as_str().unwrap_or("");
    vec![ToolContent::Text {
        text: format!("Navigated to {} ({})", url, title),
    }]
}

/// `{tree, url, title}` from snapshot: render the tree as indented text.
fn format_snapshot(result: &Value) -> Vec<ToolContent> {
    let url = result["url"].as_str().unwrap_or("about:blank");
    let title = result["title"].as_str().unwrap_or("");
    let rendered = match serde_json::from_value::<AxNode>(result["tree"].clone()) {
        Ok(tree) => tree.render(),
        Err(_) => serde_json::to_string_pretty(&result["tree"]).unwrap_or_default(),
    };
    vec![ToolContent::Text {
        text: format!(
            "Page URL: {}\nPage Title: {}\nPage Snapshot:\n{}",
            url, title, rendered
        ),
    }]
}

/// `{data, mimeType}` from screenshot: an image content item.
fn format_screenshot(result: &Value) -> Vec<ToolContent> {
    match (result["data"].as_str(), result["mimeType"].as_str()) {
        (Some(data), Some(mime_type)) => vec![ToolContent::Image {
            data: data.to_string(),
            mime_type: mime_type.to_string(),
        }],
        _ => format_json(result),
    }
}

/// `{text, url, title}` from page-content.
fn format_page_content(result: &Value) -> Vec<ToolContent> {
    let text = result["text"].as_str().unwrap_or("");
    let url = result["url"].as_str().unwrap_or("about:blank");
    let title = result["title"].as_str().unwrap_or("");
    vec![ToolContent::Text {
        text: format!("{}\n\n({} - {})", text, title, url),
    }]
}

/// `{value}` from evaluate.
fn format_evaluate(result: &Value) -> Vec<ToolContent> {
    let text = match &result["value"] {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    vec![ToolContent::Text { text }]
}

/// Empty-object results from pure actions.
fn format_done(_result: &Value) -> Vec<ToolContent> {
    vec![ToolContent::Text {
        text: "Done".to_string(),
    }]
}

/// `{matched}` from wait_for.
fn format_wait_for(result: &Value) -> Vec<ToolContent> {
    let matched = result["matched"].as_bool().unwrap_or(false);
    vec![ToolContent::Text {
        text: if matched {
            "Condition met".to_string()
        } else {
            "Condition not met before the time budget expired".to_string()
        },
    }]
}

/// `{filledCount, errors?}` from fill_form.
fn format_fill_form(result: &Value) -> Vec<ToolContent> {
    let filled = result["filledCount"].as_u64().unwrap_or(0);
    let mut text = format!("Filled {} field(s)", filled);
    if let Some(errors) = result["errors"].as_array() {
        if !errors.is_empty() {
            text.push_str("\nErrors:");
            for error in errors {
                if let Some(s) = error.as_str() {
                    text.push_str("\n- ");
                    text.push_str(s);
                }
            }
        }
    }
    vec![ToolContent::Text { text }]
}

/// The reference parameter shared by element-targeting tools.
fn ref_property() -> Value {
    json!({
        "type": "string",
        "description": "Element reference from the most recent snapshot, e.g. \"e3\""
    })
}

fn build_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "browser_navigate",
            description: "Navigate the active tab to a URL and wait for the page to load",
            action: Action::Navigate,
            schema: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "Absolute URL to open"}
                },
                "required": ["url"]
            }),
            format: format_navigation,
        },
        ToolSpec {
            name: "browser_navigate_back",
            description: "Go back one entry in the active tab's history",
            action: Action::NavigateBack,
            schema: json!({"type": "object", "properties": {}}),
            format: format_navigation,
        },
        ToolSpec {
            name: "browser_snapshot",
            description: "Capture an accessibility snapshot of the current page. Returns a semantic tree with element references usable by interaction tools.",
            action: Action::Snapshot,
            schema: json!({"type": "object", "properties": {}}),
            format: format_snapshot,
        },
        ToolSpec {
            name: "browser_screenshot",
            description: "Capture a screenshot of the viewport, the full page, or a single element",
            action: Action::Screenshot,
            schema: json!({
                "type": "object",
                "properties": {
                    "type": {"type": "string", "enum": ["png", "jpeg"], "description": "Image encoding; defaults to png"},
                    "fullPage": {"type": "boolean", "description": "Capture the full scrollable page"},
                    "ref": ref_property()
                }
            }),
            format: format_screenshot,
        },
        ToolSpec {
            name: "browser_click",
            description: "Click an element from the snapshot",
            action: Action::Click,
            schema: json!({
                "type": "object",
                "properties": {
                    "ref": ref_property(),
                    "button": {"type": "string", "enum": ["left", "middle", "right"]},
                    "modifiers": {
                        "type": "array",
                        "items": {"type": "string", "enum": ["shift", "control", "alt", "meta"]}
                    },
                    "doubleClick": {"type": "boolean"}
                },
                "required": ["ref"]
            }),
            format: format_done,
        },
        ToolSpec {
            name: "browser_type",
            description: "Type text into an input, textarea, or editable element",
            action: Action::Type,
            schema: json!({
                "type": "object",
                "properties": {
                    "ref": ref_property(),
                    "text": {"type": "string", "description": "Text to enter"},
                    "submit": {"type": "boolean", "description": "Press Enter and submit the enclosing form afterwards"},
                    "slowly": {"type": "boolean", "description": "Emit one key sequence per character"}
                },
                "required": ["ref", "text"]
            }),
            format: format_done,
        },
        ToolSpec {
            name: "browser_press_key",
            description: "Press a key on the focused element (a character or a named key such as Enter, Tab, Escape)",
            action: Action::PressKey,
            schema: json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string", "description": "Key to press"}
                },
                "required": ["key"]
            }),
            format: format_done,
        },
        ToolSpec {
            name: "browser_hover",
            description: "Hover the pointer over an element",
            action: Action::Hover,
            schema: json!({
                "type": "object",
                "properties": {"ref": ref_property()},
                "required": ["ref"]
            }),
            format: format_done,
        },
        ToolSpec {
            name: "browser_fill_form",
            description: "Fill several form fields in one batch; per-field failures are reported without aborting the rest",
            action: Action::FillForm,
            schema: json!({
                "type": "object",
                "properties": {
                    "fields": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "ref": ref_property(),
                                "name": {"type": "string", "description": "Field name used in error reports"},
                                "type": {"type": "string", "enum": ["textbox", "checkbox", "radio", "combobox", "slider"]},
                                "value": {"description": "String for text-like fields, boolean for checkbox/radio"}
                            },
                            "required": ["ref", "name", "type", "value"]
                        }
                    }
                },
                "required": ["fields"]
            }),
            format: format_fill_form,
        },
        ToolSpec {
            name: "browser_select_option",
            description: "Select one or more options in a select element, matching by option text first and value second",
            action: Action::SelectOption,
            schema: json!({
                "type": "object",
                "properties": {
                    "ref": ref_property(),
                    "values": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["ref", "values"]
            }),
            format: format_json,
        },
        ToolSpec {
            name: "browser_evaluate",
            description: "Evaluate a JavaScript function in the page, optionally against an element from the snapshot",
            action: Action::Evaluate,
            schema: json!({
                "type": "object",
                "properties": {
                    "function": {"type": "string", "description": "A function expression, e.g. \"() => document.title\""},
                    "ref": ref_property()
                },
                "required": ["function"]
            }),
            format: format_evaluate,
        },
        ToolSpec {
            name: "browser_wait_for",
            description: "Wait for text to appear or disappear, or for a fixed time",
            action: Action::WaitFor,
            schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Wait until this text appears"},
                    "textGone": {"type": "string", "description": "Wait until this text disappears"},
                    "time": {"type": "number", "description": "Seconds; alone a plain delay, otherwise the overall timeout"}
                }
            }),
            format: format_wait_for,
        },
        ToolSpec {
            name: "browser_tabs",
            description: "List, open, close, or select browser tabs",
            action: Action::Tabs,
            schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["list", "new", "close", "select"]},
                    "index": {"type": "integer", "description": "Tab index for close/select"}
                },
                "required": ["action"]
            }),
            format: format_json,
        },
        ToolSpec {
            name: "browser_close",
            description: "Close the current browser window",
            action: Action::Close,
            schema: json!({"type": "object", "properties": {}}),
            format: format_done,
        },
        ToolSpec {
            name: "browser_resize",
            description: "Resize the browser window",
            action: Action::Resize,
            schema: json!({
                "type": "object",
                "properties": {
                    "width": {"type": "integer"},
                    "height": {"type": "integer"}
                },
                "required": ["width", "height"]
            }),
            format: format_done,
        },
        ToolSpec {
            name: "browser_get_cookies",
            description: "Read cookies, optionally restricted to those visible to a URL",
            action: Action::GetCookies,
            schema: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"}
                }
            }),
            format: format_json,
        },
        ToolSpec {
            name: "browser_get_bookmarks",
            description: "Search bookmarks",
            action: Action::GetBookmarks,
            schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"}
                }
            }),
            format: format_json,
        },
        ToolSpec {
            name: "browser_get_history",
            description: "Search browsing history",
            action: Action::GetHistory,
            schema: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "maxResults": {"type": "integer"},
                    "startTime": {"type": "number", "description": "Milliseconds since the epoch"},
                    "endTime": {"type": "number", "description": "Milliseconds since the epoch"}
                }
            }),
            format: format_json,
        },
        ToolSpec {
            name: "browser_network_requests",
            description: "Start, stop, read, or clear network request recording",
            action: Action::NetworkRequests,
            schema: json!({
                "type": "object",
                "properties": {
                    "action": {"type": "string", "enum": ["start", "stop", "get", "clear"]},
                    "filter": {"type": "string", "description": "Substring filter applied to recorded URLs"}
                },
                "required": ["action"]
            }),
            format: format_json,
        },
        ToolSpec {
            name: "browser_save_pdf",
            description: "Save the current page as a PDF",
            action: Action::SavePdf,
            schema: json!({
                "type": "object",
                "properties": {
                    "header": {"type": "string"},
                    "footer": {"type": "string"}
                }
            }),
            format: format_json,
        },
        ToolSpec {
            name: "browser_page_content",
            description: "Extract the page's visible text, optionally scoped by a CSS selector",
            action: Action::PageContent,
            schema: json!({
                "type": "object",
                "properties": {
                    "selector": {"type": "string", "description": "CSS selector narrowing the extraction"}
                }
            }),
            format: format_page_content,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_covers_every_action() {
        let catalog = ToolCatalog::new();
        assert_eq!(catalog.len(), crate::protocol::command::ALL_ACTIONS.len());
        for action in crate::protocol::command::ALL_ACTIONS {
            assert!(
                catalog.tools.iter().any(|t| t.action == *action),
                "no tool maps to {}",
                action
            );
        }
    }

    #[test]
    fn test_tool_names_are_unique() {
        let catalog = ToolCatalog::new();
        let mut names: Vec<&str> = catalog.tools.iter().map(|t| t.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), catalog.len());
    }

    #[test]
    fn test_lookup_by_name() {
        let catalog = ToolCatalog::new();
        let tool = catalog.get("browser_navigate").unwrap();
        assert_eq!(tool.action, Action::Navigate);
        assert!(catalog.get("browser_teleport").is_none());
    }

    #[test]
    fn test_every_schema_is_an_object_schema() {
        let catalog = ToolCatalog::new();
        for tool in catalog.list() {
            assert_eq!(tool.input_schema["type"], "object", "tool {}", tool.name);
        }
    }

    #[test]
    fn test_snapshot_formatter_renders_tree() {
        let result = json!({
            "url": "https://example.com/",
            "title": "Example Domain",
            "tree": {
                "role": "document",
                "name": "Example Domain",
                "children": [
                    {"role": "button", "name": "Submit", "ref": "e0"}
                ]
            }
        });
        let content = format_snapshot(&result);
        match &content[0] {
            ToolContent::Text { text } => {
                assert!(text.contains("Page URL: https://example.com/"));
                assert!(text.contains("- button \"Submit\" [ref=e0]"));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_screenshot_formatter_emits_image() {
        let result = json!({"data": "aGVsbG8=", "mimeType": "image/png"});
        let content = format_screenshot(&result);
        assert_eq!(
            content,
            vec![ToolContent::Image {
                data: "aGVsbG8=".to_string(),
                mime_type: "image/png".to_string()
            }]
        );
    }

    #[test]
    fn test_fill_form_formatter_lists_errors() {
        let result = json!({
            "filledCount": 2,
            "errors": ["Subscribe: Element type mismatch: expected checkbox, found textbox"]
        });
        let content = format_fill_form(&result);
        match &content[0] {
            ToolContent::Text { text } => {
                assert!(text.contains("Filled 2 field(s)"));
                assert!(text.contains("expected checkbox"));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[test]
    fn test_evaluate_formatter_passes_strings_through() {
        let content = format_evaluate(&json!({"value": "Example Domain"}));
        assert_eq!(
            content,
            vec![ToolContent::Text {
                text: "Example Domain".to_string()
            }]
        );
    }
}
