//! The live document a content context operates on
//!
//! [`Page`] wraps a parsed HTML document together with the mutable state a
//! real page accumulates while an agent drives it: current form values,
//! checked/selected flags, the focused element, and the log of synthetic
//! events the action handlers dispatch. The document structure itself only
//! changes through [`Page::load`] (a navigation, which bumps the document
//! generation and thereby invalidates outstanding element references) and
//! [`Page::append_body_html`] (page-side mutation, which keeps existing
//! nodes valid).
//!
//! Layout does not exist here, so bounding rectangles are synthesized from
//! document order: stable, deterministic, and good enough to give pointer
//! events a concrete coordinate.

use std::collections::HashMap;

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node, Selector};
use serde::Serialize;

/// Tags whose subtrees never contribute content or text.
pub const NON_CONTENT_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "iframe"];

/// A synthetic bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Center point, where pointer events land.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// One synthetic event dispatched by an action handler.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticEvent {
    /// Event kind, e.g. `pointerdown`, `click`, `change`.
    pub kind: String,
    /// Lowercase tag name of the target element.
    pub target: String,
    /// Whether the event bubbles.
    pub bubbles: bool,
    /// Click count (2 for the double-click sequence).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<u32>,
    /// Mouse button code (left=0, middle=1, right=2).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<u8>,
    /// Modifier names held during the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Vec<String>>,
    /// Key name for keyboard events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Physical key code for keyboard events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Pointer X coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_x: Option<f64>,
    /// Pointer Y coordinate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_y: Option<f64>,
}

impl SyntheticEvent {
    /// A plain bubbling event with no pointer or key detail.
    pub fn simple(kind: &str, target: &str) -> Self {
        Self {
            kind: kind.to_string(),
            target: target.to_string(),
            bubbles: true,
            detail: None,
            button: None,
            modifiers: None,
            key: None,
            code: None,
            client_x: None,
            client_y: None,
        }
    }
}

/// Mutable per-element state layered over the parsed document.
#[derive(Debug, Clone, Default)]
struct ElementState {
    value: Option<String>,
    checked: Option<bool>,
    selected: Option<bool>,
}

/// A live document plus its interaction state.
pub struct Page {
    doc: Html,
    url: String,
    title: String,
    generation: u64,
    state: HashMap<NodeId, ElementState>,
    focused: Option<NodeId>,
    events: Vec<SyntheticEvent>,
}

impl Page {
    /// Parse a document. The title falls back to the `<title>` element.
    pub fn new(html: &str, url: impl Into<String>, title: Option<String>) -> Self {
        let doc = Html::parse_document(html);
        let title = title.unwrap_or_else(|| document_title(&doc));
        Self {
            doc,
            url: url.into(),
            title,
            generation: 0,
            state: HashMap::new(),
            focused: None,
            events: Vec::new(),
        }
    }

    /// Replace the document, as a navigation or reload does.
    ///
    /// Bumps the generation counter: every element reference handed out
    /// against the previous document becomes stale.
    pub fn load(&mut self, html: &str, url: impl Into<String>, title: Option<String>) {
        self.doc = Html::parse_document(html);
        self.url = url.into();
        self.title = title.unwrap_or_else(|| document_title(&self.doc));
        self.generation += 1;
        self.state.clear();
        self.focused = None;
        self.events.clear();
    }

    /// Current document generation; bumped on every [`Page::load`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// The parsed document.
    pub fn document(&self) -> &Html {
        &self.doc
    }

    /// Look an element up by node ID; `None` when the node is gone or is
    /// not an element.
    pub fn element(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.doc.tree.get(id).and_then(ElementRef::wrap)
    }

    /// The `<body>` element, when the document has one.
    pub fn body(&self) -> Option<ElementRef<'_>> {
        let selector = Selector::parse("body").ok()?;
        self.doc.select(&selector).next()
    }

    /// Find an element by its `id` attribute.
    pub fn element_by_id(&self, target: &str) -> Option<ElementRef<'_>> {
        self.doc
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().id() == Some(target))
    }

    /// The whitespace-normalized visible text of the body.
    pub fn body_text(&self) -> String {
        self.body().map(|body| visible_text(body)).unwrap_or_default()
    }

    /// Synthetic bounding rectangle, derived from document order.
    pub fn rect_of(&self, id: NodeId) -> Rect {
        let index = self
            .doc
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .position(|el| el.id() == id)
            .unwrap_or(0);
        Rect {
            x: 8.0,
            y: 8.0 + index as f64 * 20.0,
            width: 160.0,
            height: 16.0,
        }
    }

    /// Current form value: interaction state first, then the document.
    pub fn value_of(&self, id: NodeId) -> String {
        if let Some(state) = self.state.get(&id) {
            if let Some(value) = &state.value {
                return value.clone();
            }
        }
        let Some(el) = self.element(id) else {
            return String::new();
        };
        match el.value().name() {
            "textarea" => visible_text(el),
            _ => el.value().attr("value").unwrap_or_default().to_string(),
        }
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) {
        self.state.entry(id).or_default().value = Some(value.into());
    }

    /// Checked state: interaction state first, then the `checked` attribute.
    pub fn is_checked(&self, id: NodeId) -> bool {
        if let Some(state) = self.state.get(&id) {
            if let Some(checked) = state.checked {
                return checked;
            }
        }
        self.element(id)
            .map(|el| el.value().attr("checked").is_some())
            .unwrap_or(false)
    }

    pub fn set_checked(&mut self, id: NodeId, checked: bool) {
        self.state.entry(id).or_default().checked = Some(checked);
    }

    /// Selected state for `<option>` elements.
    pub fn is_selected(&self, id: NodeId) -> bool {
        if let Some(state) = self.state.get(&id) {
            if let Some(selected) = state.selected {
                return selected;
            }
        }
        self.element(id)
            .map(|el| el.value().attr("selected").is_some())
            .unwrap_or(false)
    }

    pub fn set_selected(&mut self, id: NodeId, selected: bool) {
        self.state.entry(id).or_default().selected = Some(selected);
    }

    /// The focused element, if any.
    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn focus(&mut self, id: NodeId) {
        self.focused = Some(id);
    }

    /// Record one synthetic event.
    pub fn push_event(&mut self, event: SyntheticEvent) {
        self.events.push(event);
    }

    /// Take the recorded event log.
    pub fn drain_events(&mut self) -> Vec<SyntheticEvent> {
        std::mem::take(&mut self.events)
    }

    /// Append parsed markup to the body, as page scripts do.
    ///
    /// Existing nodes keep their IDs, so references from the last snapshot
    /// stay valid; only navigations invalidate them.
    pub fn append_body_html(&mut self, html: &str) {
        let Some(body_id) = self.body().map(|b| b.id()) else {
            return;
        };
        let fragment = Html::parse_fragment(html);
        let roots: Vec<NodeId> = fragment.root_element().children().map(|c| c.id()).collect();
        for root in roots {
            if let Some(node) = fragment.tree.get(root) {
                copy_subtree(&mut self.doc, body_id, node);
            }
        }
    }
}

/// Recursively copy a parsed subtree into `dst` under `parent`.
fn copy_subtree(dst: &mut Html, parent: NodeId, src: NodeRef<'_, Node>) {
    let new_id = match dst.tree.get_mut(parent) {
        Some(mut parent) => parent.append(src.value().clone()).id(),
        None => return,
    };
    for child in src.children() {
        copy_subtree(dst, new_id, child);
    }
}

/// The `<title>` text, trimmed.
fn document_title(doc: &Html) -> String {
    Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Whitespace-normalized text of an element, skipping non-content subtrees.
pub fn visible_text(el: ElementRef<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();
    collect_text(el, &mut parts);
    let joined = parts.join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(el: ElementRef<'_>, parts: &mut Vec<String>) {
    if NON_CONTENT_TAGS.contains(&el.value().name()) {
        return;
    }
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                let t = text.text.trim();
                if !t.is_empty() {
                    parts.push(t.to_string());
                }
            }
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, parts);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<!DOCTYPE html>
        <html><head><title>Sample Page</title></head>
        <body>
          <h1 id="headline">Welcome</h1>
          <input id="email" type="email" value="old@example.com">
          <input id="subscribe" type="checkbox" checked>
          <script>var hidden = "nope";</script>
          <p>Hello <b>world</b></p>
        </body></html>"#;

    #[test]
    fn test_title_from_document() {
        let page = Page::new(SAMPLE, "https://example.com/", None);
        assert_eq!(page.title(), "Sample Page");
    }

    #[test]
    fn test_explicit_title_wins() {
        let page = Page::new(SAMPLE, "https://example.com/", Some("Override".into()));
        assert_eq!(page.title(), "Override");
    }

    #[test]
    fn test_body_text_skips_script_and_normalizes() {
        let page = Page::new(SAMPLE, "https://example.com/", None);
        let text = page.body_text();
        assert!(text.contains("Welcome"));
        assert!(text.contains("Hello world"));
        assert!(!text.contains("nope"));
    }

    #[test]
    fn test_value_state_overrides_attribute() {
        let mut page = Page::new(SAMPLE, "https://example.com/", None);
        let id = page.element_by_id("email").unwrap().id();
        assert_eq!(page.value_of(id), "old@example.com");
        page.set_value(id, "new@example.com");
        assert_eq!(page.value_of(id), "new@example.com");
    }

    #[test]
    fn test_checked_state_overrides_attribute() {
        let mut page = Page::new(SAMPLE, "https://example.com/", None);
        let id = page.element_by_id("subscribe").unwrap().id();
        assert!(page.is_checked(id));
        page.set_checked(id, false);
        assert!(!page.is_checked(id));
    }

    #[test]
    fn test_load_bumps_generation_and_clears_state() {
        let mut page = Page::new(SAMPLE, "https://example.com/", None);
        let id = page.element_by_id("email").unwrap().id();
        page.set_value(id, "x");
        page.focus(id);
        assert_eq!(page.generation(), 0);

        page.load("<html><head><title>Next</title></head><body></body></html>", "https://example.com/next", None);
        assert_eq!(page.generation(), 1);
        assert_eq!(page.title(), "Next");
        assert!(page.focused().is_none());
    }

    #[test]
    fn test_append_body_html_keeps_existing_nodes() {
        let mut page = Page::new(SAMPLE, "https://example.com/", None);
        let id = page.element_by_id("headline").unwrap().id();
        page.append_body_html("<p>Hello appended</p>");
        // The pre-existing node is still resolvable by its old ID.
        assert!(page.element(id).is_some());
        assert!(page.body_text().contains("Hello appended"));
        assert_eq!(page.generation(), 0);
    }

    #[test]
    fn test_rect_is_deterministic_and_centered() {
        let page = Page::new(SAMPLE, "https://example.com/", None);
        let id = page.element_by_id("headline").unwrap().id();
        let rect = page.rect_of(id);
        assert_eq!(rect, page.rect_of(id));
        let (cx, cy) = rect.center();
        assert!(cx > rect.x && cy > rect.y);
    }

    #[test]
    fn test_event_log_drains() {
        let mut page = Page::new(SAMPLE, "https://example.com/", None);
        page.push_event(SyntheticEvent::simple("click", "h1"));
        assert_eq!(page.drain_events().len(), 1);
        assert!(page.drain_events().is_empty());
    }
}
