//! Accessibility-tree construction
//!
//! Walks the document body in document order and projects it into the
//! semantic tree the agent reads. The builder derives roles from explicit
//! `role` attributes and HTML semantics, computes accessible names through
//! the ARIA name priority chain, extracts state bits, erases nameless
//! non-interactive generics by promoting their children, and assigns
//! depth-first element references to every interactive node.
//!
//! Two hard bounds keep pathological documents in check: nodes deeper than
//! 100 levels are dropped, and traversal stops at 50 000 materialized nodes
//! with a trailing text node noting the truncation.

use ego_tree::NodeId;
use scraper::{ElementRef, Node};

use crate::browser::content::page::{visible_text, Page, NON_CONTENT_TAGS};
use crate::browser::content::refs::RefMap;
use crate::protocol::{AxNode, AxRole};

/// Maximum DOM depth; nodes below this are dropped.
pub const MAX_DEPTH: usize = 100;

/// Maximum number of materialized tree nodes.
pub const MAX_NODES: usize = 50_000;

/// Accessible names and text runs are clipped to this many characters.
pub const MAX_TEXT_LEN: usize = 200;

/// Tags that are interactive by themselves.
const INTERACTIVE_TAGS: &[&str] = &["a", "button", "input", "textarea", "select"];

/// Explicit roles that make an element interactive.
const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "textbox",
    "combobox",
    "slider",
    "switch",
    "tab",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "treeitem",
    "searchbox",
    "spinbutton",
];

/// Tags whose text content may serve as their accessible name.
const CONTENT_NAMING_TAGS: &[&str] = &[
    "a", "button", "h1", "h2", "h3", "h4", "h5", "h6", "label", "legend", "option", "li", "td",
    "th",
];

/// Native form controls for the disabled/required checks.
const FORM_CONTROL_TAGS: &[&str] = &["input", "textarea", "select", "button", "option", "fieldset"];

/// Build the accessibility tree for the current document.
///
/// Resets the reference map first: every reference from an earlier snapshot
/// is invalidated before the first new one is assigned.
pub fn build_tree(page: &Page, refs: &mut RefMap) -> AxNode {
    build_tree_bounded(page, refs, MAX_NODES)
}

/// Tree build with an explicit node budget (tests use a small one).
pub(crate) fn build_tree_bounded(page: &Page, refs: &mut RefMap, max_nodes: usize) -> AxNode {
    refs.reset(page.generation());
    let mut builder = Builder {
        page,
        refs,
        nodes: 0,
        max_nodes,
        truncated: false,
    };

    let mut root = AxNode::new(AxRole::Document);
    root.name = page.title().to_string();
    if let Some(body) = page.body() {
        root.children = builder.children_of(body, 1, &root.name);
    }
    if builder.truncated {
        root.children.push(AxNode::text(format!(
            "(snapshot truncated after {} nodes)",
            max_nodes
        )));
    }
    root
}

struct Builder<'a> {
    page: &'a Page,
    refs: &'a mut RefMap,
    nodes: usize,
    max_nodes: usize,
    truncated: bool,
}

impl Builder<'_> {
    /// Materialize the children of `el` in document order: element children
    /// recurse, text children become pseudo-nodes unless they duplicate the
    /// parent's accessible name.
    fn children_of(&mut self, el: ElementRef<'_>, depth: usize, parent_name: &str) -> Vec<AxNode> {
        let mut out = Vec::new();
        for child in el.children() {
            if self.truncated {
                break;
            }
            match child.value() {
                Node::Text(text) => {
                    let trimmed = text.text.trim();
                    if trimmed.is_empty() || trimmed == parent_name {
                        continue;
                    }
                    if !self.take_budget() {
                        break;
                    }
                    out.push(AxNode::text(clip(trimmed)));
                }
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        out.extend(self.build_element(child_el, depth));
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Build one element, returning zero nodes (skipped or dropped), one
    /// node, or several (a flattened generic promotes its children).
    fn build_element(&mut self, el: ElementRef<'_>, depth: usize) -> Vec<AxNode> {
        if self.truncated || depth > MAX_DEPTH {
            return Vec::new();
        }
        let tag = el.value().name();
        if NON_CONTENT_TAGS.contains(&tag) || is_hidden(el) {
            return Vec::new();
        }

        let (role, level) = derive_role(self.page, el);
        let interactive = is_interactive(el);
        let name = accessible_name(self.page, el, &role);

        // A nameless, non-interactive generic is erased: its children are
        // promoted into the parent.
        if role == AxRole::Generic && name.is_empty() && !interactive {
            return self.children_of(el, depth + 1, "");
        }

        if !self.take_budget() {
            return Vec::new();
        }

        let mut node = AxNode::new(role.clone());
        node.name = name;
        node.level = level;
        if interactive {
            node.node_ref = Some(self.refs.assign(el.id()));
        }
        apply_state(self.page, el, &role, &mut node);
        node.children = self.children_of(el, depth + 1, &node.name);
        vec![node]
    }

    /// Account for one materialized node; flips the truncation flag when
    /// the budget runs out.
    fn take_budget(&mut self) -> bool {
        if self.nodes >= self.max_nodes {
            self.truncated = true;
            return false;
        }
        self.nodes += 1;
        true
    }
}

/// Clip a string to [`MAX_TEXT_LEN`] characters with an ellipsis marker.
fn clip(text: &str) -> String {
    if text.chars().count() <= MAX_TEXT_LEN {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_TEXT_LEN).collect();
    out.push('…');
    out
}

/// Hidden-node rules: `hidden` attribute, `aria-hidden="true"`, inline
/// `display: none` / `visibility: hidden`, and hidden inputs.
fn is_hidden(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if v.attr("hidden").is_some() {
        return true;
    }
    if v.attr("aria-hidden") == Some("true") {
        return true;
    }
    if v.name() == "input" && v.attr("type") == Some("hidden") {
        return true;
    }
    if let Some(style) = v.attr("style") {
        let style: String = style.chars().filter(|c| !c.is_whitespace()).collect();
        if style.contains("display:none") || style.contains("visibility:hidden") {
            return true;
        }
    }
    false
}

/// Role derivation in priority order. Returns the role and, for headings,
/// the level.
fn derive_role(page: &Page, el: ElementRef<'_>) -> (AxRole, Option<u8>) {
    let v = el.value();
    let tag = v.name();

    // 1. Explicit author-declared role wins.
    if let Some(role) = v.attr("role") {
        if let Some(token) = role.split_whitespace().next() {
            let role = AxRole::parse(token);
            let level = if role == AxRole::Heading {
                heading_level(el)
            } else {
                None
            };
            return (role, level);
        }
    }

    // 2. Headings.
    if let Some(level) = tag
        .strip_prefix('h')
        .and_then(|d| d.parse::<u8>().ok())
        .filter(|d| (1..=6).contains(d) && tag.len() == 2)
    {
        return (AxRole::Heading, Some(level));
    }

    // 3. Anchors are links only when they actually link somewhere.
    if tag == "a" {
        return if v.attr("href").is_some() {
            (AxRole::Link, None)
        } else {
            (AxRole::Generic, None)
        };
    }

    // 4. Inputs map through a closed type table.
    if tag == "input" {
        let role = match v.attr("type").unwrap_or("text") {
            "search" => AxRole::Searchbox,
            "number" => AxRole::Spinbutton,
            "range" => AxRole::Slider,
            "checkbox" => AxRole::Checkbox,
            "radio" => AxRole::Radio,
            "submit" | "reset" | "button" | "image" | "file" => AxRole::Button,
            _ => AxRole::Textbox,
        };
        return (role, None);
    }

    // 5. Textareas.
    if tag == "textarea" {
        return (AxRole::Textbox, None);
    }

    // 6. Selects.
    if tag == "select" {
        return if v.attr("multiple").is_some() {
            (AxRole::Listbox, None)
        } else {
            (AxRole::Combobox, None)
        };
    }

    // 7. Sections are regions only when they are named.
    if tag == "section" {
        let named = v
            .attr("aria-label")
            .map(|l| !l.trim().is_empty())
            .unwrap_or(false)
            || labelledby_text(page, el).is_some()
            || v.attr("title").map(|t| !t.trim().is_empty()).unwrap_or(false);
        return if named {
            (AxRole::Region, None)
        } else {
            (AxRole::Generic, None)
        };
    }

    // 8. Articles.
    if tag == "article" {
        return (AxRole::Article, None);
    }

    // 9. Closed tag-to-role map.
    let role = match tag {
        "button" => AxRole::Button,
        "nav" => AxRole::Navigation,
        "main" => AxRole::Main,
        "aside" => AxRole::Complementary,
        "footer" => AxRole::Contentinfo,
        "header" => AxRole::Banner,
        "form" => AxRole::Form,
        "table" => AxRole::Table,
        "tr" => AxRole::Row,
        "td" => AxRole::Cell,
        "th" => AxRole::Columnheader,
        "ul" | "ol" => AxRole::List,
        "li" => AxRole::Listitem,
        "dialog" => AxRole::Dialog,
        "img" => AxRole::Img,
        "option" => AxRole::Option,
        // 10. Everything else.
        _ => AxRole::Generic,
    };
    (role, None)
}

fn heading_level(el: ElementRef<'_>) -> Option<u8> {
    el.value()
        .attr("aria-level")
        .and_then(|l| l.parse().ok())
        .or_else(|| {
            let tag = el.value().name();
            tag.strip_prefix('h').and_then(|d| d.parse().ok())
        })
}

/// Interactive classification: an interactive node receives an element
/// reference in the snapshot.
fn is_interactive(el: ElementRef<'_>) -> bool {
    let v = el.value();
    if INTERACTIVE_TAGS.contains(&v.name()) {
        return true;
    }
    if v.attr("onclick").is_some() || v.attr("onmousedown").is_some() {
        return true;
    }
    if v.attr("contenteditable") == Some("true") {
        return true;
    }
    if let Some(tabindex) = v.attr("tabindex").and_then(|t| t.parse::<i32>().ok()) {
        if tabindex >= 0 {
            return true;
        }
    }
    if let Some(role) = v.attr("role").and_then(|r| r.split_whitespace().next()) {
        if INTERACTIVE_ROLES.contains(&role) {
            return true;
        }
    }
    false
}

/// Concatenated text of the `aria-labelledby` targets, when any resolve.
fn labelledby_text(page: &Page, el: ElementRef<'_>) -> Option<String> {
    let ids = el.value().attr("aria-labelledby")?;
    let parts: Vec<String> = ids
        .split_whitespace()
        .filter_map(|id| page.element_by_id(id))
        .map(visible_text)
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Text of a `<label>`, excluding any form-control descendants.
fn label_text(label: ElementRef<'_>) -> String {
    fn collect(el: ElementRef<'_>, parts: &mut Vec<String>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => {
                    let t = text.text.trim();
                    if !t.is_empty() {
                        parts.push(t.to_string());
                    }
                }
                Node::Element(element) => {
                    if matches!(element.name(), "input" | "textarea" | "select") {
                        continue;
                    }
                    if let Some(child_el) = ElementRef::wrap(child) {
                        collect(child_el, parts);
                    }
                }
                _ => {}
            }
        }
    }
    let mut parts = Vec::new();
    collect(label, &mut parts);
    parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The label associated with a form control: `label[for]` first, then a
/// wrapping label.
fn associated_label(page: &Page, el: ElementRef<'_>) -> Option<String> {
    if let Some(id) = el.value().id() {
        let found = page
            .document()
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|cand| cand.value().name() == "label" && cand.value().attr("for") == Some(id));
        if let Some(label) = found {
            let text = label_text(label);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    let mut current = el.parent();
    while let Some(node) = current {
        if let Some(parent_el) = ElementRef::wrap(node) {
            if parent_el.value().name() == "label" {
                let text = label_text(parent_el);
                if !text.is_empty() {
                    return Some(text);
                }
            }
        }
        current = node.parent();
    }
    None
}

/// Accessible-name computation, in priority order.
fn accessible_name(page: &Page, el: ElementRef<'_>, role: &AxRole) -> String {
    let v = el.value();
    let tag = v.name();

    if let Some(label) = v.attr("aria-label") {
        let label = label.trim();
        if !label.is_empty() {
            return clip(label);
        }
    }

    if let Some(text) = labelledby_text(page, el) {
        return clip(&text);
    }

    if matches!(tag, "input" | "textarea" | "select") {
        if let Some(label) = associated_label(page, el) {
            return clip(&label);
        }
    }

    if tag == "img" {
        if let Some(alt) = v.attr("alt") {
            let alt = alt.trim();
            if !alt.is_empty() {
                return clip(alt);
            }
        }
    }

    if let Some(title) = v.attr("title") {
        let title = title.trim();
        if !title.is_empty() {
            return clip(title);
        }
    }

    let names_from_content = CONTENT_NAMING_TAGS.contains(&tag)
        || matches!(role, AxRole::Button | AxRole::Link);
    if names_from_content {
        let text = visible_text(el);
        if !text.is_empty() {
            return clip(&text);
        }
    }

    if matches!(tag, "input" | "textarea") {
        let is_text_input = tag == "textarea"
            || matches!(
                role,
                AxRole::Textbox | AxRole::Searchbox | AxRole::Spinbutton
            );
        if is_text_input {
            if let Some(placeholder) = v.attr("placeholder") {
                let placeholder = placeholder.trim();
                if !placeholder.is_empty() {
                    return clip(placeholder);
                }
            }
        }
    }

    if tag == "input"
        && matches!(v.attr("type"), Some("submit") | Some("reset") | Some("button"))
    {
        if let Some(value) = v.attr("value") {
            let value = value.trim();
            if !value.is_empty() {
                return clip(value);
            }
        }
    }

    String::new()
}

/// Texts of the selected options of a `<select>`, honoring interaction
/// state.
pub(crate) fn selected_option_texts(page: &Page, select: ElementRef<'_>) -> Vec<String> {
    let options: Vec<(NodeId, String)> = select
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "option")
        .map(|el| (el.id(), visible_text(el)))
        .collect();
    let selected: Vec<String> = options
        .iter()
        .filter(|(id, _)| page.is_selected(*id))
        .map(|(_, text)| text.clone())
        .collect();
    if selected.is_empty() {
        // Single selects default to their first option.
        if select.value().attr("multiple").is_none() {
            return options.into_iter().take(1).map(|(_, t)| t).collect();
        }
    }
    selected
}

/// Extract state bits, form value, and description.
fn apply_state(page: &Page, el: ElementRef<'_>, role: &AxRole, node: &mut AxNode) {
    let v = el.value();
    let tag = v.name();

    match role {
        AxRole::Checkbox | AxRole::Radio => {
            if tag == "input" {
                node.checked = Some(page.is_checked(el.id()));
            } else if let Some(aria) = v.attr("aria-checked") {
                node.checked = Some(aria == "true");
            }
        }
        AxRole::Textbox | AxRole::Searchbox | AxRole::Spinbutton | AxRole::Slider => {
            let value = page.value_of(el.id());
            if !value.is_empty() {
                node.value = Some(value);
            }
        }
        AxRole::Combobox | AxRole::Listbox if tag == "select" => {
            let selected = selected_option_texts(page, el);
            if !selected.is_empty() {
                node.value = Some(selected.join(", "));
            }
        }
        _ => {}
    }

    if (FORM_CONTROL_TAGS.contains(&tag) && v.attr("disabled").is_some())
        || v.attr("aria-disabled") == Some("true")
    {
        node.disabled = Some(true);
    }

    if let Some(expanded) = v.attr("aria-expanded") {
        node.expanded = Some(expanded == "true");
    }

    if tag == "option" {
        node.selected = Some(page.is_selected(el.id()));
    } else if v.attr("aria-selected") == Some("true") {
        node.selected = Some(true);
    }

    if (FORM_CONTROL_TAGS.contains(&tag) && v.attr("required").is_some())
        || v.attr("aria-required") == Some("true")
    {
        node.required = Some(true);
    }

    // Description: aria-describedby targets, else an unused title.
    if let Some(ids) = v.attr("aria-describedby") {
        let parts: Vec<String> = ids
            .split_whitespace()
            .filter_map(|id| page.element_by_id(id))
            .map(visible_text)
            .filter(|t| !t.is_empty())
            .collect();
        if !parts.is_empty() {
            node.description = Some(clip(&parts.join(" ")));
        }
    }
    if node.description.is_none() {
        if let Some(title) = v.attr("title") {
            let title = title.trim();
            if !title.is_empty() && node.name != title {
                node.description = Some(clip(title));
            }
        }
    }
}
