//! DOM action handlers for the content context
//!
//! Every handler resolves its target through the reference map (stale or
//! unknown references surface the distinct recoverable errors), performs
//! the interaction against the [`Page`], and records the synthetic event
//! sequence a real page would observe: pointer/mouse chains for clicks and
//! hovers, key sequences for typing, input/change notifications for value
//! edits.

use ego_tree::NodeId;
use scraper::{ElementRef, Selector};
use serde_json::{json, Value};

use crate::browser::content::page::{visible_text, Page, SyntheticEvent};
use crate::browser::content::refs::RefMap;
use crate::browser::content::snapshot::selected_option_texts;
use crate::error::AgentfoxError;
use crate::protocol::{
    ClickParams, FieldType, FillFormParams, FormField, HoverParams, KeyModifier, MouseButton,
    PageContentParams, PressKeyParams, SelectOptionParams, TypeParams,
};

/// Delay between characters in slow typing mode.
pub const SLOW_TYPE_DELAY_MS: u64 = 30;

type ActionResult = Result<Value, AgentfoxError>;

/// Dispatch the click event sequence to an element.
pub fn click(page: &mut Page, refs: &mut RefMap, params: &ClickParams) -> ActionResult {
    let id = refs.resolve(page, &params.element_ref)?;
    let tag = tag_of(page, id)?;
    let button = params.button.unwrap_or_default();
    let modifiers = modifier_names(params.modifiers.as_deref());
    let (cx, cy) = page.rect_of(id).center();

    dispatch_click_sequence(page, &tag, button, &modifiers, 1, cx, cy);
    if params.double_click.unwrap_or(false) {
        dispatch_click_sequence(page, &tag, button, &modifiers, 2, cx, cy);
        page.push_event(pointer_event("dblclick", &tag, button, &modifiers, 2, cx, cy));
    }

    apply_click_side_effects(page, id);

    if is_focusable(page, id) {
        page.focus(id);
    }
    Ok(json!({}))
}

/// Type text into an input, textarea, or contenteditable element.
pub fn type_text(page: &mut Page, refs: &mut RefMap, params: &TypeParams) -> ActionResult {
    let id = refs.resolve(page, &params.element_ref)?;
    let tag = tag_of(page, id)?;
    let kind = editable_kind(page, id).ok_or_else(|| AgentfoxError::TargetMismatch {
        expected: "editable element".to_string(),
        actual: describe_control(page, id),
    })?;

    page.focus(id);

    match kind {
        Editable::Native => {
            if params.slowly.unwrap_or(false) {
                // Per-character key sequences with a small delay, as a human
                // typist would produce.
                let mut value = String::new();
                for c in params.text.chars() {
                    value.push(c);
                    let mut keydown = SyntheticEvent::simple("keydown", &tag);
                    keydown.key = Some(c.to_string());
                    keydown.code = Some(key_to_code(&c.to_string()));
                    page.push_event(keydown);
                    page.set_value(id, value.clone());
                    page.push_event(SyntheticEvent::simple("input", &tag));
                    let mut keyup = SyntheticEvent::simple("keyup", &tag);
                    keyup.key = Some(c.to_string());
                    keyup.code = Some(key_to_code(&c.to_string()));
                    page.push_event(keyup);
                    std::thread::sleep(std::time::Duration::from_millis(SLOW_TYPE_DELAY_MS));
                }
            } else {
                // Fast path: select-all, assign, one input + change pair.
                page.set_value(id, params.text.clone());
                page.push_event(SyntheticEvent::simple("input", &tag));
                page.push_event(SyntheticEvent::simple("change", &tag));
            }
        }
        Editable::ContentEditable => {
            // Select all content and insert the replacement text.
            page.set_value(id, params.text.clone());
            page.push_event(SyntheticEvent::simple("input", &tag));
        }
    }

    if params.submit.unwrap_or(false) {
        let mut keydown = SyntheticEvent::simple("keydown", &tag);
        keydown.key = Some("Enter".to_string());
        keydown.code = Some("Enter".to_string());
        page.push_event(keydown);
        let mut keyup = SyntheticEvent::simple("keyup", &tag);
        keyup.key = Some("Enter".to_string());
        keyup.code = Some("Enter".to_string());
        page.push_event(keyup);
        if let Some(form_tag) = enclosing_form(page, id) {
            page.push_event(SyntheticEvent::simple("submit", &form_tag));
        }
    }
    Ok(json!({}))
}

/// Press a key on the focused element, or the body when nothing is focused.
pub fn press_key(page: &mut Page, params: &PressKeyParams) -> ActionResult {
    let target = page
        .focused()
        .and_then(|id| tag_of(page, id).ok())
        .unwrap_or_else(|| "body".to_string());
    let code = key_to_code(&params.key);

    let mut keydown = SyntheticEvent::simple("keydown", &target);
    keydown.key = Some(params.key.clone());
    keydown.code = Some(code.clone());
    page.push_event(keydown);
    let mut keyup = SyntheticEvent::simple("keyup", &target);
    keyup.key = Some(params.key.clone());
    keyup.code = Some(code);
    page.push_event(keyup);
    Ok(json!({}))
}

/// Dispatch the hover event sequence at the element's center.
pub fn hover(page: &mut Page, refs: &mut RefMap, params: &HoverParams) -> ActionResult {
    let id = refs.resolve(page, &params.element_ref)?;
    let tag = tag_of(page, id)?;
    let (cx, cy) = page.rect_of(id).center();

    for (kind, bubbles) in [
        ("pointerenter", false),
        ("pointerover", true),
        ("pointermove", true),
        ("mouseenter", false),
        ("mouseover", true),
        ("mousemove", true),
    ] {
        let mut event = SyntheticEvent::simple(kind, &tag);
        event.bubbles = bubbles;
        event.client_x = Some(cx);
        event.client_y = Some(cy);
        page.push_event(event);
    }
    Ok(json!({}))
}

/// Fill a batch of form fields; per-field errors are collected and the
/// batch never aborts.
pub fn fill_form(page: &mut Page, refs: &mut RefMap, params: &FillFormParams) -> ActionResult {
    let mut filled = 0u64;
    let mut errors: Vec<String> = Vec::new();
    for field in &params.fields {
        match apply_field(page, refs, field) {
            Ok(()) => filled += 1,
            Err(e) => errors.push(format!("{}: {}", field.name, e)),
        }
    }
    let mut result = json!({"filledCount": filled});
    if !errors.is_empty() {
        result["errors"] = json!(errors);
    }
    Ok(result)
}

/// Select options in a `<select>`, matching by text first and value second.
pub fn select_option(
    page: &mut Page,
    refs: &mut RefMap,
    params: &SelectOptionParams,
) -> ActionResult {
    let id = refs.resolve(page, &params.element_ref)?;
    let tag = tag_of(page, id)?;
    if tag != "select" {
        return Err(AgentfoxError::TargetMismatch {
            expected: "select".to_string(),
            actual: tag,
        });
    }

    let options: Vec<(NodeId, String, Option<String>)> = {
        let select = page.element(id).ok_or_else(|| stale(&params.element_ref))?;
        collect_options(select)
    };
    let multiple = {
        let select = page.element(id).ok_or_else(|| stale(&params.element_ref))?;
        select.value().attr("multiple").is_some()
    };

    if multiple {
        for (option_id, _, _) in &options {
            page.set_selected(*option_id, false);
        }
    }

    for value in &params.values {
        let matched = options
            .iter()
            .find(|(_, text, _)| text.trim() == value.trim())
            .or_else(|| {
                options
                    .iter()
                    .find(|(_, _, attr)| attr.as_deref() == Some(value.as_str()))
            });
        let Some((option_id, _, _)) = matched else {
            return Err(AgentfoxError::MissingOption(value.clone()));
        };
        if !multiple {
            for (other, _, _) in &options {
                page.set_selected(*other, false);
            }
        }
        page.set_selected(*option_id, true);
    }

    page.push_event(SyntheticEvent::simple("change", "select"));

    let selected = {
        let select = page.element(id).ok_or_else(|| stale(&params.element_ref))?;
        selected_option_texts(page, select)
    };
    Ok(json!({"selected": selected}))
}

/// Extract trimmed, whitespace-normalized text from the page or a selector
/// target.
pub fn page_content(page: &Page, params: &PageContentParams) -> ActionResult {
    let text = match &params.selector {
        Some(selector) => {
            let parsed = Selector::parse(selector)
                .map_err(|e| AgentfoxError::InvalidSelector(format!("{}: {}", selector, e)))?;
            let target = page
                .document()
                .select(&parsed)
                .next()
                .ok_or_else(|| AgentfoxError::SelectorNoMatch(selector.clone()))?;
            visible_text(target)
        }
        None => page.body_text(),
    };
    Ok(json!({
        "text": text,
        "url": page.url(),
        "title": page.title(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The two kinds of editable target.
enum Editable {
    Native,
    ContentEditable,
}

fn stale(label: &str) -> AgentfoxError {
    AgentfoxError::StaleRef(label.to_string())
}

fn tag_of(page: &Page, id: NodeId) -> Result<String, AgentfoxError> {
    page.element(id)
        .map(|el| el.value().name().to_string())
        .ok_or_else(|| AgentfoxError::StaleRef("element".to_string()))
}

fn modifier_names(modifiers: Option<&[KeyModifier]>) -> Vec<String> {
    modifiers
        .unwrap_or(&[])
        .iter()
        .map(|m| {
            match m {
                KeyModifier::Shift => "shift",
                KeyModifier::Control => "control",
                KeyModifier::Alt => "alt",
                KeyModifier::Meta => "meta",
            }
            .to_string()
        })
        .collect()
}

fn pointer_event(
    kind: &str,
    tag: &str,
    button: MouseButton,
    modifiers: &[String],
    detail: u32,
    cx: f64,
    cy: f64,
) -> SyntheticEvent {
    let mut event = SyntheticEvent::simple(kind, tag);
    event.detail = Some(detail);
    event.button = Some(button.code());
    if !modifiers.is_empty() {
        event.modifiers = Some(modifiers.to_vec());
    }
    event.client_x = Some(cx);
    event.client_y = Some(cy);
    event
}

/// pointerdown -> mousedown -> pointerup -> mouseup -> click, all bubbling.
fn dispatch_click_sequence(
    page: &mut Page,
    tag: &str,
    button: MouseButton,
    modifiers: &[String],
    detail: u32,
    cx: f64,
    cy: f64,
) {
    for kind in ["pointerdown", "mousedown", "pointerup", "mouseup", "click"] {
        page.push_event(pointer_event(kind, tag, button, modifiers, detail, cx, cy));
    }
}

/// Checkbox toggles and radio-group updates a click causes.
fn apply_click_side_effects(page: &mut Page, id: NodeId) {
    let Some(el) = page.element(id) else {
        return;
    };
    if el.value().name() != "input" {
        return;
    }
    match el.value().attr("type") {
        Some("checkbox") => {
            let next = !page.is_checked(id);
            page.set_checked(id, next);
            page.push_event(SyntheticEvent::simple("change", "input"));
        }
        Some("radio") => {
            let group = el.value().attr("name").map(str::to_string);
            if let Some(group) = group {
                let peers: Vec<NodeId> = page
                    .document()
                    .root_element()
                    .descendants()
                    .filter_map(ElementRef::wrap)
                    .filter(|cand| {
                        cand.value().name() == "input"
                            && cand.value().attr("type") == Some("radio")
                            && cand.value().attr("name") == Some(group.as_str())
                    })
                    .map(|cand| cand.id())
                    .collect();
                for peer in peers {
                    page.set_checked(peer, peer == id);
                }
            } else {
                page.set_checked(id, true);
            }
            page.push_event(SyntheticEvent::simple("change", "input"));
        }
        _ => {}
    }
}

fn is_focusable(page: &Page, id: NodeId) -> bool {
    let Some(el) = page.element(id) else {
        return false;
    };
    let v = el.value();
    matches!(v.name(), "a" | "button" | "input" | "textarea" | "select")
        || v.attr("contenteditable") == Some("true")
        || v.attr("tabindex")
            .and_then(|t| t.parse::<i32>().ok())
            .map(|t| t >= 0)
            .unwrap_or(false)
}

/// Which editing model applies to the element, if any.
fn editable_kind(page: &Page, id: NodeId) -> Option<Editable> {
    let el = page.element(id)?;
    let v = el.value();
    match v.name() {
        "textarea" => Some(Editable::Native),
        "input" => match v.attr("type").unwrap_or("text") {
            "text" | "email" | "tel" | "url" | "password" | "search" | "number" => {
                Some(Editable::Native)
            }
            _ => None,
        },
        _ if v.attr("contenteditable") == Some("true") => Some(Editable::ContentEditable),
        _ => None,
    }
}

/// Lowercase control kind used in type-mismatch messages.
fn describe_control(page: &Page, id: NodeId) -> String {
    let Some(el) = page.element(id) else {
        return "missing element".to_string();
    };
    let v = el.value();
    match v.name() {
        "input" => match v.attr("type").unwrap_or("text") {
            "checkbox" => "checkbox".to_string(),
            "radio" => "radio".to_string(),
            "range" => "slider".to_string(),
            "submit" | "reset" | "button" | "image" | "file" => "button".to_string(),
            _ => "textbox".to_string(),
        },
        "textarea" => "textbox".to_string(),
        "select" => "combobox".to_string(),
        other => other.to_string(),
    }
}

/// The nearest enclosing `<form>`'s tag name, if any.
fn enclosing_form(page: &Page, id: NodeId) -> Option<String> {
    let el = page.element(id)?;
    let mut current = el.parent();
    while let Some(node) = current {
        if let Some(parent_el) = ElementRef::wrap(node) {
            if parent_el.value().name() == "form" {
                return Some("form".to_string());
            }
        }
        current = node.parent();
    }
    None
}

fn collect_options(select: ElementRef<'_>) -> Vec<(NodeId, String, Option<String>)> {
    select
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "option")
        .map(|el| {
            (
                el.id(),
                visible_text(el),
                el.value().attr("value").map(str::to_string),
            )
        })
        .collect()
}

/// Apply one fill-form field after validating its declared type.
fn apply_field(page: &mut Page, refs: &mut RefMap, field: &FormField) -> Result<(), AgentfoxError> {
    let id = refs.resolve(page, &field.element_ref)?;
    let actual = describe_control(page, id);
    let tag = tag_of(page, id)?;

    let mismatch = |expected: FieldType, actual: &str| AgentfoxError::TargetMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    };

    match field.field_type {
        FieldType::Textbox => {
            if actual != "textbox" {
                return Err(mismatch(FieldType::Textbox, &actual));
            }
            let value = string_value(&field.value)?;
            page.set_value(id, value);
            page.push_event(SyntheticEvent::simple("input", &tag));
            page.push_event(SyntheticEvent::simple("change", &tag));
        }
        FieldType::Checkbox => {
            if actual != "checkbox" {
                return Err(mismatch(FieldType::Checkbox, &actual));
            }
            let desired = bool_value(&field.value)?;
            // Only click when the desired state differs.
            if page.is_checked(id) != desired {
                let (cx, cy) = page.rect_of(id).center();
                dispatch_click_sequence(page, &tag, MouseButton::Left, &[], 1, cx, cy);
                page.set_checked(id, desired);
                page.push_event(SyntheticEvent::simple("change", &tag));
            }
        }
        FieldType::Radio => {
            if actual != "radio" {
                return Err(mismatch(FieldType::Radio, &actual));
            }
            if !page.is_checked(id) {
                let (cx, cy) = page.rect_of(id).center();
                dispatch_click_sequence(page, &tag, MouseButton::Left, &[], 1, cx, cy);
                apply_click_side_effects(page, id);
            }
        }
        FieldType::Combobox => {
            if tag != "select" {
                return Err(mismatch(FieldType::Combobox, &actual));
            }
            let value = string_value(&field.value)?;
            let params = SelectOptionParams {
                element_ref: field.element_ref.clone(),
                values: vec![value],
            };
            select_option(page, refs, &params)?;
        }
        FieldType::Slider => {
            if actual != "slider" {
                return Err(mismatch(FieldType::Slider, &actual));
            }
            let value = string_value(&field.value)?;
            page.set_value(id, value);
            page.push_event(SyntheticEvent::simple("input", &tag));
            page.push_event(SyntheticEvent::simple("change", &tag));
        }
    }
    Ok(())
}

fn string_value(value: &Value) -> Result<String, AgentfoxError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(AgentfoxError::MalformedCommand(format!(
            "expected a string value, got {}",
            other
        ))),
    }
}

fn bool_value(value: &Value) -> Result<bool, AgentfoxError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(AgentfoxError::MalformedCommand(format!(
            "expected a boolean value, got {}",
            other
        ))),
    }
}

/// Key-to-code mapping: letters, digits, a small punctuation table, and
/// pass-through for named keys.
pub fn key_to_code(key: &str) -> String {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return format!("Key{}", c.to_ascii_uppercase());
        }
        if c.is_ascii_digit() {
            return format!("Digit{}", c);
        }
        return match c {
            ' ' => "Space".to_string(),
            '.' => "Period".to_string(),
            ',' => "Comma".to_string(),
            ';' => "Semicolon".to_string(),
            '\'' => "Quote".to_string(),
            '`' => "Backquote".to_string(),
            '[' => "BracketLeft".to_string(),
            ']' => "BracketRight".to_string(),
            '\\' => "Backslash".to_string(),
            '/' => "Slash".to_string(),
            '-' => "Minus".to_string(),
            '=' => "Equal".to_string(),
            _ => key.to_string(),
        };
    }
    key.to_string()
}
