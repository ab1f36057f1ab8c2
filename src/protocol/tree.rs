//! Accessibility-tree payload types
//!
//! The snapshot command answers with a recursive [`AxNode`] tree: a semantic
//! role, an accessible name, optional state, an opaque element reference for
//! interactive nodes, and ordered children. [`AxNode::render`] produces the
//! indented text form shown to the agent, which is what makes references
//! like `e3` discoverable.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic role of a tree node.
///
/// The closed set mirrors ARIA landmark/widget roles plus the synthetic
/// `text` role for inline text runs; author-declared roles outside the set
/// pass through as [`AxRole::Custom`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxRole {
    Document,
    Heading,
    Link,
    Button,
    Textbox,
    Searchbox,
    Spinbutton,
    Combobox,
    Listbox,
    Checkbox,
    Radio,
    Slider,
    Option,
    List,
    Listitem,
    Navigation,
    Main,
    Banner,
    Contentinfo,
    Complementary,
    Region,
    Article,
    Form,
    Table,
    Row,
    Cell,
    Columnheader,
    Dialog,
    Img,
    Text,
    Generic,
    /// Author-declared role outside the closed set, passed through verbatim.
    Custom(String),
}

impl AxRole {
    /// The wire / display name of the role.
    pub fn as_str(&self) -> &str {
        match self {
            AxRole::Document => "document",
            AxRole::Heading => "heading",
            AxRole::Link => "link",
            AxRole::Button => "button",
            AxRole::Textbox => "textbox",
            AxRole::Searchbox => "searchbox",
            AxRole::Spinbutton => "spinbutton",
            AxRole::Combobox => "combobox",
            AxRole::Listbox => "listbox",
            AxRole::Checkbox => "checkbox",
            AxRole::Radio => "radio",
            AxRole::Slider => "slider",
            AxRole::Option => "option",
            AxRole::List => "list",
            AxRole::Listitem => "listitem",
            AxRole::Navigation => "navigation",
            AxRole::Main => "main",
            AxRole::Banner => "banner",
            AxRole::Contentinfo => "contentinfo",
            AxRole::Complementary => "complementary",
            AxRole::Region => "region",
            AxRole::Article => "article",
            AxRole::Form => "form",
            AxRole::Table => "table",
            AxRole::Row => "row",
            AxRole::Cell => "cell",
            AxRole::Columnheader => "columnheader",
            AxRole::Dialog => "dialog",
            AxRole::Img => "img",
            AxRole::Text => "text",
            AxRole::Generic => "generic",
            AxRole::Custom(name) => name,
        }
    }

    /// Parse a role name, passing unknown names through as `Custom`.
    pub fn parse(name: &str) -> AxRole {
        match name {
            "document" => AxRole::Document,
            "heading" => AxRole::Heading,
            "link" => AxRole::Link,
            "button" => AxRole::Button,
            "textbox" => AxRole::Textbox,
            "searchbox" => AxRole::Searchbox,
            "spinbutton" => AxRole::Spinbutton,
            "combobox" => AxRole::Combobox,
            "listbox" => AxRole::Listbox,
            "checkbox" => AxRole::Checkbox,
            "radio" => AxRole::Radio,
            "slider" => AxRole::Slider,
            "option" => AxRole::Option,
            "list" => AxRole::List,
            "listitem" => AxRole::Listitem,
            "navigation" => AxRole::Navigation,
            "main" => AxRole::Main,
            "banner" => AxRole::Banner,
            "contentinfo" => AxRole::Contentinfo,
            "complementary" => AxRole::Complementary,
            "region" => AxRole::Region,
            "article" => AxRole::Article,
            "form" => AxRole::Form,
            "table" => AxRole::Table,
            "row" => AxRole::Row,
            "cell" => AxRole::Cell,
            "columnheader" => AxRole::Columnheader,
            "dialog" => AxRole::Dialog,
            "img" => AxRole::Img,
            "text" => AxRole::Text,
            "generic" => AxRole::Generic,
            other => AxRole::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for AxRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AxRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AxRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RoleVisitor;
        impl de::Visitor<'_> for RoleVisitor {
            type Value = AxRole;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a role name string")
            }
            fn visit_str<E: de::Error>(self, v: &str) -> Result<AxRole, E> {
                Ok(AxRole::parse(v))
            }
        }
        deserializer.deserialize_str(RoleVisitor)
    }
}

/// One node of the accessibility tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    /// Semantic role.
    pub role: AxRole,
    /// Accessible name; empty when the element has none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Heading level 1-6.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    /// Current form value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Checked state for checkbox/radio nodes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    /// Disabled state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    /// Expanded/collapsed state from `aria-expanded`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
    /// Selected state for options.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    /// Required state for form controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Supplementary description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Opaque element reference usable in follow-up commands.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<String>,
    /// Ordered children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AxNode>,
}

impl AxNode {
    /// A bare node with the given role and no state.
    pub fn new(role: AxRole) -> Self {
        Self {
            role,
            name: String::new(),
            level: None,
            value: None,
            checked: None,
            disabled: None,
            expanded: None,
            selected: None,
            required: None,
            description: None,
            node_ref: None,
            children: Vec::new(),
        }
    }

    /// A text run pseudo-node.
    pub fn text(content: impl Into<String>) -> Self {
        let mut node = AxNode::new(AxRole::Text);
        node.name = content.into();
        node
    }

    /// Render the tree as the indented text shown to the agent.
    ///
    /// # Examples
    ///
    /// ```
    /// use agentfox::protocol::{AxNode, AxRole};
    ///
    /// let mut root = AxNode::new(AxRole::Document);
    /// root.name = "Example Domain".into();
    /// let mut button = AxNode::new(AxRole::Button);
    /// button.name = "Submit".into();
    /// button.node_ref = Some("e0".into());
    /// root.children.push(button);
    ///
    /// let text = root.render();
    /// assert!(text.contains("- document \"Example Domain\""));
    /// assert!(text.contains("  - button \"Submit\" [ref=e0]"));
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str("- ");
        out.push_str(self.role.as_str());
        if !self.name.is_empty() {
            out.push_str(" \"");
            out.push_str(&self.name);
            out.push('"');
        }
        if let Some(level) = self.level {
            out.push_str(&format!(" [level={}]", level));
        }
        if let Some(value) = &self.value {
            out.push_str(&format!(" [value={:?}]", value));
        }
        if let Some(checked) = self.checked {
            out.push_str(if checked { " [checked]" } else { " [unchecked]" });
        }
        if self.disabled == Some(true) {
            out.push_str(" [disabled]");
        }
        if let Some(expanded) = self.expanded {
            out.push_str(if expanded {
                " [expanded]"
            } else {
                " [collapsed]"
            });
        }
        if self.selected == Some(true) {
            out.push_str(" [selected]");
        }
        if self.required == Some(true) {
            out.push_str(" [required]");
        }
        if let Some(node_ref) = &self.node_ref {
            out.push_str(&format!(" [ref={}]", node_ref));
        }
        if let Some(description) = &self.description {
            out.push_str(&format!(" ({})", description));
        }
        out.push('\n');
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
    }
}
