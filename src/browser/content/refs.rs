//! The element reference map
//!
//! Snapshots label interactive elements `e0`, `e1`, ... in depth-first
//! order; follow-up commands target elements through those labels. The map
//! is session-scoped within a content context and is reset at the start of
//! every tree build, so references are only valid between the snapshot that
//! created them and the next snapshot or navigation.
//!
//! Resolution validates that the backing element is still part of the
//! current document; a failed check removes the entry and surfaces the
//! distinct stale-reference error so the caller knows to take a fresh
//! snapshot.

use std::collections::HashMap;

use ego_tree::NodeId;

use crate::browser::content::page::Page;
use crate::error::AgentfoxError;

/// Mapping from reference label to live element, behind a small
/// reset/assign/resolve interface.
#[derive(Debug, Default)]
pub struct RefMap {
    entries: HashMap<String, NodeId>,
    next: u32,
    generation: u64,
}

impl RefMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every entry and restart numbering for a new snapshot of the
    /// given document generation.
    pub fn reset(&mut self, generation: u64) {
        self.entries.clear();
        self.next = 0;
        self.generation = generation;
    }

    /// Assign the next depth-first label to an element.
    pub fn assign(&mut self, id: NodeId) -> String {
        let label = format!("e{}", self.next);
        self.next += 1;
        self.entries.insert(label.clone(), id);
        label
    }

    /// Resolve a label against the current document.
    ///
    /// # Errors
    ///
    /// [`AgentfoxError::UnknownRef`] when no snapshot ever produced the
    /// label; [`AgentfoxError::StaleRef`] when the label exists but its
    /// element is no longer part of the current document (the entry is
    /// removed on the way out).
    pub fn resolve(&mut self, page: &Page, label: &str) -> Result<NodeId, AgentfoxError> {
        let Some(&id) = self.entries.get(label) else {
            return Err(AgentfoxError::UnknownRef(label.to_string()));
        };
        if self.generation != page.generation() || page.element(id).is_none() {
            self.entries.remove(label);
            return Err(AgentfoxError::StaleRef(label.to_string()));
        }
        Ok(id)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Page {
        Page::new(
            r#"<html><head><title>T</title></head>
               <body><button id="go">Go</button></body></html>"#,
            "https://example.com/",
            None,
        )
    }

    #[test]
    fn test_labels_are_zero_based_and_sequential() {
        let page = sample_page();
        let id = page.element_by_id("go").unwrap().id();
        let mut refs = RefMap::new();
        refs.reset(page.generation());
        assert_eq!(refs.assign(id), "e0");
        assert_eq!(refs.assign(id), "e1");
        assert_eq!(refs.assign(id), "e2");
    }

    #[test]
    fn test_reset_clears_entries_and_numbering() {
        let page = sample_page();
        let id = page.element_by_id("go").unwrap().id();
        let mut refs = RefMap::new();
        refs.reset(page.generation());
        refs.assign(id);
        refs.reset(page.generation());
        assert!(refs.is_empty());
        assert_eq!(refs.assign(id), "e0");
    }

    #[test]
    fn test_resolve_live_reference() {
        let page = sample_page();
        let id = page.element_by_id("go").unwrap().id();
        let mut refs = RefMap::new();
        refs.reset(page.generation());
        let label = refs.assign(id);
        assert_eq!(refs.resolve(&page, &label).unwrap(), id);
    }

    #[test]
    fn test_unknown_reference_error() {
        let page = sample_page();
        let mut refs = RefMap::new();
        refs.reset(page.generation());
        let err = refs.resolve(&page, "e7").unwrap_err();
        assert!(matches!(err, AgentfoxError::UnknownRef(_)));
    }

    #[test]
    fn test_navigation_makes_references_stale_and_removes_them() {
        let mut page = sample_page();
        let id = page.element_by_id("go").unwrap().id();
        let mut refs = RefMap::new();
        refs.reset(page.generation());
        let label = refs.assign(id);

        page.load("<html><body></body></html>", "https://example.com/next", None);
        let err = refs.resolve(&page, &label).unwrap_err();
        assert!(matches!(err, AgentfoxError::StaleRef(_)));
        // The stale entry is gone: a second attempt reports unknown.
        let err = refs.resolve(&page, &label).unwrap_err();
        assert!(matches!(err, AgentfoxError::UnknownRef(_)));
    }
}
