//! The browser side of the pipeline
//!
//! Split into the two execution contexts of a real extension: a privileged
//! background part ([`background::Dispatcher`]) that owns the native port
//! and routes commands, and a page-context content part ([`content`]) that
//! builds accessibility trees, maintains the reference map, and executes
//! DOM actions. [`api::BrowserApi`] is the interface the dispatcher
//! consumes from the hosting browser.

pub mod api;
pub mod background;
pub mod content;
pub mod port;

pub use api::{Bookmark, BrowserApi, Cookie, HistoryItem, NetworkRequest, PdfResult, TabInfo, TabStatus};
pub use background::Dispatcher;
pub use content::{ContentHandle, PageCommand};
pub use port::ExtensionPort;
