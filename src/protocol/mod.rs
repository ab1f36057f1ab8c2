//! Wire types shared by every hop of the pipeline
//!
//! A tool call becomes a [`Command`]; the browser answers with a
//! [`CommandResponse`]; both travel across the broker socket wrapped in an
//! [`IpcEnvelope`]. The `tree` module defines the accessibility-tree
//! payload produced by the snapshot command.

pub mod command;
pub mod envelope;
pub mod tree;

pub use command::{
    Action, ClickParams, Command, CommandPayload, CommandResponse, EvaluateParams, FieldType,
    FillFormParams, FormField, GetBookmarksParams, GetCookiesParams, GetHistoryParams,
    HoverParams, KeyModifier, MouseButton, NavigateParams, NetworkAction, NetworkRequestsParams,
    PageContentParams, PressKeyParams, ResizeParams, SavePdfParams, ScreenshotFormat,
    ScreenshotParams, SelectOptionParams, TabsAction, TabsParams, TypeParams, WaitForParams,
};
pub use envelope::IpcEnvelope;
pub use tree::{AxNode, AxRole};
