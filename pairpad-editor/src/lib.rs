//! # pairpad-editor — Terminal editing surface for pairpad
//!
//! The editor owns the rendered projection of the document, the local
//! cursor, the viewport, and the per-session decorations: remote peer
//! carets, the user list, the status line, and the connection indicator.
//!
//! It knows nothing about the CRDT or the wire; the client session feeds
//! it fresh projections and peer positions and asks it to draw.

pub mod color;
pub mod editor;
mod render;

pub use color::{color_for_username, USER_COLORS};
pub use editor::{Editor, EditorConfig, PeerCursor};
