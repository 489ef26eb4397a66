//! # pairpad-crdt — Conflict-free replicated text for pairpad
//!
//! A tombstone-based sequence CRDT in the WOOT family. Every replica holds
//! the full character sequence, deletions only flip a visibility bit, and
//! concurrent insertions are placed deterministically by recursive narrowing
//! of the candidate interval with a lexicographic id tiebreak.
//!
//! ## Modules
//!
//! - [`document`] — the character sequence and the integration algorithms
//! - [`replica`] — one participant's document plus its site id and clock
//!
//! Pure data apart from the plain-text load/save helpers; all networking
//! lives in `pairpad-collab`.

pub mod document;
pub mod replica;

pub use document::{Character, CrdtError, Document, END_ID, START_ID};
pub use replica::{save, Replica};
