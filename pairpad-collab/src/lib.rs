//! # pairpad-collab — Session plumbing for pairpad
//!
//! Hub-and-spoke collaboration: every client dials one coordinator, which
//! assigns site ids, relays operations, and brokers the bootstrap snapshot
//! when a newcomer joins an in-progress session.
//!
//! ```text
//! ┌────────────┐      WebSocket      ┌──────────────┐
//! │ Connection │ ◄─────────────────► │ CollabServer │
//! │ (per user) │     JSON frames     │  (central)   │
//! └────────────┘                     └──────┬───────┘
//!                                           │
//!                                    ┌──────┴───────┐
//!                                    │ Registry     │
//!                                    │ (actor)      │
//!                                    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — the JSON wire frames
//! - [`registry`] — the roster actor (linearizable membership)
//! - [`server`] — the coordinator
//! - [`client`] — the per-session connection

pub mod client;
pub mod protocol;
pub mod registry;
pub mod server;

pub use client::{ConnectConfig, Connection, Event};
pub use protocol::{EditOperation, Message, MessageType, OperationKind, ProtocolError};
pub use registry::{Registry, RosterEntry};
pub use server::{CollabServer, ServerConfig};
