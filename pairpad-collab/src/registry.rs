//! The client registry: a single-owner actor serializing all roster
//! mutations.
//!
//! Connection handlers, the relay pumps, and the disconnect paths all run
//! concurrently, but every add/remove/rename and every roster read drains
//! through one task's inbox, so membership changes are linearizable and
//! reads observe a consistent snapshot.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::protocol::Message;

/// One connected client as the coordinator sees it.
///
/// `outbound` feeds the connection's dedicated writer task; a failed send
/// there is the signal to evict the client.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub id: Uuid,
    pub site_id: String,
    pub username: String,
    pub outbound: mpsc::UnboundedSender<Message>,
}

enum Command {
    Add {
        id: Uuid,
        outbound: mpsc::UnboundedSender<Message>,
        reply: oneshot::Sender<String>,
    },
    Remove {
        id: Uuid,
        reply: oneshot::Sender<Option<RosterEntry>>,
    },
    Get {
        id: Uuid,
        reply: oneshot::Sender<Option<RosterEntry>>,
    },
    List {
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
    Rename {
        id: Uuid,
        username: String,
    },
}

/// Cheap clonable handle to the registry actor.
#[derive(Debug, Clone)]
pub struct Registry {
    tx: mpsc::UnboundedSender<Command>,
}

impl Registry {
    /// Spawn the owning task and return a handle to it.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_actor(rx));
        Registry { tx }
    }

    /// Register a connection and receive its assigned site id.
    pub async fn add(&self, id: Uuid, outbound: mpsc::UnboundedSender<Message>) -> String {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Add { id, outbound, reply });
        rx.await.unwrap_or_default()
    }

    /// Evict a client. Returns the entry if it was still present, so only
    /// the first of several racing removers follows up with a user-list
    /// broadcast.
    pub async fn remove(&self, id: Uuid) -> Option<RosterEntry> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Remove { id, reply });
        rx.await.ok().flatten()
    }

    pub async fn get(&self, id: Uuid) -> Option<RosterEntry> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Get { id, reply });
        rx.await.ok().flatten()
    }

    /// Roster snapshot at the moment the request drains.
    pub async fn list(&self) -> Vec<RosterEntry> {
        let (reply, rx) = oneshot::channel();
        let _ = self.tx.send(Command::List { reply });
        rx.await.unwrap_or_default()
    }

    /// Record the username announced by a Join message.
    pub fn rename(&self, id: Uuid, username: impl Into<String>) {
        let _ = self.tx.send(Command::Rename {
            id,
            username: username.into(),
        });
    }

    /// All current usernames, in roster order.
    pub async fn usernames(&self) -> Vec<String> {
        self.list().await.into_iter().map(|e| e.username).collect()
    }
}

async fn run_actor(mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut roster: HashMap<Uuid, RosterEntry> = HashMap::new();
    let mut next_site_id: u64 = 0;

    while let Some(command) = rx.recv().await {
        match command {
            Command::Add { id, outbound, reply } => {
                next_site_id += 1;
                let site_id = next_site_id.to_string();
                roster.insert(
                    id,
                    RosterEntry {
                        id,
                        site_id: site_id.clone(),
                        username: String::new(),
                        outbound,
                    },
                );
                let _ = reply.send(site_id);
            }
            Command::Remove { id, reply } => {
                let _ = reply.send(roster.remove(&id));
            }
            Command::Get { id, reply } => {
                let _ = reply.send(roster.get(&id).cloned());
            }
            Command::List { reply } => {
                let _ = reply.send(roster.values().cloned().collect());
            }
            Command::Rename { id, username } => {
                if let Some(entry) = roster.get_mut(&id) {
                    entry.username = username;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> mpsc::UnboundedSender<Message> {
        mpsc::unbounded_channel().0
    }

    #[tokio::test]
    async fn site_ids_are_serial() {
        let registry = Registry::spawn();
        let a = registry.add(Uuid::new_v4(), sender()).await;
        let b = registry.add(Uuid::new_v4(), sender()).await;
        let c = registry.add(Uuid::new_v4(), sender()).await;
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("1", "2", "3"));
    }

    #[tokio::test]
    async fn remove_reports_presence_exactly_once() {
        let registry = Registry::spawn();
        let id = Uuid::new_v4();
        registry.add(id, sender()).await;

        assert!(registry.remove(id).await.is_some());
        assert!(registry.remove(id).await.is_none());
        assert!(registry.get(id).await.is_none());
    }

    #[tokio::test]
    async fn rename_updates_usernames() {
        let registry = Registry::spawn();
        let id = Uuid::new_v4();
        registry.add(id, sender()).await;

        registry.rename(id, "alice");
        // Reads drain after the rename in the same inbox.
        assert_eq!(registry.usernames().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn site_ids_never_reused_after_removal() {
        let registry = Registry::spawn();
        let id = Uuid::new_v4();
        registry.add(id, sender()).await;
        registry.remove(id).await;

        let next = registry.add(Uuid::new_v4(), sender()).await;
        assert_eq!(next, "2");
    }
}
