//! One participant's view of the document: the sequence plus the site id
//! assigned by the coordinator and the local logical clock.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::document::{Character, CrdtError, Document, END_ID, START_ID};

/// A document plus the identity that makes locally generated characters
/// globally unique.
///
/// The clock is atomic so concurrent local generates hand out distinct,
/// monotonic values; the document itself has a single writer (the session
/// that owns the replica).
#[derive(Debug)]
pub struct Replica {
    pub document: Document,
    site_id: u64,
    clock: AtomicU64,
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

impl Replica {
    /// An empty replica. The site id stays 0 until the coordinator assigns
    /// one.
    pub fn new() -> Self {
        Replica {
            document: Document::new(),
            site_id: 0,
            clock: AtomicU64::new(0),
        }
    }

    pub fn site_id(&self) -> u64 {
        self.site_id
    }

    /// Install the site id received from the coordinator.
    pub fn set_site_id(&mut self, site_id: u64) {
        self.site_id = site_id;
    }

    /// Replace the document wholesale (bootstrap snapshot). The clock keeps
    /// counting: `(site_id, clock)` pairs stay unique regardless of history.
    pub fn replace_document(&mut self, document: Document) {
        self.document = document;
    }

    pub fn content(&self) -> String {
        self.document.content()
    }

    fn next_id(&self) -> String {
        let clock = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}{}", self.site_id, clock)
    }

    /// Generate and integrate a character at a 1-based visible position
    /// (`1` = before the first visible character, `visible_len + 1` = after
    /// the last). Returns the new plain-text projection.
    pub fn insert(&mut self, position: usize, value: impl Into<String>) -> Result<String, CrdtError> {
        if position == 0 || position > self.document.visible_len() + 1 {
            return Err(CrdtError::PositionOutOfBounds);
        }

        let id_prev = self
            .document
            .ith_visible(position - 1)
            .map(|c| c.id.clone())
            .unwrap_or_else(|| START_ID.to_string());
        let id_next = self
            .document
            .ith_visible(position)
            .map(|c| c.id.clone())
            .unwrap_or_else(|| END_ID.to_string());

        let character = Character {
            id: self.next_id(),
            visible: true,
            value: value.into(),
            id_previous: id_prev.clone(),
            id_next: id_next.clone(),
        };

        self.document
            .integrate_insert(character, &id_prev, &id_next)?;
        Ok(self.document.content())
    }

    /// Tombstone the visible character at a 1-based position. Positions with
    /// no visible character are a no-op. Returns the projection.
    pub fn delete(&mut self, position: usize) -> String {
        if let Some(id) = self.document.ith_visible(position).map(|c| c.id.clone()) {
            self.document.integrate_delete(&id);
        }
        self.document.content()
    }

    /// Build the document from a plain-text file, one generated insert per
    /// character.
    pub fn load(&mut self, path: impl AsRef<Path>) -> io::Result<String> {
        let text = fs::read_to_string(path)?;
        let mut position = 1;
        for ch in text.chars() {
            self.insert(position, ch.to_string())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            position += 1;
        }
        Ok(self.document.content())
    }
}

/// Persist the plain-text projection. The CRDT structure itself is never
/// written to disk.
pub fn save(path: impl AsRef<Path>, document: &Document) -> io::Result<()> {
    fs::write(path, document.content())
}
