//! The replicated character sequence and its integration algorithms.
//!
//! A document is an ordered list of characters bracketed by two permanent
//! invisible sentinels. Characters are never removed; deletion tombstones
//! them in place so that the causal neighbors referenced by later insertions
//! stay resolvable forever.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Id of the permanent head sentinel.
pub const START_ID: &str = "start";
/// Id of the permanent tail sentinel.
pub const END_ID: &str = "end";

/// Errors reported by the integration and generation paths.
///
/// Nothing in this crate panics; callers decide whether an error is surfaced
/// to the user or merely logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CrdtError {
    /// Generate-insert outside `[1, visible_len + 1]`.
    #[error("position out of bounds")]
    PositionOutOfBounds,
    /// Integration of a character with an empty id.
    #[error("empty character id provided")]
    EmptyCharacterId,
    /// Integrate-insert where a causal bound is not in the document.
    #[error("subsequence bound(s) not present")]
    BoundsNotPresent,
}

/// The atomic unit of the document.
///
/// `id` is the owning site id concatenated with that site's local clock at
/// generation time, globally unique and totally ordered by lexicographic
/// comparison. `id_previous`/`id_next` are the causal neighbors at the moment
/// of generation; the live position is determined by storage order alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    #[serde(rename = "ID")]
    pub id: String,
    pub visible: bool,
    pub value: String,
    #[serde(rename = "IDPrevious")]
    pub id_previous: String,
    #[serde(rename = "IDNext")]
    pub id_next: String,
}

impl Character {
    fn start() -> Self {
        Character {
            id: START_ID.to_string(),
            visible: false,
            value: String::new(),
            id_previous: String::new(),
            id_next: END_ID.to_string(),
        }
    }

    fn end() -> Self {
        Character {
            id: END_ID.to_string(),
            visible: false,
            value: String::new(),
            id_previous: START_ID.to_string(),
            id_next: String::new(),
        }
    }
}

/// An ordered character sequence bracketed by the two sentinels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub characters: Vec<Character>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A document holding only the sentinels; projects to the empty string.
    pub fn new() -> Self {
        Document {
            characters: vec![Character::start(), Character::end()],
        }
    }

    /// Plain-text projection: the values of the visible characters in
    /// storage order.
    pub fn content(&self) -> String {
        self.characters
            .iter()
            .filter(|c| c.visible)
            .map(|c| c.value.as_str())
            .collect()
    }

    /// Number of stored characters, sentinels and tombstones included.
    pub fn len(&self) -> usize {
        self.characters.len()
    }

    /// Number of currently visible characters.
    pub fn visible_len(&self) -> usize {
        self.characters.iter().filter(|c| c.visible).count()
    }

    /// The k-th visible character, 1-based. `None` for `position == 0` or
    /// past the visible end.
    pub fn ith_visible(&self, position: usize) -> Option<&Character> {
        if position == 0 {
            return None;
        }
        self.characters
            .iter()
            .filter(|c| c.visible)
            .nth(position - 1)
    }

    /// Look a character up by id.
    pub fn find(&self, id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Storage index of the character with the given id.
    fn position(&self, id: &str) -> Option<usize> {
        self.characters.iter().position(|c| c.id == id)
    }

    /// Splice a character into storage order at `index` and rewire the
    /// neighbors' causal hints. `index` is always strictly inside the
    /// sentinels, so both neighbors exist.
    fn splice(&mut self, index: usize, character: Character) {
        let id = character.id.clone();
        self.characters.insert(index, character);
        self.characters[index - 1].id_next = id.clone();
        self.characters[index + 1].id_previous = id;
    }

    /// Place a remotely generated character into the local sequence.
    ///
    /// The candidate interval `(id_prev, id_next)` is narrowed until the
    /// character's slot is unambiguous; ties between causally concurrent
    /// insertions are broken by lexicographic id order, so every replica
    /// picks the same slot. The interval shrinks every round, which bounds
    /// the loop.
    pub fn integrate_insert(
        &mut self,
        character: Character,
        id_prev: &str,
        id_next: &str,
    ) -> Result<(), CrdtError> {
        if character.id.is_empty() {
            return Err(CrdtError::EmptyCharacterId);
        }

        let mut prev = id_prev.to_string();
        let mut next = id_next.to_string();

        loop {
            let lo = self.position(&prev).ok_or(CrdtError::BoundsNotPresent)?;
            let hi = self.position(&next).ok_or(CrdtError::BoundsNotPresent)?;
            if hi <= lo {
                return Err(CrdtError::BoundsNotPresent);
            }

            // Stored characters strictly between the bounds, tombstones
            // included.
            match hi - lo - 1 {
                0 => {
                    self.splice(hi, character);
                    return Ok(());
                }
                1 => {
                    // One concurrent neighbor: order the pair by id.
                    let index = if self.characters[lo + 1].id < character.id {
                        hi
                    } else {
                        lo + 1
                    };
                    self.splice(index, character);
                    return Ok(());
                }
                _ => {
                    // Walk the interior from its second element to the first
                    // id at or past the candidate's, then narrow to the pair
                    // that brackets it.
                    let mut i = lo + 2;
                    while i < hi - 1 && self.characters[i].id < character.id {
                        i += 1;
                    }
                    prev = self.characters[i - 1].id.clone();
                    next = self.characters[i].id.clone();
                }
            }
        }
    }

    /// Tombstone the character with the given id. Unknown ids are a no-op:
    /// deletes are idempotent and must tolerate redelivery during resync.
    pub fn integrate_delete(&mut self, id: &str) {
        if let Some(index) = self.position(id) {
            self.characters[index].visible = false;
        }
    }
}
