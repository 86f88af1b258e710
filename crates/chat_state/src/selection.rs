//! VersionSelector - which reply version of each turn is displayed
//!
//! Turns are referenced by key only, so every call takes the turn's current
//! version count. Stored indices are re-clamped on read because a turn can
//! shrink (local truncation, refresh) after a selection was made.

use std::collections::{HashMap, HashSet};

use chat_core::TurnKey;

/// Navigation direction for the previous/next version control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

#[derive(Debug, Clone, Default)]
pub struct VersionSelector {
    selections: HashMap<TurnKey, usize>,
}

impl VersionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Displayed version index; defaults to the latest version.
    /// `None` when the turn has no versions.
    pub fn get(&self, key: &TurnKey, version_count: usize) -> Option<usize> {
        let last = version_count.checked_sub(1)?;
        Some(self.selections.get(key).map_or(last, |i| (*i).min(last)))
    }

    /// Select `index`, clamped into `[0, version_count - 1]`.
    pub fn set(&mut self, key: &TurnKey, index: isize, version_count: usize) -> Option<usize> {
        let last = version_count.checked_sub(1)?;
        let clamped = usize::try_from(index).map_or(0, |i| i.min(last));
        self.selections.insert(key.clone(), clamped);
        Some(clamped)
    }

    /// Move one version in `direction`, saturating at both ends.
    pub fn advance(
        &mut self,
        key: &TurnKey,
        direction: Direction,
        version_count: usize,
    ) -> Option<usize> {
        let current = self.get(key, version_count)?;
        let last = version_count - 1;
        let next = match direction {
            Direction::Previous => current.saturating_sub(1),
            Direction::Next => (current + 1).min(last),
        };
        self.selections.insert(key.clone(), next);
        Some(next)
    }

    /// Whether an explicit selection exists for the turn.
    pub fn is_explicit(&self, key: &TurnKey) -> bool {
        self.selections.contains_key(key)
    }

    pub fn forget(&mut self, key: &TurnKey) {
        self.selections.remove(key);
    }

    /// Drop selections for turns that no longer exist.
    pub fn retain(&mut self, live: &HashSet<TurnKey>) {
        self.selections.retain(|key, _| live.contains(key));
    }

    pub fn clear(&mut self) {
        self.selections.clear();
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}
