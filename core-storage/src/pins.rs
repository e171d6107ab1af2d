//! Pin bookkeeping
//!
//! Pins are owned by groups so the playlist and the manifest can pin and
//! release independently. An id is pinned while any group holds it.

use core_content::ContentId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinGroup {
    /// Items of the playlist currently on screen
    Playlist,
    /// Items referenced by the last applied manifest
    Manifest,
}

#[derive(Debug, Default)]
pub(crate) struct PinSet {
    groups: HashMap<PinGroup, HashSet<ContentId>>,
}

impl PinSet {
    pub fn replace(&mut self, group: PinGroup, ids: HashSet<ContentId>) {
        if ids.is_empty() {
            self.groups.remove(&group);
        } else {
            self.groups.insert(group, ids);
        }
    }

    pub fn add(&mut self, group: PinGroup, id: ContentId) {
        self.groups.entry(group).or_default().insert(id);
    }

    pub fn clear(&mut self, group: PinGroup) {
        self.groups.remove(&group);
    }

    pub fn is_pinned(&self, id: &ContentId) -> bool {
        self.groups.values().any(|ids| ids.contains(id))
    }

    pub fn all(&self) -> HashSet<ContentId> {
        self.groups.values().flatten().cloned().collect()
    }
}
