//! In-memory mirror of one domain's server state.
//!
//! A [`Mirror`] holds one [`Partition`] per entity type that may ride the
//! domain's stream. Partitions are index-based arenas: entities live in a
//! dense `Vec`, and a map from [`Id`] to slot gives O(1) lookup. Removal
//! swaps the last entity into the freed slot, so the order across entities
//! is not stable and slot numbers must never be kept across a removal.
//! Order among siblings is carried by explicit position fields instead.

use std::collections::HashMap;

use crate::entity::{
    Collection, Entity, Id, Perspective, Playlist, PlaylistTrack, Query, QueueTrack, Track,
};

/// Dense storage of entities of one type, unique by [`Id`].
#[derive(Clone, Debug)]
pub struct Partition<T> {
    items: Vec<T>,
    slots: HashMap<Id, usize>,
}

impl<T> Default for Partition<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            slots: HashMap::new(),
        }
    }
}

impl<T: Entity> Partition<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: Id) -> Option<&T> {
        self.slots.get(&id).map(|&slot| &self.items[slot])
    }

    #[must_use]
    pub fn contains(&self, id: Id) -> bool {
        self.slots.contains_key(&id)
    }

    /// Iterates over all entities, in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Inserts `entity` only when its ID is absent.
    ///
    /// Returns whether the entity was inserted. An existing entity with the
    /// same ID is left untouched: the first copy wins.
    pub fn insert(&mut self, entity: T) -> bool {
        let id = entity.id();
        if self.slots.contains_key(&id) {
            return false;
        }

        self.slots.insert(id, self.items.len());
        self.items.push(entity);
        true
    }

    /// Inserts `entity`, or overwrites the entity with the same ID.
    ///
    /// Returns whether the partition changed: overwriting an entity with an
    /// equal value is a no-op.
    pub fn upsert(&mut self, entity: T) -> bool {
        match self.slots.get(&entity.id()) {
            Some(&slot) => {
                if self.items[slot] == entity {
                    false
                } else {
                    self.items[slot] = entity;
                    true
                }
            }
            None => self.insert(entity),
        }
    }

    /// Removes the entity with `id`, returning it when it was present.
    ///
    /// The last entity is moved into the freed slot.
    pub fn remove(&mut self, id: Id) -> Option<T> {
        let slot = self.slots.remove(&id)?;
        let removed = self.items.swap_remove(slot);
        if let Some(moved) = self.items.get(slot) {
            self.slots.insert(moved.id(), slot);
        }
        Some(removed)
    }

    /// Removes every entity for which `keep` returns `false`, returning how
    /// many were removed.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let doomed: Vec<Id> = self
            .items
            .iter()
            .filter(|entity| !keep(entity))
            .map(Entity::id)
            .collect();

        for id in &doomed {
            self.remove(*id);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.slots.clear();
    }
}

/// The client-side copy of one domain's server state.
///
/// Only the partitions for payload types the domain accepts are ever
/// populated; the others stay empty.
#[derive(Clone, Debug, Default)]
pub struct Mirror {
    pub collections: Partition<Collection>,
    pub tracks: Partition<Track>,
    pub playlists: Partition<Playlist>,
    pub playlist_tracks: Partition<PlaylistTrack>,
    pub queue_tracks: Partition<QueueTrack>,
    pub queries: Partition<Query>,
    pub perspectives: Partition<Perspective>,
}

impl Mirror {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of entities across all partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
            + self.tracks.len()
            + self.playlists.len()
            + self.playlist_tracks.len()
            + self.queue_tracks.len()
            + self.queries.len()
            + self.perspectives.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.collections.clear();
        self.tracks.clear();
        self.playlists.clear();
        self.playlist_tracks.clear();
        self.queue_tracks.clear();
        self.queries.clear();
        self.perspectives.clear();
    }

    /// Removes a playlist together with all of its entries.
    ///
    /// Returns whether anything was removed.
    pub fn remove_playlist(&mut self, id: Id) -> bool {
        let playlist = self.playlists.remove(id).is_some();
        let entries = self
            .playlist_tracks
            .retain(|entry| entry.playlist_id != id);
        playlist || entries > 0
    }
}
