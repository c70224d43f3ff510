//! Applies one event at a time to a domain's [`Mirror`].
//!
//! | Kind                            | Effect                                           |
//! |---------------------------------|--------------------------------------------------|
//! | `SNAPSHOT_START`                | clear the mirror, enter loading mode             |
//! | `SNAPSHOT_ITEM`                 | insert when absent; the first copy wins          |
//! | `SNAPSHOT_END`                  | leave loading mode                               |
//! | `ITEM_ADDED` / `ITEM_CHANGED`   | upsert by ID                                     |
//! | `ITEM_REMOVED`                  | remove by ID; absence is not an error            |
//! | `OPEN_ITEMS*`                   | see [`crate::replace`]                           |
//!
//! Every event is validated before the mirror is touched, so an event is
//! either applied completely or not at all.

use crate::{
    entity::Id,
    error::{Error, Result},
    mirror::Mirror,
    protocol::{Domain, Event, Kind, Payload},
    replace::{self, ReplacementWindow},
};

/// Whether applying an event changed the mirror.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    Unchanged,
    Changed,
}

impl Outcome {
    #[must_use]
    pub fn is_changed(self) -> bool {
        self == Self::Changed
    }
}

impl From<bool> for Outcome {
    fn from(changed: bool) -> Self {
        if changed {
            Self::Changed
        } else {
            Self::Unchanged
        }
    }
}

/// The synchronization state of one domain: its mirror, whether a snapshot
/// is loading, and the replacement window.
#[derive(Debug)]
pub struct Reducer {
    domain: Domain,
    mirror: Mirror,
    loading: bool,
    window: ReplacementWindow,
}

impl Reducer {
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            mirror: Mirror::new(),
            loading: false,
            window: ReplacementWindow::default(),
        }
    }

    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    #[must_use]
    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    #[must_use]
    pub fn window(&self) -> &ReplacementWindow {
        &self.window
    }

    /// Whether a snapshot is being received.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether a tree may be materialized from the mirror: no snapshot is
    /// loading and no replacement window is open.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !self.loading && !self.window.is_open()
    }

    /// Clears all state, as on subscription teardown.
    pub fn reset(&mut self) {
        self.mirror.clear();
        self.loading = false;
        self.window.clear();
    }

    /// Applies `event` to the mirror.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the event belongs to another domain, or
    /// its payload does not fit the domain or the event kind, and
    /// `FailedPrecondition` if it violates the replacement window protocol.
    /// The mirror is unchanged in either case, but a window is always closed
    /// by `OPEN_ITEMS_DONE`.
    pub fn apply(&mut self, event: Event) -> Result<Outcome> {
        let closes_window = event.kind == Kind::OpenItemsDone;
        let result = self.dispatch(event);
        if closes_window && result.is_err() && self.window.is_open() {
            warn!("{}: replacement window discarded", self.domain);
            self.window.clear();
        }
        result
    }

    fn dispatch(&mut self, event: Event) -> Result<Outcome> {
        let Event {
            domain,
            kind,
            payload,
            ..
        } = event;

        if domain != self.domain {
            return Err(Error::invalid_argument(format!(
                "{domain} event on {} stream",
                self.domain
            )));
        }

        if !domain.accepts(&payload) {
            return Err(Error::invalid_argument(format!(
                "{domain} stream cannot carry {} payloads",
                payload.name()
            )));
        }

        let changed = match kind {
            Kind::SnapshotStart => {
                expect_none(kind, &payload)?;
                if self.window.is_open() {
                    warn!("{domain}: snapshot discards open replacement window");
                }
                self.window.clear();
                self.loading = true;
                let changed = !self.mirror.is_empty();
                self.mirror.clear();
                changed
            }

            Kind::SnapshotItem => {
                if !self.loading {
                    debug!("{domain}: snapshot item outside of snapshot");
                }
                self.insert(kind, payload)?
            }

            Kind::SnapshotEnd => {
                expect_none(kind, &payload)?;
                // Ending a snapshot makes a materialization pass eligible,
                // even when the snapshot was empty.
                std::mem::replace(&mut self.loading, false)
            }

            Kind::ItemAdded | Kind::ItemChanged => self.upsert(kind, payload)?,

            Kind::ItemRemoved => self.remove(kind, &payload)?,

            Kind::OpenItems => match payload {
                Payload::None => replace::open(&mut self.mirror, &mut self.window, None)?,
                Payload::Playlist(playlist) => {
                    replace::open(&mut self.mirror, &mut self.window, Some(playlist))?
                }
                other => return Err(unexpected(kind, &other)),
            },

            Kind::OpenItemsItem => match payload {
                Payload::PlaylistTrack(entry) => {
                    replace::collect(&mut self.mirror, &mut self.window, entry)?
                }
                Payload::Track(track) => {
                    if !self.window.is_open() {
                        return Err(Error::failed_precondition(format!(
                            "track {} outside of a replacement window",
                            track.id
                        )));
                    }
                    self.mirror.tracks.upsert(track)
                }
                other => return Err(unexpected(kind, &other)),
            },

            Kind::OpenItemsDone => match payload {
                Payload::None => replace::close(&mut self.mirror, &mut self.window, None)?,
                Payload::Playlist(playlist) => {
                    replace::close(&mut self.mirror, &mut self.window, Some(playlist))?
                }
                other => return Err(unexpected(kind, &other)),
            },
        };

        Ok(changed.into())
    }

    fn insert(&mut self, kind: Kind, payload: Payload) -> Result<bool> {
        let mirror = &mut self.mirror;
        let inserted = match payload {
            Payload::None => return Err(unexpected(kind, &payload)),
            Payload::Collection(e) => mirror.collections.insert(e),
            Payload::Track(e) => mirror.tracks.insert(e),
            Payload::Playlist(e) => mirror.playlists.insert(e),
            Payload::PlaylistTrack(e) => mirror.playlist_tracks.insert(e),
            Payload::QueueTrack(e) => mirror.queue_tracks.insert(e),
            Payload::Query(e) => mirror.queries.insert(e),
            Payload::Perspective(e) => mirror.perspectives.insert(e),
        };
        Ok(inserted)
    }

    fn upsert(&mut self, kind: Kind, payload: Payload) -> Result<bool> {
        let mirror = &mut self.mirror;
        let changed = match payload {
            Payload::None => return Err(unexpected(kind, &payload)),
            Payload::Collection(e) => mirror.collections.upsert(e),
            Payload::Track(e) => mirror.tracks.upsert(e),
            Payload::Playlist(e) => mirror.playlists.upsert(e),
            Payload::PlaylistTrack(e) => mirror.playlist_tracks.upsert(e),
            Payload::QueueTrack(e) => mirror.queue_tracks.upsert(e),
            Payload::Query(e) => mirror.queries.upsert(e),
            Payload::Perspective(e) => mirror.perspectives.upsert(e),
        };
        Ok(changed)
    }

    fn remove(&mut self, kind: Kind, payload: &Payload) -> Result<bool> {
        let id: Id = payload.id().ok_or_else(|| unexpected(kind, payload))?;

        let mirror = &mut self.mirror;
        let removed = match payload {
            Payload::None => false,
            Payload::Collection(_) => mirror.collections.remove(id).is_some(),
            Payload::Track(_) => mirror.tracks.remove(id).is_some(),
            Payload::Playlist(_) => mirror.remove_playlist(id),
            Payload::PlaylistTrack(_) => mirror.playlist_tracks.remove(id).is_some(),
            Payload::QueueTrack(_) => mirror.queue_tracks.remove(id).is_some(),
            Payload::Query(_) => mirror.queries.remove(id).is_some(),
            Payload::Perspective(_) => mirror.perspectives.remove(id).is_some(),
        };

        if !removed {
            trace!("{}: {} {id} already absent", self.domain, payload.name());
        }
        Ok(removed)
    }
}

fn expect_none(kind: Kind, payload: &Payload) -> Result<()> {
    match payload {
        Payload::None => Ok(()),
        other => Err(unexpected(kind, other)),
    }
}

fn unexpected(kind: Kind, payload: &Payload) -> Error {
    Error::invalid_argument(format!("{kind} cannot carry {} payload", payload.name()))
}
