//! Replacement of one playlist's contents outside of a snapshot.
//!
//! When a playlist is opened that was not part of the initial snapshot, or
//! its contents must be refreshed, the server sends them in a window:
//!
//! 1. `OPEN_ITEMS` opens the window, optionally naming the playlist.
//! 2. `OPEN_ITEMS_ITEM` upserts one entry (or a track it refers to). Entry
//!    IDs are recorded in the window.
//! 3. `OPEN_ITEMS_DONE` closes the window. Entries of the playlist that were
//!    not recorded are stale and get removed. If the playlist is no longer
//!    open, the playlist and all its entries are removed instead.
//!
//! Only one window may be open per stream at a time. The window is cleared
//! when it closes, on every path.

use std::collections::HashSet;

use crate::{
    entity::{Id, Playlist, PlaylistTrack},
    error::{Error, Result},
    mirror::Mirror,
};

/// Accumulator of the entries delivered between window open and close.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplacementWindow {
    open: bool,
    target: Option<Id>,
    collected: HashSet<Id>,
}

impl ReplacementWindow {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// The playlist whose contents are being replaced, once known.
    #[must_use]
    pub fn target(&self) -> Option<Id> {
        self.target
    }

    /// Number of entry IDs collected so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.collected.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.open && self.target.is_none() && self.collected.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Opens the window, upserting the target playlist when one is given.
///
/// # Errors
///
/// Returns `FailedPrecondition` if a window is already open. The running
/// window is left untouched.
pub fn open(
    mirror: &mut Mirror,
    window: &mut ReplacementWindow,
    target: Option<Playlist>,
) -> Result<bool> {
    if window.open {
        return Err(Error::failed_precondition(format!(
            "replacement window for playlist {} is already open",
            window
                .target
                .map_or_else(|| "unknown".to_owned(), |id| id.to_string())
        )));
    }

    window.open = true;
    window.collected.clear();
    window.target = target.as_ref().map(|playlist| playlist.id);

    let changed = target.is_some_and(|playlist| mirror.playlists.upsert(playlist));
    Ok(changed)
}

/// Upserts an entry delivered inside the window and records its ID.
///
/// The first entry fixes the target when `OPEN_ITEMS` did not name one.
/// Entries of any other playlist are applied but not recorded.
///
/// # Errors
///
/// Returns `FailedPrecondition` if no window is open.
pub fn collect(
    mirror: &mut Mirror,
    window: &mut ReplacementWindow,
    entry: PlaylistTrack,
) -> Result<bool> {
    if !window.open {
        return Err(Error::failed_precondition(format!(
            "playlist entry {} outside of a replacement window",
            entry.id
        )));
    }

    let target = *window.target.get_or_insert(entry.playlist_id);
    if entry.playlist_id == target {
        window.collected.insert(entry.id);
    } else {
        warn!(
            "entry {} belongs to playlist {} while replacing playlist {target}; not recording",
            entry.id, entry.playlist_id
        );
    }

    Ok(mirror.playlist_tracks.upsert(entry))
}

/// Closes the window and reconciles the target playlist.
///
/// The window is cleared before anything else, so it never outlives this
/// call, whatever the outcome.
///
/// # Errors
///
/// Returns `FailedPrecondition` if no window was open, or if the target
/// playlist is unknown because neither the window nor `target` named it.
pub fn close(
    mirror: &mut Mirror,
    window: &mut ReplacementWindow,
    target: Option<Playlist>,
) -> Result<bool> {
    let ReplacementWindow {
        open,
        target: window_target,
        collected,
    } = std::mem::take(window);

    if !open {
        return Err(Error::failed_precondition(
            "replacement window closed without being opened",
        ));
    }

    let target_id = match (&target, window_target) {
        (Some(playlist), Some(id)) if playlist.id != id => {
            warn!(
                "replacement window for playlist {id} closed as playlist {}",
                playlist.id
            );
            playlist.id
        }
        (Some(playlist), _) => playlist.id,
        (None, Some(id)) => id,
        (None, None) => {
            return Err(Error::failed_precondition(
                "replacement window closed without a target playlist",
            ))
        }
    };

    let mut changed = target.is_some_and(|playlist| mirror.playlists.upsert(playlist));

    let still_open = mirror
        .playlists
        .get(target_id)
        .is_some_and(|playlist| playlist.open);

    if still_open {
        let stale = mirror.playlist_tracks.retain(|entry| {
            entry.playlist_id != target_id || collected.contains(&entry.id)
        });
        if stale > 0 {
            debug!("removed {stale} stale entries from playlist {target_id}");
            changed = true;
        }
    } else {
        debug!("playlist {target_id} closed while off-stream; removing it");
        changed |= mirror.remove_playlist(target_id);
    }

    Ok(changed)
}
