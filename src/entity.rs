//! Entity snapshots mirrored from the server.
//!
//! Entities are plain values: they never hold references to one another.
//! Relationships such as "this playlist entry refers to that track" are
//! kept as [`Id`]s and resolved by lookup when a tree is projected.
//!
//! Every entity type deserializes leniently: fields missing on the wire
//! take their default value.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

/// Opaque entity identifier, unique within its domain.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Id(pub u64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Id {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A value snapshot of a server-side record.
pub trait Entity: Clone + fmt::Debug + PartialEq + Send + 'static {
    /// Identity of this entity within its domain.
    fn id(&self) -> Id;
}

/// A music collection: a local directory or a remote source of tracks.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Collection {
    pub id: Id,
    pub name: String,
    pub location: String,

    /// Tracks of disabled collections are not shown.
    pub disabled: bool,
    pub remote: bool,
}

/// A track, as known to the collection it belongs to.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub id: Id,
    pub collection_id: Id,
    pub title: String,
    pub artist: String,
    pub album_artist: String,
    pub album: String,
    pub genre: String,
    pub year: u32,
    pub disc: u32,
    pub number: u32,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub duration: Duration,

    /// Rating from zero to five stars.
    pub rating: u8,
}

impl Track {
    /// The album artist, falling back to the track artist when unset.
    #[must_use]
    pub fn album_artist(&self) -> &str {
        if self.album_artist.is_empty() {
            &self.artist
        } else {
            &self.album_artist
        }
    }
}

/// A playlist shown in the playbar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub id: Id,
    pub name: String,
    pub perspective: Id,

    /// Position of the playlist among its siblings in the playbar.
    pub position: u32,

    /// Whether the playlist is open in the playbar. A playlist that is
    /// closed when its contents are refreshed is removed from the mirror.
    pub open: bool,

    /// Whether this is the playlist currently playing.
    pub active: bool,
}

/// An entry of a playlist, pointing at a track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaylistTrack {
    pub id: Id,
    pub playlist_id: Id,
    pub track_id: Id,
    pub position: u32,
    pub played: bool,
}

/// An entry of the play queue, pointing at a track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueTrack {
    pub id: Id,
    pub track_id: Id,
    pub position: u32,
    pub played: bool,
}

/// A saved query over one or more collections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub id: Id,
    pub name: String,
    pub query: String,
    pub collection_ids: Vec<Id>,
}

/// A perspective (music, audiobooks, podcasts, ...). Exactly one is active.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Perspective {
    pub id: Id,
    pub name: String,
    pub active: bool,
}

macro_rules! impl_entity {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Entity for $ty {
                fn id(&self) -> Id {
                    self.id
                }
            }
        )+
    };
}

impl_entity!(
    Collection,
    Track,
    Playlist,
    PlaylistTrack,
    QueueTrack,
    Query,
    Perspective,
);
