use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::Domain;
use crate::entity::{
    Collection, Entity, Id, Perspective, Playlist, PlaylistTrack, Query, QueueTrack, Track,
};

/// An event on a domain's stream.
///
/// # Wire Format
///
/// ```json
/// {
///     "domain": "playbar",
///     "subscription_id": "1c3e6a4e-8d07-4d0c-9a4a-2f1e0c1b9d55",
///     "kind": "SNAPSHOT_ITEM",
///     "payload": { "playlist": { "id": 3, "name": "Morning", "open": true } }
/// }
/// ```
///
/// A missing or `null` `payload` is [`Payload::None`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub domain: Domain,

    /// Assigned by the server and identical on every event of one stream.
    pub subscription_id: String,

    pub kind: Kind,

    #[serde(default, deserialize_with = "payload_or_none")]
    pub payload: Payload,
}

fn payload_or_none<'de, D>(deserializer: D) -> std::result::Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Payload>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Kinds of events, in three families:
///
/// * Snapshot: a full resync of the domain.
/// * Item: incremental changes to single entities.
/// * Open items: the full contents of one sub-resource, replacing what the
///   mirror held for it.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Kind {
    SnapshotStart,
    SnapshotItem,
    SnapshotEnd,
    ItemAdded,
    ItemChanged,
    ItemRemoved,
    OpenItems,
    OpenItemsItem,
    OpenItemsDone,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SnapshotStart => "SNAPSHOT_START",
            Self::SnapshotItem => "SNAPSHOT_ITEM",
            Self::SnapshotEnd => "SNAPSHOT_END",
            Self::ItemAdded => "ITEM_ADDED",
            Self::ItemChanged => "ITEM_CHANGED",
            Self::ItemRemoved => "ITEM_REMOVED",
            Self::OpenItems => "OPEN_ITEMS",
            Self::OpenItemsItem => "OPEN_ITEMS_ITEM",
            Self::OpenItemsDone => "OPEN_ITEMS_DONE",
        };
        write!(f, "{s}")
    }
}

/// The typed payload of an [`Event`]: at most one entity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    #[default]
    None,
    Collection(Collection),
    Track(Track),
    Playlist(Playlist),
    PlaylistTrack(PlaylistTrack),
    QueueTrack(QueueTrack),
    Query(Query),
    Perspective(Perspective),
}

impl Payload {
    /// The identifier of the carried entity, if any.
    #[must_use]
    pub fn id(&self) -> Option<Id> {
        let id = match self {
            Self::None => return None,
            Self::Collection(e) => e.id(),
            Self::Track(e) => e.id(),
            Self::Playlist(e) => e.id(),
            Self::PlaylistTrack(e) => e.id(),
            Self::QueueTrack(e) => e.id(),
            Self::Query(e) => e.id(),
            Self::Perspective(e) => e.id(),
        };
        Some(id)
    }

    /// Name of the payload type, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Collection(_) => "collection",
            Self::Track(_) => "track",
            Self::Playlist(_) => "playlist",
            Self::PlaylistTrack(_) => "playlist track",
            Self::QueueTrack(_) => "queue track",
            Self::Query(_) => "query",
            Self::Perspective(_) => "perspective",
        }
    }
}

impl Event {
    #[must_use]
    pub fn new(domain: Domain, subscription_id: impl Into<String>, kind: Kind) -> Self {
        Self {
            domain,
            subscription_id: subscription_id.into(),
            kind,
            payload: Payload::None,
        }
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = payload.into();
        self
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.domain, self.kind)?;
        match self.payload.id() {
            Some(id) => write!(f, " {} {id}", self.payload.name()),
            None => Ok(()),
        }
    }
}

macro_rules! impl_from_entity {
    ($($ty:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(entity: $ty) -> Self {
                    Self::$ty(entity)
                }
            }
        )+
    };
}

impl_from_entity!(
    Collection,
    Track,
    Playlist,
    PlaylistTrack,
    QueueTrack,
    Query,
    Perspective,
);
