use std::{fmt, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};

use super::Payload;
use crate::error::Error;

/// One of the independently synchronized resource families.
///
/// Each domain has its own event stream, mirror and lock. There is no
/// ordering between domains: after a server-side action that touches more
/// than one, they may become consistent at different times.
#[derive(
    Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
)]
pub enum Domain {
    /// Collections and the tracks they hold.
    Collections,

    /// Playlists in the playbar, their entries and the tracks they refer to.
    Playbar,

    /// The play queue and the tracks it refers to.
    Queue,

    /// Saved queries.
    Queries,

    /// The perspectives, one of which is active.
    Perspective,
}

impl Domain {
    /// All domains, in the order a session subscribes to them.
    pub const ALL: [Domain; 5] = [
        Self::Collections,
        Self::Playbar,
        Self::Queue,
        Self::Queries,
        Self::Perspective,
    ];

    /// Wire value for [`Domain::Collections`].
    const COLLECTIONS: &'static str = "collections";

    /// Wire value for [`Domain::Playbar`].
    const PLAYBAR: &'static str = "playbar";

    /// Wire value for [`Domain::Queue`].
    const QUEUE: &'static str = "queue";

    /// Wire value for [`Domain::Queries`].
    const QUERIES: &'static str = "queries";

    /// Wire value for [`Domain::Perspective`].
    const PERSPECTIVE: &'static str = "perspective";

    /// Whether events of this domain may carry `payload`.
    ///
    /// [`Payload::None`] is accepted by every domain; whether it fits the
    /// event kind is up to the reducer.
    #[must_use]
    pub fn accepts(self, payload: &Payload) -> bool {
        match payload {
            Payload::None => true,
            Payload::Collection(_) => self == Self::Collections,
            Payload::Track(_) => matches!(self, Self::Collections | Self::Playbar | Self::Queue),
            Payload::Playlist(_) | Payload::PlaylistTrack(_) => self == Self::Playbar,
            Payload::QueueTrack(_) => self == Self::Queue,
            Payload::Query(_) => self == Self::Queries,
            Payload::Perspective(_) => self == Self::Perspective,
        }
    }

    /// Human-readable title, used as the label of the tree root.
    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::Collections => "Collections",
            Self::Playbar => "Playlists",
            Self::Queue => "Queue",
            Self::Queries => "Queries",
            Self::Perspective => "Perspectives",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Collections => Self::COLLECTIONS,
            Self::Playbar => Self::PLAYBAR,
            Self::Queue => Self::QUEUE,
            Self::Queries => Self::QUERIES,
            Self::Perspective => Self::PERSPECTIVE,
        };
        write!(f, "{s}")
    }
}

impl FromStr for Domain {
    type Err = Error;

    /// Parses a domain name. The string `s` is parsed as lowercase.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let domain = match s.to_lowercase().as_ref() {
            Self::COLLECTIONS => Self::Collections,
            Self::PLAYBAR => Self::Playbar,
            Self::QUEUE => Self::Queue,
            Self::QUERIES => Self::Queries,
            Self::PERSPECTIVE => Self::Perspective,
            _ => return Err(Self::Err::invalid_argument(format!("unknown domain `{s}`"))),
        };

        Ok(domain)
    }
}
