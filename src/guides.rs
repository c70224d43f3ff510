//! The grouping keys of the five domains, and how each domain's mirror is
//! joined into leaf rows for [`materialize`].
//!
//! Keys are configured by name, e.g. `["album_artist", "year_album", "title"]`
//! for the collections tree.

use serde::{Deserialize, Serialize};

use crate::{
    entity::{Collection, Id, Perspective, Playlist, PlaylistTrack, Query, QueueTrack, Track},
    mirror::Mirror,
    protocol::Domain,
    tree::{keywords, materialize, Filter, GroupKey, Guide, Label, Leaf, Tree},
};

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";
const UNKNOWN_COLLECTION: &str = "Unknown Collection";
const UNKNOWN_GENRE: &str = "Unknown Genre";

fn or_unknown<'a>(value: &'a str, unknown: &'a str) -> &'a str {
    if value.trim().is_empty() {
        unknown
    } else {
        value
    }
}

fn track_title(track: &Track) -> String {
    if track.title.trim().is_empty() {
        format!("Track {}", track.id)
    } else {
        track.title.clone()
    }
}

fn track_keywords(track: &Track) -> Vec<String> {
    let year = if track.year > 0 {
        track.year.to_string()
    } else {
        String::new()
    };
    vec![
        track.title.clone(),
        track.artist.clone(),
        track.album_artist.clone(),
        track.album.clone(),
        track.genre.clone(),
        year,
    ]
}

/// Grouping keys over tracks, used by the collections tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKey {
    Collection,
    AlbumArtist,
    Artist,
    Album,
    /// `"<year> - <album>"`, ordered by year; albums without a year last.
    YearAlbum,
    Year,
    Genre,
    /// Ordered by disc and track number when the track has a number.
    Title,
    Rating,
}

/// A track joined with its collection.
#[derive(Copy, Clone, Debug)]
pub struct TrackRow<'a> {
    pub track: &'a Track,
    pub collection: Option<&'a Collection>,
}

impl Leaf for TrackRow<'_> {
    fn id(&self) -> Id {
        self.track.id
    }

    fn keywords(&self) -> String {
        let mut fields = track_keywords(self.track);
        if let Some(collection) = self.collection {
            fields.push(collection.name.clone());
        }
        keywords(fields.iter().map(String::as_str))
    }
}

impl<'a> GroupKey<TrackRow<'a>> for TrackKey {
    fn label(&self, row: &TrackRow<'a>) -> Label {
        let track = row.track;
        match self {
            Self::Collection => Label::new(or_unknown(
                row.collection.map_or("", |c| c.name.as_str()),
                UNKNOWN_COLLECTION,
            )),
            Self::AlbumArtist => Label::new(or_unknown(track.album_artist(), UNKNOWN_ARTIST)),
            Self::Artist => Label::new(or_unknown(&track.artist, UNKNOWN_ARTIST)),
            Self::Album => Label::new(or_unknown(&track.album, UNKNOWN_ALBUM)),
            Self::YearAlbum => {
                let album = or_unknown(&track.album, UNKNOWN_ALBUM);
                if track.year > 0 {
                    let year = i64::from(track.year);
                    Label::ordered(format!("{} - {album}", track.year), year, 0)
                } else {
                    Label::new(album)
                }
            }
            Self::Year => {
                if track.year > 0 {
                    Label::ordered(track.year.to_string(), i64::from(track.year), 0)
                } else {
                    Label::new("Unknown Year")
                }
            }
            Self::Genre => Label::new(or_unknown(&track.genre, UNKNOWN_GENRE)),
            Self::Title => {
                let title = track_title(track);
                if track.number > 0 {
                    Label::ordered(title, i64::from(track.disc), i64::from(track.number))
                } else {
                    Label::new(title)
                }
            }
            Self::Rating => {
                let stars = track.rating.min(5);
                let label = if stars == 0 {
                    "Unrated".to_owned()
                } else {
                    "★".repeat(usize::from(stars))
                };
                // Best rated first.
                Label::ordered(label, -i64::from(stars), 0)
            }
        }
    }
}

/// Grouping keys over playlist entries, used by the playbar tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybarKey {
    /// Ordered by playlist position; the active playlist is marked.
    Playlist,
    Artist,
    Album,
    /// Ordered by entry position.
    Track,
}

/// A playlist entry joined with its playlist and track.
#[derive(Copy, Clone, Debug)]
pub struct PlaylistRow<'a> {
    pub playlist: &'a Playlist,
    pub entry: &'a PlaylistTrack,
    pub track: Option<&'a Track>,
}

impl Leaf for PlaylistRow<'_> {
    fn id(&self) -> Id {
        self.entry.id
    }

    fn keywords(&self) -> String {
        let mut fields = self.track.map(track_keywords).unwrap_or_default();
        fields.push(self.playlist.name.clone());
        keywords(fields.iter().map(String::as_str))
    }
}

impl<'a> GroupKey<PlaylistRow<'a>> for PlaybarKey {
    fn label(&self, row: &PlaylistRow<'a>) -> Label {
        match self {
            Self::Playlist => {
                let playlist = row.playlist;
                let marker = if playlist.active { "* " } else { "" };
                Label::ordered(
                    format!("{marker}{}", playlist.name),
                    i64::from(playlist.position),
                    0,
                )
            }
            Self::Artist => Label::new(or_unknown(
                row.track.map_or("", |t| t.artist.as_str()),
                UNKNOWN_ARTIST,
            )),
            Self::Album => Label::new(or_unknown(
                row.track.map_or("", |t| t.album.as_str()),
                UNKNOWN_ALBUM,
            )),
            Self::Track => Label::ordered(
                entry_label(row.track, row.entry.track_id, false),
                i64::from(row.entry.position),
                0,
            ),
        }
    }
}

/// Grouping keys over queue entries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKey {
    Artist,
    Album,
    /// Ordered by queue position; played entries are marked.
    Track,
}

/// A queue entry joined with its track.
#[derive(Copy, Clone, Debug)]
pub struct QueueRow<'a> {
    pub entry: &'a QueueTrack,
    pub track: Option<&'a Track>,
}

impl Leaf for QueueRow<'_> {
    fn id(&self) -> Id {
        self.entry.id
    }

    fn keywords(&self) -> String {
        let fields = self.track.map(track_keywords).unwrap_or_default();
        keywords(fields.iter().map(String::as_str))
    }
}

impl<'a> GroupKey<QueueRow<'a>> for QueueKey {
    fn label(&self, row: &QueueRow<'a>) -> Label {
        match self {
            Self::Artist => Label::new(or_unknown(
                row.track.map_or("", |t| t.artist.as_str()),
                UNKNOWN_ARTIST,
            )),
            Self::Album => Label::new(or_unknown(
                row.track.map_or("", |t| t.album.as_str()),
                UNKNOWN_ALBUM,
            )),
            Self::Track => Label::ordered(
                entry_label(row.track, row.entry.track_id, row.entry.played),
                i64::from(row.entry.position),
                0,
            ),
        }
    }
}

fn entry_label(track: Option<&Track>, track_id: Id, played: bool) -> String {
    let marker = if played { "✓ " } else { "" };
    match track {
        Some(track) if !track.artist.is_empty() => {
            format!("{marker}{} - {}", track_title(track), track.artist)
        }
        Some(track) => format!("{marker}{}", track_title(track)),
        None => format!("{marker}Track {track_id}"),
    }
}

/// Grouping keys over saved queries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKey {
    /// First letter of the name, uppercase.
    Initial,
    Name,
}

impl Leaf for &Query {
    fn id(&self) -> Id {
        self.id
    }

    fn keywords(&self) -> String {
        keywords([self.name.as_str(), self.query.as_str()])
    }
}

impl<'a> GroupKey<&'a Query> for QueryKey {
    fn label(&self, row: &&'a Query) -> Label {
        match self {
            Self::Initial => Label::new(
                row.name
                    .trim()
                    .chars()
                    .next()
                    .map_or_else(|| "#".to_owned(), |c| c.to_uppercase().collect()),
            ),
            Self::Name => Label::new(or_unknown(&row.name, "Untitled")),
        }
    }
}

/// Grouping keys over perspectives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerspectiveKey {
    /// The active perspective is marked.
    Name,
}

impl Leaf for &Perspective {
    fn id(&self) -> Id {
        self.id
    }

    fn keywords(&self) -> String {
        keywords([self.name.as_str()])
    }
}

impl<'a> GroupKey<&'a Perspective> for PerspectiveKey {
    fn label(&self, row: &&'a Perspective) -> Label {
        match self {
            Self::Name => {
                let marker = if row.active { "* " } else { "" };
                Label::new(format!("{marker}{}", row.name))
            }
        }
    }
}

/// One guide per domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guides {
    pub collections: Vec<TrackKey>,
    pub playbar: Vec<PlaybarKey>,
    pub queue: Vec<QueueKey>,
    pub queries: Vec<QueryKey>,
    pub perspective: Vec<PerspectiveKey>,
}

impl Default for Guides {
    fn default() -> Self {
        Self {
            collections: vec![TrackKey::AlbumArtist, TrackKey::YearAlbum, TrackKey::Title],
            playbar: vec![PlaybarKey::Playlist, PlaybarKey::Track],
            queue: vec![QueueKey::Track],
            queries: vec![QueryKey::Initial, QueryKey::Name],
            perspective: vec![PerspectiveKey::Name],
        }
    }
}

impl Guides {
    /// Replaces empty guides with their defaults.
    #[must_use]
    pub fn or_default(self) -> Self {
        let defaults = Self::default();
        Self {
            collections: non_empty(self.collections, defaults.collections),
            playbar: non_empty(self.playbar, defaults.playbar),
            queue: non_empty(self.queue, defaults.queue),
            queries: non_empty(self.queries, defaults.queries),
            perspective: non_empty(self.perspective, defaults.perspective),
        }
    }

    /// Materializes the tree of `domain` from its mirror.
    #[must_use]
    pub fn project(&self, domain: Domain, mirror: &Mirror, filter: &Filter) -> Tree {
        let title = domain.title();
        match domain {
            Domain::Collections => {
                let rows = mirror.tracks.iter().filter_map(|track| {
                    let collection = mirror.collections.get(track.collection_id);
                    if collection.is_some_and(|c| c.disabled) {
                        return None;
                    }
                    Some(TrackRow { track, collection })
                });
                materialize(title, rows, &Guide::new(self.collections.clone()), filter)
            }

            Domain::Playbar => {
                let rows = mirror.playlist_tracks.iter().filter_map(|entry| {
                    let playlist = mirror.playlists.get(entry.playlist_id)?;
                    Some(PlaylistRow {
                        playlist,
                        entry,
                        track: mirror.tracks.get(entry.track_id),
                    })
                });
                materialize(title, rows, &Guide::new(self.playbar.clone()), filter)
            }

            Domain::Queue => {
                let rows = mirror.queue_tracks.iter().map(|entry| QueueRow {
                    entry,
                    track: mirror.tracks.get(entry.track_id),
                });
                materialize(title, rows, &Guide::new(self.queue.clone()), filter)
            }

            Domain::Queries => materialize(
                title,
                mirror.queries.iter(),
                &Guide::new(self.queries.clone()),
                filter,
            ),

            Domain::Perspective => materialize(
                title,
                mirror.perspectives.iter(),
                &Guide::new(self.perspective.clone()),
                filter,
            ),
        }
    }
}

fn non_empty<T>(keys: Vec<T>, default: Vec<T>) -> Vec<T> {
    if keys.is_empty() {
        default
    } else {
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: u64, collection: u64, artist: &str, year: u32, album: &str, title: &str) -> Track {
        Track {
            id: Id(id),
            collection_id: Id(collection),
            artist: artist.to_owned(),
            year,
            album: album.to_owned(),
            title: title.to_owned(),
            ..Track::default()
        }
    }

    #[test]
    fn collections_by_artist_and_year_album() {
        let mut mirror = Mirror::new();
        mirror.tracks.insert(track(1, 1, "Artist A", 2001, "X", "Song1"));
        mirror.tracks.insert(track(2, 1, "Artist A", 2001, "X", "Song2"));
        mirror.tracks.insert(track(3, 1, "Artist B", 1999, "Y", "Song3"));

        let guides = Guides {
            collections: vec![TrackKey::Artist, TrackKey::YearAlbum, TrackKey::Title],
            ..Guides::default()
        };
        let tree = guides.project(Domain::Collections, &mirror, &Filter::default());

        let labels: Vec<&str> = tree.root().children().iter().map(|n| n.label()).collect();
        assert_eq!(labels, ["Artist A (2)", "Artist B (1)"]);
        let album = tree.find(&["Artist A", "2001 - X"]).unwrap();
        assert_eq!(album.label(), "2001 - X (2)");
        assert_eq!(album.children().len(), 2);
    }

    #[test]
    fn year_albums_sort_by_year() {
        let mut mirror = Mirror::new();
        mirror.tracks.insert(track(1, 1, "A", 1999, "Zenith", "a"));
        mirror.tracks.insert(track(2, 1, "A", 800, "Chant", "b"));
        mirror.tracks.insert(track(3, 1, "A", 0, "Bootleg", "c"));

        let guides = Guides {
            collections: vec![TrackKey::YearAlbum, TrackKey::Title],
            ..Guides::default()
        };
        let tree = guides.project(Domain::Collections, &mirror, &Filter::default());

        let labels: Vec<&str> = tree.root().children().iter().map(|n| n.label()).collect();
        assert_eq!(labels, ["800 - Chant (1)", "1999 - Zenith (1)", "Bootleg (1)"]);
    }

    #[test]
    fn disabled_collections_are_hidden() {
        let mut mirror = Mirror::new();
        mirror.collections.insert(Collection {
            id: Id(1),
            name: "Local".to_owned(),
            ..Collection::default()
        });
        mirror.collections.insert(Collection {
            id: Id(2),
            name: "Archive".to_owned(),
            disabled: true,
            ..Collection::default()
        });
        mirror.tracks.insert(track(1, 1, "A", 0, "X", "kept"));
        mirror.tracks.insert(track(2, 2, "A", 0, "X", "hidden"));

        let tree = Guides::default().project(Domain::Collections, &mirror, &Filter::default());
        assert_eq!(tree.root().ids(), [Id(1)]);
    }

    #[test]
    fn playbar_orders_playlists_and_entries_by_position() {
        let mut mirror = Mirror::new();
        for (id, name, position, active) in [(1, "Evening", 1, false), (2, "Morning", 0, true)] {
            mirror.playlists.insert(Playlist {
                id: Id(id),
                name: name.to_owned(),
                position,
                open: true,
                active,
                ..Playlist::default()
            });
        }
        mirror.tracks.insert(track(7, 1, "Artist", 0, "", "Seven"));
        for (id, playlist_id, track_id, position) in [(10, 1, 7, 1), (11, 1, 8, 0), (12, 2, 7, 0)] {
            mirror.playlist_tracks.insert(PlaylistTrack {
                id: Id(id),
                playlist_id: Id(playlist_id),
                track_id: Id(track_id),
                position,
                played: false,
            });
        }
        // Orphaned entry of an unknown playlist.
        mirror.playlist_tracks.insert(PlaylistTrack {
            id: Id(13),
            playlist_id: Id(99),
            ..PlaylistTrack::default()
        });

        let tree = Guides::default().project(Domain::Playbar, &mirror, &Filter::default());
        let playlists: Vec<&str> = tree.root().children().iter().map(|n| n.label()).collect();
        assert_eq!(playlists, ["* Morning (1)", "Evening (2)"]);

        let evening = &tree.root().children()[1];
        let entries: Vec<&str> = evening.children().iter().map(|n| n.label()).collect();
        assert_eq!(entries, ["Track 8", "Seven - Artist"]);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn queue_marks_played_entries() {
        let mut mirror = Mirror::new();
        mirror.tracks.insert(track(1, 1, "", 0, "", "First"));
        mirror.queue_tracks.insert(QueueTrack {
            id: Id(5),
            track_id: Id(1),
            position: 0,
            played: true,
        });

        let tree = Guides::default().project(Domain::Queue, &mirror, &Filter::default());
        assert_eq!(tree.root().children()[0].label(), "✓ First");
    }

    #[test]
    fn queries_group_by_initial() {
        let mut mirror = Mirror::new();
        for (id, name) in [(1, "rock"), (2, "Rap"), (3, "jazz")] {
            mirror.queries.insert(Query {
                id: Id(id),
                name: name.to_owned(),
                ..Query::default()
            });
        }

        let tree = Guides::default().project(Domain::Queries, &mirror, &Filter::new("r"));
        let initials: Vec<&str> = tree.root().children().iter().map(|n| n.label()).collect();
        assert_eq!(initials, ["R (2)"]);
    }

    #[test]
    fn empty_guides_fall_back_to_defaults() {
        let guides = Guides {
            queue: Vec::new(),
            ..Guides::default()
        }
        .or_default();
        assert_eq!(guides.queue, [QueueKey::Track]);
    }
}
