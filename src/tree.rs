//! Hierarchical projection of a mirror.
//!
//! A [`Guide`] lists one grouping key per tree level. [`materialize`] walks
//! every leaf row once, computes its [`Label`] at each level, and inserts it
//! under a child node per distinct label, reusing nodes through a label
//! index. The leaf's ID is attached to the deepest node. Afterwards every
//! level is sorted and the aggregated ID lists are computed bottom-up.
//!
//! Trees are never patched: any relevant change rebuilds the whole tree. A
//! single leaf's change can move it to another branch, and every ancestor's
//! count and ID list would have to be invalidated along with it.
//!
//! Filtering happens before insertion. A row is kept when every token of
//! the [`Filter`] is a substring of the row's keywords, so ancestors of
//! filtered rows shrink or disappear.

use std::{cmp::Ordering, collections::HashMap, fmt, str::FromStr};

use crate::{entity::Id, error::Error};

/// The grouping label of a row at one level.
///
/// Labels carrying an order sort numerically before labels without one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label {
    pub text: String,

    /// Primary and secondary numeric sort keys, e.g. disc and track number.
    pub order: Option<(i64, i64)>,
}

impl Label {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            order: None,
        }
    }

    #[must_use]
    pub fn ordered(text: impl Into<String>, primary: i64, secondary: i64) -> Self {
        Self {
            text: text.into(),
            order: Some((primary, secondary)),
        }
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.order, other.order) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.text.cmp(&other.text)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.text.cmp(&other.text),
        }
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A row that ends up as a leaf of a tree.
pub trait Leaf {
    /// ID attached to the deepest node the row is grouped under.
    fn id(&self) -> Id;

    /// Lowercase, space-joined searchable fields of the row.
    ///
    /// Computed once per row and materialization pass.
    fn keywords(&self) -> String;
}

/// A grouping key: computes the label of a row at one level.
pub trait GroupKey<R> {
    fn label(&self, row: &R) -> Label;
}

/// Ordered grouping keys, one per tree level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Guide<K> {
    levels: Vec<K>,
}

impl<K> Guide<K> {
    #[must_use]
    pub fn new(levels: Vec<K>) -> Self {
        Self { levels }
    }

    #[must_use]
    pub fn levels(&self) -> &[K] {
        &self.levels
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Joins searchable fields into a keyword string.
///
/// Empty fields are skipped; the result is lowercase.
#[must_use]
pub fn keywords<'a, I>(fields: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut joined = String::new();
    for field in fields.into_iter().map(str::trim).filter(|f| !f.is_empty()) {
        if !joined.is_empty() {
            joined.push(' ');
        }
        joined.push_str(&field.to_lowercase());
    }
    joined
}

/// Whitespace-separated search tokens, matched as lowercase substrings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    tokens: Vec<String>,
}

impl Filter {
    #[must_use]
    pub fn new(query: &str) -> Self {
        Self {
            tokens: query.split_whitespace().map(str::to_lowercase).collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Whether every token occurs in `keywords`. An empty filter matches
    /// everything.
    #[must_use]
    pub fn matches(&self, keywords: &str) -> bool {
        self.tokens.iter().all(|token| keywords.contains(token.as_str()))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

/// One node of a materialized tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    key: Label,
    label: String,
    ids: Vec<Id>,
    keywords: String,
    children: Vec<Node>,
}

impl Node {
    /// Display label. Nodes with children carry a `(count)` suffix.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Grouping label, without count suffix.
    #[must_use]
    pub fn key(&self) -> &Label {
        &self.key
    }

    /// Sorted IDs of all leaves beneath (or at) this node.
    #[must_use]
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Keywords of the rows attached to this node; empty for branches.
    #[must_use]
    pub fn keywords(&self) -> &str {
        &self.keywords
    }

    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Resolves a path of grouping labels below this node.
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((first, rest)) => self
                .children
                .iter()
                .find(|child| child.key.text == *first)?
                .find(rest),
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{}", "", self.label, indent = depth * 2)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

/// A materialized tree, rooted at a node labelled with the domain title.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    root: Node,
}

impl Tree {
    /// A tree without leaves.
    #[must_use]
    pub fn empty(title: &str) -> Self {
        Self {
            root: Builder::new(Label::new(title)).finish(true),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Number of leaf IDs in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.root.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.ids.is_empty()
    }

    /// Resolves a path of grouping labels from the root, e.g.
    /// `["Artist A", "2001 - X"]`.
    #[must_use]
    pub fn find(&self, path: &[&str]) -> Option<&Node> {
        self.root.find(path)
    }
}

impl fmt::Display for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.write_indented(f, 0)
    }
}

struct Builder {
    key: Label,
    ids: Vec<Id>,
    keywords: Vec<String>,
    children: Vec<Builder>,
    index: HashMap<Label, usize>,
}

impl Builder {
    fn new(key: Label) -> Self {
        Self {
            key,
            ids: Vec::new(),
            keywords: Vec::new(),
            children: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn child(&mut self, key: Label) -> &mut Builder {
        let slot = match self.index.get(&key) {
            Some(&slot) => slot,
            None => {
                let slot = self.children.len();
                self.index.insert(key.clone(), slot);
                self.children.push(Builder::new(key));
                slot
            }
        };
        &mut self.children[slot]
    }

    fn finish(self, root: bool) -> Node {
        let mut children: Vec<Node> = self
            .children
            .into_iter()
            .map(|child| child.finish(false))
            .collect();
        children.sort_by(|a, b| a.key.cmp(&b.key));

        let mut ids = self.ids;
        for child in &children {
            ids.extend_from_slice(&child.ids);
        }
        ids.sort_unstable();
        ids.dedup();

        let label = if children.is_empty() && !root {
            self.key.text.clone()
        } else {
            format!("{} ({})", self.key.text, ids.len())
        };

        Node {
            key: self.key,
            label,
            ids,
            keywords: self.keywords.join(" "),
            children,
        }
    }
}

/// Builds a tree from `rows`, grouped by `guide` and pruned by `filter`.
///
/// The root is labelled `title` and always carries a count suffix.
pub fn materialize<R, K, I>(title: &str, rows: I, guide: &Guide<K>, filter: &Filter) -> Tree
where
    R: Leaf,
    K: GroupKey<R>,
    I: IntoIterator<Item = R>,
{
    let mut root = Builder::new(Label::new(title));
    let mut skipped = 0_usize;

    for row in rows {
        let keywords = row.keywords();
        if !filter.matches(&keywords) {
            skipped += 1;
            continue;
        }

        let mut node = &mut root;
        for level in guide.levels() {
            node = node.child(level.label(&row));
        }
        node.ids.push(row.id());
        node.keywords.push(keywords);
    }

    let tree = Tree {
        root: root.finish(true),
    };
    trace!(
        "{title}: materialized {} leaves, {skipped} filtered",
        tree.len()
    );
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    struct Song {
        id: u64,
        artist: String,
        album: String,
        title: String,
        number: Option<i64>,
    }

    impl Leaf for Song {
        fn id(&self) -> Id {
            Id(self.id)
        }

        fn keywords(&self) -> String {
            keywords([self.artist.as_str(), self.album.as_str(), self.title.as_str()])
        }
    }

    #[derive(Clone, Copy, Debug)]
    enum SongKey {
        Artist,
        Album,
        Title,
    }

    impl GroupKey<Song> for SongKey {
        fn label(&self, row: &Song) -> Label {
            match self {
                Self::Artist => Label::new(&row.artist),
                Self::Album => Label::new(&row.album),
                Self::Title => match row.number {
                    Some(number) => Label::ordered(&row.title, 0, number),
                    None => Label::new(&row.title),
                },
            }
        }
    }

    fn song(id: u64, artist: &str, album: &str, title: &str) -> Song {
        Song {
            id,
            artist: artist.to_owned(),
            album: album.to_owned(),
            title: title.to_owned(),
            number: None,
        }
    }

    fn guide() -> Guide<SongKey> {
        Guide::new(vec![SongKey::Artist, SongKey::Album, SongKey::Title])
    }

    fn check_aggregates(node: &Node) {
        if node.is_leaf() {
            return;
        }
        let mut union: Vec<Id> = node
            .children()
            .iter()
            .flat_map(|child| child.ids().iter().copied())
            .collect();
        union.sort_unstable();
        union.dedup();
        assert_eq!(node.ids(), union.as_slice());
        assert!(node.label().ends_with(&format!("({})", node.ids().len())));
        node.children().iter().for_each(check_aggregates);
    }

    #[test]
    fn groups_by_guide_levels() {
        let rows = vec![
            song(1, "Artist A", "2001 - X", "Song1"),
            song(2, "Artist A", "2001 - X", "Song2"),
            song(3, "Artist B", "1999 - Y", "Song3"),
        ];
        let tree = materialize("Collections", rows, &guide(), &Filter::default());

        let root = tree.root();
        assert_eq!(root.label(), "Collections (3)");
        let labels: Vec<&str> = root.children().iter().map(Node::label).collect();
        assert_eq!(labels, ["Artist A (2)", "Artist B (1)"]);

        let artist_a = &root.children()[0];
        assert_eq!(artist_a.children().len(), 1);
        let album = &artist_a.children()[0];
        assert_eq!(album.label(), "2001 - X (2)");

        let leaves: Vec<&str> = album.children().iter().map(Node::label).collect();
        assert_eq!(leaves, ["Song1", "Song2"]);
        assert!(album.children().iter().all(Node::is_leaf));
        assert_eq!(album.children()[0].keywords(), "artist a 2001 - x song1");
        check_aggregates(root);
    }

    #[test]
    fn numeric_order_precedes_labels() {
        let mut rows = vec![
            song(1, "A", "X", "zeta"),
            song(2, "A", "X", "alpha"),
            song(3, "A", "X", "beta"),
            song(4, "A", "X", "gamma"),
        ];
        rows[0].number = Some(2);
        rows[1].number = Some(10);
        rows[2].number = Some(1);

        let tree = materialize("t", rows, &guide(), &Filter::default());
        let album = tree.find(&["A", "X"]).unwrap();
        let titles: Vec<&str> = album.children().iter().map(Node::label).collect();
        assert_eq!(titles, ["beta", "zeta", "alpha", "gamma"]);
    }

    #[test]
    fn filter_prunes_branches() {
        let rows = vec![
            song(1, "Artist A", "2001 - X", "Song1"),
            song(2, "Artist A", "2001 - X", "Song2"),
            song(3, "Artist B", "1999 - Y", "Song3"),
        ];
        let tree = materialize("t", rows, &guide(), &Filter::new("ARTIST song2"));

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root().children().len(), 1);
        assert_eq!(tree.root().children()[0].label(), "Artist A (1)");
        assert!(tree.find(&["Artist B"]).is_none());
    }

    #[test]
    fn duplicate_leaf_labels_share_a_node() {
        let rows = vec![song(1, "A", "X", "Intro"), song(2, "A", "X", "Intro")];
        let tree = materialize("t", rows, &guide(), &Filter::default());
        let intro = tree.find(&["A", "X", "Intro"]).unwrap();
        assert!(intro.is_leaf());
        assert_eq!(intro.label(), "Intro");
        assert_eq!(intro.ids(), [Id(1), Id(2)]);
    }

    #[test]
    fn empty_tree_has_zero_count() {
        let tree = Tree::empty("Queue");
        assert!(tree.is_empty());
        assert_eq!(tree.root().label(), "Queue (0)");
        assert_eq!(tree.to_string(), "Queue (0)\n");
    }

    #[test]
    fn keywords_skip_empty_fields() {
        assert_eq!(keywords(["Foo", "", "  Bar "]), "foo bar");
    }

    fn arb_songs() -> impl Strategy<Value = Vec<Song>> {
        prop::collection::vec(
            (
                1u64..200,
                "[ab]",
                "[xy]",
                "[a-c]{1,3}",
                prop::option::of(0i64..5),
            ),
            0..40,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .map(|(id, artist, album, title, number)| Song {
                    id,
                    artist,
                    album,
                    title,
                    number,
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn aggregates_are_unions_of_children(rows in arb_songs()) {
            let tree = materialize("t", rows, &guide(), &Filter::default());
            check_aggregates(tree.root());
        }

        #[test]
        fn narrowing_never_grows(rows in arb_songs(), first in "[a-c]{0,2}", second in "[a-cxy]{1,2}") {
            let broad = materialize("t", rows.clone(), &guide(), &Filter::new(&first));
            let narrow = materialize(
                "t",
                rows,
                &guide(),
                &Filter::new(&format!("{first} {second}")),
            );
            prop_assert!(narrow.len() <= broad.len());
        }
    }
}
