use std::time::Duration;

use quaver::{
    config::Config,
    entity::{Collection, Id, Playlist, PlaylistTrack, Track},
    error::Error,
    events::Notification,
    protocol::{Domain, Event, Kind, Payload},
    sync::Client,
    transport::ChannelTransport,
};
use tokio::{sync::mpsc, time::timeout};

const DEADLINE: Duration = Duration::from_secs(5);

fn track(id: u64, artist: &str, title: &str) -> Track {
    Track {
        id: Id(id),
        collection_id: Id(1),
        artist: artist.to_owned(),
        album: "Album".to_owned(),
        year: 2001,
        title: title.to_owned(),
        ..Track::default()
    }
}

fn playlist(id: u64, name: &str) -> Playlist {
    Playlist {
        id: Id(id),
        name: name.to_owned(),
        open: true,
        ..Playlist::default()
    }
}

fn entry(id: u64, playlist_id: u64, track_id: u64, position: u32) -> PlaylistTrack {
    PlaylistTrack {
        id: Id(id),
        playlist_id: Id(playlist_id),
        track_id: Id(track_id),
        position,
        played: false,
    }
}

async fn until(rx: &mut mpsc::Receiver<Notification>, wanted: &Notification) {
    timeout(DEADLINE, async {
        while let Some(notification) = rx.recv().await {
            if &notification == wanted {
                return;
            }
        }
        panic!("notification queue closed");
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn collections_snapshot_then_live_updates() {
    let transport = ChannelTransport::new();
    let (mut client, mut rx) = Client::new(transport.clone(), &Config::default());

    let domain = Domain::Collections;
    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    client.subscribe(domain).await.unwrap();
    until(&mut rx, &Notification::Subscribed(domain)).await;

    transport
        .push(
            domain,
            Kind::SnapshotItem,
            Collection {
                id: Id(1),
                name: "Local".to_owned(),
                ..Collection::default()
            },
        )
        .unwrap();
    for (id, title) in [(1, "Song1"), (2, "Song2")] {
        transport
            .push(domain, Kind::SnapshotItem, track(id, "Artist A", title))
            .unwrap();
    }
    transport.push(domain, Kind::SnapshotEnd, Payload::None).unwrap();
    until(&mut rx, &Notification::TreeReady(domain)).await;

    let tree = client.tree(domain);
    assert_eq!(tree.root().label(), "Collections (2)");
    let album = tree.find(&["Artist A", "2001 - Album"]).unwrap();
    assert_eq!(album.ids(), [Id(1), Id(2)]);

    let mut trees = client.watch(domain);
    transport
        .push(domain, Kind::ItemRemoved, track(1, "Artist A", "Song1"))
        .unwrap();
    let tree = timeout(DEADLINE, trees.wait_for(|tree| tree.len() == 1))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(tree.root().ids(), [Id(2)]);

    client.unsubscribe(domain).await.unwrap();
    assert!(client.tree(domain).is_empty());
    assert!(client.inspect(domain, |mirror| mirror.is_empty()));
}

#[tokio::test]
async fn playlist_replacement_prunes_missing_entries() {
    let transport = ChannelTransport::new();
    let (mut client, mut rx) = Client::new(transport.clone(), &Config::default());

    let domain = Domain::Playbar;
    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    client.subscribe(domain).await.unwrap();

    transport
        .push(domain, Kind::SnapshotItem, playlist(1, "Mix"))
        .unwrap();
    for (id, track_id, position) in [(10, 100, 0), (11, 101, 1)] {
        transport
            .push(domain, Kind::SnapshotItem, entry(id, 1, track_id, position))
            .unwrap();
    }
    transport.push(domain, Kind::SnapshotEnd, Payload::None).unwrap();
    until(&mut rx, &Notification::TreeReady(domain)).await;
    assert_eq!(client.tree(domain).len(), 2);

    // Entry 11 is not part of the refreshed contents.
    transport
        .push(domain, Kind::OpenItems, playlist(1, "Mix"))
        .unwrap();
    transport
        .push(domain, Kind::OpenItemsItem, track(100, "Artist", "Hundred"))
        .unwrap();
    transport
        .push(domain, Kind::OpenItemsItem, entry(10, 1, 100, 0))
        .unwrap();
    transport
        .push(domain, Kind::OpenItemsItem, entry(12, 1, 102, 1))
        .unwrap();
    transport
        .push(domain, Kind::OpenItemsDone, playlist(1, "Mix"))
        .unwrap();

    let mut trees = client.watch(domain);
    let tree = timeout(
        DEADLINE,
        trees.wait_for(|tree| tree.root().ids() == [Id(10), Id(12)]),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    let mix = tree.find(&["Mix"]).unwrap();
    let labels: Vec<&str> = mix.children().iter().map(|n| n.label()).collect();
    assert_eq!(labels, ["Hundred - Artist", "Track 102"]);
    assert!(!client.inspect(domain, |mirror| mirror.playlist_tracks.contains(Id(11))));

    client.shutdown().await;
}

#[tokio::test]
async fn unfitting_events_are_dropped() {
    let transport = ChannelTransport::new();
    let (mut client, mut rx) = Client::new(transport.clone(), &Config::default());

    let domain = Domain::Queries;
    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    transport.push(domain, Kind::SnapshotEnd, Payload::None).unwrap();
    client.subscribe(domain).await.unwrap();

    // A payload of another domain, a foreign subscription, and a window
    // without a playlist are all dropped.
    transport
        .push(domain, Kind::ItemAdded, track(1, "A", "B"))
        .unwrap();
    let mut foreign = Event::new(domain, "someone-else", Kind::ItemAdded);
    foreign.payload = quaver::entity::Query {
        id: Id(9),
        name: "foreign".to_owned(),
        ..Default::default()
    }
    .into();
    transport.push_event(domain, foreign).unwrap();
    transport
        .push(domain, Kind::OpenItemsDone, Payload::None)
        .unwrap();

    transport
        .push(
            domain,
            Kind::ItemAdded,
            quaver::entity::Query {
                id: Id(1),
                name: "kept".to_owned(),
                ..Default::default()
            },
        )
        .unwrap();

    let mut trees = client.watch(domain);
    let tree = timeout(DEADLINE, trees.wait_for(|tree| !tree.is_empty()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(tree.root().ids(), [Id(1)]);
    assert!(client.is_subscribed(domain));

    client.unsubscribe(domain).await.unwrap();
    until(&mut rx, &Notification::Unsubscribed(domain)).await;
}

#[tokio::test]
async fn transport_error_ends_the_stream() {
    let transport = ChannelTransport::new();
    let (mut client, mut rx) = Client::new(transport.clone(), &Config::default());

    let domain = Domain::Queue;
    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    client.subscribe(domain).await.unwrap();
    transport
        .fail(domain, Error::unavailable("connection reset"))
        .unwrap();

    let ended = timeout(DEADLINE, async {
        loop {
            match rx.recv().await {
                Some(Notification::StreamEnded { domain: ended, error }) if ended == domain => {
                    break error;
                }
                Some(_) => {}
                None => panic!("notification queue closed"),
            }
        }
    })
    .await
    .unwrap();
    assert!(ended.unwrap().contains("connection reset"));

    // The session layer resubscribes on its own.
    let id = transport.subscription_id(domain);
    client.unsubscribe(domain).await.unwrap();
    assert_eq!(transport.unsubscribed(), [(domain, id)]);

    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    client.resubscribe(domain).await.unwrap();
    assert!(client.is_subscribed(domain));
    assert_eq!(
        client.subscription_id(domain),
        Some(transport.subscription_id(domain).as_str())
    );
    client.shutdown().await;
}

async fn until_applied<F>(client: &Client<ChannelTransport>, domain: Domain, applied: F)
where
    F: Fn(&quaver::mirror::Mirror) -> bool,
{
    timeout(DEADLINE, async {
        while !client.inspect(domain, &applied) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn no_tree_is_published_while_a_window_is_open() {
    let transport = ChannelTransport::new();
    let (mut client, mut rx) = Client::new(transport.clone(), &Config::default());

    let domain = Domain::Playbar;
    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    client.subscribe(domain).await.unwrap();
    transport
        .push(domain, Kind::SnapshotItem, playlist(1, "Mix"))
        .unwrap();
    transport
        .push(domain, Kind::SnapshotItem, entry(10, 1, 100, 0))
        .unwrap();
    transport
        .push(domain, Kind::SnapshotItem, entry(11, 1, 101, 1))
        .unwrap();
    transport.push(domain, Kind::SnapshotEnd, Payload::None).unwrap();
    until(&mut rx, &Notification::TreeReady(domain)).await;

    let mut trees = client.watch(domain);
    let before = trees.borrow_and_update().clone();
    assert_eq!(before.root().ids(), [Id(10), Id(11)]);

    transport
        .push(domain, Kind::OpenItems, playlist(1, "Mix"))
        .unwrap();
    transport
        .push(domain, Kind::OpenItemsItem, track(100, "Artist", "Hundred"))
        .unwrap();
    transport
        .push(domain, Kind::OpenItemsItem, entry(10, 1, 100, 0))
        .unwrap();
    transport
        .push(domain, Kind::OpenItemsItem, entry(12, 1, 102, 1))
        .unwrap();
    until_applied(&client, domain, |mirror| {
        mirror.playlist_tracks.contains(Id(12))
    })
    .await;

    // Neither the consumer nor a filter change may expose the partial
    // contents, which still hold entry 11.
    client.set_filter(domain, "hundred");
    assert!(!trees.has_changed().unwrap());
    assert_eq!(client.tree(domain).root().ids(), [Id(10), Id(11)]);

    transport
        .push(domain, Kind::OpenItemsDone, playlist(1, "Mix"))
        .unwrap();
    timeout(DEADLINE, trees.changed()).await.unwrap().unwrap();
    let after = trees.borrow_and_update().clone();
    assert_eq!(after.root().ids(), [Id(10)]);
    assert!(!client.inspect(domain, |mirror| mirror.playlist_tracks.contains(Id(11))));

    client.shutdown().await;
}

#[tokio::test]
async fn filter_set_while_loading_applies_at_snapshot_end() {
    let transport = ChannelTransport::new();
    let (mut client, _rx) = Client::new(transport.clone(), &Config::default());

    let domain = Domain::Collections;
    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    client.subscribe(domain).await.unwrap();
    for (id, artist) in [(1, "Alpha"), (2, "Bravo")] {
        transport
            .push(domain, Kind::SnapshotItem, track(id, artist, "Song"))
            .unwrap();
    }
    until_applied(&client, domain, |mirror| mirror.tracks.len() == 2).await;

    let mut trees = client.watch(domain);
    trees.borrow_and_update();
    client.set_filter(domain, "bravo");
    assert!(!trees.has_changed().unwrap());
    assert!(client.tree(domain).is_empty());

    transport.push(domain, Kind::SnapshotEnd, Payload::None).unwrap();
    timeout(DEADLINE, trees.changed()).await.unwrap().unwrap();
    assert_eq!(trees.borrow().root().ids(), [Id(2)]);

    client.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn latest_filter_wins_over_concurrent_rebuilds() {
    let transport = ChannelTransport::new();
    let (mut client, _rx) = Client::new(transport.clone(), &Config::default());

    let domain = Domain::Queries;
    transport.push(domain, Kind::SnapshotStart, Payload::None).unwrap();
    transport.push(domain, Kind::SnapshotEnd, Payload::None).unwrap();
    client.subscribe(domain).await.unwrap();

    let query = |id: u64| quaver::entity::Query {
        id: Id(id),
        name: if id % 2 == 0 { "even" } else { "odd" }.to_owned(),
        ..Default::default()
    };

    // Rebuilds of the consumer race the rebuilds of the filter changes.
    for id in 1..=200 {
        transport.push(domain, Kind::ItemAdded, query(id)).unwrap();
        client.set_filter(domain, if id % 2 == 0 { "odd" } else { "even" });
    }

    client.set_filter(domain, "");
    transport.push(domain, Kind::ItemAdded, query(201)).unwrap();
    let mut trees = client.watch(domain);
    timeout(DEADLINE, trees.wait_for(|tree| tree.len() == 201))
        .await
        .unwrap()
        .unwrap();

    client.set_filter(domain, "even");
    tokio::time::sleep(Duration::from_millis(20)).await;
    let tree = client.tree(domain);
    assert_eq!(tree.len(), 100);
    assert!(tree.root().ids().iter().all(|id| id.0 % 2 == 0));

    client.shutdown().await;
}
