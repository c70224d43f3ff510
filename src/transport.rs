//! The seam to the wire: opening and closing a domain's event stream.
//!
//! The engine treats a transport as an opaque, ordered channel of typed
//! [`Event`]s per [`Domain`]. An `Err` item on a stream means the stream is
//! broken (dropped connection, undecodable frame) and ends consumption.
//!
//! Two transports are provided:
//! * [`ChannelTransport`]: in-memory feeds that an RPC adapter or a test
//!   pushes events into.
//! * [`ReplayTransport`]: replays recorded streams from JSON-lines files.

use std::{
    collections::HashMap,
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use futures_util::{
    future,
    stream::{self, BoxStream},
    StreamExt,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    protocol::{self, Domain, Event, Kind, Payload},
};

/// An ordered stream of events of one domain.
pub type EventStream = BoxStream<'static, Result<Event>>;

/// Opens and closes server-pushed event streams.
pub trait Transport: Send + Sync + 'static {
    /// Issues the server-push request for `domain`.
    ///
    /// The server assigns the subscription identifier, which is carried by
    /// every event of the returned stream.
    fn subscribe(&self, domain: Domain) -> impl Future<Output = Result<EventStream>> + Send;

    /// Asks the server to stop pushing events of `domain`.
    ///
    /// `subscription_id` is echoed verbatim from the stream's events, and is
    /// empty when no event was ever received. Closing an unknown or already
    /// closed subscription must succeed.
    fn unsubscribe(
        &self,
        domain: Domain,
        subscription_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug)]
struct Feed {
    subscription_id: String,
    tx: Option<mpsc::UnboundedSender<Result<Event>>>,
    rx: Option<mpsc::UnboundedReceiver<Result<Event>>>,
}

impl Feed {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            subscription_id: Uuid::new_v4().to_string(),
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    fn send(&self, domain: Domain, item: Result<Event>) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::unavailable(format!("{domain} feed closed")))?;
        tx.send(item)
            .map_err(|_| Error::unavailable(format!("{domain} subscriber went away")))
    }
}

/// In-memory transport with one feed per domain.
///
/// Events pushed before a subscription is opened are buffered and delivered
/// once it is, even when the feed was closed in the meantime. Each feed has a fresh UUID v4 subscription identifier; after
/// an unsubscribe, the next push or subscribe starts a new feed.
#[derive(Clone, Debug, Default)]
pub struct ChannelTransport {
    feeds: Arc<Mutex<HashMap<Domain, Feed>>>,
    unsubscribed: Arc<Mutex<Vec<(Domain, String)>>>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_feed<F, R>(&self, domain: Domain, f: F) -> R
    where
        F: FnOnce(&mut Feed) -> R,
    {
        let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        f(feeds.entry(domain).or_insert_with(Feed::new))
    }

    /// The subscription identifier of the current feed of `domain`.
    #[must_use]
    pub fn subscription_id(&self, domain: Domain) -> String {
        self.with_feed(domain, |feed| feed.subscription_id.clone())
    }

    /// Pushes an event of `kind` onto the feed of `domain`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the subscriber went away.
    pub fn push(&self, domain: Domain, kind: Kind, payload: impl Into<Payload>) -> Result<()> {
        let payload = payload.into();
        self.with_feed(domain, |feed| {
            let event = Event::new(domain, feed.subscription_id.clone(), kind).with_payload(payload);
            feed.send(domain, Ok(event))
        })
    }

    /// Pushes a raw event, without stamping domain or subscription.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the subscriber went away.
    pub fn push_event(&self, domain: Domain, event: Event) -> Result<()> {
        self.with_feed(domain, |feed| feed.send(domain, Ok(event)))
    }

    /// Breaks the feed of `domain` with a transport error.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the subscriber went away.
    pub fn fail(&self, domain: Domain, error: Error) -> Result<()> {
        self.with_feed(domain, |feed| feed.send(domain, Err(error)))
    }

    /// Ends the feed of `domain`, as if the server closed the stream.
    ///
    /// Events pushed before are still delivered; pushing afterwards fails
    /// until the feed is unsubscribed.
    pub fn close(&self, domain: Domain) {
        self.with_feed(domain, |feed| {
            if feed.tx.take().is_some() {
                debug!("{domain} feed closed");
            }
        });
    }

    /// Every unsubscribe request received so far, in order.
    #[must_use]
    pub fn unsubscribed(&self) -> Vec<(Domain, String)> {
        self.unsubscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Transport for ChannelTransport {
    async fn subscribe(&self, domain: Domain) -> Result<EventStream> {
        let rx = self
            .with_feed(domain, |feed| feed.rx.take())
            .ok_or_else(|| Error::already_exists(format!("{domain} feed already subscribed")))?;

        let stream = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        Ok(stream.boxed())
    }

    async fn unsubscribe(&self, domain: Domain, subscription_id: &str) -> Result<()> {
        self.unsubscribed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((domain, subscription_id.to_owned()));

        let mut feeds = self.feeds.lock().unwrap_or_else(PoisonError::into_inner);
        match feeds.get(&domain) {
            Some(feed) if feed.subscription_id == subscription_id => {
                feeds.remove(&domain);
                debug!("{domain} feed {subscription_id} unsubscribed");
            }
            _ => trace!("{domain}: no feed with subscription id `{subscription_id}`"),
        }
        Ok(())
    }
}

/// Replays recorded streams: `<dir>/<domain>.jsonl` holds one JSON event
/// per line. Blank lines and JSON lines that are not events are skipped; a
/// line that is not JSON ends the stream with `DataLoss`.
#[derive(Clone, Debug)]
pub struct ReplayTransport {
    dir: PathBuf,
}

impl ReplayTransport {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn path(&self, domain: Domain) -> PathBuf {
        self.dir.join(format!("{domain}.jsonl"))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Transport for ReplayTransport {
    async fn subscribe(&self, domain: Domain) -> Result<EventStream> {
        let path = self.path(domain);
        let contents = tokio::fs::read_to_string(&path).await?;
        debug!("replaying {}", path.display());

        let origin = path.display().to_string();
        let frames: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();

        // Frames that are JSON but not events are skipped inside `json`;
        // anything else breaks the stream.
        let events = stream::iter(frames).filter_map(move |frame| {
            future::ready(protocol::json::<Event>(&frame, &origin).transpose())
        });
        Ok(events.boxed())
    }

    async fn unsubscribe(&self, domain: Domain, subscription_id: &str) -> Result<()> {
        trace!("{domain}: replay of `{subscription_id}` needs no unsubscribe");
        Ok(())
    }
}
