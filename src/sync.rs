//! Subscription lifecycle and the per-domain consumer tasks.
//!
//! A [`Client`] owns one [`Shared`] state per domain: the reducer with its
//! mirror, the filter, and a `watch` channel holding the latest tree. All
//! mirror access goes through the domain's mutex, which is held for one
//! event's apply or one materialization pass and never across an `.await`.
//!
//! Opening a subscription blocks only until the stream's first event has
//! been received, which carries the subscription identifier. The rest of
//! the stream is consumed by a spawned task. That task rebuilds the tree
//! when the stream goes idle after a change, so a burst of events costs one
//! rebuild, and then notifies the rendering context through a queue.
//! Rebuilds are held back while a snapshot is loading or a replacement
//! window is open.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures_util::{FutureExt, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::Config,
    error::{Error, Result},
    events::Notification,
    guides::Guides,
    mirror::Mirror,
    protocol::{Domain, Event},
    reducer::{Outcome, Reducer},
    transport::{EventStream, Transport},
    tree::{Filter, Tree},
};

#[derive(Debug)]
struct State {
    reducer: Reducer,
    filter: Filter,
}

/// Synchronization state of one domain, shared between the client and the
/// domain's consumer task.
#[derive(Debug)]
struct Shared {
    domain: Domain,
    guides: Arc<Guides>,
    state: Mutex<State>,
    tree: watch::Sender<Arc<Tree>>,
    notifications: mpsc::Sender<Notification>,
}

impl Shared {
    fn new(
        domain: Domain,
        guides: Arc<Guides>,
        filter: Filter,
        notifications: mpsc::Sender<Notification>,
    ) -> Self {
        let (tree, _) = watch::channel(Arc::new(Tree::empty(domain.title())));
        Self {
            domain,
            guides,
            state: Mutex::new(State {
                reducer: Reducer::new(domain),
                filter,
            }),
            tree,
            notifications,
        }
    }

    // Events are validated before they are applied, so the state behind a
    // poisoned lock is still consistent.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, event: Event) -> Result<Outcome> {
        trace!("applying {event}");
        self.lock().reducer.apply(event)
    }

    fn is_settled(&self) -> bool {
        self.lock().reducer.is_settled()
    }

    /// Rebuilds and publishes the tree, unless a snapshot is loading or a
    /// replacement window is open. Returns whether a tree was published.
    ///
    /// The tree is sent before the lock is released, so a tree built from an
    /// older mirror or filter never replaces a newer one.
    fn publish(&self) -> bool {
        let leaves = {
            let state = self.lock();
            if !state.reducer.is_settled() {
                return false;
            }
            let tree = self
                .guides
                .project(self.domain, state.reducer.mirror(), &state.filter);
            let leaves = tree.len();
            self.tree.send_replace(Arc::new(tree));
            leaves
        };

        debug!("{}: published tree with {leaves} leaves", self.domain);
        self.notify(Notification::TreeReady(self.domain));
        true
    }

    fn set_filter(&self, filter: Filter) -> bool {
        {
            let mut state = self.lock();
            if state.filter == filter {
                return false;
            }
            state.filter = filter;
        }
        self.publish()
    }

    fn reset(&self) {
        {
            let mut state = self.lock();
            state.reducer.reset();
            self.tree
                .send_replace(Arc::new(Tree::empty(self.domain.title())));
        }
        self.notify(Notification::TreeReady(self.domain));
    }

    fn notify(&self, notification: Notification) {
        // The rendering context fetches the latest tree on its own schedule;
        // a full queue already holds a notification that will make it do so.
        if let Err(e) = self.notifications.try_send(notification) {
            trace!("{}: notification not queued: {e}", self.domain);
        }
    }
}

/// A live subscription: the identifier echoed by the server, and the task
/// consuming the rest of the stream.
#[derive(Debug)]
struct Subscription {
    id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// The client-side synchronization engine of all domains.
#[derive(Debug)]
pub struct Client<T> {
    transport: Arc<T>,
    domains: HashMap<Domain, Arc<Shared>>,
    subscriptions: HashMap<Domain, Subscription>,
}

impl<T: Transport> Client<T> {
    /// Creates a client and the queue on which it notifies the rendering
    /// context.
    #[must_use]
    pub fn new(transport: T, config: &Config) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(config.notification_capacity.max(1));
        let guides = Arc::new(config.guides.clone().or_default());
        let filter = Filter::new(&config.filter);

        let domains = Domain::ALL
            .into_iter()
            .map(|domain| {
                let shared = Shared::new(domain, Arc::clone(&guides), filter.clone(), tx.clone());
                (domain, Arc::new(shared))
            })
            .collect();

        let client = Self {
            transport: Arc::new(transport),
            domains,
            subscriptions: HashMap::new(),
        };
        (client, rx)
    }

    fn shared(&self, domain: Domain) -> &Arc<Shared> {
        // Every domain is populated in `new`.
        &self.domains[&domain]
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether `domain` has a subscription whose consumer task is running.
    #[must_use]
    pub fn is_subscribed(&self, domain: Domain) -> bool {
        self.subscriptions
            .get(&domain)
            .is_some_and(|subscription| !subscription.task.is_finished())
    }

    /// The subscription identifier of `domain`, as assigned by the server.
    #[must_use]
    pub fn subscription_id(&self, domain: Domain) -> Option<&str> {
        self.subscriptions
            .get(&domain)
            .map(|subscription| subscription.id.as_str())
    }

    /// Opens the stream of `domain`.
    ///
    /// Returns once the first event has been received and applied. Calling
    /// this on a live subscription does nothing; a subscription whose stream
    /// has ended is torn down and opened again.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot open the stream, or if the
    /// stream fails or ends before its first event. There is no retry.
    pub async fn subscribe(&mut self, domain: Domain) -> Result<()> {
        if self.is_subscribed(domain) {
            debug!("{domain}: already subscribed");
            return Ok(());
        }
        if self.subscriptions.contains_key(&domain) {
            debug!("{domain}: stream ended earlier; subscribing again");
            self.unsubscribe(domain).await?;
        }

        let mut stream = self.transport.subscribe(domain).await?;
        let first = match stream.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(e),
            None => {
                return Err(Error::unavailable(format!(
                    "{domain} stream closed before its first event"
                )))
            }
        };

        let shared = Arc::clone(self.shared(domain));
        let id = first.subscription_id.clone();
        info!("{domain}: subscribed as `{id}`");

        let dirty = match shared.apply(first) {
            Ok(outcome) => outcome.is_changed(),
            Err(e) => {
                warn!("{domain}: dropping event: {e}");
                false
            }
        };

        shared.notify(Notification::Subscribed(domain));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(consume(
            Arc::clone(&shared),
            stream,
            id.clone(),
            cancel.clone(),
            dirty,
        ));

        self.subscriptions
            .insert(domain, Subscription { id, cancel, task });
        Ok(())
    }

    /// Closes the stream of `domain` and clears its mirror.
    ///
    /// The server is asked to unsubscribe even when no event was ever
    /// received, in which case the identifier is empty. The consumer task
    /// is not aborted: it finishes the event at hand, observes the
    /// cancellation at its next receive, and is joined before this returns.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the server could not be asked to
    /// unsubscribe a live subscription. The local teardown completes
    /// regardless.
    pub async fn unsubscribe(&mut self, domain: Domain) -> Result<()> {
        let subscription = self.subscriptions.remove(&domain);
        let id = subscription
            .as_ref()
            .map(|subscription| subscription.id.clone())
            .unwrap_or_default();

        let result = match self.transport.unsubscribe(domain, &id).await {
            Err(e) if id.is_empty() => {
                debug!("{domain}: ignoring unsubscribe error without subscription: {e}");
                Ok(())
            }
            result => result,
        };

        if let Some(Subscription { cancel, task, .. }) = subscription {
            cancel.cancel();
            if let Err(e) = task.await.map_err(Error::from) {
                error!("{domain}: consumer task failed: {e}");
            }
            info!("{domain}: unsubscribed `{id}`");
        }

        let shared = self.shared(domain);
        shared.reset();
        shared.notify(Notification::Unsubscribed(domain));
        result
    }

    /// Closes and reopens the stream of `domain`, for a full resync.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be opened again.
    pub async fn resubscribe(&mut self, domain: Domain) -> Result<()> {
        if let Err(e) = self.unsubscribe(domain).await {
            warn!("{domain}: {e}");
        }
        self.subscribe(domain).await
    }

    /// Unsubscribes every domain.
    pub async fn shutdown(&mut self) {
        for domain in Domain::ALL {
            if let Err(e) = self.unsubscribe(domain).await {
                warn!("{domain}: {e}");
            }
        }
    }

    /// The latest materialized tree of `domain`.
    #[must_use]
    pub fn tree(&self, domain: Domain) -> Arc<Tree> {
        self.shared(domain).tree.borrow().clone()
    }

    /// A receiver that observes every tree published for `domain`.
    #[must_use]
    pub fn watch(&self, domain: Domain) -> watch::Receiver<Arc<Tree>> {
        self.shared(domain).tree.subscribe()
    }

    /// Sets the filter of `domain` and rebuilds its tree.
    ///
    /// While a snapshot is loading or a replacement window is open, the
    /// filter takes effect with the next rebuild instead.
    pub fn set_filter(&self, domain: Domain, filter: &str) {
        let filter = Filter::new(filter);
        debug!("{domain}: filter set to `{filter}`");
        self.shared(domain).set_filter(filter);
    }

    /// Runs `f` against the mirror of `domain`, under the domain's lock.
    pub fn inspect<F, R>(&self, domain: Domain, f: F) -> R
    where
        F: FnOnce(&Mirror) -> R,
    {
        f(self.shared(domain).lock().reducer.mirror())
    }
}

/// Consumes a domain's stream until it ends, fails or is cancelled.
async fn consume(
    shared: Arc<Shared>,
    mut stream: EventStream,
    subscription_id: String,
    cancel: CancellationToken,
    mut dirty: bool,
) {
    let domain = shared.domain;
    let mut error = None;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Rebuild once the stream has no more events ready.
        let next = if dirty && shared.is_settled() {
            if let Some(next) = stream.next().now_or_never() {
                next
            } else {
                shared.publish();
                dirty = false;
                continue;
            }
        } else {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = stream.next() => next,
            }
        };

        match next {
            Some(Ok(event)) => {
                if event.subscription_id != subscription_id {
                    warn!(
                        "{domain}: dropping event of subscription `{}`",
                        event.subscription_id
                    );
                    continue;
                }

                match shared.apply(event) {
                    Ok(outcome) => dirty |= outcome.is_changed(),
                    Err(e) => warn!("{domain}: dropping event: {e}"),
                }
            }
            Some(Err(e)) => {
                error!("{domain}: stream failed: {e}");
                error = Some(e.to_string());
                break;
            }
            None => {
                debug!("{domain}: stream closed by server");
                break;
            }
        }
    }

    if dirty {
        shared.publish();
    }

    if cancel.is_cancelled() {
        debug!("{domain}: consumer stopped");
    } else if shared
        .notifications
        .send(Notification::StreamEnded { domain, error })
        .await
        .is_err()
    {
        trace!("{domain}: rendering context went away");
    }
}
