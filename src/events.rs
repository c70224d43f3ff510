//! Notifications sent from the consumer tasks to the rendering context.
//!
//! Trees are never pushed through this queue. A [`Notification::TreeReady`]
//! only says that a newer tree can be fetched with
//! [`crate::sync::Client::tree`]; several updates in a row may be observed
//! as one.
//!
//! # Example
//!
//! ```rust
//! use quaver::events::Notification;
//!
//! fn handle(notification: Notification) {
//!     match notification {
//!         Notification::TreeReady(domain) => println!("redraw {domain}"),
//!         Notification::StreamEnded { domain, error } => {
//!             println!("{domain} stream ended: {error:?}")
//!         }
//!         _ => {}
//!     }
//! }
//! ```

use std::fmt;

use crate::protocol::Domain;

/// Lifecycle and projection events of the synchronized domains.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Notification {
    /// A stream was opened and delivered its first event.
    Subscribed(Domain),

    /// A new tree was materialized for the domain.
    TreeReady(Domain),

    /// The consumer task of a domain stopped on its own, because the server
    /// closed the stream or the transport failed. The session layer decides
    /// whether to resubscribe.
    StreamEnded {
        domain: Domain,

        /// Description of the transport error, if the stream did not end
        /// cleanly.
        error: Option<String>,
    },

    /// A domain was unsubscribed and its mirror cleared.
    Unsubscribed(Domain),
}

impl Notification {
    /// The domain this notification concerns.
    #[must_use]
    pub fn domain(&self) -> Domain {
        match self {
            Self::Subscribed(domain)
            | Self::TreeReady(domain)
            | Self::Unsubscribed(domain)
            | Self::StreamEnded { domain, .. } => *domain,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subscribed(domain) => write!(f, "{domain} subscribed"),
            Self::TreeReady(domain) => write!(f, "{domain} tree ready"),
            Self::StreamEnded {
                domain,
                error: None,
            } => write!(f, "{domain} stream ended"),
            Self::StreamEnded {
                domain,
                error: Some(e),
            } => write!(f, "{domain} stream failed: {e}"),
            Self::Unsubscribed(domain) => write!(f, "{domain} unsubscribed"),
        }
    }
}
