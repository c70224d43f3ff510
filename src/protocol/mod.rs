//! Wire model of the server-pushed event streams.
//!
//! Each [`Domain`] has its own ordered stream of [`Event`]s. Every event
//! carries the subscription identifier the server assigned to the stream,
//! a [`Kind`] and at most one entity as its [`Payload`].
//!
//! The transport delivering these events is opaque to this crate; see
//! [`crate::transport`].

mod domain;
mod event;

pub use domain::Domain;
pub use event::{Event, Kind, Payload};

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt::Debug;

/// Decodes one JSON frame of an event stream. `origin` names the stream in
/// log lines.
///
/// Returns `Ok(None)` for a frame that is valid JSON but does not match `T`,
/// such as an event with an unknown payload type. Such a frame is logged as
/// a warning and dumped at `trace`, and the stream can carry on past it.
///
/// # Errors
///
/// Returns `DataLoss` if the frame is not JSON at all.
pub fn json<T>(frame: &str, origin: &str) -> Result<Option<T>>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    let value: serde_json::Value = serde_json::from_str(frame).map_err(|e| {
        error!("{origin}: failed parsing frame ({e})");
        trace!("{frame}");
        Error::data_loss(e)
    })?;

    match T::deserialize(&value) {
        Ok(result) => {
            trace!("{origin}: {result:?}");
            Ok(Some(result))
        }
        Err(e) => {
            warn!("{origin}: dropping unexpected frame ({e})");
            trace!("{origin}: {value:#?}");
            Ok(None)
        }
    }
}
