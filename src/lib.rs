//! Client-side synchronization of a music server's library into local
//! mirrors, projected into display trees.
//!
//! The server pushes one ordered stream of events per [`protocol::Domain`].
//! Each stream is folded by a [`reducer::Reducer`] into a [`mirror::Mirror`]
//! and, once consistent, materialized into a [`tree::Tree`] following the
//! domain's grouping guide. [`sync::Client`] owns the subscriptions and the
//! tasks consuming them.
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod guides;
pub mod mirror;
pub mod protocol;
pub mod reducer;
pub mod replace;
pub mod sync;
pub mod transport;
pub mod tree;
