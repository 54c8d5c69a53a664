//! Core domain + application logic for the channel post bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and SQLite live
//! behind ports (traits) implemented in adapter crates: the outbound channel
//! is a [`messaging::port::PostSender`] and persistence is a [`store::Store`].

pub mod config;
pub mod domain;
pub mod errors;
pub mod ingest;
pub mod logging;
pub mod media_group;
pub mod messaging;
pub mod publish;
pub mod render;
pub mod schedule;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testutil;

pub use errors::{Error, Result};
