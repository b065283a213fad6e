//! Client library for the relay gateway.
//!
//! `SessionClient` is the single entry point. It hides the transport split
//! behind one API:
//! - Batch: buffer audio locally, upload once, poll until the result lands
//! - Streaming: hold a live channel open and receive deltas as they happen
//!
//! Both modes deliver results through the same `SessionEvent` feed, so a
//! consumer written against `subscribe()` works unchanged on either tier.

mod config;
mod rest;
mod session;
mod state;
mod transport;

pub use config::{ClientConfig, ReconnectPolicy};
pub use session::{DeliveryMode, SessionClient};
pub use state::ClientSnapshot;
