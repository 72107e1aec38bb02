//! The `client` module covers the client side of a connection.
//!
//! [`Subscriber`] is the handle the broker holds for each subscribed session.
//! [`interactive`] is a line-oriented terminal client for the wire protocol.

pub mod interactive;
pub mod subscriber;

pub use subscriber::{SessionId, Subscriber};
