//! # livenotify
//!
//! `livenotify` is a live event-notification broker. Clients connect over
//! TCP, register a unique identity and subscribe to topics from a fixed
//! catalog. An operator console pushes notifications to every current
//! subscriber of a topic, after a background processing job has run.
//! Successful subscriptions are recorded durably by a dedicated worker.
//!
//! ## Core Modules
//!
//! - `broker`: topic catalog, subscription registry and notification dispatch.
//! - `client`: the broker's handle on a subscriber, and a terminal client.
//! - `config`: layered configuration (defaults, `config/default.toml`, env).
//! - `console`: the operator command loop.
//! - `jobs`: the asynchronous job facility used by dispatch.
//! - `persistence`: the sled-backed subscription store and its worker thread.
//! - `server`: startup and ordered shutdown of all of the above.
//! - `transport`: wire protocol, connection sessions and the accept loop.
//! - `utils`: errors, logging and stdin plumbing.

pub mod broker;
pub mod client;
pub mod config;
pub mod console;
pub mod jobs;
pub mod persistence;
pub mod server;
pub mod transport;
pub mod utils;
