//! The `transport` module handles network communication with clients over
//! newline-delimited TCP.
//!
//! It defines the wire protocol, the per-connection session state machine
//! and the accept loop that creates sessions.

pub mod listener;
pub mod message;
pub mod session;

pub use listener::AcceptLoop;
pub use message::{ClientMessage, ClientRequest, ServerReply, Welcome};
pub use session::{Session, SessionContext, SessionExit, SessionGuard, SessionState};
