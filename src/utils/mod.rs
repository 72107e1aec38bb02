//! The `utils` module provides utilities shared across `livenotify`:
//! the error taxonomy, logging setup and console input.

pub mod error;
pub mod logging;
pub mod stdin;
