//! Live-polling session coordinator: rooms, real-time fan-out and timed polls.

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod poll;

pub use error::{PollError, Result};
pub use poll::PollServer;
