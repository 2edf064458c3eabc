pub mod connection;
pub mod messages;
pub mod room;
mod server;
mod session;
pub mod timer;

pub use messages::{ClientMessage, PollEvent};
pub use room::{Question, RoomSnapshot, Student};
pub use server::{Outcome, PollServer, SkipReason};
pub use session::TickResult;
