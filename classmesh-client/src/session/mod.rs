mod coordinator;
mod roster;
mod session_actor;
mod session_command;
mod session_event;

pub use coordinator::*;
pub use roster::Participant;
pub use session_event::*;
