//! Command handlers for the taxguide CLI.

pub mod ask;
pub mod inspect;
pub mod serve;

pub use ask::AskCommand;
pub use inspect::InspectCommand;
pub use serve::ServeCommand;
