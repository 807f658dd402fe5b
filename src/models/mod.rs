pub mod health;
pub mod ready;
pub mod diagnostics;
pub mod error;
pub mod language;
pub mod participant;
pub mod room;
pub mod messages;
pub mod session;

pub use health::*;
pub use ready::*;
pub use diagnostics::*;
pub use error::*;
pub use language::*;
pub use participant::*;
pub use room::*;
pub use messages::*;
pub use session::*;
