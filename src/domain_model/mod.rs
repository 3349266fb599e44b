mod ids;
mod message;
mod room;

pub use ids::*;
pub use message::*;
pub use room::*;
