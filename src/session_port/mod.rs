mod history_source;
mod observer;
mod read_tracker;
mod room_directory;

pub use history_source::*;
pub use observer::*;
pub use read_tracker::*;
pub use room_directory::*;
