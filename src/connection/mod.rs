mod conn;
mod frame;
mod transport;

pub use conn::*;
pub use frame::*;
pub use transport::*;
