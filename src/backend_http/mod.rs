mod http_backend;
mod ws_factory;

pub use http_backend::*;
pub use ws_factory::*;
