mod timeline;

pub use timeline::*;
