pub mod logger;
pub mod settings;

pub mod connection;
pub mod domain_model;
pub mod session;
pub mod session_port;
pub mod subscription;
pub mod timeline;

pub mod backend_fake;
pub mod backend_http;
