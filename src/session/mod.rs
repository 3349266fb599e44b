mod controller;
mod guard;

pub use controller::*;
