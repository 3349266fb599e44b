mod collaborators;
mod gateway;

pub use collaborators::*;
pub use gateway::*;
