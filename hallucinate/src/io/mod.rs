//! Side-effecting collaborators of the request loop.

pub mod agent;
pub mod config;
pub mod console;
pub mod prerecording;
pub mod template;
