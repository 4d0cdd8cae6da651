//! Fragment engine, retry policy, skip policy and remux adapter

pub mod engine;
pub mod integrity;
pub mod remux;
pub mod retry;

pub use engine::*;
pub use integrity::*;
pub use remux::*;
pub use retry::*;
