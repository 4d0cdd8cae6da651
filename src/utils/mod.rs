//! Utility functions for vidl

pub mod filename;
pub mod url;

pub use filename::*;
pub use url::*;
