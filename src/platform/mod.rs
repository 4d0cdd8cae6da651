//! Site access: credentials, authenticated requests, locators and listings

pub mod client;
pub mod credentials;
pub mod listing;
pub mod locator;
pub mod manifest;

pub use client::*;
pub use credentials::*;
pub use listing::*;
pub use locator::*;
pub use manifest::*;
