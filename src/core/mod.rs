//! Core functionality for vidl

pub mod downloader;
pub mod progress;
pub mod video;

pub use downloader::*;
pub use progress::*;
pub use video::*;
