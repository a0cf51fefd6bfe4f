//! Bounce and delivery failure module

pub mod handler;
pub mod types;

pub use handler::BounceHandler;
pub use types::*;
