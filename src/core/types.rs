//! Core type aliases and re-exports

pub use glam::{DMat4, DVec3};

/// Standard Result type for the authoring core
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
