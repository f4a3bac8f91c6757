//! Scenecomp - transform and composition authoring for layered scene documents

pub mod core;
pub mod math;
pub mod document;
pub mod compose;
pub mod author;
pub mod session;
pub mod service;

pub use core::{Config, Error, Result};
