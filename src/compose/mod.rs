//! Reference and variant composition

pub mod stage;
pub mod flatten;

pub use stage::{ComposedNode, ComposedVariantSet, LayerId, PathMapping, Site, Source, Stage};
