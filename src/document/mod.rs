//! Scene documents: node specs, values, transform ops and persistence

pub mod path;
pub mod value;
pub mod xform;
pub mod node;
#[allow(clippy::module_inception)]
pub mod document;
pub mod package;
pub mod store;

pub use path::{is_valid_name, sanitize_name, NodePath};
pub use value::{Attribute, TimeCode, Value, ValueKind};
pub use xform::{XformOpKind, XformOpName};
pub use node::{NodeSpec, Opinions, Reference, Specifier, Variant, VariantSet};
pub use document::{Document, DocumentOrigin, EditTarget, UpAxis, VariantEditScope};
pub use store::{DocumentStore, FileStore, LayerKey, MemoryStore};
