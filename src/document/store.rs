//! Document persistence
//!
//! A [`DocumentStore`] moves bytes; the provided methods layer the plain
//! (`.sdoc`) and packaged (`.sdocz`) formats on top.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use crate::core::{Error, Result};
use crate::document::document::{Document, DocumentOrigin, FORMAT_TAG};
use crate::document::package::{decode_package, encode_package, PackageEntry, PACKAGE_EXTENSION};

/// Extension of plain documents.
pub const DOCUMENT_EXTENSION: &str = "sdoc";

/// True if `path` names a packaged archive.
pub fn is_package(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}

/// Lexically normalize `path`, folding `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Archive member name for a relative path, `/`-separated.
pub fn member_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Serialize a document to its plain on-disk form.
pub fn encode_document(doc: &Document) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(doc)?)
}

/// Parse a plain document.
pub fn decode_document(bytes: &[u8]) -> Result<Document> {
    let doc: Document = serde_json::from_slice(bytes)
        .map_err(|e| Error::OpenFailed(format!("Malformed document: {}", e)))?;
    if doc.format != FORMAT_TAG {
        return Err(Error::OpenFailed(format!(
            "Unrecognized document format '{}'",
            doc.format
        )));
    }
    Ok(doc)
}

/// Identity of a loaded document: a file, or a member of a packaged archive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LayerKey {
    File(PathBuf),
    Member { archive: PathBuf, member: String },
}

impl LayerKey {
    pub fn for_origin(origin: &DocumentOrigin) -> Self {
        match origin {
            DocumentOrigin::File(path) => LayerKey::File(path.clone()),
            DocumentOrigin::Packaged { archive, member } => LayerKey::Member {
                archive: archive.clone(),
                member: member.clone(),
            },
        }
    }

    pub fn display(&self) -> String {
        match self {
            LayerKey::File(path) => path.display().to_string(),
            LayerKey::Member { archive, member } => format!("{}[{}]", archive.display(), member),
        }
    }
}

/// Byte-level storage backend.
pub trait DocumentStore: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    fn exists(&self, path: &Path) -> bool;

    /// Open a plain document or the root member of a packaged archive.
    fn load_document(&self, path: &Path) -> Result<Document> {
        if !self.exists(path) {
            return Err(Error::not_found(format!("Document not found: {}", path.display())));
        }
        let bytes = self.read(path).map_err(|e| e.wrap(Error::OpenFailed))?;
        if is_package(path) {
            let mut entries = decode_package(&bytes)?;
            let root = entries.swap_remove(0);
            let mut doc = decode_document(&root.bytes)?;
            doc.set_origin(DocumentOrigin::Packaged {
                archive: path.to_path_buf(),
                member: root.member,
            });
            Ok(doc)
        } else {
            let mut doc = decode_document(&bytes)?;
            doc.set_origin(DocumentOrigin::File(path.to_path_buf()));
            Ok(doc)
        }
    }

    /// Open the document behind a layer key.
    fn load_layer(&self, key: &LayerKey) -> Result<Document> {
        match key {
            LayerKey::File(path) => self.load_document(path),
            LayerKey::Member { archive, member } => {
                let entries = decode_package(&self.read(archive)?)?;
                let entry = entries
                    .into_iter()
                    .find(|e| &e.member == member)
                    .ok_or_else(|| {
                        Error::not_found(format!("{} has no member {}", archive.display(), member))
                    })?;
                let mut doc = decode_document(&entry.bytes)?;
                doc.set_origin(DocumentOrigin::Packaged {
                    archive: archive.clone(),
                    member: member.clone(),
                });
                Ok(doc)
            }
        }
    }

    /// Member names of a packaged archive, root first.
    fn package_members(&self, archive: &Path) -> Result<Vec<String>> {
        let entries = decode_package(&self.read(archive)?)?;
        Ok(entries.into_iter().map(|e| e.member).collect())
    }

    /// Persist `doc` as a plain document at `path`.
    fn save_document(&self, doc: &Document, path: &Path) -> Result<()> {
        if is_package(path) {
            return Err(Error::SaveFailed(format!(
                "{} is a packaged archive; export it instead",
                path.display()
            )));
        }
        let bytes = encode_document(doc).map_err(|e| e.wrap(Error::SaveFailed))?;
        self.write(path, &bytes).map_err(|e| e.wrap(Error::SaveFailed))?;
        log::debug!("Saved {} ({} nodes)", path.display(), doc.node_count());
        Ok(())
    }

    /// Write a packaged archive. The first member is the root document.
    fn save_package(&self, path: &Path, members: &[(String, Document)]) -> Result<()> {
        let entries = members
            .iter()
            .map(|(member, doc)| -> Result<PackageEntry> {
                Ok(PackageEntry {
                    member: member.clone(),
                    bytes: encode_document(doc)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let bytes = encode_package(&entries)?;
        self.write(path, &bytes).map_err(|e| e.wrap(Error::ExportFailed))
    }

    /// Resolve `asset` as referenced from a document with `origin`. Members
    /// of the same archive win over files next to it.
    fn resolve_asset(&self, origin: Option<&DocumentOrigin>, asset: &str) -> LayerKey {
        let asset_path = Path::new(asset);
        if asset_path.is_absolute() {
            return LayerKey::File(normalize(asset_path));
        }
        match origin {
            Some(DocumentOrigin::Packaged { archive, member }) => {
                let base = Path::new(member).parent().unwrap_or(Path::new(""));
                let candidate = member_string(&normalize(&base.join(asset_path)));
                let inside = self
                    .package_members(archive)
                    .map(|members| members.contains(&candidate))
                    .unwrap_or(false);
                if inside {
                    LayerKey::Member {
                        archive: archive.clone(),
                        member: candidate,
                    }
                } else {
                    LayerKey::File(normalize(&origin_dir(archive).join(asset_path)))
                }
            }
            Some(DocumentOrigin::File(path)) => {
                LayerKey::File(normalize(&origin_dir(path).join(asset_path)))
            }
            None => LayerKey::File(normalize(asset_path)),
        }
    }
}

fn origin_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Store backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileStore;

impl DocumentStore for FileStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Store holding everything in memory, keyed by normalized path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, Vec<u8>>>> {
        self.files
            .lock()
            .map_err(|_| Error::Io(std::io::Error::other("memory store poisoned")))
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.lock()?
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("Document not found: {}", path.display())))
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(normalize(path), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock()
            .map(|files| files.contains_key(&normalize(path)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::document::UpAxis;
    use crate::document::path::NodePath;
    use tempfile::TempDir;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_file_round_trip_sets_origin() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("nested/scene.sdoc");
        let mut doc = Document::new(UpAxis::Y, 0.01);
        doc.define_node(&NodePath::parse("/World").unwrap(), Some("Xform"))
            .unwrap();

        FileStore.save_document(&doc, &path).unwrap();
        let loaded = FileStore.load_document(&path).unwrap();
        assert_eq!(loaded.up_axis, UpAxis::Y);
        assert_eq!(loaded.meters_per_unit, 0.01);
        assert_eq!(loaded.origin(), Some(&DocumentOrigin::File(path.clone())));
    }

    #[test]
    fn test_missing_document_is_not_found() {
        let err = MemoryStore::new()
            .load_document(Path::new("/nope.sdoc"))
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_foreign_json_rejected() {
        let store = MemoryStore::new();
        store.write(Path::new("/x.sdoc"), br#"{"hello": 1}"#).unwrap();
        let err = store.load_document(Path::new("/x.sdoc")).unwrap_err();
        assert_eq!(err.code(), "open_failed");
    }

    #[test]
    fn test_resolve_relative_to_file() {
        let origin = DocumentOrigin::File(PathBuf::from("/scenes/shot/main.sdoc"));
        let key = MemoryStore::new().resolve_asset(Some(&origin), "../props/chair.sdoc");
        assert_eq!(key, LayerKey::File(PathBuf::from("/scenes/props/chair.sdoc")));
    }

    #[cfg(feature = "package")]
    #[test]
    fn test_package_members_resolve_inside_archive() {
        let store = MemoryStore::new();
        let archive = PathBuf::from("/assets/chair.sdocz");
        let root = Document::new(UpAxis::Z, 1.0);
        let part = Document::new(UpAxis::Z, 1.0);
        store
            .save_package(
                &archive,
                &[("chair.sdoc".into(), root), ("parts/leg.sdoc".into(), part)],
            )
            .unwrap();

        let root = store.load_document(&archive).unwrap();
        let key = store.resolve_asset(root.origin(), "parts/leg.sdoc");
        assert_eq!(
            key,
            LayerKey::Member {
                archive: archive.clone(),
                member: "parts/leg.sdoc".into()
            }
        );
        assert!(store.load_layer(&key).is_ok());

        let outside = store.resolve_asset(root.origin(), "other.sdoc");
        assert_eq!(outside, LayerKey::File(PathBuf::from("/assets/other.sdoc")));
    }

    #[test]
    fn test_saving_into_package_rejected() {
        let doc = Document::new(UpAxis::Z, 1.0);
        let err = MemoryStore::new()
            .save_document(&doc, Path::new("/a.sdocz"))
            .unwrap_err();
        assert_eq!(err.code(), "save_failed");
    }
}
