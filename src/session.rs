//! Open documents held by handle
//!
//! A [`Session`] is owned by its caller; documents stay open until closed
//! explicitly. Persisting goes through the session's injectable store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::core::{Error, Result};
use crate::document::{Document, DocumentOrigin, DocumentStore, UpAxis};

struct OpenDocument {
    doc: Document,
    path: Option<PathBuf>,
}

/// Listing entry for [`Session::list`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDocumentInfo {
    pub handle: String,
    pub path: Option<PathBuf>,
    pub node_count: usize,
}

pub struct Session {
    store: Arc<dyn DocumentStore>,
    documents: BTreeMap<String, OpenDocument>,
    next_id: u64,
}

impl Session {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            documents: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    fn insert(&mut self, doc: Document, path: Option<PathBuf>) -> String {
        let handle = format!("doc-{}", self.next_id);
        self.next_id += 1;
        self.documents.insert(handle.clone(), OpenDocument { doc, path });
        handle
    }

    /// Open an existing document and return its handle.
    pub fn open(&mut self, path: &Path) -> Result<String> {
        let doc = self.store.load_document(path)?;
        let handle = self.insert(doc, Some(path.to_path_buf()));
        log::info!("Opened {} as {}", path.display(), handle);
        Ok(handle)
    }

    /// Create an empty document, optionally bound to the path it will be
    /// saved to.
    pub fn create(&mut self, up_axis: UpAxis, meters_per_unit: f64, path: Option<&Path>) -> Result<String> {
        if meters_per_unit <= 0.0 || !meters_per_unit.is_finite() {
            return Err(Error::invalid("metersPerUnit must be a positive number"));
        }
        let mut doc = Document::new(up_axis, meters_per_unit);
        if let Some(path) = path {
            doc.set_origin(DocumentOrigin::File(path.to_path_buf()));
        }
        Ok(self.insert(doc, path.map(Path::to_path_buf)))
    }

    pub fn close(&mut self, handle: &str) -> Result<()> {
        self.documents
            .remove(handle)
            .map(|_| log::info!("Closed {}", handle))
            .ok_or_else(|| unknown(handle))
    }

    pub fn get(&self, handle: &str) -> Result<&Document> {
        self.documents
            .get(handle)
            .map(|o| &o.doc)
            .ok_or_else(|| unknown(handle))
    }

    pub fn get_mut(&mut self, handle: &str) -> Result<&mut Document> {
        self.documents
            .get_mut(handle)
            .map(|o| &mut o.doc)
            .ok_or_else(|| unknown(handle))
    }

    pub fn list(&self) -> Vec<OpenDocumentInfo> {
        self.documents
            .iter()
            .map(|(handle, open)| OpenDocumentInfo {
                handle: handle.clone(),
                path: open.path.clone(),
                node_count: open.doc.node_count(),
            })
            .collect()
    }

    /// Save the document to `output`, or to the path it was opened from.
    /// Saving elsewhere rebinds the handle to the new path.
    pub fn save(&mut self, handle: &str, output: Option<&Path>) -> Result<PathBuf> {
        let open = self.documents.get_mut(handle).ok_or_else(|| unknown(handle))?;
        let target = output
            .map(Path::to_path_buf)
            .or_else(|| open.path.clone())
            .ok_or_else(|| Error::invalid(format!("{} has no path; pass outputPath", handle)))?;
        self.store.save_document(&open.doc, &target)?;
        if open.path.as_deref() != Some(target.as_path()) {
            open.doc.set_origin(DocumentOrigin::File(target.clone()));
            open.path = Some(target.clone());
        }
        Ok(target)
    }
}

fn unknown(handle: &str) -> Error {
    Error::not_found(format!("No open document with handle {}", handle))
}
