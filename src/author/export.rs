//! Exporting documents: plain copies, flattened bakes and packaged archives

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::compose::{LayerId, Stage};
use crate::core::{Error, Result};
use crate::document::store::{is_package, member_string, DOCUMENT_EXTENSION};
use crate::document::{Document, DocumentOrigin, DocumentStore, LayerKey};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportOptions {
    /// Bake composition into a single reference-free document.
    pub flatten: bool,
    /// Leave an existing output untouched.
    pub skip_if_exists: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReport {
    pub output_path: PathBuf,
    pub skipped: bool,
    pub flattened: bool,
}

/// Write `doc` to `output`. A packaged output bundles referenced documents
/// unless the export is flattened.
pub fn export_document(
    doc: &Document,
    store: &dyn DocumentStore,
    output: &Path,
    options: &ExportOptions,
) -> Result<ExportReport> {
    if output.as_os_str().is_empty() {
        return Err(Error::invalid("Output path is empty"));
    }
    if options.skip_if_exists && store.exists(output) {
        log::info!("Export target {} exists, skipping", output.display());
        return Ok(ExportReport {
            output_path: output.to_path_buf(),
            skipped: true,
            flattened: false,
        });
    }

    match (options.flatten, is_package(output)) {
        (true, packaged) => {
            let flat = Stage::compose(doc, store).flatten();
            if packaged {
                store.save_package(output, &[(root_member(output), flat)])?;
            } else {
                store
                    .save_document(&flat, output)
                    .map_err(|e| e.wrap(Error::ExportFailed))?;
            }
        }
        (false, true) => {
            export_package(doc, store, output)?;
        }
        (false, false) => {
            store
                .save_document(doc, output)
                .map_err(|e| e.wrap(Error::ExportFailed))?;
        }
    }
    log::info!("Exported {}", output.display());
    Ok(ExportReport {
        output_path: output.to_path_buf(),
        skipped: false,
        flattened: options.flatten,
    })
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageReport {
    pub output_path: PathBuf,
    /// Archive members, root first.
    pub members: Vec<String>,
    /// Referenced documents outside the root's directory, left external.
    pub external: Vec<String>,
}

/// Bundle `doc` and every transitively referenced plain document under its
/// directory into a packaged archive.
pub fn export_package(doc: &Document, store: &dyn DocumentStore, output: &Path) -> Result<PackageReport> {
    let base = match doc.origin() {
        Some(DocumentOrigin::File(path)) => path.parent().map(Path::to_path_buf),
        Some(DocumentOrigin::Packaged { archive, .. }) => {
            return Err(Error::ExportFailed(format!(
                "{} is already packaged",
                archive.display()
            )))
        }
        None => None,
    };

    let stage = Stage::compose(doc, store);
    let mut members = vec![(root_member(output), doc.clone())];
    let mut external = Vec::new();
    for (index, key) in stage.layer_keys().into_iter().enumerate() {
        let relative = match (key, &base) {
            (LayerKey::File(path), Some(base)) => path.strip_prefix(base).ok(),
            _ => None,
        };
        match relative {
            Some(relative) => members.push((
                member_string(relative),
                stage.doc(LayerId::Loaded(index)).clone(),
            )),
            None => external.push(key.display()),
        }
    }

    store.save_package(output, &members)?;
    log::info!(
        "Packaged {} document(s) into {}",
        members.len(),
        output.display()
    );
    Ok(PackageReport {
        output_path: output.to_path_buf(),
        members: members.into_iter().map(|(m, _)| m).collect(),
        external,
    })
}

fn root_member(output: &Path) -> String {
    let stem = output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("root");
    format!("{}.{}", stem, DOCUMENT_EXTENSION)
}
