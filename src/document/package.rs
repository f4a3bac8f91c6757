//! Packaged archives: an rkyv-archived member list, LZ4 compressed
//!
//! Member 0 is the root document. Other members are referenced documents
//! stored under their path relative to the root.

use crate::core::{Error, Result};

/// File extension of packaged archives.
pub const PACKAGE_EXTENSION: &str = "sdocz";

/// One stored member of an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "package",
    derive(rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)
)]
pub struct PackageEntry {
    pub member: String,
    pub bytes: Vec<u8>,
}

/// Serialize and compress archive members.
#[cfg(feature = "package")]
pub fn encode_package(entries: &[PackageEntry]) -> Result<Vec<u8>> {
    let entries = entries.to_vec();
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&entries)
        .map_err(|e| Error::ExportFailed(format!("Package serialization failed: {}", e)))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

/// Largest decompressed archive accepted.
pub const MAX_PACKAGE_BYTES: usize = 512 * 1024 * 1024;

/// Decompress and validate archive members.
#[cfg(feature = "package")]
pub fn decode_package(data: &[u8]) -> Result<Vec<PackageEntry>> {
    if let Some(header) = data.get(..4) {
        let declared = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if declared > MAX_PACKAGE_BYTES {
            return Err(Error::OpenFailed(format!(
                "Package declares {} bytes, limit is {}",
                declared, MAX_PACKAGE_BYTES
            )));
        }
    }
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::OpenFailed(format!("LZ4 decompression failed: {}", e)))?;

    // Archived data must be aligned before access.
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(decompressed.len());
    aligned.extend_from_slice(&decompressed);

    let entries = rkyv::from_bytes::<Vec<PackageEntry>, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::OpenFailed(format!("Corrupt package: {}", e)))?;
    if entries.is_empty() {
        return Err(Error::OpenFailed("Package has no root document".to_string()));
    }
    Ok(entries)
}

#[cfg(not(feature = "package"))]
pub fn encode_package(_entries: &[PackageEntry]) -> Result<Vec<u8>> {
    Err(missing())
}

#[cfg(not(feature = "package"))]
pub fn decode_package(_data: &[u8]) -> Result<Vec<PackageEntry>> {
    Err(missing())
}

#[cfg(not(feature = "package"))]
fn missing() -> Error {
    Error::MissingDependency(
        "Packaged archives require the `package` feature".to_string(),
    )
}
