// Blob storage collaborator: store uploaded receipt bytes, hand back a
// reference the CRUD screens can resolve later.

use crate::error::PipelineError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub trait BlobStore: Send + Sync {
    /// Store bytes under (a sanitized form of) the suggested name and
    /// return the reference. The stored name is unique: a different file
    /// already holding the name gets a content-hash suffix appended.
    fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, PipelineError>;

    fn read(&self, reference: &str) -> Result<Vec<u8>, PipelineError>;

    fn delete(&self, reference: &str) -> Result<(), PipelineError>;
}

/// Flat-directory disk store. The reference IS the stored file name, so the
/// path is always derivable as `root/reference`.
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, PipelineError> {
        fs::create_dir_all(root.as_ref()).map_err(PipelineError::storage)?;
        Ok(DiskBlobStore {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn sanitize(name: &str) -> String {
        let base = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("archivo");
        base.chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect()
    }

    fn short_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = format!("{:x}", hasher.finalize());
        digest[..8].to_string()
    }

    /// Append the content hash before the extension: "recibo.pdf" with a
    /// colliding name becomes "recibo-1a2b3c4d.pdf".
    fn disambiguate(name: &str, bytes: &[u8]) -> String {
        let hash = Self::short_hash(bytes);
        match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{}-{}.{}", stem, hash, ext),
            None => format!("{}-{}", name, hash),
        }
    }
}

impl BlobStore for DiskBlobStore {
    fn store(&self, bytes: &[u8], suggested_name: &str) -> Result<String, PipelineError> {
        let name = Self::sanitize(suggested_name);
        let path = self.root.join(&name);

        if path.exists() {
            let existing = fs::read(&path).map_err(PipelineError::storage)?;
            if existing == bytes {
                // Same name, same bytes: idempotent re-upload
                return Ok(name);
            }
            let alt = Self::disambiguate(&name, bytes);
            fs::write(self.root.join(&alt), bytes).map_err(PipelineError::storage)?;
            return Ok(alt);
        }

        fs::write(&path, bytes).map_err(PipelineError::storage)?;
        Ok(name)
    }

    fn read(&self, reference: &str) -> Result<Vec<u8>, PipelineError> {
        fs::read(self.root.join(Self::sanitize(reference))).map_err(PipelineError::storage)
    }

    fn delete(&self, reference: &str) -> Result<(), PipelineError> {
        fs::remove_file(self.root.join(Self::sanitize(reference))).map_err(PipelineError::storage)
    }
}
