//! Written object artifacts.

use std::fmt;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Result;

/// An object file on disk, identified by its content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectArtifact {
    /// Where the object was written.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// SHA-256 of the file contents, lowercase hex.
    pub sha256: String,
}

impl ObjectArtifact {
    /// Describe an object file that already exists.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::from_bytes(path, &bytes))
    }

    /// Describe an object whose contents are already in memory.
    pub fn from_bytes(path: &Path, bytes: &[u8]) -> Self {
        Self {
            path: path.to_path_buf(),
            size_bytes: bytes.len() as u64,
            sha256: sha256_hex(bytes),
        }
    }
}

impl fmt::Display for ObjectArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} bytes, sha256 {})",
            self.path.display(),
            self.size_bytes,
            &self.sha256[..12]
        )
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_tracks_contents() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.obj");
        let b = dir.path().join("b.obj");
        std::fs::write(&a, b"runtime").unwrap();
        std::fs::write(&b, b"operator").unwrap();

        let art_a = ObjectArtifact::from_path(&a).unwrap();
        let art_b = ObjectArtifact::from_path(&b).unwrap();
        assert_eq!(art_a.size_bytes, 7);
        assert_eq!(art_a.sha256.len(), 64);
        assert_ne!(art_a.sha256, art_b.sha256);
        assert!(art_a.to_string().contains("a.obj"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ObjectArtifact::from_path(Path::new("/nonexistent/x.obj")).unwrap_err();
        assert!(matches!(err, crate::error::CompileError::Io(_)));
    }
}
