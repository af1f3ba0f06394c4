//! Error types for the boot-verification harness
//!
//! Every fault below is contained at the step level by the suite runner:
//! it is printed, logged and recorded as that step's failure. Only
//! discovery and configuration errors reach `main`.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Which artifact a step needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    KernelImage,
    SymbolMap,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::KernelImage => write!(f, "kernel image"),
            ArtifactKind::SymbolMap => write!(f, "symbol map"),
        }
    }
}

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Artifact Errors ===
    #[error("Missing {kind}: {} does not exist", path.display())]
    MissingArtifact { kind: ArtifactKind, path: PathBuf },

    // === Executable Errors ===
    #[error("QEMU not found. Searched: {searched}")]
    HypervisorNotFound { searched: String },

    #[error("kvm-dmesg not found at {}", path.display())]
    ToolNotFound { path: PathBuf },

    #[error("Failed to start {}: {source}", program.display())]
    SpawnFault {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    // === Corpus Errors ===
    #[error("Failed to scan corpus at {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },
}

impl Error {
    /// Create a missing artifact error
    pub fn missing(kind: ArtifactKind, path: &Path) -> Self {
        Self::MissingArtifact {
            kind,
            path: path.to_path_buf(),
        }
    }

    /// Create a hypervisor not found error with search locations
    pub fn hypervisor_not_found<S: AsRef<str>>(searched: &[S]) -> Self {
        Self::HypervisorNotFound {
            searched: searched
                .iter()
                .map(|s| s.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Create a spawn fault for the given program
    pub fn spawn_fault(program: &Path, source: io::Error) -> Self {
        Self::SpawnFault {
            program: program.to_path_buf(),
            source,
        }
    }

    /// Create a discovery error for the given path
    pub fn discovery(path: &Path, source: io::Error) -> Self {
        Self::Discovery {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hypervisor_not_found_lists_search() {
        let err = Error::hypervisor_not_found(&["/usr/bin/qemu-system-x86_64", "qemu-kvm"]);
        assert_eq!(
            err.to_string(),
            "QEMU not found. Searched: /usr/bin/qemu-system-x86_64, qemu-kvm"
        );
    }

    #[test]
    fn test_missing_artifact_message() {
        let err = Error::missing(ArtifactKind::SymbolMap, Path::new("/k/System.map-5.10"));
        assert_eq!(
            err.to_string(),
            "Missing symbol map: /k/System.map-5.10 does not exist"
        );
    }
}
