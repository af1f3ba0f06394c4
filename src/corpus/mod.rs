//! Kernel corpus discovery
//!
//! The corpus root holds one directory per kernel build. Each build directory
//! is expected to contain a `System.map*` symbol map and a `vmlinuz*` image.
//! Only the immediate children of the root are examined.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::common::{ArtifactKind, Error, Result};

/// File name prefix of a symbol map
pub const SYMBOL_MAP_PREFIX: &str = "System.map";

/// File name prefix of a bootable kernel image
pub const KERNEL_IMAGE_PREFIX: &str = "vmlinuz";

/// One kernel build under test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestUnit {
    /// Build directory name
    pub name: String,
    pub symbol_map: Option<PathBuf>,
    pub kernel_image: Option<PathBuf>,
}

impl TestUnit {
    /// A unit runs only when both artifacts were found
    pub fn is_runnable(&self) -> bool {
        self.artifacts().is_some()
    }

    /// `(symbol_map, kernel_image)` when both are present
    pub fn artifacts(&self) -> Option<(&Path, &Path)> {
        match (&self.symbol_map, &self.kernel_image) {
            (Some(map), Some(image))
                if !map.as_os_str().is_empty() && !image.as_os_str().is_empty() =>
            {
                Some((map.as_path(), image.as_path()))
            }
            _ => None,
        }
    }

    /// Artifacts this unit lacks
    pub fn missing(&self) -> Vec<ArtifactKind> {
        let mut missing = Vec::new();
        if self.symbol_map.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
            missing.push(ArtifactKind::SymbolMap);
        }
        if self.kernel_image.as_ref().map_or(true, |p| p.as_os_str().is_empty()) {
            missing.push(ArtifactKind::KernelImage);
        }
        missing
    }
}

/// All units found under a corpus root, ordered by name
#[derive(Debug, Clone, Default)]
pub struct TestCorpus {
    root: PathBuf,
    units: BTreeMap<String, TestUnit>,
}

impl TestCorpus {
    /// Scan the immediate subdirectories of `root`
    ///
    /// Directories without any matching file are still returned; they become
    /// units that the runner skips. IO faults while listing propagate.
    pub fn discover(root: &Path) -> Result<Self> {
        let root = std::path::absolute(root).map_err(|e| Error::discovery(root, e))?;
        let entries = std::fs::read_dir(&root).map_err(|e| Error::discovery(&root, e))?;

        let mut units = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::discovery(&root, e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let unit = scan_unit(&path, name)?;
            tracing::debug!(
                unit = %unit.name,
                runnable = unit.is_runnable(),
                "Discovered test unit"
            );
            units.insert(unit.name.clone(), unit);
        }

        tracing::info!("Discovered {} test units under {}", units.len(), root.display());
        Ok(Self { root, units })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Units in discovery order
    pub fn units(&self) -> impl Iterator<Item = &TestUnit> {
        self.units.values()
    }

    pub fn get(&self, name: &str) -> Option<&TestUnit> {
        self.units.get(name)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of units with both artifacts
    pub fn runnable_count(&self) -> usize {
        self.units.values().filter(|u| u.is_runnable()).count()
    }
}

/// Classify a file name as one of the artifacts we look for
///
/// Only the prefix has to be ASCII; the rest of the name may be any bytes.
pub fn classify(file_name: impl AsRef<OsStr>) -> Option<ArtifactKind> {
    let name = file_name.as_ref().as_encoded_bytes();
    if name.starts_with(SYMBOL_MAP_PREFIX.as_bytes()) {
        Some(ArtifactKind::SymbolMap)
    } else if name.starts_with(KERNEL_IMAGE_PREFIX.as_bytes()) {
        Some(ArtifactKind::KernelImage)
    } else {
        None
    }
}

/// Collect the artifacts directly inside one build directory
fn scan_unit(dir: &Path, name: String) -> Result<TestUnit> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| Error::discovery(dir, e))? {
        let entry = entry.map_err(|e| Error::discovery(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    let mut unit = TestUnit {
        name,
        symbol_map: None,
        kernel_image: None,
    };

    for path in files {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let slot = match classify(file_name) {
            Some(ArtifactKind::SymbolMap) => &mut unit.symbol_map,
            Some(ArtifactKind::KernelImage) => &mut unit.kernel_image,
            None => continue,
        };
        if let Some(previous) = slot.replace(path) {
            tracing::warn!(
                unit = %unit.name,
                "Several candidates in one build directory, ignoring {}",
                previous.display()
            );
        }
    }

    Ok(unit)
}
