//! Module discovery
//!
//! Scans module directories for manifests and reports per-batch discovery
//! outcomes. A broken manifest never aborts a scan; it surfaces as a source
//! whose metadata extraction fails, which discovery records as a Failed
//! descriptor.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::module::registry::manifest::{ManifestSource, ModuleManifest};
use crate::module::traits::{Module, ModuleDescriptor, ModuleError, ModuleSource};

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryResult {
    /// Candidate sources examined (after the ignore list)
    pub total: usize,
    /// Descriptors extracted successfully
    pub loaded: usize,
    /// Sources whose extraction failed (recorded, never fatal)
    pub failed: usize,
    /// Per-module (name, message) extraction failures
    pub errors: Vec<(String, String)>,
    /// Wall-clock duration of the pass
    pub duration: Duration,
}

/// Source whose manifest could not be read or parsed. Kept so the failure
/// is reported through the normal per-module path.
struct BrokenSource {
    name: String,
    error: String,
}

impl ModuleSource for BrokenSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Result<ModuleDescriptor, ModuleError> {
        Err(ModuleError::Discovery(self.error.clone()))
    }

    fn instantiate(&self) -> Result<Box<dyn Module>, ModuleError> {
        Err(ModuleError::Instantiation(self.error.clone()))
    }
}

/// Scan a directory for module subdirectories carrying a `module.toml`.
///
/// Entries without a manifest are skipped; unreadable or invalid manifests
/// yield sources that fail `describe`, so the registry records them as
/// Failed descriptors instead of aborting the batch.
pub fn scan_manifest_dir<P: AsRef<Path>>(
    dir: P,
) -> Result<Vec<Arc<dyn ModuleSource>>, ModuleError> {
    let dir = dir.as_ref();
    info!("scanning for module manifests in {:?}", dir);

    if !dir.exists() {
        debug!("module directory {:?} does not exist", dir);
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| ModuleError::Discovery(format!("failed to read module directory: {}", e)))?;

    let mut sources: Vec<Arc<dyn ModuleSource>> = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| ModuleError::Discovery(format!("failed to read directory entry: {}", e)))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let manifest_path = path.join("module.toml");
        if !manifest_path.exists() {
            debug!("no module.toml in {:?}, skipping", path);
            continue;
        }
        match ModuleManifest::from_file(&manifest_path) {
            Ok(manifest) => {
                debug!("found manifest for module {}", manifest.name);
                sources.push(Arc::new(ManifestSource::new(manifest)));
            }
            Err(e) => {
                let name = entry.file_name().to_string_lossy().to_string();
                sources.push(Arc::new(BrokenSource {
                    name,
                    error: e.to_string(),
                }));
            }
        }
    }

    info!("found {} module sources", sources.len());
    Ok(sources)
}
