//! # File I/O Module
//!
//! Catalog file operations:
//! - **Atomic saves**: write to `.tmp`, verify it parses back, rename
//! - **Version validation**: refuse catalogs written by an incompatible schema
//!
//! ## File Format
//!
//! Catalogs are JSON documents in the shape of
//! [`InMemoryCatalog`](crate::catalog::InMemoryCatalog), carrying a
//! `schema_version` field.
//!
//! ## Example
//!
//! ```rust,no_run
//! use pricing_core::catalog::InMemoryCatalog;
//! use pricing_core::file_io::{load_catalog, save_catalog};
//! use std::path::Path;
//!
//! let catalog = InMemoryCatalog::new();
//! save_catalog(&catalog, Path::new("catalog.json"))?;
//! let loaded = load_catalog(Path::new("catalog.json"))?;
//! # Ok::<(), pricing_core::errors::PricingError>(())
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::catalog::InMemoryCatalog;
use crate::errors::{PricingError, PricingResult};

/// Catalog schema version written by this engine
pub const CATALOG_SCHEMA_VERSION: &str = "0.1.0";

/// Read and parse any JSON document.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> PricingResult<T> {
    let contents = fs::read_to_string(path)
        .map_err(|e| PricingError::file_error("read", path.display().to_string(), e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| PricingError::SerializationError {
        reason: format!("Invalid JSON in {}: {}", path.display(), e),
    })
}

/// Write any value as pretty JSON with atomic write semantics.
///
/// 1. Serialize to JSON
/// 2. Write to `<path>.tmp` and fsync
/// 3. Rename over `path` (atomic on most filesystems)
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> PricingResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> PricingResult<()> {
    let tmp_path = tmp_path_for(path);

    let mut tmp_file = File::create(&tmp_path).map_err(|e| {
        PricingError::file_error("create temp file", tmp_path.display().to_string(), e.to_string())
    })?;
    tmp_file.write_all(bytes).map_err(|e| {
        PricingError::file_error("write temp file", tmp_path.display().to_string(), e.to_string())
    })?;
    tmp_file.sync_all().map_err(|e| {
        PricingError::file_error("sync temp file", tmp_path.display().to_string(), e.to_string())
    })?;
    drop(tmp_file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        PricingError::file_error("rename to final", path.display().to_string(), e.to_string())
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "file saved");
    Ok(())
}

/// Save a catalog atomically.
///
/// The temporary file is parsed back before the rename so a catalog that
/// would not load again never replaces a good one.
pub fn save_catalog(catalog: &InMemoryCatalog, path: &Path) -> PricingResult<()> {
    validate_version(&catalog.schema_version)?;
    let json = serde_json::to_string_pretty(catalog)?;
    serde_json::from_str::<InMemoryCatalog>(&json).map_err(|e| PricingError::SerializationError {
        reason: format!("catalog does not read back: {}", e),
    })?;
    write_atomic(path, json.as_bytes())
}

/// Load a catalog and check its schema version.
///
/// # Returns
///
/// * `Ok(InMemoryCatalog)` - Successfully loaded catalog
/// * `Err(PricingError::VersionMismatch)` - File version is incompatible
/// * `Err(PricingError::SerializationError)` - Invalid JSON
/// * `Err(PricingError::FileError)` - I/O error
pub fn load_catalog(path: &Path) -> PricingResult<InMemoryCatalog> {
    let catalog: InMemoryCatalog = load_json(path)?;
    validate_version(&catalog.schema_version)?;
    debug!(
        path = %path.display(),
        templates = catalog.templates.len(),
        inventory = catalog.inventory.len(),
        grids = catalog.grids.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

/// Validate that a file version is compatible with the current schema.
///
/// Major versions must match. While the major is 0, a file with a newer
/// minor than the engine is refused.
pub fn validate_version(file_version: &str) -> PricingResult<()> {
    let mismatch = || PricingError::VersionMismatch {
        file_version: file_version.to_string(),
        expected_version: CATALOG_SCHEMA_VERSION.to_string(),
    };
    let parse = |v: &str| -> Option<Vec<u32>> { v.split('.').map(|p| p.trim().parse().ok()).collect() };

    let file_parts = parse(file_version).ok_or_else(mismatch)?;
    let current_parts = parse(CATALOG_SCHEMA_VERSION).ok_or_else(mismatch)?;
    let (Some(file_major), Some(current_major)) = (file_parts.first(), current_parts.first()) else {
        return Err(mismatch());
    };

    if file_major != current_major {
        return Err(mismatch());
    }
    if *current_major == 0 {
        if let (Some(file_minor), Some(current_minor)) = (file_parts.get(1), current_parts.get(1)) {
            if file_minor > current_minor {
                return Err(mismatch());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bom::InventoryItem;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = InMemoryCatalog::new();
        catalog.org_id = Some("org-1".into());
        catalog.inventory.push(InventoryItem::new("track", "Track", "m", 8.0, 12.0));
        save_catalog(&catalog, &path).unwrap();

        let loaded = load_catalog(&path).unwrap();
        assert_eq!(loaded.org_id.as_deref(), Some("org-1"));
        assert_eq!(loaded.inventory, catalog.inventory);
    }

    #[test]
    fn test_atomic_save_creates_no_tmp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        save_catalog(&InMemoryCatalog::new(), &path).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("catalog.json.tmp").exists());
    }

    #[test]
    fn test_version_validation() {
        assert!(validate_version(CATALOG_SCHEMA_VERSION).is_ok());
        assert!(validate_version("0.1.7").is_ok());
        assert!(validate_version("0.0.9").is_ok());
        assert!(validate_version("1.0.0").is_err());
        assert!(validate_version("0.2.0").is_err());
        assert!(validate_version("latest").is_err());
    }

    #[test]
    fn test_newer_catalog_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.json");
        fs::write(&path, r#"{ "schema_version": "0.9.0" }"#).unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert_eq!(err.error_code(), "VERSION_MISMATCH");
    }

    #[test]
    fn test_invalid_json_names_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert_eq!(err.error_code(), "SERIALIZATION_ERROR");
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_json::<InMemoryCatalog>(&dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_ERROR");
    }
}
