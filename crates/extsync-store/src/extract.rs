use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{error, info};
use walkdir::WalkDir;

use crate::manifest::FileFormat;
use crate::reconcile::ProcessingStats;

/// Zip entries under this folder are macOS resource-fork noise, not packages.
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Collect candidate package files under `source_dir`.
///
/// Bare `.vsix`/`.carts` files are candidates directly; `.zip` bundles
/// are opened and matching entries copied into `scratch_dir`. A bundle
/// that fails to extract is logged and skipped, and the walk continues.
pub fn scan_source(
    source_dir: &Path,
    scratch_dir: &Path,
    stats: &mut ProcessingStats,
) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(source_dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if FileFormat::from_extension(&ext).is_some() {
            *stats.found_files.entry(ext).or_insert(0) += 1;
            candidates.push(path.to_path_buf());
        } else if ext == "zip" {
            *stats.found_files.entry("zip".to_string()).or_insert(0) += 1;
            match extract_bundle(path, scratch_dir, stats) {
                Ok(mut extracted) => {
                    if !extracted.is_empty() {
                        info!("- {}: extracted {} extensions", file_name(path), extracted.len());
                    }
                    candidates.append(&mut extracted);
                }
                Err(e) => error!("failed to process {}: {e}", path.display()),
            }
        }
    }
    candidates
}

/// Pull recognized package entries out of one zip bundle.
fn extract_bundle(
    bundle: &Path,
    scratch_dir: &Path,
    stats: &mut ProcessingStats,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(scratch_dir)?;
    let file = File::open(bundle)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        if !is_package_entry(&name) {
            continue;
        }
        let base = name.rsplit('/').next().unwrap_or(&name).to_string();
        let out_path = scratch_dir.join(&base);
        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        extracted.push(out_path);
        *stats.extracted_files.entry(file_name(bundle)).or_insert(0) += 1;
    }
    Ok(extracted)
}

/// A zip entry counts as a package when it carries a recognized extension
/// and does not live under the macOS metadata folder.
fn is_package_entry(name: &str) -> bool {
    if name.contains(MACOS_METADATA_DIR) {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".vsix") || lower.ends_with(".carts")
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_package_entries() {
        assert!(is_package_entry("ext.vsix"));
        assert!(is_package_entry("nested/dir/ext.CARTS"));
        assert!(!is_package_entry("__MACOSX/ext.vsix"));
        assert!(!is_package_entry("build/__MACOSX/._ext.vsix"));
        assert!(!is_package_entry("readme.txt"));
        assert!(!is_package_entry("inner.zip"));
    }
}
