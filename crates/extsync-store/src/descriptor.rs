use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

/// The identity triple embedded in a package's `package.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    pub publisher: String,
    pub version: String,
}

impl PackageDescriptor {
    /// Install identity: `{publisher}.{name}`, independent of version.
    pub fn install_path(&self) -> String {
        format!("{}.{}", self.publisher, self.name)
    }
}

/// Read the embedded descriptor from a candidate package.
///
/// Candidates that are not zip archives, carry no `package.json` entry,
/// or carry only unparseable ones yield `None`: such files are skipped,
/// not treated as errors (malformed uploads legitimately occur).
pub fn read_descriptor(path: &Path) -> Option<PackageDescriptor> {
    let file = File::open(path).ok()?;
    let mut archive = zip::ZipArchive::new(file).ok()?;
    let names: Vec<String> = archive
        .file_names()
        .filter(|name| name.ends_with("package.json"))
        .map(str::to_string)
        .collect();
    for name in names {
        let Ok(mut entry) = archive.by_name(&name) else {
            continue;
        };
        let mut content = String::new();
        if entry.read_to_string(&mut content).is_err() {
            continue;
        }
        match serde_json::from_str::<PackageDescriptor>(&content) {
            Ok(descriptor) => return Some(descriptor),
            Err(e) => debug!("descriptor entry {name} in {}: {e}", path.display()),
        }
    }
    None
}
