use std::collections::BTreeMap;
use std::path::Path;

use crate::manifest::{ExtensionRecord, Manifest};

/// Classification of a candidate against the existing manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    New,
    Updated { old: ExtensionRecord },
    Unchanged,
}

/// Counters and lists feeding the end-of-run summary. Transient state,
/// never persisted.
#[derive(Debug, Default)]
pub struct ProcessingStats {
    /// Candidate files found per extension (`vsix`, `carts`, `zip`).
    pub found_files: BTreeMap<String, usize>,
    /// Packages extracted per bundle filename.
    pub extracted_files: BTreeMap<String, usize>,
    /// (old, new) pairs whose version changed.
    pub updated: Vec<(ExtensionRecord, ExtensionRecord)>,
    pub added: Vec<ExtensionRecord>,
    pub unchanged: Vec<ExtensionRecord>,
}

/// Apply one candidate to the manifest state and classify the change.
///
/// A live entry sharing the candidate's install identity is superseded:
/// removed from the manifest and its backing file deleted from
/// `target_dir` — unless it is the very file the candidate will
/// overwrite. Version changed → `Updated`, same version → `Unchanged`,
/// no prior entry → `New`.
pub fn reconcile(
    manifest: &mut Manifest,
    target_dir: &Path,
    candidate: &ExtensionRecord,
) -> anyhow::Result<Transition> {
    let Some(old) = manifest.find_by_install_path(&candidate.install_path).cloned() else {
        return Ok(Transition::New);
    };

    let transition = if old.version != candidate.version {
        Transition::Updated { old: old.clone() }
    } else {
        Transition::Unchanged
    };

    manifest.remove(&old.filename);
    if old.filename != candidate.filename {
        let old_path = target_dir.join(&old.filename);
        if old_path.exists() {
            std::fs::remove_file(&old_path)?;
        }
    }
    Ok(transition)
}
