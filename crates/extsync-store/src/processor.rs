use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use extsync_core::hash::sha256_file;
use extsync_core::ArtifactInfo;
use tracing::{error, info};

use crate::descriptor::read_descriptor;
use crate::extract::scan_source;
use crate::manifest::{ExtensionRecord, FileFormat, Manifest};
use crate::reconcile::{reconcile, ProcessingStats, Transition};

/// Name of the manifest file kept in the target directory.
pub const MANIFEST_FILE: &str = "extension_list.txt";

/// One full extract-identify-reconcile pass over a source directory.
pub struct Processor {
    source_dir: PathBuf,
    target_dir: PathBuf,
    manifest: Manifest,
    stats: ProcessingStats,
}

impl Processor {
    /// Load prior state from `target_dir`, creating it if needed.
    pub fn new(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let source_dir = source_dir.into();
        let target_dir = target_dir.into();
        std::fs::create_dir_all(&target_dir)?;
        let manifest = Manifest::load(target_dir.join(MANIFEST_FILE))?;

        info!("starting extensions processing");
        info!("source directory: {}", source_dir.display());
        info!("target directory: {}", target_dir.display());

        Ok(Self {
            source_dir,
            target_dir,
            manifest,
            stats: ProcessingStats::default(),
        })
    }

    /// Run the pass and return the stats behind the summary.
    ///
    /// The scratch directory for bundle extraction lives only for the
    /// duration of this call and is removed on every exit path.
    pub fn run(mut self) -> anyhow::Result<ProcessingStats> {
        if !self.source_dir.exists()
            || std::fs::read_dir(&self.source_dir)?.next().is_none()
        {
            info!("no extensions found to process");
            return Ok(self.stats);
        }

        let scratch = tempfile::tempdir()?;
        let candidates = scan_source(&self.source_dir, scratch.path(), &mut self.stats);
        if candidates.is_empty() {
            info!("no extensions found to process");
            return Ok(self.stats);
        }

        info!("found files by type:");
        for (ext, count) in &self.stats.found_files {
            info!("- {}: {} files", ext.to_uppercase(), count);
        }

        let mut seen = BTreeSet::new();
        for candidate in &candidates {
            if let Err(e) = self.process_candidate(candidate, &mut seen) {
                error!("failed to process {}: {e}", candidate.display());
            }
        }

        self.manifest.save()?;
        self.log_summary();
        Ok(self.stats)
    }

    /// Identify, hash, and reconcile one candidate file.
    fn process_candidate(&mut self, path: &Path, seen: &mut BTreeSet<String>) -> anyhow::Result<()> {
        let Some(descriptor) = read_descriptor(path) else {
            return Ok(()); // no usable descriptor; not a package
        };
        let install_path = descriptor.install_path();
        if !seen.insert(install_path.clone()) {
            return Ok(()); // duplicate identity within this run; first wins
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => anyhow::bail!("candidate without a usable file name: {}", path.display()),
        };
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let file_format = FileFormat::from_extension(ext).unwrap_or(FileFormat::Vsix);

        let record = ExtensionRecord {
            sha256: sha256_file(path)?,
            install_path,
            version: descriptor.version,
            file_format,
            artifact: ArtifactInfo::parse(&filename),
            filename: filename.clone(),
        };

        let transition = reconcile(&mut self.manifest, &self.target_dir, &record)?;
        std::fs::copy(path, self.target_dir.join(&filename))?;
        self.manifest.insert(record.clone());

        match transition {
            Transition::New => self.stats.added.push(record),
            Transition::Updated { old } => self.stats.updated.push((old, record)),
            Transition::Unchanged => self.stats.unchanged.push(record),
        }
        Ok(())
    }

    fn log_summary(&self) {
        info!("final state summary:");
        info!("total extensions in target: {}", self.manifest.len());

        if !self.stats.updated.is_empty() {
            info!("updated extensions:");
            for (old, new) in &self.stats.updated {
                info!(
                    "- {}: v{} -> v{} [{}]{}",
                    new.install_path,
                    old.version,
                    new.version,
                    new.file_format,
                    new.provenance()
                );
            }
        }

        if !self.stats.added.is_empty() {
            info!("newly added extensions:");
            for record in &self.stats.added {
                info!(
                    "- {} v{} [{}]{}",
                    record.install_path,
                    record.version,
                    record.file_format,
                    record.provenance()
                );
            }
        }

        info!("changes summary:");
        info!("- updated: {}", self.stats.updated.len());
        info!("- added: {}", self.stats.added.len());
        info!("- unchanged: {}", self.stats.unchanged.len());

        let mut formats: BTreeMap<&str, usize> = BTreeMap::new();
        for record in self.manifest.records() {
            *formats.entry(record.file_format.as_str()).or_insert(0) += 1;
        }
        info!("extension formats:");
        for (format, count) in formats {
            info!("- {}: {} extensions", format.to_uppercase(), count);
        }
        info!("extension list updated successfully");
    }
}
