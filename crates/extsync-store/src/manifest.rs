use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use extsync_core::{ArtifactInfo, FetchError};
use tracing::{info, warn};

/// Recognized package file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Vsix,
    Carts,
}

impl FileFormat {
    /// Detect the format from a candidate file extension (no dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "vsix" => Some(Self::Vsix),
            "carts" => Some(Self::Carts),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vsix => "vsix",
            Self::Carts => "carts",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .ok_or_else(|| FetchError::Parse(format!("unknown file format '{s}'")))
    }
}

/// One installed-package record in the manifest.
///
/// Reconciliation identity is `install_path` (`{publisher}.{name}`),
/// independent of version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub sha256: String,
    pub install_path: String,
    pub version: String,
    pub file_format: FileFormat,
    pub filename: String,
    pub artifact: Option<ArtifactInfo>,
}

impl ExtensionRecord {
    /// Parse a manifest line: `sha256:install_path:version:format:filename`.
    /// The filename field may itself contain colons.
    pub fn parse_line(line: &str) -> Result<Self, FetchError> {
        let parts: Vec<&str> = line.splitn(5, ':').collect();
        if parts.len() != 5 {
            return Err(FetchError::Parse(format!(
                "manifest line with {} fields: {line}",
                parts.len()
            )));
        }
        let file_format = parts[3].parse()?;
        Ok(Self {
            sha256: parts[0].to_string(),
            install_path: parts[1].to_string(),
            version: parts[2].to_string(),
            file_format,
            filename: parts[4].to_string(),
            artifact: ArtifactInfo::parse(parts[4]),
        })
    }

    /// Serialize back to one manifest line.
    pub fn to_line(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.sha256, self.install_path, self.version, self.file_format, self.filename
        )
    }

    /// Provenance suffix for summary output, empty when unknown.
    pub fn provenance(&self) -> String {
        self.artifact
            .as_ref()
            .map(ArtifactInfo::display_suffix)
            .unwrap_or_default()
    }
}

/// The persistent ledger of installed packages (`extension_list.txt`),
/// held in memory as a filename-keyed map and flushed once per run.
pub struct Manifest {
    path: PathBuf,
    records: BTreeMap<String, ExtensionRecord>,
}

impl Manifest {
    /// Load the manifest, tolerating malformed lines. An absent file is
    /// an empty manifest (first run).
    pub fn load(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let mut records = BTreeMap::new();
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match ExtensionRecord::parse_line(line) {
                    Ok(record) => {
                        records.insert(record.filename.clone(), record);
                    }
                    Err(e) => warn!("skipping manifest line: {e}"),
                }
            }
            info!("loaded {} entries from {}", records.len(), path.display());
        }
        Ok(Self { path, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ExtensionRecord> {
        self.records.values()
    }

    pub fn get(&self, filename: &str) -> Option<&ExtensionRecord> {
        self.records.get(filename)
    }

    /// The live record sharing an install identity, if any. The
    /// reconciliation invariant keeps this to at most one.
    pub fn find_by_install_path(&self, install_path: &str) -> Option<&ExtensionRecord> {
        self.records
            .values()
            .find(|record| record.install_path == install_path)
    }

    pub fn insert(&mut self, record: ExtensionRecord) {
        self.records.insert(record.filename.clone(), record);
    }

    pub fn remove(&mut self, filename: &str) -> Option<ExtensionRecord> {
        self.records.remove(filename)
    }

    /// Persist all records sorted by install path.
    ///
    /// Writes to a temp file in the same directory and renames over the
    /// final path, so an interrupted write leaves the previously
    /// committed manifest intact.
    pub fn save(&self) -> anyhow::Result<()> {
        let mut records: Vec<&ExtensionRecord> = self.records.values().collect();
        records.sort_by(|a, b| a.install_path.cmp(&b.install_path));

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            for record in &records {
                writeln!(file, "{}", record.to_line())?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
