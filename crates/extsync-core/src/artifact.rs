use std::sync::LazyLock;

use regex::Regex;

/// Grammar for filenames produced by the fetch stage. Tolerates both `_`
/// and `-` separators so bundles renamed by older tooling still parse.
static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^.*[_-]pipeline(\d+)[_-]job(\d+)[_-]branch[_-](.+?)\.(?:zip|vsix|carts)$")
        .expect("filename pattern is valid")
});

/// CI provenance parsed back out of a downloaded bundle's filename.
///
/// Display-only data: a filename that does not follow the convention
/// simply yields no provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub pipeline_id: u64,
    pub job_id: u64,
    pub branch: String,
}

impl ArtifactInfo {
    /// Parse pipeline/job/branch coordinates from a bundle filename.
    pub fn parse(filename: &str) -> Option<Self> {
        let caps = FILENAME_PATTERN.captures(filename)?;
        let pipeline_id = caps[1].parse().ok()?;
        let job_id = caps[2].parse().ok()?;
        let branch = decode_branch(&caps[3]);
        Some(Self {
            pipeline_id,
            job_id,
            branch,
        })
    }

    /// Human-readable provenance suffix for summary lines.
    pub fn display_suffix(&self) -> String {
        format!(
            " (pipeline #{}, job #{}, branch: {})",
            self.pipeline_id, self.job_id, self.branch
        )
    }
}

/// Decode `%2F` escapes back to `/` and replace remaining characters
/// outside `[\w\-./]` with `_`.
fn decode_branch(raw: &str) -> String {
    let decoded = raw.replace("%2F", "/").replace("%2f", "/");
    decoded
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Strip every character except alphanumerics, `-` and `_`.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

/// Deterministic bundle filename for a resolved job.
///
/// `/` in the branch is encoded as `%2F` so the filename stays flat and
/// [`ArtifactInfo::parse`] restores the real branch name.
pub fn artifact_file_name(name: &str, pipeline_id: u64, job_id: u64, branch: &str) -> String {
    let branch = branch.replace('/', "%2F");
    format!(
        "{}_pipeline{pipeline_id}_job{job_id}_branch-{branch}.zip",
        safe_name(name)
    )
}
