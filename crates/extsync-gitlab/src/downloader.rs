use std::path::PathBuf;

use extsync_core::{artifact_file_name, FetchError, FetchTask};
use tracing::info;

use crate::client::{GitLabClient, JobInfo};

/// Successful download details for one task.
#[derive(Debug)]
pub struct Downloaded {
    pub output_path: PathBuf,
    pub job: JobInfo,
}

/// Per-task result. Failures are embedded rather than propagated so one
/// bad task never aborts the batch.
#[derive(Debug)]
pub struct TaskOutcome {
    pub extension_name: String,
    pub result: Result<Downloaded, FetchError>,
}

impl TaskOutcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// High-level artifact download orchestration over a [`GitLabClient`].
pub struct ArtifactDownloader {
    client: GitLabClient,
    output_dir: PathBuf,
}

impl ArtifactDownloader {
    /// Create the downloader, ensuring the output directory exists.
    pub fn new(client: GitLabClient, output_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { client, output_dir })
    }

    /// Deterministic bundle path for a resolved job.
    fn output_path(&self, name: &str, job: &JobInfo) -> PathBuf {
        self.output_dir
            .join(artifact_file_name(name, job.pipeline_id, job.job_id, &job.branch))
    }

    /// Resolve and download the artifact for one task.
    pub fn process_task(&self, task: &FetchTask) -> TaskOutcome {
        TaskOutcome {
            extension_name: task.extension_name.clone(),
            result: self.fetch_task(task),
        }
    }

    fn fetch_task(&self, task: &FetchTask) -> Result<Downloaded, FetchError> {
        let branch = match &task.branch {
            Some(branch) => branch.clone(),
            None => self.client.default_branch(task.project_id),
        };
        let job = self.client.resolve_job(task.project_id, &task.job_name, &branch)?;
        let output_path = self.output_path(&task.extension_name, &job);
        info!(
            "downloading artifact for {} (job URL: {})",
            task.extension_name, job.web_url
        );
        self.client
            .download_artifact(task.project_id, job.job_id, &output_path)?;
        Ok(Downloaded { output_path, job })
    }

    /// Probe the API once, then process tasks strictly in order. Every
    /// task is attempted regardless of earlier failures.
    pub fn run(&self, tasks: &[FetchTask]) -> Result<Vec<TaskOutcome>, FetchError> {
        self.client.check_connection()?;
        Ok(tasks.iter().map(|task| self.process_task(task)).collect())
    }

    /// Download one known job's artifact directly (the `--job-id` path).
    pub fn download_single(&self, project_id: u64, job_id: u64) -> TaskOutcome {
        let extension_name = format!("project_{project_id}");
        let result = self.client.check_connection().and_then(|()| {
            let job = self.client.resolve_job_by_id(project_id, job_id)?;
            let output_path = self.output_path(&extension_name, &job);
            self.client.download_artifact(project_id, job_id, &output_path)?;
            Ok(Downloaded { output_path, job })
        });
        TaskOutcome {
            extension_name,
            result,
        }
    }
}
