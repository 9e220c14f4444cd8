use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser};
use extsync_cli::init_tracing;
use extsync_core::{FetchTask, TaskList};
use extsync_gitlab::{ArtifactDownloader, GitLabClient, TaskOutcome};
use tracing::{error, info};

/// Download GitLab CI artifact bundles for extension build jobs.
#[derive(Parser)]
#[command(name = "extsync-fetch", version, about = "GitLab artifact downloader")]
#[command(group(ArgGroup::new("mode").required(true).args(["config", "project_id"])))]
struct Args {
    /// GitLab instance URL
    #[arg(long)]
    url: String,
    /// Private token for API authentication
    #[arg(long)]
    token: String,
    /// Task list JSON file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Numeric project id (single-task mode)
    #[arg(long)]
    project_id: Option<u64>,
    /// Download one specific job's artifact (requires --project-id)
    #[arg(long, requires = "project_id", conflicts_with = "config")]
    job_id: Option<u64>,
    /// Job name to resolve (required with --project-id)
    #[arg(long, conflicts_with = "config")]
    job_name: Option<String>,
    /// Branch name (defaults to the project's default branch)
    #[arg(long, conflicts_with = "config")]
    branch: Option<String>,
    /// Directory for downloaded bundles
    #[arg(long, default_value = "./artifacts")]
    output_dir: PathBuf,
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every task succeeded.
fn run(args: &Args) -> anyhow::Result<bool> {
    let client = GitLabClient::new(&args.url, &args.token);
    let downloader = ArtifactDownloader::new(client, &args.output_dir)?;

    let outcomes = if let Some(config) = &args.config {
        let list = TaskList::load(config)?;
        if list.tasks.is_empty() {
            info!("no tasks in configuration file, nothing to download");
            return Ok(true);
        }
        downloader.run(&list.tasks)?
    } else if let Some(job_id) = args.job_id {
        let project_id = args
            .project_id
            .ok_or_else(|| anyhow::anyhow!("--project-id is required with --job-id"))?;
        vec![downloader.download_single(project_id, job_id)]
    } else {
        let project_id = args
            .project_id
            .ok_or_else(|| anyhow::anyhow!("--config or --project-id is required"))?;
        let job_name = args
            .job_name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--job-name is required with --project-id"))?;
        let task = FetchTask {
            extension_name: format!("project_{project_id}"),
            project_id,
            job_name,
            branch: args.branch.clone(),
            tags: Vec::new(),
        }
        .validate()?;
        downloader.run(std::slice::from_ref(&task))?
    };

    Ok(report(&outcomes))
}

fn report(outcomes: &[TaskOutcome]) -> bool {
    let mut all_ok = true;
    for outcome in outcomes {
        match &outcome.result {
            Ok(downloaded) => info!(
                "success: {} downloaded to {}",
                outcome.extension_name,
                downloaded.output_path.display()
            ),
            Err(e) => {
                all_ok = false;
                error!("failed: {} - {e}", outcome.extension_name);
            }
        }
    }
    all_ok
}
