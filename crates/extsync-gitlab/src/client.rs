use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use extsync_core::FetchError;
use serde_json::Value;
use tracing::{debug, warn};

/// Page size for list endpoints; pagination stops on the first short page.
const PER_PAGE: usize = 100;
/// Most-recent pipelines scanned when resolving a job by name.
const PIPELINE_SCAN_LIMIT: usize = 20;
/// Artifact download budget: total attempts, including the first.
const DOWNLOAD_ATTEMPTS: u32 = 3;
/// Deadline applied to every API call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Copy buffer for streaming artifact bodies to disk.
const CHUNK_SIZE: usize = 8192;

/// Resolved CI job coordinates for one fetch task. Immutable once
/// resolved; never persisted.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub job_id: u64,
    pub pipeline_id: u64,
    pub branch: String,
    pub created_at: String,
    pub web_url: String,
}

/// Blocking GitLab REST v4 client authenticated with a static token.
pub struct GitLabClient {
    base_url: String,
    token: String,
    agent: ureq::Agent,
    /// Pause between download attempts. Swapped out in tests so the
    /// backoff schedule can be observed without sleeping.
    pause: Box<dyn Fn(Duration) + Send + Sync>,
}

impl GitLabClient {
    /// Build a client for `base_url`. The `/api/v4` prefix is appended
    /// when absent so both instance URLs and API URLs are accepted.
    pub fn new(base_url: &str, token: &str) -> Self {
        let mut base = base_url.trim_end_matches('/').to_string();
        if !base.ends_with("/api/v4") {
            base = format!("{base}/api/v4");
        }
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self {
            base_url: base,
            token: token.to_string(),
            agent,
            pause: Box::new(|delay| std::thread::sleep(delay)),
        }
    }

    /// Replace the inter-attempt pause (test hook).
    pub fn with_pause(mut self, pause: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.pause = Box::new(pause);
        self
    }

    fn request_url(&self, endpoint: &str, params: &[(&str, String)]) -> String {
        let mut url = format!("{}/{endpoint}", self.base_url);
        if !params.is_empty() {
            let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
            url = format!("{url}?{}", query.join("&"));
        }
        url
    }

    /// Single authenticated GET, classified by status.
    fn get_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, FetchError> {
        let url = self.request_url(endpoint, params);
        debug!("GET {url}");
        let mut resp = self
            .agent
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| FetchError::transport(format!("{endpoint}: {e}")))?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(FetchError::from_status(status, endpoint));
        }
        resp.body_mut()
            .read_json()
            .map_err(|e| FetchError::Parse(format!("{endpoint}: invalid JSON response: {e}")))
    }

    /// Collect all pages of a list endpoint. Stops as soon as a page
    /// returns fewer than [`PER_PAGE`] items.
    fn get_paginated(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<Value>, FetchError> {
        let mut results = Vec::new();
        let mut page = 1usize;
        loop {
            let mut page_params = params.to_vec();
            page_params.push(("page", page.to_string()));
            page_params.push(("per_page", PER_PAGE.to_string()));
            let value = self.get_json(endpoint, &page_params)?;
            let items = match value {
                Value::Array(items) => items,
                other => {
                    return Err(FetchError::Parse(format!(
                        "{endpoint}: expected an array, got {other}"
                    )))
                }
            };
            let count = items.len();
            results.extend(items);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(results)
    }

    /// Probe the API before processing any task. Maps an auth failure to
    /// a clear invalid-token message.
    pub fn check_connection(&self) -> Result<(), FetchError> {
        match self.get_json("projects", &[("per_page", "1".to_string())]) {
            Ok(_) => Ok(()),
            Err(FetchError::Auth(_)) => Err(FetchError::Auth(
                "invalid or expired GitLab token".to_string(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Default branch for a project, falling back to `master` when the
    /// lookup fails or the field is absent.
    pub fn default_branch(&self, project_id: u64) -> String {
        match self.get_json(&format!("projects/{project_id}"), &[]) {
            Ok(project) => project
                .get("default_branch")
                .and_then(Value::as_str)
                .unwrap_or("master")
                .to_string(),
            Err(e) => {
                warn!("default branch lookup failed for project {project_id}: {e}");
                "master".to_string()
            }
        }
    }

    /// Find the most recent successful run of `job_name` on `branch`.
    ///
    /// Pipelines are listed newest first and the scan is capped at the
    /// [`PIPELINE_SCAN_LIMIT`] most recent; within that window the first
    /// pipeline holding a successful job with the right name wins.
    pub fn resolve_job(
        &self,
        project_id: u64,
        job_name: &str,
        branch: &str,
    ) -> Result<JobInfo, FetchError> {
        let params = [
            ("order_by", "id".to_string()),
            ("sort", "desc".to_string()),
            ("ref", encode_query(branch)),
        ];
        let mut pipelines =
            self.get_paginated(&format!("projects/{project_id}/pipelines"), &params)?;
        pipelines.truncate(PIPELINE_SCAN_LIMIT);
        if pipelines.is_empty() {
            return Err(FetchError::NotFound(format!(
                "no pipelines found on branch '{branch}'"
            )));
        }

        for pipeline in &pipelines {
            let pipeline_id = pipeline
                .get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| FetchError::Parse("pipeline entry without numeric id".to_string()))?;
            let jobs = self.get_paginated(
                &format!("projects/{project_id}/pipelines/{pipeline_id}/jobs"),
                &[],
            )?;
            let matched = jobs.iter().find(|job| {
                job.get("name").and_then(Value::as_str) == Some(job_name)
                    && job.get("status").and_then(Value::as_str) == Some("success")
            });
            if let Some(job) = matched {
                let job_id = job
                    .get("id")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| FetchError::Parse("job entry without numeric id".to_string()))?;
                let detail = self.get_json(&format!("projects/{project_id}/jobs/{job_id}"), &[])?;
                return Ok(JobInfo {
                    job_id,
                    pipeline_id,
                    branch: branch.to_string(),
                    created_at: pipeline
                        .get("created_at")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    web_url: detail
                        .get("web_url")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }
        Err(FetchError::NotFound(format!(
            "no successful '{job_name}' job in the last {PIPELINE_SCAN_LIMIT} pipelines on '{branch}'"
        )))
    }

    /// Direct lookup when the caller already knows the job id.
    pub fn resolve_job_by_id(&self, project_id: u64, job_id: u64) -> Result<JobInfo, FetchError> {
        let job = self.get_json(&format!("projects/{project_id}/jobs/{job_id}"), &[])?;
        let pipeline_id = job
            .get("pipeline")
            .and_then(|p| p.get("id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                FetchError::Parse(format!("job {job_id} response without pipeline id"))
            })?;
        Ok(JobInfo {
            job_id,
            pipeline_id,
            branch: job
                .get("ref")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at: job
                .get("created_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            web_url: job
                .get("web_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }

    /// Download the artifact bundle for a job, streaming it to `dest`.
    ///
    /// Three attempts total. A 404 means the artifact is genuinely absent
    /// and fails immediately; every other failure backs off 4s then 8s
    /// before the next attempt, and the third failure is surfaced.
    pub fn download_artifact(
        &self,
        project_id: u64,
        job_id: u64,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let endpoint = format!("projects/{project_id}/jobs/{job_id}/artifacts");
        let url = self.request_url(&endpoint, &[]);
        let mut last_err = None;
        for attempt in 0..DOWNLOAD_ATTEMPTS {
            match self.try_download(&url, dest) {
                Ok(()) => return Ok(()),
                Err(err @ FetchError::NotFound(_)) => return Err(err),
                Err(err) => {
                    warn!("download attempt {} failed: {err}", attempt + 1);
                    last_err = Some(err);
                    if attempt + 1 < DOWNLOAD_ATTEMPTS {
                        (self.pause)(backoff_delay(attempt));
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| FetchError::transport("artifact download failed")))
    }

    fn try_download(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        let mut resp = self
            .agent
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .call()
            .map_err(|e| FetchError::transport(format!("artifact request: {e}")))?;
        let status = resp.status().as_u16();
        if status == 404 {
            return Err(FetchError::NotFound("artifacts not found".to_string()));
        }
        if !(200..300).contains(&status) {
            return Err(FetchError::from_status(status, "artifact download"));
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FetchError::transport(format!("create {}: {e}", parent.display())))?;
        }
        let mut reader = resp.body_mut().as_reader();
        let mut file = std::fs::File::create(dest)
            .map_err(|e| FetchError::transport(format!("create {}: {e}", dest.display())))?;
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|e| FetchError::transport(format!("read artifact body: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])
                .map_err(|e| FetchError::transport(format!("write {}: {e}", dest.display())))?;
        }
        Ok(())
    }
}

/// Backoff before the next download attempt: 4s, 8s, capped at 10s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs((4u64 << attempt).min(10))
}

/// Percent-encode the characters GitLab refs may carry that are unsafe in
/// a query value (most importantly `/` in branch names).
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '/' => out.push_str("%2F"),
            '+' => out.push_str("%2B"),
            '#' => out.push_str("%23"),
            '&' => out.push_str("%26"),
            '?' => out.push_str("%3F"),
            ' ' => out.push_str("%20"),
            _ => out.push(c),
        }
    }
    out
}
