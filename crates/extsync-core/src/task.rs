use std::path::Path;

use serde::Deserialize;

use crate::error::FetchError;

/// One artifact download task from the generated task list.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchTask {
    pub extension_name: String,
    pub project_id: u64,
    pub job_name: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FetchTask {
    /// Check invariants and normalize the extension name.
    pub fn validate(mut self) -> Result<Self, FetchError> {
        if self.project_id == 0 {
            return Err(FetchError::Config(format!(
                "project_id must be positive for '{}'",
                self.extension_name
            )));
        }
        let trimmed = self.extension_name.trim();
        if trimmed.is_empty() {
            return Err(FetchError::Config(
                "extension_name cannot be empty".to_string(),
            ));
        }
        self.extension_name = trimmed.to_string();
        Ok(self)
    }
}

/// The task list file produced by the external configurator:
/// `{"version": "1.0", "generated_at": <ISO-8601>, "tasks": [...]}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub generated_at: String,
    #[serde(default)]
    pub tasks: Vec<FetchTask>,
}

impl TaskList {
    /// Load and validate a task list. A missing `tasks` key is an empty
    /// list, not an error; a malformed file or invalid task is fatal.
    pub fn load(path: &Path) -> Result<Self, FetchError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FetchError::Config(format!("cannot read task list {}: {e}", path.display()))
        })?;
        let mut list: TaskList = serde_json::from_str(&content).map_err(|e| {
            FetchError::Config(format!("invalid task list {}: {e}", path.display()))
        })?;
        list.tasks = list
            .tasks
            .into_iter()
            .map(FetchTask::validate)
            .collect::<Result<_, _>>()?;
        Ok(list)
    }
}
