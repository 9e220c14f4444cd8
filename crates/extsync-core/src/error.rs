use thiserror::Error;

/// Classified pipeline failures.
///
/// Callers match on the kind instead of string-matching messages: `Auth`
/// is fatal and never retried, `NotFound` fails only the affected task,
/// `Transient` is retried within the download budget, `Parse` means the
/// affected item is skipped, `Config` is fatal at startup.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Bad or expired credential (HTTP 401/403).
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Missing project, pipeline, job, or artifact.
    #[error("not found: {0}")]
    NotFound(String),
    /// Network or server failure worth retrying.
    #[error("transient error{}: {detail}", status_suffix(.status))]
    Transient {
        status: Option<u16>,
        detail: String,
    },
    /// Malformed filename, manifest line, or package descriptor.
    #[error("parse error: {0}")]
    Parse(String),
    /// Missing or invalid CLI/config input.
    #[error("configuration error: {0}")]
    Config(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (HTTP {code})"),
        None => String::new(),
    }
}

impl FetchError {
    /// Classify an HTTP status code: 401/403 are auth failures, 404 is a
    /// missing resource, everything else is transient.
    pub fn from_status(status: u16, context: &str) -> Self {
        match status {
            401 => Self::Auth(format!("unauthorized: {context}")),
            403 => Self::Auth(format!("forbidden: {context}")),
            404 => Self::NotFound(context.to_string()),
            other => Self::Transient {
                status: Some(other),
                detail: context.to_string(),
            },
        }
    }

    /// Transport-level failure with no HTTP status attached.
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_statuses() {
        assert!(matches!(FetchError::from_status(401, "x"), FetchError::Auth(_)));
        assert!(matches!(FetchError::from_status(403, "x"), FetchError::Auth(_)));
    }

    #[test]
    fn classifies_not_found() {
        assert!(matches!(
            FetchError::from_status(404, "projects/1"),
            FetchError::NotFound(_)
        ));
    }

    #[test]
    fn other_statuses_are_transient() {
        for code in [429, 500, 502, 503] {
            match FetchError::from_status(code, "x") {
                FetchError::Transient { status, .. } => assert_eq!(status, Some(code)),
                other => panic!("expected transient, got {other:?}"),
            }
        }
    }

    #[test]
    fn transient_display_includes_status() {
        let err = FetchError::from_status(502, "pipelines");
        assert_eq!(err.to_string(), "transient error (HTTP 502): pipelines");
        let err = FetchError::transport("connection refused");
        assert_eq!(err.to_string(), "transient error: connection refused");
    }
}
