//! Invocation failure taxonomy.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::host::{GeoJsonError, LoadError};

#[derive(Error, Debug)]
pub enum InvocationError {
    /// The input dataset could not be written; nothing was launched.
    #[error("failed to write input dataset to {}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: GeoJsonError,
    },

    #[error("failed to launch {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker did not finish within {}s", .limit.as_secs())]
    Timeout { limit: Duration },

    #[error("worker failed ({})", describe_exit(.exit_code))]
    WorkerFailure {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("worker exited successfully but did not create {}", .path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("output artifact could not be loaded: {source}")]
    ArtifactInvalid {
        path: PathBuf,
        #[source]
        source: LoadError,
    },

    /// Rejected before anything started.
    #[error("another invocation is already running")]
    AlreadyRunning,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {}", c),
        None => "terminated by signal".to_string(),
    }
}

fn fenced(text: &str) -> String {
    if text.trim().is_empty() {
        "(empty)".to_string()
    } else {
        format!("```\n{}\n```", text.trim_end())
    }
}

impl InvocationError {
    pub fn title(&self) -> &'static str {
        match self {
            InvocationError::Serialization { .. } => "Input not written",
            InvocationError::Launch { .. } => "Launch failed",
            InvocationError::Timeout { .. } => "Timed out",
            InvocationError::WorkerFailure { .. } => "Worker failed",
            InvocationError::ArtifactMissing { .. } => "Output missing",
            InvocationError::ArtifactInvalid { .. } => "Output invalid",
            InvocationError::AlreadyRunning => "Busy",
        }
    }

    /// Markdown message shown to the user; one shape per category.
    pub fn report(&self) -> String {
        match self {
            InvocationError::Serialization { path, source } => format!(
                "Execution failed:\n\nCould not write the selected layer to `{}`: {}",
                path.display(),
                source
            ),
            InvocationError::Launch { program, source } => format!(
                "Execution failed:\n\nCould not start `{}`: {}",
                program.display(),
                source
            ),
            InvocationError::Timeout { limit } => format!(
                "Script execution timed out after {} seconds",
                limit.as_secs()
            ),
            InvocationError::WorkerFailure {
                exit_code,
                stdout,
                stderr,
            } => {
                let head = match exit_code {
                    Some(c) => format!("Script failed with return code {}", c),
                    None => "Script was terminated by a signal".to_string(),
                };
                format!(
                    "{}\n\n**STDERR:**\n\n{}\n\n**STDOUT:**\n\n{}",
                    head,
                    fenced(stderr),
                    fenced(stdout)
                )
            }
            InvocationError::ArtifactMissing { path } => {
                format!("Output file not created: `{}`", path.display())
            }
            InvocationError::ArtifactInvalid { path, source } => format!(
                "Failed to load NetCDF `{}`: {}",
                path.display(),
                source
            ),
            InvocationError::AlreadyRunning => {
                "A computation is already running; wait for it to finish".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_failure_report_carries_both_streams() {
        let err = InvocationError::WorkerFailure {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "ModuleNotFoundError: No module named 'xarray'\n".into(),
        };
        let report = err.report();
        assert!(report.starts_with("Script failed with return code 1"));
        assert!(report.contains("ModuleNotFoundError"));
        assert!(report.contains("**STDOUT:**\n\n(empty)"));
        assert_eq!(err.to_string(), "worker failed (exit code 1)");
    }

    #[test]
    fn signal_exit_is_described() {
        let err = InvocationError::WorkerFailure {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "worker failed (terminated by signal)");
        assert!(err.report().starts_with("Script was terminated by a signal"));
    }

    #[test]
    fn timeout_and_missing_have_distinct_messages() {
        let timeout = InvocationError::Timeout {
            limit: Duration::from_secs(300),
        };
        let missing = InvocationError::ArtifactMissing {
            path: PathBuf::from("/tmp/output_result_1.nc"),
        };
        assert_eq!(timeout.report(), "Script execution timed out after 300 seconds");
        assert!(missing.report().starts_with("Output file not created"));
        assert_ne!(timeout.title(), missing.title());
    }
}
