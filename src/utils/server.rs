//! Boundary with the workflow server that owns jobs and artifacts.

use std::path::PathBuf;
use std::sync::Mutex;

use log::{debug, info};
use serde::Serialize;

use crate::config::defs::{PipelineError, RAW_FORWARD_SEQS};
use crate::utils::artifacts::ArtifactRecord;

/// Raw read files of an input artifact, split by role.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactFiles {
    pub forward: Vec<PathBuf>,
    pub reverse: Vec<PathBuf>,
}

pub trait JobServer: Send + Sync {
    /// Forward and reverse read files of an artifact.
    fn artifact_files(&self, artifact_id: &str) -> Result<ArtifactFiles, PipelineError>;

    /// Prep metadata table (TSV with a `run_prefix` column) for an artifact.
    fn prep_metadata(&self, artifact_id: &str) -> Result<PathBuf, PipelineError>;

    /// Progress message for a running job. Never fails.
    fn report_step(&self, job_id: &str, message: &str);
}

/// Serves a single artifact given on the command line and logs progress.
#[derive(Debug)]
pub struct LocalJobServer {
    files: ArtifactFiles,
    map_file: PathBuf,
    steps: Mutex<Vec<String>>,
}

impl LocalJobServer {
    pub fn new(forward: Vec<PathBuf>, reverse: Vec<PathBuf>, map_file: PathBuf) -> Self {
        LocalJobServer {
            files: ArtifactFiles { forward, reverse },
            map_file,
            steps: Mutex::new(Vec::new()),
        }
    }

    /// Every step message reported so far, oldest first.
    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl JobServer for LocalJobServer {
    fn artifact_files(&self, artifact_id: &str) -> Result<ArtifactFiles, PipelineError> {
        debug!("Serving local files for artifact {}", artifact_id);
        if self.files.forward.is_empty() {
            return Err(PipelineError::MissingArtifactFiles {
                artifact: artifact_id.to_string(),
                role: RAW_FORWARD_SEQS.to_string(),
            });
        }
        Ok(self.files.clone())
    }

    fn prep_metadata(&self, _artifact_id: &str) -> Result<PathBuf, PipelineError> {
        if !self.map_file.exists() {
            return Err(PipelineError::IOError(format!(
                "Prep metadata not found: {}",
                self.map_file.display()
            )));
        }
        Ok(self.map_file.clone())
    }

    fn report_step(&self, job_id: &str, message: &str) {
        info!("[job {}] {}", job_id, message);
        if let Ok(mut steps) = self.steps.lock() {
            steps.push(message.to_string());
        }
    }
}

/// Result of one job as handed back to the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub success: bool,
    pub artifacts: Option<Vec<ArtifactRecord>>,
    pub message: String,
}

impl JobOutcome {
    pub fn succeeded(artifacts: Vec<ArtifactRecord>) -> Self {
        JobOutcome {
            success: true,
            artifacts: Some(artifacts),
            message: String::new(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        JobOutcome {
            success: false,
            artifacts: None,
            message: message.into(),
        }
    }
}
