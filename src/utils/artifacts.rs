use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use crate::config::defs::PipelineError;
use crate::utils::file::touch;

/// A typed bundle of output files handed back to the job server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactRecord {
    pub name: String,
    pub artifact_type: String,
    pub files: Vec<(PathBuf, String)>,
}

impl ArtifactRecord {
    pub fn new(name: &str, artifact_type: &str, files: Vec<(PathBuf, String)>) -> Self {
        ArtifactRecord {
            name: name.to_string(),
            artifact_type: artifact_type.to_string(),
            files,
        }
    }

    /// Record holding a single file.
    pub fn single(name: &str, artifact_type: &str, path: PathBuf, role: &str) -> Self {
        ArtifactRecord::new(name, artifact_type, vec![(path, role.to_string())])
    }
}

/// What to do with expected outputs that are not on disk after a
/// successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingOutputPolicy {
    /// Drop missing files; fail only when nothing at all was produced.
    FailIfEmpty,
    /// Create an empty placeholder for every missing file; fail only when
    /// nothing at all was produced.
    Backfill,
}

/// Checks expected output paths against the filesystem.
///
/// # Arguments
///
/// * `expected` - (path, role) pairs in the order they should be registered.
/// * `policy` - How missing paths are handled.
/// * `program` - Name used in the "No sequences left after" message.
///
/// # Returns
/// The (path, role) pairs that make up the artifact.
pub fn collect_outputs(
    expected: Vec<(PathBuf, String)>,
    policy: MissingOutputPolicy,
    program: &str,
) -> Result<Vec<(PathBuf, String)>, PipelineError> {
    match policy {
        MissingOutputPolicy::FailIfEmpty => {
            let (present, missing): (Vec<_>, Vec<_>) = expected.into_iter().partition(|(p, _)| p.exists());
            if present.is_empty() {
                return Err(PipelineError::NoOutputs(program.to_string()));
            }
            for (path, _) in &missing {
                warn!("{} produced no {}", program, path.display());
            }
            Ok(present)
        }
        MissingOutputPolicy::Backfill => {
            if !expected.iter().any(|(p, _)| p.exists()) {
                return Err(PipelineError::NoOutputs(program.to_string()));
            }
            for (path, _) in expected.iter().filter(|(p, _)| !p.exists()) {
                info!("Creating empty placeholder {}", path.display());
                touch(path)?;
            }
            Ok(expected)
        }
    }
}

/// Expected (path, role) pairs for per-sample R1/R2 outputs.
///
/// `pattern` must contain `{sample}` and `{read}`; reads are `R1` and `R2`.
pub fn per_sample_expected(out_dir: &Path, sample_ids: &[&str], pattern: &str, roles: [&str; 2]) -> Vec<(PathBuf, String)> {
    let mut expected = Vec::new();
    for sample in sample_ids {
        for (read, role) in ["R1", "R2"].iter().zip(roles.iter()) {
            let name = pattern.replace("{sample}", sample).replace("{read}", read);
            expected.push((out_dir.join(name), role.to_string()));
        }
    }
    expected
}
