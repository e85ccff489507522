//! Recovers per-sample read pairing from raw file lists and the prep metadata.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use log::debug;
use serde::Serialize;
use thiserror::Error;

pub const RUN_PREFIX_COLUMN: &str = "run_prefix";

/// One sequencing sample: the run prefix its files start with, the sample id
/// from the metadata table and its forward / optional reverse reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRecord {
    pub run_prefix: String,
    pub sample_id: String,
    pub forward: PathBuf,
    pub reverse: Option<PathBuf>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PairingError {
    #[error("Your reverse and forward files are of different length. Forward: {}. Reverse: {}.", .forward.join(", "), .reverse.join(", "))]
    MismatchedPairCount {
        forward: Vec<String>,
        reverse: Vec<String>,
    },

    #[error("Multiple samples share the same run prefix: {}", format_shared_prefixes(.0))]
    AmbiguousRunPrefix(Vec<(String, Vec<String>)>),

    #[error("No run prefix matching this fwd read: {0}")]
    UnmatchedFile(String),

    #[error("Multiple run prefixes match this fwd read: {file} ({})", .prefixes.join(", "))]
    AmbiguousPrefixMatch { file: String, prefixes: Vec<String> },

    #[error("This run prefix matches multiple fwd reads: {0}")]
    DuplicatePrefix(String),

    #[error("Reverse read does not match this run prefix.\nRun prefix: {run_prefix}\nForward read: {forward}\nReverse read: {reverse}\n")]
    PairingMismatch {
        run_prefix: String,
        forward: String,
        reverse: String,
    },

    #[error("Some run_prefix values do not match your sample names: {}", .0.join(", "))]
    UnmatchedRunPrefix(Vec<String>),

    #[error("Could not read sample metadata {path}: {reason}")]
    Metadata { path: String, reason: String },
}

fn format_shared_prefixes(shared: &[(String, Vec<String>)]) -> String {
    shared
        .iter()
        .map(|(prefix, samples)| format!("{} ({})", prefix, samples.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn path_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| p.to_string_lossy().into_owned()).collect()
}

/// Loads the prep metadata table and maps every run prefix to its sample id.
///
/// The table is tab separated, the first column is the sample identifier and a
/// `run_prefix` column must be present. Every run prefix shared by more than one
/// sample is reported in a single error.
pub fn sample_names_by_run_prefix(map_file: &Path) -> Result<BTreeMap<String, String>, PairingError> {
    let metadata_err = |reason: String| PairingError::Metadata {
        path: map_file.display().to_string(),
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(map_file)
        .map_err(|e| metadata_err(e.to_string()))?;

    let headers = reader.headers().map_err(|e| metadata_err(e.to_string()))?.clone();
    let prefix_idx = headers
        .iter()
        .position(|h| h.trim() == RUN_PREFIX_COLUMN)
        .ok_or_else(|| metadata_err(format!("no '{}' column", RUN_PREFIX_COLUMN)))?;

    let mut samples_by_prefix: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in reader.records() {
        let row = row.map_err(|e| metadata_err(e.to_string()))?;
        let sample_id = row.get(0).map(str::trim).unwrap_or_default();
        let run_prefix = row.get(prefix_idx).map(str::trim).unwrap_or_default();
        if sample_id.is_empty() || run_prefix.is_empty() {
            continue;
        }
        samples_by_prefix
            .entry(run_prefix.to_string())
            .or_default()
            .push(sample_id.to_string());
    }

    let shared: Vec<(String, Vec<String>)> = samples_by_prefix
        .iter()
        .filter(|(_, samples)| samples.len() > 1)
        .map(|(prefix, samples)| (prefix.clone(), samples.clone()))
        .collect();
    if !shared.is_empty() {
        return Err(PairingError::AmbiguousRunPrefix(shared));
    }

    Ok(samples_by_prefix
        .into_iter()
        .filter_map(|(prefix, mut samples)| samples.pop().map(|s| (prefix, s)))
        .collect())
}

fn sorted_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut sorted = paths.to_vec();
    sorted.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    sorted
}

fn check_pair_counts(forward: &[PathBuf], reverse: &[PathBuf]) -> Result<(), PairingError> {
    if !reverse.is_empty() && forward.len() != reverse.len() {
        return Err(PairingError::MismatchedPairCount {
            forward: path_strings(&sorted_paths(forward)),
            reverse: path_strings(&sorted_paths(reverse)),
        });
    }
    Ok(())
}

/// Pairs forward and reverse files with the samples of an already loaded
/// run prefix table.
///
/// Both file lists are sorted by path before pairing, so the result does not
/// depend on input order. Per-file problems fail on the first offending file;
/// run prefixes left without a forward file are reported together at the end.
pub fn pair_samples(
    forward: &[PathBuf],
    reverse: &[PathBuf],
    sample_by_prefix: &BTreeMap<String, String>,
) -> Result<Vec<SampleRecord>, PairingError> {
    check_pair_counts(forward, reverse)?;
    let forward = sorted_paths(forward);
    let reverse = sorted_paths(reverse);

    let mut samples = Vec::with_capacity(forward.len());
    let mut used_prefixes: HashSet<&str> = HashSet::new();

    for (i, fwd_fp) in forward.iter().enumerate() {
        let fwd_fn = file_name_of(fwd_fp);

        let matching: Vec<&String> = sample_by_prefix
            .keys()
            .filter(|rp| fwd_fn.starts_with(rp.as_str()))
            .collect();
        let run_prefix = match matching.as_slice() {
            [] => return Err(PairingError::UnmatchedFile(fwd_fn)),
            [rp] => rp.as_str(),
            _ => {
                return Err(PairingError::AmbiguousPrefixMatch {
                    file: fwd_fn,
                    prefixes: matching.iter().map(|rp| rp.to_string()).collect(),
                });
            }
        };

        if !used_prefixes.insert(run_prefix) {
            return Err(PairingError::DuplicatePrefix(run_prefix.to_string()));
        }

        let rev_fp = reverse.get(i);
        if let Some(rev_fp) = rev_fp {
            let rev_fn = file_name_of(rev_fp);
            if !rev_fn.starts_with(run_prefix) {
                return Err(PairingError::PairingMismatch {
                    run_prefix: run_prefix.to_string(),
                    forward: fwd_fn,
                    reverse: rev_fn,
                });
            }
        }

        debug!("Paired run prefix {} with {}", run_prefix, fwd_fn);
        samples.push(SampleRecord {
            run_prefix: run_prefix.to_string(),
            sample_id: sample_by_prefix[run_prefix].clone(),
            forward: fwd_fp.clone(),
            reverse: rev_fp.cloned(),
        });
    }

    let unmatched: Vec<String> = sample_by_prefix
        .keys()
        .filter(|rp| !used_prefixes.contains(rp.as_str()))
        .cloned()
        .collect();
    if !unmatched.is_empty() {
        return Err(PairingError::UnmatchedRunPrefix(unmatched));
    }

    Ok(samples)
}

/// Recovers `(run_prefix, sample_id, forward, reverse)` tuples for a job.
///
/// # Arguments
///
/// * `forward` - Forward read files of the artifact.
/// * `reverse` - Reverse read files, empty for single-end runs.
/// * `map_file` - Prep metadata table with a `run_prefix` column.
///
/// # Returns
/// Samples ordered by forward file path.
pub fn resolve_pairs(
    forward: &[PathBuf],
    reverse: &[PathBuf],
    map_file: &Path,
) -> Result<Vec<SampleRecord>, PairingError> {
    check_pair_counts(forward, reverse)?;
    let sample_by_prefix = sample_names_by_run_prefix(map_file)?;
    pair_samples(forward, reverse, &sample_by_prefix)
}
