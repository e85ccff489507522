//! FastQC quality reports for every input read file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defs::{PipelineError, RunConfig, FASTQC_TAG, HTML_SUMMARY, PER_SAMPLE_FASTQ, ZIP_FILE};
use crate::pipelines::{collect_information, make_dirs, path_arg, run_step};
use crate::utils::artifacts::{collect_outputs, ArtifactRecord, MissingOutputPolicy};
use crate::utils::command::ToolCommand;
use crate::utils::file::strip_fastq_extensions;
use crate::utils::params::{identity_flags, param_args, CommandSchema, ParamKind, ParamSpec, ParameterSet};
use crate::utils::samples::SampleRecord;
use crate::utils::server::JobServer;

pub const HTML_OUTPUT: &str = "FastQC html summary";
pub const ZIP_OUTPUT: &str = "FastQC data summary";

pub fn schema() -> CommandSchema {
    let mut schema = CommandSchema {
        name: "FastQC".to_string(),
        description: "Sequence QC".to_string(),
        input_types: vec![PER_SAMPLE_FASTQ.to_string()],
        params: vec![
            ParamSpec::new("extract", ParamKind::Boolean, false),
            ParamSpec::new("noextract", ParamKind::Boolean, true),
            ParamSpec::new("threads", ParamKind::Integer, 1),
            ParamSpec::new("kmers", ParamKind::Integer, 7),
        ],
        outputs: vec![
            (HTML_OUTPUT.to_string(), HTML_SUMMARY.to_string()),
            (ZIP_OUTPUT.to_string(), ZIP_FILE.to_string()),
        ],
        default_sets: BTreeMap::new(),
    };
    let defaults = schema.defaults();
    schema.default_sets.insert("Defaults".to_string(), defaults);
    schema
}

/// Report names FastQC derives from a read file name.
///
/// `s1_R1.fastq.gz` produces `s1_R1_fastqc.html` and `s1_R1_fastqc.zip`.
pub fn guess_fastqc_filename(path: &Path) -> (String, String) {
    let stem = strip_fastq_extensions(path);
    (format!("{}_fastqc.html", stem), format!("{}_fastqc.zip", stem))
}

/// One `fastqc` per sample, reports going to `{out_dir}/{run_prefix}`.
pub fn generate_fastqc_commands(
    samples: &[SampleRecord],
    params: &ParameterSet,
    out_dir: &Path,
) -> Result<Vec<ToolCommand>, PipelineError> {
    let param_tokens = param_args(params, &identity_flags(&schema()))?;
    let cmds = samples
        .iter()
        .map(|sample| {
            let mut cmd = ToolCommand::new(FASTQC_TAG)
                .arg("--outdir")
                .arg(path_arg(&out_dir.join(&sample.run_prefix)))
                .args(&param_tokens)
                .arg(path_arg(&sample.forward));
            if let Some(rev) = &sample.reverse {
                cmd = cmd.arg(path_arg(rev));
            }
            cmd
        })
        .collect();
    Ok(cmds)
}

/// Expected (path, role) pairs: html then zip for each read file.
fn expected_reports(out_dir: &Path, samples: &[SampleRecord]) -> Vec<(PathBuf, String)> {
    let mut expected = Vec::new();
    for sample in samples {
        let sample_dir = out_dir.join(&sample.run_prefix);
        for input in std::iter::once(&sample.forward).chain(sample.reverse.as_ref()) {
            let (html, zip) = guess_fastqc_filename(input);
            expected.push((sample_dir.join(html), HTML_SUMMARY.to_string()));
            expected.push((sample_dir.join(zip), ZIP_FILE.to_string()));
        }
    }
    expected
}

pub async fn run(
    server: &dyn JobServer,
    config: &RunConfig,
    params: ParameterSet,
) -> Result<Vec<ArtifactRecord>, PipelineError> {
    let input = collect_information(server, config, &schema(), params, 3)?;

    server.report_step(&config.job_id, "Step 2 of 3: Generating FastQC command");
    make_dirs(&config.out_dir, input.samples.iter().map(|s| s.run_prefix.as_str()))?;
    let commands = generate_fastqc_commands(&input.samples, &input.params, &config.out_dir)?;

    run_step(server, config, &commands, "FastQC", "Step 3 of 3: Executing FastQC job").await?;

    let files = collect_outputs(
        expected_reports(&config.out_dir, &input.samples),
        MissingOutputPolicy::FailIfEmpty,
        "FastQC",
    )?;
    let artifacts = files
        .into_iter()
        .map(|(path, role)| {
            let name = if role == HTML_SUMMARY { HTML_OUTPUT } else { ZIP_OUTPUT };
            ArtifactRecord::single(name, &role, path, &role)
        })
        .collect();
    Ok(artifacts)
}
