//! KneadData quality control and host read removal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::defs::{PipelineError, RunConfig, KNEADDATA_TAG, PER_SAMPLE_FASTQ, PREPROCESSED_FASTQ};
use crate::pipelines::{collect_information, make_dirs, quoted, run_step, shell_quote};
use crate::utils::artifacts::{collect_outputs, ArtifactRecord, MissingOutputPolicy};
use crate::utils::command::ToolCommand;
use crate::utils::file::gzip_file;
use crate::utils::params::{format_params, identity_flags, CommandSchema, ParamKind, ParamSpec, ParameterSet, Quoting};
use crate::utils::samples::SampleRecord;
use crate::utils::server::JobServer;

pub const KNEADDATA_OUTPUT: &str = "KneadData files";

const PAIRED_SUFFIXES: &[&str] = &["_paired_1.fastq", "_paired_2.fastq", "_unmatched_1.fastq", "_unmatched_2.fastq"];
const SINGLE_SUFFIXES: &[&str] = &[".fastq"];

const TRIMMOMATIC_OPTIONS: &str =
    "ILLUMINACLIP:$trimmomatic/adapters/TruSeq3-PE-2.fa:2:30:10 LEADING:3 TRAILING:3 SLIDINGWINDOW:4:15 MINLEN:36";

pub fn schema() -> CommandSchema {
    let params = vec![
        ParamSpec::new("reference-db", ParamKind::choice(&["human_genome"]), "human_genome"),
        ParamSpec::new("bypass-trim", ParamKind::Boolean, false),
        ParamSpec::new("threads", ParamKind::Integer, 1),
        ParamSpec::new("processes", ParamKind::Integer, 1),
        ParamSpec::new("quality-scores", ParamKind::choice(&["phred33", "phred64"]), "phred33"),
        ParamSpec::new("run-bmtagger", ParamKind::Boolean, false),
        ParamSpec::new("run-trf", ParamKind::Boolean, false),
        ParamSpec::new("run-fastqc-start", ParamKind::Boolean, true),
        ParamSpec::new("run-fastqc-end", ParamKind::Boolean, true),
        ParamSpec::new("store-temp-output", ParamKind::Boolean, false),
        ParamSpec::new(
            "log-level",
            ParamKind::choice(&["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"]),
            "DEBUG",
        ),
        ParamSpec::new("max-memory", ParamKind::Integer, 500),
        ParamSpec::new("trimmomatic-options", ParamKind::String, TRIMMOMATIC_OPTIONS),
        ParamSpec::new("bowtie2-options", ParamKind::String, "--very-sensitive"),
        ParamSpec::new("match", ParamKind::Integer, 2),
        ParamSpec::new("mismatch", ParamKind::Integer, 7),
        ParamSpec::new("delta", ParamKind::Integer, 7),
        ParamSpec::new("pm", ParamKind::Integer, 80),
        ParamSpec::new("pi", ParamKind::Integer, 10),
        ParamSpec::new("minscore", ParamKind::Integer, 50),
        ParamSpec::new("maxperiod", ParamKind::Integer, 500),
    ];

    let mut schema = CommandSchema {
        name: "KneadData".to_string(),
        description: "Sequence QC".to_string(),
        input_types: vec![PER_SAMPLE_FASTQ.to_string()],
        params,
        outputs: vec![(KNEADDATA_OUTPUT.to_string(), PER_SAMPLE_FASTQ.to_string())],
        default_sets: BTreeMap::new(),
    };
    let defaults = schema.defaults();
    schema.default_sets.insert("Defaults".to_string(), defaults);
    schema
}

/// One `kneaddata` per sample, writing into `{out_dir}/{run_prefix}`.
///
/// Runs through the shell so `$trimmomatic` in the Trimmomatic options
/// expands to the installed adapter folder.
pub fn generate_kneaddata_commands(
    samples: &[SampleRecord],
    params: &ParameterSet,
    out_dir: &Path,
) -> Result<Vec<ToolCommand>, PipelineError> {
    let param_string = format_params(params, &identity_flags(&schema()), Quoting::Double)?;

    let cmds = samples
        .iter()
        .map(|sample| {
            let inputs = match &sample.reverse {
                Some(rev) => format!("--input {} --input {}", quoted(&sample.forward), quoted(rev)),
                None => format!("--input {}", quoted(&sample.forward)),
            };
            ToolCommand::shell(format!(
                "{} {} --output {} --output-prefix {} {}",
                KNEADDATA_TAG,
                inputs,
                quoted(&out_dir.join(&sample.run_prefix)),
                shell_quote(&sample.run_prefix),
                param_string
            ))
        })
        .collect();
    Ok(cmds)
}

/// Files KneadData writes for each sample, in registration order.
pub fn expected_outputs(out_dir: &Path, samples: &[SampleRecord], paired: bool) -> Vec<(PathBuf, String)> {
    let suffixes = if paired { PAIRED_SUFFIXES } else { SINGLE_SUFFIXES };
    let mut expected = Vec::new();
    for sample in samples {
        let rp = &sample.run_prefix;
        for suffix in suffixes {
            expected.push((out_dir.join(rp).join(format!("{}{}", rp, suffix)), PREPROCESSED_FASTQ.to_string()));
        }
    }
    expected
}

pub async fn run(
    server: &dyn JobServer,
    config: &RunConfig,
    params: ParameterSet,
) -> Result<Vec<ArtifactRecord>, PipelineError> {
    let input = collect_information(server, config, &schema(), params, 4)?;

    server.report_step(&config.job_id, "Step 2 of 4: Generating KneadData commands");
    make_dirs(&config.out_dir, input.samples.iter().map(|s| s.run_prefix.as_str()))?;
    let commands = generate_kneaddata_commands(&input.samples, &input.params, &config.out_dir)?;

    run_step(server, config, &commands, "KneadData", "Step 3 of 4: Executing KneadData job").await?;

    server.report_step(&config.job_id, "Step 4 of 4: Generating new artifacts");
    let expected = expected_outputs(&config.out_dir, &input.samples, input.paired);
    let files = collect_outputs(expected, MissingOutputPolicy::Backfill, "KneadData")?;

    let gzipped = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<(PathBuf, String)>> {
        let mut gzipped = Vec::with_capacity(files.len());
        for (path, role) in files {
            let gz = gzip_file(&path)?;
            debug!("Compressed {} to {}", path.display(), gz.display());
            gzipped.push((gz, role));
        }
        Ok(gzipped)
    })
    .await
    .map_err(|e| PipelineError::IOError(format!("Compression task failed: {}", e)))??;

    Ok(vec![ArtifactRecord::new(KNEADDATA_OUTPUT, PER_SAMPLE_FASTQ, gzipped)])
}
