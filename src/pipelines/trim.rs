//! QC_Trim: adapter and quality trimming with Atropos.

use std::collections::BTreeMap;
use std::path::Path;

use crate::config::defs::{
    PipelineError, RunConfig, ATROPOS_TAG, PER_SAMPLE_FASTQ, RAW_FORWARD_SEQS, RAW_REVERSE_SEQS,
};
use crate::pipelines::{collect_information, path_arg, run_step};
use crate::utils::artifacts::{collect_outputs, per_sample_expected, ArtifactRecord, MissingOutputPolicy};
use crate::utils::command::ToolCommand;
use crate::utils::params::{param_args, CommandSchema, ParamKind, ParamSpec, ParameterSet};
use crate::utils::samples::SampleRecord;
use crate::utils::server::JobServer;

pub const TRIM_OUTPUT: &str = "Adapter trimmed files";
const TRIMMED_PATTERN: &str = "{sample}.{read}.trimmed.fastq.gz";

/// Atropos flag token -> parameter name.
pub const ATROPOS_FLAGS: &[(&str, &str)] = &[
    ("adapter", "Fwd read adapter"),
    ("A", "Rev read adapter"),
    ("quality-cutoff", "Trim low-quality bases"),
    ("minimum-length", "Minimum trimmed read length"),
    ("pair-filter", "Pair-end read required to match"),
    ("max-n", "Maximum number of N bases in a read to keep it"),
    ("trim-n", "Trim Ns on ends of reads"),
    ("threads", "Number of threads used"),
    ("nextseq-trim", "NextSeq-specific quality trimming"),
];

const FWD_ADAPTER: &str = "GATCGGAAGAGCACACGTCTGAACTCCAGTCAC";
const REV_ADAPTER: &str = "GATCGGAAGAGCGTCGTGTAGGGAAAGGAGTGT";

pub fn schema() -> CommandSchema {
    let params = vec![
        ParamSpec::new("Fwd read adapter", ParamKind::String, FWD_ADAPTER),
        ParamSpec::new("Rev read adapter", ParamKind::String, REV_ADAPTER),
        ParamSpec::new("Trim low-quality bases", ParamKind::Integer, 15),
        ParamSpec::new("Minimum trimmed read length", ParamKind::Integer, 80),
        ParamSpec::new("Pair-end read required to match", ParamKind::choice(&["any", "both"]), "any"),
        ParamSpec::new("Maximum number of N bases in a read to keep it", ParamKind::Integer, 80),
        ParamSpec::new("Trim Ns on ends of reads", ParamKind::Boolean, true),
        ParamSpec::new("Number of threads used", ParamKind::Integer, 4),
        ParamSpec::new("NextSeq-specific quality trimming", ParamKind::Boolean, false),
    ];

    let mut kapa = ParameterSet::new();
    for spec in &params {
        kapa.insert(&spec.name, spec.default.clone());
    }
    let mut default_sets = BTreeMap::new();
    default_sets.insert("KAPA HyperPlus with iTru".to_string(), kapa);

    CommandSchema {
        name: "Atropos v1.1.15".to_string(),
        description: "Sequence QC - adapter trimming".to_string(),
        input_types: vec![PER_SAMPLE_FASTQ.to_string()],
        params,
        outputs: vec![(TRIM_OUTPUT.to_string(), PER_SAMPLE_FASTQ.to_string())],
        default_sets,
    }
}

/// One `atropos trim` per sample, writing `{sample}.R1/R2.trimmed.fastq.gz`
/// into `out_dir`. Samples without reverse reads run in single-end mode.
pub fn generate_trim_commands(
    samples: &[SampleRecord],
    params: &ParameterSet,
    out_dir: &Path,
) -> Result<Vec<ToolCommand>, PipelineError> {
    let param_tokens = param_args(params, ATROPOS_FLAGS)?;
    let mut cmds = Vec::with_capacity(samples.len());

    for sample in samples {
        let r1_out = out_dir.join(format!("{}.R1.trimmed.fastq.gz", sample.sample_id));
        let cmd = ToolCommand::new(ATROPOS_TAG)
            .arg("trim")
            .args(&param_tokens)
            .arg("-o")
            .arg(path_arg(&r1_out));
        let cmd = match &sample.reverse {
            Some(rev) => {
                let r2_out = out_dir.join(format!("{}.R2.trimmed.fastq.gz", sample.sample_id));
                cmd.arg("-p")
                    .arg(path_arg(&r2_out))
                    .arg("-pe1")
                    .arg(path_arg(&sample.forward))
                    .arg("-pe2")
                    .arg(path_arg(rev))
            }
            None => cmd.arg("-se").arg(path_arg(&sample.forward)),
        };
        cmds.push(cmd);
    }
    Ok(cmds)
}

pub async fn run(
    server: &dyn JobServer,
    config: &RunConfig,
    params: ParameterSet,
) -> Result<Vec<ArtifactRecord>, PipelineError> {
    let input = collect_information(server, config, &schema(), params, 4)?;

    server.report_step(&config.job_id, "Step 2 of 4: Generating QC_Trim commands");
    let commands = generate_trim_commands(&input.samples, &input.params, &config.out_dir)?;

    run_step(server, config, &commands, "QC_Trim", "Step 3 of 4: Executing QC_Trim job").await?;

    server.report_step(&config.job_id, "Step 4 of 4: Generating new artifacts");
    let sample_ids: Vec<&str> = input.samples.iter().map(|s| s.sample_id.as_str()).collect();
    let expected = per_sample_expected(
        &config.out_dir,
        &sample_ids,
        TRIMMED_PATTERN,
        [RAW_FORWARD_SEQS, RAW_REVERSE_SEQS],
    );
    let files = collect_outputs(expected, MissingOutputPolicy::FailIfEmpty, "Atropos")?;

    Ok(vec![ArtifactRecord::new(TRIM_OUTPUT, PER_SAMPLE_FASTQ, files)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn samples(paired: bool) -> Vec<SampleRecord> {
        ["s1", "s2"]
            .iter()
            .zip(["SKB1", "SKB2"])
            .map(|(rp, id)| SampleRecord {
                run_prefix: rp.to_string(),
                sample_id: id.to_string(),
                forward: PathBuf::from(format!("/in/{}_R1.fastq.gz", rp)),
                reverse: paired.then(|| PathBuf::from(format!("/in/{}_R2.fastq.gz", rp))),
            })
            .collect()
    }

    const PARAM_STR: &str = "-A GATCGGAAGAGCGTCGTGTAGGGAAAGGAGTGT \
        --adapter GATCGGAAGAGCACACGTCTGAACTCCAGTCAC --max-n 80 \
        --minimum-length 80 --pair-filter any --quality-cutoff 15 --threads 4 --trim-n";

    #[test]
    fn test_generate_trim_commands_paired() {
        let params = schema().defaults();
        let cmds = generate_trim_commands(&samples(true), &params, Path::new("/out")).unwrap();
        let obs: Vec<String> = cmds.iter().map(|c| c.to_string()).collect();
        assert_eq!(
            obs,
            vec![
                format!(
                    "atropos trim {} -o /out/SKB1.R1.trimmed.fastq.gz -p /out/SKB1.R2.trimmed.fastq.gz \
                     -pe1 /in/s1_R1.fastq.gz -pe2 /in/s1_R2.fastq.gz",
                    PARAM_STR
                ),
                format!(
                    "atropos trim {} -o /out/SKB2.R1.trimmed.fastq.gz -p /out/SKB2.R2.trimmed.fastq.gz \
                     -pe1 /in/s2_R1.fastq.gz -pe2 /in/s2_R2.fastq.gz",
                    PARAM_STR
                ),
            ]
        );
    }

    #[test]
    fn test_generate_trim_commands_single_end() {
        let params = schema().defaults();
        let cmds = generate_trim_commands(&samples(false)[..1], &params, Path::new("/out")).unwrap();
        assert_eq!(
            cmds[0].to_string(),
            format!("atropos trim {} -o /out/SKB1.R1.trimmed.fastq.gz -se /in/s1_R1.fastq.gz", PARAM_STR)
        );
    }

    #[test]
    fn test_nextseq_trim_flag() {
        let params = schema()
            .validate(&ParameterSet::new().with("NextSeq-specific quality trimming", "True"))
            .unwrap();
        let cmds = generate_trim_commands(&samples(false)[..1], &params, Path::new("/out")).unwrap();
        assert!(cmds[0].to_string().contains(" --nextseq-trim "));
    }

    #[test]
    fn test_schema_default_set() {
        let schema = schema();
        assert_eq!(schema.default_sets["KAPA HyperPlus with iTru"], schema.defaults());
        assert_eq!(schema.params.len(), ATROPOS_FLAGS.len());
    }
}
