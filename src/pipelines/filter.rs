//! QC_Filter: host/contaminant read removal with Bowtie2, samtools,
//! bedtools and pigz.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;

use crate::config::defs::{
    DatabaseConfig, PipelineError, RunConfig, BEDTOOLS_TAG, BOWTIE2_TAG, PER_SAMPLE_FASTQ, PIGZ_TAG,
    RAW_FORWARD_SEQS, RAW_REVERSE_SEQS, SAMTOOLS_TAG,
};
use crate::pipelines::{collect_information, quoted, run_step};
use crate::utils::artifacts::{collect_outputs, per_sample_expected, ArtifactRecord, MissingOutputPolicy};
use crate::utils::command::ToolCommand;
use crate::utils::file::list_databases;
use crate::utils::params::{format_params, CommandSchema, ParamKind, ParamSpec, ParameterSet, Quoting};
use crate::utils::samples::SampleRecord;
use crate::utils::server::JobServer;

pub const FILTER_OUTPUT: &str = "Filtered files";
pub const DATABASE_PARAM: &str = "Bowtie2 database to filter";
pub const THREADS_PARAM: &str = "Number of threads";
const DEFAULT_DB: &str = "phix";
const FILTERED_PATTERN: &str = "{sample}.{read}.trimmed.filtered.fastq.gz";

pub const BOWTIE2_FLAGS: &[(&str, &str)] = &[("x", DATABASE_PARAM), ("p", THREADS_PARAM)];

/// Typed view of the validated filter parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    pub database: String,
    pub threads: String,
}

impl FilterParams {
    pub fn from_params(params: &ParameterSet) -> Result<Self, PipelineError> {
        let database = params.text(DATABASE_PARAM)?;
        if database.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "'{}' is empty; configure a filter database folder",
                DATABASE_PARAM
            )));
        }
        Ok(FilterParams {
            database,
            threads: params.text(THREADS_PARAM)?,
        })
    }
}

/// Builds the QC_Filter schema from the Bowtie2 indexes under
/// `databases.filter_db_dir` (`<root>/<name>/<name>`).
pub fn schema(databases: &DatabaseConfig) -> Result<CommandSchema, PipelineError> {
    let dbs = match &databases.filter_db_dir {
        Some(root) => list_databases(root, true)?,
        None => BTreeMap::new(),
    };

    let db_param = if dbs.is_empty() {
        ParamSpec::new(DATABASE_PARAM, ParamKind::String, "")
    } else {
        let paths: Vec<String> = dbs.values().map(|p| p.to_string_lossy().into_owned()).collect();
        let default = dbs
            .get(DEFAULT_DB)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| paths[0].clone());
        ParamSpec::new(DATABASE_PARAM, ParamKind::Choice(paths), default)
    };

    let mut default_sets = BTreeMap::new();
    for (name, path) in &dbs {
        default_sets.insert(
            name.clone(),
            ParameterSet::new()
                .with(DATABASE_PARAM, path.to_string_lossy().into_owned())
                .with(THREADS_PARAM, 4),
        );
    }

    Ok(CommandSchema {
        name: "QC_Filter".to_string(),
        description: "Sequence QC - Filtering".to_string(),
        input_types: vec![PER_SAMPLE_FASTQ.to_string()],
        params: vec![db_param, ParamSpec::new(THREADS_PARAM, ParamKind::Integer, 5)],
        outputs: vec![(FILTER_OUTPUT.to_string(), PER_SAMPLE_FASTQ.to_string())],
        default_sets,
    })
}

/// One shell script per sample: align, keep unaligned pairs, sort by
/// name, convert back to FASTQ and compress into `out_dir`. Stages are
/// chained with `&&`, so the first failing tool ends the script.
///
/// # Arguments
///
/// * `samples` - Resolved samples.
/// * `params` - Validated parameters.
/// * `out_dir` - Job output directory for the compressed reads.
/// * `temp_dir` - Scratch directory for BAM and FASTQ intermediates.
///
/// # Returns
/// Shell commands in sample order.
pub fn generate_filter_commands(
    samples: &[SampleRecord],
    params: &ParameterSet,
    out_dir: &Path,
    temp_dir: &Path,
) -> Result<Vec<ToolCommand>, PipelineError> {
    let typed = FilterParams::from_params(params)?;
    let param_string = format_params(params, BOWTIE2_FLAGS, Quoting::Double)?;
    let threads = &typed.threads;

    let mut cmds = Vec::with_capacity(samples.len());
    for sample in samples {
        let id = &sample.sample_id;
        let sam = temp_dir.join(format!("{}.sam", id));
        let unsorted_bam = temp_dir.join(format!("{}.unsorted.bam", id));
        let sorted_bam = temp_dir.join(format!("{}.bam", id));
        let sort_prefix = temp_dir.join(id);
        let fq1 = temp_dir.join(format!("{}.R1.trimmed.filtered.fastq", id));
        let gz1 = out_dir.join(format!("{}.R1.trimmed.filtered.fastq.gz", id));

        let mut stages = Vec::new();
        match &sample.reverse {
            Some(rev) => {
                let fq2 = temp_dir.join(format!("{}.R2.trimmed.filtered.fastq", id));
                let gz2 = out_dir.join(format!("{}.R2.trimmed.filtered.fastq.gz", id));
                stages.push(format!(
                    "{} {} --very-sensitive -1 {} -2 {} -S {}",
                    BOWTIE2_TAG, param_string, quoted(&sample.forward), quoted(rev), quoted(&sam)
                ));
                stages.push(view_stage("-f 12", &unsorted_bam, &sam));
                stages.push(sort_stage(&sort_prefix, threads, &sorted_bam, &unsorted_bam));
                stages.push(format!(
                    "{} bamtofastq -i {} -fq {} -fq2 {}",
                    BEDTOOLS_TAG, quoted(&sorted_bam), quoted(&fq1), quoted(&fq2)
                ));
                stages.push(pigz_stage(threads, &fq1, &gz1));
                stages.push(pigz_stage(threads, &fq2, &gz2));
            }
            None => {
                stages.push(format!(
                    "{} {} --very-sensitive -U {} -S {}",
                    BOWTIE2_TAG, param_string, quoted(&sample.forward), quoted(&sam)
                ));
                stages.push(view_stage("-f 4", &unsorted_bam, &sam));
                stages.push(sort_stage(&sort_prefix, threads, &sorted_bam, &unsorted_bam));
                stages.push(format!("{} bamtofastq -i {} -fq {}", BEDTOOLS_TAG, quoted(&sorted_bam), quoted(&fq1)));
                stages.push(pigz_stage(threads, &fq1, &gz1));
            }
        }
        cmds.push(ToolCommand::shell(stages.join(" && ")));
    }
    Ok(cmds)
}

/// Keeps unaligned reads (`-f 12` for pairs, `-f 4` for single reads) and
/// drops secondary alignments.
fn view_stage(unaligned: &str, bam: &Path, sam: &Path) -> String {
    format!("{} view {} -F 256 -b -o {} {}", SAMTOOLS_TAG, unaligned, quoted(bam), quoted(sam))
}

fn sort_stage(prefix: &Path, threads: &str, sorted: &Path, unsorted: &Path) -> String {
    format!(
        "{} sort -T {} -@ {} -n -o {} {}",
        SAMTOOLS_TAG, quoted(prefix), threads, quoted(sorted), quoted(unsorted)
    )
}

fn pigz_stage(threads: &str, input: &Path, output: &Path) -> String {
    format!("{} -p {} -c {} > {}", PIGZ_TAG, threads, quoted(input), quoted(output))
}

pub async fn run(
    server: &dyn JobServer,
    config: &RunConfig,
    params: ParameterSet,
) -> Result<Vec<ArtifactRecord>, PipelineError> {
    let schema = schema(&config.databases)?;
    let input = collect_information(server, config, &schema, params, 4)?;

    server.report_step(&config.job_id, "Step 2 of 4: Generating QC_Filter commands");
    let temp_dir = tempfile::Builder::new().prefix("qc_filter_").tempdir_in(&config.out_dir)?;
    info!("Filtering intermediates go to {}", temp_dir.path().display());
    let commands = generate_filter_commands(&input.samples, &input.params, &config.out_dir, temp_dir.path())?;

    run_step(server, config, &commands, "QC_Filter", "Step 3 of 4: Executing QC_Filter job").await?;

    server.report_step(&config.job_id, "Step 4 of 4: Generating new artifacts");
    let sample_ids: Vec<&str> = input.samples.iter().map(|s| s.sample_id.as_str()).collect();
    let expected = per_sample_expected(
        &config.out_dir,
        &sample_ids,
        FILTERED_PATTERN,
        [RAW_FORWARD_SEQS, RAW_REVERSE_SEQS],
    );
    let files = collect_outputs(expected, MissingOutputPolicy::FailIfEmpty, "filtering")?;
    temp_dir.close()?;

    Ok(vec![ArtifactRecord::new(FILTER_OUTPUT, PER_SAMPLE_FASTQ, files)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample(paired: bool) -> SampleRecord {
        SampleRecord {
            run_prefix: "s1".to_string(),
            sample_id: "SKB1".to_string(),
            forward: PathBuf::from("/in/s1_R1.fastq.gz"),
            reverse: paired.then(|| PathBuf::from("/in/s1_R2.fastq.gz")),
        }
    }

    fn params() -> ParameterSet {
        ParameterSet::new()
            .with(DATABASE_PARAM, "/db/phix/phix")
            .with(THREADS_PARAM, 4)
    }

    #[test]
    fn test_generate_filter_commands_paired() {
        let cmds = generate_filter_commands(&[sample(true)], &params(), Path::new("/out"), Path::new("/tmp/qc")).unwrap();
        let exp = "bowtie2 -p \"4\" -x \"/db/phix/phix\" --very-sensitive -1 \"/in/s1_R1.fastq.gz\" \
                   -2 \"/in/s1_R2.fastq.gz\" -S \"/tmp/qc/SKB1.sam\" && \
                   samtools view -f 12 -F 256 -b -o \"/tmp/qc/SKB1.unsorted.bam\" \"/tmp/qc/SKB1.sam\" && \
                   samtools sort -T \"/tmp/qc/SKB1\" -@ 4 -n -o \"/tmp/qc/SKB1.bam\" \"/tmp/qc/SKB1.unsorted.bam\" && \
                   bedtools bamtofastq -i \"/tmp/qc/SKB1.bam\" -fq \"/tmp/qc/SKB1.R1.trimmed.filtered.fastq\" \
                   -fq2 \"/tmp/qc/SKB1.R2.trimmed.filtered.fastq\" && \
                   pigz -p 4 -c \"/tmp/qc/SKB1.R1.trimmed.filtered.fastq\" > \"/out/SKB1.R1.trimmed.filtered.fastq.gz\" && \
                   pigz -p 4 -c \"/tmp/qc/SKB1.R2.trimmed.filtered.fastq\" > \"/out/SKB1.R2.trimmed.filtered.fastq.gz\"";
        assert_eq!(cmds[0].to_string(), exp);
    }

    #[test]
    fn test_generate_filter_commands_single_end() {
        let cmds = generate_filter_commands(&[sample(false)], &params(), Path::new("/out"), Path::new("/tmp/qc")).unwrap();
        let obs = cmds[0].to_string();
        assert!(obs.starts_with(
            "bowtie2 -p \"4\" -x \"/db/phix/phix\" --very-sensitive -U \"/in/s1_R1.fastq.gz\" \
             -S \"/tmp/qc/SKB1.sam\" && samtools view -f 4 -F 256 -b -o \"/tmp/qc/SKB1.unsorted.bam\" \"/tmp/qc/SKB1.sam\" && "
        ));
        assert!(!obs.contains('|'));
        assert!(!obs.contains("-fq2"));
        assert!(!obs.contains("R2"));
    }

    #[test]
    fn test_empty_database_rejected() {
        let params = ParameterSet::new().with(DATABASE_PARAM, "").with(THREADS_PARAM, 4);
        let err = generate_filter_commands(&[sample(true)], &params, Path::new("/out"), Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn test_schema_from_database_folder() -> anyhow::Result<()> {
        let root = tempdir()?;
        fs::create_dir_all(root.path().join("phix"))?;
        fs::create_dir_all(root.path().join("human"))?;
        let schema = schema(&DatabaseConfig {
            shogun_db_dir: None,
            filter_db_dir: Some(root.path().to_path_buf()),
        })?;

        let phix = root.path().join("phix").join("phix").to_string_lossy().into_owned();
        assert_eq!(schema.defaults().text(DATABASE_PARAM)?, phix);
        assert_eq!(schema.default_sets.len(), 2);
        assert_eq!(schema.default_sets["human"].text(THREADS_PARAM)?, "4");
        assert!(schema.params[0].kind.tag().starts_with("choice:["));
        Ok(())
    }

    #[test]
    fn test_schema_without_databases() -> anyhow::Result<()> {
        let schema = schema(&DatabaseConfig::default())?;
        assert!(schema.default_sets.is_empty());
        assert_eq!(schema.params[0].kind, ParamKind::String);
        Ok(())
    }
}
