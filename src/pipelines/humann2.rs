//! HUMAnN2 community profiling, followed by table joining, renormalisation
//! and stratification.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::defs::{
    PipelineError, RunConfig, BIOM_ROLE, BIOM_TYPE, HUMANN2_JOIN_TAG, HUMANN2_RENORM_TAG, HUMANN2_SPLIT_TAG,
    HUMANN2_TAG, PER_SAMPLE_FASTQ,
};
use crate::pipelines::{collect_information, make_dirs, path_arg, run_step};
use crate::utils::artifacts::{collect_outputs, ArtifactRecord, MissingOutputPolicy};
use crate::utils::command::ToolCommand;
use crate::utils::file::strip_fastq_extensions;
use crate::utils::params::{identity_flags, param_args, CommandSchema, ParamKind, ParamSpec, ParameterSet};
use crate::utils::samples::SampleRecord;
use crate::utils::server::JobServer;

/// (table, renormalisation unit, artifact label, unit label)
const TABLES: [(&str, &str, &str, &str); 3] = [
    ("genefamilies", "cpm", "Gene family", "CMP"),
    ("pathcoverage", "relab", "Path coverage", "RELAB"),
    ("pathabundance", "relab", "Path abundance", "RELAB"),
];

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];
const ON_OFF: &[&str] = &["on", "off"];

pub fn schema() -> CommandSchema {
    let params = vec![
        ParamSpec::new("nucleotide-database", ParamKind::choice(&["default"]), "default"),
        ParamSpec::new("protein-database", ParamKind::choice(&["default"]), "default"),
        ParamSpec::new("bypass-prescreen", ParamKind::Boolean, false),
        ParamSpec::new("bypass-nucleotide-index", ParamKind::Boolean, false),
        ParamSpec::new("bypass-translated-search", ParamKind::Boolean, false),
        ParamSpec::new("bypass-nucleotide-search", ParamKind::Boolean, false),
        ParamSpec::new("annotation-gene-index", ParamKind::Integer, 8),
        ParamSpec::new("evalue", ParamKind::Float, 1.0),
        ParamSpec::new("metaphlan-options", ParamKind::String, "-t rel_ab"),
        ParamSpec::new("log-level", ParamKind::choice(LOG_LEVELS), "DEBUG"),
        ParamSpec::new("remove-temp-output", ParamKind::Boolean, false),
        ParamSpec::new("threads", ParamKind::Integer, 1),
        ParamSpec::new("prescreen-threshold", ParamKind::Float, 0.01),
        ParamSpec::new("identity-threshold", ParamKind::Float, 50.0),
        ParamSpec::new("translated-subject-coverage-threshold", ParamKind::Float, 50.0),
        ParamSpec::new("translated-query-coverage-threshold", ParamKind::Float, 90.0),
        ParamSpec::new(
            "translated-alignment",
            ParamKind::choice(&["usearch", "rapsearch", "diamond"]),
            "diamond",
        ),
        ParamSpec::new("xipe", ParamKind::choice(ON_OFF), "off"),
        ParamSpec::new("minpath", ParamKind::choice(ON_OFF), "on"),
        ParamSpec::new("pick-frames", ParamKind::choice(ON_OFF), "off"),
        ParamSpec::new("gap-fill", ParamKind::choice(ON_OFF), "off"),
        ParamSpec::new("output-max-decimals", ParamKind::Integer, 10),
        ParamSpec::new("remove-stratified-output", ParamKind::Boolean, false),
        ParamSpec::new("pathways", ParamKind::choice(&["metacyc", "unipathway"]), "metacyc"),
        ParamSpec::new("memory-use", ParamKind::choice(&["minimum", "maximum"]), "minimum"),
        ParamSpec::new("remove-column-description-output", ParamKind::Boolean, true),
    ];

    let outputs = artifact_names().into_iter().map(|(name, _)| (name, BIOM_TYPE.to_string())).collect();
    let mut schema = CommandSchema {
        name: "HUMAnN2 0.9.1".to_string(),
        description: "Community profiling".to_string(),
        input_types: vec![PER_SAMPLE_FASTQ.to_string()],
        params,
        outputs,
        default_sets: BTreeMap::new(),
    };
    let defaults = schema.defaults();
    schema.default_sets.insert("Defaults".to_string(), defaults);
    schema
}

/// Artifact names and file names, in registration order: joined tables,
/// renormalised tables, then stratified and unstratified splits.
fn artifact_names() -> Vec<(String, String)> {
    let mut names = Vec::new();
    for (table, _, label, _) in TABLES {
        names.push((format!("{} table", label), format!("{}.biom", table)));
    }
    for (table, unit, label, unit_label) in TABLES {
        names.push((format!("{} {} table", label, unit_label), format!("{}_{}.biom", table, unit)));
    }
    for split in ["stratified", "unstratified"] {
        for (table, unit, label, unit_label) in TABLES {
            names.push((
                format!("{} {} table - {}", label, unit_label, split),
                format!("{}_{}_{}.biom", table, unit, split),
            ));
        }
    }
    names
}

/// Output folder name for one input file: its name without FASTQ suffixes.
pub fn output_folder(path: &Path) -> String {
    strip_fastq_extensions(path)
}

/// One `humann2` run per input file; reverse files are profiled on their
/// own and share the sample id of their forward file.
pub fn generate_humann2_analysis_commands(
    samples: &[SampleRecord],
    params: &ParameterSet,
    out_dir: &Path,
) -> Result<Vec<ToolCommand>, PipelineError> {
    let flags = identity_flags(&schema());
    let param_tokens = param_args(params, &flags)?;

    let mut cmds = Vec::new();
    for sample in samples {
        let inputs = std::iter::once(&sample.forward).chain(sample.reverse.as_ref());
        for input in inputs {
            let output = out_dir.join(output_folder(input));
            cmds.push(
                ToolCommand::new(HUMANN2_TAG)
                    .arg("--input")
                    .arg(path_arg(input))
                    .arg("--output")
                    .arg(path_arg(&output))
                    .args(["--output-basename", sample.sample_id.as_str()])
                    .args(["--output-format", "biom"])
                    .args(&param_tokens),
            );
        }
    }
    Ok(cmds)
}

pub fn generate_join_commands(out_dir: &Path) -> Vec<ToolCommand> {
    TABLES
        .iter()
        .map(|(table, ..)| {
            ToolCommand::new(HUMANN2_JOIN_TAG)
                .arg("-i")
                .arg(path_arg(out_dir))
                .arg("-o")
                .arg(path_arg(&out_dir.join(format!("{}.biom", table))))
                .args(["--file_name", *table])
                .args(["--search-subdirectories", "--verbose"])
        })
        .collect()
}

pub fn generate_renorm_commands(out_dir: &Path) -> Vec<ToolCommand> {
    TABLES
        .iter()
        .map(|(table, unit, ..)| {
            ToolCommand::new(HUMANN2_RENORM_TAG)
                .arg("-i")
                .arg(path_arg(&out_dir.join(format!("{}.biom", table))))
                .args(["-u", *unit])
                .arg("-o")
                .arg(path_arg(&out_dir.join(format!("{}_{}.biom", table, unit))))
        })
        .collect()
}

pub fn generate_split_commands(out_dir: &Path) -> Vec<ToolCommand> {
    TABLES
        .iter()
        .map(|(table, unit, ..)| {
            ToolCommand::new(HUMANN2_SPLIT_TAG)
                .arg("--input")
                .arg(path_arg(&out_dir.join(format!("{}_{}.biom", table, unit))))
                .arg("--output")
                .arg(path_arg(out_dir))
        })
        .collect()
}

pub async fn run(
    server: &dyn JobServer,
    config: &RunConfig,
    params: ParameterSet,
) -> Result<Vec<ArtifactRecord>, PipelineError> {
    let input = collect_information(server, config, &schema(), params, 6)?;
    let out_dir = &config.out_dir;

    server.report_step(&config.job_id, "Step 2 of 6: Generating HUMAnN2 command");
    let folders: Vec<String> = input
        .samples
        .iter()
        .flat_map(|s| std::iter::once(&s.forward).chain(s.reverse.as_ref()))
        .map(|p| output_folder(p))
        .collect();
    make_dirs(out_dir, folders.iter().map(|f| f.as_str()))?;
    let commands = generate_humann2_analysis_commands(&input.samples, &input.params, out_dir)?;

    run_step(server, config, &commands, "HUMAnN2", "Step 3 of 6: Executing HUMAnN2 job").await?;
    run_step(server, config, &generate_join_commands(out_dir), "HUMAnN2", "Step 4 of 6: Merging resulting tables job").await?;
    run_step(server, config, &generate_renorm_commands(out_dir), "HUMAnN2", "Step 5 of 6: Re-normalizing tables").await?;
    run_step(server, config, &generate_split_commands(out_dir), "HUMAnN2", "Step 6 of 6: Stratifiying re-normalizing tables").await?;

    let mut artifacts = Vec::new();
    for (name, file) in artifact_names() {
        let expected = vec![(out_dir.join(&file), BIOM_ROLE.to_string())];
        let files = collect_outputs(expected, MissingOutputPolicy::FailIfEmpty, &format!("HUMAnN2 ({})", file))?;
        artifacts.push(ArtifactRecord::new(&name, BIOM_TYPE, files));
    }
    Ok(artifacts)
}

/// Every file the HUMAnN2 job registers, relative to the output directory.
pub fn expected_tables() -> Vec<PathBuf> {
    artifact_names().into_iter().map(|(_, file)| PathBuf::from(file)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<SampleRecord> {
        vec![SampleRecord {
            run_prefix: "s1".to_string(),
            sample_id: "SKB8.640193".to_string(),
            forward: PathBuf::from("/in/s1_R1.fastq.gz"),
            reverse: Some(PathBuf::from("/in/s1_R2.fastq.gz")),
        }]
    }

    #[test]
    fn test_analysis_commands_one_per_file() {
        let params = schema().defaults();
        let cmds = generate_humann2_analysis_commands(&samples(), &params, Path::new("/out")).unwrap();
        assert_eq!(cmds.len(), 2);

        let fwd = cmds[0].to_string();
        assert!(fwd.starts_with(
            "humann2 --input /in/s1_R1.fastq.gz --output /out/s1_R1 --output-basename SKB8.640193 \
             --output-format biom --annotation-gene-index 8 --evalue 1.0 --gap-fill off"
        ));
        assert!(fwd.contains("--metaphlan-options \"-t rel_ab\""));
        assert!(fwd.ends_with("--xipe off"));
        assert!(fwd.contains("--remove-column-description-output"));
        assert!(!fwd.contains("bypass"));
        assert!(!fwd.contains("nucleotide-database"));

        assert!(cmds[1].to_string().starts_with("humann2 --input /in/s1_R2.fastq.gz --output /out/s1_R2 --output-basename SKB8.640193"));
    }

    #[test]
    fn test_metaphlan_options_stay_one_argument() {
        let params = schema().defaults();
        let cmds = generate_humann2_analysis_commands(&samples(), &params, Path::new("/out")).unwrap();
        match &cmds[0] {
            ToolCommand::Argv { args, .. } => assert!(args.iter().any(|a| a == "-t rel_ab")),
            other => panic!("expected argv command, got {:?}", other),
        }
    }

    #[test]
    fn test_post_processing_commands() {
        let out = Path::new("/out");
        let join: Vec<String> = generate_join_commands(out).iter().map(|c| c.to_string()).collect();
        assert_eq!(
            join[0],
            "humann2_join_tables -i /out -o /out/genefamilies.biom --file_name genefamilies --search-subdirectories --verbose"
        );
        let renorm: Vec<String> = generate_renorm_commands(out).iter().map(|c| c.to_string()).collect();
        assert_eq!(renorm[0], "humann2_renorm_table -i /out/genefamilies.biom -u cpm -o /out/genefamilies_cpm.biom");
        assert_eq!(renorm[2], "humann2_renorm_table -i /out/pathabundance.biom -u relab -o /out/pathabundance_relab.biom");
        let split: Vec<String> = generate_split_commands(out).iter().map(|c| c.to_string()).collect();
        assert_eq!(split[1], "humann2_split_stratified_table --input /out/pathcoverage_relab.biom --output /out");
    }

    #[test]
    fn test_twelve_outputs() {
        let names = artifact_names();
        assert_eq!(names.len(), 12);
        assert_eq!(names[3], ("Gene family CMP table".to_string(), "genefamilies_cpm.biom".to_string()));
        assert_eq!(
            names[11],
            (
                "Path abundance RELAB table - unstratified".to_string(),
                "pathabundance_relab_unstratified.biom".to_string()
            )
        );
        assert_eq!(schema().outputs.len(), 12);
        assert_eq!(expected_tables()[0], PathBuf::from("genefamilies.biom"));
    }

    #[test]
    fn test_output_folder() {
        assert_eq!(output_folder(Path::new("/in/s1_R1.fastq.gz")), "s1_R1");
        assert_eq!(output_folder(Path::new("/in/s1_R1.fastq")), "s1_R1");
    }
}
