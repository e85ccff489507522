use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::{tempdir, TempDir};

use qp_shotgun::config::defs::{DatabaseConfig, RunConfig};
use qp_shotgun::pipelines;
use qp_shotgun::utils::{LocalJobServer, ParameterSet};
use qp_shotgun::PluginCommand;

struct Job {
    _dir: TempDir,
    input_dir: PathBuf,
    config: RunConfig,
}

fn job(prefixes: &[(&str, &str)]) -> Result<Job> {
    let dir = tempdir()?;
    let input_dir = dir.path().join("input");
    let out_dir = dir.path().join("output");
    fs::create_dir_all(&input_dir)?;
    fs::create_dir_all(&out_dir)?;

    let mut prep = String::from("#SampleID\tplatform\trun_prefix\n");
    for (sample, rp) in prefixes {
        prep.push_str(&format!("{}\tIllumina\t{}\n", sample, rp));
    }
    fs::write(input_dir.join("prep.tsv"), prep)?;

    Ok(Job {
        config: RunConfig {
            job_id: "job-1".to_string(),
            out_dir,
            databases: DatabaseConfig::default(),
        },
        input_dir,
        _dir: dir,
    })
}

fn touch_inputs(dir: &Path, names: &[&str]) -> Result<Vec<PathBuf>> {
    names
        .iter()
        .map(|n| {
            let p = dir.join(n);
            fs::write(&p, "@r\nACGT\n+\nIIII\n")?;
            Ok(p)
        })
        .collect()
}

fn input_params() -> ParameterSet {
    ParameterSet::new().with("input", 5)
}

#[tokio::test]
async fn unmatched_forward_file_fails_before_running_anything() -> Result<()> {
    let job = job(&[("SKB1", "s1")])?;
    let forward = touch_inputs(&job.input_dir, &["s1_R1.fastq.gz", "s2_R1.fastq.gz"])?;
    let server = LocalJobServer::new(forward, vec![], job.input_dir.join("prep.tsv"));

    let outcome = pipelines::execute(PluginCommand::Trim, &server, &job.config, input_params()).await;

    assert!(!outcome.success);
    assert!(outcome.artifacts.is_none());
    assert_eq!(outcome.message, "No run prefix matching this fwd read: s2_R1.fastq.gz");
    assert_eq!(server.steps(), vec!["Step 1 of 4: Collecting information"]);
    Ok(())
}

#[tokio::test]
async fn unmatched_run_prefixes_are_reported_together() -> Result<()> {
    let job = job(&[("SKB1", "s1"), ("SKB3", "s3"), ("SKB4", "s4")])?;
    let forward = touch_inputs(&job.input_dir, &["s1_R1.fastq.gz"])?;
    let server = LocalJobServer::new(forward, vec![], job.input_dir.join("prep.tsv"));

    let outcome = pipelines::execute(PluginCommand::Fastqc, &server, &job.config, input_params()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.message, "Some run_prefix values do not match your sample names: s3, s4");
    Ok(())
}

#[tokio::test]
async fn mismatched_pair_count_fails() -> Result<()> {
    let job = job(&[("SKB1", "s1"), ("SKB2", "s2"), ("SKB3", "s3")])?;
    let forward = touch_inputs(&job.input_dir, &["s1_R1.fq", "s2_R1.fq", "s3_R1.fq"])?;
    let reverse = touch_inputs(&job.input_dir, &["s1_R2.fq", "s2_R2.fq"])?;
    let server = LocalJobServer::new(forward, reverse, job.input_dir.join("prep.tsv"));

    let outcome = pipelines::execute(PluginCommand::Kneaddata, &server, &job.config, input_params()).await;

    assert!(!outcome.success);
    assert!(outcome.message.starts_with("Your reverse and forward files are of different length."));
    Ok(())
}

#[tokio::test]
async fn missing_input_parameter_fails() -> Result<()> {
    let job = job(&[("SKB1", "s1")])?;
    let forward = touch_inputs(&job.input_dir, &["s1_R1.fastq.gz"])?;
    let server = LocalJobServer::new(forward, vec![], job.input_dir.join("prep.tsv"));

    let outcome = pipelines::execute(PluginCommand::Humann2, &server, &job.config, ParameterSet::new()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.message, "Missing parameter: input");
    Ok(())
}

#[tokio::test]
async fn invalid_parameter_values_fail() -> Result<()> {
    let job = job(&[("SKB1", "s1")])?;
    let forward = touch_inputs(&job.input_dir, &["s1_R1.fastq.gz"])?;
    let server = LocalJobServer::new(forward, vec![], job.input_dir.join("prep.tsv"));

    let bad_choice = input_params().with("Pair-end read required to match", "either");
    let outcome = pipelines::execute(PluginCommand::Trim, &server, &job.config, bad_choice).await;
    assert!(!outcome.success);
    assert!(outcome.message.starts_with("Invalid value for parameter 'Pair-end read required to match'"));

    let unknown = input_params().with("colour", "blue");
    let outcome = pipelines::execute(PluginCommand::Fastqc, &server, &job.config, unknown).await;
    assert!(!outcome.success);
    assert!(outcome.message.contains("'colour'"));
    Ok(())
}

#[tokio::test]
async fn filter_without_database_is_a_config_error() -> Result<()> {
    let job = job(&[("SKB1", "s1")])?;
    let forward = touch_inputs(&job.input_dir, &["s1_R1.fastq.gz"])?;
    let server = LocalJobServer::new(forward, vec![], job.input_dir.join("prep.tsv"));

    let outcome = pipelines::execute(PluginCommand::Filter, &server, &job.config, input_params()).await;

    assert!(!outcome.success);
    assert!(outcome.message.starts_with("Invalid configuration:"));
    assert!(!server.steps().iter().any(|s| s.starts_with("Step 3")));
    Ok(())
}

#[test]
fn schemas_serialize_for_every_command() -> Result<()> {
    let schemas = pipelines::schemas(&DatabaseConfig::default())?;
    assert_eq!(schemas.len(), PluginCommand::ALL.len());

    let json = serde_json::to_value(&schemas)?;
    assert_eq!(json[0]["name"], "Atropos v1.1.15");
    assert_eq!(json[0]["params"][4]["kind"], "choice:[\"any\", \"both\"]");
    assert_eq!(json[0]["default_sets"]["KAPA HyperPlus with iTru"]["Trim low-quality bases"], 15);
    assert_eq!(json[2]["params"][1]["kind"], "choice:[\"utree\", \"burst\", \"bowtie2\"]");
    assert_eq!(json[3]["outputs"].as_array().map(|o| o.len()), Some(12));
    Ok(())
}
