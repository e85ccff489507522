pub mod fastqc;
pub mod filter;
pub mod humann2;
pub mod kneaddata;
pub mod shogun;
pub mod trim;

use std::path::{Path, PathBuf};

use log::{error, info};

use crate::cli::PluginCommand;
use crate::config::defs::{DatabaseConfig, PipelineError, RunConfig};
use crate::utils::command::{run_commands, ToolCommand};
use crate::utils::params::{CommandSchema, ParameterSet};
use crate::utils::samples::{resolve_pairs, SampleRecord};
use crate::utils::server::{JobOutcome, JobServer};

/// Schema of one plugin command.
pub fn schema(command: PluginCommand, databases: &DatabaseConfig) -> Result<CommandSchema, PipelineError> {
    match command {
        PluginCommand::Trim => Ok(trim::schema()),
        PluginCommand::Filter => filter::schema(databases),
        PluginCommand::Shogun => shogun::schema(databases),
        PluginCommand::Humann2 => Ok(humann2::schema()),
        PluginCommand::Fastqc => Ok(fastqc::schema()),
        PluginCommand::Kneaddata => Ok(kneaddata::schema()),
    }
}

pub fn schemas(databases: &DatabaseConfig) -> Result<Vec<CommandSchema>, PipelineError> {
    PluginCommand::ALL.iter().map(|c| schema(*c, databases)).collect()
}

/// Runs one job and folds every failure into the returned outcome.
///
/// # Arguments
///
/// * `command` - Which adapter to run.
/// * `server` - Source of input files and sink for progress messages.
/// * `config` - Job id, output directory and database roots.
/// * `params` - Raw parameter values, including the `input` artifact id.
///
/// # Returns
/// JobOutcome with the produced artifacts, or the failure message.
pub async fn execute(
    command: PluginCommand,
    server: &dyn JobServer,
    config: &RunConfig,
    params: ParameterSet,
) -> JobOutcome {
    info!("Starting {} job {}", command, config.job_id);
    let result = match command {
        PluginCommand::Trim => trim::run(server, config, params).await,
        PluginCommand::Filter => filter::run(server, config, params).await,
        PluginCommand::Shogun => shogun::run(server, config, params).await,
        PluginCommand::Humann2 => humann2::run(server, config, params).await,
        PluginCommand::Fastqc => fastqc::run(server, config, params).await,
        PluginCommand::Kneaddata => kneaddata::run(server, config, params).await,
    };
    match result {
        Ok(artifacts) => {
            info!("{} job {} produced {} artifact(s)", command, config.job_id, artifacts.len());
            JobOutcome::succeeded(artifacts)
        }
        Err(e) => {
            error!("{} job {} failed: {}", command, config.job_id, e);
            JobOutcome::failed(e.to_string())
        }
    }
}

/// Validated parameters and resolved samples for one job.
#[derive(Debug)]
pub(crate) struct JobInput {
    pub params: ParameterSet,
    pub samples: Vec<SampleRecord>,
    pub paired: bool,
}

/// First step shared by every adapter: pull the input artifact out of the
/// parameters, validate the rest and pair up the artifact's files.
pub(crate) fn collect_information(
    server: &dyn JobServer,
    config: &RunConfig,
    schema: &CommandSchema,
    mut params: ParameterSet,
    total_steps: usize,
) -> Result<JobInput, PipelineError> {
    server.report_step(&config.job_id, &format!("Step 1 of {}: Collecting information", total_steps));
    let artifact_id = params.take_input()?;
    let params = schema.validate(&params)?;

    let files = server.artifact_files(&artifact_id)?;
    let map_file = server.prep_metadata(&artifact_id)?;
    let samples = resolve_pairs(&files.forward, &files.reverse, &map_file)?;

    Ok(JobInput {
        params,
        samples,
        paired: !files.reverse.is_empty(),
    })
}

/// Runs one step's commands, reporting `{step} (i/n)` before each.
pub(crate) async fn run_step(
    server: &dyn JobServer,
    config: &RunConfig,
    commands: &[ToolCommand],
    tool: &str,
    step: &str,
) -> Result<(), PipelineError> {
    let total = commands.len();
    run_commands(commands, tool, |i| {
        server.report_step(&config.job_id, &format!("{} ({}/{})", step, i + 1, total))
    })
    .await
}

/// Text rendered in double quotes for `sh -c` scripts, with `\`, `"`, `$`
/// and backticks escaped so nothing inside is expanded.
pub(crate) fn shell_quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Path rendered in double quotes for shell scripts.
pub(crate) fn quoted(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Creates `{out_dir}/{name}` for every name and returns the paths.
pub(crate) fn make_dirs<'a, I>(out_dir: &Path, names: I) -> Result<Vec<PathBuf>, PipelineError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut dirs = Vec::new();
    for name in names {
        let dir = out_dir.join(name);
        std::fs::create_dir_all(&dir)?;
        dirs.push(dir);
    }
    Ok(dirs)
}
