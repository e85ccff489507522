use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use env_logger::Builder;
use log::{error, info, LevelFilter};

use qp_shotgun::cli::{self, Arguments, PluginCommand};
use qp_shotgun::config::defs::{DatabaseConfig, RunConfig, INPUT_PARAM, JOB_OUTCOME_JSON};
use qp_shotgun::pipelines;
use qp_shotgun::utils::{JobOutcome, LocalJobServer, ParameterSet};

const LOCAL_ARTIFACT: &str = "local";

#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();
    let args = cli::parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let databases = DatabaseConfig {
        shogun_db_dir: args.shogun_db_dir.as_ref().map(PathBuf::from),
        filter_db_dir: args.filter_db_dir.as_ref().map(PathBuf::from),
    };

    if args.schema {
        let schemas = pipelines::schemas(&databases)?;
        println!("{}", serde_json::to_string_pretty(&schemas)?);
        return Ok(());
    }

    let command = args.command.ok_or_else(|| anyhow!("--command is required"))?;
    let cwd = std::env::current_dir()?;
    let out_dir = setup_output_dir(&args, command, &cwd)?;
    info!("Writing {} outputs to {}", command, out_dir.display());

    let params = load_params(args.params.as_deref())?;
    let server = LocalJobServer::new(
        args.forward.iter().map(PathBuf::from).collect(),
        args.reverse.iter().map(PathBuf::from).collect(),
        args.map.as_ref().map(PathBuf::from).ok_or_else(|| anyhow!("--map is required"))?,
    );
    let run_config = RunConfig {
        job_id: args.job_id.clone(),
        out_dir: out_dir.clone(),
        databases,
    };

    let outcome = pipelines::execute(command, &server, &run_config, params).await;
    write_outcome(&out_dir, &outcome)?;

    if !outcome.success {
        error!("Job failed after {} milliseconds.", run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}

/// Reads the JSON parameter object, pointing `input` at the local artifact
/// when the caller did not name one.
///
/// # Arguments
/// * `source` - Inline JSON, or a path to a JSON file.
///
/// # Returns
/// ParameterSet with an `input` entry.
fn load_params(source: Option<&str>) -> Result<ParameterSet> {
    let mut params = match source {
        None => ParameterSet::new(),
        Some(text) if text.trim_start().starts_with('{') => {
            serde_json::from_str(text).context("Parameters are not a JSON object")?
        }
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("Cannot read parameters from {}", path))?;
            serde_json::from_str(&text).with_context(|| format!("{} is not a JSON object", path))?
        }
    };
    if !params.contains(INPUT_PARAM) {
        params.insert(INPUT_PARAM, LOCAL_ARTIFACT);
    }
    Ok(params)
}

/// Sets up output directory
/// If `out_dir` is specified from args, uses it;
/// otherwise, creates a directory named `<command>_YYYYMMDD`.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `command` - Command being run.
/// * `cwd` - The current working directory.
/// # Returns
/// path to the output directory.
fn setup_output_dir(args: &Arguments, command: PluginCommand, cwd: &Path) -> Result<PathBuf> {
    let out_dir = match &args.out_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() { path } else { cwd.join(path) }
        }
        None => cwd.join(format!("{}_{}", command, chrono::Local::now().format("%Y%m%d"))),
    };
    fs::create_dir_all(&out_dir)?;
    Ok(out_dir)
}

fn write_outcome(out_dir: &Path, outcome: &JobOutcome) -> Result<()> {
    let path = out_dir.join(JOB_OUTCOME_JSON);
    let json = serde_json::to_string_pretty(outcome)?;
    fs::write(&path, json).with_context(|| format!("Cannot write {}", path.display()))?;
    info!("Job outcome written to {}", path.display());
    Ok(())
}
