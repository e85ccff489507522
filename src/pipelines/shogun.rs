//! Shogun taxonomic and functional profiling of combined reads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::defs::{
    DatabaseConfig, PipelineError, RunConfig, ShogunSubcommand, ALIGNERS, ALIGNER_EXTENSIONS, BIOM_ROLE,
    BIOM_TAG, BIOM_TYPE, FUNCTIONAL_BIOM_INPUTS, FUNCTIONAL_LEVELS, PER_SAMPLE_FASTQ, REDIST_LEVELS,
    SHOGUN_PROFILE, SHOGUN_TAG,
};
use crate::pipelines::{collect_information, path_arg, run_step};
use crate::utils::artifacts::{collect_outputs, ArtifactRecord, MissingOutputPolicy};
use crate::utils::command::ToolCommand;
use crate::utils::fastx::generate_fna_file;
use crate::utils::file::list_databases;
use crate::utils::params::{CommandSchema, ParamKind, ParamSpec, ParameterSet};
use crate::utils::server::JobServer;

pub const FUNCTIONAL_OUTPUT: &str = "Functional Predictions";
pub const TAXONOMIC_OUTPUT: &str = "Taxonomic Predictions";
pub const DATABASE_PARAM: &str = "Database";
pub const ALIGNER_PARAM: &str = "Aligner tool";
pub const THREADS_PARAM: &str = "Number of threads";
const DEFAULT_DB: &str = "ref82";

/// Typed view of the validated Shogun parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ShogunParams {
    pub database: String,
    pub aligner: String,
    pub threads: String,
}

impl ShogunParams {
    pub fn from_params(params: &ParameterSet) -> Result<Self, PipelineError> {
        let database = params.text(DATABASE_PARAM)?;
        if database.is_empty() {
            return Err(PipelineError::InvalidConfig(format!(
                "'{}' is empty; configure a Shogun database folder",
                DATABASE_PARAM
            )));
        }
        let aligner = params.text(ALIGNER_PARAM)?;
        if !ALIGNER_EXTENSIONS.contains_key(aligner.as_str()) {
            return Err(PipelineError::InvalidParameter {
                name: ALIGNER_PARAM.to_string(),
                reason: format!("unknown aligner '{}'", aligner),
            });
        }
        Ok(ShogunParams {
            database,
            aligner,
            threads: params.text(THREADS_PARAM)?,
        })
    }

    /// File `shogun align` writes for the selected aligner.
    pub fn alignment_file(&self, temp_dir: &Path) -> PathBuf {
        let ext = ALIGNER_EXTENSIONS.get(self.aligner.as_str()).copied().unwrap_or("tsv");
        temp_dir.join(format!("alignment.{}.{}", self.aligner, ext))
    }
}

/// Builds the Shogun schema with one database choice per folder under
/// `databases.shogun_db_dir`, and one default set per database and aligner.
pub fn schema(databases: &DatabaseConfig) -> Result<CommandSchema, PipelineError> {
    let dbs = match &databases.shogun_db_dir {
        Some(root) => list_databases(root, false)?,
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
        for aligner in ALIGNERS {
            default_sets.insert(
                format!("{}_{}", name, aligner),
                ParameterSet::new()
                    .with(DATABASE_PARAM, path.to_string_lossy().into_owned())
                    .with(ALIGNER_PARAM, *aligner)
                    .with(THREADS_PARAM, 1),
            );
        }
    }

    Ok(CommandSchema {
        name: "Shogun".to_string(),
        description: "Functional and Taxonomic Predictions".to_string(),
        input_types: vec![PER_SAMPLE_FASTQ.to_string()],
        params: vec![
            db_param,
            ParamSpec::new(ALIGNER_PARAM, ParamKind::choice(ALIGNERS), "bowtie2"),
            ParamSpec::new(THREADS_PARAM, ParamKind::Integer, 5),
        ],
        outputs: vec![
            (FUNCTIONAL_OUTPUT.to_string(), BIOM_TYPE.to_string()),
            (TAXONOMIC_OUTPUT.to_string(), BIOM_TYPE.to_string()),
        ],
        default_sets,
    })
}

fn shogun(subcommand: ShogunSubcommand) -> ToolCommand {
    ToolCommand::new(SHOGUN_TAG).arg(subcommand.as_str())
}

pub fn generate_shogun_align_commands(input: &Path, temp_dir: &Path, params: &ShogunParams) -> Vec<ToolCommand> {
    vec![shogun(ShogunSubcommand::Align)
        .args(["--aligner", params.aligner.as_str()])
        .args(["--threads", params.threads.as_str()])
        .args(["--database", params.database.as_str()])
        .arg("--input")
        .arg(path_arg(input))
        .arg("--output")
        .arg(path_arg(temp_dir))]
}

/// Returns the command and the taxonomic profile it writes.
pub fn generate_shogun_assign_taxonomy_commands(temp_dir: &Path, params: &ShogunParams) -> (Vec<ToolCommand>, PathBuf) {
    let output = temp_dir.join(SHOGUN_PROFILE);
    let cmd = shogun(ShogunSubcommand::AssignTaxonomy)
        .args(["--aligner", params.aligner.as_str()])
        .args(["--database", params.database.as_str()])
        .arg("--input")
        .arg(path_arg(&params.alignment_file(temp_dir)))
        .arg("--output")
        .arg(path_arg(&output));
    (vec![cmd], output)
}

pub fn generate_shogun_redist_commands(
    profile: &Path,
    temp_dir: &Path,
    params: &ShogunParams,
    level: &str,
) -> (Vec<ToolCommand>, PathBuf) {
    let output = temp_dir.join(format!("profile.redist.{}.tsv", level));
    let cmd = shogun(ShogunSubcommand::Redistribute)
        .args(["--database", params.database.as_str()])
        .args(["--level", level])
        .arg("--input")
        .arg(path_arg(profile))
        .arg("--output")
        .arg(path_arg(&output));
    (vec![cmd], output)
}

/// Returns the command and the folder the functional tables land in.
pub fn generate_shogun_functional_commands(
    profile: &Path,
    temp_dir: &Path,
    params: &ShogunParams,
    level: &str,
) -> (Vec<ToolCommand>, PathBuf) {
    let output = temp_dir.join("functional");
    let cmd = shogun(ShogunSubcommand::Functional)
        .args(["--database", params.database.as_str()])
        .arg("--input")
        .arg(path_arg(profile))
        .arg("--output")
        .arg(path_arg(&output))
        .args(["--level", level]);
    (vec![cmd], output)
}

/// Converts a TSV profile into `{out_dir}/otu_table.{level}.{version}.biom`.
pub fn generate_biom_conversion_commands(
    input: &Path,
    out_dir: &Path,
    level: &str,
    version: &str,
) -> (Vec<ToolCommand>, PathBuf) {
    let output = out_dir.join(format!("otu_table.{}.{}.biom", level, version));
    let cmd = ToolCommand::new(BIOM_TAG)
        .args(["convert", "-i"])
        .arg(path_arg(input))
        .arg("-o")
        .arg(path_arg(&output))
        .arg("--table-type=OTU table")
        .arg("--to-hdf5");
    (vec![cmd], output)
}

pub async fn run(
    server: &dyn JobServer,
    config: &RunConfig,
    params: ParameterSet,
) -> Result<Vec<ArtifactRecord>, PipelineError> {
    let schema = schema(&config.databases)?;
    let input = collect_information(server, config, &schema, params, 7)?;
    let params = ShogunParams::from_params(&input.params)?;
    let out_dir = &config.out_dir;

    server.report_step(&config.job_id, "Step 2 of 7: Converting to FNA for Shogun");
    let temp_dir = tempfile::Builder::new().prefix("shogun_").tempdir_in(out_dir)?;
    let temp = temp_dir.path().to_path_buf();
    let samples = input.samples.clone();
    let fna_dir = temp.clone();
    let combined = tokio::task::spawn_blocking(move || generate_fna_file(&fna_dir, &samples))
        .await
        .map_err(|e| PipelineError::IOError(format!("FNA conversion task failed: {}", e)))??;
    info!("Combined reads written to {}", combined.display());

    let align = generate_shogun_align_commands(&combined, &temp, &params);
    run_step(server, config, &align, "Shogun Align", "Step 3 of 7: Aligning FNA with Shogun").await?;

    let (assign, profile) = generate_shogun_assign_taxonomy_commands(&temp, &params);
    run_step(server, config, &assign, "Shogun taxonomy assignment", "Step 4 of 7: Taxonomic profile with Shogun").await?;

    let mut redist_profiles = Vec::new();
    for level in REDIST_LEVELS {
        let (cmds, output) = generate_shogun_redist_commands(&profile, &temp, &params, level);
        run_step(server, config, &cmds, "Shogun redistribute", "Step 5 of 7: Redistributed profile with Shogun").await?;
        redist_profiles.push((*level, output));
    }

    let mut functional_dirs = Vec::new();
    for level in FUNCTIONAL_LEVELS {
        let (cmds, output) = generate_shogun_functional_commands(&profile, &temp, &params, level);
        run_step(server, config, &cmds, "Shogun functional", "Step 6 of 7: Functional profile with Shogun").await?;
        functional_dirs.push((*level, output));
    }

    let step = "Step 7 of 7: Converting results to BIOM";
    let mut redist_bioms = Vec::new();
    for (level, redist) in &redist_profiles {
        let (cmds, output) = generate_biom_conversion_commands(redist, out_dir, level, "redist");
        run_step(server, config, &cmds, "Redistribute Biom conversion", step).await?;
        redist_bioms.push((output, BIOM_ROLE.to_string()));
    }
    let mut functional_bioms = Vec::new();
    for (level, func_dir) in &functional_dirs {
        for table in FUNCTIONAL_BIOM_INPUTS {
            let table_path = func_dir.join(format!("profile.{}.{}.txt", level, table));
            let (cmds, output) = generate_biom_conversion_commands(&table_path, out_dir, level, table);
            run_step(server, config, &cmds, "Functional Biom conversion", step).await?;
            functional_bioms.push((output, BIOM_ROLE.to_string()));
        }
    }
    temp_dir.close()?;

    let functional = collect_outputs(functional_bioms, MissingOutputPolicy::FailIfEmpty, "Shogun functional")?;
    let taxonomic = collect_outputs(redist_bioms, MissingOutputPolicy::FailIfEmpty, "Shogun redistribute")?;
    Ok(vec![
        ArtifactRecord::new(FUNCTIONAL_OUTPUT, BIOM_TYPE, functional),
        ArtifactRecord::new(TAXONOMIC_OUTPUT, BIOM_TYPE, taxonomic),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn params(aligner: &str) -> ShogunParams {
        ShogunParams {
            database: "/db/shogun".to_string(),
            aligner: aligner.to_string(),
            threads: "5".to_string(),
        }
    }

    #[test]
    fn test_align_command() {
        let cmds = generate_shogun_align_commands(Path::new("/tmp/s/combined.fna"), Path::new("/tmp/s"), &params("bowtie2"));
        assert_eq!(
            cmds[0].to_string(),
            "shogun align --aligner bowtie2 --threads 5 --database /db/shogun \
             --input /tmp/s/combined.fna --output /tmp/s"
        );
    }

    #[test]
    fn test_assign_taxonomy_uses_aligner_extension() {
        for (aligner, ext) in [("utree", "tsv"), ("burst", "b6"), ("bowtie2", "sam")] {
            let (cmds, profile) = generate_shogun_assign_taxonomy_commands(Path::new("/tmp/s"), &params(aligner));
            assert_eq!(profile, PathBuf::from("/tmp/s/profile.tsv"));
            assert_eq!(
                cmds[0].to_string(),
                format!(
                    "shogun assign_taxonomy --aligner {a} --database /db/shogun \
                     --input /tmp/s/alignment.{a}.{e} --output /tmp/s/profile.tsv",
                    a = aligner,
                    e = ext
                )
            );
        }
    }

    #[test]
    fn test_redistribute_and_functional_commands() {
        let profile = Path::new("/tmp/s/profile.tsv");
        let (cmds, out) = generate_shogun_redist_commands(profile, Path::new("/tmp/s"), &params("utree"), "genus");
        assert_eq!(out, PathBuf::from("/tmp/s/profile.redist.genus.tsv"));
        assert_eq!(
            cmds[0].to_string(),
            "shogun redistribute --database /db/shogun --level genus \
             --input /tmp/s/profile.tsv --output /tmp/s/profile.redist.genus.tsv"
        );

        let (cmds, out) = generate_shogun_functional_commands(profile, Path::new("/tmp/s"), &params("utree"), "species");
        assert_eq!(out, PathBuf::from("/tmp/s/functional"));
        assert_eq!(
            cmds[0].to_string(),
            "shogun functional --database /db/shogun --input /tmp/s/profile.tsv \
             --output /tmp/s/functional --level species"
        );
    }

    #[test]
    fn test_biom_conversion_command() {
        let (cmds, out) = generate_biom_conversion_commands(
            Path::new("/tmp/s/functional/profile.species.kegg.txt"),
            Path::new("/out"),
            "species",
            "kegg",
        );
        assert_eq!(out, PathBuf::from("/out/otu_table.species.kegg.biom"));
        assert_eq!(
            cmds[0].to_string(),
            "biom convert -i /tmp/s/functional/profile.species.kegg.txt \
             -o /out/otu_table.species.kegg.biom \"--table-type=OTU table\" --to-hdf5"
        );
    }

    #[test]
    fn test_params_rejects_missing_database() {
        let set = ParameterSet::new()
            .with(DATABASE_PARAM, "")
            .with(ALIGNER_PARAM, "bowtie2")
            .with(THREADS_PARAM, 5);
        assert!(matches!(ShogunParams::from_params(&set), Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_schema_default_sets_per_database_and_aligner() -> anyhow::Result<()> {
        let root = tempdir()?;
        fs::create_dir_all(root.path().join("ref82"))?;
        fs::create_dir_all(root.path().join("rep82"))?;
        let schema = schema(&DatabaseConfig {
            shogun_db_dir: Some(root.path().to_path_buf()),
            filter_db_dir: None,
        })?;

        assert_eq!(schema.default_sets.len(), 6);
        let set = &schema.default_sets["rep82_burst"];
        assert_eq!(set.text(ALIGNER_PARAM)?, "burst");
        assert_eq!(set.text(DATABASE_PARAM)?, root.path().join("rep82").to_string_lossy());
        assert_eq!(
            schema.defaults().text(DATABASE_PARAM)?,
            root.path().join("ref82").to_string_lossy()
        );
        assert_eq!(schema.defaults().text(ALIGNER_PARAM)?, "bowtie2");
        Ok(())
    }
}
