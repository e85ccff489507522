use std::collections::HashMap;
use std::path::PathBuf;

use lazy_static::lazy_static;
use thiserror::Error;

use crate::utils::samples::PairingError;

// External software
pub const ATROPOS_TAG: &str = "atropos";
pub const BOWTIE2_TAG: &str = "bowtie2";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const BEDTOOLS_TAG: &str = "bedtools";
pub const PIGZ_TAG: &str = "pigz";
pub const SHOGUN_TAG: &str = "shogun";
pub const BIOM_TAG: &str = "biom";
pub const HUMANN2_TAG: &str = "humann2";
pub const HUMANN2_JOIN_TAG: &str = "humann2_join_tables";
pub const HUMANN2_RENORM_TAG: &str = "humann2_renorm_table";
pub const HUMANN2_SPLIT_TAG: &str = "humann2_split_stratified_table";
pub const FASTQC_TAG: &str = "fastqc";
pub const KNEADDATA_TAG: &str = "kneaddata";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShogunSubcommand {
    Align,
    AssignTaxonomy,
    Redistribute,
    Functional,
}

impl ShogunSubcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShogunSubcommand::Align => "align",
            ShogunSubcommand::AssignTaxonomy => "assign_taxonomy",
            ShogunSubcommand::Redistribute => "redistribute",
            ShogunSubcommand::Functional => "functional",
        }
    }
}

pub const ALIGNERS: &[&str] = &["utree", "burst", "bowtie2"];

lazy_static! {
    /// Alignment file extension written by `shogun align` for each aligner.
    pub static ref ALIGNER_EXTENSIONS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("utree", "tsv");
        m.insert("burst", "b6");
        m.insert("bowtie2", "sam");
        m
    };
}

// Artifact types and file roles understood by the job server
pub const PER_SAMPLE_FASTQ: &str = "per_sample_FASTQ";
pub const BIOM_TYPE: &str = "BIOM";
pub const HTML_SUMMARY: &str = "html_summary";
pub const ZIP_FILE: &str = "zip_file";
pub const RAW_FORWARD_SEQS: &str = "raw_forward_seqs";
pub const RAW_REVERSE_SEQS: &str = "raw_reverse_seqs";
pub const PREPROCESSED_FASTQ: &str = "preprocessed_fastq";
pub const BIOM_ROLE: &str = "biom";

// Static Filenames
pub const COMBINED_FNA: &str = "combined.fna";
pub const SHOGUN_PROFILE: &str = "profile.tsv";
pub const JOB_OUTCOME_JSON: &str = "job_outcome.json";

// Static Parameters
pub const INPUT_PARAM: &str = "input";
pub const REDIST_LEVELS: &[&str] = &["genus", "species", "strain"];
pub const FUNCTIONAL_LEVELS: &[&str] = &["species"];
pub const FUNCTIONAL_BIOM_INPUTS: &[&str] = &[
    "kegg.modules.coverage",
    "kegg.modules",
    "kegg.pathways.coverage",
    "kegg.pathways",
    "kegg",
    "normalized",
];

pub const FASTQ_EXTS: &[&str] = &[".fastq", ".fq", ".gz", ".gzip"];

/// Database roots handed to the adapters that need a reference database.
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    pub shogun_db_dir: Option<PathBuf>,
    pub filter_db_dir: Option<PathBuf>,
}

/// Per-job context: who we report to and where outputs land.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub job_id: String,
    pub out_dir: PathBuf,
    pub databases: DatabaseConfig,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Error running {tool}:\nStd out: {stdout}\nStd err: {stderr}\n\nCommand run was:\n{command}")]
    ToolExecution {
        tool: String,
        command: String,
        stdout: String,
        stderr: String,
        code: Option<i32>,
    },

    #[error("No sequences left after {0}")]
    NoOutputs(String),

    #[error("I/O error: {0}")]
    IOError(String),

    #[error("Artifact {artifact} has no files with role '{role}'")]
    MissingArtifactFiles { artifact: String, role: String },
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}
