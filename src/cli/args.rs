use std::fmt;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum PluginCommand {
    Trim,
    Filter,
    Shogun,
    Humann2,
    Fastqc,
    Kneaddata,
}

impl PluginCommand {
    pub const ALL: [PluginCommand; 6] = [
        PluginCommand::Trim,
        PluginCommand::Filter,
        PluginCommand::Shogun,
        PluginCommand::Humann2,
        PluginCommand::Fastqc,
        PluginCommand::Kneaddata,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginCommand::Trim => "trim",
            PluginCommand::Filter => "filter",
            PluginCommand::Shogun => "shogun",
            PluginCommand::Humann2 => "humann2",
            PluginCommand::Fastqc => "fastqc",
            PluginCommand::Kneaddata => "kneaddata",
        }
    }
}

impl fmt::Display for PluginCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "qp-shotgun", version, about = "Shotgun metagenomics plugin commands")]
pub struct Arguments {
    #[arg(short, long, value_enum, required_unless_present = "schema")]
    pub command: Option<PluginCommand>,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'i', long = "forward", num_args = 1.., required_unless_present = "schema", help = "Forward read files (raw_forward_seqs)")]
    pub forward: Vec<String>,

    #[arg(short = 'I', long = "reverse", num_args = 1.., help = "Reverse read files (raw_reverse_seqs)")]
    pub reverse: Vec<String>,

    #[arg(short = 'm', long = "map", required_unless_present = "schema", help = "Prep metadata TSV with a run_prefix column")]
    pub map: Option<String>,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files. Defaults to '<command>_YYYYMMDD' in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(short = 'p', long = "params", help = "JSON object of parameter values; missing values take the schema defaults")]
    pub params: Option<String>,

    #[arg(long = "job-id", default_value = "local")]
    pub job_id: String,

    #[arg(long = "shogun-db-dir", help = "Folder holding one Shogun database per subfolder")]
    pub shogun_db_dir: Option<String>,

    #[arg(long = "filter-db-dir", help = "Folder holding one Bowtie2 index per subfolder as <name>/<name>")]
    pub filter_db_dir: Option<String>,

    #[arg(long, action, help = "Print every command schema as JSON and exit")]
    pub schema: bool,
}
