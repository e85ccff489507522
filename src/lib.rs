//! Plugin adapters that run shotgun metagenomics tools (Atropos, Bowtie2,
//! Shogun, HUMAnN2, FastQC, KneadData) over per-sample FASTQ artifacts and
//! package their outputs as typed artifacts.

pub mod cli;
pub mod config;
pub mod pipelines;
pub mod utils;

pub use cli::{Arguments, PluginCommand};
pub use config::defs::{DatabaseConfig, PipelineError, RunConfig};
