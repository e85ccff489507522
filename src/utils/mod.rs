pub mod artifacts;
pub mod command;
pub mod fastx;
pub mod file;
pub mod params;
pub mod samples;
pub mod server;

pub use artifacts::{ArtifactRecord, MissingOutputPolicy};
pub use params::{CommandSchema, ParameterSet};
pub use samples::SampleRecord;
pub use server::{JobOutcome, JobServer, LocalJobServer};
