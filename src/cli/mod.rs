pub mod args;

pub use args::{Arguments, PluginCommand};

use clap::Parser;

pub fn parse() -> Arguments {
    Arguments::parse()
}
