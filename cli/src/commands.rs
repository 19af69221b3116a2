pub mod prune;
pub mod scan;

use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(name = "exposr")]
#[command(version, about = "Finds open DNS resolvers and SNMP agents listed on Shodan.")]
pub struct CommandLine {
    /// YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Less output: -q hides headers, -qq leaves findings and errors
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Write one JSON object per verdict to stdout
    #[arg(long)]
    pub json: bool,

    /// Delete cached verdicts older than SECONDS, then exit
    #[arg(long, value_name = "SECONDS")]
    pub prune: Option<u64>,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
