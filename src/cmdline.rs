//! Command line parsing for the pulsekit binary.
use argh::FromArgs;
use pulsekit_utils::OutputFile;
use std::path::PathBuf;

#[derive(FromArgs, Debug)]
/// Inspect serialized pulse-control programs.
pub struct Opts {
    /// logging level
    #[argh(option, long = "log-level", default = "log::LevelFilter::Warn")]
    pub log_level: log::LevelFilter,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
pub enum Command {
    Render(Render),
    Check(Check),
    Info(Info),
}

/// print the program in a serialized file as text
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "render")]
pub struct Render {
    /// serialized program
    #[argh(positional)]
    pub file: PathBuf,

    /// output file, default is stdout
    #[argh(option, short = 'o', default = "OutputFile::Stdout")]
    pub output: OutputFile,
}

/// resolve the names used by a serialized program against a hardware configuration
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "check")]
pub struct Check {
    /// serialized program
    #[argh(positional)]
    pub file: PathBuf,

    /// hardware configuration as JSON
    #[argh(option, short = 'c')]
    pub config: PathBuf,
}

/// show the header of a serialized file
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "info")]
pub struct Info {
    /// serialized program
    #[argh(positional)]
    pub file: PathBuf,
}

impl Opts {
    pub fn get_opts() -> Opts {
        argh::from_env()
    }
}
