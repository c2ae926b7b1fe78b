//! strata cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; strata ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a unit and print its descriptors and outputs
    Plan(PlanCommand),

    /// Print the flattened settings of a document
    Flatten(FlattenCommand),
}

#[derive(Parser, Debug)]
pub struct PlanCommand {
    /// Unit to build
    #[arg(short = 'u', long = "unit")]
    pub unit: UnitArg,

    /// File holding the shared namespace
    #[arg(short = 's', long = "shared")]
    pub shared: PathBuf,

    /// File holding the unit's namespace
    ///
    /// Defaults to the shared file, which works for stack files holding every namespace.
    #[arg(short = 'l', long = "local")]
    pub local: Option<PathBuf>,

    /// File holding the secrets
    ///
    /// Defaults to the unit's namespace.
    #[arg(long = "secrets")]
    pub secrets: Option<PathBuf>,

    /// Resolve outputs with a dry-run engine
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Make the dry-run engine fail for a logical name
    #[arg(long = "fail", requires = "dry_run")]
    pub fail: Vec<String>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct FlattenCommand {
    /// Document to flatten
    pub file: PathBuf,

    /// Namespace to read from a stack file
    #[arg(short = 'n', long = "namespace", default_value = "default")]
    pub namespace: String,

    #[arg(long = "separator", default_value = "__")]
    pub separator: String,

    /// Prefix of every key
    #[arg(short = 'p', long = "prefix")]
    pub prefix: Option<String>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum UnitArg {
    Shared,
    App1,
    App2,
}

impl From<UnitArg> for strata::stacks::Unit {
    fn from(value: UnitArg) -> Self {
        match value {
            UnitArg::Shared => strata::stacks::Unit::Shared,
            UnitArg::App1 => strata::stacks::Unit::App1,
            UnitArg::App2 => strata::stacks::Unit::App2,
        }
    }
}

#[derive(ValueEnum, Clone, Default, Debug)]
pub enum OutputFormat {
    Json,
    #[default]
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}
