use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{
    Args,
    Parser,
    Subcommand,
};

#[derive(Parser)]
#[command(name = "flaresheet", version)]
#[command(about = "Copies Cloudflare daily analytics into a Google Sheet", long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        global = true,
        help = "Config file (overrides FLARESHEET_CONFIG_PATH and discovery)"
    )]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Process one period (defaults to the previous calendar month)")]
    Run(RunArgs),

    #[command(about = "Run now, then at 00:05 UTC on the 1st of every month")]
    Daemon,

    #[command(about = "Load and validate configuration without any network call")]
    CheckConfig,
}

#[derive(Args, Default)]
pub struct RunArgs {
    #[arg(long, requires = "end", help = "First day to process (YYYY-MM-DD)")]
    pub start: Option<NaiveDate>,

    #[arg(long, requires = "start", help = "Last day to process, inclusive (YYYY-MM-DD)")]
    pub end: Option<NaiveDate>,
}
