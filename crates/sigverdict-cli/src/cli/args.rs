use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sigverdict",
    version,
    about = "OpenPGP result normalization, trust verdicts and keyserver sync"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Normalize an engine result and print the trust verdict
    Analyse(AnalyseArgs),
    /// Search, fetch, upload and sync keys against an HKP keyserver
    Keyserver(KeyserverArgs),
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyseArgs {
    /// Engine result document (JSON)
    pub result: PathBuf,

    /// Key database snapshot (YAML or JSON). Without it every signer is unknown.
    #[arg(long)]
    pub keys: Option<PathBuf>,

    /// Print the report and verdict as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct KeyserverArgs {
    #[command(subcommand)]
    pub cmd: super::commands::keyserver::KeyserverCmd,
}

/// Options shared by every keyserver subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct KeyserverCommonArgs {
    /// Keyserver config file (YAML)
    #[arg(long, env = "SIGVERDICT_KEYSERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use this keyserver instead of the configured default
    #[arg(long)]
    pub server: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}
