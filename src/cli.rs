use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "berth",
    version,
    about = "A terminal dashboard for containers and compose projects."
)]
pub struct CliArgs {
    /// Container CLI to drive (docker, podman, ...); overrides the config file
    #[arg(long)]
    pub runtime: Option<String>,

    /// Refresh interval for list views in milliseconds
    #[arg(long, default_value_t = 2_000)]
    pub refresh_ms: u64,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write tracing output to this file instead of discarding it
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Use exactly this config file instead of searching for one
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
