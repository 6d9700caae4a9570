//! CLI argument parsing for Pod Reaper

use std::path::PathBuf;

use clap::Parser;

/// Pod Reaper - deletes pods stuck in a non-running phase past a runtime-configurable age
#[derive(Debug, Parser)]
#[command(name = "pod-reaper")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/pod-reaper/config.yaml")]
    pub config: PathBuf,

    /// ConfigMap holding maxPodAge, as <namespace>/<name> (overrides config)
    #[arg(long)]
    pub config_map: Option<String>,

    /// Namespace whose pods are never deleted (overrides config)
    #[arg(long)]
    pub protected_namespace: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "POD_REAPER_LOG_LEVEL")]
    pub log_level: String,

    /// Output logs in JSON format
    #[arg(long, default_value = "false", env = "POD_REAPER_LOG_JSON")]
    pub log_json: bool,

    /// Dry run mode - log deletions but don't execute
    #[arg(long, default_value = "false")]
    pub dry_run: bool,

    /// Run a single sweep over all pods and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
