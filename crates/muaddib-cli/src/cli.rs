use std::path::PathBuf;

use clap::Parser;

/// Multi-room chat agent bridging IRC, Discord, and Slack to LLM providers.
#[derive(Debug, Parser)]
#[command(name = "muaddib", version)]
pub struct Args {
    /// Path to `muaddib.toml`. Defaults to `~/.muaddib/muaddib.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run a single message through the pipeline and print the reply,
    /// instead of connecting to any configured transport.
    #[arg(value_name = "MESSAGE")]
    pub message: Option<String>,
}
