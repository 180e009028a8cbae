use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[arg(long, env = "TFSA_SANDBOX_ID")]
    pub sandbox_id: String,

    /// Service definition (TOML)
    #[arg(long, env = "TFSA_CONFIG", default_value = "tfsa.toml")]
    pub config: PathBuf,

    /// Orchestration API base URL; without it state stays on local disk
    #[arg(long, env = "TFSA_API_URL", requires = "api_token")]
    pub api_url: Option<String>,

    #[arg(long, env = "TFSA_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Locks, exec logs and the local store [default: <data dir>/tfsa]
    #[arg(long, env = "TFSA_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn resolved_state_dir(&self) -> Option<PathBuf> {
        self.state_dir
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("tfsa")))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Init, plan and apply the module, then save its outputs
    Execute(StageArgs),
    /// Destroy what a previous execute created
    Destroy(StageArgs),
    /// Show stored statuses and what may run next
    Status,
}

/// Where to stage a fresh working directory from when none is on record.
#[derive(clap::Args, Debug)]
pub struct StageArgs {
    #[arg(long, requires = "terraform_bin")]
    pub module_dir: Option<PathBuf>,

    #[arg(long, env = "TFSA_TERRAFORM_BIN")]
    pub terraform_bin: Option<PathBuf>,

    /// Parent for staging dirs [default: system temp dir]
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}
