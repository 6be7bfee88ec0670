mod dispatch;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hostpack_installer::{CommandTarget, DEFAULT_UNIT_DIR};
use tracing_subscriber::EnvFilter;

use crate::dispatch::run_cli;

const DEFAULT_ROOT: &str = "/opt/hostpack";
const LOG_ENV: &str = "HOSTPACK_LOG";

#[derive(Parser, Debug)]
#[command(name = "hostpack")]
#[command(about = "Node-local package lifecycle manager", long_about = None)]
struct Cli {
    /// Installation root.
    #[arg(long, global = true, env = "HOSTPACK_ROOT", default_value = DEFAULT_ROOT)]
    root: PathBuf,
    /// Directory receiving service unit files.
    #[arg(long, global = true, env = "HOSTPACK_UNIT_DIR", default_value = DEFAULT_UNIT_DIR)]
    unit_dir: PathBuf,
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install the reference package set on a fresh node.
    Setup {
        #[arg(long, value_enum, default_value_t = Target::Pkgall)]
        target: Target,
        #[command(flatten)]
        install: InstallArgs,
    },
    /// Replace the installed package set, resuming an interrupted upgrade.
    Upgrade {
        #[arg(long, value_enum, default_value_t = Target::Pkgall)]
        target: Target,
        #[command(flatten)]
        install: InstallArgs,
    },
    Start {
        #[arg(long, value_enum, default_value_t = Target::Pkgall)]
        target: Target,
    },
    Stop {
        #[arg(long, value_enum, default_value_t = Target::Pkgall)]
        target: Target,
    },
    /// Print the installation layout and any in-flight command state.
    Doctor,
}

#[derive(Args, Debug, Default, Clone)]
struct InstallArgs {
    /// Cluster configuration file (TOML).
    #[arg(long)]
    cluster_config: Option<PathBuf>,
    #[arg(long)]
    dstor_url: Option<String>,
    #[arg(long)]
    dstor_pkgrepo_path: Option<String>,
    #[arg(long)]
    dstor_pkglist_path: Option<String>,
    #[arg(long)]
    local_priv_ipaddr: Option<String>,
    /// Master node as `ip[:port]`; repeat for every master.
    #[arg(long = "master-priv-ipaddr", value_name = "ADDR")]
    master_priv_ipaddrs: Vec<String>,
    /// Package id (`name--version`); repeat to list the reference set explicitly.
    #[arg(long = "package", value_name = "PKG_ID")]
    packages: Vec<String>,
    /// Remove the installation root before rebuilding it (`--target storage`).
    #[arg(long)]
    clean: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Target {
    Pkgall,
    Storage,
}

impl From<Target> for CommandTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Pkgall => CommandTarget::PkgAll,
            Target::Storage => CommandTarget::Storage,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
