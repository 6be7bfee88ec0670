use std::path::Path;

use anyhow::{Context, Result};
use hostpack_core::PackageId;
use hostpack_dstor::{DistStorageRegistry, EndpointOptions};
use hostpack_installer::{
    ClusterConfig, CommandOptions, CommandState, CommandTarget, InstallationStorage, Lifecycle,
    MasterNode, SystemdServiceManager,
};
use tracing::debug;

use crate::render::{current_output_style, render_doctor_lines, render_status_line};
use crate::{Cli, Commands, InstallArgs};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let storage = InstallationStorage::new(&cli.root)?;
    let style = current_output_style();
    debug!(root = %storage.root().display(), command = ?cli.command, "dispatching command");

    let registry = DistStorageRegistry::with_default_drivers();
    if let Commands::Doctor = cli.command {
        let state = CommandState::for_storage(&storage).get_state()?;
        for line in render_doctor_lines(style, &storage, &registry.schemes(), state.as_deref()) {
            println!("{line}");
        }
        return Ok(());
    }

    let services = SystemdServiceManager::new(&cli.unit_dir);
    let lifecycle = Lifecycle::new(storage.clone(), &registry, &services);

    let (verb, target) = match cli.command {
        Commands::Setup { target, install } => {
            let target = CommandTarget::from(target);
            let options = command_options(&storage, &install)?;
            lifecycle
                .setup(target, &options)
                .with_context(|| format!("setup --target {target} failed"))?;
            ("setup", target)
        }
        Commands::Upgrade { target, install } => {
            let target = CommandTarget::from(target);
            let options = command_options(&storage, &install)?;
            lifecycle
                .upgrade(target, &options)
                .with_context(|| format!("upgrade --target {target} failed"))?;
            ("upgrade", target)
        }
        Commands::Start { target } => {
            let target = CommandTarget::from(target);
            lifecycle
                .start(target)
                .with_context(|| format!("start --target {target} failed"))?;
            ("start", target)
        }
        Commands::Stop { target } => {
            let target = CommandTarget::from(target);
            lifecycle
                .stop(target)
                .with_context(|| format!("stop --target {target} failed"))?;
            ("stop", target)
        }
        Commands::Doctor => return Ok(()),
    };

    println!(
        "{}",
        render_status_line(
            style,
            "ok",
            &format!("{verb} --target {target} completed under {}", storage.root().display()),
        )
    );
    if target == CommandTarget::PkgAll && matches!(verb, "setup" | "upgrade") {
        for manifest in storage.staged_manifests()? {
            println!("{}", render_status_line(style, "step", &manifest.pkg_id.to_string()));
        }
    }
    Ok(())
}

/// Merges the cluster configuration file, persisted configuration and
/// command line overrides into the options of one command.
pub(crate) fn command_options(
    storage: &InstallationStorage,
    args: &InstallArgs,
) -> Result<CommandOptions> {
    let packages = args
        .packages
        .iter()
        .map(|id| PackageId::parse(id))
        .collect::<hostpack_core::Result<Vec<_>>>()?;

    Ok(CommandOptions {
        cluster_config: cluster_config(storage, args)?,
        packages,
        clean: args.clean,
    })
}

fn has_cluster_overrides(args: &InstallArgs) -> bool {
    args.dstor_url.is_some()
        || args.dstor_pkgrepo_path.is_some()
        || args.dstor_pkglist_path.is_some()
        || args.local_priv_ipaddr.is_some()
        || !args.master_priv_ipaddrs.is_empty()
}

fn cluster_config(
    storage: &InstallationStorage,
    args: &InstallArgs,
) -> Result<Option<ClusterConfig>> {
    let mut cluster = match &args.cluster_config {
        Some(path) => load_cluster_config(path)?,
        None if !has_cluster_overrides(args) => return Ok(None),
        None => {
            let persisted = storage.cluster_config_path();
            if persisted.is_file() {
                load_cluster_config(&persisted)?
            } else {
                ClusterConfig::default()
            }
        }
    };

    if let Some(addr) = &args.local_priv_ipaddr {
        cluster.local.privateipaddr = Some(addr.clone());
    }
    if !args.master_priv_ipaddrs.is_empty() {
        cluster.master_nodes = args
            .master_priv_ipaddrs
            .iter()
            .map(|raw| MasterNode::parse(raw))
            .collect::<hostpack_core::Result<Vec<_>>>()?;
    }

    if let Some(url) = &args.dstor_url {
        let previous = cluster.distribution_storage.take().unwrap_or_default();
        cluster.distribution_storage = Some(EndpointOptions {
            pkgrepopath: previous.pkgrepopath,
            pkglistpath: previous.pkglistpath,
            ..EndpointOptions::from_url(url)
        });
    }
    if args.dstor_pkgrepo_path.is_some() || args.dstor_pkglist_path.is_some() {
        let endpoint = cluster
            .distribution_storage
            .get_or_insert_with(EndpointOptions::default);
        if let Some(path) = &args.dstor_pkgrepo_path {
            endpoint.pkgrepopath = path.clone();
        }
        if let Some(path) = &args.dstor_pkglist_path {
            endpoint.pkglistpath = path.clone();
        }
    }
    Ok(Some(cluster))
}

fn load_cluster_config(path: &Path) -> Result<ClusterConfig> {
    ClusterConfig::load(path)
        .with_context(|| format!("failed to load cluster configuration {}", path.display()))
}
