use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::str::FromStr;

use hostpack_core::{Error, PackageId, PackageManifest, Result};
use hostpack_dstor::{fetch_resource_with_retry, DistStorageRegistry, DistributionStorage, RetryPolicy};
use hostpack_resolver::resolve_manifest_order;
use tracing::{error, info, warn};

use crate::fs_utils::unix_nanos;
use crate::{
    stage_package, ClusterConfig, CommandState, ConfigManager, ExtrasManager,
    InstallationStorage, ResourceContext, ServiceConfig, ServiceManager, ServiceStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandTarget {
    PkgAll,
    Storage,
}

impl CommandTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PkgAll => "pkgall",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pkgall" => Ok(Self::PkgAll),
            "storage" => Ok(Self::Storage),
            other => Err(Error::Config(format!(
                "unknown command target '{other}' (expected pkgall or storage)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Init,
    Validate,
    StagePackages,
    DeployConfig,
    ActivatePackages,
    Done,
}

impl SetupStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Validate => "VALIDATE",
            Self::StagePackages => "STAGE_PACKAGES",
            Self::DeployConfig => "DEPLOY_CONFIG",
            Self::ActivatePackages => "ACTIVATE_PACKAGES",
            Self::Done => "DONE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeStep {
    Init,
    TeardownOld,
    InstallNew,
    NeedsStart,
    StartAfterUpgrade,
    Done,
}

impl UpgradeStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::TeardownOld => "TEARDOWN_OLD",
            Self::InstallNew => "INSTALL_NEW",
            Self::NeedsStart => "NEEDS_START",
            Self::StartAfterUpgrade => "START_AFTER_UPGRADE",
            Self::Done => "DONE",
        }
    }

    /// Matches a persisted step name, ignoring surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        [
            Self::Init,
            Self::TeardownOld,
            Self::InstallNew,
            Self::NeedsStart,
            Self::StartAfterUpgrade,
            Self::Done,
        ]
        .into_iter()
        .find(|step| step.as_str() == raw)
    }
}

/// Inputs of the package-installing commands.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Falls back to the configuration persisted by an earlier setup.
    pub cluster_config: Option<ClusterConfig>,
    /// Reference package list; fetched from the distribution storage when empty.
    pub packages: Vec<PackageId>,
    /// Rebuild the storage layout from scratch (`setup --target storage`).
    pub clean: bool,
}

struct InstallPlan {
    cluster: ClusterConfig,
    driver: Box<dyn DistributionStorage>,
    packages: Vec<PackageId>,
}

/// Setup/Upgrade/Start/Stop over one installation root.
pub struct Lifecycle<'a> {
    storage: InstallationStorage,
    registry: &'a DistStorageRegistry,
    services: &'a dyn ServiceManager,
    retry: RetryPolicy,
    state: CommandState,
}

impl<'a> Lifecycle<'a> {
    pub fn new(
        storage: InstallationStorage,
        registry: &'a DistStorageRegistry,
        services: &'a dyn ServiceManager,
    ) -> Self {
        let state = CommandState::for_storage(&storage);
        Self {
            storage,
            registry,
            services,
            retry: RetryPolicy::default(),
            state,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn storage(&self) -> &InstallationStorage {
        &self.storage
    }

    pub fn command_state(&self) -> &CommandState {
        &self.state
    }

    pub fn setup(&self, target: CommandTarget, options: &CommandOptions) -> Result<()> {
        if target == CommandTarget::Storage {
            info!(root = %self.storage.root().display(), clean = options.clean, "setting up installation storage");
            return self.storage.construct(options.clean);
        }

        info!(step = SetupStep::Init.as_str(), "setup");
        self.ensure_no_command_state("setup")?;
        if let Some(marker) = self.storage.find_install_marker()? {
            return Err(Error::Installation(format!(
                "setup: an installation already exists (found {}); use upgrade or tear it down first",
                marker.display()
            )));
        }

        info!(step = SetupStep::Validate.as_str(), "setup");
        let plan = self.prepare_plan(options)?;

        self.enter(SetupStep::StagePackages.as_str())?;
        self.storage.construct(false)?;
        let staged = self.stage_packages(&plan, SetupStep::StagePackages.as_str())?;

        self.enter(SetupStep::DeployConfig.as_str())?;
        self.persist_cluster_config(&plan.cluster)?;
        let ordered = resolve_manifest_order(staged)?;

        self.enter(SetupStep::ActivatePackages.as_str())?;
        self.activate_packages(
            &ordered,
            &plan.cluster,
            true,
            SetupStep::ActivatePackages.as_str(),
        )?;

        self.storage.write_cluster_id()?;
        self.state.unset_state()?;
        info!(step = SetupStep::Done.as_str(), packages = ordered.len(), "setup complete");
        Ok(())
    }

    pub fn upgrade(&self, target: CommandTarget, options: &CommandOptions) -> Result<()> {
        if target == CommandTarget::Storage {
            info!(root = %self.storage.root().display(), "repairing installation storage");
            return self.storage.construct(false);
        }

        info!(step = UpgradeStep::Init.as_str(), "upgrade");
        let interrupted = match self.state.get_state()? {
            None => {
                let marker = self.storage.cluster_id_path();
                if !marker.exists() {
                    return Err(Error::Installation(format!(
                        "upgrade: no existing installation found (missing {})",
                        marker.display()
                    )));
                }
                None
            }
            Some(raw) => match UpgradeStep::parse(&raw) {
                Some(UpgradeStep::NeedsStart | UpgradeStep::StartAfterUpgrade) => {
                    info!(state = %raw, "resuming interrupted upgrade at START_AFTER_UPGRADE");
                    return self.start_after_upgrade();
                }
                Some(UpgradeStep::TeardownOld | UpgradeStep::InstallNew) => {
                    warn!(state = %raw, "rolling back interrupted upgrade from TEARDOWN_OLD");
                    Some(raw)
                }
                _ => {
                    return Err(Error::Installation(format!(
                        "upgrade: unexpected command state '{raw}' in {}; operator intervention required",
                        self.state.path().display()
                    )));
                }
            },
        };

        let plan = self.prepare_plan(options)?;

        self.enter(UpgradeStep::TeardownOld.as_str())?;
        if let Err(err) = self.teardown_installed() {
            return Err(match interrupted {
                Some(previous) => Error::Installation(format!(
                    "upgrade: teardown failed while rolling back interrupted step '{previous}'; installation state is inconsistent and requires operator intervention: {}",
                    err.chain_message()
                )),
                None => err,
            });
        }

        self.enter(UpgradeStep::InstallNew.as_str())?;
        if let Err(err) = self.install_new(&plan) {
            error!(error = %err.chain_message(), "upgrade failed installing new packages; next run restarts from TEARDOWN_OLD");
            self.state.set_state(UpgradeStep::TeardownOld.as_str())?;
            return Err(err);
        }

        self.enter(UpgradeStep::NeedsStart.as_str())?;
        self.start_after_upgrade()
    }

    pub fn start(&self, target: CommandTarget) -> Result<()> {
        self.ensure_package_target("start", target)?;
        self.ensure_no_command_state("start")?;
        let ordered = self.installed_packages("start")?;
        self.start_packages(&ordered, "START")?;
        info!(packages = ordered.len(), "start complete");
        Ok(())
    }

    pub fn stop(&self, target: CommandTarget) -> Result<()> {
        self.ensure_package_target("stop", target)?;
        self.ensure_no_command_state("stop")?;
        let ordered = self.installed_packages("stop")?;
        for manifest in ordered.iter().rev() {
            if ServiceConfig::from_manifest(manifest)?.is_some() {
                self.services
                    .stop(&manifest.pkg_id)
                    .map_err(|err| err.in_step("STOP", &manifest.pkg_id))?;
            }
        }
        info!(packages = ordered.len(), "stop complete");
        Ok(())
    }

    fn enter(&self, step: &str) -> Result<()> {
        info!(step, "entering step");
        self.state.set_state(step)
    }

    fn ensure_no_command_state(&self, command: &str) -> Result<()> {
        if let Some(stale) = self.state.get_state()? {
            return Err(Error::Installation(format!(
                "{command}: found incomplete command state '{stale}' in {}; investigate before retrying",
                self.state.path().display()
            )));
        }
        Ok(())
    }

    fn ensure_package_target(&self, command: &str, target: CommandTarget) -> Result<()> {
        if target == CommandTarget::Storage {
            return Err(Error::Installation(format!(
                "{command}: target '{target}' is not supported"
            )));
        }
        Ok(())
    }

    fn installed_packages(&self, command: &str) -> Result<Vec<PackageManifest>> {
        let marker = self.storage.cluster_id_path();
        if !marker.exists() {
            return Err(Error::Installation(format!(
                "{command}: no installation found (missing {})",
                marker.display()
            )));
        }
        resolve_manifest_order(self.storage.staged_manifests()?)
    }

    fn resolve_cluster(&self, options: &CommandOptions) -> Result<ClusterConfig> {
        if let Some(cluster) = &options.cluster_config {
            return Ok(cluster.clone());
        }
        let persisted = self.storage.cluster_config_path();
        if persisted.is_file() {
            return ClusterConfig::load(&persisted);
        }
        Err(Error::Config(format!(
            "no cluster configuration given and none persisted at {}",
            persisted.display()
        )))
    }

    fn prepare_plan(&self, options: &CommandOptions) -> Result<InstallPlan> {
        let cluster = self.resolve_cluster(options)?;
        let driver = self.registry.create(cluster.endpoint()?)?;
        driver.verify_options()?;

        let packages = if options.packages.is_empty() {
            self.fetch_reference_packages(driver.as_ref())?
        } else {
            options.packages.clone()
        };
        let mut names = BTreeSet::new();
        for pkg_id in &packages {
            if !names.insert(pkg_id.name()) {
                return Err(Error::Config(format!(
                    "reference package list names package '{}' more than once",
                    pkg_id.name()
                )));
            }
        }
        info!(packages = packages.len(), "validated installation plan");

        Ok(InstallPlan {
            cluster,
            driver,
            packages,
        })
    }

    fn fetch_reference_packages(&self, driver: &dyn DistributionStorage) -> Result<Vec<PackageId>> {
        let rel_path = driver.options().pkglistpath.clone();
        if rel_path.trim().is_empty() {
            return Err(Error::Config(
                "no packages given and the distribution storage has no pkglistpath".to_string(),
            ));
        }

        let destination = std::env::temp_dir().join(format!(
            "hostpack-pkglist-{}-{}.json",
            std::process::id(),
            unix_nanos()
        ));
        let fetched = fetch_resource_with_retry(driver, &rel_path, &destination, &self.retry)
            .and_then(|_| {
                fs::read_to_string(&destination)
                    .map_err(|err| Error::storage("read reference package list", &destination, err))
            });
        let _ = fs::remove_file(&destination);
        let raw = fetched?;

        let ids: Vec<String> = serde_json::from_str(&raw).map_err(|err| {
            Error::Config(format!("invalid reference package list '{rel_path}': {err}"))
        })?;
        ids.iter().map(|id| PackageId::parse(id)).collect()
    }

    fn persist_cluster_config(&self, cluster: &ClusterConfig) -> Result<()> {
        cluster.save(&self.storage.cluster_config_path())
    }

    fn stage_packages(&self, plan: &InstallPlan, step: &str) -> Result<Vec<PackageManifest>> {
        plan.packages
            .iter()
            .map(|pkg_id| {
                stage_package(
                    &self.storage,
                    plan.driver.as_ref(),
                    &self.retry,
                    pkg_id,
                    Some(&plan.cluster),
                )
                .map_err(|err| err.in_step(step, pkg_id))
            })
            .collect()
    }

    fn activate_packages(
        &self,
        ordered: &[PackageManifest],
        cluster: &ClusterConfig,
        start_services: bool,
        step: &str,
    ) -> Result<()> {
        for staged in ordered {
            self.activate_package(&staged.pkg_id, cluster, start_services)
                .map_err(|err| {
                    error!(package = %staged.pkg_id, error = %err.chain_message(), "package activation failed");
                    err.in_step(step, &staged.pkg_id)
                })?;
        }
        Ok(())
    }

    /// Config deployment, install hooks and service registration of one package.
    fn activate_package(
        &self,
        pkg_id: &PackageId,
        cluster: &ClusterConfig,
        start_service: bool,
    ) -> Result<()> {
        let manifest = PackageManifest::load(&self.storage.package_manifest_path(pkg_id))?;
        let context = ResourceContext::new(&self.storage)
            .with_cluster(cluster)
            .with_package(&manifest.pkg_id);

        if fs::symlink_metadata(self.storage.package_conf_source_dir(pkg_id)).is_ok() {
            ConfigManager::new(&self.storage).setup_conf(&manifest, &context)?;
        }

        let extras = ExtrasManager::new(&self.storage);
        extras.handle_install_extras(&manifest)?;

        if let Some(service) = ServiceConfig::from_manifest(&manifest)? {
            if self.services.status(pkg_id)? != ServiceStatus::Absent {
                self.services.stop(pkg_id)?;
                self.services.remove(pkg_id)?;
            }
            self.services.register(pkg_id, &service)?;
            if start_service {
                self.services.start(pkg_id)?;
            }
        }

        extras.handle_post_install_extras(&manifest)?;
        info!(package = %pkg_id, "activated package");
        Ok(())
    }

    fn deactivate_package(&self, manifest: &PackageManifest) -> Result<()> {
        let pkg_id = &manifest.pkg_id;
        let extras = ExtrasManager::new(&self.storage);

        let registered = self.services.status(pkg_id)? != ServiceStatus::Absent;
        if registered {
            self.services.stop(pkg_id)?;
        }
        extras.handle_uninstall_extras(manifest)?;
        if registered {
            self.services.remove(pkg_id)?;
        }
        extras.handle_post_uninstall_extras(manifest)?;

        ConfigManager::new(&self.storage).teardown_conf(manifest)?;
        self.storage.remove_package(pkg_id)?;
        info!(package = %pkg_id, "deactivated package");
        Ok(())
    }

    fn teardown_installed(&self) -> Result<()> {
        let manifests = self.storage.staged_manifests()?;
        let ordered = match resolve_manifest_order(manifests.clone()) {
            Ok(ordered) => ordered,
            Err(err) => {
                warn!(error = %err.chain_message(), "cannot order installed packages, tearing down by name");
                manifests
            }
        };
        for manifest in ordered.iter().rev() {
            self.deactivate_package(manifest)
                .map_err(|err| err.in_step(UpgradeStep::TeardownOld.as_str(), &manifest.pkg_id))?;
        }

        for leftover in self.storage.package_dirs()? {
            warn!(dir = %leftover.display(), "removing package directory without manifest");
            fs::remove_dir_all(&leftover)
                .map_err(|err| Error::storage("remove package", &leftover, err))?;
        }
        Ok(())
    }

    fn install_new(&self, plan: &InstallPlan) -> Result<()> {
        self.storage.construct(false)?;
        let staged = self.stage_packages(plan, UpgradeStep::InstallNew.as_str())?;
        self.persist_cluster_config(&plan.cluster)?;
        let ordered = resolve_manifest_order(staged)?;
        self.activate_packages(
            &ordered,
            &plan.cluster,
            false,
            UpgradeStep::InstallNew.as_str(),
        )
    }

    fn start_after_upgrade(&self) -> Result<()> {
        self.enter(UpgradeStep::StartAfterUpgrade.as_str())?;
        let ordered = resolve_manifest_order(self.storage.staged_manifests()?)?;
        self.start_packages(&ordered, UpgradeStep::StartAfterUpgrade.as_str())?;

        self.storage.write_cluster_id()?;
        self.state.unset_state()?;
        info!(step = UpgradeStep::Done.as_str(), packages = ordered.len(), "upgrade complete");
        Ok(())
    }

    fn start_packages(&self, ordered: &[PackageManifest], step: &str) -> Result<()> {
        for manifest in ordered {
            if ServiceConfig::from_manifest(manifest)?.is_some() {
                self.services
                    .start(&manifest.pkg_id)
                    .map_err(|err| err.in_step(step, &manifest.pkg_id))?;
            }
        }
        Ok(())
    }
}
