mod archive;
mod cluster;
mod command;
mod command_state;
mod config_manager;
mod extras;
mod fs_utils;
mod layout;
mod process;
mod rc_ctx;
mod service;
mod staging;
mod template;

pub use cluster::{ClusterConfig, LocalNode, MasterNode, DEFAULT_IPADDR, DEFAULT_ZK_CLIENT_PORT};
pub use command::{CommandOptions, CommandTarget, Lifecycle, SetupStep, UpgradeStep};
pub use command_state::CommandState;
pub use config_manager::ConfigManager;
pub use extras::{ExtrasManager, HookCommand, HookPhase, DEFAULT_HOOK_TIMEOUT};
pub use layout::{InstallationStorage, StorageState};
pub use process::{run_with_timeout, shell_command, ProcessError, ProcessOutput};
pub use rc_ctx::{ContextItems, ResourceContext};
pub use service::{
    ServiceConfig, ServiceManager, ServiceStatus, SystemdServiceManager, DEFAULT_UNIT_DIR,
};
pub use staging::{build_manifest, stage_package};
pub use template::render_template;
