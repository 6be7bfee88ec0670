use super::*;

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::CommandFactory;
use hostpack_installer::{CommandState, InstallationStorage};

use crate::dispatch::command_options;
use crate::render::{render_doctor_lines, render_status_line, OutputStyle};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_storage() -> InstallationStorage {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let path = std::env::temp_dir().join(format!(
        "hostpack-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&path).expect("must create test dir");
    InstallationStorage::new(path.join("root")).expect("absolute root")
}

fn install_args(cli: Cli) -> InstallArgs {
    match cli.command {
        Commands::Setup { install, .. } | Commands::Upgrade { install, .. } => install,
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn setup_defaults_to_pkgall_target() {
    let cli = Cli::try_parse_from(["hostpack", "--root", "/srv/hp", "setup"]).expect("must parse");
    assert_eq!(cli.root, PathBuf::from("/srv/hp"));
    match cli.command {
        Commands::Setup { target, install } => {
            assert_eq!(target, Target::Pkgall);
            assert!(install.packages.is_empty());
            assert!(!install.clean);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn storage_target_maps_to_command_target() {
    let cli = Cli::try_parse_from(["hostpack", "upgrade", "--target", "storage"])
        .expect("must parse");
    match cli.command {
        Commands::Upgrade { target, .. } => {
            assert_eq!(CommandTarget::from(target), CommandTarget::Storage);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn unknown_target_is_rejected() {
    let err = Cli::try_parse_from(["hostpack", "start", "--target", "everything"])
        .expect_err("must reject");
    assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
}

#[test]
fn global_options_follow_subcommand() {
    let cli = Cli::try_parse_from(["hostpack", "stop", "--root", "/srv/other", "-v"])
        .expect("must parse");
    assert_eq!(cli.root, PathBuf::from("/srv/other"));
    assert!(cli.verbose);
}

#[test]
fn repeated_options_collect_values() {
    let cli = Cli::try_parse_from([
        "hostpack",
        "setup",
        "--package",
        "zookeeper--3.4.14",
        "--package",
        "mesos--1.9.0",
        "--master-priv-ipaddr",
        "10.0.0.1:2182",
        "--master-priv-ipaddr",
        "10.0.0.2",
    ])
    .expect("must parse");
    let args = install_args(cli);
    assert_eq!(args.packages, vec!["zookeeper--3.4.14", "mesos--1.9.0"]);
    assert_eq!(args.master_priv_ipaddrs, vec!["10.0.0.1:2182", "10.0.0.2"]);
}

#[test]
fn options_without_cluster_input_defer_to_persisted_config() {
    let storage = test_storage();
    let options = command_options(&storage, &InstallArgs::default()).expect("must build");
    assert!(options.cluster_config.is_none());
    assert!(options.packages.is_empty());
}

#[test]
fn command_line_overrides_build_cluster_config() {
    let storage = test_storage();
    let args = InstallArgs {
        dstor_url: Some("https://dist.example/hostpack".to_string()),
        dstor_pkgrepo_path: Some("packages".to_string()),
        dstor_pkglist_path: Some("lists/reference.json".to_string()),
        local_priv_ipaddr: Some("10.0.0.9".to_string()),
        master_priv_ipaddrs: vec!["10.0.0.1:2182".to_string(), "10.0.0.2".to_string()],
        packages: vec!["mesos--1.9.0".to_string()],
        ..InstallArgs::default()
    };
    let options = command_options(&storage, &args).expect("must build");
    let cluster = options.cluster_config.expect("cluster config");
    let endpoint = cluster.endpoint().expect("endpoint");
    assert_eq!(endpoint.scheme, "https");
    assert_eq!(endpoint.rooturl, "https://dist.example/hostpack");
    assert_eq!(endpoint.pkgrepopath, "packages");
    assert_eq!(endpoint.pkglistpath, "lists/reference.json");
    assert_eq!(cluster.local_priv_ipaddr(), "10.0.0.9");
    assert_eq!(cluster.zk_address(), "10.0.0.1:2182,10.0.0.2:2181");
    assert_eq!(options.packages[0].name(), "mesos");
}

#[test]
fn overrides_apply_on_top_of_cluster_config_file() {
    let storage = test_storage();
    let file = storage.root().with_file_name("cluster.toml");
    fs::write(
        &file,
        "[local]\nprivateipaddr = \"10.0.0.5\"\n\n[distribution-storage]\nscheme = \"file\"\nrooturl = \"file:///srv/dist\"\npkgrepopath = \"repo\"\n",
    )
    .expect("must write");
    let args = InstallArgs {
        cluster_config: Some(file),
        dstor_url: Some("http://mirror.example".to_string()),
        ..InstallArgs::default()
    };
    let cluster = command_options(&storage, &args)
        .expect("must build")
        .cluster_config
        .expect("cluster config");
    let endpoint = cluster.endpoint().expect("endpoint");
    assert_eq!(endpoint.scheme, "http");
    assert_eq!(endpoint.pkgrepopath, "repo");
    assert_eq!(cluster.local_priv_ipaddr(), "10.0.0.5");
}

#[test]
fn invalid_package_id_is_reported() {
    let storage = test_storage();
    let args = InstallArgs {
        packages: vec!["no-version".to_string()],
        ..InstallArgs::default()
    };
    let err = command_options(&storage, &args).expect_err("must reject");
    assert!(err.to_string().contains("no-version"), "{err}");
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "setup --target pkgall completed"),
        "setup --target pkgall completed"
    );
}

#[test]
fn render_status_line_rich_includes_badge() {
    let line = render_status_line(OutputStyle::Rich, "warn", "command state: NEEDS_START");
    assert!(line.contains("[WARN]"));
    assert!(line.ends_with(" command state: NEEDS_START"));
}

#[test]
fn doctor_reports_layout_and_command_state() {
    let storage = test_storage();
    storage.construct(false).expect("must construct");
    let state = CommandState::for_storage(&storage);
    state.set_state("TEARDOWN_OLD").expect("must set");

    let stored = state.get_state().expect("must read");
    let schemes = vec!["file".to_string(), "https".to_string()];
    let lines = render_doctor_lines(OutputStyle::Plain, &storage, &schemes, stored.as_deref());
    assert_eq!(lines[0], format!("root: {}", storage.root().display()));
    assert_eq!(lines[1], "layout: constructed");
    assert!(lines.contains(&"distribution storage schemes: file, https".to_string()));
    assert_eq!(
        lines.last().map(String::as_str),
        Some("command state: TEARDOWN_OLD (interrupted command)")
    );

    let lines = render_doctor_lines(OutputStyle::Plain, &storage, &schemes, None);
    assert_eq!(lines.last().map(String::as_str), Some("command state: none"));
}

#[test]
fn failure_report_lists_each_cause_once() {
    let err = hostpack_core::Error::storage(
        "read package manifest",
        "/x/manifest.json",
        std::io::Error::other("disk gone"),
    )
    .in_step("ACTIVATE_PACKAGES", "alpha--1.0");
    let report = format!(
        "{:#}",
        anyhow::Error::new(err).context("setup --target pkgall failed")
    );
    assert_eq!(
        report,
        "setup --target pkgall failed: ACTIVATE_PACKAGES: package alpha--1.0: failed to read package manifest /x/manifest.json: disk gone"
    );
}
