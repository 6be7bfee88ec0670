use std::path::Path;

use serde_json::json;

use super::*;

#[test]
fn parse_splits_name_and_version() {
    let id = PackageId::parse("mesos--1.11.0-dcos").expect_err("dash in version must fail");
    assert!(matches!(id, Error::InvalidId { .. }));

    let id = PackageId::parse("dcos-image--abc123.1").expect("id should parse");
    assert_eq!(id.name(), "dcos-image");
    assert_eq!(id.version(), "abc123.1");
    assert_eq!(id.to_string(), "dcos-image--abc123.1");
}

#[test]
fn parse_rejects_missing_or_repeated_separator() {
    for raw in ["onlyname", "a--b--c", "--1.0", "pkg--", ""] {
        let err = PackageId::parse(raw).expect_err("id must be rejected");
        assert!(
            matches!(err, Error::InvalidId { .. }),
            "unexpected error for '{raw}': {err}"
        );
    }
}

#[test]
fn parse_rejects_characters_outside_allowed_sets() {
    assert!(PackageId::parse("-lead--1.0").is_err());
    assert!(PackageId::parse("sp ace--1.0").is_err());
    assert!(PackageId::parse("name--1.0/evil").is_err());
    assert!(PackageId::parse("@scope_pkg+x--1:2.3_a@b").is_ok());
}

#[test]
fn compose_then_parse_round_trips() {
    let cases = [
        ("a", "1"),
        ("adminrouter", "4f1e0b2c"),
        ("dcos-config", "1.2.3"),
        ("_hidden.pkg", "2:1.0+build"),
    ];
    for (name, version) in cases {
        let composed = PackageId::compose(name, version);
        let parsed = PackageId::parse(&composed).expect("composed id must parse");
        assert_eq!((parsed.name(), parsed.version()), (name, version));
    }
}

#[test]
fn new_rejects_names_that_break_round_trip() {
    assert!(PackageId::new("a--b", "1").is_err());
    assert!(PackageId::new("trailing-", "1").is_err());
    assert!(PackageId::new("", "1").is_err());
    assert!(PackageId::new("pkg", "").is_err());
}

#[test]
fn package_id_equality_is_by_canonical_string() {
    let left = PackageId::new("zk", "3.4").expect("valid id");
    let right: PackageId = "zk--3.4".parse().expect("valid id");
    assert_eq!(left, right);
    assert_eq!(String::from(left), "zk--3.4");
}

#[test]
fn manifest_loads_with_optional_sections_absent() {
    let raw = r#"{ "pkg_id": "zookeeper--3.4.14" }"#;
    let manifest = PackageManifest::from_json_str(raw, Path::new("zk.json"))
        .expect("manifest should parse");
    assert_eq!(manifest.pkg_id.to_string(), "zookeeper--3.4.14");
    assert!(manifest.requires.is_empty());
    assert!(manifest.extra_config.is_none());
    assert!(manifest.service_config.is_none());
}

#[test]
fn manifest_without_pkg_id_is_rejected_naming_the_file() {
    let err = PackageManifest::from_json_str(r#"{ "requires": [] }"#, Path::new("/x/broken.json"))
        .expect_err("missing pkg_id must fail");
    assert!(matches!(err, Error::ManifestInvalid { .. }));
    assert!(err.to_string().contains("/x/broken.json"));
    assert!(err.to_string().contains("pkg_id"));
}

#[test]
fn manifest_with_invalid_pkg_id_is_rejected() {
    let err = PackageManifest::from_json_str(r#"{ "pkg_id": "nodash" }"#, Path::new("m.json"))
        .expect_err("invalid id must fail");
    assert!(matches!(err, Error::ManifestInvalid { .. }));
}

#[test]
fn manifest_requiring_itself_is_rejected() {
    let raw = r#"{ "pkg_id": "loop--1", "requires": ["loop"] }"#;
    assert!(PackageManifest::from_json_str(raw, Path::new("m.json")).is_err());
}

#[test]
fn manifest_serializes_to_documented_keys() {
    let mut manifest = PackageManifest::new(PackageId::parse("mesos--1.0").expect("valid id"));
    manifest.requires = vec!["zookeeper".to_string()];
    manifest.extra_config = Some(json!({"install": {"exec_external_commands": ["true"]}}));

    let rendered = manifest.to_json_string().expect("manifest should serialize");
    let value: serde_json::Value = serde_json::from_str(&rendered).expect("valid json");
    assert_eq!(value["pkg_id"], "mesos--1.0");
    assert_eq!(value["requires"], json!(["zookeeper"]));
    assert!(value.get("service_config").is_none());

    let reparsed =
        PackageManifest::from_json_str(&rendered, Path::new("m.json")).expect("reparse");
    assert_eq!(reparsed, manifest);
}

#[test]
fn transient_classification_covers_only_retryable_kinds() {
    assert!(FetchErrorKind::RateLimited.is_transient());
    assert!(FetchErrorKind::ConnectionReset.is_transient());
    assert!(FetchErrorKind::Timeout.is_transient());
    assert!(!FetchErrorKind::NotFound.is_transient());
    assert!(!FetchErrorKind::InvalidCredentials.is_transient());
    assert!(!FetchErrorKind::Transport.is_transient());

    let wrapped = Error::fetch("x", FetchErrorKind::RateLimited, "slow down").in_step("STAGE", "x--1");
    assert!(wrapped.is_transient());
}

#[test]
fn step_error_chain_names_each_cause_once() {
    let err = Error::storage(
        "read package manifest",
        "/x/manifest.json",
        std::io::Error::other("disk gone"),
    )
    .in_step("ACTIVATE_PACKAGES", "alpha--1.0");

    assert_eq!(err.to_string(), "ACTIVATE_PACKAGES: package alpha--1.0");
    let chain = err.chain_message();
    assert_eq!(
        chain,
        "ACTIVATE_PACKAGES: package alpha--1.0: failed to read package manifest /x/manifest.json: disk gone"
    );
    assert_eq!(chain.matches("disk gone").count(), 1);
}
