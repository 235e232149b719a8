use std::fs;
use std::path::Path;

use chainsmith::chain_builder::build_chain;
use chainsmith::configs::ChainConfig;
use chainsmith::errors::ChainError;
use chainsmith::inspect::summarize;
use chainsmith::pem_store::{read_certificate, read_private_key};
use chainsmith::registry::Registry;
use chainsmith::verify::{verify_chain, verify_issued};

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config_path = dir.join("chainsmith.toml");
    let toml = format!(
        r#"
root_ca_path = "{root}/ca/root"
intermediate_ca_path = "{root}/ca/intermediate"

[key]
algorithm = "ecdsa-p256"

[certificates.svc1]
common_name = "svc1.internal"
cert_path = "{root}/certs/svc1.pem"
key_path = "{root}/certs/svc1.key"
"#,
        root = dir.display()
    );
    fs::write(&config_path, toml).unwrap();
    config_path
}

fn tree(dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    for sub in ["ca", "certs"] {
        let Ok(entries) = fs::read_dir(dir.join(sub)) else {
            continue;
        };
        for entry in entries {
            files.push(format!("{}/{}", sub, entry.unwrap().file_name().to_string_lossy()));
        }
    }
    files.sort();
    files
}

#[test]
fn issue_writes_six_files_and_chain_verifies() {
    let dir = tempfile::tempdir().unwrap();
    let config = ChainConfig::from_file(write_config(dir.path())).unwrap();

    build_chain(&config).unwrap();

    assert_eq!(
        tree(dir.path()),
        vec![
            "ca/intermediate",
            "ca/intermediate.key",
            "ca/root",
            "ca/root.key",
            "certs/svc1.key",
            "certs/svc1.pem",
        ]
    );
    assert!(verify_issued(&config, "svc1").unwrap());
}

#[test]
fn signatures_and_ca_flags_hold_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let config = ChainConfig::from_file(write_config(dir.path())).unwrap();
    build_chain(&config).unwrap();

    let root = read_certificate(&config.root_ca_path).unwrap();
    let intermediate = read_certificate(&config.intermediate_ca_path).unwrap();
    let leaf = read_certificate(&config.certificates["svc1"].cert_path).unwrap();

    assert!(root.verify(&root.public_key().unwrap()).unwrap());
    assert!(intermediate.verify(&root.public_key().unwrap()).unwrap());
    assert!(leaf.verify(&intermediate.public_key().unwrap()).unwrap());
    assert!(verify_chain(&leaf, &intermediate, &root).unwrap());

    assert!(summarize(&root).unwrap().is_ca);
    let intermediate_summary = summarize(&intermediate).unwrap();
    assert!(intermediate_summary.is_ca);
    assert_eq!(intermediate_summary.path_len, Some(0));
    assert!(!summarize(&leaf).unwrap().is_ca);

    let leaf_key = read_private_key(&config.certificates["svc1"].key_path).unwrap();
    assert!(leaf.public_key().unwrap().public_eq(&leaf_key));
}

#[cfg(unix)]
#[test]
fn private_keys_are_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let config = ChainConfig::from_file(write_config(dir.path())).unwrap();
    build_chain(&config).unwrap();

    for key in [
        config.root_ca_key_path(),
        config.intermediate_ca_key_path(),
        config.certificates["svc1"].key_path.clone(),
    ] {
        let mode = fs::metadata(&key).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "{}", key.display());
    }
}

#[test]
fn revoke_svc1_then_list_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path());
    build_chain(&ChainConfig::from_file(&config_path).unwrap()).unwrap();

    let mut registry = Registry::open(&config_path).unwrap();
    registry.revoke("svc1").unwrap();

    assert!(!dir.path().join("certs/svc1.pem").exists());
    assert!(!dir.path().join("certs/svc1.key").exists());
    assert!(dir.path().join("ca/root").exists());
    assert!(registry.list().is_empty());
    assert!(Registry::open(&config_path).unwrap().list().is_empty());
}

#[test]
fn revoke_missing_leaves_files_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(dir.path());
    build_chain(&ChainConfig::from_file(&config_path).unwrap()).unwrap();
    let before = tree(dir.path());
    let config_before = fs::read_to_string(&config_path).unwrap();

    let mut registry = Registry::open(&config_path).unwrap();
    let err = registry.revoke("missing").unwrap_err();

    assert!(matches!(err, ChainError::NotFound(_)));
    assert_eq!(tree(dir.path()), before);
    assert_eq!(fs::read_to_string(&config_path).unwrap(), config_before);
}

#[test]
fn reissue_invalidates_old_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let config = ChainConfig::from_file(write_config(dir.path())).unwrap();
    build_chain(&config).unwrap();
    let old_leaf = read_certificate(&config.certificates["svc1"].cert_path).unwrap();

    build_chain(&config).unwrap();
    let root = read_certificate(&config.root_ca_path).unwrap();
    let intermediate = read_certificate(&config.intermediate_ca_path).unwrap();

    assert!(!verify_chain(&old_leaf, &intermediate, &root).unwrap());
    assert!(verify_issued(&config, "svc1").unwrap());
}
