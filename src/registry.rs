//! Certificate registry and revocation
//!
//! The registry is the `certificates` table of the configuration: logical name
//! → common name, certificate path and key path. Listing reads it; revoking
//! deletes a leaf's files and then its entry, rewriting the configuration file
//! when the registry was opened from one.
//!
//! Revocation runs as a small state machine so an interrupted revoke can be
//! retried and finish deterministically:
//!
//! ```text
//! Pending ──delete cert──▶ CertDeleted ──delete key──▶ KeyDeleted ──drop entry──▶ Done
//! ```
//!
//! A file that is already gone counts as deleted. If the key cannot be deleted
//! the entry is kept, so running the same revoke again completes the cleanup.
//! Revocation is local only; nothing is published (no CRL or OCSP).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::configs::{self, ChainConfig};
use crate::errors::{ChainError, Result};

/// A registered leaf certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    pub name: String,
    pub common_name: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Progress of a single revocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationState {
    Pending,
    CertDeleted,
    KeyDeleted,
    Done,
}

impl fmt::Display for RevocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RevocationState::Pending => "pending",
            RevocationState::CertDeleted => "certificate deleted",
            RevocationState::KeyDeleted => "key deleted",
            RevocationState::Done => "done",
        };
        f.write_str(label)
    }
}

struct Revocation {
    record: CertificateRecord,
    state: RevocationState,
}

impl Revocation {
    fn new(record: CertificateRecord) -> Self {
        Self {
            record,
            state: RevocationState::Pending,
        }
    }

    /// Perform the next deletion and advance the state
    fn step(&mut self, registry: &mut Registry) -> Result<()> {
        let next = match self.state {
            RevocationState::Pending => {
                remove_artifact(&self.record.cert_path)
                    .map_err(|e| ChainError::persistence(&self.record.cert_path, e))?;
                RevocationState::CertDeleted
            }
            RevocationState::CertDeleted => {
                remove_artifact(&self.record.key_path).map_err(|source| self.partial(source))?;
                RevocationState::KeyDeleted
            }
            RevocationState::KeyDeleted => {
                registry
                    .remove_entry(&self.record.name)
                    .map_err(|source| self.partial(source))?;
                RevocationState::Done
            }
            RevocationState::Done => RevocationState::Done,
        };
        debug!(name = %self.record.name, from = %self.state, to = %next, "revocation step");
        self.state = next;
        Ok(())
    }

    fn partial(&self, source: io::Error) -> ChainError {
        ChainError::PartialRevocation {
            name: self.record.name.clone(),
            state: self.state,
            source,
        }
    }
}

fn remove_artifact(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "already removed");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Registry of issued leaf certificates backed by a [`ChainConfig`]
#[derive(Debug)]
pub struct Registry {
    config: ChainConfig,
    config_path: Option<PathBuf>,
}

impl Registry {
    /// In-memory registry; revocations are not written anywhere
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config,
            config_path: None,
        }
    }

    /// Registry loaded from, and written back to, a configuration file
    pub fn open(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = config_path.into();
        let config = ChainConfig::from_file(&config_path)?;
        Ok(Self {
            config,
            config_path: Some(config_path),
        })
    }

    /// All records, in configuration order
    pub fn list(&self) -> Vec<CertificateRecord> {
        self.config
            .certificates
            .iter()
            .map(|(name, cert)| CertificateRecord {
                name: name.clone(),
                common_name: cert.common_name.clone(),
                cert_path: cert.cert_path.clone(),
                key_path: cert.key_path.clone(),
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<CertificateRecord> {
        self.config.certificates.get(name).map(|cert| CertificateRecord {
            name: name.to_string(),
            common_name: cert.common_name.clone(),
            cert_path: cert.cert_path.clone(),
            key_path: cert.key_path.clone(),
        })
    }

    /// Delete the certificate file, the key file, then the registry entry
    ///
    /// # Errors
    /// - [`ChainError::NotFound`] if `name` is not registered; nothing is touched
    /// - [`ChainError::Persistence`] if the certificate file cannot be deleted;
    ///   nothing has changed
    /// - [`ChainError::PartialRevocation`] if the certificate is gone but the key
    ///   file or the registry update failed; the entry is kept and a retry
    ///   finishes the job
    pub fn revoke(&mut self, name: &str) -> Result<CertificateRecord> {
        let record = self
            .get(name)
            .ok_or_else(|| ChainError::NotFound(name.to_string()))?;

        let mut revocation = Revocation::new(record);
        while revocation.state != RevocationState::Done {
            revocation.step(self)?;
        }
        info!(name = %name, "certificate revoked");
        Ok(revocation.record)
    }

    /// Drop an entry, persisting first so memory and file never disagree
    fn remove_entry(&mut self, name: &str) -> io::Result<()> {
        if let Some(path) = &self.config_path {
            configs::remove_certificate_entry(path, name)?;
        }
        self.config.certificates.shift_remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::{CertificateConfig, KeySpec};

    fn config_with(dir: &Path, names: &[&str]) -> ChainConfig {
        let mut config = ChainConfig::new(dir.join("ca/root"), dir.join("ca/intermediate"));
        config.key = KeySpec::EcdsaP256;
        for name in names {
            let cert_path = dir.join(format!("{}.pem", name));
            let key_path = dir.join(format!("{}.key", name));
            fs::write(&cert_path, b"cert").unwrap();
            fs::write(&key_path, b"key").unwrap();
            config.certificates.insert(
                name.to_string(),
                CertificateConfig {
                    common_name: format!("{}.internal", name),
                    cert_path,
                    key_path,
                    alt_names: vec![],
                },
            );
        }
        config
    }

    #[test]
    fn test_list_in_configuration_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new(config_with(dir.path(), &["b", "a"]));
        let names: Vec<String> = registry.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(registry.get("a").unwrap().common_name, "a.internal");
        assert!(registry.get("zz").is_none());
    }

    #[test]
    fn test_revoke_missing_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new(config_with(dir.path(), &["svc1"]));
        let err = registry.revoke("missing").unwrap_err();
        assert!(matches!(err, ChainError::NotFound(ref n) if n == "missing"));
        assert!(dir.path().join("svc1.pem").exists());
        assert!(dir.path().join("svc1.key").exists());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_revoke_removes_files_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new(config_with(dir.path(), &["svc1", "svc2"]));
        let record = registry.revoke("svc1").unwrap();

        assert_eq!(record.name, "svc1");
        assert!(!record.cert_path.exists());
        assert!(!record.key_path.exists());
        assert!(dir.path().join("svc2.pem").exists());
        let names: Vec<String> = registry.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["svc2"]);
    }

    #[test]
    fn test_key_failure_keeps_entry_and_retry_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_with(dir.path(), &["svc1"]);
        // A non-empty directory cannot be removed with remove_file
        let key_dir = dir.path().join("svc1-key-dir");
        fs::create_dir(&key_dir).unwrap();
        fs::write(key_dir.join("inner"), b"x").unwrap();
        config.certificates["svc1"].key_path = key_dir.clone();
        let mut registry = Registry::new(config);

        let err = registry.revoke("svc1").unwrap_err();
        match err {
            ChainError::PartialRevocation { state, .. } => {
                assert_eq!(state, RevocationState::CertDeleted)
            }
            other => panic!("expected partial revocation, got {}", other),
        }
        assert!(!dir.path().join("svc1.pem").exists());
        assert!(registry.get("svc1").is_some());

        fs::remove_dir_all(&key_dir).unwrap();
        fs::write(&key_dir, b"key").unwrap();
        registry.revoke("svc1").unwrap();
        assert!(!key_dir.exists());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_revoke_rewrites_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("chainsmith.toml");
        config_with(dir.path(), &["svc1", "svc2"]).save(&config_path).unwrap();

        let mut registry = Registry::open(&config_path).unwrap();
        registry.revoke("svc2").unwrap();

        let reloaded = Registry::open(&config_path).unwrap();
        let names: Vec<String> = reloaded.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["svc1"]);
    }

    #[test]
    fn test_revoke_keeps_hand_written_config() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b"] {
            fs::write(dir.path().join(format!("{}.pem", name)), b"cert").unwrap();
            fs::write(dir.path().join(format!("{}.key", name)), b"key").unwrap();
        }
        let config_path = dir.path().join("chainsmith.toml");
        let original = format!(
            r#"# operator notes: rotate yearly
root_ca_path = "{root}/ca/root"
intermediate_ca_path = "{root}/ca/intermediate"

[key]
algorithm = "ecdsa-p256" # fast enough for CI

[certificates.a]
common_name = "a.internal"
cert_path = "{root}/a.pem"
key_path = "{root}/a.key"

# billing service
[certificates.b]
common_name = "b.internal"
cert_path = "{root}/b.pem"
key_path = "{root}/b.key"
"#,
            root = dir.path().display()
        );
        fs::write(&config_path, &original).unwrap();

        let mut registry = Registry::open(&config_path).unwrap();
        registry.revoke("b").unwrap();

        let rewritten = fs::read_to_string(&config_path).unwrap();
        assert!(rewritten.contains("# operator notes: rotate yearly"));
        assert!(rewritten.contains("# fast enough for CI"));
        assert!(!rewritten.contains("b.internal"));
        assert!(!rewritten.contains("[subject]"));
        assert!(!rewritten.contains("[validity]"));
        assert!(rewritten.contains("a.internal"));

        let reloaded = Registry::open(&config_path).unwrap();
        let names: Vec<String> = reloaded.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn test_unwritable_registry_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), &["svc1"]);
        let mut registry = Registry {
            config,
            config_path: Some(dir.path().join("gone/chainsmith.toml")),
        };

        let err = registry.revoke("svc1").unwrap_err();
        assert!(matches!(
            err,
            ChainError::PartialRevocation {
                state: RevocationState::KeyDeleted,
                ..
            }
        ));
        assert!(registry.get("svc1").is_some());
    }
}
