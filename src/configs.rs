use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use toml_edit::DocumentMut;
use tracing::debug;

use crate::errors::{ChainError, Result};

/// Config file used when neither `--config` nor `CMG_CONFIGFILE` is given
pub const DEFAULT_CONFIG_PATH: &str = "chainsmith.toml";
/// Environment variable naming the config file
pub const CONFIG_FILE_ENV: &str = "CMG_CONFIGFILE";

const RSA_MIN_BITS: u32 = 2048;
const RSA_MAX_BITS: u32 = 16384;

/// Desired chain layout: where the CAs live and which leaves to issue
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    pub root_ca_path: PathBuf,
    pub intermediate_ca_path: PathBuf,
    #[serde(default)]
    pub key: KeySpec,
    #[serde(default)]
    pub subject: SubjectDefaults,
    #[serde(default)]
    pub validity: ValidityDefaults,
    #[serde(default)]
    pub certificates: IndexMap<String, CertificateConfig>,
}

/// One leaf certificate, keyed by its logical name in [`ChainConfig::certificates`]
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CertificateConfig {
    pub common_name: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Extra subject alternative names; IP literals become IP entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alt_names: Vec<String>,
}

/// Key algorithm used for every key pair in the chain
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "algorithm", rename_all = "kebab-case")]
pub enum KeySpec {
    Rsa {
        #[serde(default = "default_rsa_bits")]
        bits: u32,
    },
    EcdsaP256,
    EcdsaP384,
}

impl Default for KeySpec {
    fn default() -> Self {
        KeySpec::Rsa {
            bits: default_rsa_bits(),
        }
    }
}

fn default_rsa_bits() -> u32 {
    4096
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SubjectDefaults {
    #[serde(default = "default_root_common_name")]
    pub root_common_name: String,
    #[serde(default = "default_intermediate_common_name")]
    pub intermediate_common_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organizational_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl Default for SubjectDefaults {
    fn default() -> Self {
        Self {
            root_common_name: default_root_common_name(),
            intermediate_common_name: default_intermediate_common_name(),
            organization: None,
            organizational_unit: None,
            locality: None,
            state: None,
            country: None,
        }
    }
}

fn default_root_common_name() -> String {
    "Chainsmith Root CA".to_string()
}

fn default_intermediate_common_name() -> String {
    "Chainsmith Intermediate CA".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct ValidityDefaults {
    #[serde(default = "default_root_days")]
    pub root_days: u32,
    #[serde(default = "default_intermediate_days")]
    pub intermediate_days: u32,
    #[serde(default = "default_leaf_days")]
    pub leaf_days: u32,
}

impl Default for ValidityDefaults {
    fn default() -> Self {
        Self {
            root_days: default_root_days(),
            intermediate_days: default_intermediate_days(),
            leaf_days: default_leaf_days(),
        }
    }
}

fn default_root_days() -> u32 {
    3650 // 10 years
}

fn default_intermediate_days() -> u32 {
    1825 // 5 years
}

fn default_leaf_days() -> u32 {
    365
}

/// Private key path for a CA certificate path: `<path>.key`
pub fn ca_key_path(cert_path: &Path) -> PathBuf {
    let mut path = cert_path.as_os_str().to_owned();
    path.push(".key");
    PathBuf::from(path)
}

/// Drop `certificates.<name>` from the config file at `path`
///
/// Only that entry is touched: comments, formatting and omitted defaults in
/// the rest of the file stay as the operator wrote them.
pub(crate) fn remove_certificate_entry(path: &Path, name: &str) -> io::Result<()> {
    let content = fs::read_to_string(path)?;
    let mut doc: DocumentMut = content
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let removed = doc
        .get_mut("certificates")
        .and_then(|item| item.as_table_like_mut())
        .and_then(|certificates| certificates.remove(name));
    if removed.is_none() {
        debug!(path = %path.display(), name = %name, "entry not present in config file");
    }
    write_atomically(path, &doc.to_string())
}

/// Temp file in the target directory, then rename over the original.
/// The original file mode is carried over.
fn write_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(metadata) = fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

impl ChainConfig {
    /// Minimal configuration with default key, subject and validity settings
    pub fn new(root_ca_path: impl Into<PathBuf>, intermediate_ca_path: impl Into<PathBuf>) -> Self {
        Self {
            root_ca_path: root_ca_path.into(),
            intermediate_ca_path: intermediate_ca_path.into(),
            key: KeySpec::default(),
            subject: SubjectDefaults::default(),
            validity: ValidityDefaults::default(),
            certificates: IndexMap::new(),
        }
    }

    /// Load and validate configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|e| {
            ChainError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&config_str)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: ChainConfig = toml::from_str(config_str)
            .map_err(|e| ChainError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rewrite the configuration file atomically
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ChainError::Config(format!("Failed to serialize config: {}", e)))?;
        write_atomically(path, &contents).map_err(|e| ChainError::persistence(path, e))
    }

    pub fn root_ca_key_path(&self) -> PathBuf {
        ca_key_path(&self.root_ca_path)
    }

    pub fn intermediate_ca_key_path(&self) -> PathBuf {
        ca_key_path(&self.intermediate_ca_path)
    }

    /// Check the invariants the chain builder and registry rely on
    pub fn validate(&self) -> Result<()> {
        if self.root_ca_path.as_os_str().is_empty() {
            return Err(ChainError::Config("root_ca_path must not be empty".into()));
        }
        if self.intermediate_ca_path.as_os_str().is_empty() {
            return Err(ChainError::Config(
                "intermediate_ca_path must not be empty".into(),
            ));
        }

        if let KeySpec::Rsa { bits } = self.key {
            if !(RSA_MIN_BITS..=RSA_MAX_BITS).contains(&bits) {
                return Err(ChainError::Config(format!(
                    "RSA key size {} outside {}..={}",
                    bits, RSA_MIN_BITS, RSA_MAX_BITS
                )));
            }
        }

        if let Some(country) = &self.subject.country {
            if country.chars().count() != 2 {
                return Err(ChainError::Config(format!(
                    "country must be a two-letter ISO code, got '{}'",
                    country
                )));
            }
        }

        let validity = &self.validity;
        if validity.root_days == 0 || validity.intermediate_days == 0 || validity.leaf_days == 0 {
            return Err(ChainError::Config("validity days must be positive".into()));
        }
        // A child must not outlive its issuer
        if validity.intermediate_days > validity.root_days
            || validity.leaf_days > validity.intermediate_days
        {
            return Err(ChainError::Config(format!(
                "validity must shrink down the chain (root {}, intermediate {}, leaf {})",
                validity.root_days, validity.intermediate_days, validity.leaf_days
            )));
        }

        let mut seen: HashSet<PathBuf> = HashSet::new();
        for path in [
            self.root_ca_path.clone(),
            self.root_ca_key_path(),
            self.intermediate_ca_path.clone(),
            self.intermediate_ca_key_path(),
        ] {
            if !seen.insert(path.clone()) {
                return Err(ChainError::Config(format!(
                    "CA path {} is used twice",
                    path.display()
                )));
            }
        }

        for (name, cert) in &self.certificates {
            if name.trim().is_empty() {
                return Err(ChainError::Config("certificate name must not be empty".into()));
            }
            if cert.common_name.trim().is_empty() {
                return Err(ChainError::Config(format!(
                    "certificate '{}' has an empty common_name",
                    name
                )));
            }
            for path in [&cert.cert_path, &cert.key_path] {
                if path.as_os_str().is_empty() {
                    return Err(ChainError::Config(format!(
                        "certificate '{}' has an empty path",
                        name
                    )));
                }
                if !seen.insert(path.clone()) {
                    return Err(ChainError::Config(format!(
                        "certificate '{}' reuses path {}",
                        name,
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }
}
