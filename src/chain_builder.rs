//! Chain orchestration: root → intermediate → leaves
//!
//! Every call to [`build_chain`] regenerates the whole chain. The root and
//! intermediate are created from scratch, which invalidates every leaf issued
//! by an earlier run: those leaves are re-issued in the same call, and any
//! certificate issued elsewhere from the old intermediate stops verifying.
//!
//! The sequence is fail-fast. The first error aborts the run and files already
//! written by it stay on disk.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::certificate_template::{serial_hex, SerialNumbers};
use crate::configs::ChainConfig;
use crate::errors::Result;
use crate::generate_ca::{create_ca, CaRole};
use crate::generate_leaf_cert::issue_certificate;

/// One certificate written by a chain build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedArtifact {
    pub name: String,
    pub common_name: String,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub serial_hex: String,
}

/// Everything a chain build wrote, leaves in configuration order
#[derive(Debug, Clone)]
pub struct IssuedChain {
    pub root: IssuedArtifact,
    pub intermediate: IssuedArtifact,
    pub leaves: Vec<IssuedArtifact>,
}

impl IssuedChain {
    pub fn artifacts(&self) -> impl Iterator<Item = &IssuedArtifact> {
        [&self.root, &self.intermediate]
            .into_iter()
            .chain(self.leaves.iter())
    }
}

/// Build (or rebuild) the complete chain described by `config`
pub fn build_chain(config: &ChainConfig) -> Result<IssuedChain> {
    config.validate()?;

    if config.root_ca_path.exists() {
        warn!(
            path = %config.root_ca_path.display(),
            "existing root CA will be replaced; certificates signed by the previous chain stop verifying"
        );
    }

    let mut serials = SerialNumbers::new();

    let root_key_path = config.root_ca_key_path();
    let (root_key, root_cert) = create_ca(
        &config.root_ca_path,
        &root_key_path,
        CaRole::Root,
        config,
        &mut serials,
    )?;
    let root = IssuedArtifact {
        name: "root".to_string(),
        common_name: config.subject.root_common_name.clone(),
        cert_path: config.root_ca_path.clone(),
        key_path: root_key_path,
        serial_hex: serial_hex(&root_cert)?,
    };

    let intermediate_key_path = config.intermediate_ca_key_path();
    let (intermediate_key, intermediate_cert) = create_ca(
        &config.intermediate_ca_path,
        &intermediate_key_path,
        CaRole::Intermediate {
            parent_cert: &root_cert,
            parent_key: &root_key,
        },
        config,
        &mut serials,
    )?;
    let intermediate = IssuedArtifact {
        name: "intermediate".to_string(),
        common_name: config.subject.intermediate_common_name.clone(),
        cert_path: config.intermediate_ca_path.clone(),
        key_path: intermediate_key_path,
        serial_hex: serial_hex(&intermediate_cert)?,
    };

    let mut leaves = Vec::with_capacity(config.certificates.len());
    for (name, leaf) in &config.certificates {
        info!(name = %name, "Generating certificate");
        let certificate = issue_certificate(
            leaf,
            &intermediate_cert,
            &intermediate_key,
            config,
            &mut serials,
        )?;
        leaves.push(IssuedArtifact {
            name: name.clone(),
            common_name: leaf.common_name.clone(),
            cert_path: leaf.cert_path.clone(),
            key_path: leaf.key_path.clone(),
            serial_hex: serial_hex(&certificate)?,
        });
    }

    info!(leaves = leaves.len(), "certificate chain issued");
    Ok(IssuedChain {
        root,
        intermediate,
        leaves,
    })
}
