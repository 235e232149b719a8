//! CA Certificate Generation Module
//!
//! Generates the two certificate authorities of the chain: a self-signed root
//! and an intermediate signed by that root.
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed, pathlen=1)         ← CaRole::Root
//!   └── Intermediate CA (pathlen=0)        ← CaRole::Intermediate
//!       └── Leaf certificate (CA=false)
//! ```
//!
//! # Certificate Properties
//! - **Basic Constraints**: CA=true, critical; pathlen=1 for the root, 0 for the
//!   intermediate (it can only sign end-entity certificates)
//! - **Key Usage**: keyCertSign, cRLSign, digitalSignature (critical)
//! - **Subject Key Identifier** on both; **Authority Key Identifier** on the
//!   intermediate
//! - **Default Validity**: root 3650 days, intermediate 1825 days
//!
//! # Example
//! ```rust,no_run
//! # use chainsmith::errors::Result;
//! use chainsmith::certificate_template::SerialNumbers;
//! use chainsmith::generate_ca::{CaCertificateBuilder, CaRole};
//!
//! # fn example() -> Result<()> {
//! let mut serials = SerialNumbers::new();
//! let (root_key, root_cert) = CaCertificateBuilder::new(CaRole::Root)
//!     .subject_common_name("Example Root CA".to_string())
//!     .validity_days(3650)
//!     .build(&mut serials)?;
//!
//! let (_int_key, _int_cert) = CaCertificateBuilder::new(CaRole::Intermediate {
//!     parent_cert: &root_cert,
//!     parent_key: &root_key,
//! })
//! .subject_common_name("Example Intermediate CA".to_string())
//! .build(&mut serials)?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectKeyIdentifier,
};
use openssl::x509::{X509Ref, X509};
use tracing::info;

use crate::certificate_template::{
    build_subject_name, check_issuer, generate_private_key, serial_hex, signature_digest,
    start_certificate, IssuedKind, SerialNumbers,
};
use crate::configs::{ChainConfig, KeySpec, SubjectDefaults, ValidityDefaults};
use crate::errors::{ChainError, Result};
use crate::pem_store;

const ROOT_CA_PATH_LENGTH: u32 = 1;
const INTERMEDIATE_CA_PATH_LENGTH: u32 = 0; // Can only sign end-entity certs, not other CAs

/// Position of a CA in the chain
///
/// The root signs itself; the intermediate carries a back-reference to the
/// parent that signs it. The parent is borrowed, never owned.
#[derive(Clone, Copy)]
pub enum CaRole<'a> {
    Root,
    Intermediate {
        parent_cert: &'a X509Ref,
        parent_key: &'a PKeyRef<Private>,
    },
}

impl CaRole<'_> {
    pub fn path_length(&self) -> u32 {
        match self {
            CaRole::Root => ROOT_CA_PATH_LENGTH,
            CaRole::Intermediate { .. } => INTERMEDIATE_CA_PATH_LENGTH,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CaRole::Root => "root CA",
            CaRole::Intermediate { .. } => "intermediate CA",
        }
    }

    fn default_common_name(&self, config: &ChainConfig) -> String {
        match self {
            CaRole::Root => config.subject.root_common_name.clone(),
            CaRole::Intermediate { .. } => config.subject.intermediate_common_name.clone(),
        }
    }

    fn default_validity_days(&self, config: &ChainConfig) -> u32 {
        match self {
            CaRole::Root => config.validity.root_days,
            CaRole::Intermediate { .. } => config.validity.intermediate_days,
        }
    }
}

/// Builder for a CA key pair and certificate
pub struct CaCertificateBuilder<'a> {
    role: CaRole<'a>,
    subject_common_name: String,
    subject: SubjectDefaults,
    key_spec: KeySpec,
    validity_days: u32,
}

impl<'a> CaCertificateBuilder<'a> {
    pub fn new(role: CaRole<'a>) -> Self {
        let defaults = SubjectDefaults::default();
        let subject_common_name = match role {
            CaRole::Root => defaults.root_common_name.clone(),
            CaRole::Intermediate { .. } => defaults.intermediate_common_name.clone(),
        };
        let validity = ValidityDefaults::default();
        let validity_days = match role {
            CaRole::Root => validity.root_days,
            CaRole::Intermediate { .. } => validity.intermediate_days,
        };
        Self {
            role,
            subject_common_name,
            subject: defaults,
            key_spec: KeySpec::default(),
            validity_days,
        }
    }

    /// Builder preloaded with the key spec, subject fields and validity of `config`
    pub fn from_config(role: CaRole<'a>, config: &ChainConfig) -> Self {
        Self::new(role)
            .subject_common_name(role.default_common_name(config))
            .subject_defaults(config.subject.clone())
            .key_spec(config.key)
            .validity_days(role.default_validity_days(config))
    }

    /// Set the common name (CN) for the certificate
    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    /// Set the optional O/OU/L/ST/C fields
    pub fn subject_defaults(mut self, subject: SubjectDefaults) -> Self {
        self.subject = subject;
        self
    }

    pub fn key_spec(mut self, key_spec: KeySpec) -> Self {
        self.key_spec = key_spec;
        self
    }

    /// Set validity period in days
    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Generate the key pair and the signed CA certificate
    ///
    /// # Errors
    /// - [`ChainError::Signing`] if an intermediate's parent key does not match
    ///   the parent certificate, the parent is not a CA, its path length forbids
    ///   another CA below it, it has expired, or signing fails
    /// - [`ChainError::Generation`] if key or certificate construction fails
    pub fn build(self, serials: &mut SerialNumbers) -> Result<(PKey<Private>, X509)> {
        if let CaRole::Intermediate {
            parent_cert,
            parent_key,
        } = self.role
        {
            check_issuer(parent_cert, parent_key, IssuedKind::Ca)?;
        }

        let private_key = generate_private_key(self.key_spec)?;
        let subject_name = build_subject_name(&self.subject_common_name, &self.subject)?;
        let mut builder =
            start_certificate(&private_key, &subject_name, self.validity_days, serials)?;

        let parent_cert = match self.role {
            CaRole::Root => {
                builder
                    .set_issuer_name(&subject_name)
                    .map_err(|e| ChainError::generation("Failed to set issuer", e))?;
                None
            }
            CaRole::Intermediate { parent_cert, .. } => {
                // Set issuer to root CA's subject (from parent_cert)
                builder
                    .set_issuer_name(parent_cert.subject_name())
                    .map_err(|e| ChainError::generation("Failed to set issuer from parent CA", e))?;
                Some(parent_cert)
            }
        };

        let mut bc = BasicConstraints::new();
        bc.critical().ca().pathlen(self.role.path_length());
        let extension = bc
            .build()
            .map_err(|e| ChainError::generation("Failed to build BasicConstraints", e))?;
        builder
            .append_extension(extension)
            .map_err(|e| ChainError::generation("Failed to add BasicConstraints", e))?;

        let mut ku = KeyUsage::new();
        ku.critical();
        ku.key_cert_sign();
        ku.crl_sign();
        ku.digital_signature();
        let ku_extension = ku
            .build()
            .map_err(|e| ChainError::generation("Failed to build KeyUsage", e))?;
        builder
            .append_extension(ku_extension)
            .map_err(|e| ChainError::generation("Failed to add KeyUsage", e))?;

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(parent_cert, None))
            .map_err(|e| ChainError::generation("Failed to build SubjectKeyIdentifier", e))?;
        builder
            .append_extension(ski)
            .map_err(|e| ChainError::generation("Failed to add SubjectKeyIdentifier", e))?;

        if parent_cert.is_some() {
            let aki = AuthorityKeyIdentifier::new()
                .keyid(false)
                .issuer(false)
                .build(&builder.x509v3_context(parent_cert, None))
                .map_err(|e| {
                    ChainError::generation("Failed to build AuthorityKeyIdentifier", e)
                })?;
            builder
                .append_extension(aki)
                .map_err(|e| ChainError::generation("Failed to add AuthorityKeyIdentifier", e))?;
        }

        match self.role {
            CaRole::Root => builder
                .sign(&private_key, signature_digest(&private_key))
                .map_err(|e| ChainError::signing("Failed to self-sign root certificate", e))?,
            CaRole::Intermediate { parent_key, .. } => builder
                .sign(parent_key, signature_digest(parent_key))
                .map_err(|e| ChainError::signing("Failed to sign certificate with parent key", e))?,
        }

        Ok((private_key, builder.build()))
    }
}

/// Create a CA and persist it: key to `key_path` (0600), certificate to `cert_path`
///
/// Common name, key spec and validity come from `config` according to `role`.
pub fn create_ca(
    cert_path: &Path,
    key_path: &Path,
    role: CaRole<'_>,
    config: &ChainConfig,
    serials: &mut SerialNumbers,
) -> Result<(PKey<Private>, X509)> {
    let (private_key, certificate) = CaCertificateBuilder::from_config(role, config).build(serials)?;
    pem_store::persist_key_certificate(cert_path, key_path, &private_key, &certificate)?;
    info!(
        role = role.label(),
        cert = %cert_path.display(),
        key = %key_path.display(),
        serial = %serial_hex(&certificate)?,
        "CA certificate written"
    );
    Ok((private_key, certificate))
}
