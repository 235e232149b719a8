//! Leaf Certificate Generation Module
//!
//! Generates end-entity certificates signed by the intermediate CA, for TLS
//! servers and clients alike (mutual TLS between internal services).
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed)
//!   └── Intermediate CA (signed by Root)
//!       └── Leaf certificate (signed by Intermediate) ← This module
//! ```
//!
//! # X.509 Extensions
//! - **Basic Constraints**: CA=false, critical
//! - **Key Usage**: digitalSignature, keyEncipherment (critical)
//! - **Extended Key Usage**: serverAuth, clientAuth
//! - **Subject Alternative Name**: the common name plus any configured
//!   `alt_names`; IP literals become IP entries
//! - **Default Validity**: 365 days

use std::net::IpAddr;

use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Ref, X509};
use tracing::info;

use crate::certificate_template::{
    build_subject_name, check_issuer, generate_private_key, serial_hex, signature_digest,
    start_certificate, IssuedKind, SerialNumbers,
};
use crate::configs::{CertificateConfig, ChainConfig, KeySpec, SubjectDefaults};
use crate::errors::{ChainError, Result};
use crate::pem_store;

// ================= Leaf Certificate Builder =================

/// Builder for an end-entity key pair and certificate signed by an issuing CA
///
/// # Examples
/// ```rust,no_run
/// # use chainsmith::errors::Result;
/// # use openssl::pkey::{PKey, Private};
/// # use openssl::x509::X509;
/// use chainsmith::certificate_template::SerialNumbers;
/// use chainsmith::generate_leaf_cert::LeafCertificateBuilder;
///
/// # fn example(int_key: PKey<Private>, int_cert: X509) -> Result<()> {
/// let mut serials = SerialNumbers::new();
/// let (_key, _cert) = LeafCertificateBuilder::new(&int_key, &int_cert)
///     .subject_common_name("svc1.internal".to_string())
///     .alt_names(vec!["svc1".to_string(), "10.0.0.7".to_string()])
///     .validity_days(90)
///     .build(&mut serials)?;
/// # Ok(())
/// # }
/// ```
pub struct LeafCertificateBuilder<'a> {
    subject_common_name: String,
    alt_names: Vec<String>,
    subject: SubjectDefaults,
    key_spec: KeySpec,
    validity_days: u32,
    signing_key: &'a PKeyRef<Private>,
    signing_cert: &'a X509Ref,
}

impl<'a> LeafCertificateBuilder<'a> {
    /// # Arguments
    /// * `ca_key` - Issuing CA's private key for signing
    /// * `ca_cert` - Issuing CA's certificate (issuer information)
    pub fn new(ca_key: &'a PKeyRef<Private>, ca_cert: &'a X509Ref) -> Self {
        Self {
            subject_common_name: String::new(),
            alt_names: Vec::new(),
            subject: SubjectDefaults::default(),
            key_spec: KeySpec::default(),
            validity_days: 365, // Default 1 year
            signing_key: ca_key,
            signing_cert: ca_cert,
        }
    }

    pub fn subject_common_name(mut self, cn: String) -> Self {
        self.subject_common_name = cn;
        self
    }

    pub fn alt_names(mut self, names: Vec<String>) -> Self {
        self.alt_names = names;
        self
    }

    pub fn subject_defaults(mut self, subject: SubjectDefaults) -> Self {
        self.subject = subject;
        self
    }

    pub fn key_spec(mut self, key_spec: KeySpec) -> Self {
        self.key_spec = key_spec;
        self
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    /// Generate the key pair and the certificate signed by the issuing CA
    ///
    /// # Errors
    /// - [`ChainError::Signing`] if the issuer is not a usable CA (key mismatch,
    ///   no CA flag, expired) or signing fails
    /// - [`ChainError::Generation`] if the common name is empty or key or
    ///   certificate construction fails
    pub fn build(self, serials: &mut SerialNumbers) -> Result<(PKey<Private>, X509)> {
        if self.subject_common_name.trim().is_empty() {
            return Err(ChainError::Generation(
                "leaf certificate requires a common name".into(),
            ));
        }
        check_issuer(self.signing_cert, self.signing_key, IssuedKind::EndEntity)?;

        let private_key = generate_private_key(self.key_spec)?;
        let subject_name = build_subject_name(&self.subject_common_name, &self.subject)?;
        let mut builder =
            start_certificate(&private_key, &subject_name, self.validity_days, serials)?;

        // Set issuer to intermediate CA's subject (from signing_cert)
        builder
            .set_issuer_name(self.signing_cert.subject_name())
            .map_err(|e| ChainError::generation("Failed to set issuer from issuing CA", e))?;

        // Add Basic Constraints: CA=false (end-entity certificate)
        let bc = BasicConstraints::new()
            .critical()
            .build()
            .map_err(|e| ChainError::generation("Failed to build BasicConstraints", e))?;
        builder
            .append_extension(bc)
            .map_err(|e| ChainError::generation("Failed to add BasicConstraints", e))?;

        let ku = KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()
            .map_err(|e| ChainError::generation("Failed to build KeyUsage", e))?;
        builder
            .append_extension(ku)
            .map_err(|e| ChainError::generation("Failed to add KeyUsage", e))?;

        let eku = ExtendedKeyUsage::new()
            .server_auth()
            .client_auth()
            .build()
            .map_err(|e| ChainError::generation("Failed to build ExtendedKeyUsage", e))?;
        builder
            .append_extension(eku)
            .map_err(|e| ChainError::generation("Failed to add ExtendedKeyUsage", e))?;

        let mut san = SubjectAlternativeName::new();
        let mut names: Vec<&str> = vec![self.subject_common_name.as_str()];
        for alt in &self.alt_names {
            if !names.contains(&alt.as_str()) {
                names.push(alt.as_str());
            }
        }
        for name in names {
            if name.parse::<IpAddr>().is_ok() {
                san.ip(name);
            } else {
                san.dns(name);
            }
        }
        let san = san
            .build(&builder.x509v3_context(Some(self.signing_cert), None))
            .map_err(|e| ChainError::generation("Failed to build SubjectAlternativeName", e))?;
        builder
            .append_extension(san)
            .map_err(|e| ChainError::generation("Failed to add SubjectAlternativeName", e))?;

        let ski = SubjectKeyIdentifier::new()
            .build(&builder.x509v3_context(Some(self.signing_cert), None))
            .map_err(|e| ChainError::generation("Failed to build SubjectKeyIdentifier", e))?;
        builder
            .append_extension(ski)
            .map_err(|e| ChainError::generation("Failed to add SubjectKeyIdentifier", e))?;

        let aki = AuthorityKeyIdentifier::new()
            .keyid(false)
            .issuer(false)
            .build(&builder.x509v3_context(Some(self.signing_cert), None))
            .map_err(|e| ChainError::generation("Failed to build AuthorityKeyIdentifier", e))?;
        builder
            .append_extension(aki)
            .map_err(|e| ChainError::generation("Failed to add AuthorityKeyIdentifier", e))?;

        // Sign with intermediate CA's private key
        builder
            .sign(self.signing_key, signature_digest(self.signing_key))
            .map_err(|e| ChainError::signing("Failed to sign certificate", e))?;

        Ok((private_key, builder.build()))
    }
}

/// Issue a leaf certificate for `leaf` and persist it to its configured paths
///
/// Key spec, subject fields and validity come from `config`.
pub fn issue_certificate(
    leaf: &CertificateConfig,
    issuer_cert: &X509Ref,
    issuer_key: &PKeyRef<Private>,
    config: &ChainConfig,
    serials: &mut SerialNumbers,
) -> Result<X509> {
    let (private_key, certificate) = LeafCertificateBuilder::new(issuer_key, issuer_cert)
        .subject_common_name(leaf.common_name.clone())
        .alt_names(leaf.alt_names.clone())
        .subject_defaults(config.subject.clone())
        .key_spec(config.key)
        .validity_days(config.validity.leaf_days)
        .build(serials)?;

    pem_store::persist_key_certificate(&leaf.cert_path, &leaf.key_path, &private_key, &certificate)?;
    info!(
        common_name = %leaf.common_name,
        cert = %leaf.cert_path.display(),
        key = %leaf.key_path.display(),
        serial = %serial_hex(&certificate)?,
        "leaf certificate written"
    );
    Ok(certificate)
}
