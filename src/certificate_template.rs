//! Shared X.509v3 skeleton for every certificate in the chain
//!
//! Root, intermediate and leaf builders all start from the same steps: generate
//! a key pair for the configured [`KeySpec`], draw a serial number that is unique
//! within the current build, build the subject name, and set the validity
//! window. Role-specific extensions and the signature are added by the callers.

use std::cmp::Ordering;
use std::collections::HashSet;

use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKey, PKeyRef, Private};
use openssl::x509::{X509Builder, X509Name, X509NameRef, X509Ref, X509};

use crate::configs::{KeySpec, SubjectDefaults};
use crate::errors::{ChainError, Result};
use crate::inspect;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const SERIAL_BITS: i32 = 128;

/// Serial numbers handed out during one chain build
///
/// Serials are random 128-bit values; a draw that repeats an earlier one (or is
/// zero) is discarded, so every certificate of a build gets a distinct serial.
#[derive(Debug, Default)]
pub struct SerialNumbers {
    issued: HashSet<Vec<u8>>,
}

impl SerialNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw the next unused serial number
    pub fn next_serial(&mut self) -> Result<Asn1Integer> {
        loop {
            let mut serial = BigNum::new()
                .map_err(|e| ChainError::generation("Failed to allocate serial", e))?;
            serial
                .rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)
                .map_err(|e| ChainError::generation("Failed to generate serial", e))?;
            if serial.num_bits() == 0 {
                continue;
            }
            if self.issued.insert(serial.to_vec()) {
                return serial
                    .to_asn1_integer()
                    .map_err(|e| ChainError::generation("Failed to encode serial", e));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

/// Generate a fresh private key for the given key spec
pub fn generate_private_key(spec: KeySpec) -> Result<PKey<Private>> {
    match spec {
        KeySpec::Rsa { bits } => {
            let rsa = openssl::rsa::Rsa::generate(bits)
                .map_err(|e| ChainError::generation("Failed to generate RSA keypair", e))?;
            PKey::from_rsa(rsa)
                .map_err(|e| ChainError::generation("Failed to create private key", e))
        }
        KeySpec::EcdsaP256 => generate_ec_key(Nid::X9_62_PRIME256V1),
        KeySpec::EcdsaP384 => generate_ec_key(Nid::SECP384R1),
    }
}

fn generate_ec_key(curve: Nid) -> Result<PKey<Private>> {
    let group = EcGroup::from_curve_name(curve)
        .map_err(|e| ChainError::generation("Failed to load EC curve", e))?;
    let ec_key = EcKey::generate(&group)
        .map_err(|e| ChainError::generation("Failed to generate EC keypair", e))?;
    PKey::from_ec_key(ec_key).map_err(|e| ChainError::generation("Failed to create private key", e))
}

/// Digest matched to the signing key: SHA-384 for P-384, SHA-256 otherwise
pub fn signature_digest(signing_key: &PKeyRef<Private>) -> MessageDigest {
    if signing_key.id() == Id::EC && signing_key.bits() > 256 {
        MessageDigest::sha384()
    } else {
        MessageDigest::sha256()
    }
}

/// Build a subject name: CN plus whichever optional fields are configured
pub fn build_subject_name(common_name: &str, defaults: &SubjectDefaults) -> Result<X509Name> {
    let mut name_builder = X509Name::builder()
        .map_err(|e| ChainError::generation("Failed to create name builder", e))?;
    name_builder
        .append_entry_by_nid(Nid::COMMONNAME, common_name)
        .map_err(|e| ChainError::generation("Failed to set CN", e))?;

    let optional = [
        (Nid::ORGANIZATIONNAME, &defaults.organization, "organization"),
        (
            Nid::ORGANIZATIONALUNITNAME,
            &defaults.organizational_unit,
            "organizational unit",
        ),
        (Nid::LOCALITYNAME, &defaults.locality, "locality"),
        (Nid::STATEORPROVINCENAME, &defaults.state, "state/province"),
        (Nid::COUNTRYNAME, &defaults.country, "country"),
    ];
    for (nid, value, label) in optional {
        if let Some(value) = value {
            name_builder
                .append_entry_by_nid(nid, value)
                .map_err(|e| ChainError::generation(&format!("Failed to set {}", label), e))?;
        }
    }
    Ok(name_builder.build())
}

/// Start an X.509v3 certificate: version, serial, subject, validity, public key
///
/// The issuer name, extensions and signature are left to the caller.
pub fn start_certificate(
    private_key: &PKeyRef<Private>,
    subject_name: &X509NameRef,
    validity_days: u32,
    serials: &mut SerialNumbers,
) -> Result<X509Builder> {
    let mut builder =
        X509::builder().map_err(|e| ChainError::generation("Failed to create X509 builder", e))?;

    builder
        .set_version(X509_VERSION_3)
        .map_err(|e| ChainError::generation("Failed to set version", e))?;

    let serial = serials.next_serial()?;
    builder
        .set_serial_number(&serial)
        .map_err(|e| ChainError::generation("Failed to set serial number", e))?;

    builder
        .set_subject_name(subject_name)
        .map_err(|e| ChainError::generation("Failed to set subject", e))?;

    let not_before = Asn1Time::days_from_now(0)
        .map_err(|e| ChainError::generation("Failed to create not_before", e))?;
    builder
        .set_not_before(&not_before)
        .map_err(|e| ChainError::generation("Failed to set not_before", e))?;

    let not_after = Asn1Time::days_from_now(validity_days)
        .map_err(|e| ChainError::generation("Failed to create not_after", e))?;
    builder
        .set_not_after(&not_after)
        .map_err(|e| ChainError::generation("Failed to set not_after", e))?;

    // Set public key (extracted from private_key automatically)
    builder
        .set_pubkey(private_key)
        .map_err(|e| ChainError::generation("Failed to set public key", e))?;

    Ok(builder)
}

/// Serial number of a certificate as upper-case hex
pub fn serial_hex(cert: &X509Ref) -> Result<String> {
    let bn = cert
        .serial_number()
        .to_bn()
        .map_err(|e| ChainError::generation("Failed to read serial number", e))?;
    let hex = bn
        .to_hex_str()
        .map_err(|e| ChainError::generation("Failed to format serial number", e))?;
    Ok(hex.to_string())
}

/// Whether the issuer is about to sign a CA or an end-entity certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuedKind {
    Ca,
    EndEntity,
}

/// Check that an issuer key/certificate pair may sign a certificate of `kind`
///
/// The key must belong to the certificate, the certificate must be a CA with
/// keyCertSign, it must be within its validity window, and a `pathlen=0` CA may
/// only sign end-entity certificates.
pub fn check_issuer(
    issuer_cert: &X509Ref,
    issuer_key: &PKeyRef<Private>,
    kind: IssuedKind,
) -> Result<()> {
    let issuer_public = issuer_cert
        .public_key()
        .map_err(|e| ChainError::signing("Failed to read issuer public key", e))?;
    if !issuer_public.public_eq(issuer_key) {
        return Err(ChainError::Signing(
            "issuer private key does not match issuer certificate".into(),
        ));
    }

    let summary = inspect::summarize(issuer_cert)
        .map_err(|e| ChainError::signing("Failed to inspect issuer certificate", e))?;
    let issuer_cn = &summary.subject_common_name;
    if !summary.is_ca {
        return Err(ChainError::Signing(format!(
            "issuer '{}' is not a CA certificate",
            issuer_cn
        )));
    }
    if !summary.key_usage.key_cert_sign {
        return Err(ChainError::Signing(format!(
            "issuer '{}' lacks keyCertSign usage",
            issuer_cn
        )));
    }
    if kind == IssuedKind::Ca && summary.path_len == Some(0) {
        return Err(ChainError::Signing(format!(
            "issuer '{}' has pathlen=0 and may not sign CA certificates",
            issuer_cn
        )));
    }

    let now = Asn1Time::days_from_now(0)
        .map_err(|e| ChainError::signing("Failed to read current time", e))?;
    let expired = issuer_cert
        .not_after()
        .compare(&now)
        .map_err(|e| ChainError::signing("Failed to compare issuer validity", e))?
        == Ordering::Less;
    if expired {
        return Err(ChainError::Signing(format!(
            "issuer '{}' has expired",
            issuer_cn
        )));
    }
    let not_yet_valid = issuer_cert
        .not_before()
        .compare(&now)
        .map_err(|e| ChainError::signing("Failed to compare issuer validity", e))?
        == Ordering::Greater;
    if not_yet_valid {
        return Err(ChainError::Signing(format!(
            "issuer '{}' is not yet valid",
            issuer_cn
        )));
    }
    Ok(())
}
