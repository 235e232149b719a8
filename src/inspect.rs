//! Read-back of the extension data that defines a certificate's role
//!
//! openssl can build and sign certificates but exposes little of the parsed
//! extension content, so the chain's own certificates are re-parsed with
//! `x509-parser` to check the CA flag, path length and key usages.

use std::net::IpAddr;

use openssl::x509::X509Ref;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::*;

use crate::errors::{ChainError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyUsageFlags {
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtendedKeyUsageFlags {
    pub server_auth: bool,
    pub client_auth: bool,
}

/// Role-relevant fields of a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject_common_name: String,
    pub issuer_common_name: String,
    /// Upper-case hex, same rendering as [`crate::certificate_template::serial_hex`]
    pub serial_hex: String,
    pub is_ca: bool,
    pub path_len: Option<u32>,
    pub key_usage: KeyUsageFlags,
    pub extended_key_usage: ExtendedKeyUsageFlags,
    pub subject_alt_names: Vec<String>,
    /// Unix timestamps
    pub not_before: i64,
    pub not_after: i64,
}

impl CertificateSummary {
    pub fn is_self_issued(&self) -> bool {
        self.subject_common_name == self.issuer_common_name
    }
}

pub fn summarize(cert: &X509Ref) -> Result<CertificateSummary> {
    let der = cert
        .to_der()
        .map_err(|e| ChainError::Inspect(format!("Failed to encode certificate: {}", e)))?;
    summarize_der(&der)
}

pub fn summarize_der(der: &[u8]) -> Result<CertificateSummary> {
    let (_, parsed) = parse_x509_certificate(der)
        .map_err(|e| ChainError::Inspect(format!("Failed to parse certificate: {}", e)))?;

    let basic_constraints = parsed
        .basic_constraints()
        .map_err(|e| ChainError::Inspect(format!("Invalid BasicConstraints: {}", e)))?;
    let (is_ca, path_len) = match basic_constraints {
        Some(bc) => (bc.value.ca, bc.value.path_len_constraint),
        None => (false, None),
    };

    let key_usage = parsed
        .key_usage()
        .map_err(|e| ChainError::Inspect(format!("Invalid KeyUsage: {}", e)))?
        .map(|ku| KeyUsageFlags {
            digital_signature: ku.value.digital_signature(),
            key_encipherment: ku.value.key_encipherment(),
            key_cert_sign: ku.value.key_cert_sign(),
            crl_sign: ku.value.crl_sign(),
        })
        .unwrap_or_default();

    let extended_key_usage = parsed
        .extended_key_usage()
        .map_err(|e| ChainError::Inspect(format!("Invalid ExtendedKeyUsage: {}", e)))?
        .map(|eku| ExtendedKeyUsageFlags {
            server_auth: eku.value.server_auth,
            client_auth: eku.value.client_auth,
        })
        .unwrap_or_default();

    let subject_alt_names = parsed
        .subject_alternative_name()
        .map_err(|e| ChainError::Inspect(format!("Invalid SubjectAlternativeName: {}", e)))?
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(general_name_to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(CertificateSummary {
        subject_common_name: first_common_name(parsed.subject()),
        issuer_common_name: first_common_name(parsed.issuer()),
        serial_hex: serial_to_hex(parsed.raw_serial()),
        is_ca,
        path_len,
        key_usage,
        extended_key_usage,
        subject_alt_names,
        not_before: parsed.validity().not_before.timestamp(),
        not_after: parsed.validity().not_after.timestamp(),
    })
}

fn serial_to_hex(raw: &[u8]) -> String {
    raw.iter()
        .skip_while(|byte| **byte == 0)
        .map(|byte| format!("{:02X}", byte))
        .collect()
}

fn first_common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn general_name_to_string(name: &GeneralName<'_>) -> Option<String> {
    match name {
        GeneralName::DNSName(dns) => Some(dns.to_string()),
        GeneralName::IPAddress(bytes) => match bytes.len() {
            4 => {
                let octets: [u8; 4] = (*bytes).try_into().ok()?;
                Some(IpAddr::from(octets).to_string())
            }
            16 => {
                let octets: [u8; 16] = (*bytes).try_into().ok()?;
                Some(IpAddr::from(octets).to_string())
            }
            _ => None,
        },
        _ => None,
    }
}
