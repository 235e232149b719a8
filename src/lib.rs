//! Chainsmith - A simple certificate chain manager
//!
//! Builds and manages a two-tier private PKI on the local filesystem: a
//! self-signed root CA, an intermediate CA signed by the root, and a set of leaf
//! certificates signed by the intermediate. Intended for internal services that
//! need mutual TLS without running a full CA product.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed, pathlen=1)
//!   └── Intermediate CA (signed by Root, pathlen=0)
//!       └── Leaf certificates (signed by Intermediate, CA=false)
//! ```
//!
//! - Root and intermediate are written to `<path>` and `<path>.key`
//! - Leaves are written to their configured `cert_path` and `key_path`
//! - Certificates are PEM (0644); private keys are PKCS#8 PEM created as 0600
//!
//! # Rebuilds are destructive
//!
//! [`chain_builder::build_chain`] always regenerates the root and intermediate
//! from scratch and re-issues every configured leaf. Certificates signed by a
//! previous intermediate stop verifying once the new chain is in place.
//!
//! # Configuration
//!
//! ```toml
//! root_ca_path = "/ca/root"
//! intermediate_ca_path = "/ca/intermediate"
//!
//! [key]
//! algorithm = "ecdsa-p256"   # or "rsa" (with bits = 4096) / "ecdsa-p384"
//!
//! [validity]
//! leaf_days = 365
//!
//! [certificates.svc1]
//! common_name = "svc1.internal"
//! cert_path = "/certs/svc1.pem"
//! key_path = "/certs/svc1.key"
//! alt_names = ["svc1", "10.0.0.7"]
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chainsmith::chain_builder::build_chain;
//! use chainsmith::configs::ChainConfig;
//! use chainsmith::registry::Registry;
//! use chainsmith::verify::verify_issued;
//!
//! fn main() -> chainsmith::errors::Result<()> {
//!     let config = ChainConfig::from_file("chainsmith.toml")?;
//!     let chain = build_chain(&config)?;
//!     for leaf in &chain.leaves {
//!         assert!(verify_issued(&config, &leaf.name)?);
//!     }
//!
//!     let mut registry = Registry::open("chainsmith.toml")?;
//!     registry.revoke("svc1")?;
//!     assert!(registry.get("svc1").is_none());
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! Library APIs return [`errors::Result`], whose error type
//! [`errors::ChainError`] distinguishes generation, signing, persistence,
//! not-found and partial-revocation failures.

pub mod certificate_template;
pub mod chain_builder;
pub mod configs;
pub mod errors;
pub mod generate_ca;
pub mod generate_leaf_cert;
pub mod inspect;
pub mod pem_store;
pub mod registry;
pub mod verify;
