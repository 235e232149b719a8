//! Chain-of-trust verification
//!
//! A leaf is checked the way a TLS peer would check it: the root is the only
//! trusted certificate, the intermediate is supplied as untrusted chain
//! material, and openssl's path validation enforces signatures, validity,
//! CA flags and path length constraints.

use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Ref, X509StoreContext};
use tracing::debug;

use crate::configs::ChainConfig;
use crate::errors::{ChainError, Result};
use crate::pem_store;

/// Verify `leaf` up to `root` through `intermediate`
pub fn verify_chain(leaf: &X509Ref, intermediate: &X509Ref, root: &X509Ref) -> Result<bool> {
    let mut store_builder = X509StoreBuilder::new()
        .map_err(|e| ChainError::signing("Failed to create certificate store", e))?;
    store_builder
        .add_cert(root.to_owned())
        .map_err(|e| ChainError::signing("Failed to add root to store", e))?;
    let store = store_builder.build();

    let mut untrusted = Stack::new()
        .map_err(|e| ChainError::signing("Failed to create certificate stack", e))?;
    untrusted
        .push(intermediate.to_owned())
        .map_err(|e| ChainError::signing("Failed to add intermediate to stack", e))?;

    let mut context = X509StoreContext::new()
        .map_err(|e| ChainError::signing("Failed to create verification context", e))?;
    context
        .init(&store, leaf, &untrusted, |ctx| {
            let verified = ctx.verify_cert()?;
            if !verified {
                debug!(error = %ctx.error(), depth = ctx.error_depth(), "chain verification failed");
            }
            Ok(verified)
        })
        .map_err(|e| ChainError::signing("Chain verification could not run", e))
}

/// Verify the persisted leaf `name` against the persisted intermediate and root
pub fn verify_issued(config: &ChainConfig, name: &str) -> Result<bool> {
    let leaf = config
        .certificates
        .get(name)
        .ok_or_else(|| ChainError::NotFound(name.to_string()))?;

    let root = pem_store::read_certificate(&config.root_ca_path)?;
    let intermediate = pem_store::read_certificate(&config.intermediate_ca_path)?;
    let leaf_cert = pem_store::read_certificate(&leaf.cert_path)?;
    verify_chain(&leaf_cert, &intermediate, &root)
}
