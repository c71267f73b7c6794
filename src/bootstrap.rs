//! One-shot provisioning requests
//!
//! Runs a single [`RequestType`] against an [`AppConfig`]. The binary is a
//! thin wrapper that maps the returned [`Outcome`] or error to an exit code.

use crate::certificate_authority::CertificateAuthority;
use crate::configs::{AppConfig, RequestType};
use crate::error::{Error, Result};
use crate::leaf_issuer::{self, LeafCertificate};

/// What a successful request did
#[derive(Debug)]
pub enum Outcome {
    /// Root material was already present; nothing was written
    CaExists,
    /// A new root was created, plus the configured leaf when requested
    CaCreated { leaf: Option<LeafCertificate> },
    /// The configured leaf was issued by the existing root
    LeafIssued(LeafCertificate),
}

pub fn run(config: &AppConfig) -> Result<Outcome> {
    tracing::info!(
        request = ?config.request_type,
        storage = %config.ca_storage_path.display(),
        "running provisioning request"
    );
    match config.request_type {
        RequestType::GenerateCa => generate_ca(config),
        RequestType::GenerateServerCert => generate_server_cert(config),
    }
}

fn generate_ca(config: &AppConfig) -> Result<Outcome> {
    if CertificateAuthority::exists(&config.ca_storage_path) {
        tracing::info!(
            storage = %config.ca_storage_path.display(),
            "CA already exists, skipping generation"
        );
        return Ok(Outcome::CaExists);
    }

    // Leaf config is checked before any root material is written.
    if config.generate_certificate {
        config.leaf_spec().validate()?;
    }

    let ca = CertificateAuthority::create(config.storage_layout(), &config.ca_params())?;
    tracing::info!(
        subject = %ca.subject()?,
        serial = %ca.serial_hex()?,
        "root CA created"
    );

    let leaf = if config.generate_certificate {
        Some(issue_configured_leaf(&ca, config)?)
    } else {
        None
    };
    Ok(Outcome::CaCreated { leaf })
}

fn generate_server_cert(config: &AppConfig) -> Result<Outcome> {
    if !config.ca_storage_path.exists() {
        return Err(Error::not_found(format!(
            "CA storage path {}",
            config.ca_storage_path.display()
        )));
    }
    config.leaf_spec().validate()?;

    let ca = CertificateAuthority::load(config.ca_storage_path.clone(), config.passphrase())?;
    Ok(Outcome::LeafIssued(issue_configured_leaf(&ca, config)?))
}

fn issue_configured_leaf(ca: &CertificateAuthority, config: &AppConfig) -> Result<LeafCertificate> {
    let leaf = leaf_issuer::issue(ca, &config.leaf_spec(), &config.leaf_options())?;
    tracing::info!(
        role = %leaf.role(),
        key_path = %leaf.key_path().display(),
        cert_path = %leaf.cert_path().display(),
        "certificate ready"
    );
    Ok(leaf)
}
