//! PKI Bootstrap - single-root Certificate Authority for internal services
//!
//! Creates (or loads) a self-signed root CA on local storage and issues
//! server and client certificates signed directly by it. Intended to run once
//! per deployment step, typically from a container entrypoint, so that
//! databases and agents can be given mutually trusted TLS material.
//!
//! # Overview
//!
//! ```text
//! Root CA (self-signed, CA=true, critical)
//!   ├── Server Certificate (EKU serverAuth, SAN = DNS names)
//!   └── Client Certificate (EKU clientAuth, SAN = DNS names)
//! ```
//!
//! # On-disk layout
//!
//! ```text
//! {storage}/
//!   ca/ca.key.pem              root key (PKCS#8, AES-256-CBC when a passphrase is set)
//!   ca/ca.cert.pem             root certificate
//!   certificates/{role}_{name}/
//!     {name}.key.pem
//!     {name}.cert.pem
//! ```
//!
//! The flat layout keeps the root files directly under `{storage}`; loading
//! detects either.
//!
//! # Example
//!
//! ```no_run
//! use pki_bootstrap::certificate_authority::{CaParams, CertificateAuthority};
//! use pki_bootstrap::layout::StorageLayout;
//! use pki_bootstrap::leaf_issuer::{LeafRole, LeafSpec};
//!
//! fn bootstrap() -> pki_bootstrap::Result<()> {
//!     let storage = StorageLayout::new("/var/lib/pki", Default::default());
//!     let ca = CertificateAuthority::create(storage, &CaParams::new("Example Corp", "Utah"))?;
//!
//!     let spec = LeafSpec::new(LeafRole::Server, "clickhouse", vec!["db.internal".to_string()])
//!         .organization("Example Corp");
//!     let leaf = ca.sign_leaf(&spec)?;
//!     println!("leaf written to {}", leaf.cert_path().display());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`key_cert_factory`]: RSA key generation and X.509 certificate assembly
//! - [`certificate_authority`]: root CA create / load / sign
//! - [`leaf_issuer`]: server and client certificate issuance
//! - [`pem_store`]: PEM encoding, passphrase protection and file writes
//! - [`layout`]: where root and leaf files live under the storage path
//! - [`inspect`]: decoded view of certificate extensions
//! - [`configs`]: environment / TOML configuration for the binary
//! - [`bootstrap`]: runs one provisioning request from a config
//!
//! # Error Handling
//!
//! Library APIs return [`Result`] with a typed [`Error`]; match on
//! [`Error::kind`] to distinguish failure classes.

pub mod bootstrap;
pub mod certificate_authority;
pub mod configs;
pub mod error;
pub mod inspect;
pub mod key_cert_factory;
pub mod layout;
pub mod leaf_issuer;
pub mod pem_store;

pub use error::{Error, ErrorKind, Result};
