//! Root CA Lifecycle Module
//!
//! Owns the root key pair and the self-signed root certificate: first-time
//! generation, persistence with optional passphrase protection, reload from
//! disk, and signing of leaf certificates.
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed, CA=true) ← This module
//!   └── Server / Client Certificate (signed by Root)
//! ```
//!
//! # States
//! - **Uninitialized**: no root material held; only a storage location is known
//! - **Active**: root key and certificate are in memory and backed by files
//!
//! `create` never overwrites existing root material. Destroying a root key
//! invalidates every certificate it issued, so regeneration requires an
//! operator to delete the files first.
//!
//! # Example
//! ```rust,no_run
//! use pki_bootstrap::certificate_authority::{CaParams, CertificateAuthority};
//! use pki_bootstrap::layout::{CaLayout, StorageLayout};
//! use secrecy::SecretString;
//! # fn example() -> pki_bootstrap::Result<()> {
//! let params = CaParams::new("Example Corp", "Utah")
//!     .validity_years(10)
//!     .passphrase(SecretString::new("correct horse".to_string()));
//! let storage = StorageLayout::new("/var/lib/pki", CaLayout::Nested);
//! let ca = CertificateAuthority::create(storage, &params)?;
//!
//! // Later runs
//! let ca = CertificateAuthority::load(
//!     "/var/lib/pki",
//!     Some(&SecretString::new("correct horse".to_string())),
//! )?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::inspect;
use crate::key_cert_factory::{self, CertificateExtension, DistinguishedName, KeyPair};
use crate::layout::StorageLayout;
use crate::leaf_issuer::{self, LeafCertificate, LeafOptions, LeafSpec};
use crate::pem_store::{self, WriteMode};
use openssl::x509::{X509Ref, X509};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_CA_KEY_SIZE: u32 = 4096;
pub const DEFAULT_CA_VALIDITY_YEARS: u32 = 10;
pub const DEFAULT_COUNTRY: &str = "US";
const DAYS_PER_YEAR: u32 = 365;

// ================= Parameters =================

/// Inputs for generating a new root
///
/// Root CN is always derived as `"{org_name} Root CA"`.
pub struct CaParams {
    pub key_size: u32,
    pub validity_years: u32,
    pub country: String,
    pub state: String,
    pub org_name: String,
    /// `None` (or empty) stores the root key as cleartext PEM
    pub passphrase: Option<SecretString>,
}

impl CaParams {
    pub fn new(org_name: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            key_size: DEFAULT_CA_KEY_SIZE,
            validity_years: DEFAULT_CA_VALIDITY_YEARS,
            country: DEFAULT_COUNTRY.to_string(),
            state: state.into(),
            org_name: org_name.into(),
            passphrase: None,
        }
    }

    pub fn key_size(mut self, key_size: u32) -> Self {
        self.key_size = key_size;
        self
    }

    pub fn validity_years(mut self, years: u32) -> Self {
        self.validity_years = years;
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn passphrase(mut self, passphrase: SecretString) -> Self {
        self.passphrase = Some(passphrase);
        self
    }

    /// Subject (and issuer) of the root certificate
    pub fn distinguished_name(&self) -> DistinguishedName {
        DistinguishedName::new(
            self.country.clone(),
            self.state.clone(),
            self.org_name.clone(),
            root_common_name(&self.org_name),
        )
    }

    fn validate(&self) -> Result<()> {
        if !key_cert_factory::SUPPORTED_KEY_SIZES.contains(&self.key_size) {
            return Err(Error::invalid_parameter(
                "key_size",
                format!("{} is not a supported RSA modulus length", self.key_size),
            ));
        }
        if self.validity_years == 0 {
            return Err(Error::invalid_parameter(
                "validity_years",
                "root validity must be at least one year",
            ));
        }
        if self.validity_years.checked_mul(DAYS_PER_YEAR).is_none() {
            return Err(Error::invalid_parameter(
                "validity_years",
                format!("{} years overflows the validity period", self.validity_years),
            ));
        }
        if self.org_name.trim().is_empty() {
            return Err(Error::invalid_parameter(
                "org_name",
                "organization name is required to derive the root common name",
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for CaParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaParams")
            .field("key_size", &self.key_size)
            .field("validity_years", &self.validity_years)
            .field("country", &self.country)
            .field("state", &self.state)
            .field("org_name", &self.org_name)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub fn root_common_name(org_name: &str) -> String {
    format!("{} Root CA", org_name)
}

// ================= Certificate Authority =================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaState {
    Uninitialized,
    Active,
}

struct RootMaterial {
    key: KeyPair,
    certificate: X509,
    subject: DistinguishedName,
}

/// The single-level trust root
pub struct CertificateAuthority {
    storage: StorageLayout,
    root: Option<RootMaterial>,
}

impl CertificateAuthority {
    /// A handle on a storage location with no root material loaded
    pub fn uninitialized(storage: StorageLayout) -> Self {
        Self {
            storage,
            root: None,
        }
    }

    /// Whether any root file is present under `storage` in either layout
    pub fn exists(storage: &Path) -> bool {
        StorageLayout::new(storage, Default::default())
            .all_root_material_paths()
            .iter()
            .any(|path| path.exists())
    }

    /// Generate and persist a new self-signed root
    ///
    /// # Errors
    /// - `InvalidParameter` for bad params (checked before any key is generated)
    /// - `AlreadyExists` if root material is present in either layout
    /// - `Io` if the directory or files cannot be written
    pub fn create(storage: StorageLayout, params: &CaParams) -> Result<Self> {
        params.validate()?;
        refuse_existing_root(&storage)?;

        let key = key_cert_factory::generate_key(params.key_size)?;
        let subject = params.distinguished_name();
        let certificate = key_cert_factory::build_certificate(
            &subject,
            &subject,
            &key,
            &key,
            params.validity_years * DAYS_PER_YEAR,
            &[CertificateExtension::BasicConstraints { ca: true }],
        )?;

        persist_root(&storage, &key, &certificate, params.passphrase.as_ref())?;

        let ca = Self {
            storage,
            root: Some(RootMaterial {
                key,
                certificate,
                subject,
            }),
        };
        tracing::info!(
            cert_path = %ca.cert_path().display(),
            serial = %ca.serial_hex().unwrap_or_default(),
            subject = %params.distinguished_name(),
            "created root certificate authority"
        );
        Ok(ca)
    }

    /// Load an existing root from `directory`, detecting flat or nested layout
    ///
    /// # Errors
    /// - `NotFound` if either root file is missing
    /// - `DecryptionError` for a wrong, missing or unexpected passphrase
    /// - `ParseError` for malformed PEM
    /// - `InvalidRoot` if the certificate is not a self-signed CA matching the key
    pub fn load(directory: impl Into<PathBuf>, passphrase: Option<&SecretString>) -> Result<Self> {
        let storage = StorageLayout::detect(directory);
        let cert_path = storage.ca_cert_path();
        let key_path = storage.ca_key_path();

        let certificate = pem_store::read_certificate(&cert_path)?;
        let key = pem_store::read_private_key(&key_path, passphrase)?;
        let subject = check_root(&certificate, &key, &cert_path)?;

        let ca = Self {
            storage,
            root: Some(RootMaterial {
                key,
                certificate,
                subject,
            }),
        };
        tracing::info!(
            cert_path = %cert_path.display(),
            serial = %ca.serial_hex().unwrap_or_default(),
            "loaded root certificate authority"
        );
        Ok(ca)
    }

    pub fn state(&self) -> CaState {
        match self.root {
            Some(_) => CaState::Active,
            None => CaState::Uninitialized,
        }
    }

    pub fn storage(&self) -> &StorageLayout {
        &self.storage
    }

    pub fn key_path(&self) -> PathBuf {
        self.storage.ca_key_path()
    }

    pub fn cert_path(&self) -> PathBuf {
        self.storage.ca_cert_path()
    }

    pub fn certificate(&self) -> Result<&X509Ref> {
        Ok(&self.active()?.certificate)
    }

    pub fn subject(&self) -> Result<&DistinguishedName> {
        Ok(&self.active()?.subject)
    }

    pub fn certificate_pem(&self) -> Result<Vec<u8>> {
        pem_store::encode_certificate(self.certificate()?)
    }

    pub fn serial_hex(&self) -> Result<String> {
        key_cert_factory::serial_hex(self.certificate()?)
    }

    /// Issue a leaf with default options (cleartext key, overwrite allowed)
    /// into `{storage}/certificates/{role}_{name}/`
    pub fn sign_leaf(&self, spec: &LeafSpec) -> Result<LeafCertificate> {
        leaf_issuer::issue(self, spec, &LeafOptions::default())
    }

    /// Signing key and issuer name, only available while Active
    pub(crate) fn signer(&self) -> Result<(&KeyPair, &DistinguishedName)> {
        let root = self.active()?;
        Ok((&root.key, &root.subject))
    }

    fn active(&self) -> Result<&RootMaterial> {
        self.root.as_ref().ok_or_else(|| {
            Error::not_ready(format!(
                "no root material loaded for {}; create or load the CA first",
                self.storage.root().display()
            ))
        })
    }
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("storage", &self.storage)
            .field("state", &self.state())
            .field("subject", &self.root.as_ref().map(|r| r.subject.to_string()))
            .finish()
    }
}

fn refuse_existing_root(storage: &StorageLayout) -> Result<()> {
    if let Some(existing) = storage
        .all_root_material_paths()
        .iter()
        .find(|path| path.exists())
    {
        return Err(Error::already_exists(format!(
            "root material already present at {}; delete it explicitly to regenerate",
            existing.display()
        )));
    }
    Ok(())
}

/// Key first, then certificate, both create-new. A failed certificate write
/// removes the key it just wrote.
fn persist_root(
    storage: &StorageLayout,
    key: &KeyPair,
    certificate: &X509Ref,
    passphrase: Option<&SecretString>,
) -> Result<()> {
    let key_path = storage.ca_key_path();
    let cert_path = storage.ca_cert_path();
    pem_store::ensure_dir(&storage.ca_dir())?;

    let passphrase = passphrase.filter(|p| !p.expose_secret().is_empty());
    if passphrase.is_none() {
        tracing::warn!(
            key_path = %key_path.display(),
            "no passphrase supplied, root private key is stored unencrypted"
        );
    }
    pem_store::write_private_key(&key_path, key, passphrase, WriteMode::CreateNew)?;

    if let Err(e) = pem_store::write_certificate(&cert_path, certificate, WriteMode::CreateNew) {
        if let Err(cleanup) = std::fs::remove_file(&key_path) {
            tracing::error!(
                key_path = %key_path.display(),
                error = %cleanup,
                "failed to remove root key after certificate write failed"
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Enforce the single-level root invariants on loaded material
fn check_root(certificate: &X509Ref, key: &KeyPair, cert_path: &Path) -> Result<DistinguishedName> {
    let summary = inspect::summarize(certificate)?;
    let location = cert_path.display();

    if !summary.self_issued || summary.subject != summary.issuer {
        return Err(Error::invalid_root(format!(
            "{}: subject `{}` differs from issuer `{}`",
            location, summary.subject, summary.issuer
        )));
    }
    if !summary.is_ca() {
        return Err(Error::invalid_root(format!(
            "{}: certificate does not assert CA capability",
            location
        )));
    }
    if !key_cert_factory::verify_issued_by(certificate, key.private_key()) {
        return Err(Error::invalid_root(format!(
            "{}: self-signature does not verify with the stored root key",
            location
        )));
    }
    let public_key = certificate
        .public_key()
        .map_err(|e| Error::parse(format!("{}: unreadable public key: {}", location, e)))?;
    if !key.matches_public(&public_key) {
        return Err(Error::invalid_root(format!(
            "{}: certificate public key does not match the stored root key",
            location
        )));
    }

    Ok(summary.subject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::CaLayout;

    fn test_params() -> CaParams {
        CaParams::new("TestOrganization", "Utah")
            .key_size(2048)
            .validity_years(1)
    }

    #[test]
    fn test_root_common_name_is_derived_from_org() {
        assert_eq!(root_common_name("Acme"), "Acme Root CA");
        assert_eq!(test_params().distinguished_name().common_name, "TestOrganization Root CA");
    }

    #[test]
    fn test_invalid_params_fail_before_any_file_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageLayout::new(dir.path(), CaLayout::Nested);

        for params in [
            test_params().key_size(1024),
            test_params().validity_years(0),
            CaParams::new("  ", "Utah").key_size(2048),
        ] {
            let err = CertificateAuthority::create(storage.clone(), &params).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        }
        assert!(!CertificateAuthority::exists(dir.path()));
    }

    #[test]
    fn test_uninitialized_ca_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::uninitialized(StorageLayout::new(dir.path(), CaLayout::Flat));
        assert_eq!(ca.state(), CaState::Uninitialized);
        assert_eq!(
            ca.certificate().err().map(|e| e.kind()),
            Some(ErrorKind::NotReady)
        );
        assert_eq!(ca.serial_hex().unwrap_err().kind(), ErrorKind::NotReady);
    }

    #[test]
    fn test_params_debug_redacts_passphrase() {
        let params = test_params().passphrase(SecretString::new("hunter2".to_string()));
        let debug_str = format!("{:?}", params);
        assert!(!debug_str.contains("hunter2"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn test_self_issued_leaf_is_rejected_as_root() {
        let key = key_cert_factory::generate_key(2048).unwrap();
        let name = DistinguishedName::new("US", "Utah", "Org", "not-a-ca");
        let certificate = key_cert_factory::build_certificate(
            &name,
            &name,
            &key,
            &key,
            1,
            &[CertificateExtension::BasicConstraints { ca: false }],
        )
        .unwrap();
        let err = check_root(&certificate, &key, Path::new("memory")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRoot);
    }

    #[test]
    fn test_mismatched_root_key_is_rejected() {
        let key = key_cert_factory::generate_key(2048).unwrap();
        let other = key_cert_factory::generate_key(2048).unwrap();
        let name = test_params().distinguished_name();
        let certificate = key_cert_factory::build_certificate(
            &name,
            &name,
            &key,
            &key,
            1,
            &[CertificateExtension::BasicConstraints { ca: true }],
        )
        .unwrap();
        let err = check_root(&certificate, &other, Path::new("memory")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRoot);
    }
}
