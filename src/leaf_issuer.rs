//! Server and Client Certificate Issuance Module
//!
//! Generates end-entity certificates signed by the root CA. A leaf gets a
//! fresh key pair of its own, but is always signed with the root's key.
//!
//! # PKI Hierarchy Position
//! ```text
//! Root CA (self-signed)
//!   └── Server / Client Certificate ← This module
//! ```
//!
//! # X.509 Extensions
//! - **Subject Alternative Name**: DNS entries exactly as given, in order (non-critical)
//! - **Extended Key Usage**: `serverAuth` for servers, `clientAuth` for clients (non-critical)
//! - No BasicConstraints: a leaf never asserts CA capability
//!
//! # Storage
//! Leaf keys are written in cleartext unless [`LeafOptions::key_passphrase`]
//! is set, and existing leaf files of the same name are replaced unless
//! [`LeafOptions::overwrite`] is turned off. Both defaults keep compatibility
//! with consumers that expect plain PEM keys at a fixed path.
//!
//! Replacement stages both files as `{file}.tmp` and renames them into place,
//! so a failed write leaves the previous key and certificate as they were.
//!
//! # Example
//! ```rust,no_run
//! # use pki_bootstrap::certificate_authority::CertificateAuthority;
//! use pki_bootstrap::leaf_issuer::{issue, LeafOptions, LeafRole, LeafSpec};
//! # fn example(ca: &CertificateAuthority) -> pki_bootstrap::Result<()> {
//! let spec = LeafSpec::new(
//!     LeafRole::Server,
//!     "clickhouse",
//!     vec!["db.internal".to_string(), "db".to_string()],
//! )
//! .organization("Example Corp")
//! .state("Utah")
//! .validity_days(365);
//! let leaf = issue(ca, &spec, &LeafOptions::default())?;
//! println!("wrote {}", leaf.cert_path().display());
//! # Ok(())
//! # }
//! ```

use crate::certificate_authority::{CertificateAuthority, DEFAULT_COUNTRY};
use crate::error::{Error, Result};
use crate::key_cert_factory::{self, CertificateExtension, DistinguishedName, KeyPair, KeyPurpose};
use crate::layout;
use crate::pem_store::{self, WriteMode};
use openssl::x509::{X509Ref, X509};
use secrecy::SecretString;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_LEAF_KEY_SIZE: u32 = 2048;
pub const DEFAULT_LEAF_VALIDITY_DAYS: u32 = 365;
pub const DEFAULT_CERT_NAME: &str = "server_cert";

// ================= Role =================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafRole {
    Server,
    Client,
}

impl LeafRole {
    /// Lowercase label used in directory names
    pub fn label(&self) -> &'static str {
        match self {
            LeafRole::Server => "server",
            LeafRole::Client => "client",
        }
    }

    pub fn purpose(&self) -> KeyPurpose {
        match self {
            LeafRole::Server => KeyPurpose::ServerAuth,
            LeafRole::Client => KeyPurpose::ClientAuth,
        }
    }
}

impl fmt::Display for LeafRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafRole::Server => write!(f, "Server"),
            LeafRole::Client => write!(f, "Client"),
        }
    }
}

impl FromStr for LeafRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(LeafRole::Server),
            "client" => Ok(LeafRole::Client),
            other => Err(Error::invalid_parameter(
                "role",
                format!("expected `server` or `client`, got `{}`", other),
            )),
        }
    }
}

// ================= Spec =================

/// How the subject common name of a leaf is chosen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LeafCommonName {
    /// `san_names[0]`
    #[default]
    FirstSan,
    /// `"{org} {Role}"`, e.g. `"Acme Server"`
    RoleBased,
    Explicit(String),
}

/// Description of one leaf certificate to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSpec {
    pub role: LeafRole,
    /// File stem and directory suffix; must be a single path component
    pub name: String,
    pub key_size: u32,
    pub validity_days: u32,
    pub country: String,
    pub state: String,
    pub org_name: String,
    pub san_names: Vec<String>,
    pub common_name: LeafCommonName,
}

impl LeafSpec {
    pub fn new(role: LeafRole, name: impl Into<String>, san_names: Vec<String>) -> Self {
        Self {
            role,
            name: name.into(),
            key_size: DEFAULT_LEAF_KEY_SIZE,
            validity_days: DEFAULT_LEAF_VALIDITY_DAYS,
            country: DEFAULT_COUNTRY.to_string(),
            state: String::new(),
            org_name: String::new(),
            san_names,
            common_name: LeafCommonName::default(),
        }
    }

    pub fn key_size(mut self, key_size: u32) -> Self {
        self.key_size = key_size;
        self
    }

    pub fn validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self
    }

    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.org_name = org.into();
        self
    }

    pub fn common_name(mut self, common_name: LeafCommonName) -> Self {
        self.common_name = common_name;
        self
    }

    /// Reject anything unusable before an expensive key generation
    pub fn validate(&self) -> Result<()> {
        if self.san_names.is_empty() {
            return Err(Error::invalid_parameter(
                "san_names",
                "a leaf certificate needs at least one subject alternative name",
            ));
        }
        if let Some(position) = self.san_names.iter().position(|n| n.trim().is_empty()) {
            return Err(Error::invalid_parameter(
                "san_names",
                format!("entry {} is empty", position),
            ));
        }
        validate_name(&self.name)?;
        if !key_cert_factory::SUPPORTED_KEY_SIZES.contains(&self.key_size) {
            return Err(Error::invalid_parameter(
                "key_size",
                format!("{} is not a supported RSA modulus length", self.key_size),
            ));
        }
        if self.validity_days == 0 {
            return Err(Error::invalid_parameter(
                "validity_days",
                "validity period must be at least one day",
            ));
        }
        if self.common_name == LeafCommonName::RoleBased && self.org_name.trim().is_empty() {
            return Err(Error::invalid_parameter(
                "org_name",
                "role based common name requires an organization",
            ));
        }
        if let LeafCommonName::Explicit(cn) = &self.common_name {
            if cn.trim().is_empty() {
                return Err(Error::invalid_parameter(
                    "common_name",
                    "explicit common name is empty",
                ));
            }
        }
        Ok(())
    }

    pub fn subject_common_name(&self) -> String {
        match &self.common_name {
            LeafCommonName::FirstSan => self.san_names.first().cloned().unwrap_or_default(),
            LeafCommonName::RoleBased => format!("{} {}", self.org_name, self.role),
            LeafCommonName::Explicit(cn) => cn.clone(),
        }
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::new(
            self.country.clone(),
            self.state.clone(),
            self.org_name.clone(),
            self.subject_common_name(),
        )
    }

    pub fn extensions(&self) -> Vec<CertificateExtension> {
        vec![
            CertificateExtension::SubjectAlternativeName(self.san_names.clone()),
            CertificateExtension::ExtendedKeyUsage(self.role.purpose()),
        ]
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_parameter("name", "certificate name is empty"));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::invalid_parameter(
            "name",
            format!("`{}` must be a single path component", name),
        ));
    }
    Ok(())
}

// ================= Options =================

/// Storage behaviour for issued leaves
pub struct LeafOptions {
    /// Encrypt the leaf key; `None` writes cleartext PEM
    pub key_passphrase: Option<SecretString>,
    /// Replace existing leaf files of the same name; `false` fails with `AlreadyExists`
    pub overwrite: bool,
}

impl Default for LeafOptions {
    fn default() -> Self {
        Self {
            key_passphrase: None,
            overwrite: true,
        }
    }
}

impl fmt::Debug for LeafOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafOptions")
            .field(
                "key_passphrase",
                &self.key_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

// ================= Leaf Certificate =================

/// An issued leaf: its own key, its certificate and the issuer's public identity
pub struct LeafCertificate {
    role: LeafRole,
    key: KeyPair,
    certificate: X509,
    issuer: DistinguishedName,
    san_names: Vec<String>,
    key_path: PathBuf,
    cert_path: PathBuf,
}

impl LeafCertificate {
    pub fn role(&self) -> LeafRole {
        self.role
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn issuer(&self) -> &DistinguishedName {
        &self.issuer
    }

    pub fn san_names(&self) -> &[String] {
        &self.san_names
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn cert_path(&self) -> &Path {
        &self.cert_path
    }
}

impl fmt::Debug for LeafCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafCertificate")
            .field("role", &self.role)
            .field("issuer", &self.issuer.to_string())
            .field("san_names", &self.san_names)
            .field("key_path", &self.key_path)
            .field("cert_path", &self.cert_path)
            .finish()
    }
}

// ================= Issuance =================

/// Issue into `{ca_storage}/certificates/{role}_{name}/`
pub fn issue(
    ca: &CertificateAuthority,
    spec: &LeafSpec,
    options: &LeafOptions,
) -> Result<LeafCertificate> {
    validate_name(&spec.name)?;
    let directory = ca.storage().leaf_dir(spec.role.label(), &spec.name);
    issue_into(ca, spec, options, &directory)
}

/// Issue into `{directory}/{name}.key.pem` and `{directory}/{name}.cert.pem`
///
/// # Errors
/// - `InvalidParameter` for an unusable spec
/// - `NotReady` if the CA holds no root material
/// - `AlreadyExists` if `options.overwrite` is false and leaf files exist
/// - `Io` if the directory or files cannot be written
pub fn issue_into(
    ca: &CertificateAuthority,
    spec: &LeafSpec,
    options: &LeafOptions,
    directory: &Path,
) -> Result<LeafCertificate> {
    spec.validate()?;
    let (signing_key, issuer) = ca.signer()?;

    let key_path = layout::leaf_key_path(directory, &spec.name);
    let cert_path = layout::leaf_cert_path(directory, &spec.name);
    let existing = key_path.exists() || cert_path.exists();
    if existing && !options.overwrite {
        return Err(Error::already_exists(format!(
            "leaf material for `{}` already present in {}",
            spec.name,
            directory.display()
        )));
    }

    let key = key_cert_factory::generate_key(spec.key_size)?;
    let subject = spec.subject();
    let certificate = key_cert_factory::build_certificate(
        &subject,
        issuer,
        signing_key,
        &key,
        spec.validity_days,
        &spec.extensions(),
    )?;

    pem_store::ensure_dir(directory)?;
    let passphrase = options.key_passphrase.as_ref();
    if options.overwrite {
        if existing {
            tracing::warn!(
                name = %spec.name,
                directory = %directory.display(),
                "replacing existing leaf certificate and key"
            );
        }
        // Both files are fully written before either destination changes
        let staged_key = pem_store::stage_private_key(&key_path, &key, passphrase)?;
        let staged_cert = pem_store::stage_certificate(&cert_path, &certificate)?;
        staged_key.commit()?;
        staged_cert.commit()?;
    } else {
        pem_store::write_private_key(&key_path, &key, passphrase, WriteMode::CreateNew)?;
        if let Err(e) = pem_store::write_certificate(&cert_path, &certificate, WriteMode::CreateNew) {
            if let Err(cleanup) = std::fs::remove_file(&key_path) {
                tracing::error!(
                    key_path = %key_path.display(),
                    error = %cleanup,
                    "failed to remove leaf key after certificate write failed"
                );
            }
            return Err(e);
        }
    }

    tracing::info!(
        role = spec.role.label(),
        subject = %subject.common_name,
        serial = %key_cert_factory::serial_hex(&certificate).unwrap_or_default(),
        cert_path = %cert_path.display(),
        "issued leaf certificate"
    );

    Ok(LeafCertificate {
        role: spec.role,
        key,
        certificate,
        issuer: issuer.clone(),
        san_names: spec.san_names.clone(),
        key_path,
        cert_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::layout::{CaLayout, StorageLayout};

    fn spec() -> LeafSpec {
        LeafSpec::new(LeafRole::Server, "web", vec!["example.com".to_string()])
            .organization("TestOrganization")
            .state("Utah")
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("server".parse::<LeafRole>().unwrap(), LeafRole::Server);
        assert_eq!("CLIENT".parse::<LeafRole>().unwrap(), LeafRole::Client);
        for bad in ["", "admin", "ca", "server,client"] {
            let err = bad.parse::<LeafRole>().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        }
    }

    #[test]
    fn test_role_maps_to_single_purpose() {
        assert_eq!(LeafRole::Server.purpose(), KeyPurpose::ServerAuth);
        assert_eq!(LeafRole::Client.purpose(), KeyPurpose::ClientAuth);
    }

    #[test]
    fn test_common_name_selection() {
        let spec = LeafSpec::new(
            LeafRole::Client,
            "agent",
            vec!["agent.internal".to_string(), "agent".to_string()],
        )
        .organization("Acme");
        assert_eq!(spec.subject_common_name(), "agent.internal");
        assert_eq!(
            spec.clone()
                .common_name(LeafCommonName::RoleBased)
                .subject_common_name(),
            "Acme Client"
        );
        assert_eq!(
            spec.common_name(LeafCommonName::Explicit("custom".to_string()))
                .subject_common_name(),
            "custom"
        );
    }

    #[test]
    fn test_validation_rejects_unusable_specs() {
        let cases = vec![
            LeafSpec { san_names: vec![], ..spec() },
            LeafSpec { san_names: vec!["ok".to_string(), " ".to_string()], ..spec() },
            LeafSpec { name: String::new(), ..spec() },
            LeafSpec { name: "../escape".to_string(), ..spec() },
            LeafSpec { name: "..".to_string(), ..spec() },
            spec().validity_days(0),
            spec().key_size(1024),
            spec().organization("").common_name(LeafCommonName::RoleBased),
        ];
        for case in cases {
            let err = case.validate().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{:?}", case);
        }
        assert!(spec().validate().is_ok());
    }

    #[test]
    fn test_issue_on_uninitialized_ca_is_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::uninitialized(StorageLayout::new(dir.path(), CaLayout::Nested));
        let err = issue(&ca, &spec(), &LeafOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert!(!dir.path().join("certificates").exists());
    }

    #[test]
    fn test_invalid_spec_reported_before_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let ca = CertificateAuthority::uninitialized(StorageLayout::new(dir.path(), CaLayout::Nested));
        let spec = LeafSpec { san_names: vec![], ..spec() };
        let err = issue(&ca, &spec, &LeafOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_options_debug_redacts_passphrase() {
        let options = LeafOptions {
            key_passphrase: Some(SecretString::new("leafsecret".to_string())),
            overwrite: false,
        };
        let debug_str = format!("{:?}", options);
        assert!(!debug_str.contains("leafsecret"));
    }
}
