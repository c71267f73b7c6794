//! Key and Certificate Factory Module
//!
//! Stateless building blocks shared by the root CA and the leaf issuer:
//! RSA key generation, distinguished names, X.509v3 extension sets and
//! SHA-256 signing. Nothing in this module touches the filesystem.
//!
//! # Certificate Properties
//! - **Version**: X.509v3
//! - **Signature Algorithm**: SHA-256 with RSA
//! - **Serial Number**: Random 159-bit positive integer
//! - **Not Before**: one day before generation time (clock skew tolerance)
//! - **Not After**: not-before plus the requested number of days
//!
//! # Example
//! ```rust,no_run
//! use pki_bootstrap::key_cert_factory::{
//!     build_certificate, generate_key, CertificateExtension, DistinguishedName,
//! };
//! # fn example() -> pki_bootstrap::Result<()> {
//! let key = generate_key(2048)?;
//! let name = DistinguishedName::new("US", "Utah", "ACME", "ACME Root CA");
//! let cert = build_certificate(
//!     &name,
//!     &name,
//!     &key,
//!     &key,
//!     3650,
//!     &[CertificateExtension::BasicConstraints { ca: true }],
//! )?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPublic, PKey, PKeyRef, Private, Public};
use openssl::rsa::Rsa;
use openssl::x509::extension::{BasicConstraints, ExtendedKeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Name, X509NameRef, X509Ref, X509};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2
const SERIAL_NUMBER_BITS: i32 = 159;
const SECONDS_PER_DAY: i64 = 86_400;
const CLOCK_SKEW_DAYS: i64 = 1;

/// RSA modulus lengths accepted by [`generate_key`]
pub const SUPPORTED_KEY_SIZES: [u32; 3] = [2048, 3072, 4096];

// ================= Key Pair =================

/// An RSA key pair; the private half is the only secret this crate handles
#[derive(Clone)]
pub struct KeyPair {
    private_key: PKey<Private>,
}

impl KeyPair {
    pub fn from_private_key(private_key: PKey<Private>) -> Self {
        Self { private_key }
    }

    /// Modulus length in bits
    pub fn bits(&self) -> u32 {
        self.private_key.bits()
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    /// Extract the public half as a standalone key
    pub fn public_key(&self) -> Result<PKey<Public>> {
        let der = self
            .private_key
            .public_key_to_der()
            .map_err(Error::crypto("Failed to encode public key"))?;
        PKey::public_key_from_der(&der).map_err(Error::crypto("Failed to decode public key"))
    }

    /// Whether `other` holds the same public component as this key pair
    pub fn matches_public<T: HasPublic>(&self, other: &PKeyRef<T>) -> bool {
        self.private_key.public_eq(other)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh RSA key pair with public exponent 65537
///
/// # Errors
/// `InvalidParameter` if `key_size` is not one of [`SUPPORTED_KEY_SIZES`].
pub fn generate_key(key_size: u32) -> Result<KeyPair> {
    if !SUPPORTED_KEY_SIZES.contains(&key_size) {
        return Err(Error::invalid_parameter(
            "key_size",
            format!(
                "{} is not a supported RSA modulus length (expected one of {:?})",
                key_size, SUPPORTED_KEY_SIZES
            ),
        ));
    }

    let started = std::time::Instant::now();
    let rsa = Rsa::generate(key_size).map_err(Error::crypto("Failed to generate RSA keypair"))?;
    let private_key = PKey::from_rsa(rsa).map_err(Error::crypto("Failed to create private key"))?;
    tracing::debug!(
        key_size,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "generated RSA key pair"
    );

    Ok(KeyPair { private_key })
}

// ================= Distinguished Name =================

/// Subject or issuer identity: C, ST, O and CN in that order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    pub country: String,
    pub state: String,
    pub organization: String,
    pub common_name: String,
}

impl DistinguishedName {
    pub fn new(
        country: impl Into<String>,
        state: impl Into<String>,
        organization: impl Into<String>,
        common_name: impl Into<String>,
    ) -> Self {
        Self {
            country: country.into(),
            state: state.into(),
            organization: organization.into(),
            common_name: common_name.into(),
        }
    }

    /// Encode as an X509 name. Empty optional attributes are left out,
    /// an empty common name is rejected.
    pub fn to_x509_name(&self) -> Result<X509Name> {
        if self.common_name.trim().is_empty() {
            return Err(Error::invalid_parameter(
                "common_name",
                "distinguished name requires a non-empty common name",
            ));
        }

        let mut name_builder =
            X509Name::builder().map_err(Error::crypto("Failed to create name builder"))?;
        let entries = [
            (Nid::COUNTRYNAME, &self.country, "country"),
            (Nid::STATEORPROVINCENAME, &self.state, "state/province"),
            (Nid::ORGANIZATIONNAME, &self.organization, "organization"),
            (Nid::COMMONNAME, &self.common_name, "CN"),
        ];
        for (nid, value, label) in entries {
            if value.is_empty() {
                continue;
            }
            name_builder
                .append_entry_by_nid(nid, value)
                .map_err(Error::crypto(format!("Failed to set {}", label)))?;
        }

        Ok(name_builder.build())
    }

    /// Decode the four supported attributes from an X509 name
    pub fn from_x509_name(name: &X509NameRef) -> Result<Self> {
        Ok(Self {
            country: first_entry(name, Nid::COUNTRYNAME)?,
            state: first_entry(name, Nid::STATEORPROVINCENAME)?,
            organization: first_entry(name, Nid::ORGANIZATIONNAME)?,
            common_name: first_entry(name, Nid::COMMONNAME)?,
        })
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C={}, ST={}, O={}, CN={}",
            self.country, self.state, self.organization, self.common_name
        )
    }
}

fn first_entry(name: &X509NameRef, nid: Nid) -> Result<String> {
    match name.entries_by_nid(nid).next() {
        Some(entry) => {
            let bytes = entry.data().as_slice();
            String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::parse(format!("Name attribute is not UTF-8: {}", e)))
        }
        None => Ok(String::new()),
    }
}

// ================= Extensions =================

/// Application purpose carried in the ExtendedKeyUsage extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    ServerAuth,
    ClientAuth,
}

/// Extensions placed on certificates built by this crate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateExtension {
    /// Critical. `ca: true` is only ever used for the root, with no path length limit.
    BasicConstraints { ca: bool },
    /// Non-critical list of DNS names, order preserved.
    SubjectAlternativeName(Vec<String>),
    /// Non-critical, exactly one purpose.
    ExtendedKeyUsage(KeyPurpose),
}

fn append_extension(builder: &mut X509Builder, extension: &CertificateExtension) -> Result<()> {
    let built = match extension {
        CertificateExtension::BasicConstraints { ca } => {
            let mut bc = BasicConstraints::new();
            bc.critical();
            if *ca {
                bc.ca();
            }
            bc.build()
                .map_err(Error::crypto("Failed to build BasicConstraints"))?
        }
        CertificateExtension::SubjectAlternativeName(names) => {
            if names.is_empty() {
                return Err(Error::invalid_parameter(
                    "san_names",
                    "SubjectAlternativeName needs at least one DNS name",
                ));
            }
            let mut san = SubjectAlternativeName::new();
            for name in names {
                san.dns(name);
            }
            let context = builder.x509v3_context(None, None);
            san.build(&context)
                .map_err(Error::crypto("Failed to build SubjectAlternativeName"))?
        }
        CertificateExtension::ExtendedKeyUsage(purpose) => {
            let mut eku = ExtendedKeyUsage::new();
            match purpose {
                KeyPurpose::ServerAuth => eku.server_auth(),
                KeyPurpose::ClientAuth => eku.client_auth(),
            };
            eku.build()
                .map_err(Error::crypto("Failed to build ExtendedKeyUsage"))?
        }
    };

    builder
        .append_extension(built)
        .map_err(Error::crypto("Failed to add extension"))
}

// ================= Certificate Building =================

/// Validity window computed from a point in time (unix seconds)
///
/// Returns `(not_before, not_after)` as unix timestamps.
pub fn validity_window(now_unix: i64, validity_days: u32) -> Result<(i64, i64)> {
    if validity_days == 0 {
        return Err(Error::invalid_parameter(
            "validity_days",
            "validity period must be at least one day",
        ));
    }
    let not_before = now_unix - CLOCK_SKEW_DAYS * SECONDS_PER_DAY;
    let not_after = not_before + i64::from(validity_days) * SECONDS_PER_DAY;
    Ok((not_before, not_after))
}

fn now_unix() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(before_epoch) => -(before_epoch.duration().as_secs() as i64),
    }
}

fn random_serial() -> Result<BigNum> {
    let mut serial = BigNum::new().map_err(Error::crypto("Failed to allocate serial"))?;
    serial
        .rand(SERIAL_NUMBER_BITS, MsbOption::MAYBE_ZERO, false)
        .map_err(Error::crypto("Failed to generate serial number"))?;
    Ok(serial)
}

/// Fill in every to-be-signed field of a certificate without signing it
///
/// The returned builder is finalized by [`sign`].
pub fn prepare_certificate<T: HasPublic>(
    subject: &DistinguishedName,
    issuer: &DistinguishedName,
    public_key: &PKeyRef<T>,
    validity_days: u32,
    extensions: &[CertificateExtension],
) -> Result<X509Builder> {
    let (not_before_unix, not_after_unix) = validity_window(now_unix(), validity_days)?;
    let subject_name = subject.to_x509_name()?;
    let issuer_name = issuer.to_x509_name()?;

    let mut builder = X509::builder().map_err(Error::crypto("Failed to create X509 builder"))?;
    builder
        .set_version(X509_VERSION_3)
        .map_err(Error::crypto("Failed to set version"))?;

    let serial = random_serial()?
        .to_asn1_integer()
        .map_err(Error::crypto("Failed to encode serial number"))?;
    builder
        .set_serial_number(&serial)
        .map_err(Error::crypto("Failed to set serial number"))?;

    builder
        .set_subject_name(&subject_name)
        .map_err(Error::crypto("Failed to set subject"))?;
    builder
        .set_issuer_name(&issuer_name)
        .map_err(Error::crypto("Failed to set issuer"))?;

    let not_before = Asn1Time::from_unix(not_before_unix as _)
        .map_err(Error::crypto("Failed to create not_before"))?;
    builder
        .set_not_before(&not_before)
        .map_err(Error::crypto("Failed to set not_before"))?;
    let not_after = Asn1Time::from_unix(not_after_unix as _)
        .map_err(Error::crypto("Failed to create not_after"))?;
    builder
        .set_not_after(&not_after)
        .map_err(Error::crypto("Failed to set not_after"))?;

    builder
        .set_pubkey(public_key)
        .map_err(Error::crypto("Failed to set public key"))?;

    for extension in extensions {
        append_extension(&mut builder, extension)?;
    }

    Ok(builder)
}

/// Finalize and sign with SHA-256; the signature covers the whole TBS structure
pub fn sign(mut builder: X509Builder, signing_key: &KeyPair) -> Result<X509> {
    builder
        .sign(signing_key.private_key(), MessageDigest::sha256())
        .map_err(Error::crypto("Failed to sign certificate"))?;
    Ok(builder.build())
}

/// Build and sign a certificate in one step
///
/// `public_key` is the subject's key pair; only its public half is embedded.
/// For a self-signed root pass the same key pair as `signing_key`.
pub fn build_certificate(
    subject: &DistinguishedName,
    issuer: &DistinguishedName,
    signing_key: &KeyPair,
    public_key: &KeyPair,
    validity_days: u32,
    extensions: &[CertificateExtension],
) -> Result<X509> {
    let builder = prepare_certificate(
        subject,
        issuer,
        public_key.private_key(),
        validity_days,
        extensions,
    )?;
    sign(builder, signing_key)
}

/// Check that `certificate` carries a valid signature from `issuer_key`
pub fn verify_issued_by<T: HasPublic>(certificate: &X509Ref, issuer_key: &PKeyRef<T>) -> bool {
    certificate.verify(issuer_key).unwrap_or(false)
}

/// Hex rendering of a certificate serial number
pub fn serial_hex(certificate: &X509Ref) -> Result<String> {
    let serial = certificate
        .serial_number()
        .to_bn()
        .map_err(Error::crypto("Failed to read serial number"))?;
    let hex = serial
        .to_hex_str()
        .map_err(Error::crypto("Failed to format serial number"))?;
    Ok(hex.to_string())
}
