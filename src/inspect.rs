//! Decoded, read-only view of a certificate
//!
//! OpenSSL builds and signs certificates; inspection of the extensions that
//! were actually encoded is done on the DER with `x509-parser`.

use crate::error::{Error, Result};
use crate::key_cert_factory::DistinguishedName;
use openssl::x509::X509Ref;
use x509_parser::prelude::*;

/// Fields of a certificate relevant to root/leaf invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    /// `subject` and `issuer` encode to identical DER
    pub self_issued: bool,
    /// `None` when the BasicConstraints extension is absent
    pub basic_constraints: Option<BasicConstraintsSummary>,
    /// DNS entries of the SubjectAlternativeName extension, in encoded order
    pub dns_names: Vec<String>,
    pub extended_key_usage: Option<ExtendedKeyUsageSummary>,
    pub not_before: i64,
    pub not_after: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasicConstraintsSummary {
    pub ca: bool,
    pub critical: bool,
    pub path_len: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedKeyUsageSummary {
    pub server_auth: bool,
    pub client_auth: bool,
    /// Any purpose other than server/client authentication is present
    pub other: bool,
    pub critical: bool,
}

impl CertificateSummary {
    /// Whether the certificate asserts CA capability
    pub fn is_ca(&self) -> bool {
        self.basic_constraints.map(|bc| bc.ca).unwrap_or(false)
    }
}

pub fn summarize(certificate: &X509Ref) -> Result<CertificateSummary> {
    let der = certificate
        .to_der()
        .map_err(Error::crypto("Failed to encode certificate DER"))?;
    let (_, parsed) = parse_x509_certificate(&der)
        .map_err(|e| Error::parse(format!("Failed to parse certificate DER: {}", e)))?;

    let basic_constraints = parsed
        .basic_constraints()
        .map_err(|e| Error::parse(format!("Invalid BasicConstraints: {}", e)))?
        .map(|ext| BasicConstraintsSummary {
            ca: ext.value.ca,
            critical: ext.critical,
            path_len: ext.value.path_len_constraint,
        });

    let dns_names = match parsed
        .subject_alternative_name()
        .map_err(|e| Error::parse(format!("Invalid SubjectAlternativeName: {}", e)))?
    {
        Some(ext) => ext
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        None => Vec::new(),
    };

    let extended_key_usage = parsed
        .extended_key_usage()
        .map_err(|e| Error::parse(format!("Invalid ExtendedKeyUsage: {}", e)))?
        .map(|ext| ExtendedKeyUsageSummary {
            server_auth: ext.value.server_auth,
            client_auth: ext.value.client_auth,
            other: ext.value.any
                || ext.value.code_signing
                || ext.value.email_protection
                || ext.value.time_stamping
                || ext.value.ocsp_signing
                || !ext.value.other.is_empty(),
            critical: ext.critical,
        });

    Ok(CertificateSummary {
        subject: DistinguishedName::from_x509_name(certificate.subject_name())?,
        issuer: DistinguishedName::from_x509_name(certificate.issuer_name())?,
        self_issued: parsed.subject().as_raw() == parsed.issuer().as_raw(),
        basic_constraints,
        dns_names,
        extended_key_usage,
        not_before: parsed.validity().not_before.timestamp(),
        not_after: parsed.validity().not_after.timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_cert_factory::{
        build_certificate, generate_key, CertificateExtension, KeyPurpose,
    };

    #[test]
    fn test_summary_of_leaf_extensions() {
        let issuer_key = generate_key(2048).unwrap();
        let leaf_key = generate_key(2048).unwrap();
        let issuer = DistinguishedName::new("US", "Utah", "Org", "Org Root CA");
        let subject = DistinguishedName::new("US", "Utah", "Org", "b.example.com");
        let cert = build_certificate(
            &subject,
            &issuer,
            &issuer_key,
            &leaf_key,
            10,
            &[
                CertificateExtension::SubjectAlternativeName(vec![
                    "b.example.com".to_string(),
                    "a.example.com".to_string(),
                ]),
                CertificateExtension::ExtendedKeyUsage(KeyPurpose::ClientAuth),
            ],
        )
        .unwrap();

        let summary = summarize(&cert).unwrap();
        assert_eq!(summary.subject, subject);
        assert_eq!(summary.issuer, issuer);
        assert!(!summary.self_issued);
        assert!(summary.basic_constraints.is_none());
        assert!(!summary.is_ca());
        assert_eq!(summary.dns_names, vec!["b.example.com", "a.example.com"]);

        let eku = summary.extended_key_usage.unwrap();
        assert!(eku.client_auth);
        assert!(!eku.server_auth);
        assert!(!eku.other);
        assert!(!eku.critical);
        assert_eq!(summary.not_after - summary.not_before, 10 * 86_400);
    }

    #[test]
    fn test_summary_of_ca_constraints() {
        let key = generate_key(2048).unwrap();
        let name = DistinguishedName::new("US", "Utah", "Org", "Org Root CA");
        let cert = build_certificate(
            &name,
            &name,
            &key,
            &key,
            10,
            &[CertificateExtension::BasicConstraints { ca: true }],
        )
        .unwrap();

        let summary = summarize(&cert).unwrap();
        assert!(summary.self_issued);
        let bc = summary.basic_constraints.unwrap();
        assert!(bc.ca);
        assert!(bc.critical);
        assert_eq!(bc.path_len, None);
        assert!(summary.dns_names.is_empty());
        assert!(summary.extended_key_usage.is_none());
    }
}
