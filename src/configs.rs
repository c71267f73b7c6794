//! Process-boundary configuration
//!
//! Read once, from the environment or a TOML file, and handed to the core
//! components as explicit parameters.
//!
//! # Environment variables
//! | Variable | Default |
//! |---|---|
//! | `REQUEST_TYPE` | required: `generate_ca` or `generate_server_cert` |
//! | `CA_STORAGE_PATH` | required |
//! | `CA_PASSPHRASE` | none (root key stored in cleartext) |
//! | `CA_VALIDITY_YEARS` | 10 |
//! | `CA_ORG_NAME` / `CA_STATE` | empty |
//! | `CA_COUNTRY` | `US` |
//! | `CA_KEY_SIZE` | 4096 |
//! | `CA_LAYOUT` | `nested` |
//! | `CERT_NAME` | `server_cert` |
//! | `CERT_TYPE` | `server` |
//! | `SAN_LIST` | empty, comma-separated |
//! | `CERT_VALIDITY_DAYS` | 365 |
//! | `CERT_KEY_SIZE` | 2048 |
//! | `CERT_PASSPHRASE` | none (leaf key stored in cleartext) |
//! | `CERT_OVERWRITE` | `true` |
//! | `GENERATE_CERTIFICATE` | `false` |

use crate::certificate_authority::{
    CaParams, DEFAULT_CA_KEY_SIZE, DEFAULT_CA_VALIDITY_YEARS, DEFAULT_COUNTRY,
};
use crate::error::{Error, Result};
use crate::layout::{CaLayout, StorageLayout};
use crate::leaf_issuer::{
    LeafOptions, LeafRole, LeafSpec, DEFAULT_CERT_NAME, DEFAULT_LEAF_KEY_SIZE,
    DEFAULT_LEAF_VALIDITY_DAYS,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    GenerateCa,
    GenerateServerCert,
}

impl FromStr for RequestType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "generate_ca" => Ok(RequestType::GenerateCa),
            "generate_server_cert" => Ok(RequestType::GenerateServerCert),
            other => Err(Error::invalid_parameter(
                "REQUEST_TYPE",
                format!(
                    "must be `generate_ca` or `generate_server_cert`, got `{}`",
                    other
                ),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub request_type: RequestType,
    pub ca_storage_path: PathBuf,
    #[serde(default)]
    pub ca_passphrase: Option<SecretString>,
    #[serde(default = "default_ca_validity_years")]
    pub ca_validity_years: u32,
    #[serde(default)]
    pub ca_org_name: String,
    #[serde(default)]
    pub ca_state: String,
    #[serde(default = "default_country")]
    pub ca_country: String,
    #[serde(default = "default_ca_key_size")]
    pub ca_key_size: u32,
    #[serde(default)]
    pub ca_layout: CaLayout,
    #[serde(default = "default_cert_name")]
    pub cert_name: String,
    #[serde(default = "default_cert_type")]
    pub cert_type: LeafRole,
    #[serde(default)]
    pub san_list: Vec<String>,
    #[serde(default = "default_cert_validity_days")]
    pub cert_validity_days: u32,
    #[serde(default = "default_cert_key_size")]
    pub cert_key_size: u32,
    #[serde(default)]
    pub cert_passphrase: Option<SecretString>,
    #[serde(default = "default_cert_overwrite")]
    pub cert_overwrite: bool,
    #[serde(default)]
    pub generate_certificate: bool,
}

fn default_ca_validity_years() -> u32 {
    DEFAULT_CA_VALIDITY_YEARS
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_ca_key_size() -> u32 {
    DEFAULT_CA_KEY_SIZE
}

fn default_cert_name() -> String {
    DEFAULT_CERT_NAME.to_string()
}

fn default_cert_type() -> LeafRole {
    LeafRole::Server
}

fn default_cert_validity_days() -> u32 {
    DEFAULT_LEAF_VALIDITY_DAYS
}

fn default_cert_key_size() -> u32 {
    DEFAULT_LEAF_KEY_SIZE
}

fn default_cert_overwrite() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(path.display().to_string()),
            _ => Error::io(path, e),
        })?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        toml::from_str(config_str)
            .map_err(|e| Error::parse(format!("Failed to parse config file: {}", e)))
    }

    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Build from a map of environment variable names to values
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let request_type: RequestType = get("REQUEST_TYPE")
            .ok_or_else(|| Error::invalid_parameter("REQUEST_TYPE", "is not set"))?
            .parse()?;
        let ca_storage_path = get("CA_STORAGE_PATH")
            .map(PathBuf::from)
            .ok_or_else(|| Error::invalid_parameter("CA_STORAGE_PATH", "is not set"))?;

        Ok(Self {
            request_type,
            ca_storage_path,
            ca_passphrase: vars.get("CA_PASSPHRASE").cloned().map(SecretString::new),
            ca_validity_years: parse_var(vars, "CA_VALIDITY_YEARS", DEFAULT_CA_VALIDITY_YEARS)?,
            ca_org_name: get("CA_ORG_NAME").unwrap_or_default(),
            ca_state: get("CA_STATE").unwrap_or_default(),
            ca_country: get("CA_COUNTRY").unwrap_or_else(default_country),
            ca_key_size: parse_var(vars, "CA_KEY_SIZE", DEFAULT_CA_KEY_SIZE)?,
            ca_layout: parse_var(vars, "CA_LAYOUT", CaLayout::default())?,
            cert_name: get("CERT_NAME").unwrap_or_else(default_cert_name),
            cert_type: parse_var(vars, "CERT_TYPE", LeafRole::Server)?,
            san_list: get("SAN_LIST")
                .map(|list| split_san_list(&list))
                .unwrap_or_default(),
            cert_validity_days: parse_var(vars, "CERT_VALIDITY_DAYS", DEFAULT_LEAF_VALIDITY_DAYS)?,
            cert_key_size: parse_var(vars, "CERT_KEY_SIZE", DEFAULT_LEAF_KEY_SIZE)?,
            cert_passphrase: vars.get("CERT_PASSPHRASE").cloned().map(SecretString::new),
            cert_overwrite: parse_bool(vars, "CERT_OVERWRITE", true)?,
            generate_certificate: parse_bool(vars, "GENERATE_CERTIFICATE", false)?,
        })
    }

    /// CA passphrase, with an empty value treated as absent
    pub fn passphrase(&self) -> Option<&SecretString> {
        non_empty(self.ca_passphrase.as_ref())
    }

    pub fn storage_layout(&self) -> StorageLayout {
        StorageLayout::new(self.ca_storage_path.clone(), self.ca_layout)
    }

    pub fn ca_params(&self) -> CaParams {
        let params = CaParams::new(self.ca_org_name.clone(), self.ca_state.clone())
            .key_size(self.ca_key_size)
            .validity_years(self.ca_validity_years)
            .country(self.ca_country.clone());
        match self.passphrase() {
            Some(pwd) => params.passphrase(SecretString::new(pwd.expose_secret().clone())),
            None => params,
        }
    }

    pub fn leaf_spec(&self) -> LeafSpec {
        LeafSpec::new(self.cert_type, self.cert_name.clone(), self.san_list.clone())
            .key_size(self.cert_key_size)
            .validity_days(self.cert_validity_days)
            .country(self.ca_country.clone())
            .state(self.ca_state.clone())
            .organization(self.ca_org_name.clone())
    }

    pub fn leaf_options(&self) -> LeafOptions {
        LeafOptions {
            key_passphrase: non_empty(self.cert_passphrase.as_ref())
                .map(|pwd| SecretString::new(pwd.expose_secret().clone())),
            overwrite: self.cert_overwrite,
        }
    }
}

fn non_empty(secret: Option<&SecretString>) -> Option<&SecretString> {
    secret.filter(|s| !s.expose_secret().is_empty())
}

/// Split a comma-separated SAN list, dropping blank entries
pub fn split_san_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::invalid_parameter(name, format!("`{}`: {}", raw, e))),
        None => Ok(default),
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str, default: bool) -> Result<bool> {
    match vars.get(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(Error::invalid_parameter(
                name,
                format!("expected `true` or `false`, got `{}`", other),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_from_minimal_env() {
        let config = AppConfig::from_env_map(&env(&[
            ("REQUEST_TYPE", "generate_ca"),
            ("CA_STORAGE_PATH", "/srv/pki"),
        ]))
        .unwrap();

        assert_eq!(config.request_type, RequestType::GenerateCa);
        assert_eq!(config.ca_storage_path, PathBuf::from("/srv/pki"));
        assert_eq!(config.ca_country, "US");
        assert_eq!(config.cert_name, "server_cert");
        assert_eq!(config.cert_validity_days, 365);
        assert_eq!(config.cert_type, LeafRole::Server);
        assert_eq!(config.ca_layout, CaLayout::Nested);
        assert!(config.san_list.is_empty());
        assert!(config.passphrase().is_none());
        assert!(config.cert_overwrite);
        assert!(!config.generate_certificate);
    }

    #[test]
    fn test_full_env() {
        let config = AppConfig::from_env_map(&env(&[
            ("REQUEST_TYPE", "generate_server_cert"),
            ("CA_STORAGE_PATH", "/srv/pki"),
            ("CA_PASSPHRASE", "s3cret"),
            ("CA_VALIDITY_YEARS", "5"),
            ("CA_ORG_NAME", "Acme"),
            ("CA_STATE", "Utah"),
            ("CA_COUNTRY", "CA"),
            ("CA_LAYOUT", "flat"),
            ("CERT_NAME", "clickhouse"),
            ("CERT_TYPE", "client"),
            ("SAN_LIST", "db.internal, db ,,"),
            ("CERT_VALIDITY_DAYS", "90"),
            ("GENERATE_CERTIFICATE", "TRUE"),
            ("CERT_OVERWRITE", "false"),
        ]))
        .unwrap();

        assert_eq!(config.request_type, RequestType::GenerateServerCert);
        assert_eq!(config.passphrase().unwrap().expose_secret(), "s3cret");
        assert_eq!(config.san_list, vec!["db.internal", "db"]);
        assert!(config.generate_certificate);
        assert!(!config.leaf_options().overwrite);

        let params = config.ca_params();
        assert_eq!(params.validity_years, 5);
        assert_eq!(params.country, "CA");
        assert!(params.passphrase.is_some());

        let spec = config.leaf_spec();
        assert_eq!(spec.role, LeafRole::Client);
        assert_eq!(spec.name, "clickhouse");
        assert_eq!(spec.validity_days, 90);
        assert_eq!(spec.org_name, "Acme");

        let layout = config.storage_layout();
        assert_eq!(layout.ca_cert_path(), PathBuf::from("/srv/pki/ca.cert.pem"));
    }

    #[test]
    fn test_empty_passphrase_is_absent() {
        let config = AppConfig::from_env_map(&env(&[
            ("REQUEST_TYPE", "generate_ca"),
            ("CA_STORAGE_PATH", "/srv/pki"),
            ("CA_PASSPHRASE", ""),
        ]))
        .unwrap();
        assert!(config.passphrase().is_none());
        assert!(config.ca_params().passphrase.is_none());
    }

    #[test]
    fn test_invalid_values_name_the_variable() {
        let cases = [
            vec![("CA_STORAGE_PATH", "/srv/pki")],
            vec![("REQUEST_TYPE", "generate_everything"), ("CA_STORAGE_PATH", "/srv/pki")],
            vec![("REQUEST_TYPE", "generate_ca")],
            vec![
                ("REQUEST_TYPE", "generate_ca"),
                ("CA_STORAGE_PATH", "/srv/pki"),
                ("CERT_VALIDITY_DAYS", "-1"),
            ],
            vec![
                ("REQUEST_TYPE", "generate_ca"),
                ("CA_STORAGE_PATH", "/srv/pki"),
                ("CERT_TYPE", "admin"),
            ],
            vec![
                ("REQUEST_TYPE", "generate_ca"),
                ("CA_STORAGE_PATH", "/srv/pki"),
                ("GENERATE_CERTIFICATE", "maybe"),
            ],
        ];
        for case in cases {
            let err = AppConfig::from_env_map(&env(&case)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{:?}", case);
        }
    }

    #[test]
    fn test_from_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            request_type = "generate_server_cert"
            ca_storage_path = "/srv/pki"
            ca_org_name = "Acme"
            ca_layout = "flat"
            cert_type = "client"
            san_list = ["agent.internal"]
            "#,
        )
        .unwrap();
        assert_eq!(config.request_type, RequestType::GenerateServerCert);
        assert_eq!(config.ca_layout, CaLayout::Flat);
        assert_eq!(config.cert_type, LeafRole::Client);
        assert_eq!(config.san_list, vec!["agent.internal"]);
        assert_eq!(config.ca_key_size, 4096);
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = AppConfig::from_toml_str("request_type = ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }
}
