//! On-disk path scheme for root and leaf material
//!
//! ```text
//! {storage}/
//!   ca.key.pem | ca/ca.key.pem
//!   ca.cert.pem | ca/ca.cert.pem
//!   certificates/
//!     {server|client}_{cert_name}/
//!       {cert_name}.key.pem
//!       {cert_name}.cert.pem
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CA_KEY_FILE: &str = "ca.key.pem";
pub const CA_CERT_FILE: &str = "ca.cert.pem";
pub const CA_SUBDIRECTORY: &str = "ca";
pub const CERTIFICATES_SUBDIRECTORY: &str = "certificates";

/// Where the root files live relative to the storage path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaLayout {
    /// `{storage}/ca.key.pem`
    Flat,
    /// `{storage}/ca/ca.key.pem`
    #[default]
    Nested,
}

impl FromStr for CaLayout {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(CaLayout::Flat),
            "nested" => Ok(CaLayout::Nested),
            other => Err(crate::Error::invalid_parameter(
                "ca_layout",
                format!("expected `flat` or `nested`, got `{}`", other),
            )),
        }
    }
}

/// Resolves every path under one storage root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    root: PathBuf,
    ca_layout: CaLayout,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>, ca_layout: CaLayout) -> Self {
        Self {
            root: root.into(),
            ca_layout,
        }
    }

    /// Pick the layout whose certificate file is present, nested first.
    /// Falls back to nested when neither exists.
    pub fn detect(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ca_layout = if root.join(CA_SUBDIRECTORY).join(CA_CERT_FILE).exists() {
            CaLayout::Nested
        } else if root.join(CA_CERT_FILE).exists() || root.join(CA_KEY_FILE).exists() {
            CaLayout::Flat
        } else {
            CaLayout::Nested
        };
        Self { root, ca_layout }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ca_layout(&self) -> CaLayout {
        self.ca_layout
    }

    pub fn ca_dir(&self) -> PathBuf {
        match self.ca_layout {
            CaLayout::Flat => self.root.clone(),
            CaLayout::Nested => self.root.join(CA_SUBDIRECTORY),
        }
    }

    pub fn ca_key_path(&self) -> PathBuf {
        self.ca_dir().join(CA_KEY_FILE)
    }

    pub fn ca_cert_path(&self) -> PathBuf {
        self.ca_dir().join(CA_CERT_FILE)
    }

    /// Root files of both layouts, used to refuse creating over existing material
    pub fn all_root_material_paths(&self) -> [PathBuf; 4] {
        let nested = self.root.join(CA_SUBDIRECTORY);
        [
            self.root.join(CA_KEY_FILE),
            self.root.join(CA_CERT_FILE),
            nested.join(CA_KEY_FILE),
            nested.join(CA_CERT_FILE),
        ]
    }

    /// `{storage}/certificates/{role}_{name}`
    pub fn leaf_dir(&self, role_label: &str, name: &str) -> PathBuf {
        self.root
            .join(CERTIFICATES_SUBDIRECTORY)
            .join(format!("{}_{}", role_label, name))
    }
}

/// `{dir}/{name}.key.pem`
pub fn leaf_key_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.key.pem", name))
}

/// `{dir}/{name}.cert.pem`
pub fn leaf_cert_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.cert.pem", name))
}
