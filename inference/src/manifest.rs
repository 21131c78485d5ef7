//! Model-artifact manifest.
//!
//! The manifest describes the exported bundle: where each artifact lives,
//! its sha256 digest, which cloud it was trained for, and the action
//! vocabulary ordering the policy head emits. It is loaded once at
//! startup and never changes afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::InferenceError;

/// Target cloud of an artifact bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudId {
    Aws,
    Gcp,
    Azure,
}

impl fmt::Display for CloudId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloudId::Aws => "aws",
            CloudId::Gcp => "gcp",
            CloudId::Azure => "azure",
        };
        f.write_str(s)
    }
}

impl FromStr for CloudId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(CloudId::Aws),
            "gcp" => Ok(CloudId::Gcp),
            "azure" => Ok(CloudId::Azure),
            other => Err(format!("unknown cloud identifier {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelManifest {
    pub generated_at: DateTime<Utc>,
    pub cloud: CloudId,
    pub supported_instance_families: Vec<String>,

    /// Logical artifact name to file reference. A BTreeMap keeps the
    /// canonical serialization stable.
    pub artifacts: BTreeMap<String, ArtifactRef>,

    pub action_vocabulary: Vec<String>,
}

impl ModelManifest {
    pub fn from_json(raw: &str) -> Result<Self, InferenceError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Canonical JSON form. Loading this form again yields byte-equal
    /// artifact digests.
    pub fn canonical_json(&self) -> Result<String, InferenceError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn family_set(&self) -> BTreeSet<String> {
        self.supported_instance_families.iter().cloned().collect()
    }

    /// Verify every artifact digest against the files on disk.
    ///
    /// Relative artifact paths resolve against `base_dir` (normally the
    /// manifest's own directory).
    pub fn verify_artifacts(&self, base_dir: &Path) -> Result<(), InferenceError> {
        for (name, artifact) in &self.artifacts {
            let path = if artifact.path.is_absolute() {
                artifact.path.clone()
            } else {
                base_dir.join(&artifact.path)
            };
            let bytes = std::fs::read(&path)?;
            let actual = hex::encode(Sha256::digest(&bytes));
            if !actual.eq_ignore_ascii_case(&artifact.sha256) {
                return Err(InferenceError::DigestMismatch {
                    name: name.clone(),
                    expected: artifact.sha256.clone(),
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// Hex sha256 of a byte slice. Exposed for bundle-producing tooling and
/// tests that author artifacts on the fly.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
