//! Stack manifest files
//!
//! A manifest declares a stack as data: resources in declaration order plus
//! exported outputs. TOML, YAML and JSON are accepted, picked by extension.
//!
//! ```toml
//! name = "website"
//!
//! [[resource]]
//! id = "site_bucket"
//! kind = "aws_s3_bucket"
//! [resource.attributes]
//! bucket = "example-site"
//!
//! [outputs]
//! bucket_arn = "${site_bucket.arn}"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ResolveError, ResourceNode, Stack, Value};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Unsupported manifest extension: '{0}' (expected .toml, .yaml, .yml or .json)")]
    UnsupportedFormat(String),

    #[error("Failed to parse manifest: {0}")]
    Parse(String),
}

/// Manifest file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Toml,
    Yaml,
    Json,
}

impl ManifestFormat {
    /// Picks the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "toml" => Ok(ManifestFormat::Toml),
            "yaml" | "yml" => Ok(ManifestFormat::Yaml),
            "json" => Ok(ManifestFormat::Json),
            other => Err(ManifestError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A declared stack as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,

    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceNode>,

    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl Manifest {
    /// Parses manifest content in the given format
    pub fn parse(content: &str, format: ManifestFormat) -> Result<Self, ManifestError> {
        match format {
            ManifestFormat::Toml => toml::from_str(content).map_err(|e| ManifestError::Parse(e.to_string())),
            ManifestFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| ManifestError::Parse(e.to_string()))
            }
            ManifestFormat::Json => {
                serde_json::from_str(content).map_err(|e| ManifestError::Parse(e.to_string()))
            }
        }
    }

    /// Loads a manifest from disk
    pub fn load(path: &Path) -> Result<Self> {
        let format = ManifestFormat::from_path(path)?;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

        Self::parse(&content, format)
            .with_context(|| format!("Invalid manifest: {}", path.display()))
    }

    /// Serializes the manifest in the given format
    pub fn render(&self, format: ManifestFormat) -> Result<String> {
        match format {
            ManifestFormat::Toml => toml::to_string_pretty(self).context("Failed to serialize manifest as TOML"),
            ManifestFormat::Yaml => serde_yaml::to_string(self).context("Failed to serialize manifest as YAML"),
            ManifestFormat::Json => {
                serde_json::to_string_pretty(self).context("Failed to serialize manifest as JSON")
            }
        }
    }

    /// Builds the in-memory stack, rejecting duplicate identifiers
    pub fn into_stack(self) -> Result<Stack, ResolveError> {
        Stack::from_parts(self.name, self.resources, self.outputs)
    }
}
