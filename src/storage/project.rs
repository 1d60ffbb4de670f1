//! Project management
//!
//! Handles project initialization and provides access to the manifest, the
//! state store and the configured engine.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::{Config, Manifest, StateStore};
use crate::domain::{SchemaRegistry, Stack};
use crate::engine::SimulatedEngine;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a stack project. Run 'stack init' first.")]
    NotInProject,

    #[error("Manifest not found: {0}")]
    MissingManifest(PathBuf),
}

const SAMPLE_MANIFEST: &str = r#"# Static website hosted from a public bucket, readable by a second account.
name = "static-website-s3"

[[resource]]
id = "s3_bucket_static_website"
kind = "aws_s3_bucket"
[resource.attributes]
bucket = "tutorial-static_website_s3"

[[resource]]
id = "s3_bucket_ownership"
kind = "aws_s3_bucket_ownership_controls"
[resource.attributes]
bucket = "${s3_bucket_static_website.id}"
rule = { object_ownership = "BucketOwnerPreferred" }

[[resource]]
id = "s3_bucket_public_access"
kind = "aws_s3_bucket_public_access_block"
[resource.attributes]
bucket = "${s3_bucket_static_website.id}"
block_public_acls = false
block_public_policy = false
ignore_public_acls = false
restrict_public_buckets = false

[[resource]]
id = "s3_bucket_acl"
kind = "aws_s3_bucket_acl"
depends_on = ["s3_bucket_ownership", "s3_bucket_public_access"]
[resource.attributes]
bucket = "${s3_bucket_static_website.id}"
acl = "public-read"

[[resource]]
id = "s3_configuration"
kind = "aws_s3_bucket_website_configuration"
[resource.attributes]
bucket = "${s3_bucket_static_website.id}"
error_document = { key = "error.html" }
index_document = { suffix = "index.html" }

[[resource]]
id = "allow_access_from_another_account"
kind = "aws_iam_policy_document"
[resource.attributes]
statement = [
  { actions = ["s3:GetObject"], principals = [{ identifiers = ["123456789012"], type = "*" }], resources = ["${s3_bucket_static_website.arn}", "${s3_bucket_static_website.arn}/*"] },
]

[[resource]]
id = "allow_access_from_another_account_2"
kind = "aws_s3_bucket_policy"
[resource.attributes]
bucket = "${s3_bucket_static_website.id}"
policy = "${allow_access_from_another_account.json}"

[outputs]
arn = "${s3_bucket_static_website.arn}"
bucket_domain_name = "${s3_bucket_static_website.bucket_domain_name}"
bucket_regional_domain_name = "${s3_bucket_static_website.bucket_regional_domain_name}"
"#;

/// Region written into a freshly scaffolded project config
const SAMPLE_REGION: &str = "us-west-2";

const GITIGNORE: &str = r#"# Applied state is machine-specific
state.jsonl
state.jsonl.tmp
"#;

/// A stack project rooted at a directory containing `.stack/`
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(".stack").is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a project; existing files are left untouched
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let stack_dir = root.join(".stack");

        fs::create_dir_all(&stack_dir).with_context(|| {
            format!("Failed to create .stack directory: {}", stack_dir.display())
        })?;

        let mut config = Config::for_project(&root)?;
        if !stack_dir.join("config.toml").exists() {
            config.project.engine.region = Some(SAMPLE_REGION.to_string());
            config.save_project()?;
        }

        let gitignore_path = stack_dir.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(&gitignore_path, GITIGNORE).with_context(|| {
                format!("Failed to write .gitignore: {}", gitignore_path.display())
            })?;
        }

        let manifest_path = root.join(&config.project.manifest);
        if !manifest_path.exists() {
            fs::write(&manifest_path, SAMPLE_MANIFEST).with_context(|| {
                format!("Failed to write manifest: {}", manifest_path.display())
            })?;
        }

        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .stack directory path
    pub fn stack_dir(&self) -> PathBuf {
        self.root.join(".stack")
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Path of the configured manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.config.project.manifest)
    }

    /// Loads a manifest, defaulting to the configured one
    pub fn load_manifest(&self, path: Option<&Path>) -> Result<Manifest> {
        let path = match path {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => std::env::current_dir()
                .context("Failed to read current directory")?
                .join(p),
            None => self.manifest_path(),
        };

        if !path.exists() {
            return Err(ProjectError::MissingManifest(path).into());
        }

        Manifest::load(&path)
    }

    /// Loads a manifest and builds its stack
    pub fn load_stack(&self, path: Option<&Path>) -> Result<Stack> {
        let manifest = self.load_manifest(path)?;
        let name = manifest.name.clone();
        manifest
            .into_stack()
            .with_context(|| format!("Invalid stack '{}'", name))
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::for_project(&self.root)
    }

    /// Builds the simulated engine with the configured region and account
    pub fn engine(&self) -> SimulatedEngine {
        SimulatedEngine::new(
            SchemaRegistry::aws_bucket(),
            self.config.effective_region(),
            self.config.project.engine.account_id.clone(),
        )
    }
}
