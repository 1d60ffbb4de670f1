//! Manifest conversion (fmt)

use std::path::Path;

use anyhow::Result;

use super::output::Output;
use crate::storage::{ManifestFormat, Project};

/// Manifest syntax accepted by `--to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Syntax {
    Toml,
    Yaml,
    Json,
}

impl From<Syntax> for ManifestFormat {
    fn from(syntax: Syntax) -> Self {
        match syntax {
            Syntax::Toml => ManifestFormat::Toml,
            Syntax::Yaml => ManifestFormat::Yaml,
            Syntax::Json => ManifestFormat::Json,
        }
    }
}

/// Print the manifest in another format
pub fn fmt(output: &Output, file: Option<&Path>, to: Syntax) -> Result<()> {
    let project = Project::open_current()?;
    let manifest = project.load_manifest(file)?;
    output.verbose_ctx(
        "fmt",
        &format!("Rendering '{}' as {:?}", manifest.name, to),
    );

    let rendered = manifest.render(to.into())?;
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }

    Ok(())
}
