//! JSONL storage for applied state
//!
//! State is stored in `.stack/state.jsonl` with one JSON object per line:
//! one `resource` entry per applied node (in application order) followed by
//! one `output` entry per export. Uses file locking for concurrent access safety.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::domain::{NodeId, Resolution, ResolvedNode, Value};

/// Recorded state of one applied resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: NodeId,
    pub kind: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Json>,
    #[serde(default)]
    pub computed: BTreeMap<String, Json>,
    pub applied_at: DateTime<Utc>,
}

impl ResourceState {
    fn from_resolved(node: &ResolvedNode, applied_at: DateTime<Utc>) -> Self {
        Self {
            id: node.id.clone(),
            kind: node.kind.clone(),
            attributes: node
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), known_json(v)))
                .collect(),
            computed: node.computed.clone(),
            applied_at,
        }
    }
}

/// A single line of the state file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEntry {
    Resource(ResourceState),
    Output { name: String, value: Json },
}

/// Everything recorded by the last apply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct State {
    pub resources: Vec<ResourceState>,
    pub outputs: BTreeMap<String, Json>,
}

impl State {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.outputs.is_empty()
    }

    pub fn resource(&self, id: &NodeId) -> Option<&ResourceState> {
        self.resources.iter().find(|r| &r.id == id)
    }
}

/// Known values are stored as-is; anything still deferred keeps its token form
fn known_json(value: &Value) -> Json {
    match value {
        Value::Literal(json) => json.clone(),
        other => other.to_boundary_json(),
    }
}

/// Store for applied state in JSONL format
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Creates a new state store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates the default store for a project
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(".stack").join("state.jsonl"))
    }

    /// Returns the path to the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads all entries in file order
    pub fn read_entries(&self) -> Result<Vec<StateEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open state store: {}", self.path.display()))?;

        // Acquire shared lock for reading
        file.lock_shared()
            .context("Failed to acquire read lock on state store")?;

        let reader = BufReader::new(&file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read line {}", line_num + 1))?;

            if line.trim().is_empty() {
                continue;
            }

            let entry: StateEntry = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse state entry at line {}", line_num + 1))?;

            entries.push(entry);
        }

        // Lock is released when file is dropped
        Ok(entries)
    }

    /// Reads the recorded state; later entries for the same ID win
    pub fn read(&self) -> Result<State> {
        let mut state = State::default();

        for entry in self.read_entries()? {
            match entry {
                StateEntry::Resource(resource) => {
                    match state.resources.iter_mut().find(|r| r.id == resource.id) {
                        Some(existing) => *existing = resource,
                        None => state.resources.push(resource),
                    }
                }
                StateEntry::Output { name, value } => {
                    state.outputs.insert(name, value);
                }
            }
        }

        Ok(state)
    }

    /// Writes all entries to the store (full rewrite)
    pub fn write_entries(&self, entries: &[StateEntry]) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        // Write to temp file first
        let temp_path = self.path.with_extension("jsonl.tmp");

        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

            // Acquire exclusive lock
            file.lock_exclusive()
                .context("Failed to acquire write lock on state store")?;

            let mut writer = BufWriter::new(&file);

            for entry in entries {
                let line = serde_json::to_string(entry).context("Failed to serialize state entry")?;
                writeln!(writer, "{}", line).context("Failed to write state entry")?;
            }

            writer.flush().context("Failed to flush state store")?;
        }

        // Atomic rename
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        Ok(())
    }

    /// Replaces the stored state with the result of a resolution pass
    pub fn record(&self, resolution: &Resolution) -> Result<()> {
        let applied_at = Utc::now();

        let mut entries: Vec<StateEntry> = resolution
            .nodes
            .iter()
            .map(|node| StateEntry::Resource(ResourceState::from_resolved(node, applied_at)))
            .collect();

        entries.extend(resolution.outputs.iter().map(|(name, value)| StateEntry::Output {
            name: name.clone(),
            value: known_json(value),
        }));

        self.write_entries(&entries)
    }

    /// Removes all recorded state
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove state store: {}", self.path.display()))?;
        Ok(true)
    }
}
