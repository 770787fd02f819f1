//! Sampling simulation output into raw records, and persisting it.

use std::fs;
use std::path::{Path, PathBuf};

use glam::Vec3;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dataset::{GroupingConfig, RawObjectRecord, VisualizationDataset};
use crate::error::{Error, Result};

/// A simulated rod, as seen by the recorder.
pub trait RodSystem {
    /// Current centerline, `segment_count + 1` points.
    fn centerline(&self) -> &[Vec3];
    /// Current per-segment radii.
    fn radii(&self) -> &[f32];
}

/// One object at one sampled step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub step: u64,
    pub time: f64,
    pub position: Vec<Vec3>,
    pub radius: Vec<f32>,
}

/// Collects samples of every object every `step_skip` steps.
#[derive(Debug)]
pub struct SnapshotRecorder {
    step_skip: u64,
    records: IndexMap<String, RawObjectRecord>,
    store: Option<SnapshotStore>,
}

impl SnapshotRecorder {
    pub fn new(step_skip: u64) -> Self {
        Self {
            step_skip: step_skip.max(1),
            records: IndexMap::new(),
            store: None,
        }
    }

    /// Also write every sample to `store`.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn step_skip(&self) -> u64 {
        self.step_skip
    }

    /// Simulation callback. Records `system` if `current_step` is on the
    /// sampling grid and reports whether it did.
    pub fn make_callback<S: RodSystem + ?Sized>(
        &mut self,
        name: &str,
        system: &S,
        time: f64,
        current_step: u64,
    ) -> Result<bool> {
        if current_step % self.step_skip != 0 {
            return Ok(false);
        }
        self.record(
            name,
            StepSnapshot {
                step: current_step,
                time,
                position: system.centerline().to_vec(),
                radius: system.radii().to_vec(),
            },
        )?;
        Ok(true)
    }

    /// Record a sample unconditionally.
    pub fn record(&mut self, name: &str, snapshot: StepSnapshot) -> Result<()> {
        if let Some(store) = &self.store {
            store.write(name, &snapshot)?;
        }
        let record = self.records.entry(name.to_string()).or_default();
        record.time.push(snapshot.time);
        record.position.push(snapshot.position);
        record.radius.push(snapshot.radius);
        Ok(())
    }

    pub fn records(&self) -> &IndexMap<String, RawObjectRecord> {
        &self.records
    }

    pub fn into_records(self) -> IndexMap<String, RawObjectRecord> {
        self.records
    }

    pub fn into_dataset(self, grouping: Option<&GroupingConfig>) -> Result<VisualizationDataset> {
        VisualizationDataset::from_records(self.records, grouping)
    }
}

/// Directory of JSON snapshots, laid out as `<root>/<object>/step_<step>.json`.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, object: &str, step: u64) -> Result<PathBuf> {
        if object.is_empty()
            || object == "."
            || object == ".."
            || object.contains(['/', '\\'])
        {
            return Err(Error::InvalidDataset(format!(
                "object name `{object}` cannot be used as a directory name"
            )));
        }
        Ok(self.root.join(object).join(format!("step_{step:05}.json")))
    }

    /// Write one snapshot, returning its path.
    pub fn write(&self, object: &str, snapshot: &StepSnapshot) -> Result<PathBuf> {
        let path = self.snapshot_path(object, snapshot.step)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_vec(snapshot)?)?;
        Ok(path)
    }

    /// Read every object, sorted by name, with steps in numeric order.
    pub fn load_records(&self) -> Result<IndexMap<String, RawObjectRecord>> {
        let mut objects: Vec<(String, PathBuf)> = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                objects.push((name.to_string(), entry.path()));
            }
        }
        objects.sort_by(|a, b| a.0.cmp(&b.0));

        let mut records = IndexMap::with_capacity(objects.len());
        for (name, dir) in objects {
            let mut steps: Vec<(u64, PathBuf)> = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                match step_number(&path) {
                    Some(step) => steps.push((step, path)),
                    None => tracing::debug!(path = %path.display(), "skipping non-snapshot file"),
                }
            }
            steps.sort_by_key(|(step, _)| *step);

            let mut record = RawObjectRecord::default();
            for (_, path) in steps {
                let snapshot: StepSnapshot = serde_json::from_slice(&fs::read(&path)?)?;
                record.time.push(snapshot.time);
                record.position.push(snapshot.position);
                record.radius.push(snapshot.radius);
            }
            records.insert(name, record);
        }

        tracing::info!(root = %self.root.display(), objects = records.len(), "loaded snapshots");
        Ok(records)
    }

    pub fn load_dataset(&self, grouping: Option<&GroupingConfig>) -> Result<VisualizationDataset> {
        VisualizationDataset::from_records(self.load_records()?, grouping)
    }
}

/// `step_00042.json` -> 42.
fn step_number(path: &Path) -> Option<u64> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix("step_")?
        .parse()
        .ok()
}
