//! Validated, grouped view of per-frame rod geometry.

use std::fmt;
use std::path::Path;

use glam::Vec3;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{Error, Result};

/// Kind of simulated object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// A deformable rod, drawn as a tube along its centerline.
    #[default]
    Rod,
    /// Reserved; no mesh implementation yet.
    Sphere,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Rod => f.write_str("rod"),
            ObjectKind::Sphere => f.write_str("sphere"),
        }
    }
}

/// Raw per-object output of a simulation run, before grouping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObjectRecord {
    /// Centerline points, one sequence per sampled step.
    pub position: Vec<Vec<Vec3>>,
    /// Per-segment radii, one sequence per sampled step.
    pub radius: Vec<Vec<f32>>,
    /// Simulated time of each sampled step.
    pub time: Vec<f64>,
}

/// Display settings shared by a group of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    #[serde(default, alias = "object_type")]
    pub kind: ObjectKind,
    pub objects: Vec<String>,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub closed: bool,
}

/// Mapping from group name to its members and display settings.
///
/// Applied once when the dataset is constructed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupingConfig {
    pub groups: IndexMap<String, GroupSpec>,
}

impl GroupingConfig {
    /// Name of the group created when no grouping is supplied.
    pub const DEFAULT_GROUP: &'static str = "all_objects";

    /// Create an empty grouping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group, replacing any group with the same name.
    pub fn with_group(mut self, name: impl Into<String>, spec: GroupSpec) -> Self {
        self.groups.insert(name.into(), spec);
        self
    }

    /// Every named object as an open green rod.
    pub fn all_rods<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new().with_group(
            Self::DEFAULT_GROUP,
            GroupSpec {
                kind: ObjectKind::Rod,
                objects: names.into_iter().map(Into::into).collect(),
                color: Color::GREEN,
                closed: false,
            },
        )
    }

    /// Load a grouping from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }
}

/// The time series of one named object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSeries {
    pub kind: ObjectKind,
    /// Per frame: `segment_count + 1` centerline points.
    pub positions: Vec<Vec<Vec3>>,
    /// Per frame: `segment_count` radii.
    pub radii: Vec<Vec<f32>>,
    pub closed: bool,
    pub color: Color,
}

impl ObjectSeries {
    /// An open rod with the default color.
    pub fn rod(positions: Vec<Vec<Vec3>>, radii: Vec<Vec<f32>>) -> Self {
        Self {
            kind: ObjectKind::Rod,
            positions,
            radii,
            closed: false,
            color: Color::default(),
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn closed(mut self, closed: bool) -> Self {
        self.closed = closed;
        self
    }

    /// Number of frames in the series.
    ///
    /// Both per-frame sequences must agree; the dataset enforces this.
    pub fn frame_count(&self) -> usize {
        self.positions.len()
    }

    /// Points and radii of one frame.
    pub fn frame(&self, index: usize) -> Option<(&[Vec3], &[f32])> {
        let points = self.positions.get(index)?;
        let radii = self.radii.get(index)?;
        Some((points.as_slice(), radii.as_slice()))
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Smallest box containing every point, or `None` if there are none.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let (min, max) = iter.fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Both corners rounded to one decimal.
    pub fn rounded(&self) -> Self {
        let round = |v: Vec3| (v * 10.0).round() / 10.0;
        Self {
            min: round(self.min),
            max: round(self.max),
        }
    }
}

/// All objects of one simulation run plus the shared time axis.
///
/// Constructed once at load time and immutable afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationDataset {
    objects: IndexMap<String, ObjectSeries>,
    time: Vec<f64>,
}

impl VisualizationDataset {
    /// Create a dataset, validating the frame-count and time invariants.
    ///
    /// Per-frame radius/position length mismatches are left for the mesh
    /// builder to report, so the frames before them remain playable.
    pub fn new(objects: IndexMap<String, ObjectSeries>, time: Vec<f64>) -> Result<Self> {
        if let Some(i) = time.windows(2).position(|w| !(w[0] <= w[1])) {
            return Err(Error::InvalidDataset(format!(
                "time axis decreases (or is NaN) between frames {} and {}",
                i,
                i + 1
            )));
        }
        if time.first().is_some_and(|t| t.is_nan()) {
            return Err(Error::InvalidDataset("time axis starts with NaN".into()));
        }

        for (name, series) in &objects {
            if series.positions.len() != time.len() || series.radii.len() != time.len() {
                return Err(Error::InvalidDataset(format!(
                    "object `{}` has {} position frames and {} radius frames, expected {}",
                    name,
                    series.positions.len(),
                    series.radii.len(),
                    time.len()
                )));
            }
        }

        Ok(Self { objects, time })
    }

    /// Build a dataset from raw records and a grouping.
    ///
    /// Without a grouping every record becomes an open green rod, in record
    /// order. The time axis is taken from the first grouped object; the other
    /// objects must have the same number of samples.
    pub fn from_records(
        mut records: IndexMap<String, RawObjectRecord>,
        grouping: Option<&GroupingConfig>,
    ) -> Result<Self> {
        let default_grouping;
        let grouping = match grouping {
            Some(g) => g,
            None => {
                default_grouping = GroupingConfig::all_rods(records.keys().cloned());
                &default_grouping
            }
        };

        let mut objects = IndexMap::new();
        let mut time: Option<Vec<f64>> = None;

        for (group, spec) in &grouping.groups {
            for name in &spec.objects {
                if objects.contains_key(name) {
                    return Err(Error::InvalidDataset(format!(
                        "object `{}` appears in more than one group (again in `{}`)",
                        name, group
                    )));
                }
                let record = records
                    .swap_remove(name)
                    .ok_or_else(|| Error::UnknownObject(name.clone()))?;

                match &time {
                    None => time = Some(record.time.clone()),
                    Some(t) if t.len() != record.time.len() => {
                        return Err(Error::InvalidDataset(format!(
                            "object `{}` has {} time samples, expected {}",
                            name,
                            record.time.len(),
                            t.len()
                        )));
                    }
                    Some(t) if t != &record.time => {
                        tracing::warn!(object = %name, "time samples differ from the first object; using the first");
                    }
                    Some(_) => {}
                }

                objects.insert(
                    name.clone(),
                    ObjectSeries {
                        kind: spec.kind,
                        positions: record.position,
                        radii: record.radius,
                        closed: spec.closed,
                        color: spec.color,
                    },
                );
            }
        }

        if !records.is_empty() {
            tracing::debug!(
                ungrouped = records.len(),
                "records not referenced by any group are skipped"
            );
        }

        Self::new(objects, time.unwrap_or_default())
    }

    /// Number of frames (length of the time axis).
    pub fn frame_count(&self) -> usize {
        self.time.len()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Objects in insertion order.
    pub fn objects(&self) -> &IndexMap<String, ObjectSeries> {
        &self.objects
    }

    pub fn object(&self, name: &str) -> Option<&ObjectSeries> {
        self.objects.get(name)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Bounding box of every point of every object over all frames.
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(
            self.objects
                .values()
                .flat_map(|s| s.positions.iter())
                .flat_map(|frame| frame.iter()),
        )
    }

    /// Bounds rounded to one decimal, used for axis domains.
    pub fn domain(&self) -> Option<Aabb> {
        self.bounds().map(|b| b.rounded())
    }
}
