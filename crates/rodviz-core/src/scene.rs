//! GPU-independent viewer state.
//!
//! [`SceneState`] is what the renderer draws: the latest mesh of every object,
//! the displayed time, axes, camera mode and color override. Per-object
//! revision counters tell the renderer which meshes need re-uploading.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::Vec3;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::dataset::{Aabb, VisualizationDataset};
use crate::error::Error;
use crate::mesh::{FrameMeshBundle, MeshHandle};

/// Something that displays frames.
pub trait Viewer {
    /// Show `bundle`, replacing each contained object's mesh.
    fn render(&mut self, bundle: &FrameMeshBundle);
}

/// Camera interaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMode {
    /// Orbit around the vertical axis
    #[default]
    Turntable,
    /// Free rotation around the target
    Arcball,
    /// First-person movement
    Fly,
}

impl CameraMode {
    /// Next mode in `Turntable -> Arcball -> Fly` order.
    pub fn cycle(self) -> Self {
        match self {
            CameraMode::Turntable => CameraMode::Arcball,
            CameraMode::Arcball => CameraMode::Fly,
            CameraMode::Fly => CameraMode::Turntable,
        }
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraMode::Turntable => f.write_str("turntable"),
            CameraMode::Arcball => f.write_str("arcball"),
            CameraMode::Fly => f.write_str("fly"),
        }
    }
}

impl FromStr for CameraMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "turntable" => Ok(CameraMode::Turntable),
            "arcball" => Ok(CameraMode::Arcball),
            "fly" => Ok(CameraMode::Fly),
            other => Err(Error::InvalidValue(format!("unknown camera mode `{other}`"))),
        }
    }
}

/// Initial camera framing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFit {
    pub center: Vec3,
    /// Radius of a sphere around `center` containing the scene.
    pub radius: f32,
}

impl CameraFit {
    pub fn from_bounds(bounds: Option<Aabb>) -> Self {
        match bounds {
            Some(b) => Self {
                center: b.center(),
                radius: (b.size().length() * 0.5).max(0.1),
            },
            None => Self::default(),
        }
    }
}

impl Default for CameraFit {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisDirection {
    X,
    Y,
    Z,
}

impl AxisDirection {
    pub const ALL: [AxisDirection; 3] = [AxisDirection::X, AxisDirection::Y, AxisDirection::Z];

    pub fn unit(self) -> Vec3 {
        match self {
            AxisDirection::X => Vec3::X,
            AxisDirection::Y => Vec3::Y,
            AxisDirection::Z => Vec3::Z,
        }
    }

    fn component(self, v: Vec3) -> f32 {
        match self {
            AxisDirection::X => v.x,
            AxisDirection::Y => v.y,
            AxisDirection::Z => v.z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisStyle {
    pub color: Color,
    /// Preferred number of tick intervals.
    pub target_ticks: usize,
}

impl Default for AxisStyle {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            target_ticks: 5,
        }
    }
}

/// A coordinate axis drawn through the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub direction: AxisDirection,
    pub domain: (f32, f32),
    pub style: AxisStyle,
    pub visible: bool,
    /// Tick positions along the axis, inside `domain`.
    pub ticks: Vec<f32>,
}

/// Tick positions with 1-2-5 spacing covering `[min, max]`.
pub fn nice_ticks(min: f32, max: f32, target: usize) -> Vec<f32> {
    let span = max - min;
    if !(span > 0.0) || !span.is_finite() {
        return Vec::new();
    }
    let raw = span / target.max(1) as f32;
    let magnitude = 10f32.powf(raw.log10().floor());
    let step = match raw / magnitude {
        n if n <= 1.001 => 1.0,
        n if n <= 2.001 => 2.0,
        n if n <= 5.001 => 5.0,
        _ => 10.0,
    } * magnitude;

    let first = (min / step - 1e-4).ceil() as i64;
    let last = (max / step + 1e-4).floor() as i64;
    (first..=last).map(|k| k as f32 * step).collect()
}

/// One object as currently displayed.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub mesh: Option<MeshHandle>,
    /// Dataset color, used when no override is active.
    pub color: Color,
    /// Bumped whenever the mesh or its effective color changes.
    pub revision: u64,
}

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone)]
pub struct SceneState {
    objects: IndexMap<String, SceneObject>,
    timestamp: Option<f64>,
    frame_index: Option<usize>,
    bounds: Option<Aabb>,
    domain: Option<Aabb>,
    axes: Vec<Axis>,
    camera_mode: CameraMode,
    camera_fit: CameraFit,
    color_override: Option<Color>,
}

impl SceneState {
    /// Empty scene for `dataset`, framed by its bounds.
    pub fn new(dataset: &VisualizationDataset) -> Self {
        let objects = dataset
            .objects()
            .iter()
            .map(|(name, series)| {
                (
                    name.clone(),
                    SceneObject {
                        mesh: None,
                        color: series.color,
                        revision: 0,
                    },
                )
            })
            .collect();
        let bounds = dataset.bounds();

        Self {
            objects,
            timestamp: None,
            frame_index: None,
            bounds,
            domain: dataset.domain(),
            axes: Vec::new(),
            camera_mode: CameraMode::default(),
            camera_fit: CameraFit::from_bounds(bounds),
            color_override: None,
        }
    }

    pub fn objects(&self) -> &IndexMap<String, SceneObject> {
        &self.objects
    }

    pub fn object(&self, name: &str) -> Option<&SceneObject> {
        self.objects.get(name)
    }

    /// Color an object is drawn with, honoring the override.
    pub fn effective_color(&self, object: &SceneObject) -> Color {
        self.color_override.unwrap_or(object.color)
    }

    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    pub fn frame_index(&self) -> Option<usize> {
        self.frame_index
    }

    pub fn bounds(&self) -> Option<Aabb> {
        self.bounds
    }

    pub fn camera_fit(&self) -> CameraFit {
        self.camera_fit
    }

    /// Label shown for the displayed frame.
    pub fn time_label(&self) -> String {
        format!("Time: {:.4}", self.timestamp.unwrap_or(0.0))
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    /// Add an axis, replacing any existing one in the same direction.
    ///
    /// Without an explicit domain the dataset domain on that axis is used. A
    /// degenerate domain adds nothing.
    pub fn add_axis(
        &mut self,
        direction: AxisDirection,
        domain: Option<(f32, f32)>,
        style: AxisStyle,
    ) -> Option<&Axis> {
        let (min, max) = domain.or_else(|| {
            self.domain
                .map(|d| (direction.component(d.min), direction.component(d.max)))
        })?;
        if !(min < max) {
            tracing::debug!(?direction, min, max, "skipping axis with empty domain");
            return None;
        }

        self.axes.retain(|a| a.direction != direction);
        self.axes.push(Axis {
            direction,
            domain: (min, max),
            style,
            visible: true,
            ticks: nice_ticks(min, max, style.target_ticks),
        });
        self.axes.last()
    }

    /// Show or hide an axis. Returns the new visibility, or `None` if there is
    /// no axis in that direction.
    pub fn toggle_axis(&mut self, direction: AxisDirection) -> Option<bool> {
        let axis = self.axes.iter_mut().find(|a| a.direction == direction)?;
        axis.visible = !axis.visible;
        Some(axis.visible)
    }

    pub fn camera_mode(&self) -> CameraMode {
        self.camera_mode
    }

    pub fn set_camera_mode(&mut self, mode: CameraMode) {
        self.camera_mode = mode;
    }

    pub fn cycle_camera_mode(&mut self) -> CameraMode {
        self.camera_mode = self.camera_mode.cycle();
        self.camera_mode
    }

    pub fn color_override(&self) -> Option<Color> {
        self.color_override
    }

    /// Recolor every tube, or restore dataset colors with `None`.
    pub fn set_color_override(&mut self, color: Option<Color>) {
        if self.color_override == color {
            return;
        }
        self.color_override = color;
        for object in self.objects.values_mut() {
            object.revision += 1;
        }
    }

    /// Step through green, red, blue and back to dataset colors.
    pub fn cycle_color_override(&mut self) -> Option<Color> {
        let next = match self.color_override {
            None => Some(Color::GREEN),
            Some(c) if c == Color::GREEN => Some(Color::RED),
            Some(c) if c == Color::RED => Some(Color::BLUE),
            Some(_) => None,
        };
        self.set_color_override(next);
        next
    }
}

impl Viewer for SceneState {
    fn render(&mut self, bundle: &FrameMeshBundle) {
        for (name, mesh) in &bundle.meshes {
            let object = self
                .objects
                .entry(name.clone())
                .or_insert_with(|| SceneObject {
                    mesh: None,
                    color: mesh.color,
                    revision: 0,
                });
            if object.mesh.as_ref().is_some_and(|m| Arc::ptr_eq(m, mesh)) {
                continue;
            }
            object.mesh = Some(Arc::clone(mesh));
            object.revision += 1;
        }
        self.timestamp = Some(bundle.timestamp);
        self.frame_index = Some(bundle.frame_index);
    }
}
