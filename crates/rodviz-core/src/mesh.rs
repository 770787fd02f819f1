//! Tube mesh generation.
//!
//! [`MeshBuilder`] validates one object's samples for one frame and hands the
//! geometry to a [`TubePrimitive`]. The default primitive, [`SweptTube`],
//! sweeps a ring of vertices along the centerline using rotation-minimizing
//! frames.

use std::f32::consts::TAU;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use indexmap::IndexMap;

use crate::color::Color;
use crate::dataset::ObjectKind;
use crate::error::{Error, Result};

/// Vertex of a tube surface.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TubeVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Renderable tube geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct TubeMesh {
    /// Centerline the tube was swept along.
    pub centerline: Vec<Vec3>,
    /// One radius per centerline point.
    pub radii: Vec<f32>,
    pub vertices: Vec<TubeVertex>,
    /// Triangle list into `vertices`.
    pub indices: Vec<u32>,
    pub color: Color,
    pub closed: bool,
}

impl TubeMesh {
    pub fn point_count(&self) -> usize {
        self.centerline.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Shared, immutable mesh.
pub type MeshHandle = Arc<TubeMesh>;

/// Builds a tube surface from a centerline and per-point radii.
pub trait TubePrimitive: Send + Sync {
    fn build_tube(&self, points: &[Vec3], radii: &[f32], closed: bool, color: Color) -> TubeMesh;
}

/// CPU tube sweep with rotation-minimizing frames and no end caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweptTube {
    pub radial_segments: u32,
}

impl SweptTube {
    pub const DEFAULT_RADIAL_SEGMENTS: u32 = 16;

    pub fn new(radial_segments: u32) -> Self {
        Self {
            radial_segments: radial_segments.max(3),
        }
    }
}

impl Default for SweptTube {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RADIAL_SEGMENTS)
    }
}

impl TubePrimitive for SweptTube {
    fn build_tube(&self, points: &[Vec3], radii: &[f32], closed: bool, color: Color) -> TubeMesh {
        let n = points.len();
        // Two points cannot enclose a loop; closing them would double every quad.
        let closed = closed && n >= 3;
        let segs = self.radial_segments as usize;
        let tangents = tangents(points, closed);

        let mut vertices = Vec::with_capacity(n * segs);
        let mut normal = initial_normal(tangents.first().copied().unwrap_or(Vec3::Z));

        for (i, (&center, &tangent)) in points.iter().zip(&tangents).enumerate() {
            if i > 0 {
                // Parallel transport: rotate the previous frame onto the new tangent.
                let rotation = Quat::from_rotation_arc(tangents[i - 1], tangent);
                normal = (rotation * normal).normalize_or(initial_normal(tangent));
            }
            let binormal = tangent.cross(normal);
            let radius = radii.get(i).copied().unwrap_or(0.0);

            for j in 0..segs {
                let angle = TAU * j as f32 / segs as f32;
                let dir = normal * angle.cos() + binormal * angle.sin();
                vertices.push(TubeVertex {
                    position: (center + dir * radius).to_array(),
                    normal: dir.to_array(),
                });
            }
        }

        let rings = if closed { n } else { n.saturating_sub(1) };
        let mut indices = Vec::with_capacity(rings * segs * 6);
        for i in 0..rings {
            let a = i * segs;
            let b = ((i + 1) % n) * segs;
            for j in 0..segs {
                let k = (j + 1) % segs;
                // Counter-clockwise seen from outside.
                indices.extend_from_slice(&[
                    (a + j) as u32,
                    (a + k) as u32,
                    (b + j) as u32,
                    (b + j) as u32,
                    (a + k) as u32,
                    (b + k) as u32,
                ]);
            }
        }

        TubeMesh {
            centerline: points.to_vec(),
            radii: radii.to_vec(),
            vertices,
            indices,
            color,
            closed,
        }
    }
}

/// Unit tangents along the centerline.
///
/// A zero-length step reuses the previous tangent; leading zero-length steps
/// take the first real one.
fn tangents(points: &[Vec3], closed: bool) -> Vec<Vec3> {
    let n = points.len();
    let raw: Vec<Vec3> = (0..n)
        .map(|i| {
            let (prev, next) = if closed {
                (points[(i + n - 1) % n], points[(i + 1) % n])
            } else {
                (points[i.saturating_sub(1)], points[(i + 1).min(n - 1)])
            };
            (next - prev).normalize_or_zero()
        })
        .collect();

    let mut last = raw
        .iter()
        .copied()
        .find(|t| *t != Vec3::ZERO)
        .unwrap_or(Vec3::Z);
    raw.into_iter()
        .map(|t| {
            if t != Vec3::ZERO {
                last = t;
            }
            last
        })
        .collect()
}

/// Any unit vector perpendicular to `tangent`.
fn initial_normal(tangent: Vec3) -> Vec3 {
    tangent.any_orthonormal_vector()
}

/// Expand per-segment radii to one radius per point.
///
/// Point 0 takes `radii[0]`, point `i` takes `radii[i - 1]` and the final
/// point repeats the last radius: `[r0, r0, r1, .., r_last]`.
pub fn pad_radii(radii: &[f32]) -> Vec<f32> {
    let Some(&first) = radii.first() else {
        return Vec::new();
    };
    let mut padded = Vec::with_capacity(radii.len() + 1);
    padded.push(first);
    padded.extend_from_slice(radii);
    padded
}

/// Validates samples and builds meshes through a [`TubePrimitive`].
#[derive(Debug, Clone, Default)]
pub struct MeshBuilder<P = SweptTube> {
    primitive: P,
}

impl<P: TubePrimitive> MeshBuilder<P> {
    pub fn new(primitive: P) -> Self {
        Self { primitive }
    }

    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    /// Build the mesh of one object at one frame.
    ///
    /// Requires at least two points and exactly one radius per segment.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        object: &str,
        frame: usize,
        kind: ObjectKind,
        points: &[Vec3],
        radii: &[f32],
        closed: bool,
        color: Color,
    ) -> Result<MeshHandle> {
        if kind != ObjectKind::Rod {
            return Err(Error::UnsupportedObjectKind {
                object: object.to_string(),
                kind,
            });
        }
        if points.len() < 2 || radii.len() + 1 != points.len() {
            return Err(Error::ShapeMismatch {
                object: object.to_string(),
                frame,
                points: points.len(),
                radii: radii.len(),
            });
        }

        let padded = pad_radii(radii);
        Ok(Arc::new(
            self.primitive.build_tube(points, &padded, closed, color),
        ))
    }
}

/// Built meshes of every object at one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeshBundle {
    pub frame_index: usize,
    pub timestamp: f64,
    /// Object name to mesh, in dataset order.
    pub meshes: IndexMap<String, MeshHandle>,
}

impl FrameMeshBundle {
    pub fn new(frame_index: usize, timestamp: f64) -> Self {
        Self {
            frame_index,
            timestamp,
            meshes: IndexMap::new(),
        }
    }

    pub fn mesh(&self, name: &str) -> Option<&MeshHandle> {
        self.meshes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(n: usize) -> Vec<Vec3> {
        (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect()
    }

    fn build(points: &[Vec3], radii: &[f32], closed: bool) -> Result<MeshHandle> {
        MeshBuilder::<SweptTube>::default().build(
            "rod",
            0,
            ObjectKind::Rod,
            points,
            radii,
            closed,
            Color::GREEN,
        )
    }

    #[test]
    fn pads_radii_by_repeating_first_and_last() {
        assert_eq!(pad_radii(&[1.0, 2.0, 3.0]), vec![1.0, 1.0, 2.0, 3.0]);
        assert_eq!(pad_radii(&[0.5]), vec![0.5, 0.5]);
        assert!(pad_radii(&[]).is_empty());
    }

    #[test]
    fn mesh_carries_padded_radii() {
        let mesh = build(&line(4), &[0.1, 0.2, 0.3], false).unwrap();
        assert_eq!(mesh.point_count(), 4);
        assert_eq!(mesh.radii, vec![0.1, 0.1, 0.2, 0.3]);
        assert_eq!(mesh.vertices.len(), 4 * 16);
    }

    #[test]
    fn rejects_wrong_radius_count() {
        let err = build(&line(4), &[0.1, 0.2], false).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch { points: 4, radii: 2, .. }
        ));
    }

    #[test]
    fn rejects_single_point() {
        let err = build(&line(1), &[], false).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { points: 1, .. }));
    }

    #[test]
    fn kind_is_checked_before_shape() {
        let err = MeshBuilder::<SweptTube>::default()
            .build("ball", 3, ObjectKind::Sphere, &line(1), &[], false, Color::RED)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedObjectKind { kind: ObjectKind::Sphere, .. }
        ));
    }

    #[test]
    fn closed_tube_connects_last_ring_to_first() {
        let open = build(&line(5), &[0.1; 4], false).unwrap();
        let closed = build(&line(5), &[0.1; 4], true).unwrap();
        assert_eq!(open.triangle_count(), 4 * 16 * 2);
        assert_eq!(closed.triangle_count(), 5 * 16 * 2);
        assert!(closed.closed);
    }

    #[test]
    fn closed_two_point_tube_is_built_open() {
        let open = build(&line(2), &[0.1], false).unwrap();
        let closed = build(&line(2), &[0.1], true).unwrap();
        assert_eq!(closed.triangle_count(), 16 * 2);
        assert_eq!(closed.indices, open.indices);
        assert!(!closed.closed);
    }

    #[test]
    fn vertices_sit_at_radius_from_centerline() {
        let points = vec![
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
        ];
        let mesh = build(&points, &[0.5, 0.25, 0.125], false).unwrap();
        let segs = 16;
        for (i, center) in points.iter().enumerate() {
            for v in &mesh.vertices[i * segs..(i + 1) * segs] {
                let d = Vec3::from(v.position).distance(*center);
                assert!((d - mesh.radii[i]).abs() < 1e-4, "ring {i}: {d}");
                let n = Vec3::from(v.normal);
                assert!((n.length() - 1.0).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn repeated_points_do_not_produce_nan() {
        let points = vec![Vec3::ZERO, Vec3::ZERO, Vec3::X, Vec3::X];
        let mesh = build(&points, &[0.1; 3], false).unwrap();
        assert!(mesh
            .vertices
            .iter()
            .all(|v| v.position.iter().chain(&v.normal).all(|c| c.is_finite())));
    }

    #[test]
    fn bundle_keeps_insertion_order() {
        let mut bundle = FrameMeshBundle::new(0, 0.0);
        let mesh = build(&line(2), &[0.1], false).unwrap();
        bundle.meshes.insert("b".into(), mesh.clone());
        bundle.meshes.insert("a".into(), mesh);
        let names: Vec<_> = bundle.meshes.keys().map(String::as_str).collect();
        assert_eq!(names, ["b", "a"]);
        assert!(bundle.mesh("a").is_some());
    }

    fn centerline() -> impl Strategy<Value = Vec<Vec3>> {
        prop::collection::vec(
            (-10.0f32..10.0, -10.0f32..10.0, -10.0f32..10.0).prop_map(|(x, y, z)| Vec3::new(x, y, z)),
            2..32,
        )
    }

    proptest! {
        #[test]
        fn valid_input_builds_mesh_with_matching_point_count(
            points in centerline(),
            radius in 0.01f32..2.0,
            closed in any::<bool>(),
        ) {
            let radii = vec![radius; points.len() - 1];
            let mesh = build(&points, &radii, closed).unwrap();
            prop_assert_eq!(mesh.point_count(), points.len());
            prop_assert_eq!(mesh.radii.len(), points.len());
            prop_assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        }

        #[test]
        fn wrong_radius_count_is_rejected(
            points in centerline(),
            extra in 1usize..4,
            shorter in any::<bool>(),
        ) {
            let len = if shorter {
                (points.len() - 1).saturating_sub(extra)
            } else {
                points.len() - 1 + extra
            };
            prop_assume!(len != points.len() - 1);
            let radii = vec![0.1; len];
            let is_shape_mismatch = matches!(build(&points, &radii, false), Err(Error::ShapeMismatch { .. }));
            prop_assert!(is_shape_mismatch);
        }

        #[test]
        fn building_is_deterministic(points in centerline(), closed in any::<bool>()) {
            let radii = vec![0.2; points.len() - 1];
            let a = build(&points, &radii, closed).unwrap();
            let b = build(&points, &radii, closed).unwrap();
            prop_assert_eq!(&*a, &*b);
        }
    }
}
