//! GPU buffer management for tubes and axis lines.

use glam::Vec3;
use rodviz_core::{Aabb, Axis, Color, TubeMesh};
use wgpu::util::DeviceExt;

/// Tube vertex as uploaded: position, normal and display color.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl SceneVertex {
    /// Get the vertex buffer layout for tube vertices.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SceneVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Colored line-list vertex.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

/// Interleave a tube mesh with its display color.
pub fn tube_vertices(mesh: &TubeMesh, color: Color) -> Vec<SceneVertex> {
    let color = color.to_array();
    mesh.vertices
        .iter()
        .map(|v| SceneVertex {
            position: v.position,
            normal: v.normal,
            color,
        })
        .collect()
}

/// One uploaded tube.
pub struct TubeBuffers {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    /// Scene revision this upload reflects.
    pub revision: u64,
}

impl TubeBuffers {
    /// Upload `mesh`, or `None` if it has no triangles.
    pub fn upload(
        device: &wgpu::Device,
        name: &str,
        mesh: &TubeMesh,
        color: Color,
        revision: u64,
    ) -> Option<Self> {
        if mesh.indices.is_empty() {
            return None;
        }
        let vertices = tube_vertices(mesh, color);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} vertices")),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{name} indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        tracing::trace!(
            object = name,
            vertices = vertices.len(),
            triangles = mesh.triangle_count(),
            revision,
            "uploaded tube"
        );

        Some(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            revision,
        })
    }
}

/// Line segments for the visible axes: the axis itself plus a short tick mark
/// at every tick. Axes run through the minimum corner of `bounds`.
pub fn axis_lines(axes: &[Axis], bounds: Option<Aabb>) -> Vec<LineVertex> {
    let origin = bounds.map(|b| b.min).unwrap_or_default();
    let span = bounds.map(|b| b.size().max_element()).unwrap_or(1.0);
    let tick_len = span * 0.02;

    let mut lines = Vec::new();
    for axis in axes.iter().filter(|a| a.visible) {
        let color = axis.style.color.to_array();
        let dir = axis.direction.unit();
        // Ticks point along the next axis over.
        let across = Vec3::new(dir.z, dir.x, dir.y);
        let base = origin - dir * dir.dot(origin);
        let at = |t: f32| base + dir * t;

        let (min, max) = axis.domain;
        lines.push(LineVertex {
            position: at(min).to_array(),
            color,
        });
        lines.push(LineVertex {
            position: at(max).to_array(),
            color,
        });

        for &t in &axis.ticks {
            lines.push(LineVertex {
                position: at(t).to_array(),
                color,
            });
            lines.push(LineVertex {
                position: (at(t) + across * tick_len).to_array(),
                color,
            });
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodviz_core::{AxisDirection, AxisStyle, MeshBuilder, ObjectKind, SweptTube};

    #[test]
    fn vertex_layouts_match_structs() {
        assert_eq!(
            SceneVertex::layout().array_stride,
            std::mem::size_of::<SceneVertex>() as u64
        );
        assert_eq!(std::mem::size_of::<SceneVertex>(), 40);
        assert_eq!(
            LineVertex::layout().array_stride,
            std::mem::size_of::<LineVertex>() as u64
        );
    }

    #[test]
    fn tube_vertices_carry_color() {
        let mesh = MeshBuilder::new(SweptTube::new(4))
            .build(
                "rod",
                0,
                ObjectKind::Rod,
                &[Vec3::ZERO, Vec3::X],
                &[0.1],
                false,
                Color::GREEN,
            )
            .unwrap();
        let vertices = tube_vertices(&mesh, Color::RED);
        assert_eq!(vertices.len(), mesh.vertices.len());
        assert!(vertices.iter().all(|v| v.color == Color::RED.to_array()));
    }

    #[test]
    fn axis_lines_skip_hidden_axes() {
        let axis = |direction, visible| Axis {
            direction,
            domain: (0.0, 1.0),
            style: AxisStyle::default(),
            visible,
            ticks: vec![0.0, 0.5, 1.0],
        };
        let bounds = Some(Aabb {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        });

        let lines = axis_lines(
            &[axis(AxisDirection::X, true), axis(AxisDirection::Y, false)],
            bounds,
        );
        // One axis segment and three ticks, two vertices each.
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[1].position, [1.0, 0.0, 0.0]);
    }
}
