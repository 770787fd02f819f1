//! Surface, pipelines and per-frame drawing.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use indexmap::IndexMap;
use rodviz_core::{AxisDirection, Color, SceneState};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::camera::Camera;
use crate::capture::{padded_bytes_per_row, unpad_rows, CapturedFrame};
use crate::mesh_data::{axis_lines, LineVertex, SceneVertex, TubeBuffers};
use crate::{clear_color, ViewerError};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Uniform buffer data shared by both pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct ViewUniforms {
    view_proj: [[f32; 4]; 4],
    eye: [f32; 3],
    _pad0: f32,
    light_dir: [f32; 3],
    _pad1: f32,
}

/// Draws a [`SceneState`] into a window.
pub struct Renderer {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    surface_usages: wgpu::TextureUsages,
    capture_enabled: bool,
    size: PhysicalSize<u32>,
    depth_view: wgpu::TextureView,

    tube_pipeline: wgpu::RenderPipeline,
    line_pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,

    tubes: IndexMap<String, TubeBuffers>,
    lines: Option<(wgpu::Buffer, u32)>,
    /// Visible axes the line buffer was built for.
    lines_key: Vec<AxisDirection>,

    background: wgpu::Color,
    pub camera: Camera,
}

impl Renderer {
    pub async fn new(
        window: Arc<Window>,
        background: Color,
        camera: Camera,
    ) -> Result<Self, ViewerError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ViewerError::NoAdapter)?;
        tracing::info!(adapter = ?adapter.get_info().name, "using GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("rodviz device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let (format, alpha_mode) = choose_surface_format(&caps)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_view = create_depth_view(&device, &config);

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("View Uniforms"),
            contents: bytemuck::bytes_of(&ViewUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("View Uniforms Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("View Uniforms Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let tube_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Tube Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/tube.wgsl").into()),
        });
        let line_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Line Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/line.wgsl").into()),
        });

        let tube_pipeline = create_pipeline(
            &device,
            &layout,
            &tube_shader,
            SceneVertex::layout(),
            wgpu::PrimitiveTopology::TriangleList,
            format,
            "Tube Pipeline",
        );
        let line_pipeline = create_pipeline(
            &device,
            &layout,
            &line_shader,
            LineVertex::layout(),
            wgpu::PrimitiveTopology::LineList,
            format,
            "Line Pipeline",
        );

        tracing::info!(width = config.width, height = config.height, ?format, "renderer ready");

        Ok(Self {
            surface,
            device,
            queue,
            config,
            surface_usages: caps.usages,
            capture_enabled: false,
            size,
            depth_view,
            tube_pipeline,
            line_pipeline,
            uniform_buffer,
            uniform_bind_group,
            tubes: IndexMap::new(),
            lines: None,
            lines_key: Vec::new(),
            background: clear_color(background),
            camera,
        })
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height.max(1) as f32
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.size = size;
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_depth_view(&self.device, &self.config);
    }

    /// Allow [`render`](Self::render) to read frames back.
    ///
    /// Needs a surface that can be copied from and stores 8-bit RGBA or BGRA.
    pub fn enable_capture(&mut self) -> Result<(), ViewerError> {
        if !self.surface_usages.contains(wgpu::TextureUsages::COPY_SRC) {
            return Err(ViewerError::UnsupportedSurface("copy source usage"));
        }
        if capture_swizzle(self.config.format).is_none() {
            return Err(ViewerError::UnsupportedSurface("8-bit capture format"));
        }
        self.config.usage |= wgpu::TextureUsages::COPY_SRC;
        self.surface.configure(&self.device, &self.config);
        self.capture_enabled = true;
        tracing::info!(format = ?self.config.format, "frame capture enabled");
        Ok(())
    }

    pub fn capture_enabled(&self) -> bool {
        self.capture_enabled
    }

    /// Bring GPU buffers in line with `scene`, uploading only changed objects.
    pub fn sync_scene(&mut self, scene: &SceneState) {
        let mut uploads = 0;
        for (name, object) in scene.objects() {
            let Some(mesh) = &object.mesh else {
                self.tubes.shift_remove(name);
                continue;
            };
            if self
                .tubes
                .get(name)
                .is_some_and(|t| t.revision == object.revision)
            {
                continue;
            }
            let color = scene.effective_color(object);
            match TubeBuffers::upload(&self.device, name, mesh, color, object.revision) {
                Some(buffers) => {
                    self.tubes.insert(name.clone(), buffers);
                }
                None => {
                    self.tubes.shift_remove(name);
                }
            }
            uploads += 1;
        }
        if uploads > 0 {
            tracing::trace!(uploads, "synced scene meshes");
        }

        let key: Vec<_> = scene
            .axes()
            .iter()
            .filter(|a| a.visible)
            .map(|a| a.direction)
            .collect();
        if key != self.lines_key {
            let vertices = axis_lines(scene.axes(), scene.bounds());
            self.lines = (!vertices.is_empty()).then(|| {
                let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Axis Lines"),
                    contents: bytemuck::cast_slice(&vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                (buffer, vertices.len() as u32)
            });
            self.lines_key = key;
        }
    }

    /// Draw the scene. With `capture` set (and capture enabled) the presented
    /// image is also read back and returned.
    pub fn render(&mut self, capture: bool) -> Result<Option<CapturedFrame>, ViewerError> {
        let capture = capture && self.capture_enabled;
        let uniforms = ViewUniforms {
            view_proj: self.camera.view_projection_matrix(self.aspect()).to_cols_array_2d(),
            eye: self.camera.eye().to_array(),
            _pad0: 0.0,
            light_dir: self.camera.forward().to_array(),
            _pad1: 0.0,
        };
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.background),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_bind_group(0, &self.uniform_bind_group, &[]);

            pass.set_pipeline(&self.tube_pipeline);
            for tube in self.tubes.values() {
                pass.set_vertex_buffer(0, tube.vertex_buffer.slice(..));
                pass.set_index_buffer(tube.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..tube.index_count, 0, 0..1);
            }

            if let Some((buffer, count)) = &self.lines {
                pass.set_pipeline(&self.line_pipeline);
                pass.set_vertex_buffer(0, buffer.slice(..));
                pass.draw(0..*count, 0..1);
            }
        }

        let readback = capture.then(|| {
            let width = output.texture.width();
            let height = output.texture.height();
            let padded_row = padded_bytes_per_row(width);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Capture Readback"),
                size: padded_row as u64 * height as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            encoder.copy_texture_to_buffer(
                output.texture.as_image_copy(),
                wgpu::TexelCopyBufferInfo {
                    buffer: &buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(height),
                    },
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
            (buffer, width, height, padded_row)
        });

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        match readback {
            Some((buffer, width, height, padded_row)) => {
                self.read_back(&buffer, width, height, padded_row).map(Some)
            }
            None => Ok(None),
        }
    }

    fn read_back(
        &self,
        buffer: &wgpu::Buffer,
        width: u32,
        height: u32,
        padded_row: u32,
    ) -> Result<CapturedFrame, ViewerError> {
        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv().unwrap_or(Err(wgpu::BufferAsyncError))?;

        let bgra = capture_swizzle(self.config.format).unwrap_or(false);
        let rgba = {
            let data = slice.get_mapped_range();
            unpad_rows(&data, width, height, padded_row, bgra)
        };
        buffer.unmap();

        Ok(CapturedFrame {
            width,
            height,
            rgba,
        })
    }
}

/// Preferred surface format (sRGB if offered) and alpha mode.
fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
) -> Result<(wgpu::TextureFormat, wgpu::CompositeAlphaMode), ViewerError> {
    let format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.is_srgb())
        .or_else(|| caps.formats.first().copied())
        .ok_or(ViewerError::UnsupportedSurface("texture format"))?;
    let alpha_mode = caps
        .alpha_modes
        .first()
        .copied()
        .ok_or(ViewerError::UnsupportedSurface("alpha mode"))?;
    Ok((format, alpha_mode))
}

/// Whether a capturable surface format stores BGRA, or `None` if it cannot be
/// captured as RGBA8.
fn capture_swizzle(format: wgpu::TextureFormat) -> Option<bool> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => Some(false),
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => Some(true),
        _ => None,
    }
}

fn create_depth_view(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    vertex_layout: wgpu::VertexBufferLayout<'static>,
    topology: wgpu::PrimitiveTopology,
    format: wgpu::TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[vertex_layout],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Open tubes are seen from inside through their ends.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}
