//! wgpu desktop viewer for rod simulation playback.
//!
//! Draws the tube meshes of the current frame while the frame producer keeps
//! filling the playback cache in the background.
//!
//! # Features
//! - Lit tube rendering with a depth buffer
//! - Turntable, arcball and fly cameras
//! - Axes with 1-2-5 ticks
//! - Only meshes that changed since the last frame are re-uploaded
//! - Optional capture of every displayed frame to numbered PNGs

pub mod camera;
pub mod capture;
pub mod mesh_data;
pub mod renderer;

pub use camera::{ArcballCamera, Camera, FlyCamera, TurntableCamera};
pub use capture::{CapturedFrame, FrameCapture};
pub use mesh_data::{LineVertex, SceneVertex, TubeBuffers};
pub use renderer::Renderer;

use thiserror::Error;

/// Errors raised while setting up or running the viewer.
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[error("surface reports no usable {0}")]
    UnsupportedSurface(&'static str),

    #[error("failed to create device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("frame readback failed: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    #[error("failed to write frame image: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error(transparent)]
    Core(#[from] rodviz_core::Error),
}

/// Convert a display color to a wgpu clear color.
pub fn clear_color(color: rodviz_core::Color) -> wgpu::Color {
    wgpu::Color {
        r: color.r as f64,
        g: color.g as f64,
        b: color.b as f64,
        a: color.a as f64,
    }
}
