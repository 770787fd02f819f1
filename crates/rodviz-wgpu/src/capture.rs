//! Frame capture to numbered PNG files.
//!
//! Each displayed playback frame is read back from the surface and written as
//! `frame_00000.png`, `frame_00001.png`, ... so the directory can be fed to a
//! video encoder directly.

use std::path::{Path, PathBuf};

use crate::ViewerError;

/// One frame read back from the GPU, tightly packed RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Row pitch of a texture-to-buffer copy for `width` RGBA8 texels.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

/// Strip row padding from a mapped readback buffer, swapping B and R when the
/// surface stores BGRA.
pub fn unpad_rows(data: &[u8], width: u32, height: u32, padded_row: u32, bgra: bool) -> Vec<u8> {
    let row = width as usize * 4;
    let mut rgba = Vec::with_capacity(row * height as usize);
    for chunk in data.chunks(padded_row as usize).take(height as usize) {
        rgba.extend_from_slice(&chunk[..row]);
    }
    if bgra {
        for px in rgba.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }
    rgba
}

/// Writes captured frames into a directory.
#[derive(Debug)]
pub struct FrameCapture {
    dir: PathBuf,
    written: u64,
}

impl FrameCapture {
    /// Capture into `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ViewerError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, written: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn frame_path(&self, n: u64) -> PathBuf {
        self.dir.join(format!("frame_{n:05}.png"))
    }

    /// Write `frame` as the next numbered PNG.
    pub fn save(&mut self, frame: &CapturedFrame) -> Result<PathBuf, ViewerError> {
        let path = self.frame_path(self.written);
        image::save_buffer(
            &path,
            &frame.rgba,
            frame.width,
            frame.height,
            image::ColorType::Rgba8,
        )?;
        self.written += 1;
        tracing::trace!(path = %path.display(), "frame captured");
        Ok(path)
    }
}
