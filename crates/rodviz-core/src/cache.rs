//! Append-only store of built frames.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::mesh::FrameMeshBundle;

/// Frames built so far, shared between the producer and the viewer.
///
/// One writer appends bundles strictly in frame order; any number of readers
/// fetch frames below the high watermark. `frames[i].frame_index == i` always
/// holds and the watermark never decreases.
#[derive(Debug)]
pub struct PlaybackCache {
    frames: RwLock<Vec<Arc<FrameMeshBundle>>>,
    high_watermark: AtomicUsize,
    total_frames: usize,
    complete: AtomicBool,
}

impl PlaybackCache {
    /// Create an empty cache expecting `total_frames` frames.
    pub fn new(total_frames: usize) -> Self {
        Self {
            frames: RwLock::new(Vec::with_capacity(total_frames)),
            high_watermark: AtomicUsize::new(0),
            total_frames,
            complete: AtomicBool::new(false),
        }
    }

    /// Append the next frame. Returns the new size.
    pub fn append(&self, bundle: impl Into<Arc<FrameMeshBundle>>) -> Result<usize> {
        let bundle = bundle.into();
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);

        let expected = frames.len();
        if bundle.frame_index != expected {
            return Err(Error::OutOfOrderAppend {
                expected,
                actual: bundle.frame_index,
            });
        }

        frames.push(bundle);
        let size = frames.len();
        // Readers that observe the new size must also observe the push.
        self.high_watermark.store(size, Ordering::Release);
        Ok(size)
    }

    /// Fetch a built frame.
    pub fn get(&self, index: usize) -> Result<Arc<FrameMeshBundle>> {
        let len = self.size();
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        frames
            .get(index)
            .cloned()
            .ok_or(Error::IndexOutOfBounds { index, len })
    }

    /// Number of frames available (the high watermark).
    pub fn size(&self) -> usize {
        self.high_watermark.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of frames the producer is expected to build.
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Whether the producer has stopped, for any reason.
    ///
    /// A complete cache may hold fewer than `total_frames` frames if the run
    /// was cancelled or failed.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    /// Fraction of the expected frames that are available, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.total_frames == 0 {
            return if self.is_complete() { 1.0 } else { 0.0 };
        }
        (self.size() as f64 / self.total_frames as f64).min(1.0)
    }
}
