//! Background frame producer.
//!
//! Builds the meshes of every frame on a dedicated thread, appending each
//! finished bundle to a shared [`PlaybackCache`] and notifying the viewer over
//! a channel.
//!
//! # Usage
//!
//! ```ignore
//! let mut producer = FrameProducer::spawn(MeshBuilder::default(), dataset)?;
//! let controller = PlaybackController::new(producer.cache(), interval);
//!
//! // In the event loop
//! for event in producer.poll_events() {
//!     update_progress(&event);
//! }
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::cache::PlaybackCache;
use crate::dataset::VisualizationDataset;
use crate::error::{Error, Result};
use crate::mesh::{FrameMeshBundle, MeshBuilder, TubePrimitive};

/// Cooperative cancellation flag, checked between frames.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a producer run ended.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Every frame was built.
    Finished { frames: usize },
    /// Stopped on request after `frames` frames.
    Cancelled { frames: usize },
    /// Stopped by an error after `frames` frames.
    Failed { frames: usize, error: Arc<Error> },
}

impl Completion {
    /// Number of frames appended before the run ended.
    pub fn frames(&self) -> usize {
        match self {
            Completion::Finished { frames }
            | Completion::Cancelled { frames }
            | Completion::Failed { frames, .. } => *frames,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            Completion::Failed { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }

    /// `Err` for a failed run, otherwise the frame count.
    pub fn into_result(self) -> std::result::Result<usize, Arc<Error>> {
        match self {
            Completion::Finished { frames } | Completion::Cancelled { frames } => Ok(frames),
            Completion::Failed { error, .. } => Err(error),
        }
    }
}

/// Notification sent from the producer thread.
#[derive(Debug, Clone)]
pub enum ProducerEvent {
    /// A frame was appended; `frames_ready` is the new cache size.
    FrameAppended {
        frame_index: usize,
        frames_ready: usize,
    },
    /// The run ended. Sent exactly once, after the cache is marked complete.
    Completed(Completion),
}

/// Spawns producer threads.
pub struct FrameProducer;

impl FrameProducer {
    /// Start building every frame of `dataset` on a new thread.
    pub fn spawn<P>(builder: MeshBuilder<P>, dataset: Arc<VisualizationDataset>) -> Result<ProducerHandle>
    where
        P: TubePrimitive + 'static,
    {
        let cache = Arc::new(PlaybackCache::new(dataset.frame_count()));
        let cancel = CancelToken::new();
        let (tx, rx) = mpsc::channel();

        let thread = {
            let cache = Arc::clone(&cache);
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("frame-producer".into())
                .spawn(move || run_frames(&builder, &dataset, &cache, &cancel, &tx))?
        };

        Ok(ProducerHandle {
            cache,
            cancel,
            events: rx,
            thread: Some(thread),
            completion: None,
        })
    }
}

/// Build frames `0..frame_count` in order, appending each to `cache`.
///
/// Stops early when `cancel` is set or a frame fails to build. A failing frame
/// is never appended, so the cache always holds a contiguous prefix. A panic
/// inside the primitive is reported as [`Error::ProducerPanicked`]. Either way
/// the cache is marked complete and [`ProducerEvent::Completed`] sent before
/// returning.
pub fn run_frames<P: TubePrimitive>(
    builder: &MeshBuilder<P>,
    dataset: &VisualizationDataset,
    cache: &PlaybackCache,
    cancel: &CancelToken,
    events: &Sender<ProducerEvent>,
) -> Completion {
    let total = dataset.frame_count();
    tracing::info!(
        frames = total,
        objects = dataset.object_count(),
        "frame producer started"
    );

    let completion = panic::catch_unwind(AssertUnwindSafe(|| {
        build_all(builder, dataset, cache, cancel, events)
    }))
    .unwrap_or_else(|payload| {
        tracing::error!(reason = panic_reason(&*payload), "mesh building panicked");
        Completion::Failed {
            frames: cache.size(),
            error: Arc::new(Error::ProducerPanicked),
        }
    });

    match &completion {
        Completion::Finished { frames } => {
            tracing::info!(frames, "frame producer finished");
        }
        Completion::Cancelled { frames } => {
            tracing::info!(frames, total, "frame producer cancelled");
        }
        Completion::Failed { frames, error } => {
            tracing::error!(frames, %error, "frame producer failed");
        }
    }

    cache.mark_complete();
    // The viewer may already be gone.
    let _ = events.send(ProducerEvent::Completed(completion.clone()));
    completion
}

fn panic_reason(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown")
}

fn build_all<P: TubePrimitive>(
    builder: &MeshBuilder<P>,
    dataset: &VisualizationDataset,
    cache: &PlaybackCache,
    cancel: &CancelToken,
    events: &Sender<ProducerEvent>,
) -> Completion {
    let time = dataset.time();

    for (frame_index, &timestamp) in time.iter().enumerate() {
        if cancel.is_cancelled() {
            return Completion::Cancelled {
                frames: cache.size(),
            };
        }

        let bundle = match build_frame(builder, dataset, frame_index, timestamp) {
            Ok(bundle) => bundle,
            Err(error) => {
                return Completion::Failed {
                    frames: cache.size(),
                    error: Arc::new(error),
                };
            }
        };

        let frames_ready = match cache.append(bundle) {
            Ok(size) => size,
            Err(error) => {
                tracing::error!(%error, "cache rejected frame; this is a producer bug");
                return Completion::Failed {
                    frames: cache.size(),
                    error: Arc::new(error),
                };
            }
        };

        tracing::debug!(frame_index, frames_ready, "frame appended");
        let _ = events.send(ProducerEvent::FrameAppended {
            frame_index,
            frames_ready,
        });
    }

    Completion::Finished {
        frames: cache.size(),
    }
}

/// Build every object of one frame, all or nothing.
fn build_frame<P: TubePrimitive>(
    builder: &MeshBuilder<P>,
    dataset: &VisualizationDataset,
    frame_index: usize,
    timestamp: f64,
) -> Result<FrameMeshBundle> {
    let mut bundle = FrameMeshBundle::new(frame_index, timestamp);

    for (name, series) in dataset.objects() {
        let (points, radii) = series.frame(frame_index).unwrap_or((&[], &[]));
        let mesh = builder
            .build(
                name,
                frame_index,
                series.kind,
                points,
                radii,
                series.closed,
                series.color,
            )
            .map_err(|cause| Error::FrameBuildFailed {
                frame_index,
                object_name: name.clone(),
                cause: Box::new(cause),
            })?;
        bundle.meshes.insert(name.clone(), mesh);
    }

    Ok(bundle)
}

/// Owner's side of a running producer.
///
/// Dropping the handle cancels the run and waits for the thread.
pub struct ProducerHandle {
    cache: Arc<PlaybackCache>,
    cancel: CancelToken,
    events: Receiver<ProducerEvent>,
    thread: Option<JoinHandle<Completion>>,
    completion: Option<Completion>,
}

impl ProducerHandle {
    /// The cache this producer fills.
    pub fn cache(&self) -> Arc<PlaybackCache> {
        Arc::clone(&self.cache)
    }

    /// Ask the producer to stop after the current frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain pending events without blocking.
    pub fn poll_events(&mut self) -> Vec<ProducerEvent> {
        let events: Vec<_> = self.events.try_iter().collect();
        if let Some(ProducerEvent::Completed(c)) = events.last() {
            self.completion = Some(c.clone());
        }
        events
    }

    /// Completion seen by [`poll_events`](Self::poll_events), if any.
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Whether the producer thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the producer thread and return how the run ended.
    pub fn join(mut self) -> Completion {
        self.join_thread()
    }

    fn join_thread(&mut self) -> Completion {
        let Some(thread) = self.thread.take() else {
            return self.completion.clone().unwrap_or(Completion::Cancelled {
                frames: self.cache.size(),
            });
        };

        let completion = match thread.join() {
            Ok(completion) => completion,
            Err(_) => {
                tracing::error!("frame producer thread panicked");
                self.cache.mark_complete();
                Completion::Failed {
                    frames: self.cache.size(),
                    error: Arc::new(Error::ProducerPanicked),
                }
            }
        };
        self.completion = Some(completion.clone());
        completion
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.cancel();
            self.join_thread();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::dataset::ObjectSeries;
    use crate::mesh::{SweptTube, TubeMesh};
    use glam::Vec3;
    use indexmap::IndexMap;
    use std::sync::atomic::AtomicUsize;

    fn dataset(frames: usize) -> VisualizationDataset {
        let positions = (0..frames)
            .map(|f| (0..4).map(|i| Vec3::new(i as f32, f as f32, 0.0)).collect())
            .collect();
        let radii = vec![vec![0.1; 3]; frames];
        let mut objects = IndexMap::new();
        objects.insert("rod".to_string(), ObjectSeries::rod(positions, radii));
        VisualizationDataset::new(objects, (0..frames).map(|f| f as f64).collect()).unwrap()
    }

    #[test]
    fn run_frames_builds_every_frame_in_order() {
        let ds = dataset(4);
        let cache = PlaybackCache::new(ds.frame_count());
        let (tx, rx) = mpsc::channel();

        let completion = run_frames(
            &MeshBuilder::<SweptTube>::default(),
            &ds,
            &cache,
            &CancelToken::new(),
            &tx,
        );
        assert!(matches!(completion, Completion::Finished { frames: 4 }));
        assert!(cache.is_complete());

        let events: Vec<_> = rx.try_iter().collect();
        let appended: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProducerEvent::FrameAppended { frame_index, .. } => Some(*frame_index),
                _ => None,
            })
            .collect();
        assert_eq!(appended, [0, 1, 2, 3]);
        assert!(matches!(
            events.last(),
            Some(ProducerEvent::Completed(Completion::Finished { frames: 4 }))
        ));
    }

    #[test]
    fn cancelled_before_start_builds_nothing() {
        let ds = dataset(3);
        let cache = PlaybackCache::new(3);
        let cancel = CancelToken::new();
        cancel.cancel();
        cancel.cancel();
        let (tx, _rx) = mpsc::channel();

        let completion = run_frames(&MeshBuilder::<SweptTube>::default(), &ds, &cache, &cancel, &tx);
        assert!(matches!(completion, Completion::Cancelled { frames: 0 }));
        assert_eq!(cache.size(), 0);
        assert!(cache.is_complete());
    }

    #[test]
    fn empty_dataset_finishes_immediately() {
        let ds = VisualizationDataset::new(IndexMap::new(), Vec::new()).unwrap();
        let producer = FrameProducer::spawn(MeshBuilder::<SweptTube>::default(), Arc::new(ds)).unwrap();
        let cache = producer.cache();
        assert!(matches!(producer.join(), Completion::Finished { frames: 0 }));
        assert!(cache.is_complete());
    }

    /// Requests cancellation while building the given call.
    struct CancelOnBuild {
        cancel: CancelToken,
        at: usize,
        calls: AtomicUsize,
    }

    impl TubePrimitive for CancelOnBuild {
        fn build_tube(&self, points: &[Vec3], radii: &[f32], closed: bool, color: Color) -> TubeMesh {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.at {
                self.cancel.cancel();
            }
            SweptTube::new(3).build_tube(points, radii, closed, color)
        }
    }

    #[test]
    fn cancel_mid_run_leaves_a_prefix() {
        let ds = dataset(10);
        let cache = PlaybackCache::new(ds.frame_count());
        let cancel = CancelToken::new();
        let builder = MeshBuilder::new(CancelOnBuild {
            cancel: cancel.clone(),
            at: 2,
            calls: AtomicUsize::new(0),
        });
        let (tx, _rx) = mpsc::channel();

        // The frame in flight still lands; the next one is never started.
        let completion = run_frames(&builder, &ds, &cache, &cancel, &tx);
        assert!(matches!(completion, Completion::Cancelled { frames: 3 }));
        assert_eq!(cache.size(), 3);
        for i in 0..3 {
            assert_eq!(cache.get(i).unwrap().frame_index, i);
        }
    }

    #[test]
    fn drop_cancels_and_joins() {
        let producer =
            FrameProducer::spawn(MeshBuilder::<SweptTube>::default(), Arc::new(dataset(500))).unwrap();
        let cache = producer.cache();
        drop(producer);

        assert!(cache.is_complete());
        let size = cache.size();
        for i in 0..size {
            assert_eq!(cache.get(i).unwrap().frame_index, i);
        }
    }

    struct Panicking;

    impl TubePrimitive for Panicking {
        fn build_tube(&self, _: &[Vec3], _: &[f32], _: bool, _: Color) -> TubeMesh {
            panic!("primitive exploded");
        }
    }

    #[test]
    fn panicking_worker_is_reported_as_failure() {
        let producer = FrameProducer::spawn(MeshBuilder::new(Panicking), Arc::new(dataset(2))).unwrap();
        let cache = producer.cache();
        let completion = producer.join();
        assert!(matches!(completion.error(), Some(Error::ProducerPanicked)));
        assert!(cache.is_complete());
    }

    /// Builds normally until the given call, then panics.
    struct PanicOnBuild {
        at: usize,
        calls: AtomicUsize,
    }

    impl TubePrimitive for PanicOnBuild {
        fn build_tube(&self, points: &[Vec3], radii: &[f32], closed: bool, color: Color) -> TubeMesh {
            if self.calls.fetch_add(1, Ordering::SeqCst) == self.at {
                panic!("primitive exploded on call {}", self.at);
            }
            SweptTube::new(3).build_tube(points, radii, closed, color)
        }
    }

    #[test]
    fn panic_mid_run_still_signals_completion_once() {
        let builder = MeshBuilder::new(PanicOnBuild {
            at: 2,
            calls: AtomicUsize::new(0),
        });
        let mut producer = FrameProducer::spawn(builder, Arc::new(dataset(4))).unwrap();
        let cache = producer.cache();
        while !producer.is_finished() {
            std::thread::yield_now();
        }

        let events = producer.poll_events();
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProducerEvent::Completed(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].frames(), 2);
        assert!(matches!(completed[0].error(), Some(Error::ProducerPanicked)));
        assert!(matches!(
            producer.completion().and_then(Completion::error),
            Some(Error::ProducerPanicked)
        ));
        assert!(cache.is_complete());
        assert_eq!(cache.size(), 2);

        let mut playback =
            crate::playback::PlaybackController::new(cache, std::time::Duration::from_millis(40));
        playback.play(std::time::Instant::now());
        for _ in 0..5 {
            playback.advance();
        }
        assert!(!playback.is_playing());
        assert_eq!(playback.current_frame(), 1);
    }
}
