//! rodviz core
//!
//! Asynchronous tube-mesh generation and playback for rod simulation output.
//!
//! # Architecture
//!
//! - **Dataset**: validated per-object time series of centerlines and radii
//! - **Mesh**: turns one object's samples for one frame into a tube mesh
//! - **Producer**: builds every frame on a background thread
//! - **Cache**: append-only frame store shared with the viewer
//! - **Playback**: play, pause, scrub and step over whatever is built so far
//! - **Scene**: GPU-independent viewer state (meshes, axes, camera mode)
//!
//! # Usage
//!
//! ```ignore
//! let dataset = Arc::new(SnapshotStore::open("out")?.load_dataset(None)?);
//! let producer = FrameProducer::spawn(MeshBuilder::default(), dataset.clone())?;
//! let mut playback = PlaybackController::new(producer.cache(), Duration::from_millis(40));
//! let mut scene = SceneState::new(&dataset);
//!
//! if let Some(frame) = playback.tick(Instant::now()) {
//!     scene.render(&frame);
//! }
//! ```

mod cache;
mod color;
mod config;
mod dataset;
mod error;
mod mesh;
mod playback;
mod producer;
mod recorder;
mod scene;

pub use cache::PlaybackCache;
pub use color::Color;
pub use config::ViewerConfig;
pub use dataset::{
    Aabb, GroupSpec, GroupingConfig, ObjectKind, ObjectSeries, RawObjectRecord,
    VisualizationDataset,
};
pub use error::{Error, Result};
pub use mesh::{
    pad_radii, FrameMeshBundle, MeshBuilder, MeshHandle, SweptTube, TubeMesh, TubePrimitive,
    TubeVertex,
};
pub use playback::{PlaybackController, PlaybackSpeed, PlaybackState, PlaybackStatus};
pub use producer::{run_frames, CancelToken, Completion, FrameProducer, ProducerEvent, ProducerHandle};
pub use recorder::{RodSystem, SnapshotRecorder, SnapshotStore, StepSnapshot};
pub use scene::{
    nice_ticks, Axis, AxisDirection, AxisStyle, CameraFit, CameraMode, SceneObject, SceneState,
    Viewer,
};
