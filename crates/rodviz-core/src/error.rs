//! Error types for rodviz-core.

use thiserror::Error;

use crate::dataset::ObjectKind;

/// Result type for rodviz-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or playing back frames.
#[derive(Debug, Error)]
pub enum Error {
    /// Radius and position lengths disagree for one object at one frame.
    ///
    /// A tube needs at least two points and exactly one radius per segment.
    #[error(
        "shape mismatch for `{object}` at frame {frame}: {radii} radii for {points} points \
         (need at least 2 points and points - 1 radii)"
    )]
    ShapeMismatch {
        object: String,
        frame: usize,
        points: usize,
        radii: usize,
    },

    /// The object kind has no mesh implementation.
    #[error("unsupported object kind {kind} for `{object}`")]
    UnsupportedObjectKind { object: String, kind: ObjectKind },

    /// Building one object of one frame failed; the producer run stops here.
    #[error("failed to build frame {frame_index} for `{object_name}`: {cause}")]
    FrameBuildFailed {
        frame_index: usize,
        object_name: String,
        #[source]
        cause: Box<Error>,
    },

    /// A bundle was appended out of order. Always a producer bug.
    #[error("out-of-order append: expected frame {expected}, got {actual}")]
    OutOfOrderAppend { expected: usize, actual: usize },

    /// A cache read past the high watermark.
    #[error("frame {index} out of bounds ({len} frames ready)")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The dataset violates a structural invariant.
    #[error("invalid dataset: {0}")]
    InvalidDataset(String),

    /// A configuration value could not be parsed.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A grouping or lookup referenced an object that does not exist.
    #[error("unknown object `{0}`")]
    UnknownObject(String),

    /// The producer thread panicked before signalling completion.
    #[error("frame producer thread panicked")]
    ProducerPanicked,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
