//! Error types for graph mutation, stage execution, and the external
//! collaborator boundaries.

use crate::param::ParamError;
use crate::stage::StageId;

/// Errors from structural edits of a [`StageCollection`](crate::graph::StageCollection).
///
/// A rejected edit always leaves the collection unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// No stage with this id.
    #[error("stage {0} not found")]
    StageNotFound(StageId),

    /// The node type id is not in the catalog.
    #[error("node type {0} is not registered")]
    UnknownNodeType(u16),

    /// Input slot index is past the node type's declared inputs.
    #[error("stage {stage} has no input slot {slot}")]
    SlotOutOfRange {
        /// Target stage.
        stage: StageId,
        /// Requested slot.
        slot: usize,
    },

    /// A stage cannot feed itself.
    #[error("stage {0} cannot be connected to itself")]
    SelfConnection(StageId),

    /// The connection would introduce a cycle.
    #[error("connecting {source_stage} into {target} would create a cycle")]
    CycleDetected {
        /// Upstream stage.
        source_stage: StageId,
        /// Downstream stage.
        target: StageId,
    },

    /// The source's output type cannot feed the slot.
    #[error("output of {source_stage} is incompatible with slot {slot} of {target}")]
    IncompatibleSlot {
        /// Upstream stage.
        source_stage: StageId,
        /// Downstream stage.
        target: StageId,
        /// Slot index on the target.
        slot: usize,
    },

    /// The stage is not a valid multiplex candidate for the slot.
    #[error("{candidate} is not a valid multiplex input for slot {slot} of {target}")]
    InvalidMultiplex {
        /// Downstream stage.
        target: StageId,
        /// Slot index.
        slot: usize,
        /// Rejected candidate.
        candidate: StageId,
    },

    /// Parameter access failed.
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Errors from catalog registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// A node type with this name is already registered.
    #[error("node type '{0}' is already registered")]
    DuplicateName(String),

    /// A node type declares more inputs than a stage can hold.
    #[error("node type '{name}' declares {count} inputs (max {max})")]
    TooManyInputs {
        /// Node type name.
        name: String,
        /// Declared inputs.
        count: usize,
        /// Slot limit.
        max: usize,
    },
}

/// Errors reported by a [`RenderBackend`](crate::backend::RenderBackend).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The handle does not name a live target.
    #[error("unknown texture handle {0}")]
    UnknownTexture(u32),

    /// The backend has no program under this name.
    #[error("unknown program '{0}'")]
    UnknownProgram(String),

    /// Target allocation failed.
    #[error("out of memory allocating {width}x{height} target")]
    OutOfMemory {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Pixel data does not match the destination.
    #[error("pixel buffer of {actual} texels does not fit target of {expected}")]
    SizeMismatch {
        /// Texels the target holds.
        expected: usize,
        /// Texels supplied.
        actual: usize,
    },

    /// Any other backend failure.
    #[error("backend failure: {0}")]
    Other(String),
}

/// Errors from the codec boundary.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The requested frame is past the end of the stream.
    #[error("frame {frame} out of range (stream has {count} frames)")]
    FrameOutOfRange {
        /// Requested frame.
        frame: u32,
        /// Frames available.
        count: u32,
    },

    /// I/O failure while reading or writing.
    #[error("codec I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other codec failure.
    #[error("codec failure: {0}")]
    Other(String),
}

/// Errors raised while executing a single stage.
///
/// These never escape [`EvaluationContext::evaluate`](crate::context::EvaluationContext::evaluate):
/// they are logged and the stage stays dirty.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The stage id is stale.
    #[error("stage {0} not found")]
    StageNotFound(StageId),

    /// The stage's node type has no executor.
    #[error("node type '{0}' has no executor")]
    NoExecutor(String),

    /// A script executor is attached but no script host is installed.
    #[error("no script host installed for script {0}")]
    NoScriptHost(u32),

    /// The backend rejected a call.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Decoding the stage's source failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Parameter access failed.
    #[error(transparent)]
    Param(#[from] ParamError),

    /// A native executor reported a failure.
    #[error("{0}")]
    Native(String),
}

/// Errors from the builder.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The job has no stages with a non-empty time window.
    #[error("job '{0}' has an empty frame range")]
    EmptyFrameRange(String),

    /// An output stage is not in the job's graph.
    #[error("output stage {0} is not part of the job")]
    MissingOutput(StageId),

    /// The frame sink failed.
    #[error(transparent)]
    Sink(#[from] CodecError),

    /// Reading back an output failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_graph_error_display() {
        let err = GraphError::CycleDetected {
            source_stage: StageId(3),
            target: StageId(1),
        };
        assert_eq!(
            err.to_string(),
            "connecting #3 into #1 would create a cycle"
        );
    }

    #[test]
    fn test_exec_error_wraps_backend_source() {
        let err = ExecError::from(BackendError::UnknownProgram("blur".into()));
        assert_eq!(err.to_string(), "unknown program 'blur'");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_codec_io_has_source() {
        let err = CodecError::from(std::io::Error::other("disk"));
        assert!(err.source().is_some());
    }
}
