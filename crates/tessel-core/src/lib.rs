//! Tessel Core - evaluation engine for node-based procedural textures
//!
//! A texture is described as a directed acyclic graph of stages. Each stage
//! is an instance of a node type from a [`NodeCatalog`], owns a packed
//! parameter block, and renders into a GPU-style render target that feeds
//! the stages downstream of it.
//!
//! # Core Abstractions
//!
//! ## Graph
//!
//! - [`StageCollection`] - Stages, wiring, multiplexed inputs, evaluation order
//! - [`NodeCatalog`] / [`NodeTypeInfo`] - Registry of node types and their schemas
//! - [`ParameterBlock`] / [`ParamDescriptor`] - Typed parameters packed into bytes
//! - [`AnimTrack`] - Keyframed parameter values with hold or interpolation
//!
//! ## Evaluation
//!
//! - [`EvaluationContext`] - Dirty tracking, render target ownership, execution
//! - [`DirtyFlags`] - Why a stage must be re-rendered
//! - [`TargetPool`] - Free list of render targets keyed by description
//! - [`ThumbnailAtlas`] - Packed previews for every stage
//!
//! ## Backends
//!
//! - [`RenderBackend`] - Object-safe seam over the GPU
//! - [`SoftwareBackend`] - CPU reference backend running fragment programs
//!
//! ## Editing and Baking
//!
//! - [`History`] / [`Transaction`] - Undo and redo of graph edits
//! - [`Builder`] / [`bake_job`] - Offline rendering of a frame range on a worker thread
//!
//! # Example
//!
//! ```rust,ignore
//! use tessel_core::{ContextConfig, EvaluationContext, StageCollection};
//!
//! let mut graph = StageCollection::new(catalog);
//! let noise = graph.add_stage(noise_type)?;
//! let levels = graph.add_stage(levels_type)?;
//! graph.connect(levels, 0, noise)?;
//!
//! let mut ctx = EvaluationContext::new(factory(), ContextConfig::default());
//! while !ctx.evaluate(&graph).is_idle() {}
//! let pixels = ctx.read_pixels(levels)?;
//! ```
//!
//! # Design Principles
//!
//! - **Graph owns no GPU state**: contexts hold targets, graphs stay plain data
//! - **Incremental**: only dirty stages and their descendants are re-rendered
//! - **Time-sliced**: one `evaluate` call runs a bounded batch of stages
//! - **Backend agnostic**: all rendering goes through [`RenderBackend`]

pub mod animation;
pub mod backend;
pub mod builder;
pub mod catalog;
pub mod codec;
pub mod context;
pub mod error;
pub mod graph;
pub mod history;
pub mod param;
pub mod plan;
pub mod software;
pub mod stage;
pub mod target;
pub mod thumbnail;

// Re-export main types at crate root
pub use animation::{AnimTrack, KeyPointer};
pub use backend::{
    BackendFactory, BoundInput, DrawCall, PixelBuffer, PixelFormat, Rect, RenderBackend,
    TargetDesc, TextureHandle,
};
pub use builder::{
    BakeReport, BuildJob, Builder, BuilderConfig, FinishedJob, JobProgress, bake_job,
};
pub use catalog::{
    Executors, NativeFn, NodeCatalog, NodeCategory, NodeFlags, NodeTypeId, NodeTypeInfo,
    ScriptHandle, ShaderProgram, SizePolicy, SlotInfo, SlotKind,
};
pub use codec::{FrameDecoder, FrameSink, MemoryDecoder, MemorySink};
pub use context::{
    ContextConfig, ContextStats, DirtyFlags, EvaluationContext, EvaluationInfo, EvaluationReport,
    MouseState, NativeCall, NativeStatus, RenderPass, ScriptHost,
};
pub use error::{BackendError, BuildError, CatalogError, CodecError, ExecError, GraphError};
pub use graph::{RemovedStage, StageCollection};
pub use history::{Edit, History, Transaction};
pub use param::{
    Camera, CurveKind, ParamDescriptor, ParamError, ParamType, ParamValue, ParamView,
    ParameterBlock,
};
pub use plan::{PlanStep, TargetPlan};
pub use software::{FragmentFn, FragmentInput, ProgramLibrary, SoftwareBackend, software_factory};
pub use stage::{
    BlendFactor, BlendState, DecoderHandle, FilterMode, MAX_INPUTS, Sampler, Stage, StageId,
    ViewTransform, WrapMode,
};
pub use target::{PoolStats, RenderTarget, TargetPool};
pub use thumbnail::{ThumbHandle, ThumbnailAtlas};
