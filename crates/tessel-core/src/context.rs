//! Evaluation context: dirty tracking, scheduling and execution.
//!
//! An [`EvaluationContext`] owns one render backend, per-stage runtime
//! state, and a [`TargetPool`]. It reads a [`StageCollection`] on every call
//! and never mutates it, so several contexts (an interactive one and any
//! number of baking ones) can evaluate the same or copied graphs
//! independently.
//!
//! # Stage states
//!
//! ```text
//!   Clean ──set_dirty──▶ Dirty ──input still dirty──▶ Processing
//!     ▲                    │                              │
//!     └──executed──────────┘◀─────next evaluate call──────┘
//! ```
//!
//! A Processing stage stays Dirty, so the next [`evaluate`](EvaluationContext::evaluate)
//! collects it again. Execution errors are logged and leave the stage Dirty.
//!
//! # Modes
//!
//! Interactive contexts keep one target per stage and run at most
//! [`ContextConfig::batch_size`] stages per call. Building contexts run
//! everything, pre-warm the pool from a [`TargetPlan`], and hand an input's
//! target back to the pool as soon as its last consumer has run.

use std::ops::{BitOr, BitOrAssign};

use crate::backend::{
    BoundInput, DrawCall, PixelBuffer, PixelFormat, RenderBackend, TargetDesc, TextureHandle,
};
use crate::catalog::{NodeFlags, NodeTypeInfo, ScriptHandle, SizePolicy, SlotKind};
use crate::error::{BackendError, ExecError};
use crate::graph::StageCollection;
use crate::param::ParamView;
use crate::plan::TargetPlan;
use crate::stage::{DecoderHandle, MAX_INPUTS, Stage, StageId};
use crate::target::{RenderTarget, TargetPool};
use crate::thumbnail::{ThumbHandle, ThumbnailAtlas};

// --- Flags and per-call info ---

/// Reasons a stage needs re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DirtyFlags(u16);

impl DirtyFlags {
    /// Clean.
    pub const NONE: Self = Self(0);
    /// Newly added stage.
    pub const ADDED: Self = Self(1 << 0);
    /// An input changed.
    pub const INPUT: Self = Self(1 << 1);
    /// A parameter changed.
    pub const PARAMETER: Self = Self(1 << 2);
    /// A sampler changed.
    pub const SAMPLER: Self = Self(1 << 3);
    /// Mouse input for the focused stage.
    pub const MOUSE: Self = Self(1 << 4);
    /// An upstream stage was deleted.
    pub const DELETED: Self = Self(1 << 5);
    /// Local time moved.
    pub const TIME: Self = Self(1 << 6);
    /// Camera moved.
    pub const CAMERA: Self = Self(1 << 7);
    /// Time window edited.
    pub const TIME_WINDOW: Self = Self(1 << 8);
    /// Forced re-evaluation.
    pub const FORCED: Self = Self(1 << 9);

    /// Changes that invalidate partial work of a pending executor.
    pub const RESTART: Self = Self(Self::INPUT.0 | Self::PARAMETER.0 | Self::FORCED.0);

    /// Returns `true` if clean.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if any bit of `other` is set.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Raw bits.
    pub const fn bits(self) -> u16 {
        self.0
    }
}

impl BitOr for DirtyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Which pass of a stage is being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderPass {
    /// Regular output.
    #[default]
    Main,
    /// On-canvas controls of `HAS_UI` nodes.
    Overlay,
}

/// Pointer and button state as seen by one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseState {
    /// Horizontal position in the stage's view space.
    pub x: f32,
    /// Vertical position in the stage's view space.
    pub y: f32,
    /// Button bitmask.
    pub buttons: u8,
    /// Wheel delta.
    pub wheel: f32,
}

impl MouseState {
    /// Seen by every stage except the focused one.
    pub const FAR_AWAY: Self = Self {
        x: -9999.0,
        y: -9999.0,
        buttons: 0,
        wheel: 0.0,
    };
}

impl Default for MouseState {
    fn default() -> Self {
        Self::FAR_AWAY
    }
}

/// Per-execution values visible to executors and programs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationInfo {
    /// Stage being executed.
    pub stage: StageId,
    /// Global frame.
    pub frame: i32,
    /// Frame relative to the stage's window.
    pub local_time: i32,
    /// Mouse state for this stage.
    pub mouse: MouseState,
    /// Pass being rendered.
    pub pass: RenderPass,
    /// Why the stage is running.
    pub dirty: DirtyFlags,
    /// Output size in texels.
    pub target_size: (u32, u32),
}

impl EvaluationInfo {
    /// Info for a stage at frame 0 with no input.
    pub fn new(stage: StageId) -> Self {
        Self {
            stage,
            frame: 0,
            local_time: 0,
            mouse: MouseState::FAR_AWAY,
            pass: RenderPass::Main,
            dirty: DirtyFlags::NONE,
            target_size: (0, 0),
        }
    }
}

// --- Executor interfaces ---

/// Outcome of a native or script executor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeStatus {
    /// Output is complete.
    Done,
    /// More calls are needed; the stage stays Processing.
    Pending {
        /// Completion estimate, `0..=1`.
        progress: f32,
    },
}

/// Everything a native executor may touch.
pub struct NativeCall<'a> {
    /// Stage being executed.
    pub stage: StageId,
    /// Per-execution values.
    pub info: &'a EvaluationInfo,
    /// Stage parameters.
    pub params: ParamView<'a>,
    /// Targets of the effective inputs.
    pub inputs: [Option<TextureHandle>; MAX_INPUTS],
    /// Output target.
    pub target: TextureHandle,
    /// Output description.
    pub target_desc: TargetDesc,
    /// The context's backend.
    pub backend: &'a mut dyn RenderBackend,
    /// Source decoder, if the stage has one.
    pub decoder: Option<&'a DecoderHandle>,
    /// Progress reported by the previous pending call, 0 on a fresh run.
    pub progress: f32,
}

/// Runs script executors. Installed with [`EvaluationContext::set_script_host`].
pub trait ScriptHost {
    /// Executes `handle` for one stage.
    fn run(
        &mut self,
        handle: ScriptHandle,
        call: &mut NativeCall<'_>,
    ) -> Result<NativeStatus, ExecError>;
}

// --- Configuration and reporting ---

/// Context settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextConfig {
    /// Width of default-sized targets.
    pub default_width: u32,
    /// Height of default-sized targets.
    pub default_height: u32,
    /// Format of every target.
    pub format: PixelFormat,
    /// Stages executed per interactive `evaluate` call.
    pub batch_size: usize,
    /// Baking mode: unbounded batches and pooled input release.
    pub building: bool,
    /// Render thumbnails for `THUMBNAIL` nodes.
    pub thumbnails: bool,
    /// Thumbnail atlas size.
    pub atlas_size: u32,
    /// Thumbnail slot size.
    pub thumb_size: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_width: 512,
            default_height: 512,
            format: PixelFormat::Rgba8,
            batch_size: 100,
            building: false,
            thumbnails: false,
            atlas_size: 1024,
            thumb_size: 64,
        }
    }
}

impl ContextConfig {
    /// Baking configuration at `width`x`height`.
    pub fn building(width: u32, height: u32) -> Self {
        Self {
            default_width: width,
            default_height: height,
            building: true,
            ..Self::default()
        }
    }
}

/// What one `evaluate`-style call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    /// Stages executed to completion, in order.
    pub executed: Vec<StageId>,
    /// Stages skipped because an input was not ready.
    pub deferred: Vec<StageId>,
    /// Native executors that asked for more calls.
    pub pending: Vec<StageId>,
    /// Stages whose execution failed.
    pub failed: Vec<StageId>,
    /// Dirty stages left after the call.
    pub remaining: usize,
}

impl EvaluationReport {
    /// Returns `true` if nothing is left to do.
    pub fn is_idle(&self) -> bool {
        self.remaining == 0
    }
}

/// Lifetime counters of a context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    /// Targets handed out by the pool.
    pub acquired: u64,
    /// Targets returned to the pool.
    pub released: u64,
    /// Targets created on the backend.
    pub created: u64,
    /// Targets destroyed on the backend.
    pub destroyed: u64,
    /// Successful stage executions.
    pub executed: u64,
    /// Failed stage executions.
    pub failed: u64,
}

#[derive(Debug, Clone)]
struct StageRuntime {
    dirty: DirtyFlags,
    processing: bool,
    failed: bool,
    progress: f32,
    target: Option<RenderTarget>,
    use_count: u32,
    local_time: i32,
    persistent: bool,
    mouse: MouseState,
    thumb: Option<ThumbHandle>,
    inputs: [Option<StageId>; MAX_INPUTS],
}

impl StageRuntime {
    fn new(persistent: bool, inputs: [Option<StageId>; MAX_INPUTS]) -> Self {
        Self {
            dirty: DirtyFlags::ADDED,
            processing: false,
            failed: false,
            progress: 0.0,
            target: None,
            use_count: 0,
            local_time: 0,
            persistent,
            mouse: MouseState::FAR_AWAY,
            thumb: None,
            inputs,
        }
    }

    /// Consumers wait on this stage. A failed stage counts as resolved so
    /// its consumers run on the stale target.
    fn is_unresolved(&self) -> bool {
        self.processing || (!self.dirty.is_empty() && !self.failed)
    }

    /// Adds `flags`. New input restarts a pending executor and gives a
    /// failed stage another try.
    fn mark(&mut self, flags: DirtyFlags) {
        if flags.intersects(DirtyFlags::RESTART) {
            if self.processing {
                self.progress = 0.0;
            }
            self.failed = false;
        }
        self.dirty |= flags;
    }
}

// --- Context ---

/// Evaluates a [`StageCollection`] on one render backend.
pub struct EvaluationContext {
    backend: Box<dyn RenderBackend + Send>,
    config: ContextConfig,
    runtime: Vec<Option<StageRuntime>>,
    pool: TargetPool,
    atlas: Option<ThumbnailAtlas>,
    script_host: Option<Box<dyn ScriptHost + Send>>,
    frame: i32,
    focus: Option<StageId>,
    warmed: bool,
    executed: u64,
    failed: u64,
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("config", &self.config)
            .field("stages", &self.runtime.iter().flatten().count())
            .field("frame", &self.frame)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl EvaluationContext {
    /// Creates a context drawing through `backend`.
    pub fn new(backend: Box<dyn RenderBackend + Send>, config: ContextConfig) -> Self {
        Self {
            backend,
            config,
            runtime: Vec::new(),
            pool: TargetPool::new(),
            atlas: None,
            script_host: None,
            frame: 0,
            focus: None,
            warmed: false,
            executed: 0,
            failed: 0,
        }
    }

    /// Installs the host for script executors.
    pub fn set_script_host(&mut self, host: Box<dyn ScriptHost + Send>) {
        self.script_host = Some(host);
    }

    /// Settings the context was created with.
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// The backend, for display code that samples evaluation textures.
    pub fn backend_mut(&mut self) -> &mut dyn RenderBackend {
        &mut *self.backend
    }

    // --- Dirty tracking ---

    /// Marks `id` dirty with `flags` and every stage downstream with `INPUT`.
    /// With `only_children` the seed keeps its previous flags.
    pub fn set_dirty(
        &mut self,
        graph: &StageCollection,
        id: StageId,
        flags: DirtyFlags,
        only_children: bool,
    ) {
        self.sync(graph);
        let Some(rt) = self.rt_mut(id) else { return };
        let saved = (rt.dirty, rt.progress);
        rt.mark(flags);
        self.propagate(graph);
        if only_children && let Some(rt) = self.rt_mut(id) {
            (rt.dirty, rt.progress) = saved;
        }
    }

    /// Marks every live stage dirty with `flags`.
    pub fn set_all_dirty(&mut self, graph: &StageCollection, flags: DirtyFlags) {
        self.sync(graph);
        for rt in self.runtime.iter_mut().flatten() {
            rt.mark(flags);
        }
    }

    /// Dirty flags of a stage, `None` for unknown ids.
    pub fn dirty_flags(&self, id: StageId) -> Option<DirtyFlags> {
        self.rt(id).map(|r| r.dirty)
    }

    /// Returns `true` if the stage needs re-evaluation.
    pub fn is_dirty(&self, id: StageId) -> bool {
        self.rt(id).is_some_and(|r| !r.dirty.is_empty())
    }

    /// Returns `true` if the stage is waiting on an input or a pending executor.
    pub fn is_processing(&self, id: StageId) -> bool {
        self.rt(id).is_some_and(|r| r.processing)
    }

    /// Progress of a pending native executor.
    pub fn progress(&self, id: StageId) -> f32 {
        self.rt(id).map_or(0.0, |r| r.progress)
    }

    /// Consumers that still need the stage's output in the current pass.
    pub fn use_count(&self, id: StageId) -> u32 {
        self.rt(id).map_or(0, |r| r.use_count)
    }

    /// Local frame computed by the last [`set_time`](Self::set_time).
    pub fn local_time(&self, id: StageId) -> i32 {
        self.rt(id).map_or(0, |r| r.local_time)
    }

    /// Current global frame.
    pub fn frame(&self) -> i32 {
        self.frame
    }

    /// Keeps the stage's target alive even after its last consumer ran.
    pub fn set_persistent(&mut self, id: StageId, persistent: bool) {
        if let Some(rt) = self.rt_mut(id) {
            rt.persistent = persistent;
        }
    }

    // --- Evaluation ---

    /// Runs one batch of dirty stages in evaluation order.
    pub fn evaluate(&mut self, graph: &StageCollection) -> EvaluationReport {
        self.sync(graph);
        let worklist: Vec<StageId> = graph
            .evaluation_order()
            .iter()
            .copied()
            .filter(|id| self.is_dirty(*id))
            .collect();
        let mut report = EvaluationReport::default();
        if worklist.is_empty() {
            return report;
        }
        if self.config.building && !self.warmed {
            self.prewarm(graph);
        }
        let budget = if self.config.building {
            usize::MAX
        } else {
            self.config.batch_size.max(1)
        };
        self.process(graph, &worklist, budget, &mut report);
        report.remaining = self.dirty_count(graph);
        tracing::debug!(
            executed = report.executed.len(),
            deferred = report.deferred.len(),
            failed = report.failed.len(),
            remaining = report.remaining,
            "evaluate"
        );
        report
    }

    /// Executes one stage now, whatever its dirty state.
    pub fn run_single(
        &mut self,
        graph: &StageCollection,
        id: StageId,
        pass: RenderPass,
    ) -> Result<NativeStatus, ExecError> {
        self.sync(graph);
        let status = self.execute(graph, id, pass)?;
        if pass == RenderPass::Main {
            self.finish_stage(graph, id, status);
        }
        Ok(status)
    }

    /// Evaluates `id` and every dirty stage it depends on.
    pub fn run_upstream(&mut self, graph: &StageCollection, id: StageId) -> EvaluationReport {
        self.sync(graph);
        let mut report = EvaluationReport::default();
        let Some(rt) = self.rt_mut(id) else {
            return report;
        };
        rt.dirty |= DirtyFlags::FORCED;
        let list: Vec<StageId> = graph
            .upstream_of(id)
            .into_iter()
            .filter(|s| self.is_dirty(*s))
            .collect();
        self.process(graph, &list, usize::MAX, &mut report);
        report.remaining = self.dirty_count(graph);
        report
    }

    /// Evaluates `id` and everything that depends on it.
    pub fn run_downstream(&mut self, graph: &StageCollection, id: StageId) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        if !graph.contains(id) {
            return report;
        }
        self.set_dirty(graph, id, DirtyFlags::FORCED, false);
        let list: Vec<StageId> = graph
            .downstream_of(id)
            .into_iter()
            .filter(|s| self.is_dirty(*s))
            .collect();
        self.process(graph, &list, usize::MAX, &mut report);
        report.remaining = self.dirty_count(graph);
        report
    }

    /// Baking plan for `graph` with this context's persistent stages.
    pub fn target_plan(&self, graph: &StageCollection) -> TargetPlan {
        TargetPlan::compute(graph, |id| {
            self.rt(id).is_some_and(|r| r.persistent) || graph.consumers(id).is_empty()
        })
    }

    // --- Input and time ---

    /// Routes pointer input to the focused stage. Every other stage sees
    /// [`MouseState::FAR_AWAY`].
    pub fn set_keyboard_mouse(
        &mut self,
        graph: &StageCollection,
        focus: Option<StageId>,
        input: MouseState,
    ) {
        self.sync(graph);
        self.focus = focus;
        let mut redraw = Vec::new();
        for stage in graph.iter() {
            let id = stage.id();
            let focused = focus == Some(id);
            let state = if focused {
                let (x, y) = stage.view.apply(input.x, 1.0 - input.y);
                MouseState { x, y, ..input }
            } else {
                MouseState::FAR_AWAY
            };
            let has_ui = graph
                .info(id)
                .is_some_and(|i| i.flags.contains(NodeFlags::HAS_UI));
            if let Some(rt) = self.rt_mut(id) {
                let changed = rt.mouse != state;
                rt.mouse = state;
                if focused && has_ui && changed {
                    redraw.push(id);
                }
            }
        }
        for id in redraw {
            self.set_dirty(graph, id, DirtyFlags::MOUSE, false);
        }
    }

    /// Moves to global `frame`. Stages whose local time changed are dirtied
    /// with `TIME` and returned.
    pub fn set_time(&mut self, graph: &StageCollection, frame: i32) -> Vec<StageId> {
        self.sync(graph);
        self.frame = frame;
        let mut changed = Vec::new();
        for stage in graph.iter() {
            let local = local_time(stage, frame);
            if let Some(rt) = self.rt_mut(stage.id())
                && rt.local_time != local
            {
                rt.local_time = local;
                changed.push(stage.id());
            }
        }
        for &id in &changed {
            self.set_dirty(graph, id, DirtyFlags::TIME, false);
        }
        changed
    }

    // --- Outputs ---

    /// Texture holding the stage's latest output.
    pub fn evaluation_texture(&self, id: StageId) -> Option<TextureHandle> {
        self.rt(id).and_then(|r| r.target).map(|t| t.handle)
    }

    /// Reads the stage's output back. `Ok(None)` if it has no target.
    pub fn read_pixels(&mut self, id: StageId) -> Result<Option<PixelBuffer>, BackendError> {
        match self.evaluation_texture(id) {
            Some(handle) => self.backend.read_pixels(handle).map(Some),
            None => Ok(None),
        }
    }

    /// Atlas texture and uv rectangle of the stage's thumbnail.
    pub fn thumbnail(&self, id: StageId) -> Option<(TextureHandle, [f32; 4])> {
        let atlas = self.atlas.as_ref()?;
        let handle = self.rt(id)?.thumb?;
        Some((atlas.texture(handle)?, atlas.uv_rect(handle)?))
    }

    /// Targets currently owned by stages.
    pub fn owned_targets(&self) -> usize {
        self.runtime
            .iter()
            .flatten()
            .filter(|r| r.target.is_some())
            .count()
    }

    /// Targets waiting in the free list.
    pub fn free_targets(&self) -> usize {
        self.pool.free_len()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> ContextStats {
        let pool = self.pool.stats();
        ContextStats {
            acquired: pool.acquired,
            released: pool.released,
            created: pool.created,
            destroyed: pool.destroyed,
            executed: self.executed,
            failed: self.failed,
        }
    }

    /// Destroys every target and forgets all stage state.
    pub fn clear(&mut self) {
        for rt in self.runtime.drain(..).flatten() {
            if let Some(target) = rt.target {
                self.pool.destroy(&mut *self.backend, target);
            }
        }
        self.pool.clear(&mut *self.backend);
        if let Some(mut atlas) = self.atlas.take() {
            atlas.destroy(&mut *self.backend);
        }
        self.warmed = false;
    }

    // --- Internal helpers ---

    fn rt(&self, id: StageId) -> Option<&StageRuntime> {
        self.runtime.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn rt_mut(&mut self, id: StageId) -> Option<&mut StageRuntime> {
        self.runtime.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn dirty_count(&self, graph: &StageCollection) -> usize {
        graph.ids().iter().filter(|id| self.is_dirty(**id)).count()
    }

    /// Brings runtime state in line with the graph's live stages.
    fn sync(&mut self, graph: &StageCollection) {
        if self.runtime.len() < graph.id_capacity() {
            self.runtime.resize_with(graph.id_capacity(), || None);
        }
        let mut rewired = false;
        for idx in 0..self.runtime.len() {
            let id = StageId(idx as u32);
            let live = graph.contains(id);
            match (self.runtime[idx].is_some(), live) {
                (false, true) => {
                    let persistent = graph
                        .info(id)
                        .is_some_and(|i| i.flags.contains(NodeFlags::PERSISTENT));
                    self.runtime[idx] =
                        Some(StageRuntime::new(persistent, graph.effective_inputs(id)));
                    rewired = true;
                }
                (true, false) => {
                    if let Some(rt) = self.runtime[idx].take() {
                        if let Some(target) = rt.target {
                            self.pool.release(target);
                        }
                        if let (Some(atlas), Some(thumb)) = (self.atlas.as_mut(), rt.thumb) {
                            atlas.del_thumb(thumb);
                        }
                        tracing::trace!(stage = %id, "runtime dropped");
                    }
                    rewired = true;
                }
                (true, true) => {
                    let inputs = graph.effective_inputs(id);
                    if let Some(rt) = self.runtime[idx].as_mut()
                        && rt.inputs != inputs
                    {
                        rt.inputs = inputs;
                        rt.mark(DirtyFlags::INPUT);
                        rewired = true;
                    }
                }
                (false, false) => {}
            }
        }
        if rewired {
            self.propagate(graph);
        }
    }

    /// One forward pass: any stage with an unresolved input becomes dirty.
    fn propagate(&mut self, graph: &StageCollection) {
        for &id in graph.evaluation_order() {
            if self.has_unresolved_input(graph, id)
                && let Some(rt) = self.rt_mut(id)
            {
                rt.mark(DirtyFlags::INPUT);
            }
        }
    }

    fn has_unresolved_input(&self, graph: &StageCollection, id: StageId) -> bool {
        graph
            .effective_inputs(id)
            .iter()
            .flatten()
            .any(|i| self.rt(*i).is_some_and(StageRuntime::is_unresolved))
    }

    fn prewarm(&mut self, graph: &StageCollection) {
        self.warmed = true;
        let plan = self.target_plan(graph);
        let desc = self.default_desc();
        match self.pool.prewarm(&mut *self.backend, &desc, plan.slot_count()) {
            Ok(()) => tracing::debug!(slots = plan.slot_count(), "target pool pre-warmed"),
            Err(err) => tracing::warn!(%err, "pre-warming target pool failed"),
        }
    }

    fn default_desc(&self) -> TargetDesc {
        TargetDesc::new(self.config.default_width, self.config.default_height)
            .with_format(self.config.format)
    }

    fn process(
        &mut self,
        graph: &StageCollection,
        list: &[StageId],
        budget: usize,
        report: &mut EvaluationReport,
    ) {
        self.recompute_use_counts(graph, list);
        let mut ran = 0;
        for &id in list {
            if ran >= budget {
                break;
            }
            if self.has_unresolved_input(graph, id) {
                if let Some(rt) = self.rt_mut(id) {
                    rt.processing = true;
                }
                tracing::trace!(stage = %id, "deferred");
                report.deferred.push(id);
                continue;
            }
            ran += 1;
            if let Some(rt) = self.rt_mut(id) {
                rt.processing = false;
            }
            match self.execute(graph, id, RenderPass::Main) {
                Ok(NativeStatus::Done) => {
                    self.finish_stage(graph, id, NativeStatus::Done);
                    report.executed.push(id);
                }
                Ok(status @ NativeStatus::Pending { .. }) => {
                    self.finish_stage(graph, id, status);
                    report.pending.push(id);
                }
                Err(err) => {
                    self.failed += 1;
                    if let Some(rt) = self.rt_mut(id) {
                        rt.failed = true;
                        rt.processing = false;
                        rt.progress = 0.0;
                    }
                    tracing::warn!(stage = %id, %err, "stage execution failed");
                    report.failed.push(id);
                }
            }
        }
    }

    fn finish_stage(&mut self, graph: &StageCollection, id: StageId, status: NativeStatus) {
        match status {
            NativeStatus::Done => {
                let recovered = self.rt_mut(id).is_some_and(|rt| {
                    rt.dirty = DirtyFlags::NONE;
                    rt.processing = false;
                    rt.progress = 0.0;
                    std::mem::take(&mut rt.failed)
                });
                if recovered {
                    // Consumers ran on the stale target while this stage was failing.
                    for consumer in graph.consumers(id) {
                        if let Some(rt) = self.rt_mut(consumer) {
                            rt.mark(DirtyFlags::INPUT);
                        }
                    }
                    self.propagate(graph);
                    tracing::debug!(stage = %id, "stage recovered");
                }
                self.executed += 1;
                self.release_inputs(graph, id);
                self.update_thumbnail(graph, id);
            }
            NativeStatus::Pending { progress } => {
                if let Some(rt) = self.rt_mut(id) {
                    rt.processing = true;
                    rt.failed = false;
                    rt.progress = progress.clamp(0.0, 1.0);
                }
            }
        }
    }

    fn recompute_use_counts(&mut self, graph: &StageCollection, list: &[StageId]) {
        for rt in self.runtime.iter_mut().flatten() {
            rt.use_count = 0;
        }
        for &consumer in list {
            for input in graph.effective_inputs(consumer).iter().flatten() {
                if let Some(rt) = self.rt_mut(*input) {
                    rt.use_count += 1;
                }
            }
        }
    }

    fn release_inputs(&mut self, graph: &StageCollection, id: StageId) {
        let building = self.config.building;
        for input in graph.effective_inputs(id).iter().flatten() {
            let Some(rt) = self.runtime.get_mut(input.0 as usize).and_then(Option::as_mut) else {
                continue;
            };
            rt.use_count = rt.use_count.saturating_sub(1);
            if building
                && rt.use_count == 0
                && !rt.persistent
                && let Some(target) = rt.target.take()
            {
                self.pool.release(target);
            }
        }
    }

    fn update_thumbnail(&mut self, graph: &StageCollection, id: StageId) {
        let wants = self.config.thumbnails
            && graph
                .info(id)
                .is_some_and(|i| i.flags.contains(NodeFlags::THUMBNAIL));
        let Some(source) = self.evaluation_texture(id).filter(|_| wants) else {
            return;
        };
        let (atlas_size, thumb_size) = (self.config.atlas_size, self.config.thumb_size);
        let atlas = self
            .atlas
            .get_or_insert_with(|| ThumbnailAtlas::new(atlas_size, thumb_size));
        let Some(rt) = self.runtime.get_mut(id.0 as usize).and_then(Option::as_mut) else {
            return;
        };
        let thumb = match rt.thumb {
            Some(thumb) => thumb,
            None => match atlas.add_thumb(&mut *self.backend) {
                Ok(thumb) => {
                    rt.thumb = Some(thumb);
                    thumb
                }
                Err(err) => {
                    tracing::warn!(stage = %id, %err, "no thumbnail slot");
                    return;
                }
            },
        };
        if let Err(err) = atlas.blit_into(&mut *self.backend, thumb, source) {
            tracing::warn!(stage = %id, %err, "thumbnail blit failed");
        }
    }

    fn target_desc(
        &self,
        info: &NodeTypeInfo,
        stage: &Stage,
        inputs: &[Option<RenderTarget>; MAX_INPUTS],
    ) -> TargetDesc {
        let default = (self.config.default_width, self.config.default_height);
        let (width, height) = match info.size {
            SizePolicy::Default => default,
            SizePolicy::MatchInput(slot) => inputs
                .get(slot)
                .copied()
                .flatten()
                .map_or(default, |t| (t.desc.width, t.desc.height)),
            SizePolicy::Fixed(w, h) => (w, h),
        };
        TargetDesc::new(width, height)
            .with_format(self.config.format)
            .with_cubemap(info.output_kind() == Some(SlotKind::Cubemap))
            .with_depth(stage.depth_buffer)
    }

    /// Acquires the new target before releasing the old one, so a failed
    /// allocation leaves the stage with its previous output.
    fn ensure_target(&mut self, id: StageId, desc: TargetDesc) -> Result<RenderTarget, ExecError> {
        let current = self.rt(id).and_then(|r| r.target);
        if let Some(target) = current
            && target.desc == desc
        {
            return Ok(target);
        }
        let fresh = self.pool.acquire(&mut *self.backend, &desc)?;
        if let Some(old) = current {
            self.pool.release(old);
        }
        if let Some(rt) = self.rt_mut(id) {
            rt.target = Some(fresh);
        }
        Ok(fresh)
    }

    fn execute(
        &mut self,
        graph: &StageCollection,
        id: StageId,
        pass: RenderPass,
    ) -> Result<NativeStatus, ExecError> {
        let (Some(stage), Some(info), Some(rt)) = (graph.stage(id), graph.info(id), self.rt(id))
        else {
            return Err(ExecError::StageNotFound(id));
        };
        if info.executors.is_empty() {
            return Err(ExecError::NoExecutor(info.name.clone()));
        }
        let (dirty, local_time, mouse, progress) = (rt.dirty, rt.local_time, rt.mouse, rt.progress);

        let sources = graph.effective_inputs(id);
        let input_targets = sources.map(|s| s.and_then(|s| self.rt(s)).and_then(|r| r.target));
        let desc = self.target_desc(info, stage, &input_targets);
        let target = self.ensure_target(id, desc)?;

        let eval_info = EvaluationInfo {
            stage: id,
            frame: self.frame,
            local_time,
            mouse,
            pass,
            dirty,
            target_size: (desc.width, desc.height),
        };
        let params = stage.params.view(&info.params);
        let handles = input_targets.map(|t| t.map(|t| t.handle));
        tracing::trace!(stage = %id, node = %info.name, ?pass, "execute");

        if let Some(native) = info.executors.native {
            let mut call = NativeCall {
                stage: id,
                info: &eval_info,
                params,
                inputs: handles,
                target: target.handle,
                target_desc: desc,
                backend: &mut *self.backend,
                decoder: stage.decoder.as_ref(),
                progress,
            };
            let status = native(&mut call)?;
            if matches!(status, NativeStatus::Pending { .. }) {
                return Ok(status);
            }
        }

        if let Some(program) = &info.executors.shader {
            let mut bound = [None; MAX_INPUTS];
            for (slot, target) in input_targets.iter().enumerate() {
                bound[slot] = target.map(|t| BoundInput {
                    texture: t.handle,
                    sampler: stage.samplers[slot],
                });
            }
            self.backend.draw(&DrawCall {
                program,
                params,
                inputs: bound,
                target: target.handle,
                blend: stage.blend,
                clear: stage.clear_buffer,
                info: &eval_info,
            })?;
        }

        if let Some(handle) = info.executors.script {
            let Some(host) = self.script_host.as_mut() else {
                return Err(ExecError::NoScriptHost(handle.0));
            };
            let mut call = NativeCall {
                stage: id,
                info: &eval_info,
                params,
                inputs: handles,
                target: target.handle,
                target_desc: desc,
                backend: &mut *self.backend,
                decoder: stage.decoder.as_ref(),
                progress,
            };
            return host.run(handle, &mut call);
        }

        Ok(NativeStatus::Done)
    }
}

impl Drop for EvaluationContext {
    fn drop(&mut self) {
        self.clear();
    }
}

/// `clamp(frame - start, 0, end - start)`, capped by the decoder's length.
fn local_time(stage: &Stage, frame: i32) -> i32 {
    let start = i64::from(stage.start_frame);
    let span = (i64::from(stage.end_frame) - start).max(0);
    let mut local = (i64::from(frame) - start).clamp(0, span);
    if let Some(decoder) = &stage.decoder {
        let count = i64::from(decoder.lock().frame_count());
        local = local.min((count - 1).max(0));
    }
    i32::try_from(local).unwrap_or(i32::MAX)
}
