//! Stage collection: the editable graph model.
//!
//! [`StageCollection`] owns every [`Stage`], their input connections, the
//! multiplex overrides, and the animation tracks. It validates structural
//! edits, keeps the graph acyclic, and maintains the evaluation order used by
//! every [`EvaluationContext`](crate::context::EvaluationContext).
//!
//! # Identity
//!
//! Stages live in an arena indexed by [`StageId`]. Ids are never reused, so
//! connections, tracks and external references stay valid across deletion
//! and undo. The *index* of a stage is its rank among live stages in
//! insertion order; [`index_of`](StageCollection::index_of) and
//! [`id_at`](StageCollection::id_at) convert between the two in O(1).
//!
//! # Evaluation order
//!
//! Each stage gets a priority of `1 + max(priority of its inputs)`, with
//! unconnected stages at 0. Priorities are relaxed until stable (bounded by
//! the stage count, so a transient cycle cannot hang the editor), then stages
//! are stably sorted by priority with ties kept in insertion order.
//!
//! # Multiplexed inputs
//!
//! A slot declared multiplexed resolves to one of several eligible upstream
//! stages. The explicit override is stored apart from the raw connection; the
//! effective input is the override, else the raw connection, else the first
//! eligible candidate.
//!
//! # Example
//!
//! ```rust,ignore
//! use tessel_core::graph::StageCollection;
//!
//! let mut graph = StageCollection::new(catalog);
//! let noise = graph.add_stage(noise_type)?;
//! let blur = graph.add_stage(blur_type)?;
//! graph.connect(blur, 0, noise)?;
//! assert_eq!(graph.evaluation_order(), &[noise, blur]);
//! ```

use std::ops::Range;
use std::sync::Arc;

use crate::animation::AnimTrack;
use crate::catalog::{NodeCatalog, NodeTypeId, NodeTypeInfo};
use crate::error::GraphError;
use crate::param::{ParamError, ParamValue, ParameterBlock};
use crate::stage::{MAX_INPUTS, Stage, StageId};

type Slots = [Option<StageId>; MAX_INPUTS];

/// A stage removed by [`StageCollection::remove_stage`], with everything
/// needed to put it back.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedStage {
    /// The stage as it was, raw connections included.
    pub stage: Stage,
    /// Consumer slots that pointed at the stage: `(consumer, slot, bridged_to)`.
    pub consumers: Vec<(StageId, usize, Option<StageId>)>,
    /// Multiplex overrides that pointed at the stage.
    pub overrides: Vec<(StageId, usize)>,
    /// Tracks animating the stage.
    pub tracks: Vec<AnimTrack>,
}

/// The set of stages, their wiring and their evaluation order.
#[derive(Debug, Clone)]
pub struct StageCollection {
    catalog: Arc<NodeCatalog>,
    stages: Vec<Option<Stage>>,
    /// id -> rank among live stages.
    index: Vec<Option<u32>>,
    /// Live ids in insertion order.
    live: Vec<StageId>,
    /// Effective inputs per id, multiplex resolution applied.
    resolved: Vec<Slots>,
    order: Vec<StageId>,
    tracks: Vec<AnimTrack>,
    next_id: u32,
    revision: u64,
}

impl PartialEq for StageCollection {
    fn eq(&self, other: &Self) -> bool {
        self.stages == other.stages
            && self.order == other.order
            && self.tracks == other.tracks
            && self.next_id == other.next_id
    }
}

impl StageCollection {
    /// Creates an empty collection over `catalog`.
    pub fn new(catalog: Arc<NodeCatalog>) -> Self {
        Self {
            catalog,
            stages: Vec::new(),
            index: Vec::new(),
            live: Vec::new(),
            resolved: Vec::new(),
            order: Vec::new(),
            tracks: Vec::new(),
            next_id: 0,
            revision: 0,
        }
    }

    /// Catalog the collection was created with.
    pub fn catalog(&self) -> &Arc<NodeCatalog> {
        &self.catalog
    }

    // --- Stage mutations ---

    /// Appends a stage of `node_type` with default parameters.
    pub fn add_stage(&mut self, node_type: NodeTypeId) -> Result<StageId, GraphError> {
        let info = self
            .catalog
            .get(node_type)
            .ok_or(GraphError::UnknownNodeType(node_type.0))?;
        let id = StageId(self.next_id);
        self.next_id += 1;
        let stage = Stage::new(id, node_type, ParameterBlock::from_schema(&info.params));
        tracing::debug!(stage = %id, node = %info.name, "add_stage");
        self.insert_stage(stage);
        self.topology_changed();
        Ok(id)
    }

    /// Removes a stage. Returns `None` (and does nothing) for unknown ids.
    ///
    /// Consumers of the removed stage are rewired to its slot 0 input when
    /// that input can feed them, otherwise their slot is cleared.
    pub fn delete_stage(&mut self, id: StageId) -> Option<Stage> {
        self.remove_stage(id).map(|r| r.stage)
    }

    /// Removes a stage and returns a full record for undo.
    pub fn remove_stage(&mut self, id: StageId) -> Option<RemovedStage> {
        let stage = self.stage(id)?.clone();
        let bridge = stage.input(0);
        let source_kind = bridge
            .and_then(|b| self.info(b))
            .and_then(NodeTypeInfo::output_kind);

        let mut consumers = Vec::new();
        let mut overrides = Vec::new();
        let live = self.live.clone();
        for &other in &live {
            if other == id {
                continue;
            }
            let Some(node_type) = self.stage(other).map(Stage::node_type) else {
                continue;
            };
            let slot_kinds: Vec<_> = self
                .catalog
                .get(node_type)
                .map(|i| i.inputs.iter().map(|s| s.kind).collect())
                .unwrap_or_default();
            for slot in 0..MAX_INPUTS {
                let Some(consumer) = self.stage_slot_mut(other) else {
                    break;
                };
                if consumer.inputs[slot] == Some(id) {
                    let accepts = match (slot_kinds.get(slot), source_kind) {
                        (Some(kind), Some(out)) => kind.accepts(out),
                        _ => false,
                    };
                    let bridged = bridge.filter(|_| accepts);
                    consumer.inputs[slot] = bridged;
                    consumers.push((other, slot, bridged));
                }
                if consumer.multiplex[slot] == Some(id) {
                    consumer.multiplex[slot] = None;
                    overrides.push((other, slot));
                }
            }
        }
        for &(_, _, bridged) in &consumers {
            if let Some(b) = bridged {
                self.adjust_use(b, 1);
            }
        }
        for source in stage.inputs.iter().flatten() {
            self.adjust_use(*source, -1);
        }

        let (tracks, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.tracks).into_iter().partition(|t| t.stage == id);
        self.tracks = kept;

        self.stages[id.0 as usize] = None;
        self.live.retain(|s| *s != id);
        self.rebuild_index();
        self.topology_changed();
        tracing::debug!(stage = %id, rewired = consumers.len(), "delete_stage");

        Some(RemovedStage {
            stage,
            consumers,
            overrides,
            tracks,
        })
    }

    /// Puts back a stage removed by [`remove_stage`](Self::remove_stage).
    pub fn restore_stage(&mut self, removed: RemovedStage) {
        let id = removed.stage.id;
        for source in removed.stage.inputs.iter().flatten() {
            self.adjust_use(*source, 1);
        }
        self.next_id = self.next_id.max(id.0 + 1);
        self.insert_stage(removed.stage);
        for (consumer, slot, bridged) in removed.consumers {
            if let Some(b) = bridged {
                self.adjust_use(b, -1);
            }
            if let Some(s) = self.stage_slot_mut(consumer) {
                s.inputs[slot] = Some(id);
            }
        }
        self.adjust_use_count_of(id);
        for (consumer, slot) in removed.overrides {
            if let Some(s) = self.stage_slot_mut(consumer) {
                s.multiplex[slot] = Some(id);
            }
        }
        self.tracks.extend(removed.tracks);
        self.tracks.sort_by_key(|t| (t.stage, t.param_index));
        self.topology_changed();
        tracing::debug!(stage = %id, "restore_stage");
    }

    // --- Connections ---

    /// Connects `source`'s output into `slot` of `target`.
    ///
    /// Rejected edits leave the collection unchanged.
    pub fn connect(
        &mut self,
        target: StageId,
        slot: usize,
        source: StageId,
    ) -> Result<(), GraphError> {
        self.validate_connection(target, slot, source)?;
        let previous = self.stage(target).and_then(|s| s.input(slot));
        if previous == Some(source) {
            return Ok(());
        }
        if let Some(prev) = previous {
            self.adjust_use(prev, -1);
        }
        if let Some(stage) = self.stage_slot_mut(target) {
            stage.inputs[slot] = Some(source);
        }
        self.adjust_use(source, 1);
        self.topology_changed();
        tracing::debug!("connect: {source} -> {target}[{slot}]");
        Ok(())
    }

    /// Clears `slot` of `target`, returning the previous source.
    pub fn disconnect(&mut self, target: StageId, slot: usize) -> Option<StageId> {
        if slot >= MAX_INPUTS {
            return None;
        }
        let previous = self.stage_slot_mut(target)?.inputs[slot].take()?;
        self.adjust_use(previous, -1);
        self.topology_changed();
        tracing::debug!("disconnect: {previous} -x- {target}[{slot}]");
        Some(previous)
    }

    /// Checks a connection without applying it.
    pub fn validate_connection(
        &self,
        target: StageId,
        slot: usize,
        source: StageId,
    ) -> Result<(), GraphError> {
        let target_info = self.info(target).ok_or(GraphError::StageNotFound(target))?;
        let source_info = self.info(source).ok_or(GraphError::StageNotFound(source))?;
        let Some(slot_info) = target_info.inputs.get(slot) else {
            return Err(GraphError::SlotOutOfRange {
                stage: target,
                slot,
            });
        };
        if source == target {
            return Err(GraphError::SelfConnection(target));
        }
        let compatible = source_info
            .output_kind()
            .is_some_and(|kind| slot_info.kind.accepts(kind));
        if !compatible {
            return Err(GraphError::IncompatibleSlot {
                source_stage: source,
                target,
                slot,
            });
        }
        if self.depends_on_explicit(source, target) {
            return Err(GraphError::CycleDetected {
                source_stage: source,
                target,
            });
        }
        Ok(())
    }

    // --- Multiplex resolution ---

    /// Every stage that could currently feed `slot` of `target`.
    pub fn multiplex_candidates(
        &self,
        target: StageId,
        slot: usize,
    ) -> Result<Vec<StageId>, GraphError> {
        let info = self.info(target).ok_or(GraphError::StageNotFound(target))?;
        let slot_info = info.inputs.get(slot).ok_or(GraphError::SlotOutOfRange {
            stage: target,
            slot,
        })?;
        Ok(self
            .live
            .iter()
            .copied()
            .filter(|&c| c != target)
            .filter(|&c| {
                self.info(c)
                    .and_then(NodeTypeInfo::output_kind)
                    .is_some_and(|k| slot_info.kind.accepts(k))
            })
            .filter(|&c| !self.depends_on_explicit(c, target))
            .collect())
    }

    /// Selects the active input of a multiplexed slot. `None` clears the
    /// override. Returns the previous override.
    pub fn set_multiplex(
        &mut self,
        target: StageId,
        slot: usize,
        selection: Option<StageId>,
    ) -> Result<Option<StageId>, GraphError> {
        let candidates = self.multiplex_candidates(target, slot)?;
        let multiplexed = self
            .info(target)
            .and_then(|i| i.inputs.get(slot))
            .is_some_and(|s| s.multiplexed);
        if let Some(candidate) = selection
            && (!multiplexed || !candidates.contains(&candidate))
        {
            return Err(GraphError::InvalidMultiplex {
                target,
                slot,
                candidate,
            });
        }
        let stage = self
            .stage_slot_mut(target)
            .ok_or(GraphError::StageNotFound(target))?;
        let previous = std::mem::replace(&mut stage.multiplex[slot], selection);
        self.topology_changed();
        Ok(previous)
    }

    /// Input actually read by `target` in `slot`.
    pub fn effective_input(&self, target: StageId, slot: usize) -> Option<StageId> {
        self.resolved
            .get(target.0 as usize)
            .and_then(|s| s.get(slot).copied().flatten())
    }

    /// All effective inputs of `target`.
    pub fn effective_inputs(&self, target: StageId) -> Slots {
        self.resolved
            .get(target.0 as usize)
            .copied()
            .unwrap_or([None; MAX_INPUTS])
    }

    /// Stages reading `id` through an effective input, in evaluation order.
    pub fn consumers(&self, id: StageId) -> Vec<StageId> {
        self.order
            .iter()
            .copied()
            .filter(|&c| self.effective_inputs(c).contains(&Some(id)))
            .collect()
    }

    // --- Order ---

    /// Current evaluation order.
    pub fn evaluation_order(&self) -> &[StageId] {
        &self.order
    }

    /// Recomputes and returns the evaluation order.
    pub fn compute_evaluation_order(&mut self) -> &[StageId] {
        let mut priority = vec![0u32; self.stages.len()];
        for _ in 0..=self.live.len() {
            let mut changed = false;
            for &id in &self.live {
                let p = self.resolved[id.0 as usize]
                    .iter()
                    .flatten()
                    .filter(|s| self.contains(**s))
                    .map(|s| priority[s.0 as usize] + 1)
                    .max()
                    .unwrap_or(0);
                if p != priority[id.0 as usize] {
                    priority[id.0 as usize] = p;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        let mut order = self.live.clone();
        order.sort_by_key(|id| priority[id.0 as usize]);
        self.order = order;
        &self.order
    }

    /// Transitive inputs of `id` followed by `id` itself, in evaluation order.
    pub fn upstream_of(&self, id: StageId) -> Vec<StageId> {
        let mut wanted = vec![false; self.stages.len()];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let i = current.0 as usize;
            if i >= wanted.len() || wanted[i] || !self.contains(current) {
                continue;
            }
            wanted[i] = true;
            stack.extend(self.effective_inputs(current).iter().flatten());
        }
        self.order
            .iter()
            .copied()
            .filter(|s| wanted[s.0 as usize])
            .collect()
    }

    /// `id` followed by every stage that transitively reads it, in evaluation order.
    pub fn downstream_of(&self, id: StageId) -> Vec<StageId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut reached = vec![false; self.stages.len()];
        reached[id.0 as usize] = true;
        let mut out = Vec::new();
        for &s in &self.order {
            let feeds = self
                .effective_inputs(s)
                .iter()
                .flatten()
                .any(|i| reached[i.0 as usize]);
            if s == id || feeds {
                reached[s.0 as usize] = true;
                out.push(s);
            }
        }
        out
    }

    // --- Parameters, time, animation ---

    /// Reads parameter `index` of `id`.
    pub fn param(&self, id: StageId, index: usize) -> Result<ParamValue, GraphError> {
        let stage = self.stage(id).ok_or(GraphError::StageNotFound(id))?;
        let info = self.info(id).ok_or(GraphError::StageNotFound(id))?;
        Ok(stage.params.get(&info.params, index)?)
    }

    /// Writes parameter `index` of `id`, returning the previous value.
    pub fn set_param(
        &mut self,
        id: StageId,
        index: usize,
        value: &ParamValue,
    ) -> Result<ParamValue, GraphError> {
        let catalog = Arc::clone(&self.catalog);
        let stage = self.stage_slot_mut(id).ok_or(GraphError::StageNotFound(id))?;
        let info = catalog
            .get(stage.node_type)
            .ok_or(GraphError::UnknownNodeType(stage.node_type.0))?;
        let previous = stage.params.get(&info.params, index)?;
        stage.params.set(&info.params, index, value)?;
        Ok(previous)
    }

    /// Writes the parameter called `name`, returning its index.
    pub fn set_param_by_name(
        &mut self,
        id: StageId,
        name: &str,
        value: &ParamValue,
    ) -> Result<usize, GraphError> {
        let index = self
            .info(id)
            .ok_or(GraphError::StageNotFound(id))?
            .params
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| ParamError::UnknownName(name.to_string()))?;
        self.set_param(id, index, value)?;
        Ok(index)
    }

    /// Replaces the whole parameter block, returning the previous one.
    pub fn set_params(
        &mut self,
        id: StageId,
        block: ParameterBlock,
    ) -> Result<ParameterBlock, GraphError> {
        let expected = self
            .info(id)
            .map(|i| crate::param::layout_size(&i.params))
            .ok_or(GraphError::StageNotFound(id))?;
        if block.len() != expected {
            return Err(ParamError::SizeMismatch {
                expected,
                actual: block.len(),
            }
            .into());
        }
        let stage = self.stage_slot_mut(id).ok_or(GraphError::StageNotFound(id))?;
        Ok(std::mem::replace(&mut stage.params, block))
    }

    /// Sets the active window `[start, end)` of `id`, returning the previous one.
    pub fn set_time_window(
        &mut self,
        id: StageId,
        start: i32,
        end: i32,
    ) -> Result<(i32, i32), GraphError> {
        let stage = self.stage_slot_mut(id).ok_or(GraphError::StageNotFound(id))?;
        let previous = (stage.start_frame, stage.end_frame);
        stage.start_frame = start;
        stage.end_frame = end.max(start);
        Ok(previous)
    }

    /// `[min(start_frame), max(end_frame))` over all stages.
    pub fn frame_range(&self) -> Option<Range<i32>> {
        let start = self.iter().map(|s| s.start_frame).min()?;
        let end = self.iter().map(|s| s.end_frame).max()?;
        Some(start..end)
    }

    /// All animation tracks, sorted by stage then parameter.
    pub fn tracks(&self) -> &[AnimTrack] {
        &self.tracks
    }

    /// Track animating parameter `param_index` of `id`.
    pub fn track(&self, id: StageId, param_index: usize) -> Option<&AnimTrack> {
        self.tracks
            .iter()
            .find(|t| t.stage == id && t.param_index == param_index)
    }

    /// Track for the parameter, created empty if missing. Fails for
    /// parameters whose type cannot be animated.
    pub fn track_mut(
        &mut self,
        id: StageId,
        param_index: usize,
    ) -> Result<&mut AnimTrack, GraphError> {
        let info = self.info(id).ok_or(GraphError::StageNotFound(id))?;
        let desc = info
            .params
            .get(param_index)
            .ok_or(ParamError::IndexOutOfRange(param_index))?;
        if !desc.ty.is_animatable() {
            return Err(ParamError::TypeMismatch {
                index: param_index,
                expected: desc.ty,
            }
            .into());
        }
        let ty = desc.ty;
        let pos = match self
            .tracks
            .iter()
            .position(|t| t.stage == id && t.param_index == param_index)
        {
            Some(pos) => pos,
            None => {
                let pos = self
                    .tracks
                    .partition_point(|t| (t.stage, t.param_index) < (id, param_index));
                self.tracks.insert(pos, AnimTrack::new(id, param_index, ty));
                pos
            }
        };
        Ok(&mut self.tracks[pos])
    }

    /// Removes a track.
    pub fn remove_track(&mut self, id: StageId, param_index: usize) -> Option<AnimTrack> {
        let pos = self
            .tracks
            .iter()
            .position(|t| t.stage == id && t.param_index == param_index)?;
        Some(self.tracks.remove(pos))
    }

    /// Replaces or inserts a whole track.
    pub fn put_track(&mut self, track: AnimTrack) -> Option<AnimTrack> {
        let previous = self.remove_track(track.stage, track.param_index);
        let key = (track.stage, track.param_index);
        let pos = self
            .tracks
            .partition_point(|t| (t.stage, t.param_index) < key);
        self.tracks.insert(pos, track);
        previous
    }

    /// Samples every track at `frame` into the parameter blocks. Returns the
    /// stages whose parameters changed.
    pub fn apply_animation(&mut self, frame: i32) -> Vec<StageId> {
        let samples: Vec<(StageId, usize, ParamValue)> = self
            .tracks
            .iter()
            .filter_map(|t| Some((t.stage, t.param_index, t.value_at(frame)?)))
            .collect();
        let mut changed = Vec::new();
        for (id, index, value) in samples {
            match self.set_param(id, index, &value) {
                Ok(previous) if previous != value => {
                    if !changed.contains(&id) {
                        changed.push(id);
                    }
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(stage = %id, index, %err, "animation sample rejected"),
            }
        }
        changed
    }

    // --- Accessors ---

    /// Looks up a stage.
    pub fn stage(&self, id: StageId) -> Option<&Stage> {
        self.stages.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Mutable access to sampling, blend, window and pin fields.
    ///
    /// Connections are not reachable through this; use
    /// [`connect`](Self::connect) and [`disconnect`](Self::disconnect).
    pub fn stage_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stage_slot_mut(id)
    }

    /// Node type information of a stage.
    pub fn info(&self, id: StageId) -> Option<&NodeTypeInfo> {
        self.stage(id).and_then(|s| self.catalog.get(s.node_type))
    }

    /// Returns `true` if `id` names a live stage.
    pub fn contains(&self, id: StageId) -> bool {
        self.stage(id).is_some()
    }

    /// Live stages in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.live.iter().filter_map(|id| self.stage(*id))
    }

    /// Live ids in insertion order.
    pub fn ids(&self) -> &[StageId] {
        &self.live
    }

    /// Number of live stages.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if there are no stages.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Rank of `id` among live stages.
    pub fn index_of(&self, id: StageId) -> Option<usize> {
        self.index.get(id.0 as usize).copied().flatten().map(|i| i as usize)
    }

    /// Id of the stage at rank `index`.
    pub fn id_at(&self, index: usize) -> Option<StageId> {
        self.live.get(index).copied()
    }

    /// Raw input of the stage at rank `index`, as a rank.
    pub fn input_index(&self, index: usize, slot: usize) -> Option<usize> {
        let id = self.id_at(index)?;
        self.stage(id)?.input(slot).and_then(|s| self.index_of(s))
    }

    /// Counter bumped on every topology change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Upper bound of ids handed out so far.
    pub fn id_capacity(&self) -> usize {
        self.stages.len()
    }

    // --- Internal helpers ---

    fn stage_slot_mut(&mut self, id: StageId) -> Option<&mut Stage> {
        self.stages.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn insert_stage(&mut self, stage: Stage) {
        let idx = stage.id.0 as usize;
        if idx >= self.stages.len() {
            self.stages.resize_with(idx + 1, || None);
        }
        let id = stage.id;
        self.stages[idx] = Some(stage);
        let pos = self.live.partition_point(|s| *s < id);
        self.live.insert(pos, id);
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.index = vec![None; self.stages.len()];
        for (rank, id) in self.live.iter().enumerate() {
            self.index[id.0 as usize] = Some(rank as u32);
        }
    }

    fn adjust_use(&mut self, id: StageId, delta: i32) {
        if let Some(stage) = self.stage_slot_mut(id) {
            stage.used_by_others = stage.used_by_others.saturating_add_signed(delta);
        }
    }

    /// Recounts raw connections into `id`.
    fn adjust_use_count_of(&mut self, id: StageId) {
        let count = self
            .iter()
            .flat_map(|s| s.inputs.iter())
            .filter(|i| **i == Some(id))
            .count() as u32;
        if let Some(stage) = self.stage_slot_mut(id) {
            stage.used_by_others = count;
        }
    }

    fn topology_changed(&mut self) {
        self.resolve_inputs();
        self.compute_evaluation_order();
        self.revision += 1;
    }

    /// Raw connections and overrides of `id`. A superset of the effective
    /// inputs, so an acyclic explicit graph stays acyclic whatever an
    /// override is set or cleared to.
    fn explicit_sources(&self, id: StageId) -> impl Iterator<Item = StageId> + '_ {
        self.stage(id)
            .into_iter()
            .flat_map(|s| s.inputs.iter().chain(s.multiplex.iter()))
            .flatten()
            .copied()
    }

    /// DFS over explicit edges: does `stage` transitively read `ancestor`?
    fn depends_on_explicit(&self, stage: StageId, ancestor: StageId) -> bool {
        let mut visited = vec![false; self.stages.len()];
        let mut stack = vec![stage];
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            let idx = current.0 as usize;
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            stack.extend(self.explicit_sources(current));
        }
        false
    }

    fn depends_on_resolved(&self, resolved: &[Slots], stage: StageId, ancestor: StageId) -> bool {
        let mut visited = vec![false; resolved.len()];
        let mut stack = vec![stage];
        while let Some(current) = stack.pop() {
            if current == ancestor {
                return true;
            }
            let idx = current.0 as usize;
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            stack.extend(resolved[idx].iter().flatten());
        }
        false
    }

    fn resolve_inputs(&mut self) {
        let mut resolved = vec![[None; MAX_INPUTS]; self.stages.len()];
        for stage in self.iter() {
            let slots = &mut resolved[stage.id.0 as usize];
            for slot in 0..MAX_INPUTS {
                slots[slot] = stage.multiplex[slot].or(stage.inputs[slot]);
            }
        }
        for &id in &self.live {
            let Some(info) = self.info(id) else { continue };
            for (slot, slot_info) in info.inputs.iter().enumerate() {
                if !slot_info.multiplexed || resolved[id.0 as usize][slot].is_some() {
                    continue;
                }
                let pick = self.live.iter().copied().find(|&c| {
                    c != id
                        && self
                            .info(c)
                            .and_then(NodeTypeInfo::output_kind)
                            .is_some_and(|k| slot_info.kind.accepts(k))
                        && !self.depends_on_resolved(&resolved, c, id)
                });
                resolved[id.0 as usize][slot] = pick;
            }
        }
        self.resolved = resolved;
    }
}
