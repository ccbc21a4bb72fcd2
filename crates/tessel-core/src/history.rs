//! Undo/redo as explicit edit commands.
//!
//! Every mutation an editor performs can be expressed as an [`Edit`].
//! [`StageCollection::apply`] executes one and records its inverse in a
//! [`Transaction`]; [`History`] replays those inverses to undo and records
//! their inverses in turn to redo. Because stage ids are never reused, a
//! stage removed and restored by undo comes back under its original id and
//! every other reference to it stays valid.

use crate::animation::AnimTrack;
use crate::catalog::NodeTypeId;
use crate::error::GraphError;
use crate::graph::{RemovedStage, StageCollection};
use crate::param::{ParamValue, ParameterBlock};
use crate::stage::{BlendState, MAX_INPUTS, Sampler, StageId};

/// One reversible mutation of a [`StageCollection`].
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Add a stage with default parameters.
    AddStage(NodeTypeId),
    /// Remove a stage.
    RemoveStage(StageId),
    /// Put back a removed stage under its original id.
    RestoreStage(Box<RemovedStage>),
    /// Connect `source` into `slot` of `target`.
    Connect {
        /// Consumer.
        target: StageId,
        /// Input slot.
        slot: usize,
        /// Producer.
        source: StageId,
    },
    /// Clear `slot` of `target`.
    Disconnect {
        /// Consumer.
        target: StageId,
        /// Input slot.
        slot: usize,
    },
    /// Select or clear a multiplex override.
    SetMultiplex {
        /// Consumer.
        target: StageId,
        /// Input slot.
        slot: usize,
        /// New override.
        selection: Option<StageId>,
    },
    /// Write one parameter.
    SetParam {
        /// Stage.
        stage: StageId,
        /// Parameter index.
        index: usize,
        /// New value.
        value: ParamValue,
    },
    /// Replace the whole parameter block.
    SetParams {
        /// Stage.
        stage: StageId,
        /// New block.
        block: ParameterBlock,
    },
    /// Replace the per-slot samplers.
    SetSamplers {
        /// Stage.
        stage: StageId,
        /// New samplers.
        samplers: [Sampler; MAX_INPUTS],
    },
    /// Replace the blend state.
    SetBlend {
        /// Stage.
        stage: StageId,
        /// New blend state.
        blend: BlendState,
    },
    /// Move the active window.
    SetTimeWindow {
        /// Stage.
        stage: StageId,
        /// First frame.
        start: i32,
        /// End frame (exclusive).
        end: i32,
    },
    /// Set one animation key.
    SetKey {
        /// Stage.
        stage: StageId,
        /// Parameter index.
        param_index: usize,
        /// Key frame.
        frame: i32,
        /// Key value.
        value: ParamValue,
    },
    /// Remove one animation key.
    RemoveKey {
        /// Stage.
        stage: StageId,
        /// Parameter index.
        param_index: usize,
        /// Key frame.
        frame: i32,
    },
    /// Replace or remove a whole track.
    ReplaceTrack {
        /// Stage.
        stage: StageId,
        /// Parameter index.
        param_index: usize,
        /// New track, `None` to remove it.
        track: Option<AnimTrack>,
    },
}

/// Inverses of the edits applied under one label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    label: String,
    inverse: Vec<Edit>,
}

impl Transaction {
    /// Starts an empty transaction.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            inverse: Vec::new(),
        }
    }

    /// User-facing label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of recorded inverses.
    pub fn len(&self) -> usize {
        self.inverse.len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.inverse.is_empty()
    }

    /// Inverse edits, in application order.
    pub fn inverse(&self) -> &[Edit] {
        &self.inverse
    }

    fn record(&mut self, edit: Edit) {
        self.inverse.push(edit);
    }
}

impl StageCollection {
    /// Applies `edit` and records its inverse in `tx`. Returns the stage
    /// created by `AddStage` or `RestoreStage`.
    ///
    /// A rejected edit records nothing and leaves the collection unchanged.
    pub fn apply(
        &mut self,
        tx: &mut Transaction,
        edit: Edit,
    ) -> Result<Option<StageId>, GraphError> {
        match edit {
            Edit::AddStage(node_type) => {
                let id = self.add_stage(node_type)?;
                tx.record(Edit::RemoveStage(id));
                Ok(Some(id))
            }
            Edit::RemoveStage(id) => {
                let removed = self.remove_stage(id).ok_or(GraphError::StageNotFound(id))?;
                tx.record(Edit::RestoreStage(Box::new(removed)));
                Ok(None)
            }
            Edit::RestoreStage(removed) => {
                let id = removed.stage.id();
                if self.contains(id) {
                    return Err(GraphError::StageNotFound(id));
                }
                self.restore_stage(*removed);
                tx.record(Edit::RemoveStage(id));
                Ok(Some(id))
            }
            Edit::Connect {
                target,
                slot,
                source,
            } => {
                let previous = self.stage(target).and_then(|s| s.input(slot));
                self.connect(target, slot, source)?;
                tx.record(match previous {
                    Some(source) => Edit::Connect {
                        target,
                        slot,
                        source,
                    },
                    None => Edit::Disconnect { target, slot },
                });
                Ok(None)
            }
            Edit::Disconnect { target, slot } => {
                if !self.contains(target) {
                    return Err(GraphError::StageNotFound(target));
                }
                if let Some(source) = self.disconnect(target, slot) {
                    tx.record(Edit::Connect {
                        target,
                        slot,
                        source,
                    });
                }
                Ok(None)
            }
            Edit::SetMultiplex {
                target,
                slot,
                selection,
            } => {
                let previous = self.set_multiplex(target, slot, selection)?;
                tx.record(Edit::SetMultiplex {
                    target,
                    slot,
                    selection: previous,
                });
                Ok(None)
            }
            Edit::SetParam {
                stage,
                index,
                value,
            } => {
                let previous = self.set_param(stage, index, &value)?;
                tx.record(Edit::SetParam {
                    stage,
                    index,
                    value: previous,
                });
                Ok(None)
            }
            Edit::SetParams { stage, block } => {
                let previous = self.set_params(stage, block)?;
                tx.record(Edit::SetParams {
                    stage,
                    block: previous,
                });
                Ok(None)
            }
            Edit::SetSamplers { stage, samplers } => {
                let s = self.stage_mut(stage).ok_or(GraphError::StageNotFound(stage))?;
                let previous = std::mem::replace(&mut s.samplers, samplers);
                tx.record(Edit::SetSamplers {
                    stage,
                    samplers: previous,
                });
                Ok(None)
            }
            Edit::SetBlend { stage, blend } => {
                let s = self.stage_mut(stage).ok_or(GraphError::StageNotFound(stage))?;
                let previous = std::mem::replace(&mut s.blend, blend);
                tx.record(Edit::SetBlend {
                    stage,
                    blend: previous,
                });
                Ok(None)
            }
            Edit::SetTimeWindow { stage, start, end } => {
                let (start, end) = self.set_time_window(stage, start, end)?;
                tx.record(Edit::SetTimeWindow { stage, start, end });
                Ok(None)
            }
            Edit::SetKey {
                stage,
                param_index,
                frame,
                value,
            } => {
                let previous = self.track(stage, param_index).cloned();
                let track = self.track_mut(stage, param_index)?;
                if !track.set_value(frame, value) {
                    let expected = track.value_type;
                    if previous.is_none() {
                        self.remove_track(stage, param_index);
                    }
                    return Err(crate::param::ParamError::TypeMismatch {
                        index: param_index,
                        expected,
                    }
                    .into());
                }
                tx.record(Edit::ReplaceTrack {
                    stage,
                    param_index,
                    track: previous,
                });
                Ok(None)
            }
            Edit::RemoveKey {
                stage,
                param_index,
                frame,
            } => {
                let Some(previous) = self.track(stage, param_index).cloned() else {
                    return Ok(None);
                };
                if let Ok(track) = self.track_mut(stage, param_index)
                    && track.remove_key(frame).is_some()
                {
                    tx.record(Edit::ReplaceTrack {
                        stage,
                        param_index,
                        track: Some(previous),
                    });
                }
                Ok(None)
            }
            Edit::ReplaceTrack {
                stage,
                param_index,
                track,
            } => {
                if !self.contains(stage) {
                    return Err(GraphError::StageNotFound(stage));
                }
                let previous = match track {
                    Some(track) => self.put_track(track),
                    None => self.remove_track(stage, param_index),
                };
                tx.record(Edit::ReplaceTrack {
                    stage,
                    param_index,
                    track: previous,
                });
                Ok(None)
            }
        }
    }
}

/// Undo and redo stacks of committed transactions.
#[derive(Debug, Clone)]
pub struct History {
    undo: Vec<Transaction>,
    redo: Vec<Transaction>,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(256)
    }
}

impl History {
    /// Keeps at most `limit` undo steps.
    pub fn new(limit: usize) -> Self {
        Self {
            undo: Vec::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Pushes a finished transaction and clears the redo stack. Empty
    /// transactions are dropped.
    pub fn commit(&mut self, tx: Transaction) {
        if tx.is_empty() {
            return;
        }
        self.redo.clear();
        self.undo.push(tx);
        if self.undo.len() > self.limit {
            self.undo.remove(0);
        }
    }

    /// Reverts the last transaction. Returns its label.
    pub fn undo(&mut self, graph: &mut StageCollection) -> Result<Option<String>, GraphError> {
        let Some(tx) = self.undo.pop() else {
            return Ok(None);
        };
        let redo = replay(graph, tx)?;
        let label = redo.label.clone();
        tracing::debug!(%label, "undo");
        self.redo.push(redo);
        Ok(Some(label))
    }

    /// Re-applies the last undone transaction. Returns its label.
    pub fn redo(&mut self, graph: &mut StageCollection) -> Result<Option<String>, GraphError> {
        let Some(tx) = self.redo.pop() else {
            return Ok(None);
        };
        let undo = replay(graph, tx)?;
        let label = undo.label.clone();
        tracing::debug!(%label, "redo");
        self.undo.push(undo);
        Ok(Some(label))
    }

    /// Returns `true` if there is something to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Returns `true` if there is something to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Drops both stacks.
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}

/// Applies `tx`'s inverses newest first and returns the transaction that
/// reverses them.
fn replay(graph: &mut StageCollection, tx: Transaction) -> Result<Transaction, GraphError> {
    let mut out = Transaction::new(tx.label);
    for edit in tx.inverse.into_iter().rev() {
        graph.apply(&mut out, edit)?;
    }
    Ok(out)
}
