//! Target liveness planning for baking.
//!
//! Walks the evaluation order, computes for each stage the interval from
//! the step that writes its output to the step of its last consumer, and
//! packs the intervals greedily into physical slots. The slot count is the
//! peak number of outputs alive at once, which is how many targets a baking
//! context needs in its free list.

use crate::graph::StageCollection;
use crate::stage::StageId;

/// Output liveness of every stage in one evaluation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlan {
    pub(crate) steps: Vec<PlanStep>,
    pub(crate) slot_count: usize,
}

/// One stage's entry in a [`TargetPlan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    /// Stage evaluated at this step.
    pub stage: StageId,
    /// Physical slot its output lands in.
    pub slot: usize,
    /// Step after which the output is no longer read. Equal to the step count
    /// for outputs that are never released.
    pub last_use: usize,
}

impl TargetPlan {
    /// Plans over `graph`'s current order. Stages nobody reads and persistent
    /// stages stay live until the end.
    pub fn compute(graph: &StageCollection, persistent: impl Fn(StageId) -> bool) -> Self {
        let order = graph.evaluation_order();
        let n = order.len();
        let step_of = |id: StageId| order.iter().position(|s| *s == id);

        let mut last_read = vec![None::<usize>; n];
        for (step, &id) in order.iter().enumerate() {
            for input in graph.effective_inputs(id).iter().flatten() {
                if let Some(src) = step_of(*input) {
                    last_read[src] = Some(last_read[src].map_or(step, |s: usize| s.max(step)));
                }
            }
        }

        let mut steps = Vec::with_capacity(n);
        let mut free_at: Vec<(usize, usize)> = Vec::new();
        let mut slot_count = 0;
        for (step, &id) in order.iter().enumerate() {
            let last_use = match last_read[step] {
                Some(lr) if !persistent(id) => lr,
                _ => n,
            };
            let slot = match free_at.iter().position(|&(free, _)| free <= step) {
                Some(i) => free_at.remove(i).1,
                None => {
                    slot_count += 1;
                    slot_count - 1
                }
            };
            free_at.push((last_use + 1, slot));
            steps.push(PlanStep {
                stage: id,
                slot,
                last_use,
            });
        }

        Self { steps, slot_count }
    }

    /// Steps in evaluation order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Peak number of simultaneously live outputs.
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{NodeCatalog, NodeCategory, NodeTypeInfo, SlotInfo};
    use std::sync::Arc;

    fn graph() -> (StageCollection, crate::catalog::NodeTypeId, crate::catalog::NodeTypeId) {
        let mut c = NodeCatalog::new();
        let src = c
            .register(NodeTypeInfo::new("src", NodeCategory::Generator))
            .unwrap();
        let mix = c
            .register(
                NodeTypeInfo::new("mix", NodeCategory::Blend)
                    .input(SlotInfo::texture("a"))
                    .input(SlotInfo::texture("b")),
            )
            .unwrap();
        (StageCollection::new(Arc::new(c)), src, mix)
    }

    #[test]
    fn test_chain_needs_two_slots() {
        let (mut g, src, mix) = graph();
        let a = g.add_stage(src).unwrap();
        let b = g.add_stage(mix).unwrap();
        let c = g.add_stage(mix).unwrap();
        let d = g.add_stage(mix).unwrap();
        g.connect(b, 0, a).unwrap();
        g.connect(c, 0, b).unwrap();
        g.connect(d, 0, c).unwrap();
        let plan = TargetPlan::compute(&g, |_| false);
        // a and b overlap, then c reuses a's slot and d reuses b's.
        assert_eq!(plan.slot_count(), 2);
        assert_eq!(plan.steps()[2].slot, plan.steps()[0].slot);
        assert_eq!(plan.steps()[3].slot, plan.steps()[1].slot);
    }

    #[test]
    fn test_independent_sources_stay_live() {
        let (mut g, src, mix) = graph();
        let a = g.add_stage(src).unwrap();
        let b = g.add_stage(src).unwrap();
        let m = g.add_stage(mix).unwrap();
        g.connect(m, 0, a).unwrap();
        g.connect(m, 1, b).unwrap();
        let plan = TargetPlan::compute(&g, |_| false);
        assert_eq!(plan.slot_count(), 3);
        assert_eq!(plan.steps()[0].last_use, 2);
        assert_eq!(plan.steps()[2].last_use, 3);
    }

    #[test]
    fn test_persistent_never_freed() {
        let (mut g, src, mix) = graph();
        let a = g.add_stage(src).unwrap();
        let b = g.add_stage(mix).unwrap();
        let c = g.add_stage(mix).unwrap();
        g.connect(b, 0, a).unwrap();
        g.connect(c, 0, b).unwrap();
        let free = TargetPlan::compute(&g, |_| false);
        let pinned = TargetPlan::compute(&g, |id| id == a);
        assert!(pinned.slot_count() > free.slot_count());
    }

    #[test]
    fn test_empty_graph() {
        let (g, _, _) = graph();
        let plan = TargetPlan::compute(&g, |_| false);
        assert_eq!(plan.slot_count(), 0);
        assert!(plan.steps().is_empty());
    }
}
