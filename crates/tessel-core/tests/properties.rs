//! Property-based tests for tessel-core.
//!
//! Random edit sequences against the stage collection, evaluation context,
//! animation tracks and undo history.

use std::sync::Arc;

use proptest::prelude::*;
use tessel_core::{
    AnimTrack, ContextConfig, DirtyFlags, Edit, EvaluationContext, ExecError, FragmentInput,
    History, NativeCall, NativeStatus, NodeCatalog, NodeCategory, NodeTypeId, NodeTypeInfo,
    ParamDescriptor, ParamType, ParamValue, ProgramLibrary, SlotInfo, StageCollection, StageId,
    Transaction, software_factory,
};

fn mix(f: &FragmentInput<'_>) -> [f32; 4] {
    let (a, b) = (f.input(0), f.input(1));
    [(a[0] + b[0]) * 0.5, f.params.float(0), 0.0, 1.0]
}

/// Finishes after three calls.
fn thirds(call: &mut NativeCall<'_>) -> Result<NativeStatus, ExecError> {
    let progress = call.progress + 1.0 / 3.0;
    if progress < 0.99 {
        Ok(NativeStatus::Pending { progress })
    } else {
        Ok(NativeStatus::Done)
    }
}

/// Catalog with a two-input shader type and a two-input pending native type.
fn catalog() -> (NodeCatalog, NodeTypeId, NodeTypeId) {
    let mut c = NodeCatalog::new();
    let mix_t = c
        .register(
            NodeTypeInfo::new("mix", NodeCategory::Blend)
                .input(SlotInfo::texture("a"))
                .input(SlotInfo::texture("b"))
                .param(ParamDescriptor::new("amount", ParamType::Float))
                .shader("mix"),
        )
        .unwrap();
    let slow_t = c
        .register(
            NodeTypeInfo::new("thirds", NodeCategory::Filter)
                .input(SlotInfo::texture("a"))
                .input(SlotInfo::texture("b"))
                .param(ParamDescriptor::new("amount", ParamType::Float))
                .native(thirds),
        )
        .unwrap();
    (c, mix_t, slow_t)
}

/// Collection of `n` two-input stages with one float parameter each.
fn collection(n: usize) -> (StageCollection, Vec<StageId>) {
    let (c, mix_t, _) = catalog();
    let mut g = StageCollection::new(Arc::new(c));
    let ids = (0..n).map(|_| g.add_stage(mix_t).unwrap()).collect();
    (g, ids)
}

/// Like [`collection`], with a pending native stage wherever `slow` is set.
fn mixed_collection(slow: &[bool]) -> (StageCollection, Vec<StageId>) {
    let (c, mix_t, slow_t) = catalog();
    let mut g = StageCollection::new(Arc::new(c));
    let ids = slow
        .iter()
        .map(|&s| g.add_stage(if s { slow_t } else { mix_t }).unwrap())
        .collect();
    (g, ids)
}

fn context() -> EvaluationContext {
    let mut lib = ProgramLibrary::new();
    lib.insert("mix", mix);
    let factory = software_factory(Arc::new(lib));
    EvaluationContext::new(factory(), ContextConfig {
        default_width: 2,
        default_height: 2,
        ..ContextConfig::default()
    })
}

/// Evaluates until idle. `false` if `limit` calls were not enough.
fn settle(ctx: &mut EvaluationContext, g: &StageCollection, limit: usize) -> bool {
    (0..limit).any(|_| ctx.evaluate(g).is_idle())
}

fn wire(g: &mut StageCollection, ids: &[StageId], edges: &[(usize, usize, usize)]) {
    for &(target, slot, source) in edges {
        // Cycles and self loops are rejected; the property is that nothing
        // accepted ever creates one.
        let _ = g.connect(ids[target % ids.len()], slot % 2, ids[source % ids.len()]);
    }
}

fn order_is_valid(g: &StageCollection) -> bool {
    let order = g.evaluation_order();
    order.iter().enumerate().all(|(pos, &id)| {
        g.effective_inputs(id)
            .iter()
            .flatten()
            .all(|src| order[..pos].contains(src))
    })
}

fn edges() -> impl Strategy<Value = Vec<(usize, usize, usize)>> {
    prop::collection::vec((0usize..8, 0usize..2, 0usize..8), 0..24)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Accepted connections never create a cycle, so every stage comes after
    /// all of its inputs in the evaluation order.
    #[test]
    fn evaluation_order_respects_inputs(edges in edges()) {
        let (mut g, ids) = collection(8);
        wire(&mut g, &ids, &edges);
        prop_assert_eq!(g.evaluation_order().len(), ids.len());
        prop_assert!(order_is_valid(&g));
        for &id in &ids {
            let upstream = g.upstream_of(id);
            prop_assert_eq!(upstream.last(), Some(&id));
        }
    }

    /// A rejected connection leaves the collection exactly as it was.
    #[test]
    fn rejected_connect_changes_nothing(
        edges in prop::collection::vec((0usize..8, 0usize..3, 0usize..8), 0..32),
    ) {
        let (mut g, ids) = collection(8);
        for &(target, slot, source) in &edges {
            let before = g.clone();
            if g.connect(ids[target], slot, ids[source]).is_err() {
                prop_assert_eq!(&g, &before);
            }
            prop_assert!(order_is_valid(&g));
        }
    }

    /// Pending stages and their consumers always finish once upstream is
    /// clean, including after an edit lands in the middle of a run.
    #[test]
    fn processing_always_drains(
        slow in prop::collection::vec(any::<bool>(), 8),
        edges in edges(),
        edit in (0usize..8, 0usize..4),
    ) {
        let (mut g, ids) = mixed_collection(&slow);
        wire(&mut g, &ids, &edges);
        let mut ctx = context();
        let (stage, after) = edit;
        for _ in 0..after {
            ctx.evaluate(&g);
        }
        ctx.set_dirty(&g, ids[stage], DirtyFlags::PARAMETER, false);

        // Every stage needs at most three calls, one per evaluation.
        prop_assert!(settle(&mut ctx, &g, 3 * ids.len() + 1));
        for &id in &ids {
            prop_assert!(!ctx.is_processing(id), "{} still processing", id);
            prop_assert!(!ctx.is_dirty(id), "{} still dirty", id);
            prop_assert_eq!(ctx.progress(id), 0.0);
        }
    }

    /// Deleting any stage keeps the order valid and drops every reference
    /// to the deleted id.
    #[test]
    fn deletion_keeps_graph_consistent(edges in edges(), victim in 0usize..8) {
        let (mut g, ids) = collection(8);
        wire(&mut g, &ids, &edges);
        let gone = ids[victim];
        prop_assert!(g.delete_stage(gone).is_some());
        prop_assert!(order_is_valid(&g));
        for stage in g.iter() {
            prop_assert!(!stage.inputs().contains(&Some(gone)));
        }
        let used: u32 = g.iter().map(|s| s.used_by_others()).sum();
        let wired: u32 = g.iter().map(|s| s.inputs().iter().flatten().count() as u32).sum();
        prop_assert_eq!(used, wired);
    }

    /// Dirtying a stage dirties every stage downstream of it.
    #[test]
    fn dirty_reaches_all_descendants(edges in edges(), origin in 0usize..8) {
        let (mut g, ids) = collection(8);
        wire(&mut g, &ids, &edges);
        let mut ctx = context();
        prop_assert!(settle(&mut ctx, &g, 8));

        let origin = ids[origin];
        ctx.set_dirty(&g, origin, DirtyFlags::PARAMETER, false);
        for id in g.downstream_of(origin) {
            prop_assert!(ctx.is_dirty(id), "{} not dirty", id);
        }
        let report = ctx.evaluate(&g);
        prop_assert!(report.is_idle());
        prop_assert_eq!(report.executed, g.downstream_of(origin));
    }

    /// Float tracks sample between their bracketing keys and clamp outside.
    #[test]
    fn float_track_stays_within_keys(
        keys in prop::collection::btree_map(-100i32..100, -10.0f32..10.0, 1..8),
        frame in -150i32..150,
    ) {
        let mut track = AnimTrack::new(StageId(0), 0, ParamType::Float);
        for (&f, &v) in &keys {
            track.set_value(f, ParamValue::Float(v));
        }
        let Some(ParamValue::Float(v)) = track.value_at(frame) else {
            return Err(TestCaseError::fail("float track sampled to another type"));
        };
        let lo = keys.range(..=frame).next_back().map(|(_, v)| *v);
        let hi = keys.range(frame..).next().map(|(_, v)| *v);
        match (lo, hi) {
            (Some(a), Some(b)) => prop_assert!(v >= a.min(b) - 1e-4 && v <= a.max(b) + 1e-4),
            (Some(a), None) | (None, Some(a)) => prop_assert_eq!(v, a),
            (None, None) => unreachable!(),
        }
    }

    /// Enum tracks hold the previous key's value.
    #[test]
    fn enum_track_holds(
        keys in prop::collection::btree_map(0i32..100, 0i32..6, 1..8),
        frame in 0i32..120,
    ) {
        let mut track = AnimTrack::new(StageId(0), 0, ParamType::Enum);
        for (&f, &v) in &keys {
            track.set_value(f, ParamValue::Int(v));
        }
        let expected = keys
            .range(..=frame)
            .next_back()
            .or_else(|| keys.iter().next())
            .map(|(_, v)| *v);
        prop_assert_eq!(track.value_at(frame), expected.map(ParamValue::Int));
    }

    /// Undoing every committed transaction restores parameters and wiring.
    #[test]
    fn undo_restores_state(
        edges in edges(),
        writes in prop::collection::vec((0usize..8, -5.0f32..5.0), 1..12),
    ) {
        let (mut g, ids) = collection(8);
        let original = g.clone();
        let mut history = History::new(64);
        for &(target, slot, source) in &edges {
            let mut tx = Transaction::new("connect");
            let _ = g.apply(&mut tx, Edit::Connect {
                target: ids[target],
                slot: slot % 2,
                source: ids[source],
            });
            history.commit(tx);
        }
        for &(stage, value) in &writes {
            let mut tx = Transaction::new("param");
            g.apply(&mut tx, Edit::SetParam {
                stage: ids[stage],
                index: 0,
                value: ParamValue::Float(value),
            }).unwrap();
            history.commit(tx);
        }
        let edited = g.clone();

        while history.can_undo() {
            history.undo(&mut g).unwrap();
        }
        prop_assert_eq!(&g, &original);
        while history.can_redo() {
            history.redo(&mut g).unwrap();
        }
        prop_assert_eq!(&g, &edited);
    }
}
