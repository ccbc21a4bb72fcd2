//! Integration tests for tessel-core.
//!
//! Drives the graph, evaluation context, history and builder together through
//! the software backend with a small hand-built catalog.

use std::sync::Arc;

use tessel_core::{
    BuildJob, BuilderConfig, ContextConfig, DirtyFlags, Edit, EvaluationContext, FragmentInput,
    History, MemorySink, NodeCatalog, NodeCategory, NodeFlags, NodeTypeId, NodeTypeInfo,
    ParamDescriptor, ParamType, ParamValue, ProgramLibrary, SlotInfo, StageCollection, StageId,
    Transaction, bake_job, software_factory,
};

struct Types {
    generator: NodeTypeId,
    invert: NodeTypeId,
    output: NodeTypeId,
}

fn level(f: &FragmentInput<'_>) -> [f32; 4] {
    let v = f.params.float(0);
    [v, v, v, 1.0]
}

fn invert(f: &FragmentInput<'_>) -> [f32; 4] {
    let c = f.input(0);
    [1.0 - c[0], 1.0 - c[1], 1.0 - c[2], c[3]]
}

fn copy(f: &FragmentInput<'_>) -> [f32; 4] {
    f.input(0)
}

fn catalog() -> (Arc<NodeCatalog>, Types) {
    let mut c = NodeCatalog::new();
    let generator = c
        .register(
            NodeTypeInfo::new("level", NodeCategory::Generator)
                .param(
                    ParamDescriptor::new("value", ParamType::Float)
                        .with_default(ParamValue::Float(0.25)),
                )
                .shader("level"),
        )
        .unwrap();
    let invert = c
        .register(
            NodeTypeInfo::new("invert", NodeCategory::Filter)
                .input(SlotInfo::texture("in"))
                .shader("invert"),
        )
        .unwrap();
    let output = c
        .register(
            NodeTypeInfo::new("output", NodeCategory::Output)
                .input(SlotInfo::texture("in"))
                .flags(NodeFlags::PERSISTENT)
                .shader("copy"),
        )
        .unwrap();
    (
        Arc::new(c),
        Types {
            generator,
            invert,
            output,
        },
    )
}

fn programs() -> Arc<ProgramLibrary> {
    let mut lib = ProgramLibrary::new();
    lib.insert("level", level);
    lib.insert("invert", invert);
    lib.insert("copy", copy);
    Arc::new(lib)
}

fn context() -> EvaluationContext {
    let factory = software_factory(programs());
    EvaluationContext::new(
        factory(),
        ContextConfig {
            default_width: 4,
            default_height: 4,
            ..ContextConfig::default()
        },
    )
}

fn pipeline() -> (StageCollection, Types, [StageId; 3]) {
    let (catalog, types) = catalog();
    let mut g = StageCollection::new(catalog);
    let a = g.add_stage(types.generator).unwrap();
    let b = g.add_stage(types.invert).unwrap();
    let c = g.add_stage(types.output).unwrap();
    g.connect(b, 0, a).unwrap();
    g.connect(c, 0, b).unwrap();
    (g, types, [a, b, c])
}

fn run_until_idle(ctx: &mut EvaluationContext, g: &StageCollection) -> usize {
    let mut passes = 0;
    while !ctx.evaluate(g).is_idle() {
        passes += 1;
        assert!(passes < 32, "evaluation never settled");
    }
    passes + 1
}

#[test]
fn generator_invert_output_end_to_end() {
    let (g, _, [a, b, c]) = pipeline();
    let mut ctx = context();
    let report = ctx.evaluate(&g);
    assert_eq!(report.executed, vec![a, b, c]);
    assert!(report.is_idle());

    let pixels = ctx.read_pixels(c).unwrap().unwrap();
    assert_eq!((pixels.width, pixels.height), (4, 4));
    let px = pixels.get(1, 1).unwrap();
    assert!((px[0] - 0.75).abs() < 1e-5);
    assert_eq!(px[3], 1.0);
}

#[test]
fn parameter_edit_rerenders_descendants_only() {
    let (mut g, _, [a, b, c]) = pipeline();
    let mut ctx = context();
    run_until_idle(&mut ctx, &g);

    g.set_param(a, 0, &ParamValue::Float(1.0)).unwrap();
    ctx.set_dirty(&g, a, DirtyFlags::PARAMETER, false);
    assert!(ctx.is_dirty(b) && ctx.is_dirty(c));
    let report = ctx.evaluate(&g);
    assert_eq!(report.executed, vec![a, b, c]);
    let px = ctx.read_pixels(c).unwrap().unwrap().get(0, 0).unwrap();
    assert!(px[0].abs() < 1e-5);

    // Dirtying only children leaves the generator alone.
    ctx.set_dirty(&g, a, DirtyFlags::FORCED, true);
    assert!(!ctx.is_dirty(a));
    assert_eq!(ctx.evaluate(&g).executed, vec![b, c]);
}

#[test]
fn deleting_middle_stage_renumbers_inputs() {
    let (catalog, types) = catalog();
    let mut g = StageCollection::new(catalog);
    let ids: Vec<_> = [types.generator, types.invert, types.invert, types.invert]
        .into_iter()
        .map(|t| g.add_stage(t).unwrap())
        .collect();
    for w in ids.windows(2) {
        g.connect(w[1], 0, w[0]).unwrap();
    }

    g.delete_stage(ids[1]).unwrap();
    assert_eq!(g.len(), 3);
    // Dense view: stage 1 reads 0 and stage 2 reads 1.
    assert_eq!(g.input_index(1, 0), Some(0));
    assert_eq!(g.input_index(2, 0), Some(1));
    assert_eq!(g.input_index(0, 0), None);
}

#[test]
fn undo_redo_restores_graph_and_output() {
    let (mut g, types, [a, b, c]) = pipeline();
    let before = g.clone();
    let mut history = History::new(64);

    let mut tx = Transaction::new("insert invert");
    let extra = g
        .apply(&mut tx, Edit::AddStage(types.invert))
        .unwrap()
        .unwrap();
    g.apply(
        &mut tx,
        Edit::Connect {
            target: extra,
            slot: 0,
            source: b,
        },
    )
    .unwrap();
    g.apply(
        &mut tx,
        Edit::Connect {
            target: c,
            slot: 0,
            source: extra,
        },
    )
    .unwrap();
    history.commit(tx);
    let edited = g.clone();

    let mut ctx = context();
    run_until_idle(&mut ctx, &g);
    let px = ctx.read_pixels(c).unwrap().unwrap().get(0, 0).unwrap();
    assert!((px[0] - 0.25).abs() < 1e-5);

    assert_eq!(history.undo(&mut g).unwrap().as_deref(), Some("insert invert"));
    assert_eq!(g.evaluation_order(), before.evaluation_order());
    assert!(!g.contains(extra));
    assert_eq!(g.stage(c).unwrap().input(0), Some(b));
    run_until_idle(&mut ctx, &g);
    let px = ctx.read_pixels(c).unwrap().unwrap().get(0, 0).unwrap();
    assert!((px[0] - 0.75).abs() < 1e-5);
    assert!(ctx.evaluation_texture(a).is_some());

    history.redo(&mut g).unwrap();
    assert_eq!(g, edited);
}

#[test]
fn bake_visits_every_frame_once() {
    let (mut g, _, [a, b, c]) = pipeline();
    for id in [a, b, c] {
        g.set_time_window(id, 0, 4).unwrap();
    }
    let factory = software_factory(programs());
    let config = BuilderConfig {
        width: 4,
        height: 4,
        max_passes_per_frame: 8,
    };
    let job = BuildJob::new("bake", g, vec![c], Box::new(MemorySink::default()));
    let report = bake_job(job, &factory, config, |_| {}).unwrap();
    assert_eq!(report.frames, vec![0, 1, 2, 3]);
    assert_eq!(report.evaluations, 4);
    assert_eq!(report.written, 4);
}

#[test]
fn building_context_returns_targets_to_pool() {
    let (g, _, [_, _, c]) = pipeline();
    let factory = software_factory(programs());
    let mut ctx = EvaluationContext::new(factory(), ContextConfig::building(4, 4));
    ctx.set_persistent(c, true);
    run_until_idle(&mut ctx, &g);
    // Only the persistent output still owns a target.
    assert_eq!(ctx.owned_targets(), 1);
    let created = ctx.stats().created;

    ctx.set_all_dirty(&g, DirtyFlags::FORCED);
    run_until_idle(&mut ctx, &g);
    assert_eq!(ctx.stats().created, created);
    assert!(ctx.read_pixels(c).unwrap().is_some());
}
