//! Property-based tests for the built-in nodes.

use std::sync::Arc;

use parking_lot::Mutex;
use proptest::prelude::*;
use tessel_core::{
    ContextConfig, DecoderHandle, DirtyFlags, EvaluationContext, MemoryDecoder, ParamValue,
    PixelBuffer, StageCollection, StageId,
};
use tessel_registry::NodeRegistry;

const SIZE: u32 = 8;

fn setup() -> (NodeRegistry, StageCollection, EvaluationContext) {
    let registry = NodeRegistry::new();
    let graph = StageCollection::new(registry.catalog());
    let factory = registry.backend_factory();
    let ctx = EvaluationContext::new(
        factory(),
        ContextConfig {
            default_width: SIZE,
            default_height: SIZE,
            ..ContextConfig::default()
        },
    );
    (registry, graph, ctx)
}

fn add(registry: &NodeRegistry, graph: &mut StageCollection, name: &str) -> StageId {
    graph.add_stage(registry.find(name).unwrap()).unwrap()
}

fn settle(ctx: &mut EvaluationContext, graph: &StageCollection) -> bool {
    (0..64).any(|_| ctx.evaluate(graph).is_idle())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Fractal noise is normalised into [0, 1] for any parameters.
    #[test]
    fn noise_stays_in_unit_range(
        scale in 1.0f32..64.0,
        octaves in 1i32..=8,
        seed in 0i32..65535,
        persistence in 0.0f32..=1.0,
    ) {
        let (registry, mut graph, mut ctx) = setup();
        let noise = add(&registry, &mut graph, "noise");
        graph.set_param_by_name(noise, "scale", &ParamValue::Float(scale)).unwrap();
        graph.set_param_by_name(noise, "octaves", &ParamValue::Int(octaves)).unwrap();
        graph.set_param_by_name(noise, "seed", &ParamValue::Int(seed)).unwrap();
        graph
            .set_param_by_name(noise, "persistence", &ParamValue::Float(persistence))
            .unwrap();
        prop_assert!(settle(&mut ctx, &graph));
        let px = ctx.read_pixels(noise).unwrap().unwrap();
        for c in &px.data {
            prop_assert!((-1e-6..=1.0 + 1e-6).contains(&c[0]), "noise value {}", c[0]);
            prop_assert_eq!(c[3], 1.0);
        }
    }

    /// Blurring a flat image band by band gives the same flat image, even
    /// when the input changes halfway through.
    #[test]
    fn accumulate_restarts_on_new_input(
        bands in 1i32..=16,
        radius in 0i32..=16,
        before in 0.0f32..=1.0,
        after in 0.0f32..=1.0,
        edit_pass in 0usize..16,
    ) {
        let (registry, mut graph, mut ctx) = setup();
        let solid = add(&registry, &mut graph, "solid");
        let acc = add(&registry, &mut graph, "accumulate");
        graph.connect(acc, 0, solid).unwrap();
        graph.set_param_by_name(acc, "bands", &ParamValue::Int(bands)).unwrap();
        graph.set_param_by_name(acc, "radius", &ParamValue::Int(radius)).unwrap();
        graph.set_param(solid, 0, &ParamValue::Float4([before, before, before, 1.0])).unwrap();

        for _ in 0..edit_pass {
            ctx.evaluate(&graph);
        }
        graph.set_param(solid, 0, &ParamValue::Float4([after, after, after, 1.0])).unwrap();
        ctx.set_dirty(&graph, solid, DirtyFlags::PARAMETER, false);

        prop_assert!(settle(&mut ctx, &graph));
        prop_assert!(!ctx.is_processing(acc));
        let px = ctx.read_pixels(acc).unwrap().unwrap();
        for c in &px.data {
            prop_assert!((c[0] - after).abs() < 1e-4, "stale texel {} != {}", c[0], after);
        }
    }

    /// The source frame is the local time plus the offset, clamped to the clip.
    #[test]
    fn image_source_clamps_to_clip(offset in -1000i32..=1000, frame in 0i32..10) {
        let (registry, mut graph, mut ctx) = setup();
        let source = add(&registry, &mut graph, "image_source");
        graph.set_time_window(source, 0, 10).unwrap();
        graph
            .set_param_by_name(source, "frame_offset", &ParamValue::Int(offset))
            .unwrap();
        let colors = [[1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0]];
        let frames = colors.iter().map(|&c| PixelBuffer::filled(4, 4, c)).collect();
        let decoder: DecoderHandle = Arc::new(Mutex::new(MemoryDecoder::new(frames)));
        graph.stage_mut(source).unwrap().decoder = Some(decoder);

        ctx.set_time(&graph, frame);
        prop_assert!(settle(&mut ctx, &graph));
        let expected = (ctx.local_time(source) + offset).clamp(0, 2) as usize;
        let px = ctx.read_pixels(source).unwrap().unwrap();
        prop_assert_eq!(px.get(0, 0), Some(colors[expected]));
    }
}
