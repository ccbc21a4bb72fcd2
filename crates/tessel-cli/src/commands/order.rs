//! Evaluation order and baking plan of a chain expression.

use clap::Args;
use tessel_core::{StageCollection, StageId, TargetPlan};
use tessel_registry::NodeRegistry;

use crate::chain::{build_chain, parse_chain};

#[derive(Args)]
pub struct OrderArgs {
    /// Chain expression, e.g. "noise | blend(checker) | output"
    #[arg(value_name = "CHAIN")]
    chain: String,
}

fn label(graph: &StageCollection, id: StageId) -> String {
    let name = graph.info(id).map_or("?", |i| i.name.as_str());
    format!("{id} {name}")
}

pub fn run(args: OrderArgs) -> anyhow::Result<()> {
    let registry = NodeRegistry::new();
    let spec = parse_chain(&args.chain)?;
    let built = build_chain(&spec, &registry)?;
    let graph = &built.graph;

    println!("Evaluation order ({} stages):", graph.len());
    for (step, &id) in graph.evaluation_order().iter().enumerate() {
        let inputs: Vec<String> = graph
            .effective_inputs(id)
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| s.map(|s| format!("{slot}<-{s}")))
            .collect();
        if inputs.is_empty() {
            println!("  {step:3}  {}", label(graph, id));
        } else {
            println!("  {step:3}  {:24} [{}]", label(graph, id), inputs.join(", "));
        }
    }

    let plan = TargetPlan::compute(graph, |id| id == built.output);
    println!();
    println!("Baking plan: {} target(s)", plan.slot_count());
    let end = plan.steps().len();
    for (step, entry) in plan.steps().iter().enumerate() {
        let life = if entry.last_use >= end {
            "kept".to_string()
        } else {
            format!("released after step {}", entry.last_use)
        };
        println!(
            "  {step:3}  {:24} slot {}  {life}",
            label(graph, entry.stage),
            entry.slot
        );
    }
    Ok(())
}
