//! Node type listing and information command.

use clap::Args;
use serde::Serialize;
use tessel_core::{NodeFlags, NodeTypeInfo, SlotKind};
use tessel_registry::NodeRegistry;

#[derive(Args)]
pub struct NodesArgs {
    /// Show details for a specific node type
    #[arg(value_name = "NODE")]
    node: Option<String>,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct ParamSummary {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    default: String,
    min: f32,
    max: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,
    description: String,
}

#[derive(Serialize)]
struct SlotSummary {
    name: String,
    kind: &'static str,
    multiplexed: bool,
}

#[derive(Serialize)]
struct NodeSummary {
    name: String,
    category: &'static str,
    description: String,
    inputs: Vec<SlotSummary>,
    params: Vec<ParamSummary>,
    flags: Vec<&'static str>,
}

fn kind_name(kind: SlotKind) -> &'static str {
    match kind {
        SlotKind::Texture2D => "2d",
        SlotKind::Cubemap => "cube",
        SlotKind::Any => "any",
    }
}

fn flag_names(flags: NodeFlags) -> Vec<&'static str> {
    [
        (NodeFlags::HAS_UI, "ui"),
        (NodeFlags::THUMBNAIL, "thumbnail"),
        (NodeFlags::PERSISTENT, "persistent"),
        (NodeFlags::EXPERIMENTAL, "experimental"),
    ]
    .into_iter()
    .filter(|(f, _)| flags.contains(*f))
    .map(|(_, name)| name)
    .collect()
}

fn summarize(info: &NodeTypeInfo) -> NodeSummary {
    NodeSummary {
        name: info.name.clone(),
        category: info.category.name(),
        description: info.description.clone(),
        inputs: info
            .inputs
            .iter()
            .map(|s| SlotSummary {
                name: s.name.clone(),
                kind: kind_name(s.kind),
                multiplexed: s.multiplexed,
            })
            .collect(),
        params: info
            .params
            .iter()
            .filter(|p| !p.hidden)
            .map(|p| ParamSummary {
                name: p.name.clone(),
                ty: p.ty.to_string(),
                default: p.default.to_string(),
                min: p.min,
                max: p.max,
                labels: p.enum_labels.clone(),
                description: p.description.clone(),
            })
            .collect(),
        flags: flag_names(info.flags),
    }
}

pub fn run(args: NodesArgs) -> anyhow::Result<()> {
    let registry = NodeRegistry::new();

    if let Some(name) = &args.node {
        let info = registry
            .all_nodes()
            .into_iter()
            .find(|n| n.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow::anyhow!("Unknown node: {}", name))?;
        let summary = summarize(info);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            print_details(&summary);
        }
        return Ok(());
    }

    let summaries: Vec<NodeSummary> = registry.all_nodes().into_iter().map(summarize).collect();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("Available Nodes");
    println!("===============");
    let mut category = "";
    for node in &summaries {
        if node.category != category {
            category = node.category;
            println!();
            println!("{category}:");
        }
        println!("  {:15} - {}", node.name, node.description);
    }
    println!();
    println!("Use 'tessel nodes <name>' for parameter details.");
    Ok(())
}

fn print_details(node: &NodeSummary) {
    println!("{}", node.name);
    println!("{}", "=".repeat(node.name.len()));
    println!();
    println!("{} ({})", node.description, node.category);
    if !node.flags.is_empty() {
        println!("Flags: {}", node.flags.join(", "));
    }
    println!();

    if node.inputs.is_empty() {
        println!("Inputs: none");
    } else {
        println!("Inputs:");
        for (slot, input) in node.inputs.iter().enumerate() {
            let mux = if input.multiplexed { ", multiplexed" } else { "" };
            println!("  [{slot}] {} ({}{mux})", input.name, input.kind);
        }
    }
    println!();

    if node.params.is_empty() {
        println!("Parameters: none");
        return;
    }
    println!("Parameters:");
    println!();
    println!("  {:12}  {:8}  {:18}  {:14}  Description", "Name", "Type", "Default", "Range");
    println!("  {:12}  {:8}  {:18}  {:14}  -----------", "----", "----", "-------", "-----");
    for p in &node.params {
        let range = if p.labels.is_empty() {
            format!("{}..{}", p.min, p.max)
        } else {
            p.labels.join("|")
        };
        println!(
            "  {:12}  {:8}  {:18}  {:14}  {}",
            p.name, p.ty, p.default, range, p.description
        );
    }
}
