//! Built-in node library for tessel texture graphs.
//!
//! This crate registers the stock node types into a [`NodeCatalog`] and
//! provides the software fragment programs and native executors that run
//! them, so a graph can be built and evaluated by name.
//!
//! # Features
//!
//! - **Node Discovery**: List all node types with category and description
//! - **Lookup by Name**: Resolve node and parameter names for tools and CLIs
//! - **Backend Factory**: Software backends preloaded with every program
//!
//! # Example
//!
//! ```rust
//! use tessel_core::{ContextConfig, EvaluationContext, StageCollection};
//! use tessel_registry::NodeRegistry;
//!
//! let registry = NodeRegistry::new();
//! let mut graph = StageCollection::new(registry.catalog());
//! let noise = graph.add_stage(registry.find("noise").unwrap()).unwrap();
//! let levels = graph.add_stage(registry.find("levels").unwrap()).unwrap();
//! graph.connect(levels, 0, noise).unwrap();
//!
//! let factory = registry.backend_factory();
//! let config = ContextConfig { default_width: 8, default_height: 8, ..ContextConfig::default() };
//! let mut ctx = EvaluationContext::new(factory(), config);
//! assert!(ctx.evaluate(&graph).is_idle());
//! ```

pub mod native;
pub mod programs;

use std::sync::Arc;

use tessel_core::{
    BackendFactory, NodeCatalog, NodeCategory, NodeFlags, NodeTypeId, NodeTypeInfo,
    ParamDescriptor, ParamType, ParamValue, ProgramLibrary, SizePolicy, SlotInfo,
    software_factory,
};

/// Catalog of built-in node types together with their programs.
pub struct NodeRegistry {
    catalog: Arc<NodeCatalog>,
    programs: Arc<ProgramLibrary>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("nodes", &self.catalog.len())
            .field("programs", &self.programs.len())
            .finish()
    }
}

impl NodeRegistry {
    /// Creates a registry with all built-in node types registered.
    pub fn new() -> Self {
        let mut catalog = NodeCatalog::new();
        for info in builtin_nodes() {
            if let Err(err) = catalog.register(info) {
                tracing::warn!(%err, "built-in node rejected");
            }
        }
        Self {
            catalog: Arc::new(catalog),
            programs: Arc::new(programs::library()),
        }
    }

    /// Shared catalog, ready for [`StageCollection::new`](tessel_core::StageCollection::new).
    pub fn catalog(&self) -> Arc<NodeCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Shared program library.
    pub fn programs(&self) -> Arc<ProgramLibrary> {
        Arc::clone(&self.programs)
    }

    /// Factory producing software backends that know every built-in program.
    pub fn backend_factory(&self) -> BackendFactory {
        software_factory(self.programs())
    }

    /// Node type by name.
    pub fn find(&self, name: &str) -> Option<NodeTypeId> {
        self.catalog.find(name)
    }

    /// Node type info by name.
    pub fn get(&self, name: &str) -> Option<&NodeTypeInfo> {
        self.catalog.get(self.find(name)?)
    }

    /// All node types, in registration order.
    pub fn all_nodes(&self) -> Vec<&NodeTypeInfo> {
        self.catalog.iter().map(|(_, info)| info).collect()
    }

    /// Node types in one category.
    pub fn nodes_in_category(&self, category: NodeCategory) -> Vec<&NodeTypeInfo> {
        self.catalog
            .in_category(category)
            .into_iter()
            .map(|(_, info)| info)
            .collect()
    }

    /// Finds a parameter index by name, case-insensitively.
    pub fn param_index_by_name(&self, node: &str, param: &str) -> Option<usize> {
        let lower = param.to_lowercase();
        self.get(node)?
            .params
            .iter()
            .position(|p| p.name.to_lowercase() == lower)
    }

    /// Number of registered node types.
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }
}

fn color(name: &str, rgba: [f32; 4]) -> ParamDescriptor {
    ParamDescriptor::new(name, ParamType::Color4).with_default(ParamValue::Float4(rgba))
}

fn float(name: &str, default: f32, min: f32, max: f32) -> ParamDescriptor {
    ParamDescriptor::new(name, ParamType::Float)
        .with_default(ParamValue::Float(default))
        .with_range(min, max)
}

fn int(name: &str, default: i32, min: f32, max: f32) -> ParamDescriptor {
    ParamDescriptor::new(name, ParamType::Int)
        .with_default(ParamValue::Int(default))
        .with_range(min, max)
}

const WHITE: [f32; 4] = [1.0; 4];
const BLACK: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Every built-in node type.
fn builtin_nodes() -> Vec<NodeTypeInfo> {
    let thumb = NodeFlags::THUMBNAIL;
    vec![
        // Generators
        NodeTypeInfo::new("solid", NodeCategory::Generator)
            .describe("Flat color")
            .param(color("color", [0.5, 0.5, 0.5, 1.0]))
            .flags(thumb)
            .shader("solid"),
        NodeTypeInfo::new("checker", NodeCategory::Generator)
            .describe("Two-color checkerboard")
            .param(int("tiles", 8, 1.0, 256.0))
            .param(color("color_a", WHITE))
            .param(color("color_b", BLACK))
            .flags(thumb)
            .shader("checker"),
        NodeTypeInfo::new("gradient", NodeCategory::Generator)
            .describe("Linear or radial two-color gradient")
            .param(
                ParamDescriptor::new("direction", ParamType::Enum)
                    .with_labels(&["horizontal", "vertical", "radial"]),
            )
            .param(color("color_a", BLACK))
            .param(color("color_b", WHITE))
            .flags(thumb)
            .shader("gradient"),
        NodeTypeInfo::new("noise", NodeCategory::Generator)
            .describe("Tileable fractal value noise")
            .param(float("scale", 8.0, 1.0, 256.0))
            .param(int("octaves", 4, 1.0, 8.0))
            .param(int("seed", 0, 0.0, 65535.0))
            .param(float("persistence", 0.5, 0.0, 1.0))
            .flags(thumb)
            .shader("noise"),
        NodeTypeInfo::new("circle", NodeCategory::Generator)
            .describe("Soft-edged disc, draggable on canvas")
            .param(
                ParamDescriptor::new("center", ParamType::Float2)
                    .with_default(ParamValue::Float2([0.5, 0.5])),
            )
            .param(float("radius", 0.25, 0.0, 1.0))
            .param(float("softness", 0.01, 0.0, 0.5))
            .param(color("color", WHITE))
            .flags(thumb.union(NodeFlags::HAS_UI))
            .shader("circle"),
        // Filters
        NodeTypeInfo::new("invert", NodeCategory::Filter)
            .describe("Inverts color channels")
            .input(SlotInfo::texture("in"))
            .flags(thumb)
            .size(SizePolicy::MatchInput(0))
            .shader("invert"),
        NodeTypeInfo::new("blur", NodeCategory::Filter)
            .describe("Box blur")
            .input(SlotInfo::texture("in"))
            .param(int("radius", 2, 0.0, 8.0))
            .flags(thumb)
            .size(SizePolicy::MatchInput(0))
            .shader("blur"),
        NodeTypeInfo::new("levels", NodeCategory::Filter)
            .describe("Input and output ranges with gamma")
            .input(SlotInfo::texture("in"))
            .param(float("in_low", 0.0, 0.0, 1.0))
            .param(float("in_high", 1.0, 0.0, 1.0))
            .param(float("gamma", 1.0, 0.1, 10.0))
            .param(float("out_low", 0.0, 0.0, 1.0))
            .param(float("out_high", 1.0, 0.0, 1.0))
            .flags(thumb)
            .size(SizePolicy::MatchInput(0))
            .shader("levels"),
        NodeTypeInfo::new("transform", NodeCategory::Filter)
            .describe("Offset, scale and rotate")
            .input(SlotInfo::texture("in"))
            .param(ParamDescriptor::new("offset", ParamType::Float2).with_range(-1.0, 1.0))
            .param(
                ParamDescriptor::new("scale", ParamType::Float2)
                    .with_default(ParamValue::Float2([1.0, 1.0]))
                    .with_range(0.01, 16.0),
            )
            .param(
                ParamDescriptor::new("rotation", ParamType::Angle)
                    .with_range(-std::f32::consts::PI, std::f32::consts::PI),
            )
            .flags(thumb)
            .size(SizePolicy::MatchInput(0))
            .shader("transform"),
        NodeTypeInfo::new("threshold", NodeCategory::Filter)
            .describe("Luminance threshold with soft edge")
            .input(SlotInfo::texture("in"))
            .param(float("level", 0.5, 0.0, 1.0))
            .param(float("softness", 0.0, 0.0, 1.0))
            .flags(thumb)
            .size(SizePolicy::MatchInput(0))
            .shader("threshold"),
        NodeTypeInfo::new("accumulate", NodeCategory::Filter)
            .describe("Wide box blur computed over several passes")
            .input(SlotInfo::texture("in"))
            .param(int("radius", 4, 0.0, 16.0))
            .param(int("bands", 4, 1.0, 64.0))
            .flags(thumb)
            .size(SizePolicy::MatchInput(0))
            .native(native::accumulate),
        // Blends and materials
        NodeTypeInfo::new("blend", NodeCategory::Blend)
            .describe("Add, multiply or mix two inputs")
            .input(SlotInfo::texture("a"))
            .input(SlotInfo::texture("b"))
            .param(
                ParamDescriptor::new("mode", ParamType::Enum)
                    .with_labels(&["add", "multiply", "mix"])
                    .with_default(ParamValue::Int(2)),
            )
            .param(float("amount", 1.0, 0.0, 1.0))
            .flags(thumb)
            .shader("blend"),
        NodeTypeInfo::new("pbr_material", NodeCategory::Material)
            .describe("Packs albedo and roughness channels")
            .input(SlotInfo::texture("albedo").multiplexed())
            .input(SlotInfo::texture("roughness").multiplexed())
            .param(color("albedo", [0.8, 0.8, 0.8, 1.0]))
            .param(float("roughness", 0.5, 0.0, 1.0))
            .param(float("metallic", 0.0, 0.0, 1.0))
            .flags(thumb)
            .shader("pbr_material"),
        // Sources and outputs
        NodeTypeInfo::new("image_source", NodeCategory::Source)
            .describe("Frames from an attached decoder")
            .param(int("frame_offset", 0, -1000.0, 1000.0))
            .flags(thumb)
            .native(native::image_source),
        NodeTypeInfo::new("output", NodeCategory::Output)
            .describe("Export target; its image is kept while baking")
            .input(SlotInfo::texture("in"))
            .flags(NodeFlags::PERSISTENT)
            .size(SizePolicy::MatchInput(0))
            .shader("copy"),
    ]
}
