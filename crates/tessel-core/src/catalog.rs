//! Node type catalog.
//!
//! A [`NodeCatalog`] is built once at start-up and shared as an
//! `Arc<NodeCatalog>` by every [`StageCollection`](crate::graph::StageCollection)
//! and context that needs it. Each [`NodeTypeInfo`] carries the parameter
//! schema, slot declarations, capability flags, and the executors that run
//! stages of that type.

use std::collections::HashMap;
use std::fmt;

use crate::context::{NativeCall, NativeStatus};
use crate::error::{CatalogError, ExecError};
use crate::param::ParamDescriptor;
use crate::stage::MAX_INPUTS;

/// Index of a node type in its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeTypeId(pub u16);

impl fmt::Display for NodeTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Broad grouping used for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    /// Produces an image from parameters alone.
    Generator,
    /// Transforms one input image.
    Filter,
    /// Combines several inputs.
    Blend,
    /// Assembles material channels.
    Material,
    /// Reads decoded image or video frames.
    Source,
    /// Terminal node for export and preview.
    Output,
}

impl NodeCategory {
    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Generator => "Generator",
            Self::Filter => "Filter",
            Self::Blend => "Blend",
            Self::Material => "Material",
            Self::Source => "Source",
            Self::Output => "Output",
        }
    }
}

/// Image kind carried by a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Flat 2D texture.
    Texture2D,
    /// Six-face cubemap.
    Cubemap,
    /// Accepts either kind. Only meaningful on inputs.
    Any,
}

impl SlotKind {
    /// Returns `true` if an output of kind `output` may feed an input of this kind.
    pub const fn accepts(self, output: SlotKind) -> bool {
        matches!(
            (self, output),
            (Self::Any, _)
                | (Self::Texture2D, Self::Texture2D)
                | (Self::Cubemap, Self::Cubemap)
        )
    }
}

/// Declared input or output slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    /// Slot label.
    pub name: String,
    /// Accepted image kind.
    pub kind: SlotKind,
    /// Input resolves to one of several eligible upstream stages.
    pub multiplexed: bool,
}

impl SlotInfo {
    /// Plain 2D slot.
    pub fn texture(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Texture2D,
            multiplexed: false,
        }
    }

    /// Cubemap slot.
    pub fn cubemap(name: impl Into<String>) -> Self {
        Self {
            kind: SlotKind::Cubemap,
            ..Self::texture(name)
        }
    }

    /// Marks the slot multiplexed.
    pub fn multiplexed(mut self) -> Self {
        self.multiplexed = true;
        self
    }
}

/// Capability flags of a node type.
///
/// ```rust
/// use tessel_core::catalog::NodeFlags;
///
/// let flags = NodeFlags::HAS_UI.union(NodeFlags::THUMBNAIL);
/// assert!(flags.contains(NodeFlags::HAS_UI));
/// assert!(!flags.contains(NodeFlags::PERSISTENT));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Draws custom on-canvas controls; receives mouse input and an overlay pass.
    pub const HAS_UI: Self = Self(1 << 0);
    /// Produces a thumbnail in the atlas.
    pub const THUMBNAIL: Self = Self(1 << 1);
    /// Keeps its texture alive for external consumers.
    pub const PERSISTENT: Self = Self(1 << 2);
    /// Hidden from default listings.
    pub const EXPERIMENTAL: Self = Self(1 << 3);

    /// Returns `true` if all bits in `other` are set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Native executor entry point.
pub type NativeFn = fn(&mut NativeCall<'_>) -> Result<NativeStatus, ExecError>;

/// Name of a fragment program, resolved by the render backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderProgram(pub String);

impl ShaderProgram {
    /// Creates a program reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

/// Opaque handle understood by a [`ScriptHost`](crate::context::ScriptHost).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub u32);

/// Executors attached to a node type. Any combination may be present; the
/// context runs native code first, then the shader, then the script.
#[derive(Debug, Clone, Default)]
pub struct Executors {
    /// Native code run on the CPU.
    pub native: Option<NativeFn>,
    /// Fragment program drawn into the stage's target.
    pub shader: Option<ShaderProgram>,
    /// Script run by the installed host.
    pub script: Option<ScriptHandle>,
}

impl Executors {
    /// Returns `true` when no executor is attached.
    pub fn is_empty(&self) -> bool {
        self.native.is_none() && self.shader.is_none() && self.script.is_none()
    }
}

/// How a stage's output size is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizePolicy {
    /// The context's working size.
    #[default]
    Default,
    /// Same size as the target feeding this input slot, else the working size.
    MatchInput(usize),
    /// Fixed dimensions.
    Fixed(u32, u32),
}

/// Static description of a node type.
#[derive(Debug, Clone)]
pub struct NodeTypeInfo {
    /// Unique name.
    pub name: String,
    /// Listing category.
    pub category: NodeCategory,
    /// One-line description.
    pub description: String,
    /// Input slots, at most [`MAX_INPUTS`].
    pub inputs: Vec<SlotInfo>,
    /// Output slots.
    pub outputs: Vec<SlotInfo>,
    /// Parameter schema.
    pub params: Vec<ParamDescriptor>,
    /// Capability flags.
    pub flags: NodeFlags,
    /// Executors run for stages of this type.
    pub executors: Executors,
    /// Output size policy.
    pub size: SizePolicy,
}

impl NodeTypeInfo {
    /// Creates a type with one 2D output and nothing else.
    pub fn new(name: impl Into<String>, category: NodeCategory) -> Self {
        Self {
            name: name.into(),
            category,
            description: String::new(),
            inputs: Vec::new(),
            outputs: vec![SlotInfo::texture("out")],
            params: Vec::new(),
            flags: NodeFlags::NONE,
            executors: Executors::default(),
            size: SizePolicy::Default,
        }
    }

    /// Sets the description.
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// Appends an input slot.
    pub fn input(mut self, slot: SlotInfo) -> Self {
        self.inputs.push(slot);
        self
    }

    /// Replaces the output slots.
    pub fn outputs(mut self, slots: Vec<SlotInfo>) -> Self {
        self.outputs = slots;
        self
    }

    /// Appends a parameter.
    pub fn param(mut self, desc: ParamDescriptor) -> Self {
        self.params.push(desc);
        self
    }

    /// Adds capability flags.
    pub fn flags(mut self, flags: NodeFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Attaches a native executor.
    pub fn native(mut self, f: NativeFn) -> Self {
        self.executors.native = Some(f);
        self
    }

    /// Attaches a fragment program.
    pub fn shader(mut self, program: impl Into<String>) -> Self {
        self.executors.shader = Some(ShaderProgram::new(program));
        self
    }

    /// Attaches a script.
    pub fn script(mut self, handle: ScriptHandle) -> Self {
        self.executors.script = Some(handle);
        self
    }

    /// Sets the output size policy.
    pub fn size(mut self, size: SizePolicy) -> Self {
        self.size = size;
        self
    }

    /// Kind of the primary output, used for connection checks.
    pub fn output_kind(&self) -> Option<SlotKind> {
        self.outputs.first().map(|s| s.kind)
    }
}

/// Load-once catalog of node types.
#[derive(Debug, Default)]
pub struct NodeCatalog {
    types: Vec<NodeTypeInfo>,
    by_name: HashMap<String, NodeTypeId>,
}

impl NodeCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node type and returns its id.
    pub fn register(&mut self, info: NodeTypeInfo) -> Result<NodeTypeId, CatalogError> {
        if self.by_name.contains_key(&info.name) {
            return Err(CatalogError::DuplicateName(info.name));
        }
        if info.inputs.len() > MAX_INPUTS {
            return Err(CatalogError::TooManyInputs {
                name: info.name,
                count: info.inputs.len(),
                max: MAX_INPUTS,
            });
        }
        let id = NodeTypeId(self.types.len() as u16);
        self.by_name.insert(info.name.clone(), id);
        self.types.push(info);
        Ok(id)
    }

    /// Looks up a node type.
    pub fn get(&self, id: NodeTypeId) -> Option<&NodeTypeInfo> {
        self.types.get(id.0 as usize)
    }

    /// Finds a node type by name (case-insensitive).
    pub fn find(&self, name: &str) -> Option<NodeTypeId> {
        self.by_name.get(name).copied().or_else(|| {
            self.types
                .iter()
                .position(|t| t.name.eq_ignore_ascii_case(name))
                .map(|i| NodeTypeId(i as u16))
        })
    }

    /// All registered types with their ids, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeTypeId, &NodeTypeInfo)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (NodeTypeId(i as u16), t))
    }

    /// Types in `category`.
    pub fn in_category(&self, category: NodeCategory) -> Vec<(NodeTypeId, &NodeTypeInfo)> {
        self.iter().filter(|(_, t)| t.category == category).collect()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{ParamType, layout_size};

    #[test]
    fn test_register_and_find() {
        let mut catalog = NodeCatalog::new();
        let id = catalog
            .register(
                NodeTypeInfo::new("Checker", NodeCategory::Generator)
                    .param(ParamDescriptor::new("scale", ParamType::Float)),
            )
            .unwrap();
        assert_eq!(catalog.find("Checker"), Some(id));
        assert_eq!(catalog.find("checker"), Some(id));
        assert_eq!(layout_size(&catalog.get(id).unwrap().params), 4);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = NodeCatalog::new();
        catalog
            .register(NodeTypeInfo::new("a", NodeCategory::Filter))
            .unwrap();
        let err = catalog
            .register(NodeTypeInfo::new("a", NodeCategory::Blend))
            .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateName("a".into()));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_too_many_inputs() {
        let mut catalog = NodeCatalog::new();
        let mut info = NodeTypeInfo::new("wide", NodeCategory::Blend);
        for i in 0..=MAX_INPUTS {
            info = info.input(SlotInfo::texture(format!("in{i}")));
        }
        assert!(matches!(
            catalog.register(info),
            Err(CatalogError::TooManyInputs { count: 9, .. })
        ));
    }

    #[test]
    fn test_slot_kind_accepts() {
        assert!(SlotKind::Any.accepts(SlotKind::Cubemap));
        assert!(SlotKind::Texture2D.accepts(SlotKind::Texture2D));
        assert!(!SlotKind::Texture2D.accepts(SlotKind::Cubemap));
    }

    #[test]
    fn test_category_listing() {
        let mut catalog = NodeCatalog::new();
        catalog
            .register(NodeTypeInfo::new("a", NodeCategory::Filter))
            .unwrap();
        catalog
            .register(NodeTypeInfo::new("b", NodeCategory::Generator))
            .unwrap();
        catalog
            .register(NodeTypeInfo::new("c", NodeCategory::Filter))
            .unwrap();
        let filters = catalog.in_category(NodeCategory::Filter);
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[1].1.name, "c");
    }
}
