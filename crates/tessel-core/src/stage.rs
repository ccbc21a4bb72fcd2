//! A single node instance in the evaluation graph.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::catalog::NodeTypeId;
use crate::codec::FrameDecoder;
use crate::param::ParameterBlock;

/// Number of input slots on every stage.
pub const MAX_INPUTS: usize = 8;

/// Stable runtime identity of a stage. Never reused within a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub u32);

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    /// Tile.
    #[default]
    Repeat,
    /// Clamp to the edge texel.
    ClampToEdge,
    /// Transparent black outside `0..1`.
    ClampToBorder,
    /// Tile with every other copy mirrored.
    MirroredRepeat,
}

/// Texture filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Bilinear.
    #[default]
    Linear,
    /// Closest texel.
    Nearest,
}

/// How one input slot is sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sampler {
    /// Horizontal wrap.
    pub wrap_u: WrapMode,
    /// Vertical wrap.
    pub wrap_v: WrapMode,
    /// Minification filter.
    pub filter_min: FilterMode,
    /// Magnification filter.
    pub filter_mag: FilterMode,
}

/// Blend factor applied when a stage draws over its target's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    /// 0.
    Zero,
    /// 1.
    One,
    /// Source color.
    SrcColor,
    /// 1 - source color.
    OneMinusSrcColor,
    /// Destination color.
    DstColor,
    /// 1 - destination color.
    OneMinusDstColor,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// 1 - destination alpha.
    OneMinusDstAlpha,
    /// Constant color.
    ConstantColor,
    /// 1 - constant color.
    OneMinusConstantColor,
    /// Constant alpha.
    ConstantAlpha,
    /// 1 - constant alpha.
    OneMinusConstantAlpha,
    /// min(source alpha, 1 - destination alpha).
    SrcAlphaSaturate,
}

/// Source and destination blend factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    /// Factor applied to the fragment.
    pub src: BlendFactor,
    /// Factor applied to the existing target contents.
    pub dst: BlendFactor,
}

impl Default for BlendState {
    fn default() -> Self {
        Self::REPLACE
    }
}

impl BlendState {
    /// Overwrites the target.
    pub const REPLACE: Self = Self {
        src: BlendFactor::One,
        dst: BlendFactor::Zero,
    };

    /// Adds to the target.
    pub const ADDITIVE: Self = Self {
        src: BlendFactor::One,
        dst: BlendFactor::One,
    };

    /// Alpha-over compositing.
    pub const ALPHA: Self = Self {
        src: BlendFactor::SrcAlpha,
        dst: BlendFactor::OneMinusSrcAlpha,
    };
}

/// Column-major 4x4 transform from normalized canvas space into a stage's
/// parameter-view space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform(pub [f32; 16]);

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ViewTransform {
    /// Identity.
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Uniform scale followed by a translation.
    pub fn scale_translate(scale: f32, tx: f32, ty: f32) -> Self {
        let mut m = Self::IDENTITY.0;
        m[0] = scale;
        m[5] = scale;
        m[12] = tx;
        m[13] = ty;
        Self(m)
    }

    /// Transforms a 2D point (z = 0, w = 1).
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.0;
        let w = m[3] * x + m[7] * y + m[15];
        let px = m[0] * x + m[4] * y + m[12];
        let py = m[1] * x + m[5] * y + m[13];
        if w.abs() > f32::EPSILON {
            (px / w, py / w)
        } else {
            (px, py)
        }
    }
}

/// Shared handle to a frame decoder attached to a video- or image-backed stage.
pub type DecoderHandle = Arc<Mutex<dyn FrameDecoder + Send>>;

/// One node instance: type, parameters, wiring, sampling and time window.
///
/// Stages are owned by a [`StageCollection`](crate::graph::StageCollection);
/// runtime evaluation state lives in the context, not here.
#[derive(Clone)]
pub struct Stage {
    pub(crate) id: StageId,
    pub(crate) node_type: NodeTypeId,
    /// Packed parameter values.
    pub params: ParameterBlock,
    pub(crate) inputs: [Option<StageId>; MAX_INPUTS],
    pub(crate) multiplex: [Option<StageId>; MAX_INPUTS],
    pub(crate) used_by_others: u32,
    /// Per-slot samplers.
    pub samplers: [Sampler; MAX_INPUTS],
    /// First frame of the active window (inclusive).
    pub start_frame: i32,
    /// End of the active window (exclusive).
    pub end_frame: i32,
    /// Blend applied when drawing.
    pub blend: BlendState,
    /// Attach a depth buffer to the target.
    pub depth_buffer: bool,
    /// Clear the target before drawing.
    pub clear_buffer: bool,
    /// Canvas-to-parameter transform for mouse input.
    pub view: ViewTransform,
    /// Source frames for video- or image-backed stages.
    pub decoder: Option<DecoderHandle>,
    /// Parameters pinned to the canvas, one bit per parameter.
    pub pinned_params: u32,
    /// Pinned slots: low 8 bits outputs, next 8 bits inputs.
    pub pinned_io: u32,
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("inputs", &self.inputs)
            .field("multiplex", &self.multiplex)
            .field("used_by_others", &self.used_by_others)
            .field("start_frame", &self.start_frame)
            .field("end_frame", &self.end_frame)
            .field("decoder", &self.decoder.is_some())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Stage {
    fn eq(&self, other: &Self) -> bool {
        let same_decoder = match (&self.decoder, &other.decoder) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.id == other.id
            && self.node_type == other.node_type
            && self.params == other.params
            && self.inputs == other.inputs
            && self.multiplex == other.multiplex
            && self.used_by_others == other.used_by_others
            && self.samplers == other.samplers
            && self.start_frame == other.start_frame
            && self.end_frame == other.end_frame
            && self.blend == other.blend
            && self.depth_buffer == other.depth_buffer
            && self.clear_buffer == other.clear_buffer
            && self.view == other.view
            && self.pinned_params == other.pinned_params
            && self.pinned_io == other.pinned_io
            && same_decoder
    }
}

impl Stage {
    pub(crate) fn new(id: StageId, node_type: NodeTypeId, params: ParameterBlock) -> Self {
        Self {
            id,
            node_type,
            params,
            inputs: [None; MAX_INPUTS],
            multiplex: [None; MAX_INPUTS],
            used_by_others: 0,
            samplers: [Sampler::default(); MAX_INPUTS],
            start_frame: 0,
            end_frame: 1,
            blend: BlendState::default(),
            depth_buffer: false,
            clear_buffer: true,
            view: ViewTransform::default(),
            decoder: None,
            pinned_params: 0,
            pinned_io: 0,
        }
    }

    /// Stable id.
    pub fn id(&self) -> StageId {
        self.id
    }

    /// Node type.
    pub fn node_type(&self) -> NodeTypeId {
        self.node_type
    }

    /// Raw connection of `slot`, ignoring multiplex overrides.
    pub fn input(&self, slot: usize) -> Option<StageId> {
        self.inputs.get(slot).copied().flatten()
    }

    /// All raw connections.
    pub fn inputs(&self) -> &[Option<StageId>; MAX_INPUTS] {
        &self.inputs
    }

    /// Multiplex override of `slot`.
    pub fn multiplex_override(&self, slot: usize) -> Option<StageId> {
        self.multiplex.get(slot).copied().flatten()
    }

    /// Number of raw connections other stages hold to this one.
    pub fn used_by_others(&self) -> u32 {
        self.used_by_others
    }

    /// Number of frames in the active window.
    pub fn duration(&self) -> i32 {
        (self.end_frame - self.start_frame).max(0)
    }

    /// Toggles the pin of parameter `index`.
    pub fn toggle_param_pin(&mut self, index: usize) {
        if index < 32 {
            self.pinned_params ^= 1 << index;
        }
    }

    /// Returns `true` if parameter `index` is pinned.
    pub fn is_param_pinned(&self, index: usize) -> bool {
        index < 32 && self.pinned_params & (1 << index) != 0
    }

    /// Toggles the pin of an input (`is_output == false`) or output slot.
    pub fn toggle_io_pin(&mut self, slot: usize, is_output: bool) {
        if slot < 8 {
            self.pinned_io ^= 1 << Self::io_bit(slot, is_output);
        }
    }

    /// Returns `true` if the slot is pinned.
    pub fn is_io_pinned(&self, slot: usize, is_output: bool) -> bool {
        slot < 8 && self.pinned_io & (1 << Self::io_bit(slot, is_output)) != 0
    }

    fn io_bit(slot: usize, is_output: bool) -> usize {
        if is_output { slot } else { slot + 8 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> Stage {
        Stage::new(StageId(4), NodeTypeId(0), ParameterBlock::default())
    }

    #[test]
    fn test_defaults() {
        let s = stage();
        assert_eq!(s.blend, BlendState::REPLACE);
        assert_eq!(s.duration(), 1);
        assert!(s.inputs().iter().all(Option::is_none));
        assert_eq!(s.samplers[3], Sampler::default());
    }

    #[test]
    fn test_pins_split_inputs_and_outputs() {
        let mut s = stage();
        s.toggle_io_pin(2, false);
        assert!(s.is_io_pinned(2, false));
        assert!(!s.is_io_pinned(2, true));
        assert_eq!(s.pinned_io, 1 << 10);
        s.toggle_io_pin(2, false);
        assert_eq!(s.pinned_io, 0);

        s.toggle_param_pin(5);
        assert!(s.is_param_pinned(5));
        assert!(!s.is_param_pinned(40));
    }

    #[test]
    fn test_view_transform() {
        let v = ViewTransform::scale_translate(2.0, 0.5, -1.0);
        assert_eq!(v.apply(1.0, 1.0), (2.5, 1.0));
        assert_eq!(ViewTransform::IDENTITY.apply(0.3, 0.7), (0.3, 0.7));
    }
}
