//! Parameter schema, packed parameter blocks, and typed parameter views.
//!
//! Every node type declares an ordered list of [`ParamDescriptor`]s. A stage
//! stores its values in a [`ParameterBlock`]: a flat byte buffer whose layout
//! is the concatenation of each parameter's packed size, in schema order,
//! little-endian. The layout is fully determined by the schema, so persisted
//! bytes stay interpretable after a schema-compatible reload.
//!
//! # Example
//!
//! ```rust
//! use tessel_core::param::{ParamDescriptor, ParamType, ParamValue, ParameterBlock};
//!
//! let schema = vec![
//!     ParamDescriptor::new("scale", ParamType::Float).with_default(ParamValue::Float(4.0)),
//!     ParamDescriptor::new("tint", ParamType::Color4),
//! ];
//!
//! let mut block = ParameterBlock::from_schema(&schema);
//! assert_eq!(block.len(), 4 + 16);
//! assert_eq!(block.get(&schema, 0).unwrap(), ParamValue::Float(4.0));
//!
//! block.set(&schema, 0, &ParamValue::Float(8.0)).unwrap();
//! assert_eq!(block.view(&schema).float(0), 8.0);
//! ```

use std::fmt;

/// Maximum number of bytes stored for a filename parameter, including the
/// terminating NUL.
pub const FILENAME_CAPACITY: usize = 1024;

/// Number of control points in a ramp parameter.
pub const RAMP_POINTS: usize = 8;

/// Errors raised by parameter block access.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    /// Parameter index past the end of the schema.
    #[error("parameter index {0} out of range")]
    IndexOutOfRange(usize),

    /// No parameter with this name in the schema.
    #[error("unknown parameter '{0}'")]
    UnknownName(String),

    /// Value variant does not fit the parameter's declared type.
    #[error("parameter {index} expects a {expected} value")]
    TypeMismatch {
        /// Parameter index.
        index: usize,
        /// Declared type.
        expected: ParamType,
    },

    /// Raw bytes do not match the schema's packed size.
    #[error("parameter block holds {actual} bytes, schema requires {expected}")]
    SizeMismatch {
        /// Size required by the schema.
        expected: usize,
        /// Size supplied.
        actual: usize,
    },

    /// Text could not be parsed as a value of the given type.
    #[error("cannot parse '{input}' as {ty}: {reason}")]
    Parse {
        /// Input text.
        input: String,
        /// Target type.
        ty: ParamType,
        /// What went wrong.
        reason: String,
    },
}

/// Declared type of a parameter. Determines packed size and animation curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Single float.
    Float,
    /// Two floats.
    Float2,
    /// Three floats.
    Float3,
    /// Four floats.
    Float4,
    /// RGBA color, four floats.
    Color4,
    /// Signed integer.
    Int,
    /// Two signed integers.
    Int2,
    /// Eight (position, value) control points.
    Ramp,
    /// Angle in radians.
    Angle,
    /// Two angles.
    Angle2,
    /// Three angles.
    Angle3,
    /// Four angles.
    Angle4,
    /// Index into the descriptor's enum labels.
    Enum,
    /// Path of a file to read.
    FilenameRead,
    /// Path of a file to write.
    FilenameWrite,
    /// Button that forces evaluation; carries no data.
    ForceEvaluate,
    /// Boolean stored as a 32-bit integer.
    Bool,
    /// Eight (position, r, g, b) control points.
    Ramp4,
    /// Position, direction, up and lens vectors.
    Camera,
    /// Selected index of a multiplexed input.
    Multiplexer,
}

/// Interpolation used when animating a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveKind {
    /// Not animatable.
    None,
    /// Holds the previous key until the next one.
    Discrete,
    /// Linear interpolation, rounded for integers.
    Linear,
    /// Linear interpolation of floats.
    Smooth,
}

impl ParamType {
    /// Number of bytes the type occupies in a [`ParameterBlock`].
    pub const fn packed_size(self) -> usize {
        match self {
            Self::Float | Self::Angle | Self::Int | Self::Enum | Self::Bool | Self::Multiplexer => 4,
            Self::Float2 | Self::Angle2 | Self::Int2 => 8,
            Self::Float3 | Self::Angle3 => 12,
            Self::Float4 | Self::Angle4 | Self::Color4 => 16,
            Self::Ramp => RAMP_POINTS * 2 * 4,
            Self::Ramp4 => RAMP_POINTS * 4 * 4,
            Self::FilenameRead | Self::FilenameWrite => FILENAME_CAPACITY,
            Self::ForceEvaluate => 0,
            Self::Camera => 16 * 4,
        }
    }

    /// Animation curve used for this type.
    pub const fn curve_kind(self) -> CurveKind {
        match self {
            Self::Float
            | Self::Float2
            | Self::Float3
            | Self::Float4
            | Self::Color4
            | Self::Angle
            | Self::Angle2
            | Self::Angle3
            | Self::Angle4
            | Self::Camera => CurveKind::Smooth,
            Self::Int | Self::Int2 => CurveKind::Linear,
            Self::Enum | Self::Bool | Self::Multiplexer => CurveKind::Discrete,
            Self::Ramp
            | Self::Ramp4
            | Self::FilenameRead
            | Self::FilenameWrite
            | Self::ForceEvaluate => CurveKind::None,
        }
    }

    /// Returns `true` if keyframes may be attached to this type.
    pub const fn is_animatable(self) -> bool {
        !matches!(self.curve_kind(), CurveKind::None)
    }

    /// Lowercase name used in listings and error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Float2 => "float2",
            Self::Float3 => "float3",
            Self::Float4 => "float4",
            Self::Color4 => "color4",
            Self::Int => "int",
            Self::Int2 => "int2",
            Self::Ramp => "ramp",
            Self::Angle => "angle",
            Self::Angle2 => "angle2",
            Self::Angle3 => "angle3",
            Self::Angle4 => "angle4",
            Self::Enum => "enum",
            Self::FilenameRead => "filename_read",
            Self::FilenameWrite => "filename_write",
            Self::ForceEvaluate => "force_evaluate",
            Self::Bool => "bool",
            Self::Ramp4 => "ramp4",
            Self::Camera => "camera",
            Self::Multiplexer => "multiplexer",
        }
    }

    /// Default value for the type: zeros, an identity camera, or an empty path.
    pub fn zero_value(self) -> ParamValue {
        match self {
            Self::Float | Self::Angle => ParamValue::Float(0.0),
            Self::Float2 | Self::Angle2 => ParamValue::Float2([0.0; 2]),
            Self::Float3 | Self::Angle3 => ParamValue::Float3([0.0; 3]),
            Self::Float4 | Self::Angle4 | Self::Color4 => ParamValue::Float4([0.0; 4]),
            Self::Int | Self::Enum | Self::Multiplexer => ParamValue::Int(0),
            Self::Int2 => ParamValue::Int2([0; 2]),
            Self::Bool => ParamValue::Bool(false),
            Self::Ramp => ParamValue::Ramp([[0.0; 2]; RAMP_POINTS]),
            Self::Ramp4 => ParamValue::Ramp4([[0.0; 4]; RAMP_POINTS]),
            Self::FilenameRead | Self::FilenameWrite => ParamValue::Filename(String::new()),
            Self::ForceEvaluate => ParamValue::None,
            Self::Camera => ParamValue::Camera(Camera::default()),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Camera parameter: four homogeneous vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Eye position.
    pub position: [f32; 4],
    /// View direction.
    pub direction: [f32; 4],
    /// Up vector.
    pub up: [f32; 4],
    /// Field of view, near, far, aspect.
    pub lens: [f32; 4],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0, 1.0],
            direction: [0.0, 0.0, 1.0, 0.0],
            up: [0.0, 1.0, 0.0, 0.0],
            lens: [0.8, 0.01, 100.0, 1.0],
        }
    }
}

impl Camera {
    fn to_array(self) -> [f32; 16] {
        let mut out = [0.0; 16];
        out[0..4].copy_from_slice(&self.position);
        out[4..8].copy_from_slice(&self.direction);
        out[8..12].copy_from_slice(&self.up);
        out[12..16].copy_from_slice(&self.lens);
        out
    }

    fn from_array(v: &[f32; 16]) -> Self {
        let pick = |i: usize| [v[i], v[i + 1], v[i + 2], v[i + 3]];
        Self {
            position: pick(0),
            direction: pick(4),
            up: pick(8),
            lens: pick(12),
        }
    }
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// `Float`, `Angle`.
    Float(f32),
    /// `Float2`, `Angle2`.
    Float2([f32; 2]),
    /// `Float3`, `Angle3`.
    Float3([f32; 3]),
    /// `Float4`, `Angle4`, `Color4`.
    Float4([f32; 4]),
    /// `Int`, `Enum`, `Multiplexer`.
    Int(i32),
    /// `Int2`.
    Int2([i32; 2]),
    /// `Bool`.
    Bool(bool),
    /// `Ramp`.
    Ramp([[f32; 2]; RAMP_POINTS]),
    /// `Ramp4`.
    Ramp4([[f32; 4]; RAMP_POINTS]),
    /// `FilenameRead`, `FilenameWrite`.
    Filename(String),
    /// `Camera`.
    Camera(Camera),
    /// `ForceEvaluate`.
    None,
}

impl ParamValue {
    /// Returns `true` if this value can be stored in a parameter of type `ty`.
    pub fn fits(&self, ty: ParamType) -> bool {
        use ParamType as T;
        matches!(
            (self, ty),
            (Self::Float(_), T::Float | T::Angle)
                | (Self::Float2(_), T::Float2 | T::Angle2)
                | (Self::Float3(_), T::Float3 | T::Angle3)
                | (Self::Float4(_), T::Float4 | T::Angle4 | T::Color4)
                | (Self::Int(_), T::Int | T::Enum | T::Multiplexer)
                | (Self::Int2(_), T::Int2)
                | (Self::Bool(_), T::Bool)
                | (Self::Ramp(_), T::Ramp)
                | (Self::Ramp4(_), T::Ramp4)
                | (Self::Filename(_), T::FilenameRead | T::FilenameWrite)
                | (Self::Camera(_), T::Camera)
                | (Self::None, T::ForceEvaluate)
        )
    }

    /// Interpolates toward `other` by `t` using the curve of `ty`.
    ///
    /// Mismatched variants and non-interpolating curves hold `self` until
    /// `t` reaches 1.
    pub fn interpolate(&self, other: &Self, t: f32, ty: ParamType) -> Self {
        let hold = || if t >= 1.0 { other.clone() } else { self.clone() };
        match ty.curve_kind() {
            CurveKind::None | CurveKind::Discrete => return hold(),
            CurveKind::Linear | CurveKind::Smooth => {}
        }
        let lerp = |a: f32, b: f32| a + (b - a) * t;
        let lerp_n = |a: &[f32], b: &[f32], out: &mut [f32]| {
            for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
                *o = lerp(*x, *y);
            }
        };
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => Self::Float(lerp(*a, *b)),
            (Self::Float2(a), Self::Float2(b)) => {
                let mut o = [0.0; 2];
                lerp_n(a, b, &mut o);
                Self::Float2(o)
            }
            (Self::Float3(a), Self::Float3(b)) => {
                let mut o = [0.0; 3];
                lerp_n(a, b, &mut o);
                Self::Float3(o)
            }
            (Self::Float4(a), Self::Float4(b)) => {
                let mut o = [0.0; 4];
                lerp_n(a, b, &mut o);
                Self::Float4(o)
            }
            (Self::Int(a), Self::Int(b)) => Self::Int(lerp(*a as f32, *b as f32).round() as i32),
            (Self::Int2(a), Self::Int2(b)) => Self::Int2([
                lerp(a[0] as f32, b[0] as f32).round() as i32,
                lerp(a[1] as f32, b[1] as f32).round() as i32,
            ]),
            (Self::Camera(a), Self::Camera(b)) => {
                let (a, b) = (a.to_array(), b.to_array());
                let mut o = [0.0; 16];
                lerp_n(&a, &b, &mut o);
                Self::Camera(Camera::from_array(&o))
            }
            _ => hold(),
        }
    }

    /// Parses a textual value for a parameter described by `desc`.
    ///
    /// Vectors are comma separated, booleans accept `true/false/on/off/1/0`,
    /// enums accept a label or an index.
    pub fn parse(desc: &ParamDescriptor, input: &str) -> Result<Self, ParamError> {
        let ty = desc.ty;
        let err = |reason: &str| ParamError::Parse {
            input: input.to_string(),
            ty,
            reason: reason.to_string(),
        };
        let floats = |n: usize| -> Result<Vec<f32>, ParamError> {
            let parts: Vec<f32> = input
                .split(',')
                .map(|s| s.trim().parse::<f32>())
                .collect::<Result<_, _>>()
                .map_err(|e| err(&e.to_string()))?;
            match parts.len() {
                1 => Ok(vec![parts[0]; n]),
                len if len == n => Ok(parts),
                len => Err(err(&format!("expected {n} components, found {len}"))),
            }
        };
        let text = input.trim();
        match ty {
            ParamType::Float | ParamType::Angle => Ok(Self::Float(floats(1)?[0])),
            ParamType::Float2 | ParamType::Angle2 => {
                let v = floats(2)?;
                Ok(Self::Float2([v[0], v[1]]))
            }
            ParamType::Float3 | ParamType::Angle3 => {
                let v = floats(3)?;
                Ok(Self::Float3([v[0], v[1], v[2]]))
            }
            ParamType::Float4 | ParamType::Angle4 | ParamType::Color4 => {
                let v = floats(4)?;
                Ok(Self::Float4([v[0], v[1], v[2], v[3]]))
            }
            ParamType::Int | ParamType::Multiplexer => {
                text.parse().map(Self::Int).map_err(|e| err(&e.to_string()))
            }
            ParamType::Enum => {
                if let Some(pos) = desc
                    .enum_labels
                    .iter()
                    .position(|l| l.eq_ignore_ascii_case(text))
                {
                    return Ok(Self::Int(pos as i32));
                }
                let index: i32 = text
                    .parse()
                    .map_err(|_| err(&format!("expected one of {}", desc.enum_labels.join("|"))))?;
                if index < 0 || index as usize >= desc.enum_labels.len().max(1) {
                    return Err(err("enum index out of range"));
                }
                Ok(Self::Int(index))
            }
            ParamType::Int2 => {
                let parts: Vec<i32> = text
                    .split(',')
                    .map(|s| s.trim().parse::<i32>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| err(&e.to_string()))?;
                match parts.as_slice() {
                    [v] => Ok(Self::Int2([*v, *v])),
                    [x, y] => Ok(Self::Int2([*x, *y])),
                    _ => Err(err("expected 2 components")),
                }
            }
            ParamType::Bool => match text.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => Ok(Self::Bool(true)),
                "false" | "off" | "0" | "no" => Ok(Self::Bool(false)),
                _ => Err(err("expected true or false")),
            },
            ParamType::FilenameRead | ParamType::FilenameWrite => {
                Ok(Self::Filename(text.to_string()))
            }
            ParamType::ForceEvaluate => Ok(Self::None),
            ParamType::Ramp | ParamType::Ramp4 | ParamType::Camera => {
                Err(err("not settable from text"))
            }
        }
    }

    fn write_into(&self, out: &mut [u8]) {
        let put = |out: &mut [u8], values: &[f32]| {
            for (chunk, v) in out.chunks_exact_mut(4).zip(values) {
                chunk.copy_from_slice(&v.to_le_bytes());
            }
        };
        match self {
            Self::Float(v) => put(out, &[*v]),
            Self::Float2(v) => put(out, v),
            Self::Float3(v) => put(out, v),
            Self::Float4(v) => put(out, v),
            Self::Int(v) => out[..4].copy_from_slice(&v.to_le_bytes()),
            Self::Int2(v) => {
                out[..4].copy_from_slice(&v[0].to_le_bytes());
                out[4..8].copy_from_slice(&v[1].to_le_bytes());
            }
            Self::Bool(v) => out[..4].copy_from_slice(&i32::from(*v).to_le_bytes()),
            Self::Ramp(points) => {
                let flat: Vec<f32> = points.iter().flatten().copied().collect();
                put(out, &flat);
            }
            Self::Ramp4(points) => {
                let flat: Vec<f32> = points.iter().flatten().copied().collect();
                put(out, &flat);
            }
            Self::Filename(path) => {
                out.fill(0);
                let mut end = path.len().min(FILENAME_CAPACITY - 1);
                while !path.is_char_boundary(end) {
                    end -= 1;
                }
                out[..end].copy_from_slice(&path.as_bytes()[..end]);
            }
            Self::Camera(cam) => put(out, &cam.to_array()),
            Self::None => {}
        }
    }

    fn read_from(ty: ParamType, bytes: &[u8]) -> Self {
        let f = |i: usize| f32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]]);
        let n = |i: usize| i32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]]);
        match ty {
            ParamType::Float | ParamType::Angle => Self::Float(f(0)),
            ParamType::Float2 | ParamType::Angle2 => Self::Float2([f(0), f(1)]),
            ParamType::Float3 | ParamType::Angle3 => Self::Float3([f(0), f(1), f(2)]),
            ParamType::Float4 | ParamType::Angle4 | ParamType::Color4 => {
                Self::Float4([f(0), f(1), f(2), f(3)])
            }
            ParamType::Int | ParamType::Enum | ParamType::Multiplexer => Self::Int(n(0)),
            ParamType::Int2 => Self::Int2([n(0), n(1)]),
            ParamType::Bool => Self::Bool(n(0) != 0),
            ParamType::Ramp => {
                let mut points = [[0.0; 2]; RAMP_POINTS];
                for (i, p) in points.iter_mut().enumerate() {
                    *p = [f(i * 2), f(i * 2 + 1)];
                }
                Self::Ramp(points)
            }
            ParamType::Ramp4 => {
                let mut points = [[0.0; 4]; RAMP_POINTS];
                for (i, p) in points.iter_mut().enumerate() {
                    *p = [f(i * 4), f(i * 4 + 1), f(i * 4 + 2), f(i * 4 + 3)];
                }
                Self::Ramp4(points)
            }
            ParamType::FilenameRead | ParamType::FilenameWrite => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Self::Filename(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            ParamType::ForceEvaluate => Self::None,
            ParamType::Camera => {
                let mut v = [0.0; 16];
                for (i, c) in v.iter_mut().enumerate() {
                    *c = f(i);
                }
                Self::Camera(Camera::from_array(&v))
            }
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |v: &[f32]| v.iter().map(|x| format!("{x}")).collect::<Vec<_>>().join(",");
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Float2(v) => f.write_str(&join(v)),
            Self::Float3(v) => f.write_str(&join(v)),
            Self::Float4(v) => f.write_str(&join(v)),
            Self::Int(v) => write!(f, "{v}"),
            Self::Int2(v) => write!(f, "{},{}", v[0], v[1]),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Ramp(_) => f.write_str("<ramp>"),
            Self::Ramp4(_) => f.write_str("<ramp4>"),
            Self::Filename(p) => f.write_str(p),
            Self::Camera(_) => f.write_str("<camera>"),
            Self::None => f.write_str("-"),
        }
    }
}

/// Static description of one parameter of a node type.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    /// Parameter name, unique within its node type.
    pub name: String,
    /// Declared type.
    pub ty: ParamType,
    /// Value used for new stages.
    pub default: ParamValue,
    /// UI range minimum.
    pub min: f32,
    /// UI range maximum.
    pub max: f32,
    /// Labels for [`ParamType::Enum`] parameters.
    pub enum_labels: Vec<String>,
    /// Hidden from generic parameter editors.
    pub hidden: bool,
    /// One-line help text.
    pub description: String,
}

impl ParamDescriptor {
    /// Creates a descriptor with the type's zero value and a `0..1` range.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: ty.zero_value(),
            min: 0.0,
            max: 1.0,
            enum_labels: Vec::new(),
            hidden: false,
            description: String::new(),
        }
    }

    /// Sets the default value. Values that do not fit the type are ignored.
    pub fn with_default(mut self, value: ParamValue) -> Self {
        if value.fits(self.ty) {
            self.default = value;
        }
        self
    }

    /// Sets the UI range.
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets the enum labels.
    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.enum_labels = labels.iter().map(|s| (*s).to_string()).collect();
        self
    }

    /// Sets the help text.
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }

    /// Marks the parameter hidden.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Packed size in bytes.
    pub fn packed_size(&self) -> usize {
        self.ty.packed_size()
    }
}

/// Total packed size of a schema.
pub fn layout_size(schema: &[ParamDescriptor]) -> usize {
    schema.iter().map(ParamDescriptor::packed_size).sum()
}

/// Byte offset of parameter `index` within a block laid out by `schema`.
pub fn offset_of(schema: &[ParamDescriptor], index: usize) -> Option<usize> {
    if index >= schema.len() {
        return None;
    }
    Some(schema[..index].iter().map(ParamDescriptor::packed_size).sum())
}

/// Packed parameter values of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterBlock {
    bytes: Vec<u8>,
}

impl ParameterBlock {
    /// Creates a block filled with each parameter's default.
    pub fn from_schema(schema: &[ParamDescriptor]) -> Self {
        let mut bytes = vec![0u8; layout_size(schema)];
        let mut offset = 0;
        for desc in schema {
            let size = desc.packed_size();
            desc.default.write_into(&mut bytes[offset..offset + size]);
            offset += size;
        }
        Self { bytes }
    }

    /// Wraps raw bytes, checking them against the schema's packed size.
    pub fn from_bytes(schema: &[ParamDescriptor], bytes: Vec<u8>) -> Result<Self, ParamError> {
        let expected = layout_size(schema);
        if bytes.len() != expected {
            return Err(ParamError::SizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes })
    }

    /// Raw bytes, as uploaded to shader uniforms or persisted.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for node types without parameters.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decodes parameter `index`.
    pub fn get(&self, schema: &[ParamDescriptor], index: usize) -> Result<ParamValue, ParamError> {
        let offset = offset_of(schema, index).ok_or(ParamError::IndexOutOfRange(index))?;
        let ty = schema[index].ty;
        let bytes = self
            .bytes
            .get(offset..offset + ty.packed_size())
            .ok_or(ParamError::SizeMismatch {
                expected: layout_size(schema),
                actual: self.bytes.len(),
            })?;
        Ok(ParamValue::read_from(ty, bytes))
    }

    /// Encodes `value` into parameter `index`.
    pub fn set(
        &mut self,
        schema: &[ParamDescriptor],
        index: usize,
        value: &ParamValue,
    ) -> Result<(), ParamError> {
        let offset = offset_of(schema, index).ok_or(ParamError::IndexOutOfRange(index))?;
        let ty = schema[index].ty;
        if !value.fits(ty) {
            return Err(ParamError::TypeMismatch { index, expected: ty });
        }
        let total = self.bytes.len();
        let slot = self
            .bytes
            .get_mut(offset..offset + ty.packed_size())
            .ok_or(ParamError::SizeMismatch {
                expected: layout_size(schema),
                actual: total,
            })?;
        value.write_into(slot);
        Ok(())
    }

    /// Encodes `value` into the parameter called `name`.
    pub fn set_by_name(
        &mut self,
        schema: &[ParamDescriptor],
        name: &str,
        value: &ParamValue,
    ) -> Result<usize, ParamError> {
        let index = schema
            .iter()
            .position(|d| d.name == name)
            .ok_or_else(|| ParamError::UnknownName(name.to_string()))?;
        self.set(schema, index, value)?;
        Ok(index)
    }

    /// Read-only typed view paired with its schema.
    pub fn view<'a>(&'a self, schema: &'a [ParamDescriptor]) -> ParamView<'a> {
        ParamView {
            schema,
            bytes: &self.bytes,
        }
    }
}

/// Borrowed, schema-aware view over a parameter block.
///
/// Accessors return a zero value when the index is out of range or the
/// type differs, so fragment programs can read parameters without error
/// plumbing.
#[derive(Debug, Clone, Copy)]
pub struct ParamView<'a> {
    schema: &'a [ParamDescriptor],
    bytes: &'a [u8],
}

impl ParamView<'static> {
    /// View over no parameters.
    pub const fn empty() -> Self {
        ParamView {
            schema: &[],
            bytes: &[],
        }
    }
}

impl<'a> ParamView<'a> {
    /// Schema this view decodes with.
    pub fn schema(&self) -> &'a [ParamDescriptor] {
        self.schema
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Index of the parameter called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.schema.iter().position(|d| d.name == name)
    }

    /// Decodes parameter `index`.
    pub fn get(&self, index: usize) -> Option<ParamValue> {
        let offset = offset_of(self.schema, index)?;
        let ty = self.schema[index].ty;
        let bytes = self.bytes.get(offset..offset + ty.packed_size())?;
        Some(ParamValue::read_from(ty, bytes))
    }

    /// Scalar float parameter.
    pub fn float(&self, index: usize) -> f32 {
        match self.get(index) {
            Some(ParamValue::Float(v)) => v,
            _ => 0.0,
        }
    }

    /// Two-component parameter.
    pub fn vec2(&self, index: usize) -> [f32; 2] {
        match self.get(index) {
            Some(ParamValue::Float2(v)) => v,
            _ => [0.0; 2],
        }
    }

    /// Four-component parameter (colors included).
    pub fn vec4(&self, index: usize) -> [f32; 4] {
        match self.get(index) {
            Some(ParamValue::Float4(v)) => v,
            _ => [0.0; 4],
        }
    }

    /// Integer, enum or multiplexer parameter.
    pub fn int(&self, index: usize) -> i32 {
        match self.get(index) {
            Some(ParamValue::Int(v)) => v,
            _ => 0,
        }
    }

    /// Boolean parameter.
    pub fn flag(&self, index: usize) -> bool {
        matches!(self.get(index), Some(ParamValue::Bool(true)))
    }

    /// Filename parameter.
    pub fn filename(&self, index: usize) -> String {
        match self.get(index) {
            Some(ParamValue::Filename(p)) => p,
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("amount", ParamType::Float).with_default(ParamValue::Float(0.5)),
            ParamDescriptor::new("offset", ParamType::Float2),
            ParamDescriptor::new("mode", ParamType::Enum)
                .with_labels(&["add", "multiply", "mix"])
                .with_default(ParamValue::Int(2)),
            ParamDescriptor::new("path", ParamType::FilenameRead),
            ParamDescriptor::new("go", ParamType::ForceEvaluate),
            ParamDescriptor::new("lit", ParamType::Bool).with_default(ParamValue::Bool(true)),
        ]
    }

    #[test]
    fn test_packed_sizes() {
        assert_eq!(ParamType::Float.packed_size(), 4);
        assert_eq!(ParamType::Float3.packed_size(), 12);
        assert_eq!(ParamType::Color4.packed_size(), 16);
        assert_eq!(ParamType::Ramp.packed_size(), 64);
        assert_eq!(ParamType::Ramp4.packed_size(), 128);
        assert_eq!(ParamType::FilenameWrite.packed_size(), 1024);
        assert_eq!(ParamType::ForceEvaluate.packed_size(), 0);
        assert_eq!(ParamType::Camera.packed_size(), 64);
    }

    #[test]
    fn test_block_size_matches_schema() {
        let schema = schema();
        let block = ParameterBlock::from_schema(&schema);
        assert_eq!(block.len(), 4 + 8 + 4 + 1024 + 0 + 4);
        assert_eq!(block.len(), layout_size(&schema));
    }

    #[test]
    fn test_defaults_are_written() {
        let schema = schema();
        let block = ParameterBlock::from_schema(&schema);
        assert_eq!(block.get(&schema, 0).unwrap(), ParamValue::Float(0.5));
        assert_eq!(block.get(&schema, 2).unwrap(), ParamValue::Int(2));
        assert_eq!(block.get(&schema, 5).unwrap(), ParamValue::Bool(true));
        assert_eq!(block.get(&schema, 4).unwrap(), ParamValue::None);
    }

    #[test]
    fn test_set_rejects_wrong_variant() {
        let schema = schema();
        let mut block = ParameterBlock::from_schema(&schema);
        let before = block.clone();
        let result = block.set(&schema, 0, &ParamValue::Int(3));
        assert!(matches!(result, Err(ParamError::TypeMismatch { index: 0, .. })));
        assert_eq!(block, before);
    }

    #[test]
    fn test_set_out_of_range() {
        let schema = schema();
        let mut block = ParameterBlock::from_schema(&schema);
        assert_eq!(
            block.set(&schema, 9, &ParamValue::Float(1.0)),
            Err(ParamError::IndexOutOfRange(9))
        );
    }

    #[test]
    fn test_filename_truncates_on_char_boundary() {
        let schema = schema();
        let mut block = ParameterBlock::from_schema(&schema);
        let long = "é".repeat(600);
        block.set(&schema, 3, &ParamValue::Filename(long)).unwrap();
        let ParamValue::Filename(read) = block.get(&schema, 3).unwrap() else {
            panic!("expected filename");
        };
        assert!(read.len() <= FILENAME_CAPACITY - 1);
        assert!(read.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_from_bytes_size_check() {
        let schema = schema();
        let result = ParameterBlock::from_bytes(&schema, vec![0; 3]);
        assert!(matches!(result, Err(ParamError::SizeMismatch { actual: 3, .. })));
    }

    #[test]
    fn test_parse_enum_by_label_and_index() {
        let schema = schema();
        assert_eq!(ParamValue::parse(&schema[2], "Multiply").unwrap(), ParamValue::Int(1));
        assert_eq!(ParamValue::parse(&schema[2], "0").unwrap(), ParamValue::Int(0));
        assert!(ParamValue::parse(&schema[2], "7").is_err());
    }

    #[test]
    fn test_parse_vectors_broadcast_scalar() {
        let desc = ParamDescriptor::new("c", ParamType::Color4);
        assert_eq!(
            ParamValue::parse(&desc, "0.5").unwrap(),
            ParamValue::Float4([0.5; 4])
        );
        assert_eq!(
            ParamValue::parse(&desc, "1, 0, 0, 1").unwrap(),
            ParamValue::Float4([1.0, 0.0, 0.0, 1.0])
        );
        assert!(ParamValue::parse(&desc, "1,2").is_err());
    }

    #[test]
    fn test_interpolate_by_curve() {
        let a = ParamValue::Float(0.0);
        let b = ParamValue::Float(2.0);
        assert_eq!(a.interpolate(&b, 0.25, ParamType::Float), ParamValue::Float(0.5));

        let a = ParamValue::Int(0);
        let b = ParamValue::Int(3);
        assert_eq!(a.interpolate(&b, 0.5, ParamType::Int), ParamValue::Int(2));
        assert_eq!(a.interpolate(&b, 0.9, ParamType::Enum), ParamValue::Int(0));
        assert_eq!(a.interpolate(&b, 1.0, ParamType::Enum), ParamValue::Int(3));
    }

    #[test]
    fn test_view_accessors_default_on_mismatch() {
        let schema = schema();
        let block = ParameterBlock::from_schema(&schema);
        let view = block.view(&schema);
        assert_eq!(view.float(0), 0.5);
        assert_eq!(view.float(2), 0.0);
        assert_eq!(view.int(2), 2);
        assert!(view.flag(5));
        assert_eq!(view.index_of("offset"), Some(1));
    }
}
