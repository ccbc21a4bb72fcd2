//! CPU reference backend.
//!
//! [`SoftwareBackend`] implements [`RenderBackend`] with plain `Vec`s of
//! RGBA floats. Programs are Rust functions evaluated once per texel, looked
//! up by name in a shared [`ProgramLibrary`]. It is slow, deterministic, and
//! good enough for tests, the command-line baker, and small previews.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{DrawCall, PixelBuffer, Rect, RenderBackend, TargetDesc, TextureHandle};
use crate::context::EvaluationInfo;
use crate::error::BackendError;
use crate::param::ParamView;
use crate::stage::{BlendFactor, FilterMode, MAX_INPUTS, Sampler, WrapMode};

/// Per-texel program.
pub type FragmentFn = fn(&FragmentInput<'_>) -> [f32; 4];

/// Named fragment programs.
#[derive(Debug, Clone, Default)]
pub struct ProgramLibrary {
    programs: HashMap<String, FragmentFn>,
}

impl ProgramLibrary {
    /// Empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a program.
    pub fn insert(&mut self, name: impl Into<String>, program: FragmentFn) {
        self.programs.insert(name.into(), program);
    }

    /// Looks up a program.
    pub fn get(&self, name: &str) -> Option<FragmentFn> {
        self.programs.get(name).copied()
    }

    /// Number of programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// A bound input as seen by a fragment program.
#[derive(Debug, Clone, Copy)]
pub struct SampledTexture<'a> {
    width: u32,
    height: u32,
    texels: &'a [[f32; 4]],
    sampler: Sampler,
}

impl SampledTexture<'_> {
    /// Samples at normalized `uv` using the slot's wrap and filter modes.
    pub fn sample(&self, uv: [f32; 2]) -> [f32; 4] {
        if self.width == 0 || self.height == 0 {
            return [0.0; 4];
        }
        let (w, h) = (self.width as f32, self.height as f32);
        let x = uv[0] * w - 0.5;
        let y = uv[1] * h - 0.5;
        match self.sampler.filter_mag {
            FilterMode::Nearest => self.texel(x.round() as i64, y.round() as i64),
            FilterMode::Linear => {
                let (x0, y0) = (x.floor(), y.floor());
                let (fx, fy) = (x - x0, y - y0);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let a = self.texel(x0, y0);
                let b = self.texel(x0 + 1, y0);
                let c = self.texel(x0, y0 + 1);
                let d = self.texel(x0 + 1, y0 + 1);
                let mut out = [0.0; 4];
                for i in 0..4 {
                    let top = a[i] + (b[i] - a[i]) * fx;
                    let bottom = c[i] + (d[i] - c[i]) * fx;
                    out[i] = top + (bottom - top) * fy;
                }
                out
            }
        }
    }

    /// Texel at integer coordinates, wrapped per the sampler.
    pub fn texel(&self, x: i64, y: i64) -> [f32; 4] {
        let Some(x) = wrap(x, self.width, self.sampler.wrap_u) else {
            return [0.0; 4];
        };
        let Some(y) = wrap(y, self.height, self.sampler.wrap_v) else {
            return [0.0; 4];
        };
        self.texels[y * self.width as usize + x]
    }

    /// Dimensions in texels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

fn wrap(coord: i64, size: u32, mode: WrapMode) -> Option<usize> {
    let n = i64::from(size);
    let v = match mode {
        WrapMode::Repeat => coord.rem_euclid(n),
        WrapMode::ClampToEdge => coord.clamp(0, n - 1),
        WrapMode::ClampToBorder => {
            if coord < 0 || coord >= n {
                return None;
            }
            coord
        }
        WrapMode::MirroredRepeat => {
            let period = coord.rem_euclid(2 * n);
            if period < n { period } else { 2 * n - 1 - period }
        }
    };
    Some(v as usize)
}

/// Everything a fragment program can read for one texel.
#[derive(Debug, Clone, Copy)]
pub struct FragmentInput<'a> {
    /// Normalized texel center.
    pub uv: [f32; 2],
    /// Cubemap face, 0 for flat targets.
    pub face: u32,
    /// Target size in texels.
    pub size: (u32, u32),
    /// Stage parameters.
    pub params: ParamView<'a>,
    /// Per-pass evaluation info.
    pub info: &'a EvaluationInfo,
    inputs: &'a [Option<SampledTexture<'a>>; MAX_INPUTS],
}

impl FragmentInput<'_> {
    /// Samples input `slot` at `uv`; unbound slots read transparent black.
    pub fn sample(&self, slot: usize, uv: [f32; 2]) -> [f32; 4] {
        match self.inputs.get(slot) {
            Some(Some(tex)) => tex.sample(uv),
            _ => [0.0; 4],
        }
    }

    /// Samples input `slot` at this texel.
    pub fn input(&self, slot: usize) -> [f32; 4] {
        self.sample(slot, self.uv)
    }

    /// Returns `true` if `slot` has a texture bound.
    pub fn is_bound(&self, slot: usize) -> bool {
        matches!(self.inputs.get(slot), Some(Some(_)))
    }

    /// Size of one texel in uv units.
    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.size.0.max(1) as f32, 1.0 / self.size.1.max(1) as f32]
    }
}

struct SoftTarget {
    desc: TargetDesc,
    texels: Vec<[f32; 4]>,
}

/// CPU implementation of [`RenderBackend`].
pub struct SoftwareBackend {
    programs: Arc<ProgramLibrary>,
    targets: HashMap<u32, SoftTarget>,
    next_handle: u32,
    texel_budget: Option<usize>,
    draws: usize,
}

impl SoftwareBackend {
    /// Creates a backend running programs from `programs`.
    pub fn new(programs: Arc<ProgramLibrary>) -> Self {
        Self {
            programs,
            targets: HashMap::new(),
            next_handle: 1,
            texel_budget: None,
            draws: 0,
        }
    }

    /// Caps the texels held by live targets; allocations past the cap fail.
    pub fn with_texel_budget(mut self, texels: usize) -> Self {
        self.texel_budget = Some(texels);
        self
    }

    /// Number of live targets.
    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    /// Number of draws issued.
    pub fn draw_count(&self) -> usize {
        self.draws
    }

    /// Description of a live target.
    pub fn desc(&self, handle: TextureHandle) -> Option<TargetDesc> {
        self.targets.get(&handle.0).map(|t| t.desc)
    }

    fn live_texels(&self) -> usize {
        self.targets.values().map(|t| t.texels.len()).sum()
    }

    fn target(&self, handle: TextureHandle) -> Result<&SoftTarget, BackendError> {
        self.targets
            .get(&handle.0)
            .ok_or(BackendError::UnknownTexture(handle.0))
    }
}

fn blend_factor(factor: BlendFactor, src: [f32; 4], dst: [f32; 4], channel: usize) -> f32 {
    const CONSTANT: [f32; 4] = [1.0; 4];
    match factor {
        BlendFactor::Zero => 0.0,
        BlendFactor::One => 1.0,
        BlendFactor::SrcColor => src[channel],
        BlendFactor::OneMinusSrcColor => 1.0 - src[channel],
        BlendFactor::DstColor => dst[channel],
        BlendFactor::OneMinusDstColor => 1.0 - dst[channel],
        BlendFactor::SrcAlpha => src[3],
        BlendFactor::OneMinusSrcAlpha => 1.0 - src[3],
        BlendFactor::DstAlpha => dst[3],
        BlendFactor::OneMinusDstAlpha => 1.0 - dst[3],
        BlendFactor::ConstantColor => CONSTANT[channel],
        BlendFactor::OneMinusConstantColor => 1.0 - CONSTANT[channel],
        BlendFactor::ConstantAlpha => CONSTANT[3],
        BlendFactor::OneMinusConstantAlpha => 1.0 - CONSTANT[3],
        BlendFactor::SrcAlphaSaturate => {
            if channel == 3 {
                1.0
            } else {
                src[3].min(1.0 - dst[3])
            }
        }
    }
}

impl RenderBackend for SoftwareBackend {
    fn create_target(&mut self, desc: &TargetDesc) -> Result<TextureHandle, BackendError> {
        if let Some(budget) = self.texel_budget
            && self.live_texels() + desc.texel_count() > budget
        {
            return Err(BackendError::OutOfMemory {
                width: desc.width,
                height: desc.height,
            });
        }
        let handle = TextureHandle(self.next_handle);
        self.next_handle += 1;
        self.targets.insert(
            handle.0,
            SoftTarget {
                desc: *desc,
                texels: vec![[0.0; 4]; desc.texel_count()],
            },
        );
        Ok(handle)
    }

    fn destroy_target(&mut self, handle: TextureHandle) {
        self.targets.remove(&handle.0);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        let program = self
            .programs
            .get(&call.program.0)
            .ok_or_else(|| BackendError::UnknownProgram(call.program.0.clone()))?;
        let target = self.target(call.target)?;
        let desc = target.desc;

        let mut bound: [Option<SampledTexture<'_>>; MAX_INPUTS] = [None; MAX_INPUTS];
        for (slot, input) in call.inputs.iter().enumerate() {
            if let Some(input) = input {
                let tex = self.target(input.texture)?;
                bound[slot] = Some(SampledTexture {
                    width: tex.desc.width,
                    height: tex.desc.height,
                    texels: &tex.texels,
                    sampler: input.sampler,
                });
            }
        }

        let (w, h) = (desc.width, desc.height);
        let face_len = w as usize * h as usize;
        let mut out = Vec::with_capacity(desc.texel_count());
        for face in 0..desc.faces() {
            for y in 0..h {
                for x in 0..w {
                    let frag = FragmentInput {
                        uv: [(x as f32 + 0.5) / w as f32, (y as f32 + 0.5) / h as f32],
                        face,
                        size: (w, h),
                        params: call.params,
                        info: call.info,
                        inputs: &bound,
                    };
                    let src = program(&frag);
                    let i = face as usize * face_len + y as usize * w as usize + x as usize;
                    let dst = if call.clear { [0.0; 4] } else { target.texels[i] };
                    let mut px = [0.0; 4];
                    for c in 0..4 {
                        px[c] = src[c] * blend_factor(call.blend.src, src, dst, c)
                            + dst[c] * blend_factor(call.blend.dst, src, dst, c);
                    }
                    out.push(px);
                }
            }
        }

        if let Some(target) = self.targets.get_mut(&call.target.0) {
            target.texels = out;
        }
        self.draws += 1;
        Ok(())
    }

    fn blit(
        &mut self,
        src: TextureHandle,
        dst: TextureHandle,
        dst_rect: Rect,
    ) -> Result<(), BackendError> {
        let source = self.target(src)?;
        let (sw, sh) = (source.desc.width.max(1), source.desc.height.max(1));
        let dst_desc = self.target(dst)?.desc;
        let mut scaled = Vec::with_capacity(dst_rect.width as usize * dst_rect.height as usize);
        for y in 0..dst_rect.height {
            for x in 0..dst_rect.width {
                let sx = (u64::from(x) * u64::from(sw) / u64::from(dst_rect.width.max(1))) as usize;
                let sy = (u64::from(y) * u64::from(sh) / u64::from(dst_rect.height.max(1))) as usize;
                scaled.push(source.texels[sy * sw as usize + sx]);
            }
        }
        let Some(target) = self.targets.get_mut(&dst.0) else {
            return Err(BackendError::UnknownTexture(dst.0));
        };
        let mut i = 0;
        for y in 0..dst_rect.height {
            for x in 0..dst_rect.width {
                let (tx, ty) = (dst_rect.x + x, dst_rect.y + y);
                if tx < dst_desc.width && ty < dst_desc.height {
                    target.texels[ty as usize * dst_desc.width as usize + tx as usize] = scaled[i];
                }
                i += 1;
            }
        }
        Ok(())
    }

    fn read_pixels(&mut self, handle: TextureHandle) -> Result<PixelBuffer, BackendError> {
        let target = self.target(handle)?;
        Ok(PixelBuffer {
            width: target.desc.width,
            height: target.desc.height,
            faces: target.desc.faces(),
            data: target.texels.clone(),
        })
    }

    fn upload_pixels(
        &mut self,
        handle: TextureHandle,
        pixels: &PixelBuffer,
    ) -> Result<(), BackendError> {
        let target = self
            .targets
            .get_mut(&handle.0)
            .ok_or(BackendError::UnknownTexture(handle.0))?;
        let expected = target.texels.len();
        if pixels.width == target.desc.width && pixels.height == target.desc.height {
            let n = pixels.data.len().min(expected);
            target.texels[..n].copy_from_slice(&pixels.data[..n]);
            return Ok(());
        }
        if pixels.data.is_empty() || pixels.width == 0 || pixels.height == 0 {
            return Err(BackendError::SizeMismatch {
                expected,
                actual: pixels.data.len(),
            });
        }
        // Nearest-neighbour rescale of face 0 into every face.
        let (tw, th) = (target.desc.width, target.desc.height);
        let face_len = tw as usize * th as usize;
        for (i, texel) in target.texels.iter_mut().enumerate() {
            let local = i % face_len.max(1);
            let (x, y) = ((local % tw as usize) as u64, (local / tw as usize) as u64);
            let sx = (x * u64::from(pixels.width) / u64::from(tw)) as usize;
            let sy = (y * u64::from(pixels.height) / u64::from(th)) as usize;
            *texel = pixels.data[sy * pixels.width as usize + sx];
        }
        Ok(())
    }
}

/// Factory closure producing software backends over a shared library.
pub fn software_factory(programs: Arc<ProgramLibrary>) -> crate::backend::BackendFactory {
    Arc::new(move || Box::new(SoftwareBackend::new(Arc::clone(&programs))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BoundInput;
    use crate::catalog::ShaderProgram;
    use crate::stage::{BlendState, StageId};

    fn red(_: &FragmentInput<'_>) -> [f32; 4] {
        [1.0, 0.0, 0.0, 1.0]
    }

    fn half_alpha_green(_: &FragmentInput<'_>) -> [f32; 4] {
        [0.0, 1.0, 0.0, 0.5]
    }

    fn invert(f: &FragmentInput<'_>) -> [f32; 4] {
        let c = f.input(0);
        [1.0 - c[0], 1.0 - c[1], 1.0 - c[2], c[3]]
    }

    fn backend() -> SoftwareBackend {
        let mut lib = ProgramLibrary::new();
        lib.insert("red", red);
        lib.insert("green", half_alpha_green);
        lib.insert("invert", invert);
        SoftwareBackend::new(Arc::new(lib))
    }

    fn call<'a>(
        program: &'a ShaderProgram,
        target: TextureHandle,
        info: &'a EvaluationInfo,
    ) -> DrawCall<'a> {
        DrawCall {
            program,
            params: ParamView::empty(),
            inputs: [None; MAX_INPUTS],
            target,
            blend: BlendState::REPLACE,
            clear: true,
            info,
        }
    }

    #[test]
    fn test_draw_and_readback() {
        let mut b = backend();
        let t = b.create_target(&TargetDesc::new(2, 2)).unwrap();
        let info = EvaluationInfo::new(StageId(0));
        let program = ShaderProgram::new("red");
        b.draw(&call(&program, t, &info)).unwrap();
        let px = b.read_pixels(t).unwrap();
        assert!(px.data.iter().all(|p| *p == [1.0, 0.0, 0.0, 1.0]));
        assert_eq!(b.draw_count(), 1);
    }

    #[test]
    fn test_draw_reads_bound_input() {
        let mut b = backend();
        let src = b.create_target(&TargetDesc::new(2, 2)).unwrap();
        let dst = b.create_target(&TargetDesc::new(2, 2)).unwrap();
        let info = EvaluationInfo::new(StageId(0));
        let red_p = ShaderProgram::new("red");
        b.draw(&call(&red_p, src, &info)).unwrap();

        let inv = ShaderProgram::new("invert");
        let mut c = call(&inv, dst, &info);
        c.inputs[0] = Some(BoundInput {
            texture: src,
            sampler: Sampler::default(),
        });
        b.draw(&c).unwrap();
        assert_eq!(b.read_pixels(dst).unwrap().get(0, 0), Some([0.0, 1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_alpha_blend_over_existing() {
        let mut b = backend();
        let t = b.create_target(&TargetDesc::new(1, 1)).unwrap();
        let info = EvaluationInfo::new(StageId(0));
        let red_p = ShaderProgram::new("red");
        b.draw(&call(&red_p, t, &info)).unwrap();

        let green = ShaderProgram::new("green");
        let mut c = call(&green, t, &info);
        c.clear = false;
        c.blend = BlendState::ALPHA;
        b.draw(&c).unwrap();
        let px = b.read_pixels(t).unwrap().data[0];
        assert!((px[0] - 0.5).abs() < 1e-6);
        assert!((px[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_program() {
        let mut b = backend();
        let t = b.create_target(&TargetDesc::new(1, 1)).unwrap();
        let info = EvaluationInfo::new(StageId(0));
        let missing = ShaderProgram::new("nope");
        assert_eq!(
            b.draw(&call(&missing, t, &info)),
            Err(BackendError::UnknownProgram("nope".into()))
        );
    }

    #[test]
    fn test_texel_budget() {
        let mut b = backend().with_texel_budget(20);
        assert!(b.create_target(&TargetDesc::new(4, 4)).is_ok());
        assert!(matches!(
            b.create_target(&TargetDesc::new(4, 4)),
            Err(BackendError::OutOfMemory { .. })
        ));
    }

    #[test]
    fn test_blit_scales_into_rect() {
        let mut b = backend();
        let src = b.create_target(&TargetDesc::new(4, 4)).unwrap();
        let dst = b.create_target(&TargetDesc::new(8, 8)).unwrap();
        b.upload_pixels(src, &PixelBuffer::filled(4, 4, [0.25; 4])).unwrap();
        b.blit(
            src,
            dst,
            Rect {
                x: 4,
                y: 4,
                width: 2,
                height: 2,
            },
        )
        .unwrap();
        let px = b.read_pixels(dst).unwrap();
        assert_eq!(px.get(4, 4), Some([0.25; 4]));
        assert_eq!(px.get(5, 5), Some([0.25; 4]));
        assert_eq!(px.get(3, 3), Some([0.0; 4]));
        assert_eq!(px.get(6, 6), Some([0.0; 4]));
    }

    #[test]
    fn test_wrap_modes() {
        assert_eq!(wrap(-1, 4, WrapMode::Repeat), Some(3));
        assert_eq!(wrap(5, 4, WrapMode::ClampToEdge), Some(3));
        assert_eq!(wrap(4, 4, WrapMode::ClampToBorder), None);
        assert_eq!(wrap(4, 4, WrapMode::MirroredRepeat), Some(3));
        assert_eq!(wrap(-1, 4, WrapMode::MirroredRepeat), Some(0));
    }
}
