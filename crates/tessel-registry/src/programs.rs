//! Fragment programs for the built-in node types.
//!
//! Programs read parameters by index; the indices follow the schemas
//! registered in `lib.rs`.

use tessel_core::{FragmentInput, ProgramLibrary};

/// Library with every built-in program registered.
pub fn library() -> ProgramLibrary {
    let mut lib = ProgramLibrary::new();
    lib.insert("solid", solid);
    lib.insert("checker", checker);
    lib.insert("gradient", gradient);
    lib.insert("noise", noise);
    lib.insert("circle", circle);
    lib.insert("invert", invert);
    lib.insert("blur", blur);
    lib.insert("levels", levels);
    lib.insert("transform", transform);
    lib.insert("threshold", threshold);
    lib.insert("blend", blend);
    lib.insert("pbr_material", pbr_material);
    lib.insert("copy", copy);
    lib
}

fn mix4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// --- Generators ---

fn solid(f: &FragmentInput<'_>) -> [f32; 4] {
    f.params.vec4(0)
}

/// `tiles`, `color_a`, `color_b`.
fn checker(f: &FragmentInput<'_>) -> [f32; 4] {
    let tiles = f.params.int(0).max(1) as f32;
    let cx = (f.uv[0] * tiles).floor() as i32;
    let cy = (f.uv[1] * tiles).floor() as i32;
    if (cx + cy).rem_euclid(2) == 0 {
        f.params.vec4(1)
    } else {
        f.params.vec4(2)
    }
}

/// `direction` (horizontal, vertical, radial), `color_a`, `color_b`.
fn gradient(f: &FragmentInput<'_>) -> [f32; 4] {
    let [u, v] = f.uv;
    let t = match f.params.int(0) {
        1 => v,
        2 => {
            let (dx, dy) = (u - 0.5, v - 0.5);
            ((dx * dx + dy * dy).sqrt() * 2.0).min(1.0)
        }
        _ => u,
    };
    mix4(f.params.vec4(1), f.params.vec4(2), t)
}

fn hash(x: i32, y: i32, seed: i32) -> f32 {
    let mut h = (x as u32)
        .wrapping_mul(0x8da6_b343)
        .wrapping_add((y as u32).wrapping_mul(0xd816_3841))
        .wrapping_add((seed as u32).wrapping_mul(0xcb1a_b31f));
    h ^= h >> 13;
    h = h.wrapping_mul(0x5bd1_e995);
    h ^= h >> 15;
    (h & 0x00ff_ffff) as f32 / 16_777_215.0
}

/// Bilinear value noise, tileable with period `period`.
fn value_noise(x: f32, y: f32, period: i32, seed: i32) -> f32 {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (sx, sy) = (fx * fx * (3.0 - 2.0 * fx), fy * fy * (3.0 - 2.0 * fy));
    let (ix, iy) = (x0 as i32, y0 as i32);
    let at = |dx: i32, dy: i32| {
        hash(
            (ix + dx).rem_euclid(period),
            (iy + dy).rem_euclid(period),
            seed,
        )
    };
    let top = at(0, 0) + (at(1, 0) - at(0, 0)) * sx;
    let bottom = at(0, 1) + (at(1, 1) - at(0, 1)) * sx;
    top + (bottom - top) * sy
}

/// `scale`, `octaves`, `seed`, `persistence`.
fn noise(f: &FragmentInput<'_>) -> [f32; 4] {
    let scale = f.params.float(0).max(1.0);
    let octaves = f.params.int(1).clamp(1, 8);
    let seed = f.params.int(2);
    let persistence = f.params.float(3).clamp(0.0, 1.0);

    let (mut sum, mut amp, mut norm, mut freq) = (0.0, 1.0, 0.0, scale);
    for octave in 0..octaves {
        let period = freq.round().max(1.0) as i32;
        sum += value_noise(
            f.uv[0] * period as f32,
            f.uv[1] * period as f32,
            period,
            seed.wrapping_add(octave),
        ) * amp;
        norm += amp;
        amp *= persistence;
        freq *= 2.0;
    }
    let v = if norm > 0.0 { sum / norm } else { 0.0 };
    [v, v, v, 1.0]
}

/// `center`, `radius`, `softness`, `color`. A held left button moves the
/// center to the pointer.
fn circle(f: &FragmentInput<'_>) -> [f32; 4] {
    let mouse = f.info.mouse;
    let [cx, cy] = if mouse.buttons & 1 != 0 {
        [mouse.x, mouse.y]
    } else {
        f.params.vec2(0)
    };
    let radius = f.params.float(1);
    let softness = f.params.float(2).max(0.0);
    let (dx, dy) = (f.uv[0] - cx, f.uv[1] - cy);
    let d = (dx * dx + dy * dy).sqrt();
    let coverage = 1.0 - smoothstep(radius - softness, radius + softness * 0.5, d);
    let color = f.params.vec4(3);
    [color[0], color[1], color[2], color[3] * coverage]
}

// --- Filters ---

fn invert(f: &FragmentInput<'_>) -> [f32; 4] {
    let c = f.input(0);
    [1.0 - c[0], 1.0 - c[1], 1.0 - c[2], c[3]]
}

/// Box blur; `radius` in texels, capped at 8.
fn blur(f: &FragmentInput<'_>) -> [f32; 4] {
    let r = f.params.int(0).clamp(0, 8);
    if r == 0 {
        return f.input(0);
    }
    let [tx, ty] = f.texel_size();
    let mut acc = [0.0f32; 4];
    for j in -r..=r {
        for i in -r..=r {
            let c = f.sample(0, [f.uv[0] + i as f32 * tx, f.uv[1] + j as f32 * ty]);
            for k in 0..4 {
                acc[k] += c[k];
            }
        }
    }
    let n = ((2 * r + 1) * (2 * r + 1)) as f32;
    acc.map(|c| c / n)
}

/// `in_low`, `in_high`, `gamma`, `out_low`, `out_high`; alpha untouched.
fn levels(f: &FragmentInput<'_>) -> [f32; 4] {
    let c = f.input(0);
    let (in_lo, in_hi) = (f.params.float(0), f.params.float(1));
    let gamma = f.params.float(2).max(0.01);
    let (out_lo, out_hi) = (f.params.float(3), f.params.float(4));
    let span = (in_hi - in_lo).max(1e-5);
    let map = |x: f32| {
        let t = ((x - in_lo) / span).clamp(0.0, 1.0).powf(1.0 / gamma);
        out_lo + (out_hi - out_lo) * t
    };
    [map(c[0]), map(c[1]), map(c[2]), c[3]]
}

/// `offset`, `scale`, `rotation` around the texture center.
fn transform(f: &FragmentInput<'_>) -> [f32; 4] {
    let [ox, oy] = f.params.vec2(0);
    let [sx, sy] = f.params.vec2(1);
    let (sin, cos) = f.params.float(2).sin_cos();
    let (x, y) = (f.uv[0] - 0.5 - ox, f.uv[1] - 0.5 - oy);
    let (rx, ry) = (x * cos + y * sin, -x * sin + y * cos);
    let safe = |s: f32| if s.abs() < 1e-5 { 1e-5 } else { s };
    f.sample(0, [rx / safe(sx) + 0.5, ry / safe(sy) + 0.5])
}

/// `level`, `softness` on luminance.
fn threshold(f: &FragmentInput<'_>) -> [f32; 4] {
    let c = f.input(0);
    let luma = 0.2126 * c[0] + 0.7152 * c[1] + 0.0722 * c[2];
    let level = f.params.float(0);
    let soft = f.params.float(1).max(0.0);
    let v = smoothstep(level - soft * 0.5, level + soft * 0.5, luma);
    [v, v, v, c[3]]
}

/// `mode` (add, multiply, mix), `amount`.
fn blend(f: &FragmentInput<'_>) -> [f32; 4] {
    let (a, b) = (f.input(0), f.input(1));
    let amount = f.params.float(1).clamp(0.0, 1.0);
    let combined = match f.params.int(0) {
        0 => [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3].max(b[3])],
        1 => [a[0] * b[0], a[1] * b[1], a[2] * b[2], a[3] * b[3]],
        _ => b,
    };
    mix4(a, combined, amount)
}

/// Packs albedo with roughness in alpha; `metallic` darkens the diffuse part.
fn pbr_material(f: &FragmentInput<'_>) -> [f32; 4] {
    let albedo = if f.is_bound(0) {
        f.input(0)
    } else {
        f.params.vec4(0)
    };
    let roughness = if f.is_bound(1) {
        f.input(1)[0]
    } else {
        f.params.float(1)
    };
    let metallic = f.params.float(2).clamp(0.0, 1.0);
    let diffuse = 1.0 - 0.5 * metallic;
    [
        albedo[0] * diffuse,
        albedo[1] * diffuse,
        albedo[2] * diffuse,
        roughness.clamp(0.0, 1.0),
    ]
}

fn copy(f: &FragmentInput<'_>) -> [f32; 4] {
    f.input(0)
}
