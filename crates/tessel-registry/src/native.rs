//! Native executors: CPU code that talks to the backend directly.

use tessel_core::{ExecError, NativeCall, NativeStatus, PixelBuffer};

/// Uploads the decoded frame at the stage's local time. Stages without a
/// decoder produce transparent black.
pub fn image_source(call: &mut NativeCall<'_>) -> Result<NativeStatus, ExecError> {
    let desc = call.target_desc;
    let Some(decoder) = call.decoder else {
        call.backend
            .upload_pixels(call.target, &PixelBuffer::new(desc.width, desc.height))?;
        return Ok(NativeStatus::Done);
    };
    let offset = call.params.int(0);
    let pixels = {
        let mut decoder = decoder.lock();
        let count = decoder.frame_count();
        if count == 0 {
            return Err(ExecError::Native("decoder has no frames".into()));
        }
        decoder.decode_frame(source_frame(call.info.local_time, offset, count))?
    };
    tracing::trace!(stage = %call.stage, w = pixels.width, h = pixels.height, "source frame uploaded");
    call.backend.upload_pixels(call.target, &pixels)?;
    Ok(NativeStatus::Done)
}

/// Decoder frame shown at `local_time`, clamped to the clip. `count` > 0.
fn source_frame(local_time: i32, offset: i32, count: u32) -> u32 {
    let frame = (i64::from(local_time) + i64::from(offset)).clamp(0, i64::from(count) - 1);
    u32::try_from(frame).unwrap_or(0)
}

/// Box blur computed one horizontal band per call.
///
/// Parameters: `radius` (texels), `bands`. The stage stays processing until
/// the last band is written; `progress` encodes the next band.
pub fn accumulate(call: &mut NativeCall<'_>) -> Result<NativeStatus, ExecError> {
    let desc = call.target_desc;
    let Some(input) = call.inputs[0] else {
        call.backend
            .upload_pixels(call.target, &PixelBuffer::new(desc.width, desc.height))?;
        return Ok(NativeStatus::Done);
    };
    let radius = call.params.int(0).clamp(0, 16);
    let bands = call.params.int(1).clamp(1, 64) as u32;
    let band = ((call.progress * bands as f32).round() as u32).min(bands - 1);

    let source = call.backend.read_pixels(input)?;
    let mut out = call.backend.read_pixels(call.target)?;
    let rows_per_band = desc.height.div_ceil(bands);
    let first = band * rows_per_band;
    let last = (first + rows_per_band).min(desc.height);
    for y in first..last {
        for x in 0..desc.width {
            out.set(x, y, box_average(&source, desc.width, desc.height, x, y, radius));
        }
    }
    call.backend.upload_pixels(call.target, &out)?;

    if band + 1 >= bands {
        Ok(NativeStatus::Done)
    } else {
        Ok(NativeStatus::Pending {
            progress: (band + 1) as f32 / bands as f32,
        })
    }
}

/// Average of the `(2r+1)^2` window around `(x, y)` in target space,
/// sampling `source` with clamped nearest lookups.
fn box_average(source: &PixelBuffer, width: u32, height: u32, x: u32, y: u32, r: i32) -> [f32; 4] {
    let (sw, sh) = (source.width.max(1) as i64, source.height.max(1) as i64);
    let map = |v: i64, from: u32, to: i64| (v * to / i64::from(from.max(1))).clamp(0, to - 1);
    let mut acc = [0.0f32; 4];
    let mut n = 0.0;
    for dy in -r..=r {
        for dx in -r..=r {
            let tx = (i64::from(x) + i64::from(dx)).clamp(0, i64::from(width) - 1);
            let ty = (i64::from(y) + i64::from(dy)).clamp(0, i64::from(height) - 1);
            let (sx, sy) = (map(tx, width, sw), map(ty, height, sh));
            if let Some(c) = source.get(sx as u32, sy as u32) {
                for k in 0..4 {
                    acc[k] += c[k];
                }
                n += 1.0;
            }
        }
    }
    if n > 0.0 { acc.map(|c| c / n) } else { acc }
}
