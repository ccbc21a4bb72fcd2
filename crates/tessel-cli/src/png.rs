//! PNG frame sink.

use std::collections::HashMap;
use std::path::PathBuf;

use tessel_core::{CodecError, FrameSink, PixelBuffer, StageId};

use crate::chain::frame_file_name;

/// Writes every baked frame as an RGBA8 PNG into one directory.
pub struct PngSink {
    dir: PathBuf,
    names: HashMap<StageId, String>,
    written: Vec<PathBuf>,
}

impl PngSink {
    /// Sink into `dir`; `names` maps output stages to file name prefixes.
    pub fn new(dir: impl Into<PathBuf>, names: HashMap<StageId, String>) -> Self {
        Self {
            dir: dir.into(),
            names,
            written: Vec::new(),
        }
    }
}

impl FrameSink for PngSink {
    fn write_frame(
        &mut self,
        stage: StageId,
        frame: i32,
        pixels: &PixelBuffer,
    ) -> Result<(), CodecError> {
        let node = self.names.get(&stage).map_or("stage", String::as_str);
        let path = self.dir.join(frame_file_name(node, stage, frame));
        let faces = pixels.faces.max(1);
        // Cubemaps are stacked vertically, one face after another.
        image::save_buffer_with_format(
            &path,
            &pixels.to_rgba8(),
            pixels.width,
            pixels.height * faces,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .map_err(|e| CodecError::Other(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), frame, "frame written");
        self.written.push(path);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        tracing::info!(files = self.written.len(), dir = %self.dir.display(), "png output complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_decodable_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSink::new(dir.path(), HashMap::from([(StageId(2), "solid".into())]));
        let pixels = PixelBuffer::filled(3, 2, [1.0, 0.0, 0.0, 1.0]);
        sink.write_frame(StageId(2), 5, &pixels).unwrap();
        sink.finish().unwrap();

        let path = dir.path().join("solid_2_0005.png");
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_missing_directory_is_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSink::new(dir.path().join("absent"), HashMap::new());
        let err = sink
            .write_frame(StageId(0), 0, &PixelBuffer::new(1, 1))
            .unwrap_err();
        assert!(matches!(err, CodecError::Other(_)));
    }
}
