//! Codec boundary: frame decoders feeding source stages and sinks receiving
//! baked frames. Concrete formats live outside the engine.

use crate::backend::PixelBuffer;
use crate::error::CodecError;
use crate::stage::StageId;

/// Produces raw frames for an image- or video-backed stage.
pub trait FrameDecoder {
    /// Number of frames in the stream. Still images report 1.
    fn frame_count(&self) -> u32;

    /// Decodes frame `frame`.
    fn decode_frame(&mut self, frame: u32) -> Result<PixelBuffer, CodecError>;
}

/// Receives baked frames from a builder job.
pub trait FrameSink {
    /// Called once per output stage and frame.
    fn write_frame(
        &mut self,
        stage: StageId,
        frame: i32,
        pixels: &PixelBuffer,
    ) -> Result<(), CodecError>;

    /// Called after the last frame.
    fn finish(&mut self) -> Result<(), CodecError> {
        Ok(())
    }
}

/// Decoder over frames already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryDecoder {
    frames: Vec<PixelBuffer>,
    decoded: Vec<u32>,
}

impl MemoryDecoder {
    /// Wraps a list of frames.
    pub fn new(frames: Vec<PixelBuffer>) -> Self {
        Self {
            frames,
            decoded: Vec::new(),
        }
    }

    /// Frames requested so far, in call order.
    pub fn decoded(&self) -> &[u32] {
        &self.decoded
    }
}

impl FrameDecoder for MemoryDecoder {
    fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    fn decode_frame(&mut self, frame: u32) -> Result<PixelBuffer, CodecError> {
        self.decoded.push(frame);
        self.frames
            .get(frame as usize)
            .cloned()
            .ok_or(CodecError::FrameOutOfRange {
                frame,
                count: self.frames.len() as u32,
            })
    }
}

/// Sink that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    /// Received frames in arrival order.
    pub frames: Vec<(StageId, i32, PixelBuffer)>,
    /// Set by [`FrameSink::finish`].
    pub finished: bool,
}

impl FrameSink for MemorySink {
    fn write_frame(
        &mut self,
        stage: StageId,
        frame: i32,
        pixels: &PixelBuffer,
    ) -> Result<(), CodecError> {
        self.frames.push((stage, frame, pixels.clone()));
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CodecError> {
        self.finished = true;
        Ok(())
    }
}
