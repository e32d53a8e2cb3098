//! Raw media isolation (C1 support).
//!
//! A captured camera frame's raw pixel buffer is never directly reachable
//! from outside this module. Consumers only ever see an [`InferenceView`],
//! which exposes metadata plus narrow "run this backend over the pixels"
//! entry points. There is no path from an `InferenceView` back to owned
//! bytes; `try_export_bytes` always fails, kept only so callers have a single
//! place to discover that raw export is unsupported rather than hitting a
//! missing-method compile error.

use crate::detect::{DetectionResult, DetectorBackend};
use crate::face::{FaceLandmarkBackend, FaceSignal};
use crate::verifier::EmbeddingBackend;
use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::time::Instant;
use zeroize::Zeroize;

/// A single captured frame. Pixel bytes are private; the only way to act on
/// them is through [`RawFrame::inference_view`].
pub struct RawFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    captured_at_ms: u64,
    capture_instant: Instant,
}

impl RawFrame {
    pub(crate) fn new(data: Vec<u8>, width: u32, height: u32, captured_at_ms: u64) -> Self {
        Self {
            data,
            width,
            height,
            captured_at_ms,
            capture_instant: Instant::now(),
        }
    }

    pub fn inference_view(&self) -> InferenceView<'_> {
        InferenceView { frame: self }
    }

    pub(crate) fn age_ms(&self) -> u64 {
        self.capture_instant.elapsed().as_millis() as u64
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

/// A restricted, borrowed handle to a frame's metadata and pixels. Backends
/// receive pixels by reference inside a closure call; nothing here is
/// `Clone`, `Serialize`, or otherwise exportable.
pub struct InferenceView<'a> {
    frame: &'a RawFrame,
}

impl<'a> InferenceView<'a> {
    pub fn width(&self) -> u32 {
        self.frame.width
    }

    pub fn height(&self) -> u32 {
        self.frame.height
    }

    pub fn captured_at_ms(&self) -> u64 {
        self.frame.captured_at_ms
    }

    /// Always fails. Raw frame bytes have no supported export path; this
    /// exists so that callers who go looking for one find a documented dead
    /// end rather than an absent method.
    pub fn try_export_bytes(&self) -> Result<Vec<u8>> {
        Err(anyhow!("raw frame export is not supported"))
    }

    pub fn run_object_detector<B: DetectorBackend>(&self, backend: &mut B) -> Result<DetectionResult> {
        backend.detect(&self.frame.data, self.frame.width, self.frame.height)
    }

    pub fn run_face_backend<B: FaceLandmarkBackend>(&self, backend: &mut B) -> Result<Option<FaceSignal>> {
        backend.analyze(&self.frame.data, self.frame.width, self.frame.height)
    }

    pub fn run_embedding_backend<B: EmbeddingBackend>(&self, backend: &mut B) -> Result<Option<Vec<f32>>> {
        backend.embed(&self.frame.data, self.frame.width, self.frame.height)
    }

    /// Encodes this frame as a JPEG image. Unlike `try_export_bytes`, this is
    /// an intentional, supported export path: the evidence capturer (C5) is
    /// specifically tasked with turning flagged frames into uploadable
    /// evidence images, so encoded (not raw) bytes are allowed to leave the
    /// frame module.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let expected_len = (self.frame.width as usize)
            .checked_mul(self.frame.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if self.frame.data.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, frame holds {}",
                expected_len,
                self.frame.data.len()
            ));
        }

        let image_buffer =
            image::RgbImage::from_raw(self.frame.width, self.frame.height, self.frame.data.clone())
                .ok_or_else(|| anyhow!("failed to build image buffer from frame"))?;

        let mut out = Vec::new();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode_image(&image_buffer)
            .map_err(|e| anyhow!("jpeg encode failed: {}", e))?;
        Ok(out)
    }
}

/// Bounded frame holder implementing the frame pump's "latest wins" rule
/// (§4.1): when decoding falls behind, older frames are dropped rather than
/// queued. `max_frames` is normally 1; a small ring is retained to let
/// analyzers that need short temporal context (e.g. majority-vote face
/// verification) look back a handful of frames.
pub struct FrameBuffer {
    buffer: VecDeque<RawFrame>,
    max_frames: usize,
    max_age_ms: u64,
}

impl FrameBuffer {
    pub fn new(max_frames: usize, max_age_ms: u64) -> Self {
        Self {
            buffer: VecDeque::with_capacity(max_frames.max(1)),
            max_frames: max_frames.max(1),
            max_age_ms,
        }
    }

    pub fn push(&mut self, frame: RawFrame) {
        while let Some(front) = self.buffer.front() {
            if front.age_ms() > self.max_age_ms {
                self.buffer.pop_front();
            } else {
                break;
            }
        }
        while self.buffer.len() >= self.max_frames {
            self.buffer.pop_front();
        }
        self.buffer.push_back(frame);
    }

    pub fn latest(&self) -> Option<&RawFrame> {
        self.buffer.back()
    }

    pub fn recent(&self, n: usize) -> impl Iterator<Item = &RawFrame> {
        let len = self.buffer.len();
        self.buffer.iter().skip(len.saturating_sub(n))
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn memory_bytes(&self) -> usize {
        self.buffer.iter().map(|f| f.byte_len()).sum()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(1, 2_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_frame(captured_at_ms: u64) -> RawFrame {
        RawFrame::new(vec![0u8; 64], 8, 8, captured_at_ms)
    }

    #[test]
    fn inference_view_cannot_export_bytes() {
        let frame = make_test_frame(0);
        let view = frame.inference_view();
        assert!(view.try_export_bytes().is_err());
    }

    #[test]
    fn inference_view_provides_metadata() {
        let frame = make_test_frame(42);
        let view = frame.inference_view();
        assert_eq!(view.width(), 8);
        assert_eq!(view.height(), 8);
        assert_eq!(view.captured_at_ms(), 42);
    }

    #[test]
    fn frame_buffer_enforces_capacity() {
        let mut buf = FrameBuffer::new(2, 60_000);
        buf.push(make_test_frame(1));
        buf.push(make_test_frame(2));
        buf.push(make_test_frame(3));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.latest().unwrap().captured_at_ms, 3);
    }

    #[test]
    fn frame_buffer_default_is_latest_wins() {
        let mut buf = FrameBuffer::default();
        buf.push(make_test_frame(1));
        buf.push(make_test_frame(2));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.latest().unwrap().captured_at_ms, 2);
    }
}
