// Rationale: detector backends receive pixels for inference but the trait
// signature gives them no way to return or export the pixel buffer itself.
use proctor_kernel::detect::{DetectionCapability, DetectionResult, DetectorBackend};

struct BadBackend;

impl DetectorBackend for BadBackend {
    fn name(&self) -> &'static str {
        "bad"
    }

    fn supports(&self, _capability: DetectionCapability) -> bool {
        true
    }

    fn detect(&mut self, pixels: &[u8], _width: u32, _height: u32) -> DetectionResult {
        // `detect` must return `anyhow::Result<DetectionResult>`; returning the
        // pixel buffer itself is both the wrong export attempt and the wrong type.
        pixels.to_vec()
    }
}

fn main() {}
