use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::DetectionResult;

/// Deterministic, scriptable backend used by tests and the `demo` binary.
/// Returns one scripted [`DetectionResult`] per call, holding on the last
/// entry once the script is exhausted so long-running loops get a stable
/// tail state instead of panicking.
pub struct StubBackend {
    script: Vec<DetectionResult>,
    cursor: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: vec![DetectionResult::default()],
            cursor: 0,
        }
    }

    pub fn with_script(script: Vec<DetectionResult>) -> Self {
        Self {
            script: if script.is_empty() {
                vec![DetectionResult::default()]
            } else {
                script
            },
            cursor: 0,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::Motion | DetectionCapability::ObjectDetection | DetectionCapability::Classification
        )
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionResult> {
        let idx = self.cursor.min(self.script.len() - 1);
        let result = self.script[idx].clone();
        if self.cursor + 1 < self.script.len() {
            self.cursor += 1;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::{Detection, ObjectClass};

    #[test]
    fn stub_cycles_through_script_then_holds_last() {
        let phone = DetectionResult {
            detections: vec![Detection {
                x: 0.1,
                y: 0.1,
                w: 0.2,
                h: 0.2,
                confidence: 0.72,
                class: ObjectClass::Phone,
            }],
            confidence: 0.72,
        };
        let mut backend = StubBackend::with_script(vec![DetectionResult::default(), phone.clone()]);
        let first = backend.detect(&[], 1, 1).unwrap();
        assert!(first.detections.is_empty());
        let second = backend.detect(&[], 1, 1).unwrap();
        assert!(second.contains_class(ObjectClass::Phone));
        let third = backend.detect(&[], 1, 1).unwrap();
        assert!(third.contains_class(ObjectClass::Phone));
    }
}
