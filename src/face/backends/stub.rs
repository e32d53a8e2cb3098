use anyhow::Result;

use crate::face::backend::FaceLandmarkBackend;
use crate::face::result::FaceSignal;

/// Deterministic, scriptable backend used by tests and the `demo` binary.
pub struct StubFaceBackend {
    script: Vec<Option<FaceSignal>>,
    cursor: usize,
}

impl StubFaceBackend {
    pub fn new() -> Self {
        Self {
            script: vec![Some(FaceSignal::none_detected())],
            cursor: 0,
        }
    }

    pub fn with_script(script: Vec<Option<FaceSignal>>) -> Self {
        Self {
            script: if script.is_empty() {
                vec![Some(FaceSignal::none_detected())]
            } else {
                script
            },
            cursor: 0,
        }
    }
}

impl Default for StubFaceBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceLandmarkBackend for StubFaceBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn analyze(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Option<FaceSignal>> {
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
    use crate::face::result::GazeDirection;

    #[test]
    fn stub_cycles_and_holds_last() {
        let away = FaceSignal {
            face_count: 1,
            gaze_direction: GazeDirection::Away,
            mouth_open: false,
            bounding_box: Some((0.1, 0.1, 0.3, 0.3)),
        };
        let mut backend = StubFaceBackend::with_script(vec![None, Some(away)]);
        assert!(backend.analyze(&[], 1, 1).unwrap().is_none());
        let second = backend.analyze(&[], 1, 1).unwrap().unwrap();
        assert_eq!(second.gaze_direction, GazeDirection::Away);
        let third = backend.analyze(&[], 1, 1).unwrap().unwrap();
        assert_eq!(third.gaze_direction, GazeDirection::Away);
    }
}
