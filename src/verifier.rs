//! Face verifier (C7): enrolls a candidate's biometric template at session
//! start and re-checks it against one or more later frames using a
//! majority-vote rule across the frames sampled in a verification window,
//! rather than trusting a single frame. Templates are zeroized on drop and
//! never implement `Debug`/`Serialize`, matching the raw-frame module's
//! "pixels never leave this boundary" posture.

use anyhow::Result;
use rand::seq::SliceRandom;
use zeroize::Zeroize;

use crate::frame::InferenceView;
use crate::VerifyError;

/// Embedding dimensionality the verifier enforces at its boundary (§3, §4.7).
/// A template or probe embedding of any other length is not a "no match",
/// it is a fatal `InternalInconsistency` (§7): the embedding backend has
/// changed shape under us.
pub const EMBEDDING_DIM: usize = 128;

/// Default maximum Euclidean distance for "same person" (§4.7, §6).
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.55;

/// Default number of frames sampled per verification window (§4.7, §6).
pub const DEFAULT_FRAME_COUNT: u32 = 3;

/// Default minimum number of matching frames required to pass majority
/// vote out of `DEFAULT_FRAME_COUNT` sampled frames (§4.7, §6).
pub const DEFAULT_MIN_MATCHES: u32 = 2;

/// An embedding backend trait (C7's ML surface), independent of both the
/// face-landmark backend (C2) and the object detector (C3): a verification
/// embedding model is usually a distinct network from the live-gaze model.
pub trait EmbeddingBackend: Send {
    fn name(&self) -> &'static str;
    fn embed(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Option<Vec<f32>>>;
}

/// An enrolled candidate's face embedding. Deliberately not `Debug` or
/// `Serialize`: nothing should be able to accidentally log or persist raw
/// template values.
pub struct BiometricTemplate {
    embedding: Vec<f32>,
}

impl BiometricTemplate {
    fn new(embedding: Vec<f32>) -> Self {
        Self { embedding }
    }
}

impl Drop for BiometricTemplate {
    fn drop(&mut self) {
        self.embedding.zeroize();
    }
}

/// Euclidean distance between two embeddings of equal length. Callers must
/// check dimensionality before calling this; it only ever sees vectors
/// already known to be the same length.
fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

fn check_dimension(embedding: &[f32]) -> Result<(), VerifyError> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(VerifyError::InternalInconsistency(format!(
            "embedding dimensionality mismatch: expected {}, got {}",
            EMBEDDING_DIM,
            embedding.len()
        )));
    }
    Ok(())
}

pub struct FaceVerifier {
    threshold: f32,
    min_matches: u32,
}

impl FaceVerifier {
    pub fn new(threshold: f32, min_matches: u32) -> Self {
        Self { threshold, min_matches }
    }

    /// Enrolls a candidate from a single frame, e.g. at session start.
    pub fn enroll<B: EmbeddingBackend>(
        &self,
        view: &InferenceView<'_>,
        backend: &mut B,
    ) -> Result<BiometricTemplate, VerifyError> {
        let embedding = view
            .run_embedding_backend(backend)
            .map_err(|e| VerifyError::InternalInconsistency(e.to_string()))?
            .ok_or(VerifyError::NoFace)?;
        check_dimension(&embedding)?;
        Ok(BiometricTemplate::new(embedding))
    }

    /// Verifies `views` against `template` using majority vote: the frame is
    /// considered verified if at least `self.min_matches` of the sampled
    /// frames in which exactly one face was found match the template within
    /// `self.threshold` Euclidean distance.
    pub fn verify_majority<B: EmbeddingBackend>(
        &self,
        views: &[InferenceView<'_>],
        backend: &mut B,
        template: &BiometricTemplate,
    ) -> Result<bool, VerifyError> {
        if views.is_empty() {
            return Err(VerifyError::NoFace);
        }
        check_dimension(&template.embedding)?;

        let mut matches = 0usize;
        let mut considered = 0usize;
        let mut distances = Vec::with_capacity(views.len());

        for view in views {
            let embedding = view
                .run_embedding_backend(backend)
                .map_err(|e| VerifyError::InternalInconsistency(e.to_string()))?;
            let Some(embedding) = embedding else {
                continue;
            };
            check_dimension(&embedding)?;
            considered += 1;
            let distance = euclidean_distance(&embedding, &template.embedding);
            distances.push(distance);
            if distance <= self.threshold {
                matches += 1;
            }
        }

        if considered == 0 {
            return Err(VerifyError::NoFace);
        }

        Ok(matches as u32 >= self.min_matches)
    }
}

impl Default for FaceVerifier {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD, DEFAULT_MIN_MATCHES)
    }
}

/// Scheduling helper: picks a pseudo-random offset (in milliseconds) within
/// a re-verification window so re-checks across concurrently running
/// sessions don't all land on the same tick.
pub fn jittered_reverify_delay_ms(window_ms: u64) -> u64 {
    if window_ms == 0 {
        return 0;
    }
    let candidates: Vec<u64> = (0..window_ms).step_by((window_ms / 20).max(1) as usize).collect();
    *candidates.choose(&mut rand::thread_rng()).unwrap_or(&0)
}

fn embedding_128(seed: f32) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[0] = seed;
    v
}

/// Deterministic, scriptable embedding backend for tests.
pub struct StubEmbeddingBackend {
    script: Vec<Option<Vec<f32>>>,
    cursor: usize,
}

impl StubEmbeddingBackend {
    pub fn new() -> Self {
        Self {
            script: vec![Some(embedding_128(1.0))],
            cursor: 0,
        }
    }

    pub fn with_script(script: Vec<Option<Vec<f32>>>) -> Self {
        Self {
            script: if script.is_empty() { vec![None] } else { script },
            cursor: 0,
        }
    }
}

impl Default for StubEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingBackend for StubEmbeddingBackend {
    fn name(&self) -> &'static str {
        "stub-embedding"
    }

    fn embed(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Option<Vec<f32>>> {
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
    use crate::frame::RawFrame;

    fn frame() -> RawFrame {
        RawFrame::new(vec![0u8; 12], 2, 2, 0)
    }

    #[test]
    fn enroll_fails_with_no_face() {
        let verifier = FaceVerifier::default();
        let mut backend = StubEmbeddingBackend::with_script(vec![None]);
        let f = frame();
        let view = f.inference_view();
        assert!(matches!(verifier.enroll(&view, &mut backend), Err(VerifyError::NoFace)));
    }

    #[test]
    fn enroll_fails_on_dimension_mismatch() {
        let verifier = FaceVerifier::default();
        let mut backend = StubEmbeddingBackend::with_script(vec![Some(vec![1.0, 0.0, 0.0])]);
        let f = frame();
        let view = f.inference_view();
        assert!(matches!(
            verifier.enroll(&view, &mut backend),
            Err(VerifyError::InternalInconsistency(_))
        ));
    }

    #[test]
    fn majority_vote_passes_with_matching_frames() {
        let verifier = FaceVerifier::new(0.1, 2);
        let mut enroll_backend = StubEmbeddingBackend::with_script(vec![Some(embedding_128(1.0))]);
        let f = frame();
        let view = f.inference_view();
        let template = verifier.enroll(&view, &mut enroll_backend).unwrap();

        let f1 = frame();
        let f2 = frame();
        let f3 = frame();
        let views = vec![f1.inference_view(), f2.inference_view(), f3.inference_view()];
        let mut check_backend = StubEmbeddingBackend::with_script(vec![
            Some(embedding_128(1.0)),
            Some(embedding_128(1.0)),
            Some(embedding_128(5.0)),
        ]);

        let verified = verifier.verify_majority(&views, &mut check_backend, &template).unwrap();
        assert!(verified, "two of three frames match, majority passes");
    }

    #[test]
    fn majority_vote_fails_below_min_matches() {
        let verifier = FaceVerifier::new(0.1, 3);
        let mut enroll_backend = StubEmbeddingBackend::with_script(vec![Some(embedding_128(1.0))]);
        let f = frame();
        let view = f.inference_view();
        let template = verifier.enroll(&view, &mut enroll_backend).unwrap();

        let f1 = frame();
        let f2 = frame();
        let views = vec![f1.inference_view(), f2.inference_view()];
        let mut check_backend =
            StubEmbeddingBackend::with_script(vec![Some(embedding_128(1.0)), Some(embedding_128(5.0))]);

        let verified = verifier.verify_majority(&views, &mut check_backend, &template).unwrap();
        assert!(!verified, "only one of two frames matches, short of min_matches=3");
    }
}
