//! Face analyzer (C2): per-frame gaze/mouth/presence signal extraction.
//!
//! Mirrors the object-detector module's backend-trait shape (`detect::backend`)
//! so both ML surfaces plug into the same `InferenceView::run_*` entry point
//! and degrade the same way when a backend is unavailable.

mod backend;
mod backends;
mod result;

pub use backend::FaceLandmarkBackend;
pub use backends::StubFaceBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractFaceBackend;
pub use result::{FaceSignal, GazeDirection};
