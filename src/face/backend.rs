use anyhow::Result;

use crate::face::result::FaceSignal;

/// Face-landmark backend trait (C2).
///
/// # Audit boundary
///
/// Same contract as `detect::DetectorBackend`: the pixel slice is read-only
/// and ephemeral, no disk or network I/O inside `analyze`.
pub trait FaceLandmarkBackend: Send {
    fn name(&self) -> &'static str;

    /// Returns `Ok(None)` when no face is found; never an error for the
    /// "zero faces" case, which is a normal outcome (§4.2's `NoFace` alert
    /// is driven by repeated `None` results, not by an `Err`).
    fn analyze(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Option<FaceSignal>>;

    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
