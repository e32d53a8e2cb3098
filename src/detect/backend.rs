use anyhow::{anyhow, Result};

use crate::detect::result::DetectionResult;

/// Detection capabilities supported by backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    Motion,
    ObjectDetection,
    Classification,
}

/// Whether the object detector's raw output head must be passed through a
/// sigmoid before it is usable as a confidence. This is resolved once, at
/// model load time, never re-guessed per frame (§4.3 step 2, §9 Design
/// Notes: "a small explicit piece of detector state decided once at load
/// time, not a runtime guess made per frame").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigmoidMode {
    /// Inspect the first frame's raw output range and cache the verdict.
    Auto,
    /// Raw output is known to be logits; always apply sigmoid.
    ForcedOn,
    /// Raw output is already in `[0, 1]`; never apply sigmoid.
    ForcedOff,
}

impl SigmoidMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "auto" => Ok(Self::Auto),
            "forced_on" => Ok(Self::ForcedOn),
            "forced_off" => Ok(Self::ForcedOff),
            other => Err(anyhow!("unknown sigmoid mode '{}'", other)),
        }
    }
}

/// Object-detector backend trait (C3).
///
/// # Audit boundary
///
/// Implementations must treat the pixel slice as read-only and ephemeral:
/// no copy of `pixels` may outlive the call, no disk writes, no network
/// requests.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame's raw RGB pixels.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_mode_parse_round_trips() {
        assert_eq!(SigmoidMode::parse("auto").unwrap(), SigmoidMode::Auto);
        assert_eq!(SigmoidMode::parse("forced_on").unwrap(), SigmoidMode::ForcedOn);
        assert_eq!(SigmoidMode::parse("forced_off").unwrap(), SigmoidMode::ForcedOff);
        assert!(SigmoidMode::parse("maybe").is_err());
    }
}
