//! Frame pump camera source (C1). Grounded on the old streaming-source
//! idiom of producing synthetic frames for local/dev/test use without a real
//! capture device, generalized to the browser-webcam-via-WebRTC-gateway
//! picture this crate actually runs against: a camera source here just
//! means "whatever hands us RGB frames," decoded upstream of this process.

use anyhow::{anyhow, Result};

use crate::frame::RawFrame;

/// A frame source feeding the pump loop (§4.1). Target rate is enforced by
/// the caller, not the source: `next_frame` simply blocks or returns the
/// next available frame.
pub trait CameraSource: Send {
    fn connect(&mut self) -> Result<()>;
    fn next_frame(&mut self) -> Result<RawFrame>;
    fn is_healthy(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self { width: 640, height: 480 }
    }
}

/// Synthetic frame source used for local development, tests, and the
/// `demo` binary. Produces deterministic-ish varying pixels so motion-based
/// heuristics in tests have something to react to.
pub struct StubCameraSource {
    config: CameraConfig,
    connected: bool,
    frame_count: u64,
}

impl StubCameraSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            connected: false,
            frame_count: 0,
        }
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }
}

impl CameraSource for StubCameraSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        if !self.connected {
            return Err(anyhow!("camera source is not connected"));
        }
        self.frame_count += 1;
        let now_ms = crate::now_ms()?;
        let pixels = self.generate_pixels();
        Ok(RawFrame::new(pixels, self.config.width, self.config.height, now_ms))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_frame_requires_connect() {
        let mut source = StubCameraSource::new(CameraConfig::default());
        assert!(source.next_frame().is_err());
    }

    #[test]
    fn connect_then_next_frame_succeeds() {
        let mut source = StubCameraSource::new(CameraConfig { width: 4, height: 4 });
        source.connect().unwrap();
        let frame = source.next_frame().unwrap();
        assert_eq!(frame.byte_len(), 4 * 4 * 3);
    }
}
